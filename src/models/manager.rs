use crate::entities::manager_entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    /// 发送到该邮箱的 6 位验证码
    pub verification_code: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// 用户名或邮箱
    pub account: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub verification_code: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ManagerProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<manager_entity::Model> for ManagerProfile {
    fn from(m: manager_entity::Model) -> Self {
        Self {
            id: m.id,
            username: m.username,
            email: m.email,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub manager: ManagerProfile,
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}
