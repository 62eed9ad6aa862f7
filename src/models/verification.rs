use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendCodeRequest {
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SendCodeResponse {
    /// 规范化后的邮箱
    pub email: String,
    /// 验证码有效期(秒)
    pub expires_in: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyCodeRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyCodeResponse {
    pub verified: bool,
}
