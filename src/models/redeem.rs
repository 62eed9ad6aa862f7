use crate::entities::{RedeemStatus, redeem_code_entity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RedeemCodeResponse {
    pub id: i64,
    pub code: String,
    pub product_name: String,
    pub status: RedeemStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// 价格(分)
    pub price: i64,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<redeem_code_entity::Model> for RedeemCodeResponse {
    fn from(m: redeem_code_entity::Model) -> Self {
        Self {
            id: m.id,
            code: m.code,
            product_name: m.product_name,
            status: m.status,
            start_time: m.start_time,
            end_time: m.end_time,
            price: m.price,
            redeemed_at: m.redeemed_at,
            created_at: m.created_at,
        }
    }
}

/// 批量生成兑换码
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRedeemCodesRequest {
    pub product_name: String,
    pub count: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub price: i64,
}

/// 只允许修改商品、有效期和价格，状态与兑换码本身不可修改
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRedeemCodeRequest {
    pub product_name: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub price: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct RedeemCodeQuery {
    pub status: Option<RedeemStatus>,
    pub product_name: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckRedeemRequest {
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckRedeemResponse {
    pub redeemed: bool,
    pub redeem_code: RedeemCodeResponse,
}
