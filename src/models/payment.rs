use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentChannel {
    Alipay,
    Wechat,
}

impl std::fmt::Display for PaymentChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentChannel::Alipay => write!(f, "alipay"),
            PaymentChannel::Wechat => write!(f, "wechat"),
        }
    }
}

/// 对账结果
///
/// - `Pending`: 仍在轮询，或轮询次数耗尽后已发起撤销
/// - `Succeeded` / `Closed`: 终态
/// - `Unknown`: 查询出错或服务关闭，结果无法确定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Pending,
    Succeeded,
    Closed,
    Unknown,
}

impl PaymentOutcome {
    pub fn is_successful(&self) -> bool {
        matches!(self, PaymentOutcome::Succeeded)
    }
}

/// 小程序 / 公众号调起支付所需参数 (wx.requestPayment)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JsapiParams {
    pub app_id: String,
    pub time_stamp: String,
    pub nonce_str: String,
    pub package: String,
    pub sign_type: String,
    pub pay_sign: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AlipayPrecreateRequest {
    /// 金额(分)
    pub amount: i64,
    pub subject: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WechatJsapiRequest {
    pub openid: String,
    /// 金额(分)
    pub amount: i64,
    pub description: Option<String>,
}

/// 小程序 wx.login 得到的临时登录凭证
#[derive(Debug, Deserialize, ToSchema)]
pub struct WechatOpenIdRequest {
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WechatOpenIdResponse {
    pub openid: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentCreatedResponse {
    pub out_trade_no: String,
    pub channel: PaymentChannel,
    /// 支付宝扫码支付二维码内容
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsapi: Option<JsapiParams>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct PaymentStatusQuery {
    pub out_trade_no: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentStatusResponse {
    pub out_trade_no: String,
    pub status: PaymentOutcome,
    pub payment_successful: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelPaymentRequest {
    pub out_trade_no: String,
    /// 本进程不认识该订单号时用于选择支付渠道
    pub channel: Option<PaymentChannel>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CancelPaymentResponse {
    pub out_trade_no: String,
    pub cancelled: bool,
}
