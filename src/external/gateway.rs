//! 第三方支付网关抽象
//!
//! 下单、查询、撤销三个操作，支付宝与微信支付各有一个实现，
//! 对账任务只依赖这个 trait。

use crate::error::AppResult;
use crate::models::{JsapiParams, PaymentChannel};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 网关侧交易状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeStatus {
    /// 等待支付 (含买家尚未扫码)
    Pending,
    Success,
    Closed,
}

#[derive(Debug, Clone)]
pub struct CreateTransaction {
    pub trade_ref: String,
    /// 金额(分)
    pub amount_cents: i64,
    pub description: String,
    pub expires_at: DateTime<Utc>,
    /// 异步通知路径，由网关拼接域名
    pub notify_path: String,
    /// 微信支付需要的 openid
    pub payer: Option<String>,
}

/// 下单后返回给客户端的内容
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentPayload {
    QrCode(String),
    JsApi(JsapiParams),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn channel(&self) -> PaymentChannel;

    async fn create_transaction(&self, req: &CreateTransaction) -> AppResult<PaymentPayload>;

    async fn query_status(&self, trade_ref: &str) -> AppResult<TradeStatus>;

    async fn cancel_transaction(&self, trade_ref: &str) -> AppResult<()>;
}

/// 小程序登录凭证 (wx.login 的 code) 换取 openid
#[async_trait]
pub trait OpenIdResolver: Send + Sync {
    async fn openid_from_code(&self, js_code: &str) -> AppResult<String>;
}

/// 分转为 "元.角分" 字符串
pub fn format_yuan(amount_cents: i64) -> String {
    let sign = if amount_cents < 0 { "-" } else { "" };
    let abs = amount_cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}
