//! 微信支付 APIv3 JSAPI 下单 / 查单 / 关单

use crate::config::WechatConfig;
use crate::error::{AppError, AppResult};
use crate::external::gateway::{
    CreateTransaction, OpenIdResolver, PaymentGateway, PaymentPayload, TradeStatus,
};
use crate::models::{JsapiParams, PaymentChannel};
use crate::utils::{RsaSigner, beijing_offset};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

const API_BASE: &str = "https://api.mch.weixin.qq.com";
const AUTH_SCHEMA: &str = "WECHATPAY2-SHA256-RSA2048";
const CODE2SESSION_URL: &str = "https://api.weixin.qq.com/sns/jscode2session";

/// 小程序登录凭证校验结果，session_key 不对外返回
#[derive(Debug, Default, Deserialize)]
struct Code2SessionResponse {
    openid: Option<String>,
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

#[derive(Debug, Deserialize)]
struct PrepayResponse {
    prepay_id: String,
}

#[derive(Debug, Deserialize)]
struct TransactionResponse {
    trade_state: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

pub struct WechatPayGateway {
    client: Client,
    config: WechatConfig,
    signer: RsaSigner,
}

impl WechatPayGateway {
    /// 从 `private_key_path` 读取商户 API 私钥
    pub fn new(config: WechatConfig) -> AppResult<Self> {
        let pem = std::fs::read_to_string(&config.private_key_path).map_err(|e| {
            AppError::ConfigError(format!(
                "Failed to read WeChat Pay private key {}: {e}",
                config.private_key_path
            ))
        })?;
        let signer = RsaSigner::from_key_str(&pem)?;
        Ok(Self::with_signer(config, signer))
    }

    pub fn with_signer(config: WechatConfig, signer: RsaSigner) -> Self {
        Self {
            client: Client::new(),
            config,
            signer,
        }
    }

    fn nonce() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    /// 请求签名头，签名串为 `METHOD\nURL\n时间戳\n随机串\n报文主体\n`
    pub(crate) fn authorization(
        &self,
        method: &str,
        url_path: &str,
        body: &str,
        timestamp: i64,
        nonce: &str,
    ) -> AppResult<String> {
        let message = format!("{method}\n{url_path}\n{timestamp}\n{nonce}\n{body}\n");
        let signature = self.signer.sign_base64(&message)?;
        Ok(format!(
            r#"{AUTH_SCHEMA} mchid="{}",nonce_str="{nonce}",signature="{signature}",timestamp="{timestamp}",serial_no="{}""#,
            self.config.mch_id, self.config.mch_serial_no
        ))
    }

    /// 调起支付参数，paySign 签名串为 `appId\n时间戳\n随机串\nprepay_id=...\n`
    pub(crate) fn jsapi_params(
        &self,
        prepay_id: &str,
        timestamp: i64,
        nonce: &str,
    ) -> AppResult<JsapiParams> {
        let package = format!("prepay_id={prepay_id}");
        let message = format!(
            "{}\n{timestamp}\n{nonce}\n{package}\n",
            self.config.app_id
        );
        Ok(JsapiParams {
            app_id: self.config.app_id.clone(),
            time_stamp: timestamp.to_string(),
            nonce_str: nonce.to_string(),
            package,
            sign_type: "RSA".to_string(),
            pay_sign: self.signer.sign_base64(&message)?,
        })
    }

    fn notify_url(&self, notify_path: &str) -> String {
        format!(
            "{}{}",
            self.config.domain.trim_end_matches('/'),
            notify_path
        )
    }

    async fn send(
        &self,
        method: Method,
        url_path: &str,
        body: Option<&Value>,
    ) -> AppResult<(StatusCode, String)> {
        let body_str = body.map(|b| b.to_string()).unwrap_or_default();
        let authorization = self.authorization(
            method.as_str(),
            url_path,
            &body_str,
            Utc::now().timestamp(),
            &Self::nonce(),
        )?;

        let mut request = self
            .client
            .request(method, format!("{API_BASE}{url_path}"))
            .header("Authorization", authorization)
            .header("Accept", "application/json")
            .header("User-Agent", concat!("stay-backend/", env!("CARGO_PKG_VERSION")));
        if body.is_some() {
            request = request
                .header("Content-Type", "application/json")
                .body(body_str);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }

    fn api_error(action: &str, status: StatusCode, text: &str) -> AppError {
        let err: ErrorResponse = serde_json::from_str(text).unwrap_or_default();
        AppError::ExternalApiError(format!(
            "WeChat Pay {action} failed: HTTP {status} {} {}",
            err.code, err.message
        ))
    }
}

/// errcode 非 0 或缺少 openid 都视为微信接口错误
pub(crate) fn parse_code2session(text: &str) -> AppResult<String> {
    let resp: Code2SessionResponse = serde_json::from_str(text)?;
    if resp.errcode != 0 {
        return Err(AppError::ExternalApiError(format!(
            "WeChat code2session failed: {} {}",
            resp.errcode, resp.errmsg
        )));
    }
    resp.openid
        .filter(|o| !o.is_empty())
        .ok_or_else(|| AppError::ExternalApiError("WeChat code2session returned no openid".to_string()))
}

pub(crate) fn map_trade_state(state: &str) -> TradeStatus {
    match state {
        "SUCCESS" | "REFUND" => TradeStatus::Success,
        "CLOSED" | "REVOKED" | "PAYERROR" => TradeStatus::Closed,
        // NOTPAY / USERPAYING
        _ => TradeStatus::Pending,
    }
}

#[async_trait]
impl PaymentGateway for WechatPayGateway {
    fn channel(&self) -> PaymentChannel {
        PaymentChannel::Wechat
    }

    async fn create_transaction(&self, req: &CreateTransaction) -> AppResult<PaymentPayload> {
        let openid = req
            .payer
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::ValidationError("openid is required".to_string()))?;

        let body = json!({
            "appid": self.config.app_id,
            "mchid": self.config.mch_id,
            "description": req.description,
            "out_trade_no": req.trade_ref,
            "time_expire": req.expires_at
                .with_timezone(&beijing_offset())
                .to_rfc3339_opts(SecondsFormat::Secs, false),
            "notify_url": self.notify_url(&req.notify_path),
            "amount": { "total": req.amount_cents, "currency": "CNY" },
            "payer": { "openid": openid },
        });

        let (status, text) = self
            .send(Method::POST, "/v3/pay/transactions/jsapi", Some(&body))
            .await?;
        if !status.is_success() {
            return Err(Self::api_error("jsapi prepay", status, &text));
        }

        let prepay: PrepayResponse = serde_json::from_str(&text)?;
        let params = self.jsapi_params(&prepay.prepay_id, Utc::now().timestamp(), &Self::nonce())?;
        log::info!("WeChat Pay prepay ok: {}", req.trade_ref);
        Ok(PaymentPayload::JsApi(params))
    }

    async fn query_status(&self, trade_ref: &str) -> AppResult<TradeStatus> {
        let path = format!(
            "/v3/pay/transactions/out-trade-no/{trade_ref}?mchid={}",
            self.config.mch_id
        );
        let (status, text) = self.send(Method::GET, &path, None).await?;

        if status == StatusCode::NOT_FOUND {
            let err: ErrorResponse = serde_json::from_str(&text).unwrap_or_default();
            if err.code == "ORDER_NOT_EXIST" {
                return Ok(TradeStatus::Pending);
            }
        }
        if !status.is_success() {
            return Err(Self::api_error("query", status, &text));
        }

        let tx: TransactionResponse = serde_json::from_str(&text)?;
        Ok(map_trade_state(&tx.trade_state))
    }

    async fn cancel_transaction(&self, trade_ref: &str) -> AppResult<()> {
        let path = format!("/v3/pay/transactions/out-trade-no/{trade_ref}/close");
        let body = json!({ "mchid": self.config.mch_id });
        let (status, text) = self.send(Method::POST, &path, Some(&body)).await?;
        if !status.is_success() {
            return Err(Self::api_error("close", status, &text));
        }
        log::info!("WeChat Pay trade {trade_ref} closed");
        Ok(())
    }
}

#[async_trait]
impl OpenIdResolver for WechatPayGateway {
    async fn openid_from_code(&self, js_code: &str) -> AppResult<String> {
        if self.config.app_secret.is_empty() {
            return Err(AppError::ConfigError("WeChat app_secret is not configured".to_string()));
        }

        let response = self
            .client
            .get(CODE2SESSION_URL)
            .query(&[
                ("appid", self.config.app_id.as_str()),
                ("secret", self.config.app_secret.as_str()),
                ("js_code", js_code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(AppError::ExternalApiError(format!(
                "WeChat code2session failed: HTTP {status}"
            )));
        }
        parse_code2session(&text)
    }
}
