//! 支付宝开放平台 (RSA2) 当面付: 预下单 / 查询 / 撤销

use crate::config::AlipayConfig;
use crate::error::{AppError, AppResult};
use crate::external::gateway::{
    CreateTransaction, PaymentGateway, PaymentPayload, TradeStatus, format_yuan,
};
use crate::models::PaymentChannel;
use crate::utils::{RsaSigner, RsaVerifier, beijing_offset};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};

const GATEWAY_URL: &str = "https://openapi.alipay.com/gateway.do";
const SANDBOX_GATEWAY_URL: &str = "https://openapi-sandbox.dl.alipaydev.com/gateway.do";
const SUCCESS_CODE: &str = "10000";
const TRADE_NOT_EXIST: &str = "ACQ.TRADE_NOT_EXIST";

/// 各接口响应节点的公共字段
#[derive(Debug, Default, Deserialize)]
pub struct AlipayResponse {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    pub sub_code: Option<String>,
    pub sub_msg: Option<String>,
    pub out_trade_no: Option<String>,
    pub qr_code: Option<String>,
    pub trade_status: Option<String>,
    pub action: Option<String>,
}

impl AlipayResponse {
    fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    fn error_message(&self, method: &str) -> String {
        format!(
            "{method} failed: {} {} ({})",
            self.code,
            self.sub_msg.as_deref().unwrap_or(&self.msg),
            self.sub_code.as_deref().unwrap_or("-")
        )
    }
}

pub struct AlipayGateway {
    client: Client,
    config: AlipayConfig,
    signer: RsaSigner,
    verifier: Option<RsaVerifier>,
    gateway_url: &'static str,
}

impl AlipayGateway {
    pub fn new(config: AlipayConfig) -> AppResult<Self> {
        let signer = RsaSigner::from_key_str(&config.private_key)?;
        let verifier = if config.alipay_public_key.trim().is_empty() {
            log::warn!("Alipay public key not configured, response signatures will not be verified");
            None
        } else {
            Some(RsaVerifier::from_key_str(&config.alipay_public_key)?)
        };
        let gateway_url = if config.sandbox {
            SANDBOX_GATEWAY_URL
        } else {
            GATEWAY_URL
        };

        Ok(Self {
            client: Client::new(),
            config,
            signer,
            verifier,
            gateway_url,
        })
    }

    /// 异步通知地址: 回调域名 + 下单请求中的路径，未配置域名时不传
    pub(crate) fn notify_url(&self, notify_path: &str) -> Option<String> {
        let domain = self.config.domain.trim_end_matches('/');
        if domain.is_empty() || notify_path.is_empty() {
            return None;
        }
        Some(format!("{domain}{notify_path}"))
    }

    /// 待签名字符串: 除 sign 外的非空参数按 key 排序后以 `k=v&` 拼接
    pub(crate) fn sign_content(params: &BTreeMap<String, String>) -> String {
        params
            .iter()
            .filter(|(k, v)| k.as_str() != "sign" && !v.is_empty())
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn signed_params(
        &self,
        method: &str,
        biz_content: &Value,
        now: DateTime<Utc>,
        notify_url: Option<&str>,
    ) -> AppResult<BTreeMap<String, String>> {
        let mut params = BTreeMap::new();
        params.insert("app_id".to_string(), self.config.app_id.clone());
        params.insert("method".to_string(), method.to_string());
        params.insert("format".to_string(), "JSON".to_string());
        params.insert("charset".to_string(), "utf-8".to_string());
        params.insert("sign_type".to_string(), "RSA2".to_string());
        params.insert(
            "timestamp".to_string(),
            now.with_timezone(&beijing_offset())
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        );
        params.insert("version".to_string(), "1.0".to_string());
        params.insert("biz_content".to_string(), biz_content.to_string());
        if let Some(url) = notify_url {
            params.insert("notify_url".to_string(), url.to_string());
        }

        let sign = self.signer.sign_base64(&Self::sign_content(&params))?;
        params.insert("sign".to_string(), sign);
        Ok(params)
    }

    /// 解析响应并校验 `<method>_response` 节点签名
    pub(crate) fn parse_response(&self, method: &str, body: &str) -> AppResult<AlipayResponse> {
        let node_key = format!("{}_response", method.replace('.', "_"));
        let raw: HashMap<String, Box<RawValue>> = serde_json::from_str(body)?;

        let node = raw.get(&node_key).ok_or_else(|| {
            AppError::ExternalApiError(format!("Alipay response missing {node_key}"))
        })?;

        if let Some(verifier) = &self.verifier {
            let sign = raw
                .get("sign")
                .map(|s| serde_json::from_str::<String>(s.get()))
                .transpose()?;
            match sign {
                Some(sign) => verifier.verify_base64(node.get(), &sign)?,
                // 网关层错误 (如 app_id 无效) 不带签名
                None => log::warn!("Alipay {method} response is unsigned"),
            }
        }

        Ok(serde_json::from_str(node.get())?)
    }

    async fn execute(
        &self,
        method: &str,
        biz_content: Value,
        notify_url: Option<&str>,
    ) -> AppResult<AlipayResponse> {
        let params = self.signed_params(method, &biz_content, Utc::now(), notify_url)?;

        let response = self
            .client
            .post(self.gateway_url)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApiError(format!(
                "Alipay {method} HTTP {status}: {text}"
            )));
        }

        let body = response.text().await?;
        self.parse_response(method, &body)
    }
}

/// 查询结果映射。交易不存在视为买家尚未扫码
pub(crate) fn map_query_response(resp: &AlipayResponse) -> AppResult<TradeStatus> {
    if !resp.is_success() {
        if resp.sub_code.as_deref() == Some(TRADE_NOT_EXIST) {
            return Ok(TradeStatus::Pending);
        }
        return Err(AppError::ExternalApiError(
            resp.error_message("alipay.trade.query"),
        ));
    }

    Ok(match resp.trade_status.as_deref() {
        Some("TRADE_SUCCESS") | Some("TRADE_FINISHED") => TradeStatus::Success,
        Some("TRADE_CLOSED") => TradeStatus::Closed,
        _ => TradeStatus::Pending,
    })
}

#[async_trait]
impl PaymentGateway for AlipayGateway {
    fn channel(&self) -> PaymentChannel {
        PaymentChannel::Alipay
    }

    async fn create_transaction(&self, req: &CreateTransaction) -> AppResult<PaymentPayload> {
        let method = "alipay.trade.precreate";
        let biz = json!({
            "out_trade_no": req.trade_ref,
            "total_amount": format_yuan(req.amount_cents),
            "subject": req.description,
            "time_expire": req.expires_at
                .with_timezone(&beijing_offset())
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        });

        let notify_url = self.notify_url(&req.notify_path);
        let resp = self.execute(method, biz, notify_url.as_deref()).await?;
        if !resp.is_success() {
            return Err(AppError::ExternalApiError(resp.error_message(method)));
        }

        let qr_code = resp
            .qr_code
            .filter(|q| !q.is_empty())
            .ok_or_else(|| AppError::ExternalApiError("Alipay precreate returned no qr_code".to_string()))?;

        log::info!("Alipay precreate ok: {}", req.trade_ref);
        Ok(PaymentPayload::QrCode(qr_code))
    }

    async fn query_status(&self, trade_ref: &str) -> AppResult<TradeStatus> {
        let resp = self
            .execute(
                "alipay.trade.query",
                json!({ "out_trade_no": trade_ref }),
                None,
            )
            .await?;
        map_query_response(&resp)
    }

    async fn cancel_transaction(&self, trade_ref: &str) -> AppResult<()> {
        let method = "alipay.trade.cancel";
        let resp = self
            .execute(method, json!({ "out_trade_no": trade_ref }), None)
            .await?;
        if !resp.is_success() {
            return Err(AppError::ExternalApiError(resp.error_message(method)));
        }
        log::info!(
            "Alipay trade {trade_ref} cancelled, action: {}",
            resp.action.as_deref().unwrap_or("-")
        );
        Ok(())
    }
}
