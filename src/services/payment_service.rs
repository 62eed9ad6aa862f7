use crate::config::PaymentConfig;
use crate::error::{AppError, AppResult};
use crate::external::{CreateTransaction, OpenIdResolver, PaymentGateway, PaymentPayload};
use crate::models::{
    AlipayPrecreateRequest, CancelPaymentRequest, CancelPaymentResponse, PaymentChannel,
    PaymentCreatedResponse, PaymentStatusResponse, WechatJsapiRequest, WechatOpenIdRequest,
    WechatOpenIdResponse,
};
use crate::services::{PaymentOutcomeStore, PaymentRecord};
use crate::tasks::PaymentReconciler;
use crate::utils::generate_trade_no;
use chrono::{Duration, Utc};
use std::sync::Arc;

const DEFAULT_SUBJECT: &str = "Stay 点餐订单";

#[derive(Clone)]
pub struct PaymentService {
    alipay: Option<Arc<dyn PaymentGateway>>,
    wechat: Option<Arc<dyn PaymentGateway>>,
    openid_resolver: Option<Arc<dyn OpenIdResolver>>,
    outcomes: PaymentOutcomeStore,
    reconciler: PaymentReconciler,
    expire_after: Duration,
    notify_path: String,
}

impl PaymentService {
    pub fn new(
        alipay: Option<Arc<dyn PaymentGateway>>,
        wechat: Option<Arc<dyn PaymentGateway>>,
        outcomes: PaymentOutcomeStore,
        reconciler: PaymentReconciler,
        config: &PaymentConfig,
        notify_path: impl Into<String>,
    ) -> Self {
        Self {
            alipay,
            wechat,
            openid_resolver: None,
            outcomes,
            reconciler,
            expire_after: Duration::minutes(config.transaction_expire_minutes),
            notify_path: notify_path.into(),
        }
    }

    pub fn with_openid_resolver(mut self, resolver: Arc<dyn OpenIdResolver>) -> Self {
        self.openid_resolver = Some(resolver);
        self
    }

    fn gateway(&self, channel: PaymentChannel) -> AppResult<Arc<dyn PaymentGateway>> {
        let gateway = match channel {
            PaymentChannel::Alipay => self.alipay.clone(),
            PaymentChannel::Wechat => self.wechat.clone(),
        }
        .ok_or_else(|| AppError::ConfigError(format!("Payment channel {channel} is not configured")))?;

        // 渠道槽位与网关实现必须一致，否则订单会记到错误的渠道
        if gateway.channel() != channel {
            return Err(AppError::ConfigError(format!(
                "Gateway registered for {channel} serves {}",
                gateway.channel()
            )));
        }
        Ok(gateway)
    }

    /// 小程序登录 code 换取下单所需的 openid
    pub async fn resolve_openid(&self, req: WechatOpenIdRequest) -> AppResult<WechatOpenIdResponse> {
        let code = req.code.trim();
        if code.is_empty() {
            return Err(AppError::ValidationError("code is required".to_string()));
        }
        let resolver = self.openid_resolver.as_ref().ok_or_else(|| {
            AppError::ConfigError("WeChat login is not configured".to_string())
        })?;

        let openid = resolver.openid_from_code(code).await?;
        Ok(WechatOpenIdResponse { openid })
    }

    pub async fn create_alipay_precreate(
        &self,
        req: AlipayPrecreateRequest,
    ) -> AppResult<PaymentCreatedResponse> {
        self.create(PaymentChannel::Alipay, req.amount, req.subject, None)
            .await
    }

    pub async fn create_wechat_jsapi(
        &self,
        req: WechatJsapiRequest,
    ) -> AppResult<PaymentCreatedResponse> {
        if req.openid.trim().is_empty() {
            return Err(AppError::ValidationError("openid is required".to_string()));
        }
        self.create(
            PaymentChannel::Wechat,
            req.amount,
            req.description,
            Some(req.openid),
        )
        .await
    }

    /// 下单并立即返回支付信息，对账在后台进行
    async fn create(
        &self,
        channel: PaymentChannel,
        amount_cents: i64,
        description: Option<String>,
        payer: Option<String>,
    ) -> AppResult<PaymentCreatedResponse> {
        if amount_cents <= 0 {
            return Err(AppError::ValidationError(
                "Amount must be greater than zero".to_string(),
            ));
        }
        let gateway = self.gateway(channel)?;

        let now = Utc::now();
        let trade_ref = generate_trade_no(now);
        let expires_at = now + self.expire_after;
        let req = CreateTransaction {
            trade_ref: trade_ref.clone(),
            amount_cents,
            description: description
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
            expires_at,
            notify_path: self.notify_path.clone(),
            payer,
        };

        let payload = gateway.create_transaction(&req).await?;

        self.outcomes
            .insert(PaymentRecord::pending(
                &trade_ref,
                channel,
                amount_cents,
                now,
                expires_at,
            ))
            .await;
        self.reconciler.spawn(gateway, trade_ref.clone());
        log::info!("Payment {trade_ref} created via {channel}, amount {amount_cents}");

        let (qr_code, jsapi) = match payload {
            PaymentPayload::QrCode(qr) => (Some(qr), None),
            PaymentPayload::JsApi(params) => (None, Some(params)),
        };
        Ok(PaymentCreatedResponse {
            out_trade_no: trade_ref,
            channel,
            qr_code,
            jsapi,
            expires_at,
        })
    }

    pub async fn get_status(&self, trade_ref: &str) -> AppResult<PaymentStatusResponse> {
        let trade_ref = trade_ref.trim();
        if trade_ref.is_empty() {
            return Err(AppError::ValidationError("out_trade_no is required".to_string()));
        }

        let outcome = self
            .outcomes
            .outcome(trade_ref)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Payment {trade_ref} not found")))?;

        Ok(PaymentStatusResponse {
            out_trade_no: trade_ref.to_string(),
            status: outcome,
            payment_successful: outcome.is_successful(),
        })
    }

    /// 客户端放弃支付: 先查询一次 (只记日志)，再无条件撤销，只返回撤销结果
    pub async fn cancel(&self, req: CancelPaymentRequest) -> AppResult<CancelPaymentResponse> {
        let trade_ref = req.out_trade_no.trim().to_string();
        if trade_ref.is_empty() {
            return Err(AppError::ValidationError("out_trade_no is required".to_string()));
        }

        let channel = match self.outcomes.get(&trade_ref).await {
            Some(record) => record.channel,
            None => req.channel.ok_or_else(|| {
                AppError::ValidationError(
                    "channel is required for unknown out_trade_no".to_string(),
                )
            })?,
        };
        let gateway = self.gateway(channel)?;

        match gateway.query_status(&trade_ref).await {
            Ok(status) => log::info!("Payment {trade_ref} status before cancel: {status:?}"),
            Err(e) => log::warn!("Payment {trade_ref} query before cancel failed: {e}"),
        }

        gateway.cancel_transaction(&trade_ref).await?;
        log::info!("Payment {trade_ref} cancelled by client");

        Ok(CancelPaymentResponse {
            out_trade_no: trade_ref,
            cancelled: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::TradeStatus;
    use crate::models::PaymentOutcome;
    use crate::tasks::reconciler::tests::ScriptedGateway;
    use async_trait::async_trait;
    use std::sync::atomic::Ordering;

    /// 固定映射的 code -> openid
    struct FixedResolver;

    #[async_trait]
    impl OpenIdResolver for FixedResolver {
        async fn openid_from_code(&self, js_code: &str) -> AppResult<String> {
            match js_code {
                "good-code" => Ok("o-payer-1".to_string()),
                _ => Err(AppError::ExternalApiError("WeChat code2session failed: 40029 invalid code".to_string())),
            }
        }
    }

    fn service(
        alipay: Option<Arc<ScriptedGateway>>,
        store: &PaymentOutcomeStore,
    ) -> (PaymentService, PaymentReconciler) {
        let reconciler =
            PaymentReconciler::with_policy(store.clone(), 3, std::time::Duration::from_millis(1));
        let svc = PaymentService::new(
            alipay.map(|g| g as Arc<dyn PaymentGateway>),
            None,
            store.clone(),
            reconciler.clone(),
            &PaymentConfig::default(),
            "/payment/notify",
        );
        (svc, reconciler)
    }

    #[tokio::test]
    async fn test_create_returns_payload_and_reconciles() {
        let store = PaymentOutcomeStore::new();
        let gateway = Arc::new(ScriptedGateway::always(TradeStatus::Success));
        let (svc, reconciler) = service(Some(gateway.clone()), &store);

        let resp = svc
            .create_alipay_precreate(AlipayPrecreateRequest {
                amount: 1999,
                subject: None,
            })
            .await
            .unwrap();
        assert_eq!(resp.channel, PaymentChannel::Alipay);
        assert!(resp.qr_code.as_deref().unwrap().ends_with(&resp.out_trade_no));
        assert_eq!(resp.out_trade_no.len(), 20);

        reconciler.join_all().await;
        let status = svc.get_status(&resp.out_trade_no).await.unwrap();
        assert_eq!(status.status, PaymentOutcome::Succeeded);
        assert!(status.payment_successful);
        assert_eq!(gateway.queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejects_bad_amount_and_missing_channel() {
        let store = PaymentOutcomeStore::new();
        let (svc, _) = service(None, &store);

        let err = svc
            .create_alipay_precreate(AlipayPrecreateRequest {
                amount: 0,
                subject: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let err = svc
            .create_alipay_precreate(AlipayPrecreateRequest {
                amount: 100,
                subject: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_status_unknown_ref_is_not_found() {
        let store = PaymentOutcomeStore::new();
        let (svc, _) = service(None, &store);
        assert!(matches!(
            svc.get_status("20240601000000123456").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_queries_then_cancels() {
        let store = PaymentOutcomeStore::new();
        let gateway = Arc::new(ScriptedGateway::new(
            vec![Err(AppError::ExternalApiError("down".to_string()))],
            TradeStatus::Pending,
        ));
        let (svc, _) = service(Some(gateway.clone()), &store);

        // 查询失败不影响撤销
        let resp = svc
            .cancel(CancelPaymentRequest {
                out_trade_no: "X1".to_string(),
                channel: Some(PaymentChannel::Alipay),
            })
            .await
            .unwrap();
        assert!(resp.cancelled);
        assert_eq!(gateway.queries.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.cancels.load(Ordering::SeqCst), 1);

        let err = svc
            .cancel(CancelPaymentRequest {
                out_trade_no: "X2".to_string(),
                channel: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_cancel_surfaces_cancel_error() {
        let store = PaymentOutcomeStore::new();
        let mut gateway = ScriptedGateway::always(TradeStatus::Pending);
        gateway.cancel_fails = true;
        let (svc, _) = service(Some(Arc::new(gateway)), &store);

        let err = svc
            .cancel(CancelPaymentRequest {
                out_trade_no: "X3".to_string(),
                channel: Some(PaymentChannel::Alipay),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ExternalApiError(_)));
    }

    #[tokio::test]
    async fn test_resolve_openid() {
        let store = PaymentOutcomeStore::new();
        let (svc, _) = service(None, &store);

        let err = svc
            .resolve_openid(WechatOpenIdRequest { code: "good-code".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));

        let svc = svc.with_openid_resolver(Arc::new(FixedResolver));
        let resp = svc
            .resolve_openid(WechatOpenIdRequest { code: " good-code ".to_string() })
            .await
            .unwrap();
        assert_eq!(resp.openid, "o-payer-1");

        assert!(matches!(
            svc.resolve_openid(WechatOpenIdRequest { code: "expired".to_string() }).await,
            Err(AppError::ExternalApiError(_))
        ));
        assert!(matches!(
            svc.resolve_openid(WechatOpenIdRequest { code: "  ".to_string() }).await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_wechat_order_recorded_under_gateway_channel() {
        let store = PaymentOutcomeStore::new();
        let reconciler =
            PaymentReconciler::with_policy(store.clone(), 3, std::time::Duration::from_millis(1));
        let mut wechat = ScriptedGateway::always(TradeStatus::Success);
        wechat.channel = PaymentChannel::Wechat;
        let svc = PaymentService::new(
            None,
            Some(Arc::new(wechat)),
            store.clone(),
            reconciler.clone(),
            &PaymentConfig::default(),
            "/payment/notify",
        );

        let resp = svc
            .create_wechat_jsapi(WechatJsapiRequest {
                openid: "o-payer-1".to_string(),
                amount: 500,
                description: None,
            })
            .await
            .unwrap();
        assert_eq!(resp.channel, PaymentChannel::Wechat);
        assert_eq!(
            store.get(&resp.out_trade_no).await.unwrap().channel,
            PaymentChannel::Wechat
        );
        reconciler.join_all().await;
    }

    #[tokio::test]
    async fn test_gateway_in_wrong_slot_is_rejected() {
        let store = PaymentOutcomeStore::new();
        let reconciler =
            PaymentReconciler::with_policy(store.clone(), 3, std::time::Duration::from_millis(1));
        // ScriptedGateway 默认是支付宝
        let svc = PaymentService::new(
            None,
            Some(Arc::new(ScriptedGateway::always(TradeStatus::Success))),
            store.clone(),
            reconciler,
            &PaymentConfig::default(),
            "/payment/notify",
        );

        let err = svc
            .create_wechat_jsapi(WechatJsapiRequest {
                openid: "o-payer-1".to_string(),
                amount: 500,
                description: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
        assert_eq!(store.len().await, 0);
    }
}
