//! 邮箱验证码
//!
//! 每个邮箱最多一个有效验证码，重新发送会覆盖旧码；验证成功即作废 (一次性)，
//! 过期的验证码在查询时删除，并由后台任务定期清理。

use crate::config::VerificationConfig;
use crate::error::{AppError, AppResult};
use crate::external::EmailSender;
use crate::models::SendCodeResponse;
use crate::utils::{generate_six_digit_code, normalize_email, validate_email};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub const INVALID_CODE_MESSAGE: &str = "验证码不存在或已过期";

#[derive(Debug, Clone, PartialEq)]
pub struct VerificationEntry {
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// 投递失败的验证码不计入重发间隔
    pub delivered: bool,
}

impl VerificationEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// 进程内验证码存储，key 为规范化后的邮箱
#[derive(Clone, Default)]
pub struct VerificationCodeStore {
    entries: Arc<RwLock<HashMap<String, VerificationEntry>>>,
}

impl VerificationCodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 生成并保存新验证码，覆盖旧码
    ///
    /// 距上次成功发送不足 `resend_interval` 时拒绝。检查与写入在同一把写锁内完成。
    pub async fn issue(
        &self,
        recipient: &str,
        now: DateTime<Utc>,
        ttl: Duration,
        resend_interval: Duration,
    ) -> AppResult<VerificationEntry> {
        let mut entries = self.entries.write().await;

        if let Some(prev) = entries.get(recipient) {
            let elapsed = now.signed_duration_since(prev.issued_at);
            if prev.delivered && !prev.is_expired(now) && elapsed < resend_interval {
                let wait = (resend_interval - elapsed).num_seconds().max(1);
                return Err(AppError::ValidationError(format!(
                    "验证码发送过于频繁，请 {wait} 秒后重试"
                )));
            }
        }

        let entry = VerificationEntry {
            code: generate_six_digit_code(),
            issued_at: now,
            expires_at: now + ttl,
            delivered: true,
        };
        entries.insert(recipient.to_string(), entry.clone());
        Ok(entry)
    }

    /// 邮件投递失败后调用：验证码保留，但允许立即重发
    pub async fn mark_undelivered(&self, recipient: &str, code: &str) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(recipient) {
            if entry.code == code {
                entry.delivered = false;
            }
        }
    }

    /// 校验验证码，成功后删除
    pub async fn verify(&self, recipient: &str, candidate: &str, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries.write().await;

        let Some(entry) = entries.get(recipient) else {
            return false;
        };
        if entry.is_expired(now) {
            entries.remove(recipient);
            return false;
        }
        if entry.code != candidate {
            return false;
        }

        entries.remove(recipient);
        true
    }

    pub async fn get(&self, recipient: &str) -> Option<VerificationEntry> {
        self.entries.read().await.get(recipient).cloned()
    }

    /// 删除所有已过期的验证码，返回删除数量
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[derive(Clone)]
pub struct VerificationService {
    store: VerificationCodeStore,
    mailer: Arc<dyn EmailSender>,
    ttl: Duration,
    resend_interval: Duration,
}

impl VerificationService {
    pub fn new(mailer: Arc<dyn EmailSender>, config: &VerificationConfig) -> Self {
        Self {
            store: VerificationCodeStore::new(),
            mailer,
            ttl: Duration::seconds(config.code_ttl_secs),
            resend_interval: Duration::seconds(config.resend_interval_secs),
        }
    }

    pub fn store(&self) -> &VerificationCodeStore {
        &self.store
    }

    pub async fn send_code(&self, email: &str) -> AppResult<SendCodeResponse> {
        self.send_code_at(email, Utc::now()).await
    }

    /// 先保存再发送；发送失败时错误返回给调用方，已保存的验证码仍然有效，且可立即重发
    pub async fn send_code_at(&self, email: &str, now: DateTime<Utc>) -> AppResult<SendCodeResponse> {
        let email = normalize_email(email);
        validate_email(&email)?;

        let entry = self
            .store
            .issue(&email, now, self.ttl, self.resend_interval)
            .await?;

        if let Err(e) = self.mailer.send_verification_email(&email, &entry.code).await {
            self.store.mark_undelivered(&email, &entry.code).await;
            return Err(match e {
                AppError::ExternalApiError(_) | AppError::ConfigError(_) => e,
                other => AppError::ExternalApiError(other.to_string()),
            });
        }

        Ok(SendCodeResponse {
            email,
            expires_in: self.ttl.num_seconds(),
        })
    }

    /// 校验并消费验证码，失败统一返回 401
    pub async fn verify_code(&self, email: &str, code: &str) -> AppResult<()> {
        self.verify_code_at(email, code, Utc::now()).await
    }

    pub async fn verify_code_at(&self, email: &str, code: &str, now: DateTime<Utc>) -> AppResult<()> {
        let email = normalize_email(email);
        if self.store.verify(&email, code.trim(), now).await {
            Ok(())
        } else {
            Err(AppError::AuthError(INVALID_CODE_MESSAGE.to_string()))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// 记录发出的邮件，可配置为发送失败
    #[derive(Default)]
    pub(crate) struct RecordingMailer {
        pub sent: Mutex<Vec<(String, String)>>,
        pub fail: AtomicBool,
    }

    impl RecordingMailer {
        pub(crate) fn last_code(&self) -> Option<String> {
            self.sent.lock().unwrap().last().map(|(_, c)| c.clone())
        }
    }

    #[async_trait]
    impl EmailSender for RecordingMailer {
        async fn send_verification_email(&self, recipient: &str, code: &str) -> AppResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(AppError::ExternalApiError("smtp relay down".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), code.to_string()));
            Ok(())
        }
    }

    fn service(mailer: Arc<RecordingMailer>) -> VerificationService {
        VerificationService::new(mailer, &VerificationConfig::default())
    }

    #[tokio::test]
    async fn test_issue_then_verify_succeeds_once() {
        let mailer = Arc::new(RecordingMailer::default());
        let svc = service(mailer.clone());
        let now = Utc::now();

        let resp = svc.send_code_at(" Alice@Example.com", now).await.unwrap();
        assert_eq!(resp.email, "alice@example.com");
        assert_eq!(resp.expires_in, 600);

        let code = mailer.last_code().unwrap();
        assert_eq!(code.len(), 6);

        assert!(svc.verify_code_at("alice@example.com", &code, now).await.is_ok());
        // 一次性
        assert!(svc.verify_code_at("alice@example.com", &code, now).await.is_err());
    }

    #[tokio::test]
    async fn test_expired_code_fails_and_is_removed() {
        let store = VerificationCodeStore::new();
        let now = Utc::now();
        let entry = store
            .issue("bob@example.com", now, Duration::seconds(600), Duration::seconds(60))
            .await
            .unwrap();

        let later = now + Duration::seconds(601);
        assert!(!store.verify("bob@example.com", &entry.code, later).await);
        assert!(store.get("bob@example.com").await.is_none());
    }

    #[tokio::test]
    async fn test_mismatch_keeps_entry() {
        let store = VerificationCodeStore::new();
        let now = Utc::now();
        let entry = store
            .issue("c@example.com", now, Duration::seconds(600), Duration::seconds(60))
            .await
            .unwrap();
        let wrong = if entry.code == "000000" { "000001" } else { "000000" };

        assert!(!store.verify("c@example.com", wrong, now).await);
        assert!(!store.verify("nobody@example.com", &entry.code, now).await);
        assert!(store.verify("c@example.com", &entry.code, now).await);
    }

    #[tokio::test]
    async fn test_reissue_overwrites_after_interval() {
        let store = VerificationCodeStore::new();
        let now = Utc::now();
        let ttl = Duration::seconds(600);
        let interval = Duration::seconds(60);

        let first = store.issue("d@example.com", now, ttl, interval).await.unwrap();
        assert!(matches!(
            store.issue("d@example.com", now + Duration::seconds(10), ttl, interval).await,
            Err(AppError::ValidationError(_))
        ));

        let second = store
            .issue("d@example.com", now + Duration::seconds(61), ttl, interval)
            .await
            .unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("d@example.com").await.unwrap(), second);
        assert_eq!(second.expires_at, now + Duration::seconds(661));
        if first.code != second.code {
            assert!(!store.verify("d@example.com", &first.code, now + Duration::seconds(62)).await);
        }
    }

    #[tokio::test]
    async fn test_delivery_failure_is_surfaced() {
        let mailer = Arc::new(RecordingMailer {
            fail: AtomicBool::new(true),
            ..Default::default()
        });
        let svc = service(mailer);
        let now = Utc::now();

        let err = svc.send_code_at("e@example.com", now).await.unwrap_err();
        assert!(matches!(err, AppError::ExternalApiError(_)));
        // 先保存后发送
        assert!(svc.store().get("e@example.com").await.is_some());
    }

    #[tokio::test]
    async fn test_retry_allowed_right_after_failed_delivery() {
        let mailer = Arc::new(RecordingMailer {
            fail: AtomicBool::new(true),
            ..Default::default()
        });
        let svc = service(mailer.clone());
        let now = Utc::now();

        let err = svc.send_code_at("p@example.com", now).await.unwrap_err();
        assert!(matches!(err, AppError::ExternalApiError(_)));
        assert!(!svc.store().get("p@example.com").await.unwrap().delivered);

        mailer.fail.store(false, Ordering::SeqCst);
        let retry = svc.send_code_at("p@example.com", now + Duration::seconds(2)).await;
        assert!(retry.is_ok());

        // 投递成功后恢复限频
        let again = svc.send_code_at("p@example.com", now + Duration::seconds(4)).await;
        assert!(matches!(again, Err(AppError::ValidationError(_))));

        let code = mailer.last_code().unwrap();
        assert!(svc.verify_code_at("p@example.com", &code, now + Duration::seconds(5)).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_email_rejected() {
        let svc = service(Arc::new(RecordingMailer::default()));
        let err = svc.send_code("not-an-email").await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert_eq!(svc.store().len().await, 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = VerificationCodeStore::new();
        let now = Utc::now();
        let interval = Duration::seconds(60);
        store.issue("a@x.com", now, Duration::seconds(10), interval).await.unwrap();
        store.issue("b@x.com", now, Duration::seconds(600), interval).await.unwrap();

        assert_eq!(store.purge_expired(now + Duration::seconds(11)).await, 1);
        assert!(store.get("b@x.com").await.is_some());
    }
}
