use crate::config::MailConfig;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

/// 验证码邮件投递
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_verification_email(&self, recipient: &str, code: &str) -> AppResult<()>;
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SendMailRequest<'a> {
    from: Address<'a>,
    to: Vec<Address<'a>>,
    subject: &'a str,
    text: String,
    html: String,
}

/// 通过事务邮件服务的 HTTP 接口发信 (Bearer API key)
#[derive(Clone)]
pub struct HttpMailer {
    client: Client,
    config: MailConfig,
}

impl HttpMailer {
    pub fn new(config: MailConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn build_message<'a>(&'a self, recipient: &'a str, code: &str) -> SendMailRequest<'a> {
        SendMailRequest {
            from: Address {
                email: &self.config.from_address,
                name: self.config.from_name.as_deref(),
            },
            to: vec![Address {
                email: recipient,
                name: None,
            }],
            subject: "Stay 验证码",
            text: format!("您的验证码是 {code}，请在有效期内使用。"),
            html: format!("<p>您的验证码是 <b>{code}</b>，请在有效期内使用。</p>"),
        }
    }
}

#[async_trait]
impl EmailSender for HttpMailer {
    async fn send_verification_email(&self, recipient: &str, code: &str) -> AppResult<()> {
        if self.config.api_url.is_empty() {
            return Err(AppError::ConfigError("Mail API is not configured".to_string()));
        }

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&self.build_message(recipient, code))
            .send()
            .await?;

        if response.status().is_success() {
            log::info!("Verification email sent: {recipient}");
            Ok(())
        } else {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            log::error!("Verification email failed: {recipient}, HTTP {status}: {error_text}");
            Err(AppError::ExternalApiError(format!(
                "Email sending failed: {error_text}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_contains_code() {
        let mailer = HttpMailer::new(MailConfig {
            api_url: "https://mail.example.com/send".to_string(),
            api_key: "key".to_string(),
            from_address: "noreply@example.com".to_string(),
            from_name: Some("Stay".to_string()),
        });
        let msg = serde_json::to_value(mailer.build_message("a@example.com", "012345")).unwrap();
        assert_eq!(msg["to"][0]["email"], "a@example.com");
        assert_eq!(msg["from"]["name"], "Stay");
        assert!(msg["text"].as_str().unwrap().contains("012345"));
    }

    #[tokio::test]
    async fn test_unconfigured_mailer_fails() {
        let mailer = HttpMailer::new(MailConfig::default());
        let err = mailer
            .send_verification_email("a@example.com", "000000")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }
}
