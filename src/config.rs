use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub alipay: AlipayConfig,
    #[serde(default)]
    pub wechat: WechatConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub redeem: RedeemConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expires_in: i64,  // seconds
    pub refresh_token_expires_in: i64, // seconds
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: "change-me-in-production".to_string(),
            access_token_expires_in: 7200,
            refresh_token_expires_in: 2_592_000,
        }
    }
}

/// 事务邮件 HTTP 接口 (验证码邮件)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from_address: String,
    #[serde(default)]
    pub from_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AlipayConfig {
    pub app_id: String,
    /// 应用私钥 (PKCS#1 / PKCS#8, PEM 或裸 base64)
    pub private_key: String,
    /// 支付宝公钥，为空时不校验响应签名
    #[serde(default)]
    pub alipay_public_key: String,
    #[serde(default)]
    pub sandbox: bool,
    /// 回调域名，与下单请求中的通知路径拼接
    #[serde(default)]
    pub domain: String,
}

impl AlipayConfig {
    pub fn is_enabled(&self) -> bool {
        !self.app_id.is_empty() && !self.private_key.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WechatConfig {
    pub app_id: String,
    /// 小程序 AppSecret，用于 code 换 openid
    pub app_secret: String,
    pub mch_id: String,
    /// 商户 API 证书序列号
    pub mch_serial_no: String,
    /// 商户 API 私钥文件路径 (apiclient_key.pem)
    pub private_key_path: String,
    /// 回调域名，例如 https://www.staykoi.asia
    pub domain: String,
    pub notify_path: String,
}

impl Default for WechatConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_secret: String::new(),
            mch_id: String::new(),
            mch_serial_no: String::new(),
            private_key_path: String::new(),
            domain: String::new(),
            notify_path: "/payment/notify".to_string(),
        }
    }
}

impl WechatConfig {
    pub fn is_enabled(&self) -> bool {
        !self.app_id.is_empty() && !self.mch_id.is_empty() && !self.private_key_path.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    /// 每笔交易最多查询次数
    pub poll_max_attempts: u32,
    pub poll_interval_secs: u64,
    pub transaction_expire_minutes: i64,
    /// 交易结束后结果保留时长
    pub outcome_retention_secs: i64,
    pub sweep_interval_secs: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            poll_max_attempts: 20,
            poll_interval_secs: 3,
            transaction_expire_minutes: 30,
            outcome_retention_secs: 1800,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub code_ttl_secs: i64,
    pub resend_interval_secs: i64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            code_ttl_secs: 600,
            resend_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedeemConfig {
    pub generation_max_attempts: u32,
    pub max_batch_size: u32,
}

impl Default for RedeemConfig {
    fn default() -> Self {
        Self {
            generation_max_attempts: 10,
            max_batch_size: 500,
        }
    }
}

fn get_env(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // 尝试读取配置文件，如果不存在则完全依赖环境变量
        let mut config: Config = match std::fs::read_to_string(&config_path) {
            Ok(config_str) => Self::from_toml_str(&config_str)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // 数据库 URL 在无配置文件时必须提供
                let database_url = get_env("DATABASE_URL")
                    .ok_or("DATABASE_URL is not set and config.toml was not found")?;

                Config {
                    server: ServerConfig {
                        host: "0.0.0.0".to_string(),
                        port: 8080,
                    },
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: 10,
                    },
                    jwt: JwtConfig::default(),
                    mail: MailConfig::default(),
                    alipay: AlipayConfig::default(),
                    wechat: WechatConfig::default(),
                    payment: PaymentConfig::default(),
                    verification: VerificationConfig::default(),
                    redeem: RedeemConfig::default(),
                }
            }
            Err(e) => {
                return Err(format!("Failed to read config file {config_path}: {e}").into());
            }
        };

        // 环境变量覆盖（即便文件存在时也覆盖）
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml_str(config_str: &str) -> Result<Self, Box<dyn std::error::Error>> {
        toml::from_str(config_str).map_err(|e| format!("Failed to parse config file: {e}").into())
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = get_env("SERVER_HOST") {
            self.server.host = v;
        }
        if let Some(p) = get_env_parse("SERVER_PORT") {
            self.server.port = p;
        }
        if let Some(v) = get_env("DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(mc) = get_env_parse("DB_MAX_CONNECTIONS") {
            self.database.max_connections = mc;
        }
        if let Some(v) = get_env("JWT_SECRET") {
            self.jwt.secret = v;
        }
        if let Some(n) = get_env_parse("JWT_ACCESS_EXPIRES_IN") {
            self.jwt.access_token_expires_in = n;
        }
        if let Some(n) = get_env_parse("JWT_REFRESH_EXPIRES_IN") {
            self.jwt.refresh_token_expires_in = n;
        }

        // Mail
        if let Some(v) = get_env("MAIL_API_URL") {
            self.mail.api_url = v;
        }
        if let Some(v) = get_env("MAIL_API_KEY") {
            self.mail.api_key = v;
        }
        if let Some(v) = get_env("MAIL_FROM_ADDRESS") {
            self.mail.from_address = v;
        }
        if let Some(v) = get_env("MAIL_FROM_NAME") {
            self.mail.from_name = Some(v);
        }

        // Alipay
        if let Some(v) = get_env("ALIPAY_APP_ID") {
            self.alipay.app_id = v;
        }
        if let Some(v) = get_env("ALIPAY_PRIVATE_KEY") {
            self.alipay.private_key = v;
        }
        if let Some(v) = get_env("ALIPAY_PUBLIC_KEY") {
            self.alipay.alipay_public_key = v;
        }
        if let Some(b) = get_env_parse("ALIPAY_SANDBOX") {
            self.alipay.sandbox = b;
        }
        if let Some(v) = get_env("ALIPAY_DOMAIN") {
            self.alipay.domain = v;
        }

        // WeChat Pay
        if let Some(v) = get_env("WECHAT_APP_ID") {
            self.wechat.app_id = v;
        }
        if let Some(v) = get_env("WECHAT_APP_SECRET") {
            self.wechat.app_secret = v;
        }
        if let Some(v) = get_env("WECHAT_MCH_ID") {
            self.wechat.mch_id = v;
        }
        if let Some(v) = get_env("WECHAT_MCH_SERIAL_NO") {
            self.wechat.mch_serial_no = v;
        }
        if let Some(v) = get_env("WECHAT_PRIVATE_KEY_PATH") {
            self.wechat.private_key_path = v;
        }
        if let Some(v) = get_env("WECHAT_DOMAIN") {
            self.wechat.domain = v;
        }
        if let Some(v) = get_env("WECHAT_NOTIFY_PATH") {
            self.wechat.notify_path = v;
        }

        // Payment polling
        if let Some(n) = get_env_parse("PAYMENT_POLL_MAX_ATTEMPTS") {
            self.payment.poll_max_attempts = n;
        }
        if let Some(n) = get_env_parse("PAYMENT_POLL_INTERVAL_SECS") {
            self.payment.poll_interval_secs = n;
        }
        if let Some(n) = get_env_parse("PAYMENT_TRANSACTION_EXPIRE_MINUTES") {
            self.payment.transaction_expire_minutes = n;
        }
        if let Some(n) = get_env_parse("PAYMENT_OUTCOME_RETENTION_SECS") {
            self.payment.outcome_retention_secs = n;
        }

        // Verification codes
        if let Some(n) = get_env_parse("VERIFICATION_CODE_TTL_SECS") {
            self.verification.code_ttl_secs = n;
        }
        if let Some(n) = get_env_parse("VERIFICATION_RESEND_INTERVAL_SECS") {
            self.verification.resend_interval_secs = n;
        }

        if let Some(n) = get_env_parse("REDEEM_GENERATION_MAX_ATTEMPTS") {
            self.redeem.generation_max_attempts = n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config = Config::from_toml_str(
            r#"
            [server]
            host = "127.0.0.1"
            port = 9000

            [database]
            url = "postgres://localhost/stay"
            max_connections = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.payment.poll_max_attempts, 20);
        assert_eq!(config.payment.poll_interval_secs, 3);
        assert_eq!(config.verification.code_ttl_secs, 600);
        assert_eq!(config.redeem.generation_max_attempts, 10);
        assert_eq!(config.wechat.notify_path, "/payment/notify");
        assert!(!config.alipay.is_enabled());
        assert!(!config.wechat.is_enabled());
    }

    #[test]
    fn test_partial_section_merges_with_defaults() {
        let config = Config::from_toml_str(
            r#"
            [server]
            host = "127.0.0.1"
            port = 9000

            [database]
            url = "postgres://localhost/stay"
            max_connections = 5

            [payment]
            poll_max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.payment.poll_max_attempts, 5);
        assert_eq!(config.payment.poll_interval_secs, 3);
    }
}
