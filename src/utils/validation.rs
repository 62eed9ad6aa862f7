use crate::error::{AppError, AppResult};
use regex::Regex;
use std::sync::OnceLock;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
            .unwrap_or_else(|e| panic!("invalid email regex: {e}"))
    })
}

/// 邮箱统一去空格转小写，作为验证码存储的 key
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// 验证邮箱格式 (传入已规范化的邮箱)
pub fn validate_email(email: &str) -> AppResult<()> {
    if email.len() > 254 || !email_regex().is_match(email) {
        return Err(AppError::ValidationError("邮箱格式无效".to_string()));
    }
    Ok(())
}

/// 用户名 2-32 位，只允许字母、数字、下划线和中文
pub fn validate_username(username: &str) -> AppResult<()> {
    let len = username.chars().count();
    if !(2..=32).contains(&len) {
        return Err(AppError::ValidationError(
            "用户名长度必须在2-32字符之间".to_string(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_')
    {
        return Err(AppError::ValidationError(
            "用户名只能包含字母、数字和下划线".to_string(),
        ));
    }
    Ok(())
}
