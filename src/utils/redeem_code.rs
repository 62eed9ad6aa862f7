use crate::error::{AppError, AppResult};
use crate::utils::code_generator::random_redeem_code;
use async_trait::async_trait;

/// 查询兑换码是否已被占用
///
/// 生产环境由数据库实现 (见 `services::redeem_service::DbCodeRegistry`)，
/// 测试中可以替换为内存实现。
#[async_trait]
pub trait CodeRegistry: Send + Sync {
    async fn exists(&self, code: &str) -> AppResult<bool>;
}

/// 生成唯一兑换码，碰撞则整体重抽，超过 `max_attempts` 次返回 `GenerationExhausted`
pub async fn generate_unique_redeem_code<R>(registry: &R, max_attempts: u32) -> AppResult<String>
where
    R: CodeRegistry + ?Sized,
{
    generate_unique_with(registry, max_attempts, random_redeem_code).await
}

pub(crate) async fn generate_unique_with<R, F>(
    registry: &R,
    max_attempts: u32,
    mut draw: F,
) -> AppResult<String>
where
    R: CodeRegistry + ?Sized,
    F: FnMut() -> String,
{
    for attempt in 1..=max_attempts {
        let code = draw();
        if !registry.exists(&code).await? {
            return Ok(code);
        }
        log::warn!("Redeem code collision on attempt {attempt}/{max_attempts}");
    }

    Err(AppError::GenerationExhausted {
        attempts: max_attempts,
    })
}
