//! 后台任务
//!
//! - `reconciler`: 每笔支付一个对账任务，由 `PaymentReconciler` 统一管理
//! - `spawn_all`: 周期性清理过期验证码与已结束的支付记录，启动时调用一次

pub mod reconciler;

pub use reconciler::PaymentReconciler;

use crate::config::PaymentConfig;
use crate::services::{PaymentOutcomeStore, VerificationCodeStore};
use chrono::{Duration, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// 启动定期清理任务，收到关闭信号后退出
pub fn spawn_all(
    outcomes: PaymentOutcomeStore,
    verification_codes: VerificationCodeStore,
    config: &PaymentConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let retention = Duration::seconds(config.outcome_retention_secs);
    let every = std::time::Duration::from_secs(config.sweep_interval_secs.max(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.changed() => break,
            }
            let now = Utc::now();

            let purged = outcomes.purge_settled(now, retention).await;
            if purged > 0 {
                log::info!("Purged settled payment records: {purged}");
            }

            let expired = verification_codes.purge_expired(now).await;
            if expired > 0 {
                log::debug!("Purged expired verification codes: {expired}");
            }
        }
        log::info!("Sweeper stopped");
    })
}
