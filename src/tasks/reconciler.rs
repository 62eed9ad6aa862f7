//! 支付对账任务
//!
//! 下单后为每个订单号启动一个任务，按固定间隔查询网关:
//! - 查询出错: 结果置为 Unknown，不再重试
//! - 支付成功 / 交易关闭: 写入终态后结束
//! - 其他: 计数加一，等待下一轮
//!
//! 查询次数耗尽仍未到终态时撤销一次交易，撤销结果只记日志，结果保持 Pending。
//! 所有任务放在同一个 `JoinSet` 中，收到关闭信号后停止等待并把结果置为 Unknown。

use crate::config::PaymentConfig;
use crate::external::{PaymentGateway, TradeStatus};
use crate::models::PaymentOutcome;
use crate::services::PaymentOutcomeStore;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

#[derive(Clone)]
pub struct PaymentReconciler {
    inner: Arc<Inner>,
}

struct Inner {
    outcomes: PaymentOutcomeStore,
    max_attempts: u32,
    interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<JoinSet<()>>,
}

struct Poll {
    gateway: Arc<dyn PaymentGateway>,
    trade_ref: String,
    outcomes: PaymentOutcomeStore,
    max_attempts: u32,
    interval: Duration,
}

impl PaymentReconciler {
    pub fn new(outcomes: PaymentOutcomeStore, config: &PaymentConfig) -> Self {
        Self::with_policy(
            outcomes,
            config.poll_max_attempts,
            Duration::from_secs(config.poll_interval_secs),
        )
    }

    /// 查询次数至少为 1，否则订单未经查询就会被撤销
    pub fn with_policy(outcomes: PaymentOutcomeStore, max_attempts: u32, interval: Duration) -> Self {
        if max_attempts == 0 {
            log::warn!("payment.poll_max_attempts is 0, using 1");
        }
        let max_attempts = max_attempts.max(1);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                outcomes,
                max_attempts,
                interval,
                shutdown_tx,
                tasks: Mutex::new(JoinSet::new()),
            }),
        }
    }

    fn tasks(&self) -> std::sync::MutexGuard<'_, JoinSet<()>> {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 为订单号启动对账任务
    pub fn spawn(&self, gateway: Arc<dyn PaymentGateway>, trade_ref: String) {
        let shutdown_rx = self.inner.shutdown_tx.subscribe();
        let poll = Poll {
            gateway,
            trade_ref,
            outcomes: self.inner.outcomes.clone(),
            max_attempts: self.inner.max_attempts,
            interval: self.inner.interval,
        };

        let mut tasks = self.tasks();
        // 回收已结束的任务
        while let Some(res) = tasks.try_join_next() {
            if let Err(e) = res {
                log::error!("Payment reconciliation task failed: {e}");
            }
        }
        tasks.spawn(async move {
            poll.run(shutdown_rx).await;
        });
    }

    /// 订阅关闭信号，供其他后台任务使用
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown_tx.subscribe()
    }

    pub fn in_flight(&self) -> usize {
        self.tasks().len()
    }

    /// 通知所有任务停止并等待其退出
    pub async fn shutdown(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        log::info!(
            "Stopping payment reconciliation, {} task(s) in flight",
            self.in_flight()
        );
        self.join_all().await;
    }

    pub(crate) async fn join_all(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks());
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                log::error!("Payment reconciliation task failed: {e}");
            }
        }
    }
}

impl Poll {
    async fn run(self, shutdown_rx: watch::Receiver<bool>) -> PaymentOutcome {
        let outcome = self.reconcile(shutdown_rx).await;
        self.outcomes.mark_settled(&self.trade_ref, Utc::now()).await;
        outcome
    }

    async fn finish(&self, outcome: PaymentOutcome) -> PaymentOutcome {
        self.outcomes.set_outcome(&self.trade_ref, outcome).await;
        outcome
    }

    async fn reconcile(&self, mut shutdown_rx: watch::Receiver<bool>) -> PaymentOutcome {
        let trade_ref = self.trade_ref.as_str();

        if *shutdown_rx.borrow() {
            return self.finish(PaymentOutcome::Unknown).await;
        }

        let mut attempt = 0;
        while attempt < self.max_attempts {
            match self.gateway.query_status(trade_ref).await {
                Err(e) => {
                    log::error!("Failed to query payment {trade_ref}: {e}");
                    return self.finish(PaymentOutcome::Unknown).await;
                }
                Ok(TradeStatus::Success) => {
                    log::info!("Payment {trade_ref} succeeded");
                    return self.finish(PaymentOutcome::Succeeded).await;
                }
                Ok(TradeStatus::Closed) => {
                    log::info!("Payment {trade_ref} closed");
                    return self.finish(PaymentOutcome::Closed).await;
                }
                Ok(TradeStatus::Pending) => {
                    attempt += 1;
                    log::debug!(
                        "Payment {trade_ref} still pending ({attempt}/{})",
                        self.max_attempts
                    );
                }
            }

            if attempt >= self.max_attempts {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown_rx.changed() => {
                    log::warn!("Payment {trade_ref} reconciliation interrupted by shutdown");
                    return self.finish(PaymentOutcome::Unknown).await;
                }
            }
        }

        // 次数耗尽，撤销一次，结果只记录
        match self.gateway.cancel_transaction(trade_ref).await {
            Ok(()) => log::info!("Payment {trade_ref} cancelled after {attempt} attempts"),
            Err(e) => log::warn!("Failed to cancel payment {trade_ref}: {e}"),
        }
        PaymentOutcome::Pending
    }
}
