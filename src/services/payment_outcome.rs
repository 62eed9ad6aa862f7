use crate::models::{PaymentChannel, PaymentOutcome};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 一笔进行中的交易
#[derive(Debug, Clone)]
pub struct PaymentRecord {
    pub trade_ref: String,
    pub channel: PaymentChannel,
    /// 金额(分)
    pub amount_cents: i64,
    pub outcome: PaymentOutcome,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// 对账任务结束时间，之后保留一段时间供客户端查询
    pub settled_at: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    pub fn pending(
        trade_ref: impl Into<String>,
        channel: PaymentChannel,
        amount_cents: i64,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            trade_ref: trade_ref.into(),
            channel,
            amount_cents,
            outcome: PaymentOutcome::Pending,
            created_at,
            expires_at,
            settled_at: None,
        }
    }
}

/// 按订单号保存对账结果
///
/// 结果只由该订单号的对账任务写入，处理器只插入和读取。
#[derive(Clone, Default)]
pub struct PaymentOutcomeStore {
    records: Arc<RwLock<HashMap<String, PaymentRecord>>>,
}

impl PaymentOutcomeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: PaymentRecord) {
        self.records
            .write()
            .await
            .insert(record.trade_ref.clone(), record);
    }

    pub async fn get(&self, trade_ref: &str) -> Option<PaymentRecord> {
        self.records.read().await.get(trade_ref).cloned()
    }

    pub async fn outcome(&self, trade_ref: &str) -> Option<PaymentOutcome> {
        self.records.read().await.get(trade_ref).map(|r| r.outcome)
    }

    pub async fn set_outcome(&self, trade_ref: &str, outcome: PaymentOutcome) {
        if let Some(record) = self.records.write().await.get_mut(trade_ref) {
            record.outcome = outcome;
        }
    }

    pub async fn mark_settled(&self, trade_ref: &str, now: DateTime<Utc>) {
        if let Some(record) = self.records.write().await.get_mut(trade_ref) {
            record.settled_at.get_or_insert(now);
        }
    }

    /// 清理结束超过 `retention` 的记录，返回清理数量
    pub async fn purge_settled(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| match r.settled_at {
            Some(settled_at) => now.signed_duration_since(settled_at) < retention,
            None => true,
        });
        before - records.len()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}
