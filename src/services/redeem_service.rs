//! 兑换码: 批量生成、后台管理与核销
//!
//! 核销只用一条条件 UPDATE 完成状态切换，受影响行数为 1 才算成功，
//! 失败后再读一次记录区分"不存在 / 已核销 / 不在有效期内"。

use crate::config::RedeemConfig;
use crate::database::DbPool;
use crate::entities::{RedeemStatus, redeem_code_entity as codes};
use crate::error::{AppError, AppResult};
use crate::models::{
    CreateRedeemCodesRequest, PaginatedRedeemCodes, PaginatedResponse, PaginationParams,
    RedeemCodeQuery, RedeemCodeResponse, UpdateRedeemCodeRequest,
};
use crate::utils::{CodeRegistry, generate_unique_redeem_code};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

/// 基于 redeem_codes 表的唯一性检查，可在事务内使用
pub struct DbCodeRegistry<'a, C> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> DbCodeRegistry<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl<C> CodeRegistry for DbCodeRegistry<'_, C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn exists(&self, code: &str) -> AppResult<bool> {
        let count = codes::Entity::find()
            .filter(codes::Column::Code.eq(code))
            .count(self.conn)
            .await?;
        Ok(count > 0)
    }
}

fn validate_window(start: DateTime<Utc>, end: DateTime<Utc>) -> AppResult<()> {
    if start >= end {
        return Err(AppError::ValidationError(
            "start_time must be earlier than end_time".to_string(),
        ));
    }
    Ok(())
}

fn validate_price(price: i64) -> AppResult<()> {
    if price < 0 {
        return Err(AppError::ValidationError("price must not be negative".to_string()));
    }
    Ok(())
}

fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[derive(Clone)]
pub struct RedeemService {
    pool: DbPool,
    max_attempts: u32,
    max_batch_size: u32,
}

impl RedeemService {
    pub fn new(pool: DbPool, config: &RedeemConfig) -> Self {
        Self {
            pool,
            max_attempts: config.generation_max_attempts,
            max_batch_size: config.max_batch_size,
        }
    }

    /// 批量生成，同一事务内插入，批内的新码也参与唯一性检查
    pub async fn create_batch(
        &self,
        req: CreateRedeemCodesRequest,
    ) -> AppResult<Vec<RedeemCodeResponse>> {
        let product_name = req.product_name.trim().to_string();
        if product_name.is_empty() {
            return Err(AppError::ValidationError("product_name is required".to_string()));
        }
        if req.count == 0 || req.count > self.max_batch_size {
            return Err(AppError::ValidationError(format!(
                "count must be between 1 and {}",
                self.max_batch_size
            )));
        }
        validate_window(req.start_time, req.end_time)?;
        validate_price(req.price)?;

        let now = Utc::now();
        let txn = self.pool.begin().await?;
        let mut created = Vec::with_capacity(req.count as usize);

        for _ in 0..req.count {
            let code =
                generate_unique_redeem_code(&DbCodeRegistry::new(&txn), self.max_attempts).await?;

            let model = codes::ActiveModel {
                code: Set(code),
                product_name: Set(product_name.clone()),
                status: Set(RedeemStatus::Pending),
                start_time: Set(req.start_time),
                end_time: Set(req.end_time),
                price: Set(req.price),
                redeemed_at: Set(None),
                created_at: Set(Some(now)),
                updated_at: Set(Some(now)),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            created.push(model.into());
        }

        txn.commit().await?;
        log::info!(
            "Created {} redeem code(s) for product {product_name}",
            created.len()
        );
        Ok(created)
    }

    pub async fn list(&self, query: &RedeemCodeQuery) -> AppResult<PaginatedRedeemCodes> {
        let params = PaginationParams::new(query.page, query.page_size);

        let mut select = codes::Entity::find();
        if let Some(status) = query.status {
            select = select.filter(codes::Column::Status.eq(status));
        }
        if let Some(name) = query.product_name.as_deref().filter(|n| !n.trim().is_empty()) {
            select = select.filter(codes::Column::ProductName.contains(name.trim()));
        }

        let total = select.clone().count(&self.pool).await?;
        let items = select
            .order_by_desc(codes::Column::Id)
            .limit(params.get_limit())
            .offset(params.get_offset())
            .all(&self.pool)
            .await?;

        Ok(PaginatedResponse::new(
            items.into_iter().map(Into::into).collect(),
            &params,
            total,
        ))
    }

    async fn find_by_id(&self, id: i64) -> AppResult<codes::Model> {
        codes::Entity::find_by_id(id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Redeem code {id} not found")))
    }

    pub async fn get(&self, id: i64) -> AppResult<RedeemCodeResponse> {
        Ok(self.find_by_id(id).await?.into())
    }

    /// 修改商品名、有效期、价格；状态和兑换码不可改
    pub async fn update(
        &self,
        id: i64,
        req: UpdateRedeemCodeRequest,
    ) -> AppResult<RedeemCodeResponse> {
        let existing = self.find_by_id(id).await?;

        let start = req.start_time.unwrap_or(existing.start_time);
        let end = req.end_time.unwrap_or(existing.end_time);
        validate_window(start, end)?;

        let mut am = existing.into_active_model();
        if let Some(name) = req.product_name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(AppError::ValidationError("product_name is required".to_string()));
            }
            am.product_name = Set(name);
        }
        if let Some(price) = req.price {
            validate_price(price)?;
            am.price = Set(price);
        }
        am.start_time = Set(start);
        am.end_time = Set(end);
        am.updated_at = Set(Some(Utc::now()));

        Ok(am.update(&self.pool).await?.into())
    }

    pub async fn delete(&self, id: i64) -> AppResult<()> {
        let res = codes::Entity::delete_by_id(id).exec(&self.pool).await?;
        if res.rows_affected == 0 {
            return Err(AppError::NotFound(format!("Redeem code {id} not found")));
        }
        Ok(())
    }

    pub async fn check_redeem(&self, code: &str) -> AppResult<RedeemCodeResponse> {
        self.check_redeem_at(code, Utc::now()).await
    }

    /// 核销: pending 且在有效期内才会被更新
    pub async fn check_redeem_at(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> AppResult<RedeemCodeResponse> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(AppError::ValidationError("code is required".to_string()));
        }

        let res = codes::Entity::update_many()
            .col_expr(codes::Column::Status, Expr::value(RedeemStatus::Redeemed))
            .col_expr(codes::Column::RedeemedAt, Expr::value(Some(now)))
            .col_expr(codes::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(codes::Column::Code.eq(code.as_str()))
            .filter(codes::Column::Status.eq(RedeemStatus::Pending))
            .filter(codes::Column::StartTime.lte(now))
            .filter(codes::Column::EndTime.gte(now))
            .exec(&self.pool)
            .await?;

        let current = codes::Entity::find()
            .filter(codes::Column::Code.eq(code.as_str()))
            .one(&self.pool)
            .await?;

        match current {
            Some(model) if res.rows_affected == 1 => {
                log::info!("Redeem code {} redeemed", model.id);
                Ok(model.into())
            }
            None => Err(AppError::NotFound("Redeem code not found".to_string())),
            Some(model) if model.status == RedeemStatus::Redeemed => Err(AppError::Conflict(
                "Redeem code already redeemed".to_string(),
            )),
            Some(model) if !model.is_within_window(now) => Err(AppError::ValidationError(
                "Redeem code is not within its validity period".to_string(),
            )),
            Some(_) => Err(AppError::Conflict(
                "Redeem code was modified concurrently".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::create_test_pool;
    use chrono::Duration;

    fn batch(count: u32, start: DateTime<Utc>, end: DateTime<Utc>) -> CreateRedeemCodesRequest {
        CreateRedeemCodesRequest {
            product_name: "抹茶拿铁".to_string(),
            count,
            start_time: start,
            end_time: end,
            price: 1800,
        }
    }

    async fn service() -> RedeemService {
        RedeemService::new(create_test_pool().await, &RedeemConfig::default())
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc::now();
        (now - Duration::days(1), now + Duration::days(30))
    }

    #[tokio::test]
    async fn test_create_batch_codes_are_unique() {
        let svc = service().await;
        let (start, end) = window();
        let created = svc.create_batch(batch(20, start, end)).await.unwrap();

        assert_eq!(created.len(), 20);
        let unique: std::collections::HashSet<_> = created.iter().map(|c| c.code.clone()).collect();
        assert_eq!(unique.len(), 20);
        assert!(created.iter().all(|c| c.status == RedeemStatus::Pending));
        assert!(created.iter().all(|c| crate::utils::is_valid_redeem_code(&c.code)));

        let registry = DbCodeRegistry::new(&svc.pool);
        assert!(registry.exists(&created[0].code).await.unwrap());
        assert!(!registry.exists("NOPE").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_batch_validation() {
        let svc = service().await;
        let (start, end) = window();
        assert!(svc.create_batch(batch(0, start, end)).await.is_err());
        assert!(svc.create_batch(batch(501, start, end)).await.is_err());
        assert!(svc.create_batch(batch(1, end, start)).await.is_err());
    }

    #[tokio::test]
    async fn test_check_redeem_once_then_conflict() {
        let svc = service().await;
        let (start, end) = window();
        let code = svc.create_batch(batch(1, start, end)).await.unwrap()[0].code.clone();

        let redeemed = svc.check_redeem(&code.to_lowercase()).await.unwrap();
        assert_eq!(redeemed.status, RedeemStatus::Redeemed);
        assert!(redeemed.redeemed_at.is_some());

        let err = svc.check_redeem(&code).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_check_redeem_not_found_and_outside_window() {
        let svc = service().await;
        let err = svc.check_redeem("ABCDEFGHIJKLMNOPQRSTUVWXYZ0123").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let now = Utc::now();
        let code = svc
            .create_batch(batch(1, now + Duration::days(1), now + Duration::days(2)))
            .await
            .unwrap()[0]
            .code
            .clone();
        let err = svc.check_redeem_at(&code, now).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        // 状态未被修改
        let ok = svc
            .check_redeem_at(&code, now + Duration::hours(36))
            .await
            .unwrap();
        assert_eq!(ok.status, RedeemStatus::Redeemed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_check_redeem_exactly_one_wins() {
        let svc = service().await;
        let (start, end) = window();
        let code = svc.create_batch(batch(1, start, end)).await.unwrap()[0].code.clone();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let svc = svc.clone();
            let code = code.clone();
            handles.push(tokio::spawn(async move { svc.check_redeem(&code).await }));
        }

        let mut ok = 0;
        let mut conflicts = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(AppError::Conflict(_)) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(conflicts, 7);
    }

    #[tokio::test]
    async fn test_update_list_delete() {
        let svc = service().await;
        let (start, end) = window();
        let created = svc.create_batch(batch(3, start, end)).await.unwrap();
        let id = created[0].id;

        let updated = svc
            .update(
                id,
                UpdateRedeemCodeRequest {
                    product_name: Some("美式咖啡".to_string()),
                    start_time: None,
                    end_time: None,
                    price: Some(1200),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.product_name, "美式咖啡");
        assert_eq!(updated.price, 1200);
        assert_eq!(updated.code, created[0].code);
        assert_eq!(updated.status, RedeemStatus::Pending);

        let bad_window = svc
            .update(
                id,
                UpdateRedeemCodeRequest {
                    product_name: None,
                    start_time: Some(end),
                    end_time: None,
                    price: None,
                },
            )
            .await;
        assert!(matches!(bad_window, Err(AppError::ValidationError(_))));

        svc.check_redeem(&created[1].code).await.unwrap();
        let page = svc
            .list(&RedeemCodeQuery {
                status: Some(RedeemStatus::Pending),
                product_name: None,
                page: Some(1),
                page_size: Some(10),
            })
            .await
            .unwrap();
        assert_eq!(page.total, 2);

        let page = svc
            .list(&RedeemCodeQuery {
                status: None,
                product_name: Some("美式".to_string()),
                page: None,
                page_size: None,
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);

        svc.delete(id).await.unwrap();
        assert!(matches!(svc.delete(id).await, Err(AppError::NotFound(_))));
        assert!(matches!(svc.get(id).await, Err(AppError::NotFound(_))));
    }
}
