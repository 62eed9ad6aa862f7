use sea_orm_migration::prelude::*;

/// 兑换码
///
/// - code: 30 位大写字母数字，全局唯一
/// - status: pending / redeemed，只允许 pending -> redeemed
/// - price: 以分为单位
#[derive(DeriveIden)]
enum RedeemCodes {
    Table,
    Id,
    Code,
    ProductName,
    Status,
    StartTime,
    EndTime,
    Price,
    RedeemedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RedeemCodes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RedeemCodes::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RedeemCodes::Code).string_len(30).not_null())
                    .col(
                        ColumnDef::new(RedeemCodes::ProductName)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RedeemCodes::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(RedeemCodes::StartTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RedeemCodes::EndTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RedeemCodes::Price)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RedeemCodes::RedeemedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RedeemCodes::CreatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::current_timestamp())
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RedeemCodes::UpdatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::current_timestamp())
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_redeem_codes_code")
                    .table(RedeemCodes::Table)
                    .col(RedeemCodes::Code)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 后台列表按状态筛选
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_redeem_codes_status")
                    .table(RedeemCodes::Table)
                    .col(RedeemCodes::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RedeemCodes::Table).to_owned())
            .await?;
        Ok(())
    }
}
