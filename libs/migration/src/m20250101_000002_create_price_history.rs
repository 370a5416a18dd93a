use sea_orm_migration::{prelude::*, schema::*};

use crate::m20250101_000001_create_products::Products;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PriceHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PriceHistory::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(big_integer(PriceHistory::ProductId))
                    .col(decimal_len(PriceHistory::OldPrice, 12, 2))
                    .col(decimal_len(PriceHistory::NewPrice, 12, 2))
                    .col(string_len_null(PriceHistory::ChangeReason, 255))
                    .col(
                        timestamp_with_time_zone(PriceHistory::ChangedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(string_len_null(PriceHistory::ChangedBy, 100))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_price_history_product_id")
                            .from(PriceHistory::Table, PriceHistory::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Newest-first lookups per product
        manager
            .create_index(
                Index::create()
                    .name("idx_price_history_product_changed_at")
                    .table(PriceHistory::Table)
                    .col(PriceHistory::ProductId)
                    .col(PriceHistory::ChangedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PriceHistory::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PriceHistory {
    Table,
    Id,
    ProductId,
    OldPrice,
    NewPrice,
    ChangeReason,
    ChangedAt,
    ChangedBy,
}
