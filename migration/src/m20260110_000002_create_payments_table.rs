use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 単発決済（PaymentIntent）の追跡テーブル
        manager
            .create_table(
                Table::create()
                    .table(Payments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Payments::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(ColumnDef::new(Payments::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(Payments::StripePaymentIntentId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Payments::Amount).big_integer().not_null())
                    .col(
                        ColumnDef::new(Payments::Currency)
                            .string()
                            .not_null()
                            .default("usd"),
                    )
                    .col(ColumnDef::new(Payments::Status).string().not_null())
                    .col(ColumnDef::new(Payments::Description).text().null())
                    .col(ColumnDef::new(Payments::PaymentMethodType).string().null())
                    .col(
                        ColumnDef::new(Payments::PaymentMethodBrand)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Payments::PaymentMethodLast4)
                            .string_len(4)
                            .null(),
                    )
                    .col(ColumnDef::new(Payments::Metadata).json_binary().null())
                    .col(
                        ColumnDef::new(Payments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Payments::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_payments_user_id")
                            .from(Payments::Table, Payments::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // 履歴表示は常にユーザー単位・新しい順
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .table(Payments::Table)
                    .name("idx_payments_user_id")
                    .col(Payments::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .table(Payments::Table)
                    .name("idx_payments_created_at")
                    .col(Payments::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Payments::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Payments {
    Table,
    Id,
    UserId,
    StripePaymentIntentId,
    Amount,
    Currency,
    Status,
    Description,
    PaymentMethodType,
    PaymentMethodBrand,
    PaymentMethodLast4,
    Metadata,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Users {
    Table,
    Id,
}
