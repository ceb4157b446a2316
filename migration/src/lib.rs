// migration/src/lib.rs
pub use sea_orm_migration::prelude::*;

// マイグレーションモジュール
mod m20260110_000001_create_users_table;
mod m20260110_000002_create_payments_table;
mod m20260110_000003_create_subscriptions_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            // 1. 基本テーブル作成（依存関係なし）
            Box::new(m20260110_000001_create_users_table::Migration),
            // 2. 課金テーブル作成（usersテーブルに依存）
            Box::new(m20260110_000002_create_payments_table::Migration),
            Box::new(m20260110_000003_create_subscriptions_table::Migration),
        ]
    }
}
