// src/repository/user_repository.rs

use crate::domain::user_model::{self, Entity as UserEntity};
use chrono::Utc;
use sea_orm::entity::*;
use sea_orm::{DbConn, DbErr, Set};
use uuid::Uuid;

#[derive(Debug)]
pub struct UserRepository {
    db: DbConn,
}

impl UserRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    /// IDでユーザーを検索
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<user_model::Model>, DbErr> {
        UserEntity::find_by_id(id).one(&self.db).await
    }

    /// Stripe顧客IDをユーザーへ保存（初回サブスクリプション時の遅延リンク）
    pub async fn update_stripe_customer_id(
        &self,
        id: Uuid,
        stripe_customer_id: &str,
    ) -> Result<user_model::Model, DbErr> {
        let user = UserEntity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;

        let mut active_model: user_model::ActiveModel = user.into();
        active_model.stripe_customer_id = Set(Some(stripe_customer_id.to_string()));
        active_model.updated_at = Set(Utc::now());
        active_model.update(&self.db).await
    }
}
