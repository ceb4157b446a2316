// src/repository/payment_repository.rs

use crate::domain::payment_model::{
    self, ActiveModel as PaymentActiveModel, Entity as PaymentEntity,
};
use chrono::Utc;
use sea_orm::entity::*;
use sea_orm::sea_query::Expr;
use sea_orm::{DbConn, DbErr, Order, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

#[derive(Debug)]
pub struct PaymentRepository {
    db: DbConn,
}

impl PaymentRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    /// 決済レコードを作成
    pub async fn create(
        &self,
        create_payment: CreatePaymentRecord,
    ) -> Result<payment_model::Model, DbErr> {
        let new_payment = PaymentActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(create_payment.user_id),
            stripe_payment_intent_id: Set(create_payment.stripe_payment_intent_id),
            amount: Set(create_payment.amount),
            currency: Set(create_payment.currency),
            status: Set(create_payment.status),
            description: Set(create_payment.description),
            payment_method_type: Set(create_payment.payment_method_type),
            payment_method_brand: Set(None),
            payment_method_last4: Set(None),
            metadata: Set(create_payment.metadata),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };

        new_payment.insert(&self.db).await
    }

    /// ユーザーの決済レコードを新しい順に取得
    pub async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<payment_model::Model>, DbErr> {
        PaymentEntity::find()
            .filter(payment_model::Column::UserId.eq(user_id))
            .order_by(payment_model::Column::CreatedAt, Order::Desc)
            .all(&self.db)
            .await
    }

    /// PaymentIntent IDでステータスを更新する。
    /// 対象レコードが存在しない場合はエラーにせず、更新件数0を返す
    pub async fn update_status_by_stripe_payment_intent_id(
        &self,
        stripe_payment_intent_id: &str,
        status: &str,
    ) -> Result<u64, DbErr> {
        let result = PaymentEntity::update_many()
            .col_expr(payment_model::Column::Status, Expr::value(status))
            .col_expr(payment_model::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(payment_model::Column::StripePaymentIntentId.eq(stripe_payment_intent_id))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }

    /// プロバイダー側の最新のステータスと説明をローカルレコードへ反映する。
    /// 対象がなければ何もしない（挿入はしない）
    pub async fn sync_from_provider(
        &self,
        stripe_payment_intent_id: &str,
        status: &str,
        description: Option<String>,
    ) -> Result<u64, DbErr> {
        let result = PaymentEntity::update_many()
            .col_expr(payment_model::Column::Status, Expr::value(status))
            .col_expr(payment_model::Column::Description, Expr::value(description))
            .col_expr(payment_model::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(payment_model::Column::StripePaymentIntentId.eq(stripe_payment_intent_id))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }
}

/// 決済レコード作成用構造体
#[derive(Debug)]
pub struct CreatePaymentRecord {
    pub user_id: Uuid,
    pub stripe_payment_intent_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub description: Option<String>,
    pub payment_method_type: Option<String>,
    pub metadata: Option<serde_json::Value>,
}
