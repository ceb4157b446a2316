// src/repository/subscription_repository.rs

use crate::domain::subscription_model::{
    self, ActiveModel as SubscriptionActiveModel, Entity as SubscriptionEntity, SubscriptionStatus,
};
use chrono::{DateTime, Utc};
use sea_orm::entity::*;
use sea_orm::sea_query::Expr;
use sea_orm::{DbConn, DbErr, Order, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

#[derive(Debug)]
pub struct SubscriptionRepository {
    db: DbConn,
}

impl SubscriptionRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    /// Stripe Subscription IDでサブスクリプションを検索
    pub async fn find_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<subscription_model::Model>, DbErr> {
        SubscriptionEntity::find()
            .filter(
                subscription_model::Column::StripeSubscriptionId.eq(stripe_subscription_id),
            )
            .one(&self.db)
            .await
    }

    /// ライブ状態（active / trialing / past_due）のサブスクリプションを検索
    pub async fn find_live_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<subscription_model::Model>, DbErr> {
        SubscriptionEntity::find()
            .filter(subscription_model::Column::UserId.eq(user_id))
            .filter(subscription_model::Column::Status.is_in(SubscriptionStatus::LIVE_STATUSES))
            .one(&self.db)
            .await
    }

    /// 指定ステータス集合のうち最新のレコードを取得
    pub async fn find_latest_by_user_in_statuses(
        &self,
        user_id: Uuid,
        statuses: &[&str],
    ) -> Result<Option<subscription_model::Model>, DbErr> {
        SubscriptionEntity::find()
            .filter(subscription_model::Column::UserId.eq(user_id))
            .filter(subscription_model::Column::Status.is_in(statuses.iter().copied()))
            .order_by(subscription_model::Column::CreatedAt, Order::Desc)
            .one(&self.db)
            .await
    }

    /// サブスクリプションを作成
    pub async fn create(
        &self,
        create_subscription: CreateSubscriptionRecord,
    ) -> Result<subscription_model::Model, DbErr> {
        let new_subscription = SubscriptionActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(create_subscription.user_id),
            stripe_subscription_id: Set(create_subscription.stripe_subscription_id),
            stripe_customer_id: Set(create_subscription.stripe_customer_id),
            stripe_price_id: Set(create_subscription.stripe_price_id),
            status: Set(create_subscription.status),
            current_period_start: Set(create_subscription.current_period_start),
            current_period_end: Set(create_subscription.current_period_end),
            cancel_at_period_end: Set(create_subscription.cancel_at_period_end),
            canceled_at: Set(None),
            trial_start: Set(create_subscription.trial_start),
            trial_end: Set(create_subscription.trial_end),
            metadata: Set(create_subscription.metadata),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };

        new_subscription.insert(&self.db).await
    }

    /// Stripe Subscription IDでレコードを更新する。
    /// Webhookからの反映に使うため、対象がなくてもエラーにせず更新件数を返す
    pub async fn update_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
        update_subscription: UpdateSubscriptionRecord,
    ) -> Result<u64, DbErr> {
        let mut query = SubscriptionEntity::update_many();

        if let Some(status) = update_subscription.status {
            query = query.col_expr(subscription_model::Column::Status, Expr::value(status));
        }
        if let Some(current_period_start) = update_subscription.current_period_start {
            query = query.col_expr(
                subscription_model::Column::CurrentPeriodStart,
                Expr::value(current_period_start),
            );
        }
        if let Some(current_period_end) = update_subscription.current_period_end {
            query = query.col_expr(
                subscription_model::Column::CurrentPeriodEnd,
                Expr::value(current_period_end),
            );
        }
        if let Some(cancel_at_period_end) = update_subscription.cancel_at_period_end {
            query = query.col_expr(
                subscription_model::Column::CancelAtPeriodEnd,
                Expr::value(cancel_at_period_end),
            );
        }
        if let Some(canceled_at) = update_subscription.canceled_at {
            // NULLへの明示的な巻き戻しを許すため二重Optionになっている
            query = query.col_expr(
                subscription_model::Column::CanceledAt,
                Expr::value(canceled_at),
            );
        }

        let result = query
            .col_expr(subscription_model::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(subscription_model::Column::StripeSubscriptionId.eq(stripe_subscription_id))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }

    /// キャンセル済みにする。対象がなければ何もしない
    pub async fn mark_canceled_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
        canceled_at: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        let result = SubscriptionEntity::update_many()
            .col_expr(
                subscription_model::Column::Status,
                Expr::value(SubscriptionStatus::Canceled.as_str()),
            )
            .col_expr(
                subscription_model::Column::CanceledAt,
                Expr::value(Some(canceled_at)),
            )
            .col_expr(subscription_model::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(subscription_model::Column::StripeSubscriptionId.eq(stripe_subscription_id))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }
}

/// サブスクリプション作成用構造体
#[derive(Debug)]
pub struct CreateSubscriptionRecord {
    pub user_id: Uuid,
    pub stripe_subscription_id: String,
    pub stripe_customer_id: String,
    pub stripe_price_id: String,
    pub status: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

/// サブスクリプション更新用構造体
#[derive(Debug, Default)]
pub struct UpdateSubscriptionRecord {
    pub status: Option<String>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: Option<bool>,
    pub canceled_at: Option<Option<DateTime<Utc>>>,
}
