// src/domain/subscription_model.rs

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subscriptions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    #[sea_orm(unique)]
    pub stripe_subscription_id: String,

    pub stripe_customer_id: String,

    pub stripe_price_id: String,

    pub status: String,

    pub current_period_start: DateTime<Utc>,

    pub current_period_end: DateTime<Utc>,

    pub cancel_at_period_end: bool,

    #[sea_orm(nullable)]
    pub canceled_at: Option<DateTime<Utc>>,

    #[sea_orm(nullable)]
    pub trial_start: Option<DateTime<Utc>>,

    #[sea_orm(nullable)]
    pub trial_end: Option<DateTime<Utc>>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub metadata: Option<Json>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "crate::domain::user_model::Entity",
        from = "Column::UserId",
        to = "crate::domain::user_model::Column::Id"
    )]
    User,
}

impl Related<crate::domain::user_model::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// サブスクリプションステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    Incomplete,
    IncompleteExpired,
    PastDue,
    Trialing,
    Unpaid,
}

impl SubscriptionStatus {
    /// 「現在課金中」とみなすステータス。ユーザーにつき1件までの制約に使う
    pub const LIVE_STATUSES: [&'static str; 3] = ["active", "trialing", "past_due"];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Unpaid => "unpaid",
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing | SubscriptionStatus::PastDue
        )
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            "incomplete" => Ok(SubscriptionStatus::Incomplete),
            "incomplete_expired" => Ok(SubscriptionStatus::IncompleteExpired),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "trialing" => Ok(SubscriptionStatus::Trialing),
            "unpaid" => Ok(SubscriptionStatus::Unpaid),
            _ => Err(format!("Invalid subscription status: {}", s)),
        }
    }
}
