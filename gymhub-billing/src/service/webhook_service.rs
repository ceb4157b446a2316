// src/service/webhook_service.rs

use crate::db::DbPool;
use crate::domain::payment_model::PaymentStatus;
use crate::domain::subscription_model::SubscriptionStatus;
use crate::error::{AppError, AppResult};
use crate::repository::payment_repository::PaymentRepository;
use crate::repository::subscription_repository::{SubscriptionRepository, UpdateSubscriptionRecord};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use stripe::{EventObject, EventType, Invoice, PaymentIntent, Subscription, Webhook};

/// Stripeからの署名付き非同期通知を検証し、ローカルレコードへ反映するレシーバー。
/// ユーザーリクエストと並行して届くため、すべての反映は外部IDをキーにした
/// 条件付き更新（last-write-wins）で行う
#[derive(Clone)]
pub struct WebhookService {
    payment_repo: Arc<PaymentRepository>,
    subscription_repo: Arc<SubscriptionRepository>,
    webhook_secret: String,
}

impl WebhookService {
    pub fn new(db: DbPool, webhook_secret: String) -> Self {
        let payment_repo = Arc::new(PaymentRepository::new(db.clone()));
        let subscription_repo = Arc::new(SubscriptionRepository::new(db));

        Self {
            payment_repo,
            subscription_repo,
            webhook_secret,
        }
    }

    /// 生のボディと署名ヘッダーからイベントを検証し、種類ごとに振り分ける
    pub async fn handle_event(&self, payload: &str, signature: &str) -> AppResult<()> {
        let event = Webhook::construct_event(payload, signature, &self.webhook_secret)
            .map_err(|e| {
                tracing::warn!("Invalid webhook signature: {}", e);
                AppError::BadRequest(format!("Webhook Error: {}", e))
            })?;

        tracing::info!(event_type = ?event.type_, "Processing webhook event");

        match event.type_ {
            EventType::CustomerSubscriptionCreated | EventType::CustomerSubscriptionUpdated => {
                if let EventObject::Subscription(subscription) = event.data.object {
                    self.handle_subscription_updated(subscription).await?;
                }
            }
            EventType::CustomerSubscriptionDeleted => {
                if let EventObject::Subscription(subscription) = event.data.object {
                    self.handle_subscription_deleted(subscription).await?;
                }
            }
            EventType::InvoicePaymentSucceeded => {
                if let EventObject::Invoice(invoice) = event.data.object {
                    self.handle_invoice_payment_succeeded(invoice).await?;
                }
            }
            EventType::InvoicePaymentFailed => {
                if let EventObject::Invoice(invoice) = event.data.object {
                    self.handle_invoice_payment_failed(invoice);
                }
            }
            EventType::PaymentIntentSucceeded => {
                if let EventObject::PaymentIntent(payment_intent) = event.data.object {
                    self.handle_payment_intent_succeeded(payment_intent).await?;
                }
            }
            _ => {
                tracing::debug!(event_type = ?event.type_, "Unhandled webhook event type");
            }
        }

        Ok(())
    }

    /// サブスクリプションの作成・更新を反映する。
    /// 対応するローカルレコードがない場合はエラーにしない
    async fn handle_subscription_updated(&self, subscription: Subscription) -> AppResult<()> {
        let rows = self
            .subscription_repo
            .update_by_stripe_subscription_id(
                subscription.id.as_str(),
                UpdateSubscriptionRecord {
                    status: Some(subscription.status.to_string()),
                    current_period_start: DateTime::from_timestamp(
                        subscription.current_period_start,
                        0,
                    ),
                    current_period_end: DateTime::from_timestamp(
                        subscription.current_period_end,
                        0,
                    ),
                    cancel_at_period_end: Some(subscription.cancel_at_period_end),
                    canceled_at: Some(
                        subscription
                            .canceled_at
                            .and_then(|ts| DateTime::from_timestamp(ts, 0)),
                    ),
                },
            )
            .await?;

        if rows == 0 {
            tracing::warn!(
                subscription_id = %subscription.id,
                "No local record for subscription event"
            );
        }

        Ok(())
    }

    /// プロバイダー側で削除されたサブスクリプションをキャンセル済みにする
    async fn handle_subscription_deleted(&self, subscription: Subscription) -> AppResult<()> {
        let rows = self
            .subscription_repo
            .mark_canceled_by_stripe_subscription_id(subscription.id.as_str(), Utc::now())
            .await?;

        if rows == 0 {
            tracing::warn!(
                subscription_id = %subscription.id,
                "No local record for deleted subscription"
            );
        }

        Ok(())
    }

    /// サブスクリプションに紐付くインボイスの支払い成功でactiveへ更新する
    async fn handle_invoice_payment_succeeded(&self, invoice: Invoice) -> AppResult<()> {
        let Some(subscription) = invoice.subscription.as_ref() else {
            return Ok(());
        };

        self.subscription_repo
            .update_by_stripe_subscription_id(
                subscription.id().as_str(),
                UpdateSubscriptionRecord {
                    status: Some(SubscriptionStatus::Active.as_str().to_string()),
                    ..Default::default()
                },
            )
            .await?;

        Ok(())
    }

    /// 支払い失敗は記録のみ。ステータスはプロバイダー側の督促状態に委ね、
    /// 次回の同期で反映される
    fn handle_invoice_payment_failed(&self, invoice: Invoice) {
        tracing::warn!(invoice_id = %invoice.id, "Payment failed for invoice");
    }

    /// PaymentIntentの成功を決済レコードへ反映する
    async fn handle_payment_intent_succeeded(&self, payment_intent: PaymentIntent) -> AppResult<()> {
        let rows = self
            .payment_repo
            .update_status_by_stripe_payment_intent_id(
                payment_intent.id.as_str(),
                PaymentStatus::Succeeded.as_str(),
            )
            .await?;

        if rows == 0 {
            tracing::warn!(
                payment_intent_id = %payment_intent.id,
                "No local record for payment intent event"
            );
        }

        Ok(())
    }
}
