// src/service/payment_service.rs

use crate::api::dto::payment_dto::{
    CreatePaymentIntentRequest, CreatePaymentIntentResponse, PaymentHistoryItem, PaymentMethodInfo,
};
use crate::api::dto::subscription_dto::{
    CreateSubscriptionRequest, CreateSubscriptionResponse, InvoiceLinks, SubscriptionUpdateView,
    SubscriptionView,
};
use crate::config::stripe::{StripeConfig, STRIPE_CLIENT};
use crate::db::DbPool;
use crate::domain::payment_model::PaymentStatus;
use crate::error::{AppError, AppResult};
use crate::repository::payment_repository::{CreatePaymentRecord, PaymentRepository};
use crate::repository::subscription_repository::{
    CreateSubscriptionRecord, SubscriptionRepository, UpdateSubscriptionRecord,
};
use crate::repository::user_repository::UserRepository;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use stripe::{
    AttachPaymentMethod, CreateCustomer, CreatePaymentIntent,
    CreatePaymentIntentAutomaticPaymentMethods, CreateSubscription, CreateSubscriptionItems,
    CreateSubscriptionPaymentSettings, CreateSubscriptionPaymentSettingsSaveDefaultPaymentMethod,
    Currency, Customer, CustomerId, CustomerInvoiceSettings, ErrorCode, Expandable, Invoice,
    InvoiceStatus, ListInvoices, ListPaymentIntents, PaymentIntent, PaymentMethod, PaymentMethodId,
    Price, Product, StripeError, Subscription, SubscriptionId, SubscriptionPaymentBehavior,
    UpdateCustomer, UpdateSubscription,
};
use uuid::Uuid;

/// プロバイダーが受け付ける最低請求額（最小通貨単位、$0.50相当）
pub const MINIMUM_CHARGE_AMOUNT: i64 = 50;

/// 現在のサブスクリプション表示の対象となるステータス
const CURRENT_SUBSCRIPTION_STATUSES: [&str; 4] = ["active", "canceled", "past_due", "trialing"];

/// ユーザー操作でStripeを呼び出し、ローカルの課金レコードを書き換える唯一のサービス
#[derive(Clone)]
pub struct PaymentService {
    user_repo: Arc<UserRepository>,
    payment_repo: Arc<PaymentRepository>,
    subscription_repo: Arc<SubscriptionRepository>,
    stripe_config: StripeConfig,
}

impl PaymentService {
    pub fn new(db: DbPool, stripe_config: StripeConfig) -> Self {
        let user_repo = Arc::new(UserRepository::new(db.clone()));
        let payment_repo = Arc::new(PaymentRepository::new(db.clone()));
        let subscription_repo = Arc::new(SubscriptionRepository::new(db));

        Self {
            user_repo,
            payment_repo,
            subscription_repo,
            stripe_config,
        }
    }

    pub fn stripe_config(&self) -> &StripeConfig {
        &self.stripe_config
    }

    /// PaymentIntentを作成し、pending状態の決済レコードを保存する
    pub async fn create_payment_intent(
        &self,
        user_id: Uuid,
        request: CreatePaymentIntentRequest,
    ) -> AppResult<CreatePaymentIntentResponse> {
        // 金額はプロバイダー呼び出しと永続化の前に検証する
        if request.amount < MINIMUM_CHARGE_AMOUNT {
            return Err(AppError::ValidationError(
                "Invalid amount. Minimum is $0.50".to_string(),
            ));
        }

        self.user_repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let currency = request
            .currency
            .as_deref()
            .unwrap_or("usd")
            .to_lowercase()
            .parse::<Currency>()
            .map_err(|_| AppError::ValidationError("Invalid currency".to_string()))?;

        let payment_type = request
            .payment_type
            .clone()
            .unwrap_or_else(|| "subscription".to_string());
        let plan_id = request
            .plan_id
            .clone()
            .unwrap_or_else(|| "unknown".to_string());

        let mut params = CreatePaymentIntent::new(request.amount, currency);
        params.metadata = Some(
            [
                ("user_id".to_string(), user_id.to_string()),
                ("payment_type".to_string(), payment_type.clone()),
                ("plan_id".to_string(), plan_id.clone()),
            ]
            .into_iter()
            .collect(),
        );
        params.automatic_payment_methods = Some(CreatePaymentIntentAutomaticPaymentMethods {
            enabled: true,
            ..Default::default()
        });

        let payment_intent = PaymentIntent::create(&STRIPE_CLIENT, params)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create payment intent: {}", e);
                AppError::ExternalServiceError(format!("Stripe error: {}", e))
            })?;

        self.payment_repo
            .create(CreatePaymentRecord {
                user_id,
                stripe_payment_intent_id: payment_intent.id.to_string(),
                amount: request.amount,
                currency: currency.to_string(),
                status: PaymentStatus::Pending.as_str().to_string(),
                description: None,
                payment_method_type: Some("card".to_string()),
                metadata: Some(serde_json::json!({
                    "payment_type": payment_type,
                    "plan_id": plan_id,
                })),
            })
            .await?;

        tracing::info!(
            user_id = %user_id,
            payment_intent_id = %payment_intent.id,
            "Payment intent created"
        );

        let client_secret = payment_intent.client_secret.ok_or_else(|| {
            AppError::InternalServerError("No client secret returned from Stripe".to_string())
        })?;

        Ok(CreatePaymentIntentResponse {
            client_secret,
            payment_intent_id: payment_intent.id.to_string(),
        })
    }

    /// 支払い履歴を取得する。Stripe顧客が存在する場合はプロバイダー側の履歴とマージする
    pub async fn get_payment_history(&self, user_id: Uuid) -> AppResult<Vec<PaymentHistoryItem>> {
        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let local_records = self.payment_repo.find_by_user_id(user_id).await?;

        // 顧客IDが未登録ならローカルレコードのみを返す
        let Some(customer_id) = user.stripe_customer_id else {
            return Ok(local_records
                .into_iter()
                .map(PaymentHistoryItem::from_record)
                .collect());
        };

        let customer_id: CustomerId = customer_id
            .parse()
            .map_err(|_| AppError::InternalServerError("Invalid customer ID format".to_string()))?;

        let mut list_intents = ListPaymentIntents::new();
        list_intents.customer = Some(customer_id.clone());
        list_intents.limit = Some(100);

        let payment_intents = PaymentIntent::list(&STRIPE_CLIENT, &list_intents)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list payment intents: {}", e);
                AppError::ExternalServiceError(format!("Failed to retrieve payment history: {}", e))
            })?;

        let mut list_invoices = ListInvoices::new();
        list_invoices.customer = Some(customer_id);
        list_invoices.limit = Some(100);

        let invoices = Invoice::list(&STRIPE_CLIENT, &list_invoices)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list invoices: {}", e);
                AppError::ExternalServiceError(format!("Failed to retrieve payment history: {}", e))
            })?;

        let mut payments = Vec::new();
        let mut seen = HashSet::new();

        for intent in payment_intents.data {
            let intent_id = intent.id.to_string();

            // プロバイダー側の最新状態をローカルレコードへ反映する
            self.payment_repo
                .sync_from_provider(
                    &intent_id,
                    &intent.status.to_string(),
                    intent.description.clone(),
                )
                .await?;

            payments.push(PaymentHistoryItem {
                id: intent_id.clone(),
                amount: intent.amount,
                currency: intent.currency.to_string(),
                status: intent.status.to_string(),
                description: intent
                    .description
                    .unwrap_or_else(|| "One-time payment".to_string()),
                created: intent.created * 1000,
                payment_method: PaymentMethodInfo::card(),
            });
            seen.insert(intent_id);
        }

        // 支払い済みのインボイスはサブスクリプション決済として履歴に含める
        for invoice in invoices.data {
            if !matches!(invoice.status, Some(InvoiceStatus::Paid)) {
                continue;
            }
            let Some(payment_intent) = invoice.payment_intent.as_ref() else {
                continue;
            };

            let description = invoice
                .lines
                .as_ref()
                .and_then(|lines| lines.data.first())
                .and_then(|line| line.description.clone())
                .map(|line_description| format!("Subscription - {}", line_description))
                .unwrap_or_else(|| "Subscription Payment".to_string());

            let intent_id = payment_intent.id().to_string();
            payments.push(PaymentHistoryItem {
                id: intent_id.clone(),
                amount: invoice.amount_paid.unwrap_or(0),
                currency: invoice
                    .currency
                    .map_or_else(|| "usd".to_string(), |currency| currency.to_string()),
                status: PaymentStatus::Succeeded.as_str().to_string(),
                description,
                created: invoice.created.unwrap_or(0) * 1000,
                payment_method: PaymentMethodInfo::masked_card(),
            });
            seen.insert(intent_id);
        }

        // プロバイダー側の取得窓（直近100件）に入らないローカルレコードを補完する
        for record in local_records {
            if !seen.contains(&record.stripe_payment_intent_id) {
                payments.push(PaymentHistoryItem::from_record(record));
            }
        }

        payments.sort_by(|a, b| b.created.cmp(&a.created));

        Ok(payments)
    }

    /// サブスクリプションを作成する。ライブなサブスクリプションはユーザーにつき1件まで
    pub async fn create_subscription(
        &self,
        user_id: Uuid,
        request: CreateSubscriptionRequest,
    ) -> AppResult<CreateSubscriptionResponse> {
        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        // 重複チェックはストレージ制約ではなくここで担保する
        if self
            .subscription_repo
            .find_live_by_user_id(user_id)
            .await?
            .is_some()
        {
            return Err(AppError::BadRequest(
                "User already has an active subscription".to_string(),
            ));
        }

        // Stripe顧客を遅延作成し、ユーザーレコードへリンクを永続化する
        let customer_id: CustomerId = match &user.stripe_customer_id {
            Some(id) => id.parse().map_err(|_| {
                AppError::InternalServerError("Invalid customer ID format".to_string())
            })?,
            None => {
                let mut customer_params = CreateCustomer::new();
                customer_params.email = Some(&user.email);
                customer_params.name = Some(&user.username);
                customer_params.metadata = Some(
                    [("user_id".to_string(), user_id.to_string())]
                        .into_iter()
                        .collect(),
                );

                let customer = Customer::create(&STRIPE_CLIENT, customer_params)
                    .await
                    .map_err(|e| {
                        tracing::error!("Failed to create Stripe customer: {}", e);
                        AppError::ExternalServiceError(format!("Stripe error: {}", e))
                    })?;

                self.user_repo
                    .update_stripe_customer_id(user_id, customer.id.as_str())
                    .await?;

                customer.id
            }
        };

        // 支払い方法が指定されていれば顧客へ紐付け、デフォルトに設定する
        if let Some(payment_method_id) = &request.payment_method_id {
            let payment_method_id: PaymentMethodId = payment_method_id.parse().map_err(|_| {
                AppError::ValidationError("Invalid payment method ID format".to_string())
            })?;

            PaymentMethod::attach(
                &STRIPE_CLIENT,
                &payment_method_id,
                AttachPaymentMethod {
                    customer: customer_id.clone(),
                },
            )
            .await
            .map_err(|e| {
                tracing::error!("Failed to attach payment method: {}", e);
                AppError::ExternalServiceError(format!("Stripe error: {}", e))
            })?;

            let mut update_customer = UpdateCustomer::new();
            update_customer.invoice_settings = Some(CustomerInvoiceSettings {
                default_payment_method: Some(payment_method_id.to_string()),
                ..Default::default()
            });

            Customer::update(&STRIPE_CLIENT, &customer_id, update_customer)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to set default payment method: {}", e);
                    AppError::ExternalServiceError(format!("Stripe error: {}", e))
                })?;
        }

        // 初回請求の支払い確定まではincompleteとして作成する
        let mut params = CreateSubscription::new(customer_id.clone());
        params.items = Some(vec![CreateSubscriptionItems {
            price: Some(request.price_id.clone()),
            ..Default::default()
        }]);
        params.payment_behavior = Some(SubscriptionPaymentBehavior::DefaultIncomplete);
        params.payment_settings = Some(CreateSubscriptionPaymentSettings {
            save_default_payment_method: Some(
                CreateSubscriptionPaymentSettingsSaveDefaultPaymentMethod::OnSubscription,
            ),
            ..Default::default()
        });
        params.expand = &["latest_invoice.payment_intent"];
        params.metadata = Some(
            [("user_id".to_string(), user_id.to_string())]
                .into_iter()
                .collect(),
        );

        let subscription = Subscription::create(&STRIPE_CLIENT, params)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create subscription: {}", e);
                AppError::ExternalServiceError(format!("Stripe error: {}", e))
            })?;

        self.subscription_repo
            .create(CreateSubscriptionRecord {
                user_id,
                stripe_subscription_id: subscription.id.to_string(),
                stripe_customer_id: customer_id.to_string(),
                stripe_price_id: request.price_id.clone(),
                status: subscription.status.to_string(),
                current_period_start: datetime_from_timestamp(subscription.current_period_start),
                current_period_end: datetime_from_timestamp(subscription.current_period_end),
                cancel_at_period_end: subscription.cancel_at_period_end,
                trial_start: optional_datetime(subscription.trial_start),
                trial_end: optional_datetime(subscription.trial_end),
                metadata: None,
            })
            .await?;

        let client_secret = match &subscription.latest_invoice {
            Some(Expandable::Object(invoice)) => match &invoice.payment_intent {
                Some(Expandable::Object(payment_intent)) => payment_intent.client_secret.clone(),
                _ => None,
            },
            _ => None,
        };

        tracing::info!(
            user_id = %user_id,
            subscription_id = %subscription.id,
            "Subscription created"
        );

        Ok(CreateSubscriptionResponse {
            subscription_id: subscription.id.to_string(),
            client_secret,
            status: subscription.status.to_string(),
        })
    }

    /// 現在のサブスクリプションを取得し、Stripe側の最新状態をローカルへ同期する
    pub async fn get_current_subscription(&self, user_id: Uuid) -> AppResult<SubscriptionView> {
        let db_subscription = self
            .subscription_repo
            .find_latest_by_user_in_statuses(user_id, &CURRENT_SUBSCRIPTION_STATUSES)
            .await?
            .ok_or_else(|| AppError::NotFound("No subscription found".to_string()))?;

        let subscription_id: SubscriptionId =
            db_subscription.stripe_subscription_id.parse().map_err(|_| {
                AppError::InternalServerError("Invalid subscription ID format".to_string())
            })?;

        // ローカルはキャッシュに過ぎないため、常にStripe側の回答を正とする
        let subscription = match Subscription::retrieve(&STRIPE_CLIENT, &subscription_id, &[]).await
        {
            Ok(subscription) => subscription,
            Err(StripeError::Stripe(ref request_error))
                if matches!(request_error.code, Some(ErrorCode::ResourceMissing)) =>
            {
                return Err(AppError::NotFound("No subscription found".to_string()));
            }
            Err(e) => {
                tracing::error!("Failed to retrieve subscription: {}", e);
                return Err(AppError::ExternalServiceError(format!("Stripe error: {}", e)));
            }
        };

        self.subscription_repo
            .update_by_stripe_subscription_id(
                &db_subscription.stripe_subscription_id,
                UpdateSubscriptionRecord {
                    status: Some(subscription.status.to_string()),
                    current_period_start: Some(datetime_from_timestamp(
                        subscription.current_period_start,
                    )),
                    current_period_end: Some(datetime_from_timestamp(
                        subscription.current_period_end,
                    )),
                    cancel_at_period_end: Some(subscription.cancel_at_period_end),
                    canceled_at: Some(optional_datetime(subscription.canceled_at)),
                },
            )
            .await?;

        let item_price = subscription
            .items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .ok_or_else(|| {
                AppError::InternalServerError("Subscription has no price".to_string())
            })?;

        let price = Price::retrieve(&STRIPE_CLIENT, &item_price.id, &[])
            .await
            .map_err(|e| {
                tracing::error!("Failed to retrieve price: {}", e);
                AppError::ExternalServiceError(format!("Stripe error: {}", e))
            })?;

        let product_id = match price.product.as_ref() {
            Some(Expandable::Id(id)) => id.clone(),
            Some(Expandable::Object(product)) => product.id.clone(),
            None => {
                return Err(AppError::InternalServerError(
                    "Price has no product".to_string(),
                ))
            }
        };

        let product = Product::retrieve(&STRIPE_CLIENT, &product_id, &[])
            .await
            .map_err(|e| {
                tracing::error!("Failed to retrieve product: {}", e);
                AppError::ExternalServiceError(format!("Stripe error: {}", e))
            })?;

        let product_name = product.name.clone().unwrap_or_default();
        let plan_id = product
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.get("planId"))
            .cloned()
            .unwrap_or_else(|| {
                product_name
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_lowercase()
            });

        Ok(SubscriptionView {
            id: subscription.id.to_string(),
            status: subscription.status.to_string(),
            plan_name: plan_display_name(&plan_id).map_or(product_name, str::to_owned),
            plan_id,
            amount: price.unit_amount.unwrap_or(0),
            currency: price
                .currency
                .map_or_else(|| "usd".to_string(), |currency| currency.to_string()),
            current_period_start: subscription.current_period_start * 1000,
            current_period_end: subscription.current_period_end * 1000,
            cancel_at_period_end: subscription.cancel_at_period_end,
            // デフォルト決済手段までは展開しない
            last_four: "****".to_string(),
        })
    }

    /// キャンセル予約・予約解除を行う。対象サブスクリプションの所有者のみ実行できる
    pub async fn update_subscription(
        &self,
        user_id: Uuid,
        subscription_id: &str,
        action: &str,
    ) -> AppResult<SubscriptionUpdateView> {
        // アクションはプロバイダー呼び出しの前に検証する
        let action = SubscriptionAction::from_str(action).map_err(|_| {
            AppError::ValidationError(
                "Invalid action specified. Use \"cancel\" or \"reactivate\"".to_string(),
            )
        })?;

        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let customer_id = user.stripe_customer_id.ok_or_else(|| {
            AppError::BadRequest("User not found or no subscription associated".to_string())
        })?;

        let subscription_id: SubscriptionId = subscription_id.parse().map_err(|_| {
            AppError::ValidationError("Invalid subscription ID format".to_string())
        })?;

        let subscription = Subscription::retrieve(&STRIPE_CLIENT, &subscription_id, &[])
            .await
            .map_err(|e| {
                tracing::error!("Failed to retrieve subscription: {}", e);
                AppError::ExternalServiceError(format!("Stripe error: {}", e))
            })?;

        // 所有権の確認。顧客IDの不一致は認可エラーとして区別する
        if subscription.customer.id().as_str() != customer_id {
            return Err(AppError::Forbidden(
                "Unauthorized to update this subscription".to_string(),
            ));
        }

        let mut params = UpdateSubscription::new();
        params.cancel_at_period_end = Some(matches!(action, SubscriptionAction::Cancel));

        let updated = Subscription::update(&STRIPE_CLIENT, &subscription_id, params)
            .await
            .map_err(|e| {
                tracing::error!("Failed to update subscription: {}", e);
                AppError::ExternalServiceError(format!("Stripe error: {}", e))
            })?;

        // プロバイダーが確定した状態だけをローカルへ反映する
        self.subscription_repo
            .update_by_stripe_subscription_id(
                subscription_id.as_str(),
                UpdateSubscriptionRecord {
                    status: Some(updated.status.to_string()),
                    cancel_at_period_end: Some(updated.cancel_at_period_end),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!(
            subscription_id = %subscription_id,
            action = action.as_str(),
            "Subscription updated"
        );

        Ok(SubscriptionUpdateView {
            id: updated.id.to_string(),
            status: updated.status.to_string(),
            current_period_end: updated.current_period_end * 1000,
            cancel_at_period_end: updated.cancel_at_period_end,
        })
    }

    /// 決済IDに対応するインボイスのダウンロードURLを取得する
    pub async fn get_invoice(&self, user_id: Uuid, payment_id: &str) -> AppResult<InvoiceLinks> {
        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let customer_id: CustomerId = user
            .stripe_customer_id
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?
            .parse()
            .map_err(|_| AppError::InternalServerError("Invalid customer ID format".to_string()))?;

        let mut list_invoices = ListInvoices::new();
        list_invoices.customer = Some(customer_id);
        list_invoices.limit = Some(100);

        let invoices = Invoice::list(&STRIPE_CLIENT, &list_invoices)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list invoices: {}", e);
                AppError::ExternalServiceError(format!("Stripe error: {}", e))
            })?;

        let invoice = invoices
            .data
            .into_iter()
            .find(|invoice| {
                invoice
                    .payment_intent
                    .as_ref()
                    .is_some_and(|payment_intent| payment_intent.id().as_str() == payment_id)
            })
            .ok_or_else(|| AppError::NotFound("Invoice not found".to_string()))?;

        Ok(InvoiceLinks {
            invoice_url: invoice.invoice_pdf,
            hosted_url: invoice.hosted_invoice_url,
        })
    }
}

/// ユーザーが実行できるサブスクリプション操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionAction {
    Cancel,
    Reactivate,
}

impl SubscriptionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionAction::Cancel => "cancel",
            SubscriptionAction::Reactivate => "reactivate",
        }
    }
}

impl FromStr for SubscriptionAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cancel" => Ok(SubscriptionAction::Cancel),
            "reactivate" => Ok(SubscriptionAction::Reactivate),
            _ => Err(format!("Invalid subscription action: {}", s)),
        }
    }
}

/// プランIDから表示名を引く。該当しなければ商品名がそのまま使われる
fn plan_display_name(plan_id: &str) -> Option<&'static str> {
    match plan_id {
        "basic" => Some("Basic Monthly"),
        "premium" => Some("Premium Monthly"),
        "elite" => Some("Elite Monthly"),
        _ => None,
    }
}

/// Stripeのエポック秒をDateTime<Utc>へ変換する
fn datetime_from_timestamp(timestamp: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp, 0).unwrap_or_else(Utc::now)
}

fn optional_datetime(timestamp: Option<i64>) -> Option<DateTime<Utc>> {
    timestamp.and_then(|ts| DateTime::from_timestamp(ts, 0))
}
