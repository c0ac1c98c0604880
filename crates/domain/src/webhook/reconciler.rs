use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::model::{
    next_local_midnight, DailySuperlikeReset, ItemType, LineItemTarget, NewOrder, NewPayment,
    NewWebhookEvent, PaymentMethod, PaymentStatus, PointAdjustment, PointTransactionKind,
    SubscriptionStatus, SubscriptionUpsert, TierAssignment,
};
use crate::services::EventCache;
use crate::storage::{
    CommerceStore, EntitlementStore, StorageError, StorageResult, SubscriptionStore,
    WebhookEventStore,
};

use super::event::{
    CheckoutIntent, CheckoutSession, EventDecodeError, EventPayload, InvoiceSummary, LineItem,
    PaymentEvent, PurchaseMetadata, SubscriptionSnapshot,
};
use super::signature::{SignatureError, WebhookVerifier};

/// Boost length granted per unit when the catalog item carries no duration.
pub const DEFAULT_BOOST_MINUTES: i64 = 30;

/// Everything the reconciler writes to.
pub trait ReconcileStore:
    WebhookEventStore + CommerceStore + EntitlementStore + SubscriptionStore
{
}

impl<T> ReconcileStore for T where
    T: WebhookEventStore + CommerceStore + EntitlementStore + SubscriptionStore
{
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Processed,
    Duplicate,
    Ignored,
}

impl ReconcileOutcome {
    fn as_label(self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Duplicate => "duplicate",
            Self::Ignored => "ignored",
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("invalid signature: {0}")]
    Signature(#[from] SignatureError),
    #[error("invalid event: {0}")]
    Decode(#[from] EventDecodeError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("handler for event {event_id} failed: {source}")]
    Handler {
        event_id: String,
        #[source]
        source: StorageError,
    },
}

/// Applies verified processor events to storage, at most once per event id.
pub struct Reconciler<S> {
    store: S,
    verifier: WebhookVerifier,
    cache: Arc<dyn EventCache>,
}

impl<S> Reconciler<S>
where
    S: ReconcileStore,
{
    pub fn new(store: S, verifier: WebhookVerifier, cache: Arc<dyn EventCache>) -> Self {
        Self {
            store,
            verifier,
            cache,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn process(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        self.process_at(payload, signature, Utc::now()).await
    }

    pub async fn process_at(
        &self,
        payload: &[u8],
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        self.verifier
            .verify(payload, signature, now)
            .inspect_err(|err| {
                warn!(error = %err, "rejecting webhook with invalid signature");
                counter!("webhook_events_total", "result" => "bad_signature").increment(1);
            })?;

        let event = PaymentEvent::from_slice(payload).inspect_err(|err| {
            warn!(error = %err, "rejecting undecodable webhook");
            counter!("webhook_events_total", "result" => "invalid").increment(1);
        })?;

        if self.cache.is_known(&event.id) {
            debug!(event_id = %event.id, "event already claimed by this process");
            counter!("webhook_events_total", "result" => "duplicate").increment(1);
            return Ok(ReconcileOutcome::Duplicate);
        }

        let claimed = self
            .store
            .claim_event(NewWebhookEvent {
                id: event.id.clone(),
                event_type: event.event_type.clone(),
                payload: String::from_utf8_lossy(payload).into_owned(),
                received_at: now,
            })
            .await?;
        self.cache.mark_seen(&event.id);
        if !claimed {
            info!(event_id = %event.id, "duplicate webhook delivery skipped");
            counter!("webhook_events_total", "result" => "duplicate").increment(1);
            return Ok(ReconcileOutcome::Duplicate);
        }

        match self.dispatch(&event, now).await {
            Ok(outcome) => {
                self.store.mark_event_processed(&event.id, now).await?;
                counter!("webhook_events_total", "result" => outcome.as_label()).increment(1);
                Ok(outcome)
            }
            Err(source) => {
                error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %source,
                    "webhook handler failed; event needs manual reconciliation"
                );
                counter!(
                    "webhook_handler_failures_total",
                    "event_type" => event.payload.kind()
                )
                .increment(1);
                counter!("webhook_events_total", "result" => "failed").increment(1);
                if let Err(mark_err) = self
                    .store
                    .mark_event_failed(&event.id, &source.to_string(), now)
                    .await
                {
                    error!(event_id = %event.id, error = %mark_err, "failed to record handler failure");
                }
                Err(ReconcileError::Handler {
                    event_id: event.id,
                    source,
                })
            }
        }
    }

    async fn dispatch(
        &self,
        event: &PaymentEvent,
        now: DateTime<Utc>,
    ) -> StorageResult<ReconcileOutcome> {
        match &event.payload {
            EventPayload::CheckoutCompleted(session) => self.checkout_completed(session, now).await?,
            EventPayload::SubscriptionChanged(snapshot) => {
                self.subscription_changed(snapshot, now).await?
            }
            EventPayload::SubscriptionDeleted(snapshot) => {
                self.subscription_deleted(snapshot, now).await?
            }
            EventPayload::InvoicePaid(invoice) => {
                self.invoice_settled(invoice, PaymentStatus::Succeeded, now)
                    .await?
            }
            EventPayload::InvoicePaymentFailed(invoice) => {
                self.invoice_settled(invoice, PaymentStatus::Failed, now)
                    .await?
            }
            EventPayload::Unhandled => {
                info!(event_id = %event.id, event_type = %event.event_type, "ignoring unhandled event type");
                return Ok(ReconcileOutcome::Ignored);
            }
        }
        Ok(ReconcileOutcome::Processed)
    }

    async fn checkout_completed(
        &self,
        session: &CheckoutSession,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let payment = self
            .store
            .mark_checkout_paid(
                &session.session_id,
                session.payment_intent_id.as_deref(),
                now,
            )
            .await?;
        if payment.is_none() {
            warn!(session_id = %session.session_id, "no payment row for checkout session");
        }

        match &session.intent {
            CheckoutIntent::EventRegistration { user_id, event_id } => {
                let registered = self
                    .store
                    .register_attendee(event_id, user_id, payment.as_ref().map(|p| p.id.as_str()))
                    .await?;
                if registered {
                    info!(%event_id, %user_id, "event registration confirmed");
                } else {
                    warn!(%event_id, %user_id, "no pending registration to confirm");
                }
                Ok(())
            }
            CheckoutIntent::Purchase(purchase) => self.fulfil_purchase(session, purchase, now).await,
        }
    }

    async fn fulfil_purchase(
        &self,
        session: &CheckoutSession,
        purchase: &PurchaseMetadata,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        if purchase.payment_method == PaymentMethod::Both && purchase.points_to_deduct > 0 {
            let spend = PointAdjustment::spend(
                purchase.user_id.as_str(),
                purchase.points_to_deduct,
                Some(session.session_id.clone()),
                now,
            );
            match self.store.adjust_points(spend).await? {
                Some(tx) => info!(
                    user_id = %purchase.user_id,
                    amount = tx.amount,
                    balance_after = tx.balance_after,
                    "points debited for checkout"
                ),
                None => warn!(user_id = %purchase.user_id, "points debit skipped for unknown user"),
            }
        }

        for item in &purchase.items {
            let order = self
                .store
                .create_order(new_order(session, purchase, item, now))
                .await?;
            match &item.target {
                LineItemTarget::PurchasableItem(item_id) => {
                    self.grant_item(&purchase.user_id, item_id, item.quantity, &order.id, now)
                        .await?;
                }
                LineItemTarget::Product(product_id) => {
                    match self.store.decrement_stock(product_id, item.quantity).await? {
                        Some(remaining) => debug!(%product_id, remaining, "stock decremented"),
                        None => warn!(%product_id, "unknown product in checkout"),
                    }
                }
            }
        }
        Ok(())
    }

    async fn grant_item(
        &self,
        user_id: &str,
        item_id: &str,
        count: i32,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let Some(item) = self.store.find_purchasable_item(item_id).await? else {
            warn!(%item_id, "unknown purchasable item in checkout");
            return Ok(());
        };

        let units = i64::from(item.quantity) * i64::from(count);
        self.store
            .add_inventory(user_id, &item.item_type, units)
            .await?;

        match &item.item_type {
            ItemType::SuperlikePack => {
                if !self.store.add_superlikes(user_id, units).await? {
                    warn!(%user_id, "super-like grant skipped for unknown user");
                }
            }
            ItemType::Boost => {
                let Some(duration) = boost_duration(item.duration_hours, count) else {
                    warn!(%user_id, %item_id, count, "boost duration overflows; grant skipped");
                    return Ok(());
                };
                match self.store.extend_boost(user_id, duration, now).await? {
                    Some(expires_at) => debug!(%user_id, %expires_at, "boost extended"),
                    None => warn!(%user_id, "boost grant skipped for unknown user"),
                }
            }
            ItemType::PointsPack => {
                let credit = PointAdjustment::credit(
                    user_id,
                    units,
                    PointTransactionKind::Purchase,
                    Some(order_id.to_string()),
                    now,
                );
                if self.store.adjust_points(credit).await?.is_none() {
                    warn!(%user_id, "points grant skipped for unknown user");
                }
            }
            ItemType::Other(_) => {}
        }
        Ok(())
    }

    async fn subscription_changed(
        &self,
        snapshot: &SubscriptionSnapshot,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let Some(user) = self
            .store
            .find_user_by_customer(&snapshot.customer_id)
            .await?
        else {
            warn!(customer_id = %snapshot.customer_id, "no user for subscription customer");
            return Ok(());
        };
        let Some(price_id) = snapshot.price_id.as_deref() else {
            warn!(subscription_id = %snapshot.subscription_id, "subscription has no price");
            return Ok(());
        };
        let Some(plan) = self.store.find_plan_by_price(price_id).await? else {
            warn!(%price_id, "no subscription plan for price");
            return Ok(());
        };

        self.store
            .upsert_subscription(SubscriptionUpsert {
                stripe_subscription_id: snapshot.subscription_id.clone(),
                user_id: user.user_id.clone(),
                plan_id: Some(plan.id.clone()),
                stripe_customer_id: snapshot.customer_id.clone(),
                status: snapshot.status,
                current_period_start: snapshot.current_period_start,
                current_period_end: snapshot.current_period_end,
                cancel_at_period_end: snapshot.cancel_at_period_end,
                canceled_at: snapshot.canceled_at,
                updated_at: now,
            })
            .await?;

        let daily_superlikes = (snapshot.status == SubscriptionStatus::Active
            && plan.superlikes_per_day > 0)
            .then(|| DailySuperlikeReset {
                remaining: plan.superlikes_per_day,
                reset_at: next_local_midnight(now),
            });
        self.store
            .assign_tier(
                &user.user_id,
                TierAssignment {
                    tier: plan.tier.clone(),
                    plan_id: Some(plan.id.clone()),
                    expires_at: snapshot.current_period_end,
                    daily_superlikes,
                },
            )
            .await?;
        info!(user_id = %user.user_id, tier = %plan.tier, status = %snapshot.status, "subscription applied");
        Ok(())
    }

    async fn subscription_deleted(
        &self,
        snapshot: &SubscriptionSnapshot,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let ended_at = snapshot.ended_at.unwrap_or(now);
        let updated = self
            .store
            .set_subscription_status(
                &snapshot.subscription_id,
                SubscriptionStatus::Canceled,
                Some(ended_at),
                now,
            )
            .await?;
        if !updated {
            warn!(subscription_id = %snapshot.subscription_id, "deleted subscription was never recorded");
        }

        match self
            .store
            .find_user_by_customer(&snapshot.customer_id)
            .await?
        {
            Some(user) => {
                self.store
                    .assign_tier(&user.user_id, TierAssignment::free(now))
                    .await?;
                info!(user_id = %user.user_id, "user downgraded to free tier");
            }
            None => warn!(customer_id = %snapshot.customer_id, "no user for deleted subscription"),
        }
        Ok(())
    }

    async fn invoice_settled(
        &self,
        invoice: &InvoiceSummary,
        status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let user_id = self.invoice_user(invoice).await?;
        let amount = match status {
            PaymentStatus::Succeeded => invoice.amount_paid,
            _ => invoice.amount_due,
        };
        self.store
            .insert_payment(NewPayment {
                user_id,
                stripe_session_id: None,
                stripe_payment_intent_id: None,
                stripe_invoice_id: Some(invoice.invoice_id.clone()),
                stripe_subscription_id: invoice.subscription_id.clone(),
                amount,
                currency: invoice.currency.clone(),
                status,
                created_at: now,
            })
            .await?;

        if status == PaymentStatus::Failed {
            if let Some(subscription_id) = invoice.subscription_id.as_deref() {
                let updated = self
                    .store
                    .set_subscription_status(subscription_id, SubscriptionStatus::PastDue, None, now)
                    .await?;
                if !updated {
                    warn!(%subscription_id, "failed invoice for unknown subscription");
                }
            }
        }
        Ok(())
    }

    async fn invoice_user(&self, invoice: &InvoiceSummary) -> StorageResult<Option<String>> {
        if let Some(subscription_id) = invoice.subscription_id.as_deref() {
            if let Some(subscription) = self.store.find_subscription(subscription_id).await? {
                return Ok(Some(subscription.user_id));
            }
        }
        match invoice.customer_id.as_deref() {
            Some(customer_id) => Ok(self
                .store
                .find_user_by_customer(customer_id)
                .await?
                .map(|user| user.user_id)),
            None => Ok(None),
        }
    }
}

/// Total boost time for `count` units, `None` when it does not fit a `Duration`.
fn boost_duration(duration_hours: Option<i32>, count: i32) -> Option<Duration> {
    let per_unit = match duration_hours.filter(|hours| *hours > 0) {
        Some(hours) => i64::from(hours).checked_mul(60)?,
        None => DEFAULT_BOOST_MINUTES,
    };
    per_unit
        .checked_mul(i64::from(count))
        .and_then(Duration::try_minutes)
}

fn new_order(
    session: &CheckoutSession,
    purchase: &PurchaseMetadata,
    item: &LineItem,
    now: DateTime<Utc>,
) -> NewOrder {
    NewOrder {
        user_id: purchase.user_id.clone(),
        target: item.target.clone(),
        quantity: item.quantity,
        points_spent: item.points_spent,
        amount_paid: item.amount_paid,
        payment_method: purchase.payment_method,
        gift: purchase.gift.clone(),
        shipping_address: purchase.shipping_address.clone(),
        stripe_session_id: Some(session.session_id.clone()),
        created_at: now,
    }
}
