use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::model::{
    ConversationMerge, ConversationPurge, ConversationRow, GalleryPhoto, GalleryRemoval, ItemType,
    MatchRow, NewOrder, NewPayment, NewSystemIssue, NewWebhookEvent, OrderRecord,
    ParticipantRow, PaymentRecord, PointAdjustment, PointTransactionRecord, PurchasableItem,
    SubscriptionPlan, SubscriptionRecord, SubscriptionStatus, SubscriptionUpsert,
    SystemIssueRecord, TierAssignment, UserEntitlements, UserProfileRow, WebhookEventRecord,
};

/// Common result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("concurrent update conflict on {0}")]
    Conflict(String),
}

impl StorageError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }
}

/// Idempotency log for processor events.
#[async_trait]
pub trait WebhookEventStore: Send + Sync {
    /// Inserts the log row unless the id exists. Returns `false` when another
    /// delivery already claimed the event.
    async fn claim_event(&self, event: NewWebhookEvent) -> StorageResult<bool>;
    async fn mark_event_processed(&self, event_id: &str, at: DateTime<Utc>) -> StorageResult<()>;
    async fn mark_event_failed(
        &self,
        event_id: &str,
        error: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<()>;
    async fn find_event(&self, event_id: &str) -> StorageResult<Option<WebhookEventRecord>>;
    async fn failed_events(&self, limit: u64) -> StorageResult<Vec<WebhookEventRecord>>;
}

#[async_trait]
pub trait CommerceStore: Send + Sync {
    /// Marks the checkout's payment row succeeded. `None` when no row matches
    /// the session.
    async fn mark_checkout_paid(
        &self,
        session_id: &str,
        payment_intent_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> StorageResult<Option<PaymentRecord>>;
    async fn insert_payment(&self, payment: NewPayment) -> StorageResult<PaymentRecord>;
    async fn payments_for_session(&self, session_id: &str) -> StorageResult<Vec<PaymentRecord>>;
    async fn payments_for_subscription(
        &self,
        stripe_subscription_id: &str,
    ) -> StorageResult<Vec<PaymentRecord>>;
    /// Moves a `pending_payment` attendee to `registered` and bumps the
    /// event's attendee counter. Returns `false` when nothing was pending.
    async fn register_attendee(
        &self,
        event_id: &str,
        user_id: &str,
        payment_id: Option<&str>,
    ) -> StorageResult<bool>;
    async fn create_order(&self, order: NewOrder) -> StorageResult<OrderRecord>;
    async fn orders_for_user(&self, user_id: &str) -> StorageResult<Vec<OrderRecord>>;
    async fn find_purchasable_item(&self, item_id: &str)
        -> StorageResult<Option<PurchasableItem>>;
    /// Decrements stock floored at zero. `None` when the product is unknown.
    async fn decrement_stock(&self, product_id: &str, quantity: i32)
        -> StorageResult<Option<i32>>;
}

#[async_trait]
pub trait EntitlementStore: Send + Sync {
    async fn find_entitlements(&self, user_id: &str) -> StorageResult<Option<UserEntitlements>>;
    async fn find_user_by_customer(
        &self,
        stripe_customer_id: &str,
    ) -> StorageResult<Option<UserEntitlements>>;
    /// Applies the adjustment and appends its ledger row atomically. `None`
    /// when the user does not exist.
    async fn adjust_points(
        &self,
        adjustment: PointAdjustment,
    ) -> StorageResult<Option<PointTransactionRecord>>;
    async fn point_transactions(&self, user_id: &str)
        -> StorageResult<Vec<PointTransactionRecord>>;
    async fn add_inventory(
        &self,
        user_id: &str,
        item_type: &ItemType,
        quantity: i64,
    ) -> StorageResult<()>;
    async fn inventory_quantity(&self, user_id: &str, item_type: &ItemType) -> StorageResult<i64>;
    /// Server-side increment; returns `false` when the user does not exist.
    async fn add_superlikes(&self, user_id: &str, amount: i64) -> StorageResult<bool>;
    /// Sets the boost expiry to `max(now, current) + duration` and returns it.
    async fn extend_boost(
        &self,
        user_id: &str,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<DateTime<Utc>>>;
    async fn assign_tier(&self, user_id: &str, assignment: TierAssignment) -> StorageResult<bool>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Matches either the monthly or the yearly price column.
    async fn find_plan_by_price(&self, price_id: &str) -> StorageResult<Option<SubscriptionPlan>>;
    async fn upsert_subscription(&self, subscription: SubscriptionUpsert) -> StorageResult<()>;
    async fn find_subscription(
        &self,
        stripe_subscription_id: &str,
    ) -> StorageResult<Option<SubscriptionRecord>>;
    /// `ended_at` is only written when present. Returns `false` when the
    /// subscription is unknown.
    async fn set_subscription_status(
        &self,
        stripe_subscription_id: &str,
        status: SubscriptionStatus,
        ended_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> StorageResult<bool>;
}

/// Reads and repairs used by the integrity scanner.
#[async_trait]
pub trait IntegrityStore: Send + Sync {
    async fn count_users(&self) -> StorageResult<u64>;
    async fn user_profiles(&self) -> StorageResult<Vec<UserProfileRow>>;
    async fn gallery_photos(&self) -> StorageResult<Vec<GalleryPhoto>>;
    async fn gallery_for_user(&self, user_id: &str) -> StorageResult<Vec<GalleryPhoto>>;
    async fn matches(&self) -> StorageResult<Vec<MatchRow>>;
    async fn matches_between(
        &self,
        user_id: &str,
        target_user_id: &str,
    ) -> StorageResult<Vec<MatchRow>>;
    async fn direct_conversations(&self) -> StorageResult<Vec<ConversationRow>>;
    async fn conversation_participants(&self) -> StorageResult<Vec<ParticipantRow>>;
    /// Points the profile avatar at the photo and makes it the only primary.
    async fn promote_photo_to_avatar(&self, photo: &GalleryPhoto) -> StorageResult<()>;
    /// Makes `photo_id` the only primary photo of the user.
    async fn set_primary_photo(&self, user_id: &str, photo_id: &str) -> StorageResult<bool>;
    /// Deletes the row; a deleted primary hands the flag to the next photo by
    /// display order. `None` when the row does not exist.
    async fn remove_gallery_photo(
        &self,
        user_id: &str,
        photo_id: &str,
    ) -> StorageResult<Option<GalleryRemoval>>;
    async fn delete_matches(&self, match_ids: &[String]) -> StorageResult<u64>;
    async fn merge_conversations(
        &self,
        keep_id: &str,
        duplicate_ids: &[String],
    ) -> StorageResult<ConversationMerge>;
    async fn purge_conversation(&self, conversation_id: &str) -> StorageResult<ConversationPurge>;
    async fn record_resolution(&self, issue: NewSystemIssue) -> StorageResult<()>;
    async fn recent_resolutions(&self, limit: u64) -> StorageResult<Vec<SystemIssueRecord>>;
}

/// Existence check for uploaded objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn object_exists(&self, path: &str) -> StorageResult<bool>;
}
