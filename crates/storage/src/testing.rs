//! Seed helpers for tests. Every helper panics on database errors.

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{EntityTrait, Set};

use crate::entity::event_attendees::{self, AttendeeStatusDb};
use crate::entity::payments::{self, PaymentStatusDb};
use crate::entity::{
    conversation_participants, conversations, events, gallery_photos, matches, messages, products,
    profiles, purchasable_items, subscription_plans, users,
};
use crate::{new_id, SeaOrmStorage};

/// Fresh in-memory SQLite database with the schema applied. A single
/// pooled connection keeps every query on the same in-memory database.
pub async fn memory_storage() -> SeaOrmStorage {
    SeaOrmStorage::builder()
        .database_url("sqlite::memory:")
        .max_connections(1)
        .build()
        .await
        .expect("in-memory sqlite")
}

pub async fn seed_user(
    storage: &SeaOrmStorage,
    id: &str,
    stripe_customer_id: Option<&str>,
    points_balance: i64,
) {
    users::Entity::insert(users::ActiveModel {
        id: Set(id.to_string()),
        stripe_customer_id: Set(stripe_customer_id.map(str::to_string)),
        points_balance: Set(points_balance),
        superlike_balance: Set(0),
        boost_expires_at: Set(None),
        subscription_tier: Set(amora_domain::model::FREE_TIER.to_string()),
        subscription_plan_id: Set(None),
        subscription_expires_at: Set(None),
        daily_superlikes_remaining: Set(0),
        superlikes_reset_at: Set(None),
        entitlement_version: Set(0),
        created_at: Set(Utc::now()),
    })
    .exec_without_returning(storage.connection())
    .await
    .expect("seed user");
}

pub async fn seed_plan(
    storage: &SeaOrmStorage,
    id: &str,
    tier: &str,
    monthly_price: &str,
    yearly_price: &str,
    superlikes_per_day: i32,
) {
    subscription_plans::Entity::insert(subscription_plans::ActiveModel {
        id: Set(id.to_string()),
        name: Set(format!("{tier} plan")),
        tier: Set(tier.to_string()),
        stripe_price_id_monthly: Set(Some(monthly_price.to_string())),
        stripe_price_id_yearly: Set(Some(yearly_price.to_string())),
        superlikes_per_day: Set(superlikes_per_day),
    })
    .exec_without_returning(storage.connection())
    .await
    .expect("seed plan");
}

pub async fn seed_product(storage: &SeaOrmStorage, id: &str, stock_quantity: i32) {
    products::Entity::insert(products::ActiveModel {
        id: Set(id.to_string()),
        name: Set(format!("product {id}")),
        price: Set(2_000),
        stock_quantity: Set(stock_quantity),
    })
    .exec_without_returning(storage.connection())
    .await
    .expect("seed product");
}

pub async fn seed_item(
    storage: &SeaOrmStorage,
    id: &str,
    item_type: &str,
    quantity: i32,
    duration_hours: Option<i32>,
) {
    purchasable_items::Entity::insert(purchasable_items::ActiveModel {
        id: Set(id.to_string()),
        name: Set(format!("{item_type} x{quantity}")),
        item_type: Set(item_type.to_string()),
        quantity: Set(quantity),
        duration_hours: Set(duration_hours),
    })
    .exec_without_returning(storage.connection())
    .await
    .expect("seed purchasable item");
}

/// Profile with every matching field filled in.
pub async fn seed_profile(
    storage: &SeaOrmStorage,
    user_id: &str,
    first_name: Option<&str>,
    avatar_url: Option<&str>,
) {
    profiles::Entity::insert(profiles::ActiveModel {
        user_id: Set(user_id.to_string()),
        first_name: Set(first_name.map(str::to_string)),
        gender: Set(Some("female".to_string())),
        looking_for: Set(Some("male".to_string())),
        date_of_birth: Set(NaiveDate::from_ymd_opt(1994, 6, 1)),
        avatar_url: Set(avatar_url.map(str::to_string)),
    })
    .exec_without_returning(storage.connection())
    .await
    .expect("seed profile");
}

pub async fn seed_photo(
    storage: &SeaOrmStorage,
    id: &str,
    user_id: &str,
    storage_path: &str,
    is_primary: bool,
    display_order: i32,
) {
    gallery_photos::Entity::insert(gallery_photos::ActiveModel {
        id: Set(id.to_string()),
        user_id: Set(user_id.to_string()),
        storage_path: Set(storage_path.to_string()),
        is_primary: Set(is_primary),
        display_order: Set(display_order),
        created_at: Set(Utc::now()),
    })
    .exec_without_returning(storage.connection())
    .await
    .expect("seed gallery photo");
}

pub async fn seed_match(
    storage: &SeaOrmStorage,
    id: &str,
    user_id: &str,
    target_user_id: &str,
    created_at: DateTime<Utc>,
) {
    matches::Entity::insert(matches::ActiveModel {
        id: Set(id.to_string()),
        user_id: Set(user_id.to_string()),
        target_user_id: Set(target_user_id.to_string()),
        created_at: Set(created_at),
    })
    .exec_without_returning(storage.connection())
    .await
    .expect("seed match");
}

/// Direct conversation with the given participants and `message_count`
/// messages from the first participant.
pub async fn seed_conversation(
    storage: &SeaOrmStorage,
    id: &str,
    participants: &[&str],
    message_count: usize,
    created_at: DateTime<Utc>,
) {
    conversations::Entity::insert(conversations::ActiveModel {
        id: Set(id.to_string()),
        is_group: Set(false),
        created_at: Set(created_at),
    })
    .exec_without_returning(storage.connection())
    .await
    .expect("seed conversation");

    for user_id in participants {
        conversation_participants::Entity::insert(conversation_participants::ActiveModel {
            id: Set(new_id()),
            conversation_id: Set(id.to_string()),
            user_id: Set(user_id.to_string()),
        })
        .exec_without_returning(storage.connection())
        .await
        .expect("seed participant");
    }

    let sender = participants.first().copied().unwrap_or("system");
    for index in 0..message_count {
        messages::Entity::insert(messages::ActiveModel {
            id: Set(new_id()),
            conversation_id: Set(id.to_string()),
            sender_id: Set(sender.to_string()),
            body: Set(format!("message {index}")),
            created_at: Set(created_at),
        })
        .exec_without_returning(storage.connection())
        .await
        .expect("seed message");
    }
}

pub async fn seed_event_with_pending_attendee(
    storage: &SeaOrmStorage,
    event_id: &str,
    user_id: &str,
) {
    events::Entity::insert(events::ActiveModel {
        id: Set(event_id.to_string()),
        title: Set(format!("event {event_id}")),
        attendee_count: Set(0),
    })
    .exec_without_returning(storage.connection())
    .await
    .expect("seed event");

    event_attendees::Entity::insert(event_attendees::ActiveModel {
        id: Set(new_id()),
        event_id: Set(event_id.to_string()),
        user_id: Set(user_id.to_string()),
        status: Set(AttendeeStatusDb::PendingPayment),
        payment_id: Set(None),
    })
    .exec_without_returning(storage.connection())
    .await
    .expect("seed attendee");
}

/// Pending payment row written when the checkout session was created.
pub async fn seed_checkout_payment(
    storage: &SeaOrmStorage,
    session_id: &str,
    user_id: &str,
    amount: i64,
) {
    let now = Utc::now();
    payments::Entity::insert(payments::ActiveModel {
        id: Set(new_id()),
        user_id: Set(Some(user_id.to_string())),
        stripe_session_id: Set(Some(session_id.to_string())),
        stripe_payment_intent_id: Set(None),
        stripe_invoice_id: Set(None),
        stripe_subscription_id: Set(None),
        amount: Set(amount),
        currency: Set("usd".to_string()),
        status: Set(PaymentStatusDb::Pending),
        created_at: Set(now),
        updated_at: Set(now),
    })
    .exec_without_returning(storage.connection())
    .await
    .expect("seed checkout payment");
}

/// Attendee status for assertions in dependent crates.
pub async fn attendee_status(
    storage: &SeaOrmStorage,
    event_id: &str,
    user_id: &str,
) -> Option<String> {
    use sea_orm::{ActiveEnum, ColumnTrait, QueryFilter};

    event_attendees::Entity::find()
        .filter(event_attendees::Column::EventId.eq(event_id))
        .filter(event_attendees::Column::UserId.eq(user_id))
        .one(storage.connection())
        .await
        .expect("load attendee")
        .map(|attendee| attendee.status.to_value())
}

pub async fn product_stock(storage: &SeaOrmStorage, product_id: &str) -> Option<i32> {
    products::Entity::find_by_id(product_id.to_string())
        .one(storage.connection())
        .await
        .expect("load product")
        .map(|product| product.stock_quantity)
}
