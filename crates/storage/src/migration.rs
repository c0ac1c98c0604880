use sea_orm::sea_query::{ColumnDef, Index, IndexCreateStatement, Table, TableCreateStatement};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection};

use crate::entity::{
    conversation_participants, conversations, event_attendees, events, gallery_photos, matches,
    messages, orders, payments, point_transactions, products, profiles, purchasable_items,
    subscription_plans, subscriptions, system_issues, user_inventory, users, webhook_events,
};
use crate::errors::StorageError;
use amora_domain::storage::StorageResult;

pub async fn run_migrations(db: &DatabaseConnection) -> StorageResult<()> {
    let backend = db.get_database_backend();

    for table in tables() {
        create_table(db, backend, table).await?;
    }
    for index in indexes() {
        create_index(db, backend, index).await?;
    }
    Ok(())
}

fn tables() -> Vec<TableCreateStatement> {
    vec![
        Table::create()
            .table(webhook_events::Entity)
            .col(&mut pk(webhook_events::Column::Id))
            .col(
                ColumnDef::new(webhook_events::Column::EventType)
                    .string_len(128)
                    .not_null(),
            )
            .col(ColumnDef::new(webhook_events::Column::Payload).text().not_null())
            .col(
                ColumnDef::new(webhook_events::Column::Status)
                    .string_len(16)
                    .not_null(),
            )
            .col(ColumnDef::new(webhook_events::Column::Error).text().null())
            .col(&mut timestamp(webhook_events::Column::ReceivedAt))
            .col(&mut timestamp_null(webhook_events::Column::ProcessedAt))
            .to_owned(),
        Table::create()
            .table(payments::Entity)
            .col(&mut pk(payments::Column::Id))
            .col(ColumnDef::new(payments::Column::UserId).string().null())
            .col(ColumnDef::new(payments::Column::StripeSessionId).string().null())
            .col(
                ColumnDef::new(payments::Column::StripePaymentIntentId)
                    .string()
                    .null(),
            )
            .col(ColumnDef::new(payments::Column::StripeInvoiceId).string().null())
            .col(
                ColumnDef::new(payments::Column::StripeSubscriptionId)
                    .string()
                    .null(),
            )
            .col(ColumnDef::new(payments::Column::Amount).big_integer().not_null())
            .col(
                ColumnDef::new(payments::Column::Currency)
                    .string_len(8)
                    .not_null(),
            )
            .col(
                ColumnDef::new(payments::Column::Status)
                    .string_len(16)
                    .not_null(),
            )
            .col(&mut timestamp(payments::Column::CreatedAt))
            .col(&mut timestamp(payments::Column::UpdatedAt))
            .to_owned(),
        Table::create()
            .table(products::Entity)
            .col(&mut pk(products::Column::Id))
            .col(ColumnDef::new(products::Column::Name).string().not_null())
            .col(
                ColumnDef::new(products::Column::Price)
                    .big_integer()
                    .not_null()
                    .default(0),
            )
            .col(
                ColumnDef::new(products::Column::StockQuantity)
                    .integer()
                    .not_null()
                    .default(0),
            )
            .to_owned(),
        Table::create()
            .table(purchasable_items::Entity)
            .col(&mut pk(purchasable_items::Column::Id))
            .col(ColumnDef::new(purchasable_items::Column::Name).string().not_null())
            .col(
                ColumnDef::new(purchasable_items::Column::ItemType)
                    .string_len(64)
                    .not_null(),
            )
            .col(
                ColumnDef::new(purchasable_items::Column::Quantity)
                    .integer()
                    .not_null()
                    .default(1),
            )
            .col(
                ColumnDef::new(purchasable_items::Column::DurationHours)
                    .integer()
                    .null(),
            )
            .to_owned(),
        Table::create()
            .table(orders::Entity)
            .col(&mut pk(orders::Column::Id))
            .col(ColumnDef::new(orders::Column::UserId).string().not_null())
            .col(ColumnDef::new(orders::Column::ProductId).string().null())
            .col(ColumnDef::new(orders::Column::PurchasableItemId).string().null())
            .col(ColumnDef::new(orders::Column::Quantity).integer().not_null())
            .col(
                ColumnDef::new(orders::Column::PointsSpent)
                    .big_integer()
                    .not_null()
                    .default(0),
            )
            .col(
                ColumnDef::new(orders::Column::AmountPaid)
                    .big_integer()
                    .not_null()
                    .default(0),
            )
            .col(
                ColumnDef::new(orders::Column::PaymentMethod)
                    .string_len(16)
                    .not_null(),
            )
            .col(ColumnDef::new(orders::Column::Status).string_len(16).not_null())
            .col(
                ColumnDef::new(orders::Column::IsGift)
                    .boolean()
                    .not_null()
                    .default(false),
            )
            .col(ColumnDef::new(orders::Column::GiftRecipientId).string().null())
            .col(ColumnDef::new(orders::Column::GiftMessage).text().null())
            .col(ColumnDef::new(orders::Column::ShippingAddress).text().null())
            .col(ColumnDef::new(orders::Column::StripeSessionId).string().null())
            .col(&mut timestamp(orders::Column::CreatedAt))
            .to_owned(),
        Table::create()
            .table(user_inventory::Entity)
            .col(ColumnDef::new(user_inventory::Column::UserId).string().not_null())
            .col(
                ColumnDef::new(user_inventory::Column::ItemType)
                    .string_len(64)
                    .not_null(),
            )
            .col(
                ColumnDef::new(user_inventory::Column::Quantity)
                    .big_integer()
                    .not_null()
                    .default(0),
            )
            .col(&mut timestamp(user_inventory::Column::UpdatedAt))
            .primary_key(
                Index::create()
                    .col(user_inventory::Column::UserId)
                    .col(user_inventory::Column::ItemType),
            )
            .to_owned(),
        Table::create()
            .table(users::Entity)
            .col(&mut pk(users::Column::Id))
            .col(ColumnDef::new(users::Column::StripeCustomerId).string().null())
            .col(
                ColumnDef::new(users::Column::PointsBalance)
                    .big_integer()
                    .not_null()
                    .default(0),
            )
            .col(
                ColumnDef::new(users::Column::SuperlikeBalance)
                    .big_integer()
                    .not_null()
                    .default(0),
            )
            .col(&mut timestamp_null(users::Column::BoostExpiresAt))
            .col(
                ColumnDef::new(users::Column::SubscriptionTier)
                    .string_len(32)
                    .not_null()
                    .default("free"),
            )
            .col(ColumnDef::new(users::Column::SubscriptionPlanId).string().null())
            .col(&mut timestamp_null(users::Column::SubscriptionExpiresAt))
            .col(
                ColumnDef::new(users::Column::DailySuperlikesRemaining)
                    .integer()
                    .not_null()
                    .default(0),
            )
            .col(&mut timestamp_null(users::Column::SuperlikesResetAt))
            .col(
                ColumnDef::new(users::Column::EntitlementVersion)
                    .big_integer()
                    .not_null()
                    .default(0),
            )
            .col(&mut timestamp(users::Column::CreatedAt))
            .to_owned(),
        Table::create()
            .table(point_transactions::Entity)
            .col(&mut pk(point_transactions::Column::Id))
            .col(
                ColumnDef::new(point_transactions::Column::UserId)
                    .string()
                    .not_null(),
            )
            .col(
                ColumnDef::new(point_transactions::Column::Amount)
                    .big_integer()
                    .not_null(),
            )
            .col(
                ColumnDef::new(point_transactions::Column::BalanceAfter)
                    .big_integer()
                    .not_null(),
            )
            .col(
                ColumnDef::new(point_transactions::Column::Kind)
                    .string_len(16)
                    .not_null(),
            )
            .col(
                ColumnDef::new(point_transactions::Column::Reference)
                    .string()
                    .null(),
            )
            .col(&mut timestamp(point_transactions::Column::CreatedAt))
            .to_owned(),
        Table::create()
            .table(subscription_plans::Entity)
            .col(&mut pk(subscription_plans::Column::Id))
            .col(ColumnDef::new(subscription_plans::Column::Name).string().not_null())
            .col(
                ColumnDef::new(subscription_plans::Column::Tier)
                    .string_len(32)
                    .not_null(),
            )
            .col(
                ColumnDef::new(subscription_plans::Column::StripePriceIdMonthly)
                    .string()
                    .null(),
            )
            .col(
                ColumnDef::new(subscription_plans::Column::StripePriceIdYearly)
                    .string()
                    .null(),
            )
            .col(
                ColumnDef::new(subscription_plans::Column::SuperlikesPerDay)
                    .integer()
                    .not_null()
                    .default(0),
            )
            .to_owned(),
        Table::create()
            .table(subscriptions::Entity)
            .col(&mut pk(subscriptions::Column::StripeSubscriptionId))
            .col(ColumnDef::new(subscriptions::Column::UserId).string().not_null())
            .col(ColumnDef::new(subscriptions::Column::PlanId).string().null())
            .col(
                ColumnDef::new(subscriptions::Column::StripeCustomerId)
                    .string()
                    .not_null(),
            )
            .col(
                ColumnDef::new(subscriptions::Column::Status)
                    .string_len(32)
                    .not_null(),
            )
            .col(&mut timestamp_null(subscriptions::Column::CurrentPeriodStart))
            .col(&mut timestamp_null(subscriptions::Column::CurrentPeriodEnd))
            .col(
                ColumnDef::new(subscriptions::Column::CancelAtPeriodEnd)
                    .boolean()
                    .not_null()
                    .default(false),
            )
            .col(&mut timestamp_null(subscriptions::Column::CanceledAt))
            .col(&mut timestamp_null(subscriptions::Column::EndedAt))
            .col(&mut timestamp(subscriptions::Column::UpdatedAt))
            .to_owned(),
        Table::create()
            .table(events::Entity)
            .col(&mut pk(events::Column::Id))
            .col(ColumnDef::new(events::Column::Title).string().not_null())
            .col(
                ColumnDef::new(events::Column::AttendeeCount)
                    .integer()
                    .not_null()
                    .default(0),
            )
            .to_owned(),
        Table::create()
            .table(event_attendees::Entity)
            .col(&mut pk(event_attendees::Column::Id))
            .col(ColumnDef::new(event_attendees::Column::EventId).string().not_null())
            .col(ColumnDef::new(event_attendees::Column::UserId).string().not_null())
            .col(
                ColumnDef::new(event_attendees::Column::Status)
                    .string_len(32)
                    .not_null(),
            )
            .col(ColumnDef::new(event_attendees::Column::PaymentId).string().null())
            .to_owned(),
        Table::create()
            .table(profiles::Entity)
            .col(&mut pk(profiles::Column::UserId))
            .col(ColumnDef::new(profiles::Column::FirstName).string().null())
            .col(ColumnDef::new(profiles::Column::Gender).string_len(32).null())
            .col(ColumnDef::new(profiles::Column::LookingFor).string_len(32).null())
            .col(ColumnDef::new(profiles::Column::DateOfBirth).date().null())
            .col(ColumnDef::new(profiles::Column::AvatarUrl).text().null())
            .to_owned(),
        Table::create()
            .table(gallery_photos::Entity)
            .col(&mut pk(gallery_photos::Column::Id))
            .col(ColumnDef::new(gallery_photos::Column::UserId).string().not_null())
            .col(ColumnDef::new(gallery_photos::Column::StoragePath).text().not_null())
            .col(
                ColumnDef::new(gallery_photos::Column::IsPrimary)
                    .boolean()
                    .not_null()
                    .default(false),
            )
            .col(
                ColumnDef::new(gallery_photos::Column::DisplayOrder)
                    .integer()
                    .not_null()
                    .default(0),
            )
            .col(&mut timestamp(gallery_photos::Column::CreatedAt))
            .to_owned(),
        Table::create()
            .table(matches::Entity)
            .col(&mut pk(matches::Column::Id))
            .col(ColumnDef::new(matches::Column::UserId).string().not_null())
            .col(ColumnDef::new(matches::Column::TargetUserId).string().not_null())
            .col(&mut timestamp(matches::Column::CreatedAt))
            .to_owned(),
        Table::create()
            .table(conversations::Entity)
            .col(&mut pk(conversations::Column::Id))
            .col(
                ColumnDef::new(conversations::Column::IsGroup)
                    .boolean()
                    .not_null()
                    .default(false),
            )
            .col(&mut timestamp(conversations::Column::CreatedAt))
            .to_owned(),
        Table::create()
            .table(conversation_participants::Entity)
            .col(&mut pk(conversation_participants::Column::Id))
            .col(
                ColumnDef::new(conversation_participants::Column::ConversationId)
                    .string()
                    .not_null(),
            )
            .col(
                ColumnDef::new(conversation_participants::Column::UserId)
                    .string()
                    .not_null(),
            )
            .to_owned(),
        Table::create()
            .table(messages::Entity)
            .col(&mut pk(messages::Column::Id))
            .col(
                ColumnDef::new(messages::Column::ConversationId)
                    .string()
                    .not_null(),
            )
            .col(ColumnDef::new(messages::Column::SenderId).string().not_null())
            .col(ColumnDef::new(messages::Column::Body).text().not_null())
            .col(&mut timestamp(messages::Column::CreatedAt))
            .to_owned(),
        Table::create()
            .table(system_issues::Entity)
            .col(&mut pk(system_issues::Column::Id))
            .col(
                ColumnDef::new(system_issues::Column::IssueType)
                    .string_len(64)
                    .not_null(),
            )
            .col(ColumnDef::new(system_issues::Column::UserId).string().null())
            .col(ColumnDef::new(system_issues::Column::Context).text().not_null())
            .col(&mut timestamp(system_issues::Column::ResolvedAt))
            .to_owned(),
    ]
}

fn indexes() -> Vec<IndexCreateStatement> {
    vec![
        Index::create()
            .name("idx_payments_session")
            .table(payments::Entity)
            .col(payments::Column::StripeSessionId)
            .to_owned(),
        Index::create()
            .name("idx_payments_subscription")
            .table(payments::Entity)
            .col(payments::Column::StripeSubscriptionId)
            .to_owned(),
        Index::create()
            .name("idx_users_customer")
            .table(users::Entity)
            .col(users::Column::StripeCustomerId)
            .to_owned(),
        Index::create()
            .name("idx_point_transactions_user")
            .table(point_transactions::Entity)
            .col(point_transactions::Column::UserId)
            .to_owned(),
        Index::create()
            .name("idx_orders_user")
            .table(orders::Entity)
            .col(orders::Column::UserId)
            .to_owned(),
        Index::create()
            .name("idx_event_attendees_event_user")
            .table(event_attendees::Entity)
            .col(event_attendees::Column::EventId)
            .col(event_attendees::Column::UserId)
            .to_owned(),
        Index::create()
            .name("idx_gallery_photos_user")
            .table(gallery_photos::Entity)
            .col(gallery_photos::Column::UserId)
            .to_owned(),
        Index::create()
            .name("idx_matches_pair")
            .table(matches::Entity)
            .col(matches::Column::UserId)
            .col(matches::Column::TargetUserId)
            .to_owned(),
        Index::create()
            .name("idx_participants_conversation")
            .table(conversation_participants::Entity)
            .col(conversation_participants::Column::ConversationId)
            .to_owned(),
        Index::create()
            .name("idx_messages_conversation")
            .table(messages::Entity)
            .col(messages::Column::ConversationId)
            .to_owned(),
    ]
}

fn pk<C: sea_orm::sea_query::IntoIden>(column: C) -> ColumnDef {
    ColumnDef::new(column)
        .string_len(64)
        .not_null()
        .primary_key()
        .to_owned()
}

fn timestamp<C: sea_orm::sea_query::IntoIden>(column: C) -> ColumnDef {
    ColumnDef::new(column)
        .timestamp_with_time_zone()
        .not_null()
        .to_owned()
}

fn timestamp_null<C: sea_orm::sea_query::IntoIden>(column: C) -> ColumnDef {
    ColumnDef::new(column)
        .timestamp_with_time_zone()
        .null()
        .to_owned()
}

async fn create_table(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: TableCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}

async fn create_index(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: IndexCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}
