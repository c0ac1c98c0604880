use amora_domain::model::{
    ItemType, LineItemTarget, NewOrder, NewPayment, OrderRecord, OrderStatus, PaymentMethod,
    PaymentRecord, PaymentStatus, PurchasableItem,
};
use amora_domain::storage::{CommerceStore, StorageResult};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveEnum, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};

use crate::entity::event_attendees::{self, AttendeeStatusDb};
use crate::entity::orders::{self, OrderStatusDb, PaymentMethodDb};
use crate::entity::payments::{self, PaymentStatusDb};
use crate::entity::{events, products, purchasable_items};
use crate::errors::{conflict, db_error, StorageError, MAX_CAS_ATTEMPTS};
use crate::{new_id, SeaOrmStorage};

#[async_trait::async_trait]
impl CommerceStore for SeaOrmStorage {
    async fn mark_checkout_paid(
        &self,
        session_id: &str,
        payment_intent_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> StorageResult<Option<PaymentRecord>> {
        let mut update = payments::Entity::update_many()
            .col_expr(
                payments::Column::Status,
                Expr::value(PaymentStatusDb::Succeeded.to_value()),
            )
            .col_expr(payments::Column::UpdatedAt, Expr::value(at));
        if let Some(intent) = payment_intent_id {
            update = update.col_expr(
                payments::Column::StripePaymentIntentId,
                Expr::value(intent.to_string()),
            );
        }
        let result = update
            .filter(payments::Column::StripeSessionId.eq(session_id))
            .exec(self.connection())
            .await
            .map_err(db_error)?;
        if result.rows_affected == 0 {
            return Ok(None);
        }

        let updated = payments::Entity::find()
            .filter(payments::Column::StripeSessionId.eq(session_id))
            .order_by_asc(payments::Column::CreatedAt)
            .one(self.connection())
            .await
            .map_err(db_error)?;
        Ok(updated.map(payment_to_record))
    }

    async fn insert_payment(&self, payment: NewPayment) -> StorageResult<PaymentRecord> {
        let id = new_id();
        let model = payments::ActiveModel {
            id: Set(id.clone()),
            user_id: Set(payment.user_id),
            stripe_session_id: Set(payment.stripe_session_id),
            stripe_payment_intent_id: Set(payment.stripe_payment_intent_id),
            stripe_invoice_id: Set(payment.stripe_invoice_id),
            stripe_subscription_id: Set(payment.stripe_subscription_id),
            amount: Set(payment.amount),
            currency: Set(payment.currency),
            status: Set(payment.status.into()),
            created_at: Set(payment.created_at),
            updated_at: Set(payment.created_at),
        };
        payments::Entity::insert(model)
            .exec_without_returning(self.connection())
            .await
            .map_err(db_error)?;
        let inserted = payments::Entity::find_by_id(id.clone())
            .one(self.connection())
            .await
            .map_err(db_error)?
            .ok_or_else(|| StorageError::Database(format!("payment {id} vanished after insert")))?;
        Ok(payment_to_record(inserted))
    }

    async fn payments_for_session(&self, session_id: &str) -> StorageResult<Vec<PaymentRecord>> {
        let rows = payments::Entity::find()
            .filter(payments::Column::StripeSessionId.eq(session_id))
            .order_by_asc(payments::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(payment_to_record).collect())
    }

    async fn payments_for_subscription(
        &self,
        stripe_subscription_id: &str,
    ) -> StorageResult<Vec<PaymentRecord>> {
        let rows = payments::Entity::find()
            .filter(payments::Column::StripeSubscriptionId.eq(stripe_subscription_id))
            .order_by_asc(payments::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(payment_to_record).collect())
    }

    async fn register_attendee(
        &self,
        event_id: &str,
        user_id: &str,
        payment_id: Option<&str>,
    ) -> StorageResult<bool> {
        let txn = self.connection().begin().await.map_err(db_error)?;

        let mut update = event_attendees::Entity::update_many().col_expr(
            event_attendees::Column::Status,
            Expr::value(AttendeeStatusDb::Registered.to_value()),
        );
        if let Some(payment_id) = payment_id {
            update = update.col_expr(
                event_attendees::Column::PaymentId,
                Expr::value(payment_id.to_string()),
            );
        }
        let registered = update
            .filter(event_attendees::Column::EventId.eq(event_id))
            .filter(event_attendees::Column::UserId.eq(user_id))
            .filter(event_attendees::Column::Status.eq(AttendeeStatusDb::PendingPayment))
            .exec(&txn)
            .await
            .map_err(db_error)?;

        if registered.rows_affected == 0 {
            txn.rollback().await.map_err(db_error)?;
            return Ok(false);
        }

        events::Entity::update_many()
            .col_expr(
                events::Column::AttendeeCount,
                Expr::col(events::Column::AttendeeCount).add(1),
            )
            .filter(events::Column::Id.eq(event_id))
            .exec(&txn)
            .await
            .map_err(db_error)?;

        txn.commit().await.map_err(db_error)?;
        Ok(true)
    }

    async fn create_order(&self, order: NewOrder) -> StorageResult<OrderRecord> {
        let (product_id, purchasable_item_id) = match order.target {
            LineItemTarget::Product(id) => (Some(id), None),
            LineItemTarget::PurchasableItem(id) => (None, Some(id)),
        };
        let (is_gift, gift_recipient_id, gift_message) = match order.gift {
            Some(gift) => (true, gift.recipient_id, gift.message),
            None => (false, None, None),
        };
        let id = new_id();
        let model = orders::ActiveModel {
            id: Set(id.clone()),
            user_id: Set(order.user_id),
            product_id: Set(product_id),
            purchasable_item_id: Set(purchasable_item_id),
            quantity: Set(order.quantity),
            points_spent: Set(order.points_spent),
            amount_paid: Set(order.amount_paid),
            payment_method: Set(order.payment_method.into()),
            status: Set(OrderStatusDb::Processing),
            is_gift: Set(is_gift),
            gift_recipient_id: Set(gift_recipient_id),
            gift_message: Set(gift_message),
            shipping_address: Set(order.shipping_address),
            stripe_session_id: Set(order.stripe_session_id),
            created_at: Set(order.created_at),
        };
        orders::Entity::insert(model)
            .exec_without_returning(self.connection())
            .await
            .map_err(db_error)?;
        let inserted = orders::Entity::find_by_id(id.clone())
            .one(self.connection())
            .await
            .map_err(db_error)?
            .ok_or_else(|| StorageError::Database(format!("order {id} vanished after insert")))?;
        Ok(order_to_record(inserted))
    }

    async fn orders_for_user(&self, user_id: &str) -> StorageResult<Vec<OrderRecord>> {
        let rows = orders::Entity::find()
            .filter(orders::Column::UserId.eq(user_id))
            .order_by_asc(orders::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(order_to_record).collect())
    }

    async fn find_purchasable_item(
        &self,
        item_id: &str,
    ) -> StorageResult<Option<PurchasableItem>> {
        let maybe = purchasable_items::Entity::find_by_id(item_id.to_string())
            .one(self.connection())
            .await
            .map_err(db_error)?;
        Ok(maybe.map(|item| PurchasableItem {
            id: item.id,
            name: item.name,
            item_type: ItemType::parse(&item.item_type),
            quantity: item.quantity,
            duration_hours: item.duration_hours,
        }))
    }

    async fn decrement_stock(
        &self,
        product_id: &str,
        quantity: i32,
    ) -> StorageResult<Option<i32>> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(product) = products::Entity::find_by_id(product_id.to_string())
                .one(self.connection())
                .await
                .map_err(db_error)?
            else {
                return Ok(None);
            };

            let remaining = product.stock_quantity.saturating_sub(quantity).max(0);
            let swapped = products::Entity::update_many()
                .col_expr(products::Column::StockQuantity, Expr::value(remaining))
                .filter(products::Column::Id.eq(product_id))
                .filter(products::Column::StockQuantity.eq(product.stock_quantity))
                .exec(self.connection())
                .await
                .map_err(db_error)?;
            if swapped.rows_affected == 1 {
                return Ok(Some(remaining));
            }
        }
        Err(conflict(format!("products.stock_quantity ({product_id})")))
    }
}

impl From<PaymentStatus> for PaymentStatusDb {
    fn from(value: PaymentStatus) -> Self {
        match value {
            PaymentStatus::Pending => Self::Pending,
            PaymentStatus::Succeeded => Self::Succeeded,
            PaymentStatus::Failed => Self::Failed,
        }
    }
}

impl From<PaymentStatusDb> for PaymentStatus {
    fn from(value: PaymentStatusDb) -> Self {
        match value {
            PaymentStatusDb::Pending => Self::Pending,
            PaymentStatusDb::Succeeded => Self::Succeeded,
            PaymentStatusDb::Failed => Self::Failed,
        }
    }
}

impl From<PaymentMethod> for PaymentMethodDb {
    fn from(value: PaymentMethod) -> Self {
        match value {
            PaymentMethod::Stripe => Self::Stripe,
            PaymentMethod::Points => Self::Points,
            PaymentMethod::Both => Self::Both,
        }
    }
}

impl From<PaymentMethodDb> for PaymentMethod {
    fn from(value: PaymentMethodDb) -> Self {
        match value {
            PaymentMethodDb::Stripe => Self::Stripe,
            PaymentMethodDb::Points => Self::Points,
            PaymentMethodDb::Both => Self::Both,
        }
    }
}

impl From<OrderStatusDb> for OrderStatus {
    fn from(value: OrderStatusDb) -> Self {
        match value {
            OrderStatusDb::Processing => Self::Processing,
            OrderStatusDb::Shipped => Self::Shipped,
            OrderStatusDb::Delivered => Self::Delivered,
            OrderStatusDb::Cancelled => Self::Cancelled,
        }
    }
}

fn payment_to_record(model: payments::Model) -> PaymentRecord {
    PaymentRecord {
        id: model.id,
        user_id: model.user_id,
        stripe_session_id: model.stripe_session_id,
        stripe_payment_intent_id: model.stripe_payment_intent_id,
        stripe_invoice_id: model.stripe_invoice_id,
        stripe_subscription_id: model.stripe_subscription_id,
        amount: model.amount,
        currency: model.currency,
        status: model.status.into(),
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

fn order_to_record(model: orders::Model) -> OrderRecord {
    OrderRecord {
        id: model.id,
        user_id: model.user_id,
        product_id: model.product_id,
        purchasable_item_id: model.purchasable_item_id,
        quantity: model.quantity,
        points_spent: model.points_spent,
        amount_paid: model.amount_paid,
        payment_method: model.payment_method.into(),
        status: model.status.into(),
        is_gift: model.is_gift,
        gift_recipient_id: model.gift_recipient_id,
        gift_message: model.gift_message,
        shipping_address: model.shipping_address,
        stripe_session_id: model.stripe_session_id,
        created_at: model.created_at,
    }
}
