use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::model::{GiftDetails, LineItemTarget, PaymentMethod, SubscriptionStatus};

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const SUBSCRIPTION_CREATED: &str = "customer.subscription.created";
pub const SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";
pub const INVOICE_PAID: &str = "invoice.paid";
pub const INVOICE_PAYMENT_FAILED: &str = "invoice.payment_failed";

const EVENT_REGISTRATION: &str = "event_registration";
const DEFAULT_CURRENCY: &str = "usd";

#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("invalid event json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl EventDecodeError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// A processor event decoded once at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentEvent {
    pub id: String,
    pub event_type: String,
    pub created: Option<DateTime<Utc>>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    CheckoutCompleted(CheckoutSession),
    SubscriptionChanged(SubscriptionSnapshot),
    SubscriptionDeleted(SubscriptionSnapshot),
    InvoicePaid(InvoiceSummary),
    InvoicePaymentFailed(InvoiceSummary),
    Unhandled,
}

impl EventPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CheckoutCompleted(_) => "checkout_completed",
            Self::SubscriptionChanged(_) => "subscription_changed",
            Self::SubscriptionDeleted(_) => "subscription_deleted",
            Self::InvoicePaid(_) => "invoice_paid",
            Self::InvoicePaymentFailed(_) => "invoice_payment_failed",
            Self::Unhandled => "unhandled",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSession {
    pub session_id: String,
    pub payment_intent_id: Option<String>,
    pub customer_id: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub intent: CheckoutIntent,
}

/// What the merchant metadata says the checkout paid for.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutIntent {
    EventRegistration { user_id: String, event_id: String },
    Purchase(PurchaseMetadata),
}

impl CheckoutIntent {
    pub fn user_id(&self) -> &str {
        match self {
            Self::EventRegistration { user_id, .. } => user_id,
            Self::Purchase(purchase) => &purchase.user_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseMetadata {
    pub user_id: String,
    pub payment_method: PaymentMethod,
    pub points_to_deduct: i64,
    pub items: Vec<LineItem>,
    pub gift: Option<GiftDetails>,
    pub shipping_address: Option<String>,
}

/// One purchased line. `points_spent` and `amount_paid` are the line totals
/// declared at checkout; `amount_paid` is in minor units.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub target: LineItemTarget,
    pub quantity: i32,
    pub points_spent: i64,
    pub amount_paid: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionSnapshot {
    pub subscription_id: String,
    pub customer_id: String,
    pub status: SubscriptionStatus,
    pub price_id: Option<String>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceSummary {
    pub invoice_id: String,
    pub subscription_id: Option<String>,
    pub customer_id: Option<String>,
    pub amount_paid: i64,
    pub amount_due: i64,
    pub currency: String,
}

impl PaymentEvent {
    pub fn from_slice(payload: &[u8]) -> Result<Self, EventDecodeError> {
        let raw: RawEvent = serde_json::from_slice(payload)?;
        if raw.id.trim().is_empty() {
            return Err(EventDecodeError::MissingField("id"));
        }
        let created = raw.created.map(|ts| timestamp("created", ts)).transpose()?;

        let object = raw.data.object;
        let payload = match raw.event_type.as_str() {
            CHECKOUT_COMPLETED => EventPayload::CheckoutCompleted(decode_checkout(object)?),
            SUBSCRIPTION_CREATED | SUBSCRIPTION_UPDATED => {
                EventPayload::SubscriptionChanged(decode_subscription(object)?)
            }
            SUBSCRIPTION_DELETED => EventPayload::SubscriptionDeleted(decode_subscription(object)?),
            INVOICE_PAID => EventPayload::InvoicePaid(decode_invoice(object)?),
            INVOICE_PAYMENT_FAILED => EventPayload::InvoicePaymentFailed(decode_invoice(object)?),
            _ => EventPayload::Unhandled,
        };

        Ok(Self {
            id: raw.id,
            event_type: raw.event_type,
            created,
            payload,
        })
    }
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    created: Option<i64>,
    data: RawData,
}

#[derive(Deserialize)]
struct RawData {
    object: Value,
}

/// Processor references arrive either as a bare id or an expanded object.
#[derive(Deserialize)]
#[serde(untagged)]
enum IdOrObject {
    Id(String),
    Object { id: String },
}

impl IdOrObject {
    fn into_id(self) -> String {
        match self {
            Self::Id(id) | Self::Object { id } => id,
        }
    }
}

#[derive(Deserialize)]
struct RawCheckoutSession {
    id: String,
    #[serde(default)]
    payment_intent: Option<IdOrObject>,
    #[serde(default)]
    customer: Option<IdOrObject>,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    client_reference_id: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct RawLineItem {
    #[serde(default)]
    product_id: Option<String>,
    #[serde(default)]
    item_id: Option<String>,
    #[serde(default = "default_quantity")]
    quantity: i32,
    #[serde(default)]
    points: Option<i64>,
    #[serde(default)]
    price: Option<f64>,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Deserialize)]
struct RawSubscription {
    id: String,
    customer: IdOrObject,
    status: SubscriptionStatus,
    #[serde(default)]
    current_period_start: Option<i64>,
    #[serde(default)]
    current_period_end: Option<i64>,
    #[serde(default)]
    cancel_at_period_end: bool,
    #[serde(default)]
    canceled_at: Option<i64>,
    #[serde(default)]
    ended_at: Option<i64>,
    #[serde(default)]
    items: Option<RawList<RawSubscriptionItem>>,
}

#[derive(Deserialize)]
struct RawList<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Deserialize)]
struct RawSubscriptionItem {
    #[serde(default)]
    price: Option<IdOrObject>,
}

#[derive(Deserialize)]
struct RawInvoice {
    id: String,
    #[serde(default)]
    subscription: Option<IdOrObject>,
    #[serde(default)]
    customer: Option<IdOrObject>,
    #[serde(default)]
    amount_paid: Option<i64>,
    #[serde(default)]
    amount_due: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
}

fn decode_checkout(object: Value) -> Result<CheckoutSession, EventDecodeError> {
    let raw: RawCheckoutSession = serde_json::from_value(object)?;
    let metadata = &raw.metadata;

    let user_id = non_empty(metadata.get("user_id"))
        .or_else(|| non_empty(raw.client_reference_id.as_ref()))
        .ok_or(EventDecodeError::MissingField("metadata.user_id"))?;

    let intent = if non_empty(metadata.get("type")).as_deref() == Some(EVENT_REGISTRATION) {
        let event_id = non_empty(metadata.get("event_id"))
            .ok_or(EventDecodeError::MissingField("metadata.event_id"))?;
        CheckoutIntent::EventRegistration { user_id, event_id }
    } else {
        CheckoutIntent::Purchase(decode_purchase(user_id, metadata)?)
    };

    Ok(CheckoutSession {
        session_id: raw.id,
        payment_intent_id: raw.payment_intent.map(IdOrObject::into_id),
        customer_id: raw.customer.map(IdOrObject::into_id),
        amount_total: raw.amount_total,
        currency: raw.currency,
        intent,
    })
}

fn decode_purchase(
    user_id: String,
    metadata: &BTreeMap<String, String>,
) -> Result<PurchaseMetadata, EventDecodeError> {
    let payment_method = match non_empty(metadata.get("payment_method")) {
        Some(raw) => raw
            .parse::<PaymentMethod>()
            .map_err(|_| EventDecodeError::invalid("metadata.payment_method", raw))?,
        None => PaymentMethod::Stripe,
    };

    let points_to_deduct = match non_empty(metadata.get("points_to_deduct")) {
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .filter(|points| *points >= 0)
            .ok_or_else(|| EventDecodeError::invalid("metadata.points_to_deduct", raw))?,
        None => 0,
    };

    let items = match non_empty(metadata.get("items")) {
        Some(raw) => {
            let parsed: Vec<RawLineItem> = serde_json::from_str(&raw)
                .map_err(|err| EventDecodeError::invalid("metadata.items", err.to_string()))?;
            parsed
                .into_iter()
                .map(line_item)
                .collect::<Result<Vec<_>, _>>()?
        }
        None => Vec::new(),
    };

    let gift = (non_empty(metadata.get("is_gift")).as_deref() == Some("true")).then(|| {
        GiftDetails {
            recipient_id: non_empty(metadata.get("gift_recipient_id")),
            message: non_empty(metadata.get("gift_message")),
        }
    });

    Ok(PurchaseMetadata {
        user_id,
        payment_method,
        points_to_deduct,
        items,
        gift,
        shipping_address: non_empty(metadata.get("shipping_address")),
    })
}

fn line_item(raw: RawLineItem) -> Result<LineItem, EventDecodeError> {
    let target = match (
        non_empty(raw.product_id.as_ref()),
        non_empty(raw.item_id.as_ref()),
    ) {
        (Some(product_id), _) => LineItemTarget::Product(product_id),
        (None, Some(item_id)) => LineItemTarget::PurchasableItem(item_id),
        (None, None) => return Err(EventDecodeError::MissingField("items[].product_id")),
    };
    if raw.quantity < 1 {
        return Err(EventDecodeError::invalid(
            "items[].quantity",
            raw.quantity.to_string(),
        ));
    }
    let amount_paid = match raw.price {
        Some(price) if price.is_finite() && price >= 0.0 => (price * 100.0).round() as i64,
        Some(price) => return Err(EventDecodeError::invalid("items[].price", price.to_string())),
        None => 0,
    };
    Ok(LineItem {
        target,
        quantity: raw.quantity,
        points_spent: raw.points.unwrap_or(0).max(0),
        amount_paid,
    })
}

fn decode_subscription(object: Value) -> Result<SubscriptionSnapshot, EventDecodeError> {
    let raw: RawSubscription = serde_json::from_value(object)?;
    let price_id = raw
        .items
        .and_then(|items| items.data.into_iter().next())
        .and_then(|item| item.price)
        .map(IdOrObject::into_id);

    Ok(SubscriptionSnapshot {
        subscription_id: raw.id,
        customer_id: raw.customer.into_id(),
        status: raw.status,
        price_id,
        current_period_start: optional_timestamp("current_period_start", raw.current_period_start)?,
        current_period_end: optional_timestamp("current_period_end", raw.current_period_end)?,
        cancel_at_period_end: raw.cancel_at_period_end,
        canceled_at: optional_timestamp("canceled_at", raw.canceled_at)?,
        ended_at: optional_timestamp("ended_at", raw.ended_at)?,
    })
}

fn decode_invoice(object: Value) -> Result<InvoiceSummary, EventDecodeError> {
    let raw: RawInvoice = serde_json::from_value(object)?;
    Ok(InvoiceSummary {
        invoice_id: raw.id,
        subscription_id: raw.subscription.map(IdOrObject::into_id),
        customer_id: raw.customer.map(IdOrObject::into_id),
        amount_paid: raw.amount_paid.unwrap_or(0),
        amount_due: raw.amount_due.unwrap_or(0),
        currency: raw
            .currency
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
    })
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|raw| raw.trim())
        .filter(|raw| !raw.is_empty() && *raw != "null" && *raw != "undefined")
        .map(str::to_string)
}

fn timestamp(field: &'static str, secs: i64) -> Result<DateTime<Utc>, EventDecodeError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| EventDecodeError::invalid(field, secs.to_string()))
}

fn optional_timestamp(
    field: &'static str,
    secs: Option<i64>,
) -> Result<Option<DateTime<Utc>>, EventDecodeError> {
    secs.map(|secs| timestamp(field, secs)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: Value) -> Result<PaymentEvent, EventDecodeError> {
        PaymentEvent::from_slice(value.to_string().as_bytes())
    }

    fn checkout(metadata: Value) -> Value {
        json!({
            "id": "evt_checkout",
            "type": CHECKOUT_COMPLETED,
            "created": 1_700_000_000,
            "data": {"object": {
                "id": "cs_1",
                "payment_intent": "pi_1",
                "amount_total": 1999,
                "currency": "usd",
                "client_reference_id": "u_ref",
                "metadata": metadata,
            }}
        })
    }

    #[test]
    fn decodes_purchase_with_items_and_gift() {
        let event = decode(checkout(json!({
            "user_id": "u1",
            "payment_method": "both",
            "points_to_deduct": "150",
            "items": r#"[{"item_id":"sl5","quantity":2,"price":4.99},{"product_id":"p1","points":300}]"#,
            "is_gift": "true",
            "gift_recipient_id": "u2",
            "gift_message": "enjoy",
        })))
        .unwrap();

        let EventPayload::CheckoutCompleted(session) = event.payload else {
            panic!("expected checkout payload");
        };
        assert_eq!(session.session_id, "cs_1");
        assert_eq!(session.payment_intent_id.as_deref(), Some("pi_1"));
        let CheckoutIntent::Purchase(purchase) = session.intent else {
            panic!("expected purchase intent");
        };
        assert_eq!(purchase.user_id, "u1");
        assert_eq!(purchase.payment_method, PaymentMethod::Both);
        assert_eq!(purchase.points_to_deduct, 150);
        assert_eq!(purchase.items.len(), 2);
        assert_eq!(
            purchase.items[0].target,
            LineItemTarget::PurchasableItem("sl5".into())
        );
        assert_eq!(purchase.items[0].quantity, 2);
        assert_eq!(purchase.items[0].amount_paid, 499);
        assert_eq!(purchase.items[1].target, LineItemTarget::Product("p1".into()));
        assert_eq!(purchase.items[1].quantity, 1);
        assert_eq!(purchase.items[1].points_spent, 300);
        assert_eq!(
            purchase.gift,
            Some(GiftDetails {
                recipient_id: Some("u2".into()),
                message: Some("enjoy".into()),
            })
        );
    }

    #[test]
    fn falls_back_to_client_reference_id() {
        let event = decode(checkout(json!({}))).unwrap();
        let EventPayload::CheckoutCompleted(session) = event.payload else {
            panic!("expected checkout payload");
        };
        assert_eq!(session.intent.user_id(), "u_ref");
        let CheckoutIntent::Purchase(purchase) = session.intent else {
            panic!("expected purchase intent");
        };
        assert_eq!(purchase.payment_method, PaymentMethod::Stripe);
        assert!(purchase.items.is_empty());
        assert!(purchase.gift.is_none());
    }

    #[test]
    fn decodes_event_registration() {
        let event = decode(checkout(json!({
            "type": "event_registration",
            "user_id": "u1",
            "event_id": "ev_9",
        })))
        .unwrap();
        let EventPayload::CheckoutCompleted(session) = event.payload else {
            panic!("expected checkout payload");
        };
        assert_eq!(
            session.intent,
            CheckoutIntent::EventRegistration {
                user_id: "u1".into(),
                event_id: "ev_9".into(),
            }
        );
    }

    #[test]
    fn registration_without_event_id_is_rejected() {
        let err = decode(checkout(json!({"type": "event_registration"}))).unwrap_err();
        assert!(matches!(
            err,
            EventDecodeError::MissingField("metadata.event_id")
        ));
    }

    #[test]
    fn rejects_bad_metadata() {
        assert!(matches!(
            decode(checkout(json!({"payment_method": "cash"}))).unwrap_err(),
            EventDecodeError::InvalidField { field: "metadata.payment_method", .. }
        ));
        assert!(matches!(
            decode(checkout(json!({"points_to_deduct": "-5"}))).unwrap_err(),
            EventDecodeError::InvalidField { field: "metadata.points_to_deduct", .. }
        ));
        assert!(matches!(
            decode(checkout(json!({"items": "not json"}))).unwrap_err(),
            EventDecodeError::InvalidField { field: "metadata.items", .. }
        ));
        assert!(matches!(
            decode(checkout(json!({"items": r#"[{"item_id":"x","quantity":0}]"#}))).unwrap_err(),
            EventDecodeError::InvalidField { field: "items[].quantity", .. }
        ));
    }

    #[test]
    fn checkout_without_any_user_is_rejected() {
        let mut value = checkout(json!({}));
        value["data"]["object"]["client_reference_id"] = Value::Null;
        assert!(matches!(
            decode(value).unwrap_err(),
            EventDecodeError::MissingField("metadata.user_id")
        ));
    }

    #[test]
    fn decodes_subscription_snapshot() {
        let event = decode(json!({
            "id": "evt_123",
            "type": SUBSCRIPTION_UPDATED,
            "data": {"object": {
                "id": "sub_1",
                "customer": "cus_abc",
                "status": "active",
                "current_period_start": 1_697_408_000,
                "current_period_end": 1_700_000_000,
                "cancel_at_period_end": false,
                "items": {"data": [{"price": {"id": "price_monthly_premium"}}]},
            }}
        }))
        .unwrap();
        let EventPayload::SubscriptionChanged(snapshot) = event.payload else {
            panic!("expected subscription payload");
        };
        assert_eq!(snapshot.customer_id, "cus_abc");
        assert_eq!(snapshot.status, SubscriptionStatus::Active);
        assert_eq!(snapshot.price_id.as_deref(), Some("price_monthly_premium"));
        assert_eq!(
            snapshot.current_period_end.unwrap().to_rfc3339(),
            "2023-11-14T22:13:20+00:00"
        );
    }

    #[test]
    fn unknown_subscription_status_is_rejected() {
        let err = decode(json!({
            "id": "evt_1",
            "type": SUBSCRIPTION_DELETED,
            "data": {"object": {"id": "sub_1", "customer": "cus_1", "status": "melted"}}
        }))
        .unwrap_err();
        assert!(matches!(err, EventDecodeError::Json(_)));
    }

    #[test]
    fn decodes_invoice_with_expanded_subscription() {
        let event = decode(json!({
            "id": "evt_inv",
            "type": INVOICE_PAYMENT_FAILED,
            "data": {"object": {
                "id": "in_1",
                "subscription": {"id": "sub_1", "object": "subscription"},
                "amount_due": 999,
            }}
        }))
        .unwrap();
        let EventPayload::InvoicePaymentFailed(invoice) = event.payload else {
            panic!("expected invoice payload");
        };
        assert_eq!(invoice.subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(invoice.amount_due, 999);
        assert_eq!(invoice.amount_paid, 0);
        assert_eq!(invoice.currency, "usd");
    }

    #[test]
    fn other_types_are_unhandled() {
        let event = decode(json!({
            "id": "evt_x",
            "type": "charge.refunded",
            "data": {"object": {"anything": 1}}
        }))
        .unwrap();
        assert_eq!(event.payload, EventPayload::Unhandled);
    }

    #[test]
    fn malformed_envelope_is_rejected() {
        assert!(PaymentEvent::from_slice(b"{not json").is_err());
        assert!(matches!(
            decode(json!({"id": " ", "type": "x", "data": {"object": {}}})).unwrap_err(),
            EventDecodeError::MissingField("id")
        ));
    }
}
