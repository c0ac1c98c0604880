use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

/// How a checkout was settled. `Both` means card plus a points debit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethod {
    Stripe,
    Points,
    Both,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

/// Kind of digital item. Unknown catalog types are carried verbatim so the
/// inventory row keeps the catalog's name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemType {
    SuperlikePack,
    Boost,
    PointsPack,
    Other(String),
}

impl ItemType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "superlike_pack" => Self::SuperlikePack,
            "boost" => Self::Boost,
            "points_pack" => Self::PointsPack,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::SuperlikePack => "superlike_pack",
            Self::Boost => "boost",
            Self::PointsPack => "points_pack",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub id: String,
    pub user_id: Option<String>,
    pub stripe_session_id: Option<String>,
    pub stripe_payment_intent_id: Option<String>,
    pub stripe_invoice_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub user_id: Option<String>,
    pub stripe_session_id: Option<String>,
    pub stripe_payment_intent_id: Option<String>,
    pub stripe_invoice_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// What a purchased line refers to: a shipped product or a digital item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineItemTarget {
    Product(String),
    PurchasableItem(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiftDetails {
    pub recipient_id: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: String,
    pub target: LineItemTarget,
    pub quantity: i32,
    pub points_spent: i64,
    pub amount_paid: i64,
    pub payment_method: PaymentMethod,
    pub gift: Option<GiftDetails>,
    pub shipping_address: Option<String>,
    pub stripe_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    pub id: String,
    pub user_id: String,
    pub product_id: Option<String>,
    pub purchasable_item_id: Option<String>,
    pub quantity: i32,
    pub points_spent: i64,
    pub amount_paid: i64,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub is_gift: bool,
    pub gift_recipient_id: Option<String>,
    pub gift_message: Option<String>,
    pub shipping_address: Option<String>,
    pub stripe_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchasableItem {
    pub id: String,
    pub name: String,
    pub item_type: ItemType,
    /// Units granted per purchased item, e.g. 5 for a five-pack.
    pub quantity: i32,
    pub duration_hours: Option<i32>,
}
