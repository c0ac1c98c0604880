use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Tier every user falls back to when no subscription is active.
pub const FREE_TIER: &str = "free";

/// Daily super-like allotment of the free tier.
pub const FREE_TIER_DAILY_SUPERLIKES: i32 = 1;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PointTransactionKind {
    Purchase,
    Spend,
    Refund,
    Adjustment,
}

/// Derived entitlement fields stored on the user row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntitlements {
    pub user_id: String,
    pub stripe_customer_id: Option<String>,
    pub points_balance: i64,
    pub superlike_balance: i64,
    pub boost_expires_at: Option<DateTime<Utc>>,
    pub subscription_tier: String,
    pub subscription_plan_id: Option<String>,
    pub subscription_expires_at: Option<DateTime<Utc>>,
    pub daily_superlikes_remaining: i32,
    pub superlikes_reset_at: Option<DateTime<Utc>>,
}

/// A signed change to a user's points balance. Debits carry a negative
/// amount; with `floor_at_zero` the debit is clamped to the current balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointAdjustment {
    pub user_id: String,
    pub amount: i64,
    pub kind: PointTransactionKind,
    pub reference: Option<String>,
    pub floor_at_zero: bool,
    pub at: DateTime<Utc>,
}

impl PointAdjustment {
    pub fn credit(
        user_id: impl Into<String>,
        amount: i64,
        kind: PointTransactionKind,
        reference: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            amount,
            kind,
            reference,
            floor_at_zero: false,
            at,
        }
    }

    /// Floored spend of `amount` points (`amount` is positive).
    pub fn spend(
        user_id: impl Into<String>,
        amount: i64,
        reference: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            amount: -amount,
            kind: PointTransactionKind::Spend,
            reference,
            floor_at_zero: true,
            at,
        }
    }

    /// Resolves the delta that is actually applied against `balance`.
    pub fn effective_amount(&self, balance: i64) -> i64 {
        if self.floor_at_zero && balance.saturating_add(self.amount) < 0 {
            -balance.max(0)
        } else {
            self.amount
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointTransactionRecord {
    pub id: String,
    pub user_id: String,
    pub amount: i64,
    pub balance_after: i64,
    pub kind: PointTransactionKind,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySuperlikeReset {
    pub remaining: i32,
    pub reset_at: DateTime<Utc>,
}

/// Tier fields written to the user row in one update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierAssignment {
    pub tier: String,
    pub plan_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub daily_superlikes: Option<DailySuperlikeReset>,
}

impl TierAssignment {
    /// Downgrade to the free tier with a fresh free allotment.
    pub fn free(now: DateTime<Utc>) -> Self {
        Self {
            tier: FREE_TIER.to_string(),
            plan_id: None,
            expires_at: None,
            daily_superlikes: Some(DailySuperlikeReset {
                remaining: FREE_TIER_DAILY_SUPERLIKES,
                reset_at: next_local_midnight(now),
            }),
        }
    }
}

/// Next midnight in the server's local time zone, expressed in UTC.
pub fn next_local_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    next_midnight_in(now, &Local)
}

pub fn next_midnight_in<Tz: TimeZone>(now: DateTime<Utc>, tz: &Tz) -> DateTime<Utc> {
    let local_date = now.with_timezone(tz).date_naive();
    local_date
        .succ_opt()
        .map(|tomorrow| tomorrow.and_time(NaiveTime::MIN))
        .and_then(|midnight| tz.from_local_datetime(&midnight).earliest())
        .map(|midnight| midnight.with_timezone(&Utc))
        .unwrap_or_else(|| now + Duration::days(1))
}
