use amora_domain::model::{
    SubscriptionPlan, SubscriptionRecord, SubscriptionStatus, SubscriptionUpsert,
};
use amora_domain::storage::{StorageResult, SubscriptionStore};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ActiveEnum, ColumnTrait, Condition, EntityTrait, QueryFilter, Set};

use crate::entity::subscription_plans;
use crate::entity::subscriptions::{self, SubscriptionStatusDb};
use crate::errors::db_error;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl SubscriptionStore for SeaOrmStorage {
    async fn find_plan_by_price(&self, price_id: &str) -> StorageResult<Option<SubscriptionPlan>> {
        let maybe = subscription_plans::Entity::find()
            .filter(
                Condition::any()
                    .add(subscription_plans::Column::StripePriceIdMonthly.eq(price_id))
                    .add(subscription_plans::Column::StripePriceIdYearly.eq(price_id)),
            )
            .one(self.connection())
            .await
            .map_err(db_error)?;
        Ok(maybe.map(|plan| SubscriptionPlan {
            id: plan.id,
            name: plan.name,
            tier: plan.tier,
            stripe_price_id_monthly: plan.stripe_price_id_monthly,
            stripe_price_id_yearly: plan.stripe_price_id_yearly,
            superlikes_per_day: plan.superlikes_per_day,
        }))
    }

    async fn upsert_subscription(&self, subscription: SubscriptionUpsert) -> StorageResult<()> {
        let model = subscriptions::ActiveModel {
            stripe_subscription_id: Set(subscription.stripe_subscription_id),
            user_id: Set(subscription.user_id),
            plan_id: Set(subscription.plan_id),
            stripe_customer_id: Set(subscription.stripe_customer_id),
            status: Set(subscription.status.into()),
            current_period_start: Set(subscription.current_period_start),
            current_period_end: Set(subscription.current_period_end),
            cancel_at_period_end: Set(subscription.cancel_at_period_end),
            canceled_at: Set(subscription.canceled_at),
            ended_at: Set(None),
            updated_at: Set(subscription.updated_at),
        };
        subscriptions::Entity::insert(model)
            .on_conflict(
                OnConflict::column(subscriptions::Column::StripeSubscriptionId)
                    .update_columns([
                        subscriptions::Column::UserId,
                        subscriptions::Column::PlanId,
                        subscriptions::Column::StripeCustomerId,
                        subscriptions::Column::Status,
                        subscriptions::Column::CurrentPeriodStart,
                        subscriptions::Column::CurrentPeriodEnd,
                        subscriptions::Column::CancelAtPeriodEnd,
                        subscriptions::Column::CanceledAt,
                        subscriptions::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.connection())
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn find_subscription(
        &self,
        stripe_subscription_id: &str,
    ) -> StorageResult<Option<SubscriptionRecord>> {
        let maybe = subscriptions::Entity::find_by_id(stripe_subscription_id.to_string())
            .one(self.connection())
            .await
            .map_err(db_error)?;
        Ok(maybe.map(|row| SubscriptionRecord {
            stripe_subscription_id: row.stripe_subscription_id,
            user_id: row.user_id,
            plan_id: row.plan_id,
            stripe_customer_id: row.stripe_customer_id,
            status: row.status.into(),
            current_period_start: row.current_period_start,
            current_period_end: row.current_period_end,
            cancel_at_period_end: row.cancel_at_period_end,
            canceled_at: row.canceled_at,
            ended_at: row.ended_at,
            updated_at: row.updated_at,
        }))
    }

    async fn set_subscription_status(
        &self,
        stripe_subscription_id: &str,
        status: SubscriptionStatus,
        ended_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut update = subscriptions::Entity::update_many()
            .col_expr(
                subscriptions::Column::Status,
                Expr::value(SubscriptionStatusDb::from(status).to_value()),
            )
            .col_expr(subscriptions::Column::UpdatedAt, Expr::value(at));
        if let Some(ended_at) = ended_at {
            update = update.col_expr(subscriptions::Column::EndedAt, Expr::value(Some(ended_at)));
        }
        let result = update
            .filter(subscriptions::Column::StripeSubscriptionId.eq(stripe_subscription_id))
            .exec(self.connection())
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected > 0)
    }
}

impl From<SubscriptionStatus> for SubscriptionStatusDb {
    fn from(value: SubscriptionStatus) -> Self {
        match value {
            SubscriptionStatus::Active => Self::Active,
            SubscriptionStatus::Trialing => Self::Trialing,
            SubscriptionStatus::PastDue => Self::PastDue,
            SubscriptionStatus::Canceled => Self::Canceled,
            SubscriptionStatus::Unpaid => Self::Unpaid,
            SubscriptionStatus::Incomplete => Self::Incomplete,
            SubscriptionStatus::IncompleteExpired => Self::IncompleteExpired,
            SubscriptionStatus::Paused => Self::Paused,
        }
    }
}

impl From<SubscriptionStatusDb> for SubscriptionStatus {
    fn from(value: SubscriptionStatusDb) -> Self {
        match value {
            SubscriptionStatusDb::Active => Self::Active,
            SubscriptionStatusDb::Trialing => Self::Trialing,
            SubscriptionStatusDb::PastDue => Self::PastDue,
            SubscriptionStatusDb::Canceled => Self::Canceled,
            SubscriptionStatusDb::Unpaid => Self::Unpaid,
            SubscriptionStatusDb::Incomplete => Self::Incomplete,
            SubscriptionStatusDb::IncompleteExpired => Self::IncompleteExpired,
            SubscriptionStatusDb::Paused => Self::Paused,
        }
    }
}
