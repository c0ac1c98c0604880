use amora_domain::model::{
    ItemType, PointAdjustment, PointTransactionKind, PointTransactionRecord, TierAssignment,
    UserEntitlements,
};
use amora_domain::storage::{EntitlementStore, StorageResult};
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::warn;

use crate::entity::point_transactions::{self, PointKindDb};
use crate::entity::{user_inventory, users};
use crate::errors::{conflict, db_error, MAX_CAS_ATTEMPTS};
use crate::{new_id, SeaOrmStorage};

#[async_trait::async_trait]
impl EntitlementStore for SeaOrmStorage {
    async fn find_entitlements(&self, user_id: &str) -> StorageResult<Option<UserEntitlements>> {
        let maybe = users::Entity::find_by_id(user_id.to_string())
            .one(self.connection())
            .await
            .map_err(db_error)?;
        Ok(maybe.map(user_to_entitlements))
    }

    async fn find_user_by_customer(
        &self,
        stripe_customer_id: &str,
    ) -> StorageResult<Option<UserEntitlements>> {
        let maybe = users::Entity::find()
            .filter(users::Column::StripeCustomerId.eq(stripe_customer_id))
            .one(self.connection())
            .await
            .map_err(db_error)?;
        Ok(maybe.map(user_to_entitlements))
    }

    async fn adjust_points(
        &self,
        adjustment: PointAdjustment,
    ) -> StorageResult<Option<PointTransactionRecord>> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let txn = self.connection().begin().await.map_err(db_error)?;
            let Some(user) = users::Entity::find_by_id(adjustment.user_id.clone())
                .one(&txn)
                .await
                .map_err(db_error)?
            else {
                txn.rollback().await.map_err(db_error)?;
                return Ok(None);
            };

            let amount = adjustment.effective_amount(user.points_balance);
            let balance_after = user.points_balance + amount;
            let swapped = users::Entity::update_many()
                .col_expr(users::Column::PointsBalance, Expr::value(balance_after))
                .col_expr(
                    users::Column::EntitlementVersion,
                    Expr::value(user.entitlement_version + 1),
                )
                .filter(users::Column::Id.eq(user.id.as_str()))
                .filter(users::Column::EntitlementVersion.eq(user.entitlement_version))
                .exec(&txn)
                .await
                .map_err(db_error)?;
            if swapped.rows_affected != 1 {
                txn.rollback().await.map_err(db_error)?;
                continue;
            }

            let record = PointTransactionRecord {
                id: new_id(),
                user_id: user.id,
                amount,
                balance_after,
                kind: adjustment.kind,
                reference: adjustment.reference.clone(),
                created_at: adjustment.at,
            };
            point_transactions::Entity::insert(point_transactions::ActiveModel {
                id: Set(record.id.clone()),
                user_id: Set(record.user_id.clone()),
                amount: Set(record.amount),
                balance_after: Set(record.balance_after),
                kind: Set(record.kind.into()),
                reference: Set(record.reference.clone()),
                created_at: Set(record.created_at),
            })
            .exec_without_returning(&txn)
            .await
            .map_err(db_error)?;

            txn.commit().await.map_err(db_error)?;
            return Ok(Some(record));
        }
        Err(conflict(format!("users.points_balance ({})", adjustment.user_id)))
    }

    async fn point_transactions(
        &self,
        user_id: &str,
    ) -> StorageResult<Vec<PointTransactionRecord>> {
        let rows = point_transactions::Entity::find()
            .filter(point_transactions::Column::UserId.eq(user_id))
            .order_by_asc(point_transactions::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(db_error)?;
        Ok(rows
            .into_iter()
            .map(|row| PointTransactionRecord {
                id: row.id,
                user_id: row.user_id,
                amount: row.amount,
                balance_after: row.balance_after,
                kind: row.kind.into(),
                reference: row.reference,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn add_inventory(
        &self,
        user_id: &str,
        item_type: &ItemType,
        quantity: i64,
    ) -> StorageResult<()> {
        let model = user_inventory::ActiveModel {
            user_id: Set(user_id.to_string()),
            item_type: Set(item_type.as_str().to_string()),
            quantity: Set(quantity),
            updated_at: Set(Utc::now()),
        };
        user_inventory::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    user_inventory::Column::UserId,
                    user_inventory::Column::ItemType,
                ])
                .value(
                    user_inventory::Column::Quantity,
                    Expr::col((user_inventory::Entity, user_inventory::Column::Quantity))
                        .add(quantity),
                )
                .update_column(user_inventory::Column::UpdatedAt)
                .to_owned(),
            )
            .exec_without_returning(self.connection())
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn inventory_quantity(&self, user_id: &str, item_type: &ItemType) -> StorageResult<i64> {
        let maybe = user_inventory::Entity::find_by_id((
            user_id.to_string(),
            item_type.as_str().to_string(),
        ))
        .one(self.connection())
        .await
        .map_err(db_error)?;
        Ok(maybe.map(|row| row.quantity).unwrap_or(0))
    }

    async fn add_superlikes(&self, user_id: &str, amount: i64) -> StorageResult<bool> {
        let result = users::Entity::update_many()
            .col_expr(
                users::Column::SuperlikeBalance,
                Expr::col(users::Column::SuperlikeBalance).add(amount),
            )
            .col_expr(
                users::Column::EntitlementVersion,
                Expr::col(users::Column::EntitlementVersion).add(1),
            )
            .filter(users::Column::Id.eq(user_id))
            .exec(self.connection())
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected > 0)
    }

    async fn extend_boost(
        &self,
        user_id: &str,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<DateTime<Utc>>> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(user) = users::Entity::find_by_id(user_id.to_string())
                .one(self.connection())
                .await
                .map_err(db_error)?
            else {
                return Ok(None);
            };

            let base = user.boost_expires_at.map_or(now, |current| current.max(now));
            let Some(expires_at) = base.checked_add_signed(duration) else {
                warn!(%user_id, "boost expiry out of range; keeping current expiry");
                return Ok(Some(base));
            };
            let swapped = users::Entity::update_many()
                .col_expr(users::Column::BoostExpiresAt, Expr::value(Some(expires_at)))
                .col_expr(
                    users::Column::EntitlementVersion,
                    Expr::value(user.entitlement_version + 1),
                )
                .filter(users::Column::Id.eq(user_id))
                .filter(users::Column::EntitlementVersion.eq(user.entitlement_version))
                .exec(self.connection())
                .await
                .map_err(db_error)?;
            if swapped.rows_affected == 1 {
                return Ok(Some(expires_at));
            }
        }
        Err(conflict(format!("users.boost_expires_at ({user_id})")))
    }

    async fn assign_tier(&self, user_id: &str, assignment: TierAssignment) -> StorageResult<bool> {
        let mut update = users::Entity::update_many()
            .col_expr(users::Column::SubscriptionTier, Expr::value(assignment.tier))
            .col_expr(
                users::Column::SubscriptionPlanId,
                Expr::value(assignment.plan_id),
            )
            .col_expr(
                users::Column::SubscriptionExpiresAt,
                Expr::value(assignment.expires_at),
            )
            .col_expr(
                users::Column::EntitlementVersion,
                Expr::col(users::Column::EntitlementVersion).add(1),
            );
        if let Some(reset) = assignment.daily_superlikes {
            update = update
                .col_expr(
                    users::Column::DailySuperlikesRemaining,
                    Expr::value(reset.remaining),
                )
                .col_expr(
                    users::Column::SuperlikesResetAt,
                    Expr::value(Some(reset.reset_at)),
                );
        }
        let result = update
            .filter(users::Column::Id.eq(user_id))
            .exec(self.connection())
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected > 0)
    }
}

impl From<PointTransactionKind> for PointKindDb {
    fn from(value: PointTransactionKind) -> Self {
        match value {
            PointTransactionKind::Purchase => Self::Purchase,
            PointTransactionKind::Spend => Self::Spend,
            PointTransactionKind::Refund => Self::Refund,
            PointTransactionKind::Adjustment => Self::Adjustment,
        }
    }
}

impl From<PointKindDb> for PointTransactionKind {
    fn from(value: PointKindDb) -> Self {
        match value {
            PointKindDb::Purchase => Self::Purchase,
            PointKindDb::Spend => Self::Spend,
            PointKindDb::Refund => Self::Refund,
            PointKindDb::Adjustment => Self::Adjustment,
        }
    }
}

fn user_to_entitlements(model: users::Model) -> UserEntitlements {
    UserEntitlements {
        user_id: model.id,
        stripe_customer_id: model.stripe_customer_id,
        points_balance: model.points_balance,
        superlike_balance: model.superlike_balance,
        boost_expires_at: model.boost_expires_at,
        subscription_tier: model.subscription_tier,
        subscription_plan_id: model.subscription_plan_id,
        subscription_expires_at: model.subscription_expires_at,
        daily_superlikes_remaining: model.daily_superlikes_remaining,
        superlikes_reset_at: model.superlikes_reset_at,
    }
}
