use amora_domain::model::{NewWebhookEvent, WebhookEventRecord, WebhookEventStatus};
use amora_domain::storage::{StorageResult, WebhookEventStore};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveEnum, ColumnTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};

use crate::entity::webhook_events::{self, WebhookStatusDb};
use crate::errors::db_error;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl WebhookEventStore for SeaOrmStorage {
    async fn claim_event(&self, event: NewWebhookEvent) -> StorageResult<bool> {
        let model = webhook_events::ActiveModel {
            id: Set(event.id),
            event_type: Set(event.event_type),
            payload: Set(event.payload),
            status: Set(WebhookStatusDb::Processing),
            error: Set(None),
            received_at: Set(event.received_at),
            processed_at: Set(None),
        };
        let inserted = webhook_events::Entity::insert(model)
            .on_conflict(
                OnConflict::column(webhook_events::Column::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.connection())
            .await;
        match inserted {
            Ok(rows) => Ok(rows > 0),
            Err(DbErr::RecordNotInserted) => Ok(false),
            Err(err) => Err(db_error(err)),
        }
    }

    async fn mark_event_processed(&self, event_id: &str, at: DateTime<Utc>) -> StorageResult<()> {
        set_status(self, event_id, WebhookStatusDb::Processed, None, at).await
    }

    async fn mark_event_failed(
        &self,
        event_id: &str,
        error: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        set_status(
            self,
            event_id,
            WebhookStatusDb::Failed,
            Some(error.to_string()),
            at,
        )
        .await
    }

    async fn find_event(&self, event_id: &str) -> StorageResult<Option<WebhookEventRecord>> {
        let maybe = webhook_events::Entity::find_by_id(event_id.to_string())
            .one(self.connection())
            .await
            .map_err(db_error)?;
        Ok(maybe.map(event_to_record))
    }

    async fn failed_events(&self, limit: u64) -> StorageResult<Vec<WebhookEventRecord>> {
        let rows = webhook_events::Entity::find()
            .filter(webhook_events::Column::Status.eq(WebhookStatusDb::Failed))
            .order_by_desc(webhook_events::Column::ReceivedAt)
            .limit(limit)
            .all(self.connection())
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(event_to_record).collect())
    }
}

async fn set_status(
    storage: &SeaOrmStorage,
    event_id: &str,
    status: WebhookStatusDb,
    error: Option<String>,
    at: DateTime<Utc>,
) -> StorageResult<()> {
    webhook_events::Entity::update_many()
        .col_expr(webhook_events::Column::Status, Expr::value(status.to_value()))
        .col_expr(webhook_events::Column::Error, Expr::value(error))
        .col_expr(webhook_events::Column::ProcessedAt, Expr::value(Some(at)))
        .filter(webhook_events::Column::Id.eq(event_id))
        .exec(storage.connection())
        .await
        .map_err(db_error)?;
    Ok(())
}

impl From<WebhookStatusDb> for WebhookEventStatus {
    fn from(value: WebhookStatusDb) -> Self {
        match value {
            WebhookStatusDb::Processing => Self::Processing,
            WebhookStatusDb::Processed => Self::Processed,
            WebhookStatusDb::Failed => Self::Failed,
        }
    }
}

fn event_to_record(model: webhook_events::Model) -> WebhookEventRecord {
    WebhookEventRecord {
        id: model.id,
        event_type: model.event_type,
        payload: model.payload,
        status: model.status.into(),
        error: model.error,
        received_at: model.received_at,
        processed_at: model.processed_at,
    }
}
