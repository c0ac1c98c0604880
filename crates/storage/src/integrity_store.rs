use std::collections::HashMap;

use amora_domain::model::{
    ConversationMerge, ConversationPurge, ConversationRow, GalleryPhoto, GalleryRemoval, MatchRow,
    NewSystemIssue, ParticipantRow, SystemIssueRecord, UserProfileRow,
};
use amora_domain::storage::{IntegrityStore, StorageResult};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::Value;

use crate::entity::{
    conversation_participants, conversations, gallery_photos, matches, messages, profiles,
    system_issues, users,
};
use crate::errors::db_error;
use crate::{new_id, SeaOrmStorage};

#[async_trait::async_trait]
impl IntegrityStore for SeaOrmStorage {
    async fn count_users(&self) -> StorageResult<u64> {
        users::Entity::find()
            .count(self.connection())
            .await
            .map_err(db_error)
    }

    async fn user_profiles(&self) -> StorageResult<Vec<UserProfileRow>> {
        let user_ids: Vec<String> = users::Entity::find()
            .select_only()
            .column(users::Column::Id)
            .order_by_asc(users::Column::Id)
            .into_tuple()
            .all(self.connection())
            .await
            .map_err(db_error)?;
        let mut profiles: HashMap<String, profiles::Model> = profiles::Entity::find()
            .all(self.connection())
            .await
            .map_err(db_error)?
            .into_iter()
            .map(|profile| (profile.user_id.clone(), profile))
            .collect();

        Ok(user_ids
            .into_iter()
            .map(|user_id| match profiles.remove(&user_id) {
                Some(profile) => UserProfileRow {
                    user_id,
                    first_name: profile.first_name,
                    gender: profile.gender,
                    looking_for: profile.looking_for,
                    date_of_birth: profile.date_of_birth,
                    avatar_url: profile.avatar_url,
                },
                None => UserProfileRow {
                    user_id,
                    first_name: None,
                    gender: None,
                    looking_for: None,
                    date_of_birth: None,
                    avatar_url: None,
                },
            })
            .collect())
    }

    async fn gallery_photos(&self) -> StorageResult<Vec<GalleryPhoto>> {
        let rows = gallery_photos::Entity::find()
            .order_by_asc(gallery_photos::Column::UserId)
            .order_by_asc(gallery_photos::Column::DisplayOrder)
            .order_by_asc(gallery_photos::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(photo_from_model).collect())
    }

    async fn gallery_for_user(&self, user_id: &str) -> StorageResult<Vec<GalleryPhoto>> {
        let rows = photos_for_user(self.connection(), user_id).await?;
        Ok(rows.into_iter().map(photo_from_model).collect())
    }

    async fn matches(&self) -> StorageResult<Vec<MatchRow>> {
        let rows = matches::Entity::find()
            .order_by_asc(matches::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(match_from_model).collect())
    }

    async fn matches_between(
        &self,
        user_id: &str,
        target_user_id: &str,
    ) -> StorageResult<Vec<MatchRow>> {
        let rows = matches::Entity::find()
            .filter(matches::Column::UserId.eq(user_id))
            .filter(matches::Column::TargetUserId.eq(target_user_id))
            .order_by_asc(matches::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(match_from_model).collect())
    }

    async fn direct_conversations(&self) -> StorageResult<Vec<ConversationRow>> {
        let rows = conversations::Entity::find()
            .filter(conversations::Column::IsGroup.eq(false))
            .order_by_asc(conversations::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(db_error)?;
        Ok(rows
            .into_iter()
            .map(|row| ConversationRow {
                id: row.id,
                is_group: row.is_group,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn conversation_participants(&self) -> StorageResult<Vec<ParticipantRow>> {
        let rows = conversation_participants::Entity::find()
            .all(self.connection())
            .await
            .map_err(db_error)?;
        Ok(rows
            .into_iter()
            .map(|row| ParticipantRow {
                id: row.id,
                conversation_id: row.conversation_id,
                user_id: row.user_id,
            })
            .collect())
    }

    async fn promote_photo_to_avatar(&self, photo: &GalleryPhoto) -> StorageResult<()> {
        let txn = self.connection().begin().await.map_err(db_error)?;
        make_only_primary(&txn, &photo.user_id, &photo.id).await?;

        let updated = profiles::Entity::update_many()
            .col_expr(
                profiles::Column::AvatarUrl,
                Expr::value(Some(photo.storage_path.clone())),
            )
            .filter(profiles::Column::UserId.eq(photo.user_id.as_str()))
            .exec(&txn)
            .await
            .map_err(db_error)?;
        if updated.rows_affected == 0 {
            profiles::Entity::insert(profiles::ActiveModel {
                user_id: Set(photo.user_id.clone()),
                first_name: Set(None),
                gender: Set(None),
                looking_for: Set(None),
                date_of_birth: Set(None),
                avatar_url: Set(Some(photo.storage_path.clone())),
            })
            .exec_without_returning(&txn)
            .await
            .map_err(db_error)?;
        }

        txn.commit().await.map_err(db_error)
    }

    async fn set_primary_photo(&self, user_id: &str, photo_id: &str) -> StorageResult<bool> {
        let txn = self.connection().begin().await.map_err(db_error)?;
        let exists = gallery_photos::Entity::find_by_id(photo_id.to_string())
            .filter(gallery_photos::Column::UserId.eq(user_id))
            .one(&txn)
            .await
            .map_err(db_error)?
            .is_some();
        if !exists {
            txn.rollback().await.map_err(db_error)?;
            return Ok(false);
        }
        make_only_primary(&txn, user_id, photo_id).await?;
        txn.commit().await.map_err(db_error)?;
        Ok(true)
    }

    async fn remove_gallery_photo(
        &self,
        user_id: &str,
        photo_id: &str,
    ) -> StorageResult<Option<GalleryRemoval>> {
        let txn = self.connection().begin().await.map_err(db_error)?;
        let Some(photo) = gallery_photos::Entity::find_by_id(photo_id.to_string())
            .filter(gallery_photos::Column::UserId.eq(user_id))
            .one(&txn)
            .await
            .map_err(db_error)?
        else {
            txn.rollback().await.map_err(db_error)?;
            return Ok(None);
        };

        gallery_photos::Entity::delete_by_id(photo.id.clone())
            .exec(&txn)
            .await
            .map_err(db_error)?;

        let mut promoted_photo_id = None;
        if photo.is_primary {
            if let Some(next) = photos_for_user(&txn, user_id).await?.into_iter().next() {
                make_only_primary(&txn, user_id, &next.id).await?;
                promoted_photo_id = Some(next.id);
            }
        }

        txn.commit().await.map_err(db_error)?;
        Ok(Some(GalleryRemoval {
            was_primary: photo.is_primary,
            promoted_photo_id,
        }))
    }

    async fn delete_matches(&self, match_ids: &[String]) -> StorageResult<u64> {
        if match_ids.is_empty() {
            return Ok(0);
        }
        let result = matches::Entity::delete_many()
            .filter(matches::Column::Id.is_in(match_ids.iter().cloned()))
            .exec(self.connection())
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected)
    }

    async fn merge_conversations(
        &self,
        keep_id: &str,
        duplicate_ids: &[String],
    ) -> StorageResult<ConversationMerge> {
        let duplicates: Vec<String> = duplicate_ids
            .iter()
            .filter(|id| id.as_str() != keep_id)
            .cloned()
            .collect();
        if duplicates.is_empty() {
            return Ok(ConversationMerge::default());
        }

        let txn = self.connection().begin().await.map_err(db_error)?;
        let moved = messages::Entity::update_many()
            .col_expr(
                messages::Column::ConversationId,
                Expr::value(keep_id.to_string()),
            )
            .filter(messages::Column::ConversationId.is_in(duplicates.clone()))
            .exec(&txn)
            .await
            .map_err(db_error)?;
        let participants = conversation_participants::Entity::delete_many()
            .filter(conversation_participants::Column::ConversationId.is_in(duplicates.clone()))
            .exec(&txn)
            .await
            .map_err(db_error)?;
        let removed = conversations::Entity::delete_many()
            .filter(conversations::Column::Id.is_in(duplicates))
            .exec(&txn)
            .await
            .map_err(db_error)?;
        txn.commit().await.map_err(db_error)?;

        Ok(ConversationMerge {
            messages_moved: moved.rows_affected,
            participants_removed: participants.rows_affected,
            conversations_removed: removed.rows_affected,
        })
    }

    async fn purge_conversation(&self, conversation_id: &str) -> StorageResult<ConversationPurge> {
        let txn = self.connection().begin().await.map_err(db_error)?;
        let messages_removed = messages::Entity::delete_many()
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .exec(&txn)
            .await
            .map_err(db_error)?;
        let participants_removed = conversation_participants::Entity::delete_many()
            .filter(conversation_participants::Column::ConversationId.eq(conversation_id))
            .exec(&txn)
            .await
            .map_err(db_error)?;
        conversations::Entity::delete_by_id(conversation_id.to_string())
            .exec(&txn)
            .await
            .map_err(db_error)?;
        txn.commit().await.map_err(db_error)?;

        Ok(ConversationPurge {
            messages_removed: messages_removed.rows_affected,
            participants_removed: participants_removed.rows_affected,
        })
    }

    async fn record_resolution(&self, issue: NewSystemIssue) -> StorageResult<()> {
        system_issues::Entity::insert(system_issues::ActiveModel {
            id: Set(new_id()),
            issue_type: Set(issue.issue_type.as_ref().to_string()),
            user_id: Set(issue.user_id),
            context: Set(issue.context.to_string()),
            resolved_at: Set(issue.resolved_at),
        })
        .exec_without_returning(self.connection())
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn recent_resolutions(&self, limit: u64) -> StorageResult<Vec<SystemIssueRecord>> {
        let rows = system_issues::Entity::find()
            .order_by_desc(system_issues::Column::ResolvedAt)
            .limit(limit)
            .all(self.connection())
            .await
            .map_err(db_error)?;
        Ok(rows
            .into_iter()
            .map(|row| SystemIssueRecord {
                context: serde_json::from_str(&row.context)
                    .unwrap_or_else(|_| Value::String(row.context.clone())),
                id: row.id,
                issue_type: row.issue_type,
                user_id: row.user_id,
                resolved_at: row.resolved_at,
            })
            .collect())
    }
}

async fn photos_for_user<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
) -> StorageResult<Vec<gallery_photos::Model>> {
    gallery_photos::Entity::find()
        .filter(gallery_photos::Column::UserId.eq(user_id))
        .order_by_asc(gallery_photos::Column::DisplayOrder)
        .order_by_asc(gallery_photos::Column::CreatedAt)
        .all(db)
        .await
        .map_err(db_error)
}

async fn make_only_primary(
    txn: &DatabaseTransaction,
    user_id: &str,
    photo_id: &str,
) -> StorageResult<()> {
    gallery_photos::Entity::update_many()
        .col_expr(
            gallery_photos::Column::IsPrimary,
            Expr::col(gallery_photos::Column::Id).eq(photo_id),
        )
        .filter(gallery_photos::Column::UserId.eq(user_id))
        .exec(txn)
        .await
        .map_err(db_error)?;
    Ok(())
}

fn photo_from_model(row: gallery_photos::Model) -> GalleryPhoto {
    GalleryPhoto {
        id: row.id,
        user_id: row.user_id,
        storage_path: row.storage_path,
        is_primary: row.is_primary,
        display_order: row.display_order,
        created_at: row.created_at,
    }
}

fn match_from_model(row: matches::Model) -> MatchRow {
    MatchRow {
        id: row.id,
        user_id: row.user_id,
        target_user_id: row.target_user_id,
        created_at: row.created_at,
    }
}
