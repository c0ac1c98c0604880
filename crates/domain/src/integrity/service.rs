use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use serde_json::{json, Value};
use strum::IntoEnumIterator;
use thiserror::Error;
use tracing::{info, warn};

use crate::model::{
    BatchFixItem, BatchFixReport, CheckCategory, DataIntegrityIssue, FixResult, FixTarget,
    GalleryPhoto, IntegrityReport, IssueType, NewSystemIssue,
};
use crate::storage::{IntegrityStore, ObjectStore, StorageError};

use super::scanner::{
    check_avatars, check_gallery, check_matches, check_profiles, conversations_by_pair,
    members_by_conversation, normalize_storage_path, summarize,
};

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("fix for {issue_type} requires `details.{field}`")]
    MissingDetail {
        issue_type: IssueType,
        field: &'static str,
    },
}

/// Which auto-fixable issues a bulk fix should touch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSelection {
    pub issue_types: Vec<IssueType>,
    /// Restricts the batch to these users when present.
    pub user_ids: Option<Vec<String>>,
}

impl BatchSelection {
    pub fn types(issue_types: impl IntoIterator<Item = IssueType>) -> Self {
        Self {
            issue_types: issue_types.into_iter().collect(),
            user_ids: None,
        }
    }

    pub fn category(category: CheckCategory) -> Self {
        Self::types(IssueType::iter().filter(|issue| issue.category() == category))
    }

    pub fn everything() -> Self {
        Self::types(IssueType::iter())
    }

    pub fn for_users(mut self, user_ids: Option<Vec<String>>) -> Self {
        self.user_ids = user_ids.filter(|ids| !ids.is_empty());
        self
    }

    fn matches(&self, issue: &DataIntegrityIssue) -> bool {
        issue.auto_fixable
            && self.issue_types.contains(&issue.issue_type)
            && self
                .user_ids
                .as_ref()
                .map_or(true, |ids| ids.iter().any(|id| *id == issue.user_id))
    }

    fn scan_scope(&self) -> Option<CheckCategory> {
        let mut categories = self.issue_types.iter().map(|issue| issue.category());
        let first = categories.next()?;
        categories.all(|c| c == first).then_some(first)
    }
}

/// Scans for cross-table inconsistencies and applies the deterministic fixes.
pub struct IntegrityService<S> {
    store: S,
    objects: Option<Arc<dyn ObjectStore>>,
}

impl<S> IntegrityService<S>
where
    S: IntegrityStore,
{
    pub fn new(store: S, objects: Option<Arc<dyn ObjectStore>>) -> Self {
        Self { store, objects }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn scan(
        &self,
        category: Option<CheckCategory>,
    ) -> Result<IntegrityReport, IntegrityError> {
        let wants = |candidate: CheckCategory| category.map_or(true, |only| only == candidate);
        let total_users = self.store.count_users().await?;

        let users = if wants(CheckCategory::Avatars)
            || wants(CheckCategory::Gallery)
            || wants(CheckCategory::Profiles)
        {
            self.store.user_profiles().await?
        } else {
            Vec::new()
        };
        let gallery = if wants(CheckCategory::Avatars) || wants(CheckCategory::Gallery) {
            self.store.gallery_photos().await?
        } else {
            Vec::new()
        };

        let mut issues = Vec::new();
        if wants(CheckCategory::Avatars) {
            issues.extend(check_avatars(&users, &gallery));
        }
        if wants(CheckCategory::Gallery) {
            let missing = self.missing_objects(&gallery).await;
            issues.extend(check_gallery(&users, &gallery, &missing));
        }
        if wants(CheckCategory::Profiles) {
            issues.extend(check_profiles(&users));
        }
        if wants(CheckCategory::Matches) {
            let matches = self.store.matches().await?;
            let conversations = self.store.direct_conversations().await?;
            let participants = self.store.conversation_participants().await?;
            issues.extend(check_matches(&matches, &conversations, &participants));
        }

        let summary = summarize(&issues);
        let scope = category.map_or("all", |c| match c {
            CheckCategory::Avatars => "avatars",
            CheckCategory::Gallery => "gallery",
            CheckCategory::Profiles => "profiles",
            CheckCategory::Matches => "matches",
        });
        counter!("integrity_scans_total", "category" => scope).increment(1);
        for (severity, count) in [
            ("critical", summary.critical),
            ("warning", summary.warning),
            ("info", summary.info),
        ] {
            counter!("integrity_issues_found", "severity" => severity).increment(count as u64);
        }
        info!(
            scope,
            total_users,
            critical = summary.critical,
            warning = summary.warning,
            info = summary.info,
            "integrity scan finished"
        );

        Ok(IntegrityReport {
            checked_at: Utc::now(),
            total_users,
            summary,
            issues,
        })
    }

    /// Gallery row ids whose object is confirmed absent. Failed lookups count
    /// as present so a storage outage never turns into deletions.
    async fn missing_objects(&self, gallery: &[GalleryPhoto]) -> HashSet<String> {
        let mut missing = HashSet::new();
        let Some(objects) = &self.objects else {
            return missing;
        };
        for photo in gallery {
            let path = normalize_storage_path(&photo.storage_path);
            if path.is_empty() {
                continue;
            }
            match objects.object_exists(&path).await {
                Ok(true) => {}
                Ok(false) => {
                    missing.insert(photo.id.clone());
                }
                Err(err) => {
                    warn!(photo_id = %photo.id, error = %err, "object lookup failed");
                }
            }
        }
        missing
    }

    pub async fn fix(&self, target: &FixTarget) -> Result<FixResult, IntegrityError> {
        let outcome = self.apply_fix(target).await;
        let result = match &outcome {
            Ok(result) if result.success => "success",
            Ok(_) => "rejected",
            Err(_) => "error",
        };
        counter!(
            "integrity_fixes_total",
            "issue_type" => target.issue_type.to_string(),
            "result" => result
        )
        .increment(1);
        outcome
    }

    async fn apply_fix(&self, target: &FixTarget) -> Result<FixResult, IntegrityError> {
        let user_id = target.user_id.as_str();
        match target.issue_type {
            IssueType::MissingAvatar | IssueType::BrokenAvatar => self.fix_avatar(target).await,
            IssueType::MissingPrimaryPhoto => self.fix_missing_primary(target).await,
            IssueType::BrokenPrimaryPhoto => {
                let photo_id = required_str(target, "photoId")?;
                self.remove_photo(target, &photo_id, true).await
            }
            IssueType::OrphanedGalleryRecord => {
                let photo_id = required_str(target, "photoId")?;
                self.fix_orphaned_photo(target, &photo_id).await
            }
            IssueType::DuplicateMatch => {
                let target_user_id = required_str(target, "targetUserId")?;
                self.fix_duplicate_match(user_id, &target_user_id).await
            }
            IssueType::DuplicateConversation => {
                let pair = participant_pair(target)?;
                self.fix_duplicate_conversation(target, pair).await
            }
            IssueType::OrphanedConversation => {
                let conversation_id = required_str(target, "conversationId")?;
                self.fix_orphaned_conversation(target, &conversation_id)
                    .await
            }
            IssueType::NoGalleryPhotos => Ok(rejected("requires a photo upload by the user")),
            IssueType::MissingGender
            | IssueType::MissingLookingFor
            | IssueType::MissingDob
            | IssueType::MissingFirstName => Ok(rejected("requires user input")),
        }
    }

    async fn fix_avatar(&self, target: &FixTarget) -> Result<FixResult, IntegrityError> {
        let photos = self.sorted_gallery(&target.user_id).await?;
        let candidate = photos
            .iter()
            .filter(|photo| !normalize_storage_path(&photo.storage_path).is_empty())
            .find(|photo| photo.is_primary)
            .or_else(|| {
                photos
                    .iter()
                    .find(|photo| !normalize_storage_path(&photo.storage_path).is_empty())
            });
        let Some(photo) = candidate else {
            return Ok(rejected("no gallery photo to promote"));
        };

        self.store.promote_photo_to_avatar(photo).await?;
        self.audit(
            target,
            json!({ "photoId": photo.id, "avatarUrl": photo.storage_path }),
        )
        .await?;
        Ok(applied(format!("avatar set from photo {}", photo.id)))
    }

    async fn fix_missing_primary(&self, target: &FixTarget) -> Result<FixResult, IntegrityError> {
        let photos = self.sorted_gallery(&target.user_id).await?;
        if photos.iter().any(|photo| photo.is_primary) {
            return Ok(applied("primary photo already set"));
        }
        let Some(first) = photos.first() else {
            return Ok(rejected("user has no gallery photos"));
        };
        self.store
            .set_primary_photo(&target.user_id, &first.id)
            .await?;
        self.audit(target, json!({ "photoId": first.id })).await?;
        Ok(applied(format!("photo {} marked primary", first.id)))
    }

    async fn fix_orphaned_photo(
        &self,
        target: &FixTarget,
        photo_id: &str,
    ) -> Result<FixResult, IntegrityError> {
        let photos = self.sorted_gallery(&target.user_id).await?;
        let Some(photo) = photos.iter().find(|photo| photo.id == photo_id) else {
            return Ok(applied("gallery row already removed"));
        };
        let path = normalize_storage_path(&photo.storage_path);
        if !path.is_empty() {
            let Some(objects) = &self.objects else {
                return Ok(rejected("object storage is not configured"));
            };
            if objects.object_exists(&path).await? {
                return Ok(rejected("photo object exists"));
            }
        }
        self.remove_photo(target, photo_id, false).await
    }

    /// Deletes a gallery row and hands the primary flag on if needed.
    /// `primary_only` guards against removing a photo that is no longer the
    /// primary one.
    async fn remove_photo(
        &self,
        target: &FixTarget,
        photo_id: &str,
        primary_only: bool,
    ) -> Result<FixResult, IntegrityError> {
        if primary_only {
            let photos = self.sorted_gallery(&target.user_id).await?;
            match photos.iter().find(|photo| photo.id == photo_id) {
                None => return Ok(applied("gallery row already removed")),
                Some(photo) if !photo.is_primary => {
                    return Ok(rejected("photo is no longer the primary photo"))
                }
                Some(_) => {}
            }
        }

        let Some(removal) = self
            .store
            .remove_gallery_photo(&target.user_id, photo_id)
            .await?
        else {
            return Ok(applied("gallery row already removed"));
        };
        self.audit(
            target,
            json!({
                "photoId": photo_id,
                "wasPrimary": removal.was_primary,
                "promotedPhotoId": removal.promoted_photo_id,
            }),
        )
        .await?;
        let message = match removal.promoted_photo_id {
            Some(promoted) => format!("photo {photo_id} removed; {promoted} is now primary"),
            None => format!("photo {photo_id} removed"),
        };
        Ok(applied(message))
    }

    async fn fix_duplicate_match(
        &self,
        user_id: &str,
        target_user_id: &str,
    ) -> Result<FixResult, IntegrityError> {
        let mut rows = self.store.matches_between(user_id, target_user_id).await?;
        if rows.len() < 2 {
            return Ok(applied("no duplicate matches remain"));
        }
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let Some(keep) = rows.pop() else {
            return Ok(applied("no duplicate matches remain"));
        };
        let stale: Vec<String> = rows.into_iter().map(|row| row.id).collect();
        let deleted = self.store.delete_matches(&stale).await?;
        self.store
            .record_resolution(NewSystemIssue {
                issue_type: IssueType::DuplicateMatch,
                user_id: Some(user_id.to_string()),
                context: json!({
                    "targetUserId": target_user_id,
                    "keptMatchId": &keep.id,
                    "deletedMatchIds": stale,
                }),
                resolved_at: Utc::now(),
            })
            .await?;
        Ok(applied(format!("kept match {}, deleted {deleted}", keep.id)))
    }

    async fn fix_duplicate_conversation(
        &self,
        target: &FixTarget,
        pair: (String, String),
    ) -> Result<FixResult, IntegrityError> {
        let conversations = self.store.direct_conversations().await?;
        let participants = self.store.conversation_participants().await?;
        let pairs = conversations_by_pair(&conversations, &participants);
        let group = pairs.get(&pair).map(Vec::as_slice).unwrap_or_default();
        let Some((keep, duplicates)) = group.split_first() else {
            return Ok(applied("no duplicate conversations remain"));
        };
        if duplicates.is_empty() {
            return Ok(applied("no duplicate conversations remain"));
        }

        let duplicate_ids: Vec<String> = duplicates.iter().map(|c| c.id.clone()).collect();
        let merge = self
            .store
            .merge_conversations(&keep.id, &duplicate_ids)
            .await?;
        self.audit(
            target,
            json!({
                "keptConversationId": keep.id,
                "removedConversationIds": duplicate_ids,
                "messagesMoved": merge.messages_moved,
            }),
        )
        .await?;
        Ok(applied(format!(
            "merged {} conversation(s) into {}, moved {} message(s)",
            merge.conversations_removed, keep.id, merge.messages_moved
        )))
    }

    async fn fix_orphaned_conversation(
        &self,
        target: &FixTarget,
        conversation_id: &str,
    ) -> Result<FixResult, IntegrityError> {
        let conversations = self.store.direct_conversations().await?;
        if !conversations.iter().any(|c| c.id == conversation_id) {
            return Ok(applied("conversation already removed"));
        }
        let participants = self.store.conversation_participants().await?;
        let members = members_by_conversation(&participants);
        let count = members.get(conversation_id).map_or(0, |users| users.len());
        if count >= 2 {
            return Ok(rejected("conversation has both participants"));
        }

        let purge = self.store.purge_conversation(conversation_id).await?;
        self.audit(
            target,
            json!({
                "conversationId": conversation_id,
                "messagesRemoved": purge.messages_removed,
                "participantsRemoved": purge.participants_removed,
            }),
        )
        .await?;
        Ok(applied(format!(
            "conversation {conversation_id} removed with {} message(s)",
            purge.messages_removed
        )))
    }

    /// Scans, then fixes every matching auto-fixable issue one at a time.
    /// Failures are collected per item; earlier fixes are kept.
    pub async fn fix_batch(
        &self,
        selection: &BatchSelection,
    ) -> Result<BatchFixReport, IntegrityError> {
        let report = self.scan(selection.scan_scope()).await?;
        let mut outcome = BatchFixReport::default();

        for issue in report.issues.iter().filter(|issue| selection.matches(issue)) {
            let target = FixTarget {
                user_id: issue.user_id.clone(),
                issue_type: issue.issue_type,
                details: issue.details.clone(),
            };
            let (success, message) = match self.fix(&target).await {
                Ok(result) => (result.success, result.message),
                Err(err) => (false, err.to_string()),
            };
            let item = BatchFixItem {
                user_id: target.user_id,
                issue_type: target.issue_type,
                success,
                message,
            };
            if success {
                outcome.fixed.push(item);
            } else {
                outcome.failed.push(item);
            }
        }

        info!(
            fixed = outcome.fixed.len(),
            failed = outcome.failed.len(),
            "batch fix finished"
        );
        Ok(outcome)
    }

    async fn sorted_gallery(&self, user_id: &str) -> Result<Vec<GalleryPhoto>, IntegrityError> {
        let mut photos = self.store.gallery_for_user(user_id).await?;
        photos.sort_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(photos)
    }

    async fn audit(&self, target: &FixTarget, context: Value) -> Result<(), IntegrityError> {
        let user_id = (!target.user_id.is_empty()).then(|| target.user_id.clone());
        self.store
            .record_resolution(NewSystemIssue {
                issue_type: target.issue_type,
                user_id,
                context,
                resolved_at: Utc::now(),
            })
            .await?;
        Ok(())
    }
}

fn applied(message: impl Into<String>) -> FixResult {
    FixResult {
        success: true,
        message: message.into(),
    }
}

fn rejected(message: impl Into<String>) -> FixResult {
    FixResult {
        success: false,
        message: message.into(),
    }
}

fn required_str(target: &FixTarget, field: &'static str) -> Result<String, IntegrityError> {
    target
        .details
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or(IntegrityError::MissingDetail {
            issue_type: target.issue_type,
            field,
        })
}

/// Sorted participant pair from `details.participantIds`, falling back to the
/// issue's user and `details.targetUserId`.
fn participant_pair(target: &FixTarget) -> Result<(String, String), IntegrityError> {
    let from_list = target
        .details
        .get("participantIds")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|ids| ids.len() == 2);
    let (a, b) = match from_list {
        Some(ids) => (ids[0].clone(), ids[1].clone()),
        None => (
            target.user_id.clone(),
            required_str(target, "targetUserId").map_err(|_| IntegrityError::MissingDetail {
                issue_type: target.issue_type,
                field: "participantIds",
            })?,
        ),
    };
    Ok(if a <= b { (a, b) } else { (b, a) })
}
