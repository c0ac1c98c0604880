use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

/// Group of checks served by one admin view.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CheckCategory {
    Avatars,
    Gallery,
    Profiles,
    Matches,
}

/// Closed set of cross-table inconsistencies the scanner reports.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IssueType {
    MissingAvatar,
    BrokenAvatar,
    NoGalleryPhotos,
    MissingPrimaryPhoto,
    BrokenPrimaryPhoto,
    OrphanedGalleryRecord,
    MissingGender,
    MissingLookingFor,
    MissingDob,
    MissingFirstName,
    DuplicateMatch,
    DuplicateConversation,
    OrphanedConversation,
}

impl IssueType {
    pub fn severity(self) -> Severity {
        match self {
            Self::MissingAvatar
            | Self::BrokenAvatar
            | Self::BrokenPrimaryPhoto
            | Self::MissingGender
            | Self::MissingLookingFor
            | Self::MissingDob
            | Self::DuplicateMatch => Severity::Critical,
            Self::NoGalleryPhotos
            | Self::MissingPrimaryPhoto
            | Self::MissingFirstName
            | Self::DuplicateConversation => Severity::Warning,
            Self::OrphanedGalleryRecord | Self::OrphanedConversation => Severity::Info,
        }
    }

    pub fn category(self) -> CheckCategory {
        match self {
            Self::MissingAvatar | Self::BrokenAvatar => CheckCategory::Avatars,
            Self::NoGalleryPhotos
            | Self::MissingPrimaryPhoto
            | Self::BrokenPrimaryPhoto
            | Self::OrphanedGalleryRecord => CheckCategory::Gallery,
            Self::MissingGender
            | Self::MissingLookingFor
            | Self::MissingDob
            | Self::MissingFirstName => CheckCategory::Profiles,
            Self::DuplicateMatch | Self::DuplicateConversation | Self::OrphanedConversation => {
                CheckCategory::Matches
            }
        }
    }
}

/// A single violation found by a scan. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataIntegrityIssue {
    pub user_id: String,
    pub issue_type: IssueType,
    pub severity: Severity,
    pub description: String,
    pub details: Value,
    pub auto_fixable: bool,
}

impl DataIntegrityIssue {
    pub fn new(
        user_id: impl Into<String>,
        issue_type: IssueType,
        description: impl Into<String>,
        details: Value,
        auto_fixable: bool,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            issue_type,
            severity: issue_type.severity(),
            description: description.into(),
            details,
            auto_fixable,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegritySummary {
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
    pub by_type: BTreeMap<IssueType, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub checked_at: DateTime<Utc>,
    pub total_users: u64,
    pub summary: IntegritySummary,
    pub issues: Vec<DataIntegrityIssue>,
}

/// User row joined with its profile. Users without a profile carry `None`
/// everywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfileRow {
    pub user_id: String,
    pub first_name: Option<String>,
    pub gender: Option<String>,
    pub looking_for: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryPhoto {
    pub id: String,
    pub user_id: String,
    pub storage_path: String,
    pub is_primary: bool,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRow {
    pub id: String,
    pub user_id: String,
    pub target_user_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRow {
    pub id: String,
    pub is_group: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantRow {
    pub id: String,
    pub conversation_id: String,
    pub user_id: String,
}

/// Result of removing a gallery row inside one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryRemoval {
    pub was_primary: bool,
    pub promoted_photo_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversationMerge {
    pub messages_moved: u64,
    pub participants_removed: u64,
    pub conversations_removed: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversationPurge {
    pub messages_removed: u64,
    pub participants_removed: u64,
}

/// Audit row appended after a successful fix.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSystemIssue {
    pub issue_type: IssueType,
    pub user_id: Option<String>,
    pub context: Value,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemIssueRecord {
    pub id: String,
    pub issue_type: String,
    pub user_id: Option<String>,
    pub context: Value,
    pub resolved_at: DateTime<Utc>,
}

/// One fix request: which user and issue, plus disambiguating details
/// (gallery row id, conversation id, match target).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixTarget {
    pub user_id: String,
    pub issue_type: IssueType,
    #[serde(default)]
    pub details: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixResult {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFixItem {
    pub user_id: String,
    pub issue_type: IssueType,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFixReport {
    pub fixed: Vec<BatchFixItem>,
    pub failed: Vec<BatchFixItem>,
}
