//! Pure consistency checks over rows already loaded from storage.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde_json::json;

use crate::model::{
    ConversationRow, DataIntegrityIssue, GalleryPhoto, IntegritySummary, IssueType, MatchRow,
    ParticipantRow, Severity, UserProfileRow,
};

const OBJECT_MARKER: &str = "/storage/v1/object/";
const ACCESS_SEGMENTS: [&str; 3] = ["public/", "sign/", "authenticated/"];

/// Reduces an avatar or gallery reference to a bucket-relative object path.
/// Returns an empty string when nothing usable remains.
pub fn normalize_storage_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" || trimmed == "undefined" {
        return String::new();
    }
    let without_query = trimmed
        .split(['?', '#'])
        .next()
        .unwrap_or_default();

    let path = if let Some(index) = without_query.find(OBJECT_MARKER) {
        let rest = &without_query[index + OBJECT_MARKER.len()..];
        let rest = ACCESS_SEGMENTS
            .iter()
            .find_map(|segment| rest.strip_prefix(segment))
            .unwrap_or(rest);
        // first segment is the bucket
        rest.split_once('/').map(|(_, path)| path).unwrap_or_default()
    } else if let Some((_, after_scheme)) = without_query.split_once("://") {
        after_scheme
            .split_once('/')
            .map(|(_, path)| path)
            .unwrap_or_default()
    } else {
        without_query
    };

    path.trim_matches('/').to_string()
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |value| value.trim().is_empty())
}

fn photos_by_user(gallery: &[GalleryPhoto]) -> HashMap<&str, Vec<&GalleryPhoto>> {
    let mut grouped: HashMap<&str, Vec<&GalleryPhoto>> = HashMap::new();
    for photo in gallery {
        grouped.entry(photo.user_id.as_str()).or_default().push(photo);
    }
    for photos in grouped.values_mut() {
        photos.sort_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then(a.created_at.cmp(&b.created_at))
        });
    }
    grouped
}

pub fn check_avatars(users: &[UserProfileRow], gallery: &[GalleryPhoto]) -> Vec<DataIntegrityIssue> {
    let photos = photos_by_user(gallery);
    let mut issues = Vec::new();
    for user in users {
        let has_photos = photos.get(user.user_id.as_str()).is_some_and(|photos| {
            photos
                .iter()
                .any(|photo| !normalize_storage_path(&photo.storage_path).is_empty())
        });
        match user.avatar_url.as_deref() {
            raw if is_blank(raw) => issues.push(DataIntegrityIssue::new(
                &user.user_id,
                IssueType::MissingAvatar,
                "profile has no avatar",
                json!({}),
                has_photos,
            )),
            Some(raw) if normalize_storage_path(raw).is_empty() => {
                issues.push(DataIntegrityIssue::new(
                    &user.user_id,
                    IssueType::BrokenAvatar,
                    "avatar reference does not resolve to a stored object",
                    json!({ "avatarUrl": raw }),
                    has_photos,
                ))
            }
            _ => {}
        }
    }
    issues
}

/// `missing_objects` holds ids of gallery rows whose object is known to be
/// absent from object storage.
pub fn check_gallery(
    users: &[UserProfileRow],
    gallery: &[GalleryPhoto],
    missing_objects: &HashSet<String>,
) -> Vec<DataIntegrityIssue> {
    let photos = photos_by_user(gallery);
    let mut issues = Vec::new();
    for user in users {
        let Some(user_photos) = photos.get(user.user_id.as_str()) else {
            issues.push(DataIntegrityIssue::new(
                &user.user_id,
                IssueType::NoGalleryPhotos,
                "user has no gallery photos",
                json!({}),
                false,
            ));
            continue;
        };

        if let Some(first) = user_photos.first() {
            if !user_photos.iter().any(|photo| photo.is_primary) {
                issues.push(DataIntegrityIssue::new(
                    &user.user_id,
                    IssueType::MissingPrimaryPhoto,
                    "no gallery photo is marked primary",
                    json!({ "photoId": first.id }),
                    true,
                ));
            }
        }

        for photo in user_photos {
            let invalid = normalize_storage_path(&photo.storage_path).is_empty();
            let missing = missing_objects.contains(&photo.id);
            if photo.is_primary && (invalid || missing) {
                issues.push(DataIntegrityIssue::new(
                    &user.user_id,
                    IssueType::BrokenPrimaryPhoto,
                    "primary photo does not resolve to a stored object",
                    json!({ "photoId": photo.id, "storagePath": photo.storage_path }),
                    true,
                ));
            } else if !photo.is_primary && (invalid || missing) {
                issues.push(DataIntegrityIssue::new(
                    &user.user_id,
                    IssueType::OrphanedGalleryRecord,
                    "gallery row does not resolve to a stored object",
                    json!({ "photoId": photo.id, "storagePath": photo.storage_path }),
                    true,
                ));
            }
        }
    }
    issues
}

pub fn check_profiles(users: &[UserProfileRow]) -> Vec<DataIntegrityIssue> {
    let mut issues = Vec::new();
    for user in users {
        let checks = [
            (
                is_blank(user.gender.as_deref()),
                IssueType::MissingGender,
                "gender is not set",
            ),
            (
                is_blank(user.looking_for.as_deref()),
                IssueType::MissingLookingFor,
                "looking-for preference is not set",
            ),
            (
                user.date_of_birth.is_none(),
                IssueType::MissingDob,
                "date of birth is not set",
            ),
            (
                is_blank(user.first_name.as_deref()),
                IssueType::MissingFirstName,
                "first name is not set",
            ),
        ];
        for (missing, issue_type, description) in checks {
            if missing {
                issues.push(DataIntegrityIssue::new(
                    &user.user_id,
                    issue_type,
                    description,
                    json!({}),
                    false,
                ));
            }
        }
    }
    issues
}

/// Direct conversations grouped by their unordered participant pair, oldest
/// first. Conversations without exactly two participants are left out.
pub fn conversations_by_pair<'a>(
    conversations: &'a [ConversationRow],
    participants: &[ParticipantRow],
) -> BTreeMap<(String, String), Vec<&'a ConversationRow>> {
    let members = members_by_conversation(participants);
    let mut pairs: BTreeMap<(String, String), Vec<&ConversationRow>> = BTreeMap::new();
    for conversation in conversations.iter().filter(|c| !c.is_group) {
        let Some(users) = members.get(conversation.id.as_str()) else {
            continue;
        };
        let mut iter = users.iter();
        if let (Some(a), Some(b), None) = (iter.next(), iter.next(), iter.next()) {
            pairs
                .entry((a.to_string(), b.to_string()))
                .or_default()
                .push(conversation);
        }
    }
    for group in pairs.values_mut() {
        group.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    }
    pairs
}

pub fn members_by_conversation(participants: &[ParticipantRow]) -> HashMap<&str, BTreeSet<&str>> {
    let mut members: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for participant in participants {
        members
            .entry(participant.conversation_id.as_str())
            .or_default()
            .insert(participant.user_id.as_str());
    }
    members
}

pub fn check_matches(
    matches: &[MatchRow],
    conversations: &[ConversationRow],
    participants: &[ParticipantRow],
) -> Vec<DataIntegrityIssue> {
    let mut issues = Vec::new();

    let mut by_pair: BTreeMap<(&str, &str), Vec<&MatchRow>> = BTreeMap::new();
    for row in matches {
        by_pair
            .entry((row.user_id.as_str(), row.target_user_id.as_str()))
            .or_default()
            .push(row);
    }
    for ((user_id, target_user_id), mut rows) in by_pair {
        if rows.len() < 2 {
            continue;
        }
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let ids: Vec<&str> = rows.iter().map(|row| row.id.as_str()).collect();
        issues.push(DataIntegrityIssue::new(
            user_id,
            IssueType::DuplicateMatch,
            format!("{} match rows for the same pair", rows.len()),
            json!({ "targetUserId": target_user_id, "matchIds": ids }),
            true,
        ));
    }

    for ((a, b), group) in conversations_by_pair(conversations, participants) {
        if group.len() < 2 {
            continue;
        }
        let ids: Vec<&str> = group.iter().map(|c| c.id.as_str()).collect();
        issues.push(DataIntegrityIssue::new(
            a.clone(),
            IssueType::DuplicateConversation,
            format!("{} direct conversations between the same users", group.len()),
            json!({ "participantIds": [a, b], "conversationIds": ids }),
            true,
        ));
    }

    let members = members_by_conversation(participants);
    for conversation in conversations.iter().filter(|c| !c.is_group) {
        let users = members.get(conversation.id.as_str());
        let count = users.map_or(0, BTreeSet::len);
        if count >= 2 {
            continue;
        }
        let owner = users
            .and_then(|users| users.iter().next())
            .map(|user| user.to_string())
            .unwrap_or_default();
        issues.push(DataIntegrityIssue::new(
            owner,
            IssueType::OrphanedConversation,
            format!("direct conversation has {count} participant(s)"),
            json!({ "conversationId": conversation.id, "participantCount": count }),
            true,
        ));
    }

    issues
}

pub fn summarize(issues: &[DataIntegrityIssue]) -> IntegritySummary {
    let mut summary = IntegritySummary::default();
    for issue in issues {
        match issue.severity {
            Severity::Critical => summary.critical += 1,
            Severity::Warning => summary.warning += 1,
            Severity::Info => summary.info += 1,
        }
        *summary.by_type.entry(issue.issue_type).or_default() += 1;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate, Utc};

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn complete_user(id: &str) -> UserProfileRow {
        UserProfileRow {
            user_id: id.to_string(),
            first_name: Some("Ada".into()),
            gender: Some("female".into()),
            looking_for: Some("male".into()),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1),
            avatar_url: Some(format!("{id}/avatar.jpg")),
        }
    }

    fn photo(id: &str, user: &str, order: i32, primary: bool) -> GalleryPhoto {
        GalleryPhoto {
            id: id.to_string(),
            user_id: user.to_string(),
            storage_path: format!("{user}/{id}.jpg"),
            is_primary: primary,
            display_order: order,
            created_at: ts(i64::from(order)),
        }
    }

    fn issue_types(issues: &[DataIntegrityIssue]) -> Vec<IssueType> {
        issues.iter().map(|issue| issue.issue_type).collect()
    }

    #[test]
    fn normalizes_public_urls_and_plain_paths() {
        assert_eq!(
            normalize_storage_path(
                "https://x.supabase.co/storage/v1/object/public/gallery/u1/a.jpg?t=123"
            ),
            "u1/a.jpg"
        );
        assert_eq!(
            normalize_storage_path("https://x.co/storage/v1/object/sign/gallery/u1/b.png#frag"),
            "u1/b.png"
        );
        assert_eq!(normalize_storage_path("/u1/c.jpg/"), "u1/c.jpg");
        assert_eq!(normalize_storage_path("https://cdn.example.com/u1/d.jpg"), "u1/d.jpg");
        assert_eq!(normalize_storage_path("  null "), "");
        assert_eq!(normalize_storage_path("undefined"), "");
        assert_eq!(normalize_storage_path("https://cdn.example.com"), "");
        assert_eq!(
            normalize_storage_path("https://x.co/storage/v1/object/public/gallery"),
            ""
        );
    }

    #[test]
    fn avatar_issues_are_fixable_only_with_photos() {
        let mut missing = complete_user("u1");
        missing.avatar_url = None;
        let mut broken = complete_user("u2");
        broken.avatar_url = Some("undefined".into());
        let users = vec![missing, broken, complete_user("u3")];
        let gallery = vec![photo("g1", "u1", 0, true)];

        let issues = check_avatars(&users, &gallery);
        assert_eq!(
            issue_types(&issues),
            vec![IssueType::MissingAvatar, IssueType::BrokenAvatar]
        );
        assert!(issues[0].auto_fixable);
        assert!(!issues[1].auto_fixable);
        assert_eq!(issues[1].severity, Severity::Critical);
    }

    #[test]
    fn gallery_checks_cover_each_case() {
        let users = vec![
            complete_user("none"),
            complete_user("noprimary"),
            complete_user("broken"),
            complete_user("orphan"),
        ];
        let mut broken_primary = photo("b1", "broken", 0, true);
        broken_primary.storage_path = "null".into();
        let gallery = vec![
            photo("n2", "noprimary", 2, false),
            photo("n1", "noprimary", 1, false),
            broken_primary,
            photo("b2", "broken", 1, false),
            photo("o1", "orphan", 0, true),
            photo("o2", "orphan", 1, false),
        ];
        let missing: HashSet<String> = ["o2".to_string()].into_iter().collect();

        let issues = check_gallery(&users, &gallery, &missing);
        assert_eq!(
            issue_types(&issues),
            vec![
                IssueType::NoGalleryPhotos,
                IssueType::MissingPrimaryPhoto,
                IssueType::BrokenPrimaryPhoto,
                IssueType::OrphanedGalleryRecord,
            ]
        );
        assert_eq!(issues[1].details["photoId"], "n1");
        assert_eq!(issues[2].details["photoId"], "b1");
        assert_eq!(issues[3].details["photoId"], "o2");
        assert!(!issues[0].auto_fixable);
    }

    #[test]
    fn unresolvable_secondary_photo_is_orphaned_without_object_check() {
        let users = vec![complete_user("u1")];
        let mut blank = photo("g2", "u1", 1, false);
        blank.storage_path = "null".into();
        let gallery = vec![photo("g1", "u1", 0, true), blank];

        let issues = check_gallery(&users, &gallery, &HashSet::new());
        assert_eq!(issue_types(&issues), vec![IssueType::OrphanedGalleryRecord]);
        assert_eq!(issues[0].details["photoId"], "g2");
        assert!(issues[0].auto_fixable);
    }

    #[test]
    fn avatar_is_not_fixable_when_no_photo_resolves() {
        let mut user = complete_user("u1");
        user.avatar_url = None;
        let mut blank = photo("g1", "u1", 0, true);
        blank.storage_path = "undefined".into();

        let issues = check_avatars(&[user], &[blank]);
        assert_eq!(issue_types(&issues), vec![IssueType::MissingAvatar]);
        assert!(!issues[0].auto_fixable);
    }

    #[test]
    fn primary_with_missing_object_is_broken() {
        let users = vec![complete_user("u1")];
        let gallery = vec![photo("g1", "u1", 0, true)];
        let missing: HashSet<String> = ["g1".to_string()].into_iter().collect();
        let issues = check_gallery(&users, &gallery, &missing);
        assert_eq!(issue_types(&issues), vec![IssueType::BrokenPrimaryPhoto]);
    }

    #[test]
    fn profile_checks_never_autofix() {
        let user = UserProfileRow {
            user_id: "u1".into(),
            first_name: Some("  ".into()),
            gender: None,
            looking_for: Some("any".into()),
            date_of_birth: None,
            avatar_url: None,
        };
        let issues = check_profiles(&[user]);
        assert_eq!(
            issue_types(&issues),
            vec![
                IssueType::MissingGender,
                IssueType::MissingDob,
                IssueType::MissingFirstName,
            ]
        );
        assert!(issues.iter().all(|issue| !issue.auto_fixable));
        assert!(check_profiles(&[complete_user("u2")]).is_empty());
    }

    #[test]
    fn duplicate_matches_are_per_ordered_pair() {
        let row = |id: &str, user: &str, target: &str, at: i64| MatchRow {
            id: id.into(),
            user_id: user.into(),
            target_user_id: target.into(),
            created_at: ts(at),
        };
        let matches = vec![
            row("m2", "a", "b", 20),
            row("m1", "a", "b", 10),
            row("m3", "b", "a", 5),
        ];
        let issues = check_matches(&matches, &[], &[]);
        assert_eq!(issue_types(&issues), vec![IssueType::DuplicateMatch]);
        assert_eq!(issues[0].user_id, "a");
        assert_eq!(issues[0].details["targetUserId"], "b");
        assert_eq!(issues[0].details["matchIds"], json!(["m1", "m2"]));
    }

    #[test]
    fn conversation_checks() {
        let conversation = |id: &str, at: i64, is_group: bool| ConversationRow {
            id: id.into(),
            is_group,
            created_at: ts(at),
        };
        let participant = |id: &str, conversation: &str, user: &str| ParticipantRow {
            id: id.into(),
            conversation_id: conversation.into(),
            user_id: user.into(),
        };
        let conversations = vec![
            conversation("c2", 20, false),
            conversation("c1", 10, false),
            conversation("c3", 30, false),
            conversation("g1", 5, true),
        ];
        let participants = vec![
            participant("p1", "c1", "b"),
            participant("p2", "c1", "a"),
            participant("p3", "c2", "a"),
            participant("p4", "c2", "b"),
            participant("p5", "c3", "a"),
            participant("p6", "g1", "a"),
        ];

        let issues = check_matches(&[], &conversations, &participants);
        assert_eq!(
            issue_types(&issues),
            vec![
                IssueType::DuplicateConversation,
                IssueType::OrphanedConversation,
            ]
        );
        assert_eq!(issues[0].user_id, "a");
        assert_eq!(issues[0].details["conversationIds"], json!(["c1", "c2"]));
        assert_eq!(issues[0].details["participantIds"], json!(["a", "b"]));
        assert_eq!(issues[1].details["conversationId"], "c3");
        assert_eq!(issues[1].details["participantCount"], 1);
    }

    #[test]
    fn summary_counts_match_issue_total() {
        let mut user = complete_user("u1");
        user.avatar_url = None;
        user.gender = None;
        user.first_name = None;
        let mut issues = check_avatars(&[user.clone()], &[]);
        issues.extend(check_profiles(&[user.clone()]));
        issues.extend(check_gallery(&[user], &[], &HashSet::new()));

        let summary = summarize(&issues);
        assert_eq!(summary.critical + summary.warning + summary.info, issues.len());
        assert_eq!(summary.critical, 2);
        assert_eq!(summary.warning, 2);
        assert_eq!(summary.by_type.get(&IssueType::NoGalleryPhotos), Some(&1));
    }
}
