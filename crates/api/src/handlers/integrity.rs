use std::str::FromStr;

use actix_web::{web, HttpRequest, HttpResponse};
use amora_domain::integrity::BatchSelection;
use amora_domain::model::{BatchFixItem, CheckCategory, FixResult, FixTarget, IssueType};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, EnumString};
use tracing::info;

use crate::state::AppState;

use super::{admin::authorize, ApiError};

#[derive(Debug, Deserialize)]
pub struct ScanQuery {
    pub check: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum FixAction {
    FixSingle,
    FixAvatars,
    FixGallery,
    FixDuplicateMatches,
    FixDuplicateConversations,
    FixOrphanedConversations,
}

impl FixAction {
    fn selection(self) -> Option<BatchSelection> {
        match self {
            Self::FixSingle => None,
            Self::FixAvatars => Some(BatchSelection::category(CheckCategory::Avatars)),
            Self::FixGallery => Some(BatchSelection::category(CheckCategory::Gallery)),
            Self::FixDuplicateMatches => Some(BatchSelection::types([IssueType::DuplicateMatch])),
            Self::FixDuplicateConversations => {
                Some(BatchSelection::types([IssueType::DuplicateConversation]))
            }
            Self::FixOrphanedConversations => {
                Some(BatchSelection::types([IssueType::OrphanedConversation]))
            }
        }
    }

    fn is_match_scoped(self) -> bool {
        matches!(
            self,
            Self::FixSingle
                | Self::FixDuplicateMatches
                | Self::FixDuplicateConversations
                | Self::FixOrphanedConversations
        )
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FixRequest {
    pub action: String,
    pub user_id: Option<String>,
    pub issue_type: Option<String>,
    #[serde(default)]
    pub details: Value,
    pub user_ids: Option<Vec<String>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FixResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<FixResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed: Option<Vec<BatchFixItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<Vec<BatchFixItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn data_integrity_scan_handler(
    state: web::Data<AppState>,
    request: HttpRequest,
    query: web::Query<ScanQuery>,
) -> Result<HttpResponse, ApiError> {
    authorize(&request, &state)?;
    let category = match query.check.as_deref().map(str::trim) {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(
            CheckCategory::from_str(raw)
                .map_err(|_| ApiError::BadRequest(format!("unknown check `{raw}`")))?,
        ),
    };
    let report = state.integrity().scan(category).await?;
    Ok(HttpResponse::Ok().json(report))
}

pub async fn data_integrity_fix_handler(
    state: web::Data<AppState>,
    request: HttpRequest,
    payload: web::Json<FixRequest>,
) -> Result<HttpResponse, ApiError> {
    authorize(&request, &state)?;
    let action = parse_action(&payload.action)?;
    run_fix(&state, action, payload.into_inner(), None).await
}

pub async fn match_integrity_scan_handler(
    state: web::Data<AppState>,
    request: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    authorize(&request, &state)?;
    let report = state.integrity().scan(Some(CheckCategory::Matches)).await?;
    Ok(HttpResponse::Ok().json(report))
}

pub async fn match_integrity_fix_handler(
    state: web::Data<AppState>,
    request: HttpRequest,
    payload: web::Json<FixRequest>,
) -> Result<HttpResponse, ApiError> {
    authorize(&request, &state)?;
    let action = parse_action(&payload.action)?;
    if !action.is_match_scoped() {
        return Err(ApiError::BadRequest(format!(
            "action `{}` is not available for match integrity",
            action.as_ref()
        )));
    }
    run_fix(&state, action, payload.into_inner(), Some(CheckCategory::Matches)).await
}

fn parse_action(raw: &str) -> Result<FixAction, ApiError> {
    FixAction::from_str(raw.trim())
        .map_err(|_| ApiError::BadRequest(format!("unknown action `{raw}`")))
}

async fn run_fix(
    state: &AppState,
    action: FixAction,
    request: FixRequest,
    scope: Option<CheckCategory>,
) -> Result<HttpResponse, ApiError> {
    counter!("api_admin_fix_requests_total", "action" => action.as_ref().to_string())
        .increment(1);

    let Some(selection) = action.selection() else {
        let target = single_target(request, scope)?;
        let result = state.integrity().fix(&target).await?;
        info!(
            user_id = %target.user_id,
            issue_type = %target.issue_type,
            success = result.success,
            "admin fix applied"
        );
        return Ok(HttpResponse::Ok().json(FixResponse {
            success: result.success,
            result: Some(result),
            ..FixResponse::default()
        }));
    };

    let report = state
        .integrity()
        .fix_batch(&selection.for_users(request.user_ids))
        .await?;
    info!(
        action = action.as_ref(),
        fixed = report.fixed.len(),
        failed = report.failed.len(),
        "admin batch fix finished"
    );
    Ok(HttpResponse::Ok().json(FixResponse {
        success: true,
        fixed: Some(report.fixed),
        failed: Some(report.failed),
        ..FixResponse::default()
    }))
}

fn single_target(
    request: FixRequest,
    scope: Option<CheckCategory>,
) -> Result<FixTarget, ApiError> {
    let raw_type = request
        .issue_type
        .ok_or_else(|| ApiError::BadRequest("fix_single requires `issueType`".into()))?;
    let issue_type = IssueType::from_str(raw_type.trim())
        .map_err(|_| ApiError::BadRequest(format!("unknown issue type `{raw_type}`")))?;
    let user_id = request
        .user_id
        .map(|id| id.trim().to_string())
        .unwrap_or_default();
    if user_id.is_empty() && !located_by_details(issue_type) {
        return Err(ApiError::BadRequest("fix_single requires `userId`".into()));
    }
    if let Some(scope) = scope {
        if issue_type.category() != scope {
            return Err(ApiError::BadRequest(format!(
                "issue type `{raw_type}` is outside {scope} checks"
            )));
        }
    }
    Ok(FixTarget {
        user_id,
        issue_type,
        details: request.details,
    })
}

/// Conversation issues name their rows in `details`; a conversation with no
/// participants is reported without a user.
fn located_by_details(issue_type: IssueType) -> bool {
    matches!(
        issue_type,
        IssueType::OrphanedConversation | IssueType::DuplicateConversation
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_parse_from_snake_case() {
        assert_eq!(
            FixAction::from_str("fix_duplicate_conversations").unwrap(),
            FixAction::FixDuplicateConversations
        );
        assert!(FixAction::from_str("drop_everything").is_err());
        assert!(!FixAction::FixAvatars.is_match_scoped());
    }

    #[test]
    fn single_target_rejects_out_of_scope_issue() {
        let request = FixRequest {
            action: "fix_single".into(),
            user_id: Some("u1".into()),
            issue_type: Some("missing_avatar".into()),
            details: Value::Null,
            user_ids: None,
        };
        assert!(single_target(request.clone(), None).is_ok());
        assert!(matches!(
            single_target(request, Some(CheckCategory::Matches)),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn user_id_is_optional_only_for_conversation_issues() {
        let orphan = FixRequest {
            action: "fix_single".into(),
            user_id: Some(String::new()),
            issue_type: Some("orphaned_conversation".into()),
            details: serde_json::json!({ "conversationId": "c1" }),
            user_ids: None,
        };
        let target = single_target(orphan, Some(CheckCategory::Matches)).unwrap();
        assert_eq!(target.user_id, "");

        let avatar = FixRequest {
            action: "fix_single".into(),
            user_id: None,
            issue_type: Some("missing_avatar".into()),
            details: Value::Null,
            user_ids: None,
        };
        assert!(matches!(
            single_target(avatar, None),
            Err(ApiError::BadRequest(_))
        ));
    }
}
