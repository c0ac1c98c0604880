use actix_web::{http::header::AUTHORIZATION, HttpRequest};
use metrics::counter;

use crate::state::AppState;

use super::ApiError;

/// Checks `Authorization: Bearer <token>` against the configured admin token.
pub fn authorize(request: &HttpRequest, state: &AppState) -> Result<(), ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let Some(header) = header else {
        counter!("api_admin_auth_failures_total", "reason" => "missing").increment(1);
        return Err(ApiError::Unauthorized);
    };
    let Some(token) = header.strip_prefix("Bearer ") else {
        counter!("api_admin_auth_failures_total", "reason" => "scheme").increment(1);
        return Err(ApiError::Unauthorized);
    };

    if constant_time_eq(token.trim().as_bytes(), state.admin_token().as_bytes()) {
        Ok(())
    } else {
        counter!("api_admin_auth_failures_total", "reason" => "mismatch").increment(1);
        Err(ApiError::Forbidden)
    }
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
