use actix_web::{web, HttpRequest, HttpResponse};
use amora_domain::webhook::ReconcileOutcome;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::state::AppState;

use super::ApiError;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
}

/// Receives processor events. The raw body is verified before it is parsed.
pub async fn stripe_webhook_handler(
    state: web::Data<AppState>,
    request: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let Some(signature) = request
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        counter!("api_webhook_requests_total", "status" => "missing_signature").increment(1);
        return Err(ApiError::BadRequest(format!(
            "missing {SIGNATURE_HEADER} header"
        )));
    };

    let outcome = state
        .reconciler()
        .process(&body, signature)
        .await
        .inspect_err(|err| {
            if matches!(err, amora_domain::webhook::ReconcileError::Handler { .. }) {
                error!(error = %err, "webhook handler failed");
            }
            counter!("api_webhook_requests_total", "status" => "error").increment(1);
        })?;

    counter!("api_webhook_requests_total", "status" => "ok").increment(1);
    Ok(HttpResponse::Ok().json(WebhookAck {
        received: true,
        duplicate: outcome == ReconcileOutcome::Duplicate,
    }))
}
