pub mod admin;
pub mod integrity;
pub mod metrics;
pub mod webhook;

pub use integrity::{
    data_integrity_fix_handler, data_integrity_scan_handler, match_integrity_fix_handler,
    match_integrity_scan_handler,
};
pub use metrics::metrics_handler;
pub use webhook::stripe_webhook_handler;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

use amora_domain::integrity::IntegrityError;
use amora_domain::storage::StorageError;
use amora_domain::webhook::ReconcileError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("missing bearer token")]
    Unauthorized,
    #[error("invalid admin token")]
    Forbidden,
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Reconcile(ReconcileError::Signature(_) | ReconcileError::Decode(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Reconcile(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Integrity(IntegrityError::MissingDetail { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Integrity(IntegrityError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            success: false,
            error: self.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}
