use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use storescore_score::ScoreError;
use storescore_scrape::ScrapeError;
use thiserror::Error;
use tracing::error;

use crate::billing::BillingError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    PaymentRequired(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Internal(detail) => {
                error!("internal error: {detail}");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<storescore_core::Error> for ApiError {
    fn from(err: storescore_core::Error) -> Self {
        use storescore_core::Error;
        match err {
            Error::NotFound { collection, .. } => {
                ApiError::NotFound(format!("{} not found", singular(collection)))
            }
            // Ids that cannot name a file cannot name a record either.
            Error::InvalidId(_) => ApiError::NotFound("not found".into()),
            Error::Conflict(msg) => ApiError::Conflict(msg),
            Error::InsufficientCredits { .. } => ApiError::PaymentRequired(err.to_string()),
            Error::InvalidTransition(_) => ApiError::Conflict(err.to_string()),
            Error::InvalidAmount(_) => ApiError::BadRequest(err.to_string()),
            Error::Io(_) | Error::Json(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ScrapeError> for ApiError {
    fn from(err: ScrapeError) -> Self {
        match err {
            ScrapeError::InvalidUrl(..) => ApiError::Validation(err.to_string()),
            _ => ApiError::Upstream(err.to_string()),
        }
    }
}

impl From<ScoreError> for ApiError {
    fn from(err: ScoreError) -> Self {
        match err {
            ScoreError::NotConfigured => ApiError::Unavailable(err.to_string()),
            _ => ApiError::Upstream(err.to_string()),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Signature(_) => ApiError::BadRequest(err.to_string()),
            _ => ApiError::Upstream(err.to_string()),
        }
    }
}

fn singular(collection: &str) -> &str {
    match collection {
        "analyses" => "analysis",
        "chats" => "chat session",
        "credits" => "credit entry",
        "webhook-events" => "webhook event",
        other => other.strip_suffix('s').unwrap_or(other),
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
