use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use helpdesk_core::HelpdeskError;
use helpdesk_types::api::ErrorBody;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Helpdesk(#[from] HelpdeskError),

    #[error("{0}")]
    BadRequest(String),

    #[error("missing or unknown staff id")]
    Unauthorized,

    #[error("no scan named '{0}'")]
    UnknownScan(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        error!("spawn_blocking join error: {}", e);
        Self::Internal(e.to_string())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Helpdesk(e) => match e {
                HelpdeskError::UserNotFound(_) | HelpdeskError::TicketNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                HelpdeskError::InvalidTransition { .. }
                | HelpdeskError::TicketClosed(_)
                | HelpdeskError::NoActiveTicket
                | HelpdeskError::ActiveTicketClosed(_)
                | HelpdeskError::Contended => StatusCode::CONFLICT,
                HelpdeskError::NotOwner { .. } | HelpdeskError::NotPermitted(_) => {
                    StatusCode::FORBIDDEN
                }
                HelpdeskError::InvalidMessage(_) => StatusCode::UNPROCESSABLE_ENTITY,
                HelpdeskError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::UnknownScan(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Helpdesk(e) => e.code(),
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::UnknownScan(_) => "not_found",
            Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Store failures are logged in full but never echoed to callers
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {:#}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        let body = ErrorBody {
            error: self.code().to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
