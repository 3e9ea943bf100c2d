use std::error;

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use serde::Serialize;
use tessera::{IssuanceError, RotationError};
use thiserror::Error;

/// A request that could not be served
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request's source address could not be determined
    #[error("failed to determine IP")]
    UndeterminedAddress,

    /// The `client_id` query parameter is missing or not a usable identity
    #[error("incorrect value of user id")]
    InvalidClientId,

    /// The refresh request body is missing or incomplete
    #[error("incorrect request")]
    InvalidRequest,

    /// Issuing a pair failed
    #[error(transparent)]
    Issuance(#[from] IssuanceError),

    /// Rotating a pair failed
    #[error(transparent)]
    Rotation(#[from] RotationError),
}

impl ApiError {
    /// The status code and client-facing message for this error
    pub fn status_and_message(&self) -> (StatusCode, &'static str) {
        const INVALID_ACCESS: &str = "invalid access token";
        const INVALID_REFRESH: &str = "invalid refresh token";
        const USER_NOT_FOUND: &str = "user id not found";
        const INTERNAL: &str = "failed to create tokens";

        match self {
            Self::UndeterminedAddress => (StatusCode::FORBIDDEN, "failed to determine IP"),
            Self::InvalidClientId => (StatusCode::BAD_REQUEST, "incorrect value of user id"),
            Self::InvalidRequest => (StatusCode::BAD_REQUEST, "incorrect request"),
            Self::Issuance(err) if err.is_unknown_identity() => {
                (StatusCode::NOT_FOUND, USER_NOT_FOUND)
            }
            Self::Issuance(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL),
            Self::Rotation(err) => match err {
                RotationError::InvalidAccessToken(_) | RotationError::TokenPairMismatch => {
                    (StatusCode::BAD_REQUEST, INVALID_ACCESS)
                }
                RotationError::InvalidRefreshToken(_)
                | RotationError::RefreshExpired
                | RotationError::RefreshTamperedOrReused(_) => {
                    (StatusCode::BAD_REQUEST, INVALID_REFRESH)
                }
                RotationError::SourceAddressMismatch => (StatusCode::BAD_REQUEST, "unknown IP"),
                RotationError::RefreshNotFound => {
                    (StatusCode::NOT_FOUND, "refresh token not found")
                }
                err if err.is_unknown_identity() => (StatusCode::NOT_FOUND, USER_NOT_FOUND),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL),
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    error: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        if status.is_server_error() {
            tracing::error!(
                error = (&self as &dyn error::Error),
                %status,
                "request failed"
            );
        } else {
            tracing::debug!(%status, reason = message, "request rejected");
        }

        let body = ErrorBody {
            status: "Error",
            error: message,
        };
        (status, Json(body)).into_response()
    }
}
