//! Boundary errors for the REST API.

use api_shared::AuthError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use consult_core::ConsultError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// JSON body of every rejection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub detail: String,
}

/// A request rejected before any response body is streamed.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl From<ConsultError> for ApiError {
    fn from(err: ConsultError) -> Self {
        let status = match &err {
            ConsultError::Authentication(_) => StatusCode::FORBIDDEN,
            ConsultError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ConsultError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ConsultError::UpstreamStream(_) | ConsultError::Configuration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ConsultError::from(err).into()
    }
}

/// A body that fails to parse is a [`ConsultError::Validation`], reported with the status axum
/// chose for the rejection (`400`, `415` or `422`).
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let status = rejection.status();
        let err = ConsultError::Validation(rejection.body_text());
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}
