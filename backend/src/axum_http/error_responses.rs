use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::usecases::{billing::BillingError, environment_layout::LayoutError};

const INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

fn error_response(status: StatusCode, message: String) -> Response {
    let body = Json(ErrorResponse {
        code: status.as_u16(),
        message,
    });

    (status, body).into_response()
}

impl IntoResponse for BillingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match self {
            // Don't leak internal error detail to client
            BillingError::Internal(_) => INTERNAL_MESSAGE.to_string(),
            other => other.to_string(),
        };

        error_response(status, message)
    }
}

impl IntoResponse for LayoutError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match self {
            LayoutError::Internal(_) => INTERNAL_MESSAGE.to_string(),
            other => other.to_string(),
        };

        error_response(status, message)
    }
}
