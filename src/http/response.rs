use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::RosterError;

/// Map a domain error to its status code and JSON body.
///
/// Storage and internal failures are logged and answered with a generic
/// message so database details never reach the client.
pub fn error_response(err: &RosterError) -> Response {
    let status = match err {
        RosterError::UnsupportedUpload(_)
        | RosterError::InvalidInput(_)
        | RosterError::Parse { .. } => StatusCode::BAD_REQUEST,
        RosterError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RosterError::Conflict(_) => StatusCode::CONFLICT,
        RosterError::NotFound(_) => StatusCode::NOT_FOUND,
        RosterError::Database(_)
        | RosterError::Io(_)
        | RosterError::Config(_)
        | RosterError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        log::error!("Request failed: {}", err);
        return error_body(
            status,
            err.kind(),
            "Could not complete the request. Please try again later.",
        );
    }

    let mut body = json!({
        "error": err.kind(),
        "message": err.to_string(),
    });
    if let RosterError::Validation(report) = err {
        body["issues"] = serde_json::to_value(&report.issues).unwrap_or_default();
        body["totalIssues"] = json!(report.total);
        body["truncated"] = json!(report.truncated);
    }

    (status, Json(body)).into_response()
}

pub(crate) fn error_body(status: StatusCode, kind: &str, message: &str) -> Response {
    (
        status,
        Json(json!({
            "error": kind,
            "message": message,
        })),
    )
        .into_response()
}
