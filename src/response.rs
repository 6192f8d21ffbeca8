//! Shared JSON response envelope.
//!
//! DESIGN
//! ======
//! Every endpoint answers with the same envelope so clients parse one shape:
//! `{success, message, data?, error?, meta?}`. Helper constructors pair the
//! envelope with the right status code; handlers never build raw JSON.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

// =============================================================================
// ENVELOPE
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Pagination and listing metadata.
#[derive(Debug, Default, Serialize)]
pub struct Meta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_cursor: Option<String>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

// =============================================================================
// SUCCESS CONSTRUCTORS
// =============================================================================

/// 200 with data.
pub fn success<T: Serialize>(message: &str, data: T) -> Response {
    envelope(StatusCode::OK, message, Some(json(data)), None, None)
}

/// 200 with data and pagination metadata.
pub fn success_with_meta<T: Serialize>(message: &str, data: T, meta: Meta) -> Response {
    envelope(StatusCode::OK, message, Some(json(data)), None, Some(meta))
}

/// 201 with data.
pub fn created<T: Serialize>(message: &str, data: T) -> Response {
    envelope(StatusCode::CREATED, message, Some(json(data)), None, None)
}

// =============================================================================
// ERROR CONSTRUCTORS
// =============================================================================

pub fn bad_request(message: &str, details: Option<serde_json::Value>) -> Response {
    error(StatusCode::BAD_REQUEST, "BAD_REQUEST", message, details)
}

pub fn unauthorized(message: &str) -> Response {
    error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message, None)
}

pub fn forbidden(message: &str) -> Response {
    error(StatusCode::FORBIDDEN, "FORBIDDEN", message, None)
}

pub fn not_found(message: &str) -> Response {
    error(StatusCode::NOT_FOUND, "NOT_FOUND", message, None)
}

pub fn request_timeout(message: &str) -> Response {
    error(StatusCode::REQUEST_TIMEOUT, "REQUEST_TIMEOUT", message, None)
}

pub fn conflict(message: &str) -> Response {
    error(StatusCode::CONFLICT, "CONFLICT", message, None)
}

pub fn too_many_requests(message: &str) -> Response {
    error(StatusCode::TOO_MANY_REQUESTS, "TOO_MANY_REQUESTS", message, None)
}

pub fn internal_error(message: &str) -> Response {
    error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR", message, None)
}

pub fn service_unavailable(message: &str) -> Response {
    error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message, None)
}

// =============================================================================
// INTERNAL
// =============================================================================

fn json<T: Serialize>(data: T) -> serde_json::Value {
    serde_json::to_value(data).unwrap_or(serde_json::Value::Null)
}

fn envelope(
    status: StatusCode,
    message: &str,
    data: Option<serde_json::Value>,
    error: Option<ErrorDetail>,
    meta: Option<Meta>,
) -> Response {
    let body = ApiResponse { success: status.is_success(), message: message.to_string(), data, error, meta };
    (status, Json(body)).into_response()
}

fn error(status: StatusCode, code: &'static str, message: &str, details: Option<serde_json::Value>) -> Response {
    let detail = ErrorDetail { code, message: message.to_string(), details };
    envelope(status, message, None, Some(detail), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_json(resp: &ApiResponse) -> serde_json::Value {
        serde_json::to_value(resp).unwrap()
    }

    #[test]
    fn success_envelope_shape() {
        let resp = ApiResponse {
            success: true,
            message: "ok".into(),
            data: Some(serde_json::json!({"x": 1})),
            error: None,
            meta: None,
        };
        let v = body_json(&resp);
        assert_eq!(v["success"], true);
        assert_eq!(v["data"]["x"], 1);
        assert!(v.get("error").is_none());
        assert!(v.get("meta").is_none());
    }

    #[test]
    fn error_envelope_carries_code() {
        let resp = ApiResponse {
            success: false,
            message: "nope".into(),
            data: None,
            error: Some(ErrorDetail { code: "CONFLICT", message: "nope".into(), details: None }),
            meta: None,
        };
        let v = body_json(&resp);
        assert_eq!(v["error"]["code"], "CONFLICT");
        assert!(v.get("data").is_none());
    }

    #[test]
    fn meta_omits_empty_cursors() {
        let meta = Meta { has_more: true, limit: Some(20), ..Meta::default() };
        let v = serde_json::to_value(&meta).unwrap();
        assert_eq!(v["has_more"], true);
        assert_eq!(v["limit"], 20);
        assert!(v.get("next_cursor").is_none());
    }

    #[test]
    fn status_constructors_map_codes() {
        assert_eq!(too_many_requests("busy").status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(service_unavailable("down").status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(request_timeout("slow").status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(not_found("gone").status(), StatusCode::NOT_FOUND);
        assert_eq!(created("made", serde_json::json!({})).status(), StatusCode::CREATED);
    }
}
