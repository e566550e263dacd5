//! Envelope response format for the REST API.
//!
//! ```json
//! {
//!   "data": { ... },
//!   "meta": { "request_id": "...", "timestamp": "...", "response_time_ms": 5 },
//!   "errors": [],
//!   "_links": { "self": "/api/v1/sessions" }
//! }
//! ```

use std::collections::BTreeMap;
use std::time::Instant;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    pub meta: ApiMeta,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ApiErrorDetail>,

    #[serde(rename = "_links", skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, String>,

    #[serde(skip)]
    status: StatusCode,
}

#[derive(Debug, Serialize)]
pub struct ApiMeta {
    pub request_id: String,
    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
    pub response_time_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    /// Machine-readable error code, e.g. `NOT_FOUND`.
    pub code: String,
    pub message: String,
}

impl ApiMeta {
    fn new(started: Option<Instant>) -> Self {
        Self {
            request_id: uuid::Uuid::now_v7().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            response_time_ms: started.map_or(0, |s| s.elapsed().as_millis() as u64),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    /// A 200 response carrying `data`, timed from `started`.
    pub fn success(data: T, started: Instant) -> Self {
        Self {
            data: Some(data),
            meta: ApiMeta::new(Some(started)),
            errors: Vec::new(),
            links: BTreeMap::new(),
            status: StatusCode::OK,
        }
    }

    pub fn with_link(mut self, rel: &str, href: &str) -> Self {
        self.links.insert(rel.to_string(), href.to_string());
        self
    }
}

impl ApiResponse<()> {
    pub fn error(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            data: None,
            meta: ApiMeta::new(None),
            errors: vec![ApiErrorDetail {
                code: code.to_string(),
                message: message.to_string(),
            }],
            links: BTreeMap::new(),
            status,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = serde_json::to_string(&self).unwrap_or_else(|_| {
            r#"{"errors":[{"code":"SERIALIZATION_ERROR","message":"Failed to serialize response"}]}"#
                .to_string()
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_shape() {
        let response = ApiResponse::success(vec!["a"], Instant::now())
            .with_link("self", "/api/v1/sessions");
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["data"], serde_json::json!(["a"]));
        assert_eq!(json["_links"]["self"], "/api/v1/sessions");
        assert!(json.get("errors").is_none());
        assert!(json["meta"]["request_id"].as_str().is_some());
    }

    #[test]
    fn test_error_envelope_carries_status() {
        let response = ApiResponse::error(StatusCode::NOT_FOUND, "NOT_FOUND", "Session not found");
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("data").is_none());
        assert_eq!(json["errors"][0]["code"], "NOT_FOUND");

        assert_eq!(response.into_response().status(), StatusCode::NOT_FOUND);
    }
}
