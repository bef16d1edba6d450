/// Error handling for the API server
///
/// Handlers return `ApiResult<T>`; [`ApiError`] renders as a JSON body with
/// a stable machine-readable code:
///
/// ```json
/// { "error": "insufficient_scope", "message": "Missing required scope: links:write" }
/// ```
///
/// | code | status |
/// |---|---|
/// | `unauthorized` | 401 |
/// | `forbidden` | 403 |
/// | `insufficient_scope` | 403 |
/// | `not_found` | 404 |
/// | `conflict` | 409 |
/// | `validation_error` | 422 |
/// | `rate_limited` | 429 |
/// | `internal_error` | 500 |

use std::fmt;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tollgate_shared::{GateError, GateResult};
use validator::{Validate, ValidationErrors};

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Missing or invalid credentials (401)
    Unauthorized(String),

    /// Role, feature or tier denial (403)
    Forbidden(String),

    /// API key lacks a scope (403)
    InsufficientScope(String),

    /// Absent or not visible to this account (404)
    NotFound(String),

    /// Invariant violation (409)
    Conflict(String),

    /// Malformed input (422)
    ValidationError {
        message: String,
        details: Vec<ValidationErrorDetail>,
    },

    /// Quota exhausted (429); carries no counts or timing
    RateLimited,

    /// Internal server error (500)
    InternalError(String),
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::InsufficientScope(_) => "insufficient_scope",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::ValidationError { .. } => "validation_error",
            ApiError::RateLimited => "rate_limited",
            ApiError::InternalError(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) | ApiError::InsufficientScope(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ValidationError { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            ApiError::InsufficientScope(scope) => write!(f, "Missing required scope: {scope}"),
            ApiError::NotFound(msg) => write!(f, "Not found: {msg}"),
            ApiError::Conflict(msg) => write!(f, "Conflict: {msg}"),
            ApiError::ValidationError { message, details } => {
                write!(f, "Validation failed: {message} ({} field errors)", details.len())
            }
            ApiError::RateLimited => write!(f, "Rate limit exceeded"),
            ApiError::InternalError(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.code().to_string();

        let (message, details) = match self {
            ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg) => (msg, None),
            ApiError::InsufficientScope(scope) => (
                format!("Missing required scope: {scope}"),
                Some(serde_json::json!({ "required_scope": scope })),
            ),
            ApiError::ValidationError { message, details } => {
                let details = if details.is_empty() {
                    None
                } else {
                    serde_json::to_value(details).ok()
                };
                (message, details)
            }
            ApiError::RateLimited => ("Too many requests".to_string(), None),
            ApiError::InternalError(msg) => {
                // Logged here, never returned
                tracing::error!(error = %msg, "Internal error");
                ("An internal error occurred".to_string(), None)
            }
        };

        (
            status,
            Json(ErrorResponse {
                error,
                message,
                details,
            }),
        )
            .into_response()
    }
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Unauthenticated(msg) => ApiError::Unauthorized(msg),
            GateError::NotFound(msg) => ApiError::NotFound(msg),
            GateError::Forbidden(msg) => ApiError::Forbidden(msg),
            GateError::InsufficientScope(scope) => ApiError::InsufficientScope(scope),
            GateError::RateLimited => ApiError::RateLimited,
            GateError::Validation(msg) => ApiError::validation(msg),
            GateError::InvalidFields(fields) => ApiError::ValidationError {
                message: "Request validation failed".to_string(),
                details: fields
                    .into_iter()
                    .map(|(field, message)| ValidationErrorDetail { field, message })
                    .collect(),
            },
            GateError::Conflict(msg) => ApiError::Conflict(msg),
            GateError::Store(e) => ApiError::InternalError(e.to_string()),
        }
    }
}

/// Flattens `validator` errors into `(field, message)` pairs
fn invalid_fields(errors: ValidationErrors) -> GateError {
    let mut fields: Vec<(String, String)> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| {
                let message = error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "Invalid value".to_string());
                (field.to_string(), message)
            })
        })
        .collect();
    fields.sort();

    GateError::InvalidFields(fields)
}

/// Runs `validator` rules on a request body
///
/// Called inside [`Gate::run`](tollgate_shared::Gate::run) bodies, so input
/// is only inspected once the caller is authorized.
pub fn validate_request<T: Validate>(req: &T) -> GateResult<()> {
    req.validate().map_err(invalid_fields)
}

/// Unwraps a JSON body extracted as `Result<Json<T>, JsonRejection>`
///
/// Handlers defer the rejection so that a malformed body from an
/// unauthorized caller is still answered (and audited) as a denial.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> GateResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| GateError::Validation(rejection.body_text()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_error_mapping() {
        let cases = [
            (GateError::Forbidden("x".into()), StatusCode::FORBIDDEN, "forbidden"),
            (
                GateError::InsufficientScope("links:write".into()),
                StatusCode::FORBIDDEN,
                "insufficient_scope",
            ),
            (GateError::RateLimited, StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            (GateError::NotFound("x".into()), StatusCode::NOT_FOUND, "not_found"),
            (
                GateError::Validation("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
            ),
            (GateError::Conflict("x".into()), StatusCode::CONFLICT, "conflict"),
            (
                GateError::Unauthenticated("x".into()),
                StatusCode::UNAUTHORIZED,
                "unauthorized",
            ),
        ];

        for (gate_error, status, code) in cases {
            let api_error = ApiError::from(gate_error);
            assert_eq!(api_error.status(), status);
            assert_eq!(api_error.code(), code);
        }
    }

    #[tokio::test]
    async fn test_rate_limited_body_has_no_hints() {
        let response = ApiError::RateLimited.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().get("Retry-After").is_none());

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: JsonValue = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "rate_limited");
        assert!(json.get("details").is_none());
    }

    #[derive(Debug, Validate)]
    struct Named {
        #[validate(length(min = 1, message = "Name is required"))]
        name: String,
    }

    #[test]
    fn test_invalid_fields_keep_field_details() {
        let err = validate_request(&Named {
            name: String::new(),
        })
        .unwrap_err();

        match ApiError::from(err) {
            ApiError::ValidationError { details, .. } => {
                assert_eq!(details.len(), 1);
                assert_eq!(details[0].field, "name");
                assert_eq!(details[0].message, "Name is required");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(validate_request(&Named {
            name: "ok".to_string()
        })
        .is_ok());
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::InsufficientScope("links:write".to_string());
        assert_eq!(err.to_string(), "Missing required scope: links:write");
    }
}
