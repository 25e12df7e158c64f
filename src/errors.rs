use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Application-specific error types.
///
/// Every failure a handler can surface maps to exactly one variant, and every
/// variant renders as a JSON body with a stable `kind` so the front end can
/// choose between "technical difficulty", "input mismatch" and "no results"
/// copy.
#[derive(Debug)]
pub enum AppError {
    /// Database-related errors.
    DatabaseError(sqlx::Error),
    /// The consultation store refused the call (circuit open).
    StoreUnavailable(String),
    /// Resource not found error.
    NotFound(String),
    /// Bad request error (invalid input).
    BadRequest(String),
    /// One or more field-level validation failures.
    Validation(Vec<String>),
    /// Upstream could not be reached (DNS, connect, reset...).
    UpstreamUnreachable {
        service: &'static str,
        message: String,
    },
    /// Upstream did not answer within the configured timeout.
    UpstreamTimeout {
        service: &'static str,
        message: String,
    },
    /// Upstream answered but the payload is missing expected fields.
    UpstreamMalformed {
        service: &'static str,
        message: String,
    },
    /// Upstream answered with a non-success status.
    UpstreamRejected {
        service: &'static str,
        status: u16,
        body: Value,
    },
    /// Payment provider rejected a customer or session call.
    PaymentProvider(String),
    /// Webhook signature missing, malformed or not matching.
    SignatureInvalid(String),
    /// Webhook or stored payload could not be parsed.
    PayloadParse(String),
    /// Internal server error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// Stable machine-readable identifier of the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::DatabaseError(_) | AppError::StoreUnavailable(_) => "persistence_failed",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) | AppError::Validation(_) => "invalid_input",
            AppError::UpstreamUnreachable { .. } => "upstream_unreachable",
            AppError::UpstreamTimeout { .. } => "upstream_timeout",
            AppError::UpstreamMalformed { .. } => "upstream_malformed",
            AppError::UpstreamRejected { .. } => "upstream_rejected",
            AppError::PaymentProvider(_) => "payment_failed",
            AppError::SignatureInvalid(_) => "signature_invalid",
            AppError::PayloadParse(_) => "payload_invalid",
            AppError::InternalError(_) => "internal",
            AppError::WithContext { source, .. } => source.kind(),
        }
    }

    /// User-facing category used to pick the error panel copy.
    pub fn category(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) | AppError::Validation(_) => "input_mismatch",
            AppError::NotFound(_) => "no_results",
            AppError::WithContext { source, .. } => source.category(),
            _ => "technical_difficulty",
        }
    }

    /// HTTP status the error is rendered with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_)
            | AppError::Validation(_)
            | AppError::SignatureInvalid(_)
            | AppError::PayloadParse(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::WithContext { source, .. } => source.status_code(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether a retry of the same upstream call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::UpstreamUnreachable { .. } | AppError::UpstreamTimeout { .. } => true,
            AppError::UpstreamRejected { status, .. } => *status == 429 || *status >= 500,
            AppError::WithContext { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Maps a transport-level reqwest failure onto the upstream taxonomy.
    ///
    /// The URL is stripped first so query-string credentials never reach logs
    /// or response bodies.
    pub fn from_transport(service: &'static str, err: reqwest::Error) -> Self {
        let err = err.without_url();
        if err.is_timeout() {
            AppError::UpstreamTimeout {
                service,
                message: err.to_string(),
            }
        } else if err.is_decode() {
            AppError::UpstreamMalformed {
                service,
                message: err.to_string(),
            }
        } else {
            AppError::UpstreamUnreachable {
                service,
                message: err.to_string(),
            }
        }
    }

    /// Builds an `UpstreamRejected` from a non-success response, keeping the
    /// body as JSON when it parses and as a string otherwise.
    pub async fn from_rejected_response(service: &'static str, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        AppError::UpstreamRejected {
            service,
            status,
            body,
        }
    }
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::StoreUnavailable(msg) => write!(f, "Store unavailable: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Validation(errors) => write!(f, "Validation failed: {}", errors.join("; ")),
            AppError::UpstreamUnreachable { service, message } => {
                write!(f, "{} unreachable: {}", service, message)
            }
            AppError::UpstreamTimeout { service, message } => {
                write!(f, "{} timed out: {}", service, message)
            }
            AppError::UpstreamMalformed { service, message } => {
                write!(f, "Unexpected response format from {}: {}", service, message)
            }
            AppError::UpstreamRejected {
                service, status, ..
            } => write!(f, "{} returned status {}", service, status),
            AppError::PaymentProvider(msg) => write!(f, "Payment provider error: {}", msg),
            AppError::SignatureInvalid(msg) => write!(f, "Webhook Error: {}", msg),
            AppError::PayloadParse(msg) => write!(f, "Invalid payload: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

/// JSON error body returned by every handler.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Human-readable summary.
    pub error: String,
    /// Failure kind, e.g. `upstream_timeout`.
    #[schema(value_type = String)]
    pub kind: &'static str,
    /// Front-end panel: `technical_difficulty`, `input_mismatch` or `no_results`.
    #[schema(value_type = String)]
    pub category: &'static str,
    /// Extra detail, when safe to expose.
    #[schema(value_type = Option<Object>)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Upstream HTTP status, when an upstream rejected the call.
    #[serde(rename = "statusCode", skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Upstream response body, when an upstream rejected the call.
    #[schema(value_type = Option<Object>)]
    #[serde(rename = "apiResponse", skip_serializing_if = "Option::is_none")]
    pub api_response: Option<Value>,
}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Maps each error variant to an appropriate HTTP status code and JSON body.
    /// Logs errors appropriately based on their severity.
    fn into_response(self) -> Response {
        let mut source = self;
        while let AppError::WithContext { source: inner, context } = source {
            // Log full context chain for debugging
            tracing::error!("Error with context: {} -> {}", context, inner);
            source = *inner;
        }

        let status = source.status_code();
        let kind = source.kind();
        let category = source.category();

        let (error, details, status_code, api_response) = match source {
            AppError::DatabaseError(e) => {
                tracing::error!("Database error: {:?}", e);
                ("Internal Server Error".to_string(), None, None, None)
            }
            AppError::StoreUnavailable(msg) => {
                tracing::error!("Consultation store unavailable: {}", msg);
                ("Internal Server Error".to_string(), None, None, None)
            }
            AppError::NotFound(msg) => (msg, None, None, None),
            AppError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (msg, None, None, None)
            }
            AppError::Validation(errors) => {
                tracing::warn!("Validation failed: {:?}", errors);
                (
                    "Invalid input".to_string(),
                    Some(Value::from(errors)),
                    None,
                    None,
                )
            }
            AppError::UpstreamUnreachable { service, message } => {
                tracing::error!("{} unreachable: {}", service, message);
                (
                    format!("Failed to reach {}", service),
                    Some(Value::from(message)),
                    None,
                    None,
                )
            }
            AppError::UpstreamTimeout { service, message } => {
                tracing::error!("{} timed out: {}", service, message);
                (
                    format!("{} did not respond in time", service),
                    Some(Value::from(message)),
                    None,
                    None,
                )
            }
            AppError::UpstreamMalformed { service, message } => {
                tracing::error!("Malformed response from {}: {}", service, message);
                (
                    format!("Unexpected response format from {}", service),
                    Some(Value::from(message)),
                    None,
                    None,
                )
            }
            AppError::UpstreamRejected {
                service,
                status,
                body,
            } => {
                tracing::error!("{} rejected the request with status {}", service, status);
                (
                    format!("{} rejected the request", service),
                    None,
                    Some(status),
                    Some(body),
                )
            }
            AppError::PaymentProvider(msg) => {
                tracing::error!("Payment provider error: {}", msg);
                ("Internal Server Error".to_string(), None, None, None)
            }
            AppError::SignatureInvalid(msg) => {
                tracing::warn!("Webhook signature verification failed: {}", msg);
                (format!("Webhook Error: {}", msg), None, None, None)
            }
            AppError::PayloadParse(msg) => {
                tracing::warn!("Payload parse failure: {}", msg);
                (format!("Invalid payload: {}", msg), None, None, None)
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                ("Internal Server Error".to_string(), None, None, None)
            }
            AppError::WithContext { .. } => unreachable!("context chain unwrapped above"),
        };

        let body = Json(ErrorBody {
            error,
            kind,
            category,
            details,
            status_code,
            api_response,
        });

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    /// Converts a `sqlx::Error` into an `AppError`.
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}
