//! Error Taxonomy
//!
//! Normalizes every failure the engine can observe into a single [`ApiError`]
//! value with a small, stable [`ErrorKind`]. Upstream error codes are looked up
//! in one static table; anything the table does not know becomes
//! [`ErrorKind::Unexpected`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Code synthesized when a failing response carries no usable error code
pub const UNEXPECTED_ERROR_CODE: &str = "unexpected_error";

/// Code used for failures raised before any I/O happened
pub const INVALID_ARGUMENT_CODE: &str = "invalid_argument";

/// Code used when the transport could not produce a response
pub const TRANSPORT_ERROR_CODE: &str = "transport_error";

/// Code used when a success body does not match the expected shape
pub const DECODE_ERROR_CODE: &str = "decode_error";

/// Classification of an [`ApiError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad caller input, no I/O performed
    InvalidArgument,
    /// The service could not be reached or returned nothing interpretable
    Transport,
    /// A success response did not match the expected shape
    Decode,
    NotFound,
    PermissionDenied,
    Unauthenticated,
    Conflict,
    ValidationFailed,
    RateLimited,
    /// Catch-all for failing responses the code table does not know
    Unexpected,
}

impl ErrorKind {
    /// Stable snake_case name of the kind
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Transport => "transport",
            ErrorKind::Decode => "decode",
            ErrorKind::NotFound => "not_found",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Conflict => "conflict",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Unexpected => "unexpected",
        }
    }

    /// True for kinds that came from the service rather than the engine
    pub fn is_api_error(self) -> bool {
        !matches!(
            self,
            ErrorKind::InvalidArgument | ErrorKind::Transport | ErrorKind::Decode
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Documented upstream error codes and the kind each one maps to.
///
/// Adding a new upstream code is one line here.
static ERROR_CODES: &[(&str, ErrorKind)] = &[
    // Resource lookups
    ("build_not_found", ErrorKind::NotFound),
    ("certificate_not_found", ErrorKind::NotFound),
    ("country_not_found", ErrorKind::NotFound),
    ("country_state_not_found", ErrorKind::NotFound),
    ("currency_not_found", ErrorKind::NotFound),
    ("data_center_not_found", ErrorKind::NotFound),
    ("disk_backup_policy_not_found", ErrorKind::NotFound),
    ("disk_not_found", ErrorKind::NotFound),
    ("disk_template_not_found", ErrorKind::NotFound),
    ("disk_template_version_not_found", ErrorKind::NotFound),
    ("dns_record_not_found", ErrorKind::NotFound),
    ("dns_zone_not_found", ErrorKind::NotFound),
    ("interface_not_found", ErrorKind::NotFound),
    ("ip_address_not_found", ErrorKind::NotFound),
    ("load_balancer_not_found", ErrorKind::NotFound),
    ("load_balancer_rule_not_found", ErrorKind::NotFound),
    ("network_not_found", ErrorKind::NotFound),
    ("network_speed_profile_not_found", ErrorKind::NotFound),
    ("no_user_associated_with_identity", ErrorKind::NotFound),
    ("operating_system_not_found", ErrorKind::NotFound),
    ("organization_not_found", ErrorKind::NotFound),
    ("package_not_found", ErrorKind::NotFound),
    ("route_not_found", ErrorKind::NotFound),
    ("security_group_not_found", ErrorKind::NotFound),
    ("security_group_rule_not_found", ErrorKind::NotFound),
    ("ssh_key_not_found", ErrorKind::NotFound),
    ("tag_not_found", ErrorKind::NotFound),
    ("task_not_found", ErrorKind::NotFound),
    ("trash_object_not_found", ErrorKind::NotFound),
    ("virtual_machine_group_not_found", ErrorKind::NotFound),
    ("virtual_machine_network_interface_not_found", ErrorKind::NotFound),
    ("virtual_machine_not_found", ErrorKind::NotFound),
    ("zone_not_found", ErrorKind::NotFound),
    // Authorization
    ("permission_denied", ErrorKind::PermissionDenied),
    ("organization_suspended", ErrorKind::PermissionDenied),
    ("organization_not_activated", ErrorKind::PermissionDenied),
    ("resource_creation_restricted", ErrorKind::PermissionDenied),
    ("flexible_resources_unavailable_to_organization", ErrorKind::PermissionDenied),
    ("scope_not_granted", ErrorKind::PermissionDenied),
    // Authentication
    ("invalid_api_token", ErrorKind::Unauthenticated),
    ("identity_not_linked_to_web_session", ErrorKind::Unauthenticated),
    // State conflicts
    ("object_in_trash", ErrorKind::Conflict),
    ("deletion_restricted", ErrorKind::Conflict),
    ("task_queueing_error", ErrorKind::Conflict),
    ("virtual_machine_must_be_started", ErrorKind::Conflict),
    ("resource_does_not_support_unallocation", ErrorKind::Conflict),
    ("dns_zone_already_verified", ErrorKind::Conflict),
    ("speed_profile_already_assigned", ErrorKind::Conflict),
    ("ip_already_allocated", ErrorKind::Conflict),
    // Address pool exhausted; retrying the same call will not help
    ("no_available_addresses", ErrorKind::Conflict),
    // Input validation
    ("validation_error", ErrorKind::ValidationFailed),
    ("invalid_spec_xml", ErrorKind::ValidationFailed),
    ("invalid_ip", ErrorKind::ValidationFailed),
    ("location_required", ErrorKind::ValidationFailed),
    ("organization_limit_reached", ErrorKind::ValidationFailed),
    ("dns_zone_not_verified", ErrorKind::ValidationFailed),
    ("no_allocation", ErrorKind::ValidationFailed),
    ("no_interface_available", ErrorKind::ValidationFailed),
    ("infrastructure_dns_zone_cannot_be_edited", ErrorKind::ValidationFailed),
    // Throttling
    ("rate_limit_reached", ErrorKind::RateLimited),
];

/// Look up the kind for a documented upstream error code
pub fn kind_for_code(code: &str) -> Option<ErrorKind> {
    ERROR_CODES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, kind)| *kind)
}

/// Error object as it appears in an upstream error body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

/// Pull the `error` (or `errors`) object out of a raw body, if there is one.
///
/// When both keys are present the first one that parses wins, `error` first.
pub fn extract_error_info(body: &str) -> Option<ErrorInfo> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    ["error", "errors"]
        .iter()
        .filter_map(|key| parsed.get(key))
        .find_map(|value| ErrorInfo::deserialize(value).ok())
}

/// Failure reported by a [`Transport`](crate::api::http::Transport)
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("failed to read response body: {0}")]
    Body(String),
    #[error("no API key available for {method} {path}")]
    MissingCredentials { method: String, path: String },
    /// The request could not be built from the operation; nothing was sent
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Other(String),
}

/// The engine's normalized error value
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    /// Diagnostic payload. Not part of the error's identity.
    pub detail: Option<Value>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            detail: None,
        }
    }

    /// Attach a diagnostic detail payload
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, INVALID_ARGUMENT_CODE, message)
    }

    /// Decode failure for a success response, keeping the body for diagnostics
    pub fn decode(message: impl Into<String>, body: &str) -> Self {
        Self::new(ErrorKind::Decode, DECODE_ERROR_CODE, message)
            .with_detail(Value::String(body.to_string()))
    }

    /// Whether this error has the given kind
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Whether repeating the same call could succeed without changing it
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::RateLimited | ErrorKind::Transport)
    }

    /// The detail payload pretty-printed, if it carries anything
    pub fn detail_pretty(&self) -> Option<String> {
        let detail = self.detail.as_ref()?;
        let empty = match detail {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::String(s) => s.is_empty(),
            _ => false,
        };
        if empty {
            return None;
        }
        serde_json::to_string_pretty(detail).ok()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(detail) = self.detail_pretty() {
            write!(f, " -- {}", detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

impl From<&TransportError> for ApiError {
    fn from(err: &TransportError) -> Self {
        match err {
            TransportError::MissingCredentials { .. } => {
                ApiError::new(ErrorKind::Unauthenticated, "missing_credentials", err.to_string())
            }
            TransportError::InvalidRequest(_) => ApiError::invalid_argument(err.to_string()),
            _ => ApiError::new(ErrorKind::Transport, TRANSPORT_ERROR_CODE, err.to_string()),
        }
    }
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        ApiError::from(&err)
    }
}

/// Classify a failing response into an [`ApiError`].
///
/// Total over its inputs: an absent code, an unknown code or a body that is not
/// JSON all still produce an error, with [`ErrorKind::Unexpected`] as the
/// fallback. When `code` is `None` the code is read from the body.
pub fn classify(status: u16, code: Option<&str>, body: &str) -> ApiError {
    let info = extract_error_info(body).unwrap_or_default();
    let code = code
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .or(info.code.filter(|c| !c.is_empty()));

    let message = info
        .description
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| status_message(status));

    match code.as_deref().and_then(kind_for_code) {
        Some(kind) => {
            let mut err = ApiError::new(kind, code.unwrap_or_default(), message);
            err.detail = info.detail;
            err
        }
        None => {
            let raw_body = serde_json::from_str::<Value>(body)
                .unwrap_or_else(|_| Value::String(body.to_string()));
            ApiError::new(
                ErrorKind::Unexpected,
                code.unwrap_or_else(|| UNEXPECTED_ERROR_CODE.to_string()),
                message,
            )
            .with_detail(json!({ "status": status, "body": raw_body }))
        }
    }
}

fn status_message(status: u16) -> String {
    match reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
    {
        Some(reason) => format!("HTTP {} {}", status, reason),
        None => format!("HTTP {}", status),
    }
}
