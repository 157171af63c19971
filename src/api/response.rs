//! Response Envelope and Decoder
//!
//! [`Response`] is the value every dispatch hands back, whatever happened on
//! the wire. [`decode`] turns a status and body into a typed payload plus
//! pagination cursor, or a classified [`ApiError`].

use super::error::{classify, extract_error_info, ApiError, ErrorInfo, UNEXPECTED_ERROR_CODE};
use super::http::HttpResponse;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Pagination block returned by list endpoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub current_page: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
    /// Set by the API when the result set is too large to count
    #[serde(default)]
    pub large_set: bool,
}

impl Pagination {
    /// True once `current_page` has reached a known `total_pages`
    pub fn is_last_page(&self) -> bool {
        self.total_pages
            .is_some_and(|total| self.current_page >= total)
    }
}

/// Outcome of one HTTP exchange.
///
/// Always present, even when the transport failed before any response
/// arrived: in that case `status` is 0 and the body is empty. When `status` is
/// not a success, `error` is always populated.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub error: Option<ErrorInfo>,
    pub pagination: Option<Pagination>,
    /// Correlates this response with the dispatch log lines
    pub request_id: Uuid,
}

impl Response {
    /// Sentinel response for a call that never reached the service
    pub fn disconnected(request_id: Uuid, code: &str, description: impl Into<String>) -> Self {
        Self {
            status: 0,
            error: Some(ErrorInfo {
                code: Some(code.to_string()),
                description: Some(description.into()),
                detail: None,
            }),
            request_id,
            ..Self::default()
        }
    }

    /// Build the envelope for a raw transport response
    pub fn from_http(request_id: Uuid, http: HttpResponse) -> Self {
        Self::from_parts(request_id, http.status, http.headers, &http.body)
    }

    /// Build the envelope from the pieces of a transport response. Non-UTF-8
    /// bytes in `body` are replaced in the text copy.
    pub fn from_parts(
        request_id: Uuid,
        status: u16,
        headers: Vec<(String, String)>,
        body: &[u8],
    ) -> Self {
        let mut response = Self {
            status,
            headers,
            body: String::from_utf8_lossy(body).into_owned(),
            error: None,
            pagination: None,
            request_id,
        };

        if response.is_success() {
            response.pagination = serde_json::from_str::<PaginationBlock>(&response.body)
                .ok()
                .and_then(|block| block.pagination);
        } else {
            let mut info = extract_error_info(&response.body).unwrap_or_default();
            if info.code.as_deref().map_or(true, str::is_empty) {
                info.code = Some(UNEXPECTED_ERROR_CODE.to_string());
            }
            response.error = Some(info);
        }

        response
    }

    pub fn is_success(&self) -> bool {
        is_success(self.status)
    }

    /// Upstream error code; always `Some` for a failing status
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().and_then(|e| e.code.as_deref())
    }

    /// First header value with a case-insensitive name match
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Deserialize)]
struct PaginationBlock {
    #[serde(default)]
    pagination: Option<Pagination>,
}

/// Success body handed back without JSON decoding
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBody {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl RawBody {
    /// The body as text, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

/// Successfully decoded payload
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub payload: T,
    pub pagination: Option<Pagination>,
}

pub(crate) fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Decode a status and body into `T`.
///
/// A failing status is classified as an error even if the body would also
/// parse as `T`. An empty success body (or 204) decodes from JSON `null`, so
/// `()` and `Option<_>` targets accept it. A success body that does not fit
/// `T` is an [`ErrorKind::Decode`](super::error::ErrorKind::Decode) error.
pub fn decode<T: DeserializeOwned>(status: u16, body: &str) -> Result<Decoded<T>, ApiError> {
    if !is_success(status) {
        return Err(classify(status, None, body));
    }

    let value: Value = if status == 204 || body.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(body)
            .map_err(|e| ApiError::decode(format!("response is not valid JSON: {}", e), body))?
    };

    let pagination = match value.get("pagination") {
        Some(block) if !block.is_null() => Some(
            Pagination::deserialize(block)
                .map_err(|e| ApiError::decode(format!("invalid pagination block: {}", e), body))?,
        ),
        _ => None,
    };

    if let Some(p) = &pagination {
        if p.total_pages.is_some_and(|total| p.current_page > total) {
            tracing::warn!(
                "pagination current_page {} is past total_pages {:?}",
                p.current_page,
                p.total_pages
            );
        }
    }

    let payload = T::deserialize(value)
        .map_err(|e| ApiError::decode(format!("unexpected response shape: {}", e), body))?;

    Ok(Decoded {
        payload,
        pagination,
    })
}
