//! Operation Descriptor
//!
//! An [`Operation`] describes one API call before it is executed: method,
//! path template, query, body, extra headers and deadline. It is built once
//! through [`OperationBuilder`] and handed to the dispatcher by value.

use super::error::ApiError;
use crate::resource::query::{self, QueryParams, ToQuery};
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};

/// HTTP method of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Request body of an operation
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Serialized as `application/json`
    Json(Value),
    /// Sent as-is with its own content type
    Raw { content_type: String, bytes: Vec<u8> },
}

impl RequestBody {
    pub fn content_type(&self) -> &str {
        match self {
            RequestBody::Json(_) => "application/json",
            RequestBody::Raw { content_type, .. } => content_type,
        }
    }

    /// Bytes to put on the wire
    pub fn to_bytes(&self) -> Result<Vec<u8>, ApiError> {
        match self {
            RequestBody::Json(value) => serde_json::to_vec(value).map_err(|e| {
                ApiError::invalid_argument(format!("request body could not be encoded: {}", e))
            }),
            RequestBody::Raw { bytes, .. } => Ok(bytes.clone()),
        }
    }
}

/// Immutable description of one API call
#[derive(Debug, Clone)]
pub struct Operation {
    method: Method,
    path: String,
    path_params: Vec<(String, String)>,
    query: QueryParams,
    body: Option<RequestBody>,
    headers: Vec<(String, String)>,
    no_auth: bool,
    deadline: Option<Instant>,
    rejected: Option<ApiError>,
}

impl Operation {
    /// Start building an operation for `path`, which may contain `{name}`
    /// placeholders
    #[allow(clippy::new_ret_no_self)]
    pub fn new(method: Method, path: impl Into<String>) -> OperationBuilder {
        OperationBuilder {
            op: Operation {
                method,
                path: path.into(),
                path_params: Vec::new(),
                query: QueryParams::new(),
                body: None,
                headers: Vec::new(),
                no_auth: false,
                deadline: None,
                rejected: None,
            },
        }
    }

    pub fn get(path: impl Into<String>) -> OperationBuilder {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> OperationBuilder {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> OperationBuilder {
        Self::new(Method::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> OperationBuilder {
        Self::new(Method::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> OperationBuilder {
        Self::new(Method::Delete, path)
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// The path template, placeholders not substituted
    pub fn path_template(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    /// The JSON body, if the body is JSON
    pub fn json_body(&self) -> Option<&Value> {
        match &self.body {
            Some(RequestBody::Json(value)) => Some(value),
            _ => None,
        }
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Whether the request should go out without credentials
    pub fn is_no_auth(&self) -> bool {
        self.no_auth
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Copy of this operation with one query parameter replaced
    pub fn with_query_param(&self, key: &str, value: impl ToString) -> Operation {
        let mut op = self.clone();
        op.query.set(key, value.to_string());
        op
    }

    /// The first validation failure recorded while building, if any
    pub fn validate(&self) -> Result<(), ApiError> {
        match &self.rejected {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Substitute `{name}` placeholders with percent-escaped values
    pub fn render_path(&self) -> Result<String, ApiError> {
        let mut rendered = String::with_capacity(self.path.len());
        let mut used = vec![false; self.path_params.len()];
        let mut rest = self.path.as_str();

        while let Some(start) = rest.find('{') {
            rendered.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                return Err(ApiError::invalid_argument(format!(
                    "unterminated placeholder in path {}",
                    self.path
                )));
            };
            let name = &after[..end];

            let Some(index) = self.path_params.iter().position(|(k, _)| k == name) else {
                return Err(ApiError::invalid_argument(format!(
                    "no value for path placeholder {{{}}}",
                    name
                )));
            };
            let value = &self.path_params[index].1;
            if value.is_empty() {
                return Err(ApiError::invalid_argument(format!(
                    "empty value for path placeholder {{{}}}",
                    name
                )));
            }

            used[index] = true;
            rendered.push_str(&urlencoding::encode(value));
            rest = &after[end + 1..];
        }
        rendered.push_str(rest);

        if let Some(index) = used.iter().position(|u| !u) {
            return Err(ApiError::invalid_argument(format!(
                "path parameter {} does not appear in {}",
                self.path_params[index].0, self.path
            )));
        }

        Ok(rendered)
    }
}

/// Builder for [`Operation`]. Validation failures are recorded, not raised,
/// so the dispatcher can report them without performing I/O.
#[derive(Debug, Clone)]
pub struct OperationBuilder {
    op: Operation,
}

impl OperationBuilder {
    fn reject(&mut self, err: ApiError) {
        if self.op.rejected.is_none() {
            self.op.rejected = Some(err);
        }
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.op.path_params.iter_mut().find(|(k, _)| *k == name) {
            Some(existing) => existing.1 = value,
            None => self.op.path_params.push((name, value)),
        }
        self
    }

    /// Append the encoded fields of a lookup argument value
    pub fn query<T: ToQuery + ?Sized>(mut self, args: &T) -> Self {
        match query::encode(args) {
            Ok(params) => self.op.query.extend(params),
            Err(err) => self.reject(err),
        }
        self
    }

    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.op.query.push(key, value);
        self
    }

    /// JSON request body. `None` fields with `skip_serializing_if` are
    /// omitted, `Some(vec![])` is sent as `[]`.
    pub fn body<B: Serialize + ?Sized>(mut self, body: &B) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => self.op.body = Some(RequestBody::Json(value)),
            Err(err) => self.reject(ApiError::invalid_argument(format!(
                "request body could not be serialized: {}",
                err
            ))),
        }
        self
    }

    /// Body sent verbatim with a custom content type
    pub fn raw_body(mut self, content_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let content_type = content_type.into();
        if content_type.trim().is_empty() || HeaderValue::from_str(&content_type).is_err() {
            self.reject(ApiError::invalid_argument(format!(
                "invalid content type {:?}",
                content_type
            )));
            return self;
        }
        self.op.body = Some(RequestBody::Raw {
            content_type,
            bytes: bytes.into(),
        });
        self
    }

    /// Set a request header, replacing any earlier value for the same name
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            self.reject(ApiError::invalid_argument(format!(
                "invalid header name {:?}",
                name
            )));
            return self;
        }
        if HeaderValue::from_str(&value).is_err() {
            self.reject(ApiError::invalid_argument(format!(
                "invalid value for header {}",
                name
            )));
            return self;
        }

        self.op
            .headers
            .retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.op.headers.push((name, value));
        self
    }

    /// Send the request without credentials (public endpoints)
    pub fn no_auth(mut self) -> Self {
        self.op.no_auth = true;
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.op.deadline = Some(deadline);
        self
    }

    /// Deadline relative to now
    pub fn timeout(self, timeout: Duration) -> Self {
        self.deadline(Instant::now() + timeout)
    }

    pub fn build(self) -> Operation {
        self.op
    }
}

impl From<OperationBuilder> for Operation {
    fn from(builder: OperationBuilder) -> Self {
        builder.build()
    }
}
