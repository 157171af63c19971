//! Katapult Client
//!
//! The request dispatcher. [`Client::dispatch`] turns an [`Operation`] into
//! exactly one transport call and always hands back a [`Response`], even when
//! the call was rejected before any I/O or never reached the service.

use super::error::{classify, ApiError};
use super::http::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
use super::operation::Operation;
use super::response::{decode, Pagination, RawBody, Response};
use crate::config::ClientConfig;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

/// Outcome of a dispatch: the response handle plus the typed result
#[derive(Debug, Clone)]
pub struct Reply<T> {
    pub response: Response,
    pub result: Result<T, ApiError>,
}

impl<T> Reply<T> {
    fn failed(response: Response, err: ApiError) -> Self {
        Self {
            response,
            result: Err(err),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn pagination(&self) -> Option<Pagination> {
        self.response.pagination
    }

    pub fn into_result(self) -> Result<T, ApiError> {
        self.result
    }

    pub fn into_parts(self) -> (Response, Result<T, ApiError>) {
        (self.response, self.result)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reply<U> {
        Reply {
            response: self.response,
            result: self.result.map(f),
        }
    }
}

fn dispatch_span(request_id: Uuid, operation: &Operation) -> tracing::Span {
    tracing::debug_span!(
        "dispatch",
        request_id = %request_id,
        method = %operation.method(),
        path = operation.path_template(),
    )
}

/// Katapult API client
#[derive(Clone)]
pub struct Client {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.config.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client over an injected transport
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    /// Create a client backed by the reqwest transport
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        config.validate().context("Invalid client configuration")?;
        let transport =
            ReqwestTransport::new(&config).context("Failed to initialize HTTP transport")?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Execute one operation and decode the payload into `T`.
    ///
    /// Validation failures return before any I/O with
    /// [`ErrorKind::InvalidArgument`](super::error::ErrorKind::InvalidArgument).
    /// Otherwise the transport is called exactly once; nothing is retried here.
    pub async fn dispatch<T: DeserializeOwned>(&self, operation: Operation) -> Reply<T> {
        let request_id = Uuid::new_v4();
        let span = dispatch_span(request_id, &operation);

        async move {
            let mut response = match self.exchange(request_id, operation).await {
                Ok((response, _)) => response,
                Err((response, err)) => return Reply::failed(response, err),
            };

            let result = match decode::<T>(response.status, &response.body) {
                Ok(decoded) => {
                    response.pagination = decoded.pagination;
                    Ok(decoded.payload)
                }
                Err(err) => {
                    if !response.is_success() {
                        tracing::debug!("API error {} ({})", err.code, err.kind);
                    } else {
                        tracing::warn!("Failed to decode response: {}", err.message);
                    }
                    Err(err)
                }
            };

            Reply { response, result }
        }
        .instrument(span)
        .await
    }

    /// Like [`dispatch`](Client::dispatch), but hands a success body back
    /// untouched instead of decoding it as JSON. Failing statuses are still
    /// classified.
    pub async fn dispatch_raw(&self, operation: Operation) -> Reply<RawBody> {
        let request_id = Uuid::new_v4();
        let span = dispatch_span(request_id, &operation);

        async move {
            let (response, bytes) = match self.exchange(request_id, operation).await {
                Ok(exchanged) => exchanged,
                Err((response, err)) => return Reply::failed(response, err),
            };

            let result = if response.is_success() {
                Ok(RawBody {
                    content_type: response.header("content-type").map(str::to_string),
                    bytes,
                })
            } else {
                Err(classify(response.status, None, &response.body))
            };

            Reply { response, result }
        }
        .instrument(span)
        .await
    }

    /// Build the request and make the single transport call
    async fn exchange(
        &self,
        request_id: Uuid,
        operation: Operation,
    ) -> Result<(Response, Vec<u8>), (Response, ApiError)> {
        let request = self.build_request(&operation).map_err(|err| {
            tracing::warn!("Rejected before sending: {}", err);
            (Response::disconnected(request_id, &err.code, err.message.clone()), err)
        })?;

        let http = self.transport.execute(request).await.map_err(|err| {
            tracing::warn!("Transport failure: {}", err);
            let err = ApiError::from(err);
            (Response::disconnected(request_id, &err.code, err.message.clone()), err)
        })?;

        let HttpResponse {
            status,
            headers,
            body,
        } = http;
        tracing::debug!("status {}", status);

        Ok((Response::from_parts(request_id, status, headers, &body), body))
    }

    fn build_request(&self, operation: &Operation) -> Result<HttpRequest, ApiError> {
        operation.validate()?;

        let path = operation.render_path()?;
        let url = self.build_url(&path, &operation.query().encode())?;

        let (body, content_type) = match operation.body() {
            Some(body) => (Some(body.to_bytes()?), Some(body.content_type().to_string())),
            None => (None, None),
        };

        Ok(HttpRequest {
            method: operation.method(),
            url,
            headers: operation.headers().to_vec(),
            body,
            content_type,
            authenticated: !operation.is_no_auth(),
            deadline: operation.deadline(),
        })
    }

    /// Join the base URL, a rendered path and an encoded query string
    fn build_url(&self, path: &str, query: &str) -> Result<Url, ApiError> {
        let base = self.config.base_url.as_str().trim_end_matches('/');
        let mut raw = String::with_capacity(base.len() + path.len() + query.len() + 2);
        raw.push_str(base);
        if !path.starts_with('/') {
            raw.push('/');
        }
        raw.push_str(path);
        if !query.is_empty() {
            raw.push('?');
            raw.push_str(query);
        }

        Url::parse(&raw).map_err(|e| ApiError::invalid_argument(format!("invalid URL {}: {}", raw, e)))
    }

    /// GET `path` and decode the payload
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Reply<T> {
        self.dispatch(Operation::get(path).build()).await
    }

    /// POST a JSON body to `path`
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Reply<T> {
        self.dispatch(Operation::post(path).body(body).build()).await
    }

    /// PATCH a JSON body to `path`
    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Reply<T> {
        self.dispatch(Operation::patch(path).body(body).build()).await
    }

    /// DELETE `path`
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Reply<T> {
        self.dispatch(Operation::delete(path).build()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::{ErrorKind, TransportError, INVALID_ARGUMENT_CODE};
    use crate::resource::reference::{NetworkRef, Reference};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    /// Records every request and replays one canned outcome
    struct Recorder {
        requests: Mutex<Vec<HttpRequest>>,
        outcome: Result<HttpResponse, TransportError>,
    }

    impl Recorder {
        fn replying(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                outcome: Ok(HttpResponse {
                    status,
                    headers: vec![("x-request-id".into(), "abc".into())],
                    body: body.as_bytes().to_vec(),
                }),
            })
        }

        fn failing(err: TransportError) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                outcome: Err(err),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn last(&self) -> HttpRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.requests.lock().unwrap().push(request);
            self.outcome.clone()
        }
    }

    fn client(transport: Arc<Recorder>) -> Client {
        let config = ClientConfig::default()
            .with_base_url("https://api.example.test/core/v1/")
            .unwrap();
        Client::new(config, transport)
    }

    #[tokio::test]
    async fn test_success_builds_url_and_decodes() {
        let transport = Recorder::replying(200, r#"{"network":{"id":"netw_1"}}"#);
        let client = client(transport.clone());

        let op = Operation::get("/networks/_")
            .query(&NetworkRef::by_permalink("public"))
            .build();
        let reply: Reply<Value> = client.dispatch(op).await;

        assert_eq!(reply.result.unwrap()["network"]["id"], "netw_1");
        assert_eq!(reply.response.status, 200);
        assert_eq!(reply.response.header("X-Request-Id"), Some("abc"));
        assert_eq!(transport.calls(), 1);
        assert_eq!(
            transport.last().url.as_str(),
            "https://api.example.test/core/v1/networks/_?network%5Bpermalink%5D=public"
        );
        assert!(transport.last().authenticated);
    }

    #[tokio::test]
    async fn test_validation_failure_skips_transport() {
        let transport = Recorder::replying(200, "{}");
        let client = client(transport.clone());

        let op = Operation::get("/networks/_")
            .query(&Reference::by_id(""))
            .build();
        let reply: Reply<Value> = client.dispatch(op).await;

        let err = reply.result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert_eq!(reply.response.status, 0);
        assert_eq!(reply.response.error_code(), Some(INVALID_ARGUMENT_CODE));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_path_param_skips_transport() {
        let transport = Recorder::replying(200, "{}");
        let client = client(transport.clone());

        let reply: Reply<Value> = client.dispatch(Operation::get("/tags/{tag}").build()).await;
        assert!(reply.result.unwrap_err().is(ErrorKind::InvalidArgument));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_yields_sentinel_response() {
        let transport = Recorder::failing(TransportError::Connect("refused".into()));
        let client = client(transport.clone());

        let reply: Reply<Value> = client.get("/networks").await;
        assert_eq!(reply.response.status, 0);
        assert!(reply.response.body.is_empty());
        assert_eq!(reply.response.error_code(), Some("transport_error"));
        assert_eq!(reply.result.unwrap_err().kind, ErrorKind::Transport);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_status_is_classified() {
        let transport = Recorder::replying(
            404,
            r#"{"error":{"code":"network_not_found","description":"No network found"}}"#,
        );
        let reply: Reply<Value> = client(transport).get("/networks/_").await;

        assert_eq!(reply.response.status, 404);
        assert_eq!(reply.response.error_code(), Some("network_not_found"));
        let err = reply.result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.message, "No network found");
    }

    #[tokio::test]
    async fn test_body_headers_and_deadline_are_forwarded() {
        let transport = Recorder::replying(201, r#"{"tag":{"id":"tag_1"}}"#);
        let client = client(transport.clone());
        let deadline = Instant::now() + Duration::from_secs(30);

        let op = Operation::post("/organizations/{org}/tags")
            .path_param("org", "org_1")
            .body(&json!({"properties": {"name": "web"}}))
            .header("X-Trace", "t-1")
            .deadline(deadline)
            .no_auth()
            .build();
        let reply: Reply<Value> = client.dispatch(op).await;
        assert!(reply.is_ok());

        let sent = transport.last();
        assert_eq!(sent.url.path(), "/core/v1/organizations/org_1/tags");
        assert_eq!(sent.deadline, Some(deadline));
        assert!(!sent.authenticated);
        assert_eq!(sent.headers, vec![("X-Trace".to_string(), "t-1".to_string())]);
        let body: Value = serde_json::from_slice(&sent.body.unwrap()).unwrap();
        assert_eq!(body["properties"]["name"], "web");
    }

    #[tokio::test]
    async fn test_decode_failure_keeps_response() {
        let transport = Recorder::replying(200, "not json");
        let reply: Reply<Value> = client(transport).get("/networks").await;
        assert_eq!(reply.response.status, 200);
        assert_eq!(reply.response.body, "not json");
        assert_eq!(reply.result.unwrap_err().kind, ErrorKind::Decode);
    }

    #[tokio::test]
    async fn test_pagination_is_attached() {
        let transport = Recorder::replying(
            200,
            r#"{"pagination":{"current_page":1,"total_pages":2,"per_page":2},"tags":[]}"#,
        );
        let reply: Reply<Value> = client(transport).get("/tags").await;
        let pagination = reply.pagination().unwrap();
        assert_eq!(pagination.current_page, 1);
        assert_eq!(pagination.total_pages, Some(2));
    }

    #[tokio::test]
    async fn test_bad_header_skips_transport() {
        let transport = Recorder::replying(200, "{}");
        let client = client(transport.clone());

        let op = Operation::get("/networks").header("bad header name", "v").build();
        let reply: Reply<Value> = client.dispatch(op).await;

        let err = reply.result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert!(!err.is_retryable());
        assert_eq!(reply.response.status, 0);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_raw_body_round_trip() {
        let transport = Recorder::replying(200, "<xml/>");
        let client = client(transport.clone());

        let op = Operation::put("/virtual_machines/{vm}/flexible_resources")
            .path_param("vm", "vm_1")
            .raw_body("application/xml", "<spec/>")
            .build();
        let reply = client.dispatch_raw(op).await;

        let raw = reply.result.unwrap();
        assert_eq!(raw.as_str(), Some("<xml/>"));
        assert_eq!(raw.bytes, b"<xml/>".to_vec());

        let sent = transport.last();
        assert_eq!(sent.content_type.as_deref(), Some("application/xml"));
        assert_eq!(sent.body, Some(b"<spec/>".to_vec()));
    }

    #[tokio::test]
    async fn test_raw_dispatch_still_classifies_failures() {
        let transport = Recorder::replying(
            429,
            r#"{"error":{"code":"rate_limit_reached","description":"slow down"}}"#,
        );
        let reply = client(transport).dispatch_raw(Operation::get("/networks").build()).await;
        assert_eq!(reply.response.status, 429);
        assert_eq!(reply.result.unwrap_err().kind, ErrorKind::RateLimited);
    }

    #[tokio::test]
    async fn test_json_body_sets_content_type() {
        let transport = Recorder::replying(200, "{}");
        let client = client(transport.clone());
        let _: Reply<Value> = client.post("/tags", &json!({"name": "web"})).await;
        assert_eq!(transport.last().content_type.as_deref(), Some("application/json"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_dispatch_from_tasks() {
        let transport = Recorder::replying(200, r#"{"tag":{"id":"tag_1"}}"#);
        let client = client(transport.clone());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let client = client.clone();
                tokio::spawn(async move {
                    let op = Operation::get("/tags/_")
                        .query_param("tag[id]", format!("tag_{}", i))
                        .build();
                    client.dispatch::<Value>(op).await
                })
            })
            .collect();

        for handle in handles {
            let reply = handle.await.unwrap();
            assert_eq!(reply.result.unwrap()["tag"]["id"], "tag_1");
        }

        assert_eq!(transport.calls(), 16);
        let ids: std::collections::HashSet<_> = transport
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.url.query().unwrap_or_default().to_string())
            .collect();
        assert_eq!(ids.len(), 16);
    }

    #[test]
    fn test_debug_hides_key() {
        let config = ClientConfig::default().with_api_key("secret");
        let client = Client::new(config, Recorder::replying(200, "{}"));
        assert!(!format!("{:?}", client).contains("secret"));
    }
}
