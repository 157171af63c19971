//! Resource Fetcher
//!
//! Walks list endpoints page by page. [`Pages`] re-dispatches a template
//! [`Operation`] with an advancing `page` parameter and pulls the typed items
//! out of each payload by key.

use super::query::{QueryEncoder, ToQuery};
use crate::api::client::Client;
use crate::api::error::{ApiError, ErrorKind, DECODE_ERROR_CODE};
use crate::api::operation::Operation;
use crate::api::response::{Pagination, Response};
use futures::Stream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::marker::PhantomData;

/// Page selection for list endpoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    /// 1-based page number; 0 leaves it to the server
    pub page: u32,
    /// 0 leaves it to the server
    pub per_page: u32,
}

impl ListOptions {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }
    }
}

impl ToQuery for ListOptions {
    fn encode_query(&self, query: &mut QueryEncoder) -> Result<(), ApiError> {
        query
            .optional("page", Some(self.page).filter(|p| *p > 0))
            .optional("per_page", Some(self.per_page).filter(|p| *p > 0));
        Ok(())
    }
}

/// One page of a listing
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Option<Pagination>,
    pub response: Response,
}

/// Lazy, restartable sequence of pages for one list operation.
///
/// Not meant to be advanced from two tasks at once; it holds only the next
/// page number between steps. Once a step fails or the last page has been
/// yielded, [`next_page`](Pages::next_page) returns `None` until
/// [`restart`](Pages::restart) is called.
#[derive(Debug, Clone)]
pub struct Pages<T> {
    client: Client,
    template: Operation,
    items_key: String,
    per_page: Option<u32>,
    first_page: u32,
    next: Option<u32>,
    _items: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Pages<T> {
    /// `items_key` names the array in each payload, dot-separated for
    /// nested arrays (e.g. `virtual_machines`)
    pub fn new(client: Client, template: Operation, items_key: impl Into<String>) -> Self {
        Self {
            client,
            template,
            items_key: items_key.into(),
            per_page: None,
            first_page: 1,
            next: Some(1),
            _items: PhantomData,
        }
    }

    /// Apply page number and size; zero values keep the defaults
    pub fn with_options(mut self, options: ListOptions) -> Self {
        if options.per_page > 0 {
            self.per_page = Some(options.per_page);
        }
        if options.page > 0 {
            self.first_page = options.page;
            self.next = Some(options.page);
        }
        self
    }

    pub fn per_page(self, per_page: u32) -> Self {
        self.with_options(ListOptions::new(0, per_page))
    }

    /// Go back to the first page
    pub fn restart(&mut self) {
        self.next = Some(self.first_page);
    }

    pub fn is_finished(&self) -> bool {
        self.next.is_none()
    }

    /// Dispatch the next page. `None` once the listing is exhausted.
    pub async fn next_page(&mut self) -> Option<Result<Page<T>, ApiError>> {
        let page = self.next?;

        let mut operation = self.template.with_query_param("page", page);
        if let Some(per_page) = self.per_page {
            operation = operation.with_query_param("per_page", per_page);
        }

        tracing::debug!("Fetching page {} of {}", page, self.template.path_template());
        let (response, result) = self.client.dispatch::<Value>(operation).await.into_parts();

        let items = match result.and_then(|payload| extract_items(payload, &self.items_key)) {
            Ok(items) => items,
            Err(err) => {
                self.next = None;
                return Some(Err(err));
            }
        };

        let pagination = response.pagination;
        self.next = self.following_page(page, pagination, items.len());

        Some(Ok(Page {
            items,
            pagination,
            response,
        }))
    }

    fn following_page(&self, page: u32, pagination: Option<Pagination>, count: usize) -> Option<u32> {
        // Without a pagination block the endpoint is not paged.
        let pagination = pagination?;
        if count == 0 || pagination.is_last_page() {
            return None;
        }

        let page_size = self.per_page.or(pagination.per_page);
        if page_size.is_some_and(|size| count < size as usize) {
            return None;
        }

        let current = if pagination.current_page > 0 {
            pagination.current_page
        } else {
            page
        };
        current.checked_add(1)
    }

    /// Fetch all remaining pages (auto-paginate)
    pub async fn collect_all(mut self) -> Result<Vec<T>, ApiError> {
        let mut all_items = Vec::new();

        while let Some(page) = self.next_page().await {
            all_items.extend(page?.items);
        }

        Ok(all_items)
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Page<T>, ApiError>> {
        futures::stream::unfold(self, |mut pages| async move {
            let page = pages.next_page().await?;
            Some((page, pages))
        })
    }
}

impl Client {
    /// Page through a list operation, reading items from `items_key`
    pub fn pages<T: DeserializeOwned>(
        &self,
        template: Operation,
        items_key: impl Into<String>,
    ) -> Pages<T> {
        Pages::new(self.clone(), template, items_key)
    }
}

/// Extract items from a payload using a dot-notation path
fn extract_items<T: DeserializeOwned>(mut payload: Value, path: &str) -> Result<Vec<T>, ApiError> {
    let mut current = &mut payload;

    if !path.is_empty() {
        for part in path.split('.') {
            current = match current.get_mut(part) {
                Some(v) => v,
                None => {
                    return Err(ApiError::new(
                        ErrorKind::Decode,
                        DECODE_ERROR_CODE,
                        format!("list response has no {} field", path),
                    ))
                }
            };
        }
    }

    Vec::<T>::deserialize(current.take()).map_err(|e| {
        ApiError::new(
            ErrorKind::Decode,
            DECODE_ERROR_CODE,
            format!("invalid {} list: {}", path, e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::TransportError;
    use crate::api::http::{HttpRequest, HttpResponse, Transport};
    use crate::config::ClientConfig;
    use crate::resource::query;
    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serves `names` in pages, honouring `page` and `per_page`
    struct Listing {
        names: Vec<String>,
        calls: AtomicUsize,
        fail_on: Option<u32>,
        with_total: bool,
    }

    impl Listing {
        fn new(count: usize) -> Arc<Self> {
            Arc::new(Self {
                names: (1..=count).map(|i| format!("tag-{}", i)).collect(),
                calls: AtomicUsize::new(0),
                fail_on: None,
                with_total: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for Listing {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let param = |name: &str| {
                request
                    .url
                    .query_pairs()
                    .find(|(k, _)| k == name)
                    .and_then(|(_, v)| v.parse::<u32>().ok())
            };
            let page = param("page").unwrap_or(1);
            let per_page = param("per_page").unwrap_or(30);

            if self.fail_on == Some(page) {
                return Err(TransportError::Connect("reset by peer".into()));
            }

            let total = self.names.len() as u32;
            let total_pages = total.div_ceil(per_page).max(1);
            let start = ((page - 1) * per_page) as usize;
            let tags: Vec<Value> = self
                .names
                .iter()
                .skip(start)
                .take(per_page as usize)
                .map(|name| json!({ "name": name }))
                .collect();

            let mut pagination = json!({
                "current_page": page,
                "per_page": per_page,
                "large_set": !self.with_total,
            });
            if self.with_total {
                pagination["total_pages"] = json!(total_pages);
                pagination["total"] = json!(total);
            }

            Ok(HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: json!({ "pagination": pagination, "tags": tags }).to_string().into_bytes(),
            })
        }
    }

    #[derive(Debug, Clone, Deserialize, PartialEq)]
    struct Tag {
        name: String,
    }

    fn pages(transport: Arc<Listing>) -> Pages<Tag> {
        let client = Client::new(ClientConfig::default(), transport);
        client
            .pages(Operation::get("/core/v1/organizations/_/tags").build(), "tags")
            .per_page(2)
    }

    async fn page_lengths(pages: &mut Pages<Tag>) -> Vec<usize> {
        let mut lengths = Vec::new();
        while let Some(page) = pages.next_page().await {
            lengths.push(page.unwrap().items.len());
        }
        lengths
    }

    #[tokio::test]
    async fn test_three_page_listing() {
        let transport = Listing::new(5);
        let mut pages = pages(transport.clone());

        assert_eq!(page_lengths(&mut pages).await, vec![2, 2, 1]);
        assert_eq!(transport.calls(), 3);
        assert!(pages.is_finished());
        assert!(pages.next_page().await.is_none());
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_restart_reproduces_sequence() {
        let transport = Listing::new(5);
        let mut pages = pages(transport.clone());

        let first: Vec<String> = {
            let mut names = Vec::new();
            while let Some(page) = pages.next_page().await {
                names.extend(page.unwrap().items.into_iter().map(|t| t.name));
            }
            names
        };

        pages.restart();
        let second = pages.clone().collect_all().await.unwrap();
        let second: Vec<String> = second.into_iter().map(|t| t.name).collect();

        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
        assert_eq!(transport.calls(), 6);
    }

    #[tokio::test]
    async fn test_short_page_ends_large_set() {
        let transport = Arc::new(Listing {
            names: (1..=3).map(|i| format!("tag-{}", i)).collect(),
            calls: AtomicUsize::new(0),
            fail_on: None,
            with_total: false,
        });
        let mut pages = pages(transport.clone());

        assert_eq!(page_lengths(&mut pages).await, vec![2, 1]);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_exact_multiple_stops_on_total_pages() {
        let transport = Listing::new(4);
        let mut pages = pages(transport.clone());

        assert_eq!(page_lengths(&mut pages).await, vec![2, 2]);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_error_fuses_iterator() {
        let transport = Arc::new(Listing {
            names: (1..=5).map(|i| format!("tag-{}", i)).collect(),
            calls: AtomicUsize::new(0),
            fail_on: Some(2),
            with_total: true,
        });
        let mut pages = pages(transport.clone());

        assert!(pages.next_page().await.unwrap().is_ok());
        let err = pages.next_page().await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Transport);
        assert!(pages.next_page().await.is_none());
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_stream() {
        let transport = Listing::new(5);
        let lengths: Vec<usize> = pages(transport)
            .into_stream()
            .map(|page| page.unwrap().items.len())
            .collect()
            .await;
        assert_eq!(lengths, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_missing_items_key_is_decode_error() {
        let client = Client::new(ClientConfig::default(), Listing::new(1));
        let mut pages: Pages<Tag> =
            client.pages(Operation::get("/core/v1/organizations/_/tags").build(), "labels");
        let err = pages.next_page().await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Decode);
    }

    #[tokio::test]
    async fn test_start_page_from_options() {
        let transport = Listing::new(5);
        let mut pages = pages(transport.clone()).with_options(ListOptions::new(3, 0));
        assert_eq!(page_lengths(&mut pages).await, vec![1]);
        pages.restart();
        assert_eq!(pages.next_page().await.unwrap().unwrap().items[0].name, "tag-5");
    }

    #[test]
    fn test_list_options_query() {
        assert!(query::encode(&ListOptions::default()).unwrap().is_empty());
        assert_eq!(
            query::encode(&ListOptions::new(2, 50)).unwrap().encode(),
            "page=2&per_page=50"
        );
        assert_eq!(query::encode(&ListOptions::new(0, 10)).unwrap().encode(), "per_page=10");
    }

    #[test]
    fn test_extract_nested_items() {
        let payload = json!({"data": {"tags": [{"name": "a"}]}});
        let tags: Vec<Tag> = extract_items(payload, "data.tags").unwrap();
        assert_eq!(tags, vec![Tag { name: "a".into() }]);
    }
}
