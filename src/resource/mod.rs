//! Resource reference layer
//!
//! Identifies API resources and turns lookup arguments into query strings.
//!
//! # Architecture
//!
//! - [`reference`] - By-ID / by-lookup-key references, one typed wrapper per family
//! - [`query`] - Ordered query encoding with the empty-vs-unset list rule
//! - [`fetcher`] - Page-by-page iteration over list endpoints

pub mod fetcher;
pub mod query;
pub mod reference;

pub use fetcher::{ListOptions, Page, Pages};
pub use query::{QueryEncoder, QueryParams, ToQuery};
pub use reference::*;
