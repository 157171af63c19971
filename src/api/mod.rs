//! Katapult API interaction module
//!
//! This module provides the request/response engine shared by every
//! resource client: describing a call, sending it through a transport and
//! turning whatever comes back into a typed payload or a classified error.
//!
//! # Module Structure
//!
//! - [`operation`] - Immutable description of one API call
//! - [`client`] - Dispatcher that executes operations
//! - [`http`] - Transport trait and the reqwest-backed transport
//! - [`response`] - Response envelope and payload decoding
//! - [`error`] - Error kinds, the upstream code table and classification
//!
//! # Example
//!
//! ```no_run
//! use katapult::{Client, ClientConfig, Operation, NetworkRef};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = Client::from_config(ClientConfig::load().with_env()?)?;
//!     let op = Operation::get("/core/v1/networks/_")
//!         .query(&NetworkRef::by_permalink("public"))
//!         .build();
//!     let network: serde_json::Value = client.dispatch(op).await.into_result()?;
//!     println!("{}", network["network"]["id"]);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod http;
pub mod operation;
pub mod response;
