//! Request engine for the Katapult cloud REST API.
//!
//! Per-resource wrappers build an [`Operation`], hand it to
//! [`Client::dispatch`] and get back a [`Reply`]: a [`Response`] that is
//! always present plus either the decoded payload or an [`ApiError`] with a
//! stable [`ErrorKind`].
//!
//! The library never installs a `tracing` subscriber; every dispatch runs
//! inside a `dispatch` span carrying a request id.

pub mod api;
pub mod config;
pub mod resource;

pub use api::client::{Client, Reply};
pub use api::error::{classify, ApiError, ErrorInfo, ErrorKind, TransportError};
pub use api::http::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
pub use api::operation::{Method, Operation, OperationBuilder, RequestBody};
pub use api::response::{decode, Decoded, Pagination, RawBody, Response};
pub use config::ClientConfig;
pub use resource::{
    CertificateRef, DataCenterRef, DiskTemplateRef, DnsZoneRef, IpAddressRef, ListOptions,
    LoadBalancerRef, NetworkRef, NetworkSpeedProfileRef, OrganizationRef, Page, Pages,
    QueryEncoder, QueryParams, Reference, SecurityGroupRef, TagRef, ToQuery, TrashObjectRef,
    VirtualMachineGroupRef, VirtualMachineNetworkInterfaceRef, VirtualMachinePackageRef,
    VirtualMachineRef, ZoneRef,
};
