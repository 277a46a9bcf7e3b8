//! Client core for the OpenStreetCam street-level imagery API.
//!
//! # Overview
//! Lists photos near a point, retrieves whole capture sequences, downloads
//! photo files, and lists the road segments that have coverage, merging
//! every result page of a track query into one deduplicated list.
//!
//! # Design
//! - `Service` is constructed explicitly and carries only configuration and
//!   an `HttpClient`; callers own it and may share it between threads.
//! - Network I/O sits behind the `Transport` trait. `UreqTransport` is the
//!   default; tests plug in scripted transports.
//! - `request` builds form parameters, `response` decodes envelopes, and
//!   `Service` checks each envelope's status before trusting its payload.
//! - `Session` holds the browsing state of one map view (displayed data,
//!   selected photo and sequence) as a plain value.

pub mod config;
pub mod error;
pub mod http;
pub mod request;
pub mod response;
pub mod service;
pub mod session;
pub mod types;

pub use config::ServiceConfig;
pub use error::{ConfigError, MalformedResponseError, ServiceError, TransportError};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use service::Service;
pub use session::{Session, SessionEvent};
pub use types::{BoundingBox, Circle, DataSet, LatLon, Paging, Photo, Segment, Sequence};
