//! Network access for the worker: request/response types and the fetch seam.

mod client;
mod types;

use color_eyre::Result;
use std::future::Future;

pub use client::HttpClient;
pub use types::{Request, RequestKey, RequestMode, Response, ResponseKind};

/// Anything that can perform a fetch on the worker's behalf.
///
/// `Err` means the request never produced a response (offline, DNS, TLS,
/// timeout). HTTP error statuses are successful fetches.
pub trait Network: Send + Sync + 'static {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}
