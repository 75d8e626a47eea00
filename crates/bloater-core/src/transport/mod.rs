//! HTTP transport seam.
//!
//! The engine only needs "send a GET, tell me the status code or why it
//! failed". [`CurlTransport`] is the production implementation; tests plug in
//! scripted transports.

mod multi;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub use multi::CurlTransport;

/// Future returned by [`Transport::get`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<u16, TransportError>> + Send + 'a>>;

/// Transport-level failure (no HTTP status was received).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request did not complete within the request timeout.
    #[error("request timed out")]
    Timeout,
    /// Could not connect, or the connection broke mid-request.
    #[error("connection error: {0}")]
    Connection(String),
    /// Anything else the transport reported.
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

/// Sends one GET per call. The connection must not be reused by a later call.
pub trait Transport: Send + Sync + 'static {
    fn get<'a>(&'a self, url: &'a str, timeout: Duration) -> TransportFuture<'a>;
}
