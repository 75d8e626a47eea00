//! Classify HTTP statuses and transport errors into outcome kinds.

use crate::transport::TransportError;

/// What a received status code means to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 200.
    Success,
    /// Server asked us to back off (503, 429). Retried.
    Overloaded,
    /// Server reported a timeout (408, 504). Metered as a timeout, not retried.
    TimedOut,
    /// Outside the modeled response space. Fatal.
    Unmodeled,
}

/// Why an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transport-level timeout.
    Timeout,
    /// Transport-level error other than a timeout.
    Transport,
    /// 503 or 429.
    Overloaded(u16),
    /// 408 or 504.
    TimeoutResponse(u16),
}

impl FailureKind {
    /// Whether this failure goes through the retry controller.
    pub fn is_retried(self) -> bool {
        !matches!(self, FailureKind::TimeoutResponse(_))
    }
}

/// Classify an HTTP status code.
pub fn classify_http_status(code: u16) -> ResponseClass {
    match code {
        200 => ResponseClass::Success,
        429 | 503 => ResponseClass::Overloaded,
        408 | 504 => ResponseClass::TimedOut,
        _ => ResponseClass::Unmodeled,
    }
}

/// Classify a transport error.
pub fn classify_transport_error(e: &TransportError) -> FailureKind {
    if e.is_timeout() {
        FailureKind::Timeout
    } else {
        FailureKind::Transport
    }
}
