//! The upstream event source boundary.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use flood_core::DetectionEvent;

use crate::error::Result;

/// Boxed future returned by event source operations.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Something that reports currently active detection events.
///
/// Errors must distinguish transient from permanent failures through
/// [`UpstreamError::is_retryable`](crate::UpstreamError::is_retryable); the
/// retry and breaker layers rely on it.
pub trait EventSource: Send + Sync + fmt::Debug {
    /// Fetches every currently active event.
    fn fetch_active_events(&self) -> SourceFuture<'_, Vec<DetectionEvent>>;

    /// Checks the service is reachable.
    fn ping(&self) -> SourceFuture<'_, ()>;
}
