//! Rate-limit counter port.

use crate::error::RepoError;

/// Fixed-window request counter keyed by `client:path`.
///
/// The in-process implementation suits a single instance; a shared store
/// keeps limits consistent across instances.
#[async_trait::async_trait]
pub trait RateLimitStore: Send + Sync + 'static {
    /// Counts one request for `key`.
    ///
    /// Returns `None` when the request is allowed, or the number of seconds
    /// until the current window resets when the limit is exceeded.
    async fn hit(&self, key: &str, max_requests: u32) -> Result<Option<u64>, RepoError>;
}
