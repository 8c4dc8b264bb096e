//! Database-backed rate-limit counters, shared by every service instance
//! pointed at the same database.

use std::time::Duration;

use async_trait::async_trait;
use splits_types::{RateLimitStore, RepoError};

use crate::Repo;

/// Fixed-window counter stored in `rate_limit_windows`.
#[derive(Clone)]
pub struct SharedRateLimitStore {
    repo: Repo,
    window_secs: i64,
}

impl SharedRateLimitStore {
    pub fn new(repo: Repo, window: Duration) -> Self {
        Self {
            repo,
            window_secs: window.as_secs().max(1) as i64,
        }
    }
}

/// Start of the aligned window containing `now`, and seconds until it ends.
pub(crate) fn window_bounds(now: i64, window_secs: i64) -> (i64, u64) {
    let start = now - now.rem_euclid(window_secs);
    let retry_after = (start + window_secs - now).max(1) as u64;
    (start, retry_after)
}

#[async_trait]
impl RateLimitStore for SharedRateLimitStore {
    async fn hit(&self, key: &str, max_requests: u32) -> Result<Option<u64>, RepoError> {
        let (window_start, retry_after) =
            window_bounds(chrono::Utc::now().timestamp(), self.window_secs);
        let hits = self.repo.hit_rate_limit(key, window_start).await?;

        if hits > i64::from(max_requests) {
            tracing::debug!(key, hits, "shared rate limit exceeded");
            return Ok(Some(retry_after));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bounds_align_to_window() {
        assert_eq!(window_bounds(1_000, 900), (900, 800));
        assert_eq!(window_bounds(1_799, 900), (900, 1));
        assert_eq!(window_bounds(1_800, 900), (1_800, 900));
    }
}
