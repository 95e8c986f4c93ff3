//! Opaque key/value cache abstraction consulted by the step executor.
//!
//! The engine treats cached values as opaque `serde_json::Value`s and does
//! no expiration bookkeeping of its own -- TTL is honored by whatever backs
//! this trait. `Get` errors are treated as misses (logged, not propagated);
//! a `Put` after a successful dispatch is best-effort and its failure never
//! fails the step (see `crate::workflow::step_runner`).

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Failure reported by a cache backend.
#[derive(Debug, Error)]
#[error("cache error: {0}")]
pub struct CacheError(pub String);

/// Key/value store with TTL, opaque to the engine.
pub trait Cache: Send + Sync {
    /// Fetch `key`. `Ok(None)` and `Err` are both treated as misses by
    /// callers; the distinction only matters for logging.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Value>, CacheError>> + Send;

    /// Store `value` under `key` for `ttl`. Best-effort from the caller's
    /// perspective -- an `Err` here is logged but never fails a step.
    fn put(
        &self,
        key: &str,
        value: Value,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;
}

/// Build the cache key the step executor uses: `"<prefix>:<step>:<user>:<workflow>"`.
///
/// `user_id` is `"anonymous"` when the execution context carries none.
pub fn cache_key(prefix: &str, step_id: &str, user_id: Option<&str>, workflow_id: &str) -> String {
    format!(
        "{prefix}:{step_id}:{}:{workflow_id}",
        user_id.unwrap_or("anonymous")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_falls_back_to_anonymous() {
        assert_eq!(cache_key("p", "s", None, "wf"), "p:s:anonymous:wf");
    }

    #[test]
    fn key_includes_user() {
        assert_eq!(cache_key("p", "s", Some("u1"), "wf"), "p:s:u1:wf");
    }
}
