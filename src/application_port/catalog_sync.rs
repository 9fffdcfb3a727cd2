use crate::domain_port::FetchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Where a sync run currently is. `Failed` is reachable from every other state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Fetching { page: u32 },
    Normalizing { page: u32 },
    Upserting { page: u32 },
    Completed,
    Failed { reason: String },
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Idle => f.write_str("idle"),
            SyncState::Fetching { page } => write!(f, "fetching page {page}"),
            SyncState::Normalizing { page } => write!(f, "normalizing page {page}"),
            SyncState::Upserting { page } => write!(f, "upserting page {page}"),
            SyncState::Completed => f.write_str("completed"),
            SyncState::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// A problem observed during a run that did not by itself stop it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncIssue {
    MalformedRecord {
        page: u32,
        index: usize,
        reason: String,
    },
    TransientFetchError {
        page: u32,
        attempt: u32,
        message: String,
    },
    RateLimited {
        page: u32,
        attempt: u32,
    },
}

/// Why a single external record was rejected. Recovered locally: the record is skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedRecord {
    #[error("missing external id")]
    MissingId,
    #[error("invalid external id {0}")]
    InvalidId(i64),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub pages_fetched: u32,
    pub records_seen: u64,
    pub records_upserted: u64,
    pub records_inserted: u64,
    pub records_updated: u64,
    pub records_unchanged: u64,
    pub records_skipped: u64,
    /// Ids already handled earlier in the same run.
    pub records_duplicate: u64,
    pub reached_page_ceiling: bool,
    pub errors: Vec<SyncIssue>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    #[error("catalog sync failed while {failed_in}: {reason}")]
    Failed {
        failed_in: SyncState,
        reason: String,
        report: Box<SyncReport>,
    },
}

impl SyncError {
    /// Progress made before the failure.
    pub fn report(&self) -> &SyncReport {
        match self {
            SyncError::Failed { report, .. } => report,
        }
    }
}

/// Bounded exponential backoff for page fetches.
///
/// `max_attempts` counts the first try, so `max_attempts = 1` disables retries.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), capped at `max_backoff_ms`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.initial_backoff_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = millis.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// How long to wait after `attempt` failed with `error`, or `None` when the fetch must give up.
    /// A server `Retry-After` hint replaces the backoff but never exceeds `max_backoff_ms`.
    pub fn next_delay(&self, attempt: u32, error: &FetchError) -> Option<Duration> {
        if !error.is_retryable() || attempt >= self.max_attempts {
            return None;
        }
        match error {
            FetchError::RateLimited {
                retry_after: Some(wait),
            } => Some((*wait).min(Duration::from_millis(self.max_backoff_ms))),
            _ => Some(self.backoff(attempt)),
        }
    }
}

#[async_trait::async_trait]
pub trait CatalogSync: Send + Sync {
    async fn run_full_sync(&self) -> Result<SyncReport, SyncError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 500,
            multiplier: 2.0,
        }
    }

    #[test]
    fn backoff_grows_then_caps() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(400));
        assert_eq!(p.backoff(4), Duration::from_millis(500));
        assert_eq!(p.backoff(40), Duration::from_millis(500));
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let p = policy();
        let transient = FetchError::Transient("reset".into());
        assert!(p.next_delay(4, &transient).is_some());
        assert!(p.next_delay(5, &transient).is_none());
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let p = policy();
        assert!(p.next_delay(1, &FetchError::Permanent("401".into())).is_none());
    }

    #[test]
    fn rate_limit_hint_overrides_backoff() {
        let p = policy();
        let limited = FetchError::RateLimited {
            retry_after: Some(Duration::from_millis(300)),
        };
        assert_eq!(p.next_delay(1, &limited), Some(Duration::from_millis(300)));
        let unhinted = FetchError::RateLimited { retry_after: None };
        assert_eq!(p.next_delay(2, &unhinted), Some(Duration::from_millis(200)));
    }

    #[test]
    fn rate_limit_hint_is_capped_by_max_backoff() {
        let limited = FetchError::RateLimited {
            retry_after: Some(Duration::from_secs(86_400)),
        };
        assert_eq!(
            RetryPolicy::default().next_delay(1, &limited),
            Some(Duration::from_millis(8_000))
        );
        assert_eq!(policy().next_delay(1, &limited), Some(Duration::from_millis(500)));
    }
}
