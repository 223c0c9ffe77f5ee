//! Upload sizing and retry limits.

use std::time::Duration;

use bucketmgr_protocol::ErrorClass;

use crate::DEFAULT_CHUNK_SIZE;

/// Sizing and retry policy for uploads.
///
/// The retry counts are product configuration, not protocol invariants;
/// callers may tune every field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    /// Bytes per chunk for resumable uploads.
    pub chunk_size: u64,
    /// Files of at most this many bytes go up in a single request.
    pub single_shot_threshold: u64,
    /// Retries per request for transient network failures.
    pub max_retries: u32,
    /// Retries per request after the bearer token was rejected.
    pub max_token_retries: u32,
    /// Retries per request after a signed URL expired.
    pub max_url_retries: u32,
    /// Upper bound on chunks per file.
    pub max_chunk_count: u32,
    /// Base delay before a transient retry; doubles per attempt.
    pub retry_delay: Duration,
    /// Cap on the transient retry delay.
    pub max_retry_delay: Duration,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            single_shot_threshold: DEFAULT_CHUNK_SIZE,
            max_retries: 5,
            max_token_retries: 3,
            max_url_retries: 3,
            max_chunk_count: u32::MAX,
            retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(8),
        }
    }
}

impl UploadPolicy {
    /// Delay before the `attempt`-th transient retry (1-based).
    pub fn transient_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.retry_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_retry_delay)
    }
}

/// What to do after a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the identical request after the delay.
    Retry { delay: Duration, refresh_token: bool },
    /// The failure is fatal or its budget is spent.
    GiveUp,
}

/// Per-request retry counters, one budget per failure class.
#[derive(Debug, Clone)]
pub struct RetryBudget<'a> {
    policy: &'a UploadPolicy,
    transient: u32,
    token: u32,
    url: u32,
}

impl<'a> RetryBudget<'a> {
    pub fn new(policy: &'a UploadPolicy) -> Self {
        Self {
            policy,
            transient: 0,
            token: 0,
            url: 0,
        }
    }

    /// Charges one failure of `class` against its budget.
    pub fn charge(&mut self, class: ErrorClass) -> RetryDecision {
        match class {
            ErrorClass::TransientNetworkFailure if self.transient < self.policy.max_retries => {
                self.transient += 1;
                RetryDecision::Retry {
                    delay: self.policy.transient_delay(self.transient),
                    refresh_token: false,
                }
            }
            ErrorClass::AuthExpired if self.token < self.policy.max_token_retries => {
                self.token += 1;
                RetryDecision::Retry {
                    delay: Duration::ZERO,
                    refresh_token: true,
                }
            }
            ErrorClass::UrlExpired if self.url < self.policy.max_url_retries => {
                self.url += 1;
                RetryDecision::Retry {
                    delay: Duration::ZERO,
                    refresh_token: false,
                }
            }
            _ => RetryDecision::GiveUp,
        }
    }

    /// Retries granted so far across all classes.
    pub fn retries(&self) -> u32 {
        self.transient + self.token + self.url
    }
}
