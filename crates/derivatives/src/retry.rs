//! Per-request recovery for derivative-service calls.

use std::sync::Arc;

use bucketmgr_transfer::{RetryBudget, RetryDecision, TokenSource, UploadPolicy};
use tracing::warn;

use crate::DerivativeError;

/// Decides whether a failed request may be sent again, refreshing the
/// bearer token or backing off as the failure class requires.
pub(crate) struct Recovery<'a> {
    budget: RetryBudget<'a>,
    tokens: Option<&'a Arc<dyn TokenSource>>,
    what: &'a str,
}

impl<'a> Recovery<'a> {
    pub(crate) fn new(
        policy: &'a UploadPolicy,
        tokens: Option<&'a Arc<dyn TokenSource>>,
        what: &'a str,
    ) -> Self {
        Self {
            budget: RetryBudget::new(policy),
            tokens,
            what,
        }
    }

    /// Returns `Ok` once the request may be resent with `token`, or gives
    /// `err` back when its budget is spent. Token expiry is only
    /// recoverable with a token source.
    pub(crate) async fn recover(
        &mut self,
        err: DerivativeError,
        token: &mut String,
    ) -> Result<(), DerivativeError> {
        let (delay, refresh_token) = match self.budget.charge(err.class()) {
            RetryDecision::GiveUp => return Err(err),
            RetryDecision::Retry {
                delay,
                refresh_token,
            } => (delay, refresh_token),
        };

        if refresh_token {
            let Some(tokens) = self.tokens else {
                return Err(err);
            };
            *token = tokens
                .refresh()
                .await
                .map_err(|f| DerivativeError::service(f.class, f.message))?;
        }

        warn!(
            request = self.what,
            attempt = self.budget.retries(),
            class = %err.class(),
            error = %err,
            "retrying derivative request"
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}
