//! Bounded-time polling of a translation job.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use bucketmgr_protocol::{ErrorClass, Manifest, Region};
use bucketmgr_transfer::{TokenSource, UploadPolicy};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::resolver::DerivativeService;
use crate::retry::Recovery;
use crate::ticker::{Tick, Ticker, TickerConfig};
use crate::DerivativeError;

/// Polling cadence and ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Time between manifest fetches.
    pub interval: Duration,
    /// Give up once this much time has elapsed without completion.
    pub max_elapsed: Duration,
    /// Ticker sleep slice.
    pub resolution: Duration,
    /// Token refreshes allowed per manifest fetch.
    pub max_token_retries: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5000),
            max_elapsed: Duration::from_millis(5000 * 12 * 60),
            resolution: Duration::from_millis(1),
            max_token_retries: 3,
        }
    }
}

impl PollConfig {
    fn ticker(&self) -> TickerConfig {
        TickerConfig {
            interval: self.interval,
            resolution: self.resolution,
        }
    }

    /// Transient failures are skipped per tick, so only token expiry is
    /// retried within a fetch.
    fn fetch_retry(&self) -> UploadPolicy {
        UploadPolicy {
            max_retries: 0,
            max_url_retries: 0,
            max_token_retries: self.max_token_retries,
            ..UploadPolicy::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Running,
    Completed,
    TimedOut,
    /// The server reported the job as failed.
    Failed,
}

/// What the caller is told after a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollUpdate {
    /// Still running; never zero.
    Progress(u8),
    Completed,
    TimedOut,
    Failed { status: String },
}

impl PollUpdate {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }
}

/// State of one poll, mutated only on tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState {
    pub ticks: u64,
    pub elapsed: Duration,
    /// Last caller-visible progress; reset to 0 on a terminal transition.
    pub progress: u8,
    pub phase: PollPhase,
}

impl Default for PollState {
    fn default() -> Self {
        Self::new()
    }
}

impl PollState {
    pub fn new() -> Self {
        Self {
            ticks: 0,
            elapsed: Duration::ZERO,
            progress: 0,
            phase: PollPhase::Running,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase != PollPhase::Running
    }

    /// Applies one fetched manifest. `None` means the server has no
    /// manifest yet, which counts as zero progress.
    pub fn observe(
        &mut self,
        tick: Tick,
        manifest: Option<&Manifest>,
        max_elapsed: Duration,
    ) -> PollUpdate {
        self.ticks += 1;
        self.elapsed = tick.elapsed;

        if let Some(m) = manifest
            && m.is_failed()
        {
            return self.finish(PollPhase::Failed, PollUpdate::Failed {
                status: m.status.clone(),
            });
        }

        let progress = manifest.map_or(0, manifest_progress);
        if progress >= 100 {
            return self.finish(PollPhase::Completed, PollUpdate::Completed);
        }
        if tick.elapsed > max_elapsed {
            return self.finish(PollPhase::TimedOut, PollUpdate::TimedOut);
        }

        self.progress = progress.max(1);
        PollUpdate::Progress(self.progress)
    }

    /// Applies a tick whose fetch failed: only the deadline is checked.
    pub fn observe_unavailable(&mut self, tick: Tick, max_elapsed: Duration) -> Option<PollUpdate> {
        self.ticks += 1;
        self.elapsed = tick.elapsed;
        (tick.elapsed > max_elapsed).then(|| self.finish(PollPhase::TimedOut, PollUpdate::TimedOut))
    }

    fn finish(&mut self, phase: PollPhase, update: PollUpdate) -> PollUpdate {
        self.phase = phase;
        self.progress = 0;
        update
    }
}

/// Percentage from free progress text: the first run of digits, capped at
/// 100. Text without digits means the job is done.
pub fn parse_progress(text: &str) -> u8 {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return 100;
    }
    digits.parse::<u32>().map_or(100, |v| v.min(100) as u8)
}

fn manifest_progress(manifest: &Manifest) -> u8 {
    // A queued job may carry no progress text at all.
    if manifest.progress.trim().is_empty()
        && matches!(manifest.status.as_str(), "pending" | "inprogress")
    {
        return 0;
    }
    parse_progress(&manifest.progress)
}

/// How a poll ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed(PollState),
    Cancelled,
}

type PollMessage = Result<(PollUpdate, PollState), DerivativeError>;

/// Watches a translation job until it completes, fails, or times out.
pub struct JobPoller {
    service: Arc<dyn DerivativeService>,
    tokens: Option<Arc<dyn TokenSource>>,
    config: PollConfig,
    cancel: CancellationToken,
}

impl JobPoller {
    pub fn new(service: Arc<dyn DerivativeService>, config: PollConfig) -> Self {
        Self {
            service,
            tokens: None,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the source consulted when the server rejects the bearer token.
    ///
    /// Without one, an expired token ends the poll.
    pub fn with_token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Uses `cancel` to stop polling early.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Polls the manifest of `urn` once per interval.
    ///
    /// `on_update` sees every [`PollUpdate`], in tick order, including the
    /// terminal one. Timeouts and remote job failures come back as distinct
    /// errors. Transient fetch failures are logged and skipped; an expired
    /// token is refreshed up to `max_token_retries` times per fetch; any
    /// other fetch failure ends the poll. Cancellation returns
    /// [`PollOutcome::Cancelled`] with no further callbacks.
    pub async fn poll<F>(
        &self,
        urn: &str,
        region: Region,
        token: &str,
        mut on_update: F,
    ) -> Result<PollOutcome, DerivativeError>
    where
        F: FnMut(&PollUpdate) + Send,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<PollMessage>();
        let state = Arc::new(Mutex::new(PollState::new()));
        let max_elapsed = self.config.max_elapsed;
        let job: Arc<str> = Arc::from(urn);
        let bearer = Arc::new(Mutex::new(token.to_string()));
        let service = Arc::clone(&self.service);
        let tokens = self.tokens.clone();
        let retry = self.config.fetch_retry();

        let mut ticker = Ticker::new(self.config.ticker());
        ticker.start(move |tick| {
            let (service, state, tx) = (Arc::clone(&service), Arc::clone(&state), tx.clone());
            let (job, bearer) = (Arc::clone(&job), Arc::clone(&bearer));
            let (tokens, retry) = (tokens.clone(), retry.clone());
            Box::pin(async move {
                if state.lock().await.is_terminal() {
                    return ControlFlow::Break(());
                }

                let mut token = bearer.lock().await.clone();
                let mut recovery = Recovery::new(&retry, tokens.as_ref(), &job);
                let fetched = loop {
                    match service.get_manifest(&job, region, &token).await {
                        Ok(manifest) => break Ok(manifest),
                        Err(e) => {
                            if let Err(e) = recovery.recover(e, &mut token).await {
                                break Err(e);
                            }
                        }
                    }
                };
                *bearer.lock().await = token;
                let mut state = state.lock().await;
                let update = match fetched {
                    Ok(manifest) => Some(state.observe(tick, manifest.as_ref(), max_elapsed)),
                    Err(e) if e.class() == ErrorClass::TransientNetworkFailure => {
                        warn!(urn = %job, tick = tick.index, error = %e, "manifest fetch failed");
                        state.observe_unavailable(tick, max_elapsed)
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        return ControlFlow::Break(());
                    }
                };

                let Some(update) = update else {
                    return ControlFlow::Continue(());
                };
                let terminal = update.is_terminal();
                if tx.send(Ok((update, state.clone()))).is_err() || terminal {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
        });

        info!(
            urn,
            interval_ms = self.config.interval.as_millis() as u64,
            "polling translation job"
        );

        loop {
            let message = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    ticker.stop();
                    info!(urn, "polling cancelled");
                    return Ok(PollOutcome::Cancelled);
                }
                message = rx.recv() => message,
            };

            let (update, snapshot) = match message {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    error!(urn, error = %e, "polling aborted");
                    return Err(e);
                }
                None => return Err(DerivativeError::Interrupted),
            };

            on_update(&update);

            match update {
                PollUpdate::Progress(progress) => {
                    debug!(urn, progress, tick = snapshot.ticks, "translation progress");
                }
                PollUpdate::Completed => {
                    info!(
                        urn,
                        ticks = snapshot.ticks,
                        elapsed_ms = snapshot.elapsed.as_millis() as u64,
                        "translation completed"
                    );
                    return Ok(PollOutcome::Completed(snapshot));
                }
                PollUpdate::TimedOut => {
                    warn!(urn, ticks = snapshot.ticks, "translation timed out");
                    return Err(DerivativeError::Timeout { limit: max_elapsed });
                }
                PollUpdate::Failed { status } => {
                    error!(urn, status = %status, "translation failed");
                    return Err(DerivativeError::JobFailed {
                        urn: urn.to_string(),
                        status,
                    });
                }
            }
        }
    }
}
