//! Cancellable fixed-interval clock.

use std::ops::ControlFlow;
use std::time::Duration;

use bucketmgr_transfer::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Handler awaited on every tick; `Break` ends the run.
pub type TickHandler = Box<dyn FnMut(Tick) -> BoxFuture<'static, ControlFlow<()>> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickerConfig {
    /// Time between ticks.
    pub interval: Duration,
    /// Sleep slice between clock checks.
    pub resolution: Duration,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            resolution: Duration::from_millis(1),
        }
    }
}

/// One firing of a [`Ticker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// 1-based tick number within the current run.
    pub index: u64,
    /// Time since the run started.
    pub elapsed: Duration,
}

/// Repeating clock driven by a single background task.
///
/// The task sleeps in `resolution` slices and fires once `interval` has
/// passed. Overshoot past the interval is carried into the next one.
/// Ticks are strictly sequential: the clock is re-read only after the
/// handler's future completes.
pub struct Ticker {
    config: TickerConfig,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn new(config: TickerConfig) -> Self {
        Self {
            config,
            cancel: None,
            task: None,
        }
    }

    pub fn config(&self) -> TickerConfig {
        self.config
    }

    /// Starts a run, stopping any previous run first.
    pub fn start<F>(&mut self, on_tick: F)
    where
        F: FnMut(Tick) -> BoxFuture<'static, ControlFlow<()>> + Send + 'static,
    {
        self.stop();

        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());
        let config = self.config;
        let handler: TickHandler = Box::new(on_tick);
        self.task = Some(tokio::spawn(run(config, cancel, handler)));
        tracing::debug!(interval_ms = config.interval.as_millis() as u64, "ticker started");
    }

    /// Stops future ticks. A handler already running is not interrupted.
    pub fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
            tracing::debug!("ticker stopped");
        }
        self.task = None;
    }

    /// Returns `true` while a run is active.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

async fn run(config: TickerConfig, cancel: CancellationToken, mut on_tick: TickHandler) {
    let origin = Instant::now();
    let mut mark = origin;
    let mut carry = Duration::ZERO;
    let mut index = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.resolution) => {}
        }

        let since = mark.elapsed() + carry;
        if since < config.interval {
            continue;
        }
        carry = (since - config.interval).min(config.interval);
        index += 1;

        let tick = Tick {
            index,
            elapsed: origin.elapsed(),
        };
        if on_tick(tick).await.is_break() {
            tracing::debug!(ticks = index, "ticker finished");
            break;
        }
        mark = Instant::now();
    }
}
