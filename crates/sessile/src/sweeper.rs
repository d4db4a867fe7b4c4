//! Background deletion of expired session rows.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::now_millis;
use crate::error::SweepError;
use crate::table::SessionTable;

/// Longest supported sweep period. Longer periods are clamped so the first
/// deadline stays representable as an `Instant`.
pub const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Default)]
struct SweeperState {
    token: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

/// Recurring task that deletes every row whose `expires` has passed.
///
/// The sweep goes straight to the table and never touches the session
/// cache. Failed sweeps are logged and skipped; the next tick retries.
pub struct Sweeper<T: SessionTable> {
    table: Arc<T>,
    period: Duration,
    state: Mutex<SweeperState>,
}

impl<T: SessionTable> Sweeper<T> {
    /// Create a stopped sweeper that runs every `period`.
    pub fn new(table: Arc<T>, period: Duration) -> Self {
        Self {
            table,
            // tokio intervals reject a zero period
            period: period.clamp(Duration::from_millis(1), MAX_SWEEP_PERIOD),
            state: Mutex::new(SweeperState::default()),
        }
    }

    /// Time between sweeps.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether ticks are currently scheduled and the task is alive.
    pub fn is_running(&self) -> bool {
        let state = self.state.lock();
        state.token.is_some()
            && state
                .handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    /// Start sweeping on the current tokio runtime. The first sweep happens
    /// one full period from now. Returns `false` if already running.
    pub fn start(&self) -> bool {
        let mut state = self.state.lock();
        if state.token.is_some() {
            return false;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(run(
            Arc::clone(&self.table),
            self.period,
            token.clone(),
        ));
        state.token = Some(token);
        state.handle = Some(handle);

        info!(
            table = %self.table.name(),
            period_ms = self.period.as_millis() as u64,
            "Session sweeper started"
        );
        true
    }

    /// Stop scheduling ticks. A sweep already in progress runs to
    /// completion. Returns `true` only for the call that actually stopped
    /// the sweeper.
    pub fn stop(&self) -> bool {
        let Some(token) = self.state.lock().token.take() else {
            return false;
        };
        token.cancel();
        info!(table = %self.table.name(), "Session sweeper stopped");
        true
    }

    /// Stop the sweeper and wait for an in-flight sweep to finish.
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self.state.lock().handle.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(table = %self.table.name(), error = %e, "Session sweeper task failed");
            }
        }
    }

    /// Run one sweep now, independent of the timer.
    pub async fn sweep_once(&self) -> Result<u64, SweepError> {
        sweep(self.table.as_ref()).await
    }
}

impl<T: SessionTable> Drop for Sweeper<T> {
    fn drop(&mut self) {
        if let Some(token) = self.state.get_mut().token.take() {
            token.cancel();
        }
    }
}

impl<T: SessionTable> std::fmt::Debug for Sweeper<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweeper")
            .field("table", &self.table.name())
            .field("period", &self.period)
            .field("running", &self.is_running())
            .finish()
    }
}

async fn run<T: SessionTable>(table: Arc<T>, period: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // Outside the select so cancellation never interrupts a sweep.
        if let Err(e) = sweep(table.as_ref()).await {
            warn!(error = %e, "Expired session sweep failed");
        }
    }
}

async fn sweep<T: SessionTable>(table: &T) -> Result<u64, SweepError> {
    let removed = table
        .delete_expired(now_millis())
        .await
        .map_err(|source| SweepError {
            table: table.name().to_string(),
            source,
        })?;

    if removed > 0 {
        debug!(table = %table.name(), removed, "Deleted expired sessions");
    }
    Ok(removed)
}
