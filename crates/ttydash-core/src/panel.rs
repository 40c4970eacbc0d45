//! Per-panel polling state machine and scheduler task.
//!
//! ```text
//! Idle --[countdown hits 0 | manual refresh]--> Polling
//! Polling --[ok]--> Idle (payload replaced, countdown reset)
//! Polling --[err]--> Idle (payload kept, last_error set, countdown reset)
//! ```
//!
//! The tick loop keeps running while a poll is outstanding; at most one
//! poll is in flight per panel.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::models::{Payload, Records};
use crate::source::PanelSource;

/// Events emitted by a panel scheduler for monitoring/logging.
#[derive(Debug, Clone)]
pub enum PanelEvent<'a> {
    Started {
        panel: &'a str,
    },
    PollStarted {
        panel: &'a str,
        manual: bool,
    },
    PollSucceeded {
        panel: &'a str,
        records: usize,
        changed: bool,
    },
    PollFailed {
        panel: &'a str,
        error: &'a str,
        consecutive_failures: u32,
    },
    RefreshIgnored {
        panel: &'a str,
    },
    Stopped {
        panel: &'a str,
    },
}

/// Trait for receiving panel events (decoupled logging).
pub trait PanelReporter: Send + Sync {
    fn report(&self, event: PanelEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPanelReporter;

impl PanelReporter for TracingPanelReporter {
    fn report(&self, event: PanelEvent<'_>) {
        match event {
            PanelEvent::Started { panel } => {
                tracing::info!(%panel, "Panel scheduler started");
            }
            PanelEvent::PollStarted { panel, manual } => {
                tracing::debug!(%panel, %manual, "Polling source");
            }
            PanelEvent::PollSucceeded {
                panel,
                records,
                changed,
            } => {
                if changed {
                    tracing::info!(%panel, %records, "Panel data changed");
                } else {
                    tracing::debug!(%panel, %records, "Panel data unchanged");
                }
            }
            PanelEvent::PollFailed {
                panel,
                error,
                consecutive_failures,
            } => {
                tracing::warn!(%panel, %error, %consecutive_failures, "Poll failed");
            }
            PanelEvent::RefreshIgnored { panel } => {
                tracing::debug!(%panel, "Refresh ignored, poll already in flight");
            }
            PanelEvent::Stopped { panel } => {
                tracing::info!(%panel, "Panel scheduler stopped");
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PanelConfig {
    pub id: String,
    pub title: String,
    pub refresh_interval: Duration,
    /// Countdown granularity, independent of the refresh interval.
    pub tick: Duration,
    /// Dispatch the first poll immediately instead of after one interval.
    pub poll_on_start: bool,
}

impl PanelConfig {
    pub fn new(id: impl Into<String>, title: impl Into<String>, refresh_interval: Duration) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            refresh_interval,
            tick: Duration::from_secs(10),
            poll_on_start: true,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_poll_on_start(mut self, poll_on_start: bool) -> Self {
        self.poll_on_start = poll_on_start;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelPhase {
    Idle,
    Polling,
}

/// Result of applying a finished poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Updated { records: usize, changed: bool },
    Failed { consecutive_failures: u32 },
}

/// Point-in-time view of a panel, published to the UI.
#[derive(Debug, Clone, Serialize)]
pub struct PanelSnapshot {
    pub id: String,
    pub title: String,
    pub payload: Option<Payload>,
    pub last_error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub seconds_until_next_refresh: u64,
    pub refresh_interval_secs: u64,
    pub is_loading: bool,
    pub consecutive_failures: u32,
    pub data_hash: Option<String>,
}

impl PanelSnapshot {
    pub fn records(&self) -> Option<&Records> {
        self.payload.as_ref().map(|p| &p.records)
    }

    /// True while the first poll has not produced data yet.
    pub fn awaiting_first_data(&self) -> bool {
        self.payload.is_none() && self.last_error.is_none()
    }
}

/// Pure panel state. The scheduler task drives it; tests can drive it directly.
#[derive(Debug, Clone)]
pub struct PanelState {
    id: String,
    title: String,
    interval_secs: u64,
    tick_secs: u64,
    phase: PanelPhase,
    countdown: u64,
    payload: Option<Payload>,
    last_error: Option<String>,
    last_updated: Option<DateTime<Utc>>,
    last_attempt: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    data_hash: Option<String>,
}

impl PanelState {
    pub fn new(config: &PanelConfig) -> Self {
        let interval_secs = config.refresh_interval.as_secs().max(1);
        Self {
            id: config.id.clone(),
            title: config.title.clone(),
            interval_secs,
            tick_secs: config.tick.as_secs().max(1),
            phase: PanelPhase::Idle,
            countdown: interval_secs,
            payload: None,
            last_error: None,
            last_updated: None,
            last_attempt: None,
            consecutive_failures: 0,
            data_hash: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> PanelPhase {
        self.phase
    }

    pub fn countdown(&self) -> u64 {
        self.countdown
    }

    /// Advance the countdown by one tick. Returns true if a poll is due.
    /// Ticks are ignored while a poll is in flight.
    pub fn tick(&mut self) -> bool {
        if self.phase == PanelPhase::Polling {
            return false;
        }
        self.countdown = self.countdown.saturating_sub(self.tick_secs);
        self.countdown == 0
    }

    /// Move to `Polling`. Returns false (no-op) if a poll is already in flight.
    pub fn begin_poll(&mut self) -> bool {
        if self.phase == PanelPhase::Polling {
            return false;
        }
        self.phase = PanelPhase::Polling;
        self.last_attempt = Some(Utc::now());
        true
    }

    /// Apply a finished poll and return to `Idle`.
    pub fn complete(&mut self, result: Result<Records, AppError>) -> PollOutcome {
        self.phase = PanelPhase::Idle;
        self.countdown = self.interval_secs;

        match result {
            Ok(records) => {
                let hash = records.data_hash();
                let changed = self.data_hash.as_deref() != Some(hash.as_str());
                let count = records.len();
                let payload = Payload::new(records);
                self.last_updated = Some(payload.retrieved_at);
                self.payload = Some(payload);
                self.data_hash = Some(hash);
                self.last_error = None;
                self.consecutive_failures = 0;
                PollOutcome::Updated {
                    records: count,
                    changed,
                }
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                self.consecutive_failures += 1;
                PollOutcome::Failed {
                    consecutive_failures: self.consecutive_failures,
                }
            }
        }
    }

    pub fn snapshot(&self) -> PanelSnapshot {
        PanelSnapshot {
            id: self.id.clone(),
            title: self.title.clone(),
            payload: self.payload.clone(),
            last_error: self.last_error.clone(),
            last_updated: self.last_updated,
            last_attempt: self.last_attempt,
            seconds_until_next_refresh: self.countdown,
            refresh_interval_secs: self.interval_secs,
            is_loading: self.phase == PanelPhase::Polling,
            consecutive_failures: self.consecutive_failures,
            data_hash: self.data_hash.clone(),
        }
    }
}

/// Cloneable handle to a running panel scheduler.
#[derive(Clone)]
pub struct PanelHandle {
    id: String,
    snapshots: watch::Receiver<PanelSnapshot>,
    refresh_tx: mpsc::Sender<()>,
}

impl PanelHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Latest published state; never waits on an in-flight poll.
    pub fn snapshot(&self) -> PanelSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Request an immediate poll. Ignored while one is in flight.
    pub fn refresh(&self) {
        // A full channel already carries a pending request.
        let _ = self.refresh_tx.try_send(());
    }
}

/// Drives one panel: ticks the countdown and dispatches polls.
pub struct PanelScheduler {
    config: PanelConfig,
    source: Arc<dyn PanelSource>,
    reporter: Arc<dyn PanelReporter>,
}

impl PanelScheduler {
    pub fn new(
        config: PanelConfig,
        source: Arc<dyn PanelSource>,
        reporter: Arc<dyn PanelReporter>,
    ) -> Self {
        Self {
            config,
            source,
            reporter,
        }
    }

    /// Spawn the scheduler task. It runs until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> (PanelHandle, JoinHandle<()>) {
        let state = PanelState::new(&self.config);
        let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());
        let (refresh_tx, refresh_rx) = mpsc::channel(1);

        let handle = PanelHandle {
            id: self.config.id.clone(),
            snapshots: snapshot_rx,
            refresh_tx,
        };
        let task = tokio::spawn(self.run(state, cancel, snapshot_tx, refresh_rx));
        (handle, task)
    }

    async fn run(
        self,
        mut state: PanelState,
        cancel: CancellationToken,
        snapshots: watch::Sender<PanelSnapshot>,
        mut refresh_rx: mpsc::Receiver<()>,
    ) {
        let panel = self.config.id.clone();
        self.reporter.report(PanelEvent::Started { panel: &panel });

        let tick = self.config.tick.max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut polls: JoinSet<Result<Records, AppError>> = JoinSet::new();

        if self.config.poll_on_start {
            self.dispatch(&mut state, &mut polls, false);
        }
        snapshots.send_replace(state.snapshot());

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if state.tick() {
                        self.dispatch(&mut state, &mut polls, false);
                    }
                }
                Some(()) = refresh_rx.recv() => {
                    if state.phase() == PanelPhase::Polling {
                        self.reporter.report(PanelEvent::RefreshIgnored { panel: &panel });
                    } else {
                        self.dispatch(&mut state, &mut polls, true);
                    }
                }
                Some(joined) = polls.join_next(), if !polls.is_empty() => {
                    let result = joined.unwrap_or_else(|e| {
                        Err(AppError::extraction(&panel, format!("poll task failed: {e}")))
                    });
                    self.apply(&mut state, result);
                }
            }
            snapshots.send_replace(state.snapshot());
        }

        // Outstanding polls are aborted, not drained.
        polls.shutdown().await;
        self.reporter.report(PanelEvent::Stopped { panel: &panel });
    }

    fn dispatch(
        &self,
        state: &mut PanelState,
        polls: &mut JoinSet<Result<Records, AppError>>,
        manual: bool,
    ) {
        if !state.begin_poll() {
            return;
        }
        self.reporter.report(PanelEvent::PollStarted {
            panel: state.id(),
            manual,
        });
        let source = Arc::clone(&self.source);
        polls.spawn(async move { source.poll().await });
    }

    fn apply(&self, state: &mut PanelState, result: Result<Records, AppError>) {
        let error = result.as_ref().err().map(ToString::to_string);
        match state.complete(result) {
            PollOutcome::Updated { records, changed } => {
                self.reporter.report(PanelEvent::PollSucceeded {
                    panel: state.id(),
                    records,
                    changed,
                });
            }
            PollOutcome::Failed {
                consecutive_failures,
            } => {
                self.reporter.report(PanelEvent::PollFailed {
                    panel: state.id(),
                    error: error.as_deref().unwrap_or_default(),
                    consecutive_failures,
                });
            }
        }
    }
}
