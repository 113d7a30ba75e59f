use std::time::Duration;

use async_trait::async_trait;
use exam_core::model::SubmissionSummary;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::debug;

use super::registry::SharedSession;
use super::service::TickOutcome;
use super::workflow::ExamLoopService;
use crate::error::SessionError;

/// Source of countdown ticks, one per elapsed second.
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick. Returns `false` once the source is closed.
    async fn next_tick(&mut self) -> bool;
}

/// Wall-clock ticker backed by `tokio::time::interval`.
#[derive(Debug)]
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    /// Tick every `period`, starting one period from now.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        // A stalled runtime still owes the student every elapsed second.
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
        Self { interval }
    }

    #[must_use]
    pub fn every_second() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn next_tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Ticker fired by hand through a `TickHandle`.
#[derive(Debug)]
pub struct ManualTicker {
    rx: mpsc::UnboundedReceiver<()>,
}

/// Sending side of a `ManualTicker`. Dropping every handle closes the ticker.
#[derive(Debug, Clone)]
pub struct TickHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl TickHandle {
    /// Queue one tick. Returns `false` if the ticker is gone.
    pub fn fire(&self) -> bool {
        self.tx.send(()).is_ok()
    }

    /// Queue `n` ticks.
    pub fn fire_n(&self, n: u32) -> bool {
        (0..n).all(|_| self.fire())
    }
}

#[must_use]
pub fn manual_ticker() -> (TickHandle, ManualTicker) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TickHandle { tx }, ManualTicker { rx })
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn next_tick(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}

/// Why a countdown loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownEnd {
    /// The clock ran out and this loop submitted the session.
    Expired(SubmissionSummary),
    /// The session had already been submitted by someone else.
    AlreadySubmitted,
    /// The ticker closed before time ran out.
    TickerClosed,
}

/// Drive `tick()` on a shared session until it is submitted or the ticker closes.
///
/// The session lock is taken per tick, so user actions interleave freely.
///
/// # Errors
///
/// Returns `SessionError::Sink` if the expiry submission cannot be delivered.
pub async fn run_countdown<T: Ticker>(
    service: &ExamLoopService,
    session: SharedSession,
    mut ticker: T,
) -> Result<CountdownEnd, SessionError> {
    loop {
        if !ticker.next_tick().await {
            debug!("countdown ticker closed");
            return Ok(CountdownEnd::TickerClosed);
        }

        let mut guard = session.lock().await;
        match service.tick(&mut guard).await? {
            TickOutcome::Running { .. } => {}
            TickOutcome::Expired(summary) => return Ok(CountdownEnd::Expired(summary)),
            TickOutcome::Idle => return Ok(CountdownEnd::AlreadySubmitted),
        }
    }
}
