//! Burst smoothing
//!
//! Feeds deliver messages in bursts. [`RateSmoother`] buffers a burst and
//! hands items out one at a time so that a burst of `n` items drains over
//! roughly `window` rather than arriving all at once.
//!
//! ## Cadence
//!
//! The wait before the next emission is always `window / buffered`, computed
//! from the buffer length at the moment of scheduling:
//!
//! ```text
//! window = 10s, 5 buffered:  wait 2.0s -> emit (4 left)
//!                            wait 2.5s -> emit (3 left)
//!                            wait 3.3s -> emit (2 left)
//!                            wait 5.0s -> emit (1 left)
//!                            wait 10s  -> emit (idle)
//! ```
//!
//! New items arriving mid-drain replace the pending deadline with one based
//! on the new length. There is never more than one pending deadline.
//!
//! [`RateSmoother`] itself is a plain state machine driven by explicit
//! instants, which keeps it deterministic. [`spawn_smoother`] runs one on a
//! tokio task and invokes a callback per emitted item.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::error::{Error, Result};

/// Lifecycle of a smoother.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmootherState {
    /// Nothing buffered, no deadline pending
    Idle,
    /// Items buffered and exactly one deadline pending
    Running,
    /// Stopped for good; the buffer was discarded
    Stopped,
}

/// Smoothing counters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SmootherStats {
    /// Items accepted by `ingest`
    pub ingested: usize,
    /// Items handed out by `poll_tick`
    pub emitted: usize,
    /// Items thrown away by `stop`
    pub discarded: usize,
    /// Times a pending deadline was replaced by `ingest`
    pub reschedules: usize,
}

/// FIFO buffer with an adaptive drain deadline.
#[derive(Debug)]
pub struct RateSmoother<T> {
    window: Duration,
    buffer: VecDeque<T>,
    state: SmootherState,
    next_tick: Option<Instant>,
    stats: SmootherStats,
}

impl<T> RateSmoother<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            buffer: VecDeque::new(),
            state: SmootherState::Idle,
            next_tick: None,
            stats: SmootherStats::default(),
        }
    }

    /// Append a batch and (re)schedule the next emission.
    ///
    /// An empty batch changes nothing. Returns the pending deadline.
    pub fn ingest<I>(&mut self, batch: I, now: Instant) -> Result<Option<Instant>>
    where
        I: IntoIterator<Item = T>,
    {
        if self.state == SmootherState::Stopped {
            return Err(Error::SmootherStopped);
        }

        let before = self.buffer.len();
        self.buffer.extend(batch);
        let added = self.buffer.len() - before;
        if added == 0 {
            return Ok(self.next_tick);
        }

        self.stats.ingested += added;
        if self.next_tick.is_some() {
            self.stats.reschedules += 1;
        }
        self.state = SmootherState::Running;
        self.schedule(now);

        tracing::trace!(
            added,
            buffered = self.buffer.len(),
            "Smoother rescheduled"
        );

        Ok(self.next_tick)
    }

    /// Begin draining whatever is buffered.
    ///
    /// Idempotent: a running smoother keeps its current deadline and a
    /// stopped one stays stopped.
    pub fn start(&mut self, now: Instant) -> Option<Instant> {
        if self.state == SmootherState::Idle && !self.buffer.is_empty() {
            self.state = SmootherState::Running;
            self.schedule(now);
        }
        self.next_tick
    }

    /// Emit the front item if its deadline has passed.
    ///
    /// Schedules the following emission from the remaining length, or goes
    /// idle when the buffer is empty.
    pub fn poll_tick(&mut self, now: Instant) -> Option<T> {
        if self.state != SmootherState::Running {
            return None;
        }
        match self.next_tick {
            Some(deadline) if deadline <= now => {}
            _ => return None,
        }

        let item = self.buffer.pop_front();
        if item.is_some() {
            self.stats.emitted += 1;
        }

        if self.buffer.is_empty() {
            self.next_tick = None;
            self.state = SmootherState::Idle;
        } else {
            self.schedule(now);
        }

        item
    }

    /// Stop for good, discarding the buffer. Returns the number discarded.
    pub fn stop(&mut self) -> usize {
        let discarded = self.buffer.len();
        self.buffer.clear();
        self.next_tick = None;
        self.state = SmootherState::Stopped;
        self.stats.discarded += discarded;
        discarded
    }

    /// Wait that would be scheduled for the current buffer length.
    pub fn interval(&self) -> Option<Duration> {
        match self.buffer.len() {
            0 => None,
            len => Some(match u32::try_from(len) {
                Ok(n) => self.window / n,
                Err(_) => self.window.div_f64(len as f64),
            }),
        }
    }

    fn schedule(&mut self, now: Instant) {
        self.next_tick = self.interval().map(|wait| now + wait);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_tick
    }

    pub fn state(&self) -> SmootherState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn stats(&self) -> &SmootherStats {
        &self.stats
    }
}

// ============================================
// Async driver
// ============================================

enum Command<T> {
    Ingest(Vec<T>),
    Start,
    Stop,
}

/// Cloneable sender side of a spawned smoother.
pub struct SmootherHandle<T> {
    tx: mpsc::UnboundedSender<Command<T>>,
}

impl<T> Clone for SmootherHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> SmootherHandle<T> {
    /// Queue a batch for smoothing.
    pub fn ingest(&self, batch: Vec<T>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.tx
            .send(Command::Ingest(batch))
            .map_err(|_| Error::SmootherStopped)
    }

    /// Idempotent; the first `ingest` starts draining anyway.
    pub fn start(&self) -> Result<()> {
        self.tx
            .send(Command::Start)
            .map_err(|_| Error::SmootherStopped)
    }

    /// Stop the driver and discard anything still buffered.
    ///
    /// Stopping an already stopped smoother is not an error.
    pub fn stop(&self) {
        let _ = self.tx.send(Command::Stop);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Run a smoother on a tokio task, calling `on_item` once per emitted item.
///
/// The task ends when [`SmootherHandle::stop`] is called or every handle is
/// dropped, and yields the final counters.
pub fn spawn_smoother<T, F>(
    window: Duration,
    on_item: F,
) -> (SmootherHandle<T>, JoinHandle<SmootherStats>)
where
    T: Send + 'static,
    F: FnMut(T) + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(drive(RateSmoother::new(window), rx, on_item));
    (SmootherHandle { tx }, task)
}

async fn drive<T, F>(
    mut smoother: RateSmoother<T>,
    mut rx: mpsc::UnboundedReceiver<Command<T>>,
    mut on_item: F,
) -> SmootherStats
where
    F: FnMut(T),
{
    loop {
        let deadline = smoother.next_deadline();

        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Ingest(batch)) => {
                    if let Err(e) = smoother.ingest(batch, Instant::now()) {
                        tracing::debug!(error = %e, "Dropped batch");
                    }
                }
                Some(Command::Start) => {
                    smoother.start(Instant::now());
                }
                Some(Command::Stop) | None => {
                    let discarded = smoother.stop();
                    tracing::info!(discarded, "Rate smoother stopped");
                    break;
                }
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if let Some(item) = smoother.poll_tick(Instant::now()) {
                    on_item(item);
                }
            }
        }
    }

    smoother.stats().clone()
}
