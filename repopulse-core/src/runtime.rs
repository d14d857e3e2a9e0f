//! Pipeline wiring
//!
//! Connects an event source to a [`Dashboard`] through a [`RateSmoother`]:
//!
//! ```text
//! source hub ──Batch──► smoother task ──one message per tick──► Arc<Mutex<Dashboard>>
//!            └─Error──► caller's error handler
//! ```
//!
//! The dashboard is only ever mutated from the smoother task, one message
//! at a time. Readers take the same lock for snapshots.
//!
//! [`RateSmoother`]: crate::smoother::RateSmoother

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{Config, FeedConfig, FeedMode};
use crate::dashboard::{Dashboard, DashboardSnapshot};
use crate::error::{Error, FeedError, Result};
use crate::feed::{EventSource, FeedSignal, FeedStats, PollSource, SocketSource};
use crate::smoother::{spawn_smoother, SmootherHandle, SmootherStats};
use crate::types::FeedMessage;

/// Running pipeline: smoother task plus the dashboard it feeds.
pub struct PipelineHandle {
    smoother: SmootherHandle<FeedMessage>,
    dashboard: Arc<Mutex<Dashboard>>,
    ingested: Arc<AtomicU64>,
    routed: Arc<AtomicU64>,
    task: JoinHandle<SmootherStats>,
}

/// Build a dashboard from `config` and start its smoother task.
///
/// Must be called from within a tokio runtime.
pub fn spawn_pipeline(config: &Config) -> PipelineHandle {
    let dashboard = Arc::new(Mutex::new(Dashboard::new(config)));
    let routed = Arc::new(AtomicU64::new(0));

    let sink = Arc::clone(&dashboard);
    let counter = Arc::clone(&routed);
    let (smoother, task) = spawn_smoother(config.smoother.window(), move |message: FeedMessage| {
        let outcome = lock(&sink).route(message);
        counter.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(?outcome, "Routed message");
    });

    tracing::info!(
        window_ms = config.smoother.window_ms,
        display_limit = config.ranking.display_limit,
        "Pipeline started"
    );

    PipelineHandle {
        smoother,
        dashboard,
        ingested: Arc::new(AtomicU64::new(0)),
        routed,
        task,
    }
}

/// A poisoned lock only means a subscriber panicked mid-notify; the
/// aggregator state itself is still consistent.
fn lock(dashboard: &Mutex<Dashboard>) -> MutexGuard<'_, Dashboard> {
    dashboard.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PipelineHandle {
    /// Queue a batch for smoothed delivery to the dashboard.
    pub fn ingest(&self, batch: Vec<FeedMessage>) -> Result<()> {
        let len = batch.len() as u64;
        self.smoother.ingest(batch)?;
        self.ingested.fetch_add(len, Ordering::SeqCst);
        Ok(())
    }

    /// Handler to subscribe to an event source.
    ///
    /// Batches go to the smoother; errors go to `on_error` and never reach
    /// the buffer.
    pub fn feed_handler<F>(&self, mut on_error: F) -> impl FnMut(&FeedSignal) + Send + 'static
    where
        F: FnMut(&FeedError) + Send + 'static,
    {
        let smoother = self.smoother.clone();
        let ingested = Arc::clone(&self.ingested);
        move |signal: &FeedSignal| match signal {
            FeedSignal::Batch(batch) => {
                let len = batch.len() as u64;
                match smoother.ingest(batch.clone()) {
                    Ok(()) => {
                        ingested.fetch_add(len, Ordering::SeqCst);
                    }
                    Err(e) => tracing::debug!(error = %e, "Batch arrived after shutdown"),
                }
            }
            FeedSignal::Error(e) => on_error(e),
        }
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        lock(&self.dashboard).snapshot()
    }

    /// Run `f` with exclusive access to the dashboard.
    pub fn with_dashboard<R>(&self, f: impl FnOnce(&mut Dashboard) -> R) -> R {
        f(&mut lock(&self.dashboard))
    }

    /// Messages accepted into the smoother so far.
    pub fn ingested(&self) -> u64 {
        self.ingested.load(Ordering::SeqCst)
    }

    /// Messages delivered to the dashboard so far.
    pub fn routed(&self) -> u64 {
        self.routed.load(Ordering::SeqCst)
    }

    /// Messages still waiting in the smoother.
    pub fn pending(&self) -> u64 {
        self.ingested().saturating_sub(self.routed())
    }

    /// Stop the smoother, discarding anything still buffered.
    pub async fn shutdown(self) -> Result<SmootherStats> {
        self.smoother.stop();
        let stats = self
            .task
            .await
            .map_err(|e| Error::Task(format!("smoother task: {}", e)))?;
        tracing::info!(
            emitted = stats.emitted,
            discarded = stats.discarded,
            "Pipeline stopped"
        );
        Ok(stats)
    }
}

/// Connect to the configured feed and pump it into `pipeline` until
/// `shutdown` flips to true or the source gives up.
///
/// In stream mode this returns after the single fetch; the smoother keeps
/// draining the batch afterwards.
pub async fn run_feed<F>(
    config: &FeedConfig,
    pipeline: &PipelineHandle,
    on_error: F,
    shutdown: watch::Receiver<bool>,
) -> Result<FeedStats>
where
    F: FnMut(&FeedError) + Send + 'static,
{
    let handler = pipeline.feed_handler(on_error);

    match config.mode {
        FeedMode::Poll => {
            let mut source = PollSource::new(config)?;
            source.subscribe(handler);
            source.run(shutdown).await?;
            Ok(source.hub().stats().clone())
        }
        FeedMode::Stream => {
            let mut source = PollSource::new(config)?;
            source.subscribe(handler);
            source.stream_once(shutdown).await?;
            Ok(source.hub().stats().clone())
        }
        FeedMode::Socket => {
            let mut source = SocketSource::new(config)?;
            source.subscribe(handler);
            source.run(shutdown).await?;
            Ok(source.hub().stats().clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CategoryCount;
    use std::time::Duration;

    fn config(window_ms: u64) -> Config {
        let mut config = Config::default();
        config.smoother.window_ms = window_ms;
        config
    }

    fn counts(categories: &[&str]) -> Vec<FeedMessage> {
        categories
            .iter()
            .map(|c| {
                FeedMessage::CategoryCount(CategoryCount {
                    category: c.to_string(),
                    count: 1,
                })
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_drains_into_dashboard() {
        let pipeline = spawn_pipeline(&config(4_000));
        pipeline.ingest(counts(&["Rust", "Go", "Rust", "C"])).unwrap();
        assert_eq!(pipeline.pending(), 4);

        // 1s + 1.33s + 2s + 4s
        tokio::time::sleep(Duration::from_millis(8_500)).await;

        assert_eq!(pipeline.routed(), 4);
        let snapshot = pipeline.snapshot();
        assert_eq!(snapshot.ranking.entries[0].category, "Rust");
        assert_eq!(snapshot.ranking.entries[0].count, 2);
        assert_eq!(snapshot.recent.len(), 4);

        let stats = pipeline.shutdown().await.unwrap();
        assert_eq!(stats.emitted, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_errors_bypass_buffer() {
        let pipeline = spawn_pipeline(&config(1_000));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        let mut handler = pipeline.feed_handler(move |e: &FeedError| {
            sink.lock().unwrap().push(e.clone());
        });

        handler(&FeedSignal::Error(FeedError::Closed));
        handler(&FeedSignal::Batch(counts(&["Rust"])));

        assert_eq!(*errors.lock().unwrap(), vec![FeedError::Closed]);
        assert_eq!(pipeline.ingested(), 1);

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(pipeline.routed(), 1);
        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_discards_pending() {
        let pipeline = spawn_pipeline(&config(10_000));
        pipeline.ingest(counts(&["a", "b", "c"])).unwrap();

        let stats = pipeline.shutdown().await.unwrap();
        assert_eq!(stats.emitted, 0);
        assert_eq!(stats.discarded, 3);
    }
}
