//! HTTP polling event source
//!
//! Each poll issues a GET against the feed URL and publishes the response
//! body as one batch. Transient failures (connection errors, timeouts, 5xx)
//! are retried with exponential backoff before an error is published.
//!
//! [`PollSource::run`] polls on an interval. [`PollSource::stream_once`]
//! fetches a single time and leaves the pacing to the smoother, which suits
//! endpoints that always return the same data.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use tokio::sync::watch;

use crate::config::FeedConfig;
use crate::error::{Error, FeedError, Result};

use super::hub::{EventSource, FeedHub};
use super::SourceState;

const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// A failed fetch and whether it is worth retrying.
#[derive(Debug)]
struct FetchFailure {
    error: FeedError,
    retryable: bool,
}

/// Pull-based event source
pub struct PollSource {
    url: String,
    http_client: reqwest::Client,
    interval: Duration,
    max_retries: usize,
    hub: FeedHub,
    state: SourceState,
}

impl PollSource {
    /// Create a new poll source from configuration
    ///
    /// Returns an error if the URL is missing or the HTTP client cannot be built.
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let url = config.require_url()?.to_string();

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url,
            http_client,
            interval: config.poll_interval(),
            max_retries: config.max_retries,
            hub: FeedHub::new(config.category_key.clone()),
            state: SourceState::Idle,
        })
    }

    async fn fetch(&self) -> std::result::Result<String, FetchFailure> {
        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchFailure {
                error: FeedError::transport(format!("HTTP request failed: {}", e)),
                retryable: true,
            })?;

        let status = response.status();

        if status.is_success() {
            response.text().await.map_err(|e| FetchFailure {
                error: FeedError::transport(format!("failed to read response: {}", e)),
                retryable: true,
            })
        } else {
            Err(FetchFailure {
                error: FeedError::transport(format!("feed returned {}", status)),
                retryable: status.is_server_error(),
            })
        }
    }

    /// Fetch with retry logic
    ///
    /// Retries transient failures with exponential backoff.
    async fn fetch_with_retry(&self) -> std::result::Result<String, FeedError> {
        let mut delay = INITIAL_RETRY_DELAY;
        let mut attempt = 0;

        loop {
            match self.fetch().await {
                Ok(body) => return Ok(body),
                Err(failure) if failure.retryable && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::debug!(
                        url = %self.url,
                        error = %failure.error,
                        "Retrying feed poll (attempt {}/{}), waiting {:?}",
                        attempt + 1,
                        self.max_retries + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, MAX_RETRY_DELAY);
                }
                Err(failure) => return Err(failure.error),
            }
        }
    }

    fn publish(&mut self, outcome: std::result::Result<String, FeedError>) {
        match outcome {
            Ok(body) => self.hub.publish_payload(&body),
            Err(e) => self.hub.publish_error(e),
        }
    }

    /// Perform one poll and publish its outcome.
    pub async fn poll_once(&mut self) {
        let outcome = self.fetch_with_retry().await;
        self.publish(outcome);
    }

    /// Fetch once (with retries) unless `shutdown` fires first.
    ///
    /// Returns `None` when shut down mid-fetch.
    async fn fetch_or_shutdown(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<std::result::Result<String, FeedError>> {
        let wait_for_shutdown = async {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    return;
                }
            }
        };

        tokio::select! {
            outcome = self.fetch_with_retry() => Some(outcome),
            _ = wait_for_shutdown => None,
        }
    }

    /// Poll until `shutdown` flips to true (or its sender is dropped).
    ///
    /// Calling `run` on a source that is already running or stopped is a no-op.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if self.state != SourceState::Idle {
            tracing::info!(url = %self.url, state = ?self.state, "Poll source already started");
            return Ok(());
        }
        self.state = SourceState::Running;
        tracing::info!(url = %self.url, interval = ?self.interval, "Polling feed");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.fetch_or_shutdown(&mut shutdown).await {
                        Some(outcome) => self.publish(outcome),
                        None => break,
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.state = SourceState::Stopped;
        tracing::info!(url = %self.url, "Poll source stopped");
        Ok(())
    }

    /// Fetch the feed a single time and publish it as one batch.
    ///
    /// The source is stopped afterwards, so a second call is a no-op, as is
    /// calling it on a source that `run` already started.
    pub async fn stream_once(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if self.state != SourceState::Idle {
            tracing::info!(url = %self.url, state = ?self.state, "Stream source already started");
            return Ok(());
        }
        self.state = SourceState::Running;
        tracing::info!(url = %self.url, "Fetching feed once");

        if let Some(outcome) = self.fetch_or_shutdown(&mut shutdown).await {
            self.publish(outcome);
        }

        self.state = SourceState::Stopped;
        tracing::info!(url = %self.url, "Stream source finished");
        Ok(())
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    pub fn hub(&self) -> &FeedHub {
        &self.hub
    }
}

impl EventSource for PollSource {
    fn hub_mut(&mut self) -> &mut FeedHub {
        &mut self.hub
    }
}
