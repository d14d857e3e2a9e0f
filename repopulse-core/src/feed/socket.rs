//! WebSocket push event source
//!
//! Connects to the feed, sends the configured start message, and publishes
//! every text frame as one batch. Connection failures are retried with
//! exponential backoff up to `max_retries` times; a close from the server
//! ends the run.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;

use crate::config::FeedConfig;
use crate::error::{FeedError, Result};

use super::hub::{EventSource, FeedHub};
use super::SourceState;

const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// How one connection ended.
#[derive(Debug, PartialEq, Eq)]
enum StreamEnd {
    /// Shutdown was requested locally
    Shutdown,
    /// The server closed the connection
    Closed,
}

/// Push-based event source
pub struct SocketSource {
    url: String,
    start_message: String,
    max_retries: usize,
    hub: FeedHub,
    state: SourceState,
}

impl SocketSource {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        Ok(Self {
            url: config.require_url()?.to_string(),
            start_message: config.start_message.clone(),
            max_retries: config.max_retries,
            hub: FeedHub::new(config.category_key.clone()),
            state: SourceState::Idle,
        })
    }

    async fn stream_once(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> std::result::Result<StreamEnd, FeedError> {
        let (ws, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| FeedError::transport(format!("connect failed: {}", e)))?;
        tracing::info!(url = %self.url, "Connection opened");

        let (mut write, mut read) = ws.split();

        if !self.start_message.is_empty() {
            write
                .send(Message::Text(self.start_message.clone().into()))
                .await
                .map_err(|e| FeedError::transport(format!("send failed: {}", e)))?;
        }

        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.hub.publish_payload(text.as_str()),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => self.hub.publish_payload(text),
                        Err(e) => self
                            .hub
                            .publish_error(FeedError::parse(format!("binary frame is not UTF-8: {}", e))),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!(url = %self.url, "Connection closed");
                        return Ok(StreamEnd::Closed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return Err(FeedError::transport(format!("read failed: {}", e)));
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(StreamEnd::Shutdown);
                    }
                }
            }
        }
    }

    /// Stream until shutdown, server close, or retries are exhausted.
    ///
    /// Calling `run` on a source that is already running or stopped is a no-op.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if self.state != SourceState::Idle {
            tracing::info!(url = %self.url, state = ?self.state, "Socket source already started");
            return Ok(());
        }
        self.state = SourceState::Running;

        let mut delay = INITIAL_RETRY_DELAY;
        let mut failures = 0;

        while !*shutdown.borrow() {
            match self.stream_once(&mut shutdown).await {
                Ok(StreamEnd::Shutdown) => break,
                Ok(StreamEnd::Closed) => {
                    self.hub.publish_error(FeedError::Closed);
                    break;
                }
                Err(e) => {
                    self.hub.publish_error(e);
                    if failures >= self.max_retries {
                        tracing::warn!(url = %self.url, failures, "Giving up on feed connection");
                        break;
                    }
                    failures += 1;
                    tracing::debug!(url = %self.url, "Reconnecting in {:?}", delay);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => {}
                    }
                    delay = std::cmp::min(delay * 2, MAX_RETRY_DELAY);
                }
            }
        }

        self.state = SourceState::Stopped;
        Ok(())
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    pub fn hub(&self) -> &FeedHub {
        &self.hub
    }
}

impl EventSource for SocketSource {
    fn hub_mut(&mut self) -> &mut FeedHub {
        &mut self.hub
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_source_requires_url() {
        assert!(SocketSource::new(&FeedConfig::default()).is_err());
    }
}
