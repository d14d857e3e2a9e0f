//! Event feed boundary
//!
//! Everything that touches raw transport payloads lives here. The rest of
//! the crate only sees classified [`FeedMessage`](crate::types::FeedMessage)
//! batches or [`FeedError`](crate::error::FeedError)s.
//!
//! ## Architecture
//!
//! ```text
//! SocketSource ─┐
//!               ├─► FeedHub ──► subscribers (FeedSignal::Batch | FeedSignal::Error)
//! PollSource ───┘     │
//!                     └─ parse_batch()
//! ```
//!
//! Sources own retries. Subscribers never see a partially parsed batch.

mod hub;
mod parse;
mod poll;
mod socket;

pub use hub::{EventSource, FeedHub, FeedSignal, FeedStats};
pub use parse::{parse_batch, parse_message, parse_value};
pub use poll::PollSource;
pub use socket::SocketSource;

/// Lifecycle of an event source.
///
/// `Idle -> Running -> Stopped`; a stopped source is never restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Idle,
    Running,
    Stopped,
}
