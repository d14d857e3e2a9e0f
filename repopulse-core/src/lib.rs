//! # repopulse-core
//!
//! Core library for repopulse - a live repository activity dashboard.
//!
//! This library provides:
//! - Feed sources (WebSocket push, HTTP poll) and payload classification
//! - A rate smoother that paces bursty batches into a steady trickle
//! - Incremental aggregators: ranked counts, box-plot statistics,
//!   event-kind time series, and a recent-items window
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Data flows one message at a time:
//! - **Feed:** sources publish parsed batches (or errors) to subscribers
//! - **Smoother:** batches are buffered and released at `window / buffered`
//! - **Dashboard:** each released message updates exactly one aggregator
//!
//! ## Example
//!
//! ```rust,no_run
//! use repopulse_core::{Config, Dashboard};
//! use repopulse_core::feed::parse_batch;
//!
//! let config = Config::load().expect("failed to load config");
//! let mut dashboard = Dashboard::new(&config);
//!
//! let batch = parse_batch(r#"[{"language": "Rust", "count": 3}]"#, "language")
//!     .expect("valid payload");
//! for message in batch {
//!     dashboard.route(message);
//! }
//! println!("{:?}", dashboard.snapshot().ranking);
//! ```

// Re-export commonly used items at the crate root
pub use box_stats::{BoxStatsAggregator, BoxSummary};
pub use config::Config;
pub use dashboard::{Dashboard, DashboardSnapshot, RouteOutcome};
pub use error::{Error, FeedError, Result};
pub use ranking::{CategoryState, RankedAggregator};
pub use runtime::{spawn_pipeline, PipelineHandle};
pub use smoother::{RateSmoother, SmootherState};
pub use types::*;

// Public modules
pub mod activity;
pub mod box_stats;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod feed;
pub mod logging;
pub mod ranking;
pub mod recent;
pub mod runtime;
pub mod smoother;
pub mod subscription;
pub mod types;
