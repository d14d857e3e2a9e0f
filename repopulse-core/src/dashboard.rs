//! Composition root for the aggregators
//!
//! A [`Dashboard`] owns one of each aggregator and routes classified feed
//! messages to the right one:
//!
//! | Message | Destination |
//! |---------|-------------|
//! | `CategoryCount` | [`RankedAggregator`] and [`RecentItems`] |
//! | `Duration` | [`BoxStatsAggregator`] |
//! | `Activity` | [`ActivityWindow`] |
//!
//! It holds no locks itself; callers that share it across tasks wrap it
//! (see [`crate::runtime`]).

use serde::Serialize;

use crate::activity::{ActivitySnapshot, ActivityWindow};
use crate::box_stats::{BoxStatsAggregator, BoxStatsSnapshot, BoxSummary};
use crate::config::Config;
use crate::ranking::{RankedAggregator, RankingSnapshot};
use crate::recent::{RecentEntry, RecentItems};
use crate::types::{CategoryCount, FeedMessage};

/// What happened to one routed message.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// Category count applied; carries the category's new rank
    Ranked { rank: usize },
    /// Duration sample added; `None` until the category has two samples
    Sampled(Option<BoxSummary>),
    /// Activity sample appended to the time series
    Recorded,
    /// Message dropped (open pull request, reversed or invalid duration)
    Discarded,
}

/// Per-destination message counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteStats {
    pub ranked: u64,
    pub sampled: u64,
    pub recorded: u64,
    pub discarded: u64,
}

impl RouteStats {
    pub fn total(&self) -> u64 {
        self.ranked + self.sampled + self.recorded + self.discarded
    }
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub ranking: RankingSnapshot,
    pub box_stats: BoxStatsSnapshot,
    pub activity: ActivitySnapshot,
    pub recent: Vec<RecentEntry<CategoryCount>>,
    pub stats: RouteStats,
}

#[derive(Debug)]
pub struct Dashboard {
    ranking: RankedAggregator,
    box_stats: BoxStatsAggregator,
    activity: ActivityWindow,
    recent: RecentItems<CategoryCount>,
    stats: RouteStats,
}

impl Dashboard {
    pub fn new(config: &Config) -> Self {
        Self {
            ranking: RankedAggregator::new(config.ranking.display_limit),
            box_stats: BoxStatsAggregator::new(),
            activity: ActivityWindow::new(&config.activity),
            recent: RecentItems::new(config.recent.capacity),
            stats: RouteStats::default(),
        }
    }

    /// Dispatch one message to its aggregator.
    pub fn route(&mut self, message: FeedMessage) -> RouteOutcome {
        let outcome = match message {
            FeedMessage::CategoryCount(count) => {
                let rank = self.ranking.observe(&count.category, count.count);
                self.recent.push(count);
                RouteOutcome::Ranked { rank }
            }
            FeedMessage::Duration(event) => {
                let discarded_before = self.box_stats.discarded();
                match self.box_stats.add_duration_event(&event) {
                    Ok(_) if self.box_stats.discarded() > discarded_before => {
                        RouteOutcome::Discarded
                    }
                    Ok(summary) => RouteOutcome::Sampled(summary),
                    Err(e) => {
                        tracing::warn!(category = %event.category, error = %e, "Rejected duration sample");
                        RouteOutcome::Discarded
                    }
                }
            }
            FeedMessage::Activity(sample) => {
                self.activity.record(&sample);
                RouteOutcome::Recorded
            }
        };

        match &outcome {
            RouteOutcome::Ranked { .. } => self.stats.ranked += 1,
            RouteOutcome::Sampled(_) => self.stats.sampled += 1,
            RouteOutcome::Recorded => self.stats.recorded += 1,
            RouteOutcome::Discarded => self.stats.discarded += 1,
        }

        outcome
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            ranking: self.ranking.snapshot(),
            box_stats: self.box_stats.snapshot(),
            activity: self.activity.snapshot(),
            recent: self.recent.snapshot(),
            stats: self.stats.clone(),
        }
    }

    pub fn ranking(&self) -> &RankedAggregator {
        &self.ranking
    }

    pub fn ranking_mut(&mut self) -> &mut RankedAggregator {
        &mut self.ranking
    }

    pub fn box_stats(&self) -> &BoxStatsAggregator {
        &self.box_stats
    }

    pub fn box_stats_mut(&mut self) -> &mut BoxStatsAggregator {
        &mut self.box_stats
    }

    pub fn activity(&self) -> &ActivityWindow {
        &self.activity
    }

    pub fn activity_mut(&mut self) -> &mut ActivityWindow {
        &mut self.activity
    }

    pub fn recent(&self) -> &RecentItems<CategoryCount> {
        &self.recent
    }

    pub fn stats(&self) -> &RouteStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActivitySample, DurationEvent, EventKind, KnownEventKind};
    use chrono::{TimeZone, Utc};

    fn count(category: &str, count: u64) -> FeedMessage {
        FeedMessage::CategoryCount(CategoryCount {
            category: category.to_string(),
            count,
        })
    }

    fn closed_pr(category: &str, seconds_open: i64) -> FeedMessage {
        FeedMessage::Duration(DurationEvent {
            category: category.to_string(),
            created_at: Utc.timestamp_opt(0, 0).single(),
            closed_at: Utc.timestamp_opt(seconds_open, 0).single(),
        })
    }

    #[test]
    fn test_routes_by_message_kind() {
        let mut dashboard = Dashboard::new(&Config::default());

        assert_eq!(dashboard.route(count("Rust", 2)), RouteOutcome::Ranked { rank: 0 });
        assert_eq!(dashboard.route(count("Go", 3)), RouteOutcome::Ranked { rank: 0 });

        assert_eq!(dashboard.route(closed_pr("Rust", 10)), RouteOutcome::Sampled(None));
        assert!(matches!(
            dashboard.route(closed_pr("Rust", 20)),
            RouteOutcome::Sampled(Some(_))
        ));

        let activity = FeedMessage::Activity(ActivitySample {
            timestamp: 1,
            counts: vec![(EventKind::Known(KnownEventKind::PushEvent), 1)],
        });
        assert_eq!(dashboard.route(activity), RouteOutcome::Recorded);

        let stats = dashboard.stats();
        assert_eq!((stats.ranked, stats.sampled, stats.recorded), (2, 2, 1));
        assert_eq!(stats.total(), 5);
        assert_eq!(dashboard.ranking().get("Rust").unwrap().rank, 1);
        assert_eq!(dashboard.recent().len(), 2);
    }

    #[test]
    fn test_open_pull_request_discarded() {
        let mut dashboard = Dashboard::new(&Config::default());
        let open = FeedMessage::Duration(DurationEvent {
            category: "Rust".to_string(),
            created_at: Utc.timestamp_opt(0, 0).single(),
            closed_at: None,
        });

        assert_eq!(dashboard.route(open), RouteOutcome::Discarded);
        assert_eq!(dashboard.stats().discarded, 1);
        assert_eq!(dashboard.box_stats().category_count(), 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut dashboard = Dashboard::new(&Config::default());
        dashboard.route(count("Rust", 1));

        let json = serde_json::to_value(dashboard.snapshot()).unwrap();
        assert_eq!(json["ranking"]["entries"][0]["category"], "Rust");
        assert_eq!(json["recent"][0]["item"]["count"], 1);
        assert_eq!(json["stats"]["ranked"], 1);
    }
}
