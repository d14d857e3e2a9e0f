//! Event-kind time series
//!
//! [`ActivityWindow`] turns activity samples into one series per event kind,
//! keeping the most recent `points_to_show` points of each. Every known kind
//! gets a point on every sample (zero when absent), so the series stay
//! aligned and can be stacked. Kinds outside the known set join from their
//! first appearance onwards.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::Serialize;

use crate::config::ActivityConfig;
use crate::subscription::{SubscriptionId, Subscribers};
use crate::types::{ActivitySample, EventKind};

/// Series with fewer points than this are left out of snapshots.
const MIN_POINTS: usize = 2;

/// One observation of one event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActivityPoint {
    /// Epoch milliseconds
    pub timestamp: i64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivitySeries {
    pub kind: EventKind,
    pub points: Vec<ActivityPoint>,
}

/// Stackable view of the window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActivitySnapshot {
    /// Series with at least two points, known kinds first
    pub series: Vec<ActivitySeries>,
    /// `(oldest, latest)` epoch milliseconds to display
    pub x_domain: Option<(i64, i64)>,
    /// Largest stacked total at any one timestamp
    pub y_max: u64,
}

#[derive(Debug)]
struct Series {
    kind: EventKind,
    points: VecDeque<ActivityPoint>,
}

/// Sliding window of per-kind counts.
#[derive(Debug)]
pub struct ActivityWindow {
    points_to_show: usize,
    retention_ms: i64,
    series: Vec<Series>,
    index: HashMap<EventKind, usize>,
    latest: Option<i64>,
    subscribers: Subscribers<ActivitySnapshot>,
}

impl ActivityWindow {
    pub fn new(config: &ActivityConfig) -> Self {
        let series: Vec<Series> = EventKind::known()
            .map(|kind| Series {
                kind,
                points: VecDeque::with_capacity(config.points_to_show),
            })
            .collect();
        let index = series
            .iter()
            .enumerate()
            .map(|(i, s)| (s.kind.clone(), i))
            .collect();

        Self {
            points_to_show: config.points_to_show,
            retention_ms: config.retention_ms,
            series,
            index,
            latest: None,
            subscribers: Subscribers::new(),
        }
    }

    /// Append one sample to every tracked series.
    pub fn record(&mut self, sample: &ActivitySample) {
        for (kind, _) in &sample.counts {
            if !self.index.contains_key(kind) {
                tracing::debug!(kind = %kind, "Tracking new event kind");
                self.index.insert(kind.clone(), self.series.len());
                self.series.push(Series {
                    kind: kind.clone(),
                    points: VecDeque::with_capacity(self.points_to_show),
                });
            }
        }

        for series in self.series.iter_mut() {
            series.points.push_back(ActivityPoint {
                timestamp: sample.timestamp,
                count: sample.count_for(&series.kind),
            });
            while series.points.len() > self.points_to_show {
                series.points.pop_front();
            }
        }

        self.latest = Some(sample.timestamp);

        if !self.subscribers.is_empty() {
            let snapshot = self.snapshot();
            self.subscribers.notify(&snapshot);
        }
    }

    /// Range of timestamps to display.
    ///
    /// Once the window is full it starts at the oldest retained point;
    /// until then it reaches back `retention_ms` from the latest sample.
    pub fn x_domain(&self) -> Option<(i64, i64)> {
        let latest = self.latest?;
        let reference = self.series.first()?;
        let start = match reference.points.front() {
            Some(oldest) if reference.points.len() == self.points_to_show => oldest.timestamp,
            _ => latest.saturating_sub(self.retention_ms),
        };
        Some((start, latest))
    }

    /// Largest sum of counts across series sharing a timestamp.
    ///
    /// Saturates at `u64::MAX`.
    pub fn y_max(&self) -> u64 {
        let mut totals: BTreeMap<i64, u64> = BTreeMap::new();
        for series in &self.series {
            for point in &series.points {
                let total = totals.entry(point.timestamp).or_default();
                *total = total.saturating_add(point.count);
            }
        }
        totals.into_values().max().unwrap_or(0)
    }

    pub fn snapshot(&self) -> ActivitySnapshot {
        ActivitySnapshot {
            series: self
                .series
                .iter()
                .filter(|s| s.points.len() >= MIN_POINTS)
                .map(|s| ActivitySeries {
                    kind: s.kind.clone(),
                    points: s.points.iter().copied().collect(),
                })
                .collect(),
            x_domain: self.x_domain(),
            y_max: self.y_max(),
        }
    }

    /// Points currently retained for `kind`.
    pub fn points(&self, kind: &EventKind) -> Option<Vec<ActivityPoint>> {
        self.index
            .get(kind)
            .map(|&i| self.series[i].points.iter().copied().collect())
    }

    /// Number of series tracked, including ones with too few points to show.
    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    pub fn latest_timestamp(&self) -> Option<i64> {
        self.latest
    }

    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&ActivitySnapshot) + Send + 'static,
    {
        self.subscribers.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }
}
