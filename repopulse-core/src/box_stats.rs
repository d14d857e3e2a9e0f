//! Incremental box-plot statistics
//!
//! [`BoxStatsAggregator`] collects duration samples per category and
//! recomputes that category's [`BoxSummary`] after every insertion.
//!
//! ## Quartiles
//!
//! Quartiles are picked by index from the sorted samples, not interpolated:
//!
//! | Statistic | Index into sorted `s` (n samples) |
//! |-----------|-----------------------------------|
//! | median | `(n-1)/2` |
//! | q1 | `(n-1)/4` |
//! | q3 | `3(n-1)/4`, advanced by one when it equals q1 and a next sample exists |
//!
//! Fences sit 1.5 IQR outside the quartiles. Samples outside the fences are
//! outliers; the whiskers span the remaining samples.
//!
//! Recomputing is O(n log n) per insertion in the size of one category.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::subscription::{SubscriptionId, Subscribers};
use crate::types::DurationEvent;

/// Fewer samples than this produce no summary.
pub const MIN_SAMPLES: usize = 2;

const FENCE_FACTOR: f64 = 1.5;

/// Box-plot digest of one category's samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxSummary {
    pub category: String,
    pub sample_count: usize,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
    pub lower_fence: f64,
    pub upper_fence: f64,
    /// Smallest sample inside the fences
    pub lower_bound: f64,
    /// Largest sample inside the fences
    pub upper_bound: f64,
    /// Samples outside the fences, ascending
    pub outliers: Vec<f64>,
}

/// Compute the summary for `samples`, in any order.
///
/// Returns `None` for fewer than [`MIN_SAMPLES`] samples.
pub fn summarize(category: &str, samples: &[f64]) -> Option<BoxSummary> {
    if samples.len() < MIN_SAMPLES {
        return None;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    let last = n - 1;

    let median = sorted[last / 2];
    let q1 = sorted[last / 4];
    let q3_index = 3 * last / 4;
    let mut q3 = sorted[q3_index];
    if q3 == q1 {
        if let Some(&next) = sorted.get(q3_index + 1) {
            q3 = next;
        }
    }

    let iqr = q3 - q1;
    let lower_fence = q1 - FENCE_FACTOR * iqr;
    let upper_fence = q3 + FENCE_FACTOR * iqr;

    let (in_range, outliers): (Vec<f64>, Vec<f64>) = sorted
        .iter()
        .partition(|&&s| s >= lower_fence && s <= upper_fence);

    // q1 and q3 are themselves samples inside the fences, so in_range is never empty
    let lower_bound = in_range.first().copied().unwrap_or(q1);
    let upper_bound = in_range.last().copied().unwrap_or(q3);

    Some(BoxSummary {
        category: category.to_string(),
        sample_count: n,
        min: sorted[0],
        max: sorted[last],
        median,
        q1,
        q3,
        lower_fence,
        upper_fence,
        lower_bound,
        upper_bound,
        outliers,
    })
}

// ============================================
// Aggregator
// ============================================

#[derive(Debug)]
struct SampleGroup {
    samples: Vec<f64>,
    summary: Option<BoxSummary>,
    updated_this_tick: bool,
}

/// A summary plus its ping flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxEntry {
    #[serde(flatten)]
    pub summary: BoxSummary,
    pub updated_this_tick: bool,
}

/// Every category with a summary.
///
/// Ordered by sample count descending, then category name ascending.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoxStatsSnapshot {
    pub entries: Vec<BoxEntry>,
    /// Events dropped because they were still open or malformed
    pub discarded: u64,
}

/// Per-category duration samples with live box summaries.
#[derive(Debug, Default)]
pub struct BoxStatsAggregator {
    groups: HashMap<String, SampleGroup>,
    discarded: u64,
    subscribers: Subscribers<BoxStatsSnapshot>,
}

impl BoxStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one duration (milliseconds) for `category`.
    ///
    /// Returns the recomputed summary, or `None` while the category has
    /// fewer than two samples. Subscribers are only notified when a summary
    /// was produced.
    pub fn add_sample(&mut self, category: &str, duration: f64) -> Result<Option<BoxSummary>> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(Error::InvalidSample {
                category: category.to_string(),
                value: duration,
            });
        }

        for group in self.groups.values_mut() {
            group.updated_this_tick = false;
        }

        let group = self
            .groups
            .entry(category.to_string())
            .or_insert_with(|| SampleGroup {
                samples: Vec::new(),
                summary: None,
                updated_this_tick: false,
            });
        group.samples.push(duration);
        group.updated_this_tick = true;
        group.summary = summarize(category, &group.samples);

        let summary = group.summary.clone();
        if summary.is_some() && !self.subscribers.is_empty() {
            let snapshot = self.snapshot();
            self.subscribers.notify(&snapshot);
        }

        Ok(summary)
    }

    /// Record the open-to-close latency of `event`.
    ///
    /// Events that are still open (or never opened) are dropped without
    /// error. A close before the open is dropped with a warning.
    pub fn add_duration_event(&mut self, event: &DurationEvent) -> Result<Option<BoxSummary>> {
        let (Some(created), Some(closed)) = (event.created_at, event.closed_at) else {
            self.discarded += 1;
            return Ok(None);
        };

        match event.duration_ms() {
            Some(duration) => self.add_sample(&event.category, duration),
            None => {
                tracing::warn!(
                    category = %event.category,
                    created_at = %created,
                    closed_at = %closed,
                    "Discarding event closed before it was created"
                );
                self.discarded += 1;
                Ok(None)
            }
        }
    }

    /// Current summaries for every category with at least two samples.
    pub fn snapshot(&self) -> BoxStatsSnapshot {
        let mut entries: Vec<BoxEntry> = self
            .groups
            .values()
            .filter_map(|group| {
                group.summary.as_ref().map(|summary| BoxEntry {
                    summary: summary.clone(),
                    updated_this_tick: group.updated_this_tick,
                })
            })
            .collect();

        entries.sort_by(|a, b| {
            b.summary
                .sample_count
                .cmp(&a.summary.sample_count)
                .then_with(|| a.summary.category.cmp(&b.summary.category))
        });

        BoxStatsSnapshot {
            entries,
            discarded: self.discarded,
        }
    }

    pub fn summary(&self, category: &str) -> Option<&BoxSummary> {
        self.groups.get(category)?.summary.as_ref()
    }

    /// Raw samples for `category` in arrival order.
    pub fn samples(&self, category: &str) -> Option<&[f64]> {
        self.groups.get(category).map(|g| g.samples.as_slice())
    }

    /// Number of categories seen, with or without a summary.
    pub fn category_count(&self) -> usize {
        self.groups.len()
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&BoxStatsSnapshot) + Send + 'static,
    {
        self.subscribers.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_five_sample_summary() {
        let summary = summarize("Rust", &[5.0, 1.0, 3.0, 9.0, 2.0]).unwrap();

        assert_eq!(summary.median, 3.0);
        assert_eq!(summary.q1, 2.0);
        assert_eq!(summary.q3, 5.0);
        assert_eq!(summary.lower_fence, -2.5);
        assert_eq!(summary.upper_fence, 9.5);
        assert!(summary.outliers.is_empty());
        assert_eq!(summary.lower_bound, 1.0);
        assert_eq!(summary.upper_bound, 9.0);
        assert_eq!((summary.min, summary.max), (1.0, 9.0));
    }

    #[test]
    fn test_single_sample_has_no_summary() {
        assert!(summarize("Rust", &[]).is_none());
        assert!(summarize("Rust", &[4.0]).is_none());
    }

    #[test]
    fn test_two_samples() {
        // last = 1: median, q1, q3 all at index 0; q3 advances to index 1
        let summary = summarize("Go", &[7.0, 3.0]).unwrap();
        assert_eq!(summary.q1, 3.0);
        assert_eq!(summary.median, 3.0);
        assert_eq!(summary.q3, 7.0);
        assert!(summary.outliers.is_empty());
        assert_eq!((summary.lower_bound, summary.upper_bound), (3.0, 7.0));
    }

    #[test]
    fn test_equal_quartiles_advance_q3() {
        // last = 2: q1 = s[0] = 4, q3 = s[1] = 4 -> advanced to s[2] = 10
        let summary = summarize("Go", &[4.0, 10.0, 4.0]).unwrap();
        assert_eq!(summary.q1, 4.0);
        assert_eq!(summary.median, 4.0);
        assert_eq!(summary.q3, 10.0);
    }

    #[test]
    fn test_equal_quartiles_at_end_stay_put() {
        let summary = summarize("Go", &[2.0, 2.0]).unwrap();
        assert_eq!((summary.q1, summary.q3), (2.0, 2.0));
        assert_eq!(summary.lower_fence, 2.0);
        assert_eq!(summary.upper_fence, 2.0);
        assert!(summary.outliers.is_empty());

        let summary = summarize("Go", &[1.0, 1.0, 1.0, 1.0, 1.0]).unwrap();
        assert_eq!((summary.q1, summary.median, summary.q3), (1.0, 1.0, 1.0));
    }

    #[test]
    fn test_outliers_partition_samples() {
        let samples = [1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 100.0];
        let summary = summarize("Ruby", &samples).unwrap();

        // q1 = s[1] = 2, q3 = s[4] = 3, IQR = 1, fences [0.5, 4.5]
        assert_eq!(summary.outliers, vec![100.0]);
        assert_eq!(summary.upper_bound, 4.0);
        assert_eq!(summary.max, 100.0);
        assert!(summary.lower_bound <= summary.upper_bound);
        assert!(summary.q1 <= summary.median && summary.median <= summary.q3);

        let in_range = samples
            .iter()
            .filter(|&&s| s >= summary.lower_fence && s <= summary.upper_fence)
            .count();
        assert_eq!(in_range + summary.outliers.len(), samples.len());
    }

    #[test]
    fn test_invalid_samples_rejected() {
        let mut stats = BoxStatsAggregator::new();
        assert!(matches!(
            stats.add_sample("Rust", -1.0),
            Err(Error::InvalidSample { .. })
        ));
        assert!(stats.add_sample("Rust", f64::NAN).is_err());
        assert!(stats.add_sample("Rust", f64::INFINITY).is_err());
        assert_eq!(stats.category_count(), 0);
    }

    #[test]
    fn test_summary_emitted_from_second_sample() {
        let mut stats = BoxStatsAggregator::new();
        assert_eq!(stats.add_sample("Rust", 10.0).unwrap(), None);
        assert!(stats.snapshot().entries.is_empty());

        let summary = stats.add_sample("Rust", 20.0).unwrap().unwrap();
        assert_eq!(summary.sample_count, 2);
        assert_eq!(stats.samples("Rust").unwrap(), &[10.0, 20.0]);
    }

    #[test]
    fn test_ping_and_snapshot_order() {
        let mut stats = BoxStatsAggregator::new();
        for d in [1.0, 2.0, 3.0] {
            stats.add_sample("Go", d).unwrap();
        }
        for d in [1.0, 2.0] {
            stats.add_sample("Rust", d).unwrap();
        }
        stats.add_sample("C", 1.0).unwrap();
        stats.add_sample("C", 5.0).unwrap();

        let snapshot = stats.snapshot();
        let order: Vec<(&str, bool)> = snapshot
            .entries
            .iter()
            .map(|e| (e.summary.category.as_str(), e.updated_this_tick))
            .collect();
        assert_eq!(order, vec![("Go", false), ("C", true), ("Rust", false)]);
    }

    #[test]
    fn test_duration_events() {
        let at = |secs| Utc.timestamp_opt(secs, 0).single();
        let mut stats = BoxStatsAggregator::new();

        let event = |created, closed| DurationEvent {
            category: "Rust".to_string(),
            created_at: created,
            closed_at: closed,
        };

        assert_eq!(stats.add_duration_event(&event(at(0), None)).unwrap(), None);
        assert_eq!(stats.add_duration_event(&event(None, at(5))).unwrap(), None);
        assert_eq!(stats.add_duration_event(&event(at(9), at(5))).unwrap(), None);
        assert_eq!(stats.discarded(), 3);
        assert_eq!(stats.category_count(), 0);

        stats.add_duration_event(&event(at(0), at(2))).unwrap();
        let summary = stats
            .add_duration_event(&event(at(0), at(4)))
            .unwrap()
            .unwrap();
        assert_eq!((summary.min, summary.max), (2000.0, 4000.0));
    }

    #[test]
    fn test_subscribers_only_see_summaries() {
        let seen = Arc::new(Mutex::new(0));
        let mut stats = BoxStatsAggregator::new();

        let counter = Arc::clone(&seen);
        stats.subscribe(move |snapshot| {
            assert!(!snapshot.entries.is_empty());
            *counter.lock().unwrap() += 1;
        });

        stats.add_sample("Rust", 1.0).unwrap();
        stats.add_sample("Go", 1.0).unwrap();
        stats.add_sample("Rust", 2.0).unwrap();

        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
