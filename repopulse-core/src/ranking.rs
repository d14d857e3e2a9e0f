//! Ranked running counts
//!
//! [`RankedAggregator`] keeps a running count per category and a total
//! ordering over them: count descending, then category name ascending.
//! Every observation re-ranks all categories and records where each one
//! was before, so a renderer can animate the move.
//!
//! ```text
//! {A:5, B:5, C:3}      observe(C, 5)      {C:8, A:5, B:5}
//!  A rank 0                                 C rank 0 (was 2)
//!  B rank 1                                 A rank 1 (was 0)
//!  C rank 2                                 B rank 2 (was 1)
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use crate::subscription::{SubscriptionId, Subscribers};

/// Running state of one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryState {
    pub category: String,
    pub count: u64,
    /// Count before the most recent observation
    pub previous_count: u64,
    /// Position in the ranking, 0 is the highest count
    pub rank: usize,
    /// Position before the most recent observation
    pub previous_rank: usize,
    /// True only for the category touched by the most recent observation
    pub updated_this_tick: bool,
}

/// Visible slice of the ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RankingSnapshot {
    /// Entries in rank order, truncated to the display limit
    pub entries: Vec<CategoryState>,
    /// Number of categories tracked, including those not shown
    pub total_categories: usize,
    /// Number of observations processed so far
    pub observations: u64,
}

/// Total order over categories: count descending, name ascending.
fn compare(a: &CategoryState, b: &CategoryState) -> Ordering {
    b.count
        .cmp(&a.count)
        .then_with(|| a.category.cmp(&b.category))
}

/// Running counts with a stable ranking.
#[derive(Debug)]
pub struct RankedAggregator {
    /// Always kept in rank order
    entries: Vec<CategoryState>,
    index: HashMap<String, usize>,
    display_limit: usize,
    observations: u64,
    subscribers: Subscribers<RankingSnapshot>,
}

impl RankedAggregator {
    pub fn new(display_limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            display_limit,
            observations: 0,
            subscribers: Subscribers::new(),
        }
    }

    /// Add `delta` to `category` and re-rank everything.
    ///
    /// Returns the category's new rank. Subscribers receive the updated
    /// snapshot before this returns.
    pub fn observe(&mut self, category: &str, delta: u64) -> usize {
        for entry in self.entries.iter_mut() {
            entry.previous_rank = entry.rank;
            entry.previous_count = entry.count;
            entry.updated_this_tick = false;
        }

        match self.index.get(category) {
            Some(&position) => {
                let entry = &mut self.entries[position];
                entry.count = entry.count.saturating_add(delta);
                entry.updated_this_tick = true;
            }
            None => {
                // New categories animate in from just below the last row
                let rank = self.entries.len();
                tracing::debug!(category = %category, "New ranked category");
                self.entries.push(CategoryState {
                    category: category.to_string(),
                    count: delta,
                    previous_count: 0,
                    rank,
                    previous_rank: rank,
                    updated_this_tick: true,
                });
            }
        }

        self.rerank();
        self.observations += 1;

        if !self.subscribers.is_empty() {
            let snapshot = self.snapshot();
            self.subscribers.notify(&snapshot);
        }

        self.index.get(category).copied().unwrap_or_default()
    }

    fn rerank(&mut self) {
        // Stable sort on a nearly sorted vector; only the touched entry moves
        self.entries.sort_by(compare);
        self.index.clear();
        for (rank, entry) in self.entries.iter_mut().enumerate() {
            entry.rank = rank;
            self.index.insert(entry.category.clone(), rank);
        }
    }

    /// Top `display_limit` entries in rank order.
    pub fn snapshot(&self) -> RankingSnapshot {
        RankingSnapshot {
            entries: self
                .entries
                .iter()
                .take(self.display_limit)
                .cloned()
                .collect(),
            total_categories: self.entries.len(),
            observations: self.observations,
        }
    }

    /// Every tracked entry in rank order, ignoring the display limit.
    pub fn full_ranking(&self) -> &[CategoryState] {
        &self.entries
    }

    pub fn get(&self, category: &str) -> Option<&CategoryState> {
        self.index.get(category).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn display_limit(&self) -> usize {
        self.display_limit
    }

    /// Hidden categories are kept, so raising the limit shows them again.
    pub fn set_display_limit(&mut self, limit: usize) {
        self.display_limit = limit;
    }

    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&RankingSnapshot) + Send + 'static,
    {
        self.subscribers.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }
}
