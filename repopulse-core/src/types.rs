//! Core domain types for repopulse
//!
//! These types represent the messages that arrive on the event feed after
//! they have been classified, before any aggregation happens.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Batch** | A group of messages delivered together by the feed |
//! | **Category** | The grouping key (language, file extension, event kind) |
//! | **Sample** | A non-negative duration attributed to a category |
//! | **Ping** | A per-observation flag marking a category as just updated |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category used when a message carries no category key.
pub const UNKNOWN_CATEGORY: &str = "N/A";

// ============================================
// Event kinds
// ============================================

/// GitHub event kinds the activity feed reports counts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KnownEventKind {
    CommitCommentEvent,
    CreateEvent,
    DeleteEvent,
    DeploymentEvent,
    DeploymentStatusEvent,
    FollowEvent,
    ForkEvent,
    ForkApplyEvent,
    DownloadEvent,
    GistEvent,
    GollumEvent,
    IssueCommentEvent,
    IssuesEvent,
    MemberEvent,
    MembershipEvent,
    PageBuildEvent,
    PublicEvent,
    PullRequestEvent,
    PullRequestReviewCommentEvent,
    PushEvent,
    ReleaseEvent,
    RepositoryEvent,
    StatusEvent,
    TeamAddEvent,
    WatchEvent,
}

impl KnownEventKind {
    /// Every known kind, in display order.
    pub const ALL: [KnownEventKind; 25] = [
        KnownEventKind::CommitCommentEvent,
        KnownEventKind::CreateEvent,
        KnownEventKind::DeleteEvent,
        KnownEventKind::DeploymentEvent,
        KnownEventKind::DeploymentStatusEvent,
        KnownEventKind::FollowEvent,
        KnownEventKind::ForkEvent,
        KnownEventKind::ForkApplyEvent,
        KnownEventKind::DownloadEvent,
        KnownEventKind::GistEvent,
        KnownEventKind::GollumEvent,
        KnownEventKind::IssueCommentEvent,
        KnownEventKind::IssuesEvent,
        KnownEventKind::MemberEvent,
        KnownEventKind::MembershipEvent,
        KnownEventKind::PageBuildEvent,
        KnownEventKind::PublicEvent,
        KnownEventKind::PullRequestEvent,
        KnownEventKind::PullRequestReviewCommentEvent,
        KnownEventKind::PushEvent,
        KnownEventKind::ReleaseEvent,
        KnownEventKind::RepositoryEvent,
        KnownEventKind::StatusEvent,
        KnownEventKind::TeamAddEvent,
        KnownEventKind::WatchEvent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KnownEventKind::CommitCommentEvent => "CommitCommentEvent",
            KnownEventKind::CreateEvent => "CreateEvent",
            KnownEventKind::DeleteEvent => "DeleteEvent",
            KnownEventKind::DeploymentEvent => "DeploymentEvent",
            KnownEventKind::DeploymentStatusEvent => "DeploymentStatusEvent",
            KnownEventKind::FollowEvent => "FollowEvent",
            KnownEventKind::ForkEvent => "ForkEvent",
            KnownEventKind::ForkApplyEvent => "ForkApplyEvent",
            KnownEventKind::DownloadEvent => "DownloadEvent",
            KnownEventKind::GistEvent => "GistEvent",
            KnownEventKind::GollumEvent => "GollumEvent",
            KnownEventKind::IssueCommentEvent => "IssueCommentEvent",
            KnownEventKind::IssuesEvent => "IssuesEvent",
            KnownEventKind::MemberEvent => "MemberEvent",
            KnownEventKind::MembershipEvent => "MembershipEvent",
            KnownEventKind::PageBuildEvent => "PageBuildEvent",
            KnownEventKind::PublicEvent => "PublicEvent",
            KnownEventKind::PullRequestEvent => "PullRequestEvent",
            KnownEventKind::PullRequestReviewCommentEvent => "PullRequestReviewCommentEvent",
            KnownEventKind::PushEvent => "PushEvent",
            KnownEventKind::ReleaseEvent => "ReleaseEvent",
            KnownEventKind::RepositoryEvent => "RepositoryEvent",
            KnownEventKind::StatusEvent => "StatusEvent",
            KnownEventKind::TeamAddEvent => "TeamAddEvent",
            KnownEventKind::WatchEvent => "WatchEvent",
        }
    }
}

impl std::str::FromStr for KnownEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KnownEventKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown event kind: {}", s))
    }
}

/// An event kind as reported by the feed.
///
/// Names outside the known set land in [`EventKind::Other`] instead of
/// being dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    Known(KnownEventKind),
    Other(String),
}

impl EventKind {
    pub fn from_name(name: &str) -> Self {
        match name.parse::<KnownEventKind>() {
            Ok(kind) => EventKind::Known(kind),
            Err(_) => EventKind::Other(name.to_string()),
        }
    }

    /// Every known kind, in display order.
    pub fn known() -> impl Iterator<Item = EventKind> {
        KnownEventKind::ALL.into_iter().map(EventKind::Known)
    }

    pub fn name(&self) -> &str {
        match self {
            EventKind::Known(kind) => kind.as_str(),
            EventKind::Other(name) => name,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================
// Feed messages
// ============================================

/// Per-kind event counts observed at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivitySample {
    /// Epoch milliseconds
    pub timestamp: i64,
    /// Count per event kind present in the message
    pub counts: Vec<(EventKind, u64)>,
}

impl ActivitySample {
    /// Count reported for `kind`, zero when absent.
    pub fn count_for(&self, kind: &EventKind) -> u64 {
        self.counts
            .iter()
            .find(|(k, _)| k == kind)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }
}

/// A single counter increment for a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

/// An item with an open and (possibly) a close time, e.g. a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DurationEvent {
    pub category: String,
    pub created_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl DurationEvent {
    /// Milliseconds between open and close.
    ///
    /// `None` when either end is missing or the close precedes the open.
    pub fn duration_ms(&self) -> Option<f64> {
        let created = self.created_at?;
        let closed = self.closed_at?;
        let millis = closed.signed_duration_since(created).num_milliseconds();
        if millis < 0 {
            return None;
        }
        Some(millis as f64)
    }
}

/// A classified message from the feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    Activity(ActivitySample),
    CategoryCount(CategoryCount),
    Duration(DurationEvent),
}

impl FeedMessage {
    /// Category this message is attributed to, if any.
    pub fn category(&self) -> Option<&str> {
        match self {
            FeedMessage::Activity(_) => None,
            FeedMessage::CategoryCount(c) => Some(&c.category),
            FeedMessage::Duration(d) => Some(&d.category),
        }
    }
}
