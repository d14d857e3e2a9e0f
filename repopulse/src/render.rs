//! Plain-text rendering of dashboard snapshots.

use std::cmp::Ordering;
use std::fmt::Write;

use chrono::DateTime;
use repopulse_core::activity::ActivitySnapshot;
use repopulse_core::box_stats::BoxStatsSnapshot;
use repopulse_core::ranking::RankingSnapshot;
use repopulse_core::recent::RecentEntry;
use repopulse_core::{CategoryCount, DashboardSnapshot};

/// Render every panel of `snapshot`.
pub fn render_snapshot(snapshot: &DashboardSnapshot) -> String {
    let mut out = String::new();
    render_ranking(&mut out, &snapshot.ranking);
    out.push('\n');
    render_box_stats(&mut out, &snapshot.box_stats);
    out.push('\n');
    render_activity(&mut out, &snapshot.activity);
    out.push('\n');
    render_recent(&mut out, &snapshot.recent);
    let _ = writeln!(
        out,
        "\nRouted: {} ranked, {} sampled, {} recorded, {} discarded",
        snapshot.stats.ranked,
        snapshot.stats.sampled,
        snapshot.stats.recorded,
        snapshot.stats.discarded
    );
    out
}

fn render_ranking(out: &mut String, ranking: &RankingSnapshot) {
    let _ = writeln!(
        out,
        "Ranking ({} of {} categories)",
        ranking.entries.len(),
        ranking.total_categories
    );
    let _ = writeln!(out, "{}", "=".repeat(40));

    if ranking.entries.is_empty() {
        let _ = writeln!(out, "  (no data yet)");
        return;
    }

    for entry in &ranking.entries {
        let _ = writeln!(
            out,
            "{} {:>3}. {:<20} {:>8} {}",
            if entry.updated_this_tick { "*" } else { " " },
            entry.rank + 1,
            entry.category,
            entry.count,
            movement(entry.rank, entry.previous_rank)
        );
    }
}

/// Arrow for a rank change; lower rank numbers are better.
fn movement(rank: usize, previous_rank: usize) -> String {
    match rank.cmp(&previous_rank) {
        Ordering::Less => format!("^{}", previous_rank - rank),
        Ordering::Greater => format!("v{}", rank - previous_rank),
        Ordering::Equal => String::new(),
    }
}

fn render_box_stats(out: &mut String, stats: &BoxStatsSnapshot) {
    let _ = writeln!(out, "Time to close");
    let _ = writeln!(out, "{}", "=".repeat(40));

    if stats.entries.is_empty() {
        let _ = writeln!(out, "  (need at least two closed items per category)");
        return;
    }

    let _ = writeln!(
        out,
        "  {:<20} {:>5} {:>9} {:>9} {:>9} {:>9} {:>9} {:>4}",
        "category", "n", "low", "q1", "median", "q3", "high", "out"
    );
    for entry in &stats.entries {
        let s = &entry.summary;
        let _ = writeln!(
            out,
            "{} {:<20} {:>5} {:>9} {:>9} {:>9} {:>9} {:>9} {:>4}",
            if entry.updated_this_tick { "*" } else { " " },
            s.category,
            s.sample_count,
            format_duration_ms(s.lower_bound),
            format_duration_ms(s.q1),
            format_duration_ms(s.median),
            format_duration_ms(s.q3),
            format_duration_ms(s.upper_bound),
            s.outliers.len()
        );
    }
    if stats.discarded > 0 {
        let _ = writeln!(out, "  ({} open or invalid items skipped)", stats.discarded);
    }
}

fn render_activity(out: &mut String, activity: &ActivitySnapshot) {
    let _ = writeln!(out, "Activity");
    let _ = writeln!(out, "{}", "=".repeat(40));

    let Some((start, end)) = activity.x_domain else {
        let _ = writeln!(out, "  (no data yet)");
        return;
    };
    let _ = writeln!(
        out,
        "  {} .. {}  peak {} events/sample",
        format_timestamp(start),
        format_timestamp(end),
        activity.y_max
    );

    let mut busiest: Vec<(&str, u64)> = activity
        .series
        .iter()
        .map(|s| (s.kind.name(), s.points.iter().map(|p| p.count).sum()))
        .filter(|(_, total)| *total > 0)
        .collect();
    busiest.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    for (kind, total) in busiest.iter().take(5) {
        let _ = writeln!(out, "  {:<32} {:>8}", kind, total);
    }
}

fn render_recent(out: &mut String, recent: &[RecentEntry<CategoryCount>]) {
    let _ = writeln!(out, "Recent");
    let _ = writeln!(out, "{}", "=".repeat(40));

    if recent.is_empty() {
        let _ = writeln!(out, "  (no data yet)");
        return;
    }

    let line: Vec<String> = recent
        .iter()
        .rev()
        .take(10)
        .map(|e| format!("{}x{}", e.item.category, e.item.count))
        .collect();
    let _ = writeln!(out, "  {}", line.join("  "));
}

/// Format milliseconds compactly (e.g., "950ms", "12.5s", "3.2h").
pub fn format_duration_ms(ms: f64) -> String {
    let secs = ms / 1000.0;
    if ms < 1000.0 {
        format!("{:.0}ms", ms)
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        format!("{:.1}m", secs / 60.0)
    } else if secs < 86_400.0 {
        format!("{:.1}h", secs / 3600.0)
    } else {
        format!("{:.1}d", secs / 86_400.0)
    }
}

/// Format epoch milliseconds as a UTC wall-clock time.
fn format_timestamp(ms: i64) -> String {
    match DateTime::from_timestamp_millis(ms) {
        Some(ts) => ts.format("%H:%M:%S").to_string(),
        None => ms.to_string(),
    }
}
