//! Terminal output

use gaptrack_core::controller::TrackingSnapshot;
use gaptrack_core::session::{Roster, SessionInfo, Trend};
use gaptrack_core::types::{Event, EventKind, IntervalPoint};
use std::time::Duration;

/// Session time as m:ss.s
pub fn format_time(t: Duration) -> String {
    let secs = t.as_secs_f64();
    let minutes = (secs / 60.0).floor();
    format!("{}:{:04.1}", minutes as u64, secs - minutes * 60.0)
}

pub fn print_sessions(sessions: &[SessionInfo]) {
    if sessions.is_empty() {
        println!("No sessions found");
        return;
    }
    println!("{:>6}  {:<10}  {:<12}  {:<20}  {}", "KEY", "DATE", "TYPE", "LOCATION", "SESSION");
    for session in sessions {
        println!(
            "{:>6}  {:<10}  {:<12}  {:<20}  {}",
            session.session_key,
            session.date_start.format("%Y-%m-%d"),
            session.session_type.as_deref().unwrap_or("-"),
            session.location.as_deref().unwrap_or("-"),
            session.session_name
        );
    }
}

pub fn print_roster(roster: &Roster) {
    for driver in roster.drivers() {
        println!(
            "{:>3}  {:<4} {:<24} {}",
            driver.number.0,
            driver.acronym,
            driver.full_name.as_deref().unwrap_or(""),
            driver.team_name.as_deref().unwrap_or("")
        );
    }
}

pub fn describe_event(event: &Event, roster: &Roster) -> String {
    let who = event
        .driver
        .map(|d| format!(" {}", roster.label(d)))
        .unwrap_or_default();
    let what = match event.kind {
        EventKind::PitStop => "pit stop",
        EventKind::UnknownAnomaly => "gap anomaly",
        EventKind::GapClosing => "gap closing",
        EventKind::GapOpening => "gap opening",
    };
    format!(
        "[{} - {}] {}{} ({:+.3}s)",
        format_time(event.start_time),
        format_time(event.end_time),
        what,
        who,
        event.magnitude
    )
}

pub fn describe_point(point: &IntervalPoint, trend: Trend) -> String {
    let mut line = format!(
        "{}  gap {:+.3}s",
        format_time(point.timestamp),
        point.gap_seconds
    );
    if let Some(rate) = point.closing_rate {
        line.push_str(&format!("  rate {:+.3}s/s", rate));
    }
    line.push_str(match trend {
        Trend::Closing => "  closing",
        Trend::Extending => "  extending",
        Trend::Stable => "  stable",
        Trend::Unknown => "",
    });
    if point.in_drs_range() {
        line.push_str("  DRS");
    }
    if point.stale {
        line.push_str("  (stale)");
    }
    line
}

pub fn print_summary(snapshot: &TrackingSnapshot) {
    let pair = match snapshot.pair {
        Some(pair) => format!(
            "{} vs {}",
            snapshot.driver_label(pair.a()),
            snapshot.driver_label(pair.b())
        ),
        None => "-".to_string(),
    };
    println!();
    println!("Session {} ({})", snapshot.session_id, pair);
    if let Some(cause) = &snapshot.stop_cause {
        println!("  Stopped: {}", cause);
    }
    println!("  Points: {}", snapshot.points.len());
    if let Some(point) = snapshot.latest_point() {
        println!("  Final gap: {:+.3}s", point.gap_seconds);
    }
    println!("  Events: {}", snapshot.events.len());
    for event in snapshot.events.iter() {
        println!("    {}", describe_event(event, &snapshot.roster));
    }
    if snapshot.fetch.pulls > 0 {
        println!("  Fetches: {}", snapshot.fetch.pulls);
    }
    if let Some(path) = &snapshot.recording_path {
        println!("  Recording: {}", path.display());
    }
    if let Some(error) = &snapshot.recording_error {
        println!("  Recording error: {}", error);
    }
}
