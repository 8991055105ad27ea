use super::timer::{TimerSlot, TimerStatus};
use super::watch::{WatchSet, WatchStatus};
use crate::executor::ActionKind;
use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

/// Point-in-time, immutable view of the timer and watch state. Built under
/// the controller's lock, then freely shared; may be at most one poll
/// interval stale, which is fine for display.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub timer: TimerSummary,
    pub watch: WatchSummary,
}

#[derive(Debug, Clone)]
pub struct TimerSummary {
    pub status: TimerStatus,
    pub action: Option<ActionKind>,
    pub armed_at: Option<DateTime<Local>>,
    pub remaining: Option<Duration>,
    pub deadline: Option<DateTime<Local>>,
}

#[derive(Debug, Clone)]
pub struct WatchSummary {
    pub status: WatchStatus,
    pub pending: Option<ActionKind>,
    pub targets: Vec<String>,
}

impl TimerSummary {
    /// Human-readable remaining time, truncated to whole seconds.
    pub fn remaining_display(&self) -> Option<String> {
        let remaining = self.remaining?;
        let whole = Duration::from_secs(remaining.as_secs());
        Some(humantime::format_duration(whole).to_string())
    }

    pub fn deadline_display(&self) -> Option<String> {
        self.deadline
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

pub(super) fn snapshot(timer: &TimerSlot, watch: &WatchSet, now: Instant) -> StatusSnapshot {
    StatusSnapshot {
        timer: TimerSummary {
            status: timer.status(),
            action: timer.action(),
            armed_at: timer.armed_at(),
            remaining: timer.remaining(now),
            deadline: timer.deadline_wall(),
        },
        watch: WatchSummary {
            status: watch.status(),
            pending: watch.pending(),
            targets: watch
                .entries()
                .iter()
                .map(|t| t.display_name())
                .collect(),
        },
    }
}
