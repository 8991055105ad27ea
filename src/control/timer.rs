use crate::errors::CoreError;
use crate::executor::{ActionExecutor, ActionKind};
use chrono::{DateTime, Local};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerStatus {
    Idle,
    Armed,
    /// Deadline reached; collapses to [`TimerStatus::Idle`] on the next
    /// observation (status read or poll tick).
    Expired,
    /// Momentary state inside [`TimerSlot::cancel`]; never outlives the call.
    Cancelled,
}

/// The single pending-action slot. At most one power action is armed at a
/// time; re-arming cancels the previous action first.
///
/// The slot only does bookkeeping. The OS-level countdown armed through the
/// executor is what actually fires; `poll` just keeps the observable state in
/// step with the wall clock.
#[derive(Debug)]
pub struct TimerSlot {
    status: TimerStatus,
    action: Option<ActionKind>,
    armed_at: Option<DateTime<Local>>,
    duration: Duration,
    deadline: Option<Instant>,
    deadline_wall: Option<DateTime<Local>>,
    /// Bumped on every arm so a superseded background poller can tell it is
    /// stale and exit.
    generation: u64,
}

#[derive(Debug)]
pub struct ArmedInfo {
    pub generation: u64,
    pub deadline_wall: DateTime<Local>,
}

#[derive(Debug)]
pub struct CancelReport {
    pub action: ActionKind,
    /// Set when the OS-level abort failed. The logical cancel still succeeded;
    /// the underlying OS action may fire anyway.
    pub executor_warning: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum TimerPoll {
    /// Still armed, deadline not reached.
    Counting,
    /// Deadline just passed on this tick.
    Expired(ActionKind),
    /// Nothing armed (idle, cancelled, or already-observed expiry).
    Inactive,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self {
            status: TimerStatus::Idle,
            action: None,
            armed_at: None,
            duration: Duration::ZERO,
            deadline: None,
            deadline_wall: None,
            generation: 0,
        }
    }

    /// Arms `action` to fire in `seconds`. An already-armed action is
    /// cancelled first (callers that need the cancel on record should call
    /// [`TimerSlot::cancel`] themselves beforehand). On any failure the slot
    /// is left Idle; no partial armed state is observable.
    pub fn arm(
        &mut self,
        executor: &dyn ActionExecutor,
        action: ActionKind,
        seconds: u64,
        now: Instant,
    ) -> Result<ArmedInfo, CoreError> {
        if self.status == TimerStatus::Armed {
            debug!("Arm while armed: cancelling previous action");
            if let Some(report) = self.cancel(executor) {
                if let Some(message) = report.executor_warning {
                    warn!(%message, "OS-level cancel failed while re-arming");
                }
            }
        }
        self.reset();

        if !executor.supports(action) {
            return Err(CoreError::UnsupportedAction(action));
        }
        executor.schedule(action, seconds)?;

        let duration = Duration::from_secs(seconds);
        self.status = TimerStatus::Armed;
        self.action = Some(action);
        self.armed_at = Some(Local::now());
        self.duration = duration;
        self.deadline = Some(now + duration);
        let deadline_wall = Local::now()
            + chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
        self.deadline_wall = Some(deadline_wall);
        self.generation += 1;
        Ok(ArmedInfo {
            generation: self.generation,
            deadline_wall,
        })
    }

    /// Cancels the armed action, if any. Local bookkeeping is authoritative:
    /// a failed OS-level abort is reported as a warning in the returned
    /// report, not as a failure of the cancel itself.
    pub fn cancel(&mut self, executor: &dyn ActionExecutor) -> Option<CancelReport> {
        if self.status == TimerStatus::Expired {
            self.reset();
            return None;
        }
        if self.status != TimerStatus::Armed {
            return None;
        }
        let action = self.action?;
        let executor_warning = executor
            .cancel()
            .err()
            .map(|err| format!("OS-level cancel failed ({err}); the {action} may still fire"));
        self.status = TimerStatus::Cancelled;
        self.reset();
        Some(CancelReport {
            action,
            executor_warning,
        })
    }

    /// Time until the deadline; `None` when nothing is armed.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        if self.status != TimerStatus::Armed {
            return None;
        }
        self.deadline.map(|d| d.saturating_duration_since(now))
    }

    /// One background tick. Detects expiry and collapses an already-observed
    /// expired state; never re-invokes the executor.
    pub fn poll(&mut self, now: Instant) -> TimerPoll {
        match self.status {
            TimerStatus::Armed => {
                let deadline = match self.deadline {
                    Some(d) => d,
                    None => {
                        self.reset();
                        return TimerPoll::Inactive;
                    }
                };
                if now >= deadline {
                    self.status = TimerStatus::Expired;
                    match self.action {
                        Some(action) => TimerPoll::Expired(action),
                        None => {
                            self.reset();
                            TimerPoll::Inactive
                        }
                    }
                } else {
                    TimerPoll::Counting
                }
            }
            TimerStatus::Expired => {
                self.reset();
                TimerPoll::Inactive
            }
            TimerStatus::Idle | TimerStatus::Cancelled => TimerPoll::Inactive,
        }
    }

    /// Collapses a momentary Expired state after it has been reported once.
    pub fn observe_transient(&mut self) {
        if self.status == TimerStatus::Expired {
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.status = TimerStatus::Idle;
        self.action = None;
        self.armed_at = None;
        self.duration = Duration::ZERO;
        self.deadline = None;
        self.deadline_wall = None;
    }

    pub fn status(&self) -> TimerStatus {
        self.status
    }

    pub fn action(&self) -> Option<ActionKind> {
        self.action
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn armed_at(&self) -> Option<DateTime<Local>> {
        self.armed_at
    }

    pub fn deadline_wall(&self) -> Option<DateTime<Local>> {
        self.deadline_wall
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
