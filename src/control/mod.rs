mod status;
mod timer;
mod watch;

pub use status::{StatusSnapshot, TimerSummary, WatchSummary};
pub use timer::TimerStatus;
pub use watch::{ProcessProvider, ProcessRecord, SysinfoProvider, WatchStatus, WatchTarget};

use self::timer::{TimerPoll, TimerSlot};
use self::watch::{WatchPoll, WatchSet};
use crate::configs::NightfallConfig;
use crate::errors::CoreError;
use crate::eventlog::{EventLog, LogEntry};
use crate::executor::{ActionExecutor, ActionKind};
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Single entry point for the UI. Owns the timer slot and the watch set,
/// serializes every mutation behind one lock, and runs one background poll
/// task per armed timer / active watch. Superseded pollers notice a
/// generation mismatch and exit instead of racing the new one.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<CoreState>,
    provider: Mutex<Box<dyn ProcessProvider>>,
    executor: Arc<dyn ActionExecutor>,
    log: EventLog,
    handle: tokio::runtime::Handle,
    timer_poll_interval: Duration,
    watch_poll_interval: Duration,
}

struct CoreState {
    timer: TimerSlot,
    watch: WatchSet,
}

/// Result of a successful arm.
#[derive(Debug)]
pub struct ArmOutcome {
    /// Action that was implicitly cancelled to make room for this one.
    pub replaced: Option<ActionKind>,
    /// Warning from a failed OS-level cancel of the replaced action.
    pub warning: Option<String>,
    pub deadline: DateTime<Local>,
}

/// Result of a cancel request. `cancelled` is `false` when nothing was armed.
#[derive(Debug)]
pub struct CancelOutcome {
    pub cancelled: bool,
    pub warning: Option<String>,
}

impl Controller {
    /// Must be called from within a tokio runtime; background pollers are
    /// spawned onto the current handle.
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        provider: Box<dyn ProcessProvider>,
        log: EventLog,
        config: &NightfallConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CoreState {
                    timer: TimerSlot::new(),
                    watch: WatchSet::new(),
                }),
                provider: Mutex::new(provider),
                executor,
                log,
                handle: tokio::runtime::Handle::current(),
                timer_poll_interval: config.timer_poll_interval,
                watch_poll_interval: config.watch_poll_interval,
            }),
        }
    }

    /// Arms `kind` to fire in `seconds`. An already-armed action is cancelled
    /// first; both the cancel and the new arm land in the activity log.
    pub fn arm_timer(&self, kind: ActionKind, seconds: u64) -> Result<ArmOutcome, CoreError> {
        let generation;
        let outcome;
        {
            let mut state = self.inner.state.lock();
            let mut replaced = None;
            let mut warning = None;
            if let Some(report) = state.timer.cancel(&*self.inner.executor) {
                self.inner
                    .log
                    .record(&format!("Cancelled {} timer", report.action), None);
                if let Some(message) = report.executor_warning {
                    warn!(%message, "Executor cancel failed while re-arming");
                    warning = Some(message);
                }
                replaced = Some(report.action);
            }
            let info = state
                .timer
                .arm(&*self.inner.executor, kind, seconds, Instant::now())?;
            self.inner.log.record(
                &format!("Set {kind} timer"),
                Some(&format!("Duration: {seconds} seconds")),
            );
            info!(%kind, seconds, "Timer armed");
            generation = info.generation;
            outcome = ArmOutcome {
                replaced,
                warning,
                deadline: info.deadline_wall,
            };
        }
        self.spawn_timer_poller(generation);
        Ok(outcome)
    }

    /// Cancels the armed action. Local bookkeeping always wins: a failed
    /// OS-level abort is surfaced as a warning, not a failure.
    pub fn cancel_timer(&self) -> CancelOutcome {
        let mut state = self.inner.state.lock();
        match state.timer.cancel(&*self.inner.executor) {
            Some(report) => {
                self.inner
                    .log
                    .record(&format!("Cancelled {} timer", report.action), None);
                info!(action = %report.action, "Timer cancelled");
                if let Some(message) = &report.executor_warning {
                    warn!(%message, "OS-level cancel failed");
                }
                CancelOutcome {
                    cancelled: true,
                    warning: report.executor_warning,
                }
            }
            None => {
                debug!("Cancel requested with no active timer");
                CancelOutcome {
                    cancelled: false,
                    warning: None,
                }
            }
        }
    }

    /// Adds a watch target while configuring. Returns `false` for a
    /// duplicate.
    pub fn add_watch_target(&self, target: WatchTarget) -> Result<bool, CoreError> {
        let mut state = self.inner.state.lock();
        let name = target.display_name();
        let added = state.watch.add_target(target)?;
        if added {
            self.inner
                .log
                .record(&format!("Added process {name} for monitoring"), None);
        }
        Ok(added)
    }

    /// Starts monitoring the configured targets, arming `kind` behind them.
    pub fn start_watch(&self, kind: ActionKind) -> Result<(), CoreError> {
        let generation;
        {
            let mut state = self.inner.state.lock();
            let count = state.watch.entries().len();
            generation = state.watch.start_monitoring(kind)?;
            self.inner.log.record(
                &format!("Started watching {count} process(es)"),
                Some(&format!("On completion: {kind}")),
            );
            info!(count, %kind, "Watch started");
        }
        self.spawn_watch_poller(generation);
        Ok(())
    }

    /// Clears all watch targets without triggering anything. Returns how many
    /// were removed.
    pub fn clear_watch(&self) -> usize {
        let mut state = self.inner.state.lock();
        let removed = state.watch.remove_all();
        if removed > 0 {
            self.inner.log.record("Cleared all monitored processes", None);
            info!(removed, "Watch cleared");
        }
        removed
    }

    /// Runs `kind` immediately (no countdown), e.g. reboot-to-firmware from
    /// the menu. Subject to the same platform capability check as arming.
    pub fn fire_now(&self, kind: ActionKind) -> Result<(), CoreError> {
        if !self.inner.executor.supports(kind) {
            return Err(CoreError::UnsupportedAction(kind));
        }
        self.inner.executor.schedule(kind, 0)?;
        self.inner
            .log
            .record(&format!("Initiated immediate {kind}"), None);
        Ok(())
    }

    /// Point-in-time snapshot for display. Reading also counts as observing:
    /// a momentary Expired timer collapses back to Idle after being reported
    /// once.
    pub fn status(&self) -> StatusSnapshot {
        let mut state = self.inner.state.lock();
        let snap = status::snapshot(&state.timer, &state.watch, Instant::now());
        state.timer.observe_transient();
        snap
    }

    /// Recent activity-log entries, newest first.
    pub fn recent_events(&self, limit: usize) -> Vec<LogEntry> {
        self.inner.log.read_recent(limit)
    }

    fn spawn_timer_poller(&self, generation: u64) {
        let inner = Arc::clone(&self.inner);
        self.inner.handle.spawn(
            async move {
                let mut ticker = tokio::time::interval(inner.timer_poll_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    let mut state = inner.state.lock();
                    if state.timer.generation() != generation {
                        debug!("Timer poller superseded");
                        return;
                    }
                    match state.timer.poll(Instant::now()) {
                        TimerPoll::Counting => {}
                        TimerPoll::Expired(action) => {
                            // The OS command armed at arm() time fires on its
                            // own; this only updates the observable state.
                            inner
                                .log
                                .record("Timer expired", Some(&format!("Action: {action}")));
                            info!(%action, "Timer deadline reached");
                            return;
                        }
                        TimerPoll::Inactive => return,
                    }
                }
            }
            .instrument(info_span!("timer_poll", generation)),
        );
    }

    fn spawn_watch_poller(&self, generation: u64) {
        let inner = Arc::clone(&self.inner);
        self.inner.handle.spawn(
            async move {
                let mut ticker = tokio::time::interval(inner.watch_poll_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    // Check for supersession or a cleared watch before
                    // enumerating, so a tick that cannot snapshot the process
                    // table still observes the transition and exits.
                    {
                        let state = inner.state.lock();
                        if state.watch.generation() != generation
                            || state.watch.status() != WatchStatus::Monitoring
                        {
                            debug!("Watch poller superseded or watch no longer active");
                            return;
                        }
                    }
                    // Enumerate outside the state lock; status reads must not
                    // wait on the process table.
                    let live = {
                        let mut provider = inner.provider.lock();
                        match provider.snapshot() {
                            Ok(live) => live,
                            Err(err) => {
                                warn!(?err, "Process enumeration failed; no change this tick");
                                continue;
                            }
                        }
                    };
                    let mut state = inner.state.lock();
                    if state.watch.generation() != generation {
                        debug!("Watch poller superseded");
                        return;
                    }
                    match state.watch.poll(&live) {
                        WatchPoll::Inactive => return,
                        WatchPoll::Unchanged => {}
                        WatchPoll::Shrunk(gone) => {
                            for name in gone {
                                inner
                                    .log
                                    .record(&format!("Process {name} has completed"), None);
                            }
                        }
                        WatchPoll::Completed(action, gone) => {
                            for name in gone {
                                inner
                                    .log
                                    .record(&format!("Process {name} has completed"), None);
                            }
                            info!(%action, "All watched processes completed");
                            match inner.executor.schedule(action, 0) {
                                Ok(()) => inner
                                    .log
                                    .record(&format!("All processes completed; issued {action}"), None),
                                Err(err) => {
                                    error!(?err, %action, "Failed to issue action after watch completed");
                                    inner.log.record(
                                        &format!("Failed to issue {action} after watch completed"),
                                        Some(&err.to_string()),
                                    );
                                }
                            }
                            state.watch.acknowledge_completed();
                            return;
                        }
                    }
                }
            }
            .instrument(info_span!("watch_poll", generation)),
        );
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::watch::{ProcessProvider, ProcessRecord};
    use crate::executor::{ActionExecutor, ActionKind, ExecutorError};
    use color_eyre::eyre::eyre;
    use color_eyre::Result;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Executor that records invocations instead of touching the OS.
    pub struct RecordingExecutor {
        scheduled: Mutex<Vec<(ActionKind, u64)>>,
        cancels: AtomicUsize,
        fail_schedule: AtomicBool,
        fail_cancel: AtomicBool,
        firmware_supported: AtomicBool,
    }

    impl RecordingExecutor {
        pub fn new() -> Self {
            Self {
                scheduled: Mutex::new(Vec::new()),
                cancels: AtomicUsize::new(0),
                fail_schedule: AtomicBool::new(false),
                fail_cancel: AtomicBool::new(false),
                firmware_supported: AtomicBool::new(true),
            }
        }

        pub fn scheduled(&self) -> Vec<(ActionKind, u64)> {
            self.scheduled.lock().clone()
        }

        pub fn cancel_count(&self) -> usize {
            self.cancels.load(Ordering::SeqCst)
        }

        pub fn fail_next_schedule(&self) {
            self.fail_schedule.store(true, Ordering::SeqCst);
        }

        pub fn fail_next_cancel(&self) {
            self.fail_cancel.store(true, Ordering::SeqCst);
        }

        pub fn set_firmware_supported(&self, supported: bool) {
            self.firmware_supported.store(supported, Ordering::SeqCst);
        }
    }

    impl ActionExecutor for RecordingExecutor {
        fn schedule(&self, kind: ActionKind, seconds: u64) -> Result<(), ExecutorError> {
            if self.fail_schedule.swap(false, Ordering::SeqCst) {
                return Err(ExecutorError::EmptyCommand);
            }
            self.scheduled.lock().push((kind, seconds));
            Ok(())
        }

        fn cancel(&self) -> Result<(), ExecutorError> {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            if self.fail_cancel.swap(false, Ordering::SeqCst) {
                return Err(ExecutorError::EmptyCommand);
            }
            Ok(())
        }

        fn supports(&self, kind: ActionKind) -> bool {
            match kind {
                ActionKind::Shutdown | ActionKind::Restart => true,
                ActionKind::FirmwareReboot => self.firmware_supported.load(Ordering::SeqCst),
            }
        }
    }

    /// Shared handle letting tests swap the process table under a running
    /// poller.
    #[derive(Default)]
    pub struct ProviderState {
        pub records: Mutex<Vec<ProcessRecord>>,
        pub failing: AtomicBool,
        /// Total snapshot calls, failed ones included.
        pub calls: AtomicUsize,
    }

    pub struct StaticProvider {
        pub state: Arc<ProviderState>,
    }

    impl StaticProvider {
        pub fn new(records: Vec<ProcessRecord>) -> (Self, Arc<ProviderState>) {
            let state = Arc::new(ProviderState {
                records: Mutex::new(records),
                failing: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            });
            (
                Self {
                    state: Arc::clone(&state),
                },
                state,
            )
        }
    }

    impl ProcessProvider for StaticProvider {
        fn snapshot(&mut self) -> Result<Vec<ProcessRecord>> {
            self.state.calls.fetch_add(1, Ordering::SeqCst);
            if self.state.failing.load(Ordering::SeqCst) {
                return Err(eyre!("process table unavailable"));
            }
            Ok(self.state.records.lock().clone())
        }
    }
}
