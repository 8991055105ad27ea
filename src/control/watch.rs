use crate::errors::CoreError;
use crate::executor::ActionKind;
use color_eyre::Result;
use sysinfo::{ProcessesToUpdate, System};

/// A process identity whose disappearance counts toward triggering the
/// pending action.
///
/// A target entered by name starts out as a pid-less marker: it is resolved
/// to a concrete pid the first time a live process with that name is
/// observed, and tracked by pid from then on. Until first observed it is
/// never considered gone.
#[derive(Debug, Clone)]
pub struct WatchTarget {
    pub pid: Option<u32>,
    pub name: String,
    /// OS-reported start time of the tracked process, recorded the first
    /// time the pid is seen alive. A pid that later reports a different
    /// start time belongs to a new process (pid reuse) and the original is
    /// treated as gone.
    started_at: Option<u64>,
}

impl WatchTarget {
    pub fn by_pid(pid: u32) -> Self {
        Self {
            pid: Some(pid),
            name: String::new(),
            started_at: None,
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            pid: None,
            name: name.into(),
            started_at: None,
        }
    }

    /// Unique key: pid if known, else the name, case-insensitive.
    fn same_key(&self, other: &Self) -> bool {
        match (self.pid, other.pid) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.name.eq_ignore_ascii_case(&other.name),
            _ => false,
        }
    }

    pub fn display_name(&self) -> String {
        match (self.pid, self.name.is_empty()) {
            (Some(pid), true) => format!("pid {pid}"),
            (Some(pid), false) => format!("{} (pid {pid})", self.name),
            (None, _) => self.name.clone(),
        }
    }
}

/// One process from a point-in-time snapshot of the process table.
#[derive(Debug, Clone)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    pub start_time: u64,
}

/// Seam over the process table so the watch poller can be driven by fakes in
/// tests. Enumeration errors are non-fatal: the caller treats them as "no
/// change this tick" and retries on the next one.
pub trait ProcessProvider: Send {
    fn snapshot(&mut self) -> Result<Vec<ProcessRecord>>;
}

/// [`ProcessProvider`] backed by the live OS process table.
pub struct SysinfoProvider {
    sys: System,
}

impl SysinfoProvider {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}

impl ProcessProvider for SysinfoProvider {
    fn snapshot(&mut self) -> Result<Vec<ProcessRecord>> {
        self.sys.refresh_processes(ProcessesToUpdate::All, true);
        Ok(self
            .sys
            .processes()
            .iter()
            .map(|(pid, process)| ProcessRecord {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().into_owned(),
                start_time: process.start_time(),
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchStatus {
    /// Targets may be added or cleared freely.
    Configuring,
    /// Entries may only shrink; an empty set triggers the pending action.
    Monitoring,
    /// Momentary: all targets gone, pending action about to be issued.
    Completed,
    /// Momentary: explicit clear; never triggers the pending action.
    Cleared,
}

#[derive(Debug, PartialEq, Eq)]
pub enum WatchPoll {
    /// Not monitoring; the poller should exit.
    Inactive,
    /// Still monitoring; nothing left this tick.
    Unchanged,
    /// Some targets were observed gone (by display name); set still non-empty.
    Shrunk(Vec<String>),
    /// The last targets left on this tick; the caller must issue the pending
    /// action and then acknowledge completion.
    Completed(ActionKind, Vec<String>),
}

/// The set of watched process identities and the action armed behind them.
#[derive(Debug)]
pub struct WatchSet {
    entries: Vec<WatchTarget>,
    pending: Option<ActionKind>,
    status: WatchStatus,
    /// Bumped when monitoring starts so a superseded poller exits.
    generation: u64,
}

impl WatchSet {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            pending: None,
            status: WatchStatus::Configuring,
            generation: 0,
        }
    }

    /// Adds a target while configuring. Returns `false` when an equal target
    /// is already present (idempotent).
    pub fn add_target(&mut self, target: WatchTarget) -> Result<bool, CoreError> {
        if self.status != WatchStatus::Configuring {
            return Err(CoreError::InvalidState(
                "watch targets cannot be added while monitoring",
            ));
        }
        if self.entries.iter().any(|t| t.same_key(&target)) {
            return Ok(false);
        }
        self.entries.push(target);
        Ok(true)
    }

    /// Clears all targets. Allowed in any state; never triggers the pending
    /// action. Returns the number of removed targets.
    pub fn remove_all(&mut self) -> usize {
        let removed = self.entries.len();
        self.status = WatchStatus::Cleared;
        self.reset();
        removed
    }

    /// Starts monitoring with `action` armed behind the set.
    pub fn start_monitoring(&mut self, action: ActionKind) -> Result<u64, CoreError> {
        if self.status != WatchStatus::Configuring {
            return Err(CoreError::InvalidState("watch is already monitoring"));
        }
        if self.entries.is_empty() {
            return Err(CoreError::EmptySet);
        }
        self.status = WatchStatus::Monitoring;
        self.pending = Some(action);
        self.generation += 1;
        Ok(self.generation)
    }

    /// One poll tick against a process-table snapshot. Only ever shrinks the
    /// set; transitions to Completed exactly once, when the last entry goes.
    pub fn poll(&mut self, live: &[ProcessRecord]) -> WatchPoll {
        if self.status != WatchStatus::Monitoring {
            return WatchPoll::Inactive;
        }

        let mut gone = Vec::new();
        self.entries.retain_mut(|entry| {
            if target_is_gone(entry, live) {
                gone.push(entry.display_name());
                false
            } else {
                true
            }
        });

        if self.entries.is_empty() {
            self.status = WatchStatus::Completed;
            // start_monitoring guarantees pending is set; fall back to a
            // clean reset if it somehow is not.
            match self.pending {
                Some(action) => WatchPoll::Completed(action, gone),
                None => {
                    self.reset();
                    WatchPoll::Inactive
                }
            }
        } else if gone.is_empty() {
            WatchPoll::Unchanged
        } else {
            WatchPoll::Shrunk(gone)
        }
    }

    /// Resets to empty/Configuring after the completed action was issued.
    pub fn acknowledge_completed(&mut self) {
        if self.status == WatchStatus::Completed {
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.entries.clear();
        self.pending = None;
        self.status = WatchStatus::Configuring;
    }

    pub fn status(&self) -> WatchStatus {
        self.status
    }

    pub fn pending(&self) -> Option<ActionKind> {
        self.pending
    }

    pub fn entries(&self) -> &[WatchTarget] {
        &self.entries
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Decides whether a target is gone, binding name-only targets to a pid on
/// first sighting and refreshing bookkeeping on live ones.
fn target_is_gone(entry: &mut WatchTarget, live: &[ProcessRecord]) -> bool {
    match entry.pid {
        Some(pid) => match live.iter().find(|p| p.pid == pid) {
            None => true,
            Some(process) => match entry.started_at {
                // Same pid, different start time: the pid was reused by a
                // new process, so the one we were tracking is gone.
                Some(started) => process.start_time != started,
                None => {
                    entry.started_at = Some(process.start_time);
                    if entry.name.is_empty() {
                        entry.name = process.name.clone();
                    }
                    false
                }
            },
        },
        None => {
            if let Some(process) = live
                .iter()
                .find(|p| p.name.eq_ignore_ascii_case(&entry.name))
            {
                entry.pid = Some(process.pid);
                entry.started_at = Some(process.start_time);
            }
            // Never gone by absence until first observed running.
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pid: u32, name: &str) -> ProcessRecord {
        ProcessRecord {
            pid,
            name: name.into(),
            start_time: 1000,
        }
    }

    fn monitoring_set(targets: Vec<WatchTarget>) -> WatchSet {
        let mut set = WatchSet::new();
        for target in targets {
            set.add_target(target).unwrap();
        }
        set.start_monitoring(ActionKind::Restart).unwrap();
        set
    }

    // ── add_target ────────────────────────────────────────────────────────────

    #[test]
    fn add_target_is_idempotent_by_pid() {
        let mut set = WatchSet::new();
        assert!(set.add_target(WatchTarget::by_pid(1234)).unwrap());
        assert!(!set.add_target(WatchTarget::by_pid(1234)).unwrap());
        assert_eq!(set.entries().len(), 1);
    }

    #[test]
    fn add_target_is_idempotent_by_name_case_insensitive() {
        let mut set = WatchSet::new();
        assert!(set.add_target(WatchTarget::by_name("Chrome.exe")).unwrap());
        assert!(!set.add_target(WatchTarget::by_name("chrome.EXE")).unwrap());
        assert_eq!(set.entries().len(), 1);
    }

    #[test]
    fn pid_and_name_targets_do_not_collide() {
        let mut set = WatchSet::new();
        assert!(set.add_target(WatchTarget::by_pid(42)).unwrap());
        assert!(set.add_target(WatchTarget::by_name("42")).unwrap());
        assert_eq!(set.entries().len(), 2);
    }

    #[test]
    fn add_target_fails_while_monitoring() {
        let mut set = monitoring_set(vec![WatchTarget::by_pid(1)]);
        let err = set.add_target(WatchTarget::by_pid(2)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
        assert_eq!(set.entries().len(), 1);
    }

    // ── start_monitoring / remove_all ─────────────────────────────────────────

    #[test]
    fn start_monitoring_requires_targets() {
        let mut set = WatchSet::new();
        assert!(matches!(
            set.start_monitoring(ActionKind::Shutdown),
            Err(CoreError::EmptySet)
        ));
        assert_eq!(set.status(), WatchStatus::Configuring);
    }

    #[test]
    fn start_monitoring_twice_is_invalid() {
        let mut set = monitoring_set(vec![WatchTarget::by_pid(1)]);
        assert!(matches!(
            set.start_monitoring(ActionKind::Shutdown),
            Err(CoreError::InvalidState(_))
        ));
    }

    #[test]
    fn remove_all_never_triggers_and_returns_to_configuring() {
        let mut set = monitoring_set(vec![WatchTarget::by_pid(1)]);
        assert_eq!(set.remove_all(), 1);
        assert_eq!(set.status(), WatchStatus::Configuring);
        assert!(set.pending().is_none());
        // A subsequent poll reports nothing to do.
        assert_eq!(set.poll(&[]), WatchPoll::Inactive);
    }

    #[test]
    fn generation_bumps_per_monitoring_session() {
        let mut set = WatchSet::new();
        set.add_target(WatchTarget::by_pid(1)).unwrap();
        let first = set.start_monitoring(ActionKind::Shutdown).unwrap();
        set.remove_all();
        set.add_target(WatchTarget::by_pid(2)).unwrap();
        let second = set.start_monitoring(ActionKind::Shutdown).unwrap();
        assert!(second > first);
    }

    // ── poll ──────────────────────────────────────────────────────────────────

    #[test]
    fn pid_target_gone_when_absent_from_snapshot() {
        let mut set = monitoring_set(vec![WatchTarget::by_pid(1234), WatchTarget::by_pid(99)]);

        match set.poll(&[record(99, "other")]) {
            WatchPoll::Shrunk(gone) => assert_eq!(gone, vec!["pid 1234"]),
            other => panic!("unexpected poll outcome: {other:?}"),
        }
        assert_eq!(set.entries().len(), 1);
        assert_eq!(set.status(), WatchStatus::Monitoring);
    }

    #[test]
    fn last_target_gone_completes_with_pending_action() {
        let mut set = monitoring_set(vec![WatchTarget::by_pid(1234)]);

        match set.poll(&[record(99, "other")]) {
            WatchPoll::Completed(action, gone) => {
                assert_eq!(action, ActionKind::Restart);
                assert_eq!(gone.len(), 1);
            }
            other => panic!("unexpected poll outcome: {other:?}"),
        }
        assert_eq!(set.status(), WatchStatus::Completed);

        set.acknowledge_completed();
        assert_eq!(set.status(), WatchStatus::Configuring);
        assert!(set.entries().is_empty());
        // Completion is reported exactly once.
        assert_eq!(set.poll(&[]), WatchPoll::Inactive);
    }

    #[test]
    fn entries_only_shrink_while_monitoring() {
        let mut set = monitoring_set(vec![
            WatchTarget::by_pid(1),
            WatchTarget::by_pid(2),
            WatchTarget::by_pid(3),
        ]);
        let mut last_len = set.entries().len();
        let snapshots: [&[ProcessRecord]; 3] = [
            &[record(1, "a"), record(2, "b"), record(3, "c")],
            &[record(1, "a"), record(3, "c")],
            &[record(1, "a"), record(2, "reused"), record(3, "c")],
        ];
        for snapshot in snapshots {
            set.poll(snapshot);
            assert!(set.entries().len() <= last_len);
            last_len = set.entries().len();
        }
        // pid 2 left and its later reappearance (a new process) is ignored.
        assert_eq!(last_len, 2);
    }

    #[test]
    fn name_target_waits_until_first_seen_then_tracks_pid() {
        let mut set = monitoring_set(vec![WatchTarget::by_name("ffmpeg")]);

        // Absent: a name-only marker is never gone before first sighting.
        assert_eq!(set.poll(&[record(1, "bash")]), WatchPoll::Unchanged);
        assert_eq!(set.entries().len(), 1);

        // First sighting binds the pid.
        assert_eq!(
            set.poll(&[record(7, "FFMPEG"), record(1, "bash")]),
            WatchPoll::Unchanged
        );
        assert_eq!(set.entries()[0].pid, Some(7));

        // Once bound, disappearance completes the watch.
        match set.poll(&[record(1, "bash")]) {
            WatchPoll::Completed(ActionKind::Restart, _) => {}
            other => panic!("unexpected poll outcome: {other:?}"),
        }
    }

    #[test]
    fn reused_pid_with_new_start_time_counts_as_gone() {
        let mut set = monitoring_set(vec![WatchTarget::by_pid(500)]);

        // First sighting records the start time.
        set.poll(&[record(500, "job")]);

        let reused = ProcessRecord {
            pid: 500,
            name: "job".into(),
            start_time: 2000,
        };
        match set.poll(&[reused]) {
            WatchPoll::Completed(_, gone) => assert_eq!(gone, vec!["job (pid 500)"]),
            other => panic!("unexpected poll outcome: {other:?}"),
        }
    }

    #[test]
    fn pid_target_never_seen_alive_is_gone_on_first_poll() {
        let mut set = monitoring_set(vec![WatchTarget::by_pid(424242)]);
        assert!(matches!(set.poll(&[]), WatchPoll::Completed(..)));
    }

    #[test]
    fn pid_entry_picks_up_process_name_when_observed() {
        let mut set = monitoring_set(vec![WatchTarget::by_pid(7)]);
        set.poll(&[record(7, "ffmpeg")]);
        assert_eq!(set.entries()[0].display_name(), "ffmpeg (pid 7)");
    }
}
