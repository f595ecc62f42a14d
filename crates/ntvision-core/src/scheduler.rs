use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

/// Independently refreshed slice of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshGroup {
    Stats,
    Detections,
    Activity,
}

impl RefreshGroup {
    pub const ALL: [RefreshGroup; 3] = [RefreshGroup::Stats, RefreshGroup::Detections, RefreshGroup::Activity];

    fn index(self) -> usize {
        match self {
            RefreshGroup::Stats => 0,
            RefreshGroup::Detections => 1,
            RefreshGroup::Activity => 2,
        }
    }
}

impl fmt::Display for RefreshGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RefreshGroup::Stats => "stats",
            RefreshGroup::Detections => "detections",
            RefreshGroup::Activity => "activity",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GroupPhase {
    Idle,
    InFlight,
    Backoff,
    FailedTerminal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshState {
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureVerdict {
    RetryAfter(Duration),
    Terminal,
}

/// Retry bookkeeping for one group.
#[derive(Debug, Clone)]
pub struct GroupTracker {
    phase: GroupPhase,
    state: RefreshState,
    last_success_at: Option<Instant>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl GroupTracker {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            phase: GroupPhase::Idle,
            state: RefreshState::default(),
            last_success_at: None,
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    pub fn phase(&self) -> GroupPhase {
        self.phase
    }

    pub fn state(&self) -> &RefreshState {
        &self.state
    }

    pub fn begin_attempt(&mut self) {
        self.phase = GroupPhase::InFlight;
    }

    pub fn record_success(&mut self, at: Instant, ts: DateTime<Utc>) {
        self.phase = GroupPhase::Idle;
        self.state.consecutive_failures = 0;
        self.state.last_success = Some(ts);
        self.last_success_at = Some(at);
    }

    /// `attempt` is the 1-based attempt number within the calling pass; the
    /// budget belongs to that pass, not to the shared tracker.
    pub fn record_failure(&mut self, attempt: u32) -> FailureVerdict {
        self.state.consecutive_failures = (self.state.consecutive_failures + 1).min(self.max_attempts);
        if attempt >= self.max_attempts {
            self.phase = GroupPhase::FailedTerminal;
            FailureVerdict::Terminal
        } else {
            self.phase = GroupPhase::Backoff;
            FailureVerdict::RetryAfter(self.retry_delay)
        }
    }

    /// Whether a periodic tick may start a pass for this group.
    pub fn is_due(&self, now: Instant, interval: Duration) -> bool {
        if self.phase != GroupPhase::Idle {
            return false;
        }
        self.last_success_at
            .map(|at| now.saturating_duration_since(at) >= interval)
            .unwrap_or(true)
    }

    /// Lets a terminal group be polled again; success history is kept.
    /// Groups that are busy or idle are left alone.
    pub fn rearm(&mut self) {
        if self.phase == GroupPhase::FailedTerminal {
            self.phase = GroupPhase::Idle;
            self.state.consecutive_failures = 0;
        }
    }

    pub fn reset(&mut self) {
        self.phase = GroupPhase::Idle;
        self.state = RefreshState::default();
        self.last_success_at = None;
    }
}

/// Trackers for every group.
#[derive(Debug, Clone)]
pub struct RefreshBook {
    groups: [GroupTracker; 3],
}

impl RefreshBook {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        let tracker = GroupTracker::new(max_attempts, retry_delay);
        Self {
            groups: [tracker.clone(), tracker.clone(), tracker],
        }
    }

    pub fn get(&self, group: RefreshGroup) -> &GroupTracker {
        &self.groups[group.index()]
    }

    pub fn get_mut(&mut self, group: RefreshGroup) -> &mut GroupTracker {
        &mut self.groups[group.index()]
    }

    pub fn due(&self, now: Instant, interval: Duration) -> Vec<RefreshGroup> {
        RefreshGroup::ALL
            .into_iter()
            .filter(|g| self.get(*g).is_due(now, interval))
            .collect()
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.groups.iter().filter_map(|t| t.state.last_success).max()
    }

    pub fn reset_all(&mut self) {
        for tracker in &mut self.groups {
            tracker.reset();
        }
    }

    pub fn rearm_all(&mut self) {
        for tracker in &mut self.groups {
            tracker.rearm();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn third_failure_is_terminal() {
        let mut tracker = GroupTracker::new(3, Duration::from_secs(2));

        tracker.begin_attempt();
        assert_eq!(tracker.record_failure(1), FailureVerdict::RetryAfter(Duration::from_secs(2)));
        assert_eq!(tracker.phase(), GroupPhase::Backoff);
        tracker.begin_attempt();
        assert_eq!(tracker.record_failure(2), FailureVerdict::RetryAfter(Duration::from_secs(2)));
        tracker.begin_attempt();
        assert_eq!(tracker.record_failure(3), FailureVerdict::Terminal);

        assert_eq!(tracker.phase(), GroupPhase::FailedTerminal);
        assert_eq!(tracker.state().consecutive_failures, 3);
    }

    #[test]
    fn failure_count_stays_bounded() {
        let mut tracker = GroupTracker::new(3, Duration::from_secs(2));
        for attempt in 1..=10 {
            tracker.record_failure(attempt);
        }
        assert_eq!(tracker.state().consecutive_failures, 3);
    }

    #[test]
    fn success_resets_failures() {
        let mut tracker = GroupTracker::new(3, Duration::from_secs(2));
        tracker.record_failure(1);

        tracker.record_success(Instant::now(), Utc::now());

        assert_eq!(tracker.phase(), GroupPhase::Idle);
        assert_eq!(tracker.state().consecutive_failures, 0);
        assert!(tracker.state().last_success.is_some());
    }

    #[test]
    fn periodic_gate_waits_a_full_interval_after_success() {
        let interval = Duration::from_secs(5);
        let start = Instant::now();
        let mut tracker = GroupTracker::new(3, Duration::from_secs(2));
        assert!(tracker.is_due(start, interval));

        tracker.record_success(start, Utc::now());

        assert!(!tracker.is_due(start + Duration::from_secs(4), interval));
        assert!(tracker.is_due(start + interval, interval));
    }

    #[test]
    fn busy_or_terminal_groups_are_never_due() {
        let interval = Duration::from_secs(5);
        let now = Instant::now();
        let mut tracker = GroupTracker::new(1, Duration::from_secs(2));

        tracker.begin_attempt();
        assert!(!tracker.is_due(now, interval));
        tracker.record_failure(1);
        assert_eq!(tracker.phase(), GroupPhase::FailedTerminal);
        assert!(!tracker.is_due(now + Duration::from_secs(60), interval));

        tracker.rearm();
        assert!(tracker.is_due(now, interval));
    }

    #[test]
    fn rearm_leaves_backoff_untouched() {
        let mut tracker = GroupTracker::new(3, Duration::from_secs(2));
        tracker.begin_attempt();
        tracker.record_failure(1);

        tracker.rearm();

        assert_eq!(tracker.phase(), GroupPhase::Backoff);
        assert_eq!(tracker.state().consecutive_failures, 1);
    }

    #[test]
    fn book_lists_due_groups_in_fixed_order() {
        let now = Instant::now();
        let mut book = RefreshBook::new(3, Duration::from_secs(2));
        book.get_mut(RefreshGroup::Detections).record_success(now, Utc::now());

        assert_eq!(
            book.due(now, Duration::from_secs(5)),
            vec![RefreshGroup::Stats, RefreshGroup::Activity]
        );
    }
}
