//! Per-target polling state: failure accounting, offline blocking and the
//! persistence gate.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Shared map of per-target state, keyed by the target's composite key.
pub type TargetStates = DashMap<String, TargetState>;

/// Outcome of recording a poll failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still counting toward the offline threshold.
    Counting(u32),
    /// Threshold reached: the target is now blocked and a zero-viewer
    /// observation should be emitted. The failure count restarts fresh.
    WentOffline,
}

/// Mutable state for one monitored target.
///
/// All three failure origins (navigation, missing viewer text, unexpected
/// errors) share this one counter and threshold.
#[derive(Debug, Clone, Default)]
pub struct TargetState {
    /// Consecutive poll failures.
    pub fail_count: u32,
    /// While set and in the future, polls are skipped entirely.
    pub blocked_until: Option<Instant>,
    /// Last viewer count considered for persistence.
    pub last_viewers: u64,
    /// Last time an observation was actually persisted.
    pub last_update_at: Option<Instant>,
}

impl TargetState {
    /// Whether the target is inside its offline block. An elapsed block is
    /// cleared, returning the target to active polling.
    pub fn is_blocked(&mut self, now: Instant) -> bool {
        match self.blocked_until {
            Some(until) if until > now => true,
            Some(_) => {
                self.blocked_until = None;
                false
            }
            None => false,
        }
    }

    /// Count a failure; at `max_fails` the target blocks for `block` and
    /// the counter resets so the next window starts fresh.
    pub fn record_failure(
        &mut self,
        max_fails: u32,
        block: Duration,
        now: Instant,
    ) -> FailureOutcome {
        self.fail_count += 1;
        if self.fail_count >= max_fails {
            self.blocked_until = Some(now + block);
            self.fail_count = 0;
            self.last_update_at = Some(now);
            FailureOutcome::WentOffline
        } else {
            FailureOutcome::Counting(self.fail_count)
        }
    }

    /// A poll that extracted text resets the failure counter.
    pub fn record_success(&mut self) {
        self.fail_count = 0;
    }

    /// Persistence gate: write when the observation changed significantly,
    /// crossed zero in either direction, or the last write is stale.
    pub fn should_persist(
        &self,
        viewers: u64,
        change_threshold: f64,
        min_update_interval: Duration,
        now: Instant,
    ) -> bool {
        let changed = self.last_viewers == 0 || viewers == 0 || {
            let base = self.last_viewers.max(1) as f64;
            let delta = (viewers as f64 - self.last_viewers as f64).abs();
            delta / base >= change_threshold
        };

        let stale = match self.last_update_at {
            Some(at) => now.duration_since(at) >= min_update_interval,
            None => true,
        };

        changed || stale
    }

    /// Record that an observation was written.
    pub fn mark_persisted(&mut self, viewers: u64, now: Instant) {
        self.last_viewers = viewers;
        self.last_update_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: Duration = Duration::from_secs(600);

    #[test]
    fn test_threshold_fires_once_then_counts_fresh() {
        let mut state = TargetState::default();
        let now = Instant::now();

        assert_eq!(
            state.record_failure(2, BLOCK, now),
            FailureOutcome::Counting(1)
        );
        assert_eq!(
            state.record_failure(2, BLOCK, now),
            FailureOutcome::WentOffline
        );
        assert_eq!(state.fail_count, 0);
        assert!(state.blocked_until.is_some());

        // After the block expires, the next failure starts at 1 again.
        let after_block = now + BLOCK + Duration::from_secs(1);
        assert!(!state.is_blocked(after_block));
        assert_eq!(
            state.record_failure(2, BLOCK, after_block),
            FailureOutcome::Counting(1)
        );
    }

    #[test]
    fn test_blocked_until_elapsed() {
        let mut state = TargetState::default();
        let now = Instant::now();
        state.record_failure(1, BLOCK, now);

        assert!(state.is_blocked(now + Duration::from_secs(1)));
        assert!(!state.is_blocked(now + BLOCK + Duration::from_secs(1)));
        assert!(state.blocked_until.is_none());
    }

    #[test]
    fn test_success_resets_counter() {
        let mut state = TargetState::default();
        state.record_failure(5, BLOCK, Instant::now());
        state.record_failure(5, BLOCK, Instant::now());
        state.record_success();
        assert_eq!(state.fail_count, 0);
    }

    #[test]
    fn test_gate_zero_threshold_always_persists() {
        let now = Instant::now();
        let mut state = TargetState::default();
        state.mark_persisted(100, now);

        // Unchanged value with threshold 0: relative change 0 >= 0 counts
        // as significant.
        assert!(state.should_persist(100, 0.0, Duration::from_secs(30), now));
    }

    #[test]
    fn test_gate_below_threshold_waits_for_staleness() {
        let now = Instant::now();
        let mut state = TargetState::default();
        state.mark_persisted(100, now);

        let min_interval = Duration::from_secs(30);
        // 2% change against a 10% threshold: gated.
        assert!(!state.should_persist(102, 0.1, min_interval, now + Duration::from_secs(1)));
        // Same observation once the interval elapses: persisted.
        assert!(state.should_persist(102, 0.1, min_interval, now + min_interval));
    }

    #[test]
    fn test_gate_zero_transitions_always_persist() {
        let now = Instant::now();
        let mut state = TargetState::default();
        state.mark_persisted(100, now);

        assert!(state.should_persist(0, 0.5, Duration::from_secs(3600), now));

        state.mark_persisted(0, now);
        assert!(state.should_persist(7, 0.5, Duration::from_secs(3600), now));
    }

    #[test]
    fn test_gate_first_observation_persists() {
        let state = TargetState::default();
        assert!(state.should_persist(0, 0.5, Duration::from_secs(3600), Instant::now()));
    }
}
