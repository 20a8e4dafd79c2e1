//! Update sequences shared by every connection.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use mtgate_mtproto::updates::DEFAULT_RETENTION;
use mtgate_mtproto::{Difference, UpdateError, UpdateLog, UpdateState};

/// One [`UpdateLog`] per user id behind a single lock.
///
/// Logs are created on first use. The lock is held only for the counter
/// update itself, never across an await point.
pub struct UpdateTracker {
    logs: Mutex<HashMap<i64, UpdateLog>>,
    retention: usize,
}

impl Default for UpdateTracker {
    fn default() -> Self { Self::with_retention(DEFAULT_RETENTION) }
}

impl UpdateTracker {
    pub fn new() -> Self { Self::default() }

    pub fn with_retention(retention: usize) -> Self {
        Self { logs: Mutex::new(HashMap::new()), retention }
    }

    fn logs(&self) -> MutexGuard<'_, HashMap<i64, UpdateLog>> {
        // A panic mid-update cannot leave a log half-written.
        self.logs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_log<T>(&self, user_id: i64, f: impl FnOnce(&mut UpdateLog) -> T) -> T {
        let mut logs = self.logs();
        let log = logs.entry(user_id).or_insert_with(|| UpdateLog::with_retention(self.retention));
        f(log)
    }

    /// Current counters, as reported by `updates.getState`.
    pub fn state(&self, user_id: i64) -> UpdateState {
        self.with_log(user_id, |log| log.state())
    }

    /// Record a state change worth `pts_count` and return the new `pts`.
    pub fn push(&self, user_id: i64, pts_count: i32, update: Vec<u8>) -> Result<i32, UpdateError> {
        match self.with_log(user_id, |log| log.push(pts_count, update)) {
            Ok(pts) => {
                log::trace!("[mtgate] user {user_id} pts -> {pts}");
                Ok(pts)
            }
            Err(e) => {
                log::warn!("[mtgate] user {user_id}: update rejected: {e}");
                Err(e)
            }
        }
    }

    pub fn bump_qts(&self, user_id: i64) -> Result<i32, UpdateError> {
        self.with_log(user_id, UpdateLog::bump_qts)
    }

    pub fn bump_seq(&self, user_id: i64) -> Result<i32, UpdateError> {
        self.with_log(user_id, UpdateLog::bump_seq)
    }

    /// Everything `user_id` missed since `since_pts`.
    pub fn difference(&self, user_id: i64, since_pts: i32) -> Difference {
        self.with_log(user_id, |log| log.difference(since_pts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn users_have_independent_counters() {
        let tracker = UpdateTracker::new();
        assert_eq!(tracker.push(1, 1, vec![0xaa]), Ok(2));
        assert_eq!(tracker.push(1, 1, vec![0xbb]), Ok(3));
        assert_eq!(tracker.state(2).pts, 1);
        assert_eq!(tracker.bump_qts(2), Ok(1));
        assert_eq!(tracker.state(1).qts, 0);
    }

    #[test]
    fn difference_replays_in_order() {
        let tracker = UpdateTracker::new();
        for b in 0..4u8 {
            tracker.push(7, 1, vec![b]).unwrap();
        }
        match tracker.difference(7, 3) {
            Difference::Slice { updates, state } => {
                let bodies: Vec<u8> = updates.iter().map(|u| u.update[0]).collect();
                assert_eq!(bodies, [2, 3]);
                assert_eq!(state.pts, 5);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejected_update_leaves_the_user_untouched() {
        let tracker = UpdateTracker::new();
        assert_eq!(tracker.push(3, 0, vec![]), Err(UpdateError::InvalidCount(0)));
        assert_eq!(tracker.state(3).pts, 1);
    }
}
