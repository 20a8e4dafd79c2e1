//! Per-user update sequence (`pts`, `qts`, `seq`) and difference replay.

use std::collections::VecDeque;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// `pts` of a user with no updates yet.
pub const INITIAL_PTS: i32 = 1;

/// Updates kept for `getDifference` by default.
pub const DEFAULT_RETENTION: usize = 1000;

/// Counters reported by `updates.getState`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpdateState {
    pub pts: i32,
    pub qts: i32,
    pub seq: i32,
    pub date: i32,
}

/// One retained update.
#[derive(Clone, Debug, PartialEq)]
pub struct LoggedUpdate {
    /// `pts` after this update was applied.
    pub pts: i32,
    pub pts_count: i32,
    /// Encoded update object.
    pub update: Vec<u8>,
}

/// Answer to a difference request.
#[derive(Clone, Debug, PartialEq)]
pub enum Difference {
    /// The client is up to date.
    Empty(UpdateState),
    /// Every update after the client's `pts`, oldest first.
    Slice { updates: Vec<LoggedUpdate>, state: UpdateState },
    /// Some of the missing updates are no longer retained.
    TooLong(UpdateState),
}

/// Rejected counter changes. The log is left untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateError {
    /// `pts_count` below 1.
    InvalidCount(i32),
    /// The counter would pass `i32::MAX`.
    Overflow,
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCount(n) => write!(f, "pts_count must be positive, got {n}"),
            Self::Overflow => write!(f, "update counter overflow"),
        }
    }
}

impl std::error::Error for UpdateError {}

/// Update history of one user.
#[derive(Clone, Debug)]
pub struct UpdateLog {
    state: UpdateState,
    entries: VecDeque<LoggedUpdate>,
    /// `pts` of the newest evicted entry.
    floor: i32,
    /// Set once any entry has been dropped.
    evicted: bool,
    retention: usize,
}

impl Default for UpdateLog {
    fn default() -> Self { Self::with_retention(DEFAULT_RETENTION) }
}

impl UpdateLog {
    pub fn new() -> Self { Self::default() }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            state: UpdateState { pts: INITIAL_PTS, qts: 0, seq: 0, date: unix_now() },
            entries: VecDeque::new(),
            floor: INITIAL_PTS,
            evicted: false,
            retention: retention.max(1),
        }
    }

    pub fn state(&self) -> UpdateState { self.state }

    /// Apply an update worth `pts_count` and return the new `pts`.
    pub fn push(&mut self, pts_count: i32, update: Vec<u8>) -> Result<i32, UpdateError> {
        self.push_at(pts_count, update, unix_now())
    }

    pub fn push_at(&mut self, pts_count: i32, update: Vec<u8>, date: i32) -> Result<i32, UpdateError> {
        if pts_count < 1 {
            return Err(UpdateError::InvalidCount(pts_count));
        }
        self.state.pts = self.state.pts.checked_add(pts_count).ok_or(UpdateError::Overflow)?;
        self.state.date = date;
        self.entries.push_back(LoggedUpdate { pts: self.state.pts, pts_count, update });
        while self.entries.len() > self.retention {
            if let Some(dropped) = self.entries.pop_front() {
                self.floor = dropped.pts;
                self.evicted = true;
            }
        }
        Ok(self.state.pts)
    }

    pub fn bump_qts(&mut self) -> Result<i32, UpdateError> {
        self.state.qts = self.state.qts.checked_add(1).ok_or(UpdateError::Overflow)?;
        Ok(self.state.qts)
    }

    pub fn bump_seq(&mut self) -> Result<i32, UpdateError> {
        self.state.seq = self.state.seq.checked_add(1).ok_or(UpdateError::Overflow)?;
        Ok(self.state.seq)
    }

    /// Updates a client at `since_pts` has missed.
    pub fn difference(&self, since_pts: i32) -> Difference {
        if since_pts >= self.state.pts {
            return Difference::Empty(self.state);
        }
        if self.evicted && since_pts < self.floor {
            return Difference::TooLong(self.state);
        }
        let updates: Vec<LoggedUpdate> = self.entries.iter().filter(|e| e.pts > since_pts).cloned().collect();
        if updates.is_empty() {
            Difference::Empty(self.state)
        } else {
            Difference::Slice { updates, state: self.state }
        }
    }
}

fn unix_now() -> i32 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i32).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_log_starts_at_one() {
        let log = UpdateLog::new();
        assert_eq!(log.state().pts, 1);
        assert!(matches!(log.difference(1), Difference::Empty(_)));
    }

    #[test]
    fn push_advances_by_count() {
        let mut log = UpdateLog::new();
        assert_eq!(log.push(1, vec![1]), Ok(2));
        assert_eq!(log.push(2, vec![2]), Ok(4));
        assert_eq!(log.bump_qts(), Ok(1));
        assert_eq!(log.bump_seq(), Ok(1));
    }

    #[test]
    fn non_positive_counts_are_rejected() {
        let mut log = UpdateLog::new();
        assert_eq!(log.push(0, vec![]), Err(UpdateError::InvalidCount(0)));
        assert_eq!(log.push(-3, vec![]), Err(UpdateError::InvalidCount(-3)));
        assert_eq!(log.state().pts, INITIAL_PTS);
        assert!(matches!(log.difference(0), Difference::Empty(_)));
    }
}
