//! Per-connection session state.

use std::collections::{HashSet, VecDeque};

/// Wrapper message ids remembered for `new_session_created` dedup.
const MAX_ANNOUNCED: usize = 1024;

/// Tracks the client's session as seen by the server on one connection.
///
/// The salt and session id are whatever the client last sent and are
/// echoed back unchanged. `seq_no` follows the MTProto rule: each
/// content-related message gets `2n + 1` and advances `n`, every other
/// message gets `2n`.
#[derive(Debug, Default)]
pub struct SessionTracker {
    session_id: Option<i64>,
    salt: i64,
    unique_id: i64,
    sequence: i32,
    announced: HashSet<i64>,
    announced_order: VecDeque<i64>,
}

impl SessionTracker {
    pub fn new() -> Self { Self::default() }

    /// Record the salt and session id of an incoming message.
    ///
    /// Returns `true` when this is a different session from the last one,
    /// in which case `seq_no` and the dedup set start over and `unique_id`
    /// is generated afresh.
    pub fn observe(&mut self, salt: i64, session_id: i64) -> Result<bool, mtgate_crypto::RandomError> {
        if self.session_id == Some(session_id) {
            self.salt = salt;
            return Ok(false);
        }
        let mut unique = [0u8; 8];
        mtgate_crypto::fill_random(&mut unique)?;
        Ok(self.observe_with_unique_id(salt, session_id, i64::from_le_bytes(unique)))
    }

    /// [`Self::observe`] with the `unique_id` for a new session supplied.
    pub fn observe_with_unique_id(&mut self, salt: i64, session_id: i64, unique_id: i64) -> bool {
        self.salt = salt;
        if self.session_id == Some(session_id) {
            return false;
        }
        if let Some(old) = self.session_id {
            log::debug!("[mtgate] session {old} replaced by {session_id}");
        }
        self.session_id = Some(session_id);
        self.unique_id = unique_id;
        self.sequence = 0;
        self.announced.clear();
        self.announced_order.clear();
        true
    }

    pub fn session_id(&self) -> Option<i64> { self.session_id }

    pub fn salt(&self) -> i64 { self.salt }

    /// Server-chosen id sent in `new_session_created`.
    pub fn unique_id(&self) -> i64 { self.unique_id }

    /// Allocate the `seq_no` for an outgoing message.
    pub fn next_seq_no(&mut self, content_related: bool) -> i32 {
        if content_related {
            let n = self.sequence * 2 + 1;
            self.sequence += 1;
            n
        } else {
            self.sequence * 2
        }
    }

    /// `true` exactly once per session-initiating wrapper `msg_id`.
    pub fn should_announce(&mut self, wrapper_msg_id: i64) -> bool {
        if !self.announced.insert(wrapper_msg_id) {
            return false;
        }
        self.announced_order.push_back(wrapper_msg_id);
        if self.announced_order.len() > MAX_ANNOUNCED {
            if let Some(oldest) = self.announced_order.pop_front() {
                self.announced.remove(&oldest);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_numbers_follow_content_rule() {
        let mut s = SessionTracker::new();
        assert_eq!(s.next_seq_no(false), 0);
        assert_eq!(s.next_seq_no(true), 1);
        assert_eq!(s.next_seq_no(true), 3);
        assert_eq!(s.next_seq_no(false), 4);
        assert_eq!(s.next_seq_no(true), 5);
    }

    #[test]
    fn announce_once_per_wrapper() {
        let mut s = SessionTracker::new();
        assert!(s.should_announce(100));
        assert!(!s.should_announce(100));
        assert!(s.should_announce(104));
    }

    #[test]
    fn new_session_resets_state() {
        let mut s = SessionTracker::new();
        assert!(s.observe_with_unique_id(1, 10, 77));
        s.next_seq_no(true);
        s.should_announce(100);
        assert!(!s.observe_with_unique_id(2, 10, 88));
        assert_eq!(s.salt(), 2);
        assert_eq!(s.unique_id(), 77);

        assert!(s.observe_with_unique_id(2, 11, 99));
        assert_eq!(s.unique_id(), 99);
        assert_eq!(s.next_seq_no(true), 1);
        assert!(s.should_announce(100));
    }

    #[test]
    fn dedup_memory_is_bounded() {
        let mut s = SessionTracker::new();
        for id in 0..(MAX_ANNOUNCED as i64 + 10) {
            assert!(s.should_announce(id * 4));
        }
        assert_eq!(s.announced.len(), MAX_ANNOUNCED);
        assert!(s.should_announce(0));
    }
}
