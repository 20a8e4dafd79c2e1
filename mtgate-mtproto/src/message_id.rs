//! Server message ids.
//!
//! The high 32 bits carry unix seconds and the low 32 bits a sub-second
//! fraction, so ids track wall-clock time. Ids are strictly increasing for
//! the whole process: one generator is shared by every connection, and a
//! clock that stalls or steps back only makes the next id `last + 4`.
//! The two low bits mark the kind: `01` answers, `11` server-initiated
//! messages. Client ids are multiples of four.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// What a server message is, encoded in the id's low bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// Reply to a client message (`rpc_result`, `pong`, ...).
    Response,
    /// Sent on the server's own initiative (updates, `new_session_created`).
    Notification,
}

impl MessageKind {
    fn bits(self) -> i64 {
        match self {
            Self::Response => 1,
            Self::Notification => 3,
        }
    }
}

/// Lock-free, strictly increasing id source.
#[derive(Debug, Default)]
pub struct MessageIdGenerator {
    last: AtomicI64,
}

impl MessageIdGenerator {
    pub const fn new() -> Self {
        Self { last: AtomicI64::new(0) }
    }

    /// Next id for a message of `kind`, stamped with the current time.
    pub fn next(&self, kind: MessageKind) -> i64 {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        self.next_at(now, kind)
    }

    /// Next id given an explicit time since the epoch.
    pub fn next_at(&self, now: Duration, kind: MessageKind) -> i64 {
        let fraction = ((now.subsec_nanos() as u64) << 2) & 0xffff_fffc;
        let candidate = ((now.as_secs() << 32) | fraction) as i64;

        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let base = candidate.max(last + 4);
            match self.last.compare_exchange_weak(last, base, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return base | kind.bits(),
                Err(current) => last = current,
            }
        }
    }
}

/// The process-wide generator used for every outgoing message.
pub static SERVER_MESSAGE_IDS: MessageIdGenerator = MessageIdGenerator::new();

/// Shorthand for `SERVER_MESSAGE_IDS.next(kind)`.
pub fn next_message_id(kind: MessageKind) -> i64 {
    SERVER_MESSAGE_IDS.next(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_is_in_the_high_bits() {
        let ids = MessageIdGenerator::new();
        let id = ids.next_at(Duration::new(1_700_000_000, 500), MessageKind::Response);
        assert_eq!(id >> 32, 1_700_000_000);
        assert_eq!(id & 3, 1);
    }

    #[test]
    fn backwards_clock_still_increases() {
        let ids = MessageIdGenerator::new();
        let first = ids.next_at(Duration::new(1_700_000_100, 0), MessageKind::Notification);
        let second = ids.next_at(Duration::new(1_700_000_000, 0), MessageKind::Notification);
        assert!(second > first);
        assert_eq!(second & 3, 3);
    }

    #[test]
    fn same_instant_yields_distinct_ids() {
        let ids = MessageIdGenerator::new();
        let t = Duration::new(1_700_000_000, 123);
        let a = ids.next_at(t, MessageKind::Response);
        let b = ids.next_at(t, MessageKind::Response);
        assert_eq!(b - a, 4);
    }
}
