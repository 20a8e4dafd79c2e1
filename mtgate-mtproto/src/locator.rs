//! Finding messages inside a decoded byte buffer.
//!
//! The transport prefix in front of each message is not trusted, so the
//! buffer is searched instead of parsed at fixed offsets. Plaintext
//! handshake requests are recognised by their zero key id, encrypted
//! messages by the connection's key id followed by a ciphertext whose
//! message key checks out.

use std::ops::Range;

use mtgate_crypto::{AuthKey, Side, aes, calc_key, message_key};

use crate::encrypted::{self, DecryptedMessage, HEADER_LEN, MIN_PADDING};
use crate::handshake::HandshakeRequest;
use crate::plain::PlainMessage;

/// Smallest ciphertext that can hold a message: header, 4-byte body, padding.
const MIN_CIPHERTEXT_LEN: usize = (HEADER_LEN + 4 + MIN_PADDING).div_ceil(16) * 16;

/// Bounds on the work done per call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    /// Longest ciphertext considered for one message.
    pub max_ciphertext_len: usize,
    /// Offsets carrying the key id examined per call.
    pub max_candidates: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self { max_ciphertext_len: 1 << 20, max_candidates: 64 }
    }
}

// ─── Plaintext ────────────────────────────────────────────────────────────────

/// A handshake request found by [`locate_plain`].
#[derive(Clone, Debug, PartialEq)]
pub struct PlainLocated {
    pub request: HandshakeRequest,
    pub msg_id: i64,
    /// Where the envelope starts.
    pub offset: usize,
    /// Bytes from the start of the buffer to the end of the envelope.
    pub consumed: usize,
}

/// Find the first plaintext handshake request in `buf`.
pub fn locate_plain(buf: &[u8]) -> Option<PlainLocated> {
    let last = buf.len().checked_sub(crate::plain::HEADER_LEN)?;
    (0..=last).find_map(|offset| {
        let (msg, len) = PlainMessage::parse(&buf[offset..])?;
        if msg.msg_id == 0 || msg.msg_id % 4 != 0 {
            return None;
        }
        let request = HandshakeRequest::decode(msg.body)?;
        Some(PlainLocated { request, msg_id: msg.msg_id, offset, consumed: offset + len })
    })
}

// ─── Encrypted ────────────────────────────────────────────────────────────────

/// One message found by [`locate_encrypted`].
#[derive(Clone, Debug, PartialEq)]
pub struct Located {
    pub message: DecryptedMessage,
    /// Span of `key_id ‖ msg_key ‖ ciphertext` within the buffer.
    pub span: Range<usize>,
}

/// Every message for `auth_key` in `buf`, in buffer order.
///
/// Returns the messages and the number of leading bytes they account for;
/// bytes after the last match are left for the caller to keep.
pub fn locate_encrypted(buf: &[u8], auth_key: &AuthKey, limits: Limits) -> (Vec<Located>, usize) {
    let key_id = auth_key.key_id();
    let mut found = Vec::new();
    let mut consumed = 0;
    let mut candidates = 0;
    let mut pos = 0;

    while pos + 8 <= buf.len() {
        if buf[pos..pos + 8] != key_id {
            pos += 1;
            continue;
        }
        candidates += 1;
        if candidates > limits.max_candidates {
            log::debug!("[mtgate] locator gave up after {} candidates", limits.max_candidates);
            break;
        }
        match try_decrypt_at(&buf[pos..], auth_key, limits.max_ciphertext_len) {
            Some((message, len)) => {
                found.push(Located { message, span: pos..pos + len });
                pos += len;
                consumed = pos;
            }
            None => pos += 1,
        }
    }

    (found, consumed)
}

/// Try to read one message from a frame starting with the key id.
///
/// The largest aligned ciphertext is decrypted once; shorter candidates
/// reuse its prefix since IGE decryption of a prefix is the prefix of the
/// decryption. Returns the message and the frame length it occupies.
pub fn try_decrypt_at(frame: &[u8], auth_key: &AuthKey, max_ciphertext_len: usize) -> Option<(DecryptedMessage, usize)> {
    let available = frame.len().checked_sub(24)?;
    let max_len = (available - available % 16).min(max_ciphertext_len - max_ciphertext_len % 16);
    if max_len < MIN_CIPHERTEXT_LEN {
        return None;
    }

    let msg_key: [u8; 16] = frame[8..24].try_into().ok()?;
    let (key, iv) = calc_key(auth_key, &msg_key, Side::Client);
    let mut plain = frame[24..24 + max_len].to_vec();
    aes::ige_decrypt(&mut plain, &key, &iv);

    let mut len = max_len;
    while len >= MIN_CIPHERTEXT_LEN {
        let candidate = &plain[..len];
        if encrypted::body_len_if_plausible(candidate).is_some()
            && message_key(auth_key, Side::Client, candidate) == msg_key
        {
            return DecryptedMessage::parse(candidate).map(|m| (m, 24 + len));
        }
        len -= 16;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encrypted::Envelope;
    use mtgate_tl::{Serializable, functions};

    fn key() -> AuthKey {
        AuthKey::from_bytes([0x5a; 256])
    }

    fn client_frame(msg_id: i64, body: &[u8]) -> Vec<u8> {
        let envelope = Envelope { salt: 11, session_id: 22, msg_id, seq_no: 1 };
        encrypted::pack(&key(), Side::Client, &envelope, body).unwrap()
    }

    #[test]
    fn min_ciphertext_is_one_aligned_message() {
        assert_eq!(MIN_CIPHERTEXT_LEN, 48);
    }

    #[test]
    fn finds_message_behind_a_length_prefix() {
        let mut buf = vec![0x12, 0, 0, 0];
        let frame = client_frame(4, &functions::Ping { ping_id: 1 }.to_bytes());
        buf.extend_from_slice(&frame);
        let (found, consumed) = locate_encrypted(&buf, &key(), Limits::default());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].span, 4..buf.len());
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn batch_is_returned_in_order() {
        let mut buf = client_frame(4, &[1; 4]);
        buf.extend(client_frame(8, &[2; 40]));
        let (found, _) = locate_encrypted(&buf, &key(), Limits::default());
        let ids: Vec<i64> = found.iter().map(|l| l.message.envelope.msg_id).collect();
        assert_eq!(ids, vec![4, 8]);
    }

    #[test]
    fn truncated_message_is_not_consumed() {
        let frame = client_frame(4, &[7; 64]);
        let (found, consumed) = locate_encrypted(&frame[..frame.len() - 16], &key(), Limits::default());
        assert!(found.is_empty());
        assert_eq!(consumed, 0);
    }

    #[test]
    fn candidate_cap_stops_scanning() {
        let mut buf = Vec::new();
        for _ in 0..4 {
            buf.extend(key().key_id());
            buf.extend([0u8; 64]);
        }
        buf.extend(client_frame(4, &[1; 4]));
        let limits = Limits { max_candidates: 2, ..Limits::default() };
        let (found, _) = locate_encrypted(&buf, &key(), limits);
        assert!(found.is_empty());
        let (found, _) = locate_encrypted(&buf, &key(), Limits::default());
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn plain_request_found_after_junk() {
        let body = functions::ReqPqMulti { nonce: [3; 16] }.to_bytes();
        let mut buf = vec![0x05];
        buf.extend(crate::plain::plain_message(0x6000_0000_0000_0000, &body));
        let located = locate_plain(&buf).unwrap();
        assert_eq!(located.offset, 1);
        assert_eq!(located.consumed, buf.len());
        assert_eq!(located.request, HandshakeRequest::ReqPq { nonce: [3; 16] });
    }

    #[test]
    fn plain_request_needs_aligned_msg_id() {
        let body = functions::ReqPqMulti { nonce: [3; 16] }.to_bytes();
        let buf = crate::plain::plain_message(0x6000_0000_0000_0001, &body);
        assert!(locate_plain(&buf).is_none());
    }
}
