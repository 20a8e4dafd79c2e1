//! MTProto 2.0 message envelopes.
//!
//! Plaintext layout before encryption:
//!
//! ```text
//! salt:       i64
//! session_id: i64
//! msg_id:     i64
//! seq_no:     i32
//! body_len:   i32
//! body:       [u8; body_len]
//! padding:    12..=1024 random bytes, total a multiple of 16
//! ```

use mtgate_crypto::{AuthKey, RandomError, Side, decrypt_data_v2, encrypt_data_v2};

/// Bytes of plaintext before the body.
pub const HEADER_LEN: usize = 32;
/// Smallest and largest padding a valid message carries.
pub const MIN_PADDING: usize = 12;
pub const MAX_PADDING: usize = 1024;

/// Errors from [`unpack`].
#[derive(Debug)]
pub enum DecryptError {
    /// The underlying crypto layer rejected the message.
    Crypto(mtgate_crypto::DecryptError),
    /// The plaintext header does not describe a well-formed message.
    Malformed,
}

impl std::fmt::Display for DecryptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Crypto(e) => write!(f, "crypto: {e}"),
            Self::Malformed => write!(f, "malformed inner message"),
        }
    }
}
impl std::error::Error for DecryptError {}

/// Session fields of one message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub salt: i64,
    pub session_id: i64,
    pub msg_id: i64,
    pub seq_no: i32,
}

/// A decrypted message.
#[derive(Clone, Debug, PartialEq)]
pub struct DecryptedMessage {
    pub envelope: Envelope,
    /// TL-serialized body, padding removed.
    pub body: Vec<u8>,
}

impl DecryptedMessage {
    /// Structural check of a decrypted plaintext.
    ///
    /// Only the header is examined: body length a positive multiple of four
    /// and padding within [`MIN_PADDING`]..=[`MAX_PADDING`].
    pub fn parse(plaintext: &[u8]) -> Option<Self> {
        let body_len = body_len_if_plausible(plaintext)?;
        let field = |at: usize| -> Option<i64> {
            Some(i64::from_le_bytes(plaintext.get(at..at + 8)?.try_into().ok()?))
        };
        let envelope = Envelope {
            salt: field(0)?,
            session_id: field(8)?,
            msg_id: field(16)?,
            seq_no: i32::from_le_bytes(plaintext.get(24..28)?.try_into().ok()?),
        };
        Some(Self { envelope, body: plaintext[HEADER_LEN..HEADER_LEN + body_len].to_vec() })
    }
}

/// The body length declared by `plaintext` if it fits the padding rules.
pub(crate) fn body_len_if_plausible(plaintext: &[u8]) -> Option<usize> {
    let raw = plaintext.get(28..32)?;
    let body_len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
    if body_len < 4 || body_len % 4 != 0 {
        return None;
    }
    let padding = plaintext.len().checked_sub(HEADER_LEN + body_len)?;
    (MIN_PADDING..=MAX_PADDING).contains(&padding).then_some(body_len)
}

/// Lay out the plaintext of one message, without padding.
pub fn encode_plaintext(envelope: &Envelope, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + body.len() + 32);
    buf.extend(envelope.salt.to_le_bytes());
    buf.extend(envelope.session_id.to_le_bytes());
    buf.extend(envelope.msg_id.to_le_bytes());
    buf.extend(envelope.seq_no.to_le_bytes());
    buf.extend((body.len() as u32).to_le_bytes());
    buf.extend_from_slice(body);
    buf
}

/// Encrypt one message sent by `side`. Returns `key_id ‖ msg_key ‖ ciphertext`.
pub fn pack(auth_key: &AuthKey, side: Side, envelope: &Envelope, body: &[u8]) -> Result<Vec<u8>, RandomError> {
    encrypt_data_v2(&encode_plaintext(envelope, body), auth_key, side)
}

/// Decrypt one complete frame sent by `side`.
pub fn unpack(frame: &mut [u8], auth_key: &AuthKey, side: Side) -> Result<DecryptedMessage, DecryptError> {
    let plaintext = decrypt_data_v2(frame, auth_key, side).map_err(DecryptError::Crypto)?;
    DecryptedMessage::parse(plaintext).ok_or(DecryptError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> AuthKey {
        let mut data = [0u8; 256];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i * 7) as u8;
        }
        AuthKey::from_bytes(data)
    }

    #[test]
    fn pack_then_unpack() {
        let envelope = Envelope { salt: 1, session_id: 2, msg_id: 0x6000_0000_0000_0001, seq_no: 3 };
        let mut frame = pack(&key(), Side::Server, &envelope, &[9; 12]).unwrap();
        let msg = unpack(&mut frame, &key(), Side::Server).unwrap();
        assert_eq!(msg.envelope, envelope);
        assert_eq!(msg.body, vec![9; 12]);
    }

    #[test]
    fn wrong_side_fails() {
        let envelope = Envelope { salt: 1, session_id: 2, msg_id: 4, seq_no: 1 };
        let mut frame = pack(&key(), Side::Client, &envelope, &[1; 8]).unwrap();
        assert!(unpack(&mut frame, &key(), Side::Server).is_err());
    }

    #[test]
    fn padding_bounds_are_enforced() {
        let envelope = Envelope { salt: 0, session_id: 0, msg_id: 4, seq_no: 0 };
        let mut plain = encode_plaintext(&envelope, &[0; 4]);
        plain.extend([0u8; 8]);
        assert!(DecryptedMessage::parse(&plain).is_none());
        plain.extend([0u8; 4]);
        assert!(DecryptedMessage::parse(&plain).is_some());
    }
}
