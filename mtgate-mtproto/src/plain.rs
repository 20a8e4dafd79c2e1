//! Unencrypted envelopes used during the key exchange.
//!
//! ```text
//! auth_key_id:long  (always 0)
//! message_id:long
//! message_data_length:int
//! message_data:bytes
//! ```

/// Bytes before the message data.
pub const HEADER_LEN: usize = 20;

/// Wrap `body` in a plaintext envelope.
pub fn plain_message(msg_id: i64, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + body.len());
    buf.extend(0i64.to_le_bytes());
    buf.extend(msg_id.to_le_bytes());
    buf.extend((body.len() as u32).to_le_bytes());
    buf.extend_from_slice(body);
    buf
}

/// A plaintext message read from the start of a buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct PlainMessage<'a> {
    pub msg_id: i64,
    pub body: &'a [u8],
}

impl<'a> PlainMessage<'a> {
    /// Read an envelope at the start of `buf`.
    ///
    /// Returns the message and the number of bytes it spans, or `None` if
    /// the header does not describe a complete plaintext message.
    pub fn parse(buf: &'a [u8]) -> Option<(Self, usize)> {
        let header = buf.get(..HEADER_LEN)?;
        if header[..8] != [0u8; 8] {
            return None;
        }
        let msg_id = i64::from_le_bytes(header[8..16].try_into().ok()?);
        let len = u32::from_le_bytes(header[16..20].try_into().ok()?) as usize;
        let body = buf.get(HEADER_LEN..HEADER_LEN.checked_add(len)?)?;
        Some((Self { msg_id, body }, HEADER_LEN + len))
    }
}
