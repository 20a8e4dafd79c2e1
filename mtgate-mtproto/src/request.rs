//! Decoding of incoming message bodies.
//!
//! Service messages (pings, acks, containers, session control) are
//! recognised here and answered by the connection itself. Everything else
//! is a [`Call`] for the dispatcher, after the invocation wrappers around
//! it have been peeled off.

use std::fmt;
use std::io::Read;

use mtgate_tl::{Cursor, Deserializable, Identifiable, functions, types};

/// Wrappers unwrapped before a body is considered hostile.
pub const MAX_UNWRAP_DEPTH: usize = 8;

/// Largest inflated `gzip_packed` payload accepted.
pub const MAX_INFLATED_LEN: usize = 16 << 20;

// ─── Error ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum DecodeError {
    Tl(mtgate_tl::deserialize::Error),
    /// More than [`MAX_UNWRAP_DEPTH`] wrappers.
    TooDeep,
    /// A container inside a container.
    NestedContainer,
    /// `gzip_packed` data that does not inflate or inflates too far.
    Inflate,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tl(e) => write!(f, "tl: {e}"),
            Self::TooDeep => write!(f, "more than {MAX_UNWRAP_DEPTH} nested wrappers"),
            Self::NestedContainer => write!(f, "msg_container inside msg_container"),
            Self::Inflate => write!(f, "gzip_packed payload rejected"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<mtgate_tl::deserialize::Error> for DecodeError {
    fn from(e: mtgate_tl::deserialize::Error) -> Self { Self::Tl(e) }
}

// ─── Incoming ─────────────────────────────────────────────────────────────────

/// Client details announced by `initConnection`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClientInfo {
    pub api_id: i32,
    pub device_model: String,
    pub system_version: String,
    pub app_version: String,
    pub system_lang_code: String,
    pub lang_pack: String,
    pub lang_code: String,
}

/// An application request with its wrappers removed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Call {
    /// Constructor id of the innermost query.
    pub constructor_id: u32,
    /// The innermost query, constructor id included.
    pub body: Vec<u8>,
    /// `invokeWithLayer.layer`
    pub layer: Option<i32>,
    /// `initConnection` fields.
    pub client: Option<ClientInfo>,
    /// `invokeAfterMsg.msg_id`
    pub after_msg_id: Option<i64>,
    /// Wrapped in `invokeWithoutUpdates`.
    pub without_updates: bool,
}

impl Call {
    /// `invokeWithLayer` or `initConnection` start a client session.
    pub fn is_session_initiating(&self) -> bool {
        self.layer.is_some() || self.client.is_some()
    }
}

/// A decoded message body.
#[derive(Clone, Debug, PartialEq)]
pub enum Incoming {
    Ping { ping_id: i64 },
    PingDelayDisconnect { ping_id: i64, disconnect_delay: i32 },
    MsgsAck { msg_ids: Vec<i64> },
    /// Inner messages in container order.
    Container(Vec<types::Message>),
    DestroySession { session_id: i64 },
    GetFutureSalts { num: i32 },
    RpcDropAnswer { req_msg_id: i64 },
    Call(Call),
}

/// Decode a top-level message body.
pub fn decode_incoming(body: &[u8]) -> Result<Incoming, DecodeError> {
    decode(body, false)
}

/// Decode the body of a message taken from a container.
pub fn decode_contained(body: &[u8]) -> Result<Incoming, DecodeError> {
    decode(body, true)
}

fn decode(body: &[u8], in_container: bool) -> Result<Incoming, DecodeError> {
    let mut call = Call::default();
    let mut current = body.to_vec();

    for _ in 0..MAX_UNWRAP_DEPTH {
        let mut cursor = Cursor::from_slice(&current);
        let id = u32::deserialize(&mut cursor)?;
        let buf = &mut cursor;

        let next = match id {
            functions::InvokeWithLayer::CONSTRUCTOR_ID => {
                let w = functions::InvokeWithLayer::deserialize(buf)?;
                call.layer = Some(w.layer);
                w.query.0
            }
            functions::InitConnection::CONSTRUCTOR_ID => {
                let w = functions::InitConnection::deserialize(buf)?;
                call.client = Some(ClientInfo {
                    api_id: w.api_id,
                    device_model: w.device_model,
                    system_version: w.system_version,
                    app_version: w.app_version,
                    system_lang_code: w.system_lang_code,
                    lang_pack: w.lang_pack,
                    lang_code: w.lang_code,
                });
                w.query.0
            }
            functions::InvokeAfterMsg::CONSTRUCTOR_ID => {
                let w = functions::InvokeAfterMsg::deserialize(buf)?;
                call.after_msg_id = Some(w.msg_id);
                w.query.0
            }
            functions::InvokeWithoutUpdates::CONSTRUCTOR_ID => {
                call.without_updates = true;
                functions::InvokeWithoutUpdates::deserialize(buf)?.query.0
            }
            types::GzipPacked::CONSTRUCTOR_ID => {
                gz_inflate(&types::GzipPacked::deserialize(buf)?.packed_data)?
            }
            types::MsgContainer::CONSTRUCTOR_ID => {
                if in_container {
                    return Err(DecodeError::NestedContainer);
                }
                return Ok(Incoming::Container(types::MsgContainer::deserialize(buf)?.messages.0));
            }
            functions::Ping::CONSTRUCTOR_ID => {
                let p = functions::Ping::deserialize(buf)?;
                return Ok(Incoming::Ping { ping_id: p.ping_id });
            }
            functions::PingDelayDisconnect::CONSTRUCTOR_ID => {
                let p = functions::PingDelayDisconnect::deserialize(buf)?;
                return Ok(Incoming::PingDelayDisconnect {
                    ping_id: p.ping_id,
                    disconnect_delay: p.disconnect_delay,
                });
            }
            types::MsgsAck::CONSTRUCTOR_ID => {
                return Ok(Incoming::MsgsAck { msg_ids: types::MsgsAck::deserialize(buf)?.msg_ids });
            }
            functions::DestroySession::CONSTRUCTOR_ID => {
                let d = functions::DestroySession::deserialize(buf)?;
                return Ok(Incoming::DestroySession { session_id: d.session_id });
            }
            functions::GetFutureSalts::CONSTRUCTOR_ID => {
                let g = functions::GetFutureSalts::deserialize(buf)?;
                return Ok(Incoming::GetFutureSalts { num: g.num });
            }
            functions::RpcDropAnswer::CONSTRUCTOR_ID => {
                let r = functions::RpcDropAnswer::deserialize(buf)?;
                return Ok(Incoming::RpcDropAnswer { req_msg_id: r.req_msg_id });
            }
            _ => {
                call.constructor_id = id;
                call.body = current;
                return Ok(Incoming::Call(call));
            }
        };
        current = next;
    }

    Err(DecodeError::TooDeep)
}

/// Inflate `gzip_packed` data, accepting zlib streams as well.
fn gz_inflate(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let limit = MAX_INFLATED_LEN as u64 + 1;
    let mut out = Vec::new();
    let gz = flate2::read::GzDecoder::new(data).take(limit).read_to_end(&mut out);
    if gz.is_err() || out.is_empty() {
        out.clear();
        flate2::read::ZlibDecoder::new(data)
            .take(limit)
            .read_to_end(&mut out)
            .map_err(|_| DecodeError::Inflate)?;
    }
    if out.len() > MAX_INFLATED_LEN {
        return Err(DecodeError::Inflate);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtgate_tl::{Blob, Serializable};

    #[test]
    fn unknown_constructor_is_a_call() {
        let body = 0x12345678u32.to_le_bytes().to_vec();
        let Incoming::Call(call) = decode_incoming(&body).unwrap() else { panic!("not a call") };
        assert_eq!(call.constructor_id, 0x12345678);
        assert!(!call.is_session_initiating());
    }

    #[test]
    fn wrapper_chain_past_the_cap_is_rejected() {
        let mut body = functions::Ping { ping_id: 1 }.to_bytes();
        for _ in 0..MAX_UNWRAP_DEPTH {
            body = functions::InvokeWithoutUpdates { query: Blob(body) }.to_bytes();
        }
        assert_eq!(decode_incoming(&body), Err(DecodeError::TooDeep));
    }

    #[test]
    fn container_in_container_is_rejected() {
        let body = types::MsgContainer { messages: mtgate_tl::RawVec(vec![]) };
        let bytes = mtgate_tl::boxed(&body);
        assert!(matches!(decode_incoming(&bytes), Ok(Incoming::Container(_))));
        assert_eq!(decode_contained(&bytes), Err(DecodeError::NestedContainer));
    }
}
