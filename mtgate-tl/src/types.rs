//! Bare constructors of the MTProto service schema.

use crate::deserialize::{Buffer, Error, Result};
use crate::{Blob, Deserializable, Identifiable, RawVec, Serializable};

// ─── Key exchange ─────────────────────────────────────────────────────────────

tl_type!(ResPq = 0x05162463 {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    pq: Vec<u8>,
    server_public_key_fingerprints: Vec<i64>,
});

tl_type!(PQInnerData = 0x83c95aec {
    pq: Vec<u8>,
    p: Vec<u8>,
    q: Vec<u8>,
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce: [u8; 32],
});

tl_type!(PQInnerDataDc = 0xa9f55f95 {
    pq: Vec<u8>,
    p: Vec<u8>,
    q: Vec<u8>,
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce: [u8; 32],
    dc: i32,
});

tl_type!(PQInnerDataTemp = 0x3c6a84d4 {
    pq: Vec<u8>,
    p: Vec<u8>,
    q: Vec<u8>,
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce: [u8; 32],
    expires_in: i32,
});

tl_type!(
    /// A negative `dc` requests a media-only temporary key.
    PQInnerDataTempDc = 0x56fddf88 {
        pq: Vec<u8>,
        p: Vec<u8>,
        q: Vec<u8>,
        nonce: [u8; 16],
        server_nonce: [u8; 16],
        new_nonce: [u8; 32],
        dc: i32,
        expires_in: i32,
    }
);

tl_type!(ServerDhParamsFail = 0x79cb045d {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce_hash: [u8; 16],
});

tl_type!(ServerDhParamsOk = 0xd0e8075c {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    encrypted_answer: Vec<u8>,
});

tl_type!(ServerDhInnerData = 0xb5890dba {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    g: i32,
    dh_prime: Vec<u8>,
    g_a: Vec<u8>,
    server_time: i32,
});

tl_type!(ClientDhInnerData = 0x6643b654 {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    retry_id: i64,
    g_b: Vec<u8>,
});

tl_type!(DhGenOk = 0x3bcbf734 {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce_hash1: [u8; 16],
});

tl_type!(DhGenRetry = 0x46dc1fb9 {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce_hash2: [u8; 16],
});

tl_type!(DhGenFail = 0xa69dae02 {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce_hash3: [u8; 16],
});

// ─── Service messages ─────────────────────────────────────────────────────────

tl_type!(
    /// `result` holds the already-encoded answer object.
    RpcResult = 0xf35c6d01 {
        req_msg_id: i64,
        result: Blob,
    }
);

tl_type!(RpcError = 0x2144ca19 {
    error_code: i32,
    error_message: String,
});

tl_type!(MsgsAck = 0x62d6b459 {
    msg_ids: Vec<i64>,
});

tl_type!(NewSessionCreated = 0x9ec20908 {
    first_msg_id: i64,
    unique_id: i64,
    server_salt: i64,
});

tl_type!(Pong = 0x347773c5 {
    msg_id: i64,
    ping_id: i64,
});

tl_type!(DestroySessionOk = 0xe22045fc {
    session_id: i64,
});

tl_type!(DestroySessionNone = 0x62d350c9 {
    session_id: i64,
});

tl_type!(FutureSalt = 0x0949d9dc {
    valid_since: i32,
    valid_until: i32,
    salt: i64,
});

tl_type!(FutureSalts = 0xae500895 {
    req_msg_id: i64,
    now: i32,
    salts: RawVec<FutureSalt>,
});

tl_type!(RpcAnswerUnknown = 0x5e2ad36e {});

tl_type!(RpcAnswerDroppedRunning = 0xcd78e586 {});

tl_type!(RpcAnswerDropped = 0xa43ad8b7 {
    msg_id: i64,
    seq_no: i32,
    bytes: i32,
});

tl_type!(GzipPacked = 0x3072cfa1 {
    packed_data: Vec<u8>,
});

tl_type!(MsgContainer = 0x73f1f8dc {
    messages: RawVec<Message>,
});

/// One bare `message` inside a `msg_container`.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub msg_id: i64,
    pub seqno: i32,
    /// Encoded object, `bytes` long on the wire.
    pub body: Vec<u8>,
}

impl Serializable for Message {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.msg_id.serialize(buf);
        self.seqno.serialize(buf);
        (self.body.len() as i32).serialize(buf);
        buf.extend(self.body.iter().copied());
    }
}

impl Deserializable for Message {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let msg_id = i64::deserialize(buf)?;
        let seqno = i32::deserialize(buf)?;
        let len = usize::try_from(i32::deserialize(buf)?).map_err(|_| Error::UnexpectedEof)?;
        let body = buf.read_slice(len)?.to_vec();
        Ok(Self { msg_id, seqno, body })
    }
}

// ─── initConnection parameters ────────────────────────────────────────────────

tl_type!(InputClientProxy = 0x75588b3f {
    address: String,
    port: i32,
});

tl_type!(JsonObjectValue = 0xc0de1bd9 {
    key: String,
    value: JsonValue,
});

const JSON_NULL: u32 = 0x3f6d7b68;
const JSON_BOOL: u32 = 0xc7345e6a;
const JSON_NUMBER: u32 = 0x2be0dfa4;
const JSON_STRING: u32 = 0xb71e767a;
const JSON_ARRAY: u32 = 0xf7444763;
const JSON_OBJECT: u32 = 0x99c1d49d;

/// The boxed `JSONValue` family carried by `initConnection.params`.
///
/// Decoding stops with [`Error::TooDeep`] past [`JsonValue::MAX_DEPTH`]
/// nested arrays or objects.
#[derive(Clone, Debug, PartialEq)]
pub enum JsonValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<JsonValue>),
    Object(Vec<JsonObjectValue>),
}

impl JsonValue {
    pub const MAX_DEPTH: usize = 16;

    fn read(buf: Buffer, depth: usize) -> Result<Self> {
        if depth > Self::MAX_DEPTH {
            return Err(Error::TooDeep);
        }
        let id = u32::deserialize(buf)?;
        Ok(match id {
            JSON_NULL => Self::Null,
            JSON_BOOL => Self::Bool(bool::deserialize(buf)?),
            JSON_NUMBER => Self::Number(f64::deserialize(buf)?),
            JSON_STRING => Self::String(String::deserialize(buf)?),
            JSON_ARRAY => {
                let len = crate::deserialize::read_vector_header(buf)?;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(Self::read(buf, depth + 1)?);
                }
                Self::Array(items)
            }
            JSON_OBJECT => {
                let len = crate::deserialize::read_vector_header(buf)?;
                let mut fields = Vec::with_capacity(len);
                for _ in 0..len {
                    let field_id = u32::deserialize(buf)?;
                    if field_id != JsonObjectValue::CONSTRUCTOR_ID {
                        return Err(Error::UnexpectedConstructor { id: field_id });
                    }
                    let key = String::deserialize(buf)?;
                    let value = Self::read(buf, depth + 1)?;
                    fields.push(JsonObjectValue { key, value });
                }
                Self::Object(fields)
            }
            _ => return Err(Error::UnexpectedConstructor { id }),
        })
    }
}

impl Serializable for JsonValue {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        match self {
            Self::Null => JSON_NULL.serialize(buf),
            Self::Bool(v) => {
                JSON_BOOL.serialize(buf);
                v.serialize(buf);
            }
            Self::Number(v) => {
                JSON_NUMBER.serialize(buf);
                v.serialize(buf);
            }
            Self::String(v) => {
                JSON_STRING.serialize(buf);
                v.serialize(buf);
            }
            Self::Array(items) => {
                JSON_ARRAY.serialize(buf);
                items.serialize(buf);
            }
            Self::Object(fields) => {
                JSON_OBJECT.serialize(buf);
                crate::VECTOR.serialize(buf);
                (fields.len() as i32).serialize(buf);
                for field in fields {
                    JsonObjectValue::CONSTRUCTOR_ID.serialize(buf);
                    field.serialize(buf);
                }
            }
        }
    }
}

impl Deserializable for JsonValue {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Self::read(buf, 0)
    }
}
