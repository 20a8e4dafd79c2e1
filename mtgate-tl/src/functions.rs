//! RPC functions of the MTProto service schema.
//!
//! Deserialization of a function reads its fields only: the dispatcher has
//! already consumed the constructor id it matched on.

use crate::deserialize::{Buffer, Result};
use crate::{Blob, Deserializable, Identifiable, RemoteCall, Serializable, enums};

// ─── Key exchange ─────────────────────────────────────────────────────────────

tl_function!(ReqPqMulti = 0xbe7e8ef1 {
    nonce: [u8; 16],
} -> enums::ResPq);

tl_function!(
    /// Legacy single-fingerprint form of [`ReqPqMulti`].
    ReqPq = 0x60469778 {
        nonce: [u8; 16],
    } -> enums::ResPq
);

tl_function!(ReqDhParams = 0xd712e4be {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    p: Vec<u8>,
    q: Vec<u8>,
    public_key_fingerprint: i64,
    encrypted_data: Vec<u8>,
} -> enums::ServerDhParams);

tl_function!(SetClientDhParams = 0xf5045f1f {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    encrypted_data: Vec<u8>,
} -> enums::SetClientDhParamsAnswer);

// ─── Service calls ────────────────────────────────────────────────────────────

tl_function!(Ping = 0x7abe77ec {
    ping_id: i64,
} -> enums::Pong);

tl_function!(PingDelayDisconnect = 0xf3427b8c {
    ping_id: i64,
    disconnect_delay: i32,
} -> enums::Pong);

tl_function!(DestroySession = 0xe7512126 {
    session_id: i64,
} -> enums::DestroySessionRes);

tl_function!(GetFutureSalts = 0xb921bd04 {
    num: i32,
} -> enums::FutureSalts);

tl_function!(RpcDropAnswer = 0x58e4a740 {
    req_msg_id: i64,
} -> enums::RpcDropAnswer);

// ─── Wrappers ─────────────────────────────────────────────────────────────────

tl_function!(InvokeWithLayer = 0xda9b0d0d {
    layer: i32,
    query: Blob,
} -> Blob);

tl_function!(InvokeAfterMsg = 0xcb9f372d {
    msg_id: i64,
    query: Blob,
} -> Blob);

tl_function!(InvokeWithoutUpdates = 0xbf9459b7 {
    query: Blob,
} -> Blob);

/// `initConnection`, sent once per session inside `invokeWithLayer`.
#[derive(Clone, Debug, PartialEq)]
pub struct InitConnection {
    pub api_id: i32,
    pub device_model: String,
    pub system_version: String,
    pub app_version: String,
    pub system_lang_code: String,
    pub lang_pack: String,
    pub lang_code: String,
    /// `flags.0`
    pub proxy: Option<enums::InputClientProxy>,
    /// `flags.1`
    pub params: Option<crate::types::JsonValue>,
    pub query: Blob,
}

impl Identifiable for InitConnection {
    const CONSTRUCTOR_ID: u32 = 0xc1cd5ea9;
}

impl Serializable for InitConnection {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        let flags = u32::from(self.proxy.is_some()) | u32::from(self.params.is_some()) << 1;
        flags.serialize(buf);
        self.api_id.serialize(buf);
        self.device_model.serialize(buf);
        self.system_version.serialize(buf);
        self.app_version.serialize(buf);
        self.system_lang_code.serialize(buf);
        self.lang_pack.serialize(buf);
        self.lang_code.serialize(buf);
        self.proxy.serialize(buf);
        self.params.serialize(buf);
        self.query.serialize(buf);
    }
}

impl Deserializable for InitConnection {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let flags = u32::deserialize(buf)?;
        Ok(Self {
            api_id: i32::deserialize(buf)?,
            device_model: String::deserialize(buf)?,
            system_version: String::deserialize(buf)?,
            app_version: String::deserialize(buf)?,
            system_lang_code: String::deserialize(buf)?,
            lang_pack: String::deserialize(buf)?,
            lang_code: String::deserialize(buf)?,
            proxy: if flags & 1 != 0 { Some(enums::InputClientProxy::deserialize(buf)?) } else { None },
            params: if flags & 2 != 0 { Some(crate::types::JsonValue::deserialize(buf)?) } else { None },
            query: Blob::deserialize(buf)?,
        })
    }
}

impl RemoteCall for InitConnection {
    type Return = Blob;
}
