//! The boundary between the protocol core and RPC handlers.
//!
//! Service messages (pings, acks, containers, salts, session control) are
//! answered by the connection itself. Everything else arrives at a
//! [`Dispatcher`] as a [`Call`] with its wrappers already stripped.

use std::future::Future;

use mtgate_mtproto::Call;

use crate::updates::UpdateTracker;

/// What a handler wants sent back for one call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    /// An encoded answer object, sent inside `rpc_result`.
    Result(Vec<u8>),
    /// Sent as `rpc_result` carrying `rpc_error`.
    Error { code: i32, message: String },
    /// Nothing is sent.
    None,
}

impl Reply {
    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self::Error { code, message: message.into() }
    }
}

/// Everything a handler may know about the caller.
pub struct RequestContext<'a> {
    pub connection_id: u64,
    pub auth_key_id: i64,
    pub session_id: i64,
    pub salt: i64,
    /// The client's id for the outermost message carrying the call.
    pub msg_id: i64,
    /// The account bound to this auth key. Handlers set it after sign-in;
    /// the connection persists the change.
    pub user_id: &'a mut Option<i64>,
    pub updates: &'a UpdateTracker,
    outbox: &'a mut Vec<Vec<u8>>,
}

impl<'a> RequestContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        connection_id: u64,
        auth_key_id: i64,
        session_id: i64,
        salt: i64,
        msg_id: i64,
        user_id: &'a mut Option<i64>,
        updates: &'a UpdateTracker,
        outbox: &'a mut Vec<Vec<u8>>,
    ) -> Self {
        Self { connection_id, auth_key_id, session_id, salt, msg_id, user_id, updates, outbox }
    }

    /// Queue an encoded object to be sent after the reply, as a
    /// server-initiated message.
    pub fn notify(&mut self, body: Vec<u8>) {
        self.outbox.push(body);
    }
}

/// Handles every call the core does not answer itself.
pub trait Dispatcher: Send + Sync + 'static {
    fn dispatch(&self, request: &Call, ctx: &mut RequestContext<'_>) -> impl Future<Output = Reply> + Send;
}

/// Answers every call with `400 METHOD_NOT_IMPLEMENTED`.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnimplementedDispatcher;

impl Dispatcher for UnimplementedDispatcher {
    async fn dispatch(&self, request: &Call, ctx: &mut RequestContext<'_>) -> Reply {
        log::debug!(
            "[mtgate] conn {}: no handler for {:#010x} (layer {:?})",
            ctx.connection_id, request.constructor_id, request.layer,
        );
        Reply::error(400, "METHOD_NOT_IMPLEMENTED")
    }
}
