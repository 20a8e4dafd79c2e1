//! One client connection, from the obfuscation header to encrypted replies.
//!
//! [`Connection`] owns every piece of per-connection crypto state and does
//! no socket I/O: bytes go in through [`Connection::on_bytes`] and framed,
//! encrypted replies come out.

use std::collections::HashSet;
use std::sync::Arc;

use mtgate_crypto::{AuthKey, Side};
use mtgate_mtproto::encrypted::{self, Envelope};
use mtgate_mtproto::obfuscated::HEADER_LEN;
use mtgate_mtproto::plain::plain_message;
use mtgate_mtproto::{
    Call, DecryptedMessage, Handshake, Incoming, Limits, MessageKind, ObfuscatedCodec, PlainLocated,
    ServerKey, SessionTracker, decode_contained, decode_incoming, locate_encrypted, locate_plain,
    next_message_id,
};
use mtgate_tl::{Blob, boxed, types};

use crate::dispatch::{Dispatcher, Reply, RequestContext};
use crate::store::{SessionRecord, StoredAuthKey, Stores, unix_now};
use crate::updates::UpdateTracker;

/// Upper bound for `get_future_salts`.
const MAX_FUTURE_SALTS: i32 = 64;

/// Lifetime of each future salt, in seconds.
const SALT_VALIDITY: i32 = 3600;

/// Read-only state shared by every connection of a server.
pub struct ServerState<D> {
    pub key: ServerKey,
    pub stores: Stores,
    pub dispatcher: D,
    pub updates: UpdateTracker,
    pub limits: Limits,
    /// Undecoded bytes a connection may buffer.
    pub max_pending: usize,
}

impl<D: Dispatcher> ServerState<D> {
    pub fn new(key: ServerKey, stores: Stores, dispatcher: D) -> Self {
        Self {
            key,
            stores,
            dispatcher,
            updates: UpdateTracker::new(),
            limits: Limits::default(),
            max_pending: 4 << 20,
        }
    }
}

/// Drives a single client connection.
pub struct Connection<D> {
    id: u64,
    state: Arc<ServerState<D>>,
    header: Vec<u8>,
    codec: Option<ObfuscatedCodec>,
    pending: Vec<u8>,
    /// First offset of `pending` not yet looked up in the key store.
    key_scan_from: usize,
    handshake: Handshake,
    auth_key: Option<AuthKey>,
    session: SessionTracker,
    /// Sessions of this key that `destroy_session` may still name.
    other_sessions: HashSet<i64>,
    user_id: Option<i64>,
    user_resolved: bool,
}

impl<D: Dispatcher> Connection<D> {
    pub fn new(id: u64, state: Arc<ServerState<D>>) -> Self {
        Self {
            id,
            state,
            header: Vec::with_capacity(HEADER_LEN),
            codec: None,
            pending: Vec::new(),
            key_scan_from: 0,
            handshake: Handshake::new(),
            auth_key: None,
            session: SessionTracker::new(),
            other_sessions: HashSet::new(),
            user_id: None,
            user_resolved: false,
        }
    }

    pub fn id(&self) -> u64 { self.id }

    /// The key this connection currently speaks with.
    pub fn auth_key(&self) -> Option<&AuthKey> { self.auth_key.as_ref() }

    pub fn user_id(&self) -> Option<i64> { self.user_id }

    /// Feed bytes read from the socket. Returns the frames to write back,
    /// already framed and obfuscated, in order.
    pub async fn on_bytes(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        let mut data = data;
        if self.codec.is_none() {
            let take = (HEADER_LEN - self.header.len()).min(data.len());
            self.header.extend_from_slice(&data[..take]);
            data = &data[take..];
            let Ok(header) = <[u8; HEADER_LEN]>::try_from(self.header.as_slice()) else {
                return Vec::new();
            };
            let codec = ObfuscatedCodec::from_init(&header);
            log::debug!("[mtgate] conn {}: {:?} transport", self.id, codec.framing());
            self.codec = Some(codec);
        }
        if data.is_empty() {
            return Vec::new();
        }

        let mut chunk = data.to_vec();
        if let Some(codec) = self.codec.as_mut() {
            codec.decrypt(&mut chunk);
        }
        if self.pending.len() + chunk.len() > self.state.max_pending {
            log::warn!(
                "[mtgate] conn {}: {} undecodable bytes buffered, discarding",
                self.id,
                self.pending.len() + chunk.len(),
            );
            self.pending.clear();
            self.key_scan_from = 0;
            return Vec::new();
        }
        self.pending.extend_from_slice(&chunk);

        let mut out = Vec::new();
        self.process(&mut out).await;
        out
    }

    async fn process(&mut self, out: &mut Vec<Vec<u8>>) {
        loop {
            let plain = locate_plain(&self.pending);
            let before = plain.as_ref().map_or(self.pending.len(), |found| found.offset);
            if self.on_encrypted(before, out).await {
                continue;
            }
            let Some(found) = plain else { return };
            self.consume(found.consumed);
            self.on_handshake(found, out).await;
        }
    }

    /// Handle the authenticated messages in `pending[..end]`. Returns false
    /// when none were found.
    async fn on_encrypted(&mut self, end: usize, out: &mut Vec<Vec<u8>>) -> bool {
        if self.auth_key.is_none() && !self.recognize_key(end).await {
            return false;
        }
        let Some(key) = self.auth_key.clone() else { return false };

        let (found, consumed) = locate_encrypted(&self.pending[..end], &key, self.state.limits);
        if found.is_empty() {
            return false;
        }
        self.consume(consumed);
        for located in found {
            self.on_message(located.message, out).await;
        }
        true
    }

    fn consume(&mut self, len: usize) {
        self.pending.drain(..len);
        self.key_scan_from = self.key_scan_from.saturating_sub(len);
    }

    /// Look `pending[..end]` up in the key store. Offsets already checked
    /// are not looked up again.
    async fn recognize_key(&mut self, end: usize) -> bool {
        let from = self.key_scan_from;
        if end < from + 8 {
            return false;
        }
        let window = self.pending[from..end].to_vec();
        match self.state.stores.find_key_in_buffer(window, unix_now()).await {
            Ok(Some((stored, offset))) => {
                log::info!("[mtgate] conn {}: returning key {} at offset {}", self.id, stored.id(), from + offset);
                self.auth_key = Some(stored.key);
                true
            }
            Ok(None) => {
                self.key_scan_from = end - 7;
                false
            }
            Err(e) => {
                log::warn!("[mtgate] conn {}: key lookup failed: {e}", self.id);
                false
            }
        }
    }

    async fn on_handshake(&mut self, found: PlainLocated, out: &mut Vec<Vec<u8>>) {
        let step = found.request.name();
        let outcome = match self.handshake.handle(&self.state.key, found.request) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("[mtgate] conn {}: {step} rejected: {e}", self.id);
                return;
            }
        };
        log::debug!("[mtgate] conn {}: answered {step}", self.id);

        if let Some(finished) = outcome.finished {
            let stored = StoredAuthKey::from_finished(&finished, unix_now());
            let id = stored.id();
            match self.state.stores.save_key(stored).await {
                Ok(()) => log::info!("[mtgate] conn {}: new {:?} key {id}", self.id, finished.kind),
                Err(e) => log::error!("[mtgate] conn {}: key {id} not persisted: {e}", self.id),
            }
            self.auth_key = Some(finished.auth_key);
            self.session = SessionTracker::new();
            self.other_sessions.clear();
            self.user_id = None;
            self.user_resolved = false;
        }

        let message = plain_message(next_message_id(MessageKind::Response), &outcome.reply);
        if let Some(codec) = self.codec.as_mut() {
            out.push(codec.frame_outgoing(&message));
        }
    }

    async fn on_message(&mut self, message: DecryptedMessage, out: &mut Vec<Vec<u8>>) {
        let Some(auth_key_id) = self.auth_key.as_ref().map(AuthKey::id) else { return };
        let envelope = message.envelope;

        let previous = self.session.session_id();
        match self.session.observe(envelope.salt, envelope.session_id) {
            Ok(true) => {
                log::debug!("[mtgate] conn {}: session {}", self.id, envelope.session_id);
                if let Some(previous) = previous {
                    self.other_sessions.insert(previous);
                }
            }
            Ok(false) => {}
            Err(e) => {
                log::error!("[mtgate] conn {}: {e}", self.id);
                return;
            }
        }

        if !self.user_resolved {
            self.user_resolved = true;
            match self.state.stores.find_session(auth_key_id).await {
                Ok(Some(record)) => {
                    self.user_id = self.user_id.or(record.user_id);
                    if record.session_id != envelope.session_id {
                        self.other_sessions.insert(record.session_id);
                    }
                }
                Ok(None) => {}
                Err(e) => log::warn!("[mtgate] conn {}: session lookup failed: {e}", self.id),
            }
        }
        self.persist_session(auth_key_id).await;

        match decode_incoming(&message.body) {
            Ok(Incoming::Container(messages)) => {
                for inner in messages {
                    match decode_contained(&inner.body) {
                        Ok(incoming) => self.on_incoming(inner.msg_id, incoming, out).await,
                        Err(e) => log::debug!("[mtgate] conn {}: dropped contained {}: {e}", self.id, inner.msg_id),
                    }
                }
            }
            Ok(incoming) => self.on_incoming(envelope.msg_id, incoming, out).await,
            Err(e) => log::debug!("[mtgate] conn {}: dropped {}: {e}", self.id, envelope.msg_id),
        }
    }

    async fn persist_session(&mut self, auth_key_id: i64) {
        let Some(session_id) = self.session.session_id() else { return };
        let record = SessionRecord {
            session_id,
            auth_key_id,
            salt: self.session.salt(),
            user_id: self.user_id,
            last_used: unix_now(),
        };
        self.state.stores.queue_session(record).await;
    }

    async fn on_incoming(&mut self, msg_id: i64, incoming: Incoming, out: &mut Vec<Vec<u8>>) {
        match incoming {
            Incoming::Ping { ping_id } | Incoming::PingDelayDisconnect { ping_id, .. } => {
                let pong = boxed(&types::Pong { msg_id, ping_id });
                self.send(out, &pong, MessageKind::Response);
            }
            Incoming::MsgsAck { .. } => {}
            Incoming::Container(_) => {
                log::debug!("[mtgate] conn {}: nested container {msg_id} ignored", self.id);
            }
            Incoming::DestroySession { session_id } => {
                let answer = if self.session.session_id() != Some(session_id) && self.other_sessions.remove(&session_id) {
                    boxed(&types::DestroySessionOk { session_id })
                } else {
                    boxed(&types::DestroySessionNone { session_id })
                };
                self.send_result(out, msg_id, answer);
            }
            Incoming::GetFutureSalts { num } => {
                let salts = self.future_salts(msg_id, num);
                self.send(out, &salts, MessageKind::Response);
            }
            Incoming::RpcDropAnswer { .. } => {
                self.send_result(out, msg_id, boxed(&types::RpcAnswerUnknown {}));
            }
            Incoming::Call(call) => self.on_call(msg_id, call, out).await,
        }
    }

    async fn on_call(&mut self, msg_id: i64, call: Call, out: &mut Vec<Vec<u8>>) {
        let Some(auth_key_id) = self.auth_key.as_ref().map(AuthKey::id) else { return };

        if call.is_session_initiating() && self.session.should_announce(msg_id) {
            let created = boxed(&types::NewSessionCreated {
                first_msg_id: msg_id,
                unique_id: self.session.unique_id(),
                server_salt: self.session.salt(),
            });
            self.send(out, &created, MessageKind::Notification);
        }

        let state = Arc::clone(&self.state);
        let user_before = self.user_id;
        let mut notifications = Vec::new();
        let reply = {
            let mut ctx = RequestContext::new(
                self.id,
                auth_key_id,
                self.session.session_id().unwrap_or_default(),
                self.session.salt(),
                msg_id,
                &mut self.user_id,
                &state.updates,
                &mut notifications,
            );
            state.dispatcher.dispatch(&call, &mut ctx).await
        };

        match reply {
            Reply::Result(bytes) => self.send_result(out, msg_id, bytes),
            Reply::Error { code, message } => {
                log::debug!("[mtgate] conn {}: {:#010x} failed: {code} {message}", self.id, call.constructor_id);
                let error = boxed(&types::RpcError { error_code: code, error_message: message });
                self.send_result(out, msg_id, error);
            }
            Reply::None => {}
        }
        for body in notifications {
            self.send(out, &body, MessageKind::Notification);
        }

        if self.user_id != user_before {
            log::info!("[mtgate] conn {}: key {auth_key_id} bound to user {:?}", self.id, self.user_id);
            self.persist_session(auth_key_id).await;
        }
    }

    fn future_salts(&self, req_msg_id: i64, num: i32) -> Vec<u8> {
        let now = unix_now() as i32;
        let salts = (0..num.clamp(1, MAX_FUTURE_SALTS))
            .map(|i| {
                let salt = if i == 0 { self.session.salt() } else { random_salt() };
                let valid_since = now.saturating_add(i * SALT_VALIDITY);
                types::FutureSalt { valid_since, valid_until: valid_since.saturating_add(SALT_VALIDITY), salt }
            })
            .collect();
        boxed(&types::FutureSalts { req_msg_id, now, salts: mtgate_tl::RawVec(salts) })
    }

    fn send_result(&mut self, out: &mut Vec<Vec<u8>>, req_msg_id: i64, result: Vec<u8>) {
        let body = boxed(&types::RpcResult { req_msg_id, result: Blob(result) });
        self.send(out, &body, MessageKind::Response);
    }

    /// Encrypt `body` as its own message and frame it for the socket.
    /// Everything the server sends is content-related.
    fn send(&mut self, out: &mut Vec<Vec<u8>>, body: &[u8], kind: MessageKind) {
        let (Some(key), Some(codec)) = (self.auth_key.as_ref(), self.codec.as_mut()) else { return };
        let envelope = Envelope {
            salt: self.session.salt(),
            session_id: self.session.session_id().unwrap_or_default(),
            msg_id: next_message_id(kind),
            seq_no: self.session.next_seq_no(true),
        };
        match encrypted::pack(key, Side::Server, &envelope, body) {
            Ok(frame) => out.push(codec.frame_outgoing(&frame)),
            Err(e) => log::error!("[mtgate] conn {}: could not encrypt reply: {e}", self.id),
        }
    }
}

fn random_salt() -> i64 {
    let mut buf = [0u8; 8];
    match mtgate_crypto::fill_random(&mut buf) {
        Ok(()) => i64::from_le_bytes(buf),
        Err(e) => {
            log::warn!("[mtgate] salt generation failed: {e}");
            0
        }
    }
}
