//! Sans-IO core of an MTProto server.
//!
//! This crate handles:
//! * The obfuscated transport codec and its length framing
//! * The server side of the DH key exchange
//! * Locating plaintext and encrypted messages in a decoded byte stream
//! * Message ids, per-connection session state and per-user update sequences
//! * Decoding of service messages and invocation wrappers
//!
//! No sockets are touched here; `mtgate-server` feeds bytes in and writes
//! the produced frames out. The [`client`] module implements the other side
//! of the protocol for tests and diagnostics.

#![deny(unsafe_code)]

pub mod client;
pub mod encrypted;
pub mod handshake;
pub mod locator;
pub mod message_id;
pub mod obfuscated;
pub mod plain;
pub mod request;
pub mod session;
pub mod updates;

pub use encrypted::{DecryptedMessage, Envelope};
pub use handshake::{Finished, Handshake, HandshakeRequest, KeyKind, ServerKey};
pub use locator::{Limits, Located, PlainLocated, locate_encrypted, locate_plain};
pub use message_id::{MessageIdGenerator, MessageKind, next_message_id};
pub use obfuscated::{Framing, ObfuscatedCodec};
pub use request::{Call, ClientInfo, Incoming, decode_contained, decode_incoming};
pub use session::SessionTracker;
pub use updates::{Difference, UpdateError, UpdateLog, UpdateState};
