//! TL binary codec and the MTProto service schema.
//!
//! # Overview
//!
//! | Module        | Contents                                                   |
//! |---------------|------------------------------------------------------------|
//! | [`types`]     | Bare constructors as `struct`s                             |
//! | [`functions`] | RPC functions as `struct`s implementing [`RemoteCall`]     |
//! | [`enums`]     | Boxed types as `enum`s implementing [`Deserializable`]     |
//!
//! Only the service layer is declared here (key exchange, acks, pings,
//! containers, wrappers). Application methods travel as opaque bytes and
//! are decoded by whoever handles them.
//!
//! ```rust
//! use mtgate_tl::{functions, Serializable};
//!
//! let bytes = functions::Ping { ping_id: 7 }.to_bytes();
//! assert_eq!(&bytes[..4], &0x7abe77ecu32.to_le_bytes());
//! ```

#![deny(unsafe_code)]

#[macro_use]
mod macros;

pub mod deserialize;
pub mod enums;
pub mod functions;
pub mod serialize;
pub mod types;

pub use deserialize::{Cursor, Deserializable};
pub use serialize::Serializable;

/// `boolTrue`
pub const BOOL_TRUE: u32 = 0x997275b5;
/// `boolFalse`
pub const BOOL_FALSE: u32 = 0xbc799737;
/// Boxed `Vector` header.
pub const VECTOR: u32 = 0x1cb5c415;

/// Bare vector: `vector` (lowercase) as opposed to the boxed `Vector`.
#[derive(Clone, Debug, PartialEq)]
pub struct RawVec<T>(pub Vec<T>);

/// Opaque bytes passed through without interpretation: generic `!X`
/// queries on the way in, `Object` results on the way out.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Blob(pub Vec<u8>);

impl From<Vec<u8>> for Blob {
    fn from(v: Vec<u8>) -> Self { Self(v) }
}

// ─── Core traits ──────────────────────────────────────────────────────────────

/// Every schema constructor has a unique 32-bit id.
pub trait Identifiable {
    /// The constructor ID as specified in the TL schema.
    const CONSTRUCTOR_ID: u32;
}

/// A function that can be invoked remotely; `Return` is the answer type.
pub trait RemoteCall: Serializable {
    /// The deserialized response type.
    type Return: Deserializable;
}

/// Encode a bare constructor as a boxed object (id followed by fields).
pub fn boxed<T: Identifiable + Serializable>(value: &T) -> Vec<u8> {
    let mut buf = Vec::new();
    T::CONSTRUCTOR_ID.serialize(&mut buf);
    value.serialize(&mut buf);
    buf
}
