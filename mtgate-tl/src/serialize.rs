//! The [`Serializable`] trait and its implementations for primitive TL types.
//!
//! Encoding follows the [MTProto Binary Serialization] rules.
//!
//! [MTProto Binary Serialization]: https://core.telegram.org/mtproto/serialize

/// Serialize `self` into TL binary format.
pub trait Serializable {
    /// Appends the serialized form of `self` to `buf`.
    fn serialize(&self, buf: &mut impl Extend<u8>);

    /// Allocate a fresh `Vec<u8>` and serialize into it.
    fn to_bytes(&self) -> Vec<u8> {
        let mut v = Vec::new();
        self.serialize(&mut v);
        v
    }
}

// ─── bool ────────────────────────────────────────────────────────────────────

/// `true`  → `boolTrue#997275b5`, `false` → `boolFalse#bc799737`
impl Serializable for bool {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        let id: u32 = if *self { crate::BOOL_TRUE } else { crate::BOOL_FALSE };
        id.serialize(buf);
    }
}

// ─── numbers ─────────────────────────────────────────────────────────────────

macro_rules! le_number {
    ( $( $ty:ty ),+ ) => {
        $(
            impl Serializable for $ty {
                fn serialize(&self, buf: &mut impl Extend<u8>) {
                    buf.extend(self.to_le_bytes());
                }
            }
        )+
    };
}

le_number!(i32, u32, i64, f64);

/// `int128` / `int256`: raw bytes, no length prefix.
impl<const N: usize> Serializable for [u8; N] {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.iter().copied());
    }
}

// ─── strings / bytes ─────────────────────────────────────────────────────────

/// TL string encoding: a length-prefixed, 4-byte aligned byte string.
///
/// * `len ≤ 253`: `[len as u8][data][zero padding]`
/// * `len ≥ 254`: `[0xfe][len as 3 LE bytes][data][zero padding]`
impl Serializable for &[u8] {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        let len = self.len();
        let header_len = if len <= 253 {
            buf.extend([len as u8]);
            1
        } else {
            buf.extend([0xfe, len as u8, (len >> 8) as u8, (len >> 16) as u8]);
            4
        };
        buf.extend(self.iter().copied());
        let padding = (4 - (header_len + len) % 4) % 4;
        buf.extend(std::iter::repeat_n(0u8, padding));
    }
}

impl Serializable for Vec<u8> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.as_slice().serialize(buf);
    }
}

impl Serializable for String {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.as_bytes().serialize(buf);
    }
}

// ─── vectors ─────────────────────────────────────────────────────────────────

/// Boxed `Vector<T>`, prefixed with `0x1cb5c415`.
impl<T: Serializable> Serializable for Vec<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        crate::VECTOR.serialize(buf);
        (self.len() as i32).serialize(buf);
        for item in self { item.serialize(buf); }
    }
}

/// Bare `vector<T>`: count followed by items.
impl<T: Serializable> Serializable for crate::RawVec<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        (self.0.len() as i32).serialize(buf);
        for item in &self.0 { item.serialize(buf); }
    }
}

/// Already-encoded bytes, written verbatim.
impl Serializable for crate::Blob {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.0.iter().copied());
    }
}

// ─── Option ──────────────────────────────────────────────────────────────────

/// Flag-guarded field: the flags word encodes presence, `None` writes nothing.
impl<T: Serializable> Serializable for Option<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        if let Some(v) = self { v.serialize(buf); }
    }
}
