//! The [`Deserializable`] trait, [`Cursor`] buffer, and primitive impls.
//!
//! Input is assumed hostile: declared lengths are checked against the bytes
//! actually left before anything is allocated.

use std::fmt;

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors that can occur during deserialization.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Ran out of bytes before the type was fully read.
    UnexpectedEof,
    /// Decoded a constructor ID that doesn't match any known variant.
    UnexpectedConstructor { id: u32 },
    /// A TL string was not valid UTF-8.
    InvalidUtf8,
    /// Nested objects exceeded the decoder's depth limit.
    TooDeep,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of buffer"),
            Self::UnexpectedConstructor { id } => {
                write!(f, "unexpected constructor id: {id:#010x}")
            }
            Self::InvalidUtf8 => write!(f, "string is not valid UTF-8"),
            Self::TooDeep => write!(f, "object nesting too deep"),
        }
    }
}

impl std::error::Error for Error {}

/// Specialized `Result` for deserialization.
pub type Result<T> = std::result::Result<T, Error>;

// ─── Cursor ──────────────────────────────────────────────────────────────────

/// A zero-copy cursor over an in-memory byte slice.
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Create a cursor positioned at the start of `buf`.
    pub fn from_slice(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current byte offset.
    pub fn pos(&self) -> usize { self.pos }

    /// Remaining bytes.
    pub fn remaining(&self) -> usize { self.buf.len() - self.pos }

    /// Read a single byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        let b = *self.buf.get(self.pos).ok_or(Error::UnexpectedEof)?;
        self.pos += 1;
        Ok(b)
    }

    /// Borrow the next `len` bytes and advance past them.
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::UnexpectedEof);
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    /// Read exactly `out.len()` bytes.
    pub fn read_exact(&mut self, out: &mut [u8]) -> Result<()> {
        out.copy_from_slice(self.read_slice(out.len())?);
        Ok(())
    }

    /// Look at the next constructor id without consuming it.
    pub fn peek_u32(&self) -> Result<u32> {
        let bytes = self.buf.get(self.pos..self.pos + 4).ok_or(Error::UnexpectedEof)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Consume all remaining bytes into `out`.
    pub fn read_to_end(&mut self, out: &mut Vec<u8>) -> usize {
        let slice = &self.buf[self.pos..];
        out.extend_from_slice(slice);
        self.pos = self.buf.len();
        slice.len()
    }
}

/// Alias used by the schema code: `crate::deserialize::Buffer<'_, '_>`.
pub type Buffer<'a, 'b> = &'a mut Cursor<'b>;

// ─── Deserializable ──────────────────────────────────────────────────────────

/// Deserialize a value from TL binary format.
pub trait Deserializable: Sized {
    /// Read `Self` from `buf`, advancing its position.
    fn deserialize(buf: Buffer) -> Result<Self>;

    /// Deserialize from a byte slice, ignoring trailing bytes.
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::from_slice(bytes);
        Self::deserialize(&mut cursor)
    }
}

// ─── Primitives ───────────────────────────────────────────────────────────────

impl Deserializable for bool {
    fn deserialize(buf: Buffer) -> Result<Self> {
        match u32::deserialize(buf)? {
            crate::BOOL_TRUE => Ok(true),
            crate::BOOL_FALSE => Ok(false),
            id => Err(Error::UnexpectedConstructor { id }),
        }
    }
}

macro_rules! le_number {
    ( $( $ty:ty ),+ ) => {
        $(
            impl Deserializable for $ty {
                fn deserialize(buf: Buffer) -> Result<Self> {
                    let mut b = [0u8; std::mem::size_of::<$ty>()];
                    buf.read_exact(&mut b)?;
                    Ok(<$ty>::from_le_bytes(b))
                }
            }
        )+
    };
}

le_number!(i32, u32, i64, f64);

impl<const N: usize> Deserializable for [u8; N] {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let mut b = [0u8; N];
        buf.read_exact(&mut b)?;
        Ok(b)
    }
}

// ─── Bytes / String ───────────────────────────────────────────────────────────

impl Deserializable for Vec<u8> {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let first = buf.read_byte()?;
        let (len, header_len) = if first != 0xfe {
            (first as usize, 1)
        } else {
            let b = buf.read_slice(3)?;
            (b[0] as usize | (b[1] as usize) << 8 | (b[2] as usize) << 16, 4)
        };

        let data = buf.read_slice(len)?.to_vec();
        let padding = (4 - (header_len + len) % 4) % 4;
        buf.read_slice(padding)?;
        Ok(data)
    }
}

impl Deserializable for String {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let bytes = Vec::<u8>::deserialize(buf)?;
        String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
    }
}

// ─── Vectors ─────────────────────────────────────────────────────────────────

/// Read a vector count, rejecting values that cannot fit in what is left
/// (every TL item takes at least four bytes).
fn read_count(buf: Buffer) -> Result<usize> {
    let len = i32::deserialize(buf)?;
    let len = usize::try_from(len).map_err(|_| Error::UnexpectedEof)?;
    if len > buf.remaining() / 4 {
        return Err(Error::UnexpectedEof);
    }
    Ok(len)
}

/// Read the `Vector` constructor id and the item count.
pub(crate) fn read_vector_header(buf: Buffer) -> Result<usize> {
    let id = u32::deserialize(buf)?;
    if id != crate::VECTOR {
        return Err(Error::UnexpectedConstructor { id });
    }
    read_count(buf)
}

impl<T: Deserializable> Deserializable for Vec<T> {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let len = read_vector_header(buf)?;
        (0..len).map(|_| T::deserialize(buf)).collect()
    }
}

impl<T: Deserializable> Deserializable for crate::RawVec<T> {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let len = read_count(buf)?;
        let inner = (0..len).map(|_| T::deserialize(buf)).collect::<Result<_>>()?;
        Ok(crate::RawVec(inner))
    }
}

/// Takes everything that is left.
impl Deserializable for crate::Blob {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let mut out = Vec::with_capacity(buf.remaining());
        buf.read_to_end(&mut out);
        Ok(crate::Blob(out))
    }
}
