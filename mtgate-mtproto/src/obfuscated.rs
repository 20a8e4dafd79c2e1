//! Obfuscated2 transport codec.
//!
//! A connection opens with 64 random-looking bytes. Both AES-256-CTR streams
//! are derived from them: bytes `8..56` read forwards key the client→server
//! stream, the same bytes reversed key server→client. The client encrypts the
//! whole header and sends the last 8 bytes encrypted, so decrypting bytes
//! `56..60` on the server reveals the framing tag.
//!
//! Streams are created once per connection and never rewound.

use std::ops::Range;

use mtgate_crypto::aes::CtrStream;
use mtgate_crypto::fill_random;

/// Length of the connection header.
pub const HEADER_LEN: usize = 64;

// ─── Framing ──────────────────────────────────────────────────────────────────

/// Length-prefix convention negotiated by the header tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Framing {
    /// `0xefefefef`: `len/4` in one byte, or `0x7f` + 3 bytes.
    Abridged,
    /// `0xeeeeeeee`: 4-byte little-endian byte length.
    Intermediate,
    /// `0xdddddddd`: as intermediate, with 0..15 random trailing bytes.
    PaddedIntermediate,
}

impl Framing {
    pub fn from_tag(tag: [u8; 4]) -> Option<Self> {
        match tag {
            [0xef, 0xef, 0xef, 0xef] => Some(Self::Abridged),
            [0xee, 0xee, 0xee, 0xee] => Some(Self::Intermediate),
            [0xdd, 0xdd, 0xdd, 0xdd] => Some(Self::PaddedIntermediate),
            _ => None,
        }
    }

    pub fn tag(self) -> [u8; 4] {
        match self {
            Self::Abridged => [0xef; 4],
            Self::Intermediate => [0xee; 4],
            Self::PaddedIntermediate => [0xdd; 4],
        }
    }

    /// Prefix `payload` with a length header. `padding` is appended only for
    /// [`Framing::PaddedIntermediate`].
    pub fn encode(self, payload: &[u8], padding: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + payload.len() + padding.len());
        match self {
            Self::Abridged => {
                let words = payload.len() / 4;
                if words < 0x7f {
                    out.push(words as u8);
                } else {
                    out.extend_from_slice(&(((words as u32) << 8) | 0x7f).to_le_bytes());
                }
                out.extend_from_slice(payload);
            }
            Self::Intermediate => {
                out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
                out.extend_from_slice(payload);
            }
            Self::PaddedIntermediate => {
                out.extend_from_slice(&((payload.len() + padding.len()) as u32).to_le_bytes());
                out.extend_from_slice(payload);
                out.extend_from_slice(padding);
            }
        }
        out
    }

    /// Split one complete frame off the front of `buf`.
    ///
    /// Returns the payload range and the total bytes the frame occupies, or
    /// `None` while the frame is incomplete.
    pub fn decode(self, buf: &[u8]) -> Option<(Range<usize>, usize)> {
        let (header, len) = match self {
            Self::Abridged => {
                let first = *buf.first()? & 0x7f;
                if first < 0x7f {
                    (1, first as usize * 4)
                } else {
                    let b = buf.get(1..4)?;
                    (4, (b[0] as usize | (b[1] as usize) << 8 | (b[2] as usize) << 16) * 4)
                }
            }
            Self::Intermediate | Self::PaddedIntermediate => {
                let b = buf.get(..4)?;
                (4, (u32::from_le_bytes([b[0], b[1], b[2], b[3]]) & 0x7fff_ffff) as usize)
            }
        };
        let end = header + len;
        (buf.len() >= end).then_some((header..end, end))
    }
}

// ─── Key derivation ───────────────────────────────────────────────────────────

/// Stream keys derived from a connection header, named from the server's
/// point of view.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamKeys {
    pub decrypt_key: [u8; 32],
    pub decrypt_iv: [u8; 16],
    pub encrypt_key: [u8; 32],
    pub encrypt_iv: [u8; 16],
}

/// Derive both streams from the raw 64-byte header.
pub fn derive_keys(header: &[u8; HEADER_LEN]) -> StreamKeys {
    let mut reversed = [0u8; 48];
    for (i, b) in reversed.iter_mut().enumerate() {
        *b = header[55 - i];
    }

    let mut keys = StreamKeys {
        decrypt_key: [0; 32],
        decrypt_iv: [0; 16],
        encrypt_key: [0; 32],
        encrypt_iv: [0; 16],
    };
    keys.decrypt_key.copy_from_slice(&header[8..40]);
    keys.decrypt_iv.copy_from_slice(&header[40..56]);
    keys.encrypt_key.copy_from_slice(&reversed[..32]);
    keys.encrypt_iv.copy_from_slice(&reversed[32..48]);
    keys
}

/// First words a client must avoid so the header cannot be mistaken for
/// another protocol.
fn is_reserved(header: &[u8; HEADER_LEN]) -> bool {
    const RESERVED: [[u8; 4]; 7] = [
        *b"HEAD", *b"POST", *b"GET ", *b"OPTI",
        [0xdd; 4], [0xee; 4], [0x16, 0x03, 0x01, 0x02],
    ];
    header[0] == 0xef || RESERVED.contains(&[header[0], header[1], header[2], header[3]]) || header[4..8] == [0u8; 4]
}

// ─── Codec ────────────────────────────────────────────────────────────────────

/// One direction pair of the obfuscation layer, owned by a single connection.
#[derive(Debug)]
pub struct ObfuscatedCodec {
    decrypt: CtrStream,
    encrypt: CtrStream,
    framing: Framing,
}

impl ObfuscatedCodec {
    /// Server side: build the codec from the first 64 bytes received.
    ///
    /// The header itself passes through the decrypt stream. An unknown tag
    /// falls back to abridged framing.
    pub fn from_init(header: &[u8; HEADER_LEN]) -> Self {
        let keys = derive_keys(header);
        let mut decrypt = CtrStream::new(&keys.decrypt_key, &keys.decrypt_iv);
        let encrypt = CtrStream::new(&keys.encrypt_key, &keys.encrypt_iv);

        let mut plain = *header;
        decrypt.apply(&mut plain);
        let tag = [plain[56], plain[57], plain[58], plain[59]];
        let framing = Framing::from_tag(tag).unwrap_or_else(|| {
            log::warn!("[mtgate] unknown transport tag {tag:02x?}, assuming abridged");
            Framing::Abridged
        });

        Self { decrypt, encrypt, framing }
    }

    /// Client side: turn 64 random bytes into the header to send and the
    /// matching codec.
    pub fn client(random: [u8; HEADER_LEN], framing: Framing) -> ([u8; HEADER_LEN], Self) {
        let mut init = random;
        while is_reserved(&init) {
            init[0] = init[0].wrapping_add(1);
            init[4] |= 1;
        }
        init[56..60].copy_from_slice(&framing.tag());

        // Mirror image of the server: our encrypt is its decrypt.
        let keys = derive_keys(&init);
        let mut encrypt = CtrStream::new(&keys.decrypt_key, &keys.decrypt_iv);
        let decrypt = CtrStream::new(&keys.encrypt_key, &keys.encrypt_iv);

        let mut encrypted = init;
        encrypt.apply(&mut encrypted);
        let mut header = init;
        header[56..].copy_from_slice(&encrypted[56..]);

        (header, Self { decrypt, encrypt, framing })
    }

    pub fn framing(&self) -> Framing { self.framing }

    /// Undo the obfuscation on received bytes, in place.
    pub fn decrypt(&mut self, data: &mut [u8]) { self.decrypt.apply(data) }

    /// Obfuscate bytes about to be sent, in place.
    pub fn encrypt(&mut self, data: &mut [u8]) { self.encrypt.apply(data) }

    /// Length-prefix `payload` with the negotiated framing and encrypt it.
    pub fn frame_outgoing(&mut self, payload: &[u8]) -> Vec<u8> {
        let mut padding = Vec::new();
        if self.framing == Framing::PaddedIntermediate {
            let mut seed = [0u8; 1];
            let mut pad = [0u8; 15];
            if fill_random(&mut seed).is_ok() && fill_random(&mut pad).is_ok() {
                padding.extend_from_slice(&pad[..(seed[0] % 16) as usize]);
            }
        }
        let mut frame = self.framing.encode(payload, &padding);
        self.encrypt(&mut frame);
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reversal_covers_bytes_8_to_56() {
        let mut header = [0u8; HEADER_LEN];
        for (i, b) in header.iter_mut().enumerate() {
            *b = i as u8;
        }
        let keys = derive_keys(&header);
        assert_eq!(keys.encrypt_key[0], 55);
        assert_eq!(keys.encrypt_key[31], 24);
        assert_eq!(keys.encrypt_iv[0], 23);
        assert_eq!(keys.encrypt_iv[15], 8);
        assert_eq!(keys.decrypt_key[0], 8);
        assert_eq!(keys.decrypt_iv[15], 55);
    }

    #[test]
    fn reserved_headers_are_rewritten() {
        let mut random = [0u8; HEADER_LEN];
        random[0] = 0xef;
        let (header, _) = ObfuscatedCodec::client(random, Framing::Abridged);
        assert_ne!(header[0], 0xef);
        assert_ne!(header[4..8], [0u8; 4]);
    }

    #[test]
    fn abridged_uses_escape_from_127_words() {
        assert_eq!(Framing::Abridged.encode(&[0; 4 * 126], &[])[0], 126);
        let long = Framing::Abridged.encode(&[0; 4 * 127], &[]);
        assert_eq!(&long[..4], &[0x7f, 127, 0, 0]);
        assert_eq!(long.len(), 4 + 4 * 127);
    }

    #[test]
    fn decode_waits_for_whole_frame() {
        let frame = Framing::Intermediate.encode(&[1, 2, 3, 4, 5, 6, 7, 8], &[]);
        assert_eq!(Framing::Intermediate.decode(&frame[..10]), None);
        assert_eq!(Framing::Intermediate.decode(&frame), Some((4..12, 12)));
    }
}
