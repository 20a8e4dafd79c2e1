//! AES-256 in the two modes MTProto needs.
//!
//! * IGE for handshake payloads and encrypted messages.
//! * CTR for the obfuscated transport stream.

use aes::Aes256;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

const BLOCK: usize = 16;

fn xor_block(dst: &mut [u8; BLOCK], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}

/// Encrypt `buffer` in place with AES-256-IGE.
///
/// `iv` is the pair (previous ciphertext block, previous plaintext block).
///
/// # Panics
/// If `buffer.len()` is not a multiple of 16.
pub fn ige_encrypt(buffer: &mut [u8], key: &[u8; 32], iv: &[u8; 32]) {
    assert_eq!(buffer.len() % BLOCK, 0, "IGE input must be block aligned");
    let cipher = Aes256::new(GenericArray::from_slice(key));

    let mut prev_cipher = [0u8; BLOCK];
    let mut prev_plain = [0u8; BLOCK];
    prev_cipher.copy_from_slice(&iv[..BLOCK]);
    prev_plain.copy_from_slice(&iv[BLOCK..]);

    for chunk in buffer.chunks_exact_mut(BLOCK) {
        let mut plain = [0u8; BLOCK];
        plain.copy_from_slice(chunk);

        let mut block = plain;
        xor_block(&mut block, &prev_cipher);
        cipher.encrypt_block(GenericArray::from_mut_slice(&mut block));
        xor_block(&mut block, &prev_plain);

        chunk.copy_from_slice(&block);
        prev_cipher = block;
        prev_plain = plain;
    }
}

/// Decrypt `buffer` in place with AES-256-IGE.
///
/// Block `i` of the output depends only on ciphertext blocks `0..=i`, so
/// decrypting a prefix yields the matching plaintext prefix.
///
/// # Panics
/// If `buffer.len()` is not a multiple of 16.
pub fn ige_decrypt(buffer: &mut [u8], key: &[u8; 32], iv: &[u8; 32]) {
    assert_eq!(buffer.len() % BLOCK, 0, "IGE input must be block aligned");
    let cipher = Aes256::new(GenericArray::from_slice(key));

    let mut prev_cipher = [0u8; BLOCK];
    let mut prev_plain = [0u8; BLOCK];
    prev_cipher.copy_from_slice(&iv[..BLOCK]);
    prev_plain.copy_from_slice(&iv[BLOCK..]);

    for chunk in buffer.chunks_exact_mut(BLOCK) {
        let mut ciphertext = [0u8; BLOCK];
        ciphertext.copy_from_slice(chunk);

        let mut block = ciphertext;
        xor_block(&mut block, &prev_plain);
        cipher.decrypt_block(GenericArray::from_mut_slice(&mut block));
        xor_block(&mut block, &prev_cipher);

        chunk.copy_from_slice(&block);
        prev_cipher = ciphertext;
        prev_plain = block;
    }
}

/// AES-256-CTR keystream with a 128-bit big-endian counter.
///
/// The stream position only moves forward.
pub struct CtrStream(Aes256Ctr);

impl CtrStream {
    pub fn new(key: &[u8; 32], iv: &[u8; 16]) -> Self {
        Self(Aes256Ctr::new(GenericArray::from_slice(key), GenericArray::from_slice(iv)))
    }

    /// XOR `data` with the next `data.len()` keystream bytes.
    pub fn apply(&mut self, data: &mut [u8]) {
        self.0.apply_keystream(data);
    }
}

impl std::fmt::Debug for CtrStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CtrStream(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x42; 32];
    const IV: [u8; 32] = [0x17; 32];

    #[test]
    fn ige_roundtrip() {
        let original: Vec<u8> = (0..96u8).collect();
        let mut buf = original.clone();
        ige_encrypt(&mut buf, &KEY, &IV);
        assert_ne!(buf, original);
        ige_decrypt(&mut buf, &KEY, &IV);
        assert_eq!(buf, original);
    }

    #[test]
    fn ige_prefix_decrypts_to_plaintext_prefix() {
        let original: Vec<u8> = (0..128u8).collect();
        let mut buf = original.clone();
        ige_encrypt(&mut buf, &KEY, &IV);
        let mut prefix = buf[..48].to_vec();
        ige_decrypt(&mut prefix, &KEY, &IV);
        assert_eq!(prefix, original[..48]);
    }

    #[test]
    fn ctr_is_a_stream() {
        let mut whole = vec![0u8; 40];
        CtrStream::new(&KEY, &[1; 16]).apply(&mut whole);

        let mut split = vec![0u8; 40];
        let mut s = CtrStream::new(&KEY, &[1; 16]);
        s.apply(&mut split[..7]);
        s.apply(&mut split[7..]);
        assert_eq!(whole, split);
    }
}
