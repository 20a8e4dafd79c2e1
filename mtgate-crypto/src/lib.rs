//! Cryptographic primitives for the MTProto server core.
//!
//! Provides:
//! - AES-256-IGE and AES-256-CTR
//! - SHA-1 / SHA-256 hash macros
//! - Pollard-rho PQ factorization
//! - RSA_PAD encryption (client) and decryption (server), PKCS#1 key loading
//! - `AuthKey`, the 256-byte shared key
//! - MTProto 2.0 message key derivation and encryption in both directions
//! - DH nonce→key derivation

#![deny(unsafe_code)]

pub mod aes;
mod auth_key;
mod factorize;
pub mod rsa;
mod sha;

pub use auth_key::AuthKey;
pub use factorize::factorize;

/// Fill `buf` from the operating system CSPRNG.
pub fn fill_random(buf: &mut [u8]) -> Result<(), getrandom::Error> {
    getrandom::getrandom(buf)
}

pub use getrandom::Error as RandomError;

// ─── MTProto 2.0 encrypt / decrypt ───────────────────────────────────────────

/// Errors from [`decrypt_data_v2`].
#[derive(Clone, Debug, PartialEq)]
pub enum DecryptError {
    /// Ciphertext too short or not block-aligned.
    InvalidBuffer,
    /// The `auth_key_id` in the frame does not match the key.
    AuthKeyMismatch,
    /// The `msg_key` in the frame does not match the decrypted plaintext.
    MessageKeyMismatch,
}

impl std::fmt::Display for DecryptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBuffer => write!(f, "invalid ciphertext buffer length"),
            Self::AuthKeyMismatch => write!(f, "auth_key_id mismatch"),
            Self::MessageKeyMismatch => write!(f, "msg_key mismatch"),
        }
    }
}
impl std::error::Error for DecryptError {}

/// Which party produced a message. Selects the `x` offset into the auth key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    /// Client to server, `x = 0`.
    Client,
    /// Server to client, `x = 8`.
    Server,
}

impl Side {
    fn x(self) -> usize {
        match self {
            Side::Client => 0,
            Side::Server => 8,
        }
    }
}

/// Derive the per-message AES key and IV from `msg_key`.
pub fn calc_key(auth_key: &AuthKey, msg_key: &[u8; 16], side: Side) -> ([u8; 32], [u8; 32]) {
    let x = side.x();
    let sha_a = sha256!(msg_key, &auth_key.data[x..x + 36]);
    let sha_b = sha256!(&auth_key.data[40 + x..40 + x + 36], msg_key);

    let mut aes_key = [0u8; 32];
    aes_key[..8].copy_from_slice(&sha_a[..8]);
    aes_key[8..24].copy_from_slice(&sha_b[8..24]);
    aes_key[24..].copy_from_slice(&sha_a[24..]);

    let mut aes_iv = [0u8; 32];
    aes_iv[..8].copy_from_slice(&sha_b[..8]);
    aes_iv[8..24].copy_from_slice(&sha_a[8..24]);
    aes_iv[24..].copy_from_slice(&sha_b[24..]);

    (aes_key, aes_iv)
}

/// `msg_key` = middle 128 bits of SHA-256(auth_key[88+x..120+x] ‖ plaintext).
pub fn message_key(auth_key: &AuthKey, side: Side, plaintext: &[u8]) -> [u8; 16] {
    let x = side.x();
    let large = sha256!(&auth_key.data[88 + x..88 + x + 32], plaintext);
    let mut msg_key = [0u8; 16];
    msg_key.copy_from_slice(&large[8..24]);
    msg_key
}

/// Padding that brings `len` to a 16-byte boundary with 12..=1024 extra bytes.
fn padding_len(len: usize) -> usize {
    16 + (16 - (len % 16))
}

/// Encrypt `plaintext` with MTProto 2.0.
///
/// Returns `key_id ‖ msg_key ‖ ciphertext`.
pub fn encrypt_data_v2(plaintext: &[u8], auth_key: &AuthKey, side: Side) -> Result<Vec<u8>, RandomError> {
    let mut rnd = [0u8; 32];
    fill_random(&mut rnd)?;
    Ok(do_encrypt_data_v2(plaintext, auth_key, side, &rnd))
}

/// Deterministic form of [`encrypt_data_v2`] with caller-supplied padding.
pub fn do_encrypt_data_v2(plaintext: &[u8], auth_key: &AuthKey, side: Side, rnd: &[u8; 32]) -> Vec<u8> {
    let pad = padding_len(plaintext.len());
    let mut body = Vec::with_capacity(plaintext.len() + pad);
    body.extend_from_slice(plaintext);
    body.extend(rnd.iter().take(pad).copied());

    let msg_key = message_key(auth_key, side, &body);
    let (key, iv) = calc_key(auth_key, &msg_key, side);
    aes::ige_encrypt(&mut body, &key, &iv);

    let mut frame = Vec::with_capacity(24 + body.len());
    frame.extend_from_slice(&auth_key.key_id);
    frame.extend_from_slice(&msg_key);
    frame.extend_from_slice(&body);
    frame
}

/// Decrypt a complete MTProto 2.0 frame produced by `side`.
///
/// `buffer` must be exactly `key_id ‖ msg_key ‖ ciphertext`. On success the
/// returned slice is the plaintext including padding.
pub fn decrypt_data_v2<'a>(buffer: &'a mut [u8], auth_key: &AuthKey, side: Side) -> Result<&'a mut [u8], DecryptError> {
    if buffer.len() < 24 || (buffer.len() - 24) % 16 != 0 {
        return Err(DecryptError::InvalidBuffer);
    }
    if auth_key.key_id != buffer[..8] {
        return Err(DecryptError::AuthKeyMismatch);
    }
    let mut msg_key = [0u8; 16];
    msg_key.copy_from_slice(&buffer[8..24]);

    let (key, iv) = calc_key(auth_key, &msg_key, side);
    aes::ige_decrypt(&mut buffer[24..], &key, &iv);

    if msg_key != message_key(auth_key, side, &buffer[24..]) {
        return Err(DecryptError::MessageKeyMismatch);
    }
    Ok(&mut buffer[24..])
}

/// Derive `(key, iv)` for the handshake's `encrypted_answer` and
/// `set_client_DH_params.encrypted_data`.
pub fn generate_key_data_from_nonce(server_nonce: &[u8; 16], new_nonce: &[u8; 32]) -> ([u8; 32], [u8; 32]) {
    let h1 = sha1!(new_nonce, server_nonce);
    let h2 = sha1!(server_nonce, new_nonce);
    let h3 = sha1!(new_nonce, new_nonce);

    let mut key = [0u8; 32];
    key[..20].copy_from_slice(&h1);
    key[20..].copy_from_slice(&h2[..12]);

    let mut iv = [0u8; 32];
    iv[..8].copy_from_slice(&h2[12..]);
    iv[8..28].copy_from_slice(&h3);
    iv[28..].copy_from_slice(&new_nonce[..4]);

    (key, iv)
}
