//! The 256-byte authorization key produced by the DH handshake.

use crate::sha1;

/// A 256-byte authorization key with its derived identifiers.
///
/// The id is a pure function of the key bytes: SHA-1(key)[12..20].
#[derive(Clone)]
pub struct AuthKey {
    pub(crate) data: [u8; 256],
    pub(crate) aux_hash: [u8; 8],
    pub(crate) key_id: [u8; 8],
}

impl AuthKey {
    /// Build from the raw DH output `g^ab mod p`, left-padded to 256 bytes.
    pub fn from_bytes(data: [u8; 256]) -> Self {
        let sha = sha1!(&data);
        let mut aux_hash = [0u8; 8];
        aux_hash.copy_from_slice(&sha[..8]);
        let mut key_id = [0u8; 8];
        key_id.copy_from_slice(&sha[12..20]);
        Self { data, aux_hash, key_id }
    }

    /// Build from a slice, returning `None` unless it is exactly 256 bytes.
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        let data: [u8; 256] = data.try_into().ok()?;
        Some(Self::from_bytes(data))
    }

    pub fn to_bytes(&self) -> [u8; 256] { self.data }

    /// The key id exactly as it appears on the wire.
    pub fn key_id(&self) -> [u8; 8] { self.key_id }

    /// The key id as the little-endian `long` used in stores and logs.
    pub fn id(&self) -> i64 { i64::from_le_bytes(self.key_id) }

    /// `new_nonce_hash{1,2,3}` for `dh_gen_ok` / `dh_gen_retry` / `dh_gen_fail`.
    pub fn calc_new_nonce_hash(&self, new_nonce: &[u8; 32], number: u8) -> [u8; 16] {
        let sha = sha1!(new_nonce, [number], &self.aux_hash);
        let mut out = [0u8; 16];
        out.copy_from_slice(&sha[4..]);
        out
    }
}

impl std::fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthKey(id={})", self.id())
    }
}

impl PartialEq for AuthKey {
    fn eq(&self, other: &Self) -> bool { self.data == other.data }
}

impl Eq for AuthKey {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> [u8; 256] {
        let mut data = [0u8; 256];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i * 7 + 3) as u8;
        }
        data
    }

    #[test]
    fn id_is_deterministic() {
        let a = AuthKey::from_bytes(sample());
        let b = AuthKey::from_bytes(sample());
        assert_eq!(a.key_id(), b.key_id());
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn id_is_tail_of_sha1() {
        let key = AuthKey::from_bytes(sample());
        let sha = sha1!(&sample());
        assert_eq!(key.key_id(), sha[12..20]);
    }

    #[test]
    fn new_nonce_hash_depends_on_number() {
        let key = AuthKey::from_bytes(sample());
        let nn = [9u8; 32];
        assert_ne!(key.calc_new_nonce_hash(&nn, 1), key.calc_new_nonce_hash(&nn, 2));
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(AuthKey::from_slice(&[0u8; 255]).is_none());
        assert!(AuthKey::from_slice(&sample()).is_some());
    }
}
