//! The client half of the protocol.
//!
//! Used by the probe binary and by tests that drive the server the way a
//! real client would.
//!
//! # Flow
//!
//! ```text
//! let (req, s1) = client::step1()?;
//! // send req, receive resPQ
//! let (req, s2) = client::step2(s1, res_pq, &server_public_key)?;
//! // send req, receive server_DH_params
//! let (req, s3) = client::step3(s2, dh_params)?;
//! // send req, receive dh_gen_*
//! let done = client::finish(s3, answer)?;
//! let session = ClientSession::new(done.auth_key, done.first_salt, session_id);
//! ```

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use mtgate_crypto::rsa::PublicKey;
use mtgate_crypto::{AuthKey, RandomError, Side, aes, factorize, generate_key_data_from_nonce, rsa, sha1};
use mtgate_tl::{Cursor, Deserializable, Serializable, enums, functions, types};
use num_bigint::BigUint;

use crate::encrypted::{self, DecryptError, DecryptedMessage, Envelope};

// ─── Error ────────────────────────────────────────────────────────────────────

/// Errors a client sees while creating an auth key.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    InvalidNonce { got: [u8; 16], expected: [u8; 16] },
    InvalidPqSize { size: usize },
    UnfactorablePq { pq: u64 },
    UnknownFingerprints { fingerprints: Vec<i64> },
    DhParamsFail,
    InvalidServerNonce { got: [u8; 16], expected: [u8; 16] },
    EncryptedResponseNotPadded { len: usize },
    InvalidDhInnerData { error: mtgate_tl::deserialize::Error },
    GParameterOutOfRange { value: BigUint, low: BigUint, high: BigUint },
    DhGenRetry,
    DhGenFail,
    InvalidAnswerHash { got: [u8; 20], expected: [u8; 20] },
    InvalidNewNonceHash { got: [u8; 16], expected: [u8; 16] },
    Random(RandomError),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNonce { got, expected }
                => write!(f, "nonce mismatch: got {got:?}, expected {expected:?}"),
            Self::InvalidPqSize { size }
                => write!(f, "pq size {size} invalid (expected 8)"),
            Self::UnfactorablePq { pq }
                => write!(f, "could not factor pq {pq}"),
            Self::UnknownFingerprints { fingerprints }
                => write!(f, "no known fingerprint in {fingerprints:?}"),
            Self::DhParamsFail
                => write!(f, "server returned DH params failure"),
            Self::InvalidServerNonce { got, expected }
                => write!(f, "server_nonce mismatch: got {got:?}, expected {expected:?}"),
            Self::EncryptedResponseNotPadded { len }
                => write!(f, "encrypted answer len {len} is not 16-byte aligned"),
            Self::InvalidDhInnerData { error }
                => write!(f, "DH inner data deserialization error: {error}"),
            Self::GParameterOutOfRange { value, low, high }
                => write!(f, "g={value} not in range ({low}, {high})"),
            Self::DhGenRetry  => write!(f, "DH gen retry requested"),
            Self::DhGenFail   => write!(f, "DH gen failed"),
            Self::InvalidAnswerHash { got, expected }
                => write!(f, "answer hash mismatch: got {got:?}, expected {expected:?}"),
            Self::InvalidNewNonceHash { got, expected }
                => write!(f, "new nonce hash mismatch: got {got:?}, expected {expected:?}"),
            Self::Random(e) => write!(f, "randomness unavailable: {e}"),
        }
    }
}

impl From<RandomError> for Error {
    fn from(e: RandomError) -> Self { Self::Random(e) }
}

// ─── Step state ──────────────────────────────────────────────────────────────

/// State after step 1.
#[derive(Debug)]
pub struct Step1 { nonce: [u8; 16] }

/// State after step 2.
#[derive(Debug)]
pub struct Step2 {
    nonce:        [u8; 16],
    server_nonce: [u8; 16],
    new_nonce:    [u8; 32],
}

/// State after step 3.
#[derive(Debug)]
pub struct Step3 {
    nonce:        [u8; 16],
    server_nonce: [u8; 16],
    new_nonce:    [u8; 32],
    gab:          BigUint,
    time_offset:  i32,
}

/// The client's view of a finished exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct Finished {
    pub auth_key:    AuthKey,
    /// Clock skew in seconds relative to the server.
    pub time_offset: i32,
    pub first_salt:  i64,
    /// The `new_nonce` the key was bound to.
    pub new_nonce:   [u8; 32],
}

// ─── Step 1: req_pq_multi ────────────────────────────────────────────────────

pub fn step1() -> Result<(functions::ReqPqMulti, Step1), Error> {
    let mut buf = [0u8; 16];
    mtgate_crypto::fill_random(&mut buf)?;
    Ok(do_step1(&buf))
}

pub fn do_step1(random: &[u8; 16]) -> (functions::ReqPqMulti, Step1) {
    let nonce = *random;
    (functions::ReqPqMulti { nonce }, Step1 { nonce })
}

// ─── Step 2: req_DH_params ───────────────────────────────────────────────────

/// Process `resPQ` and request a permanent key.
pub fn step2(data: Step1, response: enums::ResPq, key: &PublicKey) -> Result<(functions::ReqDhParams, Step2), Error> {
    let mut rnd = [0u8; 256];
    mtgate_crypto::fill_random(&mut rnd)?;
    do_step2(data, response, key, &rnd, None)
}

/// `random` holds `new_nonce` (32 bytes) and the RSA padding (224 bytes).
/// `temp_expires_in` asks for a temporary key instead of a permanent one.
pub fn do_step2(
    data:     Step1,
    response: enums::ResPq,
    key:      &PublicKey,
    random:   &[u8; 256],
    temp_expires_in: Option<i32>,
) -> Result<(functions::ReqDhParams, Step2), Error> {
    let Step1 { nonce } = data;
    let enums::ResPq::ResPq(res_pq) = response;

    check_nonce(&res_pq.nonce, &nonce)?;

    let pq_bytes: [u8; 8] = res_pq.pq.as_slice().try_into()
        .map_err(|_| Error::InvalidPqSize { size: res_pq.pq.len() })?;
    let pq = u64::from_be_bytes(pq_bytes);
    let (p, q) = factorize(pq).ok_or(Error::UnfactorablePq { pq })?;

    let fingerprint = key.fingerprint();
    if !res_pq.server_public_key_fingerprints.contains(&fingerprint) {
        return Err(Error::UnknownFingerprints { fingerprints: res_pq.server_public_key_fingerprints });
    }

    let mut new_nonce = [0u8; 32];
    new_nonce.copy_from_slice(&random[..32]);
    let mut rnd224 = [0u8; 224];
    rnd224.copy_from_slice(&random[32..]);

    fn trim_be(v: u64) -> Vec<u8> {
        let b = v.to_be_bytes();
        let skip = b.iter().position(|&x| x != 0).unwrap_or(7);
        b[skip..].to_vec()
    }
    let p_bytes = trim_be(p);
    let q_bytes = trim_be(q);

    let pq_inner = match temp_expires_in {
        None => enums::PQInnerData::PQInnerData(types::PQInnerData {
            pq: pq_bytes.to_vec(),
            p: p_bytes.clone(),
            q: q_bytes.clone(),
            nonce,
            server_nonce: res_pq.server_nonce,
            new_nonce,
        }),
        Some(expires_in) => enums::PQInnerData::Temp(types::PQInnerDataTemp {
            pq: pq_bytes.to_vec(),
            p: p_bytes.clone(),
            q: q_bytes.clone(),
            nonce,
            server_nonce: res_pq.server_nonce,
            new_nonce,
            expires_in,
        }),
    }
    .to_bytes();

    let ciphertext = rsa::encrypt_hashed(&pq_inner, key, &rnd224);

    Ok((
        functions::ReqDhParams {
            nonce,
            server_nonce: res_pq.server_nonce,
            p: p_bytes,
            q: q_bytes,
            public_key_fingerprint: fingerprint,
            encrypted_data: ciphertext,
        },
        Step2 { nonce, server_nonce: res_pq.server_nonce, new_nonce },
    ))
}

// ─── Step 3: set_client_DH_params ────────────────────────────────────────────

pub fn step3(data: Step2, response: enums::ServerDhParams) -> Result<(functions::SetClientDhParams, Step3), Error> {
    let mut rnd = [0u8; 272];
    mtgate_crypto::fill_random(&mut rnd)?;
    let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i32).unwrap_or_default();
    do_step3(data, response, &rnd, now)
}

/// `random` holds the exponent `b` (256 bytes) and padding (16 bytes).
pub fn do_step3(
    data:     Step2,
    response: enums::ServerDhParams,
    random:   &[u8; 272],
    now:      i32,
) -> Result<(functions::SetClientDhParams, Step3), Error> {
    let Step2 { nonce, server_nonce, new_nonce } = data;

    let mut server_dh_ok = match response {
        enums::ServerDhParams::Fail(f) => {
            check_nonce(&f.nonce, &nonce)?;
            check_server_nonce(&f.server_nonce, &server_nonce)?;
            let digest = sha1!(&new_nonce);
            let mut expected_hash = [0u8; 16];
            expected_hash.copy_from_slice(&digest[4..]);
            check_new_nonce_hash(&f.new_nonce_hash, &expected_hash)?;
            return Err(Error::DhParamsFail);
        }
        enums::ServerDhParams::Ok(x) => x,
    };

    check_nonce(&server_dh_ok.nonce, &nonce)?;
    check_server_nonce(&server_dh_ok.server_nonce, &server_nonce)?;

    let len = server_dh_ok.encrypted_answer.len();
    if len % 16 != 0 || len < 32 {
        return Err(Error::EncryptedResponseNotPadded { len });
    }

    let (key, iv) = generate_key_data_from_nonce(&server_nonce, &new_nonce);
    aes::ige_decrypt(&mut server_dh_ok.encrypted_answer, &key, &iv);
    let plain = server_dh_ok.encrypted_answer;

    let mut got_hash = [0u8; 20];
    got_hash.copy_from_slice(&plain[..20]);
    let mut cursor = Cursor::from_slice(&plain[20..]);
    let enums::ServerDhInnerData::ServerDhInnerData(inner) =
        enums::ServerDhInnerData::deserialize(&mut cursor)
            .map_err(|error| Error::InvalidDhInnerData { error })?;

    let expected_hash = sha1!(&plain[20..20 + cursor.pos()]);
    if got_hash != expected_hash {
        return Err(Error::InvalidAnswerHash { got: got_hash, expected: expected_hash });
    }

    check_nonce(&inner.nonce, &nonce)?;
    check_server_nonce(&inner.server_nonce, &server_nonce)?;

    let dh_prime = BigUint::from_bytes_be(&inner.dh_prime);
    let g = BigUint::from(inner.g.max(0) as u32);
    let g_a = BigUint::from_bytes_be(&inner.g_a);
    let time_offset = inner.server_time - now;

    let b = BigUint::from_bytes_be(&random[..256]);
    let g_b = g.modpow(&b, &dh_prime);
    let gab = g_a.modpow(&b, &dh_prime);

    let one = BigUint::from(1u32);
    check_g_in_range(&g,   &one, &(&dh_prime - &one))?;
    check_g_in_range(&g_a, &one, &(&dh_prime - &one))?;
    check_g_in_range(&g_b, &one, &(&dh_prime - &one))?;
    let safety = one.clone() << (2048 - 64);
    check_g_in_range(&g_a, &safety, &(&dh_prime - &safety))?;
    check_g_in_range(&g_b, &safety, &(&dh_prime - &safety))?;

    let client_dh_inner = enums::ClientDhInnerData::ClientDhInnerData(types::ClientDhInnerData {
        nonce,
        server_nonce,
        retry_id: 0,
        g_b: g_b.to_bytes_be(),
    })
    .to_bytes();

    let digest = sha1!(&client_dh_inner);
    let pad_len = (16 - ((20 + client_dh_inner.len()) % 16)) % 16;

    let mut hashed = Vec::with_capacity(20 + client_dh_inner.len() + pad_len);
    hashed.extend_from_slice(&digest);
    hashed.extend_from_slice(&client_dh_inner);
    hashed.extend_from_slice(&random[256..256 + pad_len]);

    aes::ige_encrypt(&mut hashed, &key, &iv);

    Ok((
        functions::SetClientDhParams { nonce, server_nonce, encrypted_data: hashed },
        Step3 { nonce, server_nonce, new_nonce, gab, time_offset },
    ))
}

// ─── finish: create_key ──────────────────────────────────────────────────────

/// Check the server's `dh_gen_*` answer and produce the key.
pub fn finish(data: Step3, response: enums::SetClientDhParamsAnswer) -> Result<Finished, Error> {
    let Step3 { nonce, server_nonce, new_nonce, gab, time_offset } = data;

    struct DhData { nonce: [u8; 16], server_nonce: [u8; 16], hash: [u8; 16], num: u8 }

    let dh = match response {
        enums::SetClientDhParamsAnswer::DhGenOk(x) =>
            DhData { nonce: x.nonce, server_nonce: x.server_nonce, hash: x.new_nonce_hash1, num: 1 },
        enums::SetClientDhParamsAnswer::DhGenRetry(x) =>
            DhData { nonce: x.nonce, server_nonce: x.server_nonce, hash: x.new_nonce_hash2, num: 2 },
        enums::SetClientDhParamsAnswer::DhGenFail(x) =>
            DhData { nonce: x.nonce, server_nonce: x.server_nonce, hash: x.new_nonce_hash3, num: 3 },
    };

    check_nonce(&dh.nonce, &nonce)?;
    check_server_nonce(&dh.server_nonce, &server_nonce)?;

    let mut key_bytes = [0u8; 256];
    let gab_bytes = gab.to_bytes_be();
    key_bytes[256 - gab_bytes.len()..].copy_from_slice(&gab_bytes);

    let auth_key = AuthKey::from_bytes(key_bytes);
    let expected_hash = auth_key.calc_new_nonce_hash(&new_nonce, dh.num);
    check_new_nonce_hash(&dh.hash, &expected_hash)?;

    let first_salt = {
        let mut buf = [0u8; 8];
        for ((dst, a), b) in buf.iter_mut().zip(&new_nonce[..8]).zip(&server_nonce[..8]) {
            *dst = a ^ b;
        }
        i64::from_le_bytes(buf)
    };

    match dh.num {
        1 => Ok(Finished { auth_key, time_offset, first_salt, new_nonce }),
        2 => Err(Error::DhGenRetry),
        _ => Err(Error::DhGenFail),
    }
}

// ─── Encrypted session ───────────────────────────────────────────────────────

/// Client message ids: time-based, multiples of four, strictly increasing.
#[derive(Debug, Default)]
pub struct ClientMessageIds {
    last: i64,
    /// Clock skew in seconds vs. server.
    pub time_offset: i32,
}

impl ClientMessageIds {
    pub fn next(&mut self) -> i64 {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let secs = (now.as_secs() as i64 + i64::from(self.time_offset)) as u64;
        let nanos = u64::from(now.subsec_nanos());
        let mut id = ((secs << 32) | ((nanos << 2) & 0xffff_fffc)) as i64;
        if self.last >= id {
            id = self.last + 4;
        }
        self.last = id;
        id
    }
}

/// A client's encrypted session: packs requests, unpacks server messages.
#[derive(Debug)]
pub struct ClientSession {
    auth_key:   AuthKey,
    session_id: i64,
    sequence:   i32,
    ids:        ClientMessageIds,
    /// Current server salt to include in outgoing messages.
    pub salt:   i64,
}

impl ClientSession {
    pub fn new(auth_key: AuthKey, first_salt: i64, session_id: i64) -> Self {
        Self { auth_key, session_id, sequence: 0, ids: ClientMessageIds::default(), salt: first_salt }
    }

    pub fn session_id(&self) -> i64 { self.session_id }

    pub fn auth_key(&self) -> &AuthKey { &self.auth_key }

    /// Next content-related seq_no (odd) and advance the counter.
    fn next_seq_no(&mut self) -> i32 {
        let n = self.sequence * 2 + 1;
        self.sequence += 1;
        n
    }

    /// Encrypt any serializable object as a content-related message.
    ///
    /// Returns the frame and the `msg_id` assigned to it.
    pub fn pack<S: Serializable>(&mut self, call: &S) -> Result<(Vec<u8>, i64), RandomError> {
        self.pack_body(&call.to_bytes())
    }

    /// Encrypt an already serialized body.
    pub fn pack_body(&mut self, body: &[u8]) -> Result<(Vec<u8>, i64), RandomError> {
        let msg_id = self.ids.next();
        let envelope = Envelope { salt: self.salt, session_id: self.session_id, msg_id, seq_no: self.next_seq_no() };
        Ok((encrypted::pack(&self.auth_key, Side::Client, &envelope, body)?, msg_id))
    }

    /// Same as [`Self::pack_body`] with an explicit `msg_id`, for replays.
    pub fn pack_body_with_msg_id(&mut self, body: &[u8], msg_id: i64) -> Result<Vec<u8>, RandomError> {
        let envelope = Envelope { salt: self.salt, session_id: self.session_id, msg_id, seq_no: self.next_seq_no() };
        encrypted::pack(&self.auth_key, Side::Client, &envelope, body)
    }

    /// Decrypt a frame sent by the server.
    pub fn unpack(&self, frame: &mut [u8]) -> Result<DecryptedMessage, DecryptError> {
        encrypted::unpack(frame, &self.auth_key, Side::Server)
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn check_nonce(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected { Ok(()) } else {
        Err(Error::InvalidNonce { got: *got, expected: *expected })
    }
}
fn check_server_nonce(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected { Ok(()) } else {
        Err(Error::InvalidServerNonce { got: *got, expected: *expected })
    }
}
fn check_new_nonce_hash(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected { Ok(()) } else {
        Err(Error::InvalidNewNonceHash { got: *got, expected: *expected })
    }
}
fn check_g_in_range(val: &BigUint, lo: &BigUint, hi: &BigUint) -> Result<(), Error> {
    if lo < val && val < hi { Ok(()) } else {
        Err(Error::GParameterOutOfRange { value: val.clone(), low: lo.clone(), high: hi.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_ids_are_aligned_and_increasing() {
        let mut ids = ClientMessageIds::default();
        let a = ids.next();
        let b = ids.next();
        assert_eq!(a % 4, 0);
        assert_eq!(b % 4, 0);
        assert!(b > a);
    }

    #[test]
    fn wrong_nonce_in_res_pq_is_rejected() {
        let (_, s1) = do_step1(&[1; 16]);
        let res = enums::ResPq::ResPq(types::ResPq {
            nonce: [2; 16],
            server_nonce: [3; 16],
            pq: crate::handshake::PQ.to_be_bytes().to_vec(),
            server_public_key_fingerprints: vec![],
        });
        let key = PublicKey::new("65537", "3").unwrap();
        assert!(matches!(do_step2(s1, res, &key, &[0; 256], None), Err(Error::InvalidNonce { .. })));
    }
}
