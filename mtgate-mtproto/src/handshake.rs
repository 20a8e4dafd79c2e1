//! Server side of the authorization key exchange.
//!
//! # Flow
//!
//! ```text
//! AwaitingPqRequest --req_pq_multi--> AwaitingDhParams
//! AwaitingDhParams  --req_DH_params--> AwaitingClientDh
//! AwaitingClientDh  --set_client_DH_params--> Finished (stage resets)
//! ```
//!
//! A `req_pq` at any stage starts over with a fresh `server_nonce`. Any
//! failed check resets the machine to [`Stage::AwaitingPqRequest`] and no
//! key is produced, so the client has to begin a new attempt.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use mtgate_crypto::rsa::{PrivateKey, RsaError};
use mtgate_crypto::{AuthKey, aes, generate_key_data_from_nonce, sha1};
use mtgate_tl::{Cursor, Deserializable, Identifiable, Serializable, enums, functions, types};
use num_bigint::BigUint;

/// DH generator.
pub const DH_G: u32 = 3;

/// `pq` handed out in every `resPQ`.
pub const PQ: u64 = 0x17ED48941A08F981;
const PQ_P: u64 = 1229739323;
const PQ_Q: u64 = 1402015859;

/// The standard 2048-bit safe prime of the MTProto DH group.
#[rustfmt::skip]
pub const DH_PRIME: [u8; 256] = [
    0xc7, 0x1c, 0xae, 0xb9, 0xc6, 0xb1, 0xc9, 0x04, 0x8e, 0x6c, 0x52, 0x2f, 0x70, 0xf1, 0x3f, 0x73,
    0x98, 0x0d, 0x40, 0x23, 0x8e, 0x3e, 0x21, 0xc1, 0x49, 0x34, 0xd0, 0x37, 0x56, 0x3d, 0x93, 0x0f,
    0x48, 0x19, 0x8a, 0x0a, 0xa7, 0xc1, 0x40, 0x58, 0x22, 0x94, 0x93, 0xd2, 0x25, 0x30, 0xf4, 0xdb,
    0xfa, 0x33, 0x6f, 0x6e, 0x0a, 0xc9, 0x25, 0x13, 0x95, 0x43, 0xae, 0xd4, 0x4c, 0xce, 0x7c, 0x37,
    0x20, 0xfd, 0x51, 0xf6, 0x94, 0x58, 0x70, 0x5a, 0xc6, 0x8c, 0xd4, 0xfe, 0x6b, 0x6b, 0x13, 0xab,
    0xdc, 0x97, 0x46, 0x51, 0x29, 0x69, 0x32, 0x84, 0x54, 0xf1, 0x8f, 0xaf, 0x8c, 0x59, 0x5f, 0x64,
    0x24, 0x77, 0xfe, 0x96, 0xbb, 0x2a, 0x94, 0x1d, 0x5b, 0xcd, 0x1d, 0x4a, 0xc8, 0xcc, 0x49, 0x88,
    0x07, 0x08, 0xfa, 0x9b, 0x37, 0x8e, 0x3c, 0x4f, 0x3a, 0x90, 0x60, 0xbe, 0xe6, 0x7c, 0xf9, 0xa4,
    0xa4, 0xa6, 0x95, 0x81, 0x10, 0x51, 0x90, 0x7e, 0x16, 0x27, 0x53, 0xb5, 0x6b, 0x0f, 0x6b, 0x41,
    0x0d, 0xba, 0x74, 0xd8, 0xa8, 0x4b, 0x2a, 0x14, 0xb3, 0x14, 0x4e, 0x0e, 0xf1, 0x28, 0x47, 0x54,
    0xfd, 0x17, 0xed, 0x95, 0x0d, 0x59, 0x65, 0xb4, 0xb9, 0xdd, 0x46, 0x58, 0x2d, 0xb1, 0x17, 0x8d,
    0x16, 0x9c, 0x6b, 0xc4, 0x65, 0xb0, 0xd6, 0xff, 0x9c, 0xa3, 0x92, 0x8f, 0xef, 0x5b, 0x9a, 0xe4,
    0xe4, 0x18, 0xfc, 0x15, 0xe8, 0x3e, 0xbe, 0xa0, 0xf8, 0x7f, 0xa9, 0xff, 0x5e, 0xed, 0x70, 0x05,
    0x0d, 0xed, 0x28, 0x49, 0xf4, 0x7b, 0xf9, 0x59, 0xd9, 0x56, 0x85, 0x0c, 0xe9, 0x29, 0x85, 0x1f,
    0x0d, 0x81, 0x15, 0xf6, 0x35, 0xb1, 0x05, 0xee, 0x2e, 0x4e, 0x15, 0xd0, 0x4b, 0x24, 0x54, 0xbf,
    0x6f, 0x4f, 0xad, 0xf0, 0x34, 0xb1, 0x04, 0x03, 0x11, 0x9c, 0xd8, 0xe3, 0xb9, 0x2f, 0xcc, 0x5b,
];

// ─── Error ────────────────────────────────────────────────────────────────────

/// Why a handshake step was refused.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// The request does not belong to the current stage.
    UnexpectedStep { expected: &'static str, got: &'static str },
    InvalidNonce { got: [u8; 16], expected: [u8; 16] },
    InvalidServerNonce { got: [u8; 16], expected: [u8; 16] },
    UnknownFingerprint { fingerprint: i64 },
    Rsa(RsaError),
    InvalidInnerData { error: mtgate_tl::deserialize::Error },
    InvalidPq,
    EncryptedDataNotPadded { len: usize },
    InvalidDataHash,
    GParameterOutOfRange,
    Random(mtgate_crypto::RandomError),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedStep { expected, got }
                => write!(f, "unexpected {got} while awaiting {expected}"),
            Self::InvalidNonce { got, expected }
                => write!(f, "nonce mismatch: got {got:?}, expected {expected:?}"),
            Self::InvalidServerNonce { got, expected }
                => write!(f, "server_nonce mismatch: got {got:?}, expected {expected:?}"),
            Self::UnknownFingerprint { fingerprint }
                => write!(f, "no server key with fingerprint {fingerprint}"),
            Self::Rsa(e) => write!(f, "rsa: {e}"),
            Self::InvalidInnerData { error }
                => write!(f, "inner data deserialization error: {error}"),
            Self::InvalidPq => write!(f, "p and q do not factor the issued pq"),
            Self::EncryptedDataNotPadded { len }
                => write!(f, "encrypted data len {len} is not 16-byte aligned"),
            Self::InvalidDataHash => write!(f, "encrypted data hash mismatch"),
            Self::GParameterOutOfRange => write!(f, "DH value outside the safe range"),
            Self::Random(e) => write!(f, "randomness unavailable: {e}"),
        }
    }
}

impl From<RsaError> for Error {
    fn from(e: RsaError) -> Self { Self::Rsa(e) }
}

impl From<mtgate_crypto::RandomError> for Error {
    fn from(e: mtgate_crypto::RandomError) -> Self { Self::Random(e) }
}

// ─── Server key ───────────────────────────────────────────────────────────────

/// The RSA key the server decrypts `p_q_inner_data` with.
#[derive(Clone, Debug)]
pub struct ServerKey {
    key: PrivateKey,
    fingerprint: i64,
}

impl ServerKey {
    pub fn new(key: PrivateKey) -> Self {
        let fingerprint = key.fingerprint();
        Self { key, fingerprint }
    }

    /// Load a PKCS#1 or PKCS#8 PEM private key.
    pub fn from_pem(pem: &str) -> Result<Self, RsaError> {
        PrivateKey::from_pem(pem).map(Self::new)
    }

    /// Fingerprint advertised in `resPQ`.
    pub fn fingerprint(&self) -> i64 { self.fingerprint }

    pub fn private_key(&self) -> &PrivateKey { &self.key }
}

// ─── Requests ─────────────────────────────────────────────────────────────────

/// A plaintext handshake request.
#[derive(Clone, Debug, PartialEq)]
pub enum HandshakeRequest {
    /// `req_pq_multi` or the legacy `req_pq`.
    ReqPq { nonce: [u8; 16] },
    ReqDhParams(functions::ReqDhParams),
    SetClientDhParams(functions::SetClientDhParams),
}

impl HandshakeRequest {
    /// Decode a plaintext message body.
    ///
    /// The body must hold exactly one request: trailing bytes are refused so
    /// that random data is unlikely to pass for a request.
    pub fn decode(body: &[u8]) -> Option<Self> {
        let mut cursor = Cursor::from_slice(body);
        let id = u32::deserialize(&mut cursor).ok()?;
        let request = match id {
            functions::ReqPqMulti::CONSTRUCTOR_ID => {
                Self::ReqPq { nonce: functions::ReqPqMulti::deserialize(&mut cursor).ok()?.nonce }
            }
            functions::ReqPq::CONSTRUCTOR_ID => {
                Self::ReqPq { nonce: functions::ReqPq::deserialize(&mut cursor).ok()?.nonce }
            }
            functions::ReqDhParams::CONSTRUCTOR_ID => {
                Self::ReqDhParams(functions::ReqDhParams::deserialize(&mut cursor).ok()?)
            }
            functions::SetClientDhParams::CONSTRUCTOR_ID => {
                Self::SetClientDhParams(functions::SetClientDhParams::deserialize(&mut cursor).ok()?)
            }
            _ => return None,
        };
        (cursor.remaining() == 0).then_some(request)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ReqPq { .. } => "req_pq_multi",
            Self::ReqDhParams(_) => "req_DH_params",
            Self::SetClientDhParams(_) => "set_client_DH_params",
        }
    }
}

// ─── Result ───────────────────────────────────────────────────────────────────

/// What kind of key the client asked for in `p_q_inner_data`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyKind {
    Permanent,
    Temporary,
    /// A temporary key restricted to media traffic (`_temp_dc` with a negative dc).
    MediaTemporary,
}

impl KeyKind {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Permanent => 0,
            Self::Temporary => 1,
            Self::MediaTemporary => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Permanent,
            1 => Self::Temporary,
            2 => Self::MediaTemporary,
            _ => return None,
        })
    }
}

/// The output of a successful exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct Finished {
    pub auth_key: AuthKey,
    pub kind: KeyKind,
    /// Datacenter named by the `_dc` inner data variants.
    pub dc: Option<i32>,
    /// Lifetime in seconds requested for a temporary key.
    pub expires_in: Option<i32>,
    /// `new_nonce[0..8] XOR server_nonce[0..8]`.
    pub first_salt: i64,
}

/// The answer to one handshake step.
#[derive(Clone, Debug)]
pub struct Outcome {
    /// Encoded TL object to send back in a plaintext envelope.
    pub reply: Vec<u8>,
    /// Set once `set_client_DH_params` succeeded.
    pub finished: Option<Finished>,
}

// ─── State machine ────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
enum Stage {
    #[default]
    AwaitingPqRequest,
    AwaitingDhParams {
        nonce: [u8; 16],
        server_nonce: [u8; 16],
    },
    AwaitingClientDh {
        nonce: [u8; 16],
        server_nonce: [u8; 16],
        new_nonce: [u8; 32],
        a: BigUint,
        kind: KeyKind,
        dc: Option<i32>,
        expires_in: Option<i32>,
    },
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Self::AwaitingPqRequest => "req_pq_multi",
            Self::AwaitingDhParams { .. } => "req_DH_params",
            Self::AwaitingClientDh { .. } => "set_client_DH_params",
        }
    }
}

/// Handshake state for one connection.
///
/// Holds the nonces and the ephemeral exponent `a` between steps; they are
/// dropped as soon as the exchange finishes or fails.
#[derive(Debug, Default)]
pub struct Handshake {
    stage: Stage,
}

impl Handshake {
    pub fn new() -> Self { Self::default() }

    /// `true` while no step is in progress.
    pub fn is_idle(&self) -> bool { matches!(self.stage, Stage::AwaitingPqRequest) }

    /// Process one request using OS randomness and the current time.
    pub fn handle(&mut self, key: &ServerKey, request: HandshakeRequest) -> Result<Outcome, Error> {
        match request {
            HandshakeRequest::ReqPq { nonce } => {
                let mut server_nonce = [0u8; 16];
                mtgate_crypto::fill_random(&mut server_nonce)?;
                Ok(Outcome { reply: self.req_pq_with_random(key, nonce, server_nonce), finished: None })
            }
            HandshakeRequest::ReqDhParams(req) => {
                let mut random = [0u8; 272];
                if let Err(e) = mtgate_crypto::fill_random(&mut random) {
                    self.stage = Stage::AwaitingPqRequest;
                    return Err(e.into());
                }
                let reply = self.req_dh_params_with_random(key, &req, &random, unix_now())?;
                Ok(Outcome { reply, finished: None })
            }
            HandshakeRequest::SetClientDhParams(req) => {
                let (reply, finished) = self.set_client_dh_params(&req)?;
                Ok(Outcome { reply, finished: Some(finished) })
            }
        }
    }

    /// Answer `req_pq_multi` with `resPQ`. Always accepted.
    pub fn req_pq_with_random(&mut self, key: &ServerKey, nonce: [u8; 16], server_nonce: [u8; 16]) -> Vec<u8> {
        if !self.is_idle() {
            log::debug!("[mtgate] req_pq during {}: restarting handshake", self.stage.name());
        }
        self.stage = Stage::AwaitingDhParams { nonce, server_nonce };
        enums::ResPq::ResPq(types::ResPq {
            nonce,
            server_nonce,
            pq: PQ.to_be_bytes().to_vec(),
            server_public_key_fingerprints: vec![key.fingerprint()],
        })
        .to_bytes()
    }

    /// Answer `req_DH_params` with `server_DH_params_ok`.
    ///
    /// `random` supplies the exponent `a` (first 256 bytes) and the padding of
    /// the encrypted answer.
    pub fn req_dh_params_with_random(
        &mut self,
        key: &ServerKey,
        req: &functions::ReqDhParams,
        random: &[u8; 272],
        now: i32,
    ) -> Result<Vec<u8>, Error> {
        let (nonce, server_nonce) = match std::mem::take(&mut self.stage) {
            Stage::AwaitingDhParams { nonce, server_nonce } => (nonce, server_nonce),
            other => return Err(Error::UnexpectedStep { expected: other.name(), got: "req_DH_params" }),
        };

        check_nonce(&req.nonce, &nonce)?;
        check_server_nonce(&req.server_nonce, &server_nonce)?;
        if req.public_key_fingerprint != key.fingerprint() {
            return Err(Error::UnknownFingerprint { fingerprint: req.public_key_fingerprint });
        }

        let data = key.private_key().decrypt_hashed(&req.encrypted_data)?;
        let inner = InnerRequest::parse(&data)?;

        check_nonce(&inner.nonce, &nonce)?;
        check_server_nonce(&inner.server_nonce, &server_nonce)?;
        check_pq(&inner.pq, &inner.p, &inner.q)?;
        if inner.p != req.p || inner.q != req.q {
            return Err(Error::InvalidPq);
        }

        let prime = BigUint::from_bytes_be(&DH_PRIME);
        let a = BigUint::from_bytes_be(&random[..256]);
        let g_a = BigUint::from(DH_G).modpow(&a, &prime);
        check_dh_value(&g_a, &prime)?;

        let inner_data = enums::ServerDhInnerData::ServerDhInnerData(types::ServerDhInnerData {
            nonce,
            server_nonce,
            g: DH_G as i32,
            dh_prime: DH_PRIME.to_vec(),
            g_a: left_pad_256(&g_a).to_vec(),
            server_time: now,
        })
        .to_bytes();

        let mut answer = Vec::with_capacity(20 + inner_data.len() + 16);
        answer.extend_from_slice(&sha1!(&inner_data));
        answer.extend_from_slice(&inner_data);
        let pad_len = (16 - answer.len() % 16) % 16;
        answer.extend_from_slice(&random[256..256 + pad_len]);

        let (tmp_key, tmp_iv) = generate_key_data_from_nonce(&server_nonce, &inner.new_nonce);
        aes::ige_encrypt(&mut answer, &tmp_key, &tmp_iv);

        log::debug!("[mtgate] DH params sent ({:?} key requested)", inner.kind);
        self.stage = Stage::AwaitingClientDh {
            nonce,
            server_nonce,
            new_nonce: inner.new_nonce,
            a,
            kind: inner.kind,
            dc: inner.dc,
            expires_in: inner.expires_in,
        };

        Ok(enums::ServerDhParams::Ok(types::ServerDhParamsOk {
            nonce,
            server_nonce,
            encrypted_answer: answer,
        })
        .to_bytes())
    }

    /// Answer `set_client_DH_params` with `dh_gen_ok` and derive the key.
    pub fn set_client_dh_params(&mut self, req: &functions::SetClientDhParams) -> Result<(Vec<u8>, Finished), Error> {
        let (nonce, server_nonce, new_nonce, a, kind, dc, expires_in) = match std::mem::take(&mut self.stage) {
            Stage::AwaitingClientDh { nonce, server_nonce, new_nonce, a, kind, dc, expires_in } => {
                (nonce, server_nonce, new_nonce, a, kind, dc, expires_in)
            }
            other => {
                return Err(Error::UnexpectedStep { expected: other.name(), got: "set_client_DH_params" });
            }
        };

        check_nonce(&req.nonce, &nonce)?;
        check_server_nonce(&req.server_nonce, &server_nonce)?;

        let len = req.encrypted_data.len();
        if len % 16 != 0 || len < 32 {
            return Err(Error::EncryptedDataNotPadded { len });
        }
        let (tmp_key, tmp_iv) = generate_key_data_from_nonce(&server_nonce, &new_nonce);
        let mut plain = req.encrypted_data.clone();
        aes::ige_decrypt(&mut plain, &tmp_key, &tmp_iv);

        let mut cursor = Cursor::from_slice(&plain[20..]);
        let enums::ClientDhInnerData::ClientDhInnerData(inner) =
            enums::ClientDhInnerData::deserialize(&mut cursor)
                .map_err(|error| Error::InvalidInnerData { error })?;
        if sha1!(&plain[20..20 + cursor.pos()]) != plain[..20] {
            return Err(Error::InvalidDataHash);
        }

        check_nonce(&inner.nonce, &nonce)?;
        check_server_nonce(&inner.server_nonce, &server_nonce)?;

        let prime = BigUint::from_bytes_be(&DH_PRIME);
        let g_b = BigUint::from_bytes_be(&inner.g_b);
        check_dh_value(&g_b, &prime)?;

        let auth_key = AuthKey::from_bytes(left_pad_256(&g_b.modpow(&a, &prime)));
        let reply = enums::SetClientDhParamsAnswer::DhGenOk(types::DhGenOk {
            nonce,
            server_nonce,
            new_nonce_hash1: auth_key.calc_new_nonce_hash(&new_nonce, 1),
        })
        .to_bytes();

        let first_salt = {
            let mut buf = [0u8; 8];
            for ((dst, x), y) in buf.iter_mut().zip(&new_nonce[..8]).zip(&server_nonce[..8]) {
                *dst = x ^ y;
            }
            i64::from_le_bytes(buf)
        };

        log::info!("[mtgate] auth key {} created ({kind:?})", auth_key.id());
        Ok((reply, Finished { auth_key, kind, dc, expires_in, first_salt }))
    }
}

// ─── Inner data ───────────────────────────────────────────────────────────────

/// The four `p_q_inner_data` variants flattened.
struct InnerRequest {
    pq: Vec<u8>,
    p: Vec<u8>,
    q: Vec<u8>,
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce: [u8; 32],
    kind: KeyKind,
    dc: Option<i32>,
    expires_in: Option<i32>,
}

impl InnerRequest {
    fn parse(data: &[u8]) -> Result<Self, Error> {
        let inner = enums::PQInnerData::from_bytes(data).map_err(|error| Error::InvalidInnerData { error })?;
        Ok(match inner {
            enums::PQInnerData::PQInnerData(x) => Self {
                pq: x.pq, p: x.p, q: x.q,
                nonce: x.nonce, server_nonce: x.server_nonce, new_nonce: x.new_nonce,
                kind: KeyKind::Permanent, dc: None, expires_in: None,
            },
            enums::PQInnerData::Dc(x) => Self {
                pq: x.pq, p: x.p, q: x.q,
                nonce: x.nonce, server_nonce: x.server_nonce, new_nonce: x.new_nonce,
                kind: KeyKind::Permanent, dc: Some(x.dc), expires_in: None,
            },
            enums::PQInnerData::Temp(x) => Self {
                pq: x.pq, p: x.p, q: x.q,
                nonce: x.nonce, server_nonce: x.server_nonce, new_nonce: x.new_nonce,
                kind: KeyKind::Temporary, dc: None, expires_in: Some(x.expires_in),
            },
            enums::PQInnerData::TempDc(x) => Self {
                pq: x.pq, p: x.p, q: x.q,
                nonce: x.nonce, server_nonce: x.server_nonce, new_nonce: x.new_nonce,
                kind: if x.dc < 0 { KeyKind::MediaTemporary } else { KeyKind::Temporary },
                dc: Some(x.dc),
                expires_in: Some(x.expires_in),
            },
        })
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn unix_now() -> i32 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i32).unwrap_or_default()
}

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

fn be_u64(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() || bytes.len() > 8 {
        return None;
    }
    Some(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

fn check_pq(pq: &[u8], p: &[u8], q: &[u8]) -> Result<(), Error> {
    match (be_u64(pq), be_u64(p), be_u64(q)) {
        (Some(PQ), Some(PQ_P), Some(PQ_Q)) => Ok(()),
        _ => Err(Error::InvalidPq),
    }
}

/// `1 < x < p - 1` and `2^1984 < x < p - 2^1984`.
fn check_dh_value(value: &BigUint, prime: &BigUint) -> Result<(), Error> {
    let one = BigUint::from(1u32);
    let safety = &one << (2048 - 64);
    if &one < value && value < &(prime - &one) && &safety < value && value < &(prime - &safety) {
        Ok(())
    } else {
        Err(Error::GParameterOutOfRange)
    }
}

fn left_pad_256(value: &BigUint) -> [u8; 256] {
    let bytes = value.to_bytes_be();
    let mut out = [0u8; 256];
    out[256 - bytes.len()..].copy_from_slice(&bytes);
    out
}
