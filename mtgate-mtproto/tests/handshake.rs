use mtgate_mtproto::client;
use mtgate_mtproto::handshake::{Error, Handshake, KeyKind, PQ, ServerKey};
use mtgate_tl::{Deserializable, enums};

const PEM: &str = include_str!("../../testdata/server_test_key.pem");
const NOW: i32 = 1_700_000_000;

fn server_key() -> ServerKey {
    ServerKey::from_pem(PEM).unwrap()
}

fn filled<const N: usize>(seed: u8) -> [u8; N] {
    let mut out = [0u8; N];
    let mut x = seed as u32 | 1;
    for b in out.iter_mut() {
        x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        *b = (x >> 16) as u8;
    }
    out
}

struct Exchange {
    hs: Handshake,
    key: ServerKey,
    step3: client::Step3,
    request: mtgate_tl::functions::SetClientDhParams,
}

fn run_until_set_client_dh(temp: Option<i32>) -> Exchange {
    let key = server_key();
    let mut hs = Handshake::new();

    let (req, s1) = client::do_step1(&filled(1));
    let res = hs.req_pq_with_random(&key, req.nonce, filled(2));
    let res_pq = enums::ResPq::from_bytes(&res).unwrap();
    let enums::ResPq::ResPq(ref inner) = res_pq;
    assert_eq!(inner.nonce, req.nonce);
    assert_eq!(inner.server_nonce, filled::<16>(2));
    assert_eq!(inner.pq, PQ.to_be_bytes().to_vec());
    assert_eq!(inner.server_public_key_fingerprints, vec![key.fingerprint()]);

    let (req, s2) = client::do_step2(s1, res_pq, key.private_key().public(), &filled(3), temp).unwrap();
    let dh = hs.req_dh_params_with_random(&key, &req, &filled(4), NOW).unwrap();
    let dh = enums::ServerDhParams::from_bytes(&dh).unwrap();
    let (request, step3) = client::do_step3(s2, dh, &filled(5), NOW).unwrap();

    Exchange { hs, key, step3, request }
}

#[test]
fn client_and_server_derive_the_same_key() {
    let Exchange { mut hs, step3, request, .. } = run_until_set_client_dh(None);

    let (reply, finished) = hs.set_client_dh_params(&request).unwrap();
    let answer = enums::SetClientDhParamsAnswer::from_bytes(&reply).unwrap();
    let done = client::finish(step3, answer.clone()).unwrap();

    assert_eq!(done.auth_key, finished.auth_key);
    assert_eq!(done.first_salt, finished.first_salt);
    assert_eq!(done.time_offset, 0);
    assert_eq!(finished.kind, KeyKind::Permanent);
    assert_eq!(finished.expires_in, None);
    assert!(hs.is_idle());

    let enums::SetClientDhParamsAnswer::DhGenOk(ok) = answer else { panic!("expected dh_gen_ok") };
    assert_eq!(ok.new_nonce_hash1, done.auth_key.calc_new_nonce_hash(&done.new_nonce, 1));
}

#[test]
fn key_id_is_stable_for_the_same_secret() {
    let a = mtgate_crypto::AuthKey::from_bytes(filled(9));
    let b = mtgate_crypto::AuthKey::from_bytes(filled(9));
    assert_eq!(a.id(), b.id());
}

#[test]
fn temporary_key_request_is_reported() {
    let Exchange { mut hs, request, .. } = run_until_set_client_dh(Some(3600));
    let (_, finished) = hs.set_client_dh_params(&request).unwrap();
    assert_eq!(finished.kind, KeyKind::Temporary);
    assert_eq!(finished.expires_in, Some(3600));
}

#[test]
fn mismatched_server_nonce_fails_without_a_key() {
    let Exchange { mut hs, mut request, .. } = run_until_set_client_dh(None);
    let good = request.clone();
    request.server_nonce[0] ^= 0xff;

    let err = hs.set_client_dh_params(&request).unwrap_err();
    assert!(matches!(err, Error::InvalidServerNonce { .. }));
    assert!(hs.is_idle());

    // The attempt is gone: even the honest request is now out of order.
    let err = hs.set_client_dh_params(&good).unwrap_err();
    assert!(matches!(err, Error::UnexpectedStep { .. }));
}

#[test]
fn tampered_encrypted_data_is_rejected() {
    let Exchange { mut hs, mut request, .. } = run_until_set_client_dh(None);
    request.encrypted_data[40] ^= 1;
    assert!(hs.set_client_dh_params(&request).is_err());
    assert!(hs.is_idle());
}

#[test]
fn unknown_fingerprint_is_rejected() {
    let key = server_key();
    let mut hs = Handshake::new();
    let (req, s1) = client::do_step1(&filled(1));
    let res = hs.req_pq_with_random(&key, req.nonce, filled(2));
    let res_pq = enums::ResPq::from_bytes(&res).unwrap();
    let (mut req, _) = client::do_step2(s1, res_pq, key.private_key().public(), &filled(3), None).unwrap();
    req.public_key_fingerprint ^= 1;

    let err = hs.req_dh_params_with_random(&key, &req, &filled(4), NOW).unwrap_err();
    assert_eq!(err, Error::UnknownFingerprint { fingerprint: req.public_key_fingerprint });
}

#[test]
fn req_pq_restarts_an_attempt() {
    let Exchange { mut hs, key, request, .. } = run_until_set_client_dh(None);
    hs.req_pq_with_random(&key, [7; 16], filled(8));
    assert!(matches!(hs.set_client_dh_params(&request), Err(Error::UnexpectedStep { .. })));
}

#[test]
fn handle_uses_fresh_server_nonces() {
    let key = server_key();
    let mut hs = Handshake::new();
    let request = mtgate_mtproto::HandshakeRequest::ReqPq { nonce: [1; 16] };
    let a = hs.handle(&key, request.clone()).unwrap();
    let b = hs.handle(&key, request).unwrap();
    assert!(a.finished.is_none());
    assert_ne!(a.reply, b.reply);
}
