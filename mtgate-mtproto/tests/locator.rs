use mtgate_crypto::{AuthKey, Side};
use mtgate_mtproto::encrypted::{self, Envelope};
use mtgate_mtproto::locator::{Limits, locate_encrypted};
use mtgate_tl::{Serializable, functions};

fn key() -> AuthKey {
    let mut data = [0u8; 256];
    for (i, b) in data.iter_mut().enumerate() {
        *b = (i as u8).wrapping_mul(13).wrapping_add(5);
    }
    AuthKey::from_bytes(data)
}

fn noise(len: usize, seed: u32) -> Vec<u8> {
    let mut x = seed | 1;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            x as u8
        })
        .collect()
}

fn frame(msg_id: i64, body: &[u8]) -> Vec<u8> {
    let envelope = Envelope { salt: 0x1111, session_id: 0x2222, msg_id, seq_no: 1 };
    encrypted::pack(&key(), Side::Client, &envelope, body).unwrap()
}

#[test]
fn trailing_padding_yields_exactly_one_message() {
    let body = functions::Ping { ping_id: 42 }.to_bytes();
    for extra in 1..=15 {
        let mut buf = frame(0x6500_0000_0000_0004, &body);
        let len = buf.len();
        buf.extend(noise(extra, extra as u32));

        let (found, consumed) = locate_encrypted(&buf, &key(), Limits::default());
        assert_eq!(found.len(), 1, "padding {extra}");
        assert_eq!(found[0].message.body, body);
        assert_eq!(found[0].message.envelope.session_id, 0x2222);
        assert_eq!(consumed, len);
    }
}

#[test]
fn noise_yields_nothing() {
    for seed in 1..20 {
        let buf = noise(700, seed);
        let (found, consumed) = locate_encrypted(&buf, &key(), Limits::default());
        assert!(found.is_empty());
        assert_eq!(consumed, 0);
    }
}

#[test]
fn message_for_another_key_is_ignored() {
    let other = AuthKey::from_bytes([1; 256]);
    let envelope = Envelope { salt: 1, session_id: 2, msg_id: 4, seq_no: 1 };
    let buf = encrypted::pack(&other, Side::Client, &envelope, &[0; 8]).unwrap();
    let (found, _) = locate_encrypted(&buf, &key(), Limits::default());
    assert!(found.is_empty());
}

#[test]
fn ciphertext_cap_limits_message_size() {
    let buf = frame(4, &[3; 4096]);
    let limits = Limits { max_ciphertext_len: 1024, ..Limits::default() };
    assert!(locate_encrypted(&buf, &key(), limits).0.is_empty());
    assert_eq!(locate_encrypted(&buf, &key(), Limits::default()).0.len(), 1);
}
