use mtgate_crypto::rsa::{PrivateKey, RsaError, encrypt_hashed};

const TEST_KEY_PEM: &str = include_str!("../../testdata/server_test_key.pem");
const TEST_KEY_PKCS8_PEM: &str = include_str!("../../testdata/server_test_key_pkcs8.pem");

fn random_224(seed: u8) -> [u8; 224] {
    let mut out = [0u8; 224];
    for (i, b) in out.iter_mut().enumerate() {
        *b = (i as u8).wrapping_mul(13) ^ seed;
    }
    out
}

#[test]
fn pem_loads_and_fingerprints() {
    let key = PrivateKey::from_pem(TEST_KEY_PEM).unwrap();
    assert_eq!(key.fingerprint(), 5273266983025547163);
    assert_eq!(key.public().fingerprint(), key.fingerprint());
}

#[test]
fn pkcs8_pem_loads_the_same_key() {
    let pkcs1 = PrivateKey::from_pem(TEST_KEY_PEM).unwrap();
    let pkcs8 = PrivateKey::from_pem(TEST_KEY_PKCS8_PEM).unwrap();
    assert_eq!(pkcs8.fingerprint(), pkcs1.fingerprint());

    let ciphertext = encrypt_hashed(&[7; 32], pkcs1.public(), &random_224(3));
    assert_eq!(&pkcs8.decrypt_hashed(&ciphertext).unwrap()[..32], &[7; 32]);
}

#[test]
fn public_key_pem_is_rejected() {
    let pem = "-----BEGIN PUBLIC KEY-----\nMFwwDQYJKoZIhvcNAQEBBQADSwAwSAJBAK0=\n-----END PUBLIC KEY-----\n";
    assert_eq!(PrivateKey::from_pem(pem).unwrap_err(), RsaError::InvalidPem);
}

#[test]
fn rsa_pad_roundtrip() {
    let key = PrivateKey::from_pem(TEST_KEY_PEM).unwrap();
    let data: Vec<u8> = (0..100u8).collect();
    let random = random_224(0x5a);

    let ciphertext = encrypt_hashed(&data, key.public(), &random);
    assert_eq!(ciphertext.len(), 256);

    let recovered = key.decrypt_hashed(&ciphertext).unwrap();
    assert_eq!(&recovered[..100], &data[..]);
    assert_eq!(&recovered[100..], &random[..92]);
}

#[test]
fn tampered_ciphertext_fails_hash_check() {
    let key = PrivateKey::from_pem(TEST_KEY_PEM).unwrap();
    let mut ciphertext = encrypt_hashed(&[1, 2, 3, 4], key.public(), &random_224(1));
    ciphertext[200] ^= 0x01;
    // A flipped bit either lands the value above n or breaks the embedded hash.
    let err = key.decrypt_hashed(&ciphertext).unwrap_err();
    assert!(matches!(err, RsaError::HashMismatch | RsaError::CiphertextOutOfRange { .. }));
}

#[test]
fn oversized_ciphertext_is_rejected() {
    let key = PrivateKey::from_pem(TEST_KEY_PEM).unwrap();
    assert_eq!(
        key.decrypt_hashed(&[0xff; 257]).unwrap_err(),
        RsaError::CiphertextOutOfRange { len: 257 },
    );
}
