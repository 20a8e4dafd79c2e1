use mtgate_crypto::{AuthKey, DecryptError, Side, decrypt_data_v2, do_encrypt_data_v2, generate_key_data_from_nonce, message_key};

fn key() -> AuthKey {
    let mut data = [0u8; 256];
    for (i, b) in data.iter_mut().enumerate() {
        *b = (i as u8).wrapping_mul(31).wrapping_add(5);
    }
    AuthKey::from_bytes(data)
}

#[test]
fn client_frame_decrypts_on_server() {
    let key = key();
    let plaintext: Vec<u8> = (0..40u8).collect();
    let mut frame = do_encrypt_data_v2(&plaintext, &key, Side::Client, &[7; 32]);

    assert_eq!(&frame[..8], &key.key_id());
    assert_eq!((frame.len() - 24) % 16, 0);

    let plain = decrypt_data_v2(&mut frame, &key, Side::Client).unwrap();
    assert_eq!(&plain[..40], &plaintext[..]);
    let padding = plain.len() - 40;
    assert!((12..=1024).contains(&padding), "padding {padding}");
}

#[test]
fn wrong_side_is_rejected() {
    let key = key();
    let mut frame = do_encrypt_data_v2(&[1, 2, 3, 4], &key, Side::Server, &[0; 32]);
    assert_eq!(decrypt_data_v2(&mut frame, &key, Side::Client).unwrap_err(), DecryptError::MessageKeyMismatch);
}

#[test]
fn misaligned_frame_is_rejected() {
    let key = key();
    let mut frame = vec![0u8; 24 + 15];
    assert_eq!(decrypt_data_v2(&mut frame, &key, Side::Client).unwrap_err(), DecryptError::InvalidBuffer);
}

#[test]
fn message_key_is_embedded_after_key_id() {
    let key = key();
    let plaintext = [9u8; 32];
    let frame = do_encrypt_data_v2(&plaintext, &key, Side::Server, &[3; 32]);

    let mut padded = plaintext.to_vec();
    padded.extend(std::iter::repeat_n(3u8, 32));
    assert_eq!(&frame[8..24], &message_key(&key, Side::Server, &padded));
}

#[test]
fn nonce_key_data_uses_new_nonce_tail() {
    let server_nonce = [1u8; 16];
    let mut new_nonce = [2u8; 32];
    new_nonce[..4].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
    let (_, iv) = generate_key_data_from_nonce(&server_nonce, &new_nonce);
    assert_eq!(&iv[28..], &[0xde, 0xad, 0xbe, 0xef]);
}
