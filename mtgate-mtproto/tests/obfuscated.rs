use mtgate_mtproto::obfuscated::{Framing, HEADER_LEN, ObfuscatedCodec};

fn seeded(seed: u8) -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    for (i, b) in out.iter_mut().enumerate() {
        *b = (i as u8).wrapping_mul(37).wrapping_add(seed);
    }
    out
}

fn hex(s: &str) -> Vec<u8> {
    (0..s.len()).step_by(2).map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap()).collect()
}

#[test]
fn matches_reference_keystream() {
    let mut random = [0u8; HEADER_LEN];
    for (i, b) in random.iter_mut().enumerate() {
        *b = i as u8;
    }
    random[0] = 0x11;

    let (header, mut client) = ObfuscatedCodec::client(random, Framing::Intermediate);
    assert_eq!(
        header.to_vec(),
        hex("110102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f202122232425262728292a2b2c2d2e2f30313233343536374618255e223dfd5d"),
    );

    let mut server = ObfuscatedCodec::from_init(&header);
    assert_eq!(server.framing(), Framing::Intermediate);

    let mut ping = *b"ping";
    client.encrypt(&mut ping);
    assert_eq!(ping.to_vec(), hex("42c0af4f"));
    server.decrypt(&mut ping);
    assert_eq!(&ping, b"ping");

    let mut hello = *b"hello world!";
    server.encrypt(&mut hello);
    assert_eq!(hello.to_vec(), hex("47f88f1cb1ec712fe7b555c2"));
}

#[test]
fn both_directions_are_symmetric() {
    for framing in [Framing::Abridged, Framing::Intermediate, Framing::PaddedIntermediate] {
        let (header, mut client) = ObfuscatedCodec::client(seeded(framing.tag()[0]), framing);
        let mut server = ObfuscatedCodec::from_init(&header);
        assert_eq!(server.framing(), framing);

        for len in [0usize, 1, 15, 16, 17, 300] {
            let message: Vec<u8> = (0..len).map(|i| i as u8).collect();

            let mut up = message.clone();
            client.encrypt(&mut up);
            server.decrypt(&mut up);
            assert_eq!(up, message);

            let mut down = message.clone();
            server.encrypt(&mut down);
            client.decrypt(&mut down);
            assert_eq!(down, message);
        }
    }
}

#[test]
fn unknown_tag_falls_back_to_abridged() {
    let (mut header, _) = ObfuscatedCodec::client(seeded(3), Framing::Intermediate);
    header[56] ^= 0xff;
    assert_eq!(ObfuscatedCodec::from_init(&header).framing(), Framing::Abridged);
}

#[test]
fn outgoing_frames_decode_on_the_client() {
    for framing in [Framing::Abridged, Framing::Intermediate, Framing::PaddedIntermediate] {
        let (header, mut client) = ObfuscatedCodec::client(seeded(9), framing);
        let mut server = ObfuscatedCodec::from_init(&header);

        let payload: Vec<u8> = (0..600u32).map(|i| i as u8).collect();
        let mut wire = server.frame_outgoing(&payload);
        client.decrypt(&mut wire);

        let (range, consumed) = framing.decode(&wire).unwrap();
        assert_eq!(consumed, wire.len());
        assert_eq!(&wire[range.start..range.start + payload.len()], &payload[..]);
        if framing != Framing::PaddedIntermediate {
            assert_eq!(range.len(), payload.len());
        }
    }
}
