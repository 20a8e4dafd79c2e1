use mtgate_tl::deserialize::Error;
use mtgate_tl::types::{JsonObjectValue, JsonValue, Message, MsgContainer};
use mtgate_tl::{Blob, Cursor, Deserializable, Identifiable, RawVec, Serializable, boxed, enums, functions, types};

// ── Primitives ────────────────────────────────────────────────────────────────

#[test]
fn bool_constructor_ids() {
    assert_eq!(true.to_bytes(), 0x997275b5u32.to_le_bytes());
    assert_eq!(false.to_bytes(), 0xbc799737u32.to_le_bytes());
    assert!(!bool::from_bytes(&false.to_bytes()).unwrap());
}

#[test]
fn bool_rejects_other_ids() {
    assert_eq!(
        bool::from_bytes(&1u32.to_le_bytes()).unwrap_err(),
        Error::UnexpectedConstructor { id: 1 },
    );
}

// ── String / bytes ────────────────────────────────────────────────────────────

#[test]
fn short_string_is_aligned() {
    let bytes = "hello world".to_owned().to_bytes();
    assert_eq!(bytes.len() % 4, 0);
    assert_eq!(bytes[0], 11);
    assert_eq!(String::from_bytes(&bytes).unwrap(), "hello world");
}

#[test]
fn long_bytes_use_wide_header() {
    let v: Vec<u8> = vec![7; 300];
    let bytes = v.to_bytes();
    assert_eq!(&bytes[..4], &[0xfe, 0x2c, 0x01, 0x00]);
    assert_eq!(bytes.len(), 304);
    assert_eq!(Vec::<u8>::from_bytes(&bytes).unwrap(), v);
}

#[test]
fn declared_length_past_end_fails_without_allocating() {
    let bytes = [0xfe, 0xff, 0xff, 0xff, 1, 2, 3, 4];
    assert_eq!(Vec::<u8>::from_bytes(&bytes).unwrap_err(), Error::UnexpectedEof);
}

#[test]
fn invalid_utf8_is_reported() {
    let bytes = vec![0xc3u8, 0x28].to_bytes();
    assert_eq!(String::from_bytes(&bytes).unwrap_err(), Error::InvalidUtf8);
}

// ── Vectors ───────────────────────────────────────────────────────────────────

#[test]
fn boxed_vector_layout() {
    let bytes = vec![1i64, -2].to_bytes();
    assert_eq!(&bytes[..4], &0x1cb5c415u32.to_le_bytes());
    assert_eq!(&bytes[4..8], &2i32.to_le_bytes());
    assert_eq!(Vec::<i64>::from_bytes(&bytes).unwrap(), vec![1, -2]);
}

#[test]
fn huge_vector_count_is_rejected() {
    let mut bytes = 0x1cb5c415u32.to_le_bytes().to_vec();
    bytes.extend(i32::MAX.to_le_bytes());
    bytes.extend([0u8; 16]);
    assert_eq!(Vec::<i32>::from_bytes(&bytes).unwrap_err(), Error::UnexpectedEof);
}

#[test]
fn raw_vec_has_no_header() {
    let bytes = RawVec(vec![5i32]).to_bytes();
    assert_eq!(bytes, [1, 0, 0, 0, 5, 0, 0, 0]);
}

// ── Schema objects ────────────────────────────────────────────────────────────

#[test]
fn function_writes_its_constructor_id() {
    let req = functions::ReqPqMulti { nonce: [3; 16] };
    let bytes = req.to_bytes();
    assert_eq!(&bytes[..4], &functions::ReqPqMulti::CONSTRUCTOR_ID.to_le_bytes());
    assert_eq!(bytes.len(), 20);

    // The server reads the id first, then the fields.
    let mut cur = Cursor::from_slice(&bytes);
    assert_eq!(u32::deserialize(&mut cur).unwrap(), 0xbe7e8ef1);
    assert_eq!(functions::ReqPqMulti::deserialize(&mut cur).unwrap(), req);
}

#[test]
fn boxed_enum_dispatches_on_id() {
    let answer = enums::SetClientDhParamsAnswer::DhGenRetry(types::DhGenRetry {
        nonce: [1; 16],
        server_nonce: [2; 16],
        new_nonce_hash2: [3; 16],
    });
    let bytes = answer.to_bytes();
    assert_eq!(&bytes[..4], &0x46dc1fb9u32.to_le_bytes());
    assert_eq!(enums::SetClientDhParamsAnswer::from_bytes(&bytes).unwrap(), answer);
}

#[test]
fn boxed_helper_matches_enum_encoding() {
    let pong = types::Pong { msg_id: 10, ping_id: 20 };
    assert_eq!(boxed(&pong), enums::Pong::Pong(pong.clone()).to_bytes());
}

#[test]
fn container_messages_keep_their_bodies() {
    let container = MsgContainer {
        messages: RawVec(vec![
            Message { msg_id: 4, seqno: 1, body: functions::Ping { ping_id: 1 }.to_bytes() },
            Message { msg_id: 8, seqno: 3, body: boxed(&types::MsgsAck { msg_ids: vec![4] }) },
        ]),
    };
    let bytes = boxed(&container);
    let mut cur = Cursor::from_slice(&bytes);
    assert_eq!(u32::deserialize(&mut cur).unwrap(), MsgContainer::CONSTRUCTOR_ID);
    let decoded = MsgContainer::deserialize(&mut cur).unwrap();
    assert_eq!(decoded, container);
    assert_eq!(cur.remaining(), 0);
}

#[test]
fn rpc_result_embeds_raw_answer() {
    let result = types::RpcResult { req_msg_id: 99, result: Blob(boxed(&types::Pong { msg_id: 1, ping_id: 2 })) };
    let bytes = boxed(&result);
    assert_eq!(&bytes[..4], &0xf35c6d01u32.to_le_bytes());
    assert_eq!(&bytes[4..12], &99i64.to_le_bytes());
    assert_eq!(&bytes[12..16], &0x347773c5u32.to_le_bytes());
}

#[test]
fn init_connection_with_params_roundtrip() {
    let call = functions::InitConnection {
        api_id: 4,
        device_model: "desktop".into(),
        system_version: "linux".into(),
        app_version: "1.0".into(),
        system_lang_code: "en".into(),
        lang_pack: "".into(),
        lang_code: "en".into(),
        proxy: Some(enums::InputClientProxy::InputClientProxy(types::InputClientProxy {
            address: "10.0.0.1".into(),
            port: 443,
        })),
        params: Some(JsonValue::Object(vec![JsonObjectValue {
            key: "tz_offset".into(),
            value: JsonValue::Array(vec![JsonValue::Number(3600.0), JsonValue::Null]),
        }])),
        query: Blob(functions::Ping { ping_id: 5 }.to_bytes()),
    };
    let bytes = call.to_bytes();
    let mut cur = Cursor::from_slice(&bytes);
    assert_eq!(u32::deserialize(&mut cur).unwrap(), 0xc1cd5ea9);
    assert_eq!(functions::InitConnection::deserialize(&mut cur).unwrap(), call);
}

#[test]
fn json_nesting_is_bounded() {
    let mut value = JsonValue::Null;
    for _ in 0..=JsonValue::MAX_DEPTH {
        value = JsonValue::Array(vec![value]);
    }
    assert_eq!(JsonValue::from_bytes(&value.to_bytes()).unwrap_err(), Error::TooDeep);
}
