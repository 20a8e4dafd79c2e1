//! End-to-end probe for a running `mtgate` server.
//!
//! # What this does
//!
//! 1. TCP connect and send an obfuscated transport header
//! 2. Run the three handshake steps and derive an `AuthKey`
//! 3. Send an encrypted `ping` and wait for the `pong`
//! 4. Send a query wrapped in `invokeWithLayer(initConnection(..))` and
//!    print how the server answered it
//!
//! # Run
//! ```text
//! MTGATE_PROBE_ADDR=127.0.0.1:10443 MTGATE_RSA_KEY=server_pkcs1.key cargo run -p mtgate-probe
//! ```
//!
//! The probe reads the server's key file only for its public half.
//! `MTGATE_PROBE_FRAMING` picks `abridged`, `intermediate` or `padded`.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use mtgate_crypto::rsa::PrivateKey;
use mtgate_mtproto::client::{self, ClientMessageIds, ClientSession};
use mtgate_mtproto::obfuscated::{Framing, HEADER_LEN, ObfuscatedCodec};
use mtgate_mtproto::plain::{PlainMessage, plain_message};
use mtgate_tl::{Blob, Deserializable, Identifiable, Serializable, enums, functions, types};

/// `help.getConfig`, which the bare server does not implement.
const HELP_GET_CONFIG: u32 = 0xc4f9186b;

const LAYER: i32 = 181;

// ─── Obfuscated TCP link ──────────────────────────────────────────────────────

struct Link {
    stream: TcpStream,
    codec: ObfuscatedCodec,
    inbox: Vec<u8>,
}

impl Link {
    fn connect(addr: &str, framing: Framing) -> Result<Self, Box<dyn std::error::Error>> {
        let mut stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(Duration::from_secs(15)))?;
        stream.set_write_timeout(Some(Duration::from_secs(15)))?;

        let mut random = [0u8; HEADER_LEN];
        mtgate_crypto::fill_random(&mut random)?;
        let (header, codec) = ObfuscatedCodec::client(random, framing);
        stream.write_all(&header)?;
        Ok(Self { stream, codec, inbox: Vec::new() })
    }

    fn send(&mut self, payload: &[u8]) -> std::io::Result<()> {
        let frame = self.codec.frame_outgoing(payload);
        self.stream.write_all(&frame)
    }

    fn recv(&mut self) -> std::io::Result<Vec<u8>> {
        let mut buf = [0u8; 16 * 1024];
        loop {
            if let Some((range, used)) = self.codec.framing().decode(&self.inbox) {
                let payload = self.inbox[range].to_vec();
                self.inbox.drain(..used);
                return Ok(payload);
            }
            let n = self.stream.read(&mut buf)?;
            if n == 0 {
                return Err(std::io::ErrorKind::UnexpectedEof.into());
            }
            let chunk = &mut buf[..n];
            self.codec.decrypt(chunk);
            self.inbox.extend_from_slice(chunk);
        }
    }
}

// ─── Plaintext helpers ────────────────────────────────────────────────────────

fn send_plain<T: Serializable>(link: &mut Link, ids: &mut ClientMessageIds, call: &T) -> std::io::Result<()> {
    link.send(&plain_message(ids.next(), &call.to_bytes()))
}

fn recv_plain<T: Deserializable>(link: &mut Link) -> Result<T, Box<dyn std::error::Error>> {
    let raw = link.recv()?;
    let (msg, _) = PlainMessage::parse(&raw).ok_or("not a plaintext message")?;
    Ok(T::from_bytes(msg.body)?)
}

fn parse_framing(value: Option<&str>) -> Result<Framing, String> {
    match value.unwrap_or("intermediate") {
        "abridged" => Ok(Framing::Abridged),
        "intermediate" => Ok(Framing::Intermediate),
        "padded" => Ok(Framing::PaddedIntermediate),
        other => Err(format!("unknown framing {other:?}")),
    }
}

/// Human-readable summary of one server message.
fn describe(body: &[u8]) -> String {
    let Some(id) = body.get(..4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]])) else {
        return "empty body".into();
    };
    match id {
        types::Pong::CONSTRUCTOR_ID => match types::Pong::from_bytes(&body[4..]) {
            Ok(p) => format!("pong ping_id={}", p.ping_id),
            Err(e) => format!("bad pong: {e}"),
        },
        types::NewSessionCreated::CONSTRUCTOR_ID => match types::NewSessionCreated::from_bytes(&body[4..]) {
            Ok(n) => format!("new_session_created first_msg_id={} server_salt={}", n.first_msg_id, n.server_salt),
            Err(e) => format!("bad new_session_created: {e}"),
        },
        types::RpcResult::CONSTRUCTOR_ID if body.len() >= 16 => {
            let inner = &body[12..];
            if inner.get(..4) == Some(&types::RpcError::CONSTRUCTOR_ID.to_le_bytes()[..]) {
                match types::RpcError::from_bytes(&inner[4..]) {
                    Ok(e) => format!("rpc_error {} {}", e.error_code, e.error_message),
                    Err(e) => format!("bad rpc_error: {e}"),
                }
            } else {
                format!("rpc_result ({} bytes)", inner.len())
            }
        }
        other => format!("constructor {other:#010x} ({} bytes)", body.len()),
    }
}

// ─── Main ─────────────────────────────────────────────────────────────────────

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        eprintln!("\n✗ {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::var("MTGATE_PROBE_ADDR").unwrap_or_else(|_| "127.0.0.1:10443".into());
    let key_path = std::env::var("MTGATE_RSA_KEY").unwrap_or_else(|_| "server_pkcs1.key".into());
    let framing = parse_framing(std::env::var("MTGATE_PROBE_FRAMING").ok().as_deref())?;

    let server_key = PrivateKey::from_pem(&std::fs::read_to_string(&key_path)?)?;
    let public = server_key.public();
    println!("Server key fingerprint {}", public.fingerprint());

    // ── 1. Connect ────────────────────────────────────────────────────────────
    println!("Connecting to {addr} ({framing:?}) …");
    let mut link = Link::connect(&addr, framing)?;
    let mut ids = ClientMessageIds::default();
    println!("✓ TCP connected");

    // ── 2. Handshake ──────────────────────────────────────────────────────────
    let (req1, state1) = client::step1()?;
    println!("\n[Step 1] req_pq_multi");
    send_plain(&mut link, &mut ids, &req1)?;
    let res_pq: enums::ResPq = recv_plain(&mut link)?;
    let enums::ResPq::ResPq(pq) = &res_pq;
    println!("  ✓ resPQ pq={:02x?} fingerprints={:?}", pq.pq, pq.server_public_key_fingerprints);

    let (req2, state2) = client::step2(state1, res_pq, public)?;
    println!("[Step 2] req_DH_params");
    send_plain(&mut link, &mut ids, &req2)?;
    let server_dh: enums::ServerDhParams = recv_plain(&mut link)?;

    let (req3, state3) = client::step3(state2, server_dh)?;
    println!("[Step 3] set_client_DH_params");
    send_plain(&mut link, &mut ids, &req3)?;
    let answer: enums::SetClientDhParamsAnswer = recv_plain(&mut link)?;

    let done = client::finish(state3, answer)?;
    println!("\n✓ Auth key {} derived", done.auth_key.id());
    println!("  time_offset = {}s", done.time_offset);
    println!("  first_salt  = {}", done.first_salt);

    // ── 3. Encrypted ping ─────────────────────────────────────────────────────
    let mut session_id = [0u8; 8];
    mtgate_crypto::fill_random(&mut session_id)?;
    let mut session = ClientSession::new(done.auth_key, done.first_salt, i64::from_le_bytes(session_id));

    println!("\n[Encrypted] ping");
    let (frame, _) = session.pack(&functions::Ping { ping_id: 0x6d74_6761_7465 })?;
    link.send(&frame)?;
    let mut raw = link.recv()?;
    let msg = session.unpack(&mut raw)?;
    println!("  ✓ {}", describe(&msg.body));

    // ── 4. A wrapped query ────────────────────────────────────────────────────
    println!("[Encrypted] invokeWithLayer({LAYER}, initConnection(help.getConfig))");
    let init = functions::InitConnection {
        api_id: 0,
        device_model: "mtgate-probe".into(),
        system_version: std::env::consts::OS.into(),
        app_version: env!("CARGO_PKG_VERSION").into(),
        system_lang_code: "en".into(),
        lang_pack: String::new(),
        lang_code: "en".into(),
        proxy: None,
        params: None,
        query: Blob(HELP_GET_CONFIG.to_le_bytes().to_vec()),
    };
    let call = functions::InvokeWithLayer { layer: LAYER, query: Blob(init.to_bytes()) };
    let (frame, _) = session.pack(&call)?;
    link.send(&frame)?;
    for _ in 0..2 {
        let mut raw = link.recv()?;
        let msg = session.unpack(&mut raw)?;
        println!("  ✓ {}", describe(&msg.body));
    }

    println!("\n✓ Probe complete");
    Ok(())
}

// ─── Unit tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mtgate_tl::boxed;

    #[test]
    fn framing_names() {
        assert_eq!(parse_framing(None).unwrap(), Framing::Intermediate);
        assert_eq!(parse_framing(Some("abridged")).unwrap(), Framing::Abridged);
        assert_eq!(parse_framing(Some("padded")).unwrap(), Framing::PaddedIntermediate);
        assert!(parse_framing(Some("http")).is_err());
    }

    #[test]
    fn describes_rpc_errors() {
        let error = boxed(&types::RpcError { error_code: 400, error_message: "METHOD_NOT_IMPLEMENTED".into() });
        let result = boxed(&types::RpcResult { req_msg_id: 4, result: Blob(error) });
        assert_eq!(describe(&result), "rpc_error 400 METHOD_NOT_IMPLEMENTED");
    }

    #[test]
    fn describes_pong() {
        assert_eq!(describe(&boxed(&types::Pong { msg_id: 8, ping_id: 3 })), "pong ping_id=3");
        assert_eq!(describe(&[]), "empty body");
    }
}
