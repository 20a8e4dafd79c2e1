//! Pluggable persistence for auth keys and sessions.
//!
//! Both stores are plain synchronous traits so that a backend can be a
//! file, a database or a map. The connection driver reaches them through
//! [`Stores`], which runs each call on the blocking pool under a deadline.
//!
//! Built-in backends:
//! * [`InMemoryStore`]: nothing survives a restart.
//! * [`FileStore`]: one small binary file per key and per session.
//! * [`SqliteStore`]: SQLite (requires the `sqlite-store` Cargo feature).

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use mtgate_crypto::AuthKey;
use mtgate_mtproto::{Finished, KeyKind};
use tokio::sync::mpsc;

use crate::errors::ServerError;

// ─── Records ──────────────────────────────────────────────────────────────────

/// An auth key as kept by the server.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredAuthKey {
    pub key: AuthKey,
    pub kind: KeyKind,
    /// Unix time after which a temporary key is no longer accepted.
    pub expires_at: Option<i64>,
}

impl StoredAuthKey {
    pub fn permanent(key: AuthKey) -> Self {
        Self { key, kind: KeyKind::Permanent, expires_at: None }
    }

    /// The record for a freshly negotiated key.
    pub fn from_finished(finished: &Finished, now: i64) -> Self {
        Self {
            key: finished.auth_key.clone(),
            kind: finished.kind,
            expires_at: finished.expires_in.map(|secs| now + i64::from(secs)),
        }
    }

    pub fn id(&self) -> i64 { self.key.id() }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// The last known state of a client session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    pub session_id: i64,
    pub auth_key_id: i64,
    pub salt: i64,
    /// Set once the dispatcher binds the key to an account.
    pub user_id: Option<i64>,
    pub last_used: i64,
}

impl SessionRecord {
    /// Combine with the stored record: a missing `user_id` never erases
    /// one that is already known.
    fn merged_with(&self, existing: Option<&SessionRecord>) -> SessionRecord {
        let mut merged = self.clone();
        if merged.user_id.is_none() {
            merged.user_id = existing.and_then(|e| e.user_id);
        }
        merged
    }
}

/// The little-endian id in an 8-byte window.
fn window_id(window: &[u8]) -> i64 {
    let mut id = [0u8; 8];
    id.copy_from_slice(&window[..8]);
    i64::from_le_bytes(id)
}

pub fn unix_now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

// ─── Traits ───────────────────────────────────────────────────────────────────

/// Where negotiated auth keys live.
pub trait AuthKeyStore: Send + Sync {
    /// Persist `key`, replacing any record with the same id.
    fn save(&self, key: &StoredAuthKey) -> io::Result<()>;

    fn load_by_id(&self, id: i64) -> io::Result<Option<StoredAuthKey>>;

    /// Find the first 8-byte window of `buf` naming a stored, unexpired key.
    ///
    /// Returns the key and the window offset. Zero windows are skipped since
    /// that id marks plaintext messages.
    fn find_in_buffer(&self, buf: &[u8], now: i64) -> io::Result<Option<(StoredAuthKey, usize)>> {
        for (offset, window) in buf.windows(8).enumerate() {
            let id = window_id(window);
            if id == 0 {
                continue;
            }
            if let Some(key) = self.load_by_id(id)? {
                if key.is_expired(now) {
                    log::debug!("[mtgate] key {id} at offset {offset} has expired");
                    continue;
                }
                return Ok(Some((key, offset)));
            }
        }
        Ok(None)
    }

    fn delete(&self, id: i64) -> io::Result<()>;

    /// Human-readable backend name for log messages.
    fn name(&self) -> &str;
}

/// Where session records live, one per auth key.
pub trait SessionStore: Send + Sync {
    /// Insert or replace the record for `record.auth_key_id`.
    fn upsert(&self, record: &SessionRecord) -> io::Result<()>;

    fn find_by_auth_key_id(&self, auth_key_id: i64) -> io::Result<Option<SessionRecord>>;

    fn name(&self) -> &str;
}

// ─── InMemoryStore ────────────────────────────────────────────────────────────

/// Keeps everything in process memory.
#[derive(Default)]
pub struct InMemoryStore {
    keys: Mutex<HashMap<i64, StoredAuthKey>>,
    sessions: Mutex<HashMap<i64, SessionRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self { Self::default() }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> io::Error {
    io::Error::other("store lock poisoned")
}

impl AuthKeyStore for InMemoryStore {
    fn save(&self, key: &StoredAuthKey) -> io::Result<()> {
        self.keys.lock().map_err(poisoned)?.insert(key.id(), key.clone());
        Ok(())
    }

    fn load_by_id(&self, id: i64) -> io::Result<Option<StoredAuthKey>> {
        Ok(self.keys.lock().map_err(poisoned)?.get(&id).cloned())
    }

    fn delete(&self, id: i64) -> io::Result<()> {
        self.keys.lock().map_err(poisoned)?.remove(&id);
        Ok(())
    }

    fn name(&self) -> &str { "in-memory" }
}

impl SessionStore for InMemoryStore {
    fn upsert(&self, record: &SessionRecord) -> io::Result<()> {
        let mut sessions = self.sessions.lock().map_err(poisoned)?;
        let merged = record.merged_with(sessions.get(&record.auth_key_id));
        sessions.insert(record.auth_key_id, merged);
        Ok(())
    }

    fn find_by_auth_key_id(&self, auth_key_id: i64) -> io::Result<Option<SessionRecord>> {
        Ok(self.sessions.lock().map_err(poisoned)?.get(&auth_key_id).cloned())
    }

    fn name(&self) -> &str { "in-memory" }
}

// ─── FileStore ────────────────────────────────────────────────────────────────

/// Stores each record as a compact binary file under a data directory:
/// `keys/<id>.key` and `sessions/<auth_key_id>.session`.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open `root`, creating the directory layout if needed.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join("keys"))?;
        std::fs::create_dir_all(root.join("sessions"))?;
        Ok(Self { root })
    }

    fn key_path(&self, id: i64) -> PathBuf {
        self.root.join("keys").join(format!("{:016x}.key", id as u64))
    }

    fn session_path(&self, auth_key_id: i64) -> PathBuf {
        self.root.join("sessions").join(format!("{:016x}.session", auth_key_id as u64))
    }
}

fn truncated(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("truncated {what}"))
}

fn read_optional(path: &std::path::Path) -> io::Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(buf) => Ok(Some(buf)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn encode_key(key: &StoredAuthKey) -> Vec<u8> {
    let mut b = Vec::with_capacity(2 + 8 + 256);
    b.push(key.kind.as_u8());
    match key.expires_at {
        Some(at) => { b.push(1); b.extend_from_slice(&at.to_le_bytes()); }
        None     => { b.push(0); b.extend_from_slice(&0i64.to_le_bytes()); }
    }
    b.extend_from_slice(&key.key.to_bytes());
    b
}

fn decode_key(buf: &[u8]) -> io::Result<StoredAuthKey> {
    let mut p = 0;
    macro_rules! r {
        ($n:literal) => {{
            if p + $n > buf.len() {
                return Err(truncated("auth key"));
            }
            let mut out = [0u8; $n];
            out.copy_from_slice(&buf[p..p + $n]);
            p += $n;
            out
        }};
    }
    let kind = KeyKind::from_u8(r!(1)[0])
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unknown key kind"))?;
    let has_expiry = r!(1)[0] == 1;
    let expires_at = i64::from_le_bytes(r!(8));
    let key = AuthKey::from_bytes(r!(256));
    Ok(StoredAuthKey { key, kind, expires_at: has_expiry.then_some(expires_at) })
}

fn encode_session(record: &SessionRecord) -> Vec<u8> {
    let mut b = Vec::with_capacity(8 * 5 + 1);
    b.extend_from_slice(&record.session_id.to_le_bytes());
    b.extend_from_slice(&record.auth_key_id.to_le_bytes());
    b.extend_from_slice(&record.salt.to_le_bytes());
    b.push(record.user_id.is_some() as u8);
    b.extend_from_slice(&record.user_id.unwrap_or(0).to_le_bytes());
    b.extend_from_slice(&record.last_used.to_le_bytes());
    b
}

fn decode_session(buf: &[u8]) -> io::Result<SessionRecord> {
    let mut p = 0;
    macro_rules! r {
        ($n:literal) => {{
            if p + $n > buf.len() {
                return Err(truncated("session"));
            }
            let mut out = [0u8; $n];
            out.copy_from_slice(&buf[p..p + $n]);
            p += $n;
            out
        }};
    }
    let session_id = i64::from_le_bytes(r!(8));
    let auth_key_id = i64::from_le_bytes(r!(8));
    let salt = i64::from_le_bytes(r!(8));
    let has_user = r!(1)[0] == 1;
    let user_id = i64::from_le_bytes(r!(8));
    let last_used = i64::from_le_bytes(r!(8));
    Ok(SessionRecord { session_id, auth_key_id, salt, user_id: has_user.then_some(user_id), last_used })
}

impl AuthKeyStore for FileStore {
    fn save(&self, key: &StoredAuthKey) -> io::Result<()> {
        std::fs::write(self.key_path(key.id()), encode_key(key))
    }

    fn load_by_id(&self, id: i64) -> io::Result<Option<StoredAuthKey>> {
        let Some(buf) = read_optional(&self.key_path(id))? else { return Ok(None) };
        let key = decode_key(&buf)?;
        if key.id() != id {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "key file does not match its id"));
        }
        Ok(Some(key))
    }

    fn delete(&self, id: i64) -> io::Result<()> {
        match std::fs::remove_file(self.key_path(id)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str { "file" }
}

impl SessionStore for FileStore {
    fn upsert(&self, record: &SessionRecord) -> io::Result<()> {
        let path = self.session_path(record.auth_key_id);
        let existing = match read_optional(&path)? {
            Some(buf) => decode_session(&buf).ok(),
            None => None,
        };
        std::fs::write(path, encode_session(&record.merged_with(existing.as_ref())))
    }

    fn find_by_auth_key_id(&self, auth_key_id: i64) -> io::Result<Option<SessionRecord>> {
        read_optional(&self.session_path(auth_key_id))?.map(|buf| decode_session(&buf)).transpose()
    }

    fn name(&self) -> &str { "file" }
}

// ─── SqliteStore ──────────────────────────────────────────────────────────────

#[cfg(feature = "sqlite-store")]
pub use sqlite_store::SqliteStore;

#[cfg(feature = "sqlite-store")]
mod sqlite_store {
    use super::*;
    use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

    /// Below SQLite's default bound-parameter limit.
    const MAX_QUERY_IDS: usize = 500;

    fn sql(e: rusqlite::Error) -> io::Error { io::Error::other(e) }

    fn stored_key(bytes: &[u8], kind: u8, expires_at: Option<i64>) -> io::Result<StoredAuthKey> {
        let key = AuthKey::from_slice(bytes)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "auth key is not 256 bytes"))?;
        let kind = KeyKind::from_u8(kind)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unknown key kind"))?;
        Ok(StoredAuthKey { key, kind, expires_at })
    }

    /// SQLite-backed key and session store.
    ///
    /// Creates the `auth_keys` and `sessions` tables if they do not exist.
    pub struct SqliteStore {
        path: PathBuf,
    }

    impl SqliteStore {
        pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
            let path = path.into();
            let conn = Connection::open(&path).map_err(sql)?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS auth_keys (
                    id         INTEGER PRIMARY KEY,
                    key        BLOB    NOT NULL,
                    kind       INTEGER NOT NULL,
                    expires_at INTEGER
                );
                CREATE TABLE IF NOT EXISTS sessions (
                    auth_key_id INTEGER PRIMARY KEY,
                    session_id  INTEGER NOT NULL,
                    salt        INTEGER NOT NULL,
                    user_id     INTEGER,
                    last_used   INTEGER NOT NULL
                );",
            ).map_err(sql)?;
            Ok(Self { path })
        }

        fn open(&self) -> io::Result<Connection> {
            Connection::open(&self.path).map_err(sql)
        }
    }

    impl AuthKeyStore for SqliteStore {
        fn save(&self, key: &StoredAuthKey) -> io::Result<()> {
            self.open()?.execute(
                "INSERT OR REPLACE INTO auth_keys (id, key, kind, expires_at) VALUES (?1, ?2, ?3, ?4)",
                params![key.id(), key.key.to_bytes().to_vec(), key.kind.as_u8(), key.expires_at],
            ).map_err(sql)?;
            Ok(())
        }

        fn load_by_id(&self, id: i64) -> io::Result<Option<StoredAuthKey>> {
            let row = self.open()?.query_row(
                "SELECT key, kind, expires_at FROM auth_keys WHERE id = ?1",
                params![id],
                |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, u8>(1)?, row.get::<_, Option<i64>>(2)?)),
            ).optional().map_err(sql)?;
            row.map(|(bytes, kind, expires_at)| stored_key(&bytes, kind, expires_at)).transpose()
        }

        /// All candidate ids are resolved with `IN (...)` queries over one
        /// connection instead of one lookup per offset.
        fn find_in_buffer(&self, buf: &[u8], now: i64) -> io::Result<Option<(StoredAuthKey, usize)>> {
            let mut ids: Vec<i64> = buf.windows(8).map(window_id).filter(|&id| id != 0).collect();
            ids.sort_unstable();
            ids.dedup();
            if ids.is_empty() {
                return Ok(None);
            }

            let conn = self.open()?;
            let mut known = HashMap::new();
            for chunk in ids.chunks(MAX_QUERY_IDS) {
                let marks = vec!["?"; chunk.len()].join(", ");
                let mut stmt = conn
                    .prepare(&format!("SELECT id, key, kind, expires_at FROM auth_keys WHERE id IN ({marks})"))
                    .map_err(sql)?;
                let rows = stmt
                    .query_map(params_from_iter(chunk.iter()), |row| {
                        Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?, row.get::<_, u8>(2)?, row.get::<_, Option<i64>>(3)?))
                    })
                    .map_err(sql)?;
                for row in rows {
                    let (id, bytes, kind, expires_at) = row.map_err(sql)?;
                    known.insert(id, stored_key(&bytes, kind, expires_at)?);
                }
            }

            for (offset, window) in buf.windows(8).enumerate() {
                match known.get(&window_id(window)) {
                    Some(key) if !key.is_expired(now) => return Ok(Some((key.clone(), offset))),
                    _ => {}
                }
            }
            Ok(None)
        }

        fn delete(&self, id: i64) -> io::Result<()> {
            self.open()?.execute("DELETE FROM auth_keys WHERE id = ?1", params![id]).map_err(sql)?;
            Ok(())
        }

        fn name(&self) -> &str { "sqlite" }
    }

    impl SessionStore for SqliteStore {
        fn upsert(&self, record: &SessionRecord) -> io::Result<()> {
            self.open()?.execute(
                "INSERT INTO sessions (auth_key_id, session_id, salt, user_id, last_used)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(auth_key_id) DO UPDATE SET
                    session_id = excluded.session_id,
                    salt       = excluded.salt,
                    user_id    = COALESCE(excluded.user_id, sessions.user_id),
                    last_used  = excluded.last_used",
                params![record.auth_key_id, record.session_id, record.salt, record.user_id, record.last_used],
            ).map_err(sql)?;
            Ok(())
        }

        fn find_by_auth_key_id(&self, auth_key_id: i64) -> io::Result<Option<SessionRecord>> {
            self.open()?.query_row(
                "SELECT session_id, salt, user_id, last_used FROM sessions WHERE auth_key_id = ?1",
                params![auth_key_id],
                |row| Ok(SessionRecord {
                    session_id: row.get(0)?,
                    auth_key_id,
                    salt: row.get(1)?,
                    user_id: row.get(2)?,
                    last_used: row.get(3)?,
                }),
            ).optional().map_err(sql)
        }

        fn name(&self) -> &str { "sqlite" }
    }
}

// ─── Async access ─────────────────────────────────────────────────────────────

/// Session records waiting for the writer before [`Stores::queue_session`]
/// has to wait.
const SESSION_QUEUE: usize = 1024;

/// The stores a server runs with, reachable from async code.
///
/// Every call runs on tokio's blocking pool and fails with
/// [`ServerError::StoreTimeout`] when it takes longer than the deadline.
#[derive(Clone)]
pub struct Stores {
    auth_keys: Arc<dyn AuthKeyStore>,
    sessions: Arc<dyn SessionStore>,
    timeout: Duration,
    /// Started by the first [`Stores::queue_session`].
    session_writer: Arc<OnceLock<mpsc::Sender<SessionRecord>>>,
}

impl Stores {
    pub fn new(auth_keys: Arc<dyn AuthKeyStore>, sessions: Arc<dyn SessionStore>, timeout: Duration) -> Self {
        Self { auth_keys, sessions, timeout, session_writer: Arc::new(OnceLock::new()) }
    }

    /// One backend serving both roles.
    pub fn shared<S: AuthKeyStore + SessionStore + 'static>(store: S, timeout: Duration) -> Self {
        let store = Arc::new(store);
        Self::new(store.clone(), store, timeout)
    }

    pub fn in_memory(timeout: Duration) -> Self {
        Self::shared(InMemoryStore::new(), timeout)
    }

    pub fn auth_keys(&self) -> &Arc<dyn AuthKeyStore> { &self.auth_keys }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> { &self.sessions }

    pub async fn save_key(&self, key: StoredAuthKey) -> Result<(), ServerError> {
        let store = self.auth_keys.clone();
        blocking(self.timeout, "save_key", move || store.save(&key)).await
    }

    pub async fn load_key(&self, id: i64) -> Result<Option<StoredAuthKey>, ServerError> {
        let store = self.auth_keys.clone();
        blocking(self.timeout, "load_key", move || store.load_by_id(id)).await
    }

    pub async fn find_key_in_buffer(&self, buf: Vec<u8>, now: i64) -> Result<Option<(StoredAuthKey, usize)>, ServerError> {
        let store = self.auth_keys.clone();
        blocking(self.timeout, "find_key", move || store.find_in_buffer(&buf, now)).await
    }

    pub async fn find_session(&self, auth_key_id: i64) -> Result<Option<SessionRecord>, ServerError> {
        let store = self.sessions.clone();
        blocking(self.timeout, "find_session", move || store.find_by_auth_key_id(auth_key_id)).await
    }

    pub async fn upsert_session(&self, record: SessionRecord) -> Result<(), ServerError> {
        let store = self.sessions.clone();
        blocking(self.timeout, "upsert_session", move || store.upsert(&record)).await
    }

    /// Hand `record` to the background session writer. Waits only while the
    /// writer's queue is full; write failures are logged by the writer.
    pub async fn queue_session(&self, record: SessionRecord) {
        let sender = self
            .session_writer
            .get_or_init(|| SessionWriter::spawn(self.sessions.clone(), self.timeout))
            .clone();
        if sender.send(record).await.is_err() {
            log::warn!("[mtgate] session writer stopped, record dropped");
        }
    }
}

async fn blocking<T, F>(timeout: Duration, op: &'static str, f: F) -> Result<T, ServerError>
where
    T: Send + 'static,
    F: FnOnce() -> io::Result<T> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Err(_) => Err(ServerError::StoreTimeout(op)),
        Ok(Err(join)) => Err(ServerError::Io(io::Error::other(join))),
        Ok(Ok(result)) => result.map_err(ServerError::Io),
    }
}

/// Writes queued session records, one upsert per auth key for everything
/// that queued up while the previous batch was being written.
struct SessionWriter {
    receiver: mpsc::Receiver<SessionRecord>,
    store: Arc<dyn SessionStore>,
    timeout: Duration,
}

impl SessionWriter {
    fn spawn(store: Arc<dyn SessionStore>, timeout: Duration) -> mpsc::Sender<SessionRecord> {
        let (sender, receiver) = mpsc::channel(SESSION_QUEUE);
        log::debug!("[mtgate] session writer started ({})", store.name());
        tokio::spawn(Self { receiver, store, timeout }.run());
        sender
    }

    /// Runs until every [`Stores`] clone is gone and the queue is drained.
    async fn run(mut self) {
        let mut batch: HashMap<i64, SessionRecord> = HashMap::new();
        while let Some(record) = self.receiver.recv().await {
            coalesce(&mut batch, record);
            while let Ok(record) = self.receiver.try_recv() {
                coalesce(&mut batch, record);
            }
            for (auth_key_id, record) in batch.drain() {
                let store = self.store.clone();
                if let Err(e) = blocking(self.timeout, "upsert_session", move || store.upsert(&record)).await {
                    log::warn!("[mtgate] session for key {auth_key_id} not saved ({}): {e}", self.store.name());
                }
            }
        }
        log::debug!("[mtgate] session writer stopped");
    }
}

fn coalesce(batch: &mut HashMap<i64, SessionRecord>, record: SessionRecord) {
    let merged = record.merged_with(batch.get(&record.auth_key_id));
    batch.insert(record.auth_key_id, merged);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(seed: u8) -> AuthKey {
        let mut data = [0u8; 256];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(31).wrapping_add(seed);
        }
        AuthKey::from_bytes(data)
    }

    #[test]
    fn key_record_round_trips_through_bytes() {
        let stored = StoredAuthKey { key: key(1), kind: KeyKind::Temporary, expires_at: Some(1_700_000_000) };
        assert_eq!(decode_key(&encode_key(&stored)).unwrap(), stored);
    }

    #[test]
    fn truncated_session_is_rejected() {
        let record = SessionRecord { session_id: 1, auth_key_id: 2, salt: 3, user_id: None, last_used: 4 };
        let bytes = encode_session(&record);
        let err = decode_session(&bytes[..bytes.len() - 1]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn expiry_is_inclusive() {
        let stored = StoredAuthKey { key: key(2), kind: KeyKind::Temporary, expires_at: Some(100) };
        assert!(!stored.is_expired(99));
        assert!(stored.is_expired(100));
        assert!(!StoredAuthKey::permanent(key(3)).is_expired(i64::MAX));
    }

    #[test]
    fn coalescing_keeps_the_newest_record_and_a_known_user() {
        let mut batch = HashMap::new();
        coalesce(&mut batch, SessionRecord { session_id: 1, auth_key_id: 9, salt: 1, user_id: Some(5), last_used: 10 });
        coalesce(&mut batch, SessionRecord { session_id: 2, auth_key_id: 9, salt: 2, user_id: None, last_used: 11 });
        coalesce(&mut batch, SessionRecord { session_id: 3, auth_key_id: 8, salt: 3, user_id: None, last_used: 12 });
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[&9], SessionRecord { session_id: 2, auth_key_id: 9, salt: 2, user_id: Some(5), last_used: 11 });
    }

    #[test]
    fn scan_skips_zero_windows() {
        let store = InMemoryStore::new();
        let stored = StoredAuthKey::permanent(key(4));
        store.save(&stored).unwrap();
        let mut buf = vec![0u8; 12];
        buf.extend_from_slice(&stored.key.key_id());
        let (found, offset) = store.find_in_buffer(&buf, 0).unwrap().unwrap();
        assert_eq!(found.id(), stored.id());
        assert_eq!(offset, 12);
    }
}
