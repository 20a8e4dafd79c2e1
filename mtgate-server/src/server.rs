//! The TCP accept loop.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use mtgate_mtproto::ServerKey;

use crate::config::Config;
use crate::connection::{Connection, ServerState};
use crate::dispatch::Dispatcher;
use crate::errors::ServerError;
use crate::store::Stores;

const READ_BUF: usize = 64 * 1024;

/// A bound listener plus the state its connections share.
pub struct Server<D> {
    listener: TcpListener,
    state: Arc<ServerState<D>>,
    limit: Option<Arc<Semaphore>>,
}

impl<D: Dispatcher> Server<D> {
    pub async fn bind(config: &Config, key: ServerKey, stores: Stores, dispatcher: D) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.listen).await?;
        log::info!(
            "[mtgate] listening on {} (key fingerprint {}, store {})",
            listener.local_addr()?,
            key.fingerprint(),
            stores.auth_keys().name(),
        );
        let mut state = ServerState::new(key, stores, dispatcher);
        state.limits = config.limits;
        state.max_pending = config.max_pending;
        Ok(Self {
            listener,
            state: Arc::new(state),
            limit: config.max_connections.map(|n| Arc::new(Semaphore::new(n))),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> &Arc<ServerState<D>> { &self.state }

    /// Accept connections until the task is dropped.
    pub async fn run(self) -> Result<(), ServerError> {
        let mut next_id: u64 = 0;
        loop {
            let permit = match &self.limit {
                Some(limit) => Some(Arc::clone(limit).acquire_owned().await.map_err(io::Error::other)?),
                None => None,
            };
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    log::warn!("[mtgate] accept failed: {e}");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };
            next_id += 1;
            let id = next_id;
            let conn = Connection::new(id, Arc::clone(&self.state));
            tokio::spawn(async move {
                let _permit = permit;
                log::debug!("[mtgate] conn {id}: accepted from {peer}");
                match serve(stream, conn).await {
                    Ok(()) => log::debug!("[mtgate] conn {id}: closed"),
                    Err(e) => log::debug!("[mtgate] conn {id}: {e}"),
                }
            });
        }
    }
}

/// Pump one socket through `conn` until the peer closes it.
pub async fn serve<D: Dispatcher>(mut stream: TcpStream, mut conn: Connection<D>) -> io::Result<()> {
    let mut buf = vec![0u8; READ_BUF];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        for frame in conn.on_bytes(&buf[..n]).await {
            stream.write_all(&frame).await?;
        }
    }
}
