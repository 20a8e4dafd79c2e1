//! `mtgate`: MTProto server with no RPC handlers attached.
//!
//! Configuration comes from `MTGATE_*` environment variables; see
//! [`mtgate_server::Config`]. Logging follows `RUST_LOG`, or `DEBUG_LVL`
//! (0 to 3) when that is unset.

use mtgate_mtproto::ServerKey;
use mtgate_server::config::default_log_filter;
use mtgate_server::{Config, Server, ServerError, UnimplementedDispatcher, open_stores};

#[tokio::main]
async fn main() {
    let filter = default_log_filter(std::env::var("DEBUG_LVL").ok().as_deref());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    if let Err(e) = run().await {
        eprintln!("mtgate: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    let pem = std::fs::read_to_string(&config.rsa_key_path)
        .map_err(|e| format!("{}: {e}", config.rsa_key_path.display()))?;
    let key = ServerKey::from_pem(&pem).map_err(ServerError::from)?;
    let stores = open_stores(&config)?;

    let server = Server::bind(&config, key, stores, UnimplementedDispatcher).await?;
    tokio::select! {
        result = server.run() => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            log::info!("[mtgate] interrupted, shutting down");
        }
    }
    Ok(())
}
