//! Process configuration read from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use mtgate_mtproto::Limits;

use crate::errors::ServerError;

/// Runtime settings for [`crate::Server`].
#[derive(Clone, Debug)]
pub struct Config {
    /// Address to accept connections on.
    pub listen: SocketAddr,
    /// PKCS#1 PEM file holding the server's RSA private key.
    pub rsa_key_path: PathBuf,
    /// Directory for the file store. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// SQLite database for the `sqlite-store` feature.
    pub sqlite_path: Option<PathBuf>,
    /// Concurrent connections accepted; `None` for no limit.
    pub max_connections: Option<usize>,
    /// Deadline for one store round trip.
    pub store_timeout: Duration,
    /// Undecoded bytes buffered per connection before they are discarded.
    pub max_pending: usize,
    /// Work bounds for locating encrypted messages.
    pub limits: Limits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 10443)),
            rsa_key_path: PathBuf::from("server_pkcs1.key"),
            data_dir: None,
            sqlite_path: None,
            max_connections: None,
            store_timeout: Duration::from_millis(5000),
            max_pending: 4 << 20,
            limits: Limits::default(),
        }
    }
}

impl Config {
    /// Defaults overridden by `MTGATE_*` variables.
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServerError> {
        let mut cfg = Self::default();
        if let Some(v) = lookup("MTGATE_LISTEN") {
            cfg.listen = parse("MTGATE_LISTEN", v)?;
        }
        if let Some(v) = lookup("MTGATE_RSA_KEY") {
            cfg.rsa_key_path = PathBuf::from(v);
        }
        cfg.data_dir = lookup("MTGATE_DATA_DIR").filter(|v| !v.is_empty()).map(PathBuf::from);
        cfg.sqlite_path = lookup("MTGATE_SQLITE").filter(|v| !v.is_empty()).map(PathBuf::from);
        if let Some(v) = lookup("MTGATE_MAX_CONNECTIONS") {
            let n: usize = parse("MTGATE_MAX_CONNECTIONS", v)?;
            cfg.max_connections = (n > 0).then_some(n);
        }
        if let Some(v) = lookup("MTGATE_STORE_TIMEOUT_MS") {
            cfg.store_timeout = Duration::from_millis(parse("MTGATE_STORE_TIMEOUT_MS", v)?);
        }
        if let Some(v) = lookup("MTGATE_MAX_PENDING") {
            cfg.max_pending = parse("MTGATE_MAX_PENDING", v)?;
        }
        Ok(cfg)
    }
}

fn parse<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ServerError> {
    value.trim().parse().map_err(|_| ServerError::Config { var, value })
}

/// Default log filter for the binaries when `RUST_LOG` is unset:
/// `DEBUG_LVL` 0 → warn, 1 → info, 2 → debug, 3+ → trace.
pub fn default_log_filter(debug_lvl: Option<&str>) -> &'static str {
    match debug_lvl.and_then(|v| v.trim().parse::<u8>().ok()).unwrap_or(0) {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_without_variables() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.listen.port(), 10443);
        assert_eq!(cfg.store_timeout, Duration::from_secs(5));
        assert_eq!(cfg.max_pending, 4 << 20);
        assert!(cfg.data_dir.is_none());
    }

    #[test]
    fn variables_override_defaults() {
        let cfg = Config::from_lookup(lookup(&[
            ("MTGATE_LISTEN", "127.0.0.1:9000"),
            ("MTGATE_MAX_CONNECTIONS", "16"),
            ("MTGATE_DATA_DIR", "/tmp/mtgate"),
            ("MTGATE_STORE_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(cfg.listen, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(cfg.max_connections, Some(16));
        assert_eq!(cfg.data_dir, Some(PathBuf::from("/tmp/mtgate")));
        assert_eq!(cfg.store_timeout, Duration::from_millis(250));
    }

    #[test]
    fn bad_value_names_the_variable() {
        let err = Config::from_lookup(lookup(&[("MTGATE_MAX_PENDING", "lots")])).unwrap_err();
        assert!(err.to_string().contains("MTGATE_MAX_PENDING"));
    }

    #[test]
    fn debug_level_maps_to_filter() {
        assert_eq!(default_log_filter(None), "warn");
        assert_eq!(default_log_filter(Some("1")), "info");
        assert_eq!(default_log_filter(Some("2")), "debug");
        assert_eq!(default_log_filter(Some("7")), "trace");
    }
}
