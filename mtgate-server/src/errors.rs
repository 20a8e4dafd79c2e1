//! Error type for the server shell.

use std::{fmt, io};

use mtgate_crypto::rsa::RsaError;

/// Everything that can stop the server or fail a store round trip.
///
/// Protocol failures inside a connection are logged and swallowed; they
/// never reach the client and never surface as a `ServerError`.
#[derive(Debug)]
pub enum ServerError {
    /// Socket or file system failure.
    Io(io::Error),
    /// The RSA key file could not be parsed.
    Key(RsaError),
    /// An environment variable held an unusable value.
    Config { var: &'static str, value: String },
    /// A store call did not finish in time.
    StoreTimeout(&'static str),
    /// A feature needed by the configuration was not compiled in.
    Unsupported(&'static str),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e)                 => write!(f, "I/O error: {e}"),
            Self::Key(e)                => write!(f, "server key: {e}"),
            Self::Config { var, value } => write!(f, "invalid {var}={value:?}"),
            Self::StoreTimeout(op)      => write!(f, "store {op} timed out"),
            Self::Unsupported(what)     => write!(f, "{what} support is not compiled in"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Key(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ServerError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}

impl From<RsaError> for ServerError {
    fn from(e: RsaError) -> Self { Self::Key(e) }
}
