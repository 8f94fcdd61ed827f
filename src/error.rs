use camino::Utf8PathBuf;

use crate::interpose::Stream;

/// Error types for the geoip-capture library.
///
/// A lookup that finds no data is not an error: `GeoIp::query` returns
/// `Ok(None)` for it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The caller passed an unusable argument (empty path, empty address...).
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The database file could not be opened.
    #[error("{message}")]
    Open { path: Utf8PathBuf, message: String },

    /// The lookup failed for a reason other than missing data.
    #[error("{message}")]
    Query { addr: String, message: String },

    /// A standard stream could not be moved aside onto the capture file.
    #[error("couldn't move aside {stream}")]
    Redirect {
        stream: Stream,
        #[source]
        source: std::io::Error,
    },

    /// The private capture file could not be created, reset or read.
    #[error("capture file error")]
    Capture(#[source] std::io::Error),

    /// The engine was used after `close`.
    #[error("geolocation database already closed")]
    Closed,
}

impl Error {
    pub(crate) fn invalid_argument(reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for Results using the library error.
pub type Result<T> = std::result::Result<T, Error>;
