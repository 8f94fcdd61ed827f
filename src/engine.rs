//! The lookup engine: one open database plus its private capture file.

use std::io;
use std::mem;

use bstr::ByteSlice;
use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, trace};

use crate::database::{GeoDatabase, OpenFlags};
use crate::error::{Error, Result};
use crate::interpose::{with_capture, CaptureFile, Captured, Stream};
use crate::mmdb::MaxMind;
use crate::record::{GeoMap, GeoRecord};

enum State<H> {
    Open { handle: H, capture: CaptureFile },
    Closed,
}

/// An open geolocation database.
///
/// Every `open` and `query` runs with the process's stdout/stderr pointed at
/// a private capture file, so whatever the database library prints becomes
/// the error message instead of reaching the terminal.
///
/// ```rust,no_run
/// use geoip_capture::{GeoIp, OpenFlags};
///
/// let mut db = GeoIp::open("/usr/share/GeoIP/GeoLite2-City.mmdb", OpenFlags::default())?;
/// match db.query("81.2.69.142")? {
///     Some(fields) => println!("{:?}", fields.get("city")),
///     None => println!("no data"),
/// }
/// db.close()?;
/// # Ok::<(), geoip_capture::Error>(())
/// ```
pub struct GeoIp<D: GeoDatabase = MaxMind> {
    backend: D,
    path: Utf8PathBuf,
    state: State<D::Handle>,
}

impl GeoIp<MaxMind> {
    /// Open a MaxMind DB file.
    pub fn open(path: impl AsRef<Utf8Path>, flags: OpenFlags) -> Result<Self> {
        Self::open_with(MaxMind, path, flags)
    }
}

impl<D: GeoDatabase> GeoIp<D> {
    /// Open `path` with the given backend.
    ///
    /// On failure the message is whatever the backend printed to stderr,
    /// or the OS error when it printed nothing.
    pub fn open_with(backend: D, path: impl AsRef<Utf8Path>, flags: OpenFlags) -> Result<Self> {
        let path = path.as_ref();
        if path.as_str().is_empty() {
            return Err(Error::invalid_argument("expected a path to a database file"));
        }
        if path.as_str().contains('\0') {
            return Err(Error::invalid_argument("database path contains a NUL byte"));
        }

        let capture = CaptureFile::new()?;
        let Captured { output, bytes } = with_capture(&[Stream::Stderr], &capture, || {
            clear_errno();
            let handle = backend.open(path, flags);
            // Sample errno before anything else can overwrite it.
            (handle, io::Error::last_os_error())
        })?;

        let (handle, os_error) = output;
        let Some(handle) = handle else {
            // The capture file goes away before the error is reported.
            drop(capture);
            let message = match diagnostic(&bytes) {
                Some(text) if !text.is_empty() => text,
                _ => match os_error.raw_os_error() {
                    Some(code) if code != 0 => format!("open error: {}", os_error),
                    _ => format!("open error: could not open {}", path),
                },
            };
            debug!(%path, %message, "failed to open geolocation database");
            return Err(Error::Open {
                path: path.to_owned(),
                message,
            });
        };

        debug!(%path, %flags, "opened geolocation database");
        Ok(Self {
            backend,
            path: path.to_owned(),
            state: State::Open { handle, capture },
        })
    }

    /// Look up `addr`, returning its fields, `None` when the database has no
    /// data for it, or `Error::Query` when the library reported a failure.
    ///
    /// The address is passed through as-is; the backend decides whether it
    /// is valid.
    pub fn query(&self, addr: &str) -> Result<Option<GeoMap>> {
        Ok(self.query_record(addr)?.map(|record| record.to_map()))
    }

    /// Like [`GeoIp::query`], but returns the typed record.
    pub fn query_record(&self, addr: &str) -> Result<Option<GeoRecord>> {
        let State::Open { handle, capture } = &self.state else {
            return Err(Error::Closed);
        };
        if addr.is_empty() {
            return Err(Error::invalid_argument(
                "expected a string representing an IP address to geolocate",
            ));
        }
        if addr.contains('\0') {
            return Err(Error::invalid_argument("address contains a NUL byte"));
        }

        let Captured { output, bytes } = with_capture(&Stream::BOTH, capture, || {
            self.backend.record_by_addr(handle, addr)
        })?;

        match output {
            Some(record) => {
                trace!(addr, "geolocation record found");
                Ok(Some(record))
            }
            None => match diagnostic(&bytes) {
                None => {
                    trace!(addr, "no geolocation data");
                    Ok(None)
                }
                Some(text) => {
                    let message = if text.is_empty() {
                        format!("lookup of {} failed", addr)
                    } else {
                        text
                    };
                    Err(Error::Query {
                        addr: addr.to_owned(),
                        message,
                    })
                }
            },
        }
    }

    /// Release the database and the capture file.
    ///
    /// Closing twice is a bug in the caller and returns `Error::Closed`.
    pub fn close(&mut self) -> Result<()> {
        match mem::replace(&mut self.state, State::Closed) {
            State::Open { handle, capture } => {
                drop(handle);
                drop(capture);
                debug!(path = %self.path, "closed geolocation database");
                Ok(())
            }
            State::Closed => Err(Error::Closed),
        }
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        matches!(self.state, State::Open { .. })
    }

    /// The path this engine was opened with.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn backend(&self) -> &D {
        &self.backend
    }
}

/// Captured library output as an error message, or `None` if nothing was
/// written. Any output at all means failure, so the message is empty when the
/// library wrote only whitespace.
fn diagnostic(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    Some(bytes.trim_end().to_str_lossy().into_owned())
}

/// Reset errno so a backend that fails without a failing syscall is not
/// blamed on an earlier, unrelated error.
fn clear_errno() {
    // SAFETY: the errno location is valid for the calling thread.
    unsafe {
        *errno_location() = 0;
    }
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "emscripten"))]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__errno_location()
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__error()
}
