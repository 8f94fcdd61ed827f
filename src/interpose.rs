//! Descriptor-level capture of stdout/stderr.
//!
//! Native database libraries tend to report failures by printing to the
//! process's standard streams. [`with_capture`] points those descriptors at a
//! private, unlinked [`CaptureFile`] for the duration of one operation and
//! hands back whatever was written.
//!
//! The standard descriptors belong to the whole process, so every capture is
//! serialized behind one process-wide lock. Anything else in the process that
//! writes to stdout/stderr while a capture is active lands in that capture.

use std::fmt;
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::os::unix::fs::FileExt;
use std::ptr;
use std::sync::{Mutex, PoisonError};

use crate::error::{Error, Result};

/// Upper bound on the number of captured bytes returned per operation.
pub const CAPTURE_LIMIT: usize = 1023;

// Held for the whole redirect/run/restore/read window of every capture.
static INTERPOSER: Mutex<()> = Mutex::new(());

/// One of the process's standard output descriptors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    /// Both output streams, in redirection order.
    pub const BOTH: [Stream; 2] = [Stream::Stdout, Stream::Stderr];

    #[inline]
    pub fn raw_fd(self) -> RawFd {
        match self {
            Stream::Stdout => libc::STDOUT_FILENO,
            Stream::Stderr => libc::STDERR_FILENO,
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => write!(f, "stdout"),
            Stream::Stderr => write!(f, "stderr"),
        }
    }
}

/// A private temporary file that never has a directory entry.
///
/// The file is reused across captures; it is truncated before each one so a
/// read only ever sees bytes from the most recent operation.
#[derive(Debug)]
pub struct CaptureFile {
    file: File,
}

impl CaptureFile {
    /// Create a new unlinked capture file.
    pub fn new() -> Result<Self> {
        let file = tempfile::tempfile().map_err(Error::Capture)?;
        Ok(Self { file })
    }

    /// Read the captured bytes from the start of the file, up to
    /// [`CAPTURE_LIMIT`].
    pub fn read(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; CAPTURE_LIMIT];
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read_at(&mut buf[filled..], filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Capture(e)),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Discard anything captured so far.
    ///
    /// The offset is rewound as well: redirected descriptors share it, and
    /// writing past the new end would leave a hole of NUL bytes.
    pub fn reset(&self) -> Result<()> {
        self.file.set_len(0).map_err(Error::Capture)?;
        (&self.file)
            .seek(SeekFrom::Start(0))
            .map_err(Error::Capture)?;
        Ok(())
    }
}

impl AsFd for CaptureFile {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

/// The result of an operation run under [`with_capture`].
#[derive(Debug)]
pub struct Captured<T> {
    /// Whatever the operation returned.
    pub output: T,
    /// Bytes written to the redirected streams while it ran.
    pub bytes: Vec<u8>,
}

impl<T> Captured<T> {
    #[inline]
    pub fn is_silent(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Flush every buffered writer that may sit in front of the standard
/// descriptors: Rust's own handles and all C stdio streams.
fn flush_standard_streams() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
    // SAFETY: fflush(NULL) flushes all open output streams and takes no
    // pointer from us.
    unsafe {
        libc::fflush(ptr::null_mut());
    }
}

/// Standard descriptors currently pointed at a capture file, with the saved
/// originals. Dropping it puts the originals back.
struct Redirect {
    saved: Vec<(RawFd, OwnedFd)>,
}

impl Redirect {
    fn install(streams: &[Stream], target: BorrowedFd<'_>) -> Result<Self> {
        let mut redirect = Redirect {
            saved: Vec::with_capacity(streams.len()),
        };

        for &stream in streams {
            let fd = stream.raw_fd();
            // SAFETY: the standard descriptors stay open for the life of the
            // process; the borrow ends before this iteration does.
            let current = unsafe { BorrowedFd::borrow_raw(fd) };
            let saved = current
                .try_clone_to_owned()
                .map_err(|source| Error::Redirect { stream, source })?;
            redirect.saved.push((fd, saved));

            // SAFETY: both descriptors are valid for the duration of the call.
            if unsafe { libc::dup2(target.as_raw_fd(), fd) } < 0 {
                let source = io::Error::last_os_error();
                return Err(Error::Redirect { stream, source });
            }
        }

        Ok(redirect)
    }
}

impl Drop for Redirect {
    fn drop(&mut self) {
        flush_standard_streams();
        for (fd, saved) in self.saved.drain(..).rev() {
            // SAFETY: `saved` is an open descriptor we own; `fd` is a standard
            // descriptor. A failed dup2 leaves `fd` unchanged.
            unsafe {
                libc::dup2(saved.as_raw_fd(), fd);
            }
        }
    }
}

/// Run `operation` with `streams` redirected to `capture` and return its
/// result along with the captured bytes.
///
/// The descriptors are restored before this returns, including when
/// `operation` panics. If a stream cannot be redirected, the ones already
/// moved are restored and `operation` is not run.
pub fn with_capture<T, F>(
    streams: &[Stream],
    capture: &CaptureFile,
    operation: F,
) -> Result<Captured<T>>
where
    F: FnOnce() -> T,
{
    let _lock = INTERPOSER.lock().unwrap_or_else(PoisonError::into_inner);

    flush_standard_streams();
    capture.reset()?;

    let output = {
        let _redirect = Redirect::install(streams, capture.as_fd())?;
        operation()
    };

    let bytes = capture.read()?;
    Ok(Captured { output, bytes })
}
