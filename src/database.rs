//! The contract between the lookup engine and a geolocation database library.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use camino::Utf8Path;

use crate::error::Error;
use crate::record::GeoRecord;

/// A geolocation database library.
///
/// Implementations follow the C library convention the engine is built
/// around: failure is a `None` return, and the reason (if any) is printed to
/// stdout or stderr. The engine captures that output; a `None` with nothing
/// printed means "no data".
pub trait GeoDatabase {
    /// An open database. Dropping it releases the database.
    type Handle;

    /// Open the database at `path`. On failure, print a diagnostic to
    /// stderr and return `None`.
    fn open(&self, path: &Utf8Path, flags: OpenFlags) -> Option<Self::Handle>;

    /// Look up `addr`. Return `None` silently when the database has no data
    /// for it; print a diagnostic to stdout or stderr when the lookup fails.
    fn record_by_addr(&self, handle: &Self::Handle, addr: &str) -> Option<GeoRecord>;
}

/// Opaque open flags, passed through to the backend.
///
/// The named constants carry libGeoIP's values.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct OpenFlags(u32);

impl OpenFlags {
    /// Read from disk as needed.
    pub const STANDARD: OpenFlags = OpenFlags(0);
    /// Load the whole database into memory.
    pub const MEMORY_CACHE: OpenFlags = OpenFlags(1);
    /// Reload when the file changes.
    pub const CHECK_CACHE: OpenFlags = OpenFlags(2);
    /// Cache only the most frequently accessed index.
    pub const INDEX_CACHE: OpenFlags = OpenFlags(4);
    /// Memory-map the database file.
    pub const MMAP_CACHE: OpenFlags = OpenFlags(8);
    /// Ask the library not to print diagnostics. Failures then fall back to
    /// OS error text.
    pub const SILENCE: OpenFlags = OpenFlags(16);

    const NAMED: [(&'static str, OpenFlags); 6] = [
        ("standard", OpenFlags::STANDARD),
        ("memory", OpenFlags::MEMORY_CACHE),
        ("check", OpenFlags::CHECK_CACHE),
        ("index", OpenFlags::INDEX_CACHE),
        ("mmap", OpenFlags::MMAP_CACHE),
        ("silence", OpenFlags::SILENCE),
    ];

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        OpenFlags(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if every bit of `other` is set.
    #[inline]
    pub const fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenFlags {
    fn bitor_assign(&mut self, rhs: OpenFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for OpenFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "standard");
        }
        let mut rest = self.0;
        let mut first = true;
        for (name, flag) in &OpenFlags::NAMED[1..] {
            if self.contains(*flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                rest &= !flag.0;
                first = false;
            }
        }
        if rest != 0 {
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{:#x}", rest)?;
        }
        Ok(())
    }
}

/// Parses `"mmap|check"`, `"memory,index"` or a plain number such as `"9"`.
impl FromStr for OpenFlags {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(bits) = s.parse::<u32>() {
            return Ok(OpenFlags(bits));
        }

        let mut flags = OpenFlags::STANDARD;
        for part in s.split(|c: char| c == '|' || c == ',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let flag = OpenFlags::NAMED
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(part))
                .map(|(_, flag)| *flag)
                .ok_or_else(|| Error::invalid_argument(format!("unknown open flag: {}", part)))?;
            flags |= flag;
        }
        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_standard() {
        assert_eq!(OpenFlags::default(), OpenFlags::STANDARD);
        assert_eq!(OpenFlags::default().bits(), 0);
    }

    #[test]
    fn test_parse_names() {
        let flags: OpenFlags = "mmap|check".parse().unwrap();
        assert!(flags.contains(OpenFlags::MMAP_CACHE));
        assert!(flags.contains(OpenFlags::CHECK_CACHE));
        assert!(!flags.contains(OpenFlags::MEMORY_CACHE));

        let flags: OpenFlags = " Memory , index ".parse().unwrap();
        assert_eq!(flags, OpenFlags::MEMORY_CACHE | OpenFlags::INDEX_CACHE);
    }

    #[test]
    fn test_parse_number() {
        let flags: OpenFlags = "9".parse().unwrap();
        assert_eq!(flags, OpenFlags::MEMORY_CACHE | OpenFlags::MMAP_CACHE);
    }

    #[test]
    fn test_parse_unknown_name() {
        let err = "mmap|turbo".parse::<OpenFlags>().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
        assert!(err.to_string().contains("turbo"));
    }

    #[test]
    fn test_display() {
        assert_eq!(OpenFlags::STANDARD.to_string(), "standard");
        assert_eq!(
            (OpenFlags::MMAP_CACHE | OpenFlags::SILENCE).to_string(),
            "mmap|silence"
        );
        assert_eq!(OpenFlags::from_bits(0x41).to_string(), "memory|0x40");
    }
}
