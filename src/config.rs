//! Locating the database file and choosing open flags.

use camino::{Utf8Path, Utf8PathBuf};

use crate::database::OpenFlags;
use crate::engine::GeoIp;
use crate::error::Result;

/// Full path of the database to open.
pub const DATABASE_ENV: &str = "GEOIP_DATABASE";
/// Directory holding `GeoLite2-City.mmdb`.
pub const MMDB_DIR_ENV: &str = "GEOIP_MMDB_DIR";
/// Open flags, e.g. `mmap` or `memory|check`.
pub const FLAGS_ENV: &str = "GEOIP_FLAGS";

pub const CITY_DB_FILENAME: &str = "GeoLite2-City.mmdb";

// Standard install locations, searched in order.
static SEARCH_DIRS: [&str; 3] = [
    "/usr/share/GeoIP",
    "/opt/homebrew/var/GeoIP",
    "/var/lib/GeoIP",
];

/// Where the database lives and how to open it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub path: Utf8PathBuf,
    pub flags: OpenFlags,
}

impl DatabaseConfig {
    pub fn new(path: impl Into<Utf8PathBuf>, flags: OpenFlags) -> Self {
        Self {
            path: path.into(),
            flags,
        }
    }

    /// Resolve the configuration from the process environment.
    ///
    /// The path comes from `GEOIP_DATABASE`, then `GEOIP_MMDB_DIR`, then the
    /// first standard directory that exists. Flags come from `GEOIP_FLAGS`.
    pub fn from_env() -> Result<Self> {
        Self::resolve(None, |key| std::env::var(key).ok(), |dir| dir.is_dir())
    }

    /// Like [`DatabaseConfig::from_env`], but an explicit path wins.
    pub fn with_path_or_env(path: Option<Utf8PathBuf>) -> Result<Self> {
        Self::resolve(path, |key| std::env::var(key).ok(), |dir| dir.is_dir())
    }

    fn resolve(
        explicit: Option<Utf8PathBuf>,
        var: impl Fn(&str) -> Option<String>,
        dir_exists: impl Fn(&Utf8Path) -> bool,
    ) -> Result<Self> {
        let flags = match var(FLAGS_ENV) {
            Some(value) if !value.trim().is_empty() => value.parse()?,
            _ => OpenFlags::default(),
        };

        let path = explicit
            .or_else(|| var(DATABASE_ENV).filter(|p| !p.is_empty()).map(Utf8PathBuf::from))
            .or_else(|| {
                var(MMDB_DIR_ENV)
                    .filter(|d| !d.is_empty())
                    .map(|dir| Utf8PathBuf::from(dir).join(CITY_DB_FILENAME))
            })
            .unwrap_or_else(|| default_path(dir_exists));

        Ok(Self { path, flags })
    }

    /// Open the configured database with the MaxMind backend.
    pub fn open(&self) -> Result<GeoIp> {
        GeoIp::open(&self.path, self.flags)
    }
}

fn default_path(dir_exists: impl Fn(&Utf8Path) -> bool) -> Utf8PathBuf {
    let dir = SEARCH_DIRS
        .iter()
        .map(Utf8Path::new)
        .find(|dir| dir_exists(*dir))
        .unwrap_or_else(|| Utf8Path::new(SEARCH_DIRS[0]));
    dir.join(CITY_DB_FILENAME)
}
