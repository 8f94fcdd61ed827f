//! IP geolocation lookups that turn a database library's printed diagnostics
//! into errors.
//!
//! Geolocation libraries in the libGeoIP tradition report failure by
//! returning nothing and printing the reason to stdout or stderr. [`GeoIp`]
//! points both descriptors at a private, unlinked capture file around every
//! call, so it can tell "no data for this address" (nothing printed) from
//! "the lookup failed" (something printed) and return the printed text as
//! the error message.
//!
//! # Examples
//!
//! ```rust,no_run
//! use geoip_capture::{DatabaseConfig, GeoValue};
//!
//! let db = DatabaseConfig::from_env()?.open()?;
//! if let Some(fields) = db.query("81.2.69.142")? {
//!     let lat = fields.get("latitude").and_then(GeoValue::as_f64);
//!     let city = fields.get("city").and_then(GeoValue::as_str);
//!     println!("{:?} {:?}", city, lat);
//! }
//! # Ok::<(), geoip_capture::Error>(())
//! ```
//!
//! Standard-descriptor redirection is process-wide. All captures are
//! serialized behind one lock, but anything else writing to stdout/stderr
//! while a lookup runs will be attributed to that lookup.

pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod interpose;
#[cfg(feature = "libgeoip")]
pub mod libgeoip;
pub mod mmdb;
pub mod record;

pub use crate::config::DatabaseConfig;
pub use crate::database::{GeoDatabase, OpenFlags};
pub use crate::engine::GeoIp;
pub use crate::error::{Error, Result};
#[cfg(feature = "libgeoip")]
pub use crate::libgeoip::LibGeoIp;
pub use crate::mmdb::MaxMind;
pub use crate::record::{FieldKind, GeoMap, GeoRecord, GeoValue};
