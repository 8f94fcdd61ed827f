//! MaxMind DB backend.
//!
//! Reports failures the way libGeoIP does, on stdout/stderr, so the engine
//! treats every backend the same way.

use std::fs::File;
use std::io::{self, Write};
use std::net::IpAddr;

use camino::Utf8Path;
use maxminddb::Reader;
use memmap2::Mmap;
use serde::Deserialize;

use crate::database::{GeoDatabase, OpenFlags};
use crate::record::GeoRecord;

/// Backend for MaxMind DB (`.mmdb`) city databases.
#[derive(Debug, Default, Clone, Copy)]
pub struct MaxMind;

/// Database bytes, either read into memory or mapped.
pub enum Source {
    Memory(Vec<u8>),
    Mapped(Mmap),
}

impl AsRef<[u8]> for Source {
    fn as_ref(&self) -> &[u8] {
        match self {
            Source::Memory(buf) => &buf[..],
            Source::Mapped(map) => &map[..],
        }
    }
}

/// An open MaxMind database.
pub struct MmdbHandle {
    reader: Reader<Source>,
    silent: bool,
}

impl MmdbHandle {
    /// The `database_type` recorded in the file's metadata.
    pub fn database_type(&self) -> &str {
        &self.reader.metadata.database_type
    }

    fn is_city_database(&self) -> bool {
        self.database_type().contains("City")
    }
}

// Shapes of the MaxMind city schema, limited to what `GeoRecord` carries.
// Owned strings keep this independent of the decoder's borrowing rules.

#[derive(Deserialize, Default)]
#[serde(default)]
struct Names {
    en: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Named {
    names: Names,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Coded {
    code: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Country {
    iso_code: Option<String>,
    names: Names,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Subdivision {
    iso_code: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Location {
    latitude: Option<f64>,
    longitude: Option<f64>,
    metro_code: Option<u16>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CityRecord {
    city: Named,
    continent: Coded,
    country: Country,
    location: Location,
    postal: Coded,
    subdivisions: Vec<Subdivision>,
}

impl From<CityRecord> for GeoRecord {
    fn from(rec: CityRecord) -> Self {
        GeoRecord {
            country_code: rec.country.iso_code,
            // MaxMind DB carries neither alpha-3 codes nor area codes
            country_code3: None,
            country_name: rec.country.names.en,
            region: rec.subdivisions.into_iter().next().and_then(|s| s.iso_code),
            city: rec.city.names.en,
            postal_code: rec.postal.code,
            continent_code: rec.continent.code,
            latitude: rec.location.latitude.unwrap_or(0.0),
            longitude: rec.location.longitude.unwrap_or(0.0),
            metro_code: rec.location.metro_code.map_or(0, i32::from),
            area_code: 0,
        }
    }
}

/// Print a diagnostic unless the caller asked for silence.
fn report(silent: bool, mut out: impl Write, args: std::fmt::Arguments<'_>) {
    if silent {
        return;
    }
    let _ = out.write_fmt(args);
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

fn load(path: &Utf8Path, flags: OpenFlags) -> io::Result<Source> {
    if flags.contains(OpenFlags::MMAP_CACHE) {
        let file = File::open(path)?;
        // SAFETY: the database is opened read-only and never written by us;
        // like every mmdb reader we rely on it not being truncated underneath.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Source::Mapped(map))
    } else {
        Ok(Source::Memory(std::fs::read(path)?))
    }
}

impl GeoDatabase for MaxMind {
    type Handle = MmdbHandle;

    fn open(&self, path: &Utf8Path, flags: OpenFlags) -> Option<MmdbHandle> {
        let silent = flags.contains(OpenFlags::SILENCE);

        let source = match load(path, flags) {
            Ok(source) => source,
            // errno still describes the failure for callers that asked for
            // silence.
            Err(_) => {
                report(silent, io::stderr(), format_args!("Error Opening file {}", path));
                return None;
            }
        };

        match Reader::from_source(source) {
            Ok(reader) => Some(MmdbHandle { reader, silent }),
            Err(e) => {
                report(
                    silent,
                    io::stderr(),
                    format_args!("Invalid database {}: {}", path, e),
                );
                None
            }
        }
    }

    fn record_by_addr(&self, handle: &MmdbHandle, addr: &str) -> Option<GeoRecord> {
        // Unparseable addresses have no data, same as libGeoIP.
        let ip: IpAddr = addr.trim().parse().ok()?;

        if !handle.is_city_database() {
            report(
                handle.silent,
                io::stdout(),
                format_args!(
                    "Invalid database type {}, expected City database",
                    handle.database_type()
                ),
            );
            return None;
        }

        let result = match handle.reader.lookup(ip) {
            Ok(result) => result,
            Err(e) => {
                report(
                    handle.silent,
                    io::stderr(),
                    format_args!("Lookup of {} failed: {}", addr, e),
                );
                return None;
            }
        };

        match result.decode::<CityRecord>() {
            Ok(record) => record.map(GeoRecord::from),
            Err(e) => {
                report(
                    handle.silent,
                    io::stderr(),
                    format_args!("Error decoding record for {}: {}", addr, e),
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_city_record_maps_to_geo_record() {
        let rec = CityRecord {
            city: Named {
                names: Names {
                    en: Some("London".to_string()),
                },
            },
            continent: Coded {
                code: Some("EU".to_string()),
            },
            country: Country {
                iso_code: Some("GB".to_string()),
                names: Names {
                    en: Some("United Kingdom".to_string()),
                },
            },
            location: Location {
                latitude: Some(51.5142),
                longitude: Some(-0.0931),
                metro_code: None,
            },
            postal: Coded { code: None },
            subdivisions: vec![
                Subdivision {
                    iso_code: Some("ENG".to_string()),
                },
                Subdivision {
                    iso_code: Some("WND".to_string()),
                },
            ],
        };

        let geo = GeoRecord::from(rec);
        assert_eq!(geo.city.as_deref(), Some("London"));
        assert_eq!(geo.country_code.as_deref(), Some("GB"));
        assert_eq!(geo.country_name.as_deref(), Some("United Kingdom"));
        assert_eq!(geo.continent_code.as_deref(), Some("EU"));
        assert_eq!(geo.region.as_deref(), Some("ENG"));
        assert_eq!(geo.postal_code, None);
        assert_eq!(geo.country_code3, None);
        assert_eq!(geo.latitude, 51.5142);
        assert_eq!(geo.metro_code, 0);
    }

    #[test]
    fn test_missing_location_is_zero() {
        let geo = GeoRecord::from(CityRecord::default());
        assert_eq!(geo.latitude, 0.0);
        assert_eq!(geo.longitude, 0.0);
        assert_eq!(geo.region, None);
    }

    #[test]
    fn test_metro_code_is_widened() {
        let rec = CityRecord {
            location: Location {
                metro_code: Some(807),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(GeoRecord::from(rec).metro_code, 807);
    }

    #[test]
    fn test_report_respects_silence() {
        let mut out = Vec::new();
        report(true, &mut out, format_args!("noisy"));
        assert!(out.is_empty());

        report(false, &mut out, format_args!("Error Opening file {}", "/nope"));
        assert_eq!(out, b"Error Opening file /nope\n");
    }
}
