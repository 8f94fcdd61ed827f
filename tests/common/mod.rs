#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use camino::Utf8Path;
use geoip_capture::{GeoDatabase, GeoRecord, OpenFlags};

/// What the fake library does for one address.
#[derive(Clone)]
pub enum Reply {
    Record(GeoRecord),
    /// Print to stdout without a trailing newline or flush, like a C
    /// `printf` into a buffered stream.
    Stdout(&'static str),
    Stderr(&'static str),
}

/// A stand-in for a C geolocation library: returns nothing on failure and
/// prints the reason.
#[derive(Clone, Default)]
pub struct FakeDatabase {
    entries: HashMap<String, Reply>,
    live: Arc<AtomicUsize>,
}

pub const FIXTURE_PATH: &str = "/fixtures/FakeCity.dat";
/// Opening this path fails without printing anything.
pub const SILENT_FAILURE_PATH: &str = "/fixtures/silent.dat";

impl FakeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, addr: &str, reply: Reply) -> Self {
        self.entries.insert(addr.to_string(), reply);
        self
    }

    /// Number of handles opened and not yet dropped.
    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

pub struct FakeHandle {
    live: Arc<AtomicUsize>,
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl GeoDatabase for FakeDatabase {
    type Handle = FakeHandle;

    fn open(&self, path: &Utf8Path, _flags: OpenFlags) -> Option<FakeHandle> {
        match path.as_str() {
            FIXTURE_PATH => {
                self.live.fetch_add(1, Ordering::SeqCst);
                Some(FakeHandle {
                    live: Arc::clone(&self.live),
                })
            }
            SILENT_FAILURE_PATH => None,
            other => {
                let _ = writeln!(io::stderr(), "Error Opening file {}", other);
                None
            }
        }
    }

    fn record_by_addr(&self, _handle: &FakeHandle, addr: &str) -> Option<GeoRecord> {
        match self.entries.get(addr)? {
            Reply::Record(record) => Some(record.clone()),
            Reply::Stdout(msg) => {
                let _ = io::stdout().write_all(msg.as_bytes());
                None
            }
            Reply::Stderr(msg) => {
                let _ = io::stderr().write_all(msg.as_bytes());
                None
            }
        }
    }
}

pub fn testville() -> GeoRecord {
    GeoRecord {
        city: Some("Testville".to_string()),
        latitude: 10.5,
        longitude: -20.25,
        metro_code: 0,
        ..Default::default()
    }
}

/// Builds a minimal IPv4 MaxMind DB with one node: addresses in 0.0.0.0/1
/// resolve to a city record, addresses in 128.0.0.0/1 have no data.
pub fn city_mmdb(database_type: &str) -> Vec<u8> {
    let mut buf = Vec::new();

    // Search tree: one node, 24-bit records. Left points at data offset 0
    // (node_count + 16 + 0), right is "no data" (node_count).
    buf.extend_from_slice(&[0x00, 0x00, 0x11, 0x00, 0x00, 0x01]);
    buf.extend_from_slice(&[0u8; 16]);

    // {"city": {"names": {"en": "Testville"}},
    //  "location": {"latitude": 10.5, "longitude": -20.25, "metro_code": 0}}
    map(&mut buf, 2);
    string(&mut buf, "city");
    map(&mut buf, 1);
    string(&mut buf, "names");
    map(&mut buf, 1);
    string(&mut buf, "en");
    string(&mut buf, "Testville");
    string(&mut buf, "location");
    map(&mut buf, 3);
    string(&mut buf, "latitude");
    double(&mut buf, 10.5);
    string(&mut buf, "longitude");
    double(&mut buf, -20.25);
    string(&mut buf, "metro_code");
    uint(&mut buf, 5, 0);

    buf.extend_from_slice(b"\xab\xcd\xefMaxMind.com");
    map(&mut buf, 9);
    string(&mut buf, "binary_format_major_version");
    uint(&mut buf, 5, 2);
    string(&mut buf, "binary_format_minor_version");
    uint(&mut buf, 5, 0);
    string(&mut buf, "build_epoch");
    buf.extend_from_slice(&[0x00, 0x02]); // uint64 (extended type 9), zero
    string(&mut buf, "database_type");
    string(&mut buf, database_type);
    string(&mut buf, "description");
    map(&mut buf, 0);
    string(&mut buf, "ip_version");
    uint(&mut buf, 5, 4);
    string(&mut buf, "languages");
    buf.extend_from_slice(&[0x00, 0x04]); // array (extended type 11), empty
    string(&mut buf, "node_count");
    uint(&mut buf, 6, 1);
    string(&mut buf, "record_size");
    uint(&mut buf, 5, 24);

    buf
}

fn map(buf: &mut Vec<u8>, entries: u8) {
    assert!(entries < 29);
    buf.push((7 << 5) | entries);
}

fn string(buf: &mut Vec<u8>, s: &str) {
    assert!(s.len() < 29);
    buf.push((2 << 5) | s.len() as u8);
    buf.extend_from_slice(s.as_bytes());
}

fn double(buf: &mut Vec<u8>, v: f64) {
    buf.push((3 << 5) | 8);
    buf.extend_from_slice(&v.to_be_bytes());
}

/// Unsigned integer of type 5 (uint16) or 6 (uint32), minimal width.
fn uint(buf: &mut Vec<u8>, kind: u8, v: u32) {
    let bytes = v.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    let payload = &bytes[skip..];
    buf.push((kind << 5) | payload.len() as u8);
    buf.extend_from_slice(payload);
}
