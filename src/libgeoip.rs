//! Backend for the legacy C libGeoIP (`GeoIP.dat` / `GeoLiteCity.dat`).
//!
//! libGeoIP prints open failures to stderr and lookup failures to stdout,
//! which is the behavior the capture layer exists for.

use std::ffi::{c_char, c_float, c_int, CStr, CString};
use std::ptr::NonNull;

use camino::Utf8Path;

use crate::database::{GeoDatabase, OpenFlags};
use crate::record::GeoRecord;

#[repr(C)]
struct RawGeoIp {
    _private: [u8; 0],
}

// Layout of `GeoIPRecord` from GeoIPCity.h.
#[repr(C)]
struct RawGeoIpRecord {
    country_code: *mut c_char,
    country_code3: *mut c_char,
    country_name: *mut c_char,
    region: *mut c_char,
    city: *mut c_char,
    postal_code: *mut c_char,
    latitude: c_float,
    longitude: c_float,
    // union with dma_code
    metro_code: c_int,
    area_code: c_int,
    charset: c_int,
    continent_code: *mut c_char,
    netmask: c_int,
}

const GEOIP_CHARSET_UTF8: c_int = 1;

#[link(name = "GeoIP")]
extern "C" {
    fn GeoIP_open(filename: *const c_char, flags: c_int) -> *mut RawGeoIp;
    fn GeoIP_delete(gi: *mut RawGeoIp);
    fn GeoIP_record_by_addr(gi: *mut RawGeoIp, addr: *const c_char) -> *mut RawGeoIpRecord;
    fn GeoIPRecord_delete(gir: *mut RawGeoIpRecord);
}

/// Backend that calls into libGeoIP.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibGeoIp;

/// An open libGeoIP database, deleted on drop.
pub struct LibGeoIpHandle(NonNull<RawGeoIp>);

// The handle is only ever used by one engine at a time, and every call into
// it happens under the interposition lock.
unsafe impl Send for LibGeoIpHandle {}

impl Drop for LibGeoIpHandle {
    fn drop(&mut self) {
        // SAFETY: the pointer came from GeoIP_open and is deleted only here.
        unsafe { GeoIP_delete(self.0.as_ptr()) }
    }
}

/// Decode a record string; libGeoIP hands out ISO-8859-1 unless the
/// database was opened for UTF-8.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn decode(ptr: *const c_char, charset: c_int) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let bytes = CStr::from_ptr(ptr).to_bytes();
    if charset == GEOIP_CHARSET_UTF8 {
        Some(String::from_utf8_lossy(bytes).into_owned())
    } else {
        Some(bytes.iter().map(|&b| b as char).collect())
    }
}

impl GeoDatabase for LibGeoIp {
    type Handle = LibGeoIpHandle;

    fn open(&self, path: &Utf8Path, flags: OpenFlags) -> Option<LibGeoIpHandle> {
        let path = CString::new(path.as_str()).ok()?;
        // SAFETY: `path` is a valid C string for the duration of the call.
        let gi = unsafe { GeoIP_open(path.as_ptr(), flags.bits() as c_int) };
        NonNull::new(gi).map(LibGeoIpHandle)
    }

    fn record_by_addr(&self, handle: &LibGeoIpHandle, addr: &str) -> Option<GeoRecord> {
        let addr = CString::new(addr).ok()?;
        // SAFETY: the handle is open and `addr` is a valid C string.
        let raw = unsafe { GeoIP_record_by_addr(handle.0.as_ptr(), addr.as_ptr()) };
        let raw = NonNull::new(raw)?;

        // SAFETY: a non-null record is fully initialized by libGeoIP and stays
        // valid until GeoIPRecord_delete below.
        let record = unsafe {
            let r = raw.as_ref();
            GeoRecord {
                country_code: decode(r.country_code, r.charset),
                country_code3: decode(r.country_code3, r.charset),
                country_name: decode(r.country_name, r.charset),
                region: decode(r.region, r.charset),
                city: decode(r.city, r.charset),
                postal_code: decode(r.postal_code, r.charset),
                continent_code: decode(r.continent_code, r.charset),
                latitude: f64::from(r.latitude),
                longitude: f64::from(r.longitude),
                metro_code: r.metro_code,
                area_code: r.area_code,
            }
        };

        // SAFETY: `raw` came from GeoIP_record_by_addr and is not used again.
        unsafe { GeoIPRecord_delete(raw.as_ptr()) };
        Some(record)
    }
}
