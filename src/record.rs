//! Geolocation records and their conversion into generic field mappings.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::Serialize;

/// A geolocation record as returned by a database backend.
///
/// Mirrors the layout of libGeoIP's `GeoIPRecord`; fields a backend cannot
/// provide stay `None` or zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoRecord {
    pub country_code: Option<String>,
    pub country_code3: Option<String>,
    pub country_name: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub continent_code: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// Zero when not applicable.
    pub metro_code: i32,
    /// Zero when not applicable.
    pub area_code: i32,
}

/// A single typed value in a [`GeoMap`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GeoValue {
    Float(f64),
    Integer(i64),
    Text(String),
}

impl GeoValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            GeoValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            GeoValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            GeoValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for GeoValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeoValue::Float(v) => write!(f, "{}", v),
            GeoValue::Integer(v) => write!(f, "{}", v),
            GeoValue::Text(v) => f.write_str(v),
        }
    }
}

/// Field name to value, built fresh for every successful query.
pub type GeoMap = FxHashMap<&'static str, GeoValue>;

/// The kind of a record field, which also decides when it is omitted.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Always present; zero is a real coordinate.
    Float,
    /// Present only when non-zero.
    Integer,
    /// Present only when set.
    String,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Float => write!(f, "float"),
            FieldKind::Integer => write!(f, "integer"),
            FieldKind::String => write!(f, "string"),
        }
    }
}

/// A named, typed accessor into [`GeoRecord`].
#[derive(Serialize)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
    #[serde(skip)]
    get: fn(&GeoRecord) -> Option<GeoValue>,
}

impl FieldDescriptor {
    /// Extract this field from `record`, or `None` if it should be omitted.
    #[inline]
    pub fn extract(&self, record: &GeoRecord) -> Option<GeoValue> {
        (self.get)(record)
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

#[inline]
fn float(v: f64) -> Option<GeoValue> {
    Some(GeoValue::Float(v))
}

#[inline]
fn text(v: &Option<String>) -> Option<GeoValue> {
    v.as_ref().map(|s| GeoValue::Text(s.clone()))
}

#[inline]
fn nonzero(v: i32) -> Option<GeoValue> {
    (v != 0).then(|| GeoValue::Integer(i64::from(v)))
}

/// Every field a successful query can report, in output order.
pub static FIELDS: [FieldDescriptor; 11] = [
    FieldDescriptor {
        name: "latitude",
        kind: FieldKind::Float,
        description: "Latitude coordinate",
        get: |r| float(r.latitude),
    },
    FieldDescriptor {
        name: "longitude",
        kind: FieldKind::Float,
        description: "Longitude coordinate",
        get: |r| float(r.longitude),
    },
    FieldDescriptor {
        name: "country_code",
        kind: FieldKind::String,
        description: "Two-letter country ISO code",
        get: |r| text(&r.country_code),
    },
    FieldDescriptor {
        name: "country_code3",
        kind: FieldKind::String,
        description: "Three-letter country ISO code",
        get: |r| text(&r.country_code3),
    },
    FieldDescriptor {
        name: "continent_code",
        kind: FieldKind::String,
        description: "Continent code",
        get: |r| text(&r.continent_code),
    },
    FieldDescriptor {
        name: "country",
        kind: FieldKind::String,
        description: "Full country name",
        get: |r| text(&r.country_name),
    },
    FieldDescriptor {
        name: "region",
        kind: FieldKind::String,
        description: "Region or subdivision code",
        get: |r| text(&r.region),
    },
    FieldDescriptor {
        name: "city",
        kind: FieldKind::String,
        description: "City name",
        get: |r| text(&r.city),
    },
    FieldDescriptor {
        name: "postal_code",
        kind: FieldKind::String,
        description: "Postal code",
        get: |r| text(&r.postal_code),
    },
    FieldDescriptor {
        name: "metro_code",
        kind: FieldKind::Integer,
        description: "Metro (DMA) code",
        get: |r| nonzero(r.metro_code),
    },
    FieldDescriptor {
        name: "area_code",
        kind: FieldKind::Integer,
        description: "Telephone area code",
        get: |r| nonzero(r.area_code),
    },
];

/// The field descriptor table, for listing what a query can return.
pub fn fields() -> &'static [FieldDescriptor] {
    &FIELDS
}

impl GeoRecord {
    /// Convert this record into a generic mapping, omitting unset strings
    /// and zero integer codes.
    pub fn to_map(&self) -> GeoMap {
        let mut map = GeoMap::with_capacity_and_hasher(FIELDS.len(), Default::default());
        for field in &FIELDS {
            if let Some(value) = field.extract(self) {
                map.insert(field.name, value);
            }
        }
        map
    }
}
