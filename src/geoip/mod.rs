//! Offline IP range dataset used when the live geolocation API cannot be
//! called.
//!
//! The dataset is a CSV file, one range per line:
//!
//! ```text
//! start_ip,end_ip,country,region,city,latitude,longitude,metro,accuracy_radius_km
//! 160.22.134.0,160.22.134.255,ID,JK,Jakarta,-6.1744,106.8294,,50
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. `metro` and
//! `accuracy_radius_km` may be empty. Ranges must not overlap.

use std::net::IpAddr;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeoDbError {
    #[error("failed to read geoip dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("ranges {first} and {second} overlap")]
    Overlap { first: String, second: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoRecord {
    pub start: IpAddr,
    pub end: IpAddr,
    pub country: String,
    pub region: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub metro: Option<u32>,
    pub accuracy_radius_km: Option<u32>,
}

#[derive(Debug, Clone)]
struct IndexedRange {
    start: u128,
    end: u128,
    record: GeoRecord,
}

/// Sorted, non-overlapping ranges searched by binary search.
#[derive(Debug, Clone, Default)]
pub struct OfflineGeoDb {
    ranges: Vec<IndexedRange>,
}

/// IPv4 addresses are mapped into the IPv6 space so both families share
/// one ordering.
fn ip_to_u128(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u128::from(v4.to_ipv6_mapped()),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn parse_ip(field: &str, line: usize) -> Result<IpAddr, GeoDbError> {
    field.trim().parse().map_err(|_| GeoDbError::Parse {
        line,
        reason: format!("invalid ip address {:?}", field),
    })
}

fn parse_optional_u32(field: &str, line: usize) -> Result<Option<u32>, GeoDbError> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(None);
    }
    field.parse().map(Some).map_err(|_| GeoDbError::Parse {
        line,
        reason: format!("invalid number {:?}", field),
    })
}

fn parse_coordinate(field: &str, line: usize) -> Result<f64, GeoDbError> {
    field.trim().parse().map_err(|_| GeoDbError::Parse {
        line,
        reason: format!("invalid coordinate {:?}", field),
    })
}

impl OfflineGeoDb {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Ranges must be disjoint; lookups return at most one record.
    pub fn from_records(records: Vec<GeoRecord>) -> Result<Self, GeoDbError> {
        let mut ranges: Vec<IndexedRange> = records
            .into_iter()
            .map(|record| IndexedRange {
                start: ip_to_u128(record.start),
                end: ip_to_u128(record.end),
                record,
            })
            .collect();
        ranges.sort_by_key(|r| r.start);

        if let Some(pair) = ranges.windows(2).find(|pair| pair[1].start <= pair[0].end) {
            let describe = |r: &IndexedRange| format!("{}-{}", r.record.start, r.record.end);
            return Err(GeoDbError::Overlap {
                first: describe(&pair[0]),
                second: describe(&pair[1]),
            });
        }

        Ok(Self { ranges })
    }

    pub fn parse(content: &str) -> Result<Self, GeoDbError> {
        let mut records = Vec::new();

        for (idx, raw) in content.lines().enumerate() {
            let line = idx + 1;
            let raw = raw.trim();
            if raw.is_empty() || raw.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = raw.split(',').collect();
            if fields.len() != 9 {
                return Err(GeoDbError::Parse {
                    line,
                    reason: format!("expected 9 fields, found {}", fields.len()),
                });
            }

            let start = parse_ip(fields[0], line)?;
            let end = parse_ip(fields[1], line)?;
            if ip_to_u128(start) > ip_to_u128(end) {
                return Err(GeoDbError::Parse {
                    line,
                    reason: "range start is after range end".into(),
                });
            }

            records.push(GeoRecord {
                start,
                end,
                country: fields[2].trim().to_string(),
                region: fields[3].trim().to_string(),
                city: fields[4].trim().to_string(),
                latitude: parse_coordinate(fields[5], line)?,
                longitude: parse_coordinate(fields[6], line)?,
                metro: parse_optional_u32(fields[7], line)?,
                accuracy_radius_km: parse_optional_u32(fields[8], line)?,
            });
        }

        Self::from_records(records)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, GeoDbError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn lookup(&self, ip: IpAddr) -> Option<&GeoRecord> {
        let needle = ip_to_u128(ip);
        let idx = self.ranges.partition_point(|r| r.start <= needle);
        let candidate = self.ranges.get(idx.checked_sub(1)?)?;
        (needle <= candidate.end).then_some(&candidate.record)
    }

    /// Like [`OfflineGeoDb::lookup`] for an address that may not parse.
    pub fn lookup_str(&self, ip: &str) -> Option<&GeoRecord> {
        ip.trim().parse().ok().and_then(|ip| self.lookup(ip))
    }
}
