use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProxyError;
use crate::geoip::GeoRecord;

/// A GeoJSON `Feature` with a single point. The live and the offline
/// lookups both produce this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoFeature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: PointGeometry,
    pub properties: FeatureProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    /// `[longitude, latitude]`
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureProperties {
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    pub country: Option<Country>,
    pub region: Option<Region>,
    pub location: Option<Coordinates>,
    pub metadata: Option<CountryMetadata>,
    pub currency: Option<Currency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    pub provider: Provider,
    pub meta: QueryMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Country {
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code3: Option<String>,
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub official_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capital: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_eu: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub state_prov: Option<String>,
    pub state_code: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
    pub zipcode: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continent_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geoname_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metro_code: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_radius_km: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CountryMetadata {
    pub calling_code: Option<String>,
    pub tld: Option<String>,
    #[serde(default)]
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    pub code: Option<String>,
    pub name: Option<String>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "ipgeolocation.io")]
    IpGeolocation,
    #[serde(rename = "geoip-lite")]
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMeta {
    pub queried_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl QueryMeta {
    fn now() -> Self {
        Self {
            queried_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            api_version: None,
            api_key_used: None,
            confidence: None,
        }
    }
}

/// Body of the 429 answer: the live lookup was skipped, the offline one
/// is attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaExhaustedResponse {
    pub error: String,
    pub fallback: GeoFeature,
}

/// Confidence attached to offline answers.
const OFFLINE_CONFIDENCE: f64 = 0.7;

// ipgeolocation.io v2 `/ipgeo` response, only the fields we map
#[derive(Debug, Deserialize)]
struct IpGeoResponse {
    ip: Option<String>,
    location: IpGeoLocation,
    #[serde(default)]
    country_metadata: Option<IpGeoCountryMetadata>,
    #[serde(default)]
    currency: Option<Currency>,
}

#[derive(Debug, Deserialize)]
struct IpGeoLocation {
    #[serde(default)]
    latitude: Value,
    #[serde(default)]
    longitude: Value,
    continent_code: Option<String>,
    continent_name: Option<String>,
    country_code2: Option<String>,
    country_code3: Option<String>,
    country_name: Option<String>,
    country_name_official: Option<String>,
    country_capital: Option<String>,
    state_prov: Option<String>,
    state_code: Option<String>,
    district: Option<String>,
    city: Option<String>,
    zipcode: Option<String>,
    geoname_id: Option<Value>,
    is_eu: Option<bool>,
    country_flag: Option<String>,
    country_emoji: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IpGeoCountryMetadata {
    calling_code: Option<String>,
    tld: Option<String>,
    #[serde(default)]
    languages: Vec<String>,
}

fn coordinate(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl GeoFeature {
    fn point(longitude: f64, latitude: f64, properties: FeatureProperties) -> Self {
        Self {
            kind: "Feature".into(),
            geometry: PointGeometry {
                kind: "Point".into(),
                coordinates: [longitude, latitude],
            },
            properties,
        }
    }

    /// Maps a live ipgeolocation.io answer. Fails when the payload has no
    /// usable coordinates.
    pub fn from_ipgeo(payload: Value, queried_ip: &str, api_key: &str) -> Result<Self, ProxyError> {
        let malformed = |message: String| ProxyError::UpstreamFailed {
            upstream: "ipgeolocation",
            message,
        };

        let data: IpGeoResponse = serde_json::from_value(payload)
            .map_err(|e| malformed(format!("unexpected payload: {}", e)))?;
        let loc = data.location;

        let (Some(latitude), Some(longitude)) =
            (coordinate(&loc.latitude), coordinate(&loc.longitude))
        else {
            return Err(malformed("payload has no coordinates".into()));
        };

        let metadata = data.country_metadata.map(|m| CountryMetadata {
            calling_code: m.calling_code,
            tld: m.tld,
            languages: m.languages,
        });

        let properties = FeatureProperties {
            ip: data.ip.unwrap_or_else(|| queried_ip.to_string()),
            network: None,
            country: Some(Country {
                code: loc.country_code2,
                code3: loc.country_code3,
                name: loc.country_name,
                official_name: loc.country_name_official,
                capital: loc.country_capital,
                flag: loc.country_flag,
                emoji: loc.country_emoji,
                is_eu: loc.is_eu,
            }),
            region: Some(Region {
                state_prov: loc.state_prov,
                state_code: loc.state_code,
                district: loc.district,
                city: loc.city,
                zipcode: loc.zipcode,
            }),
            location: Some(Coordinates {
                latitude,
                longitude,
                continent_code: loc.continent_code,
                continent_name: loc.continent_name,
                geoname_id: loc.geoname_id,
                ..Coordinates::default()
            }),
            metadata,
            currency: data.currency,
            timezone: None,
            provider: Provider::IpGeolocation,
            meta: QueryMeta {
                api_version: Some("v2".into()),
                api_key_used: Some(api_key.to_string()),
                ..QueryMeta::now()
            },
        };

        Ok(Self::point(longitude, latitude, properties))
    }

    /// Best-effort answer from the offline dataset. A miss still yields a
    /// feature, at `[0, 0]` with nothing known about the address.
    pub fn offline(ip: &str, record: Option<&GeoRecord>, timezone: &str) -> Self {
        let Some(record) = record else {
            let properties = FeatureProperties {
                ip: ip.to_string(),
                network: None,
                country: None,
                region: None,
                location: None,
                metadata: None,
                currency: None,
                timezone: None,
                provider: Provider::Offline,
                meta: QueryMeta::now(),
            };
            return Self::point(0.0, 0.0, properties);
        };

        let country_name = (record.country == "ID").then(|| "Indonesia".to_string());
        let properties = FeatureProperties {
            ip: ip.to_string(),
            network: Some(format!("{}-{}", record.start, record.end)),
            country: Some(Country {
                code: non_empty(&record.country),
                name: country_name,
                ..Country::default()
            }),
            region: Some(Region {
                state_code: non_empty(&record.region),
                city: non_empty(&record.city),
                ..Region::default()
            }),
            location: Some(Coordinates {
                latitude: record.latitude,
                longitude: record.longitude,
                metro_code: record.metro,
                accuracy_radius_km: record.accuracy_radius_km,
                ..Coordinates::default()
            }),
            metadata: None,
            currency: None,
            timezone: non_empty(timezone),
            provider: Provider::Offline,
            meta: QueryMeta {
                confidence: Some(OFFLINE_CONFIDENCE),
                ..QueryMeta::now()
            },
        };

        Self::point(record.longitude, record.latitude, properties)
    }
}
