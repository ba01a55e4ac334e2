use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::AppState;
use crate::cache::CacheKey;
use crate::error::ProxyError;

/// Current conditions pulled out of a BMKG forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSummary {
    pub location: String,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub weather: Option<String>,
    pub timestamp: String,
}

impl WeatherSummary {
    /// Reads `data[0].lokasi` and the first slot of `data[0].cuaca`.
    pub fn from_forecast(adm4: &str, forecast: &Value) -> Self {
        let area = forecast.pointer("/data/0");

        let location = area
            .and_then(|a| a.get("lokasi"))
            .map(|lokasi| {
                ["desa", "kecamatan", "kota"]
                    .iter()
                    .filter_map(|field| lokasi.get(*field).and_then(Value::as_str))
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| adm4.to_string());

        let current = area.and_then(|a| a.pointer("/cuaca/0/0"));

        Self {
            location,
            temperature: current.and_then(|c| c.get("t")).and_then(number),
            humidity: current.and_then(|c| c.get("hu")).and_then(number),
            weather: current
                .and_then(|c| c.get("weather_desc"))
                .and_then(Value::as_str)
                .map(str::to_string),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// BMKG sometimes sends numbers as strings.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Raw forecast for `params`, served through the weather cache. `params`
/// must already be stripped of empty values.
pub async fn fetch_forecast(
    state: &AppState,
    params: BTreeMap<String, String>,
) -> Result<Value, ProxyError> {
    let key = CacheKey::from_map(&params);
    let client = state.upstreams.bmkg.clone();

    state
        .caches
        .weather
        .get_or_fetch(key, state.config.bmkg_cache_ttl(), move || async move {
            client.get_json("prakiraan-cuaca", &params).await
        })
        .await
}
