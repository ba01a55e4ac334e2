//! HTTP client for the third-party APIs behind the proxy routes.

use std::time::Duration;

use axum::body::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Serialize;
use serde_json::Value;

use crate::config::Config;
use crate::error::ProxyError;

const BOT_USER_AGENT: &str = "Mozilla/5.0 (compatible; PanganJawaraBot/1.0)";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// One upstream: base URL, fixed headers and a request timeout.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    name: &'static str,
    base_url: String,
    client: Client,
}

impl UpstreamClient {
    pub fn new(
        name: &'static str,
        base_url: impl Into<String>,
        timeout: Duration,
        headers: HeaderMap,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            name,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GETs `path` and returns the JSON body.
    ///
    /// Timeouts become [`ProxyError::UpstreamTimeout`]; non-2xx answers keep
    /// their status and body; anything else is a 502-style failure.
    pub async fn get_json<Q>(&self, path: &str, query: &Q) -> Result<Value, ProxyError>
    where
        Q: Serialize + ?Sized,
    {
        let request = self.client.get(self.url(path)).query(query);
        self.send_for_json(request).await
    }

    /// POSTs `body` as JSON to `path`, same error mapping as `get_json`.
    pub async fn post_json<Q, B>(
        &self,
        path: &str,
        query: &Q,
        body: &B,
    ) -> Result<Value, ProxyError>
    where
        Q: Serialize + ?Sized,
        B: Serialize + ?Sized,
    {
        let request = self.client.post(self.url(path)).query(query).json(body);
        self.send_for_json(request).await
    }

    /// Downloads an absolute `url`, ignoring the base URL. Returns the
    /// upstream content type along with the raw bytes.
    pub async fn get_bytes(&self, url: Url) -> Result<(Option<String>, Bytes), ProxyError> {
        let response = self.send(self.client.get(url)).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
        Ok((content_type, bytes))
    }

    async fn send_for_json(&self, request: RequestBuilder) -> Result<Value, ProxyError> {
        let response = self.send(request).await?;
        response.json::<Value>().await.map_err(|e| self.transport_error(e))
    }

    /// Sends `request`; only 2xx responses come back as `Ok`.
    async fn send(&self, request: RequestBuilder) -> Result<Response, ProxyError> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        tracing::warn!("{} responded with {}", self.name, status);
        let body = if text.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str(&text).unwrap_or(Value::String(text)))
        };
        Err(ProxyError::UpstreamStatus {
            upstream: self.name,
            status,
            body,
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> ProxyError {
        if e.is_timeout() {
            tracing::warn!("{} request timed out", self.name);
            ProxyError::UpstreamTimeout {
                upstream: self.name,
            }
        } else {
            tracing::warn!("{} request failed: {}", self.name, e);
            ProxyError::UpstreamFailed {
                upstream: self.name,
                message: e.to_string(),
            }
        }
    }
}

fn header_map(pairs: &[(&'static str, &str)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for &(name, value) in pairs {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                headers.insert(HeaderName::from_static(name), value);
            }
            Err(_) => tracing::warn!("Skipping invalid value for header {}", name),
        }
    }
    headers
}

/// The clients for every upstream, built once at startup.
#[derive(Debug, Clone)]
pub struct Upstreams {
    pub bmkg: UpstreamClient,
    pub pangan: UpstreamClient,
    pub ipgeo: UpstreamClient,
    pub nekolabs: UpstreamClient,
    pub gemini: UpstreamClient,
    /// Fetches arbitrary image URLs for the CORS proxy.
    pub media: UpstreamClient,
}

impl Upstreams {
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let bmkg = UpstreamClient::new(
            "bmkg",
            &config.bmkg_api_base,
            config.bmkg_timeout(),
            header_map(&[("accept", "application/json"), ("user-agent", BOT_USER_AGENT)]),
        )?;

        // the price panel rejects requests that do not look like its own frontend
        let pangan = UpstreamClient::new(
            "pangan",
            &config.pangan_api_base,
            config.pangan_timeout(),
            header_map(&[
                ("accept", "application/json, text/plain, */*"),
                ("accept-language", "id-ID,id;q=0.9,en-US;q=0.8,en;q=0.7"),
                ("cache-control", "no-cache"),
                ("pragma", "no-cache"),
                ("user-agent", BROWSER_USER_AGENT),
                (
                    "sec-ch-ua",
                    r#""Chromium";v="121", "Not A(Brand";v="99", "Google Chrome";v="121""#,
                ),
                ("sec-ch-ua-mobile", "?0"),
                ("sec-ch-ua-platform", r#""Windows""#),
                ("sec-fetch-dest", "empty"),
                ("sec-fetch-mode", "cors"),
                ("sec-fetch-site", "same-origin"),
                ("origin", config.pangan_origin.as_str()),
                ("referer", config.pangan_referer.as_str()),
            ]),
        )?;

        let ipgeo = UpstreamClient::new(
            "ipgeolocation",
            &config.ipgeo_api_base,
            config.ipgeo_timeout(),
            header_map(&[("accept", "application/json")]),
        )?;

        let nekolabs = UpstreamClient::new(
            "nekolabs",
            &config.nekolabs_api_base,
            config.nekolabs_timeout(),
            header_map(&[("accept", "application/json")]),
        )?;

        let gemini = UpstreamClient::new(
            "gemini",
            &config.gemini_api_base,
            config.gemini_timeout(),
            header_map(&[("accept", "application/json")]),
        )?;

        let media = UpstreamClient::new(
            "media",
            "",
            config.media_proxy_timeout(),
            header_map(&[("user-agent", BROWSER_USER_AGENT)]),
        )?;

        Ok(Self {
            bmkg,
            pangan,
            ipgeo,
            nekolabs,
            gemini,
            media,
        })
    }
}
