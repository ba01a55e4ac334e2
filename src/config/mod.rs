use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,

    pub bmkg_api_base: String,
    pub bmkg_timeout_ms: u64,
    pub bmkg_cache_ttl_ms: u64,

    pub pangan_api_base: String,
    pub pangan_timeout_ms: u64,
    pub pangan_cache_ttl_ms: u64,
    pub pangan_price_cache_ttl_ms: u64,
    pub pangan_origin: String,
    pub pangan_referer: String,

    pub ipgeo_api_base: String,
    pub ipgeo_timeout_ms: u64,
    pub ipgeo_api_keys: Vec<String>,
    pub ipgeo_daily_limit: i64,
    pub ipgeo_loopback_ip: String,

    pub geoip_db_path: Option<String>,
    pub geoip_default_timezone: String,

    pub nekolabs_api_base: String,
    pub nekolabs_timeout_ms: u64,

    /// Google Gemini `generateContent`, used only when the nekolabs chat
    /// call fails and a key is configured.
    pub gemini_api_base: String,
    pub gemini_api_key: Option<String>,
    pub gemini_timeout_ms: u64,

    pub media_proxy_timeout_ms: u64,

    pub usage_retention_days: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server_host: "::".into(),
            server_port: 3000,
            api_base_uri: String::new(),
            database_url: None,
            redis_url: None,
            bmkg_api_base: "https://api.bmkg.go.id/publik".into(),
            bmkg_timeout_ms: 15_000,
            bmkg_cache_ttl_ms: 5 * 60 * 1000,
            pangan_api_base: "https://api-panelhargav2.badanpangan.go.id/api".into(),
            pangan_timeout_ms: 15_000,
            pangan_cache_ttl_ms: 5 * 60 * 1000,
            pangan_price_cache_ttl_ms: 60 * 1000,
            pangan_origin: "https://panelharga.badanpangan.go.id".into(),
            pangan_referer: "https://panelharga.badanpangan.go.id/".into(),
            ipgeo_api_base: "https://api.ipgeolocation.io/v2".into(),
            ipgeo_timeout_ms: 15_000,
            ipgeo_api_keys: Vec::new(),
            ipgeo_daily_limit: 1000,
            ipgeo_loopback_ip: "160.22.134.39".into(),
            geoip_db_path: None,
            geoip_default_timezone: "Asia/Jakarta".into(),
            nekolabs_api_base: "https://api.nekolabs.web.id".into(),
            nekolabs_timeout_ms: 30_000,
            gemini_api_base: "https://generativelanguage.googleapis.com/v1beta".into(),
            gemini_api_key: None,
            gemini_timeout_ms: 60_000,
            media_proxy_timeout_ms: 30_000,
            usage_retention_days: 2,
        }
    }
}

fn var_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Splits a comma-separated key list, dropping blanks.
pub fn parse_key_pool(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let defaults = Config::default();
        let api_keys = parse_key_pool(&env::var("IPGEO_API_KEYS")?);

        Ok(Config {
            server_host: env::var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: var_or("SERVER_PORT", defaults.server_port),
            api_base_uri: env::var("API_BASE_URI").unwrap_or(defaults.api_base_uri),
            database_url: optional_var("DATABASE_URL"),
            redis_url: optional_var("REDIS_URL"),
            bmkg_api_base: env::var("BMKG_API_BASE").unwrap_or(defaults.bmkg_api_base),
            bmkg_timeout_ms: var_or("BMKG_API_TIMEOUT_MS", defaults.bmkg_timeout_ms),
            bmkg_cache_ttl_ms: var_or("BMKG_CACHE_TTL_MS", defaults.bmkg_cache_ttl_ms),
            pangan_api_base: env::var("PANGAN_API_BASE").unwrap_or(defaults.pangan_api_base),
            pangan_timeout_ms: var_or("PANGAN_API_TIMEOUT_MS", defaults.pangan_timeout_ms),
            pangan_cache_ttl_ms: var_or("PANGAN_CACHE_TTL_MS", defaults.pangan_cache_ttl_ms),
            pangan_price_cache_ttl_ms: var_or(
                "PANGAN_PRICE_CACHE_TTL_MS",
                defaults.pangan_price_cache_ttl_ms,
            ),
            pangan_origin: env::var("PANGAN_ORIGIN").unwrap_or(defaults.pangan_origin),
            pangan_referer: env::var("PANGAN_REFERER").unwrap_or(defaults.pangan_referer),
            ipgeo_api_base: env::var("IPGEO_API_BASE").unwrap_or(defaults.ipgeo_api_base),
            ipgeo_timeout_ms: var_or("IPGEO_API_TIMEOUT_MS", defaults.ipgeo_timeout_ms),
            ipgeo_api_keys: api_keys,
            ipgeo_daily_limit: var_or("IPGEO_DAILY_LIMIT", defaults.ipgeo_daily_limit),
            ipgeo_loopback_ip: env::var("IPGEO_LOOPBACK_IP")
                .unwrap_or(defaults.ipgeo_loopback_ip),
            geoip_db_path: optional_var("GEOIP_DB_PATH"),
            geoip_default_timezone: env::var("GEOIP_DEFAULT_TIMEZONE")
                .unwrap_or(defaults.geoip_default_timezone),
            nekolabs_api_base: env::var("NEKOLABS_API_BASE")
                .unwrap_or(defaults.nekolabs_api_base),
            nekolabs_timeout_ms: var_or("NEKOLABS_API_TIMEOUT_MS", defaults.nekolabs_timeout_ms),
            gemini_api_base: env::var("GOOGLE_GEMINI_API_BASE")
                .unwrap_or(defaults.gemini_api_base),
            gemini_api_key: optional_var("GOOGLE_GEMINI_API_KEY"),
            gemini_timeout_ms: var_or("GOOGLE_GEMINI_TIMEOUT_MS", defaults.gemini_timeout_ms),
            media_proxy_timeout_ms: var_or(
                "MEDIA_PROXY_TIMEOUT_MS",
                defaults.media_proxy_timeout_ms,
            ),
            usage_retention_days: var_or("USAGE_RETENTION_DAYS", defaults.usage_retention_days),
        })
    }

    pub fn bmkg_timeout(&self) -> Duration {
        Duration::from_millis(self.bmkg_timeout_ms)
    }

    pub fn bmkg_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.bmkg_cache_ttl_ms)
    }

    pub fn pangan_timeout(&self) -> Duration {
        Duration::from_millis(self.pangan_timeout_ms)
    }

    pub fn pangan_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.pangan_cache_ttl_ms)
    }

    pub fn pangan_price_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.pangan_price_cache_ttl_ms)
    }

    pub fn ipgeo_timeout(&self) -> Duration {
        Duration::from_millis(self.ipgeo_timeout_ms)
    }

    pub fn nekolabs_timeout(&self) -> Duration {
        Duration::from_millis(self.nekolabs_timeout_ms)
    }

    pub fn gemini_timeout(&self) -> Duration {
        Duration::from_millis(self.gemini_timeout_ms)
    }

    pub fn media_proxy_timeout(&self) -> Duration {
        Duration::from_millis(self.media_proxy_timeout_ms)
    }

    pub fn usage_retention(&self) -> Duration {
        Duration::from_secs(self.usage_retention_days * 24 * 3600)
    }
}
