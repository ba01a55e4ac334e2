use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    routing::{get, post},
};
use config::Config;
use tower::ServiceBuilder;

pub mod cache;
pub mod config;
pub mod error;
pub mod geoip;
pub mod middleware;
pub mod quota;
pub mod routes;
pub mod upstream;
pub mod usage;
pub mod utils;

use cache::ProxyCaches;
use geoip::OfflineGeoDb;
use quota::KeyRotator;
use upstream::Upstreams;
use usage::UsageStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub upstreams: Upstreams,
    pub caches: ProxyCaches,
    pub rotator: Arc<KeyRotator>,
    pub geo_db: Arc<OfflineGeoDb>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: Config,
        usage_store: Arc<dyn UsageStore>,
        geo_db: OfflineGeoDb,
    ) -> Result<Self, reqwest::Error> {
        let upstreams = Upstreams::from_config(&config)?;
        let rotator = KeyRotator::new(
            config.ipgeo_api_keys.clone(),
            config.ipgeo_daily_limit,
            usage_store,
        );

        Ok(Self {
            config,
            upstreams,
            caches: ProxyCaches::new(),
            rotator: Arc::new(rotator),
            geo_db: Arc::new(geo_db),
            started_at: Instant::now(),
        })
    }
}

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(routes::health::health))
        // BMKG weather
        .route("/weather-proxy", get(routes::weather::weather_proxy))
        .route("/bmkg/prakiraan-cuaca", get(routes::weather::forecast))
        // food prices
        .route("/pangan-proxy/provinces", get(routes::pangan::provinces))
        .route("/pangan-proxy/cities", get(routes::pangan::cities))
        .route("/pangan-proxy/harga", get(routes::pangan::prices))
        // geolocation
        .route("/location", get(routes::location::locate))
        // AI generation
        .route("/nekolabs/image", get(routes::nekolabs::generate_image))
        .route("/nekolabs/text/gemini", get(routes::nekolabs::generate_text_gemini))
        .route("/nekolabs/text/openai", get(routes::nekolabs::generate_text_openai))
        .route("/nekolabs/chat", post(routes::nekolabs::chat_completion))
        .route("/nekolabs/cors-proxy", get(routes::nekolabs::cors_proxy))
}

/// Full application router with middleware and state attached.
pub fn build_router(state: AppState) -> Router {
    let base = state.config.api_base_uri.trim_matches('/');
    let router = if base.is_empty() {
        api_routes()
    } else {
        Router::new().nest(&format!("/{}", base), api_routes())
    };

    let router =
        router.layer(ServiceBuilder::new().layer(axum::middleware::from_fn(middleware::log_errors)));

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    router.with_state(state)
}
