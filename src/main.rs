use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use pangan_gateway::{
    AppState, build_router,
    config::Config,
    geoip::OfflineGeoDb,
    usage::{MemoryUsageStore, PgUsageStore, RedisUsageStore, UsageStore},
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn connect_usage_store(config: &Config) -> Arc<dyn UsageStore> {
    if let Some(database_url) = &config.database_url {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("SET application_name = 'pangan_gateway';")
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await
            .expect("Failed to connect to Postgres");

        let store = PgUsageStore::new(pool);
        store
            .migrate()
            .await
            .expect("Failed to create api_key_usage table");
        tracing::info!("Using Postgres for API key usage");
        return Arc::new(store);
    }

    if let Some(redis_url) = &config.redis_url {
        let client = redis::Client::open(redis_url.clone()).expect("Failed to create Redis client");
        tracing::info!("Using Redis for API key usage");
        return Arc::new(RedisUsageStore::new(
            Arc::new(client),
            config.usage_retention(),
        ));
    }

    tracing::warn!("No DATABASE_URL or REDIS_URL set, API key usage is kept in memory");
    Arc::new(MemoryUsageStore::new())
}

fn load_geo_db(config: &Config) -> OfflineGeoDb {
    let Some(path) = &config.geoip_db_path else {
        tracing::warn!("GEOIP_DB_PATH not set, offline geolocation answers will be empty");
        return OfflineGeoDb::empty();
    };

    match OfflineGeoDb::load(path) {
        Ok(db) => {
            tracing::info!("Loaded {} offline geolocation ranges from {}", db.len(), path);
            db
        }
        Err(e) => {
            tracing::error!("Failed to load offline geolocation dataset {}: {}", path, e);
            OfflineGeoDb::empty()
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    if config.ipgeo_api_keys.is_empty() {
        tracing::warn!("IPGEO_API_KEYS is empty, /location will always answer offline");
    }

    let usage_store = connect_usage_store(&config).await;
    let geo_db = load_geo_db(&config);

    let state = AppState::new(config, usage_store, geo_db).expect("Failed to build HTTP clients");

    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );

    let app = build_router(state);

    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
