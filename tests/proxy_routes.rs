//! End-to-end tests for the proxy routes against an in-process fake
//! upstream.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Json, Router,
    body::{Body, Bytes, to_bytes},
    extract::{Path, Query, State},
    http::{Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use pangan_gateway::{
    AppState, build_router,
    config::Config,
    geoip::OfflineGeoDb,
    usage::{MemoryUsageStore, UsageStore, today},
};
use serde_json::{Value, json};
use tower::ServiceExt;

#[derive(Default)]
struct Hits {
    forecast: AtomicUsize,
    provinces: AtomicUsize,
    cities: AtomicUsize,
    prices: AtomicUsize,
    ipgeo: AtomicUsize,
    nekolabs: AtomicUsize,
    gemini: AtomicUsize,
    media: AtomicUsize,
}

type Params = Query<HashMap<String, String>>;

async fn fake_forecast(State(hits): State<Arc<Hits>>, Query(q): Params) -> Json<Value> {
    hits.forecast.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "lokasi": { "adm4": q.get("adm4") },
        "data": [{
            "lokasi": { "desa": "Gambir", "kecamatan": "Gambir", "kota": "Jakarta Pusat" },
            "cuaca": [[{ "t": 31, "hu": 66, "weather_desc": "Cerah Berawan" }]]
        }]
    }))
}

async fn slow_forecast() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Json(json!({ "data": [] }))
}

async fn fake_provinces(State(hits): State<Arc<Hits>>, Query(q): Params) -> Json<Value> {
    hits.provinces.fetch_add(1, Ordering::SeqCst);
    let search = q.get("search").cloned().unwrap_or_default();
    Json(json!({ "data": [{ "id": 31, "name": format!("DKI Jakarta{}", search) }] }))
}

async fn fake_cities(State(hits): State<Arc<Hits>>, Query(q): Params) -> Json<Value> {
    hits.cities.fetch_add(1, Ordering::SeqCst);
    let province = q.get("province_id").cloned().unwrap_or_default();
    Json(json!({
        "data": { "data": [
            { "id": format!("{}01", province), "name": "Kab. Simeulue" },
            { "id": format!("{}02", province), "name": "Kab. Aceh Singkil" }
        ]}
    }))
}

async fn fake_prices(State(hits): State<Arc<Hits>>, Query(q): Params) -> impl IntoResponse {
    hits.prices.fetch_add(1, Ordering::SeqCst);
    if q.get("level_harga_id").map(String::as_str) == Some("500") {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "message": "maintenance" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({ "data": [{ "komoditas": "Beras Medium", "harga": 13250, "query": q }] })),
    )
}

async fn fake_ipgeo(State(hits): State<Arc<Hits>>, Query(q): Params) -> impl IntoResponse {
    hits.ipgeo.fetch_add(1, Ordering::SeqCst);
    if q.get("apiKey").map(String::as_str) == Some("bad-key") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Provided API key is not valid" })),
        );
    }
    let ip = q.get("ip").cloned().unwrap_or_default();
    if ip == "9.9.9.9" {
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
    (
        StatusCode::OK,
        Json(json!({
            "ip": ip,
            "location": {
                "continent_code": "NA",
                "continent_name": "North America",
                "country_code2": "US",
                "country_code3": "USA",
                "country_name": "United States",
                "state_prov": "California",
                "city": "Mountain View",
                "latitude": "37.42240",
                "longitude": "-122.08421"
            },
            "country_metadata": { "calling_code": "+1", "tld": ".us", "languages": ["en-US"] },
            "currency": { "code": "USD", "name": "US Dollar", "symbol": "$" }
        })),
    )
}

async fn fake_nekolabs(State(hits): State<Arc<Hits>>, Query(q): Params) -> Json<Value> {
    hits.nekolabs.fetch_add(1, Ordering::SeqCst);
    if q.get("prompt").map(String::as_str) == Some("slow") {
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    Json(json!({ "success": true, "result": "https://cdn.example/image.png", "echo": q }))
}

async fn fake_neko_text(State(hits): State<Arc<Hits>>, Query(q): Params) -> Json<Value> {
    hits.nekolabs.fetch_add(1, Ordering::SeqCst);
    let text = q.get("text").cloned().unwrap_or_default();
    Json(json!({ "success": true, "result": format!("echo: {}", text), "echo": q }))
}

async fn fake_neko_overloaded(State(hits): State<Arc<Hits>>) -> impl IntoResponse {
    hits.nekolabs.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "model overloaded" })),
    )
}

async fn fake_neko_rate_limited(State(hits): State<Arc<Hits>>) -> impl IntoResponse {
    hits.nekolabs.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({ "error": "rate limited" })),
    )
}

async fn fake_gemini(
    State(hits): State<Arc<Hits>>,
    Path(action): Path<String>,
    Query(q): Params,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    hits.gemini.fetch_add(1, Ordering::SeqCst);
    if q.get("key").map(String::as_str) != Some("gk-test") {
        return (StatusCode::FORBIDDEN, Json(json!({ "error": "bad key" })));
    }
    let contents = body["contents"].as_array().cloned().unwrap_or_default();
    let roles: Vec<&str> = contents.iter().filter_map(|c| c["role"].as_str()).collect();
    (
        StatusCode::OK,
        Json(json!({
            "candidates": [{ "content": { "parts": [{ "text": format!("{} {}", action, roles.join(",")) }] } }],
            "usageMetadata": { "promptTokenCount": contents.len() }
        })),
    )
}

const IMAGE_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

async fn fake_media(State(hits): State<Arc<Hits>>, Path(file): Path<String>) -> Response {
    hits.media.fetch_add(1, Ordering::SeqCst);
    match file.as_str() {
        "cat.webp" => ([(header::CONTENT_TYPE, "image/webp")], IMAGE_BYTES).into_response(),
        _ => (StatusCode::NOT_FOUND, "no such image").into_response(),
    }
}

async fn spawn_upstream() -> (SocketAddr, Arc<Hits>) {
    let hits = Arc::new(Hits::default());
    let app = Router::new()
        .route("/publik/prakiraan-cuaca", get(fake_forecast))
        .route("/slow/prakiraan-cuaca", get(slow_forecast))
        .route("/api/provinces", get(fake_provinces))
        .route("/api/cities", get(fake_cities))
        .route("/api/front/harga-pangan-informasi", get(fake_prices))
        .route("/v2/ipgeo", get(fake_ipgeo))
        .route("/neko/image-generation/imagen/4.0-fast", get(fake_nekolabs))
        .route("/neko/text-generation/gemini/2.5-flash/v1", get(fake_neko_text))
        .route("/neko/text-generation/gemini/2.5-flash/v2", get(fake_neko_overloaded))
        .route("/neko/text-generation/openai/o3", get(fake_neko_rate_limited))
        .route("/google/v1beta/models/{action}", post(fake_gemini))
        .route("/media/{file}", get(fake_media))
        .with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hits)
}

fn config_for(addr: SocketAddr) -> Config {
    Config {
        bmkg_api_base: format!("http://{}/publik", addr),
        pangan_api_base: format!("http://{}/api", addr),
        ipgeo_api_base: format!("http://{}/v2", addr),
        nekolabs_api_base: format!("http://{}/neko", addr),
        gemini_api_base: format!("http://{}/google/v1beta", addr),
        ipgeo_api_keys: vec!["key-a".into(), "key-b".into(), "key-c".into()],
        ipgeo_daily_limit: 1000,
        ..Config::default()
    }
}

const GEO_DATASET: &str = "\
8.8.8.0,8.8.8.255,US,CA,Mountain View,37.386,-122.0838,807,1000
160.22.134.0,160.22.134.255,ID,JK,Jakarta,-6.1744,106.8294,,50
";

struct TestApp {
    addr: SocketAddr,
    router: Router,
    store: Arc<MemoryUsageStore>,
    hits: Arc<Hits>,
}

async fn test_app_with(configure: impl FnOnce(&mut Config)) -> TestApp {
    let (addr, hits) = spawn_upstream().await;
    let mut config = config_for(addr);
    configure(&mut config);

    let store = Arc::new(MemoryUsageStore::new());
    let geo_db = OfflineGeoDb::parse(GEO_DATASET).unwrap();
    let state = AppState::new(config, store.clone(), geo_db).unwrap();

    TestApp {
        addr,
        router: build_router(state),
        store,
        hits,
    }
}

async fn test_app() -> TestApp {
    test_app_with(|_| {}).await
}

impl TestApp {
    async fn get(&self, uri: &str) -> (StatusCode, Bytes) {
        self.request(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn request(&self, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = self.send(request).await;
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body)
    }

    async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let (status, body) = self.get(uri).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, body) = self.request(request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn pool(&self) -> Vec<String> {
        vec!["key-a".into(), "key-b".into(), "key-c".into()]
    }
}

#[tokio::test]
async fn location_uses_live_api_and_counts_usage() {
    let app = test_app().await;

    let (status, body) = app.get_json("/location?ip=8.8.8.8").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "Feature");
    assert_eq!(body["geometry"]["coordinates"], json!([-122.08421, 37.4224]));
    assert_eq!(body["properties"]["provider"], "ipgeolocation.io");
    assert_eq!(body["properties"]["ip"], "8.8.8.8");

    let key_used = body["properties"]["meta"]["api_key_used"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(app.pool().contains(&key_used));

    let usage = app.store.read_usage(&app.pool(), today()).await.unwrap();
    assert_eq!(usage.get(&key_used), Some(&1));
    assert_eq!(usage.values().sum::<i64>(), 1);
}

#[tokio::test]
async fn location_rotates_to_least_used_key() {
    let app = test_app().await;
    app.store.set_usage("key-a", today(), 7);
    app.store.set_usage("key-b", today(), 3);
    app.store.set_usage("key-c", today(), 5);

    let (_, body) = app.get_json("/location?ip=8.8.8.8").await;
    assert_eq!(body["properties"]["meta"]["api_key_used"], "key-b");
    assert_eq!(app.store.record("key-b", today()).unwrap().usage_count, 4);
}

#[tokio::test]
async fn exhausted_quota_answers_429_with_offline_feature() {
    let app = test_app().await;
    for key in app.pool() {
        app.store.set_usage(&key, today(), 1000);
    }

    let (status, body) = app.get_json("/location?ip=8.8.8.8").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "Daily quota exhausted for all API keys");

    let fallback = &body["fallback"];
    assert_eq!(fallback["type"], "Feature");
    assert_eq!(fallback["geometry"]["type"], "Point");
    assert_eq!(fallback["geometry"]["coordinates"], json!([-122.0838, 37.386]));
    assert_eq!(fallback["properties"]["provider"], "geoip-lite");
    assert_eq!(fallback["properties"]["network"], "8.8.8.0-8.8.8.255");
    assert!(fallback["properties"]["meta"].get("api_key_used").is_none());

    assert_eq!(app.hits.ipgeo.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn upstream_failure_falls_back_without_consuming_quota() {
    let app = test_app_with(|config| config.ipgeo_api_keys = vec!["bad-key".into()]).await;

    let (status, body) = app.get_json("/location?ip=160.22.134.39").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["properties"]["provider"], "geoip-lite");
    assert_eq!(body["properties"]["meta"]["api_key_used"], "bad-key");
    assert_eq!(body["properties"]["country"]["name"], "Indonesia");
    assert_eq!(body["properties"]["timezone"], "Asia/Jakarta");

    assert_eq!(app.hits.ipgeo.load(Ordering::SeqCst), 1);
    assert!(app.store.record("bad-key", today()).is_none());
}

#[tokio::test]
async fn loopback_callers_are_located_as_the_substitute_ip() {
    let app = test_app().await;

    let request = Request::builder()
        .uri("/location")
        .header("x-real-ip", "127.0.0.1")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.request(request).await;
    let body: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["properties"]["ip"], "160.22.134.39");
}

#[tokio::test]
async fn repeated_city_lookups_hit_upstream_once() {
    let app = test_app().await;

    let (first_status, first) = app.get("/pangan-proxy/cities?province_id=11").await;
    let (second_status, second) = app.get("/pangan-proxy/cities?province_id=11").await;

    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(first, second);
    assert_eq!(app.hits.cities.load(Ordering::SeqCst), 1);

    let cities: Value = serde_json::from_slice(&first).unwrap();
    assert_eq!(cities[0]["id"], "1101");
}

#[tokio::test]
async fn city_lookup_accepts_camel_case_alias() {
    let app = test_app().await;

    app.get("/pangan-proxy/cities?provinceId=11").await;
    let (status, _) = app.get("/pangan-proxy/cities?province_id=11").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.hits.cities.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn city_lookup_requires_province() {
    let app = test_app().await;

    let (status, body) = app.get_json("/pangan-proxy/cities").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "province_id parameter is required");
    assert_eq!(app.hits.cities.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn provinces_are_cached_per_search_term() {
    let app = test_app().await;

    let (_, all) = app.get_json("/pangan-proxy/provinces").await;
    app.get("/pangan-proxy/provinces?search=").await;
    let (_, filtered) = app.get_json("/pangan-proxy/provinces?search=X").await;

    assert_eq!(all, json!([{ "id": 31, "name": "DKI Jakarta" }]));
    assert_eq!(filtered[0]["name"], "DKI JakartaX");
    assert_eq!(app.hits.provinces.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn price_cache_ignores_order_and_empty_params() {
    let app = test_app().await;

    let (status, _) = app
        .get("/pangan-proxy/harga?level_harga_id=3&province_id=&komoditas_id=27")
        .await;
    assert_eq!(status, StatusCode::OK);
    app.get("/pangan-proxy/harga?komoditas_id=27&level_harga_id=3")
        .await;

    assert_eq!(app.hits.prices.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn price_lookup_requires_level() {
    let app = test_app().await;

    let (status, body) = app.get_json("/pangan-proxy/harga?province_id=31").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "level_harga_id parameter is required");
}

#[tokio::test]
async fn upstream_errors_pass_through_and_are_not_cached() {
    let app = test_app().await;

    let (status, body) = app.get_json("/pangan-proxy/harga?level_harga_id=500").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({ "message": "maintenance" }));

    app.get("/pangan-proxy/harga?level_harga_id=500").await;
    assert_eq!(app.hits.prices.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn weather_summary_and_raw_forecast_share_the_cache() {
    let app = test_app().await;

    let (status, summary) = app.get_json("/weather-proxy?adm4=31.71.01.1001").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["location"], "Gambir, Gambir, Jakarta Pusat");
    assert_eq!(summary["temperature"], 31.0);
    assert_eq!(summary["humidity"], 66.0);
    assert_eq!(summary["weather"], "Cerah Berawan");
    assert!(summary["timestamp"].is_string());

    let (status, raw) = app.get_json("/bmkg/prakiraan-cuaca?adm4=31.71.01.1001").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(raw["lokasi"]["adm4"], "31.71.01.1001");

    assert_eq!(app.hits.forecast.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn weather_requires_region_code() {
    let app = test_app().await;

    let (status, body) = app.get_json("/weather-proxy").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "adm4 parameter is required");
}

#[tokio::test]
async fn slow_upstream_times_out_with_408() {
    let app = test_app_with(|config| {
        config.bmkg_api_base = config.bmkg_api_base.replace("/publik", "/slow");
        config.bmkg_timeout_ms = 200;
    })
    .await;

    let (status, body) = app.get_json("/weather-proxy?adm4=31.71.01.1001").await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(body["error"], "Request timeout");
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() {
    let app = test_app_with(|config| {
        config.bmkg_api_base = "http://127.0.0.1:9/publik".into();
    })
    .await;

    let (status, body) = app.get_json("/weather-proxy?adm4=31.71.01.1001").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["status"], 502);
}

#[tokio::test]
async fn image_generation_validates_and_forwards() {
    let app = test_app().await;

    let (status, _) = app.get_json("/nekolabs/image").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.get_json("/nekolabs/image?prompt=sawah&ratio=2:1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.hits.nekolabs.load(Ordering::SeqCst), 0);

    let (status, body) = app.get_json("/nekolabs/image?prompt=sawah").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["echo"]["prompt"], "sawah");
    assert_eq!(body["echo"]["ratio"], "1:1");
}

#[tokio::test]
async fn health_reports_store_and_cache_sizes() {
    let app = test_app().await;
    app.get("/pangan-proxy/cities?province_id=11").await;

    let (status, body) = app.get_json("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["usage_store"], "memory");
    assert_eq!(body["cache_entries"]["cities"], 1);
    assert_eq!(body["cache_entries"]["weather"], 0);
}

#[tokio::test]
async fn routes_are_nested_under_the_base_uri() {
    let app = test_app_with(|config| config.api_base_uri = "/pajar/".into()).await;

    let (status, _) = app.get("/pajar/health").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get("/health").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn abandoned_location_request_still_counts_usage() {
    let app = test_app().await;
    let request = Request::builder()
        .uri("/location?ip=9.9.9.9")
        .body(Body::empty())
        .unwrap();

    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), app.router.clone().oneshot(request)).await;
    assert!(abandoned.is_err());

    let mut recorded = 0;
    for _ in 0..40 {
        let usage = app.store.read_usage(&app.pool(), today()).await.unwrap();
        recorded = usage.values().sum::<i64>();
        if recorded > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert_eq!(recorded, 1);
    assert_eq!(app.hits.ipgeo.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn weather_ignores_empty_params() {
    let app = test_app().await;

    let (status, _) = app.get("/weather-proxy?adm4=31.71.01.1001&kode=").await;
    assert_eq!(status, StatusCode::OK);
    app.get("/bmkg/prakiraan-cuaca?kode=&adm4=31.71.01.1001").await;
    app.get("/bmkg/prakiraan-cuaca?adm4=31.71.01.1001").await;

    assert_eq!(app.hits.forecast.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn gemini_text_generation_forwards_options() {
    let app = test_app().await;

    let (status, body) = app
        .get_json("/nekolabs/text/gemini?text=halo&systemPrompt=singkat&imageUrl=")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "echo: halo");
    assert_eq!(body["echo"], json!({ "text": "halo", "systemPrompt": "singkat" }));

    let (status, _) = app.get_json("/nekolabs/text/gemini?text=halo&version=v3").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn openai_text_generation_passes_upstream_status_through() {
    let app = test_app().await;

    let (status, body) = app.get_json("/nekolabs/text/openai?text=halo").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body, json!({ "error": "rate limited" }));
}

#[tokio::test]
async fn slow_image_generation_times_out_with_408() {
    let app = test_app_with(|config| config.nekolabs_timeout_ms = 200).await;

    let (status, body) = app.get_json("/nekolabs/image?prompt=slow").await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(body["error"], "Request timeout");
}

fn conversation(version: &str) -> Value {
    json!({
        "version": version,
        "messages": [
            { "role": "user", "content": "harga cabai?" },
            { "role": "assistant", "content": "Rp 45.000/kg" },
            { "role": "user", "content": "kalau bawang merah?" }
        ]
    })
}

#[tokio::test]
async fn chat_prefers_nekolabs() {
    let app = test_app_with(|config| config.gemini_api_key = Some("gk-test".into())).await;

    let (status, body) = app.post_json("/nekolabs/chat", conversation("v1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "nekolabs");
    assert_eq!(body["version"], "v1");
    assert_eq!(body["result"], "echo: kalau bawang merah?");
    assert_eq!(app.hits.gemini.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn chat_falls_back_to_gemini() {
    let app = test_app_with(|config| config.gemini_api_key = Some("gk-test".into())).await;

    let (status, body) = app.post_json("/nekolabs/chat", conversation("v2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "google-gemini");
    assert_eq!(body["model"], "gemini-2.5-flash");
    assert_eq!(body["result"], "gemini-2.5-flash:generateContent user,model,user");
    assert_eq!(body["usage"]["promptTokenCount"], 3);

    assert_eq!(app.hits.nekolabs.load(Ordering::SeqCst), 1);
    assert_eq!(app.hits.gemini.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn chat_without_fallback_key_surfaces_nekolabs_error() {
    let app = test_app().await;

    let (status, body) = app.post_json("/nekolabs/chat", conversation("v2")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({ "error": "model overloaded" }));
    assert_eq!(app.hits.gemini.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn chat_requires_a_user_turn() {
    let app = test_app().await;

    let (status, body) = app.post_json("/nekolabs/chat", json!({ "messages": [] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "messages parameter is required");

    let only_assistant = json!({ "messages": [{ "role": "assistant", "content": "halo" }] });
    let (status, _) = app.post_json("/nekolabs/chat", only_assistant).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.hits.nekolabs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cors_proxy_relays_image_bytes() {
    let app = test_app().await;
    let uri = format!("/nekolabs/cors-proxy?url=http://{}/media/cat.webp", app.addr);

    let response = app
        .send(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "image/webp");
    assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=86400");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], IMAGE_BYTES);
}

#[tokio::test]
async fn cors_proxy_validates_and_passes_failures_through() {
    let app = test_app().await;

    let (status, _) = app.get("/nekolabs/cors-proxy").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.get("/nekolabs/cors-proxy?url=ftp://example.com/a.png").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.hits.media.load(Ordering::SeqCst), 0);

    let missing = format!("/nekolabs/cors-proxy?url=http://{}/media/gone.png", app.addr);
    let (status, body) = app.get_json(&missing).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "no such image", "status": 404 }));
}
