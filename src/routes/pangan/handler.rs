use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};

use crate::AppState;
use crate::error::ProxyError;
use crate::utils::{first_param, non_empty_params, require_param};

use super::model::{fetch_cities, fetch_prices, fetch_provinces};

#[axum::debug_handler]
pub async fn provinces(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<impl IntoResponse, ProxyError> {
    let search = first_param(&params, &["search"]).unwrap_or_default().to_string();
    let provinces = fetch_provinces(&state, search).await?;
    Ok(Json(provinces))
}

#[axum::debug_handler]
pub async fn cities(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<impl IntoResponse, ProxyError> {
    let province_id = first_param(&params, &["province_id", "provinceId"])
        .ok_or(ProxyError::MissingParameter("province_id"))?
        .to_string();
    let cities = fetch_cities(&state, province_id).await?;
    Ok(Json(cities))
}

#[axum::debug_handler]
pub async fn prices(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<impl IntoResponse, ProxyError> {
    require_param(&params, "level_harga_id")?;
    let prices = fetch_prices(&state, non_empty_params(params)).await?;
    Ok(Json(prices))
}
