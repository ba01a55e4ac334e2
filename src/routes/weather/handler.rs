use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};

use crate::AppState;
use crate::error::ProxyError;
use crate::utils::{non_empty_params, require_param};

use super::model::{WeatherSummary, fetch_forecast};

#[axum::debug_handler]
pub async fn weather_proxy(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<impl IntoResponse, ProxyError> {
    let adm4 = require_param(&params, "adm4")?.to_string();
    let forecast = fetch_forecast(&state, non_empty_params(params)).await?;
    Ok(Json(WeatherSummary::from_forecast(&adm4, &forecast)))
}

/// Raw BMKG forecast, shares the cache with `weather_proxy`.
#[axum::debug_handler]
pub async fn forecast(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<impl IntoResponse, ProxyError> {
    require_param(&params, "adm4")?;
    let forecast = fetch_forecast(&state, non_empty_params(params)).await?;
    Ok(Json(forecast))
}
