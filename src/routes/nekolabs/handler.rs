use axum::{
    Json,
    extract::{Query, State},
    http::header,
    response::IntoResponse,
};
use serde_json::Value;

use crate::AppState;
use crate::error::ProxyError;

use super::model::{
    ChatRequest, GenerationRequest, ImageQuery, MediaQuery, TextQuery, gemini_chat_response,
    nekolabs_chat_response,
};

const MEDIA_CACHE_CONTROL: &str = "public, max-age=86400";

async fn forward(state: &AppState, request: GenerationRequest) -> Result<Json<Value>, ProxyError> {
    let payload = state
        .upstreams
        .nekolabs
        .get_json(&request.path, &request.params)
        .await?;
    Ok(Json(payload))
}

#[axum::debug_handler]
pub async fn generate_image(
    State(state): State<AppState>,
    Query(query): Query<ImageQuery>,
) -> Result<impl IntoResponse, ProxyError> {
    forward(&state, query.into_request()?).await
}

#[axum::debug_handler]
pub async fn generate_text_gemini(
    State(state): State<AppState>,
    Query(query): Query<TextQuery>,
) -> Result<impl IntoResponse, ProxyError> {
    forward(&state, query.into_gemini_request()?).await
}

#[axum::debug_handler]
pub async fn generate_text_openai(
    State(state): State<AppState>,
    Query(query): Query<TextQuery>,
) -> Result<impl IntoResponse, ProxyError> {
    forward(&state, query.into_openai_request()?).await
}

/// Chat through nekolabs; when that fails and a Google key is configured,
/// the whole conversation is retried against Gemini `generateContent`.
#[axum::debug_handler]
pub async fn chat_completion(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, ProxyError> {
    let text = request.last_user_text()?;
    let primary = request.nekolabs_request(text);

    let err = match state
        .upstreams
        .nekolabs
        .get_json(&primary.path, &primary.params)
        .await
    {
        Ok(payload) => return Ok(Json(nekolabs_chat_response(request.version(), payload))),
        Err(e) => e,
    };

    let Some(api_key) = state.config.gemini_api_key.as_deref() else {
        tracing::warn!("nekolabs chat failed and no Gemini key is set: {}", err);
        return Err(err);
    };
    tracing::warn!("nekolabs chat failed, falling back to Gemini: {}", err);

    let model = request.gemini_model();
    let payload = state
        .upstreams
        .gemini
        .post_json(
            &format!("models/{}:generateContent", model),
            &[("key", api_key)],
            &request.gemini_payload(),
        )
        .await?;

    Ok(Json(gemini_chat_response(model, &payload)))
}

/// Relays an image so browsers can load it cross-origin.
#[axum::debug_handler]
pub async fn cors_proxy(
    State(state): State<AppState>,
    Query(query): Query<MediaQuery>,
) -> Result<impl IntoResponse, ProxyError> {
    let url = query.into_target()?;
    let (content_type, bytes) = state.upstreams.media.get_bytes(url).await?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                content_type.unwrap_or_else(|| "image/png".to_string()),
            ),
            (header::CACHE_CONTROL, MEDIA_CACHE_CONTROL.to_string()),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*".to_string()),
        ],
        bytes,
    ))
}
