use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::ProxyError;

pub const IMAGE_RATIOS: [&str; 5] = ["1:1", "16:9", "3:4", "4:3", "9:16"];
pub const IMAGE_VERSIONS: [&str; 2] = ["3.0", "4.0"];
pub const GEMINI_VERSIONS: [&str; 2] = ["v1", "v2"];
const GEMINI_FLASH: &str = "gemini-2.5-flash";
const GEMINI_FLASH_LITE: &str = "gemini-2.5-flash-lite";

#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    pub prompt: Option<String>,
    pub ratio: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextQuery {
    pub text: Option<String>,
    pub system_prompt: Option<String>,
    pub image_url: Option<String>,
    pub session_id: Option<String>,
    pub version: Option<String>,
}

/// Validated upstream request: a path and the query to send with it.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub path: String,
    pub params: Vec<(&'static str, String)>,
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ProxyError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ProxyError::MissingParameter(name))
}

fn one_of(
    value: Option<String>,
    default: &str,
    allowed: &[&str],
    name: &str,
) -> Result<String, ProxyError> {
    let value = value.unwrap_or_else(|| default.to_string());
    if allowed.contains(&value.as_str()) {
        Ok(value)
    } else {
        Err(ProxyError::InvalidParameter(format!(
            "invalid {}, expected one of: {}",
            name,
            allowed.join(", ")
        )))
    }
}

impl ImageQuery {
    pub fn into_request(self) -> Result<GenerationRequest, ProxyError> {
        let prompt = required(self.prompt, "prompt")?;
        let ratio = one_of(self.ratio, "1:1", &IMAGE_RATIOS, "ratio")?;
        let version = one_of(self.version, "4.0", &IMAGE_VERSIONS, "version")?;

        Ok(GenerationRequest {
            path: format!("image-generation/imagen/{}-fast", version),
            params: vec![("prompt", prompt), ("ratio", ratio)],
        })
    }
}

impl TextQuery {
    fn params(self, text: String) -> Vec<(&'static str, String)> {
        let mut params = vec![("text", text)];
        let optional = [
            ("systemPrompt", self.system_prompt),
            ("imageUrl", self.image_url),
            ("sessionId", self.session_id),
        ];
        params.extend(
            optional
                .into_iter()
                .filter_map(|(name, value)| value.filter(|v| !v.is_empty()).map(|v| (name, v))),
        );
        params
    }

    pub fn into_gemini_request(mut self) -> Result<GenerationRequest, ProxyError> {
        let text = required(self.text.take(), "text")?;
        let version = one_of(self.version.take(), "v1", &GEMINI_VERSIONS, "version")?;

        Ok(GenerationRequest {
            path: format!("text-generation/gemini/2.5-flash/{}", version),
            params: self.params(text),
        })
    }

    pub fn into_openai_request(mut self) -> Result<GenerationRequest, ProxyError> {
        let text = required(self.text.take(), "text")?;

        Ok(GenerationRequest {
            path: "text-generation/openai/o3".into(),
            params: self.params(text),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Body of `POST /nekolabs/chat`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub session_id: Option<String>,
    pub version: Option<String>,
}

impl ChatRequest {
    /// The nekolabs endpoint only takes one prompt: the latest user turn.
    pub fn last_user_text(&self) -> Result<&str, ProxyError> {
        if self.messages.is_empty() {
            return Err(ProxyError::MissingParameter("messages"));
        }
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .ok_or_else(|| {
                ProxyError::InvalidParameter("at least one user message is required".into())
            })
    }

    /// Unknown versions fall back to `v1` instead of failing the chat.
    pub fn version(&self) -> &str {
        match self.version.as_deref() {
            Some(v) if GEMINI_VERSIONS.contains(&v) => v,
            _ => GEMINI_VERSIONS[0],
        }
    }

    pub fn nekolabs_request(&self, text: &str) -> GenerationRequest {
        let mut params = vec![("text", text.to_string())];
        let optional = [
            ("systemPrompt", &self.system_prompt),
            ("sessionId", &self.session_id),
        ];
        params.extend(optional.into_iter().filter_map(|(name, value)| {
            value
                .as_ref()
                .filter(|v| !v.is_empty())
                .map(|v| (name, v.clone()))
        }));

        GenerationRequest {
            path: format!("text-generation/gemini/2.5-flash/{}", self.version()),
            params,
        }
    }

    pub fn gemini_model(&self) -> &'static str {
        match self.model.as_deref() {
            Some(GEMINI_FLASH_LITE) => GEMINI_FLASH_LITE,
            _ => GEMINI_FLASH,
        }
    }

    /// `generateContent` payload carrying the whole conversation.
    pub fn gemini_payload(&self) -> Value {
        let contents: Vec<Value> = self
            .messages
            .iter()
            .map(|m| {
                let role = if m.role == "assistant" { "model" } else { m.role.as_str() };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut payload = json!({
            "contents": contents,
            "generationConfig": { "temperature": 0.7, "maxOutputTokens": 2048 },
        });
        if let Some(prompt) = self.system_prompt.as_ref().filter(|p| !p.is_empty()) {
            payload["systemInstruction"] = json!({ "parts": [{ "text": prompt }] });
        }
        payload
    }
}

/// Upstream fields win over the envelope ones.
pub fn nekolabs_chat_response(version: &str, payload: Value) -> Value {
    let mut body = Map::new();
    body.insert("success".into(), Value::Bool(true));
    body.insert("source".into(), "nekolabs".into());
    body.insert("version".into(), version.into());
    match payload {
        Value::Object(fields) => body.extend(fields),
        other => {
            body.insert("result".into(), other);
        }
    }
    Value::Object(body)
}

pub fn gemini_chat_response(model: &str, payload: &Value) -> Value {
    let text = payload
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .unwrap_or_default();

    json!({
        "success": true,
        "source": "google-gemini",
        "model": model,
        "result": text,
        "usage": payload.get("usageMetadata").cloned().unwrap_or(Value::Null),
    })
}

#[derive(Debug, Deserialize)]
pub struct MediaQuery {
    pub url: Option<String>,
}

impl MediaQuery {
    pub fn into_target(self) -> Result<Url, ProxyError> {
        let raw = required(self.url, "url")?;
        let url = Url::parse(raw.trim())
            .map_err(|_| ProxyError::InvalidParameter("invalid url".into()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            _ => Err(ProxyError::InvalidParameter(
                "url must use http or https".into(),
            )),
        }
    }
}
