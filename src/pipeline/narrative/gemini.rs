use base64::Engine;
use serde::{Deserialize, Serialize};

use super::types::{MultimodalCompletion, MultimodalReply, PromptPart, TextCompletion};
use super::NarrativeError;

const PROVIDER: &str = "Gemini";

/// Gemini client over the REST `generateContent` endpoint. Serves both the
/// secondary text stage and every multimodal report.
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    /// Model used for multimodal requests.
    vision_model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl GeminiClient {
    pub fn new(base_url: &str, api_key: &str, vision_model: &str, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "HTTP client builder failed; using defaults");
                reqwest::blocking::Client::new()
            });

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            vision_model: vision_model.to_string(),
            client,
            timeout_secs,
        }
    }

    fn endpoint(&self, model: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    fn generate(&self, model: &str, request: &GenerateRequest) -> Result<GenerateResponse, NarrativeError> {
        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    NarrativeError::Connection {
                        provider: PROVIDER,
                        url: self.base_url.clone(),
                    }
                } else if e.is_timeout() {
                    NarrativeError::Timeout {
                        provider: PROVIDER,
                        secs: self.timeout_secs,
                    }
                } else {
                    NarrativeError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(NarrativeError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        response.json().map_err(|e| NarrativeError::ResponseParsing {
            provider: PROVIDER,
            detail: e.to_string(),
        })
    }
}

// ── wire types ──

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    inline_data: Option<InlineData>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

fn text_part(text: &str) -> Part {
    Part {
        text: Some(text.to_string()),
        inline_data: None,
    }
}

fn to_wire(part: &PromptPart) -> Part {
    match part {
        PromptPart::Text(t) => text_part(t),
        PromptPart::Image { mime_type, bytes } => Part {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.clone(),
                data: base64::engine::general_purpose::STANDARD.encode(bytes),
            }),
        },
    }
}

/// A response with a block reason, or with no content parts at all, is a
/// safety-filter refusal. Otherwise the text parts are concatenated.
fn interpret(response: GenerateResponse) -> MultimodalReply {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return MultimodalReply::Blocked { reason: Some(reason) };
    }

    let first = response.candidates.into_iter().next();
    let finish_reason = first.as_ref().and_then(|c| c.finish_reason.clone());
    let parts = first
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default();

    if parts.is_empty() {
        tracing::warn!(finish_reason = ?finish_reason, "Gemini response has no parts");
        return MultimodalReply::Blocked {
            reason: finish_reason.filter(|r| r != "STOP"),
        };
    }

    let text: String = parts.into_iter().filter_map(|p| p.text).collect();
    MultimodalReply::Text(text)
}

impl MultimodalCompletion for GeminiClient {
    fn complete_multimodal(&self, parts: &[PromptPart]) -> Result<MultimodalReply, NarrativeError> {
        let request = GenerateRequest {
            system_instruction: None,
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: parts.iter().map(to_wire).collect(),
            }],
        };
        let images = parts
            .iter()
            .filter(|p| matches!(p, PromptPart::Image { .. }))
            .count();
        tracing::info!(model = %self.vision_model, images, "Sending multimodal request");
        self.generate(&self.vision_model, &request).map(interpret)
    }
}

impl TextCompletion for GeminiClient {
    fn complete_text(&self, model: &str, system: &str, user: &str) -> Result<String, NarrativeError> {
        let request = GenerateRequest {
            system_instruction: Some(Content {
                role: None,
                parts: vec![text_part(system)],
            }),
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![text_part(user)],
            }],
        };
        match interpret(self.generate(model, &request)?) {
            MultimodalReply::Text(t) if !t.trim().is_empty() => Ok(t.trim().to_string()),
            _ => Err(NarrativeError::EmptyResponse(format!("{PROVIDER} ({model})"))),
        }
    }
}
