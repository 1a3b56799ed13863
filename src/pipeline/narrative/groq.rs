use serde::{Deserialize, Serialize};

use super::types::TextCompletion;
use super::NarrativeError;

const PROVIDER: &str = "Groq";

/// Groq client over its OpenAI-compatible chat completions endpoint.
pub struct GroqClient {
    base_url: String,
    api_key: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl GroqClient {
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Self {
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
            client,
            timeout_secs,
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> NarrativeError {
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
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Request body for /chat/completions
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

/// Response body from /chat/completions
#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn first_choice_text(response: ChatResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

impl TextCompletion for GroqClient {
    fn complete_text(&self, model: &str, system: &str, user: &str) -> Result<String, NarrativeError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(NarrativeError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().map_err(|e| NarrativeError::ResponseParsing {
            provider: PROVIDER,
            detail: e.to_string(),
        })?;

        first_choice_text(parsed).ok_or_else(|| NarrativeError::EmptyResponse(format!("{PROVIDER} ({model})")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_trims_trailing_slash() {
        let client = GroqClient::new("https://api.groq.com/openai/v1/", "k", 30);
        assert_eq!(client.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(client.timeout_secs, 30);
    }

    #[test]
    fn request_serializes_system_then_user() {
        let body = ChatRequest {
            model: "llama",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "S",
                },
                ChatMessage {
                    role: "user",
                    content: "U",
                },
            ],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "llama");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "U");
    }

    #[test]
    fn first_choice_is_trimmed() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"  Narrative.  "}}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice_text(parsed).as_deref(), Some("Narrative."));
    }

    #[test]
    fn missing_or_blank_content_is_empty() {
        let none: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(first_choice_text(none).is_none());
        let blank: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"  "}}]}"#).unwrap();
        assert!(first_choice_text(blank).is_none());
        let null: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert!(first_choice_text(null).is_none());
    }

    #[test]
    fn unreachable_host_is_a_connection_error() {
        let client = GroqClient::new("http://127.0.0.1:9", "k", 2);
        let err = client.complete_text("m", "s", "u").unwrap_err();
        assert!(matches!(
            err,
            NarrativeError::Connection { .. } | NarrativeError::Timeout { .. } | NarrativeError::HttpClient(_)
        ));
    }
}
