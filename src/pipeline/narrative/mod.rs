pub mod cascade;
pub mod gemini;
pub mod groq;
pub mod images;
pub mod orchestrator;
pub mod prompt;
pub mod sanitize;
pub mod types;

pub use cascade::*;
pub use gemini::GeminiClient;
pub use groq::GroqClient;
pub use orchestrator::*;
pub use sanitize::{sanitize_report, ERROR_LABEL};
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NarrativeError {
    #[error("{provider} is not reachable at {url}")]
    Connection { provider: &'static str, url: String },

    #[error("{provider} did not answer within {secs}s")]
    Timeout { provider: &'static str, secs: u64 },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("{provider} returned an error (status {status}): {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("The response from {provider} could not be parsed: {detail}")]
    ResponseParsing {
        provider: &'static str,
        detail: String,
    },

    #[error("{0} returned an empty response")]
    EmptyResponse(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("The image {path} could not be attached: {reason}")]
    Image { path: String, reason: String },
}
