use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use super::NarrativeError;

// ═══════════════════════════════════════════════════════════
// Provider capabilities
// ═══════════════════════════════════════════════════════════

/// Chat-style text generation: one system message, one user message.
pub trait TextCompletion {
    fn complete_text(&self, model: &str, system: &str, user: &str) -> Result<String, NarrativeError>;
}

/// One ordered request of text and image parts.
pub trait MultimodalCompletion {
    fn complete_multimodal(&self, parts: &[PromptPart]) -> Result<MultimodalReply, NarrativeError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    Text(String),
    Image { mime_type: String, bytes: Vec<u8> },
}

impl PromptPart {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Image { .. } => None,
        }
    }
}

/// A multimodal answer, or a refusal by the provider's safety filter.
#[derive(Debug, Clone, PartialEq)]
pub enum MultimodalReply {
    Text(String),
    Blocked { reason: Option<String> },
}

// ═══════════════════════════════════════════════════════════
// Clinical inputs
// ═══════════════════════════════════════════════════════════

str_enum!(
    /// Named exam photographs attached to footprint and integrated reports.
    ImageSlot {
        Front => "front",
        Side => "side",
        PostureExtra => "posture_extra",
        FeetFrontal => "feet_frontal",
        FeetRear => "feet_rear",
        Footprint => "footprint",
    }
);

impl ImageSlot {
    /// Attachment order for the integrated report.
    pub const INTEGRATED_ORDER: [ImageSlot; 6] = [
        Self::Front,
        Self::Side,
        Self::PostureExtra,
        Self::FeetFrontal,
        Self::FeetRear,
        Self::Footprint,
    ];

    /// The three foot images a footprint report needs, in attachment order.
    pub const FOOT_ORDER: [ImageSlot; 3] = [Self::FeetFrontal, Self::FeetRear, Self::Footprint];

    pub fn caption(&self) -> &'static str {
        match self {
            Self::Front => "FRONT",
            Self::Side => "SIDE",
            Self::PostureExtra => "POSTURE EXTRA",
            Self::FeetFrontal => "FEET FRONTAL VIEW",
            Self::FeetRear => "FEET REAR VIEW",
            Self::Footprint => "PLANTAR FOOTPRINT",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientSummary {
    pub first_name: String,
    pub last_name: String,
}

impl PatientSummary {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

/// Structured intake form, already resolved from form codes to text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnamnesisIntake {
    pub chief_complaint: Option<String>,
    /// Severity on the 0-10 Borg scale, as entered.
    pub severity: Option<String>,
    pub duration: Option<String>,
    pub onset: Option<String>,
    pub attributed_cause: Option<String>,
    pub pain_types: Vec<String>,
    pub peak_times: Vec<String>,
    pub aggravating_factors: Option<String>,
    pub relieving_factors: Option<String>,
    pub affected_activities: Option<String>,
}

/// Exam data attached to an integrated report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExamResults {
    /// Orthopedic and neurological test notes.
    pub notes: Option<String>,
    pub image_paths: std::collections::BTreeMap<ImageSlot, String>,
}

// ═══════════════════════════════════════════════════════════
// Mocks (testing)
// ═══════════════════════════════════════════════════════════

/// Scripted behavior for one mock call.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Fail(String),
    Blocked(Option<String>),
}

impl MockReply {
    fn into_text(self, provider: &str) -> Result<String, NarrativeError> {
        match self {
            Self::Text(t) => Ok(t),
            Self::Fail(msg) => Err(NarrativeError::HttpClient(msg)),
            Self::Blocked(_) => Err(NarrativeError::EmptyResponse(provider.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPrompt {
    pub model: String,
    pub system: String,
    pub user: String,
}

/// Text provider double with per-model replies that records every prompt.
pub struct MockTextCompletion {
    default: MockReply,
    per_model: Vec<(String, MockReply)>,
    calls: RefCell<Vec<RecordedPrompt>>,
}

impl MockTextCompletion {
    pub fn replying(text: &str) -> Self {
        Self::with_default(MockReply::Text(text.to_string()))
    }

    pub fn failing() -> Self {
        Self::with_default(MockReply::Fail("mock provider failure".into()))
    }

    fn with_default(default: MockReply) -> Self {
        Self {
            default,
            per_model: Vec::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Override the reply for one model identifier.
    pub fn with_model_reply(mut self, model: &str, reply: MockReply) -> Self {
        self.per_model.push((model.to_string(), reply));
        self
    }

    pub fn calls(&self) -> Vec<RecordedPrompt> {
        self.calls.borrow().clone()
    }
}

impl TextCompletion for MockTextCompletion {
    fn complete_text(&self, model: &str, system: &str, user: &str) -> Result<String, NarrativeError> {
        self.calls.borrow_mut().push(RecordedPrompt {
            model: model.to_string(),
            system: system.to_string(),
            user: user.to_string(),
        });
        let reply = self
            .per_model
            .iter()
            .find(|(m, _)| m == model)
            .map(|(_, r)| r.clone())
            .unwrap_or_else(|| self.default.clone());
        reply.into_text("mock text provider")
    }
}

/// Text + multimodal provider double that records prompts and parts.
pub struct MockMultimodal {
    text_reply: MockReply,
    multimodal_reply: MockReply,
    text_calls: RefCell<Vec<RecordedPrompt>>,
    multimodal_calls: RefCell<Vec<Vec<PromptPart>>>,
}

impl MockMultimodal {
    pub fn replying(text: &str) -> Self {
        Self::new(MockReply::Text(text.to_string()), MockReply::Text(text.to_string()))
    }

    pub fn failing() -> Self {
        let fail = MockReply::Fail("mock multimodal failure".into());
        Self::new(fail.clone(), fail)
    }

    pub fn blocked(reason: Option<&str>) -> Self {
        Self::new(
            MockReply::Fail("mock multimodal failure".into()),
            MockReply::Blocked(reason.map(String::from)),
        )
    }

    pub fn new(text_reply: MockReply, multimodal_reply: MockReply) -> Self {
        Self {
            text_reply,
            multimodal_reply,
            text_calls: RefCell::new(Vec::new()),
            multimodal_calls: RefCell::new(Vec::new()),
        }
    }

    pub fn text_calls(&self) -> Vec<RecordedPrompt> {
        self.text_calls.borrow().clone()
    }

    pub fn multimodal_calls(&self) -> Vec<Vec<PromptPart>> {
        self.multimodal_calls.borrow().clone()
    }
}

impl TextCompletion for MockMultimodal {
    fn complete_text(&self, model: &str, system: &str, user: &str) -> Result<String, NarrativeError> {
        self.text_calls.borrow_mut().push(RecordedPrompt {
            model: model.to_string(),
            system: system.to_string(),
            user: user.to_string(),
        });
        self.text_reply.clone().into_text("mock multimodal provider")
    }
}

impl MultimodalCompletion for MockMultimodal {
    fn complete_multimodal(&self, parts: &[PromptPart]) -> Result<MultimodalReply, NarrativeError> {
        self.multimodal_calls.borrow_mut().push(parts.to_vec());
        match self.multimodal_reply.clone() {
            MockReply::Text(t) => Ok(MultimodalReply::Text(t)),
            MockReply::Fail(msg) => Err(NarrativeError::HttpClient(msg)),
            MockReply::Blocked(reason) => Ok(MultimodalReply::Blocked { reason }),
        }
    }
}
