//! Ordered fallback over text-generation providers.
//!
//! `NotStarted → TryingPrimary(i) → … → ExhaustedPrimary → TryingSecondary →
//! ExhaustedSecondary`. Each stage either yields non-empty text (terminal) or
//! advances; nothing is retried once passed.

use std::time::Instant;

use super::types::TextCompletion;

/// Where the cascade currently is. Used for structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeStage {
    NotStarted,
    TryingPrimary(usize),
    ExhaustedPrimary,
    TryingSecondary,
    ExhaustedSecondary,
}

impl std::fmt::Display for CascadeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => f.write_str("not_started"),
            Self::TryingPrimary(i) => write!(f, "trying_primary[{i}]"),
            Self::ExhaustedPrimary => f.write_str("exhausted_primary"),
            Self::TryingSecondary => f.write_str("trying_secondary"),
            Self::ExhaustedSecondary => f.write_str("exhausted_secondary"),
        }
    }
}

/// Terminal state of one cascade invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum CascadeOutcome {
    Primary { model: String, text: String },
    Secondary { model: String, text: String },
    /// Every stage failed; one entry per attempt, `model: error`.
    Exhausted { failures: Vec<String> },
}

impl CascadeOutcome {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Primary { text, .. } | Self::Secondary { text, .. } => Some(text),
            Self::Exhausted { .. } => None,
        }
    }
}

pub struct FallbackCascade<'a> {
    primary: Option<&'a dyn TextCompletion>,
    primary_models: &'a [String],
    secondary: Option<&'a dyn TextCompletion>,
    secondary_model: &'a str,
}

impl<'a> FallbackCascade<'a> {
    pub fn new(
        primary: Option<&'a dyn TextCompletion>,
        primary_models: &'a [String],
        secondary: Option<&'a dyn TextCompletion>,
        secondary_model: &'a str,
    ) -> Self {
        Self {
            primary,
            primary_models,
            secondary,
            secondary_model,
        }
    }

    /// Run to a terminal state. Never fails: exhaustion is an outcome.
    pub fn run(&self, operation: &str, system: &str, user: &str) -> CascadeOutcome {
        let _span = tracing::info_span!("narrative_cascade", operation).entered();
        let mut failures = Vec::new();
        let mut stage = CascadeStage::NotStarted;
        tracing::debug!(%stage, candidates = self.primary_models.len(), "Cascade started");

        if let Some(primary) = self.primary {
            for (i, model) in self.primary_models.iter().enumerate() {
                stage = CascadeStage::TryingPrimary(i);
                tracing::debug!(%stage, model = %model, "Trying primary candidate");
                let start = Instant::now();
                match primary.complete_text(model, system, user) {
                    Ok(text) if !text.trim().is_empty() => {
                        tracing::info!(
                            model = %model,
                            elapsed_ms = %start.elapsed().as_millis(),
                            "Narrative generated by primary provider"
                        );
                        return CascadeOutcome::Primary {
                            model: model.clone(),
                            text: text.trim().to_string(),
                        };
                    }
                    Ok(_) => {
                        tracing::warn!(model = %model, "Primary candidate returned empty text");
                        failures.push(format!("{model}: empty response"));
                    }
                    Err(e) => {
                        tracing::warn!(model = %model, error = %e, "Primary candidate failed");
                        failures.push(format!("{model}: {e}"));
                    }
                }
            }
        } else {
            tracing::debug!("Primary provider not configured");
        }
        stage = CascadeStage::ExhaustedPrimary;
        tracing::debug!(%stage, "Primary candidates exhausted");

        if let Some(secondary) = self.secondary {
            stage = CascadeStage::TryingSecondary;
            tracing::debug!(%stage, model = self.secondary_model, "Trying secondary provider");
            let start = Instant::now();
            match secondary.complete_text(self.secondary_model, system, user) {
                Ok(text) if !text.trim().is_empty() => {
                    tracing::info!(
                        model = self.secondary_model,
                        elapsed_ms = %start.elapsed().as_millis(),
                        "Narrative generated by secondary provider"
                    );
                    return CascadeOutcome::Secondary {
                        model: self.secondary_model.to_string(),
                        text: text.trim().to_string(),
                    };
                }
                Ok(_) => {
                    tracing::warn!(model = self.secondary_model, "Secondary provider returned empty text");
                    failures.push(format!("{}: empty response", self.secondary_model));
                }
                Err(e) => {
                    tracing::warn!(model = self.secondary_model, error = %e, "Secondary provider failed");
                    failures.push(format!("{}: {e}", self.secondary_model));
                }
            }
        } else {
            tracing::debug!("Secondary provider not configured");
        }
        stage = CascadeStage::ExhaustedSecondary;
        tracing::warn!(%stage, attempts = failures.len(), "All narrative providers failed");

        CascadeOutcome::Exhausted { failures }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::narrative::types::{MockReply, MockTextCompletion};

    fn models(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn first_non_empty_primary_candidate_wins() {
        let primary = MockTextCompletion::replying("from b")
            .with_model_reply("a", MockReply::Fail("quota".into()));
        let secondary = MockTextCompletion::replying("secondary");
        let list = models(&["a", "b", "c"]);
        let cascade = FallbackCascade::new(Some(&primary), &list, Some(&secondary), "gemini");

        let outcome = cascade.run("test", "sys", "usr");
        assert_eq!(
            outcome,
            CascadeOutcome::Primary {
                model: "b".into(),
                text: "from b".into()
            }
        );
        assert_eq!(primary.calls().len(), 2);
        assert!(secondary.calls().is_empty());
    }

    #[test]
    fn empty_primary_reply_advances() {
        let primary = MockTextCompletion::replying("   ");
        let secondary = MockTextCompletion::replying("secondary text");
        let list = models(&["a", "b"]);
        let cascade = FallbackCascade::new(Some(&primary), &list, Some(&secondary), "gemini");

        let outcome = cascade.run("test", "sys", "usr");
        assert_eq!(outcome.text(), Some("secondary text"));
        assert_eq!(primary.calls().len(), 2);
    }

    #[test]
    fn failing_primary_falls_to_secondary_exactly() {
        let primary = MockTextCompletion::failing();
        let secondary = MockTextCompletion::replying("FIXED SECONDARY OUTPUT");
        let list = models(&["a"]);
        let cascade = FallbackCascade::new(Some(&primary), &list, Some(&secondary), "gemini");

        match cascade.run("test", "sys", "usr") {
            CascadeOutcome::Secondary { model, text } => {
                assert_eq!(model, "gemini");
                assert_eq!(text, "FIXED SECONDARY OUTPUT");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(secondary.calls()[0].model, "gemini");
    }

    #[test]
    fn both_failing_is_exhausted_with_every_attempt() {
        let primary = MockTextCompletion::failing();
        let secondary = MockTextCompletion::failing();
        let list = models(&["a", "b"]);
        let cascade = FallbackCascade::new(Some(&primary), &list, Some(&secondary), "gemini");

        match cascade.run("test", "sys", "usr") {
            CascadeOutcome::Exhausted { failures } => assert_eq!(failures.len(), 3),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn no_providers_is_exhausted() {
        let cascade = FallbackCascade::new(None, &[], None, "gemini");
        assert!(cascade.run("test", "", "").text().is_none());
    }

    #[test]
    fn stage_display_is_stable() {
        assert_eq!(CascadeStage::TryingPrimary(2).to_string(), "trying_primary[2]");
        assert_eq!(CascadeStage::ExhaustedSecondary.to_string(), "exhausted_secondary");
    }
}
