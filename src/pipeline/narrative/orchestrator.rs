use std::collections::BTreeMap;

use super::cascade::{CascadeOutcome, FallbackCascade};
use super::gemini::GeminiClient;
use super::groq::GroqClient;
use super::images::attach_images;
use super::prompt::{self, Prompt};
use super::sanitize::{blocked_fragment, error_fragment, provider_error_fragment, sanitize_report};
use super::types::{
    AnamnesisIntake, ExamResults, ImageSlot, MultimodalCompletion, MultimodalReply, PatientSummary,
    PromptPart, TextCompletion,
};
use crate::config::{NarrativeConfig, PipelineConfig};
use crate::pipeline::analysis::FindingsMap;
use crate::pipeline::annotation::ImageStore;
use crate::pipeline::landmarks::ViewType;

/// Posture-report attachment order.
const POSTURE_VIEWS: [(ViewType, &str); 3] = [
    (ViewType::Frontal, "FRONTAL VIEW"),
    (ViewType::LateralLeft, "LATERAL LEFT VIEW"),
    (ViewType::LateralRight, "LATERAL RIGHT VIEW"),
];

/// Drives prompts through the providers and always returns displayable HTML.
pub struct NarrativeOrchestrator<'a> {
    config: &'a NarrativeConfig,
    store: ImageStore,
    primary: Option<&'a dyn TextCompletion>,
    secondary_text: Option<&'a dyn TextCompletion>,
    secondary_vision: Option<&'a dyn MultimodalCompletion>,
}

impl<'a> NarrativeOrchestrator<'a> {
    /// An orchestrator with no providers: every text operation resolves to its
    /// deterministic fallback, every multimodal one to an error fragment.
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self {
            config: &config.narrative,
            store: ImageStore::from_config(&config.storage),
            primary: None,
            secondary_text: None,
            secondary_vision: None,
        }
    }

    pub fn with_primary(mut self, provider: &'a dyn TextCompletion) -> Self {
        self.primary = Some(provider);
        self
    }

    /// The secondary provider serves both the text cascade and multimodal reports.
    pub fn with_secondary<P>(mut self, provider: &'a P) -> Self
    where
        P: TextCompletion + MultimodalCompletion + 'a,
    {
        self.secondary_text = Some(provider);
        self.secondary_vision = Some(provider);
        self
    }

    pub fn with_store(mut self, store: ImageStore) -> Self {
        self.store = store;
        self
    }

    fn cascade(&self) -> FallbackCascade<'_> {
        FallbackCascade::new(
            self.primary,
            &self.config.text_models,
            self.secondary_text,
            &self.config.vision_model,
        )
    }

    fn run_text(&self, operation: &str, prompt: &Prompt, fallback: impl FnOnce() -> String) -> String {
        match self.cascade().run(operation, &prompt.system, &prompt.user) {
            CascadeOutcome::Primary { text, .. } | CascadeOutcome::Secondary { text, .. } => {
                let cleaned = sanitize_report(&text);
                if cleaned.is_empty() {
                    fallback()
                } else {
                    cleaned
                }
            }
            CascadeOutcome::Exhausted { .. } => {
                tracing::warn!(operation, "Using templated narrative");
                fallback()
            }
        }
    }

    /// Single multimodal attempt against the secondary provider.
    fn run_multimodal(&self, operation: &str, parts: &[PromptPart]) -> String {
        let _span = tracing::info_span!("multimodal_report", operation).entered();
        let Some(provider) = self.secondary_vision else {
            tracing::warn!("Multimodal provider not configured");
            return error_fragment("The multimodal AI provider is not configured.");
        };

        match provider.complete_multimodal(parts) {
            Ok(MultimodalReply::Text(text)) => {
                let cleaned = sanitize_report(&text);
                if cleaned.is_empty() {
                    tracing::warn!("Multimodal provider returned empty text");
                    error_fragment("The AI returned an empty response.")
                } else {
                    tracing::info!(chars = cleaned.len(), "Multimodal report generated");
                    cleaned
                }
            }
            Ok(MultimodalReply::Blocked { reason }) => {
                tracing::warn!(reason = ?reason, "Multimodal request blocked by safety filter");
                blocked_fragment(reason.as_deref())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Multimodal request failed");
                provider_error_fragment(&e)
            }
        }
    }

    fn prompt_parts(prompt: &Prompt) -> Vec<PromptPart> {
        vec![
            PromptPart::text(prompt.system.as_str()),
            PromptPart::text(prompt.user.as_str()),
        ]
    }

    // ═══════════════════════════════════════════════════════════
    // Plain-text operations
    // ═══════════════════════════════════════════════════════════

    /// Postural narrative from findings and notes. Always non-empty.
    pub fn generate_narrative(&self, findings: &FindingsMap, notes: &str) -> String {
        let prompt = prompt::narrative_prompt(findings, notes);
        self.run_text("narrative", &prompt, || prompt::fallback_narrative(findings, notes))
    }

    /// Anamnesis paragraph from the intake form. Always non-empty.
    pub fn generate_anamnesis_narrative(&self, intake: &AnamnesisIntake) -> String {
        let prompt = prompt::anamnesis_prompt(intake);
        self.run_text("anamnesis", &prompt, || prompt::fallback_anamnesis(intake))
    }

    // ═══════════════════════════════════════════════════════════
    // Multimodal reports
    // ═══════════════════════════════════════════════════════════

    /// Posture report over the frontal and lateral photographs.
    pub fn generate_posture_report(
        &self,
        image_paths: &BTreeMap<ViewType, String>,
        notes: &str,
        findings: &FindingsMap,
    ) -> String {
        let prompt = prompt::posture_report_prompt(findings, notes);
        let mut parts = Self::prompt_parts(&prompt);
        let images = POSTURE_VIEWS
            .into_iter()
            .filter_map(|(view, caption)| image_paths.get(&view).map(|p| (caption, p.as_str())));

        if attach_images(&self.store, images, &mut parts) == 0 {
            return error_fragment(
                "No valid images were found to analyze. Make sure the posture photographs were saved first.",
            );
        }
        self.run_multimodal("posture_report", &parts)
    }

    /// Footprint report. Requires all three foot images.
    pub fn generate_footprint_report(
        &self,
        image_paths: &BTreeMap<ImageSlot, String>,
        notes: &str,
        findings: &FindingsMap,
    ) -> String {
        let prompt = prompt::footprint_report_prompt(findings, notes);
        let mut parts = Self::prompt_parts(&prompt);
        let images = ImageSlot::FOOT_ORDER
            .into_iter()
            .filter_map(|slot| image_paths.get(&slot).map(|p| (slot.caption(), p.as_str())));

        let required = ImageSlot::FOOT_ORDER.len();
        let attached = attach_images(&self.store, images, &mut parts);
        if attached < required {
            return error_fragment(&format!(
                "Found {attached} of the {required} required foot images. Make sure the frontal, \
                 rear and plantar footprint images are all saved."
            ));
        }
        self.run_multimodal("footprint_report", &parts)
    }

    /// Integrated report attaching up to six exam photographs.
    pub fn generate_integrated_report(
        &self,
        patient: &PatientSummary,
        anamnesis: &AnamnesisIntake,
        exam: &ExamResults,
        findings: &FindingsMap,
    ) -> String {
        let prompt = prompt::integrated_report_prompt(patient, anamnesis, exam.notes.as_deref(), findings);
        let mut parts = Self::prompt_parts(&prompt);
        let images = ImageSlot::INTEGRATED_ORDER
            .into_iter()
            .filter_map(|slot| exam.image_paths.get(&slot).map(|p| (slot.caption(), p.as_str())));

        if attach_images(&self.store, images, &mut parts) == 0 {
            return error_fragment("No exam images were found to analyze.");
        }
        self.run_multimodal("integrated_report", &parts)
    }

    /// Integrated report without exam notes.
    pub fn generate_integrated_narrative(
        &self,
        patient: &PatientSummary,
        anamnesis: &AnamnesisIntake,
        findings: &FindingsMap,
        image_paths: &BTreeMap<ImageSlot, String>,
    ) -> String {
        let exam = ExamResults {
            notes: None,
            image_paths: image_paths.clone(),
        };
        self.generate_integrated_report(patient, anamnesis, &exam, findings)
    }
}

/// Real provider clients built from configuration. A provider whose API key
/// is missing is left out.
pub struct ProviderSet {
    pub groq: Option<GroqClient>,
    pub gemini: Option<GeminiClient>,
}

impl ProviderSet {
    pub fn from_config(config: &NarrativeConfig) -> Self {
        let groq = config
            .groq_api_key
            .as_deref()
            .map(|key| GroqClient::new(&config.groq_base_url, key, config.timeout_secs));
        let gemini = config.gemini_api_key.as_deref().map(|key| {
            GeminiClient::new(&config.gemini_base_url, key, &config.vision_model, config.timeout_secs)
        });
        Self { groq, gemini }
    }

    /// Wire these providers into an orchestrator.
    pub fn orchestrator<'a>(&'a self, config: &'a PipelineConfig) -> NarrativeOrchestrator<'a> {
        let mut orchestrator = NarrativeOrchestrator::new(config);
        if let Some(groq) = &self.groq {
            orchestrator = orchestrator.with_primary(groq);
        }
        if let Some(gemini) = &self.gemini {
            orchestrator = orchestrator.with_secondary(gemini);
        }
        orchestrator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analysis::{analyze_view, KEY_LEFT_HINDFOOT, KEY_SHOULDERS};
    use crate::pipeline::landmarks::{KeypointSet, Landmark};
    use crate::pipeline::narrative::sanitize::{is_error_fragment, ERROR_LABEL};
    use crate::pipeline::narrative::types::{MockMultimodal, MockReply, MockTextCompletion};

    struct Fixture {
        _dir: tempfile::TempDir,
        config: PipelineConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut config = PipelineConfig::default();
            config.storage.static_root = dir.path().to_path_buf();
            config.narrative.text_models = vec!["model-a".into(), "model-b".into()];
            Self { _dir: dir, config }
        }

        fn store(&self) -> ImageStore {
            ImageStore::from_config(&self.config.storage)
        }

        fn save(&self, name: &str) -> String {
            self.store().save(name, b"fake-image-bytes").unwrap()
        }
    }

    fn frontal_findings() -> FindingsMap {
        let config = PipelineConfig::default();
        let kp = KeypointSet::empty()
            .with(Landmark::LeftShoulder, 0.6, 0.40)
            .with(Landmark::RightShoulder, 0.4, 0.42);
        analyze_view(ViewType::Frontal, Some(&kp), &config.analysis)
    }

    fn multimodal_text(parts: &[PromptPart]) -> String {
        parts.iter().filter_map(|p| p.as_text()).collect::<Vec<_>>().join("\n")
    }

    // ── text cascade ──

    #[test]
    fn failing_primary_returns_secondary_text_exactly() {
        let fx = Fixture::new();
        let primary = MockTextCompletion::failing();
        let secondary = MockMultimodal::replying("Secondary narrative.");
        let orch = NarrativeOrchestrator::new(&fx.config)
            .with_primary(&primary)
            .with_secondary(&secondary);

        let text = orch.generate_narrative(&frontal_findings(), "notes");
        assert_eq!(text, "Secondary narrative.");
        assert_eq!(primary.calls().len(), 2);
        assert_eq!(secondary.text_calls()[0].model, fx.config.narrative.vision_model);
    }

    #[test]
    fn all_failing_uses_templated_narrative() {
        let fx = Fixture::new();
        let primary = MockTextCompletion::failing();
        let secondary = MockMultimodal::failing();
        let orch = NarrativeOrchestrator::new(&fx.config)
            .with_primary(&primary)
            .with_secondary(&secondary);

        let findings = frontal_findings();
        let text = orch.generate_narrative(&findings, "");
        assert!(!text.is_empty());
        assert_eq!(text, prompt::fallback_narrative(&findings, ""));
        assert!(!is_error_fragment(&text));
    }

    #[test]
    fn no_providers_still_returns_narrative() {
        let fx = Fixture::new();
        let orch = NarrativeOrchestrator::new(&fx.config);
        let text = orch.generate_narrative(&FindingsMap::new(), "");
        assert!(text.starts_with("<b>1. Objective Findings:</b><br>"));
        assert!(text.contains("No measurable findings"));
    }

    #[test]
    fn findings_reach_the_provider_verbatim() {
        let fx = Fixture::new();
        let primary = MockTextCompletion::replying("ok");
        let orch = NarrativeOrchestrator::new(&fx.config).with_primary(&primary);

        let findings = frontal_findings();
        orch.generate_narrative(&findings, "");
        let user = &primary.calls()[0].user;
        for (_, label) in findings.iter() {
            assert!(user.contains(label), "missing {label}");
        }
    }

    #[test]
    fn model_output_is_sanitized() {
        let fx = Fixture::new();
        let primary = MockTextCompletion::replying("```html\n**Level** shoulders.\n```");
        let orch = NarrativeOrchestrator::new(&fx.config).with_primary(&primary);
        assert_eq!(orch.generate_narrative(&FindingsMap::new(), ""), "Level shoulders.");
    }

    #[test]
    fn second_primary_candidate_is_used_when_first_is_empty() {
        let fx = Fixture::new();
        let primary = MockTextCompletion::replying("from b")
            .with_model_reply("model-a", MockReply::Text(String::new()));
        let orch = NarrativeOrchestrator::new(&fx.config).with_primary(&primary);
        assert_eq!(orch.generate_narrative(&FindingsMap::new(), ""), "from b");
    }

    #[test]
    fn anamnesis_falls_back_to_template() {
        let fx = Fixture::new();
        let orch = NarrativeOrchestrator::new(&fx.config);
        let intake = AnamnesisIntake {
            chief_complaint: Some("neck pain".into()),
            severity: Some("4".into()),
            ..Default::default()
        };
        assert_eq!(
            orch.generate_anamnesis_narrative(&intake),
            "Patient reports 'neck pain' (4/10 according to the Borg scale)."
        );
    }

    // ── multimodal ──

    #[test]
    fn posture_report_attaches_views_in_order() {
        let fx = Fixture::new();
        let secondary = MockMultimodal::replying("<b>1. Frontal Plane Analysis:</b> ok");
        let orch = NarrativeOrchestrator::new(&fx.config).with_secondary(&secondary);

        let mut paths = BTreeMap::new();
        paths.insert(ViewType::LateralRight, fx.save("r.png"));
        paths.insert(ViewType::Frontal, fx.save("f.png"));

        let findings = frontal_findings();
        let report = orch.generate_posture_report(&paths, "", &findings);
        assert_eq!(report, "<b>1. Frontal Plane Analysis:</b> ok");

        let parts = &secondary.multimodal_calls()[0];
        assert_eq!(parts.len(), 6);
        assert_eq!(parts[2].as_text(), Some("\n--- IMAGE: FRONTAL VIEW ---"));
        assert_eq!(parts[4].as_text(), Some("\n--- IMAGE: LATERAL RIGHT VIEW ---"));
        assert!(multimodal_text(parts).contains(findings.get(KEY_SHOULDERS).unwrap()));
    }

    #[test]
    fn posture_report_without_images_is_error_fragment() {
        let fx = Fixture::new();
        let secondary = MockMultimodal::replying("unused");
        let orch = NarrativeOrchestrator::new(&fx.config).with_secondary(&secondary);

        let report = orch.generate_posture_report(&BTreeMap::new(), "", &FindingsMap::new());
        assert!(report.starts_with(ERROR_LABEL));
        assert!(secondary.multimodal_calls().is_empty());
    }

    #[test]
    fn failing_multimodal_is_labeled_fragment() {
        let fx = Fixture::new();
        let primary = MockTextCompletion::replying("text providers are not used here");
        let secondary = MockMultimodal::failing();
        let orch = NarrativeOrchestrator::new(&fx.config)
            .with_primary(&primary)
            .with_secondary(&secondary);

        let mut paths = BTreeMap::new();
        paths.insert(ViewType::Frontal, fx.save("f.png"));
        let report = orch.generate_posture_report(&paths, "", &frontal_findings());
        assert!(report.starts_with(ERROR_LABEL));
        assert!(report.contains("<pre>"));
        assert!(primary.calls().is_empty());
    }

    #[test]
    fn blocked_multimodal_mentions_safety_filter() {
        let fx = Fixture::new();
        let secondary = MockMultimodal::blocked(Some("SAFETY"));
        let orch = NarrativeOrchestrator::new(&fx.config).with_secondary(&secondary);

        let mut exam = ExamResults::default();
        exam.image_paths.insert(ImageSlot::Front, fx.save("front.png"));
        let report = orch.generate_integrated_report(
            &PatientSummary::default(),
            &AnamnesisIntake::default(),
            &exam,
            &FindingsMap::new(),
        );
        assert!(report.starts_with(ERROR_LABEL));
        assert!(report.contains("safety filter"));
    }

    #[test]
    fn unconfigured_multimodal_is_labeled_fragment() {
        let fx = Fixture::new();
        let orch = NarrativeOrchestrator::new(&fx.config);
        let mut paths = BTreeMap::new();
        paths.insert(ViewType::Frontal, fx.save("f.png"));
        let report = orch.generate_posture_report(&paths, "", &FindingsMap::new());
        assert!(report.starts_with(ERROR_LABEL));
    }

    #[test]
    fn footprint_report_requires_three_images() {
        let fx = Fixture::new();
        let secondary = MockMultimodal::replying("report");
        let orch = NarrativeOrchestrator::new(&fx.config).with_secondary(&secondary);

        let mut paths = BTreeMap::new();
        paths.insert(ImageSlot::FeetRear, fx.save("rear.png"));
        paths.insert(ImageSlot::Footprint, fx.save("plantar.png"));
        let findings = analyze_view(ViewType::Rear, None, &fx.config.analysis);

        let report = orch.generate_footprint_report(&paths, "", &findings);
        assert!(report.starts_with(ERROR_LABEL));
        assert!(report.contains("Found 2 of the 3"));

        paths.insert(ImageSlot::FeetFrontal, fx.save("front.png"));
        assert_eq!(orch.generate_footprint_report(&paths, "", &findings), "report");
        let parts = &secondary.multimodal_calls()[0];
        assert_eq!(parts[2].as_text(), Some("\n--- IMAGE: FEET FRONTAL VIEW ---"));
        assert!(multimodal_text(parts).contains(findings.get(KEY_LEFT_HINDFOOT).unwrap()));
    }

    #[test]
    fn integrated_report_orders_six_slots() {
        let fx = Fixture::new();
        let secondary = MockMultimodal::replying("integrated");
        let orch = NarrativeOrchestrator::new(&fx.config).with_secondary(&secondary);

        let mut paths = BTreeMap::new();
        for slot in ImageSlot::INTEGRATED_ORDER.iter().rev() {
            paths.insert(*slot, fx.save(&format!("{}.png", slot.as_str())));
        }
        let report = orch.generate_integrated_narrative(
            &PatientSummary::default(),
            &AnamnesisIntake::default(),
            &frontal_findings(),
            &paths,
        );
        assert_eq!(report, "integrated");

        let parts = &secondary.multimodal_calls()[0];
        assert_eq!(parts.len(), 2 + 2 * 6);
        let captions: Vec<&str> = parts.iter().skip(2).step_by(2).filter_map(|p| p.as_text()).collect();
        assert_eq!(
            captions,
            vec![
                "\n--- IMAGE: FRONT ---",
                "\n--- IMAGE: SIDE ---",
                "\n--- IMAGE: POSTURE EXTRA ---",
                "\n--- IMAGE: FEET FRONTAL VIEW ---",
                "\n--- IMAGE: FEET REAR VIEW ---",
                "\n--- IMAGE: PLANTAR FOOTPRINT ---",
            ]
        );
    }

    #[test]
    fn integrated_report_without_images_is_error_fragment() {
        let fx = Fixture::new();
        let secondary = MockMultimodal::replying("unused");
        let orch = NarrativeOrchestrator::new(&fx.config).with_secondary(&secondary);
        let report = orch.generate_integrated_report(
            &PatientSummary::default(),
            &AnamnesisIntake::default(),
            &ExamResults::default(),
            &FindingsMap::new(),
        );
        assert!(is_error_fragment(&report));
    }

    #[test]
    fn provider_set_skips_missing_keys() {
        let mut config = NarrativeConfig::default();
        config.gemini_api_key = Some("AIza-test".into());
        let set = ProviderSet::from_config(&config);
        assert!(set.groq.is_none());
        assert!(set.gemini.is_some());
    }
}
