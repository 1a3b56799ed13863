//! Role and task prompts for every narrative operation, plus the
//! deterministic last-resort texts for the plain-text path.
//!
//! Objective findings are always embedded verbatim under a "facts, do not
//! reinterpret" heading; only then come free-text notes and the HTML template.

use crate::pipeline::analysis::{
    FindingsMap, KEY_LEFT_HINDFOOT, KEY_PELVIS, KEY_RIGHT_HINDFOOT, KEY_SHOULDERS,
};

use super::sanitize::escape_html;
use super::types::{AnamnesisIntake, PatientSummary};

const NOT_CALCULATED: &str = "Not calculated.";
const NOT_PROVIDED: &str = "None provided.";
const NOT_SPECIFIED: &str = "Not specified";

/// Output rules shared by every HTML report.
const FORMAT_RULES: &str = "FORMAT AND STYLE RULES:\n\
    1. Use HTML tags for formatting: <b> for headings and emphasis, <br><br> between paragraphs. \
    Do NOT use Markdown (no asterisks).\n\
    2. No header: start directly with the first section, without patient names or dates.\n\
    3. Describe what you observe in the images directly; never mention file names.\n\
    4. Your answer must be only the HTML report, with no introductory or closing sentences.";

/// System + user prompt pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

fn region_name(key: &str) -> &str {
    match key {
        KEY_SHOULDERS => "Shoulders",
        KEY_PELVIS => "Pelvis",
        KEY_LEFT_HINDFOOT => "Left hindfoot",
        KEY_RIGHT_HINDFOOT => "Right hindfoot",
        other => other,
    }
}

fn finding_or_default<'a>(findings: &'a FindingsMap, key: &str) -> &'a str {
    findings.get(key).unwrap_or(NOT_CALCULATED)
}

fn notes_or_default(notes: &str) -> &str {
    if notes.trim().is_empty() {
        NOT_PROVIDED
    } else {
        notes.trim()
    }
}

fn opt_or<'a>(value: &'a Option<String>, default: &'a str) -> &'a str {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}

fn list_or(values: &[String], default: &str) -> String {
    let items: Vec<&str> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();
    if items.is_empty() {
        default.to_string()
    } else {
        items.join(", ")
    }
}

/// Every finding as `- Region: label`, in key order.
fn findings_block(findings: &FindingsMap) -> String {
    if findings.is_empty() {
        return format!("- {NOT_CALCULATED}\n");
    }
    findings
        .iter()
        .map(|(k, v)| format!("- {}: {}\n", region_name(k), v))
        .collect()
}

fn posture_facts(findings: &FindingsMap) -> String {
    format!(
        "--- OBJECTIVE POSTURE DATA (FACTS, DO NOT REINTERPRET) ---\n\
         - Shoulder finding: {}\n\
         - Pelvis finding: {}\n\n",
        finding_or_default(findings, KEY_SHOULDERS),
        finding_or_default(findings, KEY_PELVIS),
    )
}

// ═══════════════════════════════════════════════════════════
// Plain-text narrative
// ═══════════════════════════════════════════════════════════

/// Output rules for the text-only narrative.
const NARRATIVE_FORMAT_RULES: &str = "FORMAT AND STYLE RULES:\n\
    1. Use HTML tags for formatting: <b> for headings and emphasis, <br><br> between paragraphs. \
    Do NOT use Markdown (no asterisks).\n\
    2. No greeting and no header: start directly with the first section.\n\
    3. Your answer must be only the HTML fragment, with no introductory or closing sentences.";

const NARRATIVE_FINDINGS_HEADING: &str = "<b>1. Objective Findings:</b><br>";
const NARRATIVE_NOTES_HEADING: &str = "<b>2. Clinical Notes:</b><br>";
const NARRATIVE_SUMMARY_HEADING: &str = "<b>3. Postural Summary:</b><br>";

pub fn narrative_prompt(findings: &FindingsMap, notes: &str) -> Prompt {
    let system = format!(
        "You are a chiropractor and physiotherapist writing the postural assessment section of a \
         clinical record. Your tone is professional, objective and clinical.\n{NARRATIVE_FORMAT_RULES}"
    );
    let user = format!(
        "Write the postural assessment from the following data.\n\n\
         --- OBJECTIVE FINDINGS (FACTS, DO NOT REINTERPRET) ---\n\
         {}\n\
         --- CLINICAL NOTES ---\n\
         {}\n\n\
         --- REPORT TO WRITE (USE THIS HTML FORMAT) ---\n\
         {NARRATIVE_FINDINGS_HEADING}\
         (Restate each objective finding above in clinical language, without changing it).<br>\
         <br>\
         {NARRATIVE_NOTES_HEADING}\
         (Relate the clinical notes to the findings, or state that none were provided).<br>\
         <br>\
         {NARRATIVE_SUMMARY_HEADING}\
         (One short paragraph summarizing the postural picture. Do NOT give a medical diagnosis).",
        findings_block(findings),
        notes_or_default(notes),
    );
    Prompt { system, user }
}

/// Deterministic narrative in the same section shape, built from the
/// findings alone.
pub fn fallback_narrative(findings: &FindingsMap, notes: &str) -> String {
    let mut text = String::from(NARRATIVE_FINDINGS_HEADING);
    if findings.is_empty() {
        text.push_str("No measurable findings were recorded.<br>");
    } else {
        for (key, label) in findings.iter() {
            text.push_str(&format!("- {}: {}<br>", region_name(key), escape_html(label)));
        }
    }
    text.push_str("<br>");
    text.push_str(NARRATIVE_NOTES_HEADING);
    text.push_str(&escape_html(notes_or_default(notes)));
    text.push_str("<br><br>");
    text.push_str(NARRATIVE_SUMMARY_HEADING);
    text.push_str("Objective postural assessment generated from the measured findings.");
    text
}

// ═══════════════════════════════════════════════════════════
// Anamnesis
// ═══════════════════════════════════════════════════════════

pub fn anamnesis_prompt(intake: &AnamnesisIntake) -> Prompt {
    let system = "You are an expert chiropractor writing the anamnesis section of a clinical \
        record. Your tone is professional, objective and clinical. Answer with the anamnesis \
        paragraph only, with no introductory phrases or any additional text."
        .to_string();
    let user = format!(
        "Write one coherent narrative paragraph from the following patient information. \
         Do not include the item titles in the final text; use them only to structure it.\n\n\
         --- PATIENT DATA ---\n\
         - Chief complaint: {}\n\
         - Severity of the chief complaint (0-10 scale): {} (state in the text that it is \
         'according to the Borg scale')\n\
         - Duration: {}\n\
         - Onset: {}\n\
         - Attributed cause (according to the patient): {}\n\
         - Pain characteristics: {}\n\
         - Times of greatest intensity: {}\n\
         - Aggravating factors: {}\n\
         - Relieving factors: {}\n\
         - Affected activities of daily living: {}\n\
         --- END OF DATA ---",
        opt_or(&intake.chief_complaint, NOT_SPECIFIED),
        opt_or(&intake.severity, "N/A"),
        opt_or(&intake.duration, NOT_SPECIFIED),
        opt_or(&intake.onset, NOT_SPECIFIED),
        opt_or(&intake.attributed_cause, NOT_SPECIFIED),
        list_or(&intake.pain_types, NOT_SPECIFIED),
        list_or(&intake.peak_times, NOT_SPECIFIED),
        opt_or(&intake.aggravating_factors, NOT_SPECIFIED),
        opt_or(&intake.relieving_factors, NOT_SPECIFIED),
        opt_or(&intake.affected_activities, NOT_SPECIFIED),
    );
    Prompt { system, user }
}

pub fn fallback_anamnesis(intake: &AnamnesisIntake) -> String {
    let mut text = format!(
        "Patient reports '{}' ({}/10 according to the Borg scale)",
        opt_or(&intake.chief_complaint, NOT_SPECIFIED),
        opt_or(&intake.severity, "N/A"),
    );
    if let Some(duration) = intake.duration.as_deref().filter(|d| !d.trim().is_empty()) {
        text.push_str(&format!(", first noticed {}", duration.trim()));
    }
    if let Some(onset) = intake.onset.as_deref().filter(|o| !o.trim().is_empty()) {
        text.push_str(&format!(", with {} onset", onset.trim()));
    }
    if intake.pain_types.iter().any(|p| !p.trim().is_empty()) {
        text.push_str(&format!(
            ". The pain is described as {}",
            list_or(&intake.pain_types, NOT_SPECIFIED)
        ));
    }
    text.push('.');
    text
}

// ═══════════════════════════════════════════════════════════
// Multimodal reports
// ═══════════════════════════════════════════════════════════

pub fn posture_report_prompt(findings: &FindingsMap, notes: &str) -> Prompt {
    let system = format!(
        "You are a chiropractor and physiotherapist specialized in biomechanics. Your task is an \
         objective postural analysis of the clinical images you will receive. Interpret the lines, \
         points and angles drawn over the images to identify deviations and asymmetries. Your \
         language is technical, precise and professional.\n{FORMAT_RULES}"
    );
    let user = format!(
        "Analyze the attached images and write a posture report. Follow this structure and \
         checklist strictly:\n\n\
         {}\
         --- ADDITIONAL CLINICAL DATA ---\n\
         - Physical exam notes: {}\n\n\
         --- REPORT TO WRITE (USE THIS HTML FORMAT) ---\n\
         <b>1. Frontal Plane Analysis:</b><br>\
         - <b>Frontal alignment:</b> (Based on the OBJECTIVE DATA above, describe shoulder and pelvic level).<br>\
         - <b>Plumb line:</b> (Describe whether and where the midline deviates, e.g. 'Lateral trunk shift to the right').<br>\
         <br>\
         <b>2. Sagittal Plane Analysis (Lateral):</b><br>\
         - <b>Head posture (CVA):</b> (Use 'Forward head posture', 'Neutral head position' or 'Cervical straightening').<br>\
         - <b>Thoracic and lumbar curves:</b> (Use 'Thoracic hyperkyphosis', 'Lumbar hypolordosis', 'Lumbar hyperlordosis' or 'Curves within normal limits').<br>\
         - <b>Pelvic tilt:</b> (Use 'Anterior pelvic tilt', 'Posterior pelvic tilt' or 'Neutral pelvis').<br>\
         <br>\
         <b>3. Biomechanical Conclusion:</b><br>\
         (In a short paragraph, summarize 2-3 key findings and how they may relate to muscle \
         imbalance or joint stress. Do NOT give a medical diagnosis or recommend treatment).",
        posture_facts(findings),
        notes_or_default(notes),
    );
    Prompt { system, user }
}

pub fn footprint_report_prompt(findings: &FindingsMap, notes: &str) -> Prompt {
    let system = "You are a podiatrist and expert in foot and ankle biomechanics. Write a \
        technical, objective and concise report. Your answer must be only the HTML report, with \
        no introductory text and no Markdown."
        .to_string();
    let user = format!(
        "Analyze the three attached foot images (plantar footprint, frontal view and rear view) \
         and write a report. Follow this structure and checklist strictly:\n\n\
         --- OBJECTIVE HINDFOOT DATA (FACTS, DO NOT REINTERPRET) ---\n\
         - Left foot: {}\n\
         - Right foot: {}\n\n\
         --- ADDITIONAL CLINICAL DATA ---\n\
         - Relevant notes: {}\n\n\
         --- REPORT TO WRITE (USE THIS HTML FORMAT) ---\n\
         <b>1. Plantar Footprint Analysis:</b><br>\
         - <b>Arch type:</b> (Classify each foot as 'Normal arch (neutral)', 'Low arch (flat foot)' or 'High arch (cavus foot)').<br>\
         - <b>Load distribution:</b> (Describe whether load concentrates on the rearfoot, forefoot, medial or lateral border).<br>\
         <br>\
         <b>2. Structural Analysis (Frontal and Rear Views):</b><br>\
         - <b>Hindfoot alignment:</b> (Use the OBJECTIVE HINDFOOT DATA to describe heel alignment).<br>\
         - <b>Forefoot signs:</b> (From the frontal view, look for signs such as 'Hallux valgus' or 'Claw toes').<br>\
         <br>\
         <b>3. Correlation and Clinical Conclusion:</b><br>\
         (In a short paragraph, explain how the findings connect and their overall biomechanical \
         implication. Do NOT give a medical diagnosis or recommend specific insoles).<br>\
         <br>\
         <b>4. Possible Effects:</b><br>\
         (In a short paragraph, explain how the findings may affect the patient's spine and posture).",
        finding_or_default(findings, KEY_LEFT_HINDFOOT),
        finding_or_default(findings, KEY_RIGHT_HINDFOOT),
        notes_or_default(notes),
    );
    Prompt { system, user }
}

pub fn integrated_report_prompt(
    patient: &PatientSummary,
    anamnesis: &AnamnesisIntake,
    exam_notes: Option<&str>,
    findings: &FindingsMap,
) -> Prompt {
    let system = "You are a chiropractor and physiotherapist specialized in biomechanics, writing \
        a clinical correlation report. Your analysis is objective, technical and based only on the \
        evidence provided (images and data). Your answer must be only the HTML report, with no \
        introductory text and no conclusions outside the template."
        .to_string();

    let symptoms = format!(
        "Chief complaint: {} with a severity of {}/10. The patient reports the pain worsens with: {}.",
        opt_or(&anamnesis.chief_complaint, NOT_SPECIFIED),
        opt_or(&anamnesis.severity, "N/A"),
        opt_or(&anamnesis.aggravating_factors, NOT_SPECIFIED),
    );

    let user = format!(
        "Analyze ALL images (posture and feet) and the clinical data to write an integrated \
         report. Fill in the HTML template below. Be concise and focus on how the findings \
         connect.\n\n\
         {}\
         --- ALL OBJECTIVE FINDINGS ---\n\
         {}\n\
         --- PATIENT CLINICAL DATA ---\n\
         - Name: {}\n\
         - Key symptoms: {}\n\
         - Physical exam notes: {}\n\n\
         --- REPORT TEMPLATE TO COMPLETE ---\n\
         <b>1. Main Biomechanical Findings:</b><br>\
         &nbsp;&nbsp;<b>- Postural analysis:</b> (Use the OBJECTIVE POSTURE DATA above for frontal alignment, then describe the sagittal findings visible in the lateral image).<br>\
         &nbsp;&nbsp;<b>- Foot analysis:</b> (Describe the most relevant footprint and foot-structure finding).<br>\
         <br>\
         <b>2. Clinical Correlation (Kinetic Chain):</b><br>\
         (Concise paragraph explaining the relationship between the findings along the kinetic chain).<br>\
         <br>\
         <b>3. Conclusion and Functional Prognosis:</b><br>\
         (Final paragraph of 2-3 sentences).",
        posture_facts(findings),
        findings_block(findings),
        patient.display_name(),
        symptoms,
        exam_notes.map(notes_or_default).unwrap_or(NOT_PROVIDED),
    );
    Prompt { system, user }
}
