use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::hindfoot::{analyze_hindfoot_alignment, HindfootFindings};
use super::symmetry::{analyze_frontal_symmetry, FrontalSymmetry};
use crate::config::AnalysisThresholds;
use crate::pipeline::landmarks::{KeypointSet, ViewType};

pub const KEY_SHOULDERS: &str = "shoulders";
pub const KEY_PELVIS: &str = "pelvis";
pub const KEY_LEFT_HINDFOOT: &str = "left_hindfoot";
pub const KEY_RIGHT_HINDFOOT: &str = "right_hindfoot";

/// Body region → clinical classification label.
///
/// The only artifact handed from the analyzer to narrative generation.
/// Ordered so prompts and JSON output are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FindingsMap(BTreeMap<String, String>);

impl FindingsMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, label: impl Into<String>) {
        self.0.insert(key.into(), label.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge another map into this one; later values win.
    pub fn merge(&mut self, other: FindingsMap) {
        self.0.extend(other.0);
    }
}

impl From<FrontalSymmetry> for FindingsMap {
    fn from(s: FrontalSymmetry) -> Self {
        let mut map = Self::new();
        map.insert(KEY_SHOULDERS, s.shoulders_label());
        map.insert(KEY_PELVIS, s.pelvis_label());
        map
    }
}

impl From<HindfootFindings> for FindingsMap {
    fn from(h: HindfootFindings) -> Self {
        let mut map = Self::new();
        map.insert(KEY_LEFT_HINDFOOT, h.left.left_label());
        map.insert(KEY_RIGHT_HINDFOOT, h.right.right_label());
        map
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FindingsMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Findings for one upload. Frontal views yield levelness, rear views yield
/// hindfoot alignment, other views yield an empty map. The key set depends on
/// the view only, never on whether detection succeeded.
pub fn analyze_view(
    view: ViewType,
    keypoints: Option<&KeypointSet>,
    thresholds: &AnalysisThresholds,
) -> FindingsMap {
    let findings = match view {
        ViewType::Frontal => analyze_frontal_symmetry(keypoints, thresholds).into(),
        ViewType::Rear => analyze_hindfoot_alignment(keypoints, thresholds).into(),
        ViewType::LateralLeft | ViewType::LateralRight | ViewType::None => FindingsMap::new(),
    };
    tracing::debug!(
        view = view.as_str(),
        detected = keypoints.is_some(),
        findings = findings.len(),
        "View analyzed"
    );
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::landmarks::Landmark;

    #[test]
    fn frontal_scenario_reports_left_shoulder() {
        let kp = KeypointSet::empty()
            .with(Landmark::LeftShoulder, 0.6, 0.40)
            .with(Landmark::RightShoulder, 0.4, 0.42);
        let map = analyze_view(ViewType::Frontal, Some(&kp), &AnalysisThresholds::default());
        assert_eq!(map.get(KEY_SHOULDERS), Some("Elevated left shoulder."));
        assert_eq!(map.get(KEY_PELVIS), Some("Symmetric pelvic level."));
    }

    #[test]
    fn key_set_is_independent_of_detection() {
        let thresholds = AnalysisThresholds::default();
        let kp = KeypointSet::empty()
            .with(Landmark::LeftAnkle, 0.4, 0.9)
            .with(Landmark::LeftHeel, 0.4, 0.92)
            .with(Landmark::RightAnkle, 0.6, 0.9)
            .with(Landmark::RightHeel, 0.6, 0.92);

        for view in [ViewType::Frontal, ViewType::Rear, ViewType::LateralLeft] {
            let detected: Vec<String> = analyze_view(view, Some(&kp), &thresholds)
                .keys()
                .map(String::from)
                .collect();
            let missed: Vec<String> = analyze_view(view, None, &thresholds)
                .keys()
                .map(String::from)
                .collect();
            assert_eq!(detected, missed, "{view}");
        }
    }

    #[test]
    fn rear_defaults_are_not_determined() {
        let map = analyze_view(ViewType::Rear, None, &AnalysisThresholds::default());
        assert_eq!(map.len(), 2);
        assert_eq!(
            map.get(KEY_LEFT_HINDFOOT),
            Some("Left hindfoot alignment not determined.")
        );
        assert_eq!(
            map.get(KEY_RIGHT_HINDFOOT),
            Some("Right hindfoot alignment not determined.")
        );
    }

    #[test]
    fn lateral_and_none_views_have_no_findings() {
        let t = AnalysisThresholds::default();
        assert!(analyze_view(ViewType::LateralRight, None, &t).is_empty());
        assert!(analyze_view(ViewType::None, None, &t).is_empty());
    }

    #[test]
    fn serializes_as_plain_object() {
        let map: FindingsMap = [(KEY_SHOULDERS, "Elevated right shoulder.")].into_iter().collect();
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"shoulders":"Elevated right shoulder."}"#);
        let back: FindingsMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn merge_combines_views() {
        let t = AnalysisThresholds::default();
        let mut map = analyze_view(ViewType::Frontal, None, &t);
        map.merge(analyze_view(ViewType::Rear, None, &t));
        assert_eq!(map.len(), 4);
    }
}
