use serde::{Deserialize, Serialize};

use crate::config::AnalysisThresholds;
use crate::pipeline::landmarks::{KeypointSet, Landmark};

/// Frontal-plane alignment of the calcaneus under the ankle, seen from behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HindfootAlignment {
    Neutral,
    Valgus,
    Varus,
    #[default]
    NotDetermined,
}

impl HindfootAlignment {
    pub fn left_label(self) -> &'static str {
        match self {
            Self::Neutral => "Neutral left hindfoot alignment.",
            Self::Valgus => "Left hindfoot in valgus.",
            Self::Varus => "Left hindfoot in varus.",
            Self::NotDetermined => "Left hindfoot alignment not determined.",
        }
    }

    pub fn right_label(self) -> &'static str {
        match self {
            Self::Neutral => "Neutral right hindfoot alignment.",
            Self::Valgus => "Right hindfoot in valgus.",
            Self::Varus => "Right hindfoot in varus.",
            Self::NotDetermined => "Right hindfoot alignment not determined.",
        }
    }
}

/// Left foot: ankle left of the heel (smaller x) reads as valgus.
pub fn classify_left_hindfoot(ankle_x: f32, heel_x: f32, threshold: f32) -> HindfootAlignment {
    if ankle_x < heel_x - threshold {
        HindfootAlignment::Valgus
    } else if ankle_x > heel_x + threshold {
        HindfootAlignment::Varus
    } else {
        HindfootAlignment::Neutral
    }
}

/// Right foot: mirrored, ankle right of the heel (larger x) reads as valgus.
pub fn classify_right_hindfoot(ankle_x: f32, heel_x: f32, threshold: f32) -> HindfootAlignment {
    if ankle_x > heel_x + threshold {
        HindfootAlignment::Valgus
    } else if ankle_x < heel_x - threshold {
        HindfootAlignment::Varus
    } else {
        HindfootAlignment::Neutral
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HindfootFindings {
    pub left: HindfootAlignment,
    pub right: HindfootAlignment,
}

/// Per-foot hindfoot alignment. A foot whose ankle or heel is missing is
/// "not determined"; so is everything when no keypoints are available.
pub fn analyze_hindfoot_alignment(
    keypoints: Option<&KeypointSet>,
    thresholds: &AnalysisThresholds,
) -> HindfootFindings {
    let Some(kp) = keypoints else {
        return HindfootFindings::default();
    };
    let t = thresholds.hindfoot;

    let left = kp
        .pair(Landmark::LeftAnkle, Landmark::LeftHeel)
        .map(|(ankle, heel)| classify_left_hindfoot(ankle.x, heel.x, t))
        .unwrap_or_default();
    let right = kp
        .pair(Landmark::RightAnkle, Landmark::RightHeel)
        .map(|(ankle, heel)| classify_right_hindfoot(ankle.x, heel.x, t))
        .unwrap_or_default();

    HindfootFindings { left, right }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feet(la: f32, lh: f32, ra: f32, rh: f32) -> KeypointSet {
        KeypointSet::empty()
            .with(Landmark::LeftAnkle, la, 0.90)
            .with(Landmark::LeftHeel, lh, 0.93)
            .with(Landmark::RightAnkle, ra, 0.90)
            .with(Landmark::RightHeel, rh, 0.93)
    }

    #[test]
    fn identical_ankle_and_heel_is_neutral() {
        let kp = feet(0.40, 0.40, 0.60, 0.60);
        let result = analyze_hindfoot_alignment(Some(&kp), &AnalysisThresholds::default());
        assert_eq!(result.left, HindfootAlignment::Neutral);
        assert_eq!(result.right, HindfootAlignment::Neutral);
    }

    #[test]
    fn same_offset_reads_opposite_on_each_side() {
        // Ankle 0.03 left of the heel on both feet.
        let kp = feet(0.37, 0.40, 0.57, 0.60);
        let result = analyze_hindfoot_alignment(Some(&kp), &AnalysisThresholds::default());
        assert_eq!(result.left, HindfootAlignment::Valgus);
        assert_eq!(result.right, HindfootAlignment::Varus);
    }

    #[test]
    fn ankle_right_of_heel_mirrors() {
        let kp = feet(0.43, 0.40, 0.63, 0.60);
        let result = analyze_hindfoot_alignment(Some(&kp), &AnalysisThresholds::default());
        assert_eq!(result.left, HindfootAlignment::Varus);
        assert_eq!(result.right, HindfootAlignment::Valgus);
        assert_eq!(result.left.left_label(), "Left hindfoot in varus.");
        assert_eq!(result.right.right_label(), "Right hindfoot in valgus.");
    }

    #[test]
    fn small_offsets_stay_neutral() {
        assert_eq!(classify_left_hindfoot(0.405, 0.40, 0.01), HindfootAlignment::Neutral);
        assert_eq!(classify_right_hindfoot(0.595, 0.60, 0.01), HindfootAlignment::Neutral);
    }

    #[test]
    fn no_keypoints_is_not_determined() {
        let result = analyze_hindfoot_alignment(None, &AnalysisThresholds::default());
        assert_eq!(result.left, HindfootAlignment::NotDetermined);
        assert_eq!(result.right, HindfootAlignment::NotDetermined);
        assert_eq!(result.left.left_label(), "Left hindfoot alignment not determined.");
    }

    #[test]
    fn missing_heel_leaves_that_foot_undetermined() {
        let kp = KeypointSet::empty()
            .with(Landmark::LeftAnkle, 0.40, 0.90)
            .with(Landmark::RightAnkle, 0.60, 0.90)
            .with(Landmark::RightHeel, 0.60, 0.93);
        let result = analyze_hindfoot_alignment(Some(&kp), &AnalysisThresholds::default());
        assert_eq!(result.left, HindfootAlignment::NotDetermined);
        assert_eq!(result.right, HindfootAlignment::Neutral);
    }
}
