use serde::{Deserialize, Serialize};

use crate::config::AnalysisThresholds;
use crate::pipeline::landmarks::{KeypointSet, Landmark};

/// Bilateral region compared for levelness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelRegion {
    Shoulders,
    Pelvis,
}

impl LevelRegion {
    fn landmarks(self) -> (Landmark, Landmark) {
        match self {
            Self::Shoulders => (Landmark::LeftShoulder, Landmark::RightShoulder),
            Self::Pelvis => (Landmark::LeftHip, Landmark::RightHip),
        }
    }
}

/// Levelness of one bilateral pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Levelness {
    #[default]
    Symmetric,
    LeftElevated,
    RightElevated,
}

impl Levelness {
    /// Clinical label for this classification in the given region.
    pub fn label(self, region: LevelRegion) -> &'static str {
        match (region, self) {
            (LevelRegion::Shoulders, Self::Symmetric) => "Symmetric shoulder level.",
            (LevelRegion::Shoulders, Self::LeftElevated) => "Elevated left shoulder.",
            (LevelRegion::Shoulders, Self::RightElevated) => "Elevated right shoulder.",
            (LevelRegion::Pelvis, Self::Symmetric) => "Symmetric pelvic level.",
            (LevelRegion::Pelvis, Self::LeftElevated) => "Elevated left hemipelvis.",
            (LevelRegion::Pelvis, Self::RightElevated) => "Elevated right hemipelvis.",
        }
    }
}

/// Compare vertical coordinates. Smaller y is higher in image space; a
/// difference must strictly exceed `threshold` to count as elevation.
pub fn classify_level(left_y: f32, right_y: f32, threshold: f32) -> Levelness {
    if left_y < right_y - threshold {
        Levelness::LeftElevated
    } else if right_y < left_y - threshold {
        Levelness::RightElevated
    } else {
        Levelness::Symmetric
    }
}

/// Shoulder and pelvis levelness from a frontal view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrontalSymmetry {
    pub shoulders: Levelness,
    pub pelvis: Levelness,
}

impl FrontalSymmetry {
    pub fn shoulders_label(&self) -> &'static str {
        self.shoulders.label(LevelRegion::Shoulders)
    }

    pub fn pelvis_label(&self) -> &'static str {
        self.pelvis.label(LevelRegion::Pelvis)
    }
}

fn region_level(
    keypoints: &KeypointSet,
    region: LevelRegion,
    threshold: f32,
) -> Levelness {
    let (left, right) = region.landmarks();
    match keypoints.pair(left, right) {
        Some((l, r)) => classify_level(l.y, r.y, threshold),
        None => Levelness::Symmetric,
    }
}

/// Frontal-plane levelness. Missing keypoints, or a missing pair, yield the
/// symmetric classification for that region.
pub fn analyze_frontal_symmetry(
    keypoints: Option<&KeypointSet>,
    thresholds: &AnalysisThresholds,
) -> FrontalSymmetry {
    let Some(kp) = keypoints else {
        return FrontalSymmetry::default();
    };
    FrontalSymmetry {
        shoulders: region_level(kp, LevelRegion::Shoulders, thresholds.level),
        pelvis: region_level(kp, LevelRegion::Pelvis, thresholds.level),
    }
}
