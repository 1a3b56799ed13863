use serde::{Deserialize, Serialize};

str_enum!(
    /// Which anatomical view a photograph represents. Declared by the caller, never inferred.
    ViewType {
        Frontal => "frontal",
        LateralLeft => "lateral_left",
        LateralRight => "lateral_right",
        Rear => "rear",
        None => "none",
    }
);

impl ViewType {
    /// Views that get a landmark pass. `None` uploads are only resized and stored.
    pub fn needs_detection(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// BlazePose's 33 body landmarks, in model output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum Landmark {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl Landmark {
    pub const COUNT: usize = 33;

    pub const ALL: [Landmark; Self::COUNT] = [
        Self::Nose,
        Self::LeftEyeInner,
        Self::LeftEye,
        Self::LeftEyeOuter,
        Self::RightEyeInner,
        Self::RightEye,
        Self::RightEyeOuter,
        Self::LeftEar,
        Self::RightEar,
        Self::MouthLeft,
        Self::MouthRight,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftPinky,
        Self::RightPinky,
        Self::LeftIndex,
        Self::RightIndex,
        Self::LeftThumb,
        Self::RightThumb,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
        Self::LeftHeel,
        Self::RightHeel,
        Self::LeftFootIndex,
        Self::RightFootIndex,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// A single landmark in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    /// Normalized X (0.0 = left edge, 1.0 = right edge)
    pub x: f32,
    /// Normalized Y (0.0 = top edge, 1.0 = bottom edge); smaller is higher.
    pub y: f32,
    /// Model visibility score (0.0-1.0)
    pub visibility: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, visibility: f32) -> Self {
        Self { x, y, visibility }
    }

    /// Convert to pixel coordinates, truncating like an integer cast.
    pub fn to_pixel(&self, width: u32, height: u32) -> (i32, i32) {
        let px = (self.x * width as f32) as i32;
        let py = (self.y * height as f32) as i32;
        (px, py)
    }
}

/// Landmarks detected on one image. Produced once per request, never mutated
/// after detection, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct KeypointSet {
    points: [Option<Keypoint>; Landmark::COUNT],
}

impl KeypointSet {
    /// An empty set; use [`KeypointSet::with`] to populate synthetic sets.
    pub fn empty() -> Self {
        Self {
            points: [None; Landmark::COUNT],
        }
    }

    /// Build from model output, dropping landmarks below `min_visibility`.
    pub fn from_raw(raw: &[Keypoint], min_visibility: f32) -> Self {
        let mut set = Self::empty();
        for (slot, kp) in set.points.iter_mut().zip(raw.iter()) {
            if kp.visibility >= min_visibility {
                *slot = Some(*kp);
            }
        }
        set
    }

    /// Builder used by tests and adapters.
    pub fn with(mut self, landmark: Landmark, x: f32, y: f32) -> Self {
        self.points[landmark.index()] = Some(Keypoint::new(x, y, 1.0));
        self
    }

    pub fn get(&self, landmark: Landmark) -> Option<&Keypoint> {
        self.points[landmark.index()].as_ref()
    }

    /// Both landmarks of a pair, or `None` if either is missing.
    pub fn pair(&self, a: Landmark, b: Landmark) -> Option<(Keypoint, Keypoint)> {
        Some((*self.get(a)?, *self.get(b)?))
    }

    pub fn len(&self) -> usize {
        self.points.iter().filter(|p| p.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for KeypointSet {
    fn default() -> Self {
        Self::empty()
    }
}
