//! Per-view drawing protocol.
//!
//! Annotation is split in two steps: [`plan`] turns keypoints into a list of
//! pixel-space primitives, [`render`] rasterizes them. The plan is fixed per
//! view and is what tests assert on.
//!
//! Frontal: markers at ears, shoulders, elbows, hips, knees and ankles; a
//! straight line across each bilateral pair; a polyline through the pair
//! midpoints; a plumb line from the ankle midpoint to the top of the frame.
//!
//! Lateral: ear → shoulder → hip → knee → ankle chain on the side facing the
//! camera, markers at each joint, vertical reference from the ankle.
//!
//! Rear: ankle and heel markers with an ankle-heel segment per foot and a
//! short vertical reference through each heel.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

use crate::pipeline::landmarks::{KeypointSet, Landmark, ViewType};

pub const MARKER_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
pub const LINE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const FRONTAL_PLUMB_COLOR: Rgb<u8> = Rgb([50, 205, 50]);
pub const LATERAL_PLUMB_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

pub const MARKER_RADIUS: i32 = 6;
pub const LINE_THICKNESS: i32 = 2;
/// Plumb lines start this many pixels below the ankle reference point.
pub const PLUMB_BELOW_ANKLE: i32 = 50;
/// Plumb lines end at this row rather than exactly at the border.
pub const PLUMB_TOP: i32 = 1;
pub const HEEL_REFERENCE_ABOVE: i32 = 60;
pub const HEEL_REFERENCE_BELOW: i32 = 20;

/// Bilateral pairs drawn on a frontal view, top to bottom.
pub const FRONTAL_PAIRS: [(Landmark, Landmark); 6] = [
    (Landmark::LeftEar, Landmark::RightEar),
    (Landmark::LeftShoulder, Landmark::RightShoulder),
    (Landmark::LeftElbow, Landmark::RightElbow),
    (Landmark::LeftHip, Landmark::RightHip),
    (Landmark::LeftKnee, Landmark::RightKnee),
    (Landmark::LeftAnkle, Landmark::RightAnkle),
];

/// Landmark chain for a lateral view. The camera sees the patient's opposite
/// flank, so a right-lateral photograph uses the left-side landmarks.
pub fn lateral_chain(view: ViewType) -> Option<[Landmark; 5]> {
    match view {
        ViewType::LateralRight => Some([
            Landmark::LeftEar,
            Landmark::LeftShoulder,
            Landmark::LeftHip,
            Landmark::LeftKnee,
            Landmark::LeftAnkle,
        ]),
        ViewType::LateralLeft => Some([
            Landmark::RightEar,
            Landmark::RightShoulder,
            Landmark::RightHip,
            Landmark::RightKnee,
            Landmark::RightAnkle,
        ]),
        _ => None,
    }
}

pub type Point = (i32, i32);

/// One drawing instruction in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Marker { center: Point, color: Rgb<u8> },
    Segment { from: Point, to: Point, color: Rgb<u8> },
}

struct Planner<'a> {
    keypoints: &'a KeypointSet,
    width: u32,
    height: u32,
    out: Vec<Primitive>,
}

impl<'a> Planner<'a> {
    fn point(&self, landmark: Landmark) -> Option<Point> {
        self.keypoints
            .get(landmark)
            .map(|kp| kp.to_pixel(self.width, self.height))
    }

    fn marker(&mut self, center: Point) {
        self.out.push(Primitive::Marker {
            center,
            color: MARKER_COLOR,
        });
    }

    fn segment(&mut self, from: Point, to: Point, color: Rgb<u8>) {
        self.out.push(Primitive::Segment { from, to, color });
    }

    fn plumb(&mut self, foot: Point, color: Rgb<u8>) {
        let bottom = (foot.1 + PLUMB_BELOW_ANKLE).min(self.height as i32 - 1);
        self.segment((foot.0, bottom), (foot.0, PLUMB_TOP), color);
    }
}

fn midpoint(a: Point, b: Point) -> Point {
    ((a.0 + b.0) / 2, (a.1 + b.1) / 2)
}

fn plan_frontal(p: &mut Planner) {
    let mut midpoints = Vec::with_capacity(FRONTAL_PAIRS.len());
    let mut ankle_mid = None;

    for (left, right) in FRONTAL_PAIRS {
        if let (Some(l), Some(r)) = (p.point(left), p.point(right)) {
            p.segment(l, r, LINE_COLOR);
            let mid = midpoint(l, r);
            midpoints.push(mid);
            if left == Landmark::LeftAnkle {
                ankle_mid = Some(mid);
            }
        }
    }

    for pair in midpoints.windows(2) {
        p.segment(pair[0], pair[1], LINE_COLOR);
    }

    if let Some(mid) = ankle_mid {
        p.plumb(mid, FRONTAL_PLUMB_COLOR);
    }

    for (left, right) in FRONTAL_PAIRS {
        for landmark in [left, right] {
            if let Some(pt) = p.point(landmark) {
                p.marker(pt);
            }
        }
    }
}

fn plan_lateral(p: &mut Planner, chain: [Landmark; 5]) {
    let points: Vec<Point> = chain.iter().filter_map(|&lm| p.point(lm)).collect();

    for pair in points.windows(2) {
        p.segment(pair[0], pair[1], LINE_COLOR);
    }

    if let Some(ankle) = p.point(chain[4]) {
        p.plumb(ankle, LATERAL_PLUMB_COLOR);
    }

    for pt in points {
        p.marker(pt);
    }
}

fn plan_rear(p: &mut Planner) {
    let feet = [
        (Landmark::LeftAnkle, Landmark::LeftHeel),
        (Landmark::RightAnkle, Landmark::RightHeel),
    ];

    for (ankle, heel) in feet {
        let a = p.point(ankle);
        let h = p.point(heel);
        if let (Some(a), Some(h)) = (a, h) {
            p.segment(a, h, LINE_COLOR);
        }
        if let Some(h) = h {
            let bottom = (h.1 + HEEL_REFERENCE_BELOW).min(p.height as i32 - 1);
            let top = (h.1 - HEEL_REFERENCE_ABOVE).max(PLUMB_TOP);
            p.segment((h.0, bottom), (h.0, top), FRONTAL_PLUMB_COLOR);
        }
        for pt in [a, h].into_iter().flatten() {
            p.marker(pt);
        }
    }
}

/// Drawing plan for one view. Lines come before markers so joints stay visible.
pub fn plan(keypoints: &KeypointSet, view: ViewType, width: u32, height: u32) -> Vec<Primitive> {
    let mut planner = Planner {
        keypoints,
        width,
        height,
        out: Vec::new(),
    };
    match view {
        ViewType::Frontal => plan_frontal(&mut planner),
        ViewType::LateralLeft | ViewType::LateralRight => {
            if let Some(chain) = lateral_chain(view) {
                plan_lateral(&mut planner, chain);
            }
        }
        ViewType::Rear => plan_rear(&mut planner),
        ViewType::None => {}
    }
    planner.out
}

fn draw_thick_segment(image: &mut RgbImage, from: Point, to: Point, color: Rgb<u8>) {
    let steep = (to.1 - from.1).abs() >= (to.0 - from.0).abs();
    for offset in 0..LINE_THICKNESS {
        let (dx, dy) = if steep { (offset, 0) } else { (0, offset) };
        draw_line_segment_mut(
            image,
            ((from.0 + dx) as f32, (from.1 + dy) as f32),
            ((to.0 + dx) as f32, (to.1 + dy) as f32),
            color,
        );
    }
}

/// Rasterize a plan onto the image in order.
pub fn render(image: &mut RgbImage, primitives: &[Primitive]) {
    for primitive in primitives {
        match *primitive {
            Primitive::Marker { center, color } => {
                draw_filled_circle_mut(image, center, MARKER_RADIUS, color);
            }
            Primitive::Segment { from, to, color } => draw_thick_segment(image, from, to, color),
        }
    }
}

/// Plan and render in one step. Returns the number of primitives drawn.
pub fn annotate(image: &mut RgbImage, keypoints: &KeypointSet, view: ViewType) -> usize {
    let primitives = plan(keypoints, view, image.width(), image.height());
    render(image, &primitives);
    primitives.len()
}
