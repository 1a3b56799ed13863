//! Geometric analysis over detected keypoints.
//!
//! Pure functions: no I/O, no state. Missing data degrades to the neutral
//! classification, never to an error.

pub mod findings;
pub mod hindfoot;
pub mod symmetry;

pub use findings::*;
pub use hindfoot::{analyze_hindfoot_alignment, HindfootAlignment, HindfootFindings};
pub use symmetry::{analyze_frontal_symmetry, FrontalSymmetry, LevelRegion, Levelness};
