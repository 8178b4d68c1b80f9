//! Reads the upward result of a resting die.
//!
//! Face dice report the face whose world-space outward normal points most
//! nearly up. The tetrahedron rests on a face, so it is read by its highest
//! vertex instead.

use crate::builder::DieType;
use crate::calibration::CalibrationTable;
use crate::error::RollError;
use crate::physics::{ConvexShape, Pose};
use crate::roll::DieInstance;
use crate::Real;

/// Number of ids a die is read by: vertices for the d4, faces otherwise.
pub fn structural_ids(die: DieType, shape: &ConvexShape) -> usize {
    if die.reads_vertex() {
        shape.vertices().len()
    } else {
        shape.face_normals().len()
    }
}

/// Face whose world normal has the largest vertical component.
///
/// Ties keep the first face in canonical order.
pub fn top_face(shape: &ConvexShape, pose: &Pose) -> usize {
    argmax_first(
        shape
            .face_normals()
            .iter()
            .map(|n| pose.transform_normal(n).y),
    )
}

/// Vertex with the greatest world height. Ties keep the first vertex.
pub fn top_vertex(shape: &ConvexShape, pose: &Pose) -> usize {
    argmax_first(shape.vertices().iter().map(|p| pose.transform_point(p).y))
}

/// Structural id that reads up for `die` in `pose`.
pub fn top_id(die: DieType, shape: &ConvexShape, pose: &Pose) -> usize {
    if die.reads_vertex() {
        top_vertex(shape, pose)
    } else {
        top_face(shape, pose)
    }
}

/// Calibrated value showing for `die` in `pose`.
pub fn value_at(
    die: DieType,
    shape: &ConvexShape,
    pose: &Pose,
    table: &CalibrationTable,
) -> Option<u32> {
    table.value_of(top_id(die, shape, pose))
}

/// Result of a settled die.
///
/// The value is computed once when the die enters `Resolved`; repeated
/// calls return the cached value.
pub fn resolve(die: &DieInstance) -> Result<u32, RollError> {
    die.value()
}

fn argmax_first(values: impl Iterator<Item = Real>) -> usize {
    let mut best = 0;
    let mut best_value = Real::NEG_INFINITY;
    for (i, v) in values.enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}
