pub mod session;

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use serde::Serialize;

use crate::error::GuidanceError;
use crate::geometry::{CalibrationFrame, ChannelId};
use crate::targets::{is_finite_point, TargetList};

pub use session::GuidanceSession;

/// Perpendicular distances closer than this are treated as equal; the
/// channel enumerated first (lowest row, then column) wins.
pub const TIE_EPSILON: f64 = 1e-6;

/// Needle guidance for one target through one registered template.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuidanceResult {
    pub channel: ChannelId,
    /// Channel entry point on the template plane (world coordinates).
    pub start: Point3<f64>,
    /// Entry point advanced by the nominal channel length; only meaningful as a direction.
    pub end: Point3<f64>,
    pub direction: Vector3<f64>,
    /// Signed distance from `start` to the closest approach of the target along the channel.
    pub depth: f64,
    pub in_range: bool,
    /// Perpendicular distance from the target to the channel line.
    pub lateral_offset: f64,
}

impl GuidanceResult {
    /// Where the needle tip ends up: the point on the channel closest to the target.
    pub fn tip(&self) -> Point3<f64> {
        self.start + self.direction * self.depth
    }

    pub fn hole_label(&self) -> String {
        self.channel.label()
    }

    pub fn depth_text(&self) -> String {
        format!("{:.1}", self.depth)
    }
}

/// Serializable view of a `GuidanceResult`, used for reports and bindings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuidanceRecord {
    pub hole: String,
    pub row: usize,
    pub column: usize,
    pub start: [f64; 3],
    pub end: [f64; 3],
    pub depth: f64,
    pub in_range: bool,
    pub lateral_offset: f64,
}

impl From<&GuidanceResult> for GuidanceRecord {
    fn from(result: &GuidanceResult) -> Self {
        Self {
            hole: result.hole_label(),
            row: result.channel.row,
            column: result.channel.column,
            start: [result.start.x, result.start.y, result.start.z],
            end: [result.end.x, result.end.y, result.end.z],
            depth: result.depth,
            in_range: result.in_range,
            lateral_offset: result.lateral_offset,
        }
    }
}

/// Select the template channel laterally closest to `target` and the
/// insertion depth along it.
///
/// Channel selection uses only the perpendicular distance to each channel
/// line; the depth range is reported through `in_range` and never changes
/// the selected channel.
pub fn compute_nearest_path(
    frame: &CalibrationFrame,
    target: &Point3<f64>,
) -> Result<GuidanceResult, GuidanceError> {
    if !is_finite_point(target) {
        return Err(GuidanceError::InvalidInput(format!(
            "target position must be finite, got ({}, {}, {})",
            target.x, target.y, target.z
        )));
    }

    let projections: Vec<(f64, f64)> = frame
        .channels()
        .iter()
        .map(|channel| channel.project(target))
        .collect();
    let min_perp = projections
        .iter()
        .map(|(_, perp)| *perp)
        .fold(f64::INFINITY, f64::min);

    // channels are stored row-major: the first one within tolerance of the
    // minimum is the lowest (row, column)
    let (index, (depth, lateral_offset)) = projections
        .iter()
        .copied()
        .enumerate()
        .find(|(_, (_, perp))| *perp <= min_perp + TIE_EPSILON)
        .ok_or_else(|| GuidanceError::InvalidCalibration("template has no channels".to_string()))?;
    let channel = &frame.channels()[index];
    let geometry = frame.geometry();

    Ok(GuidanceResult {
        channel: channel.id,
        start: channel.entry,
        end: channel.point_at(geometry.nominal_channel_length),
        direction: channel.direction,
        depth,
        in_range: geometry.depth_in_range(depth),
        lateral_offset,
    })
}

/// Guidance for every target of a list, in list order, computed in parallel.
pub fn compute_all(
    frame: &CalibrationFrame,
    targets: &TargetList,
) -> Vec<Result<GuidanceResult, GuidanceError>> {
    let positions = targets.positions();
    positions
        .par_iter()
        .map(|p| compute_nearest_path(frame, p))
        .collect()
}
