//! Needle and ablation-zone geometry derived from a guidance result.
//!
//! Only the numbers a renderer needs are produced here (tube segment, cone
//! placement, ellipsoid centre and radii); building and drawing primitives
//! is left to the visualization layer.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::guidance::GuidanceResult;

/// Dimensions of the rendered needle in mm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeedleModel {
    #[serde(default = "default_cone_height")]
    pub cone_height: f64,
    #[serde(default = "default_radius")]
    pub cone_radius: f64,
    #[serde(default = "default_radius")]
    pub tube_radius: f64,
    /// Distance from the needle tip to the distal end of the ice ball.
    #[serde(default = "default_offset_from_tip")]
    pub offset_from_tip: f64,
}

fn default_cone_height() -> f64 {
    5.0
}

fn default_radius() -> f64 {
    1.5
}

fn default_offset_from_tip() -> f64 {
    5.0
}

impl Default for NeedleModel {
    fn default() -> Self {
        Self {
            cone_height: default_cone_height(),
            cone_radius: default_radius(),
            tube_radius: default_radius(),
            offset_from_tip: default_offset_from_tip(),
        }
    }
}

/// Ellipsoidal ice ball around the needle tip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffectedZone {
    pub centre: Point3<f64>,
    pub radii: Vector3<f64>,
}

impl AffectedZone {
    /// Whether `point` lies inside the ellipsoid. Axes are the zone radii
    /// along the template x, y and insertion directions.
    pub fn contains(&self, point: &Point3<f64>, axes: &[Vector3<f64>; 3]) -> bool {
        if self.radii.iter().any(|r| *r <= 0.0) {
            return false;
        }
        let d = point - self.centre;
        let sum: f64 = (0..3)
            .map(|i| (d.dot(&axes[i]) / self.radii[i]).powi(2))
            .sum();
        sum <= 1.0
    }
}

/// Rendering contract for one needle insertion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeedlePath {
    pub entry: Point3<f64>,
    pub direction: Vector3<f64>,
    pub tip: Point3<f64>,
    /// Shaft from the entry point to the base of the tip cone.
    pub tube_end: Point3<f64>,
    pub zone: Option<AffectedZone>,
}

impl NeedlePath {
    pub fn from_result(result: &GuidanceResult, model: &NeedleModel, radii: Vector3<f64>) -> Self {
        let start = result.start;
        let direction = result.direction;
        let depth = result.depth;

        let zone = if radii.iter().all(|r| *r > 0.0) {
            Some(AffectedZone {
                centre: start + direction * (depth + model.offset_from_tip - radii.z),
                radii,
            })
        } else {
            None
        };

        Self {
            entry: start,
            direction,
            tip: start + direction * depth,
            tube_end: start + direction * (depth - model.cone_height),
            zone,
        }
    }

    pub fn shaft_length(&self) -> f64 {
        nalgebra::distance(&self.entry, &self.tube_end)
    }
}
