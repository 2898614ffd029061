pub mod calibration;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GuidanceError;

pub use calibration::{CalibrationFrame, Channel};

/// Direction of needle insertion in template-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsertionAxis {
    #[serde(rename = "+z")]
    PlusZ,
    #[serde(rename = "-z")]
    MinusZ,
}

impl InsertionAxis {
    pub fn sign(&self) -> f64 {
        match self {
            InsertionAxis::PlusZ => 1.0,
            InsertionAxis::MinusZ => -1.0,
        }
    }
}

impl Default for InsertionAxis {
    fn default() -> Self {
        InsertionAxis::PlusZ
    }
}

/// Physical layout of the needle template mounted on the Z-frame.
///
/// All lengths in mm. Holes form a `rows` x `columns` lattice centred on
/// `origin_offset` in the local XY plane; columns advance along local X,
/// rows along local Y.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateGeometry {
    #[serde(default = "default_rows")]
    pub rows: usize,
    #[serde(default = "default_columns")]
    pub columns: usize,
    #[serde(default = "default_spacing")]
    pub spacing: f64,
    #[serde(default = "default_hole_diameter")]
    pub hole_diameter: f64,
    #[serde(default)]
    pub min_depth: f64,
    #[serde(default = "default_max_depth")]
    pub max_depth: f64,
    #[serde(default = "default_channel_length")]
    pub nominal_channel_length: f64,
    #[serde(default)]
    pub origin_offset: [f64; 3],
    #[serde(default)]
    pub insertion_axis: InsertionAxis,
}

fn default_rows() -> usize {
    13
}

fn default_columns() -> usize {
    13
}

fn default_spacing() -> f64 {
    5.0
}

fn default_hole_diameter() -> f64 {
    2.0
}

fn default_max_depth() -> f64 {
    150.0
}

fn default_channel_length() -> f64 {
    150.0
}

impl Default for TemplateGeometry {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            columns: default_columns(),
            spacing: default_spacing(),
            hole_diameter: default_hole_diameter(),
            min_depth: 0.0,
            max_depth: default_max_depth(),
            nominal_channel_length: default_channel_length(),
            origin_offset: [0.0; 3],
            insertion_axis: InsertionAxis::default(),
        }
    }
}

impl TemplateGeometry {
    pub fn validate(&self) -> Result<(), GuidanceError> {
        if self.rows == 0 || self.columns == 0 {
            return Err(GuidanceError::InvalidCalibration(format!(
                "template needs at least one hole, got {}x{}",
                self.rows, self.columns
            )));
        }
        if !(self.spacing.is_finite() && self.spacing > 0.0) {
            return Err(GuidanceError::InvalidCalibration(format!(
                "hole spacing must be positive, got {}",
                self.spacing
            )));
        }
        if !(self.hole_diameter.is_finite() && self.hole_diameter >= 0.0) {
            return Err(GuidanceError::InvalidCalibration(format!(
                "hole diameter must be non-negative, got {}",
                self.hole_diameter
            )));
        }
        if !(self.min_depth.is_finite() && self.max_depth.is_finite())
            || self.min_depth > self.max_depth
        {
            return Err(GuidanceError::InvalidCalibration(format!(
                "invalid depth range [{}, {}]",
                self.min_depth, self.max_depth
            )));
        }
        if !(self.nominal_channel_length.is_finite() && self.nominal_channel_length > 0.0) {
            return Err(GuidanceError::InvalidCalibration(format!(
                "nominal channel length must be positive, got {}",
                self.nominal_channel_length
            )));
        }
        if self.origin_offset.iter().any(|v| !v.is_finite()) {
            return Err(GuidanceError::InvalidCalibration(
                "template origin offset must be finite".to_string(),
            ));
        }
        Ok(())
    }

    pub fn channel_count(&self) -> usize {
        self.rows * self.columns
    }

    /// Whether a depth lies in the reachable interval, bounds included.
    pub fn depth_in_range(&self, depth: f64) -> bool {
        self.min_depth <= depth && depth <= self.max_depth
    }

    /// Template-local (x, y) of a hole centre.
    pub fn hole_offset(&self, id: ChannelId) -> (f64, f64) {
        let cx = (self.columns as f64 - 1.0) / 2.0;
        let cy = (self.rows as f64 - 1.0) / 2.0;
        (
            self.origin_offset[0] + (id.column as f64 - cx) * self.spacing,
            self.origin_offset[1] + (id.row as f64 - cy) * self.spacing,
        )
    }
}

/// Lattice position of a template hole, zero-based.
///
/// Ordering is lexicographic on (row, column), which is also the
/// enumeration order of channels in a `CalibrationFrame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId {
    pub row: usize,
    pub column: usize,
}

impl ChannelId {
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }

    /// Spreadsheet-style letters for the column: 0 -> "A", 25 -> "Z", 26 -> "AA".
    pub fn column_letters(&self) -> String {
        let mut n = self.column + 1;
        let mut letters = Vec::new();
        while n > 0 {
            let rem = (n - 1) % 26;
            letters.push((b'A' + rem as u8) as char);
            n = (n - 1) / 26;
        }
        letters.iter().rev().collect()
    }

    /// Hole label shown to the operator, e.g. "A-3" for column 0, row 2.
    pub fn label(&self) -> String {
        format!("{}-{}", self.column_letters(), self.row + 1)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod geometry_tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_channel_labels() {
        assert_eq!(ChannelId::new(2, 0).label(), "A-3");
        assert_eq!(ChannelId::new(0, 25).label(), "Z-1");
        assert_eq!(ChannelId::new(0, 26).label(), "AA-1");
        assert_eq!(ChannelId::new(12, 27).to_string(), "AB-13");
    }

    #[test]
    fn test_channel_ordering_is_row_major() {
        let mut ids = vec![
            ChannelId::new(1, 0),
            ChannelId::new(0, 5),
            ChannelId::new(0, 1),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![ChannelId::new(0, 1), ChannelId::new(0, 5), ChannelId::new(1, 0)]
        );
    }

    #[test]
    fn test_hole_offset_centred_lattice() {
        let geometry = TemplateGeometry {
            rows: 7,
            columns: 7,
            ..Default::default()
        };
        let (x, y) = geometry.hole_offset(ChannelId::new(3, 3));
        assert_relative_eq!(x, 0.0);
        assert_relative_eq!(y, 0.0);
        let (x, y) = geometry.hole_offset(ChannelId::new(0, 5));
        assert_relative_eq!(x, 10.0);
        assert_relative_eq!(y, -15.0);
    }

    #[test]
    fn test_depth_range_inclusive() {
        let geometry = TemplateGeometry {
            min_depth: 0.0,
            max_depth: 120.0,
            ..Default::default()
        };
        assert!(geometry.depth_in_range(0.0));
        assert!(geometry.depth_in_range(120.0));
        assert!(!geometry.depth_in_range(-1e-9));
        assert!(!geometry.depth_in_range(120.0 + 1e-9));
    }

    #[test]
    fn test_validate_rejects_bad_geometry() {
        let empty = TemplateGeometry {
            rows: 0,
            ..Default::default()
        };
        assert!(empty.validate().is_err());

        let inverted = TemplateGeometry {
            min_depth: 10.0,
            max_depth: 5.0,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());

        let nan_spacing = TemplateGeometry {
            spacing: f64::NAN,
            ..Default::default()
        };
        assert!(nan_spacing.validate().is_err());

        assert!(TemplateGeometry::default().validate().is_ok());
    }
}
