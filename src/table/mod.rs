//! Rows of the targets table as the display layer renders them.

use nalgebra::Point3;
use serde::Serialize;

use crate::config::TableSettings;
use crate::error::GuidanceError;
use crate::guidance::{GuidanceResult, GuidanceSession};
use crate::targets::{cursor_distances, NeedleType, TargetList};

pub const OUT_OF_RANGE_NOTE: &str = "Current depth: out of range";

/// Hole and depth a target had in the planning (cover prostate) list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanningComparison {
    pub hole: String,
    pub depth: f64,
    pub hole_matches: bool,
    pub depth_matches: bool,
}

impl PlanningComparison {
    pub fn new(current: &GuidanceResult, planned: &GuidanceResult, depth_tolerance: f64) -> Self {
        Self {
            hole: planned.hole_label(),
            depth: planned.depth,
            hole_matches: current.channel == planned.channel,
            depth_matches: depths_match(current.depth, planned.depth, depth_tolerance),
        }
    }

    pub fn hole_note(&self) -> Option<String> {
        if self.hole_matches {
            None
        } else {
            Some(format!("Planning hole: {}", self.hole))
        }
    }

    pub fn depth_note(&self) -> String {
        format!("Planning depth: '{:.1}'", self.depth)
    }
}

/// Depths are considered equal when they differ by at most `tolerance` mm
/// (or by a relative 1e-9 for very large values).
pub fn depths_match(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= (1e-9 * a.abs().max(b.abs())).max(tolerance)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetRow {
    pub label: String,
    pub needle_type: NeedleType,
    pub position: [f64; 3],
    /// Guidance columns stay empty until the Z-frame is registered.
    pub hole: Option<String>,
    pub depth: Option<f64>,
    pub depth_text: Option<String>,
    pub in_range: Option<bool>,
    pub note: Option<String>,
    pub planning: Option<PlanningComparison>,
    pub cursor_distance: Option<f64>,
}

impl TargetRow {
    /// Whether the display should flag the hole cell.
    pub fn hole_flagged(&self) -> bool {
        self.planning.as_ref().is_some_and(|p| !p.hole_matches)
    }

    /// Whether the display should flag the depth cell.
    pub fn depth_flagged(&self) -> bool {
        self.in_range == Some(false) || self.planning.as_ref().is_some_and(|p| !p.depth_matches)
    }
}

/// Build the table rows for `targets`.
///
/// `planning` is compared row by row (same index) when it is a different
/// list. Without a registration the guidance columns are left empty rather
/// than defaulted.
pub fn build_rows(
    session: &GuidanceSession,
    targets: &TargetList,
    planning: Option<&TargetList>,
    cursor: Option<&Point3<f64>>,
    settings: &TableSettings,
) -> Result<Vec<TargetRow>, GuidanceError> {
    let registered = session.is_registered();
    let planning = planning.filter(|p| p.id() != targets.id());
    let distances = cursor.map(|c| cursor_distances(targets, c));

    let mut rows = Vec::with_capacity(targets.len());
    for (index, target) in targets.iter().enumerate() {
        let position = target.position();
        let mut row = TargetRow {
            label: target.label.clone(),
            needle_type: target.needle_type,
            position: [position.x, position.y, position.z],
            hole: None,
            depth: None,
            depth_text: None,
            in_range: None,
            note: None,
            planning: None,
            cursor_distance: distances.as_ref().map(|d| d[index]),
        };

        if registered {
            let result = match session.guidance(targets, index) {
                Ok(result) => result,
                // registration dropped while building the table
                Err(GuidanceError::NotRegistered) => {
                    rows.push(row);
                    continue;
                }
                Err(e) => return Err(e),
            };
            row.hole = Some(result.hole_label());
            row.depth = Some(result.depth);
            row.depth_text = Some(result.depth_text());
            row.in_range = Some(result.in_range);
            if !result.in_range {
                row.note = Some(OUT_OF_RANGE_NOTE.to_string());
            }

            if let Some(planning) = planning {
                if index < planning.len() {
                    let planned = session.guidance(planning, index)?;
                    row.planning = Some(PlanningComparison::new(
                        &result,
                        &planned,
                        settings.depth_tolerance,
                    ));
                }
            }
        }
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod table_tests {
    use super::*;
    use crate::targets::TargetPoint;
    use crate::utils::test_utils::{registered_session, sample_targets};
    use approx::assert_relative_eq;

    #[test]
    fn test_depths_match() {
        assert!(depths_match(60.0, 60.4, 0.5));
        assert!(depths_match(60.0, 60.5, 0.5));
        assert!(!depths_match(60.0, 60.6, 0.5));
        assert!(depths_match(1e12, 1e12 + 100.0, 0.5));
    }

    #[test]
    fn test_rows_without_registration() {
        let session = GuidanceSession::new();
        let targets = sample_targets();
        let rows = build_rows(&session, &targets, None, None, &TableSettings::default()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].label, "T1");
        assert!(rows.iter().all(|r| r.hole.is_none() && r.depth.is_none()));
        assert!(!rows[0].depth_flagged());
    }

    #[test]
    fn test_rows_with_registration() {
        let session = registered_session();
        let targets = sample_targets();
        let cursor = Point3::new(0.0, 0.0, 60.0);
        let rows = build_rows(
            &session,
            &targets,
            None,
            Some(&cursor),
            &TableSettings::default(),
        )
        .unwrap();

        assert_eq!(rows[0].hole.as_deref(), Some("D-4"));
        assert_eq!(rows[0].depth_text.as_deref(), Some("60.0"));
        assert_eq!(rows[0].in_range, Some(true));
        assert!(rows[0].note.is_none());
        assert_relative_eq!(rows[1].cursor_distance.unwrap(), 12.0);

        assert_eq!(rows[2].in_range, Some(false));
        assert_eq!(rows[2].note.as_deref(), Some(OUT_OF_RANGE_NOTE));
        assert!(rows[2].depth_flagged());
    }

    #[test]
    fn test_planning_comparison() {
        let session = registered_session();
        let targets = sample_targets();
        let planning = TargetList::from_targets(
            "cover prostate",
            vec![
                TargetPoint::new("T1", Point3::new(0.3, 0.2, 60.3), NeedleType::IceRod),
                TargetPoint::new("T2", Point3::new(4.0, 0.0, 62.0), NeedleType::IceRod),
            ],
        )
        .unwrap();

        let rows = build_rows(
            &session,
            &targets,
            Some(&planning),
            None,
            &TableSettings::default(),
        )
        .unwrap();

        let first = rows[0].planning.as_ref().unwrap();
        assert!(first.hole_matches);
        assert!(first.depth_matches);
        assert!(first.hole_note().is_none());
        assert!(!rows[0].hole_flagged());

        let second = rows[1].planning.as_ref().unwrap();
        assert_eq!(second.hole, "E-4");
        assert!(!second.hole_matches);
        assert!(!second.depth_matches);
        assert_eq!(second.hole_note().as_deref(), Some("Planning hole: E-4"));
        assert_eq!(second.depth_note(), "Planning depth: '62.0'");
        assert!(rows[1].hole_flagged());

        // planning list shorter than current list
        assert!(rows[2].planning.is_none());
    }

    #[test]
    fn test_same_list_is_not_compared() {
        let session = registered_session();
        let targets = sample_targets();
        let rows = build_rows(
            &session,
            &targets,
            Some(&targets),
            None,
            &TableSettings::default(),
        )
        .unwrap();
        assert!(rows.iter().all(|r| r.planning.is_none()));
    }
}
