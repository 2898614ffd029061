pub mod classes;

use classes::{PyNeedlePath, PyTargetRow};
use pyo3::exceptions::{PyIndexError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::entry::run_guidance;
use crate::error::GuidanceError;
use crate::io::{write_report_json, write_table_csv};

impl From<GuidanceError> for PyErr {
    fn from(err: GuidanceError) -> PyErr {
        match err {
            GuidanceError::NotRegistered => PyRuntimeError::new_err(err.to_string()),
            GuidanceError::TargetIndex { .. } => PyIndexError::new_err(err.to_string()),
            _ => PyValueError::new_err(err.to_string()),
        }
    }
}

/// Computes needle guidance for a list of targets from files on disk.
///
/// Arguments:
///
/// - ``transform_path`` – Z-frame registration, 4x4 (or 3x4) homogeneous matrix
/// - ``targets_path`` – Intra-procedural targets as Slicer ``.fcsv``
/// - ``planning_path`` (default: None) – Planning targets as ``.fcsv``
/// - ``config_path`` (default: None) – TOML file with template and needle settings
/// - ``output_csv`` (default: None) – Write the targets table here
/// - ``output_json`` (default: None) – Write the full report here
///
/// Transform format:
///
/// .. code-block:: text
///
///    1 0 0 10.0
///    0 1 0 -5.5
///    0 0 1 30.0
///    0 0 0 1
///
/// Returns:
///
/// A 2-tuple ``(rows, needles)`` with one ``PyTargetRow`` and one
/// ``PyNeedlePath`` per target.
///
/// Example:
///
/// .. code-block:: python
///
///    import zframe_guide as zg
///    rows, needles = zg.run_guidance(
///        "case/zframe.txt", "case/intraop.fcsv", planning_path="case/plan.fcsv"
///    )
///    print(rows[0].hole, rows[0].depth_text)
#[pyfunction]
#[pyo3(
    name = "run_guidance",
    signature = (
        transform_path,
        targets_path,
        planning_path = None,
        config_path = None,
        output_csv = None,
        output_json = None,
    )
)]
pub fn run_guidance_py(
    transform_path: &str,
    targets_path: &str,
    planning_path: Option<&str>,
    config_path: Option<&str>,
    output_csv: Option<&str>,
    output_json: Option<&str>,
) -> PyResult<(Vec<PyTargetRow>, Vec<PyNeedlePath>)> {
    let report = run_guidance(config_path, transform_path, targets_path, planning_path)
        .map_err(|e| PyRuntimeError::new_err(format!("{:#}", e)))?;

    if let Some(path) = output_csv {
        write_table_csv(path, &report.targets)
            .map_err(|e| PyRuntimeError::new_err(format!("{:#}", e)))?;
    }
    if let Some(path) = output_json {
        write_report_json(path, &report)
            .map_err(|e| PyRuntimeError::new_err(format!("{:#}", e)))?;
    }

    let rows = report.targets.iter().map(PyTargetRow::from).collect();
    let needles = report.needles.iter().map(PyNeedlePath::from).collect();
    Ok((rows, needles))
}
