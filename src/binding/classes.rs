use nalgebra::{Matrix4, Point3};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use std::sync::Arc;

use crate::config::GuidanceConfig;
use crate::entry::NeedleRecord;
use crate::guidance::{compute_all, GuidanceResult, GuidanceSession};
use crate::needle::NeedlePath;
use crate::table::{build_rows, TargetRow};
use crate::targets::{NeedleType, TargetList, TargetPoint};

fn tuple(p: &Point3<f64>) -> (f64, f64, f64) {
    (p.x, p.y, p.z)
}

fn point(p: (f64, f64, f64)) -> Point3<f64> {
    Point3::new(p.0, p.1, p.2)
}

/// Python representation of a guidance result
///
/// Attributes:
///     hole (str): Template hole label, e.g. "D-4"
///     row (int): Zero-based template row
///     column (int): Zero-based template column
///     start (Tuple[float, float, float]): Channel entry point (RAS, mm)
///     end (Tuple[float, float, float]): Entry point advanced by the nominal channel length
///     depth (float): Signed insertion depth in mm
///     in_range (bool): Whether the depth is mechanically reachable
///     lateral_offset (float): Distance from target to channel axis in mm
#[pyclass(frozen)]
#[derive(Debug, Clone)]
pub struct PyGuidanceResult {
    #[pyo3(get)]
    pub hole: String,
    #[pyo3(get)]
    pub row: usize,
    #[pyo3(get)]
    pub column: usize,
    #[pyo3(get)]
    pub start: (f64, f64, f64),
    #[pyo3(get)]
    pub end: (f64, f64, f64),
    #[pyo3(get)]
    pub depth: f64,
    #[pyo3(get)]
    pub in_range: bool,
    #[pyo3(get)]
    pub lateral_offset: f64,
}

#[pymethods]
impl PyGuidanceResult {
    fn __repr__(&self) -> String {
        format!(
            "GuidanceResult(hole={}, depth={:.1}, in_range={}, lateral_offset={:.2})",
            self.hole, self.depth, self.in_range, self.lateral_offset
        )
    }
}

impl From<&GuidanceResult> for PyGuidanceResult {
    fn from(result: &GuidanceResult) -> Self {
        Self {
            hole: result.hole_label(),
            row: result.channel.row,
            column: result.channel.column,
            start: tuple(&result.start),
            end: tuple(&result.end),
            depth: result.depth,
            in_range: result.in_range,
            lateral_offset: result.lateral_offset,
        }
    }
}

/// Needle geometry for rendering
///
/// Attributes:
///     entry, tip, tube_end (Tuple[float, float, float]): Points along the channel
///     direction (Tuple[float, float, float]): Unit insertion direction
///     zone_centre (Tuple | None): Ice-ball centre, None without needle type
///     zone_radii (Tuple | None): Ice-ball radii (x, y, z)
#[pyclass(frozen)]
#[derive(Debug, Clone)]
pub struct PyNeedlePath {
    #[pyo3(get)]
    pub entry: (f64, f64, f64),
    #[pyo3(get)]
    pub direction: (f64, f64, f64),
    #[pyo3(get)]
    pub tip: (f64, f64, f64),
    #[pyo3(get)]
    pub tube_end: (f64, f64, f64),
    #[pyo3(get)]
    pub zone_centre: Option<(f64, f64, f64)>,
    #[pyo3(get)]
    pub zone_radii: Option<(f64, f64, f64)>,
}

impl From<&NeedlePath> for PyNeedlePath {
    fn from(path: &NeedlePath) -> Self {
        Self {
            entry: tuple(&path.entry),
            direction: (path.direction.x, path.direction.y, path.direction.z),
            tip: tuple(&path.tip),
            tube_end: tuple(&path.tube_end),
            zone_centre: path.zone.map(|z| tuple(&z.centre)),
            zone_radii: path.zone.map(|z| (z.radii.x, z.radii.y, z.radii.z)),
        }
    }
}

impl From<&NeedleRecord> for PyNeedlePath {
    fn from(record: &NeedleRecord) -> Self {
        let t = |a: [f64; 3]| (a[0], a[1], a[2]);
        Self {
            entry: t(record.entry),
            direction: t(record.direction),
            tip: t(record.tip),
            tube_end: t(record.tube_end),
            zone_centre: record.zone_centre.map(t),
            zone_radii: record.zone_radii.map(t),
        }
    }
}

#[pymethods]
impl PyNeedlePath {
    fn __repr__(&self) -> String {
        format!("NeedlePath(entry={:?}, tip={:?})", self.entry, self.tip)
    }
}

/// One row of the targets table
#[pyclass(frozen)]
#[derive(Debug, Clone)]
pub struct PyTargetRow {
    #[pyo3(get)]
    pub label: String,
    #[pyo3(get)]
    pub needle_type: String,
    #[pyo3(get)]
    pub hole: Option<String>,
    #[pyo3(get)]
    pub depth: Option<f64>,
    #[pyo3(get)]
    pub depth_text: Option<String>,
    #[pyo3(get)]
    pub in_range: Option<bool>,
    #[pyo3(get)]
    pub note: Option<String>,
    #[pyo3(get)]
    pub planning_hole: Option<String>,
    #[pyo3(get)]
    pub planning_depth: Option<f64>,
    #[pyo3(get)]
    pub hole_flagged: bool,
    #[pyo3(get)]
    pub depth_flagged: bool,
    #[pyo3(get)]
    pub cursor_distance: Option<f64>,
}

#[pymethods]
impl PyTargetRow {
    fn __repr__(&self) -> String {
        format!(
            "TargetRow(label='{}', hole={:?}, depth={:?}, in_range={:?})",
            self.label, self.hole, self.depth_text, self.in_range
        )
    }
}

impl From<&TargetRow> for PyTargetRow {
    fn from(row: &TargetRow) -> Self {
        Self {
            label: row.label.clone(),
            needle_type: row.needle_type.to_string(),
            hole: row.hole.clone(),
            depth: row.depth,
            depth_text: row.depth_text.clone(),
            in_range: row.in_range,
            note: row.note.clone(),
            planning_hole: row.planning.as_ref().map(|p| p.hole.clone()),
            planning_depth: row.planning.as_ref().map(|p| p.depth),
            hole_flagged: row.hole_flagged(),
            depth_flagged: row.depth_flagged(),
            cursor_distance: row.cursor_distance,
        }
    }
}

/// Ordered list of labelled targets (RAS, mm)
///
/// Example:
///     >>> targets = zg.PyTargetList("intraop")
///     >>> targets.add("T1", (0.0, 0.0, 60.0), "ICEROD")
///     0
#[pyclass]
#[derive(Debug, Clone)]
pub struct PyTargetList {
    pub inner: TargetList,
}

#[pymethods]
impl PyTargetList {
    #[new]
    fn new(name: &str) -> Self {
        Self {
            inner: TargetList::new(name),
        }
    }

    #[pyo3(signature = (label, position, needle_type = ""))]
    fn add(&mut self, label: &str, position: (f64, f64, f64), needle_type: &str) -> PyResult<usize> {
        let needle_type = needle_type.parse::<NeedleType>().unwrap_or_default();
        Ok(self
            .inner
            .push(TargetPoint::new(label, point(position), needle_type))?)
    }

    fn remove(&mut self, index: usize) -> PyResult<String> {
        Ok(self.inner.remove(index)?.label)
    }

    fn set_position(&mut self, index: usize, position: (f64, f64, f64)) -> PyResult<()> {
        Ok(self.inner.set_position(index, point(position))?)
    }

    fn set_needle_type(&mut self, index: usize, needle_type: &str) -> PyResult<()> {
        let needle_type = needle_type.parse::<NeedleType>().unwrap_or_default();
        Ok(self.inner.set_needle_type(index, needle_type)?)
    }

    fn position(&self, index: usize) -> PyResult<(f64, f64, f64)> {
        Ok(tuple(&self.inner.get(index)?.position()))
    }

    fn labels(&self) -> Vec<String> {
        self.inner.iter().map(|t| t.label.clone()).collect()
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __repr__(&self) -> String {
        format!(
            "TargetList(name='{}', targets={})",
            self.inner.name(),
            self.inner.len()
        )
    }
}

/// Guidance context of one case: the active Z-frame registration and the
/// cached guidance per target.
///
/// Example:
///     >>> session = zg.PyGuidanceSession()
///     >>> session.register(zframe_matrix)
///     >>> session.zframe_hole(targets, 0)
///     'G-7'
#[pyclass]
pub struct PyGuidanceSession {
    inner: Arc<GuidanceSession>,
    config: GuidanceConfig,
}

impl PyGuidanceSession {
    pub fn session(&self) -> &GuidanceSession {
        &self.inner
    }

    pub fn config(&self) -> &GuidanceConfig {
        &self.config
    }
}

fn matrix_from_rows(rows: &[Vec<f64>]) -> PyResult<Matrix4<f64>> {
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    match (rows.len(), flat.len()) {
        (4, 16) if rows.iter().all(|r| r.len() == 4) => Ok(Matrix4::from_row_slice(&flat)),
        _ => Err(PyValueError::new_err(
            "transform must be a 4x4 nested sequence of floats",
        )),
    }
}

#[pymethods]
impl PyGuidanceSession {
    #[new]
    #[pyo3(signature = (config_path = None))]
    fn new(config_path: Option<&str>) -> PyResult<Self> {
        let config = match config_path {
            Some(path) => GuidanceConfig::from_file(path)
                .map_err(|e| PyValueError::new_err(format!("{:#}", e)))?,
            None => GuidanceConfig::default(),
        };
        Ok(Self {
            inner: Arc::new(GuidanceSession::new()),
            config,
        })
    }

    /// Publish a Z-frame registration (4x4 row-major, template to RAS).
    /// Returns the frame version.
    fn register(&self, transform: Vec<Vec<f64>>) -> PyResult<u64> {
        let matrix = matrix_from_rows(&transform)?;
        Ok(self.inner.register(matrix, self.config.template.clone())?)
    }

    fn reset(&self) {
        self.inner.reset()
    }

    #[getter]
    fn is_registered(&self) -> bool {
        self.inner.is_registered()
    }

    fn compute_nearest_path(&self, target: (f64, f64, f64)) -> PyResult<PyGuidanceResult> {
        let result = self.inner.compute_nearest_path(&point(target))?;
        Ok((&result).into())
    }

    fn guidance(&self, targets: PyRef<'_, PyTargetList>, index: usize) -> PyResult<PyGuidanceResult> {
        let result = self.inner.guidance(&targets.inner, index)?;
        Ok((&result).into())
    }

    /// Uncached guidance for every target, computed in parallel.
    fn compute_all(&self, targets: PyRef<'_, PyTargetList>) -> PyResult<Vec<PyGuidanceResult>> {
        let frame = self.inner.frame()?;
        compute_all(&frame, &targets.inner)
            .iter()
            .map(|r| match r {
                Ok(result) => Ok(result.into()),
                Err(e) => Err(e.clone().into()),
            })
            .collect()
    }

    fn zframe_hole(&self, targets: PyRef<'_, PyTargetList>, index: usize) -> PyResult<String> {
        Ok(self.inner.zframe_hole(&targets.inner, index)?)
    }

    /// Depth as display text ("60.0") or, with ``as_string=False``, as float.
    #[pyo3(signature = (targets, index, as_string = true))]
    fn zframe_depth(
        &self,
        py: Python<'_>,
        targets: PyRef<'_, PyTargetList>,
        index: usize,
        as_string: bool,
    ) -> PyResult<Py<PyAny>> {
        if as_string {
            let text = self.inner.zframe_depth_text(&targets.inner, index)?;
            Ok(text.into_pyobject(py)?.into_any().unbind())
        } else {
            let depth = self.inner.zframe_depth(&targets.inner, index)?;
            Ok(depth.into_pyobject(py)?.into_any().unbind())
        }
    }

    fn zframe_depth_in_range(&self, targets: PyRef<'_, PyTargetList>, index: usize) -> PyResult<bool> {
        Ok(self.inner.zframe_depth_in_range(&targets.inner, index)?)
    }

    fn needle_snap_position(
        &self,
        targets: PyRef<'_, PyTargetList>,
        index: usize,
    ) -> PyResult<(f64, f64, f64)> {
        Ok(tuple(&self.inner.needle_snap_position(&targets.inner, index)?))
    }

    fn needle_path(&self, targets: PyRef<'_, PyTargetList>, index: usize) -> PyResult<PyNeedlePath> {
        let result = self.inner.guidance(&targets.inner, index)?;
        let needle_type = targets.inner.get(index)?.needle_type;
        let path = NeedlePath::from_result(
            &result,
            &self.config.needle,
            self.config.ice_ball.radii(needle_type),
        );
        Ok((&path).into())
    }

    fn invalidate_target(&self, targets: PyRef<'_, PyTargetList>, index: usize) {
        self.inner.invalidate_target(targets.inner.id(), index)
    }

    fn invalidate_list(&self, targets: PyRef<'_, PyTargetList>) {
        self.inner.invalidate_list(targets.inner.id())
    }

    /// Drop cached guidance of `targets` that went stale after edits or removals.
    fn prune(&self, targets: PyRef<'_, PyTargetList>) {
        self.inner.prune_list(&targets.inner)
    }

    /// Rows of the targets table, optionally compared against a planning list.
    #[pyo3(signature = (targets, planning = None, cursor = None))]
    fn table(
        &self,
        targets: PyRef<'_, PyTargetList>,
        planning: Option<PyRef<'_, PyTargetList>>,
        cursor: Option<(f64, f64, f64)>,
    ) -> PyResult<Vec<PyTargetRow>> {
        let cursor = cursor.map(point);
        let rows = build_rows(
            &self.inner,
            &targets.inner,
            planning.as_ref().map(|p| &p.inner),
            cursor.as_ref(),
            &self.config.table,
        )?;
        Ok(rows.iter().map(PyTargetRow::from).collect())
    }
}
