pub mod binding;
pub mod config;
pub mod entry;
pub mod error;
pub mod geometry;
pub mod guidance;
pub mod io;
pub mod needle;
pub mod table;
pub mod targets;
pub mod utils;

pub use config::GuidanceConfig;
pub use error::GuidanceError;
pub use geometry::{CalibrationFrame, ChannelId, InsertionAxis, TemplateGeometry};
pub use guidance::{compute_nearest_path, GuidanceResult, GuidanceSession};
pub use targets::{NeedleType, TargetList, TargetPoint};

use binding::classes::{
    PyGuidanceResult, PyGuidanceSession, PyNeedlePath, PyTargetList, PyTargetRow,
};
use binding::run_guidance_py;
use pyo3::prelude::*;
use pyo3::wrap_pyfunction;

#[pymodule]
fn zframe_guide(_py: Python, m: pyo3::prelude::Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add_function(wrap_pyfunction!(run_guidance_py, m.clone())?)?;

    m.add_class::<PyGuidanceSession>()?;
    m.add_class::<PyTargetList>()?;
    m.add_class::<PyGuidanceResult>()?;
    m.add_class::<PyTargetRow>()?;
    m.add_class::<PyNeedlePath>()?;
    Ok(())
}
