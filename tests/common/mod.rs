#![allow(dead_code)]

use nalgebra::{Matrix4, Point3, Translation3};
use std::sync::Once;

use zframe_guide::{GuidanceSession, NeedleType, TargetList, TargetPoint, TemplateGeometry};

static LOGGER: Once = Once::new();

pub fn init_logging() {
    LOGGER.call_once(|| {
        let _ = simple_logger::SimpleLogger::new()
            .with_level(log::LevelFilter::Debug)
            .init();
    });
}

/// 7x7 lattice, 5 mm pitch, reachable depth [0, 120] mm, inserting along +Z.
pub fn scenario_template() -> TemplateGeometry {
    TemplateGeometry {
        rows: 7,
        columns: 7,
        spacing: 5.0,
        min_depth: 0.0,
        max_depth: 120.0,
        ..Default::default()
    }
}

pub fn session_with(transform: Matrix4<f64>) -> GuidanceSession {
    init_logging();
    let session = GuidanceSession::new();
    session
        .register(transform, scenario_template())
        .expect("registration succeeds");
    session
}

pub fn shifted(z: f64) -> Matrix4<f64> {
    Translation3::new(0.0, 0.0, z).to_homogeneous()
}

pub fn scenario_targets() -> TargetList {
    TargetList::from_targets(
        "intraop",
        vec![
            TargetPoint::new("T1", Point3::new(0.0, 0.0, 60.0), NeedleType::IceRod),
            TargetPoint::new("T2", Point3::new(12.0, 0.0, 60.0), NeedleType::IceSeed),
            TargetPoint::new("T3", Point3::new(0.0, 0.0, -5.0), NeedleType::Unspecified),
        ],
    )
    .expect("labels are unique")
}
