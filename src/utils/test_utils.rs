use nalgebra::{Matrix4, Point3, Rotation3, Translation3, Vector3};

use crate::geometry::{CalibrationFrame, TemplateGeometry};
use crate::guidance::GuidanceSession;
use crate::targets::{NeedleType, TargetList, TargetPoint};

/// 7x7 template, 5 mm spacing, reachable depth [0, 120] mm.
pub fn small_template() -> TemplateGeometry {
    TemplateGeometry {
        rows: 7,
        columns: 7,
        spacing: 5.0,
        min_depth: 0.0,
        max_depth: 120.0,
        ..Default::default()
    }
}

/// Template registered at the world origin, inserting along +Z.
pub fn identity_frame() -> CalibrationFrame {
    CalibrationFrame::new(Matrix4::identity(), small_template())
        .expect("identity frame is valid")
}

/// Template tilted by 20 deg about an oblique axis and shifted into the patient.
pub fn rotated_frame() -> CalibrationFrame {
    let axis = nalgebra::Unit::new_normalize(Vector3::new(1.0, -2.0, 0.5));
    let rotation = Rotation3::from_axis_angle(&axis, 20f64.to_radians());
    let translation = Translation3::new(-12.0, 40.0, -85.0);
    CalibrationFrame::new(
        translation.to_homogeneous() * rotation.to_homogeneous(),
        small_template(),
    )
    .expect("rotated frame is valid")
}

pub fn registered_session() -> GuidanceSession {
    let session = GuidanceSession::new();
    session
        .register(Matrix4::identity(), small_template())
        .expect("identity registration succeeds");
    session
}

/// T1 on the centre channel, T2 two columns right, T3 above the entry plane.
pub fn sample_targets() -> TargetList {
    TargetList::from_targets(
        "intraop",
        vec![
            TargetPoint::new("T1", Point3::new(0.0, 0.0, 60.0), NeedleType::IceRod),
            TargetPoint::new("T2", Point3::new(12.0, 0.0, 60.0), NeedleType::IceSeed),
            TargetPoint::new("T3", Point3::new(0.0, 0.0, -5.0), NeedleType::Unspecified),
        ],
    )
    .expect("sample labels are unique")
}
