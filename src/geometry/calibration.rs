use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

use super::{ChannelId, TemplateGeometry};
use crate::error::GuidanceError;

/// One needle channel of the registered template, in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Channel {
    pub id: ChannelId,
    /// Intersection of the channel with the template entry plane.
    pub entry: Point3<f64>,
    /// Unit insertion direction.
    pub direction: Vector3<f64>,
}

impl Channel {
    /// Signed position of the closest approach along the channel and the
    /// perpendicular distance of `point` to the channel line.
    pub fn project(&self, point: &Point3<f64>) -> (f64, f64) {
        let offset = point - self.entry;
        let along = offset.dot(&self.direction);
        let perp = offset - self.direction * along;
        (along, perp.norm())
    }

    /// Point on the channel line at `depth` from the entry point.
    pub fn point_at(&self, depth: f64) -> Point3<f64> {
        self.entry + self.direction * depth
    }
}

/// Registered Z-frame template: the grid-to-world transform together with
/// the enumerated channels it implies.
///
/// Built once per successful registration and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationFrame {
    transform: Matrix4<f64>,
    geometry: TemplateGeometry,
    channels: Vec<Channel>,
    version: u64,
}

impl CalibrationFrame {
    pub fn new(transform: Matrix4<f64>, geometry: TemplateGeometry) -> Result<Self, GuidanceError> {
        geometry.validate()?;
        validate_transform(&transform)?;

        let local_axis = Vector3::new(0.0, 0.0, geometry.insertion_axis.sign());
        let world_axis = transform.transform_vector(&local_axis);
        let axis_norm = world_axis.norm();
        if !(axis_norm.is_finite() && axis_norm > 1e-12) {
            return Err(GuidanceError::InvalidCalibration(
                "transform collapses the insertion axis".to_string(),
            ));
        }
        let direction = world_axis / axis_norm;

        let mut channels = Vec::with_capacity(geometry.channel_count());
        for row in 0..geometry.rows {
            for column in 0..geometry.columns {
                let id = ChannelId::new(row, column);
                let (x, y) = geometry.hole_offset(id);
                let local = Point3::new(x, y, geometry.origin_offset[2]);
                channels.push(Channel {
                    id,
                    entry: transform.transform_point(&local),
                    direction,
                });
            }
        }

        Ok(Self {
            transform,
            geometry,
            channels,
            version: 0,
        })
    }

    pub(crate) fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Registration counter assigned when the frame was published; 0 if never published.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn transform(&self) -> &Matrix4<f64> {
        &self.transform
    }

    pub fn geometry(&self) -> &TemplateGeometry {
        &self.geometry
    }

    /// Channels in row-major order.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        if id.row >= self.geometry.rows || id.column >= self.geometry.columns {
            return None;
        }
        self.channels.get(id.row * self.geometry.columns + id.column)
    }
}

fn validate_transform(transform: &Matrix4<f64>) -> Result<(), GuidanceError> {
    if transform.iter().any(|v| !v.is_finite()) {
        return Err(GuidanceError::InvalidCalibration(
            "transform contains non-finite elements".to_string(),
        ));
    }
    let last_row = [transform[(3, 0)], transform[(3, 1)], transform[(3, 2)], transform[(3, 3)]];
    let expected = [0.0, 0.0, 0.0, 1.0];
    if last_row
        .iter()
        .zip(expected.iter())
        .any(|(a, b)| (a - b).abs() > 1e-9)
    {
        return Err(GuidanceError::InvalidCalibration(format!(
            "transform is not affine, last row is {:?}",
            last_row
        )));
    }
    let linear: Matrix3<f64> = transform.fixed_view::<3, 3>(0, 0).into_owned();
    if linear.determinant().abs() < 1e-12 {
        return Err(GuidanceError::InvalidCalibration(
            "transform is singular".to_string(),
        ));
    }
    Ok(())
}
