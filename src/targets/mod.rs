use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::GuidanceError;

/// Cryoablation needle model attached to a target. Selects the ice-ball
/// radii of the affected zone; it has no influence on channel selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NeedleType {
    IceRod,
    IceSeed,
    Unspecified,
}

impl Default for NeedleType {
    fn default() -> Self {
        NeedleType::Unspecified
    }
}

impl fmt::Display for NeedleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                NeedleType::IceRod => "ICEROD",
                NeedleType::IceSeed => "ICESEED",
                NeedleType::Unspecified => "",
            }
        )
    }
}

impl FromStr for NeedleType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_uppercase().as_str() {
            "ICEROD" => NeedleType::IceRod,
            "ICESEED" => NeedleType::IceSeed,
            _ => NeedleType::Unspecified,
        })
    }
}

/// Process-wide identity of a target list, stable across edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetListId(pub u64);

static NEXT_LIST_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_REVISION: AtomicU64 = AtomicU64::new(1);

fn next_revision() -> u64 {
    NEXT_REVISION.fetch_add(1, Ordering::Relaxed)
}

impl TargetListId {
    fn next() -> Self {
        TargetListId(NEXT_LIST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetPoint {
    pub label: String,
    pub needle_type: NeedleType,
    position: Point3<f64>,
    revision: u64,
}

impl TargetPoint {
    pub fn new(label: impl Into<String>, position: Point3<f64>, needle_type: NeedleType) -> Self {
        Self {
            label: label.into(),
            position,
            needle_type,
            revision: next_revision(),
        }
    }

    pub fn position(&self) -> Point3<f64> {
        self.position
    }

    /// Moves the target and renews its revision. The position is only
    /// writable through here, so equal revisions imply equal positions.
    pub fn set_position(&mut self, position: Point3<f64>) -> Result<(), GuidanceError> {
        if !is_finite_point(&position) {
            return Err(GuidanceError::InvalidInput(format!(
                "non-finite position {:?}",
                position
            )));
        }
        self.position = position;
        self.revision = next_revision();
        Ok(())
    }

    /// Process-unique stamp of the current position, renewed on every move.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Ordered list of uniquely labelled targets.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetList {
    id: TargetListId,
    name: String,
    targets: Vec<TargetPoint>,
}

impl TargetList {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TargetListId::next(),
            name: name.into(),
            targets: Vec::new(),
        }
    }

    pub fn from_targets(
        name: impl Into<String>,
        targets: Vec<TargetPoint>,
    ) -> Result<Self, GuidanceError> {
        let mut list = Self::new(name);
        for target in targets {
            list.push(target)?;
        }
        Ok(list)
    }

    pub fn id(&self) -> TargetListId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TargetPoint> {
        self.targets.iter()
    }

    pub fn get(&self, index: usize) -> Result<&TargetPoint, GuidanceError> {
        self.targets.get(index).ok_or(GuidanceError::TargetIndex {
            index,
            len: self.targets.len(),
        })
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.targets.iter().position(|t| t.label == label)
    }

    pub fn push(&mut self, target: TargetPoint) -> Result<usize, GuidanceError> {
        let index = self.targets.len();
        self.insert(index, target)?;
        Ok(index)
    }

    /// Inserts before `index`; targets after it shift by one and the caller
    /// has to invalidate their cached guidance.
    pub fn insert(&mut self, index: usize, target: TargetPoint) -> Result<(), GuidanceError> {
        if index > self.targets.len() {
            return Err(GuidanceError::TargetIndex {
                index,
                len: self.targets.len(),
            });
        }
        if self.index_of(&target.label).is_some() {
            return Err(GuidanceError::DuplicateLabel(target.label));
        }
        if !is_finite_point(&target.position) {
            return Err(GuidanceError::InvalidInput(format!(
                "target {} has non-finite position",
                target.label
            )));
        }
        self.targets.insert(index, target);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<TargetPoint, GuidanceError> {
        self.get(index)?;
        Ok(self.targets.remove(index))
    }

    /// Moves a target; bumps its revision so stale guidance is never served.
    pub fn set_position(
        &mut self,
        index: usize,
        position: Point3<f64>,
    ) -> Result<(), GuidanceError> {
        let len = self.targets.len();
        self.targets
            .get_mut(index)
            .ok_or(GuidanceError::TargetIndex { index, len })?
            .set_position(position)
    }

    pub fn set_needle_type(
        &mut self,
        index: usize,
        needle_type: NeedleType,
    ) -> Result<(), GuidanceError> {
        let len = self.targets.len();
        let target = self
            .targets
            .get_mut(index)
            .ok_or(GuidanceError::TargetIndex { index, len })?;
        target.needle_type = needle_type;
        Ok(())
    }

    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.targets.iter().map(|t| t.position).collect()
    }
}

pub(crate) fn is_finite_point(p: &Point3<f64>) -> bool {
    p.coords.iter().all(|v| v.is_finite())
}

/// Euclidean distance from a cursor position to every target, in list order.
pub fn cursor_distances(list: &TargetList, cursor: &Point3<f64>) -> Vec<f64> {
    list.iter()
        .map(|t| nalgebra::distance(&t.position, cursor))
        .collect()
}
