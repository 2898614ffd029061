//! Case-level guidance context.
//!
//! A `GuidanceSession` owns the active calibration frame of a case and a
//! memo of guidance results per target. Registration publishes a new frame
//! and drops every cached result in the same critical section; target edits
//! are picked up through the target revision stored with each entry, and
//! callers may additionally invalidate entries explicitly.

use nalgebra::{Matrix4, Point3};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{compute_nearest_path, GuidanceResult};
use crate::error::GuidanceError;
use crate::geometry::{CalibrationFrame, TemplateGeometry};
use crate::targets::{TargetList, TargetListId, TargetPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    frame_version: u64,
    list_id: TargetListId,
    index: usize,
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    revision: u64,
    position: Point3<f64>,
    result: GuidanceResult,
}

impl CacheEntry {
    fn is_current(&self, target: &TargetPoint) -> bool {
        let position = target.position();
        self.revision == target.revision()
            && self
                .position
                .coords
                .iter()
                .zip(position.coords.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

/// Upper bound on memoised results held by a session.
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

#[derive(Debug)]
pub struct GuidanceSession {
    // lock order: frame before cache
    frame: RwLock<Option<Arc<CalibrationFrame>>>,
    cache: RwLock<HashMap<CacheKey, CacheEntry>>,
    capacity: usize,
    last_version: AtomicU64,
}

impl Default for GuidanceSession {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl GuidanceSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session holding at most `capacity` memoised results (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frame: RwLock::new(None),
            cache: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            last_version: AtomicU64::new(0),
        }
    }

    /// Publish the result of a successful Z-frame registration.
    ///
    /// Returns the version assigned to the new frame. On error the previous
    /// frame, if any, stays active.
    pub fn register(
        &self,
        transform: Matrix4<f64>,
        geometry: TemplateGeometry,
    ) -> Result<u64, GuidanceError> {
        let frame = CalibrationFrame::new(transform, geometry)?;
        let version = self.last_version.fetch_add(1, Ordering::SeqCst) + 1;
        let frame = Arc::new(frame.with_version(version));

        let mut active = write(&self.frame);
        let mut cache = write(&self.cache);
        *active = Some(frame);
        let dropped = cache.len();
        cache.clear();
        log::info!(
            "Z-frame registration published as version {} ({} cached results dropped)",
            version,
            dropped
        );
        Ok(version)
    }

    /// Forget the registration, e.g. when the case is closed.
    pub fn reset(&self) {
        let mut active = write(&self.frame);
        let mut cache = write(&self.cache);
        *active = None;
        cache.clear();
        log::info!("Guidance session reset");
    }

    pub fn is_registered(&self) -> bool {
        read(&self.frame).is_some()
    }

    /// The active calibration frame.
    pub fn frame(&self) -> Result<Arc<CalibrationFrame>, GuidanceError> {
        read(&self.frame)
            .as_ref()
            .cloned()
            .ok_or(GuidanceError::NotRegistered)
    }

    /// Uncached guidance for an arbitrary point against the active frame.
    pub fn compute_nearest_path(
        &self,
        target: &Point3<f64>,
    ) -> Result<GuidanceResult, GuidanceError> {
        let frame = self.frame()?;
        compute_nearest_path(&frame, target)
    }

    /// Guidance for the target at `index`, computed once per frame and
    /// target position.
    pub fn guidance(
        &self,
        targets: &TargetList,
        index: usize,
    ) -> Result<GuidanceResult, GuidanceError> {
        let target = targets.get(index)?;
        let frame = self.frame()?;
        let key = CacheKey {
            frame_version: frame.version(),
            list_id: targets.id(),
            index,
        };

        if let Some(entry) = read(&self.cache).get(&key) {
            if entry.is_current(target) {
                return Ok(entry.result);
            }
        }

        log::debug!(
            "computing guidance for target {} ({:?}, index {})",
            target.label,
            targets.id(),
            index
        );
        let position = target.position();
        let result = compute_nearest_path(&frame, &position)?;

        // a registration may have happened meanwhile; its cache must stay clean
        let active = read(&self.frame);
        if active.as_ref().map(|f| f.version()) == Some(key.frame_version) {
            let mut cache = write(&self.cache);
            if cache.len() >= self.capacity && !cache.contains_key(&key) {
                self.evict(&mut cache, key.list_id);
            }
            cache.insert(
                key,
                CacheEntry {
                    revision: target.revision(),
                    position,
                    result,
                },
            );
        }
        Ok(result)
    }

    /// Guidance for every target in list order.
    pub fn guidance_all(
        &self,
        targets: &TargetList,
    ) -> Vec<Result<GuidanceResult, GuidanceError>> {
        (0..targets.len())
            .map(|index| self.guidance(targets, index))
            .collect()
    }

    /// Hole label of the selected channel, e.g. "G-7".
    pub fn zframe_hole(&self, targets: &TargetList, index: usize) -> Result<String, GuidanceError> {
        Ok(self.guidance(targets, index)?.hole_label())
    }

    pub fn zframe_depth(&self, targets: &TargetList, index: usize) -> Result<f64, GuidanceError> {
        Ok(self.guidance(targets, index)?.depth)
    }

    /// Depth rounded to one decimal for display.
    pub fn zframe_depth_text(
        &self,
        targets: &TargetList,
        index: usize,
    ) -> Result<String, GuidanceError> {
        Ok(self.guidance(targets, index)?.depth_text())
    }

    pub fn zframe_depth_in_range(
        &self,
        targets: &TargetList,
        index: usize,
    ) -> Result<bool, GuidanceError> {
        Ok(self.guidance(targets, index)?.in_range)
    }

    /// Position on the selected channel closest to the target. A target
    /// dragged by the operator is snapped here so it stays reachable.
    pub fn needle_snap_position(
        &self,
        targets: &TargetList,
        index: usize,
    ) -> Result<Point3<f64>, GuidanceError> {
        Ok(self.guidance(targets, index)?.tip())
    }

    pub fn invalidate_target(&self, list_id: TargetListId, index: usize) {
        let mut cache = write(&self.cache);
        cache.retain(|key, _| !(key.list_id == list_id && key.index == index));
        log::debug!("invalidated guidance for {:?} index {}", list_id, index);
    }

    pub fn invalidate_list(&self, list_id: TargetListId) {
        let mut cache = write(&self.cache);
        cache.retain(|key, _| key.list_id != list_id);
        log::debug!("invalidated guidance for {:?}", list_id);
    }

    /// Drops the entries of `targets` that can no longer be served: indices
    /// past the end of the list and targets moved or replaced since.
    pub fn prune_list(&self, targets: &TargetList) {
        let list_id = targets.id();
        let mut cache = write(&self.cache);
        let before = cache.len();
        cache.retain(|key, entry| {
            key.list_id != list_id
                || targets
                    .get(key.index)
                    .map(|target| entry.is_current(target))
                    .unwrap_or(false)
        });
        log::debug!(
            "pruned {} stale guidance entries of {:?}",
            before - cache.len(),
            list_id
        );
    }

    // entries of other lists go first, the list being queried keeps its rows
    fn evict(&self, cache: &mut HashMap<CacheKey, CacheEntry>, keep: TargetListId) {
        let before = cache.len();
        cache.retain(|key, _| key.list_id == keep);
        if cache.len() >= self.capacity {
            cache.clear();
        }
        log::debug!(
            "guidance cache full, evicted {} entries",
            before - cache.len()
        );
    }

    pub fn invalidate_all(&self) {
        write(&self.cache).clear();
    }

    /// Number of memoised results.
    pub fn cached_len(&self) -> usize {
        read(&self.cache).len()
    }
}
