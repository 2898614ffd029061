/// Error type for guidance operations.
///
/// Depth outside the reachable interval is not an error; it is reported
/// through `GuidanceResult::in_range`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GuidanceError {
    #[error("Z-frame registration was not performed yet, it is required")]
    NotRegistered,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid calibration: {0}")]
    InvalidCalibration(String),

    #[error("Duplicate target label: {0}")]
    DuplicateLabel(String),

    #[error("Target index {index} out of bounds for list of {len} targets")]
    TargetIndex { index: usize, len: usize },
}
