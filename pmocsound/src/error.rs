use std::path::PathBuf;

use crate::format::SampleFormat;

/// Errors visible to the callers of the core and of the elements.
#[derive(thiserror::Error, Debug)]
pub enum CsoundError {
    #[error("engine creation failed: {0}")]
    EngineCreateFailed(String),
    #[error("could not open program {}: {reason}", location.display())]
    CompileFailed { location: PathBuf, reason: String },
    #[error("buffer of {len} bytes is not a whole number of {frame_bytes}-byte frames")]
    NonIntegralFrameCount { len: usize, frame_bytes: usize },
    #[error("adapter invariant violated: flushing {requested} bytes with {available} available")]
    InvariantViolation { requested: usize, available: usize },
    #[error("could not allocate a {size}-byte output buffer")]
    AllocationFailed { size: usize },
    #[error("invalid block geometry: {0}")]
    InvalidGeometry(String),
    #[error("unsupported engine sample width: {0} bytes")]
    UnsupportedSampleWidth(usize),
    #[error("negotiated format {negotiated} does not match engine native format {native}")]
    FormatMismatch {
        negotiated: SampleFormat,
        native: SampleFormat,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("element is not started")]
    NotStarted,
    #[error("element is already started")]
    AlreadyStarted,
    #[error("score finished while writing")]
    ScoreFinished,
}

/// Signals raised by [`StreamAdapter`](crate::StreamAdapter).
///
/// `InsufficientData` is plain control flow for the block loops and is never
/// surfaced by them; `InvariantViolation` is converted into
/// [`CsoundError::InvariantViolation`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterError {
    #[error("insufficient data: {requested} bytes requested, {available} available")]
    InsufficientData { requested: usize, available: usize },
    #[error("flush of {requested} bytes exceeds the {available} available")]
    InvariantViolation { requested: usize, available: usize },
}

impl From<AdapterError> for CsoundError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::InsufficientData {
                requested,
                available,
            }
            | AdapterError::InvariantViolation {
                requested,
                available,
            } => CsoundError::InvariantViolation {
                requested,
                available,
            },
        }
    }
}

pub type Result<T, E = CsoundError> = std::result::Result<T, E>;
