use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub mod executor;
pub mod layout;
pub mod scheduler;
pub mod segmenter;

pub use executor::Executor;
pub use layout::OutputLayout;
pub use scheduler::Scheduler;
pub use segmenter::{FfmpegSegmenter, SegmentError, SegmentJob, SegmentReport, Segmenter};

/// What one segmentation cycle produced.
#[derive(Debug)]
pub enum CycleOutcome {
    Success(CycleReport),
    /// The cycle is lost, the next tick tries again
    Transient(CycleError),
    /// The stream cannot be recorded any more
    Fatal(CycleError),
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleOutcome::Success(_))
    }
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub epoch: i64,
    pub output_dir: PathBuf,
    pub manifest: PathBuf,
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("create output directory {}: {err}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        err: io::Error,
    },
    #[error(transparent)]
    Segmenter(#[from] SegmentError),
    #[error("cycle task aborted: {0}")]
    Aborted(String),
}
