//! Clip Core - Chapter discovery, batching, naming and quota retry for merged videos

pub mod metadata;
pub mod extract;
pub mod planner;
pub mod naming;
pub mod existing;
pub mod quota;

pub use metadata::{parse_frame_rate, Chapter, ProbeRecord, Resolution};
pub use extract::{extract_chapters, ClipFilter, MediaProber};
pub use planner::{is_compatible, plan_videos, split_batches, VideoPlan};
pub use naming::{format_offset, video_description, video_title};
pub use existing::ExistingOutputs;
pub use quota::{QuotaClassify, QuotaRetry, RetryPolicy, Sleeper, TokioSleeper};

use std::path::PathBuf;

/// Result type for Clip Core operations
pub type Result<T> = std::result::Result<T, ClipCoreError>;

/// Error types for Clip Core operations
#[derive(thiserror::Error, Debug)]
pub enum ClipCoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path error: {0}")]
    Path(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Error parsing frame rate: {0}")]
    InvalidFrameRate(String),

    #[error("Failed to probe {}: {message}", .path.display())]
    Probe { path: PathBuf, message: String },
}
