/// Clip Compiler
///
/// Merges directories of raw action-camera clips into one video per
/// directory, with chapter markers, and optionally publishes them to a
/// YouTube playlist.

pub mod catalog;
pub mod config;
pub mod processing;
pub mod video;

// Re-export main types for easy access
pub use crate::catalog::{CatalogError, RemoteCatalog, YoutubeCatalog};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::processing::{plan_directory, Orchestrator, RenderSink, RunSummary, UploadSink, VideoSink};
pub use crate::video::{check_dependencies, FfmpegRenderer, FfprobeProber};
