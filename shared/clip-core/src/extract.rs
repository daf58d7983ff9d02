//! Directory to chapter extraction
//!
//! Lists the direct children of one directory, probes every supported clip
//! and returns the chapters ordered by recording time. Subdirectories are
//! left to the caller's own traversal.

use crate::metadata::{Chapter, ProbeRecord};
use crate::{ClipCoreError, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Source of per-file technical metadata
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<ProbeRecord>;
}

/// Decides which directory entries are raw clips
#[derive(Debug, Clone)]
pub struct ClipFilter {
    /// Supported extension without the dot, compared case-insensitively
    extension: String,

    /// Names starting with this marker are hidden and skipped
    hidden_marker: char,
}

impl ClipFilter {
    pub fn new(extension: &str, hidden_marker: char) -> Self {
        Self {
            extension: extension.trim_start_matches('.').to_lowercase(),
            hidden_marker,
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Whether a file name names a visible clip with the supported extension
    pub fn matches(&self, file_name: &str) -> bool {
        !file_name.starts_with(self.hidden_marker) && self.strip_extension(file_name).is_some()
    }

    /// Strips the supported extension, if present
    pub fn strip_extension<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        let split = file_name.len().checked_sub(self.extension.len() + 1)?;
        if !file_name.is_char_boundary(split) {
            return None;
        }
        let (stem, suffix) = file_name.split_at(split);
        if suffix.to_lowercase() == format!(".{}", self.extension) {
            Some(stem)
        } else {
            None
        }
    }
}

impl Default for ClipFilter {
    fn default() -> Self {
        Self::new("mp4", '.')
    }
}

/// Returns the chapters of `dir` sorted by creation time (non-recursive).
///
/// Files are enumerated in name order, so chapters with equal creation
/// times keep that order. Any probe failure fails the whole directory.
pub async fn extract_chapters<P>(dir: &Path, prober: &P, filter: &ClipFilter) -> Result<Vec<Chapter>>
where
    P: MediaProber + ?Sized,
{
    let mut file_names = Vec::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            continue;
        }
        let file_name = entry.file_name();
        match file_name.to_str() {
            Some(name) if filter.matches(name) => file_names.push(name.to_string()),
            Some(_) => {}
            None => {
                // Only a clip that cannot be named is an error
                let lossy = file_name.to_string_lossy();
                if filter.matches(&lossy) {
                    return Err(ClipCoreError::Path(format!(
                        "Non UTF-8 file name in {}: {}",
                        dir.display(),
                        lossy
                    )));
                }
                debug!("Skipping non UTF-8 file name in {}: {}", dir.display(), lossy);
            }
        }
    }
    file_names.sort();

    let mut chapters = Vec::with_capacity(file_names.len());
    for file_name in file_names {
        let path = dir.join(&file_name);
        debug!("📊 Probing chapter: {}", path.display());
        let record = prober.probe(&path).await?;
        chapters.push(Chapter::from_probe(file_name, record)?);
    }

    // Stable: equal creation times keep name order
    chapters.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    Ok(chapters)
}
