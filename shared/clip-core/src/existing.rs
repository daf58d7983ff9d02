//! Snapshot of already produced output titles

use crate::extract::ClipFilter;
use crate::Result;
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Titles of outputs that already exist, taken once at the start of a run.
///
/// Membership is an exact string comparison; titles are expected to be
/// normalized when they are generated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistingOutputs {
    titles: HashSet<String>,
}

impl ExistingOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a video with this title was already produced
    pub fn contains(&self, title: &str) -> bool {
        self.titles.contains(title)
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    /// Lists rendered videos in `dir`, using file names without extension as titles.
    /// A missing directory yields an empty snapshot.
    pub async fn scan_output_dir(dir: &Path, filter: &ClipFilter) -> Result<Self> {
        if !fs::try_exists(dir).await? {
            return Ok(Self::new());
        }

        let mut titles = HashSet::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if !filter.matches(name) {
                continue;
            }
            if let Some(title) = filter.strip_extension(name) {
                titles.insert(title.to_string());
            }
        }

        debug!("📁 Found {} rendered videos in {}", titles.len(), dir.display());
        Ok(Self { titles })
    }
}

impl FromIterator<String> for ExistingOutputs {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            titles: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<&'a str> for ExistingOutputs {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().map(str::to_string).collect()
    }
}
