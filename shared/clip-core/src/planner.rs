//! Batch planning: splits a directory's chapters into concat-safe videos

use crate::metadata::Chapter;
use crate::naming::video_description;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Planned identity of one merged output video
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VideoPlan {
    title: String,
    source_dir: PathBuf,
    chapters: Vec<Chapter>,
}

impl VideoPlan {
    /// Title, also the output identity used to skip finished work
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Directory holding the raw clips
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Chapters in merge order, never empty
    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn clip_paths(&self) -> Vec<PathBuf> {
        self.chapters
            .iter()
            .map(|chapter| self.source_dir.join(&chapter.file_name))
            .collect()
    }

    pub fn chapter_durations(&self) -> Vec<Duration> {
        self.chapters.iter().map(|chapter| chapter.duration).collect()
    }

    pub fn total_duration(&self) -> Duration {
        self.chapters.iter().map(|chapter| chapter.duration).sum()
    }

    /// Recording time of the first chapter
    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.chapters[0].created_at
    }

    pub fn description(&self) -> String {
        video_description(&self.chapters)
    }
}

/// Two chapters can be concatenated losslessly when width, height and codec match
pub fn is_compatible(a: &Chapter, b: &Chapter) -> bool {
    a.resolution.is_concat_compatible(&b.resolution)
}

/// Partitions chapters into maximal runs where each chapter is compatible
/// with its predecessor. Order is preserved.
pub fn split_batches(chapters: Vec<Chapter>) -> Vec<Vec<Chapter>> {
    let mut batches: Vec<Vec<Chapter>> = Vec::new();

    for chapter in chapters {
        match batches.last_mut() {
            Some(batch) if batch.last().is_some_and(|prev| is_compatible(prev, &chapter)) => {
                batch.push(chapter);
            }
            _ => batches.push(vec![chapter]),
        }
    }

    batches
}

/// Builds the video plans for one directory.
///
/// A single batch keeps `title` as is; several batches are titled
/// "<title> pt 1", "<title> pt 2", ... in batch order. No chapters means no plans.
pub fn plan_videos(title: &str, source_dir: &Path, chapters: Vec<Chapter>) -> Vec<VideoPlan> {
    let batches = split_batches(chapters);

    if batches.len() == 1 {
        return batches
            .into_iter()
            .map(|chapters| VideoPlan {
                title: title.to_string(),
                source_dir: source_dir.to_path_buf(),
                chapters,
            })
            .collect();
    }

    batches
        .into_iter()
        .enumerate()
        .map(|(index, chapters)| VideoPlan {
            title: format!("{} pt {}", title, index + 1),
            source_dir: source_dir.to_path_buf(),
            chapters,
        })
        .collect()
}
