//! Video title and description generation

use crate::metadata::Chapter;
use std::path::{Component, Path};
use std::time::Duration;

const TITLE_SEPARATOR: &str = " # ";
const CREATE_TIME_FORMAT: &str = "%a, %d %b %Y %H:%M:%S UTC";

/// Lexically normalized path segments; `.` is dropped and `..` pops.
fn segments(path: &Path) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => {
                parts.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    parts
}

/// Generates the title for the video of `dir`, e.g. "[Trip] Day 1 # Person 1".
///
/// Each segment of `dir` relative to `root` becomes one fragment. `root`
/// itself yields "[prefix] ". A directory outside `root` uses all of its
/// own segments.
pub fn video_title(dir: &Path, root: &Path, prefix: &str) -> String {
    let dir_parts = segments(dir);
    let root_parts = segments(root);

    let relative = if dir_parts.starts_with(&root_parts) {
        &dir_parts[root_parts.len()..]
    } else {
        &dir_parts[..]
    };

    format!("[{}] {}", prefix, relative.join(TITLE_SEPARATOR))
}

/// Formats an offset as H:MM:SS, truncating sub-second precision
pub fn format_offset(offset: Duration) -> String {
    let total = offset.as_secs();
    format!("{}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}

/// One line per chapter: offset in the merged video, file name, resolution and creation time
pub fn video_description(chapters: &[Chapter]) -> String {
    let mut lines = Vec::with_capacity(chapters.len());
    let mut start = Duration::ZERO;

    for chapter in chapters {
        lines.push(format!(
            "{} | {} [{} ~ {}]",
            format_offset(start),
            chapter.file_name,
            chapter.resolution,
            chapter.created_at.format(CREATE_TIME_FORMAT)
        ));
        start += chapter.duration;
    }

    lines.join("\n")
}
