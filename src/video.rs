use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clip_core::{ClipCoreError, MediaProber, ProbeRecord, VideoPlan};
use serde::Deserialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, info};

/// Verifies that every external tool is on PATH
pub fn check_dependencies(commands: &[&str]) -> Result<()> {
    for command in commands {
        which::which(command)
            .with_context(|| format!("Could not find missing dependency {}", command))?;
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    #[serde(default)]
    tags: FfprobeTags,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    creation_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    coded_width: Option<u32>,
    coded_height: Option<u32>,
    codec_name: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Media prober backed by the ffprobe command line tool
#[derive(Debug, Clone, Default)]
pub struct FfprobeProber;

impl FfprobeProber {
    pub fn new() -> Self {
        Self
    }
}

fn malformed(path: &Path, what: &str) -> ClipCoreError {
    ClipCoreError::MalformedInput(format!("{}: {}", path.display(), what))
}

/// Converts raw ffprobe JSON into a probe record.
/// Only the first stream is inspected.
pub fn parse_ffprobe_json(path: &Path, json: &[u8]) -> clip_core::Result<ProbeRecord> {
    let output: FfprobeOutput = serde_json::from_slice(json)
        .map_err(|e| malformed(path, &format!("invalid ffprobe output: {}", e)))?;

    let duration_secs: f64 = output
        .format
        .duration
        .as_deref()
        .ok_or_else(|| malformed(path, "missing format.duration"))?
        .trim()
        .parse()
        .map_err(|_| malformed(path, "unparseable format.duration"))?;
    let duration = Duration::try_from_secs_f64(duration_secs)
        .map_err(|_| malformed(path, "negative or invalid format.duration"))?;

    let creation_time = output
        .format
        .tags
        .creation_time
        .as_deref()
        .ok_or_else(|| malformed(path, "missing format.tags.creation_time"))?;
    let created_at = DateTime::parse_from_rfc3339(creation_time)
        .map_err(|e| malformed(path, &format!("invalid creation_time {}: {}", creation_time, e)))?
        .with_timezone(&Utc);

    let stream = output
        .streams
        .first()
        .ok_or_else(|| malformed(path, "no media streams"))?;

    Ok(ProbeRecord {
        duration,
        created_at,
        width: stream.coded_width.ok_or_else(|| malformed(path, "missing coded_width"))?,
        height: stream.coded_height.ok_or_else(|| malformed(path, "missing coded_height"))?,
        codec: stream
            .codec_name
            .clone()
            .ok_or_else(|| malformed(path, "missing codec_name"))?,
        frame_rate: stream
            .avg_frame_rate
            .clone()
            .ok_or_else(|| malformed(path, "missing avg_frame_rate"))?,
    })
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe(&self, path: &Path) -> clip_core::Result<ProbeRecord> {
        let output = tokio::process::Command::new("ffprobe")
            .arg("-v")
            .arg("error")
            .arg(path)
            .args(["-print_format", "json", "-show_format", "-show_streams"])
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(ClipCoreError::Probe {
                path: path.to_path_buf(),
                message: format!(
                    "ffprobe exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let record = parse_ffprobe_json(path, &output.stdout)?;
        debug!(
            "📹 Probed {} ({}x{} {}, {} fps, {:.1}s)",
            path.display(),
            record.width,
            record.height,
            record.codec,
            record.frame_rate,
            record.duration.as_secs_f64()
        );
        Ok(record)
    }
}

/// Escapes a path for a single-quoted entry of an ffmpeg concat list
fn concat_entry(path: &Path) -> String {
    format!("file '{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

/// Escapes special characters of an ffmetadata value
fn metadata_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '=' | ';' | '#' | '\\' | '\n') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Builds the ffmpeg concat demuxer input list
pub fn concat_list(plan: &VideoPlan) -> String {
    plan.clip_paths()
        .iter()
        .map(|path| concat_entry(path))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds an ffmetadata file with one chapter marker per clip
pub fn chapter_metadata(plan: &VideoPlan) -> String {
    let mut metadata = String::from(";FFMETADATA1\n");
    let _ = writeln!(metadata, "title={}", metadata_value(plan.title()));

    let mut start_ms: u128 = 0;
    for (chapter, duration) in plan.chapters().iter().zip(plan.chapter_durations()) {
        let end_ms = start_ms + duration.as_millis();
        let _ = write!(
            metadata,
            "\n[CHAPTER]\nTIMEBASE=1/1000\nSTART={}\nEND={}\ntitle={}\n",
            start_ms,
            end_ms,
            metadata_value(&chapter.file_name)
        );
        start_ms = end_ms;
    }

    metadata
}

/// Lossless merge renderer backed by ffmpeg's concat demuxer
#[derive(Debug, Clone)]
pub struct FfmpegRenderer {
    output_dir: PathBuf,
    extension: String,
}

impl FfmpegRenderer {
    pub fn new(output_dir: PathBuf, extension: &str) -> Self {
        Self {
            output_dir,
            extension: extension.trim_start_matches('.').to_lowercase(),
        }
    }

    /// Final location of a rendered video
    pub fn output_path(&self, title: &str) -> PathBuf {
        self.output_dir.join(format!("{}.{}", title, self.extension))
    }

    /// Hidden in-progress location, renamed into place on success
    fn partial_path(&self, title: &str) -> PathBuf {
        self.output_dir
            .join(format!(".{}.partial.{}", title, self.extension))
    }

    /// Concatenates the plan's clips without re-encoding and embeds chapter markers
    pub async fn render(&self, plan: &VideoPlan) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let work_dir = tempfile::Builder::new().prefix("clip-compiler").tempdir()?;
        let input_path = work_dir.path().join("input.txt");
        let metadata_path = work_dir.path().join("chapters.txt");
        tokio::fs::write(&input_path, concat_list(plan)).await?;
        tokio::fs::write(&metadata_path, chapter_metadata(plan)).await?;

        let output_path = self.output_path(plan.title());
        let partial_path = self.partial_path(plan.title());
        info!("🎬 Rendering {}", output_path.display());

        let status = tokio::process::Command::new("ffmpeg")
            .args(["-v", "warning", "-f", "concat", "-safe", "0", "-i"])
            .arg(&input_path)
            .arg("-i")
            .arg(&metadata_path)
            .args(["-map_metadata", "1", "-c", "copy"])
            .arg(&partial_path)
            .args(["-y", "-stats"])
            .stdin(Stdio::null())
            .status()
            .await
            .context("Failed to start ffmpeg")?;

        if !status.success() {
            let _ = tokio::fs::remove_file(&partial_path).await;
            return Err(anyhow!("ffmpeg failed for {}: {}", plan.title(), status));
        }

        tokio::fs::rename(&partial_path, &output_path)
            .await
            .with_context(|| format!("Cannot move rendered video to {}", output_path.display()))?;

        info!("✅ Rendered: {}", output_path.display());
        Ok(output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use clip_core::{plan_videos, Chapter, Resolution};

    const SAMPLE: &str = r#"{
        "streams": [
            {"codec_name": "h264", "coded_width": 1920, "coded_height": 1088, "avg_frame_rate": "60000/1001"},
            {"codec_name": "aac", "avg_frame_rate": "0/0"}
        ],
        "format": {
            "duration": "12.500000",
            "tags": {"creation_time": "2023-07-01T10:00:00.000000Z"}
        }
    }"#;

    fn plan() -> VideoPlan {
        let chapters = vec![
            Chapter::new(
                "GH010001.MP4",
                Utc.with_ymd_and_hms(2023, 7, 1, 10, 0, 0).unwrap(),
                Duration::from_millis(1500),
                Resolution::new(1920, 1080, "h264", 60.0),
            ),
            Chapter::new(
                "it's.MP4",
                Utc.with_ymd_and_hms(2023, 7, 1, 10, 1, 0).unwrap(),
                Duration::from_millis(2500),
                Resolution::new(1920, 1080, "h264", 60.0),
            ),
        ];
        plan_videos("[Trip] Day 1", Path::new("/in/Day 1"), chapters).remove(0)
    }

    #[test]
    fn test_parse_ffprobe_json_uses_first_stream() {
        let record = parse_ffprobe_json(Path::new("a.mp4"), SAMPLE.as_bytes()).unwrap();
        assert_eq!(record.width, 1920);
        assert_eq!(record.height, 1088);
        assert_eq!(record.codec, "h264");
        assert_eq!(record.frame_rate, "60000/1001");
        assert_eq!(record.duration, Duration::from_millis(12_500));
        assert_eq!(record.created_at, Utc.with_ymd_and_hms(2023, 7, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_ffprobe_json_rejects_missing_fields() {
        let no_time = r#"{"streams": [{"codec_name": "h264", "coded_width": 1, "coded_height": 1, "avg_frame_rate": "1/1"}],
                          "format": {"duration": "1.0"}}"#;
        let no_streams = r#"{"streams": [], "format": {"duration": "1.0", "tags": {"creation_time": "2023-07-01T10:00:00Z"}}}"#;

        for json in [no_time, no_streams, "not json"] {
            let result = parse_ffprobe_json(Path::new("a.mp4"), json.as_bytes());
            assert!(matches!(result, Err(ClipCoreError::MalformedInput(_))));
        }
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&plan());
        let lines: Vec<&str> = list.lines().collect();
        assert_eq!(lines[0], "file '/in/Day 1/GH010001.MP4'");
        assert_eq!(lines[1], r"file '/in/Day 1/it'\''s.MP4'");
    }

    #[test]
    fn test_chapter_metadata_uses_cumulative_milliseconds() {
        let metadata = chapter_metadata(&plan());
        assert!(metadata.starts_with(";FFMETADATA1\ntitle=[Trip] Day 1\n"));
        assert!(metadata.contains("START=0\nEND=1500\ntitle=GH010001.MP4"));
        assert!(metadata.contains("START=1500\nEND=4000\ntitle=it's.MP4"));
        assert_eq!(metadata.matches("[CHAPTER]").count(), 2);
    }

    #[test]
    fn test_metadata_value_escaping() {
        assert_eq!(metadata_value("a=b;c#d\\e"), r"a\=b\;c\#d\\e");
    }

    #[test]
    fn test_renderer_paths() {
        let renderer = FfmpegRenderer::new(PathBuf::from("/out"), ".MP4");
        assert_eq!(renderer.output_path("[Trip] Day 1"), PathBuf::from("/out/[Trip] Day 1.mp4"));
        assert_eq!(
            renderer.partial_path("[Trip] Day 1"),
            PathBuf::from("/out/.[Trip] Day 1.partial.mp4")
        );
    }
}
