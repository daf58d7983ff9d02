use anyhow::{Context, Result};
use async_trait::async_trait;
use clip_core::{
    extract_chapters, plan_videos, video_title, Chapter, ClipFilter, ExistingOutputs, MediaProber,
    QuotaRetry, Sleeper, TokioSleeper, VideoPlan,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::catalog::{RemoteCatalog, UploadRequest};
use crate::config::Config;
use crate::video::FfmpegRenderer;

/// Counters reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub directories_scanned: usize,
    pub planned: usize,
    pub skipped_existing: usize,
    pub dispatched: usize,
}

/// Receives every video that still has to be produced
#[async_trait]
pub trait VideoSink: Send + Sync {
    async fn dispatch(&self, plan: &VideoPlan, description: &str) -> Result<()>;
}

/// Renders each video into the output directory
pub struct RenderSink {
    renderer: FfmpegRenderer,
}

impl RenderSink {
    pub fn new(renderer: FfmpegRenderer) -> Self {
        Self { renderer }
    }
}

#[async_trait]
impl VideoSink for RenderSink {
    async fn dispatch(&self, plan: &VideoPlan, _description: &str) -> Result<()> {
        self.renderer.render(plan).await?;
        Ok(())
    }
}

/// Renders each video, uploads it and adds it to the playlist
pub struct UploadSink<S = TokioSleeper> {
    renderer: FfmpegRenderer,
    catalog: Arc<dyn RemoteCatalog>,
    playlist_id: String,
    retry: QuotaRetry<S>,
}

impl<S: Sleeper> UploadSink<S> {
    pub fn new(
        renderer: FfmpegRenderer,
        catalog: Arc<dyn RemoteCatalog>,
        playlist_id: String,
        retry: QuotaRetry<S>,
    ) -> Self {
        Self {
            renderer,
            catalog,
            playlist_id,
            retry,
        }
    }
}

#[async_trait]
impl<S: Sleeper> VideoSink for UploadSink<S> {
    async fn dispatch(&self, plan: &VideoPlan, description: &str) -> Result<()> {
        // A render left by an interrupted upload run is reused
        let rendered = self.renderer.output_path(plan.title());
        let reuse = tokio::fs::try_exists(&rendered)
            .await
            .with_context(|| format!("Cannot check for rendered video {}", rendered.display()))?;
        let path = if reuse {
            info!("♻️  Reusing rendered video: {}", rendered.display());
            rendered
        } else {
            self.renderer.render(plan).await?
        };

        let request = UploadRequest {
            path,
            title: plan.title().to_string(),
            description: description.to_string(),
            recorded_at: plan.recorded_at(),
        };

        let catalog = &self.catalog;
        let request = &request;
        let remote_id = self
            .retry
            .run("upload", move || async move { catalog.upload(request).await })
            .await
            .with_context(|| format!("Upload failed for {}", plan.title()))?;

        let playlist_id = self.playlist_id.as_str();
        let remote_id = remote_id.as_str();
        self.retry
            .run("attach to playlist", move || async move {
                catalog.attach_to_collection(playlist_id, remote_id).await
            })
            .await
            .with_context(|| format!("Cannot add {} to playlist {}", remote_id, playlist_id))?;

        info!("📺 Published: {}", plan.title());
        Ok(())
    }
}

/// Builds the plans for one directory's chapters, titled relative to `root`
pub fn plan_directory(dir: &Path, root: &Path, prefix: &str, chapters: Vec<Chapter>) -> Vec<VideoPlan> {
    let title = video_title(dir, root, prefix);
    plan_videos(&title, dir, chapters)
}

/// Walks the input tree and dispatches every video not produced yet
pub struct Orchestrator {
    filter: ClipFilter,
    prober: Arc<dyn MediaProber>,
    sink: Arc<dyn VideoSink>,
    existing: ExistingOutputs,
    dry_run: bool,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        prober: Arc<dyn MediaProber>,
        sink: Arc<dyn VideoSink>,
        existing: ExistingOutputs,
    ) -> Self {
        Self {
            filter: config.input.clip_filter(),
            prober,
            sink,
            existing,
            dry_run: false,
        }
    }

    /// Plan and log without rendering or uploading
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Processes every directory under `root` in file-name order.
    ///
    /// `root` should already be canonical; titles are derived from it.
    /// The first error aborts the run.
    pub async fn run(&self, root: &Path, prefix: &str) -> Result<RunSummary> {
        let start_time = Instant::now();
        let mut summary = RunSummary::default();

        info!("🚀 Starting run...");
        info!("📁 Input: {}", root.display());
        info!("📼 {} videos already exist", self.existing.len());

        for dir in walk_directories(root)? {
            summary.directories_scanned += 1;
            self.process_directory(&dir, root, prefix, &mut summary).await?;
        }

        info!(
            "🏁 Run complete in {:.1}s: {} directories, {} planned, {} skipped, {} dispatched",
            start_time.elapsed().as_secs_f64(),
            summary.directories_scanned,
            summary.planned,
            summary.skipped_existing,
            summary.dispatched
        );
        Ok(summary)
    }

    async fn process_directory(
        &self,
        dir: &Path,
        root: &Path,
        prefix: &str,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let chapters = extract_chapters(dir, self.prober.as_ref(), &self.filter)
            .await
            .with_context(|| format!("Cannot extract chapters from {}", dir.display()))?;
        if chapters.is_empty() {
            debug!("No clips in {}", dir.display());
            return Ok(());
        }

        let plans = plan_directory(dir, root, prefix, chapters);
        debug!("📂 {}: {} videos planned", dir.display(), plans.len());

        for plan in plans {
            summary.planned += 1;
            let description = plan.description();
            info!(
                "📝 {} ({} chapters, {:?})\n{}",
                plan.title(),
                plan.chapters().len(),
                plan.total_duration(),
                description
            );

            if self.existing.contains(plan.title()) {
                info!("⏭️  {} already exists, skipping", plan.title());
                summary.skipped_existing += 1;
                continue;
            }

            if self.dry_run {
                info!("🔍 Dry run, not producing {}", plan.title());
                continue;
            }

            self.sink
                .dispatch(&plan, &description)
                .await
                .with_context(|| format!("Failed to produce {}", plan.title()))?;
            summary.dispatched += 1;
        }

        Ok(())
    }
}

/// Every directory under `root`, `root` included, depth-first in file-name order
fn walk_directories(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Cannot walk {}", root.display()))?;
        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
        }
    }
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogError, CatalogResult};
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use clip_core::{ProbeRecord, RetryPolicy};
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 7, 1, 10, 0, 0).unwrap()
    }

    /// Answers from a table keyed by file name
    struct FakeProber {
        records: HashMap<String, ProbeRecord>,
    }

    impl FakeProber {
        fn new(entries: &[(&str, i64, u32)]) -> Self {
            let records = entries
                .iter()
                .map(|(name, minute, width)| {
                    (
                        name.to_string(),
                        ProbeRecord {
                            duration: Duration::from_secs(60),
                            created_at: base_time() + ChronoDuration::minutes(*minute),
                            width: *width,
                            height: width * 9 / 16,
                            codec: "h264".to_string(),
                            frame_rate: "30000/1001".to_string(),
                        },
                    )
                })
                .collect();
            Self { records }
        }
    }

    #[async_trait]
    impl MediaProber for FakeProber {
        async fn probe(&self, path: &Path) -> clip_core::Result<ProbeRecord> {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            self.records
                .get(&name)
                .cloned()
                .ok_or_else(|| clip_core::ClipCoreError::Probe {
                    path: path.to_path_buf(),
                    message: "unknown file".to_string(),
                })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        dispatched: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl VideoSink for RecordingSink {
        async fn dispatch(&self, plan: &VideoPlan, description: &str) -> Result<()> {
            self.dispatched
                .lock()
                .unwrap()
                .push((plan.title().to_string(), description.to_string()));
            Ok(())
        }
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    /// Root with "Day 1/Person 1" (two resolutions) and "Day 2" (one)
    fn fixture() -> (TempDir, PathBuf, FakeProber) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        touch(&root.join("Day 1/Person 1/a.mp4"));
        touch(&root.join("Day 1/Person 1/b.mp4"));
        touch(&root.join("Day 1/Person 1/c.mp4"));
        touch(&root.join("Day 2/d.mp4"));
        touch(&root.join("Day 2/notes.txt"));

        let prober = FakeProber::new(&[
            ("a.mp4", 0, 1920),
            ("b.mp4", 1, 1920),
            ("c.mp4", 2, 3840),
            ("d.mp4", 60, 1920),
        ]);
        (temp_dir, root, prober)
    }

    #[tokio::test]
    async fn test_run_dispatches_every_plan_in_order() {
        let (_temp_dir, root, prober) = fixture();
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = Orchestrator::new(
            &Config::default(),
            Arc::new(prober),
            sink.clone(),
            ExistingOutputs::new(),
        );

        let summary = orchestrator.run(&root, "Trip").await.unwrap();

        let titles: Vec<String> = sink
            .dispatched
            .lock()
            .unwrap()
            .iter()
            .map(|(title, _)| title.clone())
            .collect();
        assert_eq!(
            titles,
            vec!["[Trip] Day 1 # Person 1 pt 1", "[Trip] Day 1 # Person 1 pt 2", "[Trip] Day 2"]
        );
        assert_eq!(
            summary,
            RunSummary {
                directories_scanned: 4,
                planned: 3,
                skipped_existing: 0,
                dispatched: 3,
            }
        );

        let first_description = &sink.dispatched.lock().unwrap()[0].1;
        assert!(first_description.starts_with("0:00:00 | a.mp4 [1920x1080 @ 029.97 ~ "));
        assert!(first_description.contains("\n0:01:00 | b.mp4"));
    }

    #[tokio::test]
    async fn test_existing_titles_are_skipped() {
        let (_temp_dir, root, prober) = fixture();
        let sink = Arc::new(RecordingSink::default());
        let existing: ExistingOutputs = ["[Trip] Day 1 # Person 1 pt 1", "[Trip] Day 2"].into_iter().collect();
        let orchestrator = Orchestrator::new(&Config::default(), Arc::new(prober), sink.clone(), existing);

        let summary = orchestrator.run(&root, "Trip").await.unwrap();

        assert_eq!(summary.planned, 3);
        assert_eq!(summary.skipped_existing, 2);
        assert_eq!(summary.dispatched, 1);
        assert_eq!(sink.dispatched.lock().unwrap()[0].0, "[Trip] Day 1 # Person 1 pt 2");
    }

    #[tokio::test]
    async fn test_dry_run_dispatches_nothing() {
        let (_temp_dir, root, prober) = fixture();
        let sink = Arc::new(RecordingSink::default());
        let orchestrator =
            Orchestrator::new(&Config::default(), Arc::new(prober), sink.clone(), ExistingOutputs::new())
                .with_dry_run(true);

        let summary = orchestrator.run(&root, "Trip").await.unwrap();

        assert_eq!(summary.planned, 3);
        assert_eq!(summary.dispatched, 0);
        assert!(sink.dispatched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_probe_failure_aborts_run() {
        let (_temp_dir, root, _) = fixture();
        let prober = FakeProber::new(&[("a.mp4", 0, 1920)]);
        let sink = Arc::new(RecordingSink::default());
        let orchestrator =
            Orchestrator::new(&Config::default(), Arc::new(prober), sink.clone(), ExistingOutputs::new());

        tokio_test::assert_err!(orchestrator.run(&root, "Trip").await);
        assert!(sink.dispatched.lock().unwrap().is_empty());
    }

    #[test]
    fn test_plan_directory_at_root() {
        let root = Path::new("/media/Trip");
        let chapters = vec![Chapter::new(
            "a.mp4",
            base_time(),
            Duration::from_secs(5),
            clip_core::Resolution::new(1920, 1080, "h264", 30.0),
        )];

        let plans = plan_directory(root, root, "Trip", chapters);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].title(), "[Trip] ");
        assert_eq!(plans[0].source_dir(), root);
    }

    struct QuotaOnceCatalog {
        upload_calls: Mutex<u32>,
        attached: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl RemoteCatalog for QuotaOnceCatalog {
        async fn list_existing_titles(&self, _collection_id: &str) -> CatalogResult<HashSet<String>> {
            Ok(HashSet::new())
        }

        async fn upload(&self, request: &UploadRequest) -> CatalogResult<String> {
            let mut calls = self.upload_calls.lock().unwrap();
            *calls += 1;
            if *calls == 1 {
                return Err(CatalogError::Api {
                    status: 403,
                    body: "quotaExceeded".to_string(),
                });
            }
            assert_eq!(request.recorded_at, base_time());
            Ok("vid123".to_string())
        }

        async fn attach_to_collection(&self, collection_id: &str, remote_id: &str) -> CatalogResult<()> {
            self.attached
                .lock()
                .unwrap()
                .push((collection_id.to_string(), remote_id.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct NoSleep(Mutex<Vec<Duration>>);

    #[async_trait]
    impl Sleeper for NoSleep {
        async fn sleep(&self, duration: Duration) {
            self.0.lock().unwrap().push(duration);
        }
    }

    #[tokio::test]
    async fn test_upload_sink_retries_quota_and_attaches() {
        let temp_dir = TempDir::new().unwrap();
        let renderer = FfmpegRenderer::new(temp_dir.path().to_path_buf(), "mp4");
        std::fs::write(renderer.output_path("[Trip] Day 1"), b"rendered").unwrap();

        let catalog = Arc::new(QuotaOnceCatalog {
            upload_calls: Mutex::new(0),
            attached: Mutex::new(Vec::new()),
        });
        let retry = QuotaRetry::with_sleeper(RetryPolicy::unbounded(Duration::from_secs(3600)), NoSleep::default());
        let sink = UploadSink::new(renderer, catalog.clone(), "PL1".to_string(), retry);

        let plans = plan_directory(
            Path::new("/media/Trip/Day 1"),
            Path::new("/media/Trip"),
            "Trip",
            vec![Chapter::new(
                "a.mp4",
                base_time(),
                Duration::from_secs(5),
                clip_core::Resolution::new(1920, 1080, "h264", 30.0),
            )],
        );
        tokio_test::assert_ok!(sink.dispatch(&plans[0], "0:00:00 | a.mp4").await);

        assert_eq!(*catalog.upload_calls.lock().unwrap(), 2);
        assert_eq!(
            *catalog.attached.lock().unwrap(),
            vec![("PL1".to_string(), "vid123".to_string())]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_upload_sink_surfaces_render_lookup_errors() {
        let temp_dir = TempDir::new().unwrap();
        // A regular file where the output directory should be
        let not_a_dir = temp_dir.path().join("out");
        std::fs::write(&not_a_dir, b"").unwrap();

        let catalog = Arc::new(QuotaOnceCatalog {
            upload_calls: Mutex::new(0),
            attached: Mutex::new(Vec::new()),
        });
        let retry = QuotaRetry::with_sleeper(RetryPolicy::default(), NoSleep::default());
        let sink = UploadSink::new(
            FfmpegRenderer::new(not_a_dir, "mp4"),
            catalog.clone(),
            "PL1".to_string(),
            retry,
        );

        let plans = plan_directory(
            Path::new("/media/Trip/Day 1"),
            Path::new("/media/Trip"),
            "Trip",
            vec![Chapter::new(
                "a.mp4",
                base_time(),
                Duration::from_secs(5),
                clip_core::Resolution::new(1920, 1080, "h264", 30.0),
            )],
        );
        let error = tokio_test::assert_err!(sink.dispatch(&plans[0], "").await);

        assert!(format!("{:#}", error).contains("Cannot check for rendered video"));
        assert_eq!(*catalog.upload_calls.lock().unwrap(), 0);
    }
}
