use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use clip_compiler::catalog::oauth::{GoogleOAuth, StaticToken, TokenProvider};
use clip_compiler::catalog::youtube::UploadSettings;
use clip_compiler::{
    check_dependencies, Config, FfmpegRenderer, FfprobeProber, Orchestrator, RemoteCatalog, RenderSink,
    UploadSink, VideoSink, YoutubeCatalog,
};
use clip_core::{ExistingOutputs, QuotaRetry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

type LogFilterHandle = reload::Handle<EnvFilter, Registry>;

#[derive(Parser)]
#[command(name = "clip-compiler")]
#[command(version, about = "Merge action-camera clips into one chaptered video per directory")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render merged videos into the output directory
    Render {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Render merged videos and publish them to a YouTube playlist
    Upload {
        #[command(flatten)]
        run: RunArgs,

        /// Playlist receiving the videos
        #[arg(long)]
        playlist_id: Option<String>,

        /// private, unlisted or public
        #[arg(long)]
        privacy_status: Option<String>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Root directory of the clip tree
    #[arg(short, long, value_name = "DIR")]
    input_dir: PathBuf,

    /// Directory receiving rendered videos
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Label prepended to every title, e.g. "Alps 2023"
    #[arg(short, long)]
    prefix: String,

    /// Configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Plan and log without rendering or uploading
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl RunArgs {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };
        if let Some(output_dir) = &self.output_dir {
            config.output.output_dir = Some(output_dir.clone());
        }
        Ok(config)
    }
}

/// Starts logging before the configuration is read.
///
/// `--verbose` or `RUST_LOG` fix the filter; otherwise the returned handle
/// swaps in the configured level once it is known.
fn init_logging(verbose: bool) -> Option<LogFilterHandle> {
    let (filter, fixed) = if verbose {
        (EnvFilter::new("clip_compiler=debug,clip_core=debug,info"), true)
    } else {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => (filter, true),
            Err(_) => (EnvFilter::new("info"), false),
        }
    };

    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
    (!fixed).then_some(handle)
}

/// Validates the input root and returns its canonical form
fn canonical_root(input_dir: &Path) -> Result<PathBuf> {
    let root = input_dir
        .canonicalize()
        .with_context(|| format!("Input directory not found: {}", input_dir.display()))?;
    if !root.is_dir() {
        return Err(anyhow!("Input path is not a directory: {}", root.display()));
    }
    Ok(root)
}

async fn token_provider(config: &Config) -> Result<Arc<dyn TokenProvider>> {
    if let Ok(token) = std::env::var("YOUTUBE_ACCESS_TOKEN") {
        info!("🔑 Using access token from YOUTUBE_ACCESS_TOKEN");
        return Ok(Arc::new(StaticToken(token)));
    }
    let oauth = GoogleOAuth::authorize(&config.youtube.client_secrets, &config.youtube.token_file).await?;
    Ok(Arc::new(oauth))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (run, upload) = match cli.command {
        Commands::Render { run } => (run, None),
        Commands::Upload {
            run,
            playlist_id,
            privacy_status,
        } => (run, Some((playlist_id, privacy_status))),
    };

    let log_filter = init_logging(run.verbose);
    let mut config = run.load_config()?;
    if let Some(handle) = log_filter {
        handle
            .reload(EnvFilter::new(&config.output.log_level))
            .context("Cannot apply configured log level")?;
    }
    if let Some((playlist_id, privacy_status)) = &upload {
        if let Some(playlist_id) = playlist_id {
            config.youtube.playlist_id = Some(playlist_id.clone());
        }
        if let Some(privacy_status) = privacy_status {
            config.youtube.privacy_status = privacy_status.clone();
        }
    }

    // Fail fast before any directory is touched
    if upload.is_some() {
        config.validate_upload()?;
    } else {
        config.validate()?;
    }
    let output_dir = config
        .output
        .output_dir
        .clone()
        .ok_or_else(|| anyhow!("An output directory is required (--output-dir)"))?;
    if run.prefix.is_empty() {
        return Err(anyhow!("A title prefix is required (--prefix)"));
    }
    let root = canonical_root(&run.input_dir)?;
    check_dependencies(&["ffprobe", "ffmpeg"])?;

    info!("🚀 Clip Compiler starting...");
    info!("{}", config.summary());

    let renderer = FfmpegRenderer::new(output_dir.clone(), &config.input.extension);
    let retry = QuotaRetry::new(config.quota.retry_policy());

    let (sink, existing): (Arc<dyn VideoSink>, ExistingOutputs) = if upload.is_some() {
        let playlist_id = config
            .youtube
            .playlist_id
            .clone()
            .ok_or_else(|| anyhow!("youtube.playlist_id is required for uploads"))?;
        let settings = UploadSettings {
            category_id: config.youtube.category_id.clone(),
            privacy_status: config.youtube.privacy_status.clone(),
            tags: config.youtube.tags.clone(),
        };
        let catalog: Arc<dyn RemoteCatalog> =
            Arc::new(YoutubeCatalog::new(token_provider(&config).await?, settings)?);

        let listing = catalog.as_ref();
        let playlist = playlist_id.as_str();
        let titles = retry
            .run("list playlist", move || async move { listing.list_existing_titles(playlist).await })
            .await
            .with_context(|| format!("Cannot list playlist {}", playlist_id))?;

        let sink: Arc<dyn VideoSink> = Arc::new(UploadSink::new(renderer, catalog.clone(), playlist_id.clone(), retry));
        (sink, titles.into_iter().collect())
    } else {
        let existing = ExistingOutputs::scan_output_dir(&output_dir, &config.input.clip_filter()).await?;
        let sink: Arc<dyn VideoSink> = Arc::new(RenderSink::new(renderer));
        (sink, existing)
    };

    let orchestrator = Orchestrator::new(&config, Arc::new(FfprobeProber::new()), sink, existing)
        .with_dry_run(run.dry_run);
    let summary = orchestrator.run(&root, &run.prefix).await?;

    info!("🎉 Done: {} new videos", summary.dispatched);
    Ok(())
}
