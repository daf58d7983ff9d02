use anyhow::{anyhow, Context, Result};
use clip_core::{ClipFilter, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the clip compiler
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Raw clip discovery settings
    pub input: InputConfig,

    /// Rendered output and logging settings
    pub output: OutputConfig,

    /// YouTube upload settings
    pub youtube: YoutubeConfig,

    /// Quota retry settings for remote calls
    pub quota: QuotaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Supported clip extension, matched case-insensitively
    pub extension: String,

    /// File names starting with this character are ignored
    pub hidden_marker: char,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving rendered videos
    pub output_dir: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeConfig {
    /// Playlist collecting uploaded videos
    pub playlist_id: Option<String>,

    /// Video category
    pub category_id: String,

    /// "private", "unlisted" or "public"
    pub privacy_status: String,

    /// Tags attached to every upload
    pub tags: Vec<String>,

    /// OAuth client secrets downloaded from the Google console
    pub client_secrets: PathBuf,

    /// Token cache file name under ~/.credentials
    pub token_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Seconds to wait after a quota failure
    pub cooldown_secs: u64,

    /// Give up after this many cooldowns (unset = never)
    pub max_retries: Option<u32>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            extension: "mp4".to_string(),
            hidden_marker: '.',
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            log_level: "info".to_string(),
        }
    }
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            playlist_id: None,
            category_id: "19".to_string(), // Travel & Events
            privacy_status: "private".to_string(),
            tags: vec!["GoPro".to_string()],
            client_secrets: PathBuf::from("client_secrets.json"),
            token_file: "clip-compiler.json".to_string(),
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 3600,
            max_retries: None,
        }
    }
}

impl InputConfig {
    pub fn clip_filter(&self) -> ClipFilter {
        ClipFilter::new(&self.extension, self.hidden_marker)
    }
}

impl QuotaConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            cooldown: Duration::from_secs(self.cooldown_secs),
            max_retries: self.max_retries,
        }
    }
}

impl Config {
    /// Load configuration from the first readable config file, falling back to the environment
    pub fn load() -> Result<Self> {
        let mut config_paths = vec![
            PathBuf::from("clip-compiler.toml"),
            PathBuf::from("config/clip-compiler.toml"),
        ];
        if let Some(config_dir) = dirs::config_dir() {
            config_paths.push(config_dir.join("clip-compiler").join("config.toml"));
        }

        Self::load_first(&config_paths)
    }

    /// Load the first of `config_paths` that reads and parses, else fall back to the environment
    pub fn load_first(config_paths: &[PathBuf]) -> Result<Self> {
        for path in config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path.display());
                        return Ok(config.with_env_overrides());
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file {}", path.display()))?;
        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Cannot parse config file {}", path.display()))?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config.with_env_overrides())
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::default().with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(output_dir) = std::env::var("CLIP_COMPILER_OUTPUT_DIR") {
            self.output.output_dir = Some(PathBuf::from(output_dir));
        }

        if let Ok(log_level) = std::env::var("CLIP_COMPILER_LOG_LEVEL") {
            self.output.log_level = log_level;
        }

        if let Ok(playlist_id) = std::env::var("CLIP_COMPILER_PLAYLIST_ID") {
            self.youtube.playlist_id = Some(playlist_id);
        }

        if let Ok(cooldown) = std::env::var("CLIP_COMPILER_QUOTA_COOLDOWN_SECS") {
            match cooldown.parse() {
                Ok(secs) => self.quota.cooldown_secs = secs,
                Err(_) => tracing::warn!("Ignoring invalid CLIP_COMPILER_QUOTA_COOLDOWN_SECS: {}", cooldown),
            }
        }

        if let Ok(client_secrets) = std::env::var("GOOGLE_CLIENT_SECRETS") {
            self.youtube.client_secrets = PathBuf::from(client_secrets);
        }

        self
    }

    /// Validate settings shared by every mode
    pub fn validate(&self) -> Result<()> {
        if self.input.extension.trim_start_matches('.').is_empty() {
            return Err(anyhow!("input.extension must not be empty"));
        }

        if self.quota.cooldown_secs == 0 {
            return Err(anyhow!("quota.cooldown_secs must be greater than 0"));
        }

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }

    /// Validate settings needed for uploading
    pub fn validate_upload(&self) -> Result<()> {
        self.validate()?;

        if self.youtube.playlist_id.as_deref().map_or(true, str::is_empty) {
            return Err(anyhow!("youtube.playlist_id is required for uploads"));
        }

        if !matches!(self.youtube.privacy_status.as_str(), "private" | "unlisted" | "public") {
            return Err(anyhow!("Unknown privacy status: {}", self.youtube.privacy_status));
        }

        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Clip Compiler Configuration:\n\
            - Clip Extension: {}\n\
            - Output Directory: {}\n\
            - Playlist: {}\n\
            - Quota Cooldown: {}s (max retries: {})",
            self.input.extension,
            self.output
                .output_dir
                .as_ref()
                .map(|dir| dir.display().to_string())
                .unwrap_or_else(|| "<unset>".to_string()),
            self.youtube.playlist_id.as_deref().unwrap_or("<unset>"),
            self.quota.cooldown_secs,
            self.quota
                .max_retries
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unbounded".to_string()),
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.config.output.output_dir = Some(dir);
        self
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.config.input.extension = extension.to_string();
        self
    }

    pub fn with_playlist_id(mut self, playlist_id: &str) -> Self {
        self.config.youtube.playlist_id = Some(playlist_id.to_string());
        self
    }

    pub fn with_privacy_status(mut self, privacy_status: &str) -> Self {
        self.config.youtube.privacy_status = privacy_status.to_string();
        self
    }

    pub fn with_quota_cooldown(mut self, cooldown_secs: u64) -> Self {
        self.config.quota.cooldown_secs = cooldown_secs;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.config.quota.max_retries = Some(max_retries);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
