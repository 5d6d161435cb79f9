use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::sources::SourceType;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    #[serde(default)]
    pub application_id: u64,
    #[serde(default)]
    pub guild_id: Option<u64>, // Para comandos de desarrollo
    pub prefix: String,
    #[serde(default)]
    pub shards: Option<u32>,

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub max_playlist_size: usize,
    pub search_limit: usize,
    pub idle_timeout_secs: u64,
    pub transcoder_timeout_secs: u64,

    // Binarios externos
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub ytdlp_path: String,

    // Rendimiento
    pub cache_size: usize,
    pub cache_ttl_secs: u64,
    #[serde(default)]
    pub worker_threads: Option<usize>,

    // Paths
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,

    // APIs (opcionales)
    #[serde(default)]
    pub spotify_client_id: Option<String>,
    #[serde(default)]
    pub spotify_client_secret: Option<String>,
    #[serde(default)]
    pub vk_token: Option<String>,
    #[serde(default)]
    pub yandex_token: Option<String>,
    #[serde(default)]
    pub soundcloud_client_id: Option<String>,

    // Features
    pub enable_history: bool,
    pub enable_text_commands: bool,
    pub enable_slash_commands: bool,
}

impl Config {
    /// Loads configuration from defaults, an optional local JSON file and the
    /// environment, in that order of precedence (last wins).
    ///
    /// The JSON file path is taken from `CONFIG_PATH` and defaults to
    /// `config.json` in the working directory. A missing file is not an error.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.json".to_string());
        let defaults = Self::default();

        let settings = config::Config::builder()
            .set_default("prefix", defaults.prefix.clone())?
            .set_default("default_volume", defaults.default_volume as f64)?
            .set_default("max_queue_size", defaults.max_queue_size as u64)?
            .set_default("max_playlist_size", defaults.max_playlist_size as u64)?
            .set_default("search_limit", defaults.search_limit as u64)?
            .set_default("idle_timeout_secs", defaults.idle_timeout_secs)?
            .set_default("transcoder_timeout_secs", defaults.transcoder_timeout_secs)?
            .set_default("ffmpeg_path", defaults.ffmpeg_path.clone())?
            .set_default("ffprobe_path", defaults.ffprobe_path.clone())?
            .set_default("ytdlp_path", defaults.ytdlp_path.clone())?
            .set_default("cache_size", defaults.cache_size as u64)?
            .set_default("cache_ttl_secs", defaults.cache_ttl_secs)?
            .set_default("data_dir", defaults.data_dir.display().to_string())?
            .set_default("cache_dir", defaults.cache_dir.display().to_string())?
            .set_default("enable_history", defaults.enable_history)?
            .set_default("enable_text_commands", defaults.enable_text_commands)?
            .set_default("enable_slash_commands", defaults.enable_slash_commands)?
            .add_source(
                config::File::with_name(&path)
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .context("No se pudo construir la configuración")?;

        let config: Self = settings
            .try_deserialize()
            .context("Configuración inválida (¿falta DISCORD_TOKEN?)")?;

        // Crear directorios si no existen
        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(&config.cache_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// - Token must be present
    /// - Volume must be between 0.0 and 2.0
    /// - Sizes and timeouts must be greater than zero
    /// - At least one command surface must be enabled
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN no puede estar vacío");
        }

        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.search_limit == 0 || self.search_limit > 25 {
            anyhow::bail!("Search limit must be between 1 and 25, got: {}", self.search_limit);
        }

        if self.cache_size == 0 {
            anyhow::bail!("Cache size must be greater than 0");
        }

        if self.idle_timeout_secs == 0 {
            anyhow::bail!("Idle timeout must be greater than 0");
        }

        if self.transcoder_timeout_secs == 0 {
            anyhow::bail!("Transcoder timeout must be greater than 0");
        }

        if self.prefix.trim().is_empty() {
            anyhow::bail!("Command prefix cannot be empty");
        }

        if !self.enable_text_commands && !self.enable_slash_commands {
            anyhow::bail!("At least one of text or slash commands must be enabled");
        }

        if matches!(self.shards, Some(0)) {
            anyhow::bail!("Shard count must be greater than 0");
        }

        Ok(())
    }

    /// Whether the given platform has the credentials it needs.
    ///
    /// YouTube and Discord attachments need no credentials.
    pub fn platform_enabled(&self, platform: SourceType) -> bool {
        fn present(value: &Option<String>) -> bool {
            value.as_deref().is_some_and(|v| !v.trim().is_empty())
        }

        match platform {
            SourceType::YouTube | SourceType::Discord => true,
            SourceType::Spotify => {
                present(&self.spotify_client_id) && present(&self.spotify_client_secret)
            }
            SourceType::Vk => present(&self.vk_token),
            SourceType::Yandex => present(&self.yandex_token),
            SourceType::SoundCloud => present(&self.soundcloud_client_id),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn transcoder_timeout(&self) -> Duration {
        Duration::from_secs(self.transcoder_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens and API secrets are never included.
    pub fn summary(&self) -> String {
        let platforms: Vec<&str> = SourceType::ALL
            .iter()
            .filter(|p| self.platform_enabled(**p))
            .map(|p| p.as_str())
            .collect();

        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {}), prefix '{}', shards {}\n  \
            Audio: {}% vol, idle {}s, transcoder timeout {}s\n  \
            Limits: {} queue, {} playlist, {} search results\n  \
            Cache: {} entries, ttl {}s\n  \
            Platforms: {}\n  \
            Features: history={}, text={}, slash={}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.prefix,
            self.shards.map_or("auto".to_string(), |n| n.to_string()),
            (self.default_volume * 100.0) as u32,
            self.idle_timeout_secs,
            self.transcoder_timeout_secs,
            self.max_queue_size,
            self.max_playlist_size,
            self.search_limit,
            self.cache_size,
            self.cache_ttl_secs,
            platforms.join(", "),
            self.enable_history,
            self.enable_text_commands,
            self.enable_slash_commands
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when neither the JSON file nor the environment
/// provide a value.
impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,
            prefix: "!".to_string(),
            shards: None,

            default_volume: 0.5,
            max_queue_size: 1000,
            max_playlist_size: 100,
            search_limit: 5,
            idle_timeout_secs: 300,
            transcoder_timeout_secs: 20,

            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            ytdlp_path: "yt-dlp".to_string(),

            cache_size: 500,
            cache_ttl_secs: 3600,
            worker_threads: None,

            data_dir: "./data".into(),
            cache_dir: "./cache".into(),

            spotify_client_id: None,
            spotify_client_secret: None,
            vk_token: None,
            yandex_token: None,
            soundcloud_client_id: None,

            enable_history: true,
            enable_text_commands: true,
            enable_slash_commands: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            discord_token: "token".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn default_with_token_is_valid() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn empty_token_is_rejected() {
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn volume_out_of_range_is_rejected() {
        let config = Config {
            default_volume: 2.5,
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn both_command_surfaces_disabled_is_rejected() {
        let config = Config {
            enable_text_commands: false,
            enable_slash_commands: false,
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_shards_is_rejected() {
        let config = Config {
            shards: Some(0),
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn platforms_need_credentials() {
        let mut config = valid();
        assert!(config.platform_enabled(SourceType::YouTube));
        assert!(config.platform_enabled(SourceType::Discord));
        assert!(!config.platform_enabled(SourceType::Spotify));

        config.spotify_client_id = Some("id".to_string());
        assert!(!config.platform_enabled(SourceType::Spotify));
        config.spotify_client_secret = Some("secret".to_string());
        assert!(config.platform_enabled(SourceType::Spotify));

        config.vk_token = Some("   ".to_string());
        assert!(!config.platform_enabled(SourceType::Vk));
    }

    #[test]
    fn summary_never_leaks_secrets() {
        let config = Config {
            discord_token: "super-secret-token".to_string(),
            yandex_token: Some("yandex-secret".to_string()),
            ..valid()
        };
        let summary = config.summary();
        assert!(!summary.contains("super-secret-token"));
        assert!(!summary.contains("yandex-secret"));
        assert!(summary.contains("yandex"));
    }
}
