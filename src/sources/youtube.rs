use anyhow::{Context, Result};
use async_process::Command;
use regex::Regex;
use serde::Deserialize;
use std::{sync::LazyLock, time::Duration};
use tracing::{debug, info};

use super::{MusicSource, Playlist, RequestKind, SourceType, TrackSource};

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?(www\.|m\.|music\.)?(youtube\.com|youtu\.be)/").unwrap()
});
static VIDEO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(youtu\.be/[\w-]{11}|[?&]v=[\w-]{11}|/shorts/[\w-]{11}|/embed/[\w-]{11})").unwrap()
});
static PLAYLIST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[?&]list=[\w-]+").unwrap());
static CHANNEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"youtube\.com/(channel/[\w-]+|@[\w.-]+|c/[\w-]+|user/[\w-]+)").unwrap());

/// Clasifica una URL de YouTube. Un enlace `watch?v=..&list=..` es un track.
pub fn request_kind(url: &str) -> Option<RequestKind> {
    if !YOUTUBE_URL.is_match(url) {
        return None;
    }
    if VIDEO.is_match(url) {
        Some(RequestKind::Track)
    } else if PLAYLIST.is_match(url) {
        Some(RequestKind::Playlist)
    } else if CHANNEL.is_match(url) {
        Some(RequestKind::Artist)
    } else {
        None
    }
}

/// Cliente para interactuar con YouTube vía yt-dlp
pub struct YouTubeClient {
    binary: String,
    rate_limiter: tokio::sync::Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    thumbnail: Option<String>,
    thumbnails: Option<Vec<YtDlpThumbnail>>,
    webpage_url: Option<String>,
    is_live: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct YtDlpThumbnail {
    url: String,
}

/// Cabecera de una playlist o canal en modo `--dump-single-json`
#[derive(Debug, Deserialize)]
struct YtDlpPlaylist {
    title: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
    webpage_url: Option<String>,
    thumbnails: Option<Vec<YtDlpThumbnail>>,
    #[serde(default)]
    entries: Vec<YtDlpInfo>,
}

impl YouTubeClient {
    pub fn new(binary: String) -> Self {
        Self {
            binary,
            // Limitar procesos concurrentes para evitar rate limiting
            rate_limiter: tokio::sync::Semaphore::new(3),
        }
    }

    /// Ejecuta yt-dlp y devuelve stdout
    async fn run(&self, args: &[&str]) -> Result<String> {
        let _permit = self.rate_limiter.acquire().await?;

        debug!("▶️ yt-dlp {}", args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Obtiene la cabecera y entradas de una playlist o canal
    async fn get_listing(&self, url: &str, limit: usize) -> Result<Playlist> {
        info!("📋 Obteniendo listado de YouTube: {}", url);

        let stdout = self
            .run(&[
                "--flat-playlist",
                "--dump-single-json",
                "--playlist-end",
                &limit.to_string(),
                "--no-warnings",
                url,
            ])
            .await?;

        parse_listing(&stdout, url, limit)
    }
}

/// Convierte una línea de yt-dlp a TrackSource
fn info_to_track(info: YtDlpInfo) -> TrackSource {
    let url = info
        .webpage_url
        .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", info.id));
    let mut track = TrackSource::new(
        info.title.unwrap_or_else(|| "Desconocido".to_string()),
        url,
        SourceType::YouTube,
    );

    if let Some(artist) = info.uploader.or(info.channel) {
        track = track.with_artist(artist);
    }

    // Los directos no tienen duración
    if let Some(duration) = info.duration.filter(|_| !info.is_live.unwrap_or(false)) {
        track = track.with_duration(Duration::from_secs_f64(duration));
    }

    let thumbnail = info
        .thumbnail
        .or_else(|| info.thumbnails.and_then(|t| t.into_iter().last().map(|t| t.url)));
    if let Some(thumbnail) = thumbnail {
        track = track.with_thumbnail(thumbnail);
    }

    track
}

/// Parsea la salida de `--dump-json`, una línea JSON por video
fn parse_lines(stdout: &str) -> Vec<TrackSource> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<YtDlpInfo>(line).ok())
        .map(info_to_track)
        .collect()
}

fn parse_listing(stdout: &str, url: &str, limit: usize) -> Result<Playlist> {
    let listing: YtDlpPlaylist =
        serde_json::from_str(stdout).context("Error al parsear respuesta de yt-dlp")?;

    let tracks: Vec<TrackSource> = listing
        .entries
        .into_iter()
        .take(limit)
        .map(info_to_track)
        .collect();

    Ok(Playlist {
        title: listing.title.unwrap_or_else(|| "Playlist".to_string()),
        url: listing.webpage_url.unwrap_or_else(|| url.to_string()),
        author: listing.uploader.or(listing.channel),
        thumbnail: listing
            .thumbnails
            .and_then(|t| t.into_iter().last().map(|t| t.url)),
        source_type: SourceType::YouTube,
        tracks,
    })
}

#[async_trait::async_trait]
impl MusicSource for YouTubeClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackSource>> {
        info!("🔍 Buscando en YouTube: {}", query);

        let search_query = format!("ytsearch{}:{}", limit, query);
        let stdout = self
            .run(&[
                "--no-playlist",
                "--dump-json",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                &search_query,
            ])
            .await?;

        Ok(parse_lines(&stdout))
    }

    async fn get_track(&self, url: &str) -> Result<TrackSource> {
        debug!("📊 Obteniendo info de: {}", url);

        let stdout = self
            .run(&["--no-playlist", "--dump-json", "--no-warnings", url])
            .await?;

        parse_lines(&stdout)
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("yt-dlp no devolvió información"))
    }

    async fn get_playlist(&self, url: &str, limit: usize) -> Result<Playlist> {
        self.get_listing(url, limit).await
    }

    async fn get_artist(&self, url: &str, limit: usize) -> Result<Playlist> {
        // Los canales se resuelven por su pestaña de videos
        let videos = if url.trim_end_matches('/').ends_with("/videos") {
            url.to_string()
        } else {
            format!("{}/videos", url.trim_end_matches('/'))
        };
        self.get_listing(&videos, limit).await
    }

    async fn stream_url(&self, track: &TrackSource) -> Result<Option<String>> {
        debug!("🎵 Obteniendo URL de stream para: {}", track.url());

        let url = track.url();
        let stdout = self
            .run(&[
                "--no-playlist",
                "-f",
                "bestaudio/best",
                "--get-url",
                "--no-warnings",
                &url,
            ])
            .await?;

        let stream_url = stdout.lines().next().unwrap_or_default().trim().to_string();
        if stream_url.is_empty() {
            anyhow::bail!("No se pudo obtener URL de stream");
        }

        Ok(Some(stream_url))
    }

    fn source_type(&self) -> SourceType {
        SourceType::YouTube
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_youtube_url_detection() {
        assert_eq!(
            request_kind("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some(RequestKind::Track)
        );
        assert_eq!(request_kind("https://youtu.be/dQw4w9WgXcQ"), Some(RequestKind::Track));
        assert_eq!(
            request_kind("https://music.youtube.com/watch?v=dQw4w9WgXcQ&list=RDAMVM"),
            Some(RequestKind::Track)
        );
        assert_eq!(
            request_kind("https://www.youtube.com/playlist?list=PLx0sYbCqOb8TBPRdmBHs5Iftvv9TPboYG"),
            Some(RequestKind::Playlist)
        );
        assert_eq!(
            request_kind("https://www.youtube.com/@LinkinPark"),
            Some(RequestKind::Artist)
        );
        assert_eq!(request_kind("https://example.com/video"), None);
    }

    #[test]
    fn flat_search_lines_fall_back_to_watch_url() {
        let stdout = concat!(
            r#"{"id":"dQw4w9WgXcQ","title":"Never Gonna Give You Up","duration":212.0,"channel":"Rick Astley","thumbnails":[{"url":"small.jpg"},{"url":"big.jpg"}]}"#,
            "\n",
            "not json\n",
            r#"{"id":"live0000000","title":"Lofi radio","duration":0.0,"is_live":true}"#,
        );

        let tracks = parse_lines(stdout);
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].url(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(tracks[0].artist().as_deref(), Some("Rick Astley"));
        assert_eq!(tracks[0].duration(), Some(Duration::from_secs(212)));
        assert_eq!(tracks[0].thumbnail().as_deref(), Some("big.jpg"));
        assert_eq!(tracks[1].duration(), None);
    }

    #[test]
    fn listing_is_truncated_to_limit() {
        let stdout = r#"{
            "title": "Mix",
            "uploader": "Someone",
            "entries": [
                {"id": "aaaaaaaaaaa", "title": "A"},
                {"id": "bbbbbbbbbbb", "title": "B"},
                {"id": "ccccccccccc", "title": "C"}
            ]
        }"#;

        let playlist = parse_listing(stdout, "https://youtube.com/playlist?list=x", 2).unwrap();
        assert_eq!(playlist.title, "Mix");
        assert_eq!(playlist.author.as_deref(), Some("Someone"));
        assert_eq!(playlist.url, "https://youtube.com/playlist?list=x");
        assert_eq!(playlist.tracks.len(), 2);
        assert_eq!(playlist.tracks[1].title(), "B");
    }
}
