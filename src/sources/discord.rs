use anyhow::Result;
use async_trait::async_trait;
use serenity::model::channel::Attachment;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use super::{MusicSource, Playlist, RequestKind, SourceType, TrackSource};
use crate::audio::transcoder::Transcoder;

const AUDIO_EXTENSIONS: [&str; 9] = ["mp3", "wav", "ogg", "oga", "opus", "flac", "m4a", "aac", "webm"];
const DISCORD_CDN: [&str; 2] = ["cdn.discordapp.com", "media.discordapp.net"];

fn extension(url: &Url) -> Option<String> {
    let name = url.path_segments()?.last()?;
    let (_, ext) = name.rsplit_once('.')?;
    Some(ext.to_lowercase())
}

/// Adjuntos de Discord y enlaces directos a ficheros de audio
pub fn request_kind(url: &str) -> Option<RequestKind> {
    let parsed = Url::parse(url).ok()?;
    let is_audio = extension(&parsed).is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()));

    let on_cdn = parsed
        .host_str()
        .is_some_and(|host| DISCORD_CDN.contains(&host));

    (is_audio && (on_cdn || matches!(parsed.scheme(), "http" | "https"))).then_some(RequestKind::Track)
}

/// Título legible a partir del nombre del fichero
fn title_from_url(url: &str) -> String {
    let name = Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments()?.last().map(str::to_string))
        .unwrap_or_else(|| url.to_string());

    let name = urlencoding::decode(&name)
        .map(|n| n.into_owned())
        .unwrap_or(name);
    let stem = name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(&name);

    stem.replace('_', " ").trim().to_string()
}

/// Construye un track a partir de un adjunto recibido por mensaje
pub fn attachment_track(attachment: &Attachment) -> Option<TrackSource> {
    let is_audio = attachment
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("audio/"))
        || request_kind(&attachment.url).is_some();

    is_audio.then(|| {
        TrackSource::new(title_from_url(&attachment.url), attachment.url.clone(), SourceType::Discord)
            .with_stream_url(attachment.url.clone())
    })
}

/// Fuente para ficheros alojados en Discord u otros servidores HTTP
pub struct DiscordClient {
    transcoder: Arc<Transcoder>,
}

impl DiscordClient {
    pub fn new(transcoder: Arc<Transcoder>) -> Self {
        Self { transcoder }
    }
}

#[async_trait]
impl MusicSource for DiscordClient {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<TrackSource>> {
        anyhow::bail!("Discord no admite búsquedas")
    }

    async fn get_track(&self, url: &str) -> Result<TrackSource> {
        let mut track = TrackSource::new(title_from_url(url), url.to_string(), SourceType::Discord)
            .with_stream_url(url.to_string());

        // Sin duración el track sigue siendo reproducible
        match self.transcoder.probe(url).await {
            Ok(probe) => {
                debug!("📏 ffprobe {}: {:?}", url, probe);
                if let Some(title) = probe.title {
                    track = TrackSource::new(title, url.to_string(), SourceType::Discord)
                        .with_stream_url(url.to_string());
                }
                if let Some(artist) = probe.artist {
                    track = track.with_artist(artist);
                }
                if let Some(duration) = probe.duration {
                    track = track.with_duration(duration);
                }
            }
            Err(e) => warn!("⚠️ No se pudo analizar {}: {}", url, e),
        }

        Ok(track)
    }

    async fn get_playlist(&self, _url: &str, _limit: usize) -> Result<Playlist> {
        anyhow::bail!("Discord no tiene playlists")
    }

    async fn get_artist(&self, _url: &str, _limit: usize) -> Result<Playlist> {
        anyhow::bail!("Discord no tiene artistas")
    }

    async fn stream_url(&self, track: &TrackSource) -> Result<Option<String>> {
        Ok(Some(track.url()))
    }

    fn source_type(&self) -> SourceType {
        SourceType::Discord
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_audio_links() {
        assert_eq!(
            request_kind("https://cdn.discordapp.com/attachments/1/2/song.mp3?ex=abc"),
            Some(RequestKind::Track)
        );
        assert_eq!(
            request_kind("https://files.example.org/music/Track.FLAC"),
            Some(RequestKind::Track)
        );
        assert_eq!(request_kind("https://cdn.discordapp.com/attachments/1/2/image.png"), None);
        assert_eq!(request_kind("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), None);
        assert_eq!(request_kind("not a url.mp3"), None);
    }

    #[test]
    fn title_comes_from_file_name() {
        assert_eq!(
            title_from_url("https://cdn.discordapp.com/attachments/1/2/my_cool%20song.mp3?ex=1"),
            "my cool song"
        );
        assert_eq!(title_from_url("https://host/path/noext"), "noext");
    }
}
