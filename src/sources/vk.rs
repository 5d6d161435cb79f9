use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize};
use std::{sync::LazyLock, time::Duration};
use tracing::info;

use super::{MusicSource, Playlist, RequestKind, SourceType, TrackSource};

const API: &str = "https://api.vk.com/method";
const API_VERSION: &str = "5.131";

static TRACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"vk\.(?:com|ru)/audio(-?\d+_\d+)").unwrap());
static PLAYLIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"vk\.(?:com|ru)/(?:music/(?:playlist|album)/|.*audio_playlist)(-?\d+)_(\d+)(?:_(\w+))?")
        .unwrap()
});
static ARTIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"vk\.(?:com|ru)/artist/([\w.-]+)").unwrap());

pub fn request_kind(url: &str) -> Option<RequestKind> {
    if TRACK.is_match(url) {
        Some(RequestKind::Track)
    } else if PLAYLIST.is_match(url) {
        Some(RequestKind::Playlist)
    } else if ARTIST.is_match(url) {
        Some(RequestKind::Artist)
    } else {
        None
    }
}

/// Envoltorio de respuesta de la API de VK
#[derive(Debug, Deserialize)]
struct VkEnvelope<T> {
    response: Option<T>,
    error: Option<VkError>,
}

#[derive(Debug, Deserialize)]
struct VkError {
    error_code: i64,
    error_msg: String,
}

#[derive(Debug, Deserialize)]
struct VkItems<T> {
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct VkAudio {
    id: i64,
    owner_id: i64,
    artist: String,
    title: String,
    duration: u64,
    #[serde(default)]
    url: String,
    album: Option<VkAlbumRef>,
}

#[derive(Debug, Deserialize)]
struct VkAlbumRef {
    thumb: Option<VkThumb>,
}

#[derive(Debug, Deserialize)]
struct VkThumb {
    photo_300: Option<String>,
    photo_600: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VkPlaylist {
    title: String,
    #[serde(default)]
    main_artists: Vec<VkArtistRef>,
    photo: Option<VkThumb>,
    #[serde(default)]
    thumbs: Vec<VkThumb>,
}

#[derive(Debug, Deserialize)]
struct VkArtistRef {
    name: String,
}

fn unwrap_envelope<T>(envelope: VkEnvelope<T>) -> Result<T> {
    if let Some(error) = envelope.error {
        anyhow::bail!("VK {}: {}", error.error_code, error.error_msg);
    }
    envelope
        .response
        .ok_or_else(|| anyhow::anyhow!("respuesta vacía de VK"))
}

fn thumb_url(thumb: VkThumb) -> Option<String> {
    thumb.photo_600.or(thumb.photo_300)
}

fn to_track(audio: VkAudio) -> TrackSource {
    let url = format!("https://vk.com/audio{}_{}", audio.owner_id, audio.id);
    let mut track = TrackSource::new(audio.title, url, SourceType::Vk).with_artist(audio.artist);

    if audio.duration > 0 {
        track = track.with_duration(Duration::from_secs(audio.duration));
    }
    // Audios bloqueados por derechos llegan con url vacía
    if !audio.url.is_empty() {
        track = track.with_stream_url(audio.url);
    }
    if let Some(cover) = audio.album.and_then(|a| a.thumb).and_then(thumb_url) {
        track = track.with_thumbnail(cover);
    }

    track
}

/// Cliente de la API de audio de VK
pub struct VkClient {
    http: reqwest::Client,
    token: String,
}

impl VkClient {
    pub fn new(http: reqwest::Client, token: String) -> Self {
        Self { http, token }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: &[(&str, String)]) -> Result<T> {
        let response = self
            .http
            .get(format!("{}/{}", API, method))
            .query(params)
            .query(&[("access_token", self.token.as_str()), ("v", API_VERSION)])
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP {}", response.status());
        }

        unwrap_envelope(response.json::<VkEnvelope<T>>().await?)
    }
}

#[async_trait]
impl MusicSource for VkClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackSource>> {
        info!("🔍 Buscando en VK: {}", query);
        let found: VkItems<VkAudio> = self
            .call(
                "audio.search",
                &[
                    ("q", query.to_string()),
                    ("count", limit.to_string()),
                    ("auto_complete", "1".to_string()),
                ],
            )
            .await?;

        Ok(found.items.into_iter().map(to_track).collect())
    }

    async fn get_track(&self, url: &str) -> Result<TrackSource> {
        let id = TRACK
            .captures(url)
            .map(|c| c[1].to_string())
            .ok_or_else(|| anyhow::anyhow!("URL de VK inválida: {}", url))?;

        let audios: Vec<VkAudio> = self.call("audio.getById", &[("audios", id)]).await?;
        audios
            .into_iter()
            .next()
            .map(to_track)
            .ok_or_else(|| anyhow::anyhow!("audio no encontrado"))
    }

    async fn get_playlist(&self, url: &str, limit: usize) -> Result<Playlist> {
        let caps = PLAYLIST
            .captures(url)
            .ok_or_else(|| anyhow::anyhow!("URL de playlist de VK inválida: {}", url))?;
        let owner_id = caps[1].to_string();
        let playlist_id = caps[2].to_string();
        let access_key = caps.get(3).map(|m| m.as_str().to_string()).unwrap_or_default();

        let info: VkPlaylist = self
            .call(
                "audio.getPlaylistById",
                &[
                    ("owner_id", owner_id.clone()),
                    ("playlist_id", playlist_id.clone()),
                    ("access_key", access_key.clone()),
                ],
            )
            .await?;

        let audios: VkItems<VkAudio> = self
            .call(
                "audio.get",
                &[
                    ("owner_id", owner_id),
                    ("album_id", playlist_id),
                    ("access_key", access_key),
                    ("count", limit.to_string()),
                ],
            )
            .await?;

        let thumbnail = info
            .photo
            .or_else(|| info.thumbs.into_iter().next())
            .and_then(thumb_url);

        Ok(Playlist {
            title: info.title,
            url: url.to_string(),
            author: (!info.main_artists.is_empty()).then(|| {
                info.main_artists
                    .iter()
                    .map(|a| a.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            }),
            thumbnail,
            source_type: SourceType::Vk,
            tracks: audios.items.into_iter().take(limit).map(to_track).collect(),
        })
    }

    async fn get_artist(&self, url: &str, limit: usize) -> Result<Playlist> {
        let artist_id = ARTIST
            .captures(url)
            .map(|c| c[1].to_string())
            .ok_or_else(|| anyhow::anyhow!("URL de artista de VK inválida: {}", url))?;

        let audios: VkItems<VkAudio> = self
            .call(
                "audio.getAudiosByArtist",
                &[("artist_id", artist_id.clone()), ("count", limit.to_string())],
            )
            .await?;

        let tracks: Vec<TrackSource> = audios.items.into_iter().take(limit).map(to_track).collect();
        let author = tracks.first().and_then(|t| t.artist()).unwrap_or(artist_id);

        Ok(Playlist {
            title: format!("{} - Top", author),
            url: url.to_string(),
            author: Some(author),
            thumbnail: None,
            source_type: SourceType::Vk,
            tracks,
        })
    }

    async fn stream_url(&self, track: &TrackSource) -> Result<Option<String>> {
        if let Some(url) = track.stream_url() {
            return Ok(Some(url));
        }
        // Las URLs de VK caducan: pedir una nueva
        let fresh = self.get_track(&track.url()).await?;
        Ok(fresh.stream_url())
    }

    fn source_type(&self) -> SourceType {
        SourceType::Vk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_vk_urls() {
        assert_eq!(request_kind("https://vk.com/audio-2001412_45671"), Some(RequestKind::Track));
        assert_eq!(
            request_kind("https://vk.com/music/playlist/-147845620_2949_adcd3f1"),
            Some(RequestKind::Playlist)
        );
        assert_eq!(
            request_kind("https://vk.com/audios123?z=audio_playlist-2000_1"),
            Some(RequestKind::Playlist)
        );
        assert_eq!(request_kind("https://vk.com/artist/kino"), Some(RequestKind::Artist));
        assert_eq!(request_kind("https://vk.com/id1"), None);
    }

    #[test]
    fn error_envelope_becomes_error() {
        let json = r#"{"error": {"error_code": 5, "error_msg": "User authorization failed"}}"#;
        let envelope: VkEnvelope<VkItems<VkAudio>> = serde_json::from_str(json).unwrap();
        let err = unwrap_envelope(envelope).unwrap_err();
        assert_eq!(err.to_string(), "VK 5: User authorization failed");
    }

    #[test]
    fn maps_audio_and_keeps_direct_url() {
        let json = r#"{"response": {"count": 1, "items": [{
            "id": 456239017, "owner_id": -2001, "artist": "Кино", "title": "Группа крови",
            "duration": 282, "url": "https://cs1.vkuseraudio.net/a.mp3",
            "album": {"thumb": {"photo_300": "s.jpg", "photo_600": "m.jpg"}}
        }, {
            "id": 1, "owner_id": 1, "artist": "X", "title": "Blocked", "duration": 0, "url": ""
        }]}}"#;
        let envelope: VkEnvelope<VkItems<VkAudio>> = serde_json::from_str(json).unwrap();
        let tracks: Vec<_> = unwrap_envelope(envelope).unwrap().items.into_iter().map(to_track).collect();

        assert_eq!(tracks[0].url(), "https://vk.com/audio-2001_456239017");
        assert_eq!(tracks[0].stream_url().as_deref(), Some("https://cs1.vkuseraudio.net/a.mp3"));
        assert_eq!(tracks[0].thumbnail().as_deref(), Some("m.jpg"));
        assert_eq!(tracks[0].duration(), Some(Duration::from_secs(282)));
        assert_eq!(tracks[1].stream_url(), None);
        assert_eq!(tracks[1].duration(), None);
    }
}
