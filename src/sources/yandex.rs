use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize};
use std::sync::LazyLock;
use tracing::info;

use super::{millis, MusicSource, Playlist, RequestKind, SourceType, TrackSource};

const API: &str = "https://api.music.yandex.net";

static TRACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"music\.yandex\.\w+/(?:album/\d+/)?track/(\d+)").unwrap());
static ALBUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"music\.yandex\.\w+/album/(\d+)/?(?:[?#].*)?$").unwrap());
static PLAYLIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"music\.yandex\.\w+/users/([\w.-]+)/playlists/(\d+)").unwrap());
static ARTIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"music\.yandex\.\w+/artist/(\d+)").unwrap());

pub fn request_kind(url: &str) -> Option<RequestKind> {
    if TRACK.is_match(url) {
        Some(RequestKind::Track)
    } else if ALBUM.is_match(url) {
        Some(RequestKind::Album)
    } else if PLAYLIST.is_match(url) {
        Some(RequestKind::Playlist)
    } else if ARTIST.is_match(url) {
        Some(RequestKind::Artist)
    } else {
        None
    }
}

#[derive(Debug, Deserialize)]
struct YandexEnvelope<T> {
    result: Option<T>,
    error: Option<YandexError>,
}

#[derive(Debug, Deserialize)]
struct YandexError {
    name: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YandexTrack {
    id: serde_json::Value,
    title: String,
    #[serde(default)]
    duration_ms: u64,
    #[serde(default)]
    artists: Vec<YandexArtist>,
    #[serde(default)]
    albums: Vec<YandexAlbumRef>,
    cover_uri: Option<String>,
    #[serde(default = "available")]
    available: bool,
}

fn available() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct YandexArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct YandexAlbumRef {
    id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YandexAlbum {
    id: u64,
    title: String,
    #[serde(default)]
    artists: Vec<YandexArtist>,
    cover_uri: Option<String>,
    #[serde(default)]
    volumes: Vec<Vec<YandexTrack>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YandexPlaylist {
    title: String,
    owner: Option<YandexOwner>,
    cover: Option<YandexCover>,
    #[serde(default)]
    tracks: Vec<YandexTrackShort>,
}

#[derive(Debug, Deserialize)]
struct YandexOwner {
    name: Option<String>,
    login: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YandexCover {
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YandexTrackShort {
    track: Option<YandexTrack>,
}

#[derive(Debug, Deserialize)]
struct YandexArtistTracks {
    #[serde(default)]
    tracks: Vec<YandexTrack>,
}

#[derive(Debug, Deserialize)]
struct YandexSearch {
    tracks: Option<YandexSearchTracks>,
}

#[derive(Debug, Deserialize)]
struct YandexSearchTracks {
    results: Vec<YandexTrack>,
}

/// `coverUri` viene sin esquema y con `%%` en lugar del tamaño
fn cover(uri: &str) -> String {
    format!("https://{}", uri.replace("%%", "400x400"))
}

fn to_track(track: YandexTrack) -> TrackSource {
    // El id llega como número o como cadena según el endpoint
    let id = match &track.id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let url = match track.albums.first() {
        Some(album) => format!("https://music.yandex.ru/album/{}/track/{}", album.id, id),
        None => format!("https://music.yandex.ru/track/{}", id),
    };

    let mut source = TrackSource::new(track.title, url, SourceType::Yandex);
    if !track.artists.is_empty() {
        source = source.with_artist(
            track
                .artists
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        );
    }
    if let Some(duration) = millis(track.duration_ms) {
        source = source.with_duration(duration);
    }
    if let Some(uri) = track.cover_uri.as_deref() {
        source = source.with_thumbnail(cover(uri));
    }
    source
}

fn unwrap_envelope<T>(envelope: YandexEnvelope<T>) -> Result<T> {
    if let Some(error) = envelope.error {
        anyhow::bail!(
            "{}: {}",
            error.name.unwrap_or_else(|| "error".to_string()),
            error.message.unwrap_or_default()
        );
    }
    envelope
        .result
        .ok_or_else(|| anyhow::anyhow!("respuesta vacía de Yandex Music"))
}

/// Cliente de la API de Yandex Music (solo metadata, el audio se busca en YouTube)
pub struct YandexClient {
    http: reqwest::Client,
    token: String,
}

impl YandexClient {
    pub fn new(http: reqwest::Client, token: String) -> Self {
        Self { http, token }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let response = self
            .http
            .get(format!("{}{}", API, path))
            .header("Authorization", format!("OAuth {}", self.token))
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP {}", response.status());
        }

        unwrap_envelope(response.json::<YandexEnvelope<T>>().await?)
    }
}

#[async_trait]
impl MusicSource for YandexClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackSource>> {
        info!("🔍 Buscando en Yandex Music: {}", query);
        let found: YandexSearch = self
            .get(
                "/search",
                &[
                    ("text", query.to_string()),
                    ("type", "track".to_string()),
                    ("page", "0".to_string()),
                ],
            )
            .await?;

        Ok(found
            .tracks
            .map(|t| t.results)
            .unwrap_or_default()
            .into_iter()
            .filter(|t| t.available)
            .take(limit)
            .map(to_track)
            .collect())
    }

    async fn get_track(&self, url: &str) -> Result<TrackSource> {
        let id = TRACK
            .captures(url)
            .map(|c| c[1].to_string())
            .ok_or_else(|| anyhow::anyhow!("URL de Yandex Music inválida: {}", url))?;

        let tracks: Vec<YandexTrack> = self.get(&format!("/tracks/{}", id), &[]).await?;
        tracks
            .into_iter()
            .next()
            .map(to_track)
            .ok_or_else(|| anyhow::anyhow!("track no encontrado"))
    }

    async fn get_playlist(&self, url: &str, limit: usize) -> Result<Playlist> {
        if let Some(caps) = ALBUM.captures(url) {
            let album: YandexAlbum = self
                .get(&format!("/albums/{}/with-tracks", &caps[1]), &[])
                .await?;
            let thumbnail = album.cover_uri.as_deref().map(cover);
            return Ok(Playlist {
                title: album.title,
                url: format!("https://music.yandex.ru/album/{}", album.id),
                author: album.artists.first().map(|a| a.name.clone()),
                thumbnail,
                source_type: SourceType::Yandex,
                tracks: album
                    .volumes
                    .into_iter()
                    .flatten()
                    .filter(|t| t.available)
                    .take(limit)
                    .map(to_track)
                    .collect(),
            });
        }

        let caps = PLAYLIST
            .captures(url)
            .ok_or_else(|| anyhow::anyhow!("URL de playlist de Yandex Music inválida: {}", url))?;
        let playlist: YandexPlaylist = self
            .get(&format!("/users/{}/playlists/{}", &caps[1], &caps[2]), &[])
            .await?;

        Ok(Playlist {
            title: playlist.title,
            url: url.to_string(),
            author: playlist.owner.and_then(|o| o.name.or(o.login)),
            thumbnail: playlist.cover.and_then(|c| c.uri).as_deref().map(cover),
            source_type: SourceType::Yandex,
            tracks: playlist
                .tracks
                .into_iter()
                .filter_map(|t| t.track)
                .filter(|t| t.available)
                .take(limit)
                .map(to_track)
                .collect(),
        })
    }

    async fn get_artist(&self, url: &str, limit: usize) -> Result<Playlist> {
        let id = ARTIST
            .captures(url)
            .map(|c| c[1].to_string())
            .ok_or_else(|| anyhow::anyhow!("URL de artista de Yandex Music inválida: {}", url))?;

        let found: YandexArtistTracks = self
            .get(
                &format!("/artists/{}/tracks", id),
                &[("page-size", limit.to_string())],
            )
            .await?;

        let tracks: Vec<TrackSource> = found.tracks.into_iter().take(limit).map(to_track).collect();
        let author = tracks.first().and_then(|t| t.artist());

        Ok(Playlist {
            title: format!("{} - Top", author.clone().unwrap_or_else(|| id.clone())),
            url: url.to_string(),
            thumbnail: tracks.first().and_then(|t| t.thumbnail()),
            author,
            source_type: SourceType::Yandex,
            tracks,
        })
    }

    async fn stream_url(&self, _track: &TrackSource) -> Result<Option<String>> {
        Ok(None)
    }

    fn source_type(&self) -> SourceType {
        SourceType::Yandex
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn detects_yandex_urls() {
        assert_eq!(
            request_kind("https://music.yandex.ru/album/3809855/track/31303224"),
            Some(RequestKind::Track)
        );
        assert_eq!(request_kind("https://music.yandex.com/track/31303224"), Some(RequestKind::Track));
        assert_eq!(request_kind("https://music.yandex.ru/album/3809855"), Some(RequestKind::Album));
        assert_eq!(
            request_kind("https://music.yandex.ru/users/music-blog/playlists/2142"),
            Some(RequestKind::Playlist)
        );
        assert_eq!(request_kind("https://music.yandex.ru/artist/41114"), Some(RequestKind::Artist));
        assert_eq!(request_kind("https://music.yandex.ru/home"), None);
    }

    #[test]
    fn maps_track_with_numeric_or_string_id() {
        let json = r#"[{
            "id": "31303224", "title": "Группа крови", "durationMs": 283000,
            "artists": [{"name": "Кино"}], "albums": [{"id": 3809855}],
            "coverUri": "avatars.yandex.net/get-music-content/1/abc/%%"
        }, {
            "id": 42, "title": "Loose", "artists": []
        }]"#;
        let tracks: Vec<YandexTrack> = serde_json::from_str(json).unwrap();
        let tracks: Vec<_> = tracks.into_iter().map(to_track).collect();

        assert_eq!(tracks[0].url(), "https://music.yandex.ru/album/3809855/track/31303224");
        assert_eq!(tracks[0].artist().as_deref(), Some("Кино"));
        assert_eq!(tracks[0].duration(), Some(Duration::from_millis(283000)));
        assert_eq!(
            tracks[0].thumbnail().as_deref(),
            Some("https://avatars.yandex.net/get-music-content/1/abc/400x400")
        );
        assert_eq!(tracks[1].url(), "https://music.yandex.ru/track/42");
        assert_eq!(tracks[1].artist(), None);
    }

    #[test]
    fn error_envelope_becomes_error() {
        let json = r#"{"error": {"name": "not-found", "message": "Track not found"}}"#;
        let envelope: YandexEnvelope<Vec<YandexTrack>> = serde_json::from_str(json).unwrap();
        assert_eq!(
            unwrap_envelope(envelope).unwrap_err().to_string(),
            "not-found: Track not found"
        );
    }
}
