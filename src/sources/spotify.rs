use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use serde::Deserialize;
use std::{
    sync::LazyLock,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{millis, MusicSource, Playlist, RequestKind, SourceType, TrackSource};

const API: &str = "https://api.spotify.com/v1";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

static SPOTIFY_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"open\.spotify\.com/(?:intl-[\w-]+/)?(track|album|playlist|artist)/([A-Za-z0-9]+)")
        .unwrap()
});

pub fn request_kind(url: &str) -> Option<RequestKind> {
    let caps = SPOTIFY_URL.captures(url)?;
    match &caps[1] {
        "track" => Some(RequestKind::Track),
        "album" => Some(RequestKind::Album),
        "playlist" => Some(RequestKind::Playlist),
        "artist" => Some(RequestKind::Artist),
        _ => None,
    }
}

fn extract_id(url: &str) -> Result<(String, String)> {
    let caps = SPOTIFY_URL
        .captures(url)
        .ok_or_else(|| anyhow::anyhow!("URL de Spotify inválida: {}", url))?;
    Ok((caps[1].to_string(), caps[2].to_string()))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    name: String,
    duration_ms: u64,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
    album: Option<SpotifyAlbumRef>,
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyAlbumRef {
    #[serde(default)]
    images: Vec<SpotifyImage>,
}

#[derive(Debug, Deserialize)]
struct SpotifyImage {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ExternalUrls {
    spotify: String,
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct SpotifyAlbum {
    name: String,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
    #[serde(default)]
    images: Vec<SpotifyImage>,
    external_urls: ExternalUrls,
    tracks: Paging<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct SpotifyPlaylist {
    name: String,
    owner: SpotifyOwner,
    #[serde(default)]
    images: Vec<SpotifyImage>,
    external_urls: ExternalUrls,
    tracks: Paging<PlaylistItem>,
}

#[derive(Debug, Deserialize)]
struct SpotifyOwner {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    // Episodios o tracks locales eliminados llegan como null
    track: Option<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct ArtistInfo {
    name: String,
    #[serde(default)]
    images: Vec<SpotifyImage>,
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct TopTracks {
    tracks: Vec<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Paging<SpotifyTrack>,
}

fn join_artists(artists: &[SpotifyArtist]) -> Option<String> {
    (!artists.is_empty()).then(|| {
        artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    })
}

fn to_track(track: SpotifyTrack, fallback_cover: Option<&str>) -> TrackSource {
    let mut source = TrackSource::new(track.name, track.external_urls.spotify, SourceType::Spotify);

    if let Some(artist) = join_artists(&track.artists) {
        source = source.with_artist(artist);
    }
    if let Some(duration) = millis(track.duration_ms) {
        source = source.with_duration(duration);
    }

    let cover = track
        .album
        .and_then(|a| a.images.into_iter().next().map(|i| i.url))
        .or_else(|| fallback_cover.map(str::to_string));
    if let Some(cover) = cover {
        source = source.with_thumbnail(cover);
    }

    source
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Cliente de la Web API de Spotify (solo metadata, el audio se busca en YouTube)
pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    pub fn new(http: reqwest::Client, client_id: String, client_secret: String) -> Self {
        Self {
            http,
            client_id,
            client_secret,
            token: Mutex::new(None),
        }
    }

    /// Token de client credentials, renovado un minuto antes de expirar
    async fn access_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        debug!("🔑 Solicitando token de Spotify");
        let credentials = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
        let response = self
            .http
            .post(TOKEN_URL)
            .header("Authorization", format!("Basic {}", credentials))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("autenticación rechazada: {}", response.status());
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in.saturating_sub(60));
        *guard = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!("{}{}", API, path))
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} - {}", status, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("respuesta inválida de {}", path))
    }
}

#[async_trait]
impl MusicSource for SpotifyClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackSource>> {
        info!("🔍 Buscando en Spotify: {}", query);
        let response: SearchResponse = self
            .get(
                "/search",
                &[
                    ("q", query.to_string()),
                    ("type", "track".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        Ok(response
            .tracks
            .items
            .into_iter()
            .map(|t| to_track(t, None))
            .collect())
    }

    async fn get_track(&self, url: &str) -> Result<TrackSource> {
        let (_, id) = extract_id(url)?;
        let track: SpotifyTrack = self.get(&format!("/tracks/{}", id), &[]).await?;
        Ok(to_track(track, None))
    }

    async fn get_playlist(&self, url: &str, limit: usize) -> Result<Playlist> {
        let (kind, id) = extract_id(url)?;

        if kind == "album" {
            let album: SpotifyAlbum = self.get(&format!("/albums/{}", id), &[]).await?;
            let cover = album.images.into_iter().next().map(|i| i.url);
            return Ok(Playlist {
                title: album.name,
                url: album.external_urls.spotify,
                author: join_artists(&album.artists),
                tracks: album
                    .tracks
                    .items
                    .into_iter()
                    .take(limit)
                    .map(|t| to_track(t, cover.as_deref()))
                    .collect(),
                thumbnail: cover,
                source_type: SourceType::Spotify,
            });
        }

        let playlist: SpotifyPlaylist = self.get(&format!("/playlists/{}", id), &[]).await?;
        Ok(Playlist {
            title: playlist.name,
            url: playlist.external_urls.spotify,
            author: playlist.owner.display_name,
            thumbnail: playlist.images.into_iter().next().map(|i| i.url),
            source_type: SourceType::Spotify,
            tracks: playlist
                .tracks
                .items
                .into_iter()
                .filter_map(|item| item.track)
                .take(limit)
                .map(|t| to_track(t, None))
                .collect(),
        })
    }

    async fn get_artist(&self, url: &str, limit: usize) -> Result<Playlist> {
        let (_, id) = extract_id(url)?;
        let artist: ArtistInfo = self.get(&format!("/artists/{}", id), &[]).await?;
        let top: TopTracks = self
            .get(
                &format!("/artists/{}/top-tracks", id),
                &[("market", "US".to_string())],
            )
            .await?;

        Ok(Playlist {
            title: format!("{} - Top", artist.name),
            url: artist.external_urls.spotify,
            author: Some(artist.name),
            thumbnail: artist.images.into_iter().next().map(|i| i.url),
            source_type: SourceType::Spotify,
            tracks: top.tracks.into_iter().take(limit).map(|t| to_track(t, None)).collect(),
        })
    }

    async fn stream_url(&self, _track: &TrackSource) -> Result<Option<String>> {
        Ok(None)
    }

    fn source_type(&self) -> SourceType {
        SourceType::Spotify
    }
}
