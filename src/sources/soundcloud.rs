use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize};
use std::{collections::HashMap, sync::LazyLock};
use tracing::{debug, info, warn};

use super::{millis, MusicSource, Playlist, RequestKind, SourceType, TrackSource};

const API: &str = "https://api-v2.soundcloud.com";

static SOUNDCLOUD_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.|m\.)?soundcloud\.com/([\w-]+)(?:/(sets/)?([\w-]+))?/?(?:[?#].*)?$")
        .unwrap()
});
static SHORT_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://on\.soundcloud\.com/\w+").unwrap());

/// Máximo de ids por petición a `/tracks`
const IDS_PER_REQUEST: usize = 50;

/// Perfiles de SoundCloud que no son artistas
const RESERVED: [&str; 6] = ["discover", "search", "stream", "you", "charts", "upload"];

pub fn request_kind(url: &str) -> Option<RequestKind> {
    if SHORT_URL.is_match(url) {
        return Some(RequestKind::Track);
    }
    let caps = SOUNDCLOUD_URL.captures(url)?;
    if RESERVED.contains(&&caps[1]) {
        return None;
    }
    match (caps.get(2), caps.get(3)) {
        (Some(_), Some(_)) => Some(RequestKind::Playlist),
        (None, Some(_)) => Some(RequestKind::Track),
        _ => Some(RequestKind::Artist),
    }
}

/// En playlists largas solo los primeros tracks vienen completos; el resto
/// llega como `{"id": N, "kind": "track"}`.
#[derive(Debug, Deserialize)]
struct ScTrack {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    permalink_url: String,
    #[serde(default)]
    duration: u64,
    artwork_url: Option<String>,
    user: Option<ScUser>,
    media: Option<ScMedia>,
}

#[derive(Debug, Deserialize)]
struct ScUser {
    id: u64,
    username: String,
    avatar_url: Option<String>,
    permalink_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScMedia {
    #[serde(default)]
    transcodings: Vec<ScTranscoding>,
}

#[derive(Debug, Deserialize)]
struct ScTranscoding {
    url: String,
    format: ScFormat,
}

#[derive(Debug, Deserialize)]
struct ScFormat {
    protocol: String,
}

#[derive(Debug, Deserialize)]
struct ScPlaylist {
    title: String,
    permalink_url: String,
    artwork_url: Option<String>,
    user: Option<ScUser>,
    #[serde(default)]
    tracks: Vec<ScTrack>,
}

/// `/resolve` devuelve cualquiera de los tres según la URL
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum ScResolved {
    Track(ScTrack),
    Playlist(ScPlaylist),
    User(ScUser),
}

#[derive(Debug, Deserialize)]
struct ScCollection<T> {
    collection: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ScStream {
    url: String,
}

/// Las carátulas vienen en `-large` (100x100)
fn artwork(url: &str) -> String {
    url.replace("-large", "-t500x500")
}

/// Transcodificación progresiva (mp3 directo) preferida sobre HLS
fn progressive(media: &ScMedia) -> Option<&ScTranscoding> {
    media
        .transcodings
        .iter()
        .find(|t| t.format.protocol == "progressive")
        .or_else(|| media.transcodings.first())
}

impl ScTrack {
    fn is_stub(&self) -> bool {
        self.title.is_empty() || self.permalink_url.is_empty()
    }
}

/// Reemplaza los stubs por los tracks completos manteniendo el orden; los que
/// no se pudieron cargar se descartan
fn fill_stubs(tracks: Vec<ScTrack>, loaded: Vec<ScTrack>) -> Vec<ScTrack> {
    let mut loaded: HashMap<u64, ScTrack> = loaded
        .into_iter()
        .filter(|t| !t.is_stub())
        .map(|t| (t.id, t))
        .collect();

    tracks
        .into_iter()
        .filter_map(|t| if t.is_stub() { loaded.remove(&t.id) } else { Some(t) })
        .collect()
}

fn to_track(track: ScTrack) -> TrackSource {
    let mut source = TrackSource::new(track.title, track.permalink_url, SourceType::SoundCloud);
    if let Some(user) = &track.user {
        source = source.with_artist(user.username.clone());
    }
    if let Some(duration) = millis(track.duration) {
        source = source.with_duration(duration);
    }
    let thumb = track
        .artwork_url
        .or_else(|| track.user.and_then(|u| u.avatar_url));
    if let Some(thumb) = thumb {
        source = source.with_thumbnail(artwork(&thumb));
    }
    source
}

/// Cliente de la API v2 de SoundCloud
pub struct SoundCloudClient {
    http: reqwest::Client,
    client_id: String,
}

impl SoundCloudClient {
    pub fn new(http: reqwest::Client, client_id: String) -> Self {
        Self { http, client_id }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        let response = self
            .http
            .get(url)
            .query(query)
            .query(&[("client_id", self.client_id.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP {}", response.status());
        }

        Ok(response.json().await?)
    }

    async fn resolve_url(&self, url: &str) -> Result<ScResolved> {
        debug!("🔗 Resolviendo en SoundCloud: {}", url);
        self.get(&format!("{}/resolve", API), &[("url", url.to_string())])
            .await
    }

    /// Carga tracks completos por id, en lotes
    async fn tracks_by_id(&self, ids: &[u64]) -> Result<Vec<ScTrack>> {
        let mut loaded = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(IDS_PER_REQUEST) {
            let ids = chunk.iter().map(u64::to_string).collect::<Vec<_>>().join(",");
            let mut batch: Vec<ScTrack> = self.get(&format!("{}/tracks", API), &[("ids", ids)]).await?;
            loaded.append(&mut batch);
        }
        Ok(loaded)
    }

    async fn resolve_track(&self, url: &str) -> Result<ScTrack> {
        match self.resolve_url(url).await? {
            ScResolved::Track(track) => Ok(track),
            _ => anyhow::bail!("la URL no es un track: {}", url),
        }
    }
}

#[async_trait]
impl MusicSource for SoundCloudClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackSource>> {
        info!("🔍 Buscando en SoundCloud: {}", query);
        let found: ScCollection<ScTrack> = self
            .get(
                &format!("{}/search/tracks", API),
                &[("q", query.to_string()), ("limit", limit.to_string())],
            )
            .await?;

        Ok(found.collection.into_iter().take(limit).map(to_track).collect())
    }

    async fn get_track(&self, url: &str) -> Result<TrackSource> {
        Ok(to_track(self.resolve_track(url).await?))
    }

    async fn get_playlist(&self, url: &str, limit: usize) -> Result<Playlist> {
        let playlist = match self.resolve_url(url).await? {
            ScResolved::Playlist(playlist) => playlist,
            _ => anyhow::bail!("la URL no es una playlist: {}", url),
        };

        let tracks: Vec<ScTrack> = playlist.tracks.into_iter().take(limit).collect();
        let stubs: Vec<u64> = tracks.iter().filter(|t| t.is_stub()).map(|t| t.id).collect();
        let loaded = if stubs.is_empty() {
            Vec::new()
        } else {
            debug!("📥 Cargando {} tracks incompletos de la playlist", stubs.len());
            match self.tracks_by_id(&stubs).await {
                Ok(loaded) => loaded,
                Err(e) => {
                    warn!("⚠️ No se pudieron cargar los tracks incompletos: {:?}", e);
                    Vec::new()
                }
            }
        };

        Ok(Playlist {
            title: playlist.title,
            url: playlist.permalink_url,
            thumbnail: playlist.artwork_url.as_deref().map(artwork),
            author: playlist.user.map(|u| u.username),
            source_type: SourceType::SoundCloud,
            tracks: fill_stubs(tracks, loaded).into_iter().map(to_track).collect(),
        })
    }

    async fn get_artist(&self, url: &str, limit: usize) -> Result<Playlist> {
        let user = match self.resolve_url(url).await? {
            ScResolved::User(user) => user,
            _ => anyhow::bail!("la URL no es un perfil: {}", url),
        };

        let found: ScCollection<ScTrack> = self
            .get(
                &format!("{}/users/{}/tracks", API, user.id),
                &[("limit", limit.to_string())],
            )
            .await?;

        Ok(Playlist {
            title: format!("{} - Tracks", user.username),
            url: user.permalink_url.unwrap_or_else(|| url.to_string()),
            thumbnail: user.avatar_url.as_deref().map(artwork),
            author: Some(user.username),
            source_type: SourceType::SoundCloud,
            tracks: found.collection.into_iter().take(limit).map(to_track).collect(),
        })
    }

    async fn stream_url(&self, track: &TrackSource) -> Result<Option<String>> {
        let resolved = self.resolve_track(&track.url()).await?;
        let transcoding = resolved
            .media
            .as_ref()
            .and_then(progressive)
            .ok_or_else(|| anyhow::anyhow!("track sin transcodificaciones disponibles"))?;

        let stream: ScStream = self.get(&transcoding.url, &[]).await?;
        Ok(Some(stream.url))
    }

    fn source_type(&self) -> SourceType {
        SourceType::SoundCloud
    }
}
