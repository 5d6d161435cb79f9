//! # Sources Module
//!
//! Platform dispatch layer. Every supported platform is wrapped in an adapter
//! implementing [`MusicSource`], and every adapter maps its own JSON responses
//! into the common [`TrackSource`] / [`Playlist`] shape.
//!
//! [`SourceManager`] is the single entry point used by the bot:
//!
//! 1. [`SourceManager::parse_query`] classifies user input into a [`Request`]
//!    (platform + [`RequestKind`] + target) using URL patterns, a platform
//!    alias prefix (`sp`, `yt`, `vk`, `ym`, `sc`) or the default YouTube search.
//! 2. [`SourceManager::resolve`] runs the request against the adapter and
//!    caches the normalized result.
//! 3. [`SourceManager::resolve_audio`] turns a track into a direct audio URL
//!    for the transcoder, falling back to a YouTube search for platforms that
//!    only expose metadata.
//!
//! Adapter failures are wrapped into [`MusicError::Api`], which renders with
//! the `[APIs]:` prefix in chat.

pub mod discord;
pub mod soundcloud;
pub mod spotify;
pub mod vk;
pub mod yandex;
pub mod youtube;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serenity::model::id::UserId;
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::{
    audio::transcoder::Transcoder,
    cache::{CacheMetrics, MusicCache},
    config::Config,
    error::MusicError,
};

pub use discord::DiscordClient;
pub use soundcloud::SoundCloudClient;
pub use spotify::SpotifyClient;
pub use vk::VkClient;
pub use yandex::YandexClient;
pub use youtube::YouTubeClient;

/// Trait común para todas las fuentes de música
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MusicSource: Send + Sync {
    /// Busca tracks en la fuente
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackSource>>;

    /// Obtiene información detallada de un track por URL
    async fn get_track(&self, url: &str) -> Result<TrackSource>;

    /// Obtiene tracks de una playlist o álbum
    async fn get_playlist(&self, url: &str, limit: usize) -> Result<Playlist>;

    /// Obtiene los tracks más populares de un artista
    async fn get_artist(&self, url: &str, limit: usize) -> Result<Playlist>;

    /// URL directa de audio, `None` si la plataforma solo expone metadata
    async fn stream_url(&self, track: &TrackSource) -> Result<Option<String>>;

    fn source_type(&self) -> SourceType;
}

/// Representa un track de música
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSource {
    title: String,
    artist: Option<String>,
    duration: Option<Duration>,
    thumbnail: Option<String>,
    url: String,
    stream_url: Option<String>,
    source_type: SourceType,
    requested_by: Option<UserId>,
}

impl TrackSource {
    pub fn new(title: String, url: String, source_type: SourceType) -> Self {
        Self {
            title,
            artist: None,
            duration: None,
            thumbnail: None,
            url,
            stream_url: None,
            source_type,
            requested_by: None,
        }
    }

    // Getters
    pub fn title(&self) -> String {
        self.title.clone()
    }
    pub fn artist(&self) -> Option<String> {
        self.artist.clone()
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn thumbnail(&self) -> Option<String> {
        self.thumbnail.clone()
    }
    pub fn url(&self) -> String {
        self.url.clone()
    }
    pub fn stream_url(&self) -> Option<String> {
        self.stream_url.clone()
    }
    pub fn source_type(&self) -> SourceType {
        self.source_type
    }
    pub fn requested_by(&self) -> Option<UserId> {
        self.requested_by
    }

    // Setters
    pub fn with_artist(mut self, artist: String) -> Self {
        self.artist = Some(artist);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: String) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    pub fn with_stream_url(mut self, stream_url: String) -> Self {
        self.stream_url = Some(stream_url);
        self
    }

    pub fn with_requested_by(mut self, user_id: UserId) -> Self {
        self.requested_by = Some(user_id);
        self
    }

    /// Copia sin la URL de audio si esta caduca
    fn cacheable(&self) -> Self {
        let mut track = self.clone();
        if track.source_type.stream_expires() {
            track.stream_url = None;
        }
        track
    }

    /// Texto usado para buscar el audio en YouTube cuando la plataforma no
    /// lo expone.
    pub fn search_text(&self) -> String {
        match &self.artist {
            Some(artist) => format!("{} - {}", artist, self.title),
            None => self.title.clone(),
        }
    }
}

/// Playlist, álbum o lista de tracks de un artista ya normalizada
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub title: String,
    pub url: String,
    pub author: Option<String>,
    pub thumbnail: Option<String>,
    pub source_type: SourceType,
    pub tracks: Vec<TrackSource>,
}

impl Playlist {
    pub fn total_duration(&self) -> Duration {
        self.tracks.iter().filter_map(|t| t.duration()).sum()
    }
}

/// Tipos de fuentes de música
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    YouTube,
    Spotify,
    Vk,
    Yandex,
    SoundCloud,
    Discord,
}

impl SourceType {
    pub const ALL: [SourceType; 6] = [
        SourceType::YouTube,
        SourceType::Spotify,
        SourceType::Vk,
        SourceType::Yandex,
        SourceType::SoundCloud,
        SourceType::Discord,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::YouTube => "youtube",
            SourceType::Spotify => "spotify",
            SourceType::Vk => "vk",
            SourceType::Yandex => "yandex",
            SourceType::SoundCloud => "soundcloud",
            SourceType::Discord => "discord",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SourceType::YouTube => "YouTube",
            SourceType::Spotify => "Spotify",
            SourceType::Vk => "VK",
            SourceType::Yandex => "Yandex Music",
            SourceType::SoundCloud => "SoundCloud",
            SourceType::Discord => "Discord",
        }
    }

    /// Alias aceptados como prefijo de búsqueda (`sp never gonna give`) o
    /// como opción explícita de plataforma.
    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias.to_lowercase().as_str() {
            "yt" | "youtube" => Some(SourceType::YouTube),
            "sp" | "spotify" => Some(SourceType::Spotify),
            "vk" => Some(SourceType::Vk),
            "ym" | "yandex" => Some(SourceType::Yandex),
            "sc" | "soundcloud" => Some(SourceType::SoundCloud),
            _ => None,
        }
    }

    /// Solo metadata: el audio se busca en YouTube
    pub fn metadata_only(&self) -> bool {
        matches!(self, SourceType::Spotify | SourceType::Yandex)
    }

    /// Las URLs de audio de VK vienen firmadas y caducan
    pub fn stream_expires(&self) -> bool {
        matches!(self, SourceType::Vk)
    }

    /// Clasifica una URL según los patrones de cada plataforma
    pub fn classify(url: &str) -> Option<(SourceType, RequestKind)> {
        discord::request_kind(url)
            .map(|k| (SourceType::Discord, k))
            .or_else(|| youtube::request_kind(url).map(|k| (SourceType::YouTube, k)))
            .or_else(|| spotify::request_kind(url).map(|k| (SourceType::Spotify, k)))
            .or_else(|| vk::request_kind(url).map(|k| (SourceType::Vk, k)))
            .or_else(|| yandex::request_kind(url).map(|k| (SourceType::Yandex, k)))
            .or_else(|| soundcloud::request_kind(url).map(|k| (SourceType::SoundCloud, k)))
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Tipo de petición que resuelve un adaptador
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Track,
    Playlist,
    Album,
    Artist,
    Search,
}

/// Petición ya clasificada
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub platform: SourceType,
    pub kind: RequestKind,
    pub target: String,
}

impl Request {
    fn cache_key(&self, limit: usize) -> String {
        format!("{}:{:?}:{}:{}", self.platform.as_str(), self.kind, limit, self.target)
    }
}

/// Resultado normalizado de una petición
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Resolved {
    Track(TrackSource),
    Playlist(Playlist),
    Search(Vec<TrackSource>),
}

impl Resolved {
    /// Versión que se guarda en caché: las URLs de audio firmadas no se
    /// reutilizan y se piden de nuevo al reproducir.
    fn cacheable(&self) -> Self {
        match self {
            Resolved::Track(track) => Resolved::Track(track.cacheable()),
            Resolved::Playlist(playlist) => Resolved::Playlist(Playlist {
                tracks: playlist.tracks.iter().map(TrackSource::cacheable).collect(),
                ..playlist.clone()
            }),
            Resolved::Search(tracks) => Resolved::Search(tracks.iter().map(TrackSource::cacheable).collect()),
        }
    }

    /// Marca todos los tracks con el usuario que los pidió
    pub fn with_requester(self, user_id: UserId) -> Self {
        match self {
            Resolved::Track(track) => Resolved::Track(track.with_requested_by(user_id)),
            Resolved::Playlist(mut playlist) => {
                playlist.tracks = playlist
                    .tracks
                    .into_iter()
                    .map(|t| t.with_requested_by(user_id))
                    .collect();
                Resolved::Playlist(playlist)
            }
            Resolved::Search(tracks) => Resolved::Search(
                tracks.into_iter().map(|t| t.with_requested_by(user_id)).collect(),
            ),
        }
    }
}

/// Manager para todas las fuentes de música
pub struct SourceManager {
    sources: HashMap<SourceType, Arc<dyn MusicSource>>,
    cache: MusicCache,
    playlist_limit: usize,
    search_limit: usize,
}

impl SourceManager {
    /// Registra solo las plataformas que tienen credenciales configuradas.
    pub fn new(config: &Config, transcoder: Arc<Transcoder>, cache: MusicCache) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("tunebridge/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut sources: HashMap<SourceType, Arc<dyn MusicSource>> = HashMap::new();
        sources.insert(
            SourceType::YouTube,
            Arc::new(YouTubeClient::new(config.ytdlp_path.clone())),
        );
        sources.insert(
            SourceType::Discord,
            Arc::new(DiscordClient::new(transcoder)),
        );

        if let (Some(id), Some(secret)) = (&config.spotify_client_id, &config.spotify_client_secret) {
            if config.platform_enabled(SourceType::Spotify) {
                sources.insert(
                    SourceType::Spotify,
                    Arc::new(SpotifyClient::new(http.clone(), id.clone(), secret.clone())),
                );
            }
        }
        if let Some(token) = config.vk_token.clone().filter(|_| config.platform_enabled(SourceType::Vk)) {
            sources.insert(SourceType::Vk, Arc::new(VkClient::new(http.clone(), token)));
        }
        if let Some(token) = config
            .yandex_token
            .clone()
            .filter(|_| config.platform_enabled(SourceType::Yandex))
        {
            sources.insert(SourceType::Yandex, Arc::new(YandexClient::new(http.clone(), token)));
        }
        if let Some(client_id) = config
            .soundcloud_client_id
            .clone()
            .filter(|_| config.platform_enabled(SourceType::SoundCloud))
        {
            sources.insert(
                SourceType::SoundCloud,
                Arc::new(SoundCloudClient::new(http, client_id)),
            );
        }

        let enabled: Vec<&str> = sources.keys().map(|s| s.as_str()).collect();
        info!("🎛️ Plataformas habilitadas: {}", enabled.join(", "));

        Ok(Self::with_sources(
            sources,
            cache,
            config.max_playlist_size,
            config.search_limit,
        ))
    }

    pub fn with_sources(
        sources: HashMap<SourceType, Arc<dyn MusicSource>>,
        cache: MusicCache,
        playlist_limit: usize,
        search_limit: usize,
    ) -> Self {
        Self {
            sources,
            cache,
            playlist_limit,
            search_limit,
        }
    }

    pub fn search_limit(&self) -> usize {
        self.search_limit
    }

    pub fn is_enabled(&self, platform: SourceType) -> bool {
        self.sources.contains_key(&platform)
    }

    /// Clasifica la entrada del usuario en una petición.
    ///
    /// `explicit` viene de la opción `source` de los comandos slash; si no se
    /// indica, un primer token con alias de plataforma la selecciona.
    pub fn parse_query(&self, query: &str, explicit: Option<SourceType>) -> Result<Request, MusicError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MusicError::invalid("la búsqueda está vacía"));
        }

        let request = if query.starts_with("http://") || query.starts_with("https://") {
            let (platform, kind) = SourceType::classify(query)
                .ok_or_else(|| MusicError::UnsupportedUrl(query.to_string()))?;
            Request {
                platform,
                kind,
                target: query.to_string(),
            }
        } else {
            let (platform, text) = match explicit {
                Some(platform) => (platform, query),
                None => match query.split_once(char::is_whitespace) {
                    Some((alias, rest)) if !rest.trim().is_empty() => {
                        match SourceType::from_alias(alias) {
                            Some(platform) => (platform, rest.trim()),
                            None => (SourceType::YouTube, query),
                        }
                    }
                    _ => (SourceType::YouTube, query),
                },
            };
            Request {
                platform,
                kind: RequestKind::Search,
                target: text.to_string(),
            }
        };

        if !self.is_enabled(request.platform) {
            return Err(MusicError::PlatformDisabled(request.platform.display_name()));
        }

        debug!("🧭 Petición clasificada: {:?}", request);
        Ok(request)
    }

    /// Ejecuta la petición contra el adaptador correspondiente
    pub async fn resolve(&self, request: &Request, requester: UserId) -> Result<Resolved> {
        let limit = match request.kind {
            RequestKind::Search => self.search_limit,
            _ => self.playlist_limit,
        };
        let key = request.cache_key(limit);

        if let Some(cached) = self.cache.get(&key) {
            debug!("💾 Cache hit: {}", key);
            return Ok(cached.with_requester(requester));
        }

        let source = self.source(request.platform)?;
        let platform = request.platform.as_str();

        let resolved = match request.kind {
            RequestKind::Track => Resolved::Track(
                source
                    .get_track(&request.target)
                    .await
                    .map_err(|e| MusicError::api(platform, format!("{e:#}")))?,
            ),
            RequestKind::Playlist | RequestKind::Album => Resolved::Playlist(
                source
                    .get_playlist(&request.target, limit)
                    .await
                    .map_err(|e| MusicError::api(platform, format!("{e:#}")))?,
            ),
            RequestKind::Artist => Resolved::Playlist(
                source
                    .get_artist(&request.target, limit)
                    .await
                    .map_err(|e| MusicError::api(platform, format!("{e:#}")))?,
            ),
            RequestKind::Search => {
                let tracks = source
                    .search(&request.target, limit)
                    .await
                    .map_err(|e| MusicError::api(platform, format!("{e:#}")))?;
                if tracks.is_empty() {
                    return Err(MusicError::NoResults(request.target.clone()).into());
                }
                Resolved::Search(tracks)
            }
        };

        if let Resolved::Playlist(playlist) = &resolved {
            if playlist.tracks.is_empty() {
                return Err(MusicError::NoResults(request.target.clone()).into());
            }
        }

        self.cache.insert(key, resolved.cacheable());
        Ok(resolved.with_requester(requester))
    }

    /// Obtiene la URL directa de audio que consumirá el transcodificador
    pub async fn resolve_audio(&self, track: &TrackSource) -> Result<String> {
        if let Some(url) = track.stream_url() {
            return Ok(url);
        }

        let platform = track.source_type();
        if let Some(source) = self.sources.get(&platform) {
            if let Some(url) = source
                .stream_url(track)
                .await
                .map_err(|e| MusicError::api(platform.as_str(), format!("{e:#}")))?
            {
                return Ok(url);
            }
        }

        if platform == SourceType::YouTube {
            return Err(MusicError::api("youtube", "no se obtuvo URL de audio").into());
        }

        if !platform.metadata_only() {
            warn!("⚠️ {} no devolvió audio para {}, buscando en YouTube", platform, track.title());
        }

        // Plataformas sin audio: buscar el mismo track en YouTube
        let youtube = self.source(SourceType::YouTube)?;
        let query = track.search_text();
        info!("🔁 Buscando audio en YouTube para: {}", query);

        let candidate = youtube
            .search(&query, 1)
            .await
            .map_err(|e| MusicError::api("youtube", format!("{e:#}")))?
            .into_iter()
            .next()
            .ok_or_else(|| MusicError::NoResults(query.clone()))?;

        youtube
            .stream_url(&candidate)
            .await
            .map_err(|e| MusicError::api("youtube", format!("{e:#}")))?
            .ok_or_else(|| MusicError::api("youtube", "no se obtuvo URL de audio").into())
    }

    pub fn cleanup_cache(&self) -> usize {
        self.cache.cleanup_expired()
    }

    pub fn cache_metrics(&self) -> CacheMetrics {
        self.cache.metrics()
    }

    fn source(&self, platform: SourceType) -> Result<&Arc<dyn MusicSource>, MusicError> {
        self.sources
            .get(&platform)
            .ok_or(MusicError::PlatformDisabled(platform.display_name()))
    }
}

/// Convierte milisegundos de una API a `Duration`
pub(crate) fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn track(title: &str, source_type: SourceType) -> TrackSource {
        TrackSource::new(title.to_string(), format!("https://example.com/{title}"), source_type)
    }

    fn manager(sources: Vec<(SourceType, Arc<dyn MusicSource>)>) -> SourceManager {
        SourceManager::with_sources(
            sources.into_iter().collect(),
            MusicCache::new(16, Duration::from_secs(60)),
            50,
            5,
        )
    }

    fn youtube_only() -> SourceManager {
        manager(vec![(SourceType::YouTube, Arc::new(MockMusicSource::new()))])
    }

    #[test]
    fn classifies_platform_urls() {
        let cases = [
            ("https://www.youtube.com/watch?v=dQw4w9WgXcQ", SourceType::YouTube, RequestKind::Track),
            ("https://www.youtube.com/playlist?list=PL123", SourceType::YouTube, RequestKind::Playlist),
            ("https://open.spotify.com/album/4aawyAB9vmqN3uQ7FjRGTy", SourceType::Spotify, RequestKind::Album),
            ("https://vk.com/audio-2001_123", SourceType::Vk, RequestKind::Track),
            ("https://music.yandex.ru/album/123/track/456", SourceType::Yandex, RequestKind::Track),
            ("https://soundcloud.com/artist/sets/best", SourceType::SoundCloud, RequestKind::Playlist),
            ("https://cdn.discordapp.com/attachments/1/2/song.mp3", SourceType::Discord, RequestKind::Track),
        ];

        for (url, platform, kind) in cases {
            assert_eq!(SourceType::classify(url), Some((platform, kind)), "{url}");
        }
        assert_eq!(SourceType::classify("https://example.com/page"), None);
    }

    #[test]
    fn plain_text_defaults_to_youtube_search() {
        let request = youtube_only().parse_query("  never gonna give you up ", None).unwrap();
        assert_eq!(
            request,
            Request {
                platform: SourceType::YouTube,
                kind: RequestKind::Search,
                target: "never gonna give you up".to_string(),
            }
        );
    }

    #[test]
    fn alias_prefix_selects_platform() {
        let manager = manager(vec![
            (SourceType::YouTube, Arc::new(MockMusicSource::new())),
            (SourceType::Yandex, Arc::new(MockMusicSource::new())),
        ]);
        let request = manager.parse_query("ym кино группа крови", None).unwrap();
        assert_eq!(request.platform, SourceType::Yandex);
        assert_eq!(request.target, "кино группа крови");

        // Un alias sin texto es una búsqueda normal
        let request = manager.parse_query("ym", None).unwrap();
        assert_eq!(request.platform, SourceType::YouTube);
        assert_eq!(request.target, "ym");
    }

    #[test]
    fn disabled_platform_is_rejected() {
        let err = youtube_only()
            .parse_query("https://open.spotify.com/track/abc", None)
            .unwrap_err();
        assert_eq!(err, MusicError::PlatformDisabled("Spotify"));
    }

    #[test]
    fn unknown_url_and_empty_query_are_rejected() {
        let manager = youtube_only();
        assert!(matches!(
            manager.parse_query("https://example.com/x", None),
            Err(MusicError::UnsupportedUrl(_))
        ));
        assert!(matches!(
            manager.parse_query("   ", None),
            Err(MusicError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn resolve_stamps_requester_and_caches() {
        let mut youtube = MockMusicSource::new();
        youtube
            .expect_search()
            .times(1)
            .returning(|_, _| Ok(vec![track("a", SourceType::YouTube)]));

        let manager = manager(vec![(SourceType::YouTube, Arc::new(youtube))]);
        let request = manager.parse_query("a", None).unwrap();

        for user in [UserId::new(7), UserId::new(8)] {
            match manager.resolve(&request, user).await.unwrap() {
                Resolved::Search(tracks) => assert_eq!(tracks[0].requested_by(), Some(user)),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn adapter_errors_are_wrapped_with_api_prefix() {
        let mut youtube = MockMusicSource::new();
        youtube
            .expect_get_track()
            .returning(|_| Err(anyhow::anyhow!("HTTP 500")));

        let manager = manager(vec![(SourceType::YouTube, Arc::new(youtube))]);
        let request = manager
            .parse_query("https://youtu.be/dQw4w9WgXcQ", None)
            .unwrap();
        let err = manager.resolve(&request, UserId::new(1)).await.unwrap_err();

        assert_eq!(err.to_string(), "[APIs]: youtube: HTTP 500");
    }

    #[tokio::test]
    async fn empty_search_is_no_results() {
        let mut youtube = MockMusicSource::new();
        youtube.expect_search().returning(|_, _| Ok(Vec::new()));

        let manager = manager(vec![(SourceType::YouTube, Arc::new(youtube))]);
        let request = manager.parse_query("nothing", None).unwrap();
        let err = manager.resolve(&request, UserId::new(1)).await.unwrap_err();

        assert_eq!(
            err.downcast_ref::<MusicError>(),
            Some(&MusicError::NoResults("nothing".to_string()))
        );
    }

    #[tokio::test]
    async fn metadata_only_tracks_fall_back_to_youtube() {
        let mut spotify = MockMusicSource::new();
        spotify.expect_stream_url().returning(|_| Ok(None));

        let mut youtube = MockMusicSource::new();
        youtube
            .expect_search()
            .withf(|query, limit| query == "Queen - Bohemian Rhapsody" && *limit == 1)
            .returning(|_, _| Ok(vec![track("video", SourceType::YouTube)]));
        youtube
            .expect_stream_url()
            .returning(|_| Ok(Some("https://audio.example/stream".to_string())));

        let manager = manager(vec![
            (SourceType::YouTube, Arc::new(youtube)),
            (SourceType::Spotify, Arc::new(spotify)),
        ]);

        let song = TrackSource::new(
            "Bohemian Rhapsody".to_string(),
            "https://open.spotify.com/track/x".to_string(),
            SourceType::Spotify,
        )
        .with_artist("Queen".to_string());

        let url = manager.resolve_audio(&song).await.unwrap();
        assert_eq!(url, "https://audio.example/stream");
    }

    #[tokio::test]
    async fn cached_vk_tracks_fetch_a_fresh_stream() {
        let mut vk = MockMusicSource::new();
        vk.expect_get_track().times(1).returning(|url| {
            Ok(TrackSource::new("Группа крови".to_string(), url.to_string(), SourceType::Vk)
                .with_stream_url("https://cs.vk/old.mp3".to_string()))
        });
        vk.expect_stream_url()
            .times(1)
            .returning(|_| Ok(Some("https://cs.vk/fresh.mp3".to_string())));

        let manager = manager(vec![
            (SourceType::YouTube, Arc::new(MockMusicSource::new())),
            (SourceType::Vk, Arc::new(vk)),
        ]);
        let request = manager.parse_query("https://vk.com/audio-2001_123", None).unwrap();

        let first = manager.resolve(&request, UserId::new(1)).await.unwrap();
        let Resolved::Track(first) = first else {
            panic!("expected a track");
        };
        assert_eq!(first.stream_url().as_deref(), Some("https://cs.vk/old.mp3"));

        let cached = manager.resolve(&request, UserId::new(1)).await.unwrap();
        let Resolved::Track(cached) = cached else {
            panic!("expected a track");
        };
        assert_eq!(cached.stream_url(), None);
        assert_eq!(manager.resolve_audio(&cached).await.unwrap(), "https://cs.vk/fresh.mp3");
    }

    #[tokio::test]
    async fn known_stream_url_skips_adapters() {
        let manager = youtube_only();
        let song = track("direct", SourceType::Vk).with_stream_url("https://cs.vk/x.mp3".to_string());
        assert_eq!(manager.resolve_audio(&song).await.unwrap(), "https://cs.vk/x.mp3");
    }
}
