use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serenity::model::id::{ChannelId, MessageId, UserId};
use std::{
    collections::{HashSet, VecDeque},
    fmt,
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{error::MusicError, sources::TrackSource};

/// Fallos consecutivos tras los que la cola se considera caída
pub const CRASH_THRESHOLD: u32 = 3;
const MAX_HISTORY: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub source: TrackSource,
    pub title: String,
    pub artist: Option<String>,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
    pub url: String,
    pub requested_by: Option<UserId>,
    pub added_at: DateTime<Utc>,
}

impl From<TrackSource> for QueueItem {
    fn from(source: TrackSource) -> Self {
        Self {
            title: source.title(),
            artist: source.artist(),
            duration: source.duration(),
            thumbnail: source.thumbnail(),
            url: source.url(),
            requested_by: source.requested_by(),
            added_at: Utc::now(),
            source,
        }
    }
}

/// Canciones que borra `clear` (la actual nunca se toca)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearFilter {
    All,
    Duplicates,
    User(UserId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    /// Repite la canción actual
    Song,
    /// Repite toda la cola
    Songs,
}

impl LoopMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "off" | "none" => Some(LoopMode::Off),
            "song" | "track" => Some(LoopMode::Song),
            "songs" | "queue" => Some(LoopMode::Songs),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoopMode::Off => "off",
            LoopMode::Song => "song",
            LoopMode::Songs => "songs",
        }
    }
}

/// Estado de reproducción de una cola.
///
/// ```text
/// Empty ──▶ Playing ◀──▶ Paused
///              │  ▲         │
///              ▼  │         │
///          WaitingNext ◀────┘
///
/// cualquiera ──▶ Destroying
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerStatus {
    #[default]
    Empty,
    Playing,
    Paused,
    /// Entre dos tracks, o con la cola agotada esperando más
    WaitingNext,
    Destroying,
}

impl PlayerStatus {
    pub fn can_transition(self, to: PlayerStatus) -> bool {
        use PlayerStatus::*;
        match (self, to) {
            (Destroying, _) => false,
            (_, Destroying) => true,
            (Empty, Playing | WaitingNext) => true,
            (Playing, Playing | Paused | WaitingNext) => true,
            (Paused, Playing | WaitingNext) => true,
            (WaitingNext, Playing | WaitingNext) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PlayerStatus::Empty => "vacía",
            PlayerStatus::Playing => "reproduciendo",
            PlayerStatus::Paused => "pausada",
            PlayerStatus::WaitingNext => "esperando",
            PlayerStatus::Destroying => "cerrando",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("transición inválida: {from:?} → {to:?}")]
pub struct InvalidTransition {
    pub from: PlayerStatus,
    pub to: PlayerStatus,
}

/// Lo que el reproductor debe poner a sonar a continuación
#[derive(Debug, Clone, PartialEq)]
pub struct Playback {
    pub item: QueueItem,
    pub start_at: Duration,
}

#[derive(Debug)]
pub struct MusicQueue {
    items: VecDeque<QueueItem>,
    current: Option<QueueItem>,
    history: VecDeque<QueueItem>,
    loop_mode: LoopMode,
    radio: bool,
    status: PlayerStatus,
    volume: f32,
    max_size: usize,
    failures: u32,
    pending_restart: Option<Duration>,
    skip_current: bool,
    /// Pausa automática por quedarse solo en el canal
    auto_paused: bool,

    pub voice_channel: ChannelId,
    pub text_channel: ChannelId,
    pub anchor_message: Option<MessageId>,
}

impl MusicQueue {
    pub fn new(max_size: usize, voice_channel: ChannelId, text_channel: ChannelId, volume: f32) -> Self {
        Self {
            items: VecDeque::new(),
            current: None,
            history: VecDeque::new(),
            loop_mode: LoopMode::Off,
            radio: false,
            status: PlayerStatus::Empty,
            volume,
            max_size,
            failures: 0,
            pending_restart: None,
            skip_current: false,
            auto_paused: false,
            voice_channel,
            text_channel,
            anchor_message: None,
        }
    }

    /// Agrega un track a la cola y devuelve su posición (1 = siguiente)
    pub fn add_track(&mut self, source: TrackSource) -> Result<usize, MusicError> {
        if self.items.len() >= self.max_size {
            return Err(MusicError::QueueFull(self.max_size));
        }

        let item = QueueItem::from(source);
        info!("➕ Agregado a la cola: {}", item.title);
        self.items.push_back(item);

        Ok(self.items.len())
    }

    /// Agrega múltiples tracks (playlist), truncando al espacio libre
    pub fn add_tracks(&mut self, sources: Vec<TrackSource>) -> Result<usize, MusicError> {
        let available_space = self.max_size.saturating_sub(self.items.len());
        if available_space == 0 && !sources.is_empty() {
            return Err(MusicError::QueueFull(self.max_size));
        }

        let to_add = sources.len().min(available_space);
        self.items
            .extend(sources.into_iter().take(to_add).map(QueueItem::from));

        info!("➕ Agregadas {} canciones a la cola", to_add);
        Ok(to_add)
    }

    /// Avanza al siguiente track según el modo de repetición.
    ///
    /// El track terminado vuelve al final en loop `songs` y en modo radio, se
    /// repite en loop `song` y en otro caso pasa al historial. Un reinicio
    /// pendiente (replay / seek) devuelve el actual en la posición pedida.
    pub fn advance(&mut self) -> Option<Playback> {
        if let Some(start_at) = self.pending_restart.take() {
            if let Some(current) = &self.current {
                debug!("⏮️ Reiniciando {} en {:?}", current.title, start_at);
                return Some(Playback {
                    item: current.clone(),
                    start_at,
                });
            }
        }

        let skipped = std::mem::take(&mut self.skip_current);
        if let Some(finished) = self.current.take() {
            if self.loop_mode == LoopMode::Song && !skipped {
                info!("🔂 Repitiendo track: {}", finished.title);
                self.current = Some(finished.clone());
                return Some(Playback {
                    item: finished,
                    start_at: Duration::ZERO,
                });
            }

            if self.radio || self.loop_mode == LoopMode::Songs {
                self.items.push_back(finished);
            } else {
                self.push_history(finished);
            }
        }

        let Some(next) = self.items.pop_front() else {
            info!("📭 Cola vacía, no hay siguiente track");
            return None;
        };

        info!("➡️ Siguiente en cola: {}", next.title);
        self.current = Some(next.clone());
        Some(Playback {
            item: next,
            start_at: Duration::ZERO,
        })
    }

    /// Salta `amount` canciones contando la actual.
    ///
    /// Solo descarta las `amount - 1` siguientes; la actual la termina el
    /// reproductor y el avance normal la saca de la cola.
    pub fn skip(&mut self, amount: usize) -> Result<usize, MusicError> {
        if self.radio {
            return Err(MusicError::RadioMode);
        }
        if self.current.is_none() {
            return Err(MusicError::NothingPlaying);
        }
        if amount == 0 || amount > self.items.len() + 1 {
            return Err(MusicError::invalid(format!(
                "solo se pueden saltar entre 1 y {} canciones",
                self.items.len() + 1
            )));
        }

        let dropped: Vec<QueueItem> = self.items.drain(..amount - 1).collect();
        for item in dropped {
            if self.loop_mode == LoopMode::Songs {
                self.items.push_back(item);
            } else {
                self.push_history(item);
            }
        }
        self.skip_current = true;
        self.pending_restart = None;

        Ok(amount)
    }

    /// El track actual no debe repetirse (por ejemplo tras un error)
    pub fn discard_current(&mut self) {
        self.skip_current = true;
        self.pending_restart = None;
    }

    /// Vuelve a empezar el track actual en `offset` (replay / seek)
    pub fn request_restart(&mut self, offset: Duration) -> Result<(), MusicError> {
        if self.radio {
            return Err(MusicError::RadioMode);
        }
        let current = self.current.as_ref().ok_or(MusicError::NothingPlaying)?;

        if let Some(duration) = current.duration {
            if offset >= duration {
                return Err(MusicError::invalid(format!(
                    "la posición supera la duración del track ({})",
                    humantime::format_duration(duration)
                )));
            }
        }

        self.pending_restart = Some(offset);
        self.skip_current = false;
        Ok(())
    }

    /// Elimina el track en la posición indicada (1 = siguiente)
    pub fn remove(&mut self, position: usize) -> Result<QueueItem, MusicError> {
        if self.radio {
            return Err(MusicError::RadioMode);
        }
        if position == 0 || position > self.items.len() {
            return Err(self.out_of_range());
        }

        let item = self.items.remove(position - 1).ok_or_else(|| self.out_of_range())?;
        debug!("❌ Track eliminado en posición {}", position);
        Ok(item)
    }

    /// Mueve un track a una nueva posición (ambas 1-based)
    pub fn move_track(&mut self, from: usize, to: usize) -> Result<(), MusicError> {
        if self.radio {
            return Err(MusicError::RadioMode);
        }
        if from == 0 || to == 0 || from > self.items.len() || to > self.items.len() {
            return Err(self.out_of_range());
        }

        if from != to {
            let item = self.items.remove(from - 1).ok_or_else(|| self.out_of_range())?;
            self.items.insert(to - 1, item);
            debug!("📍 Track movido de posición {} a {}", from, to);
        }

        Ok(())
    }

    /// Mezcla la cola
    pub fn shuffle(&mut self) -> Result<(), MusicError> {
        if self.radio {
            return Err(MusicError::RadioMode);
        }
        if self.items.len() < 2 {
            return Err(MusicError::invalid("no hay suficientes canciones para mezclar"));
        }

        let mut rng = rand::thread_rng();
        self.items.make_contiguous().shuffle(&mut rng);
        info!("🔀 Cola mezclada");
        Ok(())
    }

    /// Limpia la cola
    pub fn clear(&mut self) {
        self.items.clear();
        info!("🗑️ Cola limpiada");
    }

    /// Limpia duplicados
    pub fn clear_duplicates(&mut self) -> usize {
        let mut seen = HashSet::new();
        if let Some(current) = &self.current {
            seen.insert(current.url.clone());
        }
        let original_len = self.items.len();

        self.items.retain(|item| seen.insert(item.url.clone()));

        let removed = original_len - self.items.len();
        if removed > 0 {
            info!("🗑️ Eliminados {} duplicados", removed);
        }
        removed
    }

    /// Limpia tracks de un usuario específico
    pub fn clear_user_tracks(&mut self, user_id: UserId) -> usize {
        let original_len = self.items.len();
        self.items.retain(|item| item.requested_by != Some(user_id));

        let removed = original_len - self.items.len();
        if removed > 0 {
            info!("🗑️ Eliminadas {} canciones del usuario", removed);
        }
        removed
    }

    /// Aplica un filtro de `clear`; devuelve cuántas canciones quitó
    pub fn clear_filtered(&mut self, filter: ClearFilter) -> usize {
        match filter {
            ClearFilter::All => {
                let removed = self.items.len();
                self.clear();
                removed
            }
            ClearFilter::Duplicates => self.clear_duplicates(),
            ClearFilter::User(user_id) => self.clear_user_tracks(user_id),
        }
    }

    /// Cambia el modo de loop
    pub fn set_loop_mode(&mut self, mode: LoopMode) -> Result<(), MusicError> {
        if self.radio {
            return Err(MusicError::RadioMode);
        }

        self.loop_mode = mode;
        match mode {
            LoopMode::Off => info!("➡️ Repetición desactivada"),
            LoopMode::Song => info!("🔂 Repetir canción activado"),
            LoopMode::Songs => info!("🔁 Repetir cola activado"),
        }
        Ok(())
    }

    /// Activa o desactiva el modo radio; al activarlo se desactiva el loop
    pub fn toggle_radio(&mut self) -> bool {
        self.radio = !self.radio;
        if self.radio {
            self.loop_mode = LoopMode::Off;
            info!("📻 Modo radio activado");
        } else {
            info!("📻 Modo radio desactivado");
        }
        self.radio
    }

    pub fn status(&self) -> PlayerStatus {
        self.status
    }

    pub fn transition(&mut self, to: PlayerStatus) -> Result<(), InvalidTransition> {
        let from = self.status;
        if !from.can_transition(to) {
            warn!("⚠️ Transición rechazada: {:?} → {:?}", from, to);
            return Err(InvalidTransition { from, to });
        }
        if from != to {
            debug!("🔄 Estado de la cola: {:?} → {:?}", from, to);
        }
        self.status = to;
        Ok(())
    }

    /// Comprueba si se puede pausar sin cambiar el estado; distingue entre
    /// ya pausado y nada sonando
    pub fn can_pause(&self) -> Result<(), MusicError> {
        match self.status {
            PlayerStatus::Playing => Ok(()),
            PlayerStatus::Paused => Err(MusicError::AlreadyPaused),
            _ => Err(MusicError::NothingPlaying),
        }
    }

    pub fn pause(&mut self) -> Result<(), MusicError> {
        self.can_pause()?;
        self.status = PlayerStatus::Paused;
        Ok(())
    }

    pub fn can_resume(&self) -> Result<(), MusicError> {
        match self.status {
            PlayerStatus::Paused => Ok(()),
            _ => Err(MusicError::NotPaused),
        }
    }

    pub fn resume(&mut self) -> Result<(), MusicError> {
        self.can_resume()?;
        self.status = PlayerStatus::Playing;
        self.auto_paused = false;
        Ok(())
    }

    pub fn set_auto_paused(&mut self, value: bool) {
        self.auto_paused = value;
    }

    pub fn auto_paused(&self) -> bool {
        self.auto_paused
    }

    /// Registra un fallo de reproducción; `true` si la cola debe destruirse
    pub fn record_failure(&mut self) -> bool {
        self.failures += 1;
        self.failures >= CRASH_THRESHOLD
    }

    pub fn reset_failures(&mut self) {
        self.failures = 0;
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    pub fn current(&self) -> Option<&QueueItem> {
        self.current.as_ref()
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn is_radio(&self) -> bool {
        self.radio
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.current.is_none()
    }

    /// Historial más reciente primero
    pub fn history(&self, limit: usize) -> Vec<QueueItem> {
        self.history.iter().rev().take(limit).cloned().collect()
    }

    /// Obtiene información de la cola
    pub fn info(&self) -> QueueInfo {
        QueueInfo {
            current: self.current.clone(),
            items: self.items.iter().cloned().collect(),
            loop_mode: self.loop_mode,
            radio: self.radio,
            status: self.status,
            volume: self.volume,
            total_duration: self.total_duration(),
        }
    }

    // Funciones privadas

    fn push_history(&mut self, item: QueueItem) {
        self.history.push_back(item);
        if self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
    }

    fn total_duration(&self) -> Duration {
        let queue_duration: Duration = self.items.iter().filter_map(|item| item.duration).sum();
        let current_duration = self
            .current
            .as_ref()
            .and_then(|c| c.duration)
            .unwrap_or_default();

        queue_duration + current_duration
    }

    fn out_of_range(&self) -> MusicError {
        MusicError::invalid(format!("la posición debe estar entre 1 y {}", self.items.len()))
    }
}

#[derive(Debug, Clone)]
pub struct QueueInfo {
    pub current: Option<QueueItem>,
    pub items: Vec<QueueItem>,
    pub loop_mode: LoopMode,
    pub radio: bool,
    pub status: PlayerStatus,
    pub volume: f32,
    pub total_duration: Duration,
}

impl QueueInfo {
    pub fn total_pages(&self, items_per_page: usize) -> usize {
        self.items.len().div_ceil(items_per_page.max(1)).max(1)
    }

    /// Obtiene una página de la cola (1-based, acotada al rango válido)
    pub fn page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let per_page = items_per_page.max(1);
        let total_pages = self.total_pages(per_page);
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * per_page;
        let end = (start + per_page).min(self.items.len());

        QueuePage {
            items: self.items[start.min(end)..end].to_vec(),
            offset: start,
            current_page,
            total_pages,
            total_items: self.items.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<QueueItem>,
    /// Índice del primer item de la página dentro de la cola
    pub offset: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceType;
    use pretty_assertions::assert_eq;

    fn track(title: &str) -> TrackSource {
        TrackSource::new(
            title.to_string(),
            format!("https://youtu.be/{title}"),
            SourceType::YouTube,
        )
        .with_duration(Duration::from_secs(180))
    }

    fn queue_with(titles: &[&str]) -> MusicQueue {
        let mut queue = MusicQueue::new(10, ChannelId::new(1), ChannelId::new(2), 0.5);
        for title in titles {
            queue.add_track(track(title)).unwrap();
        }
        queue
    }

    fn titles(queue: &MusicQueue) -> Vec<String> {
        queue.info().items.into_iter().map(|i| i.title).collect()
    }

    fn next_title(queue: &mut MusicQueue) -> Option<String> {
        queue.advance().map(|p| p.item.title)
    }

    #[test]
    fn advance_is_fifo_and_fills_history() {
        let mut queue = queue_with(&["a", "b"]);
        assert_eq!(next_title(&mut queue).as_deref(), Some("a"));
        assert_eq!(next_title(&mut queue).as_deref(), Some("b"));
        assert_eq!(next_title(&mut queue), None);
        assert!(queue.is_empty());

        let history: Vec<_> = queue.history(10).into_iter().map(|i| i.title).collect();
        assert_eq!(history, vec!["b", "a"]);
    }

    #[test]
    fn loop_song_repeats_until_skipped() {
        let mut queue = queue_with(&["a", "b"]);
        queue.advance();
        queue.set_loop_mode(LoopMode::Song).unwrap();

        assert_eq!(next_title(&mut queue).as_deref(), Some("a"));
        assert_eq!(next_title(&mut queue).as_deref(), Some("a"));

        queue.skip(1).unwrap();
        assert_eq!(next_title(&mut queue).as_deref(), Some("b"));
    }

    #[test]
    fn loop_songs_cycles_queue() {
        let mut queue = queue_with(&["a", "b"]);
        queue.set_loop_mode(LoopMode::Songs).unwrap();

        let played: Vec<_> = (0..5).filter_map(|_| next_title(&mut queue)).collect();
        assert_eq!(played, vec!["a", "b", "a", "b", "a"]);
    }

    #[test]
    fn radio_recycles_and_locks_the_queue() {
        let mut queue = queue_with(&["a", "b"]);
        queue.set_loop_mode(LoopMode::Song).unwrap();
        assert!(queue.toggle_radio());
        assert_eq!(queue.loop_mode(), LoopMode::Off);

        let played: Vec<_> = (0..3).filter_map(|_| next_title(&mut queue)).collect();
        assert_eq!(played, vec!["a", "b", "a"]);

        assert_eq!(queue.skip(1), Err(MusicError::RadioMode));
        assert_eq!(queue.remove(1).unwrap_err(), MusicError::RadioMode);
        assert_eq!(queue.shuffle(), Err(MusicError::RadioMode));
        assert_eq!(queue.set_loop_mode(LoopMode::Songs), Err(MusicError::RadioMode));
        assert_eq!(queue.request_restart(Duration::ZERO), Err(MusicError::RadioMode));

        assert!(!queue.toggle_radio());
        assert!(queue.skip(1).is_ok());
    }

    #[test]
    fn skip_validates_amount() {
        let mut queue = queue_with(&["a", "b", "c"]);
        assert_eq!(queue.skip(1), Err(MusicError::NothingPlaying));

        queue.advance();
        assert!(matches!(queue.skip(0), Err(MusicError::InvalidArgument(_))));
        assert!(matches!(queue.skip(4), Err(MusicError::InvalidArgument(_))));

        assert_eq!(queue.skip(2), Ok(2));
        assert_eq!(titles(&queue), vec!["c"]);
        assert_eq!(next_title(&mut queue).as_deref(), Some("c"));
    }

    #[test]
    fn restart_replays_current_at_offset() {
        let mut queue = queue_with(&["a", "b"]);
        assert!(queue.request_restart(Duration::ZERO).is_err());

        queue.advance();
        queue.request_restart(Duration::from_secs(30)).unwrap();
        let playback = queue.advance().unwrap();
        assert_eq!(playback.item.title, "a");
        assert_eq!(playback.start_at, Duration::from_secs(30));

        // Después del reinicio el avance es normal
        assert_eq!(next_title(&mut queue).as_deref(), Some("b"));
    }

    #[test]
    fn seek_past_the_end_is_rejected() {
        let mut queue = queue_with(&["a"]);
        queue.advance();
        assert!(matches!(
            queue.request_restart(Duration::from_secs(500)),
            Err(MusicError::InvalidArgument(_))
        ));
    }

    #[test]
    fn full_queue_truncates_playlists() {
        let mut queue = MusicQueue::new(3, ChannelId::new(1), ChannelId::new(2), 0.5);
        queue.add_track(track("a")).unwrap();

        let added = queue
            .add_tracks(vec![track("b"), track("c"), track("d")])
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(queue.add_track(track("e")), Err(MusicError::QueueFull(3)));
        assert_eq!(queue.add_tracks(vec![track("f")]), Err(MusicError::QueueFull(3)));
    }

    #[test]
    fn remove_and_move_use_one_based_positions() {
        let mut queue = queue_with(&["a", "b", "c"]);
        assert!(queue.remove(0).is_err());
        assert!(queue.remove(4).is_err());

        assert_eq!(queue.remove(2).unwrap().title, "b");
        queue.move_track(2, 1).unwrap();
        assert_eq!(titles(&queue), vec!["c", "a"]);
    }

    #[test]
    fn clears_duplicates_and_user_tracks() {
        let mut queue = queue_with(&["a", "b", "a"]);
        queue
            .add_track(track("c").with_requested_by(UserId::new(5)))
            .unwrap();

        assert_eq!(queue.clear_filtered(ClearFilter::Duplicates), 1);
        assert_eq!(queue.clear_filtered(ClearFilter::User(UserId::new(5))), 1);
        assert_eq!(titles(&queue), vec!["a", "b"]);

        assert_eq!(queue.clear_filtered(ClearFilter::All), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn status_machine_rejects_invalid_transitions() {
        let mut queue = queue_with(&["a"]);
        assert_eq!(queue.pause(), Err(MusicError::NothingPlaying));
        assert_eq!(
            queue.transition(PlayerStatus::Paused),
            Err(InvalidTransition {
                from: PlayerStatus::Empty,
                to: PlayerStatus::Paused
            })
        );

        queue.transition(PlayerStatus::Playing).unwrap();
        queue.pause().unwrap();
        assert_eq!(queue.pause(), Err(MusicError::AlreadyPaused));
        queue.resume().unwrap();
        assert_eq!(queue.resume(), Err(MusicError::NotPaused));

        queue.transition(PlayerStatus::Destroying).unwrap();
        assert!(queue.transition(PlayerStatus::Playing).is_err());
    }

    #[test]
    fn three_failures_crash() {
        let mut queue = queue_with(&[]);
        assert!(!queue.record_failure());
        assert!(!queue.record_failure());
        queue.reset_failures();
        assert!(!queue.record_failure());
        assert!(!queue.record_failure());
        assert!(queue.record_failure());
    }

    #[test]
    fn pages_are_clamped() {
        let titles: Vec<String> = (0..12).map(|i| format!("t{i}")).collect();
        let refs: Vec<&str> = titles.iter().map(String::as_str).collect();
        let info = queue_with(&refs[..10]).info();

        let page = info.page(2, 4);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.offset, 4);
        assert_eq!(page.items[0].title, "t4");

        let last = info.page(99, 4);
        assert_eq!(last.current_page, 3);
        assert_eq!(last.items.len(), 2);

        let empty = queue_with(&[]).info().page(1, 10);
        assert_eq!((empty.total_pages, empty.items.len()), (1, 0));
    }
}
