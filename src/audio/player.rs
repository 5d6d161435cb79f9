use anyhow::Result;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use serenity::model::id::{ChannelId, GuildId, MessageId};
use songbird::{
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        idle::{IdleReason, IdleTimers},
        queue::{ClearFilter, LoopMode, MusicQueue, Playback, PlayerStatus, QueueInfo, QueueItem},
        transcoder::Transcoder,
    },
    error::MusicError,
    sources::{SourceManager, TrackSource},
};

/// Motivo por el que se destruyó una cola
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyReason {
    Stopped,
    Idle,
    /// Demasiados fallos de reproducción seguidos
    Crash,
    /// El bot fue expulsado o desconectado del canal
    Disconnected,
}

/// Eventos del ciclo de vida de la reproducción, consumidos por el bot
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    Start {
        guild_id: GuildId,
        text_channel: ChannelId,
        item: QueueItem,
        start_at: Duration,
    },
    /// La cola se agotó y espera nuevas canciones
    Wait {
        guild_id: GuildId,
        text_channel: ChannelId,
    },
    Error {
        guild_id: GuildId,
        text_channel: ChannelId,
        item: Option<QueueItem>,
        message: String,
    },
    Ended {
        guild_id: GuildId,
        item: QueueItem,
    },
    Destroyed {
        guild_id: GuildId,
        text_channel: ChannelId,
        reason: DestroyReason,
    },
}

/// Resultado de agregar canciones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Empezó a sonar de inmediato
    Started,
    /// Quedó en la cola en esta posición (1 = siguiente)
    Queued(usize),
}

/// Reproductor de todos los guilds. Los clones comparten estado.
#[derive(Clone)]
pub struct AudioPlayer {
    queues: Arc<DashMap<GuildId, Arc<RwLock<MusicQueue>>>>,
    current_tracks: Arc<DashMap<GuildId, TrackHandle>>,
    advancing: Arc<DashSet<GuildId>>,
    idle: Arc<IdleTimers>,
    songbird: Arc<Songbird>,
    sources: Arc<SourceManager>,
    transcoder: Arc<Transcoder>,
    events: flume::Sender<PlayerEvent>,
    max_queue_size: usize,
    default_volume: f32,
}

impl AudioPlayer {
    pub fn new(
        songbird: Arc<Songbird>,
        sources: Arc<SourceManager>,
        transcoder: Arc<Transcoder>,
        events: flume::Sender<PlayerEvent>,
        idle_timeout: Duration,
        max_queue_size: usize,
        default_volume: f32,
    ) -> Self {
        Self {
            queues: Arc::new(DashMap::new()),
            current_tracks: Arc::new(DashMap::new()),
            advancing: Arc::new(DashSet::new()),
            idle: Arc::new(IdleTimers::new(idle_timeout)),
            songbird,
            sources,
            transcoder,
            events,
            max_queue_size,
            default_volume,
        }
    }

    pub fn sources(&self) -> &SourceManager {
        &self.sources
    }

    pub fn songbird(&self) -> &Arc<Songbird> {
        &self.songbird
    }

    /// Conecta al canal de voz y crea la cola si no existe
    pub async fn connect(
        &self,
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: ChannelId,
    ) -> Result<Arc<Mutex<Call>>> {
        if let Some(current) = self.voice_channel(guild_id) {
            if current != voice_channel && self.songbird.get(guild_id).is_some() {
                return Err(MusicError::DifferentChannel.into());
            }
        }

        let call = match self.songbird.get(guild_id) {
            Some(call) => call,
            None => {
                info!("🔊 Uniéndose al canal {} en guild {}", voice_channel, guild_id);
                self.songbird
                    .join(guild_id, voice_channel)
                    .await
                    .map_err(|e| anyhow::anyhow!("Error al unirse al canal de voz: {}", e))?
            }
        };

        let created = self.ensure_queue(guild_id, voice_channel, text_channel);
        if created {
            let player = self.clone();
            self.idle.arm(guild_id, IdleReason::QueueEnded, async move {
                player.expire(guild_id).await;
            });
        }

        Ok(call)
    }

    /// Agrega un track y arranca la reproducción si no sonaba nada
    pub async fn enqueue(
        &self,
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: ChannelId,
        track: TrackSource,
    ) -> Result<Enqueued> {
        self.connect(guild_id, voice_channel, text_channel).await?;
        let queue = self.queue(guild_id)?;

        let position = queue.write().add_track(track)?;
        self.idle.cancel(guild_id);

        if self.start_if_idle(guild_id).await? {
            Ok(Enqueued::Started)
        } else {
            Ok(Enqueued::Queued(position))
        }
    }

    /// Agrega una playlist; devuelve cuántas canciones entraron
    pub async fn enqueue_many(
        &self,
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: ChannelId,
        tracks: Vec<TrackSource>,
    ) -> Result<usize> {
        self.connect(guild_id, voice_channel, text_channel).await?;
        let queue = self.queue(guild_id)?;

        let added = queue.write().add_tracks(tracks)?;
        self.idle.cancel(guild_id);
        self.start_if_idle(guild_id).await?;

        Ok(added)
    }

    async fn start_if_idle(&self, guild_id: GuildId) -> Result<bool> {
        let idle = {
            let queue = self.queue(guild_id)?;
            let q = queue.read();
            matches!(q.status(), PlayerStatus::Empty | PlayerStatus::WaitingNext)
        };

        if idle && !self.current_tracks.contains_key(&guild_id) {
            return self.play_next(guild_id).await;
        }
        Ok(false)
    }

    /// Reproduce la siguiente canción de la cola.
    ///
    /// Los fallos al preparar un track saltan al siguiente; tras
    /// [`CRASH_THRESHOLD`](super::queue::CRASH_THRESHOLD) fallos seguidos la
    /// cola se destruye.
    ///
    /// Devuelve `true` solo si esta llamada dejó un track sonando; `false`
    /// si otro avance ya estaba en curso o la cola se agotó.
    pub async fn play_next(&self, guild_id: GuildId) -> Result<bool> {
        if !self.advancing.insert(guild_id) {
            debug!("Avance ya en curso para guild {}", guild_id);
            return Ok(false);
        }

        let result = self.advance(guild_id).await;
        self.advancing.remove(&guild_id);
        result
    }

    async fn advance(&self, guild_id: GuildId) -> Result<bool> {
        loop {
            let Some(queue) = self.queues.get(&guild_id).map(|q| q.clone()) else {
                return Ok(false);
            };

            let (playback, volume, text_channel) = {
                let mut q = queue.write();
                if q.status() == PlayerStatus::Destroying {
                    return Ok(false);
                }
                (q.advance(), q.volume(), q.text_channel)
            };

            let Some(playback) = playback else {
                let _ = queue.write().transition(PlayerStatus::WaitingNext);
                self.emit(PlayerEvent::Wait {
                    guild_id,
                    text_channel,
                });

                let player = self.clone();
                self.idle.arm(guild_id, IdleReason::QueueEnded, async move {
                    player.expire(guild_id).await;
                });
                return Ok(false);
            };

            match self.start_track(guild_id, &playback, volume).await {
                Ok(()) => {
                    let _ = queue.write().transition(PlayerStatus::Playing);
                    info!("🎵 Reproduciendo: {}", playback.item.title);
                    self.emit(PlayerEvent::Start {
                        guild_id,
                        text_channel,
                        item: playback.item,
                        start_at: playback.start_at,
                    });
                    return Ok(true);
                }
                Err(e) => {
                    warn!("⚠️ No se pudo reproducir {}: {:#}", playback.item.title, e);
                    self.emit(PlayerEvent::Error {
                        guild_id,
                        text_channel,
                        item: Some(playback.item),
                        message: crate::error::user_message(&e),
                    });

                    if self.register_failure(&queue) {
                        self.destroy(guild_id, DestroyReason::Crash).await?;
                        return Ok(false);
                    }
                }
            }
        }
    }

    fn register_failure(&self, queue: &RwLock<MusicQueue>) -> bool {
        let mut q = queue.write();
        q.discard_current();
        q.record_failure()
    }

    async fn start_track(&self, guild_id: GuildId, playback: &Playback, volume: f32) -> Result<()> {
        let url = self.sources.resolve_audio(&playback.item.source).await?;
        let input = self.transcoder.input(&url, playback.start_at)?;

        let call = self.songbird.get(guild_id).ok_or(MusicError::NoQueue)?;
        let handle = {
            let mut call = call.lock().await;
            call.stop();
            call.play_input(input)
        };

        handle.set_volume(volume)?;
        handle.add_event(
            Event::Track(TrackEvent::End),
            TrackNotifier {
                player: self.clone(),
                guild_id,
                handle: handle.clone(),
            },
        )?;
        handle.add_event(
            Event::Track(TrackEvent::Error),
            TrackNotifier {
                player: self.clone(),
                guild_id,
                handle: handle.clone(),
            },
        )?;

        self.current_tracks.insert(guild_id, handle);
        Ok(())
    }

    /// Pausa la reproducción actual. El estado de la cola solo cambia si
    /// songbird aceptó la orden.
    pub fn pause(&self, guild_id: GuildId) -> Result<()> {
        let queue = self.queue(guild_id)?;
        let mut q = queue.write();
        q.can_pause()?;

        if let Some(track) = self.current_tracks.get(&guild_id) {
            track.pause()?;
        }
        q.pause()?;
        info!("⏸️ Reproducción pausada");
        Ok(())
    }

    /// Reanuda la reproducción
    pub fn resume(&self, guild_id: GuildId) -> Result<()> {
        let queue = self.queue(guild_id)?;
        let mut q = queue.write();
        q.can_resume()?;

        if let Some(track) = self.current_tracks.get(&guild_id) {
            track.play()?;
        }
        q.resume()?;
        info!("▶️ Reproducción reanudada");
        Ok(())
    }

    /// Salta `amount` canciones contando la actual; el evento `End` del
    /// track detenido avanza la cola.
    pub fn skip(&self, guild_id: GuildId, amount: usize) -> Result<usize> {
        let queue = self.queue(guild_id)?;
        let skipped = queue.write().skip(amount)?;
        self.stop_current(guild_id);
        info!("⏭️ Saltadas {} canciones", skipped);
        Ok(skipped)
    }

    /// Vuelve a empezar la canción actual
    pub fn replay(&self, guild_id: GuildId) -> Result<()> {
        self.seek(guild_id, Duration::ZERO)
    }

    /// Reinicia ffmpeg en la posición pedida
    pub fn seek(&self, guild_id: GuildId, position: Duration) -> Result<()> {
        let queue = self.queue(guild_id)?;
        queue.write().request_restart(position)?;
        self.stop_current(guild_id);
        info!("⏩ Saltando a {}", humantime::format_duration(position));
        Ok(())
    }

    /// Detiene la reproducción, vacía la cola y abandona el canal
    pub async fn stop(&self, guild_id: GuildId) -> Result<()> {
        self.destroy(guild_id, DestroyReason::Stopped).await
    }

    pub async fn destroy(&self, guild_id: GuildId, reason: DestroyReason) -> Result<()> {
        let Some((_, queue)) = self.queues.remove(&guild_id) else {
            return Err(MusicError::NoQueue.into());
        };

        let text_channel = {
            let mut q = queue.write();
            let _ = q.transition(PlayerStatus::Destroying);
            q.clear();
            q.text_channel
        };

        self.idle.cancel(guild_id);
        if let Some((_, track)) = self.current_tracks.remove(&guild_id) {
            let _ = track.stop();
        }

        if self.songbird.get(guild_id).is_some() {
            if let Err(e) = self.songbird.remove(guild_id).await {
                warn!("⚠️ Error al salir del canal de voz: {}", e);
            }
        }

        info!("⏹️ Cola destruida en guild {} ({:?})", guild_id, reason);
        self.emit(PlayerEvent::Destroyed {
            guild_id,
            text_channel,
            reason,
        });
        Ok(())
    }

    /// Ajusta el volumen (0-200 %)
    pub fn set_volume(&self, guild_id: GuildId, percent: u16) -> Result<f32> {
        if percent > 200 {
            return Err(MusicError::invalid("el volumen debe estar entre 0 y 200").into());
        }

        let volume = f32::from(percent) / 100.0;
        let queue = self.queue(guild_id)?;
        queue.write().set_volume(volume);

        if let Some(track) = self.current_tracks.get(&guild_id) {
            track.set_volume(volume)?;
        }
        info!("🔊 Volumen ajustado a {}%", percent);
        Ok(volume)
    }

    pub fn volume(&self, guild_id: GuildId) -> Result<f32> {
        Ok(self.queue(guild_id)?.read().volume())
    }

    pub fn shuffle(&self, guild_id: GuildId) -> Result<()> {
        self.queue(guild_id)?.write().shuffle()?;
        Ok(())
    }

    pub fn toggle_radio(&self, guild_id: GuildId) -> Result<bool> {
        Ok(self.queue(guild_id)?.write().toggle_radio())
    }

    pub fn set_loop_mode(&self, guild_id: GuildId, mode: LoopMode) -> Result<()> {
        self.queue(guild_id)?.write().set_loop_mode(mode)?;
        Ok(())
    }

    pub fn remove(&self, guild_id: GuildId, position: usize) -> Result<QueueItem> {
        Ok(self.queue(guild_id)?.write().remove(position)?)
    }

    pub fn move_track(&self, guild_id: GuildId, from: usize, to: usize) -> Result<()> {
        self.queue(guild_id)?.write().move_track(from, to)?;
        Ok(())
    }

    pub fn clear(&self, guild_id: GuildId, filter: ClearFilter) -> Result<usize> {
        Ok(self.queue(guild_id)?.write().clear_filtered(filter))
    }

    /// Estado de reproducción, `None` si no hay cola
    pub fn status(&self, guild_id: GuildId) -> Option<PlayerStatus> {
        let queue = self.queues.get(&guild_id)?.clone();
        let status = queue.read().status();
        Some(status)
    }

    pub fn queue_info(&self, guild_id: GuildId) -> Result<QueueInfo> {
        Ok(self.queue(guild_id)?.read().info())
    }

    /// Canción actual y su posición de reproducción
    pub async fn now_playing(&self, guild_id: GuildId) -> Result<(QueueItem, Duration)> {
        let item = self
            .queue(guild_id)?
            .read()
            .current()
            .cloned()
            .ok_or(MusicError::NothingPlaying)?;

        let handle = self.current_tracks.get(&guild_id).map(|h| h.clone());
        let position = match handle {
            Some(handle) => handle
                .get_info()
                .await
                .map(|state| state.position)
                .unwrap_or_default(),
            None => Duration::ZERO,
        };

        Ok((item, position))
    }

    pub fn history(&self, guild_id: GuildId, limit: usize) -> Result<Vec<QueueItem>> {
        Ok(self.queue(guild_id)?.read().history(limit))
    }

    /// El canal quedó sin personas: pausa y arma el temporizador
    pub fn handle_alone(&self, guild_id: GuildId) {
        let Ok(queue) = self.queue(guild_id) else {
            return;
        };

        let paused = {
            let mut q = queue.write();
            let paused = q.pause().is_ok();
            if paused {
                q.set_auto_paused(true);
            }
            paused
        };
        if paused {
            if let Some(track) = self.current_tracks.get(&guild_id) {
                let _ = track.pause();
            }
            info!("⏸️ Pausa automática en guild {}: canal vacío", guild_id);
        }

        let player = self.clone();
        self.idle.arm(guild_id, IdleReason::Alone, async move {
            player.expire(guild_id).await;
        });
    }

    /// Alguien volvió al canal: cancela el temporizador y reanuda
    pub fn handle_company(&self, guild_id: GuildId) {
        self.idle.cancel_if(guild_id, IdleReason::Alone);

        let Ok(queue) = self.queue(guild_id) else {
            return;
        };
        let resumed = {
            let mut q = queue.write();
            q.auto_paused() && q.resume().is_ok()
        };
        if resumed {
            if let Some(track) = self.current_tracks.get(&guild_id) {
                let _ = track.play();
            }
            info!("▶️ Reanudación automática en guild {}", guild_id);
        }
    }

    pub fn has_queue(&self, guild_id: GuildId) -> bool {
        self.queues.contains_key(&guild_id)
    }

    pub fn voice_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let queue = self.queues.get(&guild_id)?.clone();
        let channel = queue.read().voice_channel;
        Some(channel)
    }

    /// El bot fue movido a otro canal de voz
    pub fn update_voice_channel(&self, guild_id: GuildId, channel: ChannelId) {
        if let Some(queue) = self.queues.get(&guild_id) {
            let mut q = queue.write();
            if q.voice_channel != channel {
                info!("🔀 Bot movido al canal {} en guild {}", channel, guild_id);
                q.voice_channel = channel;
            }
        }
    }

    /// Mensaje "reproduciendo ahora" vigente; devuelve el anterior
    pub fn set_anchor(&self, guild_id: GuildId, message: MessageId) -> Option<MessageId> {
        let queue = self.queues.get(&guild_id)?;
        let mut q = queue.write();
        q.anchor_message.replace(message)
    }

    pub fn is_idle_armed(&self, guild_id: GuildId) -> bool {
        self.idle.is_armed(guild_id)
    }

    pub fn active_guilds(&self) -> usize {
        self.queues.len()
    }

    /// Destruye todas las colas y sale de todos los canales (apagado)
    pub async fn shutdown(&self) {
        let guilds: Vec<GuildId> = self.queues.iter().map(|entry| *entry.key()).collect();
        if guilds.is_empty() {
            return;
        }

        info!("🛑 Cerrando {} colas activas", guilds.len());
        let results = futures::future::join_all(
            guilds
                .iter()
                .map(|guild_id| self.destroy(*guild_id, DestroyReason::Stopped)),
        )
        .await;

        for (guild_id, result) in guilds.iter().zip(results) {
            if let Err(e) = result {
                debug!("Cola de guild {} ya cerrada: {:?}", guild_id, e);
            }
        }
    }

    fn queue(&self, guild_id: GuildId) -> Result<Arc<RwLock<MusicQueue>>, MusicError> {
        self.queues
            .get(&guild_id)
            .map(|q| q.clone())
            .ok_or(MusicError::NoQueue)
    }

    /// Crea la cola si no existe; `true` si se creó
    fn ensure_queue(&self, guild_id: GuildId, voice_channel: ChannelId, text_channel: ChannelId) -> bool {
        let mut created = false;
        self.queues.entry(guild_id).or_insert_with(|| {
            created = true;
            Arc::new(RwLock::new(MusicQueue::new(
                self.max_queue_size,
                voice_channel,
                text_channel,
                self.default_volume,
            )))
        });
        created
    }

    fn stop_current(&self, guild_id: GuildId) {
        if let Some(track) = self.current_tracks.get(&guild_id) {
            let _ = track.stop();
        }
    }

    async fn expire(&self, guild_id: GuildId) {
        if let Err(e) = self.destroy(guild_id, DestroyReason::Idle).await {
            debug!("Cola ya destruida en guild {}: {}", guild_id, e);
        }
    }

    fn emit(&self, event: PlayerEvent) {
        if self.events.send(event).is_err() {
            warn!("⚠️ Nadie escucha los eventos del reproductor");
        }
    }

    /// Fin o error del track actual
    async fn on_track_event(&self, guild_id: GuildId, handle: &TrackHandle, state: Option<PlayMode>) {
        // Solo el primer evento del track vigente avanza la cola
        if self
            .current_tracks
            .remove_if(&guild_id, |_, current| current.uuid() == handle.uuid())
            .is_none()
        {
            return;
        }

        let failure = match state {
            Some(PlayMode::Errored(e)) => Some(format!("{:?}", e)),
            _ => None,
        };
        self.finish_track(guild_id, failure).await;
    }

    /// Cierra el track actual y avanza. Un error cuenta para el umbral de
    /// fallos seguidos; un final normal lo reinicia.
    async fn finish_track(&self, guild_id: GuildId, failure: Option<String>) {
        let Ok(queue) = self.queue(guild_id) else {
            return;
        };
        let (item, text_channel) = {
            let q = queue.read();
            (q.current().cloned(), q.text_channel)
        };

        match failure {
            Some(reason) => {
                error!("❌ Error de reproducción en guild {}: {}", guild_id, reason);
                self.emit(PlayerEvent::Error {
                    guild_id,
                    text_channel,
                    item,
                    message: format!("❌ Error al reproducir: {}", reason),
                });
                if self.register_failure(&queue) {
                    if let Err(e) = self.destroy(guild_id, DestroyReason::Crash).await {
                        debug!("{}", e);
                    }
                    return;
                }
            }
            None => {
                queue.write().reset_failures();
                if let Some(item) = item {
                    self.emit(PlayerEvent::Ended { guild_id, item });
                }
            }
        }

        if let Err(e) = self.play_next(guild_id).await {
            error!("Error al reproducir siguiente track: {:?}", e);
        }
    }

    #[cfg(test)]
    fn insert_queue(&self, guild_id: GuildId, queue: MusicQueue) {
        self.queues.insert(guild_id, Arc::new(RwLock::new(queue)));
    }
}

/// Handler de songbird para el fin o error de un track
struct TrackNotifier {
    player: AudioPlayer,
    guild_id: GuildId,
    handle: TrackHandle,
}

#[async_trait]
impl VoiceEventHandler for TrackNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let state = match ctx {
            EventContext::Track(tracks) => tracks.first().map(|(state, _)| state.playing.clone()),
            _ => None,
        };
        debug!("Track terminado ({:?}), avanzando cola...", state);

        self.player
            .on_track_event(self.guild_id, &self.handle, state)
            .await;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cache::MusicCache, config::Config, sources::SourceType};
    use std::collections::HashMap;

    fn guild() -> GuildId {
        GuildId::new(10)
    }

    fn player() -> (AudioPlayer, flume::Receiver<PlayerEvent>) {
        let sources = SourceManager::with_sources(
            HashMap::new(),
            MusicCache::new(4, Duration::from_secs(60)),
            10,
            5,
        );
        let (tx, rx) = flume::unbounded();
        let player = AudioPlayer::new(
            Songbird::serenity(),
            Arc::new(sources),
            Arc::new(Transcoder::new(&Config::default())),
            tx,
            Duration::from_secs(60),
            10,
            0.5,
        );
        (player, rx)
    }

    fn playing_queue(titles: &[&str]) -> MusicQueue {
        let mut queue = MusicQueue::new(10, ChannelId::new(1), ChannelId::new(2), 0.5);
        for title in titles {
            queue
                .add_track(TrackSource::new(
                    title.to_string(),
                    format!("https://youtu.be/{title}"),
                    SourceType::YouTube,
                ))
                .unwrap();
        }
        queue.advance();
        queue.transition(PlayerStatus::Playing).unwrap();
        queue
    }

    fn music_error(err: anyhow::Error) -> MusicError {
        err.downcast::<MusicError>().unwrap()
    }

    #[test]
    fn commands_without_queue_fail() {
        let (player, _) = player();
        assert_eq!(music_error(player.pause(guild()).unwrap_err()), MusicError::NoQueue);
        assert_eq!(music_error(player.skip(guild(), 1).unwrap_err()), MusicError::NoQueue);
        assert_eq!(music_error(player.shuffle(guild()).unwrap_err()), MusicError::NoQueue);
    }

    #[test]
    fn pause_resume_follow_the_queue_state() {
        let (player, _) = player();
        player.insert_queue(guild(), playing_queue(&["a"]));

        player.pause(guild()).unwrap();
        assert_eq!(
            music_error(player.pause(guild()).unwrap_err()),
            MusicError::AlreadyPaused
        );
        player.resume(guild()).unwrap();
        assert_eq!(music_error(player.resume(guild()).unwrap_err()), MusicError::NotPaused);
    }

    #[test]
    fn rejected_pause_leaves_the_state_untouched() {
        let (player, _) = player();
        let mut queue = playing_queue(&["a"]);
        queue.transition(PlayerStatus::WaitingNext).unwrap();
        player.insert_queue(guild(), queue);

        assert_eq!(
            music_error(player.pause(guild()).unwrap_err()),
            MusicError::NothingPlaying
        );
        assert_eq!(
            music_error(player.resume(guild()).unwrap_err()),
            MusicError::NotPaused
        );
        assert_eq!(player.status(guild()), Some(PlayerStatus::WaitingNext));
    }

    #[tokio::test]
    async fn concurrent_advance_is_not_reported_as_started() {
        let (player, events) = player();
        let mut queue = MusicQueue::new(10, ChannelId::new(1), ChannelId::new(2), 0.5);
        queue
            .add_track(TrackSource::new(
                "a".to_string(),
                "https://youtu.be/a".to_string(),
                SourceType::YouTube,
            ))
            .unwrap();
        player.insert_queue(guild(), queue);
        player.advancing.insert(guild());

        assert!(!player.start_if_idle(guild()).await.unwrap());
        assert!(!player.play_next(guild()).await.unwrap());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn finished_track_announces_end_then_waits() {
        let (player, events) = player();
        player.insert_queue(guild(), playing_queue(&["a"]));

        player.finish_track(guild(), None).await;

        match events.try_recv().unwrap() {
            PlayerEvent::Ended { item, .. } => assert_eq!(item.title, "a"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(events.try_recv().unwrap(), PlayerEvent::Wait { .. }));
        assert_eq!(player.status(guild()), Some(PlayerStatus::WaitingNext));
        assert!(player.is_idle_armed(guild()));
    }

    #[tokio::test]
    async fn repeated_playback_errors_crash_the_queue() {
        let (player, events) = player();
        player.insert_queue(guild(), playing_queue(&["a", "b", "c"]));

        // Sin fuentes, "b" y "c" tampoco consiguen audio
        player.finish_track(guild(), Some("ffmpeg murió".to_string())).await;

        let received: Vec<PlayerEvent> = events.drain().collect();
        let failed: Vec<String> = received
            .iter()
            .filter_map(|event| match event {
                PlayerEvent::Error { item, .. } => item.as_ref().map(|i| i.title.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(failed, ["a", "b", "c"]);
        assert!(matches!(
            received.last(),
            Some(PlayerEvent::Destroyed {
                reason: DestroyReason::Crash,
                ..
            })
        ));
        assert!(!player.has_queue(guild()));
    }

    #[tokio::test]
    async fn normal_end_resets_the_failure_count() {
        let (player, events) = player();
        let mut queue = playing_queue(&["a", "b"]);
        queue.record_failure();
        queue.record_failure();
        player.insert_queue(guild(), queue);

        // "b" falla, pero el contador volvió a cero al terminar "a"
        player.finish_track(guild(), None).await;

        let received: Vec<PlayerEvent> = events.drain().collect();
        assert!(matches!(received.first(), Some(PlayerEvent::Ended { .. })));
        assert!(matches!(received.last(), Some(PlayerEvent::Wait { .. })));
        assert!(player.has_queue(guild()));
    }

    #[test]
    fn volume_is_validated() {
        let (player, _) = player();
        player.insert_queue(guild(), playing_queue(&["a"]));

        assert_eq!(player.set_volume(guild(), 150).unwrap(), 1.5);
        assert_eq!(player.volume(guild()).unwrap(), 1.5);
        assert!(matches!(
            music_error(player.set_volume(guild(), 201).unwrap_err()),
            MusicError::InvalidArgument(_)
        ));
    }

    #[tokio::test]
    async fn destroy_emits_event_and_forgets_queue() {
        let (player, events) = player();
        player.insert_queue(guild(), playing_queue(&["a", "b"]));

        player.stop(guild()).await.unwrap();
        assert!(!player.has_queue(guild()));

        match events.try_recv().unwrap() {
            PlayerEvent::Destroyed { reason, text_channel, .. } => {
                assert_eq!(reason, DestroyReason::Stopped);
                assert_eq!(text_channel, ChannelId::new(2));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(music_error(player.stop(guild()).await.unwrap_err()), MusicError::NoQueue);
    }

    #[tokio::test]
    async fn shutdown_destroys_every_queue() {
        let (player, events) = player();
        player.insert_queue(guild(), playing_queue(&["a"]));
        player.insert_queue(GuildId::new(11), playing_queue(&["b"]));

        player.shutdown().await;

        assert_eq!(player.active_guilds(), 0);
        assert_eq!(events.drain().count(), 2);
    }

    #[tokio::test]
    async fn being_alone_pauses_and_company_resumes() {
        let (player, _) = player();
        player.insert_queue(guild(), playing_queue(&["a"]));

        player.handle_alone(guild());
        assert!(player.is_idle_armed(guild()));
        assert_eq!(player.queue_info(guild()).unwrap().status, PlayerStatus::Paused);

        player.handle_company(guild());
        assert!(!player.is_idle_armed(guild()));
        assert_eq!(player.queue_info(guild()).unwrap().status, PlayerStatus::Playing);
    }

    #[tokio::test]
    async fn company_does_not_resume_a_manual_pause() {
        let (player, _) = player();
        player.insert_queue(guild(), playing_queue(&["a"]));

        player.pause(guild()).unwrap();
        player.handle_alone(guild());
        player.handle_company(guild());
        assert_eq!(player.queue_info(guild()).unwrap().status, PlayerStatus::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_destroys_the_queue() {
        let (player, events) = player();
        player.insert_queue(guild(), playing_queue(&["a"]));

        player.handle_alone(guild());
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert!(!player.has_queue(guild()));
        assert!(matches!(
            events.try_recv().unwrap(),
            PlayerEvent::Destroyed {
                reason: DestroyReason::Idle,
                ..
            }
        ));
    }

    #[test]
    fn queue_edits_are_delegated() {
        let (player, _) = player();
        player.insert_queue(guild(), playing_queue(&["a", "b", "c"]));

        assert_eq!(player.remove(guild(), 1).unwrap().title, "b");
        player.move_track(guild(), 1, 1).unwrap();
        assert_eq!(player.status(guild()), Some(PlayerStatus::Playing));
        assert_eq!(player.clear(guild(), ClearFilter::Duplicates).unwrap(), 0);
        player.set_loop_mode(guild(), LoopMode::Songs).unwrap();
        assert!(player.toggle_radio(guild()).unwrap());

        let info = player.queue_info(guild()).unwrap();
        assert!(info.radio);
        assert_eq!(info.loop_mode, LoopMode::Off);
        assert_eq!(
            music_error(player.skip(guild(), 1).unwrap_err()),
            MusicError::RadioMode
        );
    }
}
