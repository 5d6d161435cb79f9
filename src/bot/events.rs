use anyhow::Result;
use serenity::{
    builder::{CreateEmbed, CreateMessage},
    http::Http,
    model::id::{ChannelId, GuildId},
};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        player::{AudioPlayer, DestroyReason, PlayerEvent},
        queue::{LoopMode, QueueItem},
    },
    storage::HistoryStorage,
    ui::{buttons, embeds},
};

/// Consumidor de los eventos del reproductor: publica los avisos en el canal
/// de texto donde se creó la cola y registra el historial.
pub struct PlayerEvents {
    http: Arc<Http>,
    player: AudioPlayer,
    history: Option<Arc<Mutex<HistoryStorage>>>,
    idle_timeout: Duration,
}

impl PlayerEvents {
    pub fn new(
        http: Arc<Http>,
        player: AudioPlayer,
        history: Option<Arc<Mutex<HistoryStorage>>>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            http,
            player,
            history,
            idle_timeout,
        }
    }

    /// Procesa eventos hasta que se cierre el canal
    pub async fn run(self, events: flume::Receiver<PlayerEvent>) {
        info!("📡 Escuchando eventos del reproductor");

        while let Ok(event) = events.recv_async().await {
            if let Err(e) = self.handle(event).await {
                warn!("⚠️ No se pudo publicar evento del reproductor: {:?}", e);
            }
        }

        debug!("Canal de eventos cerrado");
    }

    async fn handle(&self, event: PlayerEvent) -> Result<()> {
        match event {
            PlayerEvent::Start {
                guild_id,
                text_channel,
                item,
                start_at,
            } => {
                info!("▶️ Reproduciendo: {} en guild {}", item.title, guild_id);
                self.announce_start(guild_id, text_channel, &item, start_at).await?;

                // Un reinicio por seek o replay no es una nueva reproducción
                if start_at.is_zero() {
                    self.record(guild_id, &item).await;
                }
            }
            PlayerEvent::Ended { guild_id, item } => {
                debug!("⏹️ Terminó {} en guild {}", item.title, guild_id);
            }
            PlayerEvent::Error {
                guild_id,
                text_channel,
                ref item,
                ref message,
            } => {
                error!(
                    "❌ Error de reproducción en guild {} ({:?}): {}",
                    guild_id,
                    item.as_ref().map(|i| i.title.as_str()),
                    message
                );
                self.send(text_channel, announcement(&event, self.idle_timeout)).await?;
            }
            PlayerEvent::Wait { text_channel, .. } | PlayerEvent::Destroyed { text_channel, .. } => {
                self.send(text_channel, announcement(&event, self.idle_timeout)).await?;
            }
        }

        Ok(())
    }

    /// Publica el "reproduciendo ahora" con controles y reemplaza el anterior
    async fn announce_start(
        &self,
        guild_id: GuildId,
        text_channel: ChannelId,
        item: &QueueItem,
        start_at: Duration,
    ) -> Result<()> {
        let (loop_mode, radio) = self
            .player
            .queue_info(guild_id)
            .map(|info| (info.loop_mode, info.radio))
            .unwrap_or((LoopMode::Off, false));

        let message = CreateMessage::new()
            .embed(embeds::now_playing(item, start_at, loop_mode))
            .components(buttons::player_controls(false, loop_mode, radio));
        let sent = text_channel.send_message(&self.http, message).await?;

        if let Some(previous) = self.player.set_anchor(guild_id, sent.id) {
            if let Err(e) = text_channel.delete_message(&self.http, previous).await {
                debug!("No se pudo borrar el mensaje anterior: {:?}", e);
            }
        }

        Ok(())
    }

    async fn record(&self, guild_id: GuildId, item: &QueueItem) {
        let Some(history) = &self.history else {
            return;
        };
        if let Err(e) = history.lock().await.record(guild_id.get(), &item.source).await {
            warn!("⚠️ No se pudo guardar el historial: {:?}", e);
        }
    }

    async fn send(&self, channel: ChannelId, embed: Option<CreateEmbed>) -> Result<()> {
        if let Some(embed) = embed {
            channel
                .send_message(&self.http, CreateMessage::new().embed(embed))
                .await?;
        }
        Ok(())
    }
}

/// Aviso en el chat para los eventos que no son de inicio de canción
fn announcement(event: &PlayerEvent, idle_timeout: Duration) -> Option<CreateEmbed> {
    match event {
        PlayerEvent::Wait { .. } => Some(embeds::notice(
            "📭 Cola terminada",
            &format!(
                "Agrega más canciones con `/play`. Me desconectaré en {} si no hay actividad.",
                humantime::format_duration(idle_timeout)
            ),
        )),
        PlayerEvent::Error { item, message, .. } => Some(embeds::error(&match item {
            Some(item) => format!("No se pudo reproducir **{}**: {}", item.title, message),
            None => message.clone(),
        })),
        PlayerEvent::Destroyed { reason, .. } => match reason {
            DestroyReason::Stopped => None,
            DestroyReason::Idle => Some(embeds::notice(
                "👋 Desconectado",
                "Me desconecté por inactividad.",
            )),
            DestroyReason::Crash => Some(embeds::error(
                "Demasiados errores seguidos; se detuvo la reproducción.",
            )),
            DestroyReason::Disconnected => Some(embeds::notice(
                "🔌 Desconectado",
                "Me sacaron del canal de voz; la cola se eliminó.",
            )),
        },
        PlayerEvent::Start { .. } | PlayerEvent::Ended { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{SourceType, TrackSource};
    use pretty_assertions::assert_eq;

    fn ids() -> (GuildId, ChannelId) {
        (GuildId::new(1), ChannelId::new(2))
    }

    fn description(embed: CreateEmbed) -> String {
        serde_json::to_value(embed).unwrap()["description"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn stopping_is_silent_but_idle_is_announced() {
        let (guild_id, text_channel) = ids();
        let stopped = PlayerEvent::Destroyed {
            guild_id,
            text_channel,
            reason: DestroyReason::Stopped,
        };
        let idle = PlayerEvent::Destroyed {
            guild_id,
            text_channel,
            reason: DestroyReason::Idle,
        };

        assert!(announcement(&stopped, Duration::from_secs(300)).is_none());
        assert_eq!(
            description(announcement(&idle, Duration::from_secs(300)).unwrap()),
            "Me desconecté por inactividad."
        );
    }

    #[test]
    fn wait_mentions_idle_timeout() {
        let (guild_id, text_channel) = ids();
        let event = PlayerEvent::Wait {
            guild_id,
            text_channel,
        };
        let text = description(announcement(&event, Duration::from_secs(300)).unwrap());
        assert!(text.contains("5m"), "{}", text);
    }

    #[test]
    fn errors_name_the_failed_track() {
        let (guild_id, text_channel) = ids();
        let item = QueueItem::from(TrackSource::new(
            "Roto".to_string(),
            "https://youtu.be/x".to_string(),
            SourceType::YouTube,
        ));
        let event = PlayerEvent::Error {
            guild_id,
            text_channel,
            item: Some(item),
            message: "403".to_string(),
        };
        let text = description(announcement(&event, Duration::from_secs(300)).unwrap());
        assert_eq!(text, "No se pudo reproducir **Roto**: 403");
    }
}
