//! # Bot Module
//!
//! Discord front-end of TuneBridge.
//!
//! This module contains the gateway side of the bot:
//! - Slash command registration ([`commands`])
//! - Text, slash and component dispatch ([`handlers`])
//! - Player event announcements ([`events`])
//! - Pending `/search` selections ([`search`])
//! - Voice state tracking (bot kicked, moved or left alone)
//! - Background maintenance tasks
//!
//! ## Architecture
//!
//! [`MusicBot`] implements Serenity's [`EventHandler`] trait. It owns:
//!
//! - Playback and queues through [`AudioPlayer`]
//! - Persistent play history with [`HistoryStorage`]
//! - The receiving end of the player's event channel, handed to
//!   [`events::PlayerEvents`] the first time the shard is ready
//!
//! ## Example
//!
//! ```rust,ignore
//! # use std::sync::Arc;
//! # use crate::{audio::player::AudioPlayer, bot::MusicBot, config::Config, storage::HistoryStorage};
//! # async fn example(config: Config, player: AudioPlayer, rx: flume::Receiver<crate::audio::player::PlayerEvent>) -> anyhow::Result<()> {
//! let history = Arc::new(tokio::sync::Mutex::new(HistoryStorage::new(config.data_dir.clone()).await?));
//! let bot = MusicBot::new(config, player, history, rx);
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use parking_lot::Mutex;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Message, Ready, VoiceState},
    async_trait,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

pub mod args;
pub mod commands;
pub mod events;
pub mod handlers;
pub mod search;

use crate::{
    audio::player::{AudioPlayer, DestroyReason, PlayerEvent},
    config::Config,
    storage::HistoryStorage,
};

use self::{events::PlayerEvents, search::SearchSessions};

/// Intervalo de las tareas de mantenimiento
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(3600);

/// Main Discord event handler.
///
/// Cheap to share: every field is either immutable configuration or an
/// `Arc`-backed handle, so command handlers only ever borrow it.
pub struct MusicBot {
    /// Configuración cargada del entorno
    config: Arc<Config>,
    /// Reproductor y colas de todos los servidores
    player: AudioPlayer,
    /// Historial persistente de reproducciones
    history: Arc<tokio::sync::Mutex<HistoryStorage>>,
    /// Menús de `/search` abiertos
    searches: SearchSessions,
    /// Receptor de eventos; se entrega al consumidor en el primer `ready`
    events: Mutex<Option<flume::Receiver<PlayerEvent>>>,
}

impl MusicBot {
    pub fn new(
        config: Config,
        player: AudioPlayer,
        history: Arc<tokio::sync::Mutex<HistoryStorage>>,
        events: flume::Receiver<PlayerEvent>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            player,
            history,
            searches: SearchSessions::default(),
            events: Mutex::new(Some(events)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn player(&self) -> &AudioPlayer {
        &self.player
    }

    pub fn history(&self) -> &Arc<tokio::sync::Mutex<HistoryStorage>> {
        &self.history
    }

    pub fn searches(&self) -> &SearchSessions {
        &self.searches
    }

    /// Registers slash commands with Discord.
    ///
    /// With `GUILD_ID` set, commands go to that guild only (instant
    /// propagation, useful for development); otherwise they are global.
    ///
    /// # Required Permissions
    ///
    /// The bot must have `applications.commands` permission in the target guild(s).
    async fn register_commands(&self, ctx: &Context, ready: &Ready) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                // Verificar que el bot esté en la guild
                if !ready.guilds.iter().any(|g| g.id == guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
            }
        }

        Ok(())
    }

    /// Reacciona a cambios en el canal de voz del bot
    async fn track_voice(&self, ctx: &Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let bot_id = ctx.cache.current_user().id;

        if new.user_id == bot_id {
            match new.channel_id {
                None if self.player.has_queue(guild_id) => {
                    info!("🔌 Bot desconectado en guild {}", guild_id);
                    if let Err(e) = self.player.destroy(guild_id, DestroyReason::Disconnected).await {
                        error!("Error al limpiar la cola: {:?}", e);
                    }
                    return;
                }
                Some(channel) if self.player.voice_channel(guild_id) != Some(channel) => {
                    self.player.update_voice_channel(guild_id, channel);
                }
                _ => {}
            }
        }

        let Some(bot_channel) = self.player.voice_channel(guild_id) else {
            return;
        };

        // Solo interesa si el cambio entra o sale del canal del bot
        let touches_bot_channel = new.channel_id == Some(bot_channel)
            || old.as_ref().and_then(|o| o.channel_id) == Some(bot_channel);
        if !touches_bot_channel {
            return;
        }

        let Some(humans) = humans_in_channel(ctx, guild_id, bot_channel) else {
            return;
        };

        debug!("👥 {} personas en el canal de voz de guild {}", humans, guild_id);
        if humans == 0 {
            self.player.handle_alone(guild_id);
        } else {
            self.player.handle_company(guild_id);
        }
    }
}

/// Cuenta los miembros que no son bots en un canal de voz
fn humans_in_channel(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> Option<usize> {
    let guild = ctx.cache.guild(guild_id)?;
    let states = guild.voice_states.values().map(|state| {
        let is_bot = state
            .member
            .as_ref()
            .map(|m| m.user.bot)
            .or_else(|| guild.members.get(&state.user_id).map(|m| m.user.bot));
        (state.channel_id, is_bot)
    });
    Some(count_humans(states, channel_id))
}

/// Un miembro sin datos en caché cuenta como persona
fn count_humans(
    states: impl IntoIterator<Item = (Option<ChannelId>, Option<bool>)>,
    channel_id: ChannelId,
) -> usize {
    states
        .into_iter()
        .filter(|(channel, is_bot)| *channel == Some(channel_id) && !is_bot.unwrap_or(false))
        .count()
}

#[async_trait]
impl EventHandler for MusicBot {
    /// Called when the shard is ready.
    ///
    /// Registers slash commands and, on the first call only, starts the
    /// player event consumer and the maintenance loop.
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if self.config.enable_slash_commands {
            if let Err(e) = self.register_commands(&ctx, &ready).await {
                error!("Error al registrar comandos: {:?}", e);
            }
        }

        let Some(events) = self.events.lock().take() else {
            return;
        };

        let history = self.config.enable_history.then(|| self.history.clone());
        let consumer = PlayerEvents::new(
            ctx.http.clone(),
            self.player.clone(),
            history,
            self.config.idle_timeout(),
        );
        tokio::spawn(consumer.run(events));

        tokio::spawn(maintenance_tasks(
            self.player.clone(),
            self.searches.clone(),
            self.history.clone(),
        ));
    }

    /// Prefix commands (`!play`, `!skip 2`, ...)
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot || !self.config.enable_text_commands {
            return;
        }

        if let Err(e) = handlers::handle_message(&ctx, &msg, self).await {
            error!("Error manejando mensaje: {:?}", e);
        }
    }

    /// Slash commands, player buttons and the `/search` select menu.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await
                {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Handles voice state updates for users and the bot.
    ///
    /// # Behaviors
    ///
    /// - **Bot disconnected**: destroys the queue
    /// - **Bot moved**: follows the new channel
    /// - **Bot left alone**: pauses and arms the idle timer
    /// - **Someone returns**: resumes an automatic pause
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        self.track_voice(&ctx, old, new).await;
    }
}

/// Runs periodic maintenance tasks in the background.
///
/// Every hour: drops expired cache entries and abandoned `/search` menus,
/// then logs cache and history statistics.
async fn maintenance_tasks(
    player: AudioPlayer,
    searches: SearchSessions,
    history: Arc<tokio::sync::Mutex<HistoryStorage>>,
) {
    let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
    // El primer tick es inmediato
    interval.tick().await;

    loop {
        interval.tick().await;

        let expired = player.sources().cleanup_cache();
        let abandoned = searches.cleanup_expired();
        let metrics = player.sources().cache_metrics();
        info!(
            "🧹 Mantenimiento: {} entradas de caché y {} búsquedas expiradas, hit rate {:.1}%, {} servidores activos",
            expired,
            abandoned,
            metrics.hit_rate() * 100.0,
            player.active_guilds()
        );

        match history.lock().await.stats().await {
            Ok(stats) => info!("📚 {}", stats),
            Err(e) => warn!("Error leyendo estadísticas del historial: {:?}", e),
        }
    }
}
