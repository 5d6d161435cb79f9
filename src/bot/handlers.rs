use anyhow::Result;
use serenity::{
    builder::{
        CreateActionRow, CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        CreateMessage, EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction, ComponentInteractionDataKind},
        channel::Message,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, error, info};

use crate::{
    audio::{
        player::{AudioPlayer, Enqueued},
        queue::{ClearFilter, LoopMode, PlayerStatus},
    },
    bot::{
        args::{ClearScope, Command, HistoryView},
        MusicBot,
    },
    error::{user_message, MusicError},
    sources::{discord::attachment_track, Resolved, TrackSource},
    storage::HistoryEntry,
    ui::{
        buttons::{self, button_ids},
        embeds,
    },
};

/// Entradas que muestra `history`
const HISTORY_LIMIT: usize = 10;

/// Servidor, usuario y canal desde donde se ejecuta un comando
#[derive(Debug, Clone, Copy)]
pub struct Invocation {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub text_channel: ChannelId,
}

/// Respuesta lista para enviarse como mensaje o como respuesta de interacción
#[derive(Debug, Clone, Default)]
pub struct Reply {
    content: Option<String>,
    embed: Option<CreateEmbed>,
    components: Vec<CreateActionRow>,
    ephemeral: bool,
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn embed(embed: CreateEmbed) -> Self {
        Self {
            embed: Some(embed),
            ..Default::default()
        }
    }

    /// Error visible solo para quien ejecutó el comando (en slash commands)
    pub fn error(err: &anyhow::Error) -> Self {
        Self {
            embed: Some(embeds::error(&user_message(err))),
            ephemeral: true,
            ..Default::default()
        }
    }

    pub fn with_components(mut self, components: Vec<CreateActionRow>) -> Self {
        self.components = components;
        self
    }

    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }

    pub fn into_message(self) -> CreateMessage {
        let mut message = CreateMessage::new().components(self.components);
        if let Some(content) = self.content {
            message = message.content(content);
        }
        if let Some(embed) = self.embed {
            message = message.embed(embed);
        }
        message
    }

    pub fn into_interaction(self) -> CreateInteractionResponseMessage {
        let mut message = CreateInteractionResponseMessage::new()
            .components(self.components)
            .ephemeral(self.ephemeral);
        if let Some(content) = self.content {
            message = message.content(content);
        }
        if let Some(embed) = self.embed {
            message = message.embed(embed);
        }
        message
    }

    /// Para respuestas diferidas; siempre reemplaza los componentes
    pub fn into_edit(self) -> EditInteractionResponse {
        let mut edit = EditInteractionResponse::new()
            .content(self.content.unwrap_or_default())
            .components(self.components);
        if let Some(embed) = self.embed {
            edit = edit.embed(embed);
        }
        edit
    }
}

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, interaction: CommandInteraction, bot: &MusicBot) -> Result<()> {
    info!(
        "📝 Comando /{} usado por {} en guild {:?}",
        interaction.data.name, interaction.user.name, interaction.guild_id
    );

    let parsed = interaction
        .guild_id
        .ok_or(MusicError::NotInGuild)
        .and_then(|guild_id| {
            let command = Command::from_interaction(&interaction)?;
            Ok((
                Invocation {
                    guild_id,
                    user_id: interaction.user.id,
                    text_channel: interaction.channel_id,
                },
                command,
            ))
        });

    let (at, command) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => {
            let reply = Reply::error(&e.into());
            interaction
                .create_response(&ctx.http, CreateInteractionResponse::Message(reply.into_interaction()))
                .await?;
            return Ok(());
        }
    };

    if command.is_slow() {
        // Defer la respuesta ya que puede tomar tiempo
        interaction
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
            )
            .await?;

        let reply = run(ctx, bot, at, command).await;
        interaction.edit_response(&ctx.http, reply.into_edit()).await?;
    } else {
        let reply = run(ctx, bot, at, command).await;
        interaction
            .create_response(&ctx.http, CreateInteractionResponse::Message(reply.into_interaction()))
            .await?;
    }

    Ok(())
}

/// Maneja interacciones con componentes (botones y menú de búsqueda)
pub async fn handle_component(ctx: &Context, component: ComponentInteraction, bot: &MusicBot) -> Result<()> {
    let guild_id = component.guild_id.ok_or(MusicError::NotInGuild)?;
    let at = Invocation {
        guild_id,
        user_id: component.user.id,
        text_channel: component.channel_id,
    };

    info!(
        "🔘 Componente {} usado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    if component.data.custom_id == button_ids::TRACK_SELECTION {
        let index = match &component.data.kind {
            ComponentInteractionDataKind::StringSelect { values } => {
                values.first().and_then(|value| buttons::parse_selection(value))
            }
            _ => None,
        };

        component.defer(&ctx.http).await?;

        let reply = match index {
            Some(index) => match bot.searches().take(guild_id, at.user_id, index) {
                Ok(track) => run(ctx, bot, at, Command::Enqueue(vec![track])).await,
                Err(e) => Reply::error(&e.into()),
            },
            None => Reply::error(&MusicError::invalid("opción de búsqueda inválida").into()),
        };

        // Reemplaza los resultados y retira el menú
        component.edit_response(&ctx.http, reply.into_edit()).await?;
        return Ok(());
    }

    let player = bot.player();
    let command = match component.data.custom_id.as_str() {
        button_ids::PLAY_PAUSE => match player.status(guild_id) {
            Some(PlayerStatus::Paused) => Command::Resume,
            _ => Command::Pause,
        },
        button_ids::SKIP => Command::Skip(1),
        button_ids::STOP => Command::Stop,
        button_ids::SHUFFLE => Command::Shuffle,
        button_ids::LOOP => {
            let current = player
                .queue_info(guild_id)
                .map(|info| info.loop_mode)
                .unwrap_or_default();
            Command::Loop(buttons::next_loop_mode(current))
        }
        button_ids::QUEUE => Command::Queue(1),
        other => {
            debug!("Componente desconocido: {}", other);
            let reply = Reply::error(&MusicError::invalid("acción no reconocida").into());
            component
                .create_response(&ctx.http, CreateInteractionResponse::Message(reply.into_interaction()))
                .await?;
            return Ok(());
        }
    };

    let reply = run(ctx, bot, at, command).await.ephemeral();
    component
        .create_response(&ctx.http, CreateInteractionResponse::Message(reply.into_interaction()))
        .await?;

    Ok(())
}

/// Maneja comandos de texto con prefijo
pub async fn handle_message(ctx: &Context, msg: &Message, bot: &MusicBot) -> Result<()> {
    let Some(input) = msg.content.strip_prefix(bot.config().prefix.as_str()) else {
        return Ok(());
    };
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };
    if input.trim().is_empty() {
        return Ok(());
    }

    info!("💬 Comando de texto '{}' de {} en guild {}", input.trim(), msg.author.name, guild_id);

    let attachments: Vec<TrackSource> = msg
        .attachments
        .iter()
        .filter_map(attachment_track)
        .map(|track| track.with_requested_by(msg.author.id))
        .collect();

    let at = Invocation {
        guild_id,
        user_id: msg.author.id,
        text_channel: msg.channel_id,
    };

    let reply = match Command::parse_message(input, attachments) {
        Ok(command) => run(ctx, bot, at, command).await,
        Err(e) => Reply::error(&e.into()),
    };

    msg.channel_id
        .send_message(&ctx.http, reply.into_message().reference_message(msg))
        .await?;
    Ok(())
}

/// Ejecuta y convierte cualquier error en respuesta para el chat
async fn run(ctx: &Context, bot: &MusicBot, at: Invocation, command: Command) -> Reply {
    let name = command.name();
    match execute(ctx, bot, at, command).await {
        Ok(reply) => reply,
        Err(e) => {
            if e.downcast_ref::<MusicError>().is_some() {
                debug!("Comando {} rechazado: {:#}", name, e);
            } else {
                error!("❌ Error ejecutando {}: {:?}", name, e);
            }
            Reply::error(&e)
        }
    }
}

/// Lógica compartida por comandos de texto, slash y botones
pub async fn execute(ctx: &Context, bot: &MusicBot, at: Invocation, command: Command) -> Result<Reply> {
    let player = bot.player();
    let guild_id = at.guild_id;

    let user_channel = user_voice_channel(ctx, guild_id, at.user_id);
    check_access(player, &command, guild_id, user_channel)?;

    let reply = match command {
        Command::Play { query, source } => {
            let voice = join_target(player, guild_id, user_channel)?;
            let sources = player.sources();
            let request = sources.parse_query(&query, source)?;

            match sources.resolve(&request, at.user_id).await? {
                Resolved::Track(track) => enqueue_track(player, at, voice, track).await?,
                Resolved::Search(tracks) => {
                    let track = tracks
                        .into_iter()
                        .next()
                        .ok_or_else(|| MusicError::NoResults(query.clone()))?;
                    enqueue_track(player, at, voice, track).await?
                }
                Resolved::Playlist(playlist) => {
                    let added = player
                        .enqueue_many(guild_id, voice, at.text_channel, playlist.tracks.clone())
                        .await?;
                    Reply::embed(embeds::playlist_added(&playlist, added))
                }
            }
        }
        Command::Enqueue(tracks) => {
            let voice = join_target(player, guild_id, user_channel)?;
            let tracks: Vec<TrackSource> = tracks
                .into_iter()
                .map(|track| match track.requested_by() {
                    Some(_) => track,
                    None => track.with_requested_by(at.user_id),
                })
                .collect();

            match <[TrackSource; 1]>::try_from(tracks) {
                Ok([track]) => enqueue_track(player, at, voice, track).await?,
                Err(tracks) => {
                    let added = player
                        .enqueue_many(guild_id, voice, at.text_channel, tracks)
                        .await?;
                    Reply::text(format!("📎 {} archivos agregados a la cola", added))
                }
            }
        }
        Command::Search { query, source } => {
            let sources = player.sources();
            let request = sources.parse_query(&query, source)?;

            // Una URL se muestra como único resultado (o como la lista completa)
            let mut results = match sources.resolve(&request, at.user_id).await? {
                Resolved::Search(tracks) => tracks,
                Resolved::Track(track) => vec![track],
                Resolved::Playlist(playlist) => playlist.tracks,
            };
            results.truncate(sources.search_limit());

            let embed = embeds::search_results(&query, &results);
            let menu = buttons::search_menu(&results);
            bot.searches().store(guild_id, at.user_id, query, results);

            Reply::embed(embed).with_components(vec![menu])
        }
        Command::Pause => {
            player.pause(guild_id)?;
            Reply::text("⏸️ Reproducción pausada")
        }
        Command::Resume => {
            player.resume(guild_id)?;
            Reply::text("▶️ Reproducción reanudada")
        }
        Command::Skip(amount) => {
            let skipped = player.skip(guild_id, amount)?;
            if skipped == 1 {
                Reply::text("⏭️ Canción saltada")
            } else {
                Reply::text(format!("⏭️ Saltadas {} canciones", skipped))
            }
        }
        Command::Stop => {
            player.stop(guild_id).await?;
            Reply::text("⏹️ Reproducción detenida y cola limpiada")
        }
        Command::Replay => {
            player.replay(guild_id)?;
            Reply::text("🔄 Reiniciando la canción actual")
        }
        Command::Seek(position) => {
            player.seek(guild_id, position)?;
            Reply::text(format!("⏩ Saltando a {}", embeds::format_duration(position)))
        }
        Command::Shuffle => {
            player.shuffle(guild_id)?;
            Reply::text("🔀 Cola mezclada")
        }
        Command::Radio => {
            if player.toggle_radio(guild_id)? {
                Reply::text("📻 Modo radio activado: las canciones que terminan vuelven al final de la cola")
            } else {
                Reply::text("📻 Modo radio desactivado")
            }
        }
        Command::Loop(mode) => {
            player.set_loop_mode(guild_id, mode)?;
            Reply::text(match mode {
                LoopMode::Song => "🔂 Repetir canción activado",
                LoopMode::Songs => "🔁 Repetir cola activado",
                LoopMode::Off => "➡️ Repetición desactivada",
            })
        }
        Command::Queue(page) => {
            let info = player.queue_info(guild_id)?;
            Reply::embed(embeds::queue(&info, page))
        }
        Command::NowPlaying => {
            let (item, position) = player.now_playing(guild_id).await?;
            let info = player.queue_info(guild_id)?;
            Reply::embed(embeds::now_playing(&item, position, info.loop_mode)).with_components(
                buttons::player_controls(info.status == PlayerStatus::Paused, info.loop_mode, info.radio),
            )
        }
        Command::Remove(position) => {
            let removed = player.remove(guild_id, position)?;
            Reply::text(format!("🗑️ Eliminada de la cola: **{}**", removed.title))
        }
        Command::Move { from, to } => {
            player.move_track(guild_id, from, to)?;
            Reply::text(format!("📍 Canción movida de la posición #{} a #{}", from, to))
        }
        Command::Clear(scope) => {
            let filter = match scope {
                ClearScope::All => ClearFilter::All,
                ClearScope::Duplicates => ClearFilter::Duplicates,
                ClearScope::Mine => ClearFilter::User(at.user_id),
            };
            let removed = player.clear(guild_id, filter)?;
            Reply::text(format!("🗑️ {} canciones eliminadas de la cola", removed))
        }
        Command::Volume(None) => {
            let volume = player.volume(guild_id)?;
            Reply::text(format!("🔊 Volumen actual: {}%", (volume * 100.0).round() as u32))
        }
        Command::Volume(Some(percent)) => {
            player.set_volume(guild_id, percent)?;
            Reply::text(format!("🔊 Volumen ajustado a {}%", percent))
        }
        Command::History(view) => history(bot, guild_id, view).await?,
        Command::Join => {
            let voice = join_target(player, guild_id, user_channel)?;
            player.connect(guild_id, voice, at.text_channel).await?;
            Reply::text(format!("🔊 Conectado a <#{}>", voice))
        }
        Command::Leave => {
            player.stop(guild_id).await?;
            Reply::text("👋 Desconectado del canal de voz")
        }
        Command::Help(None) => Reply::embed(embeds::help(&bot.config().prefix)).ephemeral(),
        Command::Help(Some(command)) => {
            Reply::embed(embeds::command_help(&command, &bot.config().prefix)).ephemeral()
        }
    };

    Ok(reply)
}

/// Verificaciones previas: canal de voz del usuario, cola activa y mismo canal
fn check_access(
    player: &AudioPlayer,
    command: &Command,
    guild_id: GuildId,
    user_channel: Option<ChannelId>,
) -> Result<(), MusicError> {
    if command.controls_playback() && user_channel.is_none() {
        return Err(MusicError::UserNotInVoice);
    }
    if command.needs_queue() && !player.has_queue(guild_id) {
        return Err(MusicError::NoQueue);
    }
    if command.controls_playback() && player.voice_channel(guild_id) != user_channel {
        return Err(MusicError::DifferentChannel);
    }
    Ok(())
}

/// Canal al que debe unirse el bot para atender al usuario
fn join_target(
    player: &AudioPlayer,
    guild_id: GuildId,
    user_channel: Option<ChannelId>,
) -> Result<ChannelId, MusicError> {
    let channel = user_channel.ok_or(MusicError::UserNotInVoice)?;
    match player.voice_channel(guild_id) {
        Some(current) if current != channel => Err(MusicError::DifferentChannel),
        _ => Ok(channel),
    }
}

async fn enqueue_track(
    player: &AudioPlayer,
    at: Invocation,
    voice: ChannelId,
    track: TrackSource,
) -> Result<Reply> {
    let position = match player
        .enqueue(at.guild_id, voice, at.text_channel, track.clone())
        .await?
    {
        Enqueued::Started => None,
        Enqueued::Queued(position) => Some(position),
    };
    Ok(Reply::embed(embeds::track_added(&track, position)))
}

async fn history(bot: &MusicBot, guild_id: GuildId, view: HistoryView) -> Result<Reply> {
    if !bot.config().enable_history {
        // Sin historial persistente se muestra el de la sesión actual
        if view == HistoryView::Clear {
            return Err(MusicError::invalid("el historial persistente está desactivado").into());
        }
        let entries: Vec<HistoryEntry> = bot
            .player()
            .history(guild_id, HISTORY_LIMIT)?
            .iter()
            .map(|item| HistoryEntry::from_track(&item.source, item.added_at))
            .collect();
        return Ok(Reply::embed(embeds::history("Historial de la sesión", &entries)));
    }

    let mut storage = bot.history().lock().await;
    let reply = match view {
        HistoryView::Recent => {
            let entries = storage.recent(guild_id.get(), HISTORY_LIMIT).await;
            Reply::embed(embeds::history("Historial reciente", &entries))
        }
        HistoryView::Top => {
            let entries = storage.top(guild_id.get(), HISTORY_LIMIT).await;
            Reply::embed(embeds::history("Más reproducidas", &entries))
        }
        HistoryView::Clear => {
            let removed = storage.clear(guild_id.get()).await?;
            Reply::text(format!("🗑️ Historial borrado ({} entradas)", removed))
        }
    };
    Ok(reply)
}

/// Canal de voz del usuario según la caché
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::transcoder::Transcoder,
        cache::MusicCache,
        config::Config,
        sources::SourceManager,
    };
    use pretty_assertions::assert_eq;
    use songbird::Songbird;
    use std::{collections::HashMap, sync::Arc, time::Duration};

    fn player() -> AudioPlayer {
        let sources = SourceManager::with_sources(
            HashMap::new(),
            MusicCache::new(4, Duration::from_secs(60)),
            10,
            5,
        );
        let (tx, _rx) = flume::unbounded();
        AudioPlayer::new(
            Songbird::serenity(),
            Arc::new(sources),
            Arc::new(Transcoder::new(&Config::default())),
            tx,
            Duration::from_secs(60),
            10,
            0.5,
        )
    }

    fn guild() -> GuildId {
        GuildId::new(3)
    }

    #[tokio::test]
    async fn playback_commands_require_voice_then_queue() {
        let player = player();

        assert_eq!(
            check_access(&player, &Command::Pause, guild(), None),
            Err(MusicError::UserNotInVoice)
        );
        assert_eq!(
            check_access(&player, &Command::Pause, guild(), Some(ChannelId::new(1))),
            Err(MusicError::NoQueue)
        );
        assert_eq!(
            check_access(&player, &Command::Queue(1), guild(), None),
            Err(MusicError::NoQueue)
        );
        assert_eq!(check_access(&player, &Command::Help(None), guild(), None), Ok(()));
        assert_eq!(
            check_access(&player, &Command::History(HistoryView::Recent), guild(), None),
            Ok(())
        );
    }

    #[tokio::test]
    async fn join_target_needs_user_in_voice() {
        let player = player();
        assert_eq!(join_target(&player, guild(), None), Err(MusicError::UserNotInVoice));
        assert_eq!(
            join_target(&player, guild(), Some(ChannelId::new(5))),
            Ok(ChannelId::new(5))
        );
    }

    #[test]
    fn errors_are_ephemeral_embeds() {
        let reply = Reply::error(&MusicError::NoQueue.into());
        assert!(reply.ephemeral);
        assert!(reply.content.is_none());

        let json = serde_json::to_value(reply.embed.unwrap()).unwrap();
        assert_eq!(json["description"], "No hay una cola de reproducción activa");
    }
}
