use num_format::{Locale, ToFormattedString};
use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::queue::{LoopMode, PlayerStatus, QueueInfo, QueueItem},
    sources::{Playlist, TrackSource},
    storage::HistoryEntry,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 TuneBridge";

/// Canciones por página en `/queue`
pub const QUEUE_PAGE_SIZE: usize = 10;

const PROGRESS_WIDTH: usize = 20;

/// Embed de "reproduciendo ahora". `position` viene de `/nowplaying`; los
/// mensajes del reproductor usan el punto de inicio.
pub fn now_playing(item: &QueueItem, position: Duration, loop_mode: LoopMode) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", item.title))
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Artista", item.artist.as_deref().unwrap_or("Desconocido"), true);

    match item.duration {
        Some(duration) if !position.is_zero() => {
            embed = embed.field(
                "⏱️ Progreso",
                format!(
                    "{} `{} / {}`",
                    progress_bar(position, duration),
                    format_duration(position),
                    format_duration(duration)
                ),
                false,
            );
        }
        Some(duration) => embed = embed.field("⏱️ Duración", format_duration(duration), true),
        None => embed = embed.field("⏱️ Duración", "🔴 En vivo", true),
    }

    if let Some(user) = item.requested_by {
        embed = embed.field("👤 Solicitado por", format!("<@{}>", user), true);
    }
    embed = embed.field("🔗 Fuente", item.source.source_type().display_name(), true);

    if loop_mode != LoopMode::Off {
        embed = embed.field("🔁 Repetición", loop_label(loop_mode), true);
    }

    if let Some(thumbnail) = &item.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .url(&item.url)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed de canción agregada; `position` es `None` si empezó a sonar
pub fn track_added(track: &TrackSource, position: Option<usize>) -> CreateEmbed {
    let (title, description) = match position {
        Some(position) => (
            "✅ Canción Agregada",
            format!("**{}** está en la posición **#{}** de la cola", track.title(), position),
        ),
        None => ("▶️ Reproduciendo", format!("**{}** empieza a sonar", track.title())),
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .field(
            "🎤 Artista",
            track.artist().unwrap_or_else(|| "Desconocido".to_string()),
            true,
        );

    embed = match track.duration() {
        Some(duration) => embed.field("⏱️ Duración", format_duration(duration), true),
        None => embed.field("⏱️ Duración", "🔴 En vivo", true),
    };
    embed = embed.field("🔗 Fuente", track.source_type().display_name(), true);

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .url(track.url())
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed de playlist, álbum o artista agregado a la cola
pub fn playlist_added(playlist: &Playlist, added: usize) -> CreateEmbed {
    let description = if added == 1 {
        format!("Se agregó **1 canción** de **{}**", playlist.title)
    } else {
        format!(
            "Se agregaron **{} canciones** de **{}**",
            added.to_formatted_string(&Locale::es),
            playlist.title
        )
    };

    let mut embed = CreateEmbed::default()
        .title("📋 Playlist Agregada")
        .description(description)
        .color(colors::MUSIC_PURPLE)
        .field("🔗 Fuente", playlist.source_type.display_name(), true);

    if let Some(author) = &playlist.author {
        embed = embed.field("👤 Autor", author, true);
    }

    let total = playlist.total_duration();
    if !total.is_zero() {
        embed = embed.field("⏱️ Duración total", format_duration(total), true);
    }

    if added < playlist.tracks.len() {
        embed = embed.field(
            "⚠️ Cola llena",
            format!("{} canciones no entraron", playlist.tracks.len() - added),
            false,
        );
    }

    if let Some(thumbnail) = &playlist.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .url(&playlist.url)
        .footer(CreateEmbedFooter::new(
            "🎵 La reproducción comenzará automáticamente • Usa /queue para ver todas las canciones",
        ))
        .timestamp(Timestamp::now())
}

/// Resultados de `/search`; la selección se hace con el menú
pub fn search_results(query: &str, tracks: &[TrackSource]) -> CreateEmbed {
    let list = tracks
        .iter()
        .enumerate()
        .map(|(i, track)| {
            format!(
                "**{}**. {}{} `[{}]`",
                i + 1,
                track.title(),
                track.artist().map(|a| format!(" - {}", a)).unwrap_or_default(),
                track
                    .duration()
                    .map(format_duration)
                    .unwrap_or_else(|| "En vivo".to_string())
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    CreateEmbed::default()
        .title("🔍 Resultados de Búsqueda")
        .description(format!(
            "Búsqueda: **{}**\nSelecciona una canción del menú inferior:",
            query
        ))
        .field("Canciones Encontradas", list, false)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Una página de la cola de reproducción
pub fn queue(info: &QueueInfo, page: usize) -> CreateEmbed {
    let queue_page = info.page(page, QUEUE_PAGE_SIZE);

    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if info.current.is_none() && info.items.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    if let Some(current) = &info.current {
        let status = match (info.status, info.loop_mode) {
            (PlayerStatus::Paused, _) => "⏸️",
            (_, LoopMode::Song) => "🔂",
            (_, LoopMode::Songs) => "🔁",
            _ => "▶️",
        };

        embed = embed.field(
            format!("{} Reproduciendo", status),
            format!(
                "**{}**{}",
                current.title,
                current.artist.as_ref().map(|a| format!(" - {}", a)).unwrap_or_default()
            ),
            false,
        );
    }

    if !queue_page.items.is_empty() {
        let mut description = String::new();

        for (i, item) in queue_page.items.iter().enumerate() {
            let duration = item
                .duration
                .map(|d| format!(" `[{}]`", format_duration(d)))
                .unwrap_or_default();

            description.push_str(&format!(
                "**{}**. {}{}{}\n",
                queue_page.offset + i + 1,
                item.title,
                item.artist.as_ref().map(|a| format!(" - {}", a)).unwrap_or_default(),
                duration
            ));
        }

        embed = embed.field("Próximas canciones", description, false);
    }

    let mut summary = format!("**Total:** {} canciones", queue_page.total_items);
    if info.total_duration > Duration::ZERO {
        summary.push_str(&format!(" • **Duración:** {}", format_duration(info.total_duration)));
    }
    if info.radio {
        summary.push_str(" • 📻 **Radio**");
    } else if info.loop_mode != LoopMode::Off {
        summary.push_str(&format!(" • **Repetición:** {}", loop_label(info.loop_mode)));
    }
    summary.push_str(&format!(" • 🔊 {}%", (info.volume * 100.0).round() as u32));

    embed = embed.field("Información", summary, false);

    let footer = if queue_page.total_pages > 1 {
        format!(
            "Página {} de {} • TuneBridge",
            queue_page.current_page, queue_page.total_pages
        )
    } else {
        STANDARD_FOOTER.to_string()
    };

    embed
        .footer(CreateEmbedFooter::new(footer))
        .timestamp(Timestamp::now())
}

/// Historial de reproducciones (persistente o de la sesión)
pub fn history(heading: &str, entries: &[HistoryEntry]) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title(format!("🕘 {}", heading))
        .color(colors::MUSIC_PURPLE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER));

    if entries.is_empty() {
        return embed
            .description("Todavía no se ha reproducido nada")
            .color(colors::NEUTRAL_GRAY);
    }

    let lines = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let plays = if entry.plays == 1 {
                "1 vez".to_string()
            } else {
                format!("{} veces", entry.plays.to_formatted_string(&Locale::es))
            };
            format!(
                "**{}**. [{}]({}) • {} • {} • <t:{}:R>",
                i + 1,
                entry.title,
                entry.url,
                entry.platform.display_name(),
                plays,
                entry.last_played.timestamp()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    embed.description(lines)
}

/// (comando, argumentos, descripción) por categoría
const HELP_SECTIONS: &[(&str, &[(&str, &str, &str)])] = &[
    (
        "🎵 Reproducción",
        &[
            ("play", "<canción|url>", "Reproduce o agrega a la cola"),
            ("search", "<búsqueda>", "Muestra resultados para elegir"),
            ("pause", "", "Pausa la reproducción"),
            ("resume", "", "Reanuda la reproducción"),
            ("skip", "[cantidad]", "Salta canciones"),
            ("seek", "<posición>", "Salta a un minuto (90, 1:30, 1m30s)"),
            ("replay", "", "Vuelve a empezar la canción"),
            ("stop", "", "Detiene, limpia la cola y sale del canal"),
        ],
    ),
    (
        "📜 Cola",
        &[
            ("queue", "[página]", "Muestra la cola"),
            ("nowplaying", "", "Muestra la canción actual"),
            ("shuffle", "", "Mezcla la cola"),
            ("loop", "<off|song|songs>", "Configura la repetición"),
            ("radio", "", "Activa o desactiva el modo radio"),
            ("remove", "<posición>", "Quita una canción"),
            ("move", "<desde> <hasta>", "Mueve una canción"),
            ("clear", "[all|dupes|mine]", "Limpia la cola"),
            ("history", "[recent|top|clear]", "Canciones reproducidas"),
        ],
    ),
    (
        "🔊 Audio y conexión",
        &[
            ("volume", "[0-200]", "Muestra o ajusta el volumen"),
            ("join", "", "Conecta al canal de voz"),
            ("leave", "", "Desconecta del canal"),
            ("help", "[comando]", "Muestra esta ayuda"),
        ],
    ),
];

/// Ayuda general; `prefix` es el prefijo de los comandos de texto
pub fn help(prefix: &str) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 TuneBridge - Guía de Comandos")
        .color(colors::INFO_BLUE)
        .description(format!(
            "Usa los comandos con `/` o con el prefijo `{}`",
            prefix
        ));

    for (section, commands) in HELP_SECTIONS {
        let lines = commands
            .iter()
            .map(|(name, args, description)| {
                if args.is_empty() {
                    format!("• `/{}` - {}", name, description)
                } else {
                    format!("• `/{} {}` - {}", name, args, description)
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        embed = embed.field(*section, lines, false);
    }

    embed
        .field(
            "🎵 Fuentes Soportadas",
            "• YouTube (`yt`)\n\
            • Spotify (`sp`, metadata)\n\
            • VK (`vk`)\n\
            • Yandex Music (`ym`, metadata)\n\
            • SoundCloud (`sc`)\n\
            • Adjuntos de Discord y URLs directas de audio",
            false,
        )
        .footer(CreateEmbedFooter::new("Usa /help <comando> para ayuda específica"))
        .timestamp(Timestamp::now())
}

/// Ayuda de un comando concreto
pub fn command_help(command: &str, prefix: &str) -> CreateEmbed {
    let found = HELP_SECTIONS
        .iter()
        .flat_map(|(_, commands)| commands.iter())
        .find(|(name, _, _)| *name == command);

    let embed = CreateEmbed::default()
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER));

    let Some((name, args, description)) = found else {
        return embed
            .title("❓ Comando no encontrado")
            .description("Usa `/help` para ver todos los comandos disponibles");
    };

    let call = if args.is_empty() {
        name.to_string()
    } else {
        format!("{} {}", name, args)
    };
    let mut embed = embed
        .title(format!("📖 Comando /{}", name))
        .description(*description)
        .field("Uso", format!("`/{call}`\n`{prefix}{call}`"), false);

    if *name == "play" {
        embed = embed.field(
            "Ejemplos",
            format!(
                "• `{p}play Bohemian Rhapsody`\n\
                • `{p}play sp never gonna give you up`\n\
                • `{p}play https://open.spotify.com/album/...`",
                p = prefix
            ),
            false,
        );
    }

    embed
}

/// Embed de error
pub fn error(message: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error")
        .description(message.trim_start_matches("❌").trim())
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed informativo para avisos del reproductor
pub fn notice(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .description(description)
        .color(colors::WARNING_ORANGE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn loop_label(mode: LoopMode) -> &'static str {
    match mode {
        LoopMode::Off => "Desactivada",
        LoopMode::Song => "🔂 Canción",
        LoopMode::Songs => "🔁 Cola",
    }
}

/// Barra de progreso de texto
pub fn progress_bar(position: Duration, total: Duration) -> String {
    let filled = if total.is_zero() {
        0
    } else {
        let ratio = position.as_secs_f64() / total.as_secs_f64();
        ((ratio * PROGRESS_WIDTH as f64) as usize).min(PROGRESS_WIDTH)
    };

    format!("`[{}{}]`", "█".repeat(filled), "▒".repeat(PROGRESS_WIDTH - filled))
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::queue::MusicQueue,
        sources::SourceType,
    };
    use pretty_assertions::assert_eq;
    use serenity::model::id::ChannelId;

    fn json(embed: &CreateEmbed) -> serde_json::Value {
        serde_json::to_value(embed).unwrap()
    }

    fn field_names(embed: &CreateEmbed) -> Vec<String> {
        json(embed)["fields"]
            .as_array()
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|f| f["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn track(title: &str) -> TrackSource {
        TrackSource::new(
            title.to_string(),
            format!("https://youtu.be/{title}"),
            SourceType::YouTube,
        )
        .with_duration(Duration::from_secs(200))
    }

    #[test]
    fn durations_and_progress() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(3_725)), "1:02:05");

        let half = progress_bar(Duration::from_secs(50), Duration::from_secs(100));
        assert_eq!(half.matches('█').count(), PROGRESS_WIDTH / 2);
        let over = progress_bar(Duration::from_secs(500), Duration::from_secs(100));
        assert_eq!(over.matches('▒').count(), 0);
        assert!(progress_bar(Duration::ZERO, Duration::ZERO).starts_with("`[▒"));
    }

    #[test]
    fn queue_page_numbers_continue_across_pages() {
        let mut music_queue = MusicQueue::new(50, ChannelId::new(1), ChannelId::new(2), 0.5);
        for n in 0..13 {
            music_queue.add_track(track(&format!("song{n}"))).unwrap();
        }
        music_queue.advance();

        let embed = json(&queue(&music_queue.info(), 2));
        let upcoming = embed["fields"][1]["value"].as_str().unwrap();
        assert!(upcoming.starts_with("**11**. song11"));
        assert_eq!(embed["footer"]["text"], "Página 2 de 2 • TuneBridge");
    }

    #[test]
    fn empty_queue_has_hint() {
        let music_queue = MusicQueue::new(50, ChannelId::new(1), ChannelId::new(2), 0.5);
        let embed = json(&queue(&music_queue.info(), 1));
        assert!(embed["description"].as_str().unwrap().contains("vacía"));
    }

    #[test]
    fn now_playing_shows_progress_only_with_position() {
        let item = QueueItem::from(track("a"));

        let fresh = now_playing(&item, Duration::ZERO, LoopMode::Off);
        assert!(field_names(&fresh).contains(&"⏱️ Duración".to_string()));

        let later = now_playing(&item, Duration::from_secs(30), LoopMode::Song);
        let names = field_names(&later);
        assert!(names.contains(&"⏱️ Progreso".to_string()));
        assert!(names.contains(&"🔁 Repetición".to_string()));
    }

    #[test]
    fn help_lists_every_section_and_finds_commands() {
        assert_eq!(field_names(&help("!")).len(), HELP_SECTIONS.len() + 1);

        let seek = json(&command_help("seek", "!"));
        assert_eq!(seek["title"], "📖 Comando /seek");
        let missing = json(&command_help("lyrics", "!"));
        assert_eq!(missing["title"], "❓ Comando no encontrado");
    }

    #[test]
    fn error_embed_strips_marker() {
        let embed = json(&error("❌ No hay nada reproduciéndose"));
        assert_eq!(embed["description"], "No hay nada reproduciéndose");
    }
}
