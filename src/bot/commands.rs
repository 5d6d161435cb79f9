use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};
use tracing::info;

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    let commands = all();
    let total = commands.len();

    for command in commands {
        ctx.http.create_global_command(&command).await?;
    }

    info!("✅ {} comandos globales registrados", total);
    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    let commands = all();
    let total = commands.len();

    guild_id.set_commands(&ctx.http, commands).await?;

    info!("✅ {} comandos registrados en guild {}", total, guild_id);
    Ok(())
}

/// Todos los slash commands del bot
pub fn all() -> Vec<CreateCommand> {
    vec![
        play_command(),
        search_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        stop_command(),
        replay_command(),
        seek_command(),
        queue_command(),
        nowplaying_command(),
        shuffle_command(),
        radio_command(),
        loop_command(),
        remove_command(),
        move_command(),
        clear_command(),
        volume_command(),
        history_command(),
        join_command(),
        leave_command(),
        help_command(),
    ]
}

fn source_option() -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::String, "source", "Plataforma donde buscar")
        .add_string_choice("YouTube", "youtube")
        .add_string_choice("Spotify", "spotify")
        .add_string_choice("VK", "vk")
        .add_string_choice("Yandex Music", "yandex")
        .add_string_choice("SoundCloud", "soundcloud")
}

fn position_option(name: &str, description: &str) -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::Integer, name, description)
        .min_int_value(1)
        .required(true)
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción, álbum o playlist")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
        .add_option(source_option())
}

fn search_command() -> CreateCommand {
    CreateCommand::new("search")
        .description("Busca canciones y elige cuál reproducir")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "Término de búsqueda")
                .required(true),
        )
        .add_option(source_option())
}

// Comandos de control

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip")
        .description("Salta a la siguiente canción")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "amount",
                "Número de canciones a saltar",
            )
            .min_int_value(1)
            .max_int_value(100),
        )
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción y limpia la cola")
}

fn replay_command() -> CreateCommand {
    CreateCommand::new("replay").description("Reinicia la canción actual")
}

fn seek_command() -> CreateCommand {
    CreateCommand::new("seek")
        .description("Salta a una posición de la canción actual")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "position",
                "Posición (ej: 90, 1:30, 2m10s)",
            )
            .required(true),
        )
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Número de página")
                .min_int_value(1),
        )
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Muestra información de la canción actual")
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Mezcla las canciones en espera")
}

fn radio_command() -> CreateCommand {
    CreateCommand::new("radio").description("Activa/desactiva el modo radio")
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Configura el modo de repetición")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "Modo de repetición")
                .add_string_choice("Desactivar", "off")
                .add_string_choice("Canción", "song")
                .add_string_choice("Cola", "songs")
                .required(true),
        )
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Elimina una canción de la cola")
        .add_option(position_option("position", "Posición en la cola"))
}

fn move_command() -> CreateCommand {
    CreateCommand::new("move")
        .description("Mueve una canción a otra posición de la cola")
        .add_option(position_option("from", "Posición actual"))
        .add_option(position_option("to", "Nueva posición"))
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear")
        .description("Limpia la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "filter", "Qué canciones quitar")
                .add_string_choice("Todo", "all")
                .add_string_choice("Duplicados", "dupes")
                .add_string_choice("Las mías", "mine"),
        )
}

// Comandos de audio

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Muestra o ajusta el volumen de reproducción")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "level",
                "Nivel de volumen (0-200)",
            )
            .min_int_value(0)
            .max_int_value(200),
        )
}

// Comandos de conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Conecta el bot a tu canal de voz")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot del canal de voz")
}

// Comandos adicionales

fn history_command() -> CreateCommand {
    CreateCommand::new("history")
        .description("Muestra el historial de reproducción del servidor")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "view", "Vista del historial")
                .add_string_choice("Recientes", "recent")
                .add_string_choice("Más reproducidas", "top")
                .add_string_choice("Borrar", "clear"),
        )
}

fn help_command() -> CreateCommand {
    CreateCommand::new("help")
        .description("Muestra información de ayuda")
        .add_option(CreateCommandOption::new(
            CommandOptionType::String,
            "command",
            "Comando específico",
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn names() -> Vec<String> {
        all()
            .into_iter()
            .map(|cmd| serde_json::to_value(cmd).unwrap()["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn every_command_is_registered_once() {
        let names = names();
        let mut unique = names.clone();
        unique.sort();
        unique.dedup();

        assert_eq!(unique.len(), names.len());
        for expected in ["play", "search", "seek", "radio", "move", "clear", "history", "help"] {
            assert!(names.iter().any(|n| n == expected), "falta /{}", expected);
        }
    }

    #[test]
    fn option_choices_match_text_arguments() {
        let json = serde_json::to_value(loop_command()).unwrap();
        let choices: Vec<&str> = json["options"][0]["choices"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|c| c["value"].as_str())
            .collect();
        assert_eq!(choices, vec!["off", "song", "songs"]);

        let json = serde_json::to_value(play_command()).unwrap();
        let options: Vec<&Value> = json["options"].as_array().unwrap().iter().collect();
        assert_eq!(options[0]["name"], "query");
        assert_eq!(options[1]["name"], "source");
    }
}
