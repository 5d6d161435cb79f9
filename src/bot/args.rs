use serenity::model::application::CommandInteraction;
use std::time::Duration;

use crate::{
    audio::queue::LoopMode,
    error::MusicError,
    sources::{SourceType, TrackSource},
};

/// Comando ya validado, venga de un mensaje con prefijo o de un slash command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play {
        query: String,
        source: Option<SourceType>,
    },
    /// Tracks ya resueltos: adjuntos del mensaje o selección de `/search`
    Enqueue(Vec<TrackSource>),
    Search {
        query: String,
        source: Option<SourceType>,
    },
    Pause,
    Resume,
    Skip(usize),
    Stop,
    Replay,
    Seek(Duration),
    Shuffle,
    Radio,
    Loop(LoopMode),
    Queue(usize),
    NowPlaying,
    Remove(usize),
    Move { from: usize, to: usize },
    Clear(ClearScope),
    Volume(Option<u16>),
    History(HistoryView),
    Join,
    Leave,
    Help(Option<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    All,
    Duplicates,
    /// Canciones pedidas por quien ejecuta el comando
    Mine,
}

impl ClearScope {
    fn parse(value: &str) -> Result<Self, MusicError> {
        match value.trim().to_lowercase().as_str() {
            "" | "all" => Ok(ClearScope::All),
            "dupes" | "duplicates" => Ok(ClearScope::Duplicates),
            "mine" | "user" => Ok(ClearScope::Mine),
            other => Err(MusicError::invalid(format!(
                "filtro desconocido `{}` (usa all, dupes o mine)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryView {
    Recent,
    Top,
    Clear,
}

impl HistoryView {
    fn parse(value: &str) -> Result<Self, MusicError> {
        match value.trim().to_lowercase().as_str() {
            "" | "recent" => Ok(HistoryView::Recent),
            "top" => Ok(HistoryView::Top),
            "clear" => Ok(HistoryView::Clear),
            other => Err(MusicError::invalid(format!(
                "vista desconocida `{}` (usa recent, top o clear)",
                other
            ))),
        }
    }
}

impl Command {
    /// Parsea el texto de un mensaje sin el prefijo (`skip 2`, `loop songs`)
    pub fn parse_text(input: &str) -> Result<Self, MusicError> {
        let input = input.trim();
        let (name, rest) = input.split_once(char::is_whitespace).unwrap_or((input, ""));
        Self::parse(&name.to_lowercase(), rest.trim(), None)
    }

    /// Como [`Command::parse_text`], pero un `play` sin argumentos reproduce
    /// los adjuntos de audio del mensaje.
    pub fn parse_message(input: &str, attachments: Vec<TrackSource>) -> Result<Self, MusicError> {
        let name = input.split_whitespace().next().unwrap_or_default().to_lowercase();
        match Self::parse_text(input) {
            Err(MusicError::InvalidArgument(_))
                if matches!(name.as_str(), "play" | "p") && !attachments.is_empty() =>
            {
                Ok(Command::Enqueue(attachments))
            }
            other => other,
        }
    }

    /// Construye el comando a partir de las opciones de un slash command
    pub fn from_interaction(interaction: &CommandInteraction) -> Result<Self, MusicError> {
        let option = |name: &str| {
            interaction
                .data
                .options
                .iter()
                .find(|opt| opt.name == name)
                .and_then(|opt| {
                    opt.value
                        .as_str()
                        .map(str::to_string)
                        .or_else(|| opt.value.as_i64().map(|n| n.to_string()))
                })
        };

        let name = interaction.data.name.as_str();
        let source = option("source").and_then(|s| SourceType::from_alias(&s));
        let rest = slash_arguments(name)
            .iter()
            .filter_map(|arg| option(*arg))
            .collect::<Vec<_>>()
            .join(" ");

        Self::parse(name, &rest, source)
    }

    fn parse(name: &str, rest: &str, source: Option<SourceType>) -> Result<Self, MusicError> {
        let command = match name {
            "play" | "p" => Command::Play {
                query: required(rest, "indica una canción o URL")?,
                source,
            },
            "search" | "find" => Command::Search {
                query: required(rest, "indica qué buscar")?,
                source,
            },
            "pause" => Command::Pause,
            "resume" | "unpause" => Command::Resume,
            "skip" | "s" | "next" => Command::Skip(optional_number(rest, "la cantidad", 1, None)?.unwrap_or(1)),
            "stop" => Command::Stop,
            "replay" | "restart" => Command::Replay,
            "seek" => Command::Seek(parse_position(&required(rest, "indica una posición")?)?),
            "shuffle" => Command::Shuffle,
            "radio" => Command::Radio,
            "loop" | "repeat" => Command::Loop(
                LoopMode::parse(rest)
                    .ok_or_else(|| MusicError::invalid("el modo debe ser off, song o songs"))?,
            ),
            "queue" | "q" => Command::Queue(optional_number(rest, "la página", 1, None)?.unwrap_or(1)),
            "nowplaying" | "np" => Command::NowPlaying,
            "remove" | "rm" => Command::Remove(number(rest, "la posición", 1, None)?),
            "move" | "mv" => {
                let mut parts = rest.split_whitespace();
                let (Some(from), Some(to), None) = (parts.next(), parts.next(), parts.next()) else {
                    return Err(MusicError::invalid("indica la posición de origen y la de destino"));
                };
                Command::Move {
                    from: number(from, "la posición de origen", 1, None)?,
                    to: number(to, "la posición de destino", 1, None)?,
                }
            }
            "clear" => Command::Clear(ClearScope::parse(rest)?),
            "volume" | "vol" | "v" => Command::Volume(
                optional_number(rest, "el volumen", 0, Some(200))?.map(|v| v as u16),
            ),
            "history" => Command::History(HistoryView::parse(rest)?),
            "join" | "connect" => Command::Join,
            "leave" | "disconnect" | "dc" => Command::Leave,
            "help" => Command::Help(
                Some(rest.trim_start_matches('/').to_lowercase()).filter(|c| !c.is_empty()),
            ),
            other => return Err(MusicError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Play { .. } => "play",
            Command::Enqueue(_) => "enqueue",
            Command::Search { .. } => "search",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Skip(_) => "skip",
            Command::Stop => "stop",
            Command::Replay => "replay",
            Command::Seek(_) => "seek",
            Command::Shuffle => "shuffle",
            Command::Radio => "radio",
            Command::Loop(_) => "loop",
            Command::Queue(_) => "queue",
            Command::NowPlaying => "nowplaying",
            Command::Remove(_) => "remove",
            Command::Move { .. } => "move",
            Command::Clear(_) => "clear",
            Command::Volume(_) => "volume",
            Command::History(_) => "history",
            Command::Join => "join",
            Command::Leave => "leave",
            Command::Help(_) => "help",
        }
    }

    /// Cambia la reproducción: exige estar en el canal de voz del bot
    pub fn controls_playback(&self) -> bool {
        matches!(
            self,
            Command::Pause
                | Command::Resume
                | Command::Skip(_)
                | Command::Stop
                | Command::Replay
                | Command::Seek(_)
                | Command::Shuffle
                | Command::Radio
                | Command::Loop(_)
                | Command::Remove(_)
                | Command::Move { .. }
                | Command::Clear(_)
                | Command::Volume(Some(_))
                | Command::Leave
        )
    }

    /// Necesita una cola activa en el servidor
    pub fn needs_queue(&self) -> bool {
        self.controls_playback()
            || matches!(self, Command::Queue(_) | Command::NowPlaying | Command::Volume(None))
    }

    /// Resuelve contra APIs externas o se conecta a voz: la respuesta se difiere
    pub fn is_slow(&self) -> bool {
        matches!(
            self,
            Command::Play { .. } | Command::Search { .. } | Command::Enqueue(_) | Command::Join
        )
    }
}

/// Orden en que las opciones de cada slash command forman los argumentos
fn slash_arguments(name: &str) -> &'static [&'static str] {
    match name {
        "play" | "search" => &["query"],
        "skip" => &["amount"],
        "seek" => &["position"],
        "loop" => &["mode"],
        "queue" => &["page"],
        "remove" => &["position"],
        "move" => &["from", "to"],
        "clear" => &["filter"],
        "volume" => &["level"],
        "history" => &["view"],
        "help" => &["command"],
        _ => &[],
    }
}

fn required(value: &str, message: &str) -> Result<String, MusicError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(MusicError::invalid(message));
    }
    Ok(value.to_string())
}

fn number(value: &str, what: &str, min: usize, max: Option<usize>) -> Result<usize, MusicError> {
    let n: usize = value
        .trim()
        .parse()
        .map_err(|_| MusicError::invalid(format!("{} debe ser un número", what)))?;

    match max {
        Some(max) if n < min || n > max => Err(MusicError::invalid(format!(
            "{} debe estar entre {} y {}",
            what, min, max
        ))),
        None if n < min => Err(MusicError::invalid(format!("{} debe ser al menos {}", what, min))),
        _ => Ok(n),
    }
}

fn optional_number(
    value: &str,
    what: &str,
    min: usize,
    max: Option<usize>,
) -> Result<Option<usize>, MusicError> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    number(value, what, min, max).map(Some)
}

/// Posición para `seek`: segundos (`90`), reloj (`1:30`, `1:02:03`) o
/// formato humano (`1m30s`).
pub fn parse_position(value: &str) -> Result<Duration, MusicError> {
    let value = value.trim();
    let invalid = || MusicError::invalid(format!("posición inválida `{}` (usa 90, 1:30 o 1m30s)", value));

    if let Ok(seconds) = value.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    if value.contains(':') {
        let parts: Vec<&str> = value.split(':').collect();
        if parts.len() > 3 {
            return Err(invalid());
        }

        let mut total = 0u64;
        for (i, part) in parts.iter().enumerate() {
            let n: u64 = part.parse().map_err(|_| invalid())?;
            // Solo el primer campo puede pasar de 59
            if i > 0 && n >= 60 {
                return Err(invalid());
            }
            total = total
                .checked_mul(60)
                .and_then(|t| t.checked_add(n))
                .ok_or_else(invalid)?;
        }
        return Ok(Duration::from_secs(total));
    }

    humantime::parse_duration(value).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn invalid(input: &str) -> bool {
        matches!(Command::parse_text(input), Err(MusicError::InvalidArgument(_)))
    }

    #[test]
    fn parses_commands_and_aliases() {
        assert_eq!(
            Command::parse_text("play  sp never gonna give you up ").unwrap(),
            Command::Play {
                query: "sp never gonna give you up".to_string(),
                source: None
            }
        );
        assert_eq!(Command::parse_text("SKIP").unwrap(), Command::Skip(1));
        assert_eq!(Command::parse_text("s 3").unwrap(), Command::Skip(3));
        assert_eq!(Command::parse_text("np").unwrap(), Command::NowPlaying);
        assert_eq!(Command::parse_text("q").unwrap(), Command::Queue(1));
        assert_eq!(Command::parse_text("loop songs").unwrap(), Command::Loop(LoopMode::Songs));
        assert_eq!(Command::parse_text("vol").unwrap(), Command::Volume(None));
        assert_eq!(Command::parse_text("volume 150").unwrap(), Command::Volume(Some(150)));
        assert_eq!(
            Command::parse_text("mv 3 1").unwrap(),
            Command::Move { from: 3, to: 1 }
        );
        assert_eq!(Command::parse_text("clear mine").unwrap(), Command::Clear(ClearScope::Mine));
        assert_eq!(Command::parse_text("history top").unwrap(), Command::History(HistoryView::Top));
        assert_eq!(
            Command::parse_text("help /Play").unwrap(),
            Command::Help(Some("play".to_string()))
        );
        assert_eq!(Command::parse_text("help").unwrap(), Command::Help(None));
    }

    #[test]
    fn numeric_arguments_are_validated() {
        assert!(invalid("skip 0"));
        assert!(invalid("skip dos"));
        assert!(invalid("remove"));
        assert!(invalid("remove -1"));
        assert!(invalid("volume 201"));
        assert!(invalid("queue 0"));
        assert!(invalid("move 1"));
        assert!(invalid("move 1 2 3"));
        assert!(invalid("loop forever"));
        assert!(invalid("play"));
        assert!(invalid("clear everything"));
    }

    #[test]
    fn unknown_commands_are_reported() {
        assert_eq!(
            Command::parse_text("lyrics"),
            Err(MusicError::UnknownCommand("lyrics".to_string()))
        );
    }

    #[test]
    fn seek_positions() {
        assert_eq!(parse_position("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_position("1:30").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_position("1:02:03").unwrap(), Duration::from_secs(3_723));
        assert_eq!(parse_position("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_position("90:00").unwrap(), Duration::from_secs(5_400));

        assert!(parse_position("1:75").is_err());
        assert!(parse_position("1:").is_err());
        assert!(parse_position("1:2:3:4").is_err());
        assert!(parse_position("ayer").is_err());
        assert!(matches!(
            parse_position("18446744073709551615:59:59"),
            Err(MusicError::InvalidArgument(_))
        ));
        assert!(invalid("seek 99999999999999999:00:00"));
        assert_eq!(
            Command::parse_text("seek 2:00").unwrap(),
            Command::Seek(Duration::from_secs(120))
        );
    }

    #[test]
    fn bare_play_uses_attachments() {
        let file = TrackSource::new(
            "song".to_string(),
            "https://cdn.discordapp.com/attachments/1/2/song.mp3".to_string(),
            SourceType::Discord,
        );

        assert_eq!(
            Command::parse_message("play", vec![file.clone()]).unwrap(),
            Command::Enqueue(vec![file.clone()])
        );
        // Con argumentos manda la búsqueda
        assert!(matches!(
            Command::parse_message("p lofi", vec![file]).unwrap(),
            Command::Play { .. }
        ));
        assert!(Command::parse_message("play", Vec::new()).is_err());
    }

    #[test]
    fn permission_classes() {
        assert!(Command::Skip(1).controls_playback());
        assert!(!Command::Volume(None).controls_playback());
        assert!(Command::Volume(None).needs_queue());
        assert!(!Command::Help(None).needs_queue());
        assert!(Command::Join.is_slow());
        assert!(!Command::Pause.is_slow());
    }
}
