use thiserror::Error;

/// User-facing failures raised by command handlers, the player and the
/// platform adapters.
///
/// Anything that reaches a command handler as a `MusicError` is rendered
/// verbatim in chat; other errors are logged and replaced by a generic
/// message (see [`user_message`]).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MusicError {
    #[error("Este comando solo funciona dentro de un servidor")]
    NotInGuild,

    #[error("Debes estar en un canal de voz")]
    UserNotInVoice,

    #[error("Debes estar en el mismo canal de voz que el bot")]
    DifferentChannel,

    #[error("No hay una cola de reproducción activa")]
    NoQueue,

    #[error("No hay nada reproduciéndose")]
    NothingPlaying,

    #[error("La reproducción ya está pausada")]
    AlreadyPaused,

    #[error("La reproducción no está pausada")]
    NotPaused,

    #[error("No disponible en modo radio")]
    RadioMode,

    #[error("La cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    #[error("Argumento inválido: {0}")]
    InvalidArgument(String),

    #[error("Comando desconocido: {0}")]
    UnknownCommand(String),

    #[error("No se encontraron resultados para: {0}")]
    NoResults(String),

    #[error("URL no soportada: {0}")]
    UnsupportedUrl(String),

    #[error("La plataforma {0} no está configurada")]
    PlatformDisabled(&'static str),

    /// Failure reported by a third-party platform adapter.
    #[error("[APIs]: {platform}: {message}")]
    Api {
        platform: &'static str,
        message: String,
    },

    #[error("Error del transcodificador: {0}")]
    Transcoder(String),
}

impl MusicError {
    pub fn api(platform: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Api {
            platform,
            message: err.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// Converts an error reaching the command boundary into the chat message shown
/// to the user.
pub fn user_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<MusicError>() {
        Some(music) => format!("❌ {}", music),
        None => "❌ Ocurrió un error inesperado al ejecutar el comando".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_carry_prefix() {
        let err = MusicError::api("spotify", "401 Unauthorized");
        assert_eq!(err.to_string(), "[APIs]: spotify: 401 Unauthorized");
    }

    #[test]
    fn music_errors_render_verbatim() {
        let err = anyhow::Error::new(MusicError::NoQueue);
        assert_eq!(user_message(&err), "❌ No hay una cola de reproducción activa");
    }

    #[test]
    fn context_keeps_music_error_downcastable() {
        use anyhow::Context;
        let err: anyhow::Result<()> = Err(MusicError::RadioMode).context("skip");
        let err = err.unwrap_err();
        assert_eq!(user_message(&err), "❌ No disponible en modo radio");
    }

    #[test]
    fn other_errors_are_generic() {
        let err = anyhow::anyhow!("socket closed");
        assert!(!user_message(&err).contains("socket"));
    }
}
