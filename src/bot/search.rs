use dashmap::DashMap;
use serenity::model::id::{GuildId, UserId};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::debug;

use crate::{error::MusicError, sources::TrackSource};

/// Tiempo que un menú de `/search` sigue siendo válido
const SESSION_TTL: Duration = Duration::from_secs(300);

/// Resultados mostrados a un usuario pendientes de selección
#[derive(Debug, Clone)]
pub struct SearchSession {
    pub query: String,
    pub results: Vec<TrackSource>,
    created_at: Instant,
}

impl SearchSession {
    fn expired(&self) -> bool {
        self.created_at.elapsed() >= SESSION_TTL
    }
}

/// Una búsqueda abierta por usuario y servidor; la nueva reemplaza a la anterior
#[derive(Clone, Default)]
pub struct SearchSessions {
    sessions: Arc<DashMap<(GuildId, UserId), SearchSession>>,
}

impl SearchSessions {
    pub fn store(&self, guild_id: GuildId, user_id: UserId, query: String, results: Vec<TrackSource>) {
        debug!("🔍 {} resultados guardados para {} en guild {}", results.len(), user_id, guild_id);
        self.sessions.insert(
            (guild_id, user_id),
            SearchSession {
                query,
                results,
                created_at: Instant::now(),
            },
        );
    }

    /// Consume la búsqueda del usuario y devuelve el track elegido
    pub fn take(&self, guild_id: GuildId, user_id: UserId, index: usize) -> Result<TrackSource, MusicError> {
        let session = self
            .sessions
            .remove(&(guild_id, user_id))
            .map(|(_, session)| session)
            .filter(|session| !session.expired())
            .ok_or_else(|| MusicError::invalid("esta búsqueda expiró o la abrió otro usuario"))?;

        session
            .results
            .into_iter()
            .nth(index)
            .ok_or_else(|| MusicError::invalid("opción de búsqueda inválida"))
    }

    /// Elimina búsquedas caducadas; devuelve cuántas quitó
    pub fn cleanup_expired(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.expired());
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceType;
    use pretty_assertions::assert_eq;

    fn results() -> Vec<TrackSource> {
        ["a", "b"]
            .iter()
            .map(|t| TrackSource::new(t.to_string(), format!("https://youtu.be/{t}"), SourceType::YouTube))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn selection_is_per_user_and_single_use() {
        let sessions = SearchSessions::default();
        let guild = GuildId::new(1);
        sessions.store(guild, UserId::new(7), "ab".to_string(), results());

        assert!(sessions.take(guild, UserId::new(8), 0).is_err());
        assert_eq!(sessions.take(guild, UserId::new(7), 1).unwrap().title(), "b");
        assert!(sessions.take(guild, UserId::new(7), 1).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_expire() {
        let sessions = SearchSessions::default();
        let guild = GuildId::new(1);
        sessions.store(guild, UserId::new(7), "ab".to_string(), results());
        sessions.store(guild, UserId::new(9), "ab".to_string(), results());

        tokio::time::advance(SESSION_TTL).await;
        assert!(sessions.take(guild, UserId::new(7), 0).is_err());
        assert_eq!(sessions.cleanup_expired(), 1);
        assert_eq!(sessions.len(), 0);
    }
}
