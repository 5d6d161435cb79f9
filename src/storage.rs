use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::sources::{SourceType, TrackSource};

/// Entradas máximas por servidor; se descarta la reproducida hace más tiempo
pub const MAX_HISTORY_ENTRIES: usize = 100;

/// Canción reproducida en un servidor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub title: String,
    pub url: String,
    pub platform: SourceType,
    pub author: Option<String>,
    pub requested_by: Option<u64>,
    pub plays: u32,
    pub last_played: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn from_track(track: &TrackSource, at: DateTime<Utc>) -> Self {
        Self {
            title: track.title(),
            url: track.url(),
            platform: track.source_type(),
            author: track.artist(),
            requested_by: track.requested_by().map(|id| id.get()),
            plays: 1,
            last_played: at,
        }
    }
}

/// Historial por servidor en `data_dir/history/guild_<id>.json`
pub struct HistoryStorage {
    history_dir: PathBuf,
    guilds: HashMap<u64, Vec<HistoryEntry>>,
}

impl HistoryStorage {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        let history_dir = data_dir.join("history");
        fs::create_dir_all(&history_dir)
            .await
            .with_context(|| format!("No se pudo crear {}", history_dir.display()))?;

        info!("📁 Historial inicializado en: {}", history_dir.display());

        Ok(Self {
            history_dir,
            guilds: HashMap::new(),
        })
    }

    /// Registra una reproducción
    pub async fn record(&mut self, guild_id: u64, track: &TrackSource) -> Result<()> {
        self.record_at(guild_id, track, Utc::now()).await
    }

    async fn record_at(&mut self, guild_id: u64, track: &TrackSource, at: DateTime<Utc>) -> Result<()> {
        let entries = self.entries_mut(guild_id).await;
        let url = track.url();

        match entries.iter_mut().find(|e| e.url == url) {
            Some(entry) => {
                entry.plays += 1;
                entry.last_played = at;
                entry.requested_by = track.requested_by().map(|id| id.get()).or(entry.requested_by);
            }
            None => {
                if entries.len() >= MAX_HISTORY_ENTRIES {
                    if let Some(oldest) = entries
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, e)| e.last_played)
                        .map(|(i, _)| i)
                    {
                        entries.swap_remove(oldest);
                    }
                }
                entries.push(HistoryEntry::from_track(track, at));
            }
        }

        debug!("📝 Historial actualizado en guild {}: {}", guild_id, track.title());
        self.save(guild_id).await
    }

    /// Las más recientes primero
    pub async fn recent(&mut self, guild_id: u64, limit: usize) -> Vec<HistoryEntry> {
        let mut entries = self.entries_mut(guild_id).await.clone();
        entries.sort_by(|a, b| b.last_played.cmp(&a.last_played));
        entries.truncate(limit);
        entries
    }

    /// Las más reproducidas primero
    pub async fn top(&mut self, guild_id: u64, limit: usize) -> Vec<HistoryEntry> {
        let mut entries = self.entries_mut(guild_id).await.clone();
        entries.sort_by(|a, b| {
            b.plays
                .cmp(&a.plays)
                .then_with(|| b.last_played.cmp(&a.last_played))
        });
        entries.truncate(limit);
        entries
    }

    /// Borra el historial de un servidor; devuelve cuántas entradas tenía
    pub async fn clear(&mut self, guild_id: u64) -> Result<usize> {
        let removed = self.entries_mut(guild_id).await.len();
        self.guilds.remove(&guild_id);

        let path = self.file_path(guild_id);
        if fs::try_exists(&path).await.unwrap_or(false) {
            fs::remove_file(&path).await?;
        }

        info!("🗑️ Historial borrado en guild {} ({} entradas)", guild_id, removed);
        Ok(removed)
    }

    /// Obtiene estadísticas de almacenamiento
    pub async fn stats(&self) -> Result<StorageStats> {
        let mut files = fs::read_dir(&self.history_dir).await?;
        let mut guilds = 0;
        let mut total_size = 0;

        while let Some(entry) = files.next_entry().await? {
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                guilds += 1;
                if let Ok(metadata) = entry.metadata().await {
                    total_size += metadata.len();
                }
            }
        }

        Ok(StorageStats {
            guilds,
            cached_guilds: self.guilds.len(),
            entries: self.guilds.values().map(Vec::len).sum(),
            total_size_bytes: total_size,
            history_dir: self.history_dir.clone(),
        })
    }

    // Métodos privados

    async fn entries_mut(&mut self, guild_id: u64) -> &mut Vec<HistoryEntry> {
        if !self.guilds.contains_key(&guild_id) {
            let loaded = match self.load(guild_id).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Error cargando historial para guild {}: {}", guild_id, e);
                    Vec::new()
                }
            };
            self.guilds.insert(guild_id, loaded);
        }
        self.guilds.entry(guild_id).or_default()
    }

    async fn load(&self, guild_id: u64) -> Result<Vec<HistoryEntry>> {
        let path = self.file_path(guild_id);
        if !fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn save(&self, guild_id: u64) -> Result<()> {
        let Some(entries) = self.guilds.get(&guild_id) else {
            return Ok(());
        };
        let content = serde_json::to_string_pretty(entries)?;
        fs::write(self.file_path(guild_id), content).await?;
        Ok(())
    }

    fn file_path(&self, guild_id: u64) -> PathBuf {
        self.history_dir.join(format!("guild_{}.json", guild_id))
    }
}

/// Estadísticas de almacenamiento
#[derive(Debug)]
pub struct StorageStats {
    pub guilds: usize,
    pub cached_guilds: usize,
    pub entries: usize,
    pub total_size_bytes: u64,
    pub history_dir: PathBuf,
}

impl std::fmt::Display for StorageStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "📊 Storage Stats:\n\
             📁 History Directory: {}\n\
             📝 Guilds: {} files ({} in memory)\n\
             🎵 Entries in memory: {}\n\
             📦 Total Size: {} bytes ({:.2} KB)",
            self.history_dir.display(),
            self.guilds,
            self.cached_guilds,
            self.entries,
            self.total_size_bytes,
            self.total_size_bytes as f64 / 1024.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serenity::model::id::UserId;

    fn track(n: usize) -> TrackSource {
        TrackSource::new(
            format!("Song {n}"),
            format!("https://youtu.be/{n:011}"),
            SourceType::YouTube,
        )
    }

    #[tokio::test]
    async fn replays_increment_plays_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = HistoryStorage::new(dir.path().to_path_buf()).await.unwrap();

        let song = track(1).with_requested_by(UserId::new(42));
        storage.record(7, &song).await.unwrap();
        storage.record(7, &song).await.unwrap();
        storage.record(7, &track(2)).await.unwrap();

        // Una instancia nueva lee lo guardado en disco
        let mut reopened = HistoryStorage::new(dir.path().to_path_buf()).await.unwrap();
        let top = reopened.top(7, 10).await;
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].title, "Song 1");
        assert_eq!(top[0].plays, 2);
        assert_eq!(top[0].requested_by, Some(42));
        assert!(dir.path().join("history/guild_7.json").exists());
    }

    #[tokio::test]
    async fn recent_orders_by_last_play() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = HistoryStorage::new(dir.path().to_path_buf()).await.unwrap();
        let start = Utc::now();

        storage.record_at(1, &track(1), start).await.unwrap();
        storage.record_at(1, &track(2), start + Duration::seconds(1)).await.unwrap();
        storage.record_at(1, &track(1), start + Duration::seconds(2)).await.unwrap();

        let recent: Vec<_> = storage.recent(1, 5).await.into_iter().map(|e| e.title).collect();
        assert_eq!(recent, vec!["Song 1", "Song 2"]);
    }

    #[tokio::test]
    async fn history_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = HistoryStorage::new(dir.path().to_path_buf()).await.unwrap();
        let start = Utc::now();

        for n in 0..=MAX_HISTORY_ENTRIES {
            storage
                .record_at(1, &track(n), start + Duration::seconds(n as i64))
                .await
                .unwrap();
        }

        let entries = storage.recent(1, usize::MAX).await;
        assert_eq!(entries.len(), MAX_HISTORY_ENTRIES);
        assert!(entries.iter().all(|e| e.title != "Song 0"));
    }

    #[tokio::test]
    async fn clear_removes_file_and_guilds_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = HistoryStorage::new(dir.path().to_path_buf()).await.unwrap();

        storage.record(1, &track(1)).await.unwrap();
        storage.record(2, &track(2)).await.unwrap();

        assert_eq!(storage.clear(1).await.unwrap(), 1);
        assert!(storage.recent(1, 10).await.is_empty());
        assert_eq!(storage.recent(2, 10).await.len(), 1);

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.guilds, 1);
    }
}
