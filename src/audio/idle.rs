//! Per-guild idle disconnect timers.
//!
//! A timer is armed when the bot is left alone in its voice channel or when
//! the queue runs dry. When it fires the callback destroys the queue and
//! leaves the channel; any activity before that cancels it.

use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::GuildId;
use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    /// No quedan personas en el canal de voz
    Alone,
    /// La cola terminó y nadie agregó más canciones
    QueueEnded,
}

#[derive(Debug)]
struct IdleTimer {
    id: u64,
    reason: IdleReason,
    token: CancellationToken,
}

pub struct IdleTimers {
    timers: Arc<DashMap<GuildId, IdleTimer>>,
    timeout: Duration,
    next_id: AtomicU64,
}

impl IdleTimers {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timers: Arc::new(DashMap::new()),
            timeout,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Arma el temporizador del guild. Si ya hay uno armado no se reinicia
    /// y devuelve `false`.
    pub fn arm<F>(&self, guild_id: GuildId, reason: IdleReason, on_expire: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        match self.timers.entry(guild_id) {
            Entry::Occupied(existing) => {
                debug!(
                    "⏲️ Temporizador ya armado en guild {} ({:?})",
                    guild_id,
                    existing.get().reason
                );
                return false;
            }
            Entry::Vacant(slot) => {
                slot.insert(IdleTimer {
                    id,
                    reason,
                    token: token.clone(),
                });
            }
        }

        debug!("⏲️ Temporizador armado en guild {} ({:?})", guild_id, reason);
        let timers = self.timers.clone();
        let timeout = self.timeout;

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    // Solo dispara si sigue siendo el temporizador vigente
                    if timers.remove_if(&guild_id, |_, timer| timer.id == id).is_some() {
                        info!("💤 Inactividad en guild {} ({:?}), desconectando", guild_id, reason);
                        on_expire.await;
                    }
                }
            }
        });

        true
    }

    pub fn cancel(&self, guild_id: GuildId) -> bool {
        match self.timers.remove(&guild_id) {
            Some((_, timer)) => {
                timer.token.cancel();
                debug!("⏲️ Temporizador cancelado en guild {}", guild_id);
                true
            }
            None => false,
        }
    }

    /// Cancela solo si el temporizador se armó por `reason`
    pub fn cancel_if(&self, guild_id: GuildId, reason: IdleReason) -> bool {
        match self.timers.remove_if(&guild_id, |_, timer| timer.reason == reason) {
            Some((_, timer)) => {
                timer.token.cancel();
                debug!("⏲️ Temporizador {:?} cancelado en guild {}", reason, guild_id);
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, guild_id: GuildId) -> bool {
        self.timers.contains_key(&guild_id)
    }

    pub fn reason(&self, guild_id: GuildId) -> Option<IdleReason> {
        self.timers.get(&guild_id).map(|timer| timer.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn guild() -> GuildId {
        GuildId::new(1)
    }

    fn flag() -> (Arc<AtomicBool>, impl Future<Output = ()> + Send + 'static) {
        let fired = Arc::new(AtomicBool::new(false));
        let setter = fired.clone();
        (fired, async move { setter.store(true, Ordering::SeqCst) })
    }

    async fn wait(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
        // Deja correr la tarea del temporizador
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_timeout() {
        let timers = IdleTimers::new(Duration::from_secs(300));
        let (fired, on_expire) = flag();

        assert!(timers.arm(guild(), IdleReason::Alone, on_expire));
        wait(299).await;
        assert!(!fired.load(Ordering::SeqCst));

        wait(2).await;
        assert!(fired.load(Ordering::SeqCst));
        assert!(!timers.is_armed(guild()));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let timers = IdleTimers::new(Duration::from_secs(10));
        let (fired, on_expire) = flag();

        timers.arm(guild(), IdleReason::QueueEnded, on_expire);
        assert!(timers.cancel(guild()));
        assert!(!timers.cancel(guild()));

        wait(20).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn arming_twice_keeps_the_first_timer() {
        let timers = IdleTimers::new(Duration::from_secs(10));
        let (first, first_expire) = flag();
        let (second, second_expire) = flag();

        assert!(timers.arm(guild(), IdleReason::QueueEnded, first_expire));
        wait(5).await;
        assert!(!timers.arm(guild(), IdleReason::Alone, second_expire));
        assert_eq!(timers.reason(guild()), Some(IdleReason::QueueEnded));

        wait(6).await;
        assert!(first.load(Ordering::SeqCst));
        assert!(!second.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_if_matches_reason() {
        let timers = IdleTimers::new(Duration::from_secs(10));
        let (_, on_expire) = flag();

        timers.arm(guild(), IdleReason::QueueEnded, on_expire);
        assert!(!timers.cancel_if(guild(), IdleReason::Alone));
        assert!(timers.is_armed(guild()));
        assert!(timers.cancel_if(guild(), IdleReason::QueueEnded));
        assert!(!timers.is_armed(guild()));
    }
}
