//! # Audio Module
//!
//! Per-guild playback: queue state machine, idle timers, the external
//! transcoder and the songbird-facing player.
//!
//! ### [`queue`] - Queue Management
//! - Track ordering, loop modes (`off`, `song`, `songs`) and radio mode
//! - Playback status machine and crash counter
//! - History of finished tracks
//!
//! ### [`idle`] - Idle Disconnect
//! - Cancellable per-guild timers armed when the bot is alone or the queue ends
//!
//! ### [`transcoder`] - External Processes
//! - `ffmpeg` turns remote audio into 48 kHz stereo WAV for songbird
//! - `ffprobe` reads duration and tags of direct files
//!
//! ### [`player`] - Audio Player
//! - Owns queues, voice calls and track handles (one of each per guild)
//! - Reacts to songbird track events and emits [`player::PlayerEvent`]s
//!
//! ## Audio Quality
//!
//! - **Sample Rate**: 48kHz (Discord standard)
//! - **Channels**: Stereo (2 channels)
//! - **Encoding**: Opus, done by songbird

pub mod idle;
pub mod player;
pub mod queue;
pub mod transcoder;
