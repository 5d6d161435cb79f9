//! Chat rendering: embeds for every reply the bot posts and the message
//! components (player buttons, search menu) attached to them.

pub mod buttons;
pub mod embeds;
