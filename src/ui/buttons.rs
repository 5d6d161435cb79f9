use serenity::{
    all::ButtonStyle,
    builder::{
        CreateActionRow, CreateButton, CreateSelectMenu, CreateSelectMenuKind,
        CreateSelectMenuOption,
    },
};

use crate::{audio::queue::LoopMode, sources::TrackSource, ui::embeds::format_duration};

/// IDs personalizados para los componentes
pub mod button_ids {
    pub const PLAY_PAUSE: &str = "player_pause";
    pub const SKIP: &str = "player_skip";
    pub const STOP: &str = "player_stop";
    pub const SHUFFLE: &str = "player_shuffle";
    pub const LOOP: &str = "player_loop";
    pub const QUEUE: &str = "player_queue";

    /// Menú de resultados de `/search`
    pub const TRACK_SELECTION: &str = "track_selection";
}

/// Discord limita las etiquetas del menú a 100 caracteres
const MAX_LABEL: usize = 100;
const MAX_DESCRIPTION: usize = 100;

/// Controles del mensaje "reproduciendo ahora"
pub fn player_controls(paused: bool, loop_mode: LoopMode, radio: bool) -> Vec<CreateActionRow> {
    let play_pause = CreateButton::new(button_ids::PLAY_PAUSE)
        .emoji(if paused { '▶' } else { '⏸' })
        .style(if paused {
            ButtonStyle::Success
        } else {
            ButtonStyle::Primary
        });

    let skip = CreateButton::new(button_ids::SKIP)
        .emoji('⏭')
        .style(ButtonStyle::Secondary)
        .disabled(radio);

    let stop = CreateButton::new(button_ids::STOP)
        .emoji('⏹')
        .style(ButtonStyle::Danger);

    let shuffle = CreateButton::new(button_ids::SHUFFLE)
        .emoji('🔀')
        .style(ButtonStyle::Secondary)
        .disabled(radio);

    let loop_button = CreateButton::new(button_ids::LOOP)
        .emoji(if loop_mode == LoopMode::Song { '🔂' } else { '🔁' })
        .style(if loop_mode == LoopMode::Off {
            ButtonStyle::Secondary
        } else {
            ButtonStyle::Success
        })
        .disabled(radio);

    let queue = CreateButton::new(button_ids::QUEUE)
        .label("Cola")
        .emoji('📋')
        .style(ButtonStyle::Secondary);

    vec![
        CreateActionRow::Buttons(vec![play_pause, skip, stop, shuffle, loop_button]),
        CreateActionRow::Buttons(vec![queue]),
    ]
}

/// Siguiente modo al pulsar el botón de repetición
pub fn next_loop_mode(mode: LoopMode) -> LoopMode {
    match mode {
        LoopMode::Off => LoopMode::Songs,
        LoopMode::Songs => LoopMode::Song,
        LoopMode::Song => LoopMode::Off,
    }
}

/// Menú de selección para los resultados de búsqueda
pub fn search_menu(tracks: &[TrackSource]) -> CreateActionRow {
    let options = tracks
        .iter()
        .enumerate()
        .map(|(i, track)| {
            let duration = track
                .duration()
                .map(|d| format!(" [{}]", format_duration(d)))
                .unwrap_or_default();
            let label = truncate(&format!("{}{}", track.title(), duration), MAX_LABEL);
            let description = truncate(
                &format!(
                    "{} • {}",
                    track.source_type().display_name(),
                    track.artist().unwrap_or_else(|| "Desconocido".to_string())
                ),
                MAX_DESCRIPTION,
            );

            CreateSelectMenuOption::new(label, selection_value(i)).description(description)
        })
        .collect();

    CreateActionRow::SelectMenu(
        CreateSelectMenu::new(button_ids::TRACK_SELECTION, CreateSelectMenuKind::String { options })
            .placeholder("Selecciona una canción para reproducir...")
            .min_values(1)
            .max_values(1),
    )
}

pub fn selection_value(index: usize) -> String {
    format!("track_{}", index)
}

/// Índice elegido en el menú (`track_3` → 3)
pub fn parse_selection(value: &str) -> Option<usize> {
    value.strip_prefix("track_")?.parse().ok()
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max - 3).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceType;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn selection_values_round_trip_through_parse() {
        assert_eq!(parse_selection(&selection_value(4)), Some(4));
        assert_eq!(parse_selection("track_x"), None);
        assert_eq!(parse_selection("player_skip"), None);
    }

    #[test]
    fn long_titles_are_cut_on_char_boundaries() {
        let title = "ñ".repeat(150);
        let cut = truncate(&title, MAX_LABEL);
        assert_eq!(cut.chars().count(), MAX_LABEL);
        assert!(cut.ends_with("..."));
        assert_eq!(truncate("corto", MAX_LABEL), "corto");
    }

    #[test]
    fn loop_button_cycles_all_modes() {
        let mut mode = LoopMode::Off;
        let mut seen = Vec::new();
        for _ in 0..3 {
            mode = next_loop_mode(mode);
            seen.push(mode);
        }
        assert_eq!(seen, vec![LoopMode::Songs, LoopMode::Song, LoopMode::Off]);
    }

    #[test]
    fn search_menu_has_one_option_per_track() {
        let tracks: Vec<_> = (0..3)
            .map(|n| {
                TrackSource::new(format!("t{n}"), format!("https://youtu.be/{n}"), SourceType::YouTube)
                    .with_duration(Duration::from_secs(61))
            })
            .collect();

        let menu = serde_json::to_value(search_menu(&tracks)).unwrap();
        let options = menu["components"][0]["options"].as_array().unwrap();
        assert_eq!(options.len(), 3);
        assert_eq!(options[2]["value"], "track_2");
        assert_eq!(options[0]["label"], "t0 [1:01]");
    }
}
