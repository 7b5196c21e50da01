//! Typed user events.
//!
//! Raw chat text and inline-button payloads are parsed here once; the session
//! manager only ever sees [`UserEvent`] and [`CallbackAction`] values.

use crate::localization::t_all;
use crate::session::SortOrder;

/// Telegram limits callback data to 64 bytes
pub const MAX_CALLBACK_DATA: usize = 64;

const REPLAY_PREFIX: &str = "h:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    MainMenu,
    Help,
    About,
    History,
    Favorites,
    /// Sorted search, asks for the order first
    Custom,
    /// Single random result
    Low,
    /// Maximal result set
    High,
    Sort(SortOrder),
}

impl Command {
    /// Parse a slash command (`/start`, `/low@my_bot`) or a reply keyboard label
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if let Some(rest) = trimmed.strip_prefix('/') {
            let name = rest
                .split(|c: char| c == '@' || c.is_whitespace())
                .next()
                .unwrap_or_default()
                .to_lowercase();
            return Self::from_slash(&name);
        }
        Self::from_label(trimmed)
    }

    fn from_slash(name: &str) -> Option<Self> {
        match name {
            "start" => Some(Command::Start),
            "help" => Some(Command::Help),
            "about" => Some(Command::About),
            "history" => Some(Command::History),
            "favorite" | "favorites" => Some(Command::Favorites),
            "custom" => Some(Command::Custom),
            "low" => Some(Command::Low),
            "high" => Some(Command::High),
            _ => None,
        }
    }

    fn from_label(text: &str) -> Option<Self> {
        let wanted = text.to_lowercase();
        Self::LABELS.iter().find_map(|(key, command)| {
            t_all(key)
                .iter()
                .any(|label| label.to_lowercase() == wanted)
                .then_some(*command)
        })
    }

    /// Localization keys of the reply keyboard buttons
    const LABELS: [(&'static str, Command); 13] = [
        ("button-main-menu", Command::MainMenu),
        ("button-return-main", Command::MainMenu),
        ("button-about", Command::About),
        ("button-custom", Command::Custom),
        ("button-low", Command::Low),
        ("button-high", Command::High),
        ("button-help", Command::Help),
        ("button-history", Command::History),
        ("button-favorites", Command::Favorites),
        ("button-sort-none", Command::Sort(SortOrder::Unsorted)),
        ("button-sort-desc", Command::Sort(SortOrder::Descending)),
        ("button-sort-asc", Command::Sort(SortOrder::Ascending)),
        ("main-menu", Command::MainMenu),
    ];
}

/// Inbound chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserEvent {
    Command(Command),
    Text(String),
}

impl UserEvent {
    pub fn from_text(text: &str) -> Self {
        match Command::parse(text) {
            Some(command) => UserEvent::Command(command),
            None => UserEvent::Text(text.to_string()),
        }
    }
}

/// Inline button payloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Next,
    Back,
    FavoriteAdd,
    FavoriteRemove,
    ReturnMain,
    NextFavorite,
    BackFavorite,
    RemoveFavorite,
    /// Repeat a search from the history menu; the mode and query are read
    /// back from the history row so long queries survive the data limit
    Replay { entry_id: i64 },
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        let action = match data {
            "next" => CallbackAction::Next,
            "back" => CallbackAction::Back,
            "fav_add" => CallbackAction::FavoriteAdd,
            "fav_remove" => CallbackAction::FavoriteRemove,
            "main" => CallbackAction::ReturnMain,
            "saved_next" => CallbackAction::NextFavorite,
            "saved_back" => CallbackAction::BackFavorite,
            "saved_remove" => CallbackAction::RemoveFavorite,
            other => CallbackAction::Replay {
                entry_id: other.strip_prefix(REPLAY_PREFIX)?.parse().ok()?,
            },
        };
        Some(action)
    }

    /// Encoded payload
    pub fn to_data(&self) -> String {
        match self {
            CallbackAction::Next => "next".to_string(),
            CallbackAction::Back => "back".to_string(),
            CallbackAction::FavoriteAdd => "fav_add".to_string(),
            CallbackAction::FavoriteRemove => "fav_remove".to_string(),
            CallbackAction::ReturnMain => "main".to_string(),
            CallbackAction::NextFavorite => "saved_next".to_string(),
            CallbackAction::BackFavorite => "saved_back".to_string(),
            CallbackAction::RemoveFavorite => "saved_remove".to_string(),
            CallbackAction::Replay { entry_id } => format!("{REPLAY_PREFIX}{entry_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slash_commands() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/low@product_bot"), Some(Command::Low));
        assert_eq!(Command::parse(" /HIGH "), Some(Command::High));
        assert_eq!(Command::parse("/favorite"), Some(Command::Favorites));
        assert_eq!(Command::parse("/unknown"), None);
    }

    #[test]
    fn test_labels_in_every_language() {
        assert_eq!(Command::parse("Главное меню"), Some(Command::MainMenu));
        assert_eq!(Command::parse("История 📝"), Some(Command::History));
        assert_eq!(Command::parse("history 📝"), Some(Command::History));
        assert_eq!(
            Command::parse("Сортировать по возрастанию цены 📈"),
            Some(Command::Sort(SortOrder::Ascending))
        );
        assert_eq!(Command::parse("смартфон"), None);
    }

    #[test]
    fn test_user_event_keeps_free_text() {
        assert_eq!(
            UserEvent::from_text("ноутбук"),
            UserEvent::Text("ноутбук".to_string())
        );
        assert_eq!(UserEvent::from_text("/start"), UserEvent::Command(Command::Start));
    }

    #[test]
    fn test_callback_round_trip() {
        let actions = [
            CallbackAction::Next,
            CallbackAction::Back,
            CallbackAction::FavoriteAdd,
            CallbackAction::FavoriteRemove,
            CallbackAction::ReturnMain,
            CallbackAction::NextFavorite,
            CallbackAction::BackFavorite,
            CallbackAction::RemoveFavorite,
            CallbackAction::Replay { entry_id: 42 },
        ];
        for action in actions {
            assert_eq!(CallbackAction::parse(&action.to_data()), Some(action));
        }
    }

    #[test]
    fn test_replay_data_fits_limit() {
        let action = CallbackAction::Replay { entry_id: i64::MAX };
        let data = action.to_data();
        assert!(data.len() <= MAX_CALLBACK_DATA);
        assert_eq!(CallbackAction::parse(&data), Some(action));
    }

    #[test]
    fn test_unknown_callback() {
        assert_eq!(CallbackAction::parse("h:up:phone"), None);
        assert_eq!(CallbackAction::parse("h:"), None);
        assert_eq!(CallbackAction::parse("garbage"), None);
    }
}
