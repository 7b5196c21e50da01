//! UI Builder module for creating keyboards

use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup, KeyboardRemove,
};
use tracing::debug;

// Import localization
use crate::localization::t_lang;

use crate::commands::CallbackAction;
use crate::session_manager::{FavoriteView, HistoryItem, ResultView};

/// Reply keyboard of the main menu
pub fn main_menu_keyboard(language_code: Option<&str>) -> KeyboardMarkup {
    let label = |key: &str| KeyboardButton::new(t_lang(key, language_code));
    KeyboardMarkup::new(vec![
        vec![label("button-custom")],
        vec![label("button-low"), label("button-high")],
        vec![label("button-history"), label("button-favorites")],
        vec![label("button-help"), label("button-about")],
    ])
    .resize_keyboard()
}

/// Reply keyboard offering the three sort orders
pub fn sort_keyboard(language_code: Option<&str>) -> KeyboardMarkup {
    let label = |key: &str| KeyboardButton::new(t_lang(key, language_code));
    KeyboardMarkup::new(vec![
        vec![label("button-sort-none")],
        vec![label("button-sort-asc"), label("button-sort-desc")],
        vec![label("button-main-menu")],
    ])
    .resize_keyboard()
}

/// Single "main menu" button shown under help texts
pub fn return_keyboard(language_code: Option<&str>) -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![KeyboardButton::new(t_lang(
        "button-main-menu",
        language_code,
    ))]])
    .resize_keyboard()
}

/// Hide the reply keyboard while the user types a query
pub fn query_keyboard() -> KeyboardRemove {
    KeyboardRemove::new()
}

fn callback(text: String, action: CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text, action.to_data())
}

fn navigation_row(
    has_prev: bool,
    has_next: bool,
    back: CallbackAction,
    next: CallbackAction,
    language_code: Option<&str>,
) -> Vec<InlineKeyboardButton> {
    let mut row = Vec::new();
    if has_prev {
        row.push(callback(t_lang("button-back", language_code), back));
    }
    if has_next {
        row.push(callback(t_lang("button-next", language_code), next));
    }
    row
}

fn offer_row(offer_url: &str, language_code: Option<&str>) -> Option<Vec<InlineKeyboardButton>> {
    match reqwest::Url::parse(offer_url) {
        Ok(url) => Some(vec![InlineKeyboardButton::url(
            t_lang("button-offer", language_code),
            url,
        )]),
        Err(e) => {
            debug!(offer_url, error = %e, "Offer link is not a valid URL");
            None
        }
    }
}

/// Inline keyboard under a browsed search result
pub fn result_keyboard(view: &ResultView, language_code: Option<&str>) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();

    let navigation = navigation_row(
        view.has_prev,
        view.has_next,
        CallbackAction::Back,
        CallbackAction::Next,
        language_code,
    );
    if !navigation.is_empty() {
        rows.push(navigation);
    }
    if let Some(row) = offer_row(&view.offer_url, language_code) {
        rows.push(row);
    }
    let toggle = if view.is_favorite {
        callback(
            t_lang("button-favorite-remove", language_code),
            CallbackAction::FavoriteRemove,
        )
    } else {
        callback(
            t_lang("button-favorite-add", language_code),
            CallbackAction::FavoriteAdd,
        )
    };
    rows.push(vec![toggle]);
    rows.push(vec![callback(
        t_lang("button-return-main", language_code),
        CallbackAction::ReturnMain,
    )]);

    InlineKeyboardMarkup::new(rows)
}

/// Inline keyboard under a browsed favorite; the remove button disappears
/// once the item was removed
pub fn favorite_keyboard(view: &FavoriteView, language_code: Option<&str>) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();

    let navigation = navigation_row(
        view.has_prev,
        view.has_next,
        CallbackAction::BackFavorite,
        CallbackAction::NextFavorite,
        language_code,
    );
    if !navigation.is_empty() {
        rows.push(navigation);
    }
    if let Some(row) = offer_row(&view.offer_url, language_code) {
        rows.push(row);
    }
    if !view.removed {
        rows.push(vec![callback(
            t_lang("button-favorite-remove", language_code),
            CallbackAction::RemoveFavorite,
        )]);
    }
    rows.push(vec![callback(
        t_lang("button-return-main", language_code),
        CallbackAction::ReturnMain,
    )]);

    InlineKeyboardMarkup::new(rows)
}

/// One button per history entry, e.g. "📈 смартфон"
pub fn history_keyboard(items: &[HistoryItem]) -> InlineKeyboardMarkup {
    let rows = items
        .iter()
        .map(|item| {
            vec![callback(
                format!("{} {}", item.tag.glyph(), item.query),
                CallbackAction::Replay {
                    entry_id: item.entry_id,
                },
            )]
        })
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(rows)
}
