//! Screen Sender module: turns [`Screen`]s into Telegram messages

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId, ReplyMarkup};
use tracing::{debug, warn};

use crate::config::PaginationLimits;
use crate::localization::{t_args_lang, t_lang};
use crate::photo_cache::PhotoCache;
use crate::session_manager::Screen;

use super::ui_builder::{
    favorite_keyboard, history_keyboard, main_menu_keyboard, query_keyboard, result_keyboard,
    return_keyboard, sort_keyboard,
};

/// Everything a screen needs besides the screen itself
pub struct ScreenContext<'a> {
    pub chat_id: ChatId,
    pub language_code: Option<&'a str>,
    pub photos: &'a PhotoCache,
    pub limits: &'a PaginationLimits,
}

/// Whether the message carrying the pressed button should be replaced
pub fn replaces_previous(screens: &[Screen]) -> bool {
    screens
        .iter()
        .any(|screen| matches!(screen, Screen::Result(_) | Screen::Favorite(_)))
}

/// Delete a message; a message that is already gone is only worth a debug line
pub async fn delete_previous(bot: &Bot, chat_id: ChatId, message_id: MessageId) {
    if let Err(e) = bot.delete_message(chat_id, message_id).await {
        debug!(user_id = %chat_id, error = %e, "Previous message could not be deleted");
    }
}

/// Send screens in order
pub async fn send_screens(bot: &Bot, ctx: &ScreenContext<'_>, screens: Vec<Screen>) -> Result<()> {
    for screen in screens {
        send_screen(bot, ctx, screen).await?;
    }
    Ok(())
}

async fn send_screen(bot: &Bot, ctx: &ScreenContext<'_>, screen: Screen) -> Result<()> {
    let lang = ctx.language_code;
    let chat_id = ctx.chat_id;

    match screen {
        Screen::Welcome { name } => {
            bot.send_message(chat_id, t_args_lang("welcome", &[("name", &name)], lang))
                .await?;
        }
        Screen::MainMenu => {
            bot.send_message(chat_id, t_lang("main-menu", lang))
                .reply_markup(main_menu_keyboard(lang))
                .await?;
        }
        Screen::Help => {
            bot.send_message(chat_id, t_lang("help", lang)).await?;
            bot.send_message(chat_id, t_lang("help-return", lang))
                .reply_markup(return_keyboard(lang))
                .await?;
        }
        Screen::About => {
            let history_cap = ctx.limits.history_cap.to_string();
            let favorites_cap = ctx.limits.favorites_cap.to_string();
            let about = t_args_lang(
                "about",
                &[("history_cap", &history_cap), ("favorites_cap", &favorites_cap)],
                lang,
            );
            bot.send_message(chat_id, about)
                .reply_markup(return_keyboard(lang))
                .await?;
        }
        Screen::SortPrompt => {
            bot.send_message(chat_id, t_lang("choose-sort", lang))
                .reply_markup(sort_keyboard(lang))
                .await?;
        }
        Screen::QueryPrompt => {
            bot.send_message(chat_id, t_lang("query-prompt", lang))
                .reply_markup(query_keyboard())
                .await?;
        }
        Screen::Searching => {
            bot.send_message(chat_id, t_lang("searching", lang)).await?;
        }
        Screen::InvalidQuery => {
            bot.send_message(chat_id, t_lang("invalid-query", lang)).await?;
        }
        Screen::SearchFailed => {
            bot.send_message(chat_id, t_lang("search-failed", lang)).await?;
        }
        Screen::NoData => {
            bot.send_message(chat_id, t_lang("no-data", lang)).await?;
        }
        Screen::Unrecognized => {
            bot.send_message(chat_id, t_lang("unrecognized", lang)).await?;
        }
        Screen::History(items) => {
            bot.send_message(chat_id, t_lang("history-title", lang))
                .reply_markup(history_keyboard(&items))
                .await?;
        }
        Screen::Result(view) => {
            let keyboard = result_keyboard(&view, lang);
            send_card(bot, ctx, &view.caption, view.photo_url.as_deref(), keyboard.into()).await?;
        }
        Screen::Favorite(view) => {
            let keyboard = favorite_keyboard(&view, lang);
            send_card(bot, ctx, &view.caption, view.photo_url.as_deref(), keyboard.into()).await?;
        }
    }
    Ok(())
}

/// Photo with caption, or the caption alone when no photo can be shown
async fn send_card(
    bot: &Bot,
    ctx: &ScreenContext<'_>,
    caption: &str,
    photo_url: Option<&str>,
    keyboard: ReplyMarkup,
) -> Result<()> {
    if let Some(url) = photo_url {
        match ctx.photos.get_or_download(caption, url).await {
            Ok(bytes) => {
                bot.send_photo(ctx.chat_id, InputFile::memory(bytes.as_ref().clone()))
                    .caption(caption)
                    .reply_markup(keyboard)
                    .await?;
                return Ok(());
            }
            Err(e) => {
                warn!(user_id = %ctx.chat_id, url, error = %e, "Photo unavailable, sending text only");
            }
        }
    }
    bot.send_message(ctx.chat_id, caption)
        .reply_markup(keyboard)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_manager::{HistoryItem, ResultView};
    use crate::session::MethodTag;

    fn result() -> Screen {
        Screen::Result(ResultView {
            caption: "x".to_string(),
            photo_url: None,
            offer_url: "https://shop/1".to_string(),
            is_favorite: false,
            has_prev: false,
            has_next: true,
        })
    }

    #[test]
    fn test_replaces_previous_only_for_cards() {
        assert!(replaces_previous(&[Screen::Searching, result()]));
        assert!(!replaces_previous(&[Screen::NoData, Screen::MainMenu]));
        assert!(!replaces_previous(&[Screen::History(vec![HistoryItem {
            entry_id: 1,
            tag: MethodTag::Single,
            query: "phone".to_string(),
        }])]));
    }
}
