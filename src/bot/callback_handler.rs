//! Callback Handler module for processing inline keyboard callback queries

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::debug;

use crate::commands::CallbackAction;
use crate::photo_cache::PhotoCache;
use crate::session_manager::SessionManager;

use super::requester;
use super::screen_sender::{delete_previous, replaces_previous, send_screens, ScreenContext};

/// Handle callback queries from inline keyboards
pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    manager: Arc<SessionManager>,
    photos: Arc<PhotoCache>,
) -> Result<()> {
    debug!(user_id = %q.from.id, "Received callback query from user");

    // Answer first so the button stops spinning even if rendering fails
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(msg) = q.message.as_ref() else {
        debug!(user_id = %q.from.id, "Callback query without message ignored");
        return Ok(());
    };
    let chat_id = msg.chat().id;

    let Some(action) = q.data.as_deref().and_then(CallbackAction::parse) else {
        debug!(user_id = %q.from.id, data = ?q.data, "Unknown callback data ignored");
        return Ok(());
    };

    let who = requester(chat_id, Some(&q.from));
    let screens = manager.handle_callback(&who, action).await;

    if replaces_previous(&screens) {
        delete_previous(&bot, chat_id, msg.id()).await;
    }

    let ctx = ScreenContext {
        chat_id,
        language_code: Some(who.language.as_str()),
        photos: &photos,
        limits: manager.limits(),
    };
    send_screens(&bot, &ctx, screens).await
}
