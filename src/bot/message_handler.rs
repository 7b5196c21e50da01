//! Message Handler module for processing incoming Telegram messages

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::debug;

use crate::commands::UserEvent;
use crate::photo_cache::PhotoCache;
use crate::session_manager::{Screen, SessionManager};

use super::requester;
use super::screen_sender::{send_screens, ScreenContext};

/// Handle text messages; anything else gets the main menu back
pub async fn message_handler(
    bot: Bot,
    msg: Message,
    manager: Arc<SessionManager>,
    photos: Arc<PhotoCache>,
) -> Result<()> {
    let who = requester(msg.chat.id, msg.from.as_ref());
    let screens = match msg.text() {
        Some(text) => {
            debug!(user_id = %msg.chat.id, "Received text message from user");
            manager.handle_message(&who, UserEvent::from_text(text)).await
        }
        None => {
            debug!(user_id = %msg.chat.id, "Received unsupported message type from user");
            vec![Screen::Unrecognized, Screen::MainMenu]
        }
    };

    let ctx = ScreenContext {
        chat_id: msg.chat.id,
        language_code: Some(who.language.as_str()),
        photos: &photos,
        limits: manager.limits(),
    };
    send_screens(&bot, &ctx, screens).await
}
