//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `message_handler`: Handles incoming chat messages
//! - `callback_handler`: Handles inline keyboard callback queries
//! - `ui_builder`: Creates keyboards
//! - `screen_sender`: Sends session manager screens to the chat

pub mod callback_handler;
pub mod message_handler;
pub mod screen_sender;
pub mod ui_builder;

use teloxide::types::{ChatId, User};

use crate::ledger::UserProfile;
use crate::localization::detect_language;
use crate::session_manager::Requester;

// Re-export main handler functions for use in main.rs
pub use callback_handler::callback_handler;
pub use message_handler::message_handler;

/// Identify the sender of an update
pub fn requester(chat_id: ChatId, user: Option<&User>) -> Requester {
    let profile = match user {
        Some(user) => UserProfile::new(
            user.id.0 as i64,
            user.full_name(),
            user.username.as_deref(),
        ),
        None => UserProfile::new(chat_id.0, String::new(), None),
    };
    let language = detect_language(user.and_then(|u| u.language_code.as_deref()));
    Requester {
        chat_id: chat_id.0,
        user: profile,
        language,
    }
}
