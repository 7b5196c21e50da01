//! # Session Manager
//!
//! Drives the per-chat state machine. Each inbound event is handled in three
//! steps: mutate the session, persist ledger changes, then describe what to
//! show as a list of [`Screen`]s. Emitting screens to Telegram is left to
//! [`crate::bot`].

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::commands::{CallbackAction, Command, UserEvent};
use crate::config::PaginationLimits;
use crate::fetcher::{FetchOrchestrator, SearchRequest};
use crate::ledger::{Ledger, NewFavorite, UserProfile};
use crate::localization::{get_localization_manager, DEFAULT_LANGUAGE};
use crate::product::ProductRecord;
use crate::session::{
    check_query, shape_results, MethodTag, Phase, QueryCheck, SearchMode, SessionId, SessionState,
    SessionStore,
};

/// Who sent an event and where to answer
#[derive(Debug, Clone)]
pub struct Requester {
    pub chat_id: SessionId,
    pub user: UserProfile,
    /// Supported language code, see [`crate::localization::detect_language`]
    pub language: String,
}

/// One browsed search result
#[derive(Debug, Clone, PartialEq)]
pub struct ResultView {
    /// Description followed by the position line
    pub caption: String,
    pub photo_url: Option<String>,
    pub offer_url: String,
    pub is_favorite: bool,
    pub has_prev: bool,
    pub has_next: bool,
}

/// One browsed favorite
#[derive(Debug, Clone, PartialEq)]
pub struct FavoriteView {
    pub caption: String,
    pub photo_url: Option<String>,
    pub offer_url: String,
    /// Removed during this browsing session
    pub removed: bool,
    pub has_prev: bool,
    pub has_next: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryItem {
    /// Ledger row the replay button points at
    pub entry_id: i64,
    pub tag: MethodTag,
    pub query: String,
}

/// What the chat should show next
#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    Welcome { name: String },
    MainMenu,
    Help,
    About,
    SortPrompt,
    QueryPrompt,
    Searching,
    InvalidQuery,
    SearchFailed,
    Result(ResultView),
    Favorite(FavoriteView),
    History(Vec<HistoryItem>),
    NoData,
    Unrecognized,
}

pub struct SessionManager {
    fetcher: Arc<FetchOrchestrator>,
    sessions: Arc<dyn SessionStore>,
    ledger: Arc<dyn Ledger>,
    limits: PaginationLimits,
}

impl SessionManager {
    pub fn new(
        fetcher: Arc<FetchOrchestrator>,
        sessions: Arc<dyn SessionStore>,
        ledger: Arc<dyn Ledger>,
        limits: PaginationLimits,
    ) -> Self {
        Self {
            fetcher,
            sessions,
            ledger,
            limits,
        }
    }

    pub fn limits(&self) -> &PaginationLimits {
        &self.limits
    }

    /// Handle a chat message
    pub async fn handle_message(&self, who: &Requester, event: UserEvent) -> Vec<Screen> {
        let handle = self.sessions.entry(who.chat_id).await;
        let mut state = handle.lock().await;

        match event {
            UserEvent::Command(command) => self.run_command(&mut state, who, command).await,
            UserEvent::Text(text) if state.phase() == Phase::AwaitingQuery => {
                match check_query(&text, self.limits.max_query_chars) {
                    QueryCheck::Accepted(query) => {
                        let mode = state.mode();
                        self.search(&mut state, who, &query, mode, true).await
                    }
                    QueryCheck::Rejected => {
                        debug!(user_id = who.user.telegram_id, "Rejected search query");
                        vec![Screen::InvalidQuery, Screen::QueryPrompt]
                    }
                    QueryCheck::Command => {
                        state.return_to_main();
                        vec![Screen::Unrecognized, Screen::MainMenu]
                    }
                }
            }
            UserEvent::Text(_) => {
                state.return_to_main();
                vec![Screen::Unrecognized, Screen::MainMenu]
            }
        }
    }

    /// Handle an inline button press
    pub async fn handle_callback(&self, who: &Requester, action: CallbackAction) -> Vec<Screen> {
        let handle = self.sessions.entry(who.chat_id).await;
        let mut state = handle.lock().await;

        match action {
            CallbackAction::Next | CallbackAction::Back => {
                if state.results().is_empty() {
                    return vec![Screen::NoData, Screen::MainMenu];
                }
                let moved = match action {
                    CallbackAction::Next => state.next(),
                    _ => state.back(),
                };
                if moved {
                    self.result_screen(&state, who)
                } else {
                    Vec::new()
                }
            }
            CallbackAction::FavoriteAdd => self.toggle_favorite(&mut state, who, true).await,
            CallbackAction::FavoriteRemove => self.toggle_favorite(&mut state, who, false).await,
            CallbackAction::ReturnMain => {
                state.return_to_main();
                vec![Screen::MainMenu]
            }
            CallbackAction::NextFavorite | CallbackAction::BackFavorite => {
                if state.saved().is_empty() {
                    return vec![Screen::NoData, Screen::MainMenu];
                }
                let moved = match action {
                    CallbackAction::NextFavorite => state.next_saved(),
                    _ => state.back_saved(),
                };
                if moved {
                    self.favorite_screen(&state, who)
                } else {
                    Vec::new()
                }
            }
            CallbackAction::RemoveFavorite => self.remove_saved(&mut state, who).await,
            CallbackAction::Replay { entry_id } => {
                let Some((tag, query)) = self.history_entry(who, entry_id).await else {
                    state.return_to_main();
                    return vec![Screen::NoData, Screen::MainMenu];
                };
                match check_query(&query, self.limits.max_query_chars) {
                    QueryCheck::Accepted(query) => {
                        self.search(&mut state, who, &query, tag.mode(), false).await
                    }
                    QueryCheck::Rejected => vec![Screen::InvalidQuery],
                    QueryCheck::Command => vec![Screen::Unrecognized],
                }
            }
        }
    }

    async fn run_command(
        &self,
        state: &mut SessionState,
        who: &Requester,
        command: Command,
    ) -> Vec<Screen> {
        match command {
            Command::Start => {
                state.return_to_main();
                vec![
                    Screen::Welcome {
                        name: who.user.name.clone(),
                    },
                    Screen::MainMenu,
                ]
            }
            Command::MainMenu => {
                state.return_to_main();
                vec![Screen::MainMenu]
            }
            Command::Help => {
                state.return_to_main();
                vec![Screen::Help]
            }
            Command::About => {
                state.return_to_main();
                vec![Screen::About]
            }
            Command::History => {
                state.return_to_main();
                self.history_screen(who).await
            }
            Command::Favorites => self.open_favorites(state, who).await,
            Command::Custom => {
                state.begin_sort_choice();
                vec![Screen::SortPrompt]
            }
            Command::Low => {
                state.select_mode(SearchMode::Single);
                vec![Screen::QueryPrompt]
            }
            Command::High => {
                state.select_mode(SearchMode::Maximal);
                vec![Screen::QueryPrompt]
            }
            Command::Sort(order) if state.phase() == Phase::ChoosingSort => {
                state.select_mode(SearchMode::Sorted(order));
                vec![Screen::QueryPrompt]
            }
            Command::Sort(_) => {
                state.return_to_main();
                vec![Screen::Unrecognized, Screen::MainMenu]
            }
        }
    }

    /// Resolve a query and show its first result.
    ///
    /// Replays from the history menu pass `record = false` so repeating a
    /// search does not grow the history.
    async fn search(
        &self,
        state: &mut SessionState,
        who: &Requester,
        query: &str,
        mode: SearchMode,
        record: bool,
    ) -> Vec<Screen> {
        state.select_mode(mode);
        if record {
            if let Err(e) = self.ledger.record_history(&who.user, query, mode.tag()).await {
                error!(user_id = who.user.telegram_id, error = %e, "Failed to record search history");
            }
        }

        state.begin_search();
        let mut screens = vec![Screen::Searching];

        let request = SearchRequest::search(query, mode.page());
        let records = self.fetcher.resolve(&request).await;
        let shaped = {
            let mut rng = rand::thread_rng();
            shape_results(mode, records, &self.limits, &mut rng)
        };
        info!(
            user_id = who.user.telegram_id,
            query,
            tag = mode.tag().as_str(),
            results = shaped.len(),
            "Search completed"
        );

        self.refresh_favorites(state, who).await;

        if state.load_results(shaped) {
            screens.extend(self.result_screen(state, who));
        } else {
            screens.push(Screen::SearchFailed);
            screens.push(Screen::QueryPrompt);
        }
        screens
    }

    async fn refresh_favorites(&self, state: &mut SessionState, who: &Requester) {
        match self.ledger.favorites(who.user.telegram_id).await {
            Ok(favorites) => state.set_favorites(favorites.into_iter().map(|f| f.offer_url)),
            Err(e) => warn!(user_id = who.user.telegram_id, error = %e, "Failed to load favorites"),
        }
    }

    async fn toggle_favorite(&self, state: &mut SessionState, who: &Requester, add: bool) -> Vec<Screen> {
        let Some(record) = state.current().cloned() else {
            return vec![Screen::NoData, Screen::MainMenu];
        };
        let offer_url = record.offer_url().to_string();

        let persisted = if add {
            let favorite = NewFavorite {
                photo_link: record.primary_photo().unwrap_or_default().to_string(),
                caption: describe_product(&record, &who.language, self.limits.caption_budget),
                offer_url: offer_url.clone(),
            };
            self.ledger.add_favorite(&who.user, favorite).await
        } else {
            self.ledger
                .remove_favorite(who.user.telegram_id, &offer_url)
                .await
                .map(|_| ())
        };

        match persisted {
            Ok(()) if add => {
                state.mark_favorite(&offer_url);
            }
            Ok(()) => {
                state.unmark_favorite(&offer_url);
            }
            Err(e) => {
                error!(user_id = who.user.telegram_id, error = %e, add, "Failed to update favorites");
            }
        }
        self.result_screen(state, who)
    }

    async fn open_favorites(&self, state: &mut SessionState, who: &Requester) -> Vec<Screen> {
        let favorites = match self.ledger.favorites(who.user.telegram_id).await {
            Ok(favorites) => favorites,
            Err(e) => {
                error!(user_id = who.user.telegram_id, error = %e, "Failed to load favorites");
                Vec::new()
            }
        };
        if state.open_saved(favorites) {
            self.favorite_screen(state, who)
        } else {
            vec![Screen::NoData, Screen::MainMenu]
        }
    }

    async fn remove_saved(&self, state: &mut SessionState, who: &Requester) -> Vec<Screen> {
        let Some(offer_url) = state.current_saved().map(|f| f.offer_url.clone()) else {
            return vec![Screen::NoData, Screen::MainMenu];
        };
        match self.ledger.remove_favorite(who.user.telegram_id, &offer_url).await {
            Ok(_) => {
                state.unmark_favorite(&offer_url);
            }
            Err(e) => error!(user_id = who.user.telegram_id, error = %e, "Failed to remove favorite"),
        }
        self.favorite_screen(state, who)
    }

    /// Method and query of one of the user's history rows; `None` once the
    /// row has been evicted
    async fn history_entry(&self, who: &Requester, entry_id: i64) -> Option<(MethodTag, String)> {
        match self.ledger.history(who.user.telegram_id).await {
            Ok(entries) => entries
                .into_iter()
                .find(|entry| entry.id == entry_id)
                .and_then(|entry| Some((entry.tag()?, entry.query))),
            Err(e) => {
                error!(user_id = who.user.telegram_id, error = %e, "Failed to load history");
                None
            }
        }
    }

    async fn history_screen(&self, who: &Requester) -> Vec<Screen> {
        let entries = match self.ledger.history(who.user.telegram_id).await {
            Ok(entries) => entries,
            Err(e) => {
                error!(user_id = who.user.telegram_id, error = %e, "Failed to load history");
                Vec::new()
            }
        };
        let items: Vec<HistoryItem> = entries
            .into_iter()
            .filter_map(|entry| {
                let tag = entry.tag()?;
                Some(HistoryItem {
                    entry_id: entry.id,
                    tag,
                    query: entry.query,
                })
            })
            .collect();
        if items.is_empty() {
            vec![Screen::NoData, Screen::MainMenu]
        } else {
            vec![Screen::History(items)]
        }
    }

    fn result_screen(&self, state: &SessionState, who: &Requester) -> Vec<Screen> {
        match result_view(state, &who.language, self.limits.caption_budget) {
            Some(view) => vec![Screen::Result(view)],
            None => vec![Screen::NoData, Screen::MainMenu],
        }
    }

    fn favorite_screen(&self, state: &SessionState, who: &Requester) -> Vec<Screen> {
        match favorite_view(state, &who.language) {
            Some(view) => vec![Screen::Favorite(view)],
            None => vec![Screen::NoData, Screen::MainMenu],
        }
    }
}

/// View of the current search result, `None` when nothing is loaded
pub fn result_view(state: &SessionState, language: &str, budget: usize) -> Option<ResultView> {
    let record = state.current()?;
    let caption = format!(
        "{}\n{}",
        describe_product(record, language, budget),
        position_text(state.page_index(), state.results().len(), language)
    );
    Some(ResultView {
        caption,
        photo_url: record.primary_photo().map(str::to_string),
        offer_url: record.offer_url().to_string(),
        is_favorite: state.is_favorite(record.offer_url()),
        has_prev: state.has_prev(),
        has_next: state.has_next(),
    })
}

/// View of the current saved favorite
pub fn favorite_view(state: &SessionState, language: &str) -> Option<FavoriteView> {
    let entry = state.current_saved()?;
    let caption = format!(
        "{}\n{}",
        entry.caption,
        position_text(state.saved_index(), state.saved().len(), language)
    );
    Some(FavoriteView {
        caption,
        photo_url: Some(entry.photo_link.clone()).filter(|link| !link.is_empty()),
        offer_url: entry.offer_url.clone(),
        removed: !state.is_favorite(&entry.offer_url),
        has_prev: state.saved_has_prev(),
        has_next: state.saved_has_next(),
    })
}

/// "[3 of 15]"
pub fn position_text(index: usize, total: usize, language: &str) -> String {
    let current = (index + 1).to_string();
    let total = total.to_string();
    message(language, "position", &[("current", &current), ("total", &total)])
}

/// Render a product description that fits `budget` characters.
///
/// Optional fields are dropped until it fits: attributes first, then the
/// description, then both. Title, rating, price, store and shipping are
/// always kept; the last level is cut at the budget if it is still too long.
pub fn describe_product(record: &ProductRecord, language: &str, budget: usize) -> String {
    let title = labeled(language, "label-title", record.title());
    let rating = labeled(
        language,
        "label-rating",
        &record
            .rating()
            .map(|r| r.to_string())
            .unwrap_or_else(|| message(language, "rating-absent", &[])),
    );
    let description = record
        .description()
        .filter(|d| !d.trim().is_empty())
        .map(|d| labeled(language, "label-description", d));
    let attributes = record
        .attributes()
        .filter(|a| !a.is_empty())
        .map(|a| {
            let joined = a
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join(", ");
            labeled(language, "label-attributes", &joined)
        });
    let price = labeled(
        language,
        "label-price",
        &message(language, "price-value", &[("price", &format_price(record.price()))]),
    );
    let store = labeled(language, "label-store", record.store());
    let shipping = labeled(language, "label-shipping", record.shipping());

    let levels = [
        (description.as_ref(), attributes.as_ref()),
        (description.as_ref(), None),
        (None, attributes.as_ref()),
        (None, None),
    ];

    let mut rendered = String::new();
    for (description, attributes) in levels {
        let lines: Vec<&str> = [
            Some(title.as_str()),
            Some(rating.as_str()),
            description.map(String::as_str),
            attributes.map(String::as_str),
            Some(price.as_str()),
            Some(store.as_str()),
            Some(shipping.as_str()),
        ]
        .into_iter()
        .flatten()
        .collect();
        rendered = lines.join("\n");
        if rendered.chars().count() < budget {
            return rendered;
        }
    }
    rendered.chars().take(budget.saturating_sub(1)).collect()
}

fn format_price(price: f64) -> String {
    if price.fract() == 0.0 {
        format!("{price:.0}")
    } else {
        format!("{price:.2}")
    }
}

fn labeled(language: &str, key: &str, value: &str) -> String {
    format!("{}: {}", message(language, key, &[]), value)
}

fn message(language: &str, key: &str, args: &[(&str, &str)]) -> String {
    let Some(manager) = get_localization_manager() else {
        return key.to_string();
    };
    let language = if language.is_empty() { DEFAULT_LANGUAGE } else { language };
    if args.is_empty() {
        manager.get_message_in_language(key, language, None)
    } else {
        let args: HashMap<&str, &str> = args.iter().cloned().collect();
        manager.get_message_in_language(key, language, Some(&args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(description: &str, attribute_len: usize) -> ProductRecord {
        ProductRecord::from_json(&json!({
            "product_id": "1",
            "product_title": "Смартфон",
            "product_rating": 4.5,
            "store_name": "Магазин",
            "product_photos": ["https://img/1.jpg"],
            "product_description": description,
            "product_attributes": {"Цвет": "ж".repeat(attribute_len)},
            "offer": {
                "price": "1 234,56 ₽",
                "shipping": "Бесплатно",
                "offer_page_url": "https://shop/1"
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_full_description_fits() {
        let text = describe_product(&record("Хороший", 10), "ru", 900);
        assert!(text.contains("Название: Смартфон"));
        assert!(text.contains("О товаре: Хороший"));
        assert!(text.contains("Атрибуты: Цвет: жжжжжжжжжж"));
        assert!(text.contains("Цена: 1234.56 руб."));
    }

    #[test]
    fn test_attributes_dropped_first() {
        let text = describe_product(&record("Хороший", 1000), "ru", 900);
        assert!(text.contains("О товаре"));
        assert!(!text.contains("Атрибуты"));
    }

    #[test]
    fn test_description_dropped_next() {
        let long = "д".repeat(1000);
        let text = describe_product(&record(&long, 10), "ru", 900);
        assert!(!text.contains("О товаре"));
        assert!(text.contains("Атрибуты"));
    }

    #[test]
    fn test_both_dropped_and_core_fields_kept() {
        let long = "д".repeat(1000);
        let text = describe_product(&record(&long, 1000), "ru", 900);
        assert!(!text.contains("О товаре"));
        assert!(!text.contains("Атрибуты"));
        assert!(text.contains("Доставка: Бесплатно"));
        assert!(text.chars().count() < 900);
    }

    #[test]
    fn test_position_text() {
        assert_eq!(position_text(0, 5, "ru"), "[1 из 5]");
        assert_eq!(position_text(4, 5, "en"), "[5 of 5]");
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(99.0), "99");
        assert_eq!(format_price(1234.5), "1234.50");
    }
}
