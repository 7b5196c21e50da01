use anyhow::{anyhow, Result};
use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use std::collections::HashMap;
use std::sync::OnceLock;
use unic_langid::LanguageIdentifier;

/// Language used when the user's language is unknown or unsupported
pub const DEFAULT_LANGUAGE: &str = "ru";

/// Languages with a resource file, in fallback order
pub const SUPPORTED_LANGUAGES: [&str; 2] = ["ru", "en"];

const RESOURCES: [(&str, &str); 2] = [
    ("ru", include_str!("../locales/ru/main.ftl")),
    ("en", include_str!("../locales/en/main.ftl")),
];

/// Localization manager for the product search bot
pub struct LocalizationManager {
    bundles: HashMap<String, FluentBundle<FluentResource>>,
}

impl LocalizationManager {
    /// Create a new localization manager with every supported language
    pub fn new() -> Result<Self> {
        let mut bundles = HashMap::new();
        for (language, source) in RESOURCES {
            let locale: LanguageIdentifier = language.parse()?;
            bundles.insert(language.to_string(), Self::create_bundle(locale, source)?);
        }
        Ok(Self { bundles })
    }

    fn create_bundle(locale: LanguageIdentifier, source: &str) -> Result<FluentBundle<FluentResource>> {
        let mut bundle = FluentBundle::new_concurrent(vec![locale.clone()]);
        // Telegram renders the Unicode isolation marks literally
        bundle.set_use_isolating(false);

        let resource = FluentResource::try_new(source.to_string())
            .map_err(|(_, errors)| anyhow!("Invalid {locale} resource: {errors:?}"))?;
        bundle
            .add_resource(resource)
            .map_err(|errors| anyhow!("Duplicate messages in {locale} resource: {errors:?}"))?;
        Ok(bundle)
    }

    /// Get a localized message in a specific language, falling back to the
    /// default language when the language or the key is missing.
    pub fn get_message_in_language(
        &self,
        key: &str,
        language: &str,
        args: Option<&HashMap<&str, &str>>,
    ) -> String {
        let fluent_args = args.map(|args| {
            FluentArgs::from_iter(args.iter().map(|(k, v)| (*k, FluentValue::from(*v))))
        });

        let candidates = [language, DEFAULT_LANGUAGE];
        for candidate in candidates {
            let Some(bundle) = self.bundles.get(candidate) else {
                continue;
            };
            let Some(pattern) = bundle.get_message(key).and_then(|msg| msg.value()) else {
                continue;
            };
            let mut errors = Vec::new();
            let value = bundle.format_pattern(pattern, fluent_args.as_ref(), &mut errors);
            if !errors.is_empty() {
                log::debug!("Formatting {key} in {candidate} reported {errors:?}");
            }
            return value.into_owned();
        }

        format!("Missing translation: {key}")
    }

    /// The message in every supported language
    pub fn all_variants(&self, key: &str) -> Vec<String> {
        SUPPORTED_LANGUAGES
            .iter()
            .filter(|language| {
                self.bundles
                    .get(**language)
                    .is_some_and(|bundle| bundle.has_message(key))
            })
            .map(|language| self.get_message_in_language(key, language, None))
            .collect()
    }
}

static LOCALIZATION_MANAGER: OnceLock<LocalizationManager> = OnceLock::new();

/// Initialize the global localization manager
pub fn init_localization() -> Result<()> {
    if LOCALIZATION_MANAGER.get().is_some() {
        return Ok(());
    }
    let manager = LocalizationManager::new()?;
    // A concurrent initializer may have won the race; both are identical
    let _ = LOCALIZATION_MANAGER.set(manager);
    Ok(())
}

/// Get the global localization manager, loading it on first use
pub fn get_localization_manager() -> Option<&'static LocalizationManager> {
    if LOCALIZATION_MANAGER.get().is_none() {
        if let Err(e) = init_localization() {
            log::error!("Failed to load localization resources: {e}");
        }
    }
    LOCALIZATION_MANAGER.get()
}

/// Map a Telegram language code to a supported language
pub fn detect_language(language_code: Option<&str>) -> String {
    language_code
        .and_then(|code| code.split(['-', '_']).next())
        .map(|code| code.to_lowercase())
        .filter(|code| is_language_supported(code))
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string())
}

pub fn is_language_supported(language: &str) -> bool {
    SUPPORTED_LANGUAGES.contains(&language)
}

/// Convenience function to get a localized message in a specific language
pub fn t_lang(key: &str, language_code: Option<&str>) -> String {
    let language = detect_language(language_code);
    match get_localization_manager() {
        Some(manager) => manager.get_message_in_language(key, &language, None),
        None => key.to_string(),
    }
}

/// Convenience function to get a localized message with arguments in a specific language
pub fn t_args_lang(key: &str, args: &[(&str, &str)], language_code: Option<&str>) -> String {
    let language = detect_language(language_code);
    let args_map: HashMap<&str, &str> = args.iter().cloned().collect();
    match get_localization_manager() {
        Some(manager) => manager.get_message_in_language(key, &language, Some(&args_map)),
        None => key.to_string(),
    }
}

/// A message in every supported language, for matching user input
pub fn t_all(key: &str) -> Vec<String> {
    get_localization_manager()
        .map(|manager| manager.all_variants(key))
        .unwrap_or_default()
}
