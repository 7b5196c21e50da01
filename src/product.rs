//! # Product Module
//!
//! Turns raw catalog entries returned by the search API into fixed-shape
//! [`ProductRecord`] values.
//!
//! ## Field lookup
//!
//! Every field is read by name from the entry itself. When the top-level value
//! is absent or blank the lookup falls back to the nested `offer` object, one
//! level deep only. Shipping, price and offer URL usually live there.
//!
//! ## Failure policy
//!
//! A batch is all-or-nothing: one malformed entry rejects the whole page so a
//! user never browses a half-parsed catalog.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, error};

use crate::search_errors::EntityError;

lazy_static! {
    /// Everything that is not part of a decimal number
    static ref PRICE_NOISE: Regex = Regex::new(r"[^0-9.,]").unwrap();
}

const OFFER_KEY: &str = "offer";

/// A normalized catalog item. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    id: String,
    rating: Option<f64>,
    title: String,
    store: String,
    photo_links: Vec<String>,
    description: Option<String>,
    attributes: Option<BTreeMap<String, String>>,
    price: f64,
    shipping: String,
    offer_url: String,
}

impl ProductRecord {
    /// Build a record from one raw catalog entry
    pub fn from_json(entry: &Value) -> Result<Self, EntityError> {
        let entry = entry
            .as_object()
            .ok_or_else(|| EntityError::InvalidField("entry".to_string()))?;

        Ok(Self {
            id: required_text(entry, "product_id")?,
            rating: optional_number(entry, "product_rating")?,
            title: required_text(entry, "product_title")?,
            store: required_text(entry, "store_name")?,
            photo_links: photo_links(entry)?,
            description: optional_text(entry, "product_description")?,
            attributes: attributes(entry)?,
            price: price(entry)?,
            shipping: required_text(entry, "shipping")?,
            offer_url: required_text(entry, "offer_page_url")?,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn rating(&self) -> Option<f64> {
        self.rating
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn store(&self) -> &str {
        &self.store
    }

    pub fn photo_links(&self) -> &[String] {
        &self.photo_links
    }

    /// First photo, the one shown to the user
    pub fn primary_photo(&self) -> Option<&str> {
        self.photo_links.first().map(String::as_str)
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn attributes(&self) -> Option<&BTreeMap<String, String>> {
        self.attributes.as_ref()
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn shipping(&self) -> &str {
        &self.shipping
    }

    pub fn offer_url(&self) -> &str {
        &self.offer_url
    }
}

/// Parse a heterogeneous price string such as `"1 234,56 ₽"` or `"99.00 USD"`.
///
/// Only digits, `.` and `,` are kept and `,` becomes `.`; the result must be a
/// finite, non-negative number.
pub fn parse_price(raw: &str) -> Result<f64, EntityError> {
    let cleaned = PRICE_NOISE.replace_all(raw, "").replace(',', ".");
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        _ => Err(EntityError::InvalidPrice(raw.to_string())),
    }
}

/// Build every record of a batch or none of them.
pub fn try_materialize(entries: &[Value]) -> Result<Vec<ProductRecord>, EntityError> {
    entries.iter().map(ProductRecord::from_json).collect()
}

/// Build every record of a batch, yielding an empty page when any entry is
/// malformed.
pub fn materialize(entries: &[Value]) -> Vec<ProductRecord> {
    match try_materialize(entries) {
        Ok(records) => {
            debug!(records = records.len(), "Catalog page materialized");
            records
        }
        Err(e) => {
            error!(entries = entries.len(), error = %e, "Rejected malformed catalog page");
            Vec::new()
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Top-level value, or the same key under `offer` when blank
fn lookup<'a>(entry: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    match entry.get(name) {
        Some(value) if !is_blank(value) => Some(value),
        _ => entry
            .get(OFFER_KEY)
            .and_then(Value::as_object)
            .and_then(|offer| offer.get(name))
            .filter(|value| !is_blank(value)),
    }
}

fn as_text(value: &Value, name: &str) -> Result<String, EntityError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(EntityError::InvalidField(name.to_string())),
    }
}

fn required_text(entry: &Map<String, Value>, name: &str) -> Result<String, EntityError> {
    let value = lookup(entry, name).ok_or_else(|| EntityError::MissingField(name.to_string()))?;
    as_text(value, name)
}

fn optional_text(entry: &Map<String, Value>, name: &str) -> Result<Option<String>, EntityError> {
    lookup(entry, name).map(|value| as_text(value, name)).transpose()
}

fn optional_number(entry: &Map<String, Value>, name: &str) -> Result<Option<f64>, EntityError> {
    match lookup(entry, name) {
        None => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| EntityError::InvalidField(name.to_string())),
        Some(_) => Err(EntityError::InvalidField(name.to_string())),
    }
}

fn photo_links(entry: &Map<String, Value>) -> Result<Vec<String>, EntityError> {
    const NAME: &str = "product_photos";
    match lookup(entry, NAME) {
        None => Ok(Vec::new()),
        Some(Value::String(link)) => Ok(vec![link.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| EntityError::InvalidField(NAME.to_string()))
            })
            .collect(),
        Some(_) => Err(EntityError::InvalidField(NAME.to_string())),
    }
}

fn attributes(entry: &Map<String, Value>) -> Result<Option<BTreeMap<String, String>>, EntityError> {
    const NAME: &str = "product_attributes";
    match lookup(entry, NAME) {
        None => Ok(None),
        Some(Value::Object(map)) => Ok(Some(
            map.iter()
                .map(|(key, value)| {
                    let text = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (key.clone(), text)
                })
                .collect(),
        )),
        Some(_) => Err(EntityError::InvalidField(NAME.to_string())),
    }
}

fn price(entry: &Map<String, Value>) -> Result<f64, EntityError> {
    const NAME: &str = "price";
    match lookup(entry, NAME) {
        None => Err(EntityError::MissingField(NAME.to_string())),
        Some(Value::String(raw)) => parse_price(raw),
        Some(Value::Number(n)) => parse_price(&n.to_string()),
        Some(_) => Err(EntityError::InvalidField(NAME.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flat_entry() -> Value {
        json!({
            "product_id": "123",
            "product_title": "Смартфон X",
            "product_rating": 4.5,
            "product_photos": ["https://img.example/1.webp", "https://img.example/2.webp"],
            "product_description": "Отличный телефон",
            "product_attributes": {"Цвет": "чёрный", "Память": "128 ГБ"},
            "offer": {
                "price": "1 234,56 ₽",
                "shipping": "Бесплатная доставка",
                "offer_page_url": "https://shop.example/item/123",
                "store_name": "Магазин"
            }
        })
    }

    #[test]
    fn test_parse_price_rubles() {
        assert!((parse_price("1 234,56 ₽").unwrap() - 1234.56).abs() < 1e-9);
    }

    #[test]
    fn test_parse_price_usd() {
        assert!((parse_price("99.00 USD").unwrap() - 99.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_price_without_digits_fails() {
        assert_eq!(
            parse_price("бесплатно"),
            Err(EntityError::InvalidPrice("бесплатно".to_string()))
        );
        assert!(parse_price("").is_err());
    }

    #[test]
    fn test_parse_price_with_two_separators_fails() {
        // "1,234.56" becomes "1.234.56" which is not a number
        assert!(parse_price("1,234.56").is_err());
    }

    #[test]
    fn test_offer_fallback() {
        let record = ProductRecord::from_json(&flat_entry()).unwrap();
        assert_eq!(record.id(), "123");
        assert_eq!(record.store(), "Магазин");
        assert_eq!(record.shipping(), "Бесплатная доставка");
        assert_eq!(record.offer_url(), "https://shop.example/item/123");
        assert!((record.price() - 1234.56).abs() < 1e-9);
        assert_eq!(record.primary_photo(), Some("https://img.example/1.webp"));
        assert_eq!(record.attributes().unwrap().get("Цвет").unwrap(), "чёрный");
    }

    #[test]
    fn test_fallback_is_one_level_only() {
        let entry = json!({
            "product_id": "1",
            "product_title": "t",
            "store_name": "s",
            "shipping": "x",
            "offer_page_url": "u",
            "offer": {"offer": {"price": "10"}}
        });
        assert_eq!(
            ProductRecord::from_json(&entry),
            Err(EntityError::MissingField("price".to_string()))
        );
    }

    #[test]
    fn test_blank_top_level_value_falls_back() {
        let mut entry = flat_entry();
        entry["store_name"] = json!("");
        entry["offer"]["store_name"] = json!("Из оффера");
        let record = ProductRecord::from_json(&entry).unwrap();
        assert_eq!(record.store(), "Из оффера");
    }

    #[test]
    fn test_optional_fields_absent() {
        let mut entry = flat_entry();
        let object = entry.as_object_mut().unwrap();
        object.remove("product_rating");
        object.remove("product_description");
        object.remove("product_attributes");
        let record = ProductRecord::from_json(&entry).unwrap();
        assert_eq!(record.rating(), None);
        assert_eq!(record.description(), None);
        assert_eq!(record.attributes(), None);
    }

    #[test]
    fn test_materialize_is_all_or_nothing() {
        let mut broken = flat_entry();
        broken["offer"]["price"] = json!("нет цены");
        let batch = vec![flat_entry(), broken, flat_entry()];
        assert!(materialize(&batch).is_empty());
        assert!(try_materialize(&batch).is_err());
    }

    #[test]
    fn test_materialize_keeps_order_and_count() {
        let mut second = flat_entry();
        second["product_id"] = json!("456");
        let batch = vec![flat_entry(), second];
        let records = materialize(&batch);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id(), "123");
        assert_eq!(records[1].id(), "456");
        assert_eq!(records, materialize(&batch));
    }

    #[test]
    fn test_non_object_entry_is_rejected() {
        assert_eq!(
            ProductRecord::from_json(&json!("text")),
            Err(EntityError::InvalidField("entry".to_string()))
        );
    }
}
