//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use products::fetcher::{RawResponse, SearchBackend, SearchRequest};
use products::search_errors::SearchError;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// One raw catalog entry in the search API's shape
pub fn catalog_entry(id: usize, price: &str) -> Value {
    json!({
        "product_id": id.to_string(),
        "product_title": format!("Смартфон {id}"),
        "product_rating": 4.2,
        "product_photos": [format!("https://img.example/{id}.jpg")],
        "product_description": "Описание",
        "product_attributes": {"Цвет": "чёрный"},
        "offer": {
            "store_name": "Магазин",
            "price": price,
            "shipping": "Бесплатная доставка",
            "offer_page_url": format!("https://shop.example/{id}")
        }
    })
}

pub fn catalog_body(prices: &[u32]) -> String {
    let data: Vec<Value> = prices
        .iter()
        .enumerate()
        .map(|(i, price)| catalog_entry(i, &format!("{price} ₽")))
        .collect();
    json!({"status": "OK", "data": data}).to_string()
}

/// Backend answering every request with the same canned response
pub struct CountingBackend {
    status: u16,
    body: String,
    calls: AtomicUsize,
    requests: Mutex<Vec<SearchRequest>>,
}

impl CountingBackend {
    pub fn ok(body: String) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: String) -> Self {
        Self {
            status,
            body,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchBackend for CountingBackend {
    async fn fetch(&self, request: &SearchRequest) -> Result<RawResponse, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        Ok(RawResponse {
            status: self.status,
            body: self.body.clone(),
        })
    }

    fn describe(&self, request: &SearchRequest) -> String {
        format!("mock {} page {}", request.query, request.page)
    }
}
