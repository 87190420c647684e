// src/models.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A symbol and the display price it had when it was added to a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    pub symbol: String,
    pub price: String,
}

impl StockEntry {
    pub fn new(symbol: impl Into<String>, price: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            price: price.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.symbol.is_empty()
    }
}

/// List name -> entries in insertion order.
pub type Watchlists = BTreeMap<String, Vec<StockEntry>>;

/// Immutable view of the watchlists handed to observers.
pub type Snapshot = Arc<Watchlists>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchlistSummary {
    pub name: String,
    pub count: usize,
    pub total_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: String,
    pub change: String,
    pub change_percent: String,
    pub time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub symbol: String,
    pub name: String,
    pub price: String,
    pub change: String,
    pub change_percent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub datetime: String,
    pub close: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub name: String,
    pub exchange: String,
    pub industry: String,
    pub website: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopMovers {
    pub gainers: Vec<Quote>,
    pub losers: Vec<Quote>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}
