// src/quotes.rs
use crate::error::QuoteError;
use crate::models::{CompanyProfile, Quote, SearchResult, SeriesPoint, TopMovers};
use async_trait::async_trait;
use futures_util::future::join_all;
use log::{error, info, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_SERIES_SIZE: u32 = 12;
const SEARCH_LIMIT: usize = 10;
const FALLBACK_MOVERS: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum Interval {
    #[serde(rename = "1min")]
    OneMinute,
    #[default]
    #[serde(rename = "5min")]
    FiveMinutes,
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[serde(rename = "30min")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1day")]
    OneDay,
    #[serde(rename = "1week")]
    OneWeek,
    #[serde(rename = "1month")]
    OneMonth,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1min",
            Interval::FiveMinutes => "5min",
            Interval::FifteenMinutes => "15min",
            Interval::ThirtyMinutes => "30min",
            Interval::OneHour => "1h",
            Interval::OneDay => "1day",
            Interval::OneWeek => "1week",
            Interval::OneMonth => "1month",
        }
    }
}

/// Market data source. Every call is best-effort: failures come back as
/// empty results, never as errors.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn fetch_quotes(&self, symbols: &[String]) -> Vec<Quote>;
    async fn search_symbols(&self, query: &str) -> Vec<SearchResult>;
    async fn fetch_series(&self, symbol: &str, interval: Interval, size: u32) -> Vec<SeriesPoint>;
    async fn fetch_profile(&self, symbol: &str) -> Option<CompanyProfile>;
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct QuotePayload {
    status: Option<String>,
    message: Option<String>,
    symbol: Option<String>,
    name: Option<String>,
    exchange: Option<String>,
    #[serde(rename = "type")]
    instrument_type: Option<String>,
    datetime: Option<String>,
    close: Option<String>,
    change: Option<String>,
    percent_change: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SymbolMatch {
    symbol: String,
    instrument_name: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SymbolSearchResponse {
    data: Vec<SymbolMatch>,
}

#[derive(Deserialize)]
struct SeriesValue {
    datetime: String,
    close: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct TimeSeriesResponse {
    status: Option<String>,
    message: Option<String>,
    values: Vec<SeriesValue>,
}

fn or_zero(value: Option<String>) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "0.00".to_string())
}

fn provider_error(message: Option<String>) -> QuoteError {
    QuoteError::Provider(message.unwrap_or_else(|| "Unknown error".to_string()))
}

#[derive(Clone)]
pub struct TwelveDataClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl TwelveDataClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, QuoteError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(QuoteError::Status(response.status().as_u16()));
        }
        Ok(response.json::<T>().await?)
    }

    async fn quote(&self, symbol: &str) -> Result<QuotePayload, QuoteError> {
        let payload: QuotePayload = self.get_json("quote", &[("symbol", symbol)]).await?;
        if payload.status.as_deref() == Some("error") || payload.symbol.is_none() {
            return Err(provider_error(payload.message));
        }
        Ok(payload)
    }

    async fn try_search(&self, query: &str) -> Result<Vec<SymbolMatch>, QuoteError> {
        let response: SymbolSearchResponse =
            self.get_json("symbol_search", &[("symbol", query)]).await?;
        Ok(response.data.into_iter().take(SEARCH_LIMIT).collect())
    }

    async fn try_series(
        &self,
        symbol: &str,
        interval: Interval,
        size: u32,
    ) -> Result<Vec<SeriesPoint>, QuoteError> {
        let size = size.to_string();
        let response: TimeSeriesResponse = self
            .get_json(
                "time_series",
                &[
                    ("symbol", symbol),
                    ("interval", interval.as_str()),
                    ("outputsize", size.as_str()),
                ],
            )
            .await?;
        if response.status.as_deref() == Some("error") {
            return Err(provider_error(response.message));
        }

        // Newest first on the wire.
        Ok(response
            .values
            .into_iter()
            .rev()
            .filter_map(|v| match v.close.parse::<f64>() {
                Ok(close) => Some(SeriesPoint {
                    datetime: v.datetime,
                    close,
                }),
                Err(_) => {
                    warn!("Skipping {} point at {}: close {:?}", symbol, v.datetime, v.close);
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl QuoteProvider for TwelveDataClient {
    async fn fetch_quotes(&self, symbols: &[String]) -> Vec<Quote> {
        let responses = join_all(symbols.iter().map(|symbol| self.quote(symbol))).await;

        symbols
            .iter()
            .zip(responses)
            .filter_map(|(requested, response)| match response {
                Ok(payload) => {
                    let symbol = payload.symbol.unwrap_or_else(|| requested.clone());
                    Some(Quote {
                        name: payload.name.unwrap_or_else(|| symbol.clone()),
                        symbol,
                        price: or_zero(payload.close),
                        change: or_zero(payload.change),
                        change_percent: or_zero(payload.percent_change),
                        time: payload.datetime,
                    })
                }
                Err(e) => {
                    warn!("No valid quote for {}: {}", requested, e);
                    None
                }
            })
            .collect()
    }

    async fn search_symbols(&self, query: &str) -> Vec<SearchResult> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let matches = match self.try_search(query).await {
            Ok(matches) => matches,
            Err(e) => {
                error!("Search for {:?} failed: {}", query, e);
                return Vec::new();
            }
        };

        let symbols: Vec<String> = matches.iter().map(|m| m.symbol.clone()).collect();
        let mut quotes: HashMap<String, Quote> = self
            .fetch_quotes(&symbols)
            .await
            .into_iter()
            .map(|q| (q.symbol.clone(), q))
            .collect();

        matches
            .into_iter()
            .map(|m| {
                let quote = quotes.remove(&m.symbol);
                SearchResult {
                    name: m.instrument_name.unwrap_or_else(|| m.symbol.clone()),
                    price: or_zero(quote.as_ref().map(|q| q.price.clone())),
                    change: or_zero(quote.as_ref().map(|q| q.change.clone())),
                    change_percent: or_zero(quote.map(|q| q.change_percent)),
                    symbol: m.symbol,
                }
            })
            .collect()
    }

    async fn fetch_series(&self, symbol: &str, interval: Interval, size: u32) -> Vec<SeriesPoint> {
        match self.try_series(symbol, interval, size).await {
            Ok(points) => points,
            Err(e) => {
                error!("Chart fetch error ({}, {}): {}", symbol, interval.as_str(), e);
                Vec::new()
            }
        }
    }

    async fn fetch_profile(&self, symbol: &str) -> Option<CompanyProfile> {
        match self.quote(symbol).await {
            Ok(payload) => Some(CompanyProfile {
                name: payload.name.unwrap_or_else(|| symbol.to_string()),
                exchange: payload.exchange.unwrap_or_else(|| "N/A".to_string()),
                industry: payload.instrument_type.unwrap_or_else(|| "N/A".to_string()),
                website: format!("https://www.google.com/search?q={}+stock", symbol),
            }),
            Err(e) => {
                warn!("Company quote not found for {}: {}", symbol, e);
                None
            }
        }
    }
}

/// Splits the universe into gainers and losers. When one side is empty it is
/// padded with the first (gainers) or last (losers) few quotes instead.
pub async fn top_movers(provider: &dyn QuoteProvider, universe: &[String]) -> TopMovers {
    let quotes = provider.fetch_quotes(universe).await;
    info!("Fetched {} of {} mover quotes", quotes.len(), universe.len());

    let change = |q: &Quote| q.change.trim().parse::<f64>().unwrap_or(0.0);
    let gainers: Vec<Quote> = quotes.iter().filter(|q| change(q) > 0.0).cloned().collect();
    let losers: Vec<Quote> = quotes.iter().filter(|q| change(q) < 0.0).cloned().collect();

    TopMovers {
        gainers: if gainers.is_empty() {
            quotes.iter().take(FALLBACK_MOVERS).cloned().collect()
        } else {
            gainers
        },
        losers: if losers.is_empty() {
            let skip = quotes.len().saturating_sub(FALLBACK_MOVERS);
            quotes.iter().skip(skip).cloned().collect()
        } else {
            losers
        },
    }
}
