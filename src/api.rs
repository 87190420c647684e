// src/api.rs
use crate::models::{Snapshot, StockEntry};
use crate::preferences::ThemeStore;
use crate::quotes::{top_movers, Interval, QuoteProvider, DEFAULT_SERIES_SIZE};
use crate::store::WatchlistStore;
use futures_util::stream::{self, Stream};
use log::{error, info};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::watch;
use warp::sse::Event;
use warp::{Filter, Rejection, Reply};

const MAX_BODY_BYTES: u64 = 16 * 1024;
const MAX_SERIES_SIZE: u32 = 5000;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<WatchlistStore>,
    pub quotes: Arc<dyn QuoteProvider>,
    pub themes: Arc<ThemeStore>,
    pub movers: Arc<Vec<String>>,
}

#[derive(Deserialize)]
struct ListRequest {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct AddEntryRequest {
    #[serde(default)]
    list: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    price: String,
}

#[derive(Deserialize)]
struct RemoveEntryRequest {
    #[serde(default)]
    list: String,
    #[serde(default)]
    symbol: String,
}

#[derive(Deserialize)]
struct QuotesParams {
    #[serde(default)]
    symbols: String,
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

#[derive(Deserialize)]
struct SeriesParams {
    #[serde(default)]
    interval: Interval,
    size: Option<u32>,
}

pub fn routes(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let list = warp::path!("watchlists")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(get_watchlists_handler);

    let summary = warp::path!("watchlists" / "summary")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(summary_handler);

    let events = warp::path!("watchlists" / "events")
        .and(warp::get())
        .and(with_state(state.clone()))
        .map(|state: AppState| {
            let events = snapshot_events(state.store.subscribe());
            warp::sse::reply(warp::sse::keep_alive().stream(events))
        });

    let create = warp::path!("watchlists")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(json_body())
        .and_then(create_list_handler);

    let delete = warp::path!("watchlists")
        .and(warp::delete())
        .and(with_state(state.clone()))
        .and(json_body())
        .and_then(delete_list_handler);

    let add = warp::path!("watchlists" / "entries")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(json_body())
        .and_then(add_entry_handler);

    let remove = warp::path!("watchlists" / "entries")
        .and(warp::delete())
        .and(with_state(state.clone()))
        .and(json_body())
        .and_then(remove_entry_handler);

    let quotes = warp::path!("quotes")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(warp::query::<QuotesParams>())
        .and_then(quotes_handler);

    let search = warp::path!("search")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(warp::query::<SearchParams>())
        .and_then(search_handler);

    let movers = warp::path!("movers")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(movers_handler);

    let series = warp::path!("series" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(warp::query::<SeriesParams>())
        .and_then(series_handler);

    let profile = warp::path!("profile" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(profile_handler);

    let theme = warp::path!("theme")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(theme_handler);

    let toggle_theme = warp::path!("theme" / "toggle")
        .and(warp::post())
        .and(with_state(state))
        .and_then(toggle_theme_handler);

    list.or(summary)
        .or(events)
        .or(create)
        .or(delete)
        .or(add)
        .or(remove)
        .or(quotes)
        .or(search)
        .or(movers)
        .or(series)
        .or(profile)
        .or(theme)
        .or(toggle_theme)
}

fn with_state(
    state: AppState,
) -> impl Filter<Extract = (AppState,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn json_body<T: serde::de::DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

/// One `snapshot` event for the current state, then one per change.
fn snapshot_events(
    rx: watch::Receiver<Snapshot>,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    stream::unfold((rx, true), |(mut rx, first)| async move {
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let snapshot = rx.borrow_and_update().clone();
        let event = match Event::default().event("snapshot").json_data(&*snapshot) {
            Ok(event) => event,
            Err(e) => {
                error!("Failed to encode snapshot event: {}", e);
                Event::default().event("error").data(e.to_string())
            }
        };
        Some((Ok(event), (rx, false)))
    })
}

fn snapshot_reply(state: &AppState) -> warp::reply::Json {
    warp::reply::json(&*state.store.snapshot())
}

async fn get_watchlists_handler(state: AppState) -> Result<impl Reply, Rejection> {
    Ok(snapshot_reply(&state))
}

async fn summary_handler(state: AppState) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&state.store.summaries()))
}

async fn create_list_handler(
    state: AppState,
    request: ListRequest,
) -> Result<impl Reply, Rejection> {
    if state.store.create_list(&request.name) {
        info!("Watchlist {} created.", request.name);
    }
    Ok(snapshot_reply(&state))
}

async fn delete_list_handler(
    state: AppState,
    request: ListRequest,
) -> Result<impl Reply, Rejection> {
    if state.store.delete_list(&request.name) {
        info!("Watchlist {} deleted.", request.name);
    }
    Ok(snapshot_reply(&state))
}

async fn add_entry_handler(
    state: AppState,
    request: AddEntryRequest,
) -> Result<impl Reply, Rejection> {
    let entry = StockEntry::new(request.symbol, request.price);
    let symbol = entry.symbol.clone();
    if state.store.add_entry(&request.list, entry) {
        info!("Added {} to watchlist {}.", symbol, request.list);
    }
    Ok(snapshot_reply(&state))
}

async fn remove_entry_handler(
    state: AppState,
    request: RemoveEntryRequest,
) -> Result<impl Reply, Rejection> {
    if state.store.remove_entry(&request.list, &request.symbol) {
        info!("Removed {} from watchlist {}.", request.symbol, request.list);
    }
    Ok(snapshot_reply(&state))
}

async fn quotes_handler(state: AppState, params: QuotesParams) -> Result<impl Reply, Rejection> {
    let symbols: Vec<String> = params
        .symbols
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    Ok(warp::reply::json(&state.quotes.fetch_quotes(&symbols).await))
}

async fn search_handler(state: AppState, params: SearchParams) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&state.quotes.search_symbols(&params.q).await))
}

async fn movers_handler(state: AppState) -> Result<impl Reply, Rejection> {
    let movers = top_movers(state.quotes.as_ref(), &state.movers).await;
    Ok(warp::reply::json(&movers))
}

async fn series_handler(
    symbol: String,
    state: AppState,
    params: SeriesParams,
) -> Result<impl Reply, Rejection> {
    let size = params
        .size
        .unwrap_or(DEFAULT_SERIES_SIZE)
        .clamp(1, MAX_SERIES_SIZE);
    let points = state.quotes.fetch_series(&symbol, params.interval, size).await;
    Ok(warp::reply::json(&points))
}

async fn profile_handler(symbol: String, state: AppState) -> Result<impl Reply, Rejection> {
    match state.quotes.fetch_profile(&symbol).await {
        Some(profile) => Ok(warp::reply::with_status(
            warp::reply::json(&profile),
            warp::http::StatusCode::OK,
        )),
        None => Ok(warp::reply::with_status(
            warp::reply::json(&Value::Null),
            warp::http::StatusCode::NOT_FOUND,
        )),
    }
}

async fn theme_handler(state: AppState) -> Result<impl Reply, Rejection> {
    let theme = state.themes.current().await;
    Ok(warp::reply::json(&json!({ "theme": theme })))
}

async fn toggle_theme_handler(state: AppState) -> Result<impl Reply, Rejection> {
    let theme = state.themes.toggle().await;
    info!("Theme switched to {}.", theme.as_str());
    Ok(warp::reply::json(&json!({ "theme": theme })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Theme, Watchlists};
    use crate::quotes::tests::{quote, StubProvider};
    use crate::storage::MemoryStorage;
    use futures_util::StreamExt;

    async fn test_state() -> AppState {
        let storage = Arc::new(MemoryStorage::new());
        let provider = StubProvider {
            quotes: vec![quote("AAPL", "1.50"), quote("MSFT", "-0.75")],
        };
        AppState {
            store: Arc::new(WatchlistStore::restore(storage.clone()).await),
            quotes: Arc::new(provider),
            themes: Arc::new(ThemeStore::load(storage, Theme::Light).await),
            movers: Arc::new(vec!["AAPL".to_string(), "MSFT".to_string()]),
        }
    }

    fn body_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> T {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_watchlist_lifecycle_over_http() {
        let state = test_state().await;
        let api = routes(state.clone());

        let response = warp::test::request()
            .method("POST")
            .path("/watchlists")
            .json(&json!({ "name": "Tech" }))
            .reply(&api)
            .await;
        assert_eq!(response.status(), 200);

        for price in ["150.00", "151.00"] {
            warp::test::request()
                .method("POST")
                .path("/watchlists/entries")
                .json(&json!({ "list": "Tech", "symbol": "AAPL", "price": price }))
                .reply(&api)
                .await;
        }

        let response = warp::test::request().path("/watchlists").reply(&api).await;
        let lists: Watchlists = body_json(response.body());
        assert_eq!(lists["Tech"], vec![StockEntry::new("AAPL", "150.00")]);

        let response = warp::test::request()
            .method("DELETE")
            .path("/watchlists/entries")
            .json(&json!({ "list": "Tech", "symbol": "AAPL" }))
            .reply(&api)
            .await;
        let lists: Watchlists = body_json(response.body());
        assert!(lists["Tech"].is_empty());

        let response = warp::test::request()
            .method("DELETE")
            .path("/watchlists")
            .json(&json!({ "name": "Tech" }))
            .reply(&api)
            .await;
        let lists: Watchlists = body_json(response.body());
        assert!(lists.is_empty());
    }

    #[tokio::test]
    async fn test_garbage_bodies_are_noops() {
        let state = test_state().await;
        let api = routes(state.clone());

        let response = warp::test::request()
            .method("POST")
            .path("/watchlists")
            .json(&json!({}))
            .reply(&api)
            .await;
        assert_eq!(response.status(), 200);

        warp::test::request()
            .method("DELETE")
            .path("/watchlists")
            .json(&json!({ "name": "Ghost" }))
            .reply(&api)
            .await;

        assert!(state.store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_summary_route() {
        let state = test_state().await;
        state.store.add_entry("Tech", StockEntry::new("AAPL", "100"));
        state.store.add_entry("Tech", StockEntry::new("MSFT", "50.5"));
        let api = routes(state);

        let response = warp::test::request().path("/watchlists/summary").reply(&api).await;
        let summaries: Value = body_json(response.body());
        assert_eq!(summaries[0]["name"], "Tech");
        assert_eq!(summaries[0]["count"], 2);
        assert_eq!(summaries[0]["total_value"], 150.5);
    }

    #[tokio::test]
    async fn test_quote_routes() {
        let api = routes(test_state().await);

        let response = warp::test::request()
            .path("/quotes?symbols=aapl,%20msft,NOPE")
            .reply(&api)
            .await;
        let quotes: Value = body_json(response.body());
        assert_eq!(quotes.as_array().unwrap().len(), 2);
        assert_eq!(quotes[0]["changePercent"], "0.00");

        let response = warp::test::request().path("/search?q=MS").reply(&api).await;
        let results: Value = body_json(response.body());
        assert_eq!(results[0]["symbol"], "MSFT");

        let response = warp::test::request().path("/movers").reply(&api).await;
        let movers: Value = body_json(response.body());
        assert_eq!(movers["gainers"][0]["symbol"], "AAPL");
        assert_eq!(movers["losers"][0]["symbol"], "MSFT");
    }

    #[tokio::test]
    async fn test_series_route_defaults_and_clamps() {
        let api = routes(test_state().await);

        let response = warp::test::request().path("/series/AAPL").reply(&api).await;
        let points: Value = body_json(response.body());
        assert_eq!(points.as_array().unwrap().len(), DEFAULT_SERIES_SIZE as usize);

        let response = warp::test::request()
            .path("/series/AAPL?interval=1week&size=0")
            .reply(&api)
            .await;
        let points: Value = body_json(response.body());
        assert_eq!(points.as_array().unwrap().len(), 1);

        let response = warp::test::request()
            .path("/series/AAPL?interval=fortnight")
            .reply(&api)
            .await;
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn test_profile_route() {
        let api = routes(test_state().await);

        let response = warp::test::request().path("/profile/AAPL").reply(&api).await;
        assert_eq!(response.status(), 200);
        let profile: Value = body_json(response.body());
        assert_eq!(profile["exchange"], "NASDAQ");

        let response = warp::test::request().path("/profile/ZZZZ").reply(&api).await;
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn test_theme_routes() {
        let api = routes(test_state().await);

        let response = warp::test::request().path("/theme").reply(&api).await;
        assert_eq!(body_json::<Value>(response.body())["theme"], "light");

        let response = warp::test::request()
            .method("POST")
            .path("/theme/toggle")
            .reply(&api)
            .await;
        assert_eq!(body_json::<Value>(response.body())["theme"], "dark");
    }

    #[tokio::test]
    async fn test_snapshot_events_follow_the_store() {
        let state = test_state().await;
        let mut events = Box::pin(snapshot_events(state.store.subscribe()));

        let first = events.next().await.unwrap().unwrap();
        assert!(first.to_string().contains("snapshot"));

        state.store.create_list("Tech");
        let second = events.next().await.unwrap().unwrap();
        assert!(second.to_string().contains("\"Tech\""));
    }
}
