// src/store.rs
//! Watchlist state: list name -> ordered stock entries, mirrored to durable
//! storage after every change.
//!
//! Every mutation runs inside a single `send_if_modified` critical section,
//! so observers see each change as one complete snapshot and the serialized
//! copy is queued in the same order the snapshots were published.

use crate::models::{Snapshot, StockEntry, WatchlistSummary, Watchlists};
use crate::persistence::PersistenceQueue;
use crate::storage::{KeyValueStorage, WATCHLISTS_KEY};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::watch;

pub struct WatchlistStore {
    state: watch::Sender<Snapshot>,
    queue: PersistenceQueue,
}

impl WatchlistStore {
    /// Loads the persisted watchlists and starts the writer. Anything that
    /// cannot be read or parsed yields an empty store.
    pub async fn restore(storage: Arc<dyn KeyValueStorage>) -> Self {
        let initial = load_watchlists(storage.as_ref()).await;
        info!("Restored {} watchlist(s)", initial.len());
        let (state, _) = watch::channel(Arc::new(initial));
        Self {
            state,
            queue: PersistenceQueue::start(storage),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().clone()
    }

    /// Receives the latest snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.state.subscribe()
    }

    pub fn create_list(&self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        self.mutate("create_list", |lists| {
            if lists.contains_key(name) {
                return false;
            }
            lists.insert(name.to_string(), Vec::new());
            true
        })
    }

    /// Appends `entry` unless the list already holds its symbol. A list that
    /// does not exist yet is created.
    pub fn add_entry(&self, name: &str, entry: StockEntry) -> bool {
        if name.is_empty() || !entry.is_valid() {
            return false;
        }
        self.mutate("add_entry", |lists| {
            let list = lists.entry(name.to_string()).or_default();
            if list.iter().any(|e| e.symbol == entry.symbol) {
                return false;
            }
            list.push(entry);
            true
        })
    }

    /// Drops `symbol` from the list. A list that does not exist yet is
    /// created empty.
    pub fn remove_entry(&self, name: &str, symbol: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        self.mutate("remove_entry", |lists| {
            let created = !lists.contains_key(name);
            let list = lists.entry(name.to_string()).or_default();
            let before = list.len();
            list.retain(|e| e.symbol != symbol);
            created || list.len() != before
        })
    }

    pub fn delete_list(&self, name: &str) -> bool {
        self.mutate("delete_list", |lists| lists.remove(name).is_some())
    }

    pub fn summaries(&self) -> Vec<WatchlistSummary> {
        self.snapshot()
            .iter()
            .map(|(name, entries)| WatchlistSummary {
                name: name.clone(),
                count: entries.len(),
                total_value: entries
                    .iter()
                    .map(|e| {
                        e.price
                            .trim()
                            .parse::<f64>()
                            .ok()
                            .filter(|v| v.is_finite())
                            .unwrap_or(0.0)
                    })
                    .sum(),
            })
            .collect()
    }

    /// Waits for every write queued so far.
    pub async fn flush(&self) {
        self.queue.flush().await;
    }

    fn mutate(&self, op: &str, apply: impl FnOnce(&mut Watchlists) -> bool) -> bool {
        let queue = &self.queue;
        let changed = self.state.send_if_modified(|current| {
            let mut next = Watchlists::clone(current);
            if !apply(&mut next) {
                return false;
            }
            match serde_json::to_string(&next) {
                Ok(json) => queue.enqueue(WATCHLISTS_KEY, json),
                Err(e) => error!("Failed to serialize watchlists after {}: {}", op, e),
            }
            *current = Arc::new(next);
            true
        });
        if !changed {
            debug!("{} left watchlists unchanged", op);
        }
        changed
    }
}

async fn load_watchlists(storage: &dyn KeyValueStorage) -> Watchlists {
    match storage.get(WATCHLISTS_KEY).await {
        Ok(Some(stored)) => match serde_json::from_str(&stored) {
            Ok(lists) => lists,
            Err(e) => {
                warn!("Ignoring unreadable stored watchlists: {}", e);
                Watchlists::new()
            }
        },
        Ok(None) => Watchlists::new(),
        Err(e) => {
            error!("Failed to load watchlists: {}", e);
            Watchlists::new()
        }
    }
}
