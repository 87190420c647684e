// src/preferences.rs
use crate::models::Theme;
use crate::storage::{KeyValueStorage, THEME_KEY};
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct ThemeStore {
    storage: Arc<dyn KeyValueStorage>,
    current: Mutex<Theme>,
}

impl ThemeStore {
    /// A stored theme wins over `fallback`.
    pub async fn load(storage: Arc<dyn KeyValueStorage>, fallback: Theme) -> Self {
        let theme = match storage.get(THEME_KEY).await {
            Ok(Some(stored)) => Theme::parse(&stored).unwrap_or_else(|| {
                warn!("Unknown stored theme {:?}, using {}", stored, fallback.as_str());
                fallback
            }),
            Ok(None) => fallback,
            Err(e) => {
                error!("Error loading theme: {}", e);
                fallback
            }
        };
        info!("Theme: {}", theme.as_str());
        Self {
            storage,
            current: Mutex::new(theme),
        }
    }

    pub async fn current(&self) -> Theme {
        *self.current.lock().await
    }

    /// Flips the theme and saves it. A failed save keeps the new theme in memory.
    pub async fn toggle(&self) -> Theme {
        let mut current = self.current.lock().await;
        *current = current.toggled();
        if let Err(e) = self.storage.set(THEME_KEY, current.as_str()).await {
            error!("Error saving theme: {}", e);
        }
        *current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_stored_theme_overrides_fallback() {
        let storage = Arc::new(MemoryStorage::with_value(THEME_KEY, "dark"));
        let themes = ThemeStore::load(storage, Theme::Light).await;
        assert_eq!(themes.current().await, Theme::Dark);
    }

    #[tokio::test]
    async fn test_missing_or_bad_theme_uses_fallback() {
        let empty = ThemeStore::load(Arc::new(MemoryStorage::new()), Theme::Dark).await;
        assert_eq!(empty.current().await, Theme::Dark);

        let garbage = Arc::new(MemoryStorage::with_value(THEME_KEY, "sepia"));
        assert_eq!(ThemeStore::load(garbage, Theme::Light).await.current().await, Theme::Light);

        let unreadable = Arc::new(MemoryStorage::with_value(THEME_KEY, "dark"));
        unreadable.fail_reads(true);
        assert_eq!(ThemeStore::load(unreadable, Theme::Light).await.current().await, Theme::Light);
    }

    #[tokio::test]
    async fn test_toggle_persists() {
        let storage = Arc::new(MemoryStorage::new());
        let themes = ThemeStore::load(storage.clone(), Theme::Light).await;

        assert_eq!(themes.toggle().await, Theme::Dark);
        assert_eq!(storage.value(THEME_KEY).as_deref(), Some("dark"));
        assert_eq!(themes.toggle().await, Theme::Light);
        assert_eq!(storage.value(THEME_KEY).as_deref(), Some("light"));
    }

    #[tokio::test]
    async fn test_toggle_survives_write_failure() {
        let storage = Arc::new(MemoryStorage::new());
        storage.fail_writes(true);
        let themes = ThemeStore::load(storage.clone(), Theme::Light).await;

        assert_eq!(themes.toggle().await, Theme::Dark);
        assert_eq!(themes.current().await, Theme::Dark);
        assert_eq!(storage.value(THEME_KEY), None);
    }
}
