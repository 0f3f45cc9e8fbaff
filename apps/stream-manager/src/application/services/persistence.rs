//! Persisted Manager State
//!
//! Layout of the three durable slots and tolerant load/save on top of a
//! `KeyValueStore`. Read failures fall back to "no prior value"; write
//! failures are logged. Neither is ever returned to callers.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::application::ports::{KeyValueStore, StorageError};
use crate::domain::preferences::StreamPreferences;
use crate::domain::subscription::{SubscriptionClass, SubscriptionKey};

/// Slot holding the price key set (JSON array of strings).
pub const PRICE_SUBSCRIPTIONS_KEY: &str = "stream.subscriptions.prices";

/// Slot holding the wallet key set (JSON array of strings).
pub const WALLET_SUBSCRIPTIONS_KEY: &str = "stream.subscriptions.wallets";

/// Slot holding the preferences object.
pub const PREFERENCES_KEY: &str = "stream.preferences";

/// Write-through persistence for subscription sets and preferences.
#[derive(Clone)]
pub struct PersistedState {
    store: Arc<dyn KeyValueStore>,
}

impl PersistedState {
    /// Wrap a key-value store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Slot name for a subscription class.
    #[must_use]
    pub const fn slot(class: SubscriptionClass) -> &'static str {
        match class {
            SubscriptionClass::Price => PRICE_SUBSCRIPTIONS_KEY,
            SubscriptionClass::Wallet => WALLET_SUBSCRIPTIONS_KEY,
        }
    }

    /// Load the persisted key set for a class (empty if absent or unreadable).
    #[must_use]
    pub fn load_keys(&self, class: SubscriptionClass) -> Vec<SubscriptionKey> {
        self.read(Self::slot(class)).unwrap_or_default()
    }

    /// Persist the key set for a class.
    pub fn save_keys(&self, class: SubscriptionClass, keys: &[SubscriptionKey]) {
        self.write(Self::slot(class), &keys);
    }

    /// Load preferences (defaults if absent or unreadable).
    #[must_use]
    pub fn load_preferences(&self) -> StreamPreferences {
        self.read::<StreamPreferences>(PREFERENCES_KEY)
            .map(StreamPreferences::sanitized)
            .unwrap_or_default()
    }

    /// Persist preferences.
    pub fn save_preferences(&self, preferences: &StreamPreferences) {
        self.write(PREFERENCES_KEY, preferences);
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to read persisted state");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Ignoring unparseable persisted state");
                None
            }
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let result = serde_json::to_string(value)
            .map_err(StorageError::from)
            .and_then(|raw| self.store.set(key, &raw));

        if let Err(e) = result {
            tracing::warn!(key, error = %e, "Failed to persist state");
        }
    }
}

impl std::fmt::Debug for PersistedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedState").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::InMemoryKeyValueStore;

    fn persisted() -> (Arc<InMemoryKeyValueStore>, PersistedState) {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let state = PersistedState::new(Arc::clone(&store) as Arc<dyn KeyValueStore>);
        (store, state)
    }

    #[test]
    fn keys_round_trip() {
        let (store, state) = persisted();

        state.save_keys(SubscriptionClass::Price, &["SOL".to_string()]);

        assert_eq!(
            store.get(PRICE_SUBSCRIPTIONS_KEY).unwrap().as_deref(),
            Some(r#"["SOL"]"#)
        );
        assert_eq!(state.load_keys(SubscriptionClass::Price), vec!["SOL"]);
        assert!(state.load_keys(SubscriptionClass::Wallet).is_empty());
    }

    #[test]
    fn corrupt_keys_load_as_empty() {
        let (store, state) = persisted();
        store.set(WALLET_SUBSCRIPTIONS_KEY, "{not json").unwrap();

        assert!(state.load_keys(SubscriptionClass::Wallet).is_empty());
    }

    #[test]
    fn missing_preferences_load_defaults() {
        let (_store, state) = persisted();
        assert_eq!(state.load_preferences(), StreamPreferences::default());
    }

    #[test]
    fn corrupt_preferences_load_defaults() {
        let (store, state) = persisted();
        store.set(PREFERENCES_KEY, "[1, 2, 3]").unwrap();

        assert_eq!(state.load_preferences(), StreamPreferences::default());
    }

    #[test]
    fn preferences_round_trip() {
        let (_store, state) = persisted();
        let prefs = StreamPreferences {
            enable_wallet_stream: false,
            price_throttle_ms: 250,
            ..StreamPreferences::default()
        };

        state.save_preferences(&prefs);

        assert_eq!(state.load_preferences(), prefs);
    }

    #[test]
    fn slots_are_distinct() {
        assert_ne!(
            PersistedState::slot(SubscriptionClass::Price),
            PersistedState::slot(SubscriptionClass::Wallet)
        );
    }
}
