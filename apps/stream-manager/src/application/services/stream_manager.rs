//! Stream Subscription Manager
//!
//! Multiplexes many consumers onto one backend subscription per key,
//! persists what should be subscribed, and caches provider status.
//!
//! # Consistency
//!
//! Local state is updated optimistically inside a single critical section
//! and written through to storage before any backend call is made. The
//! lock is never held across an `.await`, so bookkeeping from other
//! callers can interleave with in-flight RPCs. A key whose count drops
//! back to zero while its subscribe RPC is still in flight stays
//! subscribed upstream until the next explicit unsubscribe or clear.
//! Failed RPCs are never rolled back locally; `reconcile` re-sends the
//! desired state.
//!
//! Storage writes happen synchronously under the state lock on the
//! calling thread, so a file-backed store puts its `write`, `fsync` and
//! `rename` on the async worker for every key-set change. Writes stay
//! ordered, which keeps last-write-wins exact.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::persistence::PersistedState;
use super::reconnect::{BackoffConfig, ReconnectBackoff};
use crate::application::ports::{
    BackendError, KeyValueStore, StatusFeed, StreamBackend, commands,
};
use crate::domain::preferences::{PreferencesPatch, StreamPreferences, StreamToggle};
use crate::domain::status::{self, ConnectionStatus, StatusSnapshot};
use crate::domain::subscription::{
    RefCountedKeys, SubscriptionClass, SubscriptionKey, SubscriptionStats, TotalSubscriptionStats,
};
use crate::infrastructure::metrics;

// =============================================================================
// Errors and Settings
// =============================================================================

/// Errors surfaced to callers of user-initiated operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamManagerError {
    /// The backend call failed. Local state was kept.
    #[error("{class} subscription update failed: {source}")]
    Subscription {
        /// Class whose update failed.
        class: SubscriptionClass,
        /// Underlying backend error.
        #[source]
        source: BackendError,
    },

    /// A non-subscription backend call failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Runtime settings for the manager.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManagerSettings {
    /// Backoff used for automatic provider reconnects.
    pub reconnect: BackoffConfig,
    /// Period of the background reconcile loop (`None` = disabled).
    pub reconcile_interval: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Subscribe,
    Unsubscribe,
}

impl Direction {
    const fn command(self, class: SubscriptionClass) -> &'static str {
        match (self, class) {
            (Self::Subscribe, SubscriptionClass::Price) => commands::SUBSCRIBE_PRICE_STREAM,
            (Self::Unsubscribe, SubscriptionClass::Price) => commands::UNSUBSCRIBE_PRICE_STREAM,
            (Self::Subscribe, SubscriptionClass::Wallet) => commands::SUBSCRIBE_WALLET_STREAM,
            (Self::Unsubscribe, SubscriptionClass::Wallet) => commands::UNSUBSCRIBE_WALLET_STREAM,
        }
    }
}

// =============================================================================
// Internal State
// =============================================================================

#[derive(Debug)]
struct ManagerState {
    preferences: StreamPreferences,
    prices: RefCountedKeys,
    wallets: RefCountedKeys,
}

impl ManagerState {
    const fn keys(&self, class: SubscriptionClass) -> &RefCountedKeys {
        match class {
            SubscriptionClass::Price => &self.prices,
            SubscriptionClass::Wallet => &self.wallets,
        }
    }

    const fn keys_mut(&mut self, class: SubscriptionClass) -> &mut RefCountedKeys {
        match class {
            SubscriptionClass::Price => &mut self.prices,
            SubscriptionClass::Wallet => &mut self.wallets,
        }
    }

    /// Current keys of every enabled class that has any.
    fn enabled_work(&self) -> Vec<(SubscriptionClass, Vec<SubscriptionKey>)> {
        SubscriptionClass::all()
            .iter()
            .filter(|&&class| self.preferences.is_enabled(class))
            .map(|&class| (class, self.keys(class).keys()))
            .filter(|(_, keys)| !keys.is_empty())
            .collect()
    }
}

#[derive(Debug, Default)]
struct ReconnectState {
    backoff: HashMap<String, ReconnectBackoff>,
    pending: HashSet<String>,
}

// =============================================================================
// Stream Manager
// =============================================================================

/// Process-wide subscription manager.
///
/// Construct once at startup, share as `Arc<StreamManager>`, call
/// [`StreamManager::init`] to hydrate and start background tasks, and
/// [`StreamManager::shutdown`] before exit.
pub struct StreamManager {
    backend: Arc<dyn StreamBackend>,
    persistence: PersistedState,
    settings: ManagerSettings,
    state: Mutex<ManagerState>,
    statuses: RwLock<Vec<ConnectionStatus>>,
    snapshot_tx: watch::Sender<StatusSnapshot>,
    reconnects: Mutex<ReconnectState>,
    initialized: AtomicBool,
    hydrated: AtomicBool,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StreamManager {
    /// Create a manager, loading preferences and key sets from storage.
    ///
    /// Persisted keys are seeded with a reference count of 1.
    #[must_use]
    pub fn new(
        backend: Arc<dyn StreamBackend>,
        store: Arc<dyn KeyValueStore>,
        settings: ManagerSettings,
    ) -> Self {
        let persistence = PersistedState::new(store);
        let preferences = persistence.load_preferences();
        let prices = RefCountedKeys::seeded(persistence.load_keys(SubscriptionClass::Price));
        let wallets = RefCountedKeys::seeded(persistence.load_keys(SubscriptionClass::Wallet));

        tracing::info!(
            prices = prices.len(),
            wallets = wallets.len(),
            price_stream = preferences.enable_price_stream,
            wallet_stream = preferences.enable_wallet_stream,
            "Loaded persisted subscription state"
        );
        metrics::set_tracked_keys(SubscriptionClass::Price, prices.len());
        metrics::set_tracked_keys(SubscriptionClass::Wallet, wallets.len());

        let (snapshot_tx, _) = watch::channel(StatusSnapshot::default());

        Self {
            backend,
            persistence,
            settings,
            state: Mutex::new(ManagerState {
                preferences,
                prices,
                wallets,
            }),
            statuses: RwLock::new(Vec::new()),
            snapshot_tx,
            reconnects: Mutex::new(ReconnectState::default()),
            initialized: AtomicBool::new(false),
            hydrated: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Hydrate the backend, pull status once, and start background tasks.
    ///
    /// Only the first call has any effect.
    pub async fn init(self: &Arc<Self>, feed: StatusFeed) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            tracing::debug!("Stream manager already initialized");
            return;
        }

        self.hydrate().await;

        if let Err(e) = self.refresh_status().await {
            tracing::warn!(error = %e, "Initial status fetch failed");
        }

        let manager = Arc::clone(self);
        self.track_task(tokio::spawn(async move {
            manager.run_status_feed(feed).await;
        }));

        if let Some(interval) = self.settings.reconcile_interval {
            let manager = Arc::clone(self);
            self.track_task(tokio::spawn(async move {
                manager.run_reconcile_loop(interval).await;
            }));
        }

        tracing::info!("Stream manager initialized");
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let handles = std::mem::take(&mut *self.tasks.lock());
        for handle in handles {
            if let Err(e) = handle.await
                && !e.is_cancelled()
            {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }

        tracing::info!("Stream manager stopped");
    }

    /// Re-issue subscribe calls for every persisted key of enabled classes.
    ///
    /// Runs at most once per manager; later calls are ignored. Failures
    /// are logged.
    pub async fn hydrate(&self) {
        if self.hydrated.swap(true, Ordering::SeqCst) {
            tracing::debug!("Hydration already ran");
            return;
        }

        let work = self.state.lock().enabled_work();
        for (class, keys) in work {
            tracing::info!(%class, count = keys.len(), "Rehydrating backend subscriptions");
            self.send_best_effort(class, Direction::Subscribe, &keys)
                .await;
        }
    }

    /// Re-send the desired key sets of enabled classes to the backend.
    pub async fn reconcile(&self) {
        let work = self.state.lock().enabled_work();
        for (class, keys) in work {
            tracing::debug!(%class, count = keys.len(), "Reconciling backend subscriptions");
            self.send_best_effort(class, Direction::Subscribe, &keys)
                .await;
        }
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Register interest in price symbols.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the subscribe call. Local
    /// state keeps the new counts.
    pub async fn subscribe_prices(&self, symbols: &[String]) -> Result<(), StreamManagerError> {
        self.subscribe(SubscriptionClass::Price, symbols).await
    }

    /// Release interest in price symbols.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the unsubscribe call.
    pub async fn unsubscribe_prices(&self, symbols: &[String]) -> Result<(), StreamManagerError> {
        self.unsubscribe(SubscriptionClass::Price, symbols).await
    }

    /// Register interest in wallet addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the subscribe call.
    pub async fn subscribe_wallets(&self, addresses: &[String]) -> Result<(), StreamManagerError> {
        self.subscribe(SubscriptionClass::Wallet, addresses).await
    }

    /// Release interest in wallet addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the unsubscribe call.
    pub async fn unsubscribe_wallets(
        &self,
        addresses: &[String],
    ) -> Result<(), StreamManagerError> {
        self.unsubscribe(SubscriptionClass::Wallet, addresses).await
    }

    /// Register interest in keys of a class.
    ///
    /// Keys whose count goes 0→1 are sent in one subscribe call, unless
    /// the class is disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the subscribe call.
    pub async fn subscribe(
        &self,
        class: SubscriptionClass,
        keys: &[SubscriptionKey],
    ) -> Result<(), StreamManagerError> {
        if keys.is_empty() {
            return Ok(());
        }

        let activated = {
            let mut state = self.state.lock();
            let activated = state.keys_mut(class).acquire(keys);
            if !activated.is_empty() {
                self.persist_keys(&state, class);
            }

            if state.preferences.is_enabled(class) {
                activated
            } else {
                if !activated.is_empty() {
                    tracing::debug!(%class, count = activated.len(), "Class disabled, tracking only");
                }
                Vec::new()
            }
        };

        if activated.is_empty() {
            return Ok(());
        }

        self.send(class, Direction::Subscribe, &activated)
            .await
            .map_err(|source| StreamManagerError::Subscription { class, source })
    }

    /// Release interest in keys of a class.
    ///
    /// Keys released by their last holder are sent in one unsubscribe
    /// call. Untracked keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the unsubscribe call.
    pub async fn unsubscribe(
        &self,
        class: SubscriptionClass,
        keys: &[SubscriptionKey],
    ) -> Result<(), StreamManagerError> {
        if keys.is_empty() {
            return Ok(());
        }

        let released = {
            let mut state = self.state.lock();
            let released = state.keys_mut(class).release(keys);
            if !released.is_empty() {
                self.persist_keys(&state, class);
            }
            released
        };

        if released.is_empty() {
            return Ok(());
        }

        self.send(class, Direction::Unsubscribe, &released)
            .await
            .map_err(|source| StreamManagerError::Subscription { class, source })
    }

    /// Drop every tracked key of both classes and unsubscribe upstream.
    ///
    /// Backend failures are logged.
    pub async fn clear_subscription_cache(&self) {
        let cleared = {
            let mut state = self.state.lock();
            let cleared: Vec<_> = SubscriptionClass::all()
                .iter()
                .map(|&class| (class, state.keys_mut(class).drain()))
                .collect();
            for &class in SubscriptionClass::all() {
                self.persist_keys(&state, class);
            }
            cleared
        };

        for (class, keys) in cleared {
            if keys.is_empty() {
                continue;
            }
            tracing::info!(%class, count = keys.len(), "Clearing subscriptions");
            self.send_best_effort(class, Direction::Unsubscribe, &keys)
                .await;
        }
    }

    // =========================================================================
    // Preferences
    // =========================================================================

    /// Merge a preferences patch and persist it.
    ///
    /// Disabling a class unsubscribes its keys upstream but keeps them
    /// tracked; enabling it again resubscribes them. Backend failures are
    /// logged. Returns the merged preferences.
    pub async fn update_preferences(&self, patch: PreferencesPatch) -> StreamPreferences {
        let (preferences, toggles) = {
            let mut state = self.state.lock();
            let toggles = state.preferences.apply(&patch);
            self.persistence.save_preferences(&state.preferences);

            let toggles: Vec<_> = toggles
                .into_iter()
                .map(|toggle| (toggle, state.keys(toggle.class()).keys()))
                .collect();
            (state.preferences, toggles)
        };

        for (toggle, keys) in toggles {
            tracing::info!(class = %toggle.class(), ?toggle, count = keys.len(), "Stream class toggled");
            if keys.is_empty() {
                continue;
            }
            match toggle {
                StreamToggle::Disabled(class) => {
                    self.send_best_effort(class, Direction::Unsubscribe, &keys)
                        .await;
                }
                StreamToggle::Enabled(class) => {
                    self.send_best_effort(class, Direction::Subscribe, &keys)
                        .await;
                }
            }
        }

        preferences
    }

    /// Current preferences.
    #[must_use]
    pub fn preferences(&self) -> StreamPreferences {
        self.state.lock().preferences
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Ask the backend to reconnect a provider.
    ///
    /// # Errors
    ///
    /// Returns the backend error unchanged; unknown providers are not
    /// checked locally.
    pub async fn reconnect(&self, provider_id: &str) -> Result<(), StreamManagerError> {
        metrics::record_rpc(commands::RECONNECT_STREAM);
        tracing::info!(provider = provider_id, "Reconnect requested");

        self.backend
            .reconnect_stream(provider_id)
            .await
            .inspect_err(|e| {
                metrics::record_rpc_failure(commands::RECONNECT_STREAM);
                tracing::warn!(provider = provider_id, error = %e, "Reconnect failed");
            })
            .map_err(StreamManagerError::from)
    }

    /// Pull provider status from the backend and replace the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the status call fails; the cache is unchanged.
    pub async fn refresh_status(&self) -> Result<Vec<ConnectionStatus>, StreamManagerError> {
        metrics::record_rpc(commands::GET_STREAM_STATUS);

        let statuses = self.backend.get_stream_status().await.inspect_err(|_| {
            metrics::record_rpc_failure(commands::GET_STREAM_STATUS);
        })?;

        self.replace_statuses(statuses.clone());
        Ok(statuses)
    }

    /// Apply one pushed status emission.
    ///
    /// Empty emissions are ignored; anything else replaces the cache.
    /// Returns whether the cache was replaced.
    ///
    /// Automatic reconnects are spawned on the current Tokio runtime.
    /// Outside a runtime the cache is still updated but no reconnect is
    /// scheduled.
    pub fn apply_status_update(self: &Arc<Self>, statuses: Vec<ConnectionStatus>) -> bool {
        if statuses.is_empty() {
            tracing::trace!("Ignoring empty status emission");
            return false;
        }

        metrics::record_status_update();
        self.schedule_reconnects(&statuses);
        self.replace_statuses(statuses);
        true
    }

    /// Cached status for a provider, matched case-insensitively.
    #[must_use]
    pub fn provider_status(&self, provider_id: &str) -> Option<ConnectionStatus> {
        status::find_provider(&self.statuses.read(), provider_id).cloned()
    }

    /// Cached status list.
    #[must_use]
    pub fn statuses(&self) -> Vec<ConnectionStatus> {
        self.statuses.read().clone()
    }

    /// True if any cached provider is connected.
    #[must_use]
    pub fn is_any_connected(&self) -> bool {
        status::is_any_connected(&self.statuses.read())
    }

    /// True if any cached provider is in fallback mode.
    #[must_use]
    pub fn is_fallback_active(&self) -> bool {
        status::is_fallback_active(&self.statuses.read())
    }

    /// Aggregate view of the cached status list.
    #[must_use]
    pub fn status_snapshot(&self) -> StatusSnapshot {
        *self.snapshot_tx.borrow()
    }

    /// Receiver notified whenever the aggregate status changes.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.snapshot_tx.subscribe()
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Tracked price symbols, sorted.
    #[must_use]
    pub fn price_subscriptions(&self) -> Vec<SubscriptionKey> {
        self.state.lock().prices.keys()
    }

    /// Tracked wallet addresses, sorted.
    #[must_use]
    pub fn wallet_subscriptions(&self) -> Vec<SubscriptionKey> {
        self.state.lock().wallets.keys()
    }

    /// Reference count of a key (0 if untracked).
    #[must_use]
    pub fn ref_count(&self, class: SubscriptionClass, key: &str) -> usize {
        self.state.lock().keys(class).refcount(key)
    }

    /// Subscription statistics for both classes.
    #[must_use]
    pub fn stats(&self) -> TotalSubscriptionStats {
        let state = self.state.lock();
        TotalSubscriptionStats {
            prices: SubscriptionStats::from(&state.prices),
            wallets: SubscriptionStats::from(&state.wallets),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn persist_keys(&self, state: &ManagerState, class: SubscriptionClass) {
        let keys = state.keys(class);
        self.persistence.save_keys(class, &keys.keys());
        metrics::set_tracked_keys(class, keys.len());
    }

    async fn send(
        &self,
        class: SubscriptionClass,
        direction: Direction,
        keys: &[SubscriptionKey],
    ) -> Result<(), BackendError> {
        let command = direction.command(class);
        metrics::record_rpc(command);
        tracing::debug!(command, ?keys, "Calling backend");

        let result = match (direction, class) {
            (Direction::Subscribe, SubscriptionClass::Price) => {
                self.backend.subscribe_price_stream(keys).await
            }
            (Direction::Unsubscribe, SubscriptionClass::Price) => {
                self.backend.unsubscribe_price_stream(keys).await
            }
            (Direction::Subscribe, SubscriptionClass::Wallet) => {
                self.backend.subscribe_wallet_stream(keys).await
            }
            (Direction::Unsubscribe, SubscriptionClass::Wallet) => {
                self.backend.unsubscribe_wallet_stream(keys).await
            }
        };

        if result.is_err() {
            metrics::record_rpc_failure(command);
        }
        result
    }

    async fn send_best_effort(
        &self,
        class: SubscriptionClass,
        direction: Direction,
        keys: &[SubscriptionKey],
    ) {
        if let Err(e) = self.send(class, direction, keys).await {
            tracing::warn!(
                command = direction.command(class),
                count = keys.len(),
                error = %e,
                "Best-effort backend call failed"
            );
        }
    }

    fn replace_statuses(&self, statuses: Vec<ConnectionStatus>) {
        let snapshot = StatusSnapshot::from_statuses(&statuses);
        *self.statuses.write() = statuses;

        metrics::set_connected_providers(snapshot.connected_count);
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                tracing::info!(
                    any_connected = snapshot.any_connected,
                    fallback_active = snapshot.fallback_active,
                    connected = snapshot.connected_count,
                    providers = snapshot.provider_count,
                    "Stream status changed"
                );
                *current = snapshot;
                true
            }
        });
    }

    fn schedule_reconnects(self: &Arc<Self>, statuses: &[ConnectionStatus]) {
        let auto_reconnect = self.state.lock().preferences.auto_reconnect;
        let mut due = Vec::new();

        {
            let mut reconnects = self.reconnects.lock();
            let ReconnectState { backoff, pending } = &mut *reconnects;

            for status in statuses {
                if status.state.is_connected() {
                    backoff.remove(&status.provider);
                    continue;
                }
                if !auto_reconnect
                    || !status.state.is_down()
                    || pending.contains(&status.provider)
                {
                    continue;
                }

                let policy = backoff
                    .entry(status.provider.clone())
                    .or_insert_with(|| ReconnectBackoff::new(self.settings.reconnect.clone()));

                match policy.next_delay() {
                    Some(delay) => {
                        pending.insert(status.provider.clone());
                        due.push((status.provider.clone(), delay, policy.attempts()));
                    }
                    None => {
                        tracing::warn!(
                            provider = %status.provider,
                            attempts = policy.attempts(),
                            "Auto-reconnect attempts exhausted"
                        );
                    }
                }
            }
        }

        for (provider, delay, attempt) in due {
            tracing::info!(
                %provider,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Scheduling provider reconnect"
            );
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                tracing::warn!(%provider, "No async runtime, skipping automatic reconnect");
                self.reconnects.lock().pending.remove(&provider);
                continue;
            };
            let manager = Arc::clone(self);
            self.track_task(runtime.spawn(async move {
                manager.run_scheduled_reconnect(provider, delay).await;
            }));
        }
    }

    async fn run_scheduled_reconnect(self: Arc<Self>, provider: String, delay: Duration) {
        tokio::select! {
            () = self.shutdown.cancelled() => {
                self.reconnects.lock().pending.remove(&provider);
                return;
            }
            () = tokio::time::sleep(delay) => {}
        }

        metrics::record_reconnect(&provider);
        if let Err(e) = self.reconnect(&provider).await {
            tracing::warn!(%provider, error = %e, "Automatic reconnect failed");
        }

        self.reconnects.lock().pending.remove(&provider);
    }

    async fn run_status_feed(self: Arc<Self>, mut feed: StatusFeed) {
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                next = feed.next() => match next {
                    Some(statuses) => {
                        self.apply_status_update(statuses);
                    }
                    None => {
                        tracing::info!("Status feed ended");
                        break;
                    }
                },
            }
        }
    }

    async fn run_reconcile_loop(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately and hydration just ran.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                _ = ticker.tick() => self.reconcile().await,
            }
        }
    }

    fn track_task(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }
}

impl std::fmt::Debug for StreamManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamManager")
            .field("settings", &self.settings)
            .field("state", &*self.state.lock())
            .field("statuses", &*self.statuses.read())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
