//! Stream Preferences
//!
//! User preferences controlling which stream classes are active and how
//! the backend should pace and recover its feeds.

use serde::{Deserialize, Serialize};

use crate::domain::subscription::SubscriptionClass;

/// Default fallback polling interval in milliseconds.
pub const DEFAULT_FALLBACK_INTERVAL_MS: u64 = 5_000;

/// Default minimum spacing between price updates in milliseconds.
pub const DEFAULT_PRICE_THROTTLE_MS: u64 = 1_000;

/// Persisted stream preferences.
///
/// Stored as camelCase JSON. Missing fields take their default, and
/// non-positive intervals are replaced by the default on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamPreferences {
    /// Reconnect dropped providers automatically.
    pub auto_reconnect: bool,
    /// Polling interval used while a provider runs in fallback mode.
    pub fallback_interval_ms: u64,
    /// Minimum spacing between price updates for one symbol.
    pub price_throttle_ms: u64,
    /// Whether price subscriptions reach the backend.
    pub enable_price_stream: bool,
    /// Whether wallet subscriptions reach the backend.
    pub enable_wallet_stream: bool,
}

impl Default for StreamPreferences {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            fallback_interval_ms: DEFAULT_FALLBACK_INTERVAL_MS,
            price_throttle_ms: DEFAULT_PRICE_THROTTLE_MS,
            enable_price_stream: true,
            enable_wallet_stream: true,
        }
    }
}

impl StreamPreferences {
    /// Whether the given class is enabled.
    #[must_use]
    pub const fn is_enabled(&self, class: SubscriptionClass) -> bool {
        match class {
            SubscriptionClass::Price => self.enable_price_stream,
            SubscriptionClass::Wallet => self.enable_wallet_stream,
        }
    }

    /// Replace zero intervals with defaults.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        if self.fallback_interval_ms == 0 {
            tracing::warn!("Stored fallbackIntervalMs is zero, using default");
            self.fallback_interval_ms = DEFAULT_FALLBACK_INTERVAL_MS;
        }
        if self.price_throttle_ms == 0 {
            tracing::warn!("Stored priceThrottleMs is zero, using default");
            self.price_throttle_ms = DEFAULT_PRICE_THROTTLE_MS;
        }
        self
    }

    /// Merge a partial update.
    ///
    /// Zero intervals in the patch are rejected and the current value kept.
    /// Returns the enable-flag transitions caused by the merge.
    pub fn apply(&mut self, patch: &PreferencesPatch) -> Vec<StreamToggle> {
        let before = *self;

        if let Some(auto_reconnect) = patch.auto_reconnect {
            self.auto_reconnect = auto_reconnect;
        }
        match patch.fallback_interval_ms {
            Some(0) => tracing::warn!("Ignoring fallbackIntervalMs of zero"),
            Some(ms) => self.fallback_interval_ms = ms,
            None => {}
        }
        match patch.price_throttle_ms {
            Some(0) => tracing::warn!("Ignoring priceThrottleMs of zero"),
            Some(ms) => self.price_throttle_ms = ms,
            None => {}
        }
        if let Some(enabled) = patch.enable_price_stream {
            self.enable_price_stream = enabled;
        }
        if let Some(enabled) = patch.enable_wallet_stream {
            self.enable_wallet_stream = enabled;
        }

        SubscriptionClass::all()
            .iter()
            .filter_map(|&class| {
                match (before.is_enabled(class), self.is_enabled(class)) {
                    (true, false) => Some(StreamToggle::Disabled(class)),
                    (false, true) => Some(StreamToggle::Enabled(class)),
                    _ => None,
                }
            })
            .collect()
    }
}

/// Partial preferences update. `None` fields are left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesPatch {
    /// New auto-reconnect flag.
    pub auto_reconnect: Option<bool>,
    /// New fallback polling interval.
    pub fallback_interval_ms: Option<u64>,
    /// New price throttle.
    pub price_throttle_ms: Option<u64>,
    /// New price stream flag.
    pub enable_price_stream: Option<bool>,
    /// New wallet stream flag.
    pub enable_wallet_stream: Option<bool>,
}

impl PreferencesPatch {
    /// Patch that only toggles one class.
    #[must_use]
    pub const fn toggle(class: SubscriptionClass, enabled: bool) -> Self {
        let mut patch = Self {
            auto_reconnect: None,
            fallback_interval_ms: None,
            price_throttle_ms: None,
            enable_price_stream: None,
            enable_wallet_stream: None,
        };
        match class {
            SubscriptionClass::Price => patch.enable_price_stream = Some(enabled),
            SubscriptionClass::Wallet => patch.enable_wallet_stream = Some(enabled),
        }
        patch
    }
}

/// A change of a class enable flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamToggle {
    /// The class went from disabled to enabled.
    Enabled(SubscriptionClass),
    /// The class went from enabled to disabled.
    Disabled(SubscriptionClass),
}

impl StreamToggle {
    /// The class whose flag changed.
    #[must_use]
    pub const fn class(self) -> SubscriptionClass {
        match self {
            Self::Enabled(class) | Self::Disabled(class) => class,
        }
    }
}
