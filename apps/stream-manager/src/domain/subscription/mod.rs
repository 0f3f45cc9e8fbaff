//! Subscription Tracking Types
//!
//! Domain types for counting interest in subscription keys (price symbols
//! and wallet addresses) so that one backend subscription can serve many
//! consumers.
//!
//! # Design
//!
//! Each subscription class keeps:
//! - The set of keys currently wanted
//! - A reference count per key (how many callers want it)
//!
//! A key is in the set iff its count is at least 1. Only the key set is
//! durable; counts live in memory.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Types
// =============================================================================

/// A subscription key: a price symbol or a wallet address.
pub type SubscriptionKey = String;

/// Independent classes of streamed backend data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionClass {
    /// Token price updates keyed by symbol.
    Price,
    /// Wallet activity keyed by address.
    Wallet,
}

impl SubscriptionClass {
    /// Get all subscription classes.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Price, Self::Wallet]
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Wallet => "wallet",
        }
    }
}

impl fmt::Display for SubscriptionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Ref-Counted Key Set
// =============================================================================

/// Reference-counted key set for a single subscription class.
///
/// Keys in one call are treated as a set: duplicates inside the same
/// `acquire` or `release` count once.
#[derive(Debug, Default, Clone)]
pub struct RefCountedKeys {
    /// Map from key to number of interested callers (always >= 1).
    refcounts: HashMap<SubscriptionKey, usize>,
}

impl RefCountedKeys {
    /// Create an empty key set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a key set from persisted keys.
    ///
    /// Every key is seeded with a count of 1. Persisted state does not
    /// carry multiplicity, so a key that had several holders before a
    /// restart comes back with one.
    #[must_use]
    pub fn seeded(keys: impl IntoIterator<Item = SubscriptionKey>) -> Self {
        Self {
            refcounts: keys.into_iter().map(|key| (key, 1)).collect(),
        }
    }

    /// Register interest in keys.
    ///
    /// Returns keys whose count went 0→1, in input order.
    pub fn acquire(&mut self, keys: &[SubscriptionKey]) -> Vec<SubscriptionKey> {
        let mut activated = Vec::new();

        for key in distinct(keys) {
            let refcount = self.refcounts.entry(key.clone()).or_insert(0);
            *refcount += 1;

            if *refcount == 1 {
                activated.push(key.clone());
            }
        }

        activated
    }

    /// Release interest in keys.
    ///
    /// Returns keys whose last holder was released, in input order. Keys
    /// that are not tracked are ignored.
    pub fn release(&mut self, keys: &[SubscriptionKey]) -> Vec<SubscriptionKey> {
        let mut released = Vec::new();

        for key in distinct(keys) {
            let Some(refcount) = self.refcounts.get_mut(key) else {
                continue;
            };

            if *refcount <= 1 {
                self.refcounts.remove(key);
                released.push(key.clone());
            } else {
                *refcount -= 1;
            }
        }

        released
    }

    /// Remove every key regardless of count.
    ///
    /// Returns the keys that were tracked, sorted.
    pub fn drain(&mut self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<_> = self.refcounts.drain().map(|(key, _)| key).collect();
        keys.sort();
        keys
    }

    /// Get all tracked keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<_> = self.refcounts.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Get the reference count for a key (0 if untracked).
    #[must_use]
    pub fn refcount(&self, key: &str) -> usize {
        self.refcounts.get(key).copied().unwrap_or(0)
    }

    /// Check if a key is tracked.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.refcounts.contains_key(key)
    }

    /// Number of distinct tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.refcounts.len()
    }

    /// Check if no keys are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.refcounts.is_empty()
    }

    /// Sum of all reference counts.
    #[must_use]
    pub fn holder_count(&self) -> usize {
        self.refcounts.values().sum()
    }
}

fn distinct(keys: &[SubscriptionKey]) -> impl Iterator<Item = &SubscriptionKey> {
    let mut seen = HashSet::new();
    keys.iter().filter(move |key| seen.insert(key.as_str()))
}

// =============================================================================
// Statistics
// =============================================================================

/// Statistics for a single subscription class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubscriptionStats {
    /// Number of distinct keys.
    pub key_count: usize,
    /// Sum of reference counts across keys.
    pub holder_count: usize,
}

impl From<&RefCountedKeys> for SubscriptionStats {
    fn from(keys: &RefCountedKeys) -> Self {
        Self {
            key_count: keys.len(),
            holder_count: keys.holder_count(),
        }
    }
}

/// Statistics for both subscription classes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TotalSubscriptionStats {
    /// Price subscription stats.
    pub prices: SubscriptionStats,
    /// Wallet subscription stats.
    pub wallets: SubscriptionStats,
}

// =============================================================================
// Tests
// =============================================================================
