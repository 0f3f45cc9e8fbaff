//! Connection Status Types
//!
//! Backend-owned status of each streaming provider, and the aggregate
//! flags derived from the latest status list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection state of a backend provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Connection attempt in progress.
    #[serde(alias = "connecting")]
    Connecting,
    /// Connected and streaming.
    #[serde(alias = "connected")]
    Connected,
    /// Not connected.
    #[serde(alias = "disconnected")]
    Disconnected,
    /// Backend is retrying a dropped connection.
    #[serde(alias = "reconnecting")]
    Reconnecting,
    /// Connection failed.
    #[serde(alias = "error")]
    Error,
    /// A state this client does not know about.
    #[serde(other)]
    Unknown,
}

impl ConnectionState {
    /// Whether the provider is streaming.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether the provider is down and not recovering on its own.
    #[must_use]
    pub const fn is_down(self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }

    /// Lowercase name for logs and health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

/// Degraded-mode information reported by a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackStatus {
    /// Whether the provider is serving data through its fallback path.
    pub active: bool,
    /// Why fallback was entered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Traffic counters reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamStatistics {
    /// Messages received since the connection opened.
    pub messages_received: u64,
    /// Bytes received since the connection opened.
    pub bytes_received: u64,
}

/// Status of one backend provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    /// Provider name (e.g. "birdeye", "helius").
    pub provider: String,
    /// Connection state.
    pub state: ConnectionState,
    /// Fallback information, if the provider reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackStatus>,
    /// Time of the last message received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    /// Traffic counters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<StreamStatistics>,
}

impl ConnectionStatus {
    /// Create a status with only provider and state set.
    #[must_use]
    pub fn new(provider: impl Into<String>, state: ConnectionState) -> Self {
        Self {
            provider: provider.into(),
            state,
            fallback: None,
            last_message_at: None,
            statistics: None,
        }
    }

    /// Attach fallback information.
    #[must_use]
    pub fn with_fallback(mut self, active: bool, reason: Option<String>) -> Self {
        self.fallback = Some(FallbackStatus { active, reason });
        self
    }

    /// Whether this provider reports an active fallback.
    #[must_use]
    pub fn is_fallback_active(&self) -> bool {
        self.fallback.as_ref().is_some_and(|f| f.active)
    }
}

/// True if any provider is connected.
#[must_use]
pub fn is_any_connected(statuses: &[ConnectionStatus]) -> bool {
    statuses.iter().any(|s| s.state.is_connected())
}

/// True if any provider reports an active fallback.
#[must_use]
pub fn is_fallback_active(statuses: &[ConnectionStatus]) -> bool {
    statuses.iter().any(ConnectionStatus::is_fallback_active)
}

/// Case-insensitive lookup by provider name.
#[must_use]
pub fn find_provider<'a>(
    statuses: &'a [ConnectionStatus],
    provider: &str,
) -> Option<&'a ConnectionStatus> {
    statuses
        .iter()
        .find(|s| s.provider.eq_ignore_ascii_case(provider))
}

/// Aggregate view of the cached status list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// At least one provider is connected.
    pub any_connected: bool,
    /// At least one provider is in fallback mode.
    pub fallback_active: bool,
    /// Number of providers in the list.
    pub provider_count: usize,
    /// Number of connected providers.
    pub connected_count: usize,
}

impl StatusSnapshot {
    /// Derive the aggregate from a status list.
    #[must_use]
    pub fn from_statuses(statuses: &[ConnectionStatus]) -> Self {
        Self {
            any_connected: is_any_connected(statuses),
            fallback_active: is_fallback_active(statuses),
            provider_count: statuses.len(),
            connected_count: statuses.iter().filter(|s| s.state.is_connected()).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("\"Connected\"", ConnectionState::Connected ; "pascal connected")]
    #[test_case("\"connected\"", ConnectionState::Connected ; "lower connected")]
    #[test_case("\"Disconnected\"", ConnectionState::Disconnected ; "pascal disconnected")]
    #[test_case("\"error\"", ConnectionState::Error ; "lower error")]
    #[test_case("\"Reconnecting\"", ConnectionState::Reconnecting ; "reconnecting")]
    #[test_case("\"Fallback\"", ConnectionState::Unknown ; "unknown variant")]
    fn connection_state_parsing(json: &str, expected: ConnectionState) {
        let state: ConnectionState = serde_json::from_str(json).unwrap();
        assert_eq!(state, expected);
    }

    #[test]
    fn status_deserializes_backend_payload() {
        let json = r#"{
            "provider": "birdeye",
            "state": "Connected",
            "fallback": {"active": true, "reason": "socket closed"},
            "statistics": {"messagesReceived": 42, "bytesReceived": 1024}
        }"#;
        let status: ConnectionStatus = serde_json::from_str(json).unwrap();

        assert_eq!(status.provider, "birdeye");
        assert_eq!(status.state, ConnectionState::Connected);
        assert!(status.is_fallback_active());
        assert_eq!(status.statistics.unwrap().messages_received, 42);
        assert!(status.last_message_at.is_none());
    }

    #[test]
    fn status_without_fallback_is_not_fallback_active() {
        let status = ConnectionStatus::new("helius", ConnectionState::Connected);
        assert!(!status.is_fallback_active());
    }

    #[test]
    fn any_connected_with_mixed_statuses() {
        let statuses = vec![
            ConnectionStatus::new("birdeye", ConnectionState::Connected),
            ConnectionStatus::new("helius", ConnectionState::Disconnected),
        ];
        assert!(is_any_connected(&statuses));

        let down = vec![
            ConnectionStatus::new("birdeye", ConnectionState::Error),
            ConnectionStatus::new("helius", ConnectionState::Disconnected),
        ];
        assert!(!is_any_connected(&down));
        assert!(!is_any_connected(&[]));
    }

    #[test]
    fn fallback_active_is_or_over_providers() {
        let statuses = vec![
            ConnectionStatus::new("birdeye", ConnectionState::Connected).with_fallback(false, None),
            ConnectionStatus::new("helius", ConnectionState::Connecting)
                .with_fallback(true, Some("polling".to_string())),
        ];
        assert!(is_fallback_active(&statuses));
        assert!(!is_fallback_active(&statuses[..1]));
    }

    #[test]
    fn find_provider_ignores_case() {
        let statuses = vec![ConnectionStatus::new("Birdeye", ConnectionState::Connected)];

        assert!(find_provider(&statuses, "birdeye").is_some());
        assert!(find_provider(&statuses, "BIRDEYE").is_some());
        assert!(find_provider(&statuses, "helius").is_none());
    }

    #[test]
    fn snapshot_counts() {
        let statuses = vec![
            ConnectionStatus::new("birdeye", ConnectionState::Connected),
            ConnectionStatus::new("helius", ConnectionState::Error).with_fallback(true, None),
        ];
        let snapshot = StatusSnapshot::from_statuses(&statuses);

        assert!(snapshot.any_connected);
        assert!(snapshot.fallback_active);
        assert_eq!(snapshot.provider_count, 2);
        assert_eq!(snapshot.connected_count, 1);
    }
}
