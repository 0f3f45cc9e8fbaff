//! Shared fixtures for integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use stream_manager::{
    BackendError, ConnectionStatus, InMemoryKeyValueStore, KeyValueStore, ManagerSettings,
    StreamBackend, StreamManager,
};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SubscribePrices(Vec<String>),
    UnsubscribePrices(Vec<String>),
    SubscribeWallets(Vec<String>),
    UnsubscribeWallets(Vec<String>),
    GetStatus,
    Reconnect(String),
}

/// Backend that records every call and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<Call>>,
    statuses: Mutex<Vec<ConnectionStatus>>,
    fail_subscriptions: AtomicBool,
    fail_reconnects: AtomicBool,
}

impl RecordingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Calls other than status polls.
    pub fn subscription_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, Call::GetStatus | Call::Reconnect(_)))
            .collect()
    }

    pub fn reconnects(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Reconnect(provider) => Some(provider),
                _ => None,
            })
            .collect()
    }

    pub fn set_statuses(&self, statuses: Vec<ConnectionStatus>) {
        *self.statuses.lock() = statuses;
    }

    pub fn fail_subscriptions(&self, fail: bool) {
        self.fail_subscriptions.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reconnects(&self, fail: bool) {
        self.fail_reconnects.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: Call) -> Result<(), BackendError> {
        let command = match &call {
            Call::SubscribePrices(_) => "subscribe_price_stream",
            Call::UnsubscribePrices(_) => "unsubscribe_price_stream",
            Call::SubscribeWallets(_) => "subscribe_wallet_stream",
            Call::UnsubscribeWallets(_) => "unsubscribe_wallet_stream",
            Call::GetStatus => "get_stream_status",
            Call::Reconnect(_) => "reconnect_stream",
        };
        let fail = match &call {
            Call::Reconnect(_) => self.fail_reconnects.load(Ordering::SeqCst),
            Call::GetStatus => false,
            _ => self.fail_subscriptions.load(Ordering::SeqCst),
        };
        self.calls.lock().push(call);

        if fail {
            Err(BackendError::Rejected {
                command: command.to_string(),
                message: "backend unavailable".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StreamBackend for RecordingBackend {
    async fn subscribe_price_stream(&self, symbols: &[String]) -> Result<(), BackendError> {
        self.record(Call::SubscribePrices(symbols.to_vec()))
    }

    async fn unsubscribe_price_stream(&self, symbols: &[String]) -> Result<(), BackendError> {
        self.record(Call::UnsubscribePrices(symbols.to_vec()))
    }

    async fn subscribe_wallet_stream(&self, addresses: &[String]) -> Result<(), BackendError> {
        self.record(Call::SubscribeWallets(addresses.to_vec()))
    }

    async fn unsubscribe_wallet_stream(&self, addresses: &[String]) -> Result<(), BackendError> {
        self.record(Call::UnsubscribeWallets(addresses.to_vec()))
    }

    async fn get_stream_status(&self) -> Result<Vec<ConnectionStatus>, BackendError> {
        self.record(Call::GetStatus)?;
        Ok(self.statuses.lock().clone())
    }

    async fn reconnect_stream(&self, provider_id: &str) -> Result<(), BackendError> {
        self.record(Call::Reconnect(provider_id.to_string()))
    }
}

pub fn keys(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

pub fn manager(
    backend: &Arc<RecordingBackend>,
    store: &Arc<InMemoryKeyValueStore>,
) -> Arc<StreamManager> {
    manager_with(backend, store, ManagerSettings::default())
}

pub fn manager_with(
    backend: &Arc<RecordingBackend>,
    store: &Arc<InMemoryKeyValueStore>,
    settings: ManagerSettings,
) -> Arc<StreamManager> {
    Arc::new(StreamManager::new(
        Arc::clone(backend) as Arc<dyn StreamBackend>,
        Arc::clone(store) as Arc<dyn KeyValueStore>,
        settings,
    ))
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 2s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
