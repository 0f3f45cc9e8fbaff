//! Polling status feed.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;

use crate::application::ports::{StatusFeed, StreamBackend};

/// Status feed that calls `get_stream_status` every `interval`.
///
/// Failed polls are logged and skipped. The first poll happens after one
/// full interval; callers pull once on startup themselves.
#[must_use]
pub fn polling_status_feed(backend: Arc<dyn StreamBackend>, interval: Duration) -> StatusFeed {
    let start = tokio::time::Instant::now() + interval;
    let mut ticker = tokio::time::interval_at(start, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    IntervalStream::new(ticker)
        .then(move |_| {
            let backend = Arc::clone(&backend);
            async move {
                match backend.get_stream_status().await {
                    Ok(statuses) => Some(statuses),
                    Err(e) => {
                        tracing::warn!(error = %e, "Status poll failed");
                        None
                    }
                }
            }
        })
        .filter_map(std::future::ready)
        .boxed()
}
