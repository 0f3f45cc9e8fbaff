//! Status Feed Port (Driven Port)
//!
//! Push boundary for provider status. Each item is a full status list;
//! the manager replaces its cache with every non-empty item.

use futures::stream::BoxStream;

use crate::domain::status::ConnectionStatus;

/// Live, possibly empty sequence of provider status lists.
pub type StatusFeed = BoxStream<'static, Vec<ConnectionStatus>>;
