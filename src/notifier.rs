//! Outbound boundary for domain events.

use crate::TableEvent;
use std::sync::Arc;
use tracing::info;

/// Receives events of committed table changes.
pub trait Notifier: Send + Sync {
    /// Delivers one event. Delivery failures are the notifier's concern.
    fn notify(&self, event: &TableEvent);
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, event: &TableEvent) {
        (**self).notify(event);
    }
}

/// Notifier that only writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: &TableEvent) {
        info!(table_id = %event.table_id(), event = event.name(), "Table event");
    }
}
