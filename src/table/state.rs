//! Live state and its undoable history.
//!
//! Every successful mutation turns the live [`CurrentState`] into an
//! immutable [`HistoricState`] and links the replacement back to it. The
//! chain is strictly time-ordered and shared through `Arc`, so cloning a
//! session never copies history. A [`HistoryRef`] can also be lazy: storage
//! hands out a resolver and the node is fetched on first access only.

use crate::repository::StorageError;
use chrono::{DateTime, TimeDelta, Utc};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// How long a historic state stays available.
pub const HISTORY_RETENTION: TimeDelta = TimeDelta::days(365);

type Resolver<S> = Arc<dyn Fn() -> Result<Arc<HistoricState<S>>, StorageError> + Send + Sync>;

/// Reference to a historic state, resolved now or on first access.
pub struct HistoryRef<S> {
    timestamp: DateTime<Utc>,
    node: Arc<OnceLock<Arc<HistoricState<S>>>>,
    resolver: Option<Resolver<S>>,
}

impl<S> Clone for HistoryRef<S> {
    fn clone(&self) -> Self {
        Self {
            timestamp: self.timestamp,
            node: Arc::clone(&self.node),
            resolver: self.resolver.clone(),
        }
    }
}

impl<S> fmt::Debug for HistoryRef<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryRef")
            .field("timestamp", &self.timestamp)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl<S> HistoryRef<S> {
    /// Reference to a node already in memory.
    pub fn resolved(node: Arc<HistoricState<S>>) -> Self {
        let cell = OnceLock::new();
        let timestamp = node.timestamp;
        let _ = cell.set(node);
        Self {
            timestamp,
            node: Arc::new(cell),
            resolver: None,
        }
    }

    /// Reference resolved by `resolver` on first access.
    pub fn lazy(
        timestamp: DateTime<Utc>,
        resolver: impl Fn() -> Result<Arc<HistoricState<S>>, StorageError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            timestamp,
            node: Arc::new(OnceLock::new()),
            resolver: Some(Arc::new(resolver)),
        }
    }

    /// Timestamp of the referenced node, known without resolving.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether the node is in memory.
    pub fn is_resolved(&self) -> bool {
        self.node.get().is_some()
    }

    /// The referenced node, loading it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the resolver fails. A failed load is not
    /// cached and will be retried on the next access.
    pub fn get(&self) -> Result<Arc<HistoricState<S>>, StorageError> {
        if let Some(node) = self.node.get() {
            return Ok(Arc::clone(node));
        }

        let resolver = self
            .resolver
            .as_ref()
            .ok_or_else(|| StorageError::new("Unresolved history reference without resolver"))?;

        debug!(timestamp = %self.timestamp, "Resolving historic state");
        let node = resolver()?;
        Ok(Arc::clone(self.node.get_or_init(|| node)))
    }
}

/// Immutable snapshot in the history chain.
#[derive(Debug)]
pub struct HistoricState<S> {
    timestamp: DateTime<Utc>,
    previous: Option<HistoryRef<S>>,
    state: S,
    expires: DateTime<Utc>,
}

impl<S> HistoricState<S> {
    /// Snapshot taken at `timestamp`, retained for [`HISTORY_RETENTION`].
    pub fn new(timestamp: DateTime<Utc>, previous: Option<HistoryRef<S>>, state: S) -> Self {
        Self {
            timestamp,
            previous,
            state,
            expires: timestamp + HISTORY_RETENTION,
        }
    }

    /// Snapshot as loaded from storage.
    pub(crate) fn restored(
        timestamp: DateTime<Utc>,
        previous: Option<HistoryRef<S>>,
        state: S,
        expires: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            previous,
            state,
            expires,
        }
    }

    /// When this state was live.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Predecessor, if any.
    pub fn previous(&self) -> Option<&HistoryRef<S>> {
        self.previous.as_ref()
    }

    /// Module state value.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// End of retention.
    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    /// Whether the snapshot may still be used at `now`.
    pub fn is_retained(&self, now: DateTime<Utc>) -> bool {
        now < self.expires
    }
}

/// The live state of a started table.
#[derive(Debug, Clone)]
pub struct CurrentState<S> {
    state: S,
    timestamp: DateTime<Utc>,
    previous: Option<HistoryRef<S>>,
    changed: bool,
}

impl<S: Clone> CurrentState<S> {
    /// First state of a game.
    pub(crate) fn initial(state: S, timestamp: DateTime<Utc>) -> Self {
        Self {
            state,
            timestamp,
            previous: None,
            changed: true,
        }
    }

    /// State as loaded from storage.
    pub(crate) fn restored(
        state: S,
        timestamp: DateTime<Utc>,
        previous: Option<HistoryRef<S>>,
    ) -> Self {
        Self {
            state,
            timestamp,
            previous,
            changed: false,
        }
    }

    /// Successor whose back-pointer is this state, frozen.
    pub(crate) fn advance(&self, state: S, timestamp: DateTime<Utc>) -> Self {
        let frozen = HistoricState::new(self.timestamp, self.previous.clone(), self.state.clone());
        Self {
            state,
            timestamp,
            previous: Some(HistoryRef::resolved(Arc::new(frozen))),
            changed: true,
        }
    }

    /// Live state copied from a historic node, continuing its chain.
    pub(crate) fn revert_to(node: &HistoricState<S>, timestamp: DateTime<Utc>) -> Self {
        Self {
            state: node.state.clone(),
            timestamp,
            previous: node.previous.clone(),
            changed: true,
        }
    }

    /// Module state value.
    pub fn state(&self) -> &S {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// When this state became live.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Back-pointer into history.
    pub fn previous(&self) -> Option<&HistoryRef<S>> {
        self.previous.as_ref()
    }

    /// Whether storage still has to write this state.
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.changed = false;
    }
}
