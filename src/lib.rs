//! Boardroom - turn-based multiplayer table engine
//!
//! Hosts asynchronous, turn-based matches for pluggable board-game rule
//! modules. A [`Session`] owns the roster, turn ownership and an undoable
//! history of module states; a [`TableService`] drives sessions through a
//! [`Tables`] repository with optimistic versioning and publishes their
//! events to a [`Notifier`].
//!
//! # Architecture
//!
//! - **Table**: the session aggregate, its log, events and history
//! - **Repository**: in-memory and SQLite stores with version checks
//! - **Service**: load-apply-write with retry on conflict
//! - **Catalog**: rule modules by game id
//!
//! # Example
//!
//! ```
//! use boardroom::{InMemoryTables, Mode, ModuleCatalog, TableService, TracingNotifier, UserId};
//! use boardroom_game::Options;
//! use boardroom_tictactoe::TicTacToe;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = TableService::new(
//!     ModuleCatalog::with(TicTacToe),
//!     InMemoryTables::new(),
//!     TracingNotifier,
//! )
//! .with_seed(7);
//!
//! let alice = UserId::new("alice");
//! let table = service.create(TicTacToe::ID, Mode::Normal, alice.clone(), Options::new())?;
//! service.add_computer(table.id(), &alice)?;
//! let table = service.start(table.id(), &alice)?;
//! assert!(table.is_active());
//! # Ok(())
//! # }
//! # example().expect("example runs");
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod catalog;
mod config;
mod db;
mod notifier;
mod repository;
mod service;
mod table;

// Crate-level exports - Tables
pub use table::invariants;
pub use table::{
    Clock, CurrentState, HISTORY_RETENTION, HistoricState, HistoryRef, IllegalStateTransition,
    InternalError, Log, LogEntry, LogType, ManualClock, Mode, Player, PlayerStatus, Session,
    Status, SystemClock, TableContext, TableError, TableEvent, TableId, TableType, UserId,
    ValidationError, Visibility,
};

// Crate-level exports - Catalog
pub use catalog::ModuleCatalog;

// Crate-level exports - Repository
pub use db::{MIGRATIONS, SqliteTables};
pub use repository::{InMemoryTables, RepositoryError, StorageError, Tables};

// Crate-level exports - Service
pub use notifier::{Notifier, TracingNotifier};
pub use service::{
    DEFAULT_MAX_RETRIES, DEFAULT_RECENT_LIMIT, ServiceError, ServiceResult, TableService,
};

// Crate-level exports - Configuration
pub use config::{ConfigError, EngineConfig};
