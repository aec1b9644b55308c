//! Tables: the session aggregate and everything it is made of.

mod context;
mod error;
mod event;
mod ids;
pub mod invariants;
mod log;
mod player;
mod session;
mod state;

pub use context::{Clock, ManualClock, SystemClock, TableContext};
pub use error::{IllegalStateTransition, InternalError, TableError, ValidationError};
pub use event::TableEvent;
pub use ids::{TableId, UserId};
pub use log::{Log, LogEntry, LogType};
pub use player::{Player, PlayerStatus};
pub(crate) use session::RestoredSession;
pub use session::{Mode, Session, Status, TableType, Visibility};
pub use state::{CurrentState, HISTORY_RETENTION, HistoricState, HistoryRef};
