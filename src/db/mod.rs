//! SQLite persistence for tables and their state history.

mod error;
mod models;
mod schema; // Diesel generated schema - internal use only
mod tables;

pub use tables::{MIGRATIONS, SqliteTables};
