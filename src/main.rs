//! Boardroom - command-line front end for the table engine.

#![warn(missing_docs)]

mod cli;

use anyhow::{Context, Result};
use boardroom::{
    EngineConfig, Mode, ModuleCatalog, Session, SqliteTables, TableId, TableService,
    TracingNotifier, UserId,
};
use boardroom_game::{GameModule, Options};
use boardroom_tictactoe::{TicTacToe, TicTacToeAction};
use clap::Parser;
use cli::{Cli, Command};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

type Service = TableService<TicTacToe, SqliteTables<TicTacToe>, TracingNotifier>;

fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(database) = cli.database {
        config = config.with_database_path(database);
    }
    if let Command::Demo {
        seed: Some(seed), ..
    } = cli.command
    {
        config = config.with_seed(seed);
    }

    let service = open_service(&config)?;

    match cli.command {
        Command::Demo { user, mode, .. } => run_demo(&service, &config, UserId::new(user), mode),
        Command::Show { table_id } => show_table(&service, table_id),
        Command::Tables { user, active } => list_tables(&service, &UserId::new(user), active),
    }
}

/// Opens the SQLite store and wraps it in a service.
#[instrument(skip(config), fields(database = %config.database_path()))]
fn open_service(config: &EngineConfig) -> Result<Service> {
    let catalog = ModuleCatalog::with(TicTacToe);
    let tables = SqliteTables::new(config.database_path().clone(), catalog.clone())?;
    tables.run_migrations()?;

    let mut service = TableService::new(catalog, tables, TracingNotifier)
        .with_max_retries(config.max_retries())
        .with_recent_limit(config.recent_limit());
    if let Some(seed) = config.seed() {
        service = service.with_seed(seed);
    }
    Ok(service)
}

/// Plays a full game: the user picks random free squares, the computer
/// answers with its automa.
#[instrument(skip(service, config))]
fn run_demo(service: &Service, config: &EngineConfig, user: UserId, mode: Mode) -> Result<()> {
    let session = service.create(TicTacToe::ID, mode, user.clone(), Options::new())?;
    let table_id = session.id();
    info!(%table_id, "Demo table created");

    service.add_computer(table_id, &user)?;
    service.start(table_id, &user)?;

    let mut rng = match config.seed() {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };

    let mut session = service.play_automa(table_id)?;
    while session.is_active() {
        let state = session.state().context("Started table without state")?;
        let square = *state
            .board()
            .valid_moves()
            .choose(&mut rng)
            .context("No free square left")?;

        println!("{} plays {}", user, square);
        session = service.perform(table_id, &user, &TicTacToeAction::Place(square))?;
        if session.is_active() {
            service.end_turn(table_id, &user)?;
        }
        session = service.play_automa(table_id)?;
    }

    print_table(&session);
    Ok(())
}

fn show_table(service: &Service, table_id: TableId) -> Result<()> {
    let session = service.find(table_id)?;
    print_table(&session);
    for entry in session.log().entries() {
        println!(
            "  {} {:<16} {}",
            entry.timestamp().format("%Y-%m-%d %H:%M:%S%.3f"),
            entry.log_type(),
            entry.parameters().join(" ")
        );
    }
    Ok(())
}

fn list_tables(service: &Service, user: &UserId, active: bool) -> Result<()> {
    let sessions = if active {
        service.active(user)?
    } else {
        service.recent(user)?
    };
    if sessions.is_empty() {
        println!("No tables for {}", user);
    }
    for session in sessions {
        println!(
            "{}  {:<10} {:<9} {:>3}%  updated {}",
            session.id(),
            session.status(),
            session.mode(),
            session.progress(),
            session.updated().format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

fn print_table(session: &Session<TicTacToe>) {
    println!(
        "Table {} ({}, {}, {} {}) owned by {}",
        session.id(),
        session.module().id(),
        session.status(),
        session.visibility(),
        session.table_type(),
        session.owner()
    );
    for player in session.players() {
        let who = player
            .user_id()
            .as_ref()
            .map_or_else(|| "computer".to_string(), UserId::to_string);
        let color = player
            .color()
            .map_or_else(|| "-".to_string(), |c| c.to_string());
        let outcome = if player.winner() { " winner" } else { "" };
        println!(
            "  {:<10} {:<6} {:<16} score {}{}",
            who,
            color,
            player.status(),
            player.score().map_or_else(|| "-".to_string(), |s| s.to_string()),
            outcome
        );
    }
    if let Some(state) = session.state() {
        println!("{}", state.board().display());
    }
}
