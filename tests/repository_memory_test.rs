//! Tests for the in-memory table store.

mod common;

use boardroom::{InMemoryTables, Mode, RepositoryError, TableId, Tables};
use common::{Counting, alice, bob, carol, manual_context, new_table, started_table};

#[test]
fn test_add_and_find() {
    let (_clock, mut ctx) = manual_context(80);
    let tables: InMemoryTables<Counting> = InMemoryTables::new();
    let mut session = new_table(&mut ctx, Mode::Normal);

    tables.add(&mut session).expect("add");
    assert_eq!(tables.len().expect("len"), 1);

    let loaded = tables.find_by_id(session.id()).expect("find");
    assert_eq!(loaded.id(), session.id());
    assert_eq!(loaded.version(), 1);
    assert_eq!(loaded.players(), session.players());
    assert!(loaded.pending_events().is_empty(), "events are not stored");
    assert!(!session.pending_events().is_empty(), "caller keeps its events");

    let err = tables.add(&mut session).expect_err("duplicate id");
    assert!(matches!(err, RepositoryError::Storage(_)));
}

#[test]
fn test_find_unknown_table() {
    let tables: InMemoryTables<Counting> = InMemoryTables::new();
    let id = TableId::generate();

    let err = tables.find_by_id(id).expect_err("missing");
    assert_eq!(err, RepositoryError::NotFound(id));
}

#[test]
fn test_update_bumps_version() {
    let (_clock, mut ctx) = manual_context(81);
    let tables: InMemoryTables<Counting> = InMemoryTables::new();
    let mut session = new_table(&mut ctx, Mode::Normal);
    tables.add(&mut session).expect("add");

    let mut loaded = tables.find_by_id(session.id()).expect("find");
    loaded.invite(&mut ctx, &alice(), bob()).expect("invite");
    tables.update(&mut loaded).expect("update");
    assert_eq!(loaded.version(), 2);

    let reloaded = tables.find_by_id(session.id()).expect("find");
    assert_eq!(reloaded.version(), 2);
    assert!(reloaded.player_by_user(&bob()).is_some());
}

#[test]
fn test_stale_update_conflicts() {
    let (_clock, mut ctx) = manual_context(82);
    let tables: InMemoryTables<Counting> = InMemoryTables::new();
    let mut session = new_table(&mut ctx, Mode::Normal);
    tables.add(&mut session).expect("add");

    let mut first = tables.find_by_id(session.id()).expect("find");
    let mut second = tables.find_by_id(session.id()).expect("find");

    first.invite(&mut ctx, &alice(), bob()).expect("invite bob");
    tables.update(&mut first).expect("first writer wins");

    second.invite(&mut ctx, &alice(), carol()).expect("invite carol");
    let err = tables.update(&mut second).expect_err("stale");
    assert_eq!(
        err,
        RepositoryError::Conflict {
            table_id: session.id(),
            expected: 1
        }
    );

    let stored = tables.find_by_id(session.id()).expect("find");
    assert!(stored.player_by_user(&carol()).is_none());
}

#[test]
fn test_update_unknown_table() {
    let (_clock, mut ctx) = manual_context(83);
    let tables: InMemoryTables<Counting> = InMemoryTables::new();
    let mut session = new_table(&mut ctx, Mode::Normal);

    let err = tables.update(&mut session).expect_err("never added");
    assert_eq!(err, RepositoryError::NotFound(session.id()));
}

#[test]
fn test_active_and_recent_queries() {
    let (clock, mut ctx) = manual_context(84);
    let tables: InMemoryTables<Counting> = InMemoryTables::new();

    let mut invited = new_table(&mut ctx, Mode::Normal);
    invited.invite(&mut ctx, &alice(), carol()).expect("invite");
    tables.add(&mut invited).expect("add");
    common::clock_step(&clock);

    let mut running = started_table(&mut ctx, Mode::Normal);
    tables.add(&mut running).expect("add");
    common::clock_step(&clock);

    let mut over = started_table(&mut ctx, Mode::Normal);
    over.abandon(&mut ctx, &alice()).expect("abandon");
    tables.add(&mut over).expect("add");

    let active: Vec<_> = tables
        .find_active_by_user(&bob())
        .expect("active")
        .iter()
        .map(|s| s.id())
        .collect();
    assert_eq!(active, vec![running.id()]);

    let carol_active = tables.find_active_by_user(&carol()).expect("active");
    assert_eq!(carol_active.len(), 1, "invitations count as active");

    let recent: Vec<_> = tables
        .find_recent_by_user(&alice(), 2)
        .expect("recent")
        .iter()
        .map(|s| s.id())
        .collect();
    assert_eq!(recent, vec![over.id(), running.id()]);
}
