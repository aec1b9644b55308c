//! Tests for table creation, invitations, start and setup commands.

mod common;

use boardroom::{
    LogType, Mode, PlayerStatus, Status, TableError, TableEvent, TableType, ValidationError,
    Visibility,
};
use boardroom_game::Options;
use chrono::TimeDelta;
use common::{
    Counting, alice, bob, carol, manual_context, new_table, new_table_with, play_turn,
    started_table, started_table_with,
};
use std::collections::HashSet;

#[test]
fn test_create_seats_owner() {
    let (_clock, mut ctx) = manual_context(1);
    let mut session = new_table(&mut ctx, Mode::Normal);

    assert_eq!(session.status(), Status::New);
    assert_eq!(session.version(), 1);
    assert_eq!(session.owner(), &alice());
    assert_eq!(session.players().len(), 1);
    let owner = &session.players()[0];
    assert_eq!(owner.status(), PlayerStatus::Accepted);
    assert!(owner.is_user(&alice()));
    assert!(session.state().is_none());

    assert_eq!(session.log().len(), 1);
    assert_eq!(session.log().entries()[0].log_type(), LogType::Create);
    assert_eq!(
        session.drain_events(),
        vec![TableEvent::Created {
            table_id: session.id()
        }]
    );
}

#[test]
fn test_invite_and_accept() {
    let (_clock, mut ctx) = manual_context(2);
    let mut session = new_table(&mut ctx, Mode::Normal);
    session.drain_events();

    session.invite(&mut ctx, &alice(), bob()).expect("invite");
    let bob_seat = session.player_by_user(&bob()).expect("bob seated");
    assert_eq!(bob_seat.status(), PlayerStatus::Invited);

    let invite = session.log().last().expect("logged");
    assert_eq!(invite.log_type(), LogType::Invite);
    assert_eq!(invite.user_id().as_ref(), Some(&alice()));
    assert_eq!(invite.parameters(), &vec!["bob".to_string()]);

    session.accept_invite(&mut ctx, &bob()).expect("accept");
    assert_eq!(
        session.player_by_user(&bob()).expect("bob").status(),
        PlayerStatus::Accepted
    );
    assert_eq!(
        session.drain_events(),
        vec![
            TableEvent::Invited {
                table_id: session.id(),
                user_id: bob()
            },
            TableEvent::Accepted {
                table_id: session.id(),
                user_id: bob()
            },
        ]
    );

    let err = session.accept_invite(&mut ctx, &bob()).expect_err("second answer");
    assert_eq!(err, TableError::Validation(ValidationError::AlreadyResponded));
}

#[test]
fn test_reject_removes_player() {
    let (_clock, mut ctx) = manual_context(3);
    let mut session = new_table(&mut ctx, Mode::Normal);
    session.invite(&mut ctx, &alice(), bob()).expect("invite");

    session.reject_invite(&mut ctx, &bob()).expect("reject");
    assert!(session.player_by_user(&bob()).is_none());
    assert_eq!(session.log().of_type(LogType::Reject).count(), 1);

    let err = session.reject_invite(&mut ctx, &bob()).expect_err("no seat left");
    assert_eq!(err, TableError::Validation(ValidationError::NotPlayer));
}

#[test]
fn test_invite_rules() {
    let (_clock, mut ctx) = manual_context(4);
    let module = Counting {
        max_players: 2,
        ..Counting::default()
    };
    let mut session = new_table_with(&mut ctx, module, Mode::Normal, Options::new());

    let err = session.invite(&mut ctx, &bob(), carol()).expect_err("not owner");
    assert_eq!(err, TableError::Validation(ValidationError::MustBeOwner));

    let err = session.invite(&mut ctx, &alice(), alice()).expect_err("owner again");
    assert_eq!(err, TableError::Validation(ValidationError::AlreadyInvited));

    session.invite(&mut ctx, &alice(), bob()).expect("invite bob");
    let err = session.invite(&mut ctx, &alice(), carol()).expect_err("full");
    assert_eq!(err, TableError::Validation(ValidationError::ExceedsMaxPlayers));
}

#[test]
fn test_rejected_command_changes_nothing() {
    let (_clock, mut ctx) = manual_context(5);
    let mut session = new_table(&mut ctx, Mode::Normal);
    let log_len = session.log().len();
    let updated = session.updated();
    let events = session.pending_events().len();

    session.invite(&mut ctx, &bob(), carol()).expect_err("not owner");

    assert_eq!(session.log().len(), log_len);
    assert_eq!(session.updated(), updated);
    assert_eq!(session.pending_events().len(), events);
    assert_eq!(session.players().len(), 1);
}

#[test]
fn test_start_requires_min_players() {
    let (_clock, mut ctx) = manual_context(6);
    let mut session = new_table(&mut ctx, Mode::Normal);
    session.invite(&mut ctx, &alice(), bob()).expect("invite");
    assert!(!session.can_start());

    let err = session.start(&mut ctx, &alice()).expect_err("bob has not accepted");
    assert_eq!(err, TableError::Validation(ValidationError::MinPlayers));
    assert_eq!(session.players().len(), 2, "nothing dropped on failure");
    assert_eq!(session.status(), Status::New);
}

#[test]
fn test_start_drops_unanswered_and_assigns_colors() {
    let (clock, mut ctx) = manual_context(7);
    let mut session = new_table(&mut ctx, Mode::Normal);
    session.invite(&mut ctx, &alice(), bob()).expect("invite bob");
    session.invite(&mut ctx, &alice(), carol()).expect("invite carol");
    session.accept_invite(&mut ctx, &bob()).expect("accept");
    assert!(session.can_start());

    let err = session.start(&mut ctx, &bob()).expect_err("not owner");
    assert_eq!(err, TableError::Validation(ValidationError::MustBeOwner));

    session.drain_events();
    session.start(&mut ctx, &alice()).expect("start");

    assert_eq!(session.status(), Status::Started);
    assert!(session.started().is_some());
    assert!(session.player_by_user(&carol()).is_none());
    assert_eq!(session.players().len(), 2);

    let colors: HashSet<_> = session.players().iter().filter_map(|p| p.color()).collect();
    assert_eq!(colors.len(), 2);

    let current = session.current_players();
    assert_eq!(current.len(), 1);
    let limit = current[0].turn_limit().expect("deadline set");
    assert!(limit >= clock_now(&clock) + TimeDelta::hours(1));

    let events = session.drain_events();
    assert!(matches!(events[0], TableEvent::Started { .. }));
    assert!(events.iter().any(|e| matches!(e, TableEvent::TurnBegan { limit: Some(_), .. })));
    assert!(events.iter().any(|e| matches!(e, TableEvent::StateChanged { .. })));

    let types: Vec<_> = session.log().entries().iter().map(|e| e.log_type()).collect();
    assert!(types.contains(&LogType::Start));
    assert!(types.contains(&LogType::BeginTurn));
}

fn clock_now(clock: &boardroom::ManualClock) -> chrono::DateTime<chrono::Utc> {
    use boardroom::Clock;
    clock.now()
}

#[test]
fn test_start_twice_is_illegal() {
    let (_clock, mut ctx) = manual_context(8);
    let mut session = started_table(&mut ctx, Mode::Normal);

    let err = session.start(&mut ctx, &alice()).expect_err("already started");
    assert!(matches!(
        err,
        TableError::IllegalState(ref e) if e.status == Status::Started
    ));
}

#[test]
fn test_add_computer() {
    let (_clock, mut ctx) = manual_context(9);
    let mut session = new_table(&mut ctx, Mode::Normal);

    let computer = session.add_computer(&mut ctx, &alice()).expect("add computer");
    let seat = session.player_by_id(computer).expect("seated");
    assert!(seat.is_computer());
    assert_eq!(seat.status(), PlayerStatus::Accepted);
    assert!(session.can_start());

    let err = session.add_computer(&mut ctx, &bob()).expect_err("not owner");
    assert_eq!(err, TableError::Validation(ValidationError::MustBeOwner));

    let no_automa = Counting {
        automa: false,
        ..Counting::default()
    };
    let mut plain = new_table_with(&mut ctx, no_automa, Mode::Normal, Options::new());
    let err = plain.add_computer(&mut ctx, &alice()).expect_err("no automa");
    assert_eq!(err, TableError::Validation(ValidationError::ComputerNotSupported));
}

#[test]
fn test_change_options_only_before_start() {
    let (_clock, mut ctx) = manual_context(10);
    let mut session = new_table(&mut ctx, Mode::Normal);

    let options = Options::new().with("target", 5);
    session
        .change_options(&mut ctx, &alice(), options.clone())
        .expect("change");
    assert_eq!(session.options(), &options);
    assert!(
        session
            .pending_events()
            .contains(&TableEvent::OptionsChanged {
                table_id: session.id()
            })
    );

    let mut started = started_table(&mut ctx, Mode::Normal);
    let err = started
        .change_options(&mut ctx, &alice(), Options::new())
        .expect_err("started");
    assert!(matches!(err, TableError::IllegalState(_)));
}

#[test]
fn test_expiry_by_status() {
    let (_clock, mut ctx) = manual_context(11);
    let session = new_table(&mut ctx, Mode::Normal);
    assert_eq!(session.expires(), Some(session.created() + TimeDelta::days(2)));

    let mut session = started_table_with(&mut ctx, Mode::Normal, Options::new().with("target", 3));
    assert_eq!(session.expires(), None);
    play_turn(&mut ctx, &mut session, 3);
    assert_eq!(session.status(), Status::Ended);
    let ended = session.ended().expect("end time");
    assert_eq!(session.expires(), Some(ended + TimeDelta::days(5 * 365)));

    let mut abandoned = new_table(&mut ctx, Mode::Normal);
    abandoned.abandon(&mut ctx, &alice()).expect("abandon");
    assert_eq!(abandoned.status(), Status::Abandoned);
    assert_eq!(
        abandoned.expires(),
        Some(abandoned.updated() + TimeDelta::days(1))
    );
}

#[test]
fn test_modes() {
    assert!(Mode::Normal.allows_undo());
    assert!(!Mode::Ranked.allows_undo());
    assert!(Mode::Practice.allows_undo());
    assert!(Mode::Practice.allows_revert());
    assert!(!Mode::Normal.allows_revert());
    assert_eq!("practice".parse::<Mode>().expect("parse"), Mode::Practice);
}

#[test]
fn test_join_public_table() {
    let (_clock, mut ctx) = manual_context(13);
    let two_seats = Counting {
        max_players: 2,
        ..Counting::default()
    };
    let mut session = new_table_with(&mut ctx, two_seats, Mode::Normal, Options::new());
    assert_eq!(session.visibility(), Visibility::Private);
    assert!(!session.can_join(&bob()));

    let err = session.join(&mut ctx, &bob()).expect_err("private");
    assert_eq!(err, TableError::Validation(ValidationError::NotPublic));
    let err = session.make_public(&mut ctx, &bob()).expect_err("not owner");
    assert_eq!(err, TableError::Validation(ValidationError::MustBeOwner));

    session.drain_events();
    session.make_public(&mut ctx, &alice()).expect("make public");
    assert_eq!(session.visibility(), Visibility::Public);
    assert_eq!(
        session.drain_events(),
        vec![TableEvent::VisibilityChanged {
            table_id: session.id()
        }]
    );
    assert!(session.can_join(&bob()));
    assert!(!session.can_join(&alice()), "already seated");

    session.join(&mut ctx, &bob()).expect("join");
    let seat = session.player_by_user(&bob()).expect("seated");
    assert_eq!(seat.status(), PlayerStatus::Accepted);
    let entry = session.log().last().expect("logged");
    assert_eq!(entry.log_type(), LogType::Join);
    assert_eq!(entry.player_id(), seat.id());
    assert_eq!(entry.parameters(), &vec!["bob".to_string()]);
    assert_eq!(
        session.drain_events(),
        vec![TableEvent::Joined {
            table_id: session.id(),
            user_id: bob()
        }]
    );
    assert!(session.can_start());

    let err = session.join(&mut ctx, &bob()).expect_err("seated twice");
    assert_eq!(err, TableError::Validation(ValidationError::ExceedsMaxPlayers));
    assert!(!session.can_join(&carol()));
    let err = session.join(&mut ctx, &carol()).expect_err("full");
    assert_eq!(err, TableError::Validation(ValidationError::ExceedsMaxPlayers));
}

#[test]
fn test_join_twice_is_already_responded() {
    let (_clock, mut ctx) = manual_context(14);
    let mut session = new_table(&mut ctx, Mode::Normal);
    session.make_public(&mut ctx, &alice()).expect("make public");
    session.invite(&mut ctx, &alice(), bob()).expect("invite");

    let err = session.join(&mut ctx, &bob()).expect_err("invited already");
    assert_eq!(err, TableError::Validation(ValidationError::AlreadyResponded));
    assert_eq!(
        session.player_by_user(&bob()).expect("seat").status(),
        PlayerStatus::Invited
    );
}

#[test]
fn test_visibility_only_before_start() {
    let (_clock, mut ctx) = manual_context(15);
    let mut session = new_table(&mut ctx, Mode::Normal);
    session.make_public(&mut ctx, &alice()).expect("make public");
    session.make_private(&mut ctx, &alice()).expect("make private");
    assert_eq!(session.visibility(), Visibility::Private);
    let err = session.join(&mut ctx, &bob()).expect_err("closed again");
    assert_eq!(err, TableError::Validation(ValidationError::NotPublic));

    let mut started = started_table(&mut ctx, Mode::Normal);
    let err = started
        .make_public(&mut ctx, &alice())
        .expect_err("started");
    assert!(matches!(err, TableError::IllegalState(ref e) if e.status == Status::Started));
    let err = started.join(&mut ctx, &carol()).expect_err("started");
    assert!(matches!(err, TableError::IllegalState(_)));
}

#[test]
fn test_change_type() {
    let (_clock, mut ctx) = manual_context(16);
    let mut session = new_table(&mut ctx, Mode::Normal);
    assert_eq!(session.table_type(), TableType::Realtime);

    let err = session
        .change_type(&mut ctx, &bob(), TableType::TurnBased)
        .expect_err("not owner");
    assert_eq!(err, TableError::Validation(ValidationError::MustBeOwner));

    session.drain_events();
    session
        .change_type(&mut ctx, &alice(), TableType::TurnBased)
        .expect("change type");
    assert_eq!(session.table_type(), TableType::TurnBased);
    assert_eq!(
        session.drain_events(),
        vec![TableEvent::OptionsChanged {
            table_id: session.id()
        }]
    );
    assert_eq!(
        "turn_based".parse::<TableType>().expect("parse"),
        TableType::TurnBased
    );

    let mut started = started_table(&mut ctx, Mode::Normal);
    let err = started
        .change_type(&mut ctx, &alice(), TableType::TurnBased)
        .expect_err("started");
    assert!(matches!(err, TableError::IllegalState(_)));
}
