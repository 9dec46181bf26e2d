//! Range reads and deletes over clustering components.

mod common;

use asupersync::runtime::RuntimeBuilder;
use common::{Game, Player, RecordingSession, expect_err, manager, unwrap_outcome};
use cqlmodel::prelude::*;
use cqlmodel::{SliceQuerySpec, ValidationErrorKind, generate_delete, generate_select};

const AUTHOR_ID: [u8; 16] = [7, 1, 0, 0, 0, 0, 0, 0, 9, 0, 0, 0, 0, 0, 0, 0];

fn spec(ordering: OrderingMode) -> SliceQuerySpec {
    SliceQuerySpec::new("posts")
        .fixed("id", 11_i64)
        .fixed("a", AUTHOR_ID)
        .fixed("b", "author")
        .varying("c")
        .ordering(ordering)
        .bounding(BoundingMode::InclusiveBounds)
        .batch_size(250)
}

#[test]
fn test_ascending_slice_predicate() {
    let stmt = generate_select(&spec(OrderingMode::Ascending).start(1_i32).end(2_i32)).unwrap();
    assert_eq!(stmt.predicate(), "id=11 AND a=? AND b=? AND c>=1 AND c<=2");
    assert_eq!(
        stmt.values(),
        &[Value::Uuid(AUTHOR_ID), Value::Text("author".into())]
    );
    assert_eq!(stmt.fetch_size(), Some(250));
}

#[test]
fn test_descending_slice_predicate() {
    let stmt = generate_select(&spec(OrderingMode::Descending).start(2_i32).end(1_i32)).unwrap();
    assert_eq!(stmt.predicate(), "id=11 AND a=? AND b=? AND c<=2 AND c>=1");
    assert!(stmt.query().contains("ORDER BY c DESC"));
}

#[test]
fn test_delete_slice_keeps_fixed_prefix_only() {
    let stmt = generate_delete(&spec(OrderingMode::Ascending).start(1_i32).end(2_i32)).unwrap();
    assert_eq!(stmt.predicate(), "id=11 AND a=? AND b=?");
    assert_eq!(stmt.query(), "DELETE FROM posts WHERE id=11 AND a=? AND b=?;");
    assert_eq!(stmt.fetch_size(), None);
}

#[test]
fn test_bounds_without_varying_name_are_rejected() {
    let spec = SliceQuerySpec::new("posts").fixed("id", 11_i64).start(1_i32);
    assert!(generate_select(&spec).unwrap_err().is_config());
}

#[test]
fn test_get_slice_over_entity() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let session = RecordingSession::new();
    let manager = manager(&session, ManagerConfig::default());
    session.respond(
        "FROM games",
        vec![
            Game::new(3, 2024, 4, "win").row(),
            Game::new(3, 2024, 2, "loss").row(),
        ],
    );

    let slice = manager
        .slice_query::<Game>()
        .unwrap()
        .partition_components(vec![Value::BigInt(3)])
        .from_clusterings(vec![Value::Int(2024), Value::Int(4)])
        .to_clusterings(vec![Value::Int(2024), Value::Int(2)])
        .ordering(OrderingMode::Descending)
        .limit(10);

    let games: Vec<EntityProxy<Game>> = rt.block_on(async {
        unwrap_outcome(manager.get_slice(&cx, &slice).await)
    });
    assert_eq!(games.len(), 2);
    assert_eq!(*games[0].get(), Game::new(3, 2024, 4, "win"));
    assert!(games[1].is_loaded("outcome"));

    let executed = session.executed();
    assert_eq!(executed.len(), 1);
    let query = executed[0].query();
    assert!(query.contains("WHERE player_id=3 AND season=2024 AND round<=4 AND round>=2"));
    assert!(query.ends_with("LIMIT 10;"));
}

#[test]
fn test_slice_query_validation() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let session = RecordingSession::new();
    let manager = manager(&session, ManagerConfig::default());

    assert!(manager.slice_query::<Player>().unwrap_err().is_config());

    let incomplete = manager.slice_query::<Game>().unwrap();
    let err = rt.block_on(async { expect_err(manager.get_slice::<Game>(&cx, &incomplete).await) });
    assert_eq!(err.validation_kind(), Some(ValidationErrorKind::MissingKeyComponent));

    let reversed = manager
        .slice_query::<Game>()
        .unwrap()
        .partition_components(vec![Value::BigInt(3)])
        .from_clusterings(vec![Value::Int(2025)])
        .to_clusterings(vec![Value::Int(2024)]);
    let err = rt.block_on(async { expect_err(manager.get_slice::<Game>(&cx, &reversed).await) });
    assert!(err.is_config());
    assert!(err.to_string().contains("ascending order"));
    assert_eq!(session.round_trips(), 0);
}

#[test]
fn test_remove_slice() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let session = RecordingSession::new();
    let manager = manager(&session, ManagerConfig::default());

    let slice = manager
        .slice_query::<Game>()
        .unwrap()
        .partition_components(vec![Value::BigInt(3)])
        .from_clusterings(vec![Value::Int(2024)])
        .to_clusterings(vec![Value::Int(2024)]);
    rt.block_on(async {
        unwrap_outcome(manager.remove_slice::<Game>(&cx, &slice).await);
    });
    assert_eq!(
        session.executed_queries(),
        vec!["DELETE FROM games WHERE player_id=3 AND season=2024;".to_string()]
    );
}
