//! Batch windows: atomic groups, write ordering, resets and snapshots.

mod common;

use asupersync::runtime::RuntimeBuilder;
use common::{Leaderboard, Player, RecordingSession, expect_err, manager, unwrap_outcome};
use cqlmodel::prelude::*;
use cqlmodel::{BatchType, FlushContext, StatementWrapper};
use std::sync::Arc;

fn write(id: i64) -> StatementWrapper {
    StatementWrapper::regular(
        "INSERT INTO players(id) VALUES (?) USING TTL 0;",
        vec![Value::BigInt(id)],
        ConsistencyLevel::One,
    )
}

#[test]
fn test_empty_window_makes_no_calls() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let session = RecordingSession::new();
    let mut batch = BatchingPersistenceManager::new(manager(&session, ManagerConfig::default()));

    rt.block_on(async {
        batch.start_batch();
        unwrap_outcome(batch.end_batch(&cx).await);
        batch.start_batch_with(ConsistencyLevel::Quorum);
        unwrap_outcome(batch.end_batch(&cx).await);
    });
    assert_eq!(session.round_trips(), 0);
}

#[test]
fn test_window_sends_logged_and_counter_groups() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let session = RecordingSession::new();
    let mut batch = BatchingPersistenceManager::new(manager(&session, ManagerConfig::default()));

    batch.start_batch_with(ConsistencyLevel::EachQuorum);
    rt.block_on(async {
        let mut player = Player::new(1, "ann");
        player.wins.incr();
        let mut player = unwrap_outcome(batch.persist(&cx, player).await);

        let mut entry = Leaderboard::new("casual", 1);
        entry.points.incr_by(10);
        unwrap_outcome(batch.persist(&cx, entry).await);

        player.set("name", |p| p.name = "anne".to_string()).unwrap();
        unwrap_outcome(batch.update(&cx, &mut player).await);
        assert_eq!(session.round_trips(), 0);

        unwrap_outcome(batch.end_batch(&cx).await);
    });

    let batches = session.batches();
    assert_eq!(batches.len(), 2);

    assert_eq!(batches[0].kind, BatchType::Logged);
    assert_eq!(batches[0].level, ConsistencyLevel::EachQuorum);
    let logged: Vec<_> = batches[0].statements.iter().map(|s| s.query()).collect();
    assert!(logged[0].starts_with("INSERT INTO players("));
    assert!(logged[1].starts_with("UPDATE players USING TTL :ttl SET name=:name"));

    assert_eq!(batches[1].kind, BatchType::Counter);
    assert_eq!(batches[1].statements.len(), 2);
    assert!(
        batches[1]
            .statements
            .iter()
            .all(|s| s.consistency() == ConsistencyLevel::EachQuorum)
    );
    assert_eq!(batch.batch_level(), ConsistencyLevel::One);
}

#[test]
fn test_explicit_level_resets_window() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let session = RecordingSession::new();
    let mut batch = BatchingPersistenceManager::new(manager(&session, ManagerConfig::default()));
    let quorum = Options::with_consistency(ConsistencyLevel::Quorum);

    batch.start_batch_with(ConsistencyLevel::All);
    rt.block_on(async {
        unwrap_outcome(batch.persist(&cx, Player::new(1, "a")).await);
        unwrap_outcome(batch.persist(&cx, Player::new(2, "b")).await);
        assert_eq!(batch.pending_statements(), 2);

        let mut proxy = unwrap_outcome(batch.persist(&cx, Player::new(3, "c")).await);
        proxy.set("name", |p| p.name = "cc".to_string()).unwrap();
        let err = expect_err(batch.update_with(&cx, &mut proxy, quorum).await);
        assert!(err.is_config());
        assert!(err.to_string().contains("start_batch_with"));

        assert_eq!(batch.pending_statements(), 0);
        assert_eq!(batch.batch_level(), ConsistencyLevel::One);

        // the abandoned writes never reach the cluster
        unwrap_outcome(batch.end_batch(&cx).await);
    });
    assert_eq!(session.round_trips(), 0);
}

#[test]
fn test_batched_writes_keep_call_order() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let session = RecordingSession::new();
    let mut batch = BatchingPersistenceManager::new(manager(&session, ManagerConfig::default()));

    batch.start_batch();
    rt.block_on(async {
        unwrap_outcome(batch.persist(&cx, Player::new(1, "a")).await);
        unwrap_outcome(batch.remove_by_id::<Player>(&cx, &[Value::BigInt(2)]).await);
        unwrap_outcome(batch.end_batch(&cx).await);
    });

    let batches = session.batches();
    let logged: Vec<_> = batches[0].statements.iter().map(|s| s.query().to_string()).collect();
    assert!(logged[0].starts_with("INSERT"));
    assert_eq!(logged[1], "DELETE FROM players WHERE id=:id;");
    let stamps: Vec<_> = batches[0]
        .statements
        .iter()
        .map(|s| s.timestamp().expect("batched writes are stamped"))
        .collect();
    assert!(stamps[0] < stamps[1]);
}

#[test]
fn test_reset_leaves_snapshots_untouched() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let session = RecordingSession::new();
    let mut original = FlushContext::batching(Arc::new(session.clone()), ConsistencyLevel::One);

    rt.block_on(async {
        unwrap_outcome(original.push_statement(&cx, write(1)).await);

        let mut fresh = original.duplicate_with_no_data(ConsistencyLevel::Quorum);
        for id in 2..5 {
            unwrap_outcome(fresh.push_statement(&cx, write(id)).await);
        }
        assert_eq!(fresh.statement_count(), 3);
        assert_eq!(fresh.consistency_level(), ConsistencyLevel::Quorum);
        drop(fresh);

        let mut copy = original.duplicate();
        unwrap_outcome(copy.push_statement(&cx, write(9)).await);
        assert_eq!(copy.statement_count(), 2);
    });

    assert_eq!(original.statement_count(), 1);
    assert_eq!(original.statements()[0].values(), &[Value::BigInt(1)]);
    assert_eq!(original.consistency_level(), ConsistencyLevel::One);
    assert!(original.is_batching());
    assert_eq!(session.round_trips(), 0);
}

#[test]
fn test_deferred_interceptor_writes_reach_the_proxy() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let session = RecordingSession::new();
    let mut batch = BatchingPersistenceManager::new(manager(&session, ManagerConfig::default()));

    batch.start_batch();
    let player = rt.block_on(async {
        let player = unwrap_outcome(batch.persist(&cx, Player::new(1, "ann")).await);
        assert!(!player.get().stamped);
        unwrap_outcome(batch.end_batch(&cx).await);
        player
    });

    assert!(player.get().stamped);
    assert!(player.into_inner().stamped);
}

#[test]
fn test_window_level_ends_with_the_window() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let session = RecordingSession::new();
    let mut batch = BatchingPersistenceManager::new(manager(&session, ManagerConfig::default()));

    batch.start_batch_with(ConsistencyLevel::EachQuorum);
    let mut player: EntityProxy<Player> = batch.get_proxy(&[Value::BigInt(7)]).unwrap();
    assert_eq!(player.context().options().consistency(), None);
    rt.block_on(async {
        unwrap_outcome(batch.end_batch(&cx).await);
        unwrap_outcome(batch.initialize(&cx, &mut player).await);
    });

    let executed = session.executed();
    assert_eq!(executed.len(), 1);
    assert!(executed[0].query().contains("cqlmodel_counter_table"));
    assert_eq!(executed[0].consistency(), ConsistencyLevel::Quorum);
}
