#[path = "support/xsite/doubles.rs"]
mod doubles;

use doubles::{chunk, value_of, FlakyTransactionManager, Harness};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use xsite_ingest::{
    ApplyError, ApplyMode, InternalMetadata, PartitionLookup, PipelineError, StateChunk,
    TransactionError, TransactionManager, WriteFlag, STATE_TRANSFER_PUT_FLAGS,
};

#[test]
fn apply_checkpoint_transactional_chunk_is_all_or_nothing() {
    let harness = Harness::transactional("users");
    assert_eq!(harness.consumer.mode(), ApplyMode::Transactional);
    harness.pipeline.fail_on_key("k3");

    let err = harness
        .consumer
        .apply_state(chunk(&[("k1", "v1"), ("k2", "v2"), ("k3", "v3"), ("k4", "v4")]))
        .unwrap_err();

    assert!(matches!(
        err,
        ApplyError::Pipeline {
            entry_index: 2,
            source: PipelineError::Rejected { .. }
        }
    ));
    assert_eq!(harness.pipeline.attempted_keys(), vec!["k1", "k2", "k3"]);
    assert!(harness.store.is_empty());
    assert_eq!(harness.store.pending_transactions(), 0);
    assert!(harness.store.current_transaction().is_none());

    let snapshot = harness.metrics.snapshot();
    assert_eq!(snapshot.chunks_failed, 1);
    assert_eq!(snapshot.rollbacks, 1);
    assert_eq!(snapshot.rollback_failures, 0);
    assert_eq!(snapshot.chunks_applied, 0);
}

#[test]
fn apply_checkpoint_commit_failure_rolls_back() {
    let mut flaky = None;
    let harness = Harness::with_transaction_manager("users", |store| {
        let manager = Arc::new(FlakyTransactionManager::new(store));
        manager.fail_commit();
        flaky = Some(manager.clone());
        manager as Arc<dyn TransactionManager>
    });
    let flaky = flaky.unwrap();

    let err = harness
        .consumer
        .apply_state(chunk(&[("k1", "v1"), ("k2", "v2")]))
        .unwrap_err();

    assert!(matches!(
        err,
        ApplyError::Transaction(TransactionError::CommitFailed { .. })
    ));
    assert_eq!(flaky.commits.load(Ordering::SeqCst), 1);
    assert_eq!(flaky.rollbacks.load(Ordering::SeqCst), 1);
    assert!(harness.store.is_empty());
    assert_eq!(harness.store.pending_transactions(), 0);
}

#[test]
fn apply_checkpoint_rollback_failure_keeps_original_error() {
    let mut flaky = None;
    let harness = Harness::with_transaction_manager("users", |store| {
        let manager = Arc::new(FlakyTransactionManager::new(store));
        manager.fail_rollback();
        flaky = Some(manager.clone());
        manager as Arc<dyn TransactionManager>
    });
    let flaky = flaky.unwrap();
    harness.pipeline.fail_on_key("k2");

    let err = harness
        .consumer
        .apply_state(chunk(&[("k1", "v1"), ("k2", "v2")]))
        .unwrap_err();

    assert!(matches!(err, ApplyError::Pipeline { entry_index: 1, .. }));
    assert_eq!(flaky.rollbacks.load(Ordering::SeqCst), 1);
    let snapshot = harness.metrics.snapshot();
    assert_eq!(snapshot.rollbacks, 1);
    assert_eq!(snapshot.rollback_failures, 1);
    assert!(harness.store.is_empty());
}

#[test]
fn apply_checkpoint_begin_failure_skips_rollback() {
    let mut flaky = None;
    let harness = Harness::with_transaction_manager("users", |store| {
        let manager = Arc::new(FlakyTransactionManager::new(store));
        flaky = Some(manager.clone());
        manager as Arc<dyn TransactionManager>
    });
    let flaky = flaky.unwrap();
    // The calling thread already owns a transaction, so begin fails.
    harness.store.begin().unwrap();
    let existing = harness.store.current_transaction().unwrap();

    let err = harness
        .consumer
        .apply_state(chunk(&[("k1", "v1")]))
        .unwrap_err();

    assert_eq!(
        err,
        ApplyError::Transaction(TransactionError::AlreadyAssociated(existing))
    );
    assert_eq!(flaky.begins.load(Ordering::SeqCst), 1);
    assert_eq!(flaky.rollbacks.load(Ordering::SeqCst), 0);
    assert!(harness.pipeline.writes().is_empty());
    assert_eq!(harness.store.current_transaction(), Some(existing));
    harness.store.rollback().unwrap();
}

#[test]
fn apply_checkpoint_non_transactional_keeps_prefix() {
    let harness = Harness::non_transactional("users");
    assert_eq!(harness.consumer.mode(), ApplyMode::NonTransactional);
    harness.pipeline.fail_on_key("k3");

    let err = harness
        .consumer
        .apply_state(chunk(&[("k1", "v1"), ("k2", "v2"), ("k3", "v3"), ("k4", "v4")]))
        .unwrap_err();

    assert!(matches!(err, ApplyError::Pipeline { entry_index: 2, .. }));
    assert_eq!(value_of(&harness.store, "k1").as_deref(), Some("v1"));
    assert_eq!(value_of(&harness.store, "k2").as_deref(), Some("v2"));
    assert!(value_of(&harness.store, "k3").is_none());
    assert!(value_of(&harness.store, "k4").is_none());
    assert_eq!(harness.pipeline.attempted_keys(), vec!["k1", "k2", "k3"]);

    let snapshot = harness.metrics.snapshot();
    assert_eq!(snapshot.chunks_failed, 1);
    assert_eq!(snapshot.keys_applied_before_failure, 2);
    assert_eq!(snapshot.rollbacks, 0);
}

#[test]
fn apply_checkpoint_every_write_carries_transfer_tags() {
    for harness in [
        Harness::transactional("users"),
        Harness::non_transactional("users"),
    ] {
        harness
            .consumer
            .apply_state(chunk(&[("k1", "v1"), ("k2", "v2"), ("k3", "v3")]))
            .unwrap();
        let writes = harness.pipeline.writes();
        assert_eq!(writes.len(), 3);
        let transactional = harness.consumer.mode() == ApplyMode::Transactional;
        for write in &writes {
            assert_eq!(write.flags, STATE_TRANSFER_PUT_FLAGS);
            for flag in WriteFlag::ALL {
                assert!(write.flags.contains(flag), "missing {flag}");
            }
            assert_eq!(write.internal_metadata, InternalMetadata::from_site("dc2", 1));
            assert_eq!(write.segment, harness.partitioner.segment_of(&write.key));
            if transactional {
                assert!(write.transaction.is_some());
                assert_eq!(
                    write.state_transfer_flag,
                    Some(WriteFlag::TransferInternalState)
                );
                assert!(write.lock_owner.is_none());
            } else {
                assert!(write.transaction.is_none());
                assert_eq!(write.lock_owner, Some(write.command));
            }
        }
        let commands: HashSet<_> = writes.iter().map(|write| write.command).collect();
        assert_eq!(commands.len(), writes.len());

        let stored = harness.store.entry(b"k2").unwrap();
        assert_eq!(stored.flags, STATE_TRANSFER_PUT_FLAGS);
        assert_eq!(stored.internal_metadata.origin_site.as_deref(), Some("dc2"));
    }
}

#[test]
fn apply_checkpoint_transactional_chunk_uses_one_transaction() {
    let harness = Harness::transactional("users");
    harness
        .consumer
        .apply_state(chunk(&[("k1", "v1"), ("k2", "v2")]))
        .unwrap();
    let transactions: HashSet<_> = harness
        .pipeline
        .writes()
        .iter()
        .map(|write| write.transaction)
        .collect();
    assert_eq!(transactions.len(), 1);
    assert!(harness.store.current_transaction().is_none());
    assert_eq!(harness.metrics.snapshot().keys_applied, 2);
}

#[test]
fn apply_checkpoint_empty_chunk_is_a_no_op() {
    for harness in [
        Harness::transactional("users"),
        Harness::non_transactional("users"),
    ] {
        harness.consumer.apply_state(StateChunk::default()).unwrap();
        assert!(harness.store.is_empty());
        assert!(harness.pipeline.writes().is_empty());
        assert_eq!(harness.store.pending_transactions(), 0);
    }
}

#[test]
fn apply_checkpoint_client_write_wins_during_transfer() {
    let harness = Harness::non_transactional("users");
    harness.consumer.start_state_transfer("dc2").unwrap();
    harness
        .store
        .put(harness.partitioner.as_ref(), "k1", "client")
        .unwrap();

    harness
        .consumer
        .apply_state(chunk(&[("k1", "remote"), ("k2", "remote")]))
        .unwrap();

    assert_eq!(value_of(&harness.store, "k1").as_deref(), Some("client"));
    assert_eq!(value_of(&harness.store, "k2").as_deref(), Some("remote"));
    harness.consumer.end_state_transfer(Some("dc2"));
    assert_eq!(harness.tracker.client_committed_keys(), 0);
}

#[test]
fn apply_checkpoint_chunks_apply_without_an_open_session() {
    let harness = Harness::transactional("users");
    assert!(harness.consumer.sending_site_name().is_none());
    harness
        .consumer
        .apply_state(chunk(&[("k1", "v1")]))
        .unwrap();
    assert_eq!(value_of(&harness.store, "k1").as_deref(), Some("v1"));
}
