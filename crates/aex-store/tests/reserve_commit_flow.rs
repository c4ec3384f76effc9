// Path: crates/aex-store/tests/reserve_commit_flow.rs
use aex_store::{RedbStore, ReserveOutcome, Store};
use aex_types::{Agent, Capabilities, Scope};

fn test_agent(agent_id: &str, budget_micro: u64) -> Agent {
    Agent {
        agent_id: agent_id.to_string(),
        name: agent_id.to_string(),
        token_hash: format!("hash-{agent_id}"),
        legacy_raw_token: None,
        token_expires_at: None,
        scope: Scope::Execution,
        budget_micro: aex_types::Micro(budget_micro),
        spent_micro: aex_types::Micro(0),
        reserved_micro: aex_types::Micro(0),
        rpm_limit: 1_000,
        tpm_limit: 1_000_000,
        capabilities: Capabilities::default(),
        created_at: 0,
        last_activity_at: None,
    }
}

async fn store() -> (tempfile::TempDir, RedbStore) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aex.redb");
    let store = RedbStore::open(path).unwrap();
    (dir, store)
}

#[tokio::test]
async fn reserve_then_commit_settles_spend() {
    let (_dir, store) = store().await;
    store.create_agent(test_agent("a1", 1_000_000)).await.unwrap();

    let outcome = store
        .reserve(
            "a1",
            "ex_001",
            Some("idem-1"),
            [1u8; 32],
            aex_types::execution::Route::Chat,
            "gpt-test",
            "openai",
            500_000,
            30_000,
            1_000,
        )
        .await
        .unwrap();

    let exec = match outcome {
        ReserveOutcome::Reserved(exec) => exec,
        other => panic!("expected Reserved, got {other:?}"),
    };
    assert_eq!(exec.reserve_micro, aex_types::Micro(500_000));

    let agent = store.get_agent("a1").await.unwrap().unwrap();
    assert_eq!(agent.reserved_micro, aex_types::Micro(500_000));
    assert_eq!(agent.spent_micro, aex_types::Micro(0));

    store.mark_dispatched("ex_001", 1_100).await.unwrap();
    let result = store
        .commit(
            "ex_001",
            420_000,
            serde_json::json!({"ok": true}),
            200,
            false,
            true,
            1_200,
        )
        .await
        .unwrap();
    assert!(!result.clamped);
    assert_eq!(result.execution.commit_micro, aex_types::Micro(420_000));

    let agent = store.get_agent("a1").await.unwrap().unwrap();
    assert_eq!(agent.spent_micro, aex_types::Micro(420_000));
    assert_eq!(agent.reserved_micro, aex_types::Micro(0));

    let events = store.events_for_execution("ex_001").await.unwrap();
    assert_eq!(events.len(), 3); // reserve, dispatch, commit
    assert_eq!(events[0].seq, 0);
    assert_eq!(events[1].prev_hash, events[0].event_hash);
    assert_eq!(events[2].prev_hash, events[1].event_hash);
}

#[tokio::test]
async fn commit_over_reserve_ceiling_clamps() {
    let (_dir, store) = store().await;
    store.create_agent(test_agent("a1", 1_000_000)).await.unwrap();
    store
        .reserve(
            "a1",
            "ex_002",
            None,
            [2u8; 32],
            aex_types::execution::Route::Chat,
            "gpt-test",
            "openai",
            100_000,
            30_000,
            0,
        )
        .await
        .unwrap();
    store.mark_dispatched("ex_002", 10).await.unwrap();

    let result = store
        .commit("ex_002", 250_000, serde_json::json!({}), 200, false, true, 20)
        .await
        .unwrap();
    assert!(result.clamped);
    assert_eq!(result.requested_cost_micro, 250_000);
    assert_eq!(result.execution.commit_micro, aex_types::Micro(100_000));

    let agent = store.get_agent("a1").await.unwrap().unwrap();
    assert_eq!(agent.spent_micro, aex_types::Micro(100_000));
}

#[tokio::test]
async fn commit_over_reserve_ceiling_settles_full_cost_when_clamp_disabled() {
    let (_dir, store) = store().await;
    store.create_agent(test_agent("a1", 1_000_000)).await.unwrap();
    store
        .reserve(
            "a1",
            "ex_002b",
            None,
            [2u8; 32],
            aex_types::execution::Route::Chat,
            "gpt-test",
            "openai",
            100_000,
            30_000,
            0,
        )
        .await
        .unwrap();
    store.mark_dispatched("ex_002b", 10).await.unwrap();

    let result = store
        .commit("ex_002b", 250_000, serde_json::json!({}), 200, false, false, 20)
        .await
        .unwrap();
    assert!(!result.clamped);
    assert_eq!(result.execution.commit_micro, aex_types::Micro(250_000));

    let agent = store.get_agent("a1").await.unwrap().unwrap();
    assert_eq!(agent.spent_micro, aex_types::Micro(250_000));
}

#[tokio::test]
async fn reserve_denied_when_budget_exhausted() {
    let (_dir, store) = store().await;
    store.create_agent(test_agent("a1", 100)).await.unwrap();

    let outcome = store
        .reserve(
            "a1",
            "ex_003",
            None,
            [3u8; 32],
            aex_types::execution::Route::Chat,
            "gpt-test",
            "openai",
            500,
            30_000,
            0,
        )
        .await
        .unwrap();
    assert!(matches!(outcome, ReserveOutcome::AgentBudgetExceeded));

    let agent = store.get_agent("a1").await.unwrap().unwrap();
    assert_eq!(agent.reserved_micro, aex_types::Micro(0));

    let events = store.events_for_execution("ex_003").await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, aex_types::EventType::DenyBudget);
}

#[tokio::test]
async fn idempotent_replay_returns_same_execution_without_double_reserve() {
    let (_dir, store) = store().await;
    store.create_agent(test_agent("a1", 1_000_000)).await.unwrap();

    let first = store
        .reserve(
            "a1",
            "ex_004",
            Some("idem-4"),
            [4u8; 32],
            aex_types::execution::Route::Chat,
            "gpt-test",
            "openai",
            100_000,
            30_000,
            0,
        )
        .await
        .unwrap();
    assert!(matches!(first, ReserveOutcome::Reserved(_)));

    let second = store
        .reserve(
            "a1",
            "ex_004_retry",
            Some("idem-4"),
            [4u8; 32],
            aex_types::execution::Route::Chat,
            "gpt-test",
            "openai",
            100_000,
            30_000,
            1,
        )
        .await
        .unwrap();
    match second {
        ReserveOutcome::InFlightDuplicate(exec) => assert_eq!(exec.execution_id, "ex_004"),
        other => panic!("expected InFlightDuplicate, got {other:?}"),
    }

    let agent = store.get_agent("a1").await.unwrap().unwrap();
    assert_eq!(agent.reserved_micro, aex_types::Micro(100_000));
}

#[tokio::test]
async fn idempotency_key_reused_with_different_request_conflicts() {
    let (_dir, store) = store().await;
    store.create_agent(test_agent("a1", 1_000_000)).await.unwrap();

    store
        .reserve(
            "a1",
            "ex_005",
            Some("idem-5"),
            [5u8; 32],
            aex_types::execution::Route::Chat,
            "gpt-test",
            "openai",
            100_000,
            30_000,
            0,
        )
        .await
        .unwrap();

    let err = store
        .reserve(
            "a1",
            "ex_005_other",
            Some("idem-5"),
            [9u8; 32],
            aex_types::execution::Route::Chat,
            "gpt-test",
            "openai",
            100_000,
            30_000,
            1,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, aex_store::StoreError::IdempotencyConflict { .. }));
}

#[tokio::test]
async fn release_refunds_full_reservation() {
    let (_dir, store) = store().await;
    store.create_agent(test_agent("a1", 1_000_000)).await.unwrap();
    store
        .reserve(
            "a1",
            "ex_006",
            None,
            [6u8; 32],
            aex_types::execution::Route::Chat,
            "gpt-test",
            "openai",
            300_000,
            30_000,
            0,
        )
        .await
        .unwrap();

    store.release("ex_006", "client_cancelled", 5).await.unwrap();

    let agent = store.get_agent("a1").await.unwrap().unwrap();
    assert_eq!(agent.reserved_micro, aex_types::Micro(0));
    assert_eq!(agent.spent_micro, aex_types::Micro(0));

    let exec = store.lookup("ex_006").await.unwrap().unwrap();
    assert_eq!(exec.state, aex_types::ExecutionState::Released);
    assert!(store.reservation("ex_006").await.unwrap().is_none());
}

#[tokio::test]
async fn fail_after_dispatch_refunds_reservation() {
    let (_dir, store) = store().await;
    store.create_agent(test_agent("a1", 1_000_000)).await.unwrap();
    store
        .reserve(
            "a1",
            "ex_007",
            None,
            [7u8; 32],
            aex_types::execution::Route::Chat,
            "gpt-test",
            "openai",
            200_000,
            30_000,
            0,
        )
        .await
        .unwrap();
    store.mark_dispatched("ex_007", 1).await.unwrap();
    store
        .fail("ex_007", 502, serde_json::json!({"error": "upstream_down"}), 2)
        .await
        .unwrap();

    let agent = store.get_agent("a1").await.unwrap().unwrap();
    assert_eq!(agent.reserved_micro, aex_types::Micro(0));
    assert_eq!(agent.spent_micro, aex_types::Micro(0));

    let exec = store.lookup("ex_007").await.unwrap().unwrap();
    assert_eq!(exec.state, aex_types::ExecutionState::Failed);
}

#[tokio::test]
async fn double_commit_is_rejected_as_invalid_state() {
    let (_dir, store) = store().await;
    store.create_agent(test_agent("a1", 1_000_000)).await.unwrap();
    store
        .reserve(
            "a1",
            "ex_008",
            None,
            [8u8; 32],
            aex_types::execution::Route::Chat,
            "gpt-test",
            "openai",
            100_000,
            30_000,
            0,
        )
        .await
        .unwrap();
    store.mark_dispatched("ex_008", 1).await.unwrap();
    store
        .commit("ex_008", 50_000, serde_json::json!({}), 200, false, true, 2)
        .await
        .unwrap();

    let err = store
        .commit("ex_008", 50_000, serde_json::json!({}), 200, false, true, 3)
        .await
        .unwrap_err();
    assert!(matches!(err, aex_store::StoreError::InvalidState { .. }));
}

#[tokio::test]
async fn rate_limiter_admits_until_rpm_ceiling() {
    let (_dir, store) = store().await;
    store.create_agent(test_agent("a1", 1_000_000)).await.unwrap();

    for i in 0..3 {
        let outcome = store
            .check_and_record_rate("a1", 3, 1_000_000, 10, i * 100)
            .await
            .unwrap();
        assert_eq!(outcome, aex_store::RateOutcome::Admitted);
    }
    let outcome = store.check_and_record_rate("a1", 3, 1_000_000, 10, 250).await.unwrap();
    assert_eq!(outcome, aex_store::RateOutcome::RequestsExceeded);

    // past the 60s window the same agent is admitted again
    let outcome = store
        .check_and_record_rate("a1", 3, 1_000_000, 10, 61_000)
        .await
        .unwrap();
    assert_eq!(outcome, aex_store::RateOutcome::Admitted);
}
