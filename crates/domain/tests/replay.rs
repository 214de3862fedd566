use std::sync::Arc;
use std::time::Duration;

use sambung_domain::ports::replay::{ClaimOutcome, ReplayKey, StoredResponse};
use sambung_domain::replay::{InMemoryReplayStore, ReplayConfig, ReplayGuard};

fn guard_with_ttls(in_progress: Duration, completed: Duration) -> ReplayGuard {
    ReplayGuard::new(
        Arc::new(InMemoryReplayStore::new("test")),
        ReplayConfig {
            in_progress_ttl: in_progress,
            completed_ttl: completed,
        },
    )
}

#[tokio::test]
async fn completed_claim_replays_the_stored_response() {
    let guard = guard_with_ttls(Duration::from_secs(60), Duration::from_secs(60));
    let key = ReplayKey::new("connection_create", "alice", "req-abc");

    assert_eq!(guard.begin(&key).await.unwrap(), ClaimOutcome::Claimed);

    let response = StoredResponse {
        status_code: 201,
        body: serde_json::json!({ "request_id": "r1", "status": "pending" }),
    };
    guard.complete(&key, &response).await.unwrap();

    match guard.begin(&key).await.unwrap() {
        ClaimOutcome::Replay(stored) => assert_eq!(stored, response),
        other => panic!("expected replay, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_claim_is_visible_as_in_progress() {
    let guard = guard_with_ttls(Duration::from_secs(60), Duration::from_secs(60));
    let key = ReplayKey::new("connection_respond", "req-1", "req-xyz");

    assert_eq!(guard.begin(&key).await.unwrap(), ClaimOutcome::Claimed);
    assert_eq!(guard.begin(&key).await.unwrap(), ClaimOutcome::InProgress);
}

#[tokio::test]
async fn expired_claim_can_be_taken_again() {
    let guard = guard_with_ttls(Duration::from_millis(20), Duration::from_secs(60));
    let key = ReplayKey::new("connection_create", "alice", "req-ttl");

    assert_eq!(guard.begin(&key).await.unwrap(), ClaimOutcome::Claimed);
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(guard.begin(&key).await.unwrap(), ClaimOutcome::Claimed);
}

#[tokio::test]
async fn distinct_request_ids_do_not_collide() {
    let guard = guard_with_ttls(Duration::from_secs(60), Duration::from_secs(60));

    let first = ReplayKey::new("connection_create", "alice", "req-1");
    let second = ReplayKey::new("connection_create", "alice", "req-2");

    assert_eq!(guard.begin(&first).await.unwrap(), ClaimOutcome::Claimed);
    assert_eq!(guard.begin(&second).await.unwrap(), ClaimOutcome::Claimed);
}
