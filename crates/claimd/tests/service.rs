//! End-to-end scenarios against the public daemon API.
//!
//! TTL-driven scenarios run under `start_paused` so "sleeping" past a
//! deadline is instant and deterministic. The persistence scenario uses
//! real time (snapshot writes hop through a blocking thread the virtual
//! clock can't track) with intervals short enough to keep the test fast.

use std::collections::HashSet;
use std::time::Duration;

use claimd::prelude::*;

fn daemon() -> Claimd {
    Claimd::builder().expire_tick_ms(500).start()
}

// =========================================================================
// Sessions
// =========================================================================

#[tokio::test]
async fn test_session_open_get_close() {
    let daemon = daemon();
    let engine = daemon.handle();

    let id = engine
        .open_session("test session", "ANY", 5000)
        .await
        .expect("open should succeed");

    let sess = engine.get_session(&id).await.expect("should exist");
    assert_eq!(sess.name, "test session");
    assert_eq!(sess.src, "ANY");
    assert_eq!(sess.ttl_ms, 5000);

    engine.close_session(&id).await.expect("close should succeed");
    assert!(matches!(
        engine.refresh_session(&id).await,
        Err(EngineError::SessionNotFound(_))
    ));

    daemon.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_session_expires_when_not_refreshed() {
    let daemon = daemon();
    let engine = daemon.handle();

    let id = engine.open_session("test session", "ANY", 500).await.unwrap();
    engine.refresh_session(&id).await.expect("still alive");

    tokio::time::sleep(Duration::from_millis(2000)).await;

    assert!(matches!(
        engine.refresh_session(&id).await,
        Err(EngineError::SessionNotFound(_))
    ));

    daemon.shutdown().await;
}

// =========================================================================
// Tickets
// =========================================================================

#[tokio::test]
async fn test_ticket_issue_claim_release_revoke_flow() {
    let daemon = daemon();
    let engine = daemon.handle();

    let issuer = engine.open_session("test issuer", "ANY", 60_000).await.unwrap();
    let c1 = engine.open_session("claimant 1", "ANY", 60_000).await.unwrap();
    let c2 = engine.open_session("claimant 2", "ANY", 60_000).await.unwrap();
    let c3 = engine.open_session("claimant 3", "ANY", 60_000).await.unwrap();

    engine
        .issue_ticket(&issuer, "test", "foo", b"test foo data".to_vec())
        .await
        .unwrap();
    engine
        .issue_ticket(&issuer, "test", "bar", b"test bar data".to_vec())
        .await
        .unwrap();

    // Two claimants get the two tickets, in whichever order.
    let t1 = engine.claim_ticket(&c1, "test").await.unwrap().expect("first");
    let t2 = engine.claim_ticket(&c2, "test").await.unwrap().expect("second");
    let names: HashSet<&str> = [t1.name.as_str(), t2.name.as_str()].into();
    assert_eq!(names, HashSet::from(["foo", "bar"]));

    // Nothing left for the third, and that's not an error.
    assert!(engine.claim_ticket(&c3, "test").await.unwrap().is_none());

    // A release frees exactly that ticket for the third claimant.
    engine.release_ticket(&c1, "test", &t1.name).await.unwrap();
    let t3 = engine.claim_ticket(&c3, "test").await.unwrap().expect("freed");
    assert_eq!(t3.name, t1.name);

    // Revoke everything; claims come up empty from then on.
    engine.revoke_ticket(&issuer, "test", "foo").await.unwrap();
    engine.revoke_ticket(&issuer, "test", "bar").await.unwrap();
    assert!(engine.claim_ticket(&c3, "test").await.unwrap().is_none());

    // Unknown resource behaves the same as an empty one.
    assert!(engine
        .claim_ticket(&c3, "invalid-resource")
        .await
        .unwrap()
        .is_none());

    daemon.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_issuer_timeout_invalidates_ticket() {
    let daemon = daemon();
    let engine = daemon.handle();

    let issuer = engine.open_session("test issuer", "ANY", 500).await.unwrap();
    engine
        .issue_ticket(&issuer, "test", "foo", b"test foo data".to_vec())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let claimant = engine
        .open_session("test claimant 1", "ANY", 1000)
        .await
        .unwrap();
    assert!(engine.claim_ticket(&claimant, "test").await.unwrap().is_none());

    daemon.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_claimant_timeout_frees_ticket() {
    let daemon = daemon();
    let engine = daemon.handle();

    let issuer = engine.open_session("test issuer", "ANY", 60_000).await.unwrap();
    engine
        .issue_ticket(&issuer, "test", "foo", b"test foo data".to_vec())
        .await
        .unwrap();
    // Reissue to cover repeated issuance of the same ticket.
    engine
        .issue_ticket(&issuer, "test", "foo", b"test foo data".to_vec())
        .await
        .unwrap();

    let c1 = engine.open_session("claimant 1", "ANY", 500).await.unwrap();
    let c2 = engine.open_session("claimant 2", "ANY", 60_000).await.unwrap();

    let ticket = engine.claim_ticket(&c1, "test").await.unwrap().expect("claim");

    // Another reissue while claimed: the claimant keeps its hold.
    engine
        .issue_ticket(&issuer, "test", "foo", b"test foo data".to_vec())
        .await
        .unwrap();
    assert!(engine.has_ticket(&c1, "test", &ticket.name).await.unwrap());

    // Let the claimant lapse; the ticket frees up for the survivor.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let again = engine.claim_ticket(&c2, "test").await.unwrap();
    assert_eq!(again.expect("should claim freed ticket").name, "foo");

    daemon.shutdown().await;
}

// =========================================================================
// Locks
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_lock_protocol_and_expiry() {
    let daemon = daemon();
    let engine = daemon.handle();

    let s1 = engine.open_session("session-1", "ANY", 700).await.unwrap();
    let s2 = engine.open_session("session-2", "ANY", 700).await.unwrap();

    assert!(engine.lock(&s1, "/foo/bar").await.unwrap());
    // Idempotent for the holder.
    assert!(engine.lock(&s1, "/foo/bar").await.unwrap());
    // Held against the other session, without an error.
    assert!(!engine.lock(&s2, "/foo/bar").await.unwrap());

    engine.unlock(&s1, "/foo/bar").await.unwrap();
    assert!(engine.lock(&s2, "/foo/bar").await.unwrap());

    // Unlocking someone else's lock is an error.
    assert!(matches!(
        engine.unlock(&s1, "/foo/bar").await,
        Err(EngineError::NotHolder { .. })
    ));

    // Both sessions lapse; the sweep tidies the resource table.
    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert!(engine.resources().await.unwrap().is_empty());

    daemon.shutdown().await;
}

// =========================================================================
// Snapshot persistence
// =========================================================================

#[tokio::test]
async fn test_state_survives_stop_and_restart() {
    fn start(dir: &std::path::Path) -> Claimd {
        Claimd::builder()
            .expire_tick_ms(500)
            .snapshot_path(dir)
            .snapshot_interval_ms(50)
            .start()
    }

    let dir = tempfile::tempdir().unwrap();
    let daemon = start(dir.path());
    let engine = daemon.handle();

    // Ten issuers with one ticket each, ten claimants, a few idle
    // sessions, and one held lock.
    let mut claimants = Vec::new();
    for i in 0..10 {
        let issuer = engine
            .open_session(&format!("issuer {i}"), "ANY", 60_000)
            .await
            .unwrap();
        engine
            .issue_ticket(&issuer, "test", &format!("ticket {i}"), vec![i as u8])
            .await
            .unwrap();
    }
    for i in 0..10 {
        let claimant = engine
            .open_session(&format!("claimant {i}"), "ANY", 60_000)
            .await
            .unwrap();
        let ticket = engine
            .claim_ticket(&claimant, "test")
            .await
            .unwrap()
            .expect("a ticket per claimant");
        claimants.push((claimant, ticket.name));
    }
    let idle = engine.open_session("idle", "ANY", 60_000).await.unwrap();
    let locker = engine.open_session("locker", "ANY", 60_000).await.unwrap();
    assert!(engine.lock(&locker, "/locks/db").await.unwrap());

    let sessions_before = engine.sessions().await.unwrap();
    let resources_before = engine.resources().await.unwrap();

    // Let at least one snapshot land, then stop cleanly.
    tokio::time::sleep(Duration::from_millis(300)).await;
    daemon.shutdown().await;

    // Restart from the same directory.
    let daemon = start(dir.path());
    let engine = daemon.handle();

    // Every claimant still holds its ticket.
    for (claimant, ticket_name) in &claimants {
        assert!(
            engine.has_ticket(claimant, "test", ticket_name).await.unwrap(),
            "claim on {ticket_name} should survive restart"
        );
    }
    // Idle and locking sessions survived too.
    engine.refresh_session(&idle).await.unwrap();
    assert!(engine.lock(&locker, "/locks/db").await.unwrap());

    // Nothing is claimable by a newcomer.
    let late = engine.open_session("late", "ANY", 60_000).await.unwrap();
    assert!(engine.claim_ticket(&late, "test").await.unwrap().is_none());

    // Restored tables match what was snapshotted, entity for entity.
    let sessions_after = engine.sessions().await.unwrap();
    for (id, before) in &sessions_before {
        let after = sessions_after.get(id).expect("session restored");
        assert_eq!(after.name, before.name);
        assert_eq!(after.src, before.src);
        assert_eq!(after.ttl_ms, before.ttl_ms);
        let pairs = |s: &Session| -> HashSet<(String, String)> {
            s.claimed
                .iter()
                .chain(s.issued.iter())
                .map(|t| (t.resource_name.clone(), t.name.clone()))
                .collect()
        };
        assert_eq!(pairs(after), pairs(before));
    }
    let resources_after = engine.resources().await.unwrap();
    for (name, before) in &resources_before {
        let after = resources_after.get(name).expect("resource restored");
        assert_eq!(after.is_lock, before.is_lock);
        for (ticket_name, t_before) in &before.tickets {
            let t_after = after.tickets.get(ticket_name).expect("ticket restored");
            assert_eq!(t_after.data, t_before.data);
            assert_eq!(t_after.resource_name, t_before.resource_name);
            assert_eq!(
                t_after.issuer.as_ref().map(|s| &s.id),
                t_before.issuer.as_ref().map(|s| &s.id)
            );
            assert_eq!(
                t_after.claimant.as_ref().map(|s| &s.id),
                t_before.claimant.as_ref().map(|s| &s.id)
            );
        }
    }

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_restart_with_empty_dir_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = Claimd::builder()
        .snapshot_path(dir.path())
        .snapshot_interval_ms(50)
        .start();
    let engine = daemon.handle();

    assert!(engine.sessions().await.unwrap().is_empty());
    assert!(engine.resources().await.unwrap().is_empty());

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_corrupt_snapshot_starts_empty() {
    let dir = tempfile::tempdir().unwrap();

    // Produce a valid pair first.
    let daemon = Claimd::builder()
        .snapshot_path(dir.path())
        .snapshot_interval_ms(50)
        .start();
    let engine = daemon.handle();
    let id = engine.open_session("s", "ANY", 60_000).await.unwrap();
    engine
        .issue_ticket(&id, "test", "foo", vec![])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    daemon.shutdown().await;

    // Mangle one file, then restart: the daemon logs and serves empty.
    std::fs::write(dir.path().join("resources.jsonl"), b"{not json\n").unwrap();
    let daemon = Claimd::builder()
        .snapshot_path(dir.path())
        .snapshot_interval_ms(50)
        .start();
    let engine = daemon.handle();
    assert!(engine.sessions().await.unwrap().is_empty());

    daemon.shutdown().await;
}
