// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{FakeDomainClient, RecordedCall};
use std::sync::atomic::Ordering;

fn spawn_mgr(
    client: Arc<FakeDomainClient>,
) -> (DomainMgrHandle, mpsc::UnboundedReceiver<DomainEvent>) {
    DomainMgrActor::spawn(client, Duration::from_millis(20), 2, Duration::from_millis(10))
}

#[tokio::test]
async fn registration_emits_event() {
    let client = FakeDomainClient::arc();
    let (mgr, mut events) = spawn_mgr(client);

    mgr.register("d1", "addr-1").await;
    assert_eq!(
        events.recv().await.unwrap(),
        DomainEvent::Registered { name: "d1".to_string(), address: "addr-1".to_string() }
    );
}

#[tokio::test]
async fn registered_ack_reaches_the_domain() {
    let client = FakeDomainClient::arc();
    let (mgr, _events) = spawn_mgr(client.clone());

    mgr.registered("addr-1", RegisterAck::ok(None)).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(client
        .calls()
        .contains(&RecordedCall::Registered { address: "addr-1".to_string(), ok: true }));
}

#[tokio::test]
async fn heartbeat_runs_until_disconnect() {
    let client = FakeDomainClient::arc();
    let (mgr, _events) = spawn_mgr(client.clone());

    mgr.connect("d1", "addr-1").await;
    tokio::time::sleep(Duration::from_millis(90)).await;
    let beats = client.heartbeat_count.load(Ordering::SeqCst);
    assert!(beats >= 2, "expected heartbeats, got {beats}");

    mgr.disconnect().await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    let after_disconnect = client.heartbeat_count.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(client.heartbeat_count.load(Ordering::SeqCst), after_disconnect);
}

#[tokio::test]
async fn repeated_heartbeat_failures_raise_heartbeat_lost() {
    let client = FakeDomainClient::arc();
    client.heartbeat_fails.store(true, Ordering::SeqCst);
    let (mgr, mut events) = spawn_mgr(client);

    mgr.connect("d1", "addr-1").await;
    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("heartbeat lost should arrive")
        .unwrap();
    assert_eq!(event, DomainEvent::HeartbeatLost { name: "d1".to_string() });
}

#[tokio::test]
async fn reconnect_replaces_previous_link() {
    let client = FakeDomainClient::arc();
    let (mgr, _events) = spawn_mgr(client.clone());

    mgr.connect("d1", "addr-1").await;
    mgr.connect("d2", "addr-2").await;
    tokio::time::sleep(Duration::from_millis(80)).await;

    let calls = client.calls();
    // After the replacement only addr-2 is beating.
    let last_beats: Vec<_> = calls
        .iter()
        .rev()
        .filter_map(|c| match c {
            RecordedCall::Heartbeat { address } => Some(address.clone()),
            _ => None,
        })
        .take(2)
        .collect();
    assert!(last_beats.iter().all(|a| a == "addr-2"), "stale link kept beating: {last_beats:?}");
}

#[tokio::test]
async fn worker_status_flows_through_as_event() {
    let client = FakeDomainClient::arc();
    let (mgr, mut events) = spawn_mgr(client);

    mgr.notify_worker_status("10.0.0.9", "disk-pressure", false).await;
    assert_eq!(
        events.recv().await.unwrap(),
        DomainEvent::WorkerStatus {
            ip: "10.0.0.9".to_string(),
            key: "disk-pressure".to_string(),
            healthy: false
        }
    );
}

#[tokio::test]
async fn schedule_forward_returns_downstream_response() {
    let client = FakeDomainClient::arc();
    let (mgr, _events) = spawn_mgr(client.clone());

    let req = ScheduleRequest::new(fm_core::test_support::instance_in_state(
        "ins-1",
        fm_core::InstanceState::New,
    ));
    let resp = mgr.schedule("d1", "addr-1", req.clone()).await.unwrap();
    assert_eq!(resp.request_id, req.request_id);
    assert!(client
        .calls()
        .iter()
        .any(|c| matches!(c, RecordedCall::Schedule { address, .. } if address == "addr-1")));
}
