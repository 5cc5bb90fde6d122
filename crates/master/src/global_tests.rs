// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::activator::DomainLauncher;
use crate::domain_mgr::DomainMgrActor;
use crate::local_mgr::LocalMgrActor;
use crate::test_support::{FakeDomainClient, FakeLocalClient, RecordedCall};
use async_trait::async_trait;
use fm_store::MemoryStore;
use parking_lot::Mutex as PlMutex;

/// Launcher that simulates the co-resident domain scheduler: a successful
/// start makes the domain register itself through the ordinary path.
struct ScriptedLauncher {
    fail: bool,
    domain_name: String,
    mgr: PlMutex<Option<DomainMgrHandle>>,
}

impl ScriptedLauncher {
    fn arc(fail: bool, domain_name: &str) -> Arc<Self> {
        Arc::new(Self {
            fail,
            domain_name: domain_name.to_string(),
            mgr: PlMutex::new(None),
        })
    }
}

#[async_trait]
impl DomainLauncher for ScriptedLauncher {
    async fn start(&self) -> Result<(), String> {
        if self.fail {
            return Err("launch failed".to_string());
        }
        let mgr = self.mgr.lock().clone();
        if let Some(mgr) = mgr {
            let name = self.domain_name.clone();
            tokio::spawn(async move {
                mgr.register(&name, format!("addr-{name}")).await;
            });
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), String> {
        Ok(())
    }
}

struct Harness {
    handle: GlobalSchedHandle,
    domain_mgr: DomainMgrHandle,
    local_mgr: LocalMgrHandle,
    domain_client: Arc<FakeDomainClient>,
    local_client: Arc<FakeLocalClient>,
    store: MemoryStore,
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(60)).await;
}

fn harness_with(config: MasterConfig, launcher: Arc<ScriptedLauncher>) -> Harness {
    let domain_client = FakeDomainClient::arc();
    let local_client = FakeLocalClient::arc();
    let store = MemoryStore::new();
    let (domain_mgr, domain_events) = DomainMgrActor::spawn(
        domain_client.clone(),
        Duration::from_millis(50),
        2,
        Duration::from_millis(10),
    );
    *launcher.mgr.lock() = Some(domain_mgr.clone());
    let (local_mgr, local_events) = LocalMgrActor::spawn(local_client.clone());
    let handle = GlobalSchedActor::spawn(
        config,
        Arc::new(store.clone()),
        Arc::new(DomainActivator::new(launcher)),
        domain_mgr.clone(),
        domain_events,
        local_mgr.clone(),
        local_events,
    );
    Harness { handle, domain_mgr, local_mgr, domain_client, local_client, store }
}

fn small_config() -> MasterConfig {
    MasterConfig::default()
        .node_id("gs-1")
        .max_local_per_domain(2)
        .max_domain_per_domain(2)
        .recover_timeout_ms(200)
}

#[tokio::test]
async fn domain_registration_connects_heartbeat_and_persists() {
    let h = harness_with(small_config(), ScriptedLauncher::arc(true, "unused"));
    settle().await;

    h.domain_mgr.register("d1", "addr-d1").await;
    settle().await;

    // registration was acknowledged
    assert!(h
        .domain_client
        .calls()
        .contains(&RecordedCall::Registered { address: "addr-d1".to_string(), ok: true }));
    // the new root is being heartbeated
    assert!(h
        .domain_client
        .calls()
        .iter()
        .any(|c| matches!(c, RecordedCall::Heartbeat { address } if address == "addr-d1")));
    // the snapshot landed in the store
    let snapshot = h
        .store
        .get(fm_store::keys::SCHEDULER_TOPOLOGY_KEY, fm_store::GetOptions::default())
        .await
        .unwrap();
    assert_eq!(snapshot.kvs.len(), 1);
    assert_eq!(h.handle.root_domain_info().await.unwrap().name, "d1");
}

#[tokio::test]
async fn local_registration_lands_under_a_domain() {
    let h = harness_with(small_config(), ScriptedLauncher::arc(true, "unused"));
    settle().await;
    h.domain_mgr.register("d1", "addr-d1").await;
    settle().await;

    h.local_mgr.register("l1", "addr-l1").await;
    settle().await;

    assert!(h
        .local_client
        .calls()
        .contains(&RecordedCall::Registered { address: "addr-l1".to_string(), ok: true }));
    assert_eq!(h.handle.local_address("l1").await.as_deref(), Some("addr-l1"));
    let nodes = h.handle.query_nodes().await;
    assert!(nodes.contains("d1") && nodes.contains("l1"));
}

#[tokio::test]
async fn local_before_any_domain_activates_launcher_and_replays() {
    // S1 success path: no domain yet; the launcher brings one up and the
    // cached local lands beneath it.
    let h = harness_with(small_config(), ScriptedLauncher::arc(false, "inner-d"));
    settle().await;

    h.local_mgr.register("l1", "addr-l1").await;
    settle().await;
    settle().await;

    assert!(h
        .local_client
        .calls()
        .contains(&RecordedCall::Registered { address: "addr-l1".to_string(), ok: true }));
    let nodes = h.handle.query_nodes().await;
    assert!(nodes.contains("inner-d"), "launched domain should be in the tree: {nodes:?}");
    assert!(nodes.contains("l1"));
}

#[tokio::test]
async fn local_with_failed_launcher_is_refused() {
    // S1 failure path.
    let h = harness_with(small_config(), ScriptedLauncher::arc(true, "unused"));
    settle().await;

    h.local_mgr.register("l1", "addr-l1").await;
    settle().await;

    assert!(h
        .local_client
        .calls()
        .contains(&RecordedCall::Registered { address: "addr-l1".to_string(), ok: false }));
}

#[tokio::test]
async fn leaf_capacity_exhaustion_activates_repair_domain() {
    // Leaf capacity exhaustion with max_local_per_domain = 2: the tree holds
    // a full level-1 domain (d1) under a level-2 root (d-root, promoted when
    // it registered second). The third local triggers the launcher; the
    // launched domain lands at level 1 under the root and adopts it.
    let h = harness_with(small_config(), ScriptedLauncher::arc(false, "d2"));
    settle().await;
    h.domain_mgr.register("d1", "addr-d1").await;
    settle().await;
    h.domain_mgr.register("d-root", "addr-droot").await;
    settle().await;
    h.local_mgr.register("l1", "addr-l1").await;
    h.local_mgr.register("l2", "addr-l2").await;
    settle().await;

    h.local_mgr.register("l3", "addr-l3").await;
    settle().await;
    settle().await;

    let nodes = h.handle.query_nodes().await;
    assert!(nodes.contains("d2"), "repair domain should exist: {nodes:?}");
    assert!(nodes.contains("l3"));
    assert!(h
        .local_client
        .calls()
        .contains(&RecordedCall::Registered { address: "addr-l3".to_string(), ok: true }));
    // l3 hangs off the launched domain, not the full one
    let snapshot = h
        .store
        .get(fm_store::keys::SCHEDULER_TOPOLOGY_KEY, fm_store::GetOptions::default())
        .await
        .unwrap();
    let tree: fm_wire::SchedulerNode = serde_json::from_slice(&snapshot.kvs[0].value).unwrap();
    let rows = tree.flatten();
    let l3 = rows.iter().find(|r| r.0 == "l3").unwrap();
    assert_eq!(l3.3.as_deref(), Some("d2"));
}

#[tokio::test]
async fn local_removal_pushes_fresh_view_and_notifies() {
    let h = harness_with(small_config(), ScriptedLauncher::arc(true, "unused"));
    settle().await;
    h.domain_mgr.register("d1", "addr-d1").await;
    settle().await;
    let mut changes = h.handle.subscribe_local_changes().await.unwrap();
    h.local_mgr.register("l1", "addr-l1").await;
    h.local_mgr.register("l2", "addr-l2").await;
    settle().await;
    assert_eq!(changes.recv().await.unwrap(), LocalChange::Added { name: "l1".to_string() });
    assert_eq!(changes.recv().await.unwrap(), LocalChange::Added { name: "l2".to_string() });

    h.local_mgr.unregister("l1", "10.0.0.1").await;
    settle().await;

    assert_eq!(
        changes.recv().await.unwrap(),
        LocalChange::Removed { name: "l1".to_string(), kind: LocalExitKind::Unregister }
    );
    // the surviving member got a view without l1
    let pushes: Vec<_> = h
        .local_client
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            RecordedCall::UpdateTopology { address, member_count, .. } => {
                Some((address, member_count))
            }
            _ => None,
        })
        .collect();
    assert!(pushes.contains(&(("addr-l2".to_string()), 1)), "pushes: {pushes:?}");
    assert_eq!(h.handle.local_address("l1").await, None);
}

#[tokio::test]
async fn broken_domain_is_replaced_by_next_registration() {
    let config = small_config().heartbeat_interval_ms(30);
    let h = harness_with(config, ScriptedLauncher::arc(true, "unused"));
    settle().await;
    h.domain_mgr.register("d1", "addr-d1").await;
    settle().await;

    // Kill the heartbeat so d1 goes broken.
    h.domain_client.heartbeat_fails.store(true, std::sync::atomic::Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(400)).await;

    h.domain_client.heartbeat_fails.store(false, std::sync::atomic::Ordering::SeqCst);
    h.domain_mgr.register("d9", "addr-d9").await;
    settle().await;

    let nodes = h.handle.query_nodes().await;
    assert!(nodes.contains("d9"), "replacement should be present: {nodes:?}");
    assert!(!nodes.contains("d1"), "broken domain should be replaced: {nodes:?}");
    assert_eq!(h.handle.root_domain_info().await.unwrap().name, "d9");
}

#[tokio::test]
async fn topology_survives_restart() {
    let h = harness_with(small_config(), ScriptedLauncher::arc(true, "unused"));
    settle().await;
    h.domain_mgr.register("d1", "addr-d1").await;
    settle().await;
    h.local_mgr.register("l1", "addr-l1").await;
    settle().await;

    // A second actor over the same store recovers the same topology.
    let domain_client = FakeDomainClient::arc();
    let local_client = FakeLocalClient::arc();
    let (domain_mgr, domain_events) = DomainMgrActor::spawn(
        domain_client.clone(),
        Duration::from_millis(50),
        2,
        Duration::from_millis(10),
    );
    let (local_mgr, local_events) = LocalMgrActor::spawn(local_client);
    let recovered = GlobalSchedActor::spawn(
        small_config(),
        Arc::new(h.store.clone()),
        Arc::new(DomainActivator::new(ScriptedLauncher::arc(true, "unused"))),
        domain_mgr,
        domain_events,
        local_mgr,
        local_events,
    );
    settle().await;

    let nodes = recovered.query_nodes().await;
    assert!(nodes.contains("d1") && nodes.contains("l1"), "recovered: {nodes:?}");
    // heartbeat resumed toward the recovered root
    assert!(domain_client
        .calls()
        .iter()
        .any(|c| matches!(c, RecordedCall::Heartbeat { address } if address == "addr-d1")));
}

#[tokio::test]
async fn store_outage_defers_snapshot_until_healthy() {
    let h = harness_with(small_config(), ScriptedLauncher::arc(true, "unused"));
    settle().await;
    h.domain_mgr.register("d1", "addr-d1").await;
    settle().await;

    h.store.set_healthy(false);
    h.local_mgr.register("l1", "addr-l1").await;
    settle().await;
    settle().await;

    let state = h.handle.inspect().await;
    assert!(state.queued, "snapshot should be queued during outage");

    h.store.set_healthy(true);
    h.handle.on_healthy_status(true).await;
    settle().await;

    let snapshot = h
        .store
        .get(fm_store::keys::SCHEDULER_TOPOLOGY_KEY, fm_store::GetOptions::default())
        .await
        .unwrap();
    let tree: fm_wire::SchedulerNode = serde_json::from_slice(&snapshot.kvs[0].value).unwrap();
    let names: Vec<String> = tree.flatten().into_iter().map(|r| r.0).collect();
    assert!(names.contains(&"l1".to_string()), "deferred snapshot should include l1");
}

#[tokio::test]
async fn follower_refuses_mutations_and_redirects_reads() {
    let h = harness_with(small_config(), ScriptedLauncher::arc(true, "unused"));
    settle().await;
    h.domain_mgr.register("d1", "addr-d1").await;
    settle().await;

    h.handle
        .update_leader_info(LeaderInfo { name: "gs-2".to_string(), address: "addr-gs2".to_string() })
        .await;
    settle().await;
    assert!(!h.handle.inspect().await.role_is_master);

    // mutating schedule is refused with "master changed"
    let req = ScheduleRequest::new(fm_core::test_support::instance_in_state(
        "ins-1",
        fm_core::InstanceState::New,
    ));
    let err = h.handle.schedule(req).await.unwrap_err();
    assert_eq!(err.0, ErrCode::InnerCommunication);
    assert!(err.1.contains("addr-gs2"));

    // a local registering against a follower is refused
    h.local_mgr.register("l9", "addr-l9").await;
    settle().await;
    assert!(h
        .local_client
        .calls()
        .contains(&RecordedCall::Registered { address: "addr-l9".to_string(), ok: false }));

    // reads are forwarded to the master's address
    let _ = h
        .handle
        .query_resources_info(QueryResourcesInfoRequest { request_id: "r1".to_string() })
        .await;
}

#[tokio::test]
async fn regaining_mastership_resyncs_from_store() {
    let h = harness_with(small_config(), ScriptedLauncher::arc(true, "unused"));
    settle().await;
    h.domain_mgr.register("d1", "addr-d1").await;
    settle().await;

    h.handle
        .update_leader_info(LeaderInfo { name: "gs-2".to_string(), address: "addr-gs2".to_string() })
        .await;
    settle().await;
    h.handle
        .update_leader_info(LeaderInfo { name: "gs-1".to_string(), address: "addr-gs1".to_string() })
        .await;
    settle().await;

    let state = h.handle.inspect().await;
    assert!(state.role_is_master);
    assert!(state.recovered);
    let nodes = h.handle.query_nodes().await;
    assert!(nodes.contains("d1"));
}

#[tokio::test]
async fn evict_agent_routes_through_the_local() {
    let h = harness_with(small_config(), ScriptedLauncher::arc(true, "unused"));
    settle().await;
    h.domain_mgr.register("d1", "addr-d1").await;
    settle().await;
    h.local_mgr.register("l1", "addr-l1").await;
    settle().await;

    let code = h
        .handle
        .evict_agent("l1", EvictAgentRequest { agent_id: "agent-1".to_string(), timeout_sec: 30 })
        .await
        .unwrap();
    assert!(code.is_ok());
    assert!(h.local_client.calls().contains(&RecordedCall::EvictAgent {
        address: "addr-l1".to_string(),
        agent_id: "agent-1".to_string()
    }));
}

#[tokio::test]
async fn taints_track_local_liveness() {
    let h = harness_with(small_config(), ScriptedLauncher::arc(true, "unused"));
    settle().await;
    h.domain_mgr.register("d1", "addr-d1").await;
    settle().await;
    h.local_mgr.register("l1", "10.0.0.5:31502").await;
    settle().await;

    let taints = h.handle.inspect().await.taints;
    assert_eq!(
        taints.get(&("10.0.0.5".to_string(), FUNCTION_PROXY_TAINT_KEY.to_string())),
        Some(&true)
    );

    h.local_mgr.unregister("l1", "10.0.0.5").await;
    settle().await;
    let taints = h.handle.inspect().await.taints;
    assert_eq!(
        taints.get(&("10.0.0.5".to_string(), FUNCTION_PROXY_TAINT_KEY.to_string())),
        Some(&false)
    );
}
