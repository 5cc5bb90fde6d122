// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Topology specs
//!
//! Membership, snapshot round trips, and the co-resident domain repair
//! path, driven through the public master API.

use crate::prelude::*;
use fm_core::NodeInfo;
use fm_master::{SchedTree, TreeError};
use fm_store::{GetOptions, MemoryStore, MetaStore};

/// Every successful topology put round-trips to an identical tree.
#[tokio::test]
async fn persisted_snapshot_round_trips_exactly() {
    let store = MemoryStore::new();
    let master = master_node(&store, StubLauncher::arc(true, "unused")).await;

    master.domain_mgr.register("d1", "addr-d1").await;
    settle().await;
    master.local_mgr.register("l1", "addr-l1").await;
    master.local_mgr.register("l2", "addr-l2").await;
    settle().await;

    let snapshot = store
        .get(fm_store::keys::SCHEDULER_TOPOLOGY_KEY, GetOptions::default())
        .await
        .unwrap();
    let bytes = &snapshot.kvs[0].value;

    let mut recovered = SchedTree::new(2, 4);
    recovered.recover(bytes).unwrap();
    assert_eq!(recovered.serialize(), *bytes);

    let tree: fm_wire::SchedulerNode = serde_json::from_slice(bytes).unwrap();
    let mut rows = tree.flatten();
    rows.sort();
    assert_eq!(
        rows,
        vec![
            ("d1".to_string(), "addr-d1".to_string(), 1, None),
            ("l1".to_string(), "addr-l1".to_string(), 0, Some("d1".to_string())),
            ("l2".to_string(), "addr-l2".to_string(), 0, Some("d1".to_string())),
        ]
    );
}

/// A local arriving before any domain exists triggers the co-resident
/// launcher; the launched domain adopts it.
#[tokio::test]
async fn launcher_repairs_an_empty_tree() {
    let store = MemoryStore::new();
    let master = master_node(&store, StubLauncher::arc(false, "inner-d")).await;

    master.local_mgr.register("l1", "addr-l1").await;
    settle().await;
    settle().await;

    let nodes = master.global.query_nodes().await;
    assert!(nodes.contains("inner-d"), "launched domain missing: {nodes:?}");
    assert!(nodes.contains("l1"));
    assert!(master
        .local_client
        .acks
        .lock()
        .contains(&("addr-l1".to_string(), true)));
}

/// When the launcher cannot start, the registration is refused.
#[tokio::test]
async fn failed_launcher_refuses_the_local() {
    let store = MemoryStore::new();
    let master = master_node(&store, StubLauncher::arc(true, "unused")).await;

    master.local_mgr.register("l1", "addr-l1").await;
    settle().await;

    assert!(master
        .local_client
        .acks
        .lock()
        .contains(&("addr-l1".to_string(), false)));
}

/// A fresh master over the same store comes back with the same topology.
#[tokio::test]
async fn restart_recovers_the_tree() {
    let store = MemoryStore::new();
    let master = master_node(&store, StubLauncher::arc(true, "unused")).await;
    master.domain_mgr.register("d1", "addr-d1").await;
    settle().await;
    master.local_mgr.register("l1", "addr-l1").await;
    settle().await;

    let second = master_node(&store, StubLauncher::arc(true, "unused")).await;
    let nodes = second.global.query_nodes().await;
    assert!(nodes.contains("d1") && nodes.contains("l1"), "recovered: {nodes:?}");
    assert_eq!(second.global.root_domain_info().await.unwrap().name, "d1");
}

/// Pure tree invariants: leaves need two levels, and a full domain
/// refuses more.
#[test]
fn tree_capacity_rules_hold() {
    let mut tree = SchedTree::new(2, 2);
    assert_eq!(
        tree.add_leaf(NodeInfo::new("l1", "a1")),
        Err(TreeError::TooShallow)
    );
    tree.add_non_leaf(NodeInfo::new("d1", "a-d1")).unwrap();
    tree.add_leaf(NodeInfo::new("l1", "a1")).unwrap();
    tree.add_leaf(NodeInfo::new("l2", "a2")).unwrap();
    assert!(matches!(
        tree.add_leaf(NodeInfo::new("l3", "a3")),
        Err(TreeError::NoSlot(_))
    ));
}
