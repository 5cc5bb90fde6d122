// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource group specs
//!
//! Gang scheduling through the master, bundle id stability across
//! restarts, and delete-during-pending cancellation.

use crate::prelude::*;
use fm_core::{BundleSpec, ErrCode, GroupPolicy, ResourceGroupState, Resources};
use fm_store::MemoryStore;
use fm_wire::{CreateResourceGroupRequest, QueryResourceGroupRequest};

fn create_req(name: &str) -> CreateResourceGroupRequest {
    CreateResourceGroupRequest {
        request_id: format!("req-{name}"),
        name: name.to_string(),
        tenant_id: "t1".to_string(),
        owner: String::new(),
        priority: 0,
        policy: GroupPolicy::StrictSpread,
        bundles: vec![
            BundleSpec { resources: Resources::new(1000, 256), ..Default::default() },
            BundleSpec { resources: Resources::new(1000, 256), ..Default::default() },
        ],
    }
}

fn query_req(name: &str) -> QueryResourceGroupRequest {
    QueryResourceGroupRequest {
        request_id: format!("q-{name}"),
        group_name: name.to_string(),
        tenant_id: "t1".to_string(),
    }
}

/// A created group has every bundle placed and persists as CREATED.
#[tokio::test]
async fn gang_schedule_places_every_bundle() {
    let store = MemoryStore::new();
    let master = master_node(&store, StubLauncher::arc(true, "unused")).await;
    master.domain_mgr.register("d1", "addr-d1").await;
    settle().await;

    let resp = master.rgroup.create(create_req("rg1")).await;
    assert!(resp.code.is_ok(), "create failed: {resp:?}");

    let group = master.rgroup.query(query_req("rg1")).await.group.unwrap();
    assert_eq!(group.state, ResourceGroupState::Created);
    assert!(group.bundles.iter().all(|b| b.function_proxy_id == "local-b"));
    // strict spread put a required anti-affinity on each bundle
    assert!(group
        .bundles
        .iter()
        .all(|b| b.spec.affinity.required_anti.is_some()));
}

/// Bundle ids embed (name, request, index) and survive a manager restart.
#[tokio::test]
async fn bundle_ids_are_stable_across_recovery() {
    let store = MemoryStore::new();
    let master = master_node(&store, StubLauncher::arc(true, "unused")).await;
    master.domain_mgr.register("d1", "addr-d1").await;
    settle().await;
    assert!(master.rgroup.create(create_req("rg1")).await.code.is_ok());

    let ids: Vec<String> = master
        .rgroup
        .query(query_req("rg1"))
        .await
        .group
        .unwrap()
        .bundles
        .iter()
        .map(|b| b.bundle_id.clone())
        .collect();
    assert_eq!(ids[0], fm_core::bundle_id("rg1", "req-rg1", 0));
    assert_eq!(ids[1], fm_core::bundle_id("rg1", "req-rg1", 1));

    let second = master_node(&store, StubLauncher::arc(true, "unused")).await;
    let recovered: Vec<String> = second
        .rgroup
        .query(query_req("rg1"))
        .await
        .group
        .unwrap()
        .bundles
        .iter()
        .map(|b| b.bundle_id.clone())
        .collect();
    assert_eq!(ids, recovered);
}

/// S7: deleting while the gang schedule is still pending cancels the
/// create; the creator sees ERR_SCHEDULE_CANCELED.
#[tokio::test]
async fn delete_during_pending_cancels_the_creator() {
    let store = MemoryStore::new();
    // no domain registered: the gang schedule cannot reach a root
    let master = master_node(&store, StubLauncher::arc(true, "unused")).await;

    let rgroup = master.rgroup.clone();
    let create = tokio::spawn(async move { rgroup.create(create_req("rg1")).await });
    settle().await;

    let (code, _) = master.rgroup.delete("t1", "rg1").await;
    assert!(code.is_ok());
    assert_eq!(create.await.unwrap().code, ErrCode::ScheduleCanceled);
    assert!(master.rgroup.query(query_req("rg1")).await.group.is_none());
}

/// Deleting a created group releases its reservations on the locals.
#[tokio::test]
async fn delete_releases_bundles() {
    let store = MemoryStore::new();
    let master = master_node(&store, StubLauncher::arc(true, "unused")).await;
    master.domain_mgr.register("d1", "addr-d1").await;
    settle().await;
    // the gang places on "local-b"; register it so its address resolves
    master.local_mgr.register("local-b", "addr-local-b").await;
    settle().await;

    assert!(master.rgroup.create(create_req("rg1")).await.code.is_ok());
    let (code, _) = master.rgroup.delete("t1", "rg1").await;
    assert!(code.is_ok());

    let removed = master.local_client.removed_bundles.lock();
    assert_eq!(removed.len(), 2);
}
