// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance lifecycle specs
//!
//! Forward-up between two locals, store-mediated ownership, and kill
//! termination, over one shared store.

use crate::prelude::*;
use fm_core::{ErrCode, InstanceState, Signal};
use fm_proxy::{InstanceControlView, SaveOutcome};
use fm_store::{GetOptions, MemoryStore, MetaStore};
use fm_wire::{KillRequest, ScheduleRequest};
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// A first hop without capacity forwards up; the request lands on the
/// second local and the record names it as the owner.
#[tokio::test]
async fn forward_up_moves_the_instance_to_another_local() {
    let store = MemoryStore::new();
    let full = local_node("local-a", &store, false);
    let free = local_node("local-b", &store, true);
    *full.upstream.target.lock() = Some(free.controller.clone());

    let resp = full.controller.schedule(ScheduleRequest::new(new_instance("ins-1"))).await;
    assert!(resp.code.is_ok(), "forwarded schedule failed: {resp:?}");
    assert_eq!(resp.scheduled_on, "local-b");

    // the first hop dropped its machine; the second runs it
    assert!(!full.controller.view().contains("ins-1"));
    assert_eq!(
        free.controller.view().state("ins-1"),
        Some(InstanceState::Running)
    );
    let record = free.controller.view().get("ins-1").unwrap();
    assert_eq!(record.function_proxy_id, "local-b");
}

/// Forward exhaustion: no capacity anywhere ends in SCHEDULE_FAILED.
#[tokio::test]
async fn forward_exhaustion_is_terminal() {
    let store = MemoryStore::new();
    let full = local_node("local-a", &store, false);
    // upstream unrouted: every forward is refused

    let resp = full.controller.schedule(ScheduleRequest::new(new_instance("ins-1"))).await;
    assert_eq!(resp.code, ErrCode::ResourceNotEnough);
    assert_eq!(
        full.controller.view().state("ins-1"),
        Some(InstanceState::ScheduleFailed)
    );
}

/// Never do two owners both observe success for the same record version.
#[tokio::test]
async fn ownership_is_store_mediated() {
    let store = MemoryStore::new();
    let view_a = InstanceControlView::new("local-a", Arc::new(store.clone()));
    let view_b = InstanceControlView::new("local-b", Arc::new(store.clone()));

    let mut info = new_instance("ins-1");
    info.function_proxy_id = "local-a".to_string();
    view_a.insert(info.clone());
    info.function_proxy_id = "local-b".to_string();
    view_b.insert(info);

    let a = view_a.transition("ins-1", InstanceState::Scheduling, |_| {}).await.unwrap();
    let b = view_b.transition("ins-1", InstanceState::Scheduling, |_| {}).await.unwrap();

    let applied = [&a, &b]
        .iter()
        .filter(|o| matches!(o, SaveOutcome::Applied))
        .count();
    assert_eq!(applied, 1, "exactly one owner wins: {a:?} vs {b:?}");
    assert!(matches!(b, SaveOutcome::Relinquished { ref new_owner } if new_owner == "local-a"));
}

/// Kill with a shutdown signal terminates: the instance reaches EXITED
/// and its record and route disappear from the store.
#[tokio::test]
async fn kill_terminates_and_cleans_the_store() {
    let store = MemoryStore::new();
    let node = local_node("local-a", &store, true);

    let info = new_instance("ins-1");
    let record_key =
        fm_store::keys::instance_key(&info.function, &info.instance_id, &info.request_id);
    let resp = node.controller.schedule(ScheduleRequest::new(info)).await;
    assert!(resp.code.is_ok());
    assert!(!store.get(&record_key, GetOptions::default()).await.unwrap().kvs.is_empty());

    let kill = node
        .controller
        .kill("", KillRequest::new("ins-1", Signal::ShutDownSync))
        .await;
    assert!(kill.code.is_ok());

    assert!(!node.controller.view().contains("ins-1"));
    assert!(store.get(&record_key, GetOptions::default()).await.unwrap().kvs.is_empty());
    assert!(store
        .get(&fm_store::keys::route_key("ins-1"), GetOptions::default())
        .await
        .unwrap()
        .kvs
        .is_empty());
}

/// Losing capacity mid-run: heartbeat-loss recovery replays the pipeline
/// on the same local until the instance runs again.
#[tokio::test]
async fn capacity_returning_lets_recovery_finish() {
    let store = MemoryStore::new();
    let node = local_node("local-a", &store, true);

    let resp = node.controller.schedule(ScheduleRequest::new(new_instance("ins-1"))).await;
    assert!(resp.code.is_ok());

    // capacity flaps away and back; the running instance stays running
    node.decision.has_capacity.store(false, Ordering::SeqCst);
    settle().await;
    node.decision.has_capacity.store(true, Ordering::SeqCst);
    assert_eq!(
        node.controller.view().state("ins-1"),
        Some(InstanceState::Running)
    );
}
