// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::store::{DeleteOptions, GetOptions, PutOptions, TxnCompare, TxnOp};

#[tokio::test]
async fn put_then_get() {
    let store = MemoryStore::new();
    let put = store.put("k1", b"v1".to_vec(), PutOptions::default()).await.unwrap();
    assert!(put.mod_revision > 0);

    let got = store.get("k1", GetOptions::default()).await.unwrap();
    assert_eq!(got.kvs.len(), 1);
    assert_eq!(got.kvs[0].value, b"v1");
    assert_eq!(got.kvs[0].mod_revision, put.mod_revision);
}

#[tokio::test]
async fn prefix_get_scans_range() {
    let store = MemoryStore::new();
    store.put("/a/1", b"1".to_vec(), PutOptions::default()).await.unwrap();
    store.put("/a/2", b"2".to_vec(), PutOptions::default()).await.unwrap();
    store.put("/b/1", b"3".to_vec(), PutOptions::default()).await.unwrap();

    let got = store.get("/a/", GetOptions { prefix: true }).await.unwrap();
    assert_eq!(got.kvs.len(), 2);
}

#[tokio::test]
async fn put_with_prev_kv_returns_previous() {
    let store = MemoryStore::new();
    store.put("k", b"old".to_vec(), PutOptions::default()).await.unwrap();
    let put = store.put("k", b"new".to_vec(), PutOptions { prev_kv: true }).await.unwrap();
    assert_eq!(put.prev_kv.unwrap().value, b"old");
}

#[tokio::test]
async fn cas_succeeds_on_matching_revision() {
    let store = MemoryStore::new();
    let put = store.put("k", b"v1".to_vec(), PutOptions::default()).await.unwrap();

    let txn = store
        .txn(
            vec![TxnCompare::ModRevisionEq { key: "k".to_string(), revision: put.mod_revision }],
            vec![TxnOp::Put { key: "k".to_string(), value: b"v2".to_vec() }],
            vec![],
        )
        .await
        .unwrap();
    assert!(txn.succeeded);
    assert!(txn.mod_revision > put.mod_revision);
}

#[tokio::test]
async fn cas_fails_on_stale_revision_and_runs_else() {
    let store = MemoryStore::new();
    let put = store.put("k", b"v1".to_vec(), PutOptions::default()).await.unwrap();
    store.put("k", b"v2".to_vec(), PutOptions::default()).await.unwrap();

    let txn = store
        .txn(
            vec![TxnCompare::ModRevisionEq { key: "k".to_string(), revision: put.mod_revision }],
            vec![TxnOp::Put { key: "k".to_string(), value: b"v3".to_vec() }],
            vec![TxnOp::Get { key: "k".to_string() }],
        )
        .await
        .unwrap();
    assert!(!txn.succeeded);
    assert_eq!(txn.kvs.len(), 1);
    assert_eq!(txn.kvs[0].value, b"v2");
}

#[tokio::test]
async fn create_if_absent_uses_zero_revision() {
    let store = MemoryStore::new();
    let txn = store
        .txn(
            vec![TxnCompare::ModRevisionEq { key: "fresh".to_string(), revision: 0 }],
            vec![TxnOp::Put { key: "fresh".to_string(), value: b"v".to_vec() }],
            vec![],
        )
        .await
        .unwrap();
    assert!(txn.succeeded);

    // Second create-if-absent must fail: the key now has a revision.
    let txn = store
        .txn(
            vec![TxnCompare::ModRevisionEq { key: "fresh".to_string(), revision: 0 }],
            vec![TxnOp::Put { key: "fresh".to_string(), value: b"v2".to_vec() }],
            vec![],
        )
        .await
        .unwrap();
    assert!(!txn.succeeded);
}

#[tokio::test]
async fn watch_receives_puts_and_deletes() {
    let store = MemoryStore::new();
    let mut watch = store.watch("/w/", true).await.unwrap();

    store.put("/w/1", b"v".to_vec(), PutOptions::default()).await.unwrap();
    store.delete("/w/1", DeleteOptions::default()).await.unwrap();
    store.put("/other", b"v".to_vec(), PutOptions::default()).await.unwrap();

    match watch.recv().await.unwrap() {
        WatchEvent::Put(kv) => assert_eq!(kv.key, "/w/1"),
        other => panic!("expected put, got {other:?}"),
    }
    match watch.recv().await.unwrap() {
        WatchEvent::Delete(kv) => assert_eq!(kv.key, "/w/1"),
        other => panic!("expected delete, got {other:?}"),
    }
    // the /other put must not arrive
    assert!(watch.try_recv().is_err());
}

#[tokio::test]
async fn unhealthy_store_fails_every_op() {
    let store = MemoryStore::new();
    store.set_healthy(false);
    assert!(store.get("k", GetOptions::default()).await.is_err());
    assert!(store.put("k", vec![], PutOptions::default()).await.is_err());
    assert!(store.delete("k", DeleteOptions::default()).await.is_err());

    store.set_healthy(true);
    assert!(store.put("k", vec![], PutOptions::default()).await.is_ok());
}

#[tokio::test]
async fn delete_prefix_counts_removed_keys() {
    let store = MemoryStore::new();
    store.put("/d/1", b"1".to_vec(), PutOptions::default()).await.unwrap();
    store.put("/d/2", b"2".to_vec(), PutOptions::default()).await.unwrap();
    let deleted = store.delete("/d/", DeleteOptions { prefix: true }).await.unwrap();
    assert_eq!(deleted, 2);
}
