// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory meta store with etcd-shaped semantics.

use crate::store::{
    DeleteOptions, GetOptions, GetResponse, KeyValue, MetaStore, PutOptions, PutResponse,
    StoreError, TxnCompare, TxnOp, TxnResponse, WatchEvent, WatchStream,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;

struct Watcher {
    key: String,
    prefix: bool,
    tx: mpsc::UnboundedSender<WatchEvent>,
}

#[derive(Default)]
struct Inner {
    revision: i64,
    data: BTreeMap<String, (Vec<u8>, i64)>,
    watchers: Vec<Watcher>,
    healthy: bool,
}

/// Revisioned in-memory store. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner { healthy: true, ..Default::default() })),
        }
    }

    /// Simulate a store outage (every op fails) or its end.
    pub fn set_healthy(&self, healthy: bool) {
        self.inner.lock().healthy = healthy;
    }

    /// Current store revision, for test assertions.
    pub fn revision(&self) -> i64 {
        self.inner.lock().revision
    }

    fn check_healthy(inner: &Inner) -> Result<(), StoreError> {
        if inner.healthy {
            Ok(())
        } else {
            Err(StoreError::Unavailable("store outage".to_string()))
        }
    }

    fn notify(inner: &mut Inner, event: WatchEvent) {
        let key = match &event {
            WatchEvent::Put(kv) | WatchEvent::Delete(kv) => kv.key.clone(),
        };
        inner.watchers.retain(|w| {
            let interested = if w.prefix { key.starts_with(&w.key) } else { key == w.key };
            if !interested {
                return true;
            }
            // Closed receivers drop out of the watcher list.
            w.tx.send(event.clone()).is_ok()
        });
    }

    fn do_put(inner: &mut Inner, key: &str, value: Vec<u8>) -> i64 {
        inner.revision += 1;
        let revision = inner.revision;
        inner.data.insert(key.to_string(), (value.clone(), revision));
        Self::notify(
            inner,
            WatchEvent::Put(KeyValue { key: key.to_string(), value, mod_revision: revision }),
        );
        revision
    }

    fn do_delete(inner: &mut Inner, key: &str) -> bool {
        if let Some((value, revision)) = inner.data.remove(key) {
            Self::notify(
                inner,
                WatchEvent::Delete(KeyValue {
                    key: key.to_string(),
                    value,
                    mod_revision: revision,
                }),
            );
            true
        } else {
            false
        }
    }

    fn matching_keys(inner: &Inner, key: &str, prefix: bool) -> Vec<String> {
        if prefix {
            inner
                .data
                .range(key.to_string()..)
                .take_while(|(k, _)| k.starts_with(key))
                .map(|(k, _)| k.clone())
                .collect()
        } else if inner.data.contains_key(key) {
            vec![key.to_string()]
        } else {
            Vec::new()
        }
    }
}

#[async_trait]
impl MetaStore for MemoryStore {
    async fn get(&self, key: &str, opts: GetOptions) -> Result<GetResponse, StoreError> {
        let inner = self.inner.lock();
        Self::check_healthy(&inner)?;
        let kvs = Self::matching_keys(&inner, key, opts.prefix)
            .into_iter()
            .filter_map(|k| {
                inner.data.get(&k).map(|(value, revision)| KeyValue {
                    key: k.clone(),
                    value: value.clone(),
                    mod_revision: *revision,
                })
            })
            .collect();
        Ok(GetResponse { kvs })
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        opts: PutOptions,
    ) -> Result<PutResponse, StoreError> {
        let mut inner = self.inner.lock();
        Self::check_healthy(&inner)?;
        let prev_kv = if opts.prev_kv {
            inner.data.get(key).map(|(v, r)| KeyValue {
                key: key.to_string(),
                value: v.clone(),
                mod_revision: *r,
            })
        } else {
            None
        };
        let mod_revision = Self::do_put(&mut inner, key, value);
        Ok(PutResponse { mod_revision, prev_kv })
    }

    async fn delete(&self, key: &str, opts: DeleteOptions) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        Self::check_healthy(&inner)?;
        let keys = Self::matching_keys(&inner, key, opts.prefix);
        let mut deleted = 0;
        for k in keys {
            if Self::do_delete(&mut inner, &k) {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn watch(&self, key: &str, prefix: bool) -> Result<WatchStream, StoreError> {
        let mut inner = self.inner.lock();
        Self::check_healthy(&inner)?;
        let (tx, rx) = mpsc::unbounded_channel();
        inner.watchers.push(Watcher { key: key.to_string(), prefix, tx });
        Ok(rx)
    }

    async fn txn(
        &self,
        compare: Vec<TxnCompare>,
        then_ops: Vec<TxnOp>,
        else_ops: Vec<TxnOp>,
    ) -> Result<TxnResponse, StoreError> {
        let mut inner = self.inner.lock();
        Self::check_healthy(&inner)?;
        let succeeded = compare.iter().all(|c| match c {
            TxnCompare::ModRevisionEq { key, revision } => {
                let current = inner.data.get(key).map(|(_, r)| *r).unwrap_or(0);
                current == *revision
            }
        });
        let ops = if succeeded { then_ops } else { else_ops };
        let mut response = TxnResponse { succeeded, ..Default::default() };
        for op in ops {
            match op {
                TxnOp::Put { key, value } => {
                    response.mod_revision = Self::do_put(&mut inner, &key, value);
                }
                TxnOp::Delete { key } => {
                    Self::do_delete(&mut inner, &key);
                }
                TxnOp::Get { key } => {
                    if let Some((value, revision)) = inner.data.get(&key) {
                        response.kvs.push(KeyValue {
                            key: key.clone(),
                            value: value.clone(),
                            mod_revision: *revision,
                        });
                    }
                }
            }
        }
        Ok(response)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
