// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The meta-store trait and its request/response shapes.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store operation failed: {0}")]
    Operation(String),
}

/// One stored key with its value and revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
    /// Revision of the last write to this key. 0 means "never written",
    /// which is also the CAS expectation for create-if-absent.
    pub mod_revision: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    /// Treat the key as a prefix and return every match.
    pub prefix: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PutOptions {
    /// Return the previous value, if any.
    pub prev_kv: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    pub prefix: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GetResponse {
    pub kvs: Vec<KeyValue>,
}

#[derive(Debug, Clone, Default)]
pub struct PutResponse {
    pub mod_revision: i64,
    pub prev_kv: Option<KeyValue>,
}

/// A change observed through a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Put(KeyValue),
    /// Carries the key and last known revision of the deleted entry.
    Delete(KeyValue),
}

/// Stream of watch events; dropped receivers cancel the watch.
pub type WatchStream = mpsc::UnboundedReceiver<WatchEvent>;

/// Comparison guarding a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnCompare {
    /// Succeeds iff the key's mod-revision equals `revision`.
    ModRevisionEq { key: String, revision: i64 },
}

/// Operation executed inside a transaction branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
    Get { key: String },
}

#[derive(Debug, Clone, Default)]
pub struct TxnResponse {
    /// True when the compares held and the `then` branch ran.
    pub succeeded: bool,
    /// Mod-revision assigned to puts in the executed branch.
    pub mod_revision: i64,
    /// Results of `Get` ops in the executed branch, in order.
    pub kvs: Vec<KeyValue>,
}

/// The consistent key-value store the control plane persists into.
#[async_trait]
pub trait MetaStore: Send + Sync {
    async fn get(&self, key: &str, opts: GetOptions) -> Result<GetResponse, StoreError>;

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        opts: PutOptions,
    ) -> Result<PutResponse, StoreError>;

    async fn delete(&self, key: &str, opts: DeleteOptions) -> Result<u64, StoreError>;

    async fn watch(&self, key: &str, prefix: bool) -> Result<WatchStream, StoreError>;

    async fn txn(
        &self,
        compare: Vec<TxnCompare>,
        then_ops: Vec<TxnOp>,
        else_ops: Vec<TxnOp>,
    ) -> Result<TxnResponse, StoreError>;
}
