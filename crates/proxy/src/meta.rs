// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Function metadata resolution.

use crate::clients::ClientError;
use async_trait::async_trait;
use fm_wire::FunctionMeta;
use sha2::{Digest, Sha256};

/// The deployment layer's metadata service. `None` means the function is
/// unknown (surfaces as `FunctionMetaNotFound`).
#[async_trait]
pub trait FunctionMetaStore: Send + Sync {
    async fn fetch(&self, function: &str) -> Result<Option<FunctionMeta>, ClientError>;
}

/// Content hash for a code artifact, as stamped into [`FunctionMeta`].
pub fn code_hash(artifact: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(artifact);
    format!("{:x}", hasher.finalize())
}
