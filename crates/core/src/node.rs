// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler tree node identity and liveness state.

use serde::{Deserialize, Serialize};

/// Identity of a scheduler node: unique name within its level plus a
/// reachable address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct NodeInfo {
    pub name: String,
    pub address: String,
}

impl NodeInfo {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self { name: name.into(), address: address.into() }
    }
}

impl std::fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.address)
    }
}

/// Liveness state of a scheduler node.
///
/// A broken node keeps its place in the tree so a replacement can adopt its
/// children; only broken nodes may be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    #[default]
    Connected,
    Broken,
}

crate::simple_display! {
    NodeState {
        Connected => "connected",
        Broken => "broken",
    }
}
