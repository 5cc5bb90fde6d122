// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Topology snapshot and scheduler registration messages.

use fm_core::{ErrCode, NodeInfo};
use serde::{Deserialize, Serialize};

/// One node of the persisted topology snapshot, children nested depth-first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerNode {
    pub name: String,
    pub address: String,
    pub level: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SchedulerNode>,
}

impl SchedulerNode {
    /// Flatten into (name, address, level, parent-name) rows for comparison.
    pub fn flatten(&self) -> Vec<(String, String, u32, Option<String>)> {
        fn walk(
            node: &SchedulerNode,
            parent: Option<&str>,
            out: &mut Vec<(String, String, u32, Option<String>)>,
        ) {
            out.push((
                node.name.clone(),
                node.address.clone(),
                node.level,
                parent.map(|p| p.to_string()),
            ));
            for child in &node.children {
                walk(child, Some(&node.name), out);
            }
        }
        let mut out = Vec::new();
        walk(self, None, &mut out);
        out
    }
}

/// Topology view pushed to a scheduler: who to heartbeat to and who else
/// shares that parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ScheduleTopology {
    pub leader: NodeInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<NodeInfo>,
}

/// What kind of scheduler is registering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    Local,
    Domain,
}

/// Registration sent by a domain or local scheduler to the global scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub kind: SchedulerKind,
    pub name: String,
    pub address: String,
}

/// Registration acknowledgment carrying the current topology view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterAck {
    pub code: ErrCode,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology: Option<ScheduleTopology>,
}

impl RegisterAck {
    pub fn ok(topology: Option<ScheduleTopology>) -> Self {
        Self { code: ErrCode::None, message: String::new(), topology }
    }

    pub fn refused(code: ErrCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), topology: None }
    }
}

#[cfg(test)]
#[path = "topology_tests.rs"]
mod tests;
