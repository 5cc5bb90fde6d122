// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leader/follower role policy.
//!
//! Every master-capable actor carries a [`Role`]; mutating requests are
//! refused on a follower with `ErrCode::InnerCommunication` and the current
//! master address so callers can redirect. Role changes arrive as messages
//! from the process-wide leader-info watcher.

use fm_core::ErrCode;
use serde::{Deserialize, Serialize};

/// Identity of the elected master, as published by the leader elector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LeaderInfo {
    pub name: String,
    pub address: String,
}

/// Which business policy an actor currently runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Full logic.
    Master,
    /// Mutations refused; reads forwarded to the master.
    Slave { master: LeaderInfo },
}

impl Role {
    pub fn is_master(&self) -> bool {
        matches!(self, Role::Master)
    }

    /// Decide the role for this node given fresh leader info.
    pub fn from_leader(self_name: &str, leader: &LeaderInfo) -> Role {
        if leader.name == self_name {
            Role::Master
        } else {
            Role::Slave { master: leader.clone() }
        }
    }

    /// The refusal a follower sends for a mutating request.
    pub fn refusal(&self) -> (ErrCode, String) {
        match self {
            Role::Master => (ErrCode::None, String::new()),
            Role::Slave { master } => (
                ErrCode::InnerCommunication,
                format!("master changed to {}", master.address),
            ),
        }
    }
}
