// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The scheduler topology tree.
//!
//! Three levels: locals at level 0, domains at level 1 and above, one root.
//! Nodes live in an index-linked arena; a per-level name index mirrors the
//! arena for O(1) lookup. Only the global scheduler actor mutates the tree.
//!
//! Growth policy: leaves fill the first level-1 domain with capacity.
//! Domains fill upward through a `next_parent` cursor; when even the root is
//! full, the incoming domain is promoted to a new root one level higher and
//! adopts the previous root, growing tree height.

use fm_core::{NodeInfo, NodeState};
use fm_wire::SchedulerNode;
use indexmap::IndexMap;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

/// A tree must hold at least a domain level and a leaf level before any
/// leaf may be added.
const MIN_TREE_LEVELS: usize = 2;

/// Index of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIdx(usize);

/// Errors from tree mutation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("scheduler tree has fewer than {MIN_TREE_LEVELS} levels")]
    TooShallow,
    #[error("no domain with free capacity for {0}")]
    NoSlot(String),
    #[error("node {0} not found")]
    NotFound(String),
    #[error("node {0} is not broken, can't be replaced")]
    NotBroken(String),
    #[error("topology snapshot is broken: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone)]
struct Node {
    info: NodeInfo,
    level: usize,
    state: NodeState,
    parent: Option<NodeIdx>,
    children: IndexMap<String, NodeIdx>,
}

/// The scheduler topology tree. See the module docs for the growth policy.
#[derive(Debug)]
pub struct SchedTree {
    arena: Vec<Option<Node>>,
    free: Vec<usize>,
    /// name -> node index, per level. `levels.len()` is the tree height.
    levels: Vec<HashMap<String, NodeIdx>>,
    next_parent: Option<NodeIdx>,
    max_local_per_domain: usize,
    max_domain_per_domain: usize,
}

impl SchedTree {
    pub fn new(max_local_per_domain: usize, max_domain_per_domain: usize) -> Self {
        Self {
            arena: Vec::new(),
            free: Vec::new(),
            levels: Vec::new(),
            next_parent: None,
            max_local_per_domain,
            max_domain_per_domain,
        }
    }

    fn node(&self, idx: NodeIdx) -> &Node {
        match self.arena.get(idx.0).and_then(|slot| slot.as_ref()) {
            Some(node) => node,
            // Indices are only handed out by this tree and never outlive
            // their slot; a miss is a logic error caught in tests.
            None => unreachable!("dangling node index"),
        }
    }

    fn node_mut(&mut self, idx: NodeIdx) -> &mut Node {
        match self.arena.get_mut(idx.0).and_then(|slot| slot.as_mut()) {
            Some(node) => node,
            None => unreachable!("dangling node index"),
        }
    }

    pub fn info(&self, idx: NodeIdx) -> &NodeInfo {
        &self.node(idx).info
    }

    pub fn level(&self, idx: NodeIdx) -> usize {
        self.node(idx).level
    }

    pub fn state(&self, idx: NodeIdx) -> NodeState {
        self.node(idx).state
    }

    pub fn set_state(&mut self, idx: NodeIdx, state: NodeState) {
        self.node_mut(idx).state = state;
    }

    pub fn parent(&self, idx: NodeIdx) -> Option<NodeIdx> {
        self.node(idx).parent
    }

    /// Height of the tree (number of levels).
    pub fn height(&self) -> usize {
        self.levels.len()
    }

    /// The unique parentless node, present once the tree has two levels.
    pub fn root(&self) -> Option<NodeIdx> {
        if self.levels.len() < MIN_TREE_LEVELS {
            return None;
        }
        self.levels.last().and_then(|level| level.values().next().copied())
    }

    /// All (info, state) pairs at one level.
    pub fn nodes_at(&self, level: usize) -> Vec<(NodeInfo, NodeState)> {
        match self.levels.get(level) {
            Some(nodes) => nodes
                .values()
                .map(|idx| {
                    let n = self.node(*idx);
                    (n.info.clone(), n.state)
                })
                .collect(),
            None => Vec::new(),
        }
    }

    /// Names of every node in the tree.
    pub fn node_names(&self) -> std::collections::HashSet<String> {
        self.levels.iter().flat_map(|level| level.keys().cloned()).collect()
    }

    fn can_parent_non_leaf(&self, idx: NodeIdx) -> bool {
        let node = self.node(idx);
        node.level > 1 && node.children.len() < self.max_domain_per_domain
    }

    fn can_parent_leaf(&self, idx: NodeIdx) -> bool {
        let node = self.node(idx);
        node.level == 1 && node.children.len() < self.max_local_per_domain
    }

    fn insert(&mut self, info: NodeInfo, level: usize) -> NodeIdx {
        debug!(name = %info.name, address = %info.address, level, "add node");
        let node = Node {
            info,
            level,
            state: NodeState::Connected,
            parent: None,
            children: IndexMap::new(),
        };
        let idx = match self.free.pop() {
            Some(slot) => {
                self.arena[slot] = Some(node);
                NodeIdx(slot)
            }
            None => {
                self.arena.push(Some(node));
                NodeIdx(self.arena.len() - 1)
            }
        };
        if self.levels.len() < level + 1 {
            info!(height = level + 1, "resize tree height");
            self.levels.resize_with(level + 1, HashMap::new);
        }
        let name = self.node(idx).info.name.clone();
        self.levels[level].insert(name, idx);
        idx
    }

    fn link(&mut self, parent: NodeIdx, child: NodeIdx) {
        let name = self.node(child).info.name.clone();
        self.node_mut(parent).children.insert(name, child);
        self.node_mut(child).parent = Some(parent);
    }

    /// Add a local scheduler leaf. A duplicate name updates the address in
    /// place and returns the existing node.
    pub fn add_leaf(&mut self, info: NodeInfo) -> Result<NodeIdx, TreeError> {
        info!(name = %info.name, address = %info.address, "add leaf node");
        if self.levels.len() < MIN_TREE_LEVELS {
            warn!(name = %info.name, "tree level is less than {MIN_TREE_LEVELS}");
            return Err(TreeError::TooShallow);
        }
        if let Some(existing) = self.levels[0].get(&info.name).copied() {
            info!(name = %info.name, "leaf already in topology tree, update it");
            self.node_mut(existing).info = info;
            return Ok(existing);
        }
        let domain = self.levels[1]
            .values()
            .copied()
            .find(|idx| self.can_parent_leaf(*idx));
        let Some(domain) = domain else {
            info!(name = %info.name, "no domain node free to adopt local node");
            return Err(TreeError::NoSlot(info.name));
        };
        let leaf = self.insert(info, 0);
        self.link(domain, leaf);
        Ok(leaf)
    }

    /// Add a domain scheduler. A duplicate name at any non-leaf level
    /// returns the existing node untouched.
    pub fn add_non_leaf(&mut self, info: NodeInfo) -> Result<NodeIdx, TreeError> {
        info!(name = %info.name, address = %info.address, "add non-leaf node");
        for level in (1..self.levels.len()).rev() {
            if let Some(existing) = self.levels[level].get(&info.name).copied() {
                info!(name = %info.name, level, "node already in topology tree");
                return Ok(existing);
            }
        }
        // No cursor yet: this becomes the first level-1 domain.
        let Some(mut cursor) = self.next_parent else {
            let node = self.insert(info, 1);
            self.next_parent = Some(node);
            return Ok(node);
        };
        // Walk the cursor upward until a domain with capacity appears.
        while !self.can_parent_non_leaf(cursor) {
            match self.parent(cursor) {
                Some(up) => cursor = up,
                None => break,
            }
        }
        if self.can_parent_non_leaf(cursor) {
            let child_level = self.level(cursor) - 1;
            let node = self.insert(info, child_level);
            self.link(cursor, node);
            self.next_parent = Some(if self.can_parent_non_leaf(node) { node } else { cursor });
            return Ok(node);
        }
        // Even the root is full: promote the newcomer to a new root.
        let new_level = self.level(cursor) + 1;
        let node = self.insert(info, new_level);
        self.link(node, cursor);
        self.next_parent = Some(node);
        Ok(node)
    }

    /// Replace a broken non-leaf in place, keeping its children.
    pub fn replace_non_leaf(
        &mut self,
        replaced: &str,
        info: NodeInfo,
    ) -> Result<NodeIdx, TreeError> {
        if self.levels.len() < MIN_TREE_LEVELS {
            return Err(TreeError::TooShallow);
        }
        for level in (1..self.levels.len()).rev() {
            if let Some(idx) = self.levels[level].get(replaced).copied() {
                info!(name = replaced, level, "found node to replace");
                if self.state(idx) != NodeState::Broken {
                    warn!(name = replaced, "node is not broken, can't be replaced");
                    return Err(TreeError::NotBroken(replaced.to_string()));
                }
                info!(
                    old = %self.info(idx),
                    new = %info,
                    "replace broken node"
                );
                // The replacement keeps the old name's slot in the level map.
                self.levels[level].remove(replaced);
                self.levels[level].insert(info.name.clone(), idx);
                if let Some(parent) = self.parent(idx) {
                    self.node_mut(parent).children.shift_remove(replaced);
                    let name = info.name.clone();
                    self.node_mut(parent).children.insert(name, idx);
                }
                let node = self.node_mut(idx);
                node.info = info;
                node.state = NodeState::Connected;
                return Ok(idx);
            }
        }
        debug!(name = replaced, "didn't find node to replace");
        Err(TreeError::NotFound(replaced.to_string()))
    }

    /// Detach a leaf and return its former parent.
    pub fn remove_leaf(&mut self, name: &str) -> Result<NodeIdx, TreeError> {
        if self.levels.is_empty() {
            warn!("scheduler tree is empty");
            return Err(TreeError::NotFound(name.to_string()));
        }
        let Some(idx) = self.levels[0].get(name).copied() else {
            warn!(name, "didn't find leaf node");
            return Err(TreeError::NotFound(name.to_string()));
        };
        let Some(parent) = self.parent(idx) else {
            warn!(name, "didn't find parent for leaf node");
            return Err(TreeError::NotFound(name.to_string()));
        };
        self.node_mut(parent).children.shift_remove(name);
        self.levels[0].remove(name);
        self.arena[idx.0] = None;
        self.free.push(idx.0);
        Ok(parent)
    }

    pub fn find_leaf(&self, name: &str) -> Option<NodeIdx> {
        self.levels.first().and_then(|level| level.get(name)).copied()
    }

    pub fn find_non_leaf(&self, name: &str) -> Option<NodeIdx> {
        (1..self.levels.len())
            .rev()
            .find_map(|level| self.levels[level].get(name))
            .copied()
    }

    /// Name of any broken non-leaf, highest level first.
    pub fn broken_non_leaf(&self) -> Option<String> {
        (1..self.levels.len()).rev().find_map(|level| {
            self.levels[level]
                .values()
                .find(|idx| self.node(**idx).state == NodeState::Broken)
                .map(|idx| self.info(*idx).name.clone())
        })
    }

    /// First level-1 domain that can still adopt a leaf.
    pub fn domain_with_leaf_capacity(&self) -> Option<NodeIdx> {
        self.levels
            .get(1)?
            .values()
            .copied()
            .find(|idx| self.can_parent_leaf(*idx))
    }

    /// Topology view for one node: its parent domain as leader, the
    /// parent's children as members.
    pub fn topology_view(&self, idx: NodeIdx) -> Option<fm_wire::ScheduleTopology> {
        self.parent(idx).map(|parent| self.domain_view(parent))
    }

    /// Topology view from a domain's perspective: itself as leader, its
    /// children as members.
    pub fn domain_view(&self, domain: NodeIdx) -> fm_wire::ScheduleTopology {
        let members = self
            .node(domain)
            .children
            .values()
            .map(|c| self.node(*c).info.clone())
            .collect();
        fm_wire::ScheduleTopology { leader: self.info(domain).clone(), members }
    }

    /// Depth-first snapshot of the whole tree. Empty when no root exists.
    pub fn serialize(&self) -> Vec<u8> {
        let Some(root) = self.root() else {
            return Vec::new();
        };
        let snapshot = self.to_snapshot(root);
        serde_json::to_vec(&snapshot).unwrap_or_default()
    }

    fn to_snapshot(&self, idx: NodeIdx) -> SchedulerNode {
        let node = self.node(idx);
        SchedulerNode {
            name: node.info.name.clone(),
            address: node.info.address.clone(),
            level: node.level as u32,
            children: node.children.values().map(|c| self.to_snapshot(*c)).collect(),
        }
    }

    /// Rebuild the tree from a snapshot, replacing all current state.
    pub fn recover(&mut self, bytes: &[u8]) -> Result<(), TreeError> {
        let root: SchedulerNode =
            serde_json::from_slice(bytes).map_err(|e| TreeError::Corrupt(e.to_string()))?;
        info!(name = %root.name, address = %root.address, level = root.level, "recover root node");
        self.arena.clear();
        self.free.clear();
        self.levels.clear();
        self.next_parent = None;
        let root_level = root.level as usize;
        let root_idx = self.insert(NodeInfo::new(&root.name, &root.address), root_level);
        self.recover_children(root_idx, &root);
        // Resume domain growth below the recovered root.
        self.next_parent = Some(root_idx);
        Ok(())
    }

    fn recover_children(&mut self, parent: NodeIdx, proto: &SchedulerNode) {
        let parent_level = self.level(parent);
        for child in &proto.children {
            let level = child.level as usize;
            if level + 1 != parent_level {
                warn!(
                    name = %child.name,
                    level,
                    parent_level,
                    "skip child with inconsistent level"
                );
                continue;
            }
            let idx = self.insert(NodeInfo::new(&child.name, &child.address), level);
            self.link(parent, idx);
            self.recover_children(idx, child);
        }
    }
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tests;
