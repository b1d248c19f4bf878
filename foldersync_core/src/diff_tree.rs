//! Arena-backed result trees of a diff and the tri-state selection model.
//!
//! A [`DiffTree`] mirrors the directory hierarchy truncated to entries that
//! need an action. Node 0 is the synchronization root. Every node carries a
//! [`SelectionState`]; toggling a node forces its whole subtree to the new
//! state and re-derives the state of its ancestors, so that a directory is
//! `Checked` iff all its children are, `Unchecked` iff none are, and
//! `Indeterminate` otherwise.

use foldersync_common::{NodeKind, SelectionState};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Index of a node inside its [`DiffTree`]
pub type NodeId = usize;

/// One path of a copy or delete tree
#[derive(Debug, Clone, Serialize)]
pub struct DiffNode {
    pub path: PathBuf,
    pub name: String,
    pub kind: NodeKind,
    pub is_conflict: bool,
    pub is_link: bool,
    pub state: SelectionState,
    #[serde(skip)]
    parent: Option<NodeId>,
    #[serde(skip)]
    children: Vec<NodeId>,
}

impl DiffNode {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_whole(&self) -> bool {
        self.kind == NodeKind::Whole
    }
}

/// Description of a node to insert
#[derive(Debug, Clone)]
pub struct NewNode {
    pub path: PathBuf,
    pub name: String,
    pub kind: NodeKind,
    pub is_conflict: bool,
    pub is_link: bool,
}

impl NewNode {
    pub fn whole(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            kind: NodeKind::Whole,
            is_conflict: false,
            is_link: false,
        }
    }

    pub fn partial(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Partial,
            ..Self::whole(path, name)
        }
    }

    pub fn conflict(mut self) -> Self {
        self.is_conflict = true;
        self
    }

    pub fn link(mut self) -> Self {
        self.is_link = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiffTree {
    nodes: Vec<DiffNode>,
    by_path: HashMap<PathBuf, NodeId>,
}

impl DiffTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn root(&self) -> Option<NodeId> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(0)
        }
    }

    /// Panics if `id` does not belong to this tree
    pub fn node(&self, id: NodeId) -> &DiffNode {
        &self.nodes[id]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn state(&self, id: NodeId) -> SelectionState {
        self.nodes[id].state
    }

    pub fn find(&self, path: &Path) -> Option<NodeId> {
        self.by_path.get(path).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &DiffNode)> {
        self.nodes.iter().enumerate()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.by_path.clear();
    }

    /// Insert a node under `parent`; `None` inserts the root, which starts `Checked`.
    ///
    /// A new node inherits `Checked` from a checked parent and is
    /// `Unchecked` otherwise.
    pub fn insert(&mut self, parent: Option<NodeId>, node: NewNode) -> NodeId {
        let state = match parent {
            None => {
                debug_assert!(self.nodes.is_empty(), "root inserted twice");
                SelectionState::Checked
            }
            Some(p) if self.nodes[p].state == SelectionState::Checked => SelectionState::Checked,
            Some(_) => SelectionState::Unchecked,
        };

        let id = self.nodes.len();
        self.by_path.insert(node.path.clone(), id);
        self.nodes.push(DiffNode {
            path: node.path,
            name: node.name,
            kind: node.kind,
            is_conflict: node.is_conflict,
            is_link: node.is_link,
            state,
            parent,
            children: Vec::new(),
        });
        if let Some(p) = parent {
            self.nodes[p].children.push(id);
        }
        id
    }

    /// Drop `id` together with everything inserted after it.
    ///
    /// Nodes are appended depth-first, so this removes exactly the subtree
    /// of the most recently opened directory.
    pub fn discard(&mut self, id: NodeId) {
        if id >= self.nodes.len() {
            return;
        }
        if let Some(p) = self.nodes[id].parent {
            self.nodes[p].children.retain(|&c| c != id);
        }
        for node in self.nodes.drain(id..) {
            self.by_path.remove(&node.path);
        }
    }

    /// Paths of every node flagged as a kind conflict
    pub fn conflict_paths(&self) -> Vec<PathBuf> {
        self.nodes
            .iter()
            .filter(|n| n.is_conflict)
            .map(|n| n.path.clone())
            .collect()
    }

    /// Flip the selection of `id` and propagate it through the tree
    pub fn toggle(&mut self, id: NodeId) {
        match self.nodes[id].state {
            SelectionState::Unchecked | SelectionState::Indeterminate => self.select(id, true),
            SelectionState::Checked => self.select(id, false),
        }
    }

    /// Force `id` and its subtree to `checked`, then re-derive ancestors
    pub fn select(&mut self, id: NodeId, checked: bool) {
        let target = if checked {
            SelectionState::Checked
        } else {
            SelectionState::Unchecked
        };

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            self.nodes[current].state = target;
            stack.extend(self.nodes[current].children.iter().copied());
        }

        let mut child = id;
        while let Some(parent) = self.nodes[child].parent {
            let uniform = self.nodes[parent]
                .children
                .iter()
                .all(|&c| self.nodes[c].state == target);
            if !uniform {
                self.mark_ancestors_indeterminate(parent);
                return;
            }
            self.nodes[parent].state = target;
            child = parent;
        }
    }

    fn mark_ancestors_indeterminate(&mut self, from: NodeId) {
        let mut current = Some(from);
        while let Some(id) = current {
            self.nodes[id].state = SelectionState::Indeterminate;
            current = self.nodes[id].parent;
        }
    }

    /// Selected paths in depth-first order.
    ///
    /// A checked whole node contributes its own path and hides its subtree;
    /// any other checked or indeterminate node is descended into.
    pub fn flatten(&self) -> Vec<PathBuf> {
        let mut selected = Vec::new();
        let Some(root) = self.root() else {
            return selected;
        };

        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            match node.state {
                SelectionState::Checked if node.is_whole() => selected.push(node.path.clone()),
                SelectionState::Checked | SelectionState::Indeterminate => {
                    stack.extend(node.children.iter().rev().copied());
                }
                SelectionState::Unchecked => {}
            }
        }
        selected
    }
}
