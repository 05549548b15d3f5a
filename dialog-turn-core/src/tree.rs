//! Compiled, read-only dialog tree.
//!
//! Nodes live in one arena addressed by [`NodeId`]; followups, roots and the
//! label table all hold indices into it, so jump targets and inlined
//! subtrees are plain lookups.

use crate::script::{Expr, Template};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type NodeId = usize;

// ─── Node parts (shared with the authoring DTOs) ──────────────

/// One named value gathered by a slot-filling node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlotSpec {
    pub name: String,
    pub check_for: Expr,
    /// Value stored in the slot; defaults to what `check_for` captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Expr>,
    /// Enablement guard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Expr>,
    /// Slots without a prompt are optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Template>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<Template>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_found: Option<Template>,
}

impl SlotSpec {
    pub fn is_required(&self) -> bool {
        self.prompt.is_some()
    }
}

/// Node-level handler tried when no slot was filled by an event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerSpec {
    pub condition: Expr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Template>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AfterDigression {
    #[default]
    AllowReturn,
    NeverReturn,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSettings {
    #[serde(default)]
    pub after_digression_followup: AfterDigression,
}

// ─── Arena ────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct DialogNode {
    pub id: NodeId,
    pub label: Option<String>,
    pub condition: Expr,
    pub response: Option<Template>,
    pub followup: Vec<NodeId>,
    pub slot_filling: Vec<SlotSpec>,
    pub slot_handlers: Vec<HandlerSpec>,
    pub settings: NodeSettings,
    /// `None` for root nodes.
    pub parent: Option<NodeId>,
    /// Index within the sibling list.
    pub position: usize,
}

impl DialogNode {
    pub fn has_followup(&self) -> bool {
        !self.followup.is_empty()
    }

    pub fn has_slots(&self) -> bool {
        !self.slot_filling.is_empty()
    }

    pub fn never_returns(&self) -> bool {
        self.settings.after_digression_followup == AfterDigression::NeverReturn
    }

    pub fn slot_index(&self, name: &str) -> Option<usize> {
        self.slot_filling.iter().position(|s| s.name == name)
    }
}

/// The compiled tree.
#[derive(Clone, Debug)]
pub struct DialogTree {
    nodes: Vec<DialogNode>,
    roots: Vec<NodeId>,
    labels: HashMap<String, NodeId>,
    /// Hex SHA-256 of the source document.
    version: String,
}

impl DialogTree {
    pub(crate) fn from_parts(
        nodes: Vec<DialogNode>,
        roots: Vec<NodeId>,
        version: String,
    ) -> Self {
        let labels = nodes
            .iter()
            .filter_map(|n| n.label.clone().map(|l| (l, n.id)))
            .collect();
        Self {
            nodes,
            roots,
            labels,
            version,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Panics on an id that did not come from this tree.
    pub fn node(&self, id: NodeId) -> &DialogNode {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &DialogNode> {
        self.nodes.iter()
    }

    pub fn by_label(&self, label: &str) -> Option<NodeId> {
        self.labels.get(label).copied()
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        self.nodes[id].parent.is_none()
    }

    /// The list `id` belongs to: the roots, or its parent's followups.
    pub fn siblings(&self, id: NodeId) -> &[NodeId] {
        match self.nodes[id].parent {
            Some(parent) => &self.nodes[parent].followup,
            None => &self.roots,
        }
    }

    /// `id` followed by every later sibling, in declaration order.
    pub fn from_node(&self, id: NodeId) -> &[NodeId] {
        &self.siblings(id)[self.nodes[id].position..]
    }

    /// Label, or `#<id>` for unlabelled nodes. For logs and traces.
    pub fn display_name(&self, id: NodeId) -> String {
        match &self.nodes[id].label {
            Some(label) => label.clone(),
            None => format!("#{id}"),
        }
    }
}
