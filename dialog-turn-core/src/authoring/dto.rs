use crate::script::{Expr, Template};
use crate::tree::{HandlerSpec, NodeSettings, SlotSpec};
use serde::{Deserialize, Serialize};

// ── Top-level DTO ──

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DialogTreeDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<TreeMeta>,
    pub nodes: Vec<NodeEntryDto>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtrees: Vec<SubtreeDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeMeta {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

// ── Node list entries ──

/// An entry in a node list: either a node or an include of a named subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeEntryDto {
    Include(SubtreeRefDto),
    Node(Box<NodeDto>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubtreeRefDto {
    pub subtree: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub condition: Expr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Template>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub followup: Vec<NodeEntryDto>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slot_filling: Vec<SlotSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slot_handlers: Vec<HandlerSpec>,
    #[serde(default)]
    pub settings: NodeSettings,
}

// ── Subtrees ──

/// A reusable node list, inlined wherever it is included.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubtreeDto {
    pub name: String,
    /// AND-ed onto the condition of every node at the subtree's top level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Expr>,
    pub nodes: Vec<NodeEntryDto>,
}

impl NodeDto {
    /// Minimal node, for building trees in code.
    pub fn new(condition: Expr, response: Option<Template>) -> Self {
        Self {
            label: None,
            condition,
            response,
            followup: Vec::new(),
            slot_filling: Vec::new(),
            slot_handlers: Vec::new(),
            settings: NodeSettings::default(),
        }
    }

    pub fn labelled(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn into_entry(self) -> NodeEntryDto {
        NodeEntryDto::Node(Box::new(self))
    }
}
