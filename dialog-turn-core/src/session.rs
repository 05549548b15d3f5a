//! Persisted per-(channel, user) conversation state.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Identity of a conversation: one user on one channel.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub channel: String,
    pub user_id: String,
}

impl SessionKey {
    pub fn new(channel: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel, self.user_id)
    }
}

/// What a paused frame is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// A root-level topic being processed, including a digression. Only
    /// exists while a turn runs; every turn ends by converting or popping it.
    Root,
    /// Waiting for an event matching one of the node's followups.
    Followup,
    /// Gathering the node's slots.
    SlotFilling,
    /// Waiting for the next event to match from the node onwards.
    JumpListen,
}

/// One paused position in the tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchFrame {
    pub node_label: String,
    pub kind: FrameKind,
    /// Slot in focus (most recently prompted) for `SlotFilling` frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_point: Option<String>,
}

/// Everything the engine persists between turns.
///
/// `branch_stack` is ordered outermost first; the last frame is the one the
/// next event is matched against.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub branch_stack: Vec<BranchFrame>,
    /// Cleared whenever a topic completes with nothing left to resume.
    #[serde(default)]
    pub slots: BTreeMap<String, Value>,
    /// Kept until a script deletes a key.
    #[serde(default)]
    pub user: BTreeMap<String, Value>,
}

impl SessionState {
    /// No paused branch: the next event is matched against the root nodes.
    pub fn is_idle(&self) -> bool {
        self.branch_stack.is_empty()
    }

    pub fn top(&self) -> Option<&BranchFrame> {
        self.branch_stack.last()
    }

    /// Paused branches interrupted by a digression that is still open.
    pub fn digression_depth(&self) -> usize {
        self.branch_stack.len().saturating_sub(1)
    }
}
