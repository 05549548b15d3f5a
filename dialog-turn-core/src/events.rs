use crate::script::Transition;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Turn trace: what the engine did while processing one event, in order.
/// Node references use labels (or `#<id>` for unlabelled nodes).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    NodeMatched {
        node: String,
    },
    /// A sibling scan found nothing.
    NoMatch {
        scope: String,
    },
    FrameSuspended {
        node: String,
        kind: crate::session::FrameKind,
    },
    FramePopped {
        node: String,
    },
    DigressionStarted {
        from: String,
        to: String,
    },
    DigressionFailed {
        from: String,
    },
    /// Resumed a paused frame after a digression completed.
    DigressionReturned {
        node: String,
        replayed: bool,
    },
    /// A `never_return` frame was discarded instead of resumed.
    DigressionDiscarded {
        node: String,
    },
    SlotFilled {
        node: String,
        slot: String,
        previous: Value,
        current: Value,
    },
    SlotCleared {
        node: String,
        slot: String,
    },
    SlotPrompted {
        node: String,
        slot: String,
    },
    HandlerMatched {
        node: String,
        index: usize,
    },
    SlotsResolved {
        node: String,
    },
    Jumped {
        from: String,
        to: String,
        transition: Transition,
    },
    /// Every frame was dropped and slots cleared.
    ConversationReset {
        reason: ResetReason,
    },
    /// The topic completed with nothing paused beneath it.
    TopicCompleted,
    StaleFrameDropped {
        node_label: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetReason {
    /// An `end` directive.
    End,
    /// `jump_to(condition)` found no matching sibling.
    JumpExhausted,
}
