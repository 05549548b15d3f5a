use super::digression::ReturnMode;
use crate::config::EngineConfig;
use crate::error::{EvalError, TurnError};
use crate::evaluator::{EvalContext, EvalFlags, Evaluator, Rendered, SlotScope, VarUpdate};
use crate::events::{ResetReason, TraceEvent};
use crate::script::{Directive, Expr, Template};
use crate::session::{BranchFrame, FrameKind, SessionState};
use crate::tree::{DialogTree, NodeId};
use crate::types::{Command, DialogEvent};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// A stack frame during a turn. Persisted as a [`BranchFrame`] by label.
#[derive(Clone, Debug, PartialEq)]
pub(super) struct Frame {
    pub node: NodeId,
    pub kind: FrameKind,
    pub slot_in_focus: Option<String>,
}

impl Frame {
    pub fn new(node: NodeId, kind: FrameKind) -> Self {
        Self {
            node,
            kind,
            slot_in_focus: None,
        }
    }
}

/// Result of processing one event.
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    /// State to persist.
    pub state: SessionState,
    /// Commands in emission order.
    pub commands: Vec<Command>,
    pub trace: Vec<TraceEvent>,
}

/// Pure, synchronous turn computation: `(event, state) → (state', commands)`.
pub struct TurnProcessor<'a> {
    tree: &'a DialogTree,
    evaluator: &'a dyn Evaluator,
    config: &'a EngineConfig,
}

impl<'a> TurnProcessor<'a> {
    pub fn new(
        tree: &'a DialogTree,
        evaluator: &'a dyn Evaluator,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            tree,
            evaluator,
            config,
        }
    }

    pub fn process(
        &self,
        event: &DialogEvent,
        state: SessionState,
    ) -> Result<TurnOutcome, TurnError> {
        let mut trace = Vec::new();
        let stack = restore_stack(self.tree, &state.branch_stack, &mut trace);
        let mut turn = Turn {
            tree: self.tree,
            evaluator: self.evaluator,
            config: self.config,
            event,
            stack,
            slots: state.slots,
            user: state.user,
            commands: Vec::new(),
            trace,
            jumps: 0,
        };
        turn.run()?;
        turn.into_outcome()
    }
}

/// Resolve persisted frames against the current tree. Frames whose label is
/// gone, or whose node no longer has what the frame waits for, are dropped.
fn restore_stack(
    tree: &DialogTree,
    frames: &[BranchFrame],
    trace: &mut Vec<TraceEvent>,
) -> Vec<Frame> {
    let mut stack = Vec::with_capacity(frames.len());
    for frame in frames {
        let fits = tree.by_label(&frame.node_label).filter(|&id| {
            let node = tree.node(id);
            match frame.kind {
                FrameKind::Followup => node.has_followup(),
                FrameKind::SlotFilling => node.has_slots(),
                FrameKind::JumpListen | FrameKind::Root => true,
            }
        });
        let Some(id) = fits else {
            warn!(label = %frame.node_label, kind = ?frame.kind, "dropping stale branch frame");
            trace.push(TraceEvent::StaleFrameDropped {
                node_label: frame.node_label.clone(),
            });
            continue;
        };
        let slot_in_focus = frame
            .resume_point
            .clone()
            .filter(|slot| tree.node(id).slot_index(slot).is_some());
        stack.push(Frame {
            node: id,
            kind: frame.kind,
            slot_in_focus,
        });
    }
    stack
}

/// Mutable state of one turn in progress.
pub(super) struct Turn<'a> {
    pub tree: &'a DialogTree,
    pub evaluator: &'a dyn Evaluator,
    pub config: &'a EngineConfig,
    pub event: &'a DialogEvent,
    /// Outermost first; the last frame is the active topic.
    pub stack: Vec<Frame>,
    pub slots: BTreeMap<String, Value>,
    pub user: BTreeMap<String, Value>,
    pub commands: Vec<Command>,
    pub trace: Vec<TraceEvent>,
    pub jumps: usize,
}

impl<'a> Turn<'a> {
    fn run(&mut self) -> Result<(), TurnError> {
        while let Some(top) = self.stack.last().cloned() {
            match top.kind {
                FrameKind::Followup => return self.continue_followup(top.node),
                FrameKind::SlotFilling => {
                    return self.continue_slot_filling(top.node, top.slot_in_focus)
                }
                FrameKind::JumpListen => return self.continue_jump_listen(top.node),
                FrameKind::Root => {
                    warn!(
                        node = %self.tree.display_name(top.node),
                        "root frame left over from a previous turn; discarding"
                    );
                    self.stack.pop();
                }
            }
        }
        self.start_from_root()
    }

    /// Fresh turn: match the root list. No match is not an error.
    fn start_from_root(&mut self) -> Result<(), TurnError> {
        let tree = self.tree;
        match self.first_match(tree.roots(), EvalFlags::default())? {
            Some(id) => {
                self.stack.push(Frame::new(id, FrameKind::Root));
                self.enter_node(id, EvalFlags::default())
            }
            None => {
                self.record(TraceEvent::NoMatch {
                    scope: "root".to_string(),
                });
                self.clear_slots();
                Ok(())
            }
        }
    }

    /// Process a node that was matched or jumped to. The active topic frame
    /// (top of the stack) is the slot this node settles into.
    pub fn enter_node(&mut self, id: NodeId, flags: EvalFlags) -> Result<(), TurnError> {
        let tree = self.tree;
        self.record(TraceEvent::NodeMatched {
            node: tree.display_name(id),
        });
        if tree.node(id).has_slots() {
            self.begin_slot_filling(id, flags)
        } else {
            self.respond(id, flags)
        }
    }

    /// Render the node-level response and act on its directive.
    pub fn respond(&mut self, id: NodeId, flags: EvalFlags) -> Result<(), TurnError> {
        let tree = self.tree;
        let rendered = match &tree.node(id).response {
            Some(template) => self.render(id, template, flags, None)?,
            None => Rendered::default(),
        };
        let directive = self.emit(rendered);
        self.settle(id, directive)
    }

    /// Decide what happens after a node's response ran.
    pub fn settle(&mut self, id: NodeId, directive: Option<Directive>) -> Result<(), TurnError> {
        let tree = self.tree;
        let has_followup = tree.node(id).has_followup();
        match directive {
            Some(Directive::End) => {
                self.reset(ResetReason::End);
                Ok(())
            }
            Some(Directive::JumpTo { node, transition }) => self.jump(id, &node, transition),
            Some(Directive::Followup) if has_followup => {
                self.suspend(Frame::new(id, FrameKind::Followup));
                self.followup_now(id)
            }
            _ if has_followup => {
                self.suspend(Frame::new(id, FrameKind::Followup));
                Ok(())
            }
            Some(Directive::Listen) => self.complete_topic(ReturnMode::Wait),
            Some(other) => {
                if other.is_slot_directive() {
                    warn!(
                        node = %tree.display_name(id),
                        directive = ?other,
                        "slot directive outside slot filling ignored"
                    );
                }
                self.complete_topic(ReturnMode::Replay)
            }
            None => self.complete_topic(ReturnMode::Replay),
        }
    }

    // ─── Stack bookkeeping ────────────────────────────────────

    /// Replace the active topic frame with a paused one.
    pub fn suspend(&mut self, frame: Frame) {
        self.record(TraceEvent::FrameSuspended {
            node: self.tree.display_name(frame.node),
            kind: frame.kind,
        });
        match self.stack.last_mut() {
            Some(top) => *top = frame,
            None => self.stack.push(frame),
        }
    }

    /// The active topic finished; pop it and return to whatever it interrupted.
    pub fn complete_topic(&mut self, mode: ReturnMode) -> Result<(), TurnError> {
        if let Some(frame) = self.stack.pop() {
            self.record(TraceEvent::FramePopped {
                node: self.tree.display_name(frame.node),
            });
        }
        self.unwind(mode)
    }

    /// Drop every frame and the slots.
    pub fn reset(&mut self, reason: ResetReason) {
        self.stack.clear();
        self.slots.clear();
        self.record(TraceEvent::ConversationReset { reason });
    }

    pub fn clear_slots(&mut self) {
        if !self.slots.is_empty() {
            debug!(count = self.slots.len(), "clearing slots");
            self.slots.clear();
        }
    }

    pub fn record(&mut self, event: TraceEvent) {
        debug!(?event, "turn");
        self.trace.push(event);
    }

    // ─── Evaluation helpers ───────────────────────────────────

    pub fn ctx(&self, flags: EvalFlags, slot: Option<SlotScope>) -> EvalContext<'_> {
        EvalContext {
            event: self.event,
            slots: &self.slots,
            user: &self.user,
            flags,
            slot,
        }
    }

    pub fn eval_error(&self, node: NodeId, source: EvalError) -> TurnError {
        TurnError::Evaluation {
            node: self.tree.display_name(node),
            source,
        }
    }

    pub fn check(
        &self,
        node: NodeId,
        expr: &Expr,
        flags: EvalFlags,
        slot: Option<SlotScope>,
    ) -> Result<bool, TurnError> {
        self.evaluator
            .evaluate_condition(expr, &self.ctx(flags, slot))
            .map_err(|e| self.eval_error(node, e))
    }

    pub fn render(
        &self,
        node: NodeId,
        template: &Template,
        flags: EvalFlags,
        slot: Option<SlotScope>,
    ) -> Result<Rendered, TurnError> {
        self.evaluator
            .render(template, &self.ctx(flags, slot))
            .map_err(|e| self.eval_error(node, e))
    }

    /// Append commands, apply variable updates, hand back the directive.
    pub fn emit(&mut self, rendered: Rendered) -> Option<Directive> {
        self.commands.extend(rendered.commands);
        self.apply_updates(rendered.updates);
        rendered.directive
    }

    pub fn apply_updates(&mut self, updates: Vec<VarUpdate>) {
        for update in updates {
            match update {
                VarUpdate::SetSlot(name, value) => {
                    self.slots.insert(name, value);
                }
                VarUpdate::SetUser(name, value) => {
                    self.user.insert(name, value);
                }
                VarUpdate::DeleteSlot(name) => {
                    self.slots.remove(&name);
                }
                VarUpdate::DeleteUser(name) => {
                    self.user.remove(&name);
                }
            }
        }
    }

    fn into_outcome(self) -> Result<TurnOutcome, TurnError> {
        let tree = self.tree;
        let branch_stack = self
            .stack
            .iter()
            .map(|frame| {
                let label = tree
                    .node(frame.node)
                    .label
                    .clone()
                    .ok_or_else(|| TurnError::UnlabeledSuspend(tree.display_name(frame.node)))?;
                Ok(BranchFrame {
                    node_label: label,
                    kind: frame.kind,
                    resume_point: frame.slot_in_focus.clone(),
                })
            })
            .collect::<Result<Vec<_>, TurnError>>()?;
        Ok(TurnOutcome {
            state: SessionState {
                branch_stack,
                slots: self.slots,
                user: self.user,
            },
            commands: self.commands,
            trace: self.trace,
        })
    }
}
