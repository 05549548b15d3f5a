use super::turn::{Frame, Turn};
use crate::error::TurnError;
use crate::evaluator::{EvalFlags, Rendered};
use crate::events::TraceEvent;
use crate::session::FrameKind;
use crate::tree::NodeId;
use tracing::debug;

/// What to do with the frame a completed topic returns to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum ReturnMode {
    /// Re-issue the interrupted frame's prompt with `returning` set.
    Replay,
    /// Return silently; the next event goes to the interrupted frame.
    Wait,
}

impl Turn<'_> {
    /// Try the root list on behalf of a paused frame. Returns false when the
    /// stack is too deep or no root matches; the caller then keeps waiting.
    pub(super) fn try_digress(&mut self, from: NodeId) -> Result<bool, TurnError> {
        let tree = self.tree;
        if self.stack.len() >= self.config.max_digression_depth {
            debug!(
                depth = self.stack.len(),
                limit = self.config.max_digression_depth,
                "digression depth limit reached"
            );
            self.record(TraceEvent::DigressionFailed {
                from: tree.display_name(from),
            });
            return Ok(false);
        }
        let Some(target) = self.first_match(tree.roots(), EvalFlags::default())? else {
            self.record(TraceEvent::DigressionFailed {
                from: tree.display_name(from),
            });
            return Ok(false);
        };
        self.record(TraceEvent::DigressionStarted {
            from: tree.display_name(from),
            to: tree.display_name(target),
        });
        self.stack.push(Frame::new(target, FrameKind::Root));
        self.enter_node(target, EvalFlags::digressing())?;
        Ok(true)
    }

    /// After the active topic was popped: skip `never_return` frames and
    /// resume the first frame that allows returning.
    pub(super) fn unwind(&mut self, mode: ReturnMode) -> Result<(), TurnError> {
        let tree = self.tree;
        loop {
            let Some(top) = self.stack.last().cloned() else {
                self.clear_slots();
                self.record(TraceEvent::TopicCompleted);
                return Ok(());
            };
            if tree.node(top.node).never_returns() {
                self.stack.pop();
                self.record(TraceEvent::DigressionDiscarded {
                    node: tree.display_name(top.node),
                });
                continue;
            }
            return match mode {
                ReturnMode::Wait => {
                    self.record(TraceEvent::DigressionReturned {
                        node: tree.display_name(top.node),
                        replayed: false,
                    });
                    Ok(())
                }
                ReturnMode::Replay => self.resume_returning(top),
            };
        }
    }

    fn resume_returning(&mut self, frame: Frame) -> Result<(), TurnError> {
        let tree = self.tree;
        let replayed = matches!(frame.kind, FrameKind::Followup | FrameKind::SlotFilling);
        self.record(TraceEvent::DigressionReturned {
            node: tree.display_name(frame.node),
            replayed,
        });
        match frame.kind {
            FrameKind::Followup => {
                let rendered = match &tree.node(frame.node).response {
                    Some(template) => {
                        self.render(frame.node, template, EvalFlags::returning(), None)?
                    }
                    None => Rendered::default(),
                };
                let directive = self.emit(rendered);
                self.settle(frame.node, directive)
            }
            FrameKind::SlotFilling => self.resume_slot_filling(frame.node, frame.slot_in_focus),
            FrameKind::JumpListen | FrameKind::Root => Ok(()),
        }
    }
}
