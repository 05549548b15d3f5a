use super::digression::ReturnMode;
use super::turn::{Frame, Turn};
use crate::error::TurnError;
use crate::evaluator::EvalFlags;
use crate::events::{ResetReason, TraceEvent};
use crate::script::Transition;
use crate::session::FrameKind;
use crate::tree::NodeId;

impl Turn<'_> {
    /// Transfer control to `label`. The target settles into the active topic
    /// frame. Fails once the turn exceeds the configured jump depth.
    pub(super) fn jump(
        &mut self,
        from: NodeId,
        label: &str,
        transition: Transition,
    ) -> Result<(), TurnError> {
        let tree = self.tree;
        self.jumps += 1;
        if self.jumps > self.config.max_jump_depth {
            return Err(TurnError::JumpLimitExceeded {
                limit: self.config.max_jump_depth,
                label: label.to_string(),
            });
        }
        let target = tree
            .by_label(label)
            .ok_or_else(|| TurnError::UnknownLabel(label.to_string()))?;
        self.record(TraceEvent::Jumped {
            from: tree.display_name(from),
            to: tree.display_name(target),
            transition,
        });

        match transition {
            Transition::Response => self.enter_node(target, EvalFlags::default()),
            Transition::Condition => {
                match self.first_match(tree.from_node(target), EvalFlags::default())? {
                    Some(id) => self.enter_node(id, EvalFlags::default()),
                    None => {
                        self.record(TraceEvent::NoMatch {
                            scope: format!("jump to {}", tree.display_name(target)),
                        });
                        self.reset(ResetReason::JumpExhausted);
                        Ok(())
                    }
                }
            }
            Transition::Listen => {
                self.suspend(Frame::new(target, FrameKind::JumpListen));
                Ok(())
            }
        }
    }

    /// Next event after `jump_to(listen)`: match from the target onwards.
    pub(super) fn continue_jump_listen(&mut self, target: NodeId) -> Result<(), TurnError> {
        let tree = self.tree;
        if let Some(id) = self.first_match(tree.from_node(target), EvalFlags::default())? {
            return self.enter_node(id, EvalFlags::default());
        }
        self.record(TraceEvent::NoMatch {
            scope: format!("listen at {}", tree.display_name(target)),
        });
        if tree.is_root(target) {
            // Listening at root level ends like an idle turn that matched nothing.
            return self.complete_topic(ReturnMode::Wait);
        }
        self.try_digress(target)?;
        Ok(())
    }
}
