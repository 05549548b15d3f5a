//! Slot filling: capture, found/not_found handlers, prompting and resolution.

use super::turn::{Frame, Turn};
use crate::error::TurnError;
use crate::evaluator::{Capture, EntityRef, EvalFlags, SlotScope};
use crate::events::{ResetReason, TraceEvent};
use crate::script::{Directive, Transition};
use crate::session::FrameKind;
use crate::tree::{NodeId, SlotSpec};
use serde_json::Value;
use tracing::debug;

/// What slot filling does next.
#[derive(Clone, Debug, PartialEq)]
enum SlotStep {
    /// Prompt the next unfilled required slot, or resolve.
    Continue,
    /// Prompt this slot again.
    Reprompt(usize),
    /// Emit nothing more; wait for the next event.
    Wait,
    /// Skip remaining slots and run the node response.
    Respond,
    End,
    Jump {
        label: String,
        transition: Transition,
    },
}

fn slot_step(directive: Directive, reprompt: Option<usize>) -> SlotStep {
    match directive {
        Directive::MoveOn | Directive::Followup => SlotStep::Continue,
        Directive::PromptAgain => reprompt.map_or(SlotStep::Continue, SlotStep::Reprompt),
        Directive::ListenAgain | Directive::Listen => SlotStep::Wait,
        Directive::Response => SlotStep::Respond,
        Directive::End => SlotStep::End,
        Directive::JumpTo { node, transition } => SlotStep::Jump {
            label: node,
            transition,
        },
    }
}

struct FilledSlot {
    index: usize,
    previous: Value,
    current: Value,
}

impl Turn<'_> {
    /// First entry into a node with slots. Only capture and `found` run;
    /// handlers and `not_found` wait for a later event.
    pub(super) fn begin_slot_filling(
        &mut self,
        id: NodeId,
        flags: EvalFlags,
    ) -> Result<(), TurnError> {
        self.suspend(Frame::new(id, FrameKind::SlotFilling));
        let filled = self.capture_slots(id, None)?;
        let step = self.announce_found(id, &filled, None)?;
        self.apply_slot_step(id, step, flags)
    }

    pub(super) fn continue_slot_filling(
        &mut self,
        id: NodeId,
        focus: Option<String>,
    ) -> Result<(), TurnError> {
        let focus = focus.and_then(|name| self.tree.node(id).slot_index(&name));
        let filled = self.capture_slots(id, focus)?;
        let step = if !filled.is_empty() {
            self.announce_found(id, &filled, focus)?
        } else if let Some(step) = self.run_handlers(id, focus)? {
            step
        } else if self.try_digress(id)? {
            return Ok(());
        } else {
            self.not_found(id, focus)?
        };
        self.apply_slot_step(id, step, EvalFlags::default())
    }

    /// Back from a digression: re-ask the slot in focus, or move on if it
    /// was filled in the meantime.
    pub(super) fn resume_slot_filling(
        &mut self,
        id: NodeId,
        focus: Option<String>,
    ) -> Result<(), TurnError> {
        let focus = focus.and_then(|name| self.tree.node(id).slot_index(&name));
        if let Some(index) = focus {
            if self.slot_pending(id, index)? {
                return self.prompt_slot(id, index, EvalFlags::returning());
            }
        }
        self.prompt_next(id, EvalFlags::returning())
    }

    fn apply_slot_step(
        &mut self,
        id: NodeId,
        step: SlotStep,
        flags: EvalFlags,
    ) -> Result<(), TurnError> {
        match step {
            SlotStep::Continue => self.prompt_next(id, flags),
            SlotStep::Reprompt(index) => self.prompt_slot(id, index, flags),
            SlotStep::Wait => Ok(()),
            SlotStep::Respond => self.resolve_slots(id),
            SlotStep::End => {
                self.reset(ResetReason::End);
                Ok(())
            }
            SlotStep::Jump { label, transition } => self.jump(id, &label, transition),
        }
    }

    // ─── Capture ──────────────────────────────────────────────

    /// Run every enabled slot's `check_for` (and `value`) against the event,
    /// then assign. Unfilled slots claim entities first, in declaration order;
    /// filled slots may then be re-supplied from what is left. An occurrence
    /// read by one slot is invisible to the others.
    fn capture_slots(
        &mut self,
        id: NodeId,
        focus: Option<usize>,
    ) -> Result<Vec<FilledSlot>, TurnError> {
        let tree = self.tree;
        let node = tree.node(id);
        let mut taken: Vec<EntityRef> = Vec::new();
        let mut captured: Vec<(usize, Capture)> = Vec::new();

        for refill in [false, true] {
            for (index, slot) in node.slot_filling.iter().enumerate() {
                if self.is_filled(&slot.name) != refill || !self.slot_enabled(id, slot)? {
                    continue;
                }
                let scope = self.slot_scope(slot, focus == Some(index));
                let Some(capture) = self.capture_slot(id, slot, scope, &taken)? else {
                    continue;
                };
                if capture.conflicts_with(&taken) {
                    continue;
                }
                taken.extend(capture.sources.iter().cloned());
                captured.push((index, capture));
            }
        }
        captured.sort_by_key(|(index, _)| *index);

        let mut filled = Vec::with_capacity(captured.len());
        for (index, capture) in captured {
            let slot = &node.slot_filling[index];
            let previous = self.slots.get(&slot.name).cloned().unwrap_or(Value::Null);
            let current = capture.value;
            self.slots.insert(slot.name.clone(), current.clone());
            self.record(TraceEvent::SlotFilled {
                node: tree.display_name(id),
                slot: slot.name.clone(),
                previous: previous.clone(),
                current: current.clone(),
            });
            filled.push(FilledSlot {
                index,
                previous,
                current,
            });
        }
        Ok(filled)
    }

    /// `check_for`, then `value` with `current_value` bound to the check's
    /// result. A `value` that reads nothing leaves the slot uncaptured.
    fn capture_slot(
        &self,
        id: NodeId,
        slot: &SlotSpec,
        scope: SlotScope,
        taken: &[EntityRef],
    ) -> Result<Option<Capture>, TurnError> {
        let ctx = self.ctx(EvalFlags::default(), Some(scope.clone()));
        let Some(mut capture) = self
            .evaluator
            .capture(&slot.check_for, &ctx, taken)
            .map_err(|e| self.eval_error(id, e))?
        else {
            return Ok(None);
        };
        let Some(expr) = &slot.value else {
            return Ok(Some(capture));
        };
        let scope = SlotScope {
            current_value: capture.value.clone(),
            ..scope
        };
        let value = self
            .evaluator
            .evaluate_tracked(expr, &self.ctx(EvalFlags::default(), Some(scope)), taken)
            .map_err(|e| self.eval_error(id, e))?;
        if value.value.is_null() {
            return Ok(None);
        }
        capture.value = value.value;
        capture.sources.extend(value.sources);
        Ok(Some(capture))
    }

    /// Run `found` for each newly filled slot. The first directive that
    /// changes the flow stops the rest.
    fn announce_found(
        &mut self,
        id: NodeId,
        filled: &[FilledSlot],
        focus: Option<usize>,
    ) -> Result<SlotStep, TurnError> {
        let tree = self.tree;
        let node = tree.node(id);
        for entry in filled {
            let slot = &node.slot_filling[entry.index];
            let Some(found) = &slot.found else {
                continue;
            };
            let scope = SlotScope {
                name: slot.name.clone(),
                in_focus: focus == Some(entry.index),
                previous_value: entry.previous.clone(),
                current_value: entry.current.clone(),
            };
            let rendered = self.render(id, found, EvalFlags::default(), Some(scope))?;
            let step = match self.emit(rendered) {
                None => SlotStep::Continue,
                Some(Directive::PromptAgain) => {
                    self.slots.remove(&slot.name);
                    self.record(TraceEvent::SlotCleared {
                        node: tree.display_name(id),
                        slot: slot.name.clone(),
                    });
                    SlotStep::Reprompt(entry.index)
                }
                Some(directive) => slot_step(directive, Some(entry.index)),
            };
            if step != SlotStep::Continue {
                return Ok(step);
            }
        }
        Ok(SlotStep::Continue)
    }

    /// Node-level handlers, first match wins. `None` when nothing matched.
    fn run_handlers(
        &mut self,
        id: NodeId,
        focus: Option<usize>,
    ) -> Result<Option<SlotStep>, TurnError> {
        let tree = self.tree;
        let node = tree.node(id);
        let scope = focus.map(|index| self.slot_scope(&node.slot_filling[index], true));
        for (index, handler) in node.slot_handlers.iter().enumerate() {
            if !self.check(id, &handler.condition, EvalFlags::default(), scope.clone())? {
                continue;
            }
            self.record(TraceEvent::HandlerMatched {
                node: tree.display_name(id),
                index,
            });
            let directive = match &handler.response {
                Some(template) => {
                    let rendered =
                        self.render(id, template, EvalFlags::default(), scope.clone())?;
                    self.emit(rendered)
                }
                None => None,
            };
            return Ok(Some(
                directive.map_or(SlotStep::Continue, |d| slot_step(d, focus)),
            ));
        }
        Ok(None)
    }

    /// Nothing captured for the slot in focus. Without a `not_found` template
    /// (or with one that renders nothing) the prompt is repeated.
    fn not_found(&mut self, id: NodeId, focus: Option<usize>) -> Result<SlotStep, TurnError> {
        let tree = self.tree;
        let Some(index) = focus else {
            return Ok(SlotStep::Continue);
        };
        let slot = &tree.node(id).slot_filling[index];
        let Some(template) = &slot.not_found else {
            return Ok(SlotStep::Reprompt(index));
        };
        let scope = self.slot_scope(slot, true);
        let rendered = self.render(id, template, EvalFlags::default(), Some(scope))?;
        if rendered.is_empty() {
            self.apply_updates(rendered.updates);
            return Ok(SlotStep::Reprompt(index));
        }
        Ok(match self.emit(rendered) {
            None => SlotStep::Wait,
            Some(directive) => slot_step(directive, Some(index)),
        })
    }

    // ─── Prompting ────────────────────────────────────────────

    fn prompt_next(&mut self, id: NodeId, flags: EvalFlags) -> Result<(), TurnError> {
        let count = self.tree.node(id).slot_filling.len();
        for index in 0..count {
            if self.slot_pending(id, index)? {
                return self.prompt_slot(id, index, flags);
            }
        }
        self.resolve_slots(id)
    }

    fn prompt_slot(&mut self, id: NodeId, index: usize, flags: EvalFlags) -> Result<(), TurnError> {
        let tree = self.tree;
        let slot = &tree.node(id).slot_filling[index];
        if let Some(frame) = self.stack.last_mut() {
            frame.slot_in_focus = Some(slot.name.clone());
        }
        self.record(TraceEvent::SlotPrompted {
            node: tree.display_name(id),
            slot: slot.name.clone(),
        });
        if let Some(prompt) = &slot.prompt {
            let scope = self.slot_scope(slot, true);
            let rendered = self.render(id, prompt, flags, Some(scope))?;
            if let Some(directive) = self.emit(rendered) {
                debug!(slot = %slot.name, ?directive, "directive in slot prompt ignored");
            }
        }
        Ok(())
    }

    /// Every required slot is filled (or skipped): run the node response.
    fn resolve_slots(&mut self, id: NodeId) -> Result<(), TurnError> {
        self.record(TraceEvent::SlotsResolved {
            node: self.tree.display_name(id),
        });
        if let Some(frame) = self.stack.last_mut() {
            frame.slot_in_focus = None;
        }
        self.respond(id, EvalFlags::default())
    }

    // ─── Helpers ──────────────────────────────────────────────

    fn slot_pending(&self, id: NodeId, index: usize) -> Result<bool, TurnError> {
        let slot = &self.tree.node(id).slot_filling[index];
        Ok(slot.is_required() && !self.is_filled(&slot.name) && self.slot_enabled(id, slot)?)
    }

    fn is_filled(&self, name: &str) -> bool {
        self.slots.get(name).is_some_and(|v| !v.is_null())
    }

    /// A slot whose condition is false is skipped entirely.
    fn slot_enabled(&self, id: NodeId, slot: &SlotSpec) -> Result<bool, TurnError> {
        match &slot.condition {
            Some(condition) => self.check(id, condition, EvalFlags::default(), None),
            None => Ok(true),
        }
    }

    /// Scope before capture: previous and current are both the stored value.
    fn slot_scope(&self, slot: &SlotSpec, in_focus: bool) -> SlotScope {
        let value = self.slots.get(&slot.name).cloned().unwrap_or(Value::Null);
        SlotScope {
            name: slot.name.clone(),
            in_focus,
            previous_value: value.clone(),
            current_value: value,
        }
    }
}
