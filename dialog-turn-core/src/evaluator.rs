//! Evaluator seam: the engine asks an [`Evaluator`] to check conditions and
//! render templates against an [`EvalContext`]. [`ScriptEvaluator`] is the
//! reference implementation for the [`crate::script`] language.

use crate::error::EvalError;
use crate::script::{Directive, Expr, Flag, Op, Step, Template, ValueVar};
use crate::types::{Command, DialogEvent, RecognizedEntity, Span};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

// ─── Context ──────────────────────────────────────────────────

/// Flags the engine threads into each evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvalFlags {
    pub digressing: bool,
    pub returning: bool,
}

impl EvalFlags {
    pub fn digressing() -> Self {
        Self {
            digressing: true,
            returning: false,
        }
    }

    pub fn returning() -> Self {
        Self {
            digressing: false,
            returning: true,
        }
    }
}

/// Slot-specific variables visible while a slot's templates are evaluated.
#[derive(Clone, Debug, PartialEq)]
pub struct SlotScope {
    pub name: String,
    pub in_focus: bool,
    pub previous_value: Value,
    pub current_value: Value,
}

/// Everything an expression may read during one evaluation.
#[derive(Clone, Debug)]
pub struct EvalContext<'a> {
    pub event: &'a DialogEvent,
    pub slots: &'a BTreeMap<String, Value>,
    pub user: &'a BTreeMap<String, Value>,
    pub flags: EvalFlags,
    pub slot: Option<SlotScope>,
}

impl EvalContext<'_> {
    pub fn flag(&self, flag: Flag) -> bool {
        match flag {
            Flag::Digressing => self.flags.digressing,
            Flag::Returning => self.flags.returning,
            Flag::SlotInFocus => self.slot.as_ref().is_some_and(|s| s.in_focus),
        }
    }

    pub fn var(&self, var: ValueVar) -> Value {
        match (&self.slot, var) {
            (Some(s), ValueVar::PreviousValue) => s.previous_value.clone(),
            (Some(s), ValueVar::CurrentValue) => s.current_value.clone(),
            (None, _) => Value::Null,
        }
    }
}

// ─── Results ──────────────────────────────────────────────────

/// A variable mutation requested by a template.
#[derive(Clone, Debug, PartialEq)]
pub enum VarUpdate {
    SetSlot(String, Value),
    SetUser(String, Value),
    DeleteSlot(String),
    DeleteUser(String),
}

/// Output of rendering one template.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Rendered {
    pub commands: Vec<Command>,
    pub directive: Option<Directive>,
    pub updates: Vec<VarUpdate>,
}

impl Rendered {
    /// Nothing defined: no commands and no directive.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.directive.is_none()
    }
}

/// The entity occurrence a slot's `check_for` consumed.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityRef {
    pub name: String,
    pub index: usize,
    pub span: Option<Span>,
}

impl EntityRef {
    /// Two captures conflict when they consume the same occurrence or
    /// overlapping spans of the utterance.
    pub fn conflicts(&self, other: &EntityRef) -> bool {
        if self.name == other.name && self.index == other.index {
            return true;
        }
        match (&self.span, &other.span) {
            (Some(a), Some(b)) => a.overlaps(b),
            _ => false,
        }
    }
}

/// A value together with every entity occurrence read to produce it.
#[derive(Clone, Debug, PartialEq)]
pub struct Capture {
    pub value: Value,
    pub sources: Vec<EntityRef>,
}

impl Capture {
    pub fn conflicts_with(&self, taken: &[EntityRef]) -> bool {
        self.sources
            .iter()
            .any(|source| taken.iter().any(|t| t.conflicts(source)))
    }
}

// ─── Trait ────────────────────────────────────────────────────

/// Expression/template evaluator consumed by the turn engine.
pub trait Evaluator: Send + Sync {
    fn evaluate_condition(&self, expr: &Expr, ctx: &EvalContext<'_>) -> Result<bool, EvalError> {
        Ok(is_truthy(&self.evaluate_value(expr, ctx)?))
    }

    fn evaluate_value(&self, expr: &Expr, ctx: &EvalContext<'_>) -> Result<Value, EvalError>;

    /// Evaluate `expr` for slot capture. Entity reads must skip occurrences
    /// in `taken` (consumed by other slots in this event) and report every
    /// occurrence they did use. The default reports none, so the engine
    /// cannot keep two slots from sharing an occurrence.
    fn evaluate_tracked(
        &self,
        expr: &Expr,
        ctx: &EvalContext<'_>,
        taken: &[EntityRef],
    ) -> Result<Capture, EvalError> {
        let _ = taken;
        Ok(Capture {
            value: self.evaluate_value(expr, ctx)?,
            sources: Vec::new(),
        })
    }

    /// Evaluate a slot's `check_for`; `None` unless the result is truthy.
    fn capture(
        &self,
        expr: &Expr,
        ctx: &EvalContext<'_>,
        taken: &[EntityRef],
    ) -> Result<Option<Capture>, EvalError> {
        let capture = self.evaluate_tracked(expr, ctx, taken)?;
        Ok(is_truthy(&capture.value).then_some(capture))
    }

    fn render(&self, template: &Template, ctx: &EvalContext<'_>) -> Result<Rendered, EvalError>;
}

/// null, false, 0, "" and empty containers are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

// ─── Reference implementation ─────────────────────────────────

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([a-z_]+)(?:\.([A-Za-z0-9_]+))?\}").expect("placeholder regex is valid")
});

/// Evaluator for the built-in [`crate::script`] language.
#[derive(Debug, Default, Clone)]
pub struct ScriptEvaluator;

impl ScriptEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn interpolate(&self, text: &str, ctx: &EvalContext<'_>) -> Result<String, EvalError> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(text) {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            out.push_str(&text[last..whole.start]);
            let root = caps.get(1).map_or("", |m| m.as_str());
            let key = caps.get(2).map(|m| m.as_str());
            let value = match (root, key) {
                ("slots", Some(k)) => ctx.slots.get(k).cloned().unwrap_or(Value::Null),
                ("user", Some(k)) => ctx.user.get(k).cloned().unwrap_or(Value::Null),
                ("entities", Some(k)) => ctx
                    .event
                    .first_entity(k)
                    .map(|(_, e)| e.value.clone())
                    .unwrap_or(Value::Null),
                ("current_value", None) => ctx.var(ValueVar::CurrentValue),
                ("previous_value", None) => ctx.var(ValueVar::PreviousValue),
                _ => {
                    return Err(EvalError::UnknownPlaceholder(
                        text[whole.clone()].to_string(),
                    ))
                }
            };
            out.push_str(&display_value(&value));
            last = whole.end;
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    /// `evaluate_value` for capture: entity reads take the first truthy
    /// occurrence not in `taken` and record it in `reads`. Reads under a
    /// branch that did not decide the result are dropped.
    fn tracked(
        &self,
        expr: &Expr,
        ctx: &EvalContext<'_>,
        taken: &[EntityRef],
        reads: &mut Vec<EntityRef>,
    ) -> Result<Value, EvalError> {
        let Expr::Op(op) = expr else {
            return self.evaluate_value(expr, ctx);
        };
        let value = match op.as_ref() {
            Op::Entity(name) => match free_occurrences(ctx.event, name, taken)
                .find(|(_, e)| is_truthy(&e.value))
            {
                Some((occurrence, e)) => {
                    record(reads, occurrence);
                    e.value.clone()
                }
                None => Value::Null,
            },
            Op::EntityValue { entity, value } => {
                match free_occurrences(ctx.event, entity, taken)
                    .find(|(_, e)| values_equal(&e.value, value))
                {
                    Some((occurrence, _)) => {
                        record(reads, occurrence);
                        Value::Bool(true)
                    }
                    None => Value::Bool(false),
                }
            }
            Op::Eq(a, b) => {
                let a = self.tracked(a, ctx, taken, reads)?;
                let b = self.tracked(b, ctx, taken, reads)?;
                Value::Bool(values_equal(&a, &b))
            }
            Op::Not(inner) => {
                let mut scratch = Vec::new();
                Value::Bool(!is_truthy(&self.tracked(inner, ctx, taken, &mut scratch)?))
            }
            Op::All(items) => {
                for item in items {
                    if !is_truthy(&self.tracked(item, ctx, taken, reads)?) {
                        return Ok(Value::Bool(false));
                    }
                }
                Value::Bool(true)
            }
            Op::Any(items) => {
                for item in items {
                    let mut branch = Vec::new();
                    if is_truthy(&self.tracked(item, ctx, taken, &mut branch)?) {
                        for occurrence in branch {
                            record(reads, occurrence);
                        }
                        return Ok(Value::Bool(true));
                    }
                }
                Value::Bool(false)
            }
            _ => self.evaluate_value(expr, ctx)?,
        };
        Ok(value)
    }

    /// Walk steps against a scratch copy of the variables so later steps see
    /// earlier `set_*` updates. Returns true once a directive was reached.
    fn render_steps(
        &self,
        steps: &[Step],
        ctx: &EvalContext<'_>,
        scratch: &mut Scratch,
        out: &mut Rendered,
    ) -> Result<bool, EvalError> {
        for step in steps {
            if let Some(directive) = step.directive() {
                out.directive = Some(directive);
                return Ok(true);
            }
            let local = EvalContext {
                event: ctx.event,
                slots: &scratch.slots,
                user: &scratch.user,
                flags: ctx.flags,
                slot: ctx.slot.clone(),
            };
            match step {
                Step::Text(text) => {
                    let text = self.interpolate(text, &local)?;
                    out.commands.push(Command::Text { text });
                }
                Step::Image { url, caption } => out.commands.push(Command::Image {
                    url: self.interpolate(url, &local)?,
                    caption: caption
                        .as_deref()
                        .map(|c| self.interpolate(c, &local))
                        .transpose()?,
                }),
                Step::Command { name, payload } => out.commands.push(Command::Custom {
                    name: name.clone(),
                    payload: payload.clone(),
                }),
                Step::If {
                    when,
                    then,
                    otherwise,
                } => {
                    let branch = if self.evaluate_condition(when, &local)? {
                        then
                    } else {
                        otherwise
                    };
                    if self.render_steps(branch, ctx, scratch, out)? {
                        return Ok(true);
                    }
                }
                Step::SetSlot { name, value } => {
                    let value = self.evaluate_value(value, &local)?;
                    scratch.slots.insert(name.clone(), value.clone());
                    out.updates.push(VarUpdate::SetSlot(name.clone(), value));
                }
                Step::SetUser { name, value } => {
                    let value = self.evaluate_value(value, &local)?;
                    scratch.user.insert(name.clone(), value.clone());
                    out.updates.push(VarUpdate::SetUser(name.clone(), value));
                }
                Step::DeleteSlot(name) => {
                    scratch.slots.remove(name);
                    out.updates.push(VarUpdate::DeleteSlot(name.clone()));
                }
                Step::DeleteUser(name) => {
                    scratch.user.remove(name);
                    out.updates.push(VarUpdate::DeleteUser(name.clone()));
                }
                _ => {}
            }
        }
        Ok(false)
    }
}

struct Scratch {
    slots: BTreeMap<String, Value>,
    user: BTreeMap<String, Value>,
}

/// Occurrences of `name` that no other slot consumed yet.
fn free_occurrences<'a>(
    event: &'a DialogEvent,
    name: &'a str,
    taken: &'a [EntityRef],
) -> impl Iterator<Item = (EntityRef, &'a RecognizedEntity)> + 'a {
    event.entities_named(name).filter_map(move |(index, e)| {
        let occurrence = EntityRef {
            name: e.name.clone(),
            index,
            span: e.span,
        };
        (!taken.iter().any(|t| t.conflicts(&occurrence))).then_some((occurrence, e))
    })
}

fn record(reads: &mut Vec<EntityRef>, occurrence: EntityRef) {
    if !reads.contains(&occurrence) {
        reads.push(occurrence);
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Evaluator for ScriptEvaluator {
    fn evaluate_value(&self, expr: &Expr, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
        let op = match expr {
            Expr::Bool(b) => return Ok(Value::Bool(*b)),
            Expr::Int(n) => return Ok(Value::from(*n)),
            Expr::Float(f) => return Ok(Value::from(*f)),
            Expr::Str(s) => return Ok(Value::String(s.clone())),
            Expr::Op(op) => op,
        };
        let value = match op.as_ref() {
            Op::Intent(name) => {
                Value::Bool(ctx.event.top_intent().is_some_and(|i| &i.name == name))
            }
            Op::Entity(name) => ctx
                .event
                .first_entity(name)
                .map(|(_, e)| e.value.clone())
                .unwrap_or(Value::Null),
            Op::EntityValue { entity, value } => Value::Bool(
                ctx.event
                    .entities_named(entity)
                    .any(|(_, e)| values_equal(&e.value, value)),
            ),
            Op::TextContains(needle) => Value::Bool(
                ctx.event
                    .text()
                    .is_some_and(|t| t.to_lowercase().contains(&needle.to_lowercase())),
            ),
            Op::TextEquals(expected) => Value::Bool(
                ctx.event
                    .text()
                    .is_some_and(|t| t.trim().eq_ignore_ascii_case(expected.trim())),
            ),
            Op::Rpc(method) => Value::Bool(matches!(
                &ctx.event.payload,
                crate::types::EventPayload::Rpc { method: m, .. } if m == method
            )),
            Op::Slot(name) => ctx.slots.get(name).cloned().unwrap_or(Value::Null),
            Op::User(name) => ctx.user.get(name).cloned().unwrap_or(Value::Null),
            Op::Flag(flag) => Value::Bool(ctx.flag(*flag)),
            Op::Var(var) => ctx.var(*var),
            Op::Eq(a, b) => Value::Bool(values_equal(
                &self.evaluate_value(a, ctx)?,
                &self.evaluate_value(b, ctx)?,
            )),
            Op::Not(inner) => Value::Bool(!self.evaluate_condition(inner, ctx)?),
            Op::All(items) => {
                for item in items {
                    if !self.evaluate_condition(item, ctx)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Value::Bool(true)
            }
            Op::Any(items) => {
                for item in items {
                    if self.evaluate_condition(item, ctx)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Value::Bool(false)
            }
        };
        Ok(value)
    }

    fn evaluate_tracked(
        &self,
        expr: &Expr,
        ctx: &EvalContext<'_>,
        taken: &[EntityRef],
    ) -> Result<Capture, EvalError> {
        let mut sources = Vec::new();
        let value = self.tracked(expr, ctx, taken, &mut sources)?;
        Ok(Capture { value, sources })
    }

    fn render(&self, template: &Template, ctx: &EvalContext<'_>) -> Result<Rendered, EvalError> {
        let mut out = Rendered::default();
        match template {
            Template::Say(text) => {
                let text = self.interpolate(text, ctx)?;
                out.commands.push(Command::Text { text });
            }
            Template::Steps(steps) => {
                let mut scratch = Scratch {
                    slots: ctx.slots.clone(),
                    user: ctx.user.clone(),
                };
                self.render_steps(steps, ctx, &mut scratch, &mut out)?;
            }
        }
        Ok(out)
    }
}
