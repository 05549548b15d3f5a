//! Reference script language: conditions (`Expr`) and responses (`Template`).
//!
//! Both are plain serde data so they can be authored in YAML next to the
//! tree. Evaluation lives in [`crate::evaluator`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Expressions ──────────────────────────────────────────────

/// A condition or value expression.
///
/// Literals are written bare (`true`, `3`, `"yes"`); everything else is a
/// one-key map naming the operator, e.g. `{intent: greetings}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expr {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Op(Box<Op>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    /// True when the top-ranked intent has this name.
    Intent(String),
    /// Value of the first occurrence of the entity, or null.
    Entity(String),
    /// True when any occurrence of `entity` carries `value`.
    EntityValue { entity: String, value: Value },
    TextContains(String),
    TextEquals(String),
    /// True when the event is an RPC request for this method.
    Rpc(String),
    Slot(String),
    User(String),
    Flag(Flag),
    Var(ValueVar),
    Eq(Expr, Expr),
    Not(Expr),
    All(Vec<Expr>),
    Any(Vec<Expr>),
}

/// Per-evaluation flags the engine sets before each evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    Digressing,
    Returning,
    SlotInFocus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueVar {
    PreviousValue,
    CurrentValue,
}

impl Expr {
    pub fn op(op: Op) -> Self {
        Expr::Op(Box::new(op))
    }

    pub fn intent(name: &str) -> Self {
        Expr::op(Op::Intent(name.to_string()))
    }

    pub fn entity(name: &str) -> Self {
        Expr::op(Op::Entity(name.to_string()))
    }

    /// Literal `true`, the "anything else" condition.
    pub fn is_always_true(&self) -> bool {
        matches!(self, Expr::Bool(true))
    }

    /// `guard AND self`, flattening when either side is already trivially true.
    pub fn guarded_by(self, guard: &Expr) -> Expr {
        if guard.is_always_true() {
            return self;
        }
        if self.is_always_true() {
            return guard.clone();
        }
        Expr::op(Op::All(vec![guard.clone(), self]))
    }
}

// ─── Templates ────────────────────────────────────────────────

/// A response template: a single line of text or a list of steps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Template {
    Say(String),
    Steps(Vec<Step>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Text(String),
    Image {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Command {
        name: String,
        #[serde(default)]
        payload: Value,
    },
    If {
        when: Expr,
        #[serde(default)]
        then: Vec<Step>,
        #[serde(default, rename = "else")]
        otherwise: Vec<Step>,
    },
    SetSlot {
        name: String,
        value: Expr,
    },
    SetUser {
        name: String,
        value: Expr,
    },
    DeleteSlot(String),
    DeleteUser(String),

    // Directives. The first one reached ends rendering.
    End,
    Listen,
    Followup,
    MoveOn,
    PromptAgain,
    ListenAgain,
    Response,
    JumpTo {
        node: String,
        transition: Transition,
    },
}

/// How a `jump_to` enters its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Run the target's response without checking its condition.
    Response,
    /// Check the target's condition, then its following siblings.
    Condition,
    /// Wait for the next event, then match from the target onwards.
    Listen,
}

/// Control command emitted by a rendered template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directive {
    End,
    Listen,
    Followup,
    JumpTo { node: String, transition: Transition },
    MoveOn,
    PromptAgain,
    ListenAgain,
    Response,
}

impl Directive {
    /// Directives that only mean something inside slot filling.
    pub fn is_slot_directive(&self) -> bool {
        matches!(
            self,
            Directive::MoveOn | Directive::PromptAgain | Directive::ListenAgain | Directive::Response
        )
    }
}

impl Step {
    pub fn directive(&self) -> Option<Directive> {
        match self {
            Step::End => Some(Directive::End),
            Step::Listen => Some(Directive::Listen),
            Step::Followup => Some(Directive::Followup),
            Step::MoveOn => Some(Directive::MoveOn),
            Step::PromptAgain => Some(Directive::PromptAgain),
            Step::ListenAgain => Some(Directive::ListenAgain),
            Step::Response => Some(Directive::Response),
            Step::JumpTo { node, transition } => Some(Directive::JumpTo {
                node: node.clone(),
                transition: *transition,
            }),
            _ => None,
        }
    }
}

impl Template {
    pub fn say(text: &str) -> Self {
        Template::Say(text.to_string())
    }

    /// Every `jump_to` label reachable in this template, including both
    /// branches of conditionals.
    pub fn jump_targets(&self) -> Vec<&str> {
        let mut out = Vec::new();
        if let Template::Steps(steps) = self {
            collect_jump_targets(steps, &mut out);
        }
        out
    }
}

fn collect_jump_targets<'a>(steps: &'a [Step], out: &mut Vec<&'a str>) {
    for step in steps {
        match step {
            Step::JumpTo { node, .. } => out.push(node.as_str()),
            Step::If {
                then, otherwise, ..
            } => {
                collect_jump_targets(then, out);
                collect_jump_targets(otherwise, out);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_and_operator_exprs() {
        let e: Expr = serde_yaml::from_str("true").unwrap();
        assert!(e.is_always_true());

        let e: Expr = serde_yaml::from_str("{intent: greetings}").unwrap();
        assert_eq!(e, Expr::intent("greetings"));

        let e: Expr = serde_yaml::from_str("{eq: [{slot: guests}, 4]}").unwrap();
        assert_eq!(
            e,
            Expr::op(Op::Eq(
                Expr::op(Op::Slot("guests".into())),
                Expr::Int(4)
            ))
        );
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let result: Result<Expr, _> = serde_yaml::from_str("{intnet: greetings}");
        assert!(result.is_err());
    }

    #[test]
    fn test_template_shorthand_and_steps() {
        let t: Template = serde_yaml::from_str("\"Good day!\"").unwrap();
        assert_eq!(t, Template::say("Good day!"));

        let yaml = r#"
- text: "Let's go"
- if:
    when: {flag: returning}
    then:
      - text: "Back to it."
- jump_to: {node: menu, transition: listen}
"#;
        let t: Template = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(t.jump_targets(), vec!["menu"]);
    }

    #[test]
    fn test_unit_directive_steps() {
        let t: Template = serde_yaml::from_str("[end]").unwrap();
        match t {
            Template::Steps(steps) => assert_eq!(steps[0].directive(), Some(Directive::End)),
            other => panic!("Expected steps, got {:?}", other),
        }
    }

    #[test]
    fn test_guard_flattening() {
        let guard = Expr::intent("faq");
        assert_eq!(Expr::Bool(true).guarded_by(&guard), guard);
        assert_eq!(guard.clone().guarded_by(&Expr::Bool(true)), guard);
        assert!(matches!(
            Expr::entity("x").guarded_by(&guard),
            Expr::Op(op) if matches!(*op, Op::All(_))
        ));
    }
}
