//! Subtree inlining: resolves `subtree:` includes into plain node lists.

use super::dto::{DialogTreeDto, NodeEntryDto, SubtreeDto};
use super::validate::ValidationError;
use crate::script::{Expr, Template};
use crate::tree::{HandlerSpec, NodeSettings, SlotSpec};
use std::collections::HashMap;

/// A node after subtree inlining, still in nested form.
#[derive(Debug, Clone)]
pub struct InlinedNode {
    pub label: Option<String>,
    pub condition: Expr,
    pub response: Option<Template>,
    pub followup: Vec<InlinedNode>,
    pub slot_filling: Vec<SlotSpec>,
    pub slot_handlers: Vec<HandlerSpec>,
    pub settings: NodeSettings,
}

impl InlinedNode {
    /// Every template on the node itself (not its followups).
    pub fn templates(&self) -> impl Iterator<Item = &Template> {
        self.response
            .iter()
            .chain(self.slot_filling.iter().flat_map(|s| {
                s.prompt
                    .iter()
                    .chain(s.found.iter())
                    .chain(s.not_found.iter())
            }))
            .chain(self.slot_handlers.iter().filter_map(|h| h.response.as_ref()))
    }
}

/// Inline every subtree include, reporting T4 (unknown subtree), T5
/// (inclusion cycle) and T6 (duplicate subtree name). Offending includes are
/// skipped so the remaining rules can still run.
pub fn inline_tree(dto: &DialogTreeDto, errors: &mut Vec<ValidationError>) -> Vec<InlinedNode> {
    let mut subtrees: HashMap<&str, &SubtreeDto> = HashMap::new();
    for subtree in &dto.subtrees {
        if subtrees.insert(subtree.name.as_str(), subtree).is_some() {
            errors.push(ValidationError::new(
                "T6",
                format!("Duplicate subtree name: {}", subtree.name),
            ));
        }
    }

    let mut inliner = Inliner {
        subtrees,
        path: Vec::new(),
        errors,
    };
    inliner.entries(&dto.nodes, None)
}

struct Inliner<'a, 'e> {
    subtrees: HashMap<&'a str, &'a SubtreeDto>,
    /// Subtrees currently being expanded, outermost first.
    path: Vec<&'a str>,
    errors: &'e mut Vec<ValidationError>,
}

impl<'a> Inliner<'a, '_> {
    fn entries(&mut self, entries: &'a [NodeEntryDto], guard: Option<&Expr>) -> Vec<InlinedNode> {
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry {
                NodeEntryDto::Node(node) => {
                    let condition = match guard {
                        Some(g) => node.condition.clone().guarded_by(g),
                        None => node.condition.clone(),
                    };
                    out.push(InlinedNode {
                        label: node.label.clone(),
                        condition,
                        response: node.response.clone(),
                        followup: self.entries(&node.followup, None),
                        slot_filling: node.slot_filling.clone(),
                        slot_handlers: node.slot_handlers.clone(),
                        settings: node.settings.clone(),
                    });
                }
                NodeEntryDto::Include(include) => {
                    let name = include.subtree.as_str();
                    if self.path.contains(&name) {
                        let mut cycle: Vec<&str> = self.path.clone();
                        cycle.push(name);
                        self.errors.push(ValidationError::new(
                            "T5",
                            format!("Subtree inclusion cycle: {}", cycle.join(" → ")),
                        ));
                        continue;
                    }
                    let Some(subtree) = self.subtrees.get(name).copied() else {
                        self.errors.push(ValidationError::new(
                            "T4",
                            format!("Unknown subtree: {}", name),
                        ));
                        continue;
                    };
                    let combined = match (guard, &subtree.guard) {
                        (Some(outer), Some(inner)) => Some(inner.clone().guarded_by(outer)),
                        (Some(outer), None) => Some(outer.clone()),
                        (None, inner) => inner.clone(),
                    };
                    self.path.push(name);
                    out.extend(self.entries(&subtree.nodes, combined.as_ref()));
                    self.path.pop();
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authoring::yaml::parse_tree_yaml;
    use crate::script::Op;

    #[test]
    fn test_subtree_inlined_with_guard() {
        let yaml = r#"
nodes:
  - condition: {intent: hello}
    response: hi
  - subtree: faq
subtrees:
  - name: faq
    guard: {intent: faq}
    nodes:
      - condition: {entity: topic}
        response: "About that..."
        followup:
          - condition: true
            response: "Anything else?"
"#;
        let dto = parse_tree_yaml(yaml).unwrap();
        let mut errors = Vec::new();
        let nodes = inline_tree(&dto, &mut errors);
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(nodes.len(), 2);
        match &nodes[1].condition {
            Expr::Op(op) => assert!(matches!(op.as_ref(), Op::All(items) if items.len() == 2)),
            other => panic!("Expected guarded condition, got {:?}", other),
        }
        // Followups inside the subtree are not guarded again.
        assert!(nodes[1].followup[0].condition.is_always_true());
    }

    #[test]
    fn test_cycle_and_unknown_reported() {
        let yaml = r#"
nodes:
  - subtree: a
  - subtree: missing
subtrees:
  - name: a
    nodes:
      - subtree: b
  - name: b
    nodes:
      - subtree: a
"#;
        let dto = parse_tree_yaml(yaml).unwrap();
        let mut errors = Vec::new();
        inline_tree(&dto, &mut errors);
        assert!(errors
            .iter()
            .any(|e| e.rule == "T5" && e.message.contains("a → b → a")));
        assert!(errors.iter().any(|e| e.rule == "T4"));
    }
}
