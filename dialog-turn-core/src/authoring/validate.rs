use super::dto::DialogTreeDto;
use super::inline::{inline_tree, InlinedNode};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub rule: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(rule: &str, message: String) -> Self {
        Self {
            rule: rule.to_string(),
            message,
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.rule, self.message)
    }
}

/// Validate a DialogTreeDto before lowering. Returns all errors found.
pub fn validate_dto(dto: &DialogTreeDto) -> Vec<ValidationError> {
    analyze(dto).1
}

/// Inline subtrees and run every rule over the result.
pub(crate) fn analyze(dto: &DialogTreeDto) -> (Vec<InlinedNode>, Vec<ValidationError>) {
    let mut errors = Vec::new();
    let nodes = inline_tree(dto, &mut errors);

    let mut all: Vec<&InlinedNode> = Vec::new();
    collect(&nodes, &mut all);

    // T1: labels unique across the inlined tree
    let mut label_counts: HashMap<&str, usize> = HashMap::new();
    for node in &all {
        if let Some(label) = &node.label {
            *label_counts.entry(label.as_str()).or_default() += 1;
        }
    }
    let mut duplicates: Vec<(&str, usize)> = label_counts
        .iter()
        .filter(|(_, &n)| n > 1)
        .map(|(&l, &n)| (l, n))
        .collect();
    duplicates.sort();
    for (label, count) in duplicates {
        errors.push(ValidationError::new(
            "T1",
            format!("Duplicate label: {} ({} nodes)", label, count),
        ));
    }

    for node in &all {
        // T2: nodes that can pause must be addressable
        if node.label.is_none() && (!node.followup.is_empty() || !node.slot_filling.is_empty()) {
            errors.push(ValidationError::new(
                "T2",
                "Node with followup or slot_filling must have a label".to_string(),
            ));
        }

        // T8: no empty names
        if node.label.as_deref().is_some_and(|l| l.trim().is_empty()) {
            errors.push(ValidationError::new("T8", "Empty node label".to_string()));
        }
        for slot in &node.slot_filling {
            if slot.name.trim().is_empty() {
                errors.push(ValidationError::new(
                    "T8",
                    format!("Empty slot name in node {}", describe(node)),
                ));
            }
        }

        // T7: slot names unique within a node
        let mut seen = HashSet::new();
        for slot in &node.slot_filling {
            if !seen.insert(slot.name.as_str()) {
                errors.push(ValidationError::new(
                    "T7",
                    format!("Duplicate slot {} in node {}", slot.name, describe(node)),
                ));
            }
        }
    }

    // T3: jump targets exist
    let mut jump_targets: HashSet<&str> = HashSet::new();
    for node in &all {
        for template in node.templates() {
            for target in template.jump_targets() {
                jump_targets.insert(target);
                if !label_counts.contains_key(target) {
                    errors.push(ValidationError::new(
                        "T3",
                        format!(
                            "jump_to from node {} targets unknown label: {}",
                            describe(node),
                            target
                        ),
                    ));
                }
            }
        }
    }

    // T9: labelled nodes shadowed by an always-true sibling must be jump targets
    check_reachable(&nodes, &jump_targets, &mut errors);

    (nodes, errors)
}

fn collect<'a>(nodes: &'a [InlinedNode], out: &mut Vec<&'a InlinedNode>) {
    for node in nodes {
        out.push(node);
        collect(&node.followup, out);
    }
}

fn check_reachable(
    siblings: &[InlinedNode],
    jump_targets: &HashSet<&str>,
    errors: &mut Vec<ValidationError>,
) {
    let mut shadowed = false;
    for node in siblings {
        if shadowed {
            if let Some(label) = &node.label {
                if !jump_targets.contains(label.as_str()) {
                    errors.push(ValidationError::new(
                        "T9",
                        format!(
                            "Node {} is unreachable: an earlier sibling always matches and nothing jumps to it",
                            label
                        ),
                    ));
                }
            }
        }
        if node.condition.is_always_true() {
            shadowed = true;
        }
        check_reachable(&node.followup, jump_targets, errors);
    }
}

fn describe(node: &InlinedNode) -> String {
    node.label.clone().unwrap_or_else(|| "<unlabelled>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authoring::yaml::parse_tree_yaml;

    fn errors_for(yaml: &str) -> Vec<ValidationError> {
        validate_dto(&parse_tree_yaml(yaml).unwrap())
    }

    #[test]
    fn test_valid_tree_has_no_errors() {
        let errors = errors_for(
            r#"
nodes:
  - label: menu
    condition: {intent: menu}
    response: "Cake?"
    followup:
      - condition: true
        response: [{jump_to: {node: menu, transition: response}}]
  - condition: true
    response: "?"
"#,
        );
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn test_duplicate_label_across_subtree_include() {
        let errors = errors_for(
            r#"
nodes:
  - subtree: shared
  - condition: {intent: x}
    response: x
    label: again
    followup:
      - subtree: shared
subtrees:
  - name: shared
    nodes:
      - label: dup
        condition: {intent: dup}
        response: dup
"#,
        );
        assert!(errors
            .iter()
            .any(|e| e.rule == "T1" && e.message.contains("dup (2 nodes)")));
    }

    #[test]
    fn test_missing_label_and_unknown_jump() {
        let errors = errors_for(
            r#"
nodes:
  - condition: {intent: book}
    slot_filling:
      - name: guests
        check_for: {entity: number}
    response: [{jump_to: {node: nowhere, transition: condition}}]
"#,
        );
        assert!(errors.iter().any(|e| e.rule == "T2"));
        assert!(errors
            .iter()
            .any(|e| e.rule == "T3" && e.message.contains("nowhere")));
    }

    #[test]
    fn test_duplicate_slot_and_empty_name() {
        let errors = errors_for(
            r#"
nodes:
  - label: book
    condition: true
    slot_filling:
      - name: guests
        check_for: {entity: number}
      - name: guests
        check_for: {entity: number}
      - name: " "
        check_for: {entity: x}
"#,
        );
        assert!(errors.iter().any(|e| e.rule == "T7"));
        assert!(errors.iter().any(|e| e.rule == "T8"));
    }

    #[test]
    fn test_unreachable_label() {
        let errors = errors_for(
            r#"
nodes:
  - condition: true
    response: "anything"
  - label: hidden
    condition: {intent: hidden}
    response: "never"
  - label: target
    condition: {intent: target}
    response: "via jump"
  - label: jumper
    condition: {intent: jumper}
    response: [{jump_to: {node: target, transition: response}}]
"#,
        );
        let t9: Vec<_> = errors.iter().filter(|e| e.rule == "T9").collect();
        assert!(t9.iter().any(|e| e.message.contains("hidden")));
        assert!(!t9.iter().any(|e| e.message.contains("target")));
    }
}
