//! Sibling-list matching: the first node whose condition holds wins.

use super::turn::Turn;
use crate::error::TurnError;
use crate::evaluator::{EvalContext, EvalFlags, Evaluator};
use crate::events::TraceEvent;
use crate::tree::{DialogTree, NodeId};

/// Scan `candidates` in order and return the first whose condition is true.
/// Conditions after the winner are never evaluated.
pub fn match_first(
    tree: &DialogTree,
    evaluator: &dyn Evaluator,
    candidates: &[NodeId],
    ctx: &EvalContext<'_>,
) -> Result<Option<NodeId>, TurnError> {
    for &id in candidates {
        let matched = evaluator
            .evaluate_condition(&tree.node(id).condition, ctx)
            .map_err(|source| TurnError::Evaluation {
                node: tree.display_name(id),
                source,
            })?;
        if matched {
            return Ok(Some(id));
        }
    }
    Ok(None)
}

impl Turn<'_> {
    pub(super) fn first_match(
        &self,
        candidates: &[NodeId],
        flags: EvalFlags,
    ) -> Result<Option<NodeId>, TurnError> {
        match_first(self.tree, self.evaluator, candidates, &self.ctx(flags, None))
    }

    /// A paused followup frame receives the next event.
    pub(super) fn continue_followup(&mut self, id: NodeId) -> Result<(), TurnError> {
        let tree = self.tree;
        if let Some(child) = self.first_match(&tree.node(id).followup, EvalFlags::default())? {
            return self.enter_node(child, EvalFlags::default());
        }
        self.record(TraceEvent::NoMatch {
            scope: format!("followup of {}", tree.display_name(id)),
        });
        // Nothing matched here or at root level: keep waiting on the same frame.
        self.try_digress(id)?;
        Ok(())
    }

    /// `followup` directive: evaluate the children against the current event.
    pub(super) fn followup_now(&mut self, id: NodeId) -> Result<(), TurnError> {
        let tree = self.tree;
        match self.first_match(&tree.node(id).followup, EvalFlags::default())? {
            Some(child) => self.enter_node(child, EvalFlags::default()),
            None => {
                self.record(TraceEvent::NoMatch {
                    scope: format!("followup of {}", tree.display_name(id)),
                });
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authoring::compile_tree_yaml;
    use crate::evaluator::ScriptEvaluator;
    use crate::types::DialogEvent;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx<'a>(
        event: &'a DialogEvent,
        vars: &'a BTreeMap<String, serde_json::Value>,
    ) -> EvalContext<'a> {
        EvalContext {
            event,
            slots: vars,
            user: vars,
            flags: EvalFlags::default(),
            slot: None,
        }
    }

    /// One root per entity name, each answering with its index.
    fn tree_for(entities: &[String]) -> DialogTree {
        let mut yaml = String::from("nodes:\n");
        for (i, name) in entities.iter().enumerate() {
            yaml.push_str(&format!(
                "  - condition: {{entity: {name}}}\n    response: \"{i}\"\n"
            ));
        }
        compile_tree_yaml(&yaml).unwrap()
    }

    #[test]
    fn test_no_candidates() {
        let tree = tree_for(&["a".to_string()]);
        let event = DialogEvent::message("x");
        let vars = BTreeMap::new();
        let found = match_first(&tree, &ScriptEvaluator, &[], &ctx(&event, &vars)).unwrap();
        assert_eq!(found, None);
    }

    /// Counts condition evaluations so tests can see what was skipped.
    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl Evaluator for Counting {
        fn evaluate_value(
            &self,
            expr: &crate::script::Expr,
            ctx: &EvalContext<'_>,
        ) -> Result<serde_json::Value, crate::error::EvalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ScriptEvaluator.evaluate_value(expr, ctx)
        }

        fn render(
            &self,
            template: &crate::script::Template,
            ctx: &EvalContext<'_>,
        ) -> Result<crate::evaluator::Rendered, crate::error::EvalError> {
            ScriptEvaluator.render(template, ctx)
        }
    }

    #[test]
    fn test_later_siblings_not_evaluated() {
        let names: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let tree = tree_for(&names);
        let event = DialogEvent::message("x").with_entity("b", true);
        let vars = BTreeMap::new();
        let counting = Counting::default();
        let found = match_first(&tree, &counting, tree.roots(), &ctx(&event, &vars)).unwrap();
        assert_eq!(found, Some(tree.roots()[1]));
        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
    }

    proptest! {
        #[test]
        fn prop_first_true_condition_wins(
            flags in proptest::collection::vec(any::<bool>(), 1..12)
        ) {
            let names: Vec<String> = (0..flags.len()).map(|i| format!("e{i}")).collect();
            let tree = tree_for(&names);
            let mut event = DialogEvent::message("x");
            for (i, on) in flags.iter().enumerate() {
                if *on {
                    event = event.with_entity(format!("e{i}"), true);
                }
            }
            let vars = BTreeMap::new();
            let found = match_first(&tree, &ScriptEvaluator, tree.roots(), &ctx(&event, &vars)).unwrap();
            let expected = flags.iter().position(|on| *on).map(|i| tree.roots()[i]);
            prop_assert_eq!(found, expected);
        }
    }
}
