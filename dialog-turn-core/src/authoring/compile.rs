use super::dto::DialogTreeDto;
use super::inline::InlinedNode;
use super::validate::analyze;
use crate::error::CompileError;
use crate::tree::{DialogNode, DialogTree, NodeId};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Validate, inline subtrees and lower a DTO into the node arena.
pub fn compile_tree(dto: &DialogTreeDto) -> Result<DialogTree, CompileError> {
    let (inlined, errors) = analyze(dto);
    if !errors.is_empty() {
        return Err(CompileError::Invalid(errors));
    }

    let mut nodes = Vec::new();
    let roots = lower(&inlined, None, &mut nodes);
    let version = hex::encode(Sha256::digest(serde_json::to_vec(dto)?));

    debug!(
        nodes = nodes.len(),
        roots = roots.len(),
        version = %version,
        "compiled dialog tree"
    );
    Ok(DialogTree::from_parts(nodes, roots, version))
}

/// Parse and compile in one step.
pub fn compile_tree_yaml(yaml_str: &str) -> Result<DialogTree, CompileError> {
    let dto: DialogTreeDto = serde_yaml::from_str(yaml_str)?;
    compile_tree(&dto)
}

/// Assign arena ids depth-first; returns the ids of this sibling list.
fn lower(
    list: &[InlinedNode],
    parent: Option<NodeId>,
    arena: &mut Vec<DialogNode>,
) -> Vec<NodeId> {
    let mut ids = Vec::with_capacity(list.len());
    for (position, node) in list.iter().enumerate() {
        let id = arena.len();
        arena.push(DialogNode {
            id,
            label: node.label.clone(),
            condition: node.condition.clone(),
            response: node.response.clone(),
            followup: Vec::new(),
            slot_filling: node.slot_filling.clone(),
            slot_handlers: node.slot_handlers.clone(),
            settings: node.settings.clone(),
            parent,
            position,
        });
        let children = lower(&node.followup, Some(id), arena);
        arena[id].followup = children;
        ids.push(id);
    }
    ids
}
