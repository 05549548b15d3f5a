//! Typed errors for compilation, evaluation and turn processing.

use crate::authoring::validate::ValidationError;

/// Failure raised by an [`crate::evaluator::Evaluator`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("unknown template placeholder {0}")]
    UnknownPlaceholder(String),

    /// Raised by external evaluator implementations.
    #[error("evaluation failed: {0}")]
    Failed(String),
}

/// Authoring errors caught while loading a dialog tree.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("dialog tree failed validation:\n{}", render_errors(.0))]
    Invalid(Vec<ValidationError>),

    #[error("failed to parse dialog tree YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to encode dialog tree for versioning: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CompileError {
    /// Validation errors, if this is a validation failure.
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            CompileError::Invalid(errors) => errors,
            _ => &[],
        }
    }
}

fn render_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A failed turn. Nothing is persisted when a turn fails.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("jump_to references unknown label '{0}'")]
    UnknownLabel(String),

    #[error("more than {limit} jumps in one turn (last target '{label}')")]
    JumpLimitExceeded { limit: usize, label: String },

    #[error("evaluation failed at node {node}: {source}")]
    Evaluation {
        node: String,
        #[source]
        source: EvalError,
    },

    #[error("node {0} must be labelled to be suspended across turns")]
    UnlabeledSuspend(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
