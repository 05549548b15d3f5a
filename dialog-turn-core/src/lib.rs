//! Dialog turn engine: a compiled tree of dialog nodes, per-session branch
//! stacks and a turn processor that maps `(event, state)` to commands.
//!
//! The usual entry point is [`DialogEngine::process_turn`]. Trees are written
//! in YAML and compiled with [`authoring::compile_tree_yaml`].

pub mod authoring;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod script;
pub mod session;
pub mod store;
pub mod store_memory;
pub mod tree;
pub mod types;

pub use config::EngineConfig;
pub use engine::{DialogEngine, TurnOutcome, TurnProcessor};
pub use error::{CompileError, EvalError, TurnError};
pub use evaluator::{Evaluator, ScriptEvaluator};
pub use events::TraceEvent;
pub use session::{BranchFrame, FrameKind, SessionKey, SessionState};
pub use store::SessionStore;
pub use store_memory::MemorySessionStore;
pub use tree::DialogTree;
pub use types::{Command, DialogEvent};
