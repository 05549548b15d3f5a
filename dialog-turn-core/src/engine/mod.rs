//! Turn engine. [`TurnProcessor`] computes one turn synchronously;
//! [`DialogEngine`] wraps it with per-session locking and persistence.

mod digression;
mod jump;
mod matcher;
mod slots;
mod turn;

pub use matcher::match_first;
pub use turn::{TurnOutcome, TurnProcessor};

use crate::config::EngineConfig;
use crate::error::TurnError;
use crate::evaluator::Evaluator;
use crate::session::SessionKey;
use crate::store::SessionStore;
use crate::tree::DialogTree;
use crate::types::{Command, DialogEvent};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Processes events for many sessions against one compiled tree.
pub struct DialogEngine {
    tree: Arc<DialogTree>,
    evaluator: Arc<dyn Evaluator>,
    store: Arc<dyn SessionStore>,
    config: EngineConfig,
}

impl DialogEngine {
    pub fn new(
        tree: Arc<DialogTree>,
        evaluator: Arc<dyn Evaluator>,
        store: Arc<dyn SessionStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            tree,
            evaluator,
            store,
            config,
        }
    }

    pub fn tree(&self) -> &DialogTree {
        &self.tree
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Process one event for `(channel, user_id)` and return the commands to
    /// deliver. On error the stored session is left untouched.
    pub async fn process_turn(
        &self,
        event: &DialogEvent,
        channel: &str,
        user_id: &str,
    ) -> Result<Vec<Command>, TurnError> {
        Ok(self
            .process_turn_traced(event, channel, user_id)
            .await?
            .commands)
    }

    /// Like [`process_turn`](Self::process_turn), also returning the saved
    /// state and the turn trace.
    #[instrument(skip(self, event), fields(turn_id, tree = %self.tree.version()))]
    pub async fn process_turn_traced(
        &self,
        event: &DialogEvent,
        channel: &str,
        user_id: &str,
    ) -> Result<TurnOutcome, TurnError> {
        let key = SessionKey::new(channel, user_id);
        tracing::Span::current().record("turn_id", tracing::field::display(Uuid::now_v7()));

        // Serialize turns per session: load → process → save is atomic.
        let _lease = self.store.lock(&key).await?;
        let state = self.store.load(&key).await?;
        debug!(
            frames = state.branch_stack.len(),
            slots = state.slots.len(),
            "session loaded"
        );

        let processor = TurnProcessor::new(&self.tree, self.evaluator.as_ref(), &self.config);
        let outcome = match processor.process(event, state) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "turn failed; session state not saved");
                return Err(e);
            }
        };

        self.store.save(&key, &outcome.state).await?;
        info!(
            commands = outcome.commands.len(),
            depth = outcome.state.digression_depth(),
            idle = outcome.state.is_idle(),
            "turn processed"
        );
        Ok(outcome)
    }
}
