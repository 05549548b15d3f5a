//! Shared fixtures for engine integration tests.
#![allow(dead_code)]

use dialog_turn_core::authoring::compile_tree_yaml;
use dialog_turn_core::{
    DialogEngine, DialogEvent, EngineConfig, MemorySessionStore, ScriptEvaluator, SessionKey,
    SessionState, SessionStore, TurnError, TurnOutcome,
};
use std::sync::Arc;

pub const CHANNEL: &str = "test";
pub const USER: &str = "u1";

/// One engine, one in-memory store, one conversation.
pub struct Bot {
    pub engine: DialogEngine,
    pub store: Arc<MemorySessionStore>,
}

impl Bot {
    pub fn new(yaml: &str) -> Self {
        Self::with_config(yaml, EngineConfig::default())
    }

    pub fn with_config(yaml: &str, config: EngineConfig) -> Self {
        let tree = compile_tree_yaml(yaml).expect("test tree compiles");
        let store = Arc::new(MemorySessionStore::new());
        let engine = DialogEngine::new(
            Arc::new(tree),
            Arc::new(ScriptEvaluator::new()),
            store.clone(),
            config,
        );
        Self { engine, store }
    }

    /// Process one event and return the emitted commands as display text.
    pub async fn say(&self, event: DialogEvent) -> Vec<String> {
        self.try_say(event).await.expect("turn succeeds")
    }

    pub async fn try_say(&self, event: DialogEvent) -> Result<Vec<String>, TurnError> {
        let commands = self.engine.process_turn(&event, CHANNEL, USER).await?;
        Ok(commands.iter().map(|c| c.display_text()).collect())
    }

    pub async fn traced(&self, event: DialogEvent) -> TurnOutcome {
        self.engine
            .process_turn_traced(&event, CHANNEL, USER)
            .await
            .expect("turn succeeds")
    }

    pub async fn state(&self) -> SessionState {
        self.store.load(&key()).await.unwrap()
    }

    pub async fn seed(&self, state: SessionState) {
        self.store.save(&key(), &state).await.unwrap();
    }
}

pub fn key() -> SessionKey {
    SessionKey::new(CHANNEL, USER)
}

pub fn text(t: &str) -> DialogEvent {
    DialogEvent::message(t)
}

pub fn intent(name: &str) -> DialogEvent {
    DialogEvent::message(name).with_intent(name, 0.9)
}

pub fn lines(expected: &[&str]) -> Vec<String> {
    expected.iter().map(|s| s.to_string()).collect()
}
