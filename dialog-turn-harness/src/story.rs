//! Story regression runner.
//!
//! A story is a scripted conversation: each turn gives the user event and the
//! exact bot lines expected back. Stories are replayed through a
//! [`DialogEngine`] and compared byte-for-byte on [`Command::display_text`].

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dialog_turn_core::types::Span;
use dialog_turn_core::{Command, DialogEngine, DialogEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

pub const STORY_CHANNEL: &str = "story";

// ─── Story file format ────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoryFile {
    pub stories: Vec<Story>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Story {
    pub name: String,
    pub turns: Vec<StoryTurn>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoryTurn {
    pub user: UserEvent,
    #[serde(default)]
    pub bot: Vec<String>,
}

/// What the user "said": a message or an RPC call, plus the recognizer
/// output for it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserEvent {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub rpc: Option<RpcCall>,
    /// Ranked, best first.
    #[serde(default)]
    pub intents: Vec<String>,
    #[serde(default)]
    pub entities: Vec<EntityFact>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RpcCall {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityFact {
    pub name: String,
    pub value: Value,
    #[serde(default)]
    pub start: Option<usize>,
    #[serde(default)]
    pub end: Option<usize>,
}

impl UserEvent {
    pub fn to_event(&self) -> DialogEvent {
        let mut event = match &self.rpc {
            Some(rpc) => DialogEvent::rpc(rpc.method.clone(), rpc.params.clone()),
            None => DialogEvent::message(self.text.clone().unwrap_or_default()),
        };
        let ranked = self.intents.len();
        for (rank, name) in self.intents.iter().enumerate() {
            // Confidence only has to preserve the authored ranking.
            let confidence = (ranked - rank) as f64 / ranked as f64;
            event = event.with_intent(name.clone(), confidence);
        }
        for entity in &self.entities {
            event = match (entity.start, entity.end) {
                (Some(start), Some(end)) => event.with_entity_at(
                    entity.name.clone(),
                    entity.value.clone(),
                    Span { start, end },
                ),
                _ => event.with_entity(entity.name.clone(), entity.value.clone()),
            };
        }
        event
    }
}

pub fn parse_stories(yaml: &str) -> Result<StoryFile> {
    let file: StoryFile = serde_yaml::from_str(yaml)?;
    Ok(file)
}

pub fn load_stories(path: &Path) -> Result<StoryFile> {
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read story file {}", path.display()))?;
    parse_stories(&yaml).with_context(|| format!("Invalid story file {}", path.display()))
}

// ─── Results ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct TurnResult {
    pub index: usize,
    pub passed: bool,
    pub expected: Vec<String>,
    pub actual: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoryResult {
    pub name: String,
    pub passed: bool,
    /// Turns up to and including the first failure.
    pub turns: Vec<TurnResult>,
    pub duration_ms: u64,
}

impl StoryResult {
    pub fn first_failure(&self) -> Option<&TurnResult> {
        self.turns.iter().find(|t| !t.passed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HarnessResult {
    pub tree_version: String,
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub stories: Vec<StoryResult>,
}

impl HarnessResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

// ─── Runner ───────────────────────────────────────────────────

/// Replay one story as its own user. Stops at the first mismatching turn,
/// since later turns would only report the same divergence again.
pub async fn run_story(engine: &DialogEngine, story: &Story, user_id: &str) -> StoryResult {
    let start = Instant::now();
    let mut turns = Vec::with_capacity(story.turns.len());
    let mut passed = true;

    for (index, turn) in story.turns.iter().enumerate() {
        let event = turn.user.to_event();
        let (actual, error) = match engine.process_turn(&event, STORY_CHANNEL, user_id).await {
            Ok(commands) => (commands.iter().map(Command::display_text).collect(), None),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };
        let ok = error.is_none() && actual == turn.bot;
        debug!(story = %story.name, turn = index, ok, "story turn");
        turns.push(TurnResult {
            index,
            passed: ok,
            expected: turn.bot.clone(),
            actual,
            error,
        });
        if !ok {
            passed = false;
            break;
        }
    }

    StoryResult {
        name: story.name.clone(),
        passed,
        turns,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

/// Run every story of a file. Each story gets a fresh user id so stories
/// cannot see each other's state.
pub async fn run_stories(engine: &DialogEngine, file: &StoryFile) -> HarnessResult {
    let started_at = Utc::now();
    let mut stories = Vec::with_capacity(file.stories.len());
    for (index, story) in file.stories.iter().enumerate() {
        let user_id = format!("story-{index}");
        stories.push(run_story(engine, story, &user_id).await);
    }
    let passed = stories.iter().filter(|s| s.passed).count();
    info!(total = stories.len(), passed, "stories replayed");
    HarnessResult {
        tree_version: engine.tree().version().to_string(),
        started_at,
        total: stories.len(),
        passed,
        failed: stories.len() - passed,
        stories,
    }
}
