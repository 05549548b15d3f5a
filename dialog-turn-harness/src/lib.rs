//! Replays scripted conversations ("stories") against a compiled dialog tree
//! and reports the first turn where the bot's lines diverge.

pub mod story;

pub use story::{
    load_stories, parse_stories, run_stories, run_story, HarnessResult, Story, StoryFile,
    StoryResult, StoryTurn, TurnResult, UserEvent,
};
