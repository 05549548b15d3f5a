use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Output commands ──────────────────────────────────────────

/// An output command produced by a rendered template.
///
/// The engine never interprets commands; it passes them through to the
/// transport in emission order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Command {
    Text {
        text: String,
    },
    Image {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    /// Channel-specific payload the engine knows nothing about.
    Custom {
        name: String,
        #[serde(default)]
        payload: Value,
    },
}

impl Command {
    pub fn text(text: impl Into<String>) -> Self {
        Command::Text { text: text.into() }
    }

    /// Plain-text rendering used by story comparisons and logs.
    pub fn display_text(&self) -> String {
        match self {
            Command::Text { text } => text.clone(),
            Command::Image { url, caption } => match caption {
                Some(c) => format!("[image {url} \"{c}\"]"),
                None => format!("[image {url}]"),
            },
            Command::Custom { name, payload } => format!("[{name} {payload}]"),
        }
    }
}

// ─── Incoming event facts ─────────────────────────────────────

/// Byte range of an entity occurrence in the source utterance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A recognized intent with its confidence score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecognizedIntent {
    pub name: String,
    #[serde(default = "full_confidence")]
    pub confidence: f64,
}

fn full_confidence() -> f64 {
    1.0
}

/// One occurrence of a recognized entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecognizedEntity {
    pub name: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

/// What the user sent: exactly one of a message or an RPC request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPayload {
    Message {
        text: String,
    },
    Rpc {
        method: String,
        #[serde(default)]
        params: Value,
    },
}

/// One incoming user event with its pre-computed recognition facts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DialogEvent {
    pub payload: EventPayload,
    /// Ranked, best first.
    #[serde(default)]
    pub intents: Vec<RecognizedIntent>,
    #[serde(default)]
    pub entities: Vec<RecognizedEntity>,
    pub received_at: DateTime<Utc>,
}

impl DialogEvent {
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            payload: EventPayload::Message { text: text.into() },
            intents: Vec::new(),
            entities: Vec::new(),
            received_at: Utc::now(),
        }
    }

    pub fn rpc(method: impl Into<String>, params: Value) -> Self {
        Self {
            payload: EventPayload::Rpc {
                method: method.into(),
                params,
            },
            intents: Vec::new(),
            entities: Vec::new(),
            received_at: Utc::now(),
        }
    }

    /// Add an intent; intents are kept sorted by descending confidence.
    pub fn with_intent(mut self, name: impl Into<String>, confidence: f64) -> Self {
        self.intents.push(RecognizedIntent {
            name: name.into(),
            confidence,
        });
        self.intents.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        self
    }

    pub fn with_entity(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entities.push(RecognizedEntity {
            name: name.into(),
            value: value.into(),
            span: None,
        });
        self
    }

    pub fn with_entity_at(
        mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
        span: Span,
    ) -> Self {
        self.entities.push(RecognizedEntity {
            name: name.into(),
            value: value.into(),
            span: Some(span),
        });
        self
    }

    pub fn top_intent(&self) -> Option<&RecognizedIntent> {
        self.intents.first()
    }

    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Message { text } => Some(text),
            EventPayload::Rpc { .. } => None,
        }
    }

    /// Index and record of the first occurrence of an entity.
    pub fn first_entity(&self, name: &str) -> Option<(usize, &RecognizedEntity)> {
        self.entities.iter().enumerate().find(|(_, e)| e.name == name)
    }

    pub fn entities_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = (usize, &'a RecognizedEntity)> + 'a {
        self.entities
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.name == name)
    }
}
