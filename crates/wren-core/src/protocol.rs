use serde::{Deserialize, Serialize};

use crate::engine::{EngineCommand, EngineEvent};

/// One framed line of the host protocol: an id plus a command or event.
///
/// Command ids are echoed back in `CommandResult` events, which is how
/// responses are correlated to in-flight requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineMessage {
    pub id: String,
    #[serde(flatten)]
    pub content: EngineMessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EngineMessageContent {
    Command(EngineCommand),
    Event(EngineEvent),
}

impl EngineMessage {
    pub fn command(command: EngineCommand) -> Self {
        Self {
            id: generate_id(),
            content: EngineMessageContent::Command(command),
        }
    }

    pub fn event(event: EngineEvent) -> Self {
        Self {
            id: generate_id(),
            content: EngineMessageContent::Event(event),
        }
    }

    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_default() + "\n"
    }

    pub fn from_line(line: &str) -> Option<Self> {
        serde_json::from_str(line.trim()).ok()
    }
}

fn generate_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{:x}", nanos)
}
