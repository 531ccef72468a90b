use serde::{Deserialize, Serialize};

use super::models::{ProgressRecord, SanitizedTask};
use crate::error::{HubError, Result};

/// Messages a student's socket sends. Envelope is `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum InboundMessage {
    Submit(String),
    CodeUpdate(String),
    SelectTask(String),
    CheatWarning(String),
}

impl InboundMessage {
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| HubError::protocol(e.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::Submit(_) => "submit",
            InboundMessage::CodeUpdate(_) => "code_update",
            InboundMessage::SelectTask(_) => "select_task",
            InboundMessage::CheatWarning(_) => "cheat_warning",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub task_id: String,
    pub output: String,
    pub success: bool,
    pub passed: u32,
}

/// Messages the hub delivers to participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum OutboundMessage {
    TaskList(Vec<SanitizedTask>),
    UserStats(ProgressRecord),
    GlobalStats(Vec<ProgressRecord>),
    TestResult(TestResult),
}

impl OutboundMessage {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::TaskList(_) => "task_list",
            OutboundMessage::UserStats(_) => "user_stats",
            OutboundMessage::GlobalStats(_) => "global_stats",
            OutboundMessage::TestResult(_) => "test_result",
        }
    }
}
