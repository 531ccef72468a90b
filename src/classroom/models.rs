use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One check run against a submission. Either an input/expected pair or an
/// assertion script in `code`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub expected: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub starter_code: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

/// What participants see of a task. Has no test case field at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizedTask {
    pub id: String,
    pub title: String,
    pub description: String,
    pub starter_code: String,
}

impl Task {
    pub fn sanitize(&self) -> SanitizedTask {
        SanitizedTask {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            starter_code: self.starter_code.clone(),
        }
    }

    /// The task every room starts with.
    pub fn hello_world() -> Self {
        Task {
            id: "1".to_string(),
            title: "Hello, Python".to_string(),
            description: "Write a function hello() that returns the string 'Hello World'"
                .to_string(),
            starter_code: "def hello():\n    return ''".to_string(),
            test_cases: vec![TestCase {
                code: "assert hello() == 'Hello World', 'Expected Hello World'".to_string(),
                ..Default::default()
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSnapshot {
    /// Unix time in milliseconds
    pub ts: i64,
    pub code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Idle,
    Typing,
    Testing,
    Solved,
    Failed,
    Flagged,
}

impl Default for Status {
    fn default() -> Self {
        Self::Idle
    }
}

/// Per-participant progress. Outlives the participant's connection so a
/// reconnect under the same name picks up where it left off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub id: String,
    pub name: String,
    pub total_score: u32,
    pub current_task_id: Option<String>,
    pub solved_tasks: BTreeSet<String>,
    pub last_code: String,
    pub status: Status,
    pub paste_content: Option<String>,
    pub history: Vec<CodeSnapshot>,
}

impl ProgressRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            total_score: 0,
            current_task_id: None,
            solved_tasks: BTreeSet::new(),
            last_code: String::new(),
            status: Status::Idle,
            paste_content: None,
            history: Vec::new(),
        }
    }

    /// Appends a snapshot unless it repeats the previous one.
    /// Returns whether anything was appended.
    pub fn record_snapshot(&mut self, ts: i64, code: &str) -> bool {
        if self.history.last().is_some_and(|last| last.code == code) {
            return false;
        }
        self.history.push(CodeSnapshot {
            ts,
            code: code.to_string(),
        });
        true
    }

    /// Marks `task_id` solved. Score moves only the first time.
    pub fn mark_solved(&mut self, task_id: &str) -> bool {
        self.status = Status::Solved;
        let first_time = self.solved_tasks.insert(task_id.to_string());
        if first_time {
            self.total_score += 1;
        }
        first_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status() {
        assert_eq!(Status::default(), Status::Idle);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&Status::Flagged).unwrap();
        assert_eq!(json, "\"Flagged\"");

        let status: Status = serde_json::from_str("\"Typing\"").unwrap();
        assert_eq!(status, Status::Typing);
    }

    #[test]
    fn test_sanitize_strips_test_cases() {
        let task = Task::hello_world();
        assert_eq!(task.test_cases.len(), 1);

        let value = serde_json::to_value(task.sanitize()).unwrap();
        assert_eq!(value["id"], "1");
        assert!(value.get("test_cases").is_none());
        assert!(!value.to_string().contains("assert hello()"));
    }

    #[test]
    fn test_task_deserializes_without_optional_fields() {
        let task: Task = serde_json::from_str(r#"{"id":"2","title":"Sum"}"#).unwrap();
        assert_eq!(task.id, "2");
        assert!(task.description.is_empty());
        assert!(task.test_cases.is_empty());
    }

    #[test]
    fn test_snapshot_skips_consecutive_duplicates() {
        let mut record = ProgressRecord::new("alex", "Alex");
        assert!(record.record_snapshot(1, "a"));
        assert!(!record.record_snapshot(2, "a"));
        assert!(record.record_snapshot(3, "ab"));
        assert!(record.record_snapshot(4, "a"));

        let codes: Vec<&str> = record.history.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(codes, vec!["a", "ab", "a"]);
    }

    #[test]
    fn test_mark_solved_scores_once() {
        let mut record = ProgressRecord::new("alex", "Alex");
        assert!(record.mark_solved("1"));
        assert!(!record.mark_solved("1"));
        assert_eq!(record.total_score, 1);
        assert_eq!(record.status, Status::Solved);

        assert!(record.mark_solved("2"));
        assert_eq!(record.total_score, 2);
    }

    #[test]
    fn test_progress_record_wire_shape() {
        let record = ProgressRecord::new("Alex", "Alex");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["total_score"], 0);
        assert_eq!(value["status"], "Idle");
        assert!(value["history"].as_array().unwrap().is_empty());
        assert!(value["solved_tasks"].as_array().unwrap().is_empty());
    }
}
