use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use super::models::{ProgressRecord, SanitizedTask, Status, Task, TestCase};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one live socket. Two sockets opened under the same display
/// name share a participant id but never a connection id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A live student connection as the room sees it: identity plus the sending
/// half of its bounded outbound queue.
#[derive(Debug)]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub id: String,
    pub name: String,
    pub(crate) sender: mpsc::Sender<String>,
}

impl Participant {
    /// The participant id is the display name.
    pub fn new(name: impl Into<String>, sender: mpsc::Sender<String>) -> Self {
        let name = name.into();
        Self {
            connection_id: ConnectionId::next(),
            id: name.clone(),
            name,
            sender,
        }
    }
}

/// Work handed to the evaluator after a submission was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSubmission {
    pub task_id: String,
    pub code: String,
    pub tests: Vec<TestCase>,
}

/// All shared session state. Only the hub task ever touches it.
#[derive(Debug, Default)]
pub struct Room {
    participants: BTreeMap<ConnectionId, Participant>,
    progress: HashMap<String, ProgressRecord>,
    tasks: Vec<Task>,
}

impl Room {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            participants: BTreeMap::new(),
            progress: HashMap::new(),
            tasks,
        }
    }

    pub fn with_seed_catalog() -> Self {
        Self::new(vec![Task::hello_world()])
    }

    /// Adds a live participant. Creates its progress record on first sight,
    /// otherwise only refreshes the display name.
    pub fn register(&mut self, participant: Participant) -> ConnectionId {
        let connection_id = participant.connection_id;

        self.progress
            .entry(participant.id.clone())
            .and_modify(|record| record.name = participant.name.clone())
            .or_insert_with(|| ProgressRecord::new(participant.id.clone(), participant.name.clone()));

        let participant_id = participant.id.clone();
        self.participants.insert(connection_id, participant);
        tracing::info!(
            participant_id = %participant_id,
            connection_id = %connection_id,
            live = self.live_count(),
            "Participant registered"
        );
        connection_id
    }

    /// Removes a live participant. Its progress record stays.
    pub fn unregister(&mut self, connection_id: ConnectionId) -> Option<Participant> {
        let removed = self.participants.remove(&connection_id);
        if let Some(participant) = &removed {
            tracing::info!(
                participant_id = %participant.id,
                connection_id = %connection_id,
                live = self.live_count(),
                "Participant unregistered"
            );
        }
        removed
    }

    pub fn participant(&self, connection_id: ConnectionId) -> Option<&Participant> {
        self.participants.get(&connection_id)
    }

    pub fn participants(&self) -> &BTreeMap<ConnectionId, Participant> {
        &self.participants
    }

    pub fn live_count(&self) -> usize {
        self.participants.len()
    }

    pub fn progress(&self, participant_id: &str) -> Option<&ProgressRecord> {
        self.progress.get(participant_id)
    }

    /// Every progress record, ordered by participant id.
    pub fn progress_snapshot(&self) -> Vec<ProgressRecord> {
        let mut records: Vec<ProgressRecord> = self.progress.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn sanitized_tasks(&self) -> Vec<SanitizedTask> {
        self.tasks.iter().map(Task::sanitize).collect()
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    /// Replaces the task with the same id, or appends. Returns true on replace.
    pub fn upsert_task(&mut self, task: Task) -> bool {
        match self.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => {
                *existing = task;
                true
            }
            None => {
                self.tasks.push(task);
                false
            }
        }
    }

    /// Live-typing telemetry. `Solved` and `Flagged` are sticky here.
    pub fn update_code(&mut self, participant_id: &str, code: &str, ts: i64) -> bool {
        let Some(record) = self.progress.get_mut(participant_id) else {
            return false;
        };

        record.last_code = code.to_string();
        if !matches!(record.status, Status::Solved | Status::Flagged) {
            record.status = Status::Typing;
        }
        record.record_snapshot(ts, code);
        true
    }

    /// Switching task acknowledges an outstanding paste flag.
    pub fn select_task(&mut self, participant_id: &str, task_id: &str) -> bool {
        let Some(record) = self.progress.get_mut(participant_id) else {
            return false;
        };

        record.current_task_id = Some(task_id.to_string());
        if record.status == Status::Flagged {
            record.status = Status::Idle;
        }
        true
    }

    pub fn flag(&mut self, participant_id: &str, pasted: &str) -> bool {
        let Some(record) = self.progress.get_mut(participant_id) else {
            return false;
        };

        record.status = Status::Flagged;
        record.paste_content = Some(pasted.to_string());
        true
    }

    /// Records the submitted code and moves the participant to `Testing`.
    /// `None` when there is no selected task or it is no longer in the
    /// catalog; the submission is then dropped.
    pub fn begin_submission(
        &mut self,
        participant_id: &str,
        code: &str,
        ts: i64,
    ) -> Option<PendingSubmission> {
        let task_id = self.progress.get(participant_id)?.current_task_id.clone()?;
        let tests = self.task(&task_id)?.test_cases.clone();

        let record = self.progress.get_mut(participant_id)?;
        if record.status != Status::Flagged {
            record.status = Status::Testing;
        }
        record.last_code = code.to_string();
        record.record_snapshot(ts, code);

        Some(PendingSubmission {
            task_id,
            code: code.to_string(),
            tests,
        })
    }

    /// Applies an evaluator verdict. Returns the resulting status.
    pub fn apply_verdict(
        &mut self,
        participant_id: &str,
        task_id: &str,
        success: bool,
    ) -> Option<Status> {
        let record = self.progress.get_mut(participant_id)?;

        if success {
            if record.mark_solved(task_id) {
                tracing::info!(
                    participant_id = %participant_id,
                    task_id = %task_id,
                    total_score = record.total_score,
                    "Task solved for the first time"
                );
            }
        } else if record.status != Status::Flagged {
            record.status = Status::Failed;
        }
        Some(record.status)
    }
}
