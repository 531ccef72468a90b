use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use super::broadcast;
use super::evaluator::Evaluator;
use super::models::{ProgressRecord, Task};
use super::pipeline::{self, VerdictEvent};
use super::protocol::{InboundMessage, OutboundMessage, TestResult};
use super::room::{ConnectionId, Participant, Room};
use crate::error::{HubError, Result};

/// Events a hub buffers before connection actors have to wait for it
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Everything the hub reacts to, in the order it receives them
#[derive(Debug)]
pub enum HubEvent {
    Connect {
        participant: Participant,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
    Message {
        connection_id: ConnectionId,
        participant_id: String,
        message: InboundMessage,
    },
    UpsertTask {
        task: Task,
        reply: oneshot::Sender<bool>,
    },
    ListTasks {
        reply: oneshot::Sender<Vec<Task>>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<ProgressRecord>>,
    },
}

/// Sole owner of the room state. Runs as one task and applies every event
/// to completion before looking at the next.
pub struct Hub {
    name: String,
    room: Room,
    evaluator: Arc<dyn Evaluator>,
    events: mpsc::Receiver<HubEvent>,
    verdict_tx: mpsc::UnboundedSender<VerdictEvent>,
    verdict_rx: mpsc::UnboundedReceiver<VerdictEvent>,
}

impl Hub {
    pub fn new(name: impl Into<String>, room: Room, evaluator: Arc<dyn Evaluator>) -> (Self, HubHandle) {
        Self::with_event_capacity(name, room, evaluator, EVENT_QUEUE_CAPACITY)
    }

    /// Like `new`, with an explicit bound on queued events. Senders wait
    /// once that many events are pending. Verdicts use their own channel
    /// and never count against it.
    pub fn with_event_capacity(
        name: impl Into<String>,
        room: Room,
        evaluator: Arc<dyn Evaluator>,
        capacity: usize,
    ) -> (Self, HubHandle) {
        let (sender, events) = mpsc::channel(capacity);
        let (verdict_tx, verdict_rx) = mpsc::unbounded_channel();

        let hub = Self {
            name: name.into(),
            room,
            evaluator,
            events,
            verdict_tx,
            verdict_rx,
        };
        (hub, HubHandle { sender })
    }

    /// Starts the hub on the current runtime and returns a handle to it.
    pub fn spawn(name: impl Into<String>, room: Room, evaluator: Arc<dyn Evaluator>) -> HubHandle {
        let (hub, handle) = Self::new(name, room, evaluator);
        tokio::spawn(hub.run());
        handle
    }

    /// Runs until every `HubHandle` has been dropped.
    pub async fn run(mut self) {
        tracing::info!(room = %self.name, tasks = self.room.tasks().len(), "Room hub started");

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                Some(verdict) = self.verdict_rx.recv() => self.handle_verdict(verdict),
            }
        }

        tracing::info!(room = %self.name, "Room hub stopped");
    }

    fn handle_event(&mut self, event: HubEvent) {
        match event {
            HubEvent::Connect { participant } => self.handle_connect(participant),
            HubEvent::Disconnect { connection_id } => {
                if self.room.unregister(connection_id).is_some() {
                    broadcast::broadcast_stats(&mut self.room);
                }
            }
            HubEvent::Message {
                connection_id,
                participant_id,
                message,
            } => self.handle_message(connection_id, &participant_id, message),
            HubEvent::UpsertTask { task, reply } => {
                let task_id = task.id.clone();
                let replaced = self.room.upsert_task(task);
                tracing::info!(task_id = %task_id, replaced, "Task published");
                broadcast::broadcast_task_list(&mut self.room);
                let _ = reply.send(replaced);
            }
            HubEvent::ListTasks { reply } => {
                let _ = reply.send(self.room.tasks().to_vec());
            }
            HubEvent::Snapshot { reply } => {
                let _ = reply.send(self.room.progress_snapshot());
            }
        }
    }

    fn handle_connect(&mut self, participant: Participant) {
        let participant_id = participant.id.clone();
        let connection_id = self.room.register(participant);

        let tasks = broadcast::task_list(&self.room);
        if broadcast::send_to(&mut self.room, connection_id, &tasks) {
            if let Some(record) = self.room.progress(&participant_id).cloned() {
                broadcast::send_to(&mut self.room, connection_id, &OutboundMessage::UserStats(record));
            }
        }
        broadcast::broadcast_stats(&mut self.room);
    }

    fn handle_message(&mut self, connection_id: ConnectionId, participant_id: &str, message: InboundMessage) {
        tracing::debug!(
            participant_id = %participant_id,
            connection_id = %connection_id,
            kind = message.kind(),
            "Inbound message"
        );

        let now = chrono::Utc::now().timestamp_millis();
        let changed = match message {
            InboundMessage::CodeUpdate(code) => self.room.update_code(participant_id, &code, now),
            InboundMessage::SelectTask(task_id) => self.room.select_task(participant_id, &task_id),
            InboundMessage::CheatWarning(pasted) => {
                tracing::warn!(participant_id = %participant_id, "Paste flagged for review");
                self.room.flag(participant_id, &pasted)
            }
            InboundMessage::Submit(code) => self.handle_submit(connection_id, participant_id, &code, now),
        };

        if changed {
            broadcast::broadcast_stats(&mut self.room);
        }
    }

    fn handle_submit(&mut self, connection_id: ConnectionId, participant_id: &str, code: &str, now: i64) -> bool {
        let Some(submission) = self.room.begin_submission(participant_id, code, now) else {
            tracing::debug!(
                participant_id = %participant_id,
                "Submission dropped: no current task in catalog"
            );
            return false;
        };

        pipeline::spawn(
            self.evaluator.clone(),
            self.verdict_tx.clone(),
            connection_id,
            participant_id.to_string(),
            submission,
        );
        true
    }

    fn handle_verdict(&mut self, event: VerdictEvent) {
        let VerdictEvent {
            connection_id,
            participant_id,
            task_id,
            verdict,
        } = event;

        let result = OutboundMessage::TestResult(TestResult {
            task_id: task_id.clone(),
            output: verdict.output,
            success: verdict.success,
            passed: verdict.passed,
        });
        if !broadcast::send_to(&mut self.room, connection_id, &result) {
            tracing::debug!(
                participant_id = %participant_id,
                connection_id = %connection_id,
                "Submitter no longer connected, test result not delivered"
            );
        }

        if let Some(status) = self.room.apply_verdict(&participant_id, &task_id, verdict.success) {
            tracing::info!(
                participant_id = %participant_id,
                task_id = %task_id,
                status = ?status,
                "Verdict applied"
            );
        }
        broadcast::broadcast_stats(&mut self.room);
    }
}

/// Cloneable address of a running hub
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubEvent>,
}

impl HubHandle {
    /// Waits while the hub's event queue is full.
    async fn send(&self, event: HubEvent) -> Result<()> {
        self.sender.send(event).await.map_err(|_| HubError::HubClosed)
    }

    pub async fn connect(&self, participant: Participant) -> Result<()> {
        self.send(HubEvent::Connect { participant }).await
    }

    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<()> {
        self.send(HubEvent::Disconnect { connection_id }).await
    }

    pub async fn dispatch(
        &self,
        connection_id: ConnectionId,
        participant_id: impl Into<String>,
        message: InboundMessage,
    ) -> Result<()> {
        self.send(HubEvent::Message {
            connection_id,
            participant_id: participant_id.into(),
            message,
        })
        .await
    }

    /// Publishes a task. Resolves to true when an existing task was replaced.
    pub async fn upsert_task(&self, task: Task) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(HubEvent::UpsertTask { task, reply }).await?;
        rx.await.map_err(|_| HubError::HubClosed)
    }

    /// Full catalog including test cases. Admin use only.
    pub async fn tasks(&self) -> Result<Vec<Task>> {
        let (reply, rx) = oneshot::channel();
        self.send(HubEvent::ListTasks { reply }).await?;
        rx.await.map_err(|_| HubError::HubClosed)
    }

    pub async fn snapshot(&self) -> Result<Vec<ProgressRecord>> {
        let (reply, rx) = oneshot::channel();
        self.send(HubEvent::Snapshot { reply }).await?;
        rx.await.map_err(|_| HubError::HubClosed)
    }
}
