pub mod broadcast;
pub mod evaluator;
mod hub;
pub mod models;
mod pipeline;
pub mod protocol;
mod room;

pub use evaluator::{EvaluationRequest, Evaluator, SandboxEvaluator, Verdict};
pub use hub::{Hub, HubEvent, HubHandle};
pub use models::{CodeSnapshot, ProgressRecord, SanitizedTask, Status, Task, TestCase};
pub use protocol::{InboundMessage, OutboundMessage, TestResult};
pub use room::{ConnectionId, Participant, PendingSubmission, Room};
