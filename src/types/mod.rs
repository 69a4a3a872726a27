//! Data model shared by the controller, the clients and the poller.
//!
//! Wire-facing types derive `ts_rs::TS` so the browser host can consume
//! generated TypeScript definitions.

mod answer;
mod job;
mod session;
mod step;

pub use answer::{
    AnswerHistory, AnswerPayload, AnswerRecord, AnswerSubmission, FileMeta, HistoryEntry,
    RangeSelection, SelectedFile,
};
pub use job::{
    FinalJobData, JobField, JobHandle, JobStatus, PollAttemptState, SubmissionReceipt,
};
pub use session::{fallback_session_id, generate_session_id, IntroResponse, Session};
pub use step::{
    ChoiceOption, Progress, QuestionType, StepDescriptor, StepOutcome, StepResponse, TypeConfig,
    COMPLETION_MESSAGE,
};
