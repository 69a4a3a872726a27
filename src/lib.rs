//! Stepform - backend-orchestrated multi-step form controller
//!
//! Drives a questionnaire whose steps are chosen by a remote orchestration
//! endpoint, submits the collected answers as a job and polls that job until
//! a result link is available.
//!
//! Rendering is left to the host: it feeds answer drafts and file picks into
//! a [`StepController`] and displays the notices it receives through a
//! [`Notifier`].

pub mod api;
pub mod capture;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod notify;
pub mod polling;
pub mod prompt;
pub mod types;

pub use capture::AnswerDraft;
pub use config::Config;
pub use controller::{AdvanceOutcome, Clients, FormPhase, StepController};
pub use error::{FormError, PollingError};
pub use notify::{ChannelNotifier, Notice, NoticeKind, Notifier, TracingNotifier};
pub use polling::{JobPoller, PollState};
