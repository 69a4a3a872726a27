//! The step controller: drives the form from the intro through the final
//! submission and job polling.
//!
//! All operations take `&self`. A single in-flight flag guards the remote
//! exchange; a call that arrives while another is outstanding returns
//! [`AdvanceOutcome::Ignored`] instead of an error. Form state sits behind a
//! `RwLock` that is never held across a network call.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::api::{
    FinalSubmissionClient, HttpStatusClient, HttpStepClient, HttpSubmissionClient,
    HttpUploadTransport, JobStatusClient, RemoteStepClient, StepRequest, UploadTransport,
};
use crate::capture::{capture_answer, validate_file, AnswerDraft};
use crate::config::Config;
use crate::error::{FormError, PollingError};
use crate::notify::{NoticeKind, Notifier, TracingNotifier};
use crate::polling::{JobPoller, PollState};
use crate::prompt::PromptBuilder;
use crate::types::{
    AnswerHistory, AnswerRecord, AnswerSubmission, HistoryEntry, IntroResponse, JobHandle,
    QuestionType, SelectedFile, Session, StepDescriptor, StepOutcome,
};

const SUBMISSION_RECEIVED: &str = "Submission received. Preparing your presentation...";
const SUBMITTED: &str = "Form submitted successfully! Thank you.";
const RESULT_READY: &str = "Presentation ready! Redirecting...";

/// Characters `encodeURIComponent` leaves alone
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Remote collaborators of the controller
#[derive(Clone)]
pub struct Clients {
    pub step: Arc<dyn RemoteStepClient>,
    pub submission: Arc<dyn FinalSubmissionClient>,
    pub upload: Arc<dyn UploadTransport>,
    pub status: Arc<dyn JobStatusClient>,
    pub notifier: Arc<dyn Notifier>,
}

impl Clients {
    /// HTTP clients for the configured endpoints, notices go to the log
    pub fn from_config(config: &Config) -> Result<Self, FormError> {
        Ok(Self {
            step: Arc::new(HttpStepClient::from_config(config)?),
            submission: Arc::new(HttpSubmissionClient::from_config(config)?),
            upload: Arc::new(HttpUploadTransport::from_config(config)?),
            status: Arc::new(HttpStatusClient::from_config(config)?),
            notifier: Arc::new(TracingNotifier),
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

/// Where the form is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPhase {
    /// Waiting for the intro answers
    Intro,
    /// Presenting backend steps
    Stepping,
    /// Backend reported completion; final submission in progress
    Completing,
    /// Final submission accepted; waiting for the job
    Polling,
    /// Terminal success. `redirect_url` is set when a job result exists.
    Completed { redirect_url: Option<String> },
    /// Terminal failure of the completion protocol
    Failed { message: String },
}

impl FormPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FormPhase::Completed { .. } | FormPhase::Failed { .. })
    }
}

/// Result of a submit or advance request
#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    /// Another exchange was in flight; nothing was sent
    Ignored,
    /// The backend presented this step
    Step(StepDescriptor),
    /// The form finished
    Finished { redirect_url: Option<String> },
}

#[derive(Debug)]
struct FormState {
    phase: FormPhase,
    session: Option<Session>,
    intro: Option<IntroResponse>,
    current_step: Option<StepDescriptor>,
    history: AnswerHistory,
    draft: Option<AnswerDraft>,
    selected_file: Option<SelectedFile>,
    used_upload_urls: HashSet<String>,
}

impl FormState {
    fn new() -> Self {
        Self {
            phase: FormPhase::Intro,
            session: None,
            intro: None,
            current_step: None,
            history: AnswerHistory::new(),
            draft: None,
            selected_file: None,
            used_upload_urls: HashSet::new(),
        }
    }
}

#[derive(Default)]
struct AutoSubmit {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

/// Resets the in-flight flag when the exchange ends, however it ends
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct StepController {
    config: Config,
    clients: Clients,
    prompt: PromptBuilder,
    poller: JobPoller,
    state: RwLock<FormState>,
    in_flight: AtomicBool,
    auto_submit: Mutex<AutoSubmit>,
}

impl StepController {
    pub fn new(config: Config, clients: Clients) -> Result<Self, FormError> {
        let prompt = PromptBuilder::new(&config.prompt)?;
        let poller = JobPoller::new(clients.status.clone(), &config.polling);
        Ok(Self {
            config,
            clients,
            prompt,
            poller,
            state: RwLock::new(FormState::new()),
            in_flight: AtomicBool::new(false),
            auto_submit: Mutex::new(AutoSubmit::default()),
        })
    }

    /// Controller talking to the configured HTTP endpoints
    pub fn from_config(config: Config) -> Result<Self, FormError> {
        let clients = Clients::from_config(&config)?;
        Self::new(config, clients)
    }

    /// Override the wait between job status checks
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poller = self.poller.with_interval(interval);
        self
    }

    pub async fn phase(&self) -> FormPhase {
        self.state.read().await.phase.clone()
    }

    pub async fn session(&self) -> Option<Session> {
        self.state.read().await.session.clone()
    }

    pub async fn current_step(&self) -> Option<StepDescriptor> {
        self.state.read().await.current_step.clone()
    }

    pub async fn history(&self) -> AnswerHistory {
        self.state.read().await.history.clone()
    }

    pub async fn selected_file(&self) -> Option<SelectedFile> {
        self.state.read().await.selected_file.clone()
    }

    pub async fn poll_state(&self) -> PollState {
        self.poller.state().await
    }

    /// Whether a remote exchange is outstanding
    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Validate the intro, start the session and fetch the first step.
    ///
    /// The session id is generated on the first accepted intro and kept for
    /// any retry.
    #[instrument(skip(self, company))]
    pub async fn submit_intro(
        &self,
        sector: &str,
        company: Option<&str>,
    ) -> Result<AdvanceOutcome, FormError> {
        let intro = match IntroResponse::new(sector, company) {
            Ok(intro) => intro,
            Err(err) => return Err(self.report(err)),
        };

        let Some(_in_flight) = InFlight::acquire(&self.in_flight) else {
            debug!("Intro submission ignored, request in flight");
            return Ok(AdvanceOutcome::Ignored);
        };

        {
            let mut state = self.state.write().await;
            if state.phase != FormPhase::Intro {
                return Err(self.report(FormError::invalid_state("intro already submitted")));
            }
            if state.session.is_none() {
                let session = Session::new(
                    self.config.identity.user_id.clone(),
                    &self.config.form.process,
                );
                info!(session_id = %session.session_id, "Session started");
                state.session = Some(session);
            }
            state.intro = Some(intro);
        }

        self.advance_in_flight(None).await
    }

    /// Send `answer` (if any) with the session context and apply the reply.
    ///
    /// On failure the current step stays in place so the user can retry.
    pub async fn advance(
        &self,
        answer: Option<AnswerSubmission>,
    ) -> Result<AdvanceOutcome, FormError> {
        let Some(_in_flight) = InFlight::acquire(&self.in_flight) else {
            debug!("Advance ignored, request in flight");
            return Ok(AdvanceOutcome::Ignored);
        };
        self.advance_in_flight(answer).await
    }

    /// Replace the answer draft for the current step
    pub async fn set_draft(&self, draft: AnswerDraft) {
        self.state.write().await.draft = Some(draft);
    }

    /// Record a choice or range selection and schedule its auto-submit.
    pub async fn select_option(self: &Arc<Self>, index: usize) -> Result<(), FormError> {
        let (draft, question_type) = {
            let state = self.state.read().await;
            let step = state
                .current_step
                .as_ref()
                .ok_or_else(|| FormError::invalid_state("no step is presented"))?;
            let draft = match step.question_type {
                QuestionType::MultipleChoice => AnswerDraft::choice(&step.type_config, index),
                QuestionType::Range => AnswerDraft::range(&step.type_config, index),
                _ => None,
            };
            (draft, step.question_type.clone())
        };

        let draft = draft.ok_or_else(|| {
            FormError::validation(format!(
                "No option {index} for {question_type} question"
            ))
        })?;
        self.set_draft(draft).await;

        if let Some(delay) = self.config.auto_submit_delay(&question_type) {
            self.schedule_auto_submit(delay);
        }
        Ok(())
    }

    /// Submit the current step after `delay`, replacing any pending auto-submit.
    pub fn schedule_auto_submit(self: &Arc<Self>, delay: Duration) {
        let mut auto = self.lock_auto_submit();
        auto.generation += 1;
        if let Some(handle) = auto.handle.take() {
            handle.abort();
        }

        let generation = auto.generation;
        let controller = Arc::clone(self);
        auto.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                // Past this point the submission runs to completion
                let mut auto = controller.lock_auto_submit();
                if auto.generation != generation {
                    return;
                }
                auto.handle = None;
            }
            debug!("Auto-submitting current step");
            if let Err(err) = controller.submit_step().await {
                debug!(error = %err, "Auto-submit did not advance");
            }
        }));
    }

    /// Drop a pending auto-submit that has not fired yet
    pub fn cancel_auto_submit(&self) {
        let mut auto = self.lock_auto_submit();
        auto.generation += 1;
        if let Some(handle) = auto.handle.take() {
            handle.abort();
        }
    }

    fn lock_auto_submit(&self) -> std::sync::MutexGuard<'_, AutoSubmit> {
        self.auto_submit
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Validate a picked file against the current step and keep it.
    pub async fn select_file(&self, file: SelectedFile) -> Result<(), FormError> {
        let mut state = self.state.write().await;
        let step = state
            .current_step
            .as_ref()
            .ok_or_else(|| FormError::invalid_state("no step is presented"))?;
        let default_limit = self.config.max_file_size_bytes();
        if let Err(err) = validate_file(&file, &step.type_config, default_limit) {
            return Err(self.report(err));
        }
        debug!(file = ?file, "File selected");
        state.selected_file = Some(file);
        Ok(())
    }

    pub async fn remove_file(&self) {
        self.state.write().await.selected_file = None;
    }

    /// Validate the current input, upload the file for file steps, then
    /// advance with the captured answer.
    pub async fn submit_current_step(&self) -> Result<AdvanceOutcome, FormError> {
        self.cancel_auto_submit();
        self.submit_step().await
    }

    #[instrument(skip(self))]
    async fn submit_step(&self) -> Result<AdvanceOutcome, FormError> {
        let Some(_in_flight) = InFlight::acquire(&self.in_flight) else {
            debug!("Submission ignored, request in flight");
            return Ok(AdvanceOutcome::Ignored);
        };

        let (step, draft, file) = {
            let state = self.state.read().await;
            if state.phase != FormPhase::Stepping {
                return Err(self.report(FormError::invalid_state(format!(
                    "cannot submit a step while {:?}",
                    state.phase
                ))));
            }
            let Some(step) = state.current_step.clone() else {
                return Err(self.report(FormError::invalid_state("no step is presented")));
            };
            (step, state.draft.clone(), state.selected_file.clone())
        };

        let answer = match capture_answer(&step, draft.as_ref(), file.as_ref()) {
            Ok(answer) => answer,
            Err(err) => return Err(self.report(err)),
        };

        if step.question_type == QuestionType::FileUpload {
            if let Some(file) = &file {
                self.upload_file(&step, file).await?;
            }
        }

        self.advance_in_flight(Some(answer)).await
    }

    async fn upload_file(
        &self,
        step: &StepDescriptor,
        file: &SelectedFile,
    ) -> Result<(), FormError> {
        let Some(url) = step.type_config.upload_url.clone() else {
            return Err(self.report(FormError::upload("step has no upload destination")));
        };

        if self.state.read().await.used_upload_urls.contains(&url) {
            warn!("Re-uploading to a destination that was already used");
        }

        if let Err(err) = self.clients.upload.upload(file, &url).await {
            return Err(self.report(err));
        }

        self.state.write().await.used_upload_urls.insert(url);
        Ok(())
    }

    /// The step exchange. Caller holds the in-flight flag.
    async fn advance_in_flight(
        &self,
        answer: Option<AnswerSubmission>,
    ) -> Result<AdvanceOutcome, FormError> {
        let (request, record) = {
            let state = self.state.read().await;
            let (Some(session), Some(intro)) = (&state.session, &state.intro) else {
                return Err(self.report(FormError::invalid_state("intro not submitted")));
            };
            if !matches!(state.phase, FormPhase::Intro | FormPhase::Stepping) {
                return Err(self.report(FormError::invalid_state(format!(
                    "cannot advance while {:?}",
                    state.phase
                ))));
            }

            let record = answer.as_ref().map(|answer| AnswerRecord {
                step_index: state
                    .current_step
                    .as_ref()
                    .and_then(|step| step.step_index)
                    .unwrap_or_else(|| state.history.next_step_index()),
                question_text: answer.question.clone(),
                payload: answer.payload.clone(),
            });
            (StepRequest::new(session, intro, answer), record)
        };

        let outcome = match self.clients.step.exchange(&request).await {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.report(err)),
        };

        let mut state = self.state.write().await;
        if let Some(record) = record {
            state.history.push(record);
        }

        match outcome {
            StepOutcome::Step(step) => {
                info!(
                    step_index = ?step.step_index,
                    question_type = %step.question_type,
                    "Presenting step"
                );
                state.phase = FormPhase::Stepping;
                state.current_step = Some(step.clone());
                state.selected_file = None;
                state.draft = None;
                Ok(AdvanceOutcome::Step(step))
            }
            StepOutcome::Complete { history } => {
                state.phase = FormPhase::Completing;
                state.draft = None;
                state.selected_file = None;
                drop(state);
                self.complete(history).await
            }
        }
    }

    /// Final submission followed by job polling when a job was created.
    #[instrument(skip(self, backend_history), fields(history_len = backend_history.len()))]
    async fn complete(
        &self,
        backend_history: Vec<HistoryEntry>,
    ) -> Result<AdvanceOutcome, FormError> {
        let job_data = {
            let state = self.state.read().await;
            let (Some(session), Some(intro)) = (&state.session, &state.intro) else {
                return Err(self.report(FormError::invalid_state("intro not submitted")));
            };

            let history = if backend_history.is_empty() {
                info!(
                    local_entries = state.history.len(),
                    "Backend returned no history, using local answers"
                );
                state.history.to_entries()
            } else {
                backend_history
            };

            match self.prompt.build_final_job_data(session, intro, &history) {
                Ok(data) => data,
                Err(err) => {
                    drop(state);
                    return Err(self.fail(err).await);
                }
            }
        };

        let receipt = match self.clients.submission.submit(&job_data).await {
            Ok(receipt) => receipt,
            Err(err) => return Err(self.fail(err).await),
        };

        let handle = match (receipt.job_id, job_data.user_id) {
            (Some(job_id), Some(user_id)) => JobHandle { job_id, user_id },
            _ => {
                info!("No job to track, form complete");
                self.clients.notifier.notify(SUBMITTED, NoticeKind::Success);
                self.set_phase(FormPhase::Completed { redirect_url: None })
                    .await;
                return Ok(AdvanceOutcome::Finished { redirect_url: None });
            }
        };

        self.clients
            .notifier
            .notify(SUBMISSION_RECEIVED, NoticeKind::Info);
        self.set_phase(FormPhase::Polling).await;

        match self.poller.poll(handle).await {
            Ok(link) => {
                let redirect_url = match self.redirect_url(&link) {
                    Ok(url) => url,
                    Err(err) => return Err(self.fail(err).await),
                };
                info!(%redirect_url, "Job result ready");
                self.clients.notifier.notify(RESULT_READY, NoticeKind::Success);
                self.set_phase(FormPhase::Completed {
                    redirect_url: Some(redirect_url.clone()),
                })
                .await;
                Ok(AdvanceOutcome::Finished {
                    redirect_url: Some(redirect_url),
                })
            }
            // The form owns a single run, so only `cancel_polling` supersedes it
            Err(PollingError::Superseded) => {
                info!("Job polling cancelled");
                Err(self.fail(PollingError::Cancelled.into()).await)
            }
            Err(err) => Err(self.fail(err.into()).await),
        }
    }

    /// Stop tracking the job. An active run ends the form in
    /// [`FormPhase::Failed`]; before polling starts this does nothing.
    pub async fn cancel_polling(&self) {
        self.poller.cancel().await;
    }

    /// Result viewer URL carrying the percent-encoded job result link
    fn redirect_url(&self, link: &str) -> Result<String, FormError> {
        let mut url = reqwest::Url::parse(&self.config.endpoints.result_viewer_url)
            .map_err(|e| FormError::invalid_state(format!("Invalid result viewer URL: {e}")))?;
        let fragment = url.fragment().map(str::to_string);
        url.set_fragment(None);
        let separator = match url.query() {
            None => "?",
            Some("") => "",
            Some(_) => "&",
        };

        // Appended by hand: `Url::set_query` would re-escape `'`
        let mut redirect = format!(
            "{url}{separator}id={}",
            utf8_percent_encode(link, URI_COMPONENT)
        );
        if let Some(fragment) = fragment {
            redirect.push('#');
            redirect.push_str(&fragment);
        }
        Ok(redirect)
    }

    async fn set_phase(&self, phase: FormPhase) {
        self.state.write().await.phase = phase;
    }

    /// Terminal failure of the completion protocol
    async fn fail(&self, err: FormError) -> FormError {
        let message = err.user_message();
        self.set_phase(FormPhase::Failed {
            message: message.clone(),
        })
        .await;
        self.report(err)
    }

    /// Surface an error to the user and hand it back to the caller
    fn report(&self, err: FormError) -> FormError {
        if err.is_validation() {
            debug!(error = %err, "Input rejected");
        } else {
            warn!(error = %err, "Form operation failed");
        }
        self.clients
            .notifier
            .notify(&err.user_message(), NoticeKind::Error);
        err
    }
}
