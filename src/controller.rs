//! Conversation controller: starts and continues the exploration, owns the
//! busy state and the two-step reset.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::error::{ControllerError, ReferenceFetchError};
use crate::llm_interaction::CompletionBackend;
use crate::prompts::{follow_up_prompt, opening_prompt};
use crate::reference::{load_reference, ReferenceFetcher};
use crate::session::{Reference, Session};
use crate::store::SessionStore;

/// What the controller is doing right now. Anything other than `Idle` means
/// a model or fetch request is in flight and new submissions are refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum Phase {
    Idle,
    #[serde(rename_all = "camelCase")]
    AwaitingStart { fetching_reference: bool },
    AwaitingReply,
    Resetting,
}

impl Phase {
    pub fn is_busy(self) -> bool {
        self != Phase::Idle
    }
}

/// Holds a busy phase and drops back to `Idle` however the operation ends.
struct PhaseGuard<'a> {
    phase: &'a watch::Sender<Phase>,
}

impl<'a> PhaseGuard<'a> {
    fn acquire(phase: &'a watch::Sender<Phase>, next: Phase) -> Result<Self, ControllerError> {
        let acquired = phase.send_if_modified(|current| {
            if current.is_busy() {
                return false;
            }
            *current = next;
            true
        });
        if !acquired {
            return Err(ControllerError::Busy);
        }
        Ok(Self { phase })
    }

    fn set(&self, next: Phase) {
        self.phase.send_replace(next);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.phase.send_replace(Phase::Idle);
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub topic: String,
    pub viewpoint: String,
    #[serde(default)]
    pub reference_url: Option<String>,
}

#[derive(Debug)]
pub enum ReferenceStatus {
    NotRequested,
    Loaded,
    Failed(ReferenceFetchError),
}

#[derive(Debug)]
pub struct StartOutcome {
    pub session: Session,
    pub reference: ReferenceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// Short user-facing status line (the web UI's flash, the chat's stderr).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }

    /// Notices for a successful start, including the reference outcome.
    pub fn for_start(outcome: &StartOutcome) -> Vec<Notice> {
        let mut notices = Vec::with_capacity(2);
        match outcome.reference {
            ReferenceStatus::Loaded => notices.push(Notice::success("Reference page loaded")),
            ReferenceStatus::Failed(_) => notices.push(Notice::warning(
                "Could not load reference URL. Continuing without it.",
            )),
            ReferenceStatus::NotRequested => {}
        }
        notices.push(Notice::success("Exploration started!"));
        notices
    }

    pub fn start_failed(err: &ControllerError) -> Self {
        match err {
            ControllerError::Completion(_) | ControllerError::Store(_) => {
                Notice::error("Failed to start exploration. Please try again.")
            }
            other => Notice::error(other.to_string()),
        }
    }

    pub fn reply_failed(err: &ControllerError) -> Self {
        match err {
            ControllerError::Completion(_) | ControllerError::Store(_) => {
                Notice::error("Failed to generate response. Please try again.")
            }
            other => Notice::error(other.to_string()),
        }
    }

    pub fn reset_done() -> Self {
        Notice::success("Ready for a new exploration!")
    }
}

pub struct ConversationController {
    store: Arc<SessionStore>,
    backend: Arc<dyn CompletionBackend>,
    fetcher: Arc<dyn ReferenceFetcher>,
    model: String,
    phase: watch::Sender<Phase>,
    reset_requested: AtomicBool,
}

impl ConversationController {
    pub fn new(
        store: Arc<SessionStore>,
        backend: Arc<dyn CompletionBackend>,
        fetcher: Arc<dyn ReferenceFetcher>,
        model: impl Into<String>,
    ) -> Self {
        let (phase, _) = watch::channel(Phase::Idle);
        Self {
            store,
            backend,
            fetcher,
            model: model.into(),
            phase,
            reset_requested: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn session(&self) -> Option<Session> {
        self.store.get()
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn is_generating(&self) -> bool {
        self.phase().is_busy()
    }

    /// Receives every phase change.
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn reset_pending(&self) -> bool {
        self.reset_requested.load(Ordering::SeqCst)
    }

    /// Opens a new exploration. A failing reference fetch is reported in the
    /// outcome but does not stop the session from being created.
    #[instrument(skip_all)]
    pub async fn start_session(&self, request: StartRequest) -> Result<StartOutcome, ControllerError> {
        let topic = request.topic.trim();
        let viewpoint = request.viewpoint.trim();
        if topic.is_empty() || viewpoint.is_empty() {
            return Err(ControllerError::MissingStartFields);
        }

        let guard = PhaseGuard::acquire(
            &self.phase,
            Phase::AwaitingStart {
                fetching_reference: false,
            },
        )?;

        let url = request
            .reference_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty());

        let mut status = ReferenceStatus::NotRequested;
        let mut reference_text = None;
        if let Some(url) = url {
            guard.set(Phase::AwaitingStart {
                fetching_reference: true,
            });
            match load_reference(self.fetcher.as_ref(), url).await {
                Ok(text) => {
                    info!(%url, chars = text.chars().count(), "Reference page loaded");
                    reference_text = Some(text);
                    status = ReferenceStatus::Loaded;
                }
                Err(e) => {
                    warn!(%url, error = %e, "Could not load reference URL, continuing without it");
                    status = ReferenceStatus::Failed(e);
                }
            }
            guard.set(Phase::AwaitingStart {
                fetching_reference: false,
            });
        }

        let prompt = opening_prompt(topic, viewpoint, reference_text.as_deref());
        let opening = self
            .backend
            .complete(&prompt, &self.model)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to start exploration");
                e
            })?;

        let reference = url.map(|u| Reference {
            url: u.to_string(),
            content: reference_text,
        });
        let session = Session::open(topic, viewpoint, reference, opening);
        self.store.set(Some(session.clone()))?;
        self.reset_requested.store(false, Ordering::SeqCst);
        info!(%topic, "Exploration started");

        Ok(StartOutcome {
            session,
            reference: status,
        })
    }

    /// Adds the user's turn right away, then asks for the counter-argument.
    /// When the model call fails the user's turn stays in the log and is left
    /// marked as unanswered.
    #[instrument(skip_all)]
    pub async fn continue_session(&self, user_text: &str) -> Result<Session, ControllerError> {
        let text = user_text.trim();
        if text.is_empty() {
            return Err(ControllerError::EmptyMessage);
        }
        if self.store.get().is_none() {
            return Err(ControllerError::NoSession);
        }

        let _guard = PhaseGuard::acquire(&self.phase, Phase::AwaitingReply)?;
        self.reset_requested.store(false, Ordering::SeqCst);

        let mut before = None;
        let appended = self.store.update(|mut session| {
            before = Some(session.clone());
            session.push_user(text);
            session
        })?;
        let (Some(before), Some(_)) = (before, appended) else {
            return Err(ControllerError::NoSession);
        };

        let prompt = follow_up_prompt(&before, text);
        let reply = match self.backend.complete(&prompt, &self.model).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = %e, "Failed to generate response; user turn left unanswered");
                return Err(e.into());
            }
        };

        self.store
            .update(|mut session| {
                session.push_ai(reply);
                session
            })?
            .ok_or(ControllerError::NoSession)
    }

    /// First step of a reset. Only valid with a session and nothing in flight.
    pub fn request_reset(&self) -> Result<(), ControllerError> {
        if self.store.get().is_none() {
            return Err(ControllerError::NoSession);
        }
        if self.is_generating() {
            return Err(ControllerError::Busy);
        }
        self.reset_requested.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn cancel_reset(&self) {
        self.reset_requested.store(false, Ordering::SeqCst);
    }

    /// Second step of a reset: drops the session for good.
    pub fn confirm_reset(&self) -> Result<(), ControllerError> {
        if !self.reset_pending() {
            return Err(ControllerError::ResetNotRequested);
        }
        let _guard = PhaseGuard::acquire(&self.phase, Phase::Resetting)?;
        self.store.set(None)?;
        self.reset_requested.store(false, Ordering::SeqCst);
        info!("Exploration reset");
        Ok(())
    }
}
