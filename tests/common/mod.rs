#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use counterpoint::llm_interaction::CompletionBackend;
use counterpoint::reference::ReferenceFetcher;
use counterpoint::{CompletionError, ConversationController, ReferenceFetchError, SessionStore};
use tokio::sync::Notify;

/// Replies from a fixed script and records every prompt it was sent.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Result<&str, &str>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, prompt: &str, _model: &str) -> Result<String, CompletionError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(e)) => Err(CompletionError::Backend(e)),
            None => Err(CompletionError::Backend("script exhausted".into())),
        }
    }
}

/// Blocks inside `complete` until released, so tests can observe the busy state.
#[derive(Default)]
pub struct GatedBackend {
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl CompletionBackend for GatedBackend {
    async fn complete(&self, _prompt: &str, _model: &str) -> Result<String, CompletionError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok("Released reply.".to_string())
    }
}

pub enum StaticFetcher {
    Page(String),
    NotFound,
}

#[async_trait]
impl ReferenceFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ReferenceFetchError> {
        match self {
            StaticFetcher::Page(html) => Ok(html.clone()),
            StaticFetcher::NotFound => Err(ReferenceFetchError::Status {
                url: url.to_string(),
                status: reqwest::StatusCode::NOT_FOUND,
            }),
        }
    }
}

pub fn controller_with(
    backend: Arc<dyn CompletionBackend>,
    fetcher: StaticFetcher,
) -> ConversationController {
    ConversationController::new(
        Arc::new(SessionStore::in_memory()),
        backend,
        Arc::new(fetcher),
        "test-model",
    )
}

pub fn controller(replies: Vec<Result<&str, &str>>) -> (ConversationController, Arc<ScriptedBackend>) {
    let backend = ScriptedBackend::new(replies);
    let controller = controller_with(backend.clone(), StaticFetcher::NotFound);
    (controller, backend)
}
