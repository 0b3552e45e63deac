use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::constants;
use crate::controller::ConversationController;
use crate::llm_interaction::{build_backend, Provider};
use crate::reference::HttpFetcher;
use crate::store::{JsonFileStore, SessionStore};

/// Runtime configuration shared by every subcommand. Each flag falls back to
/// an environment variable, then to the defaults in [`constants`].
#[derive(clap::Args, Debug, Clone)]
pub struct Settings {
    #[arg(long, global = true, env = "COUNTERPOINT_PROVIDER", value_enum, default_value_t = Provider::Ollama, help = "Which model API to talk to.")]
    pub provider: Provider,
    #[arg(long, global = true, help = "Model identifier passed to the provider [env: COUNTERPOINT_MODEL].")]
    pub model: Option<String>,
    #[arg(long, global = true, help = "Base URL of the Ollama server [env: OLLAMA_URL].")]
    pub ollama_url: Option<String>,
    #[arg(long, global = true, help = "Base URL of the OpenAI-compatible API [env: OPENAI_BASE_URL].")]
    pub openai_url: Option<String>,
    #[arg(long, global = true, help = "Directory the active exploration is saved in [env: COUNTERPOINT_STATE_DIR].")]
    pub state_dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Keep the exploration in memory only.")]
    pub ephemeral: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: Provider::Ollama,
            model: None,
            ollama_url: None,
            openai_url: None,
            state_dir: None,
            ephemeral: false,
        }
    }
}

impl Settings {
    pub fn model(&self) -> String {
        if let Some(model) = &self.model {
            return model.clone();
        }
        match self.provider {
            Provider::Openai if std::env::var("COUNTERPOINT_MODEL").is_err() => {
                constants::OPENAI_DEFAULT_MODEL.to_string()
            }
            _ => constants::COUNTERPOINT_MODEL.clone(),
        }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(constants::STATE_DIR.as_str()))
    }

    pub fn open_store(&self) -> Result<SessionStore> {
        if self.ephemeral {
            info!("Using in-memory session store");
            return Ok(SessionStore::in_memory());
        }
        let dir = self.state_dir();
        info!(dir = %dir.display(), "Using persistent session store");
        SessionStore::persistent(Arc::new(JsonFileStore::new(dir)))
            .context("Failed to open saved exploration")
    }

    pub fn build_controller(&self) -> Result<Arc<ConversationController>> {
        let store = Arc::new(self.open_store()?);
        let backend = build_backend(
            self.provider,
            self.ollama_url.as_deref().unwrap_or(constants::OLLAMA_URL.as_str()),
            self.openai_url.as_deref().unwrap_or(constants::OPENAI_BASE_URL.as_str()),
            constants::OPENAI_API_KEY.as_str(),
        );
        let model = self.model();
        info!(provider = ?self.provider, %model, "Model backend configured");
        Ok(Arc::new(ConversationController::new(
            store,
            backend,
            Arc::new(HttpFetcher::default()),
            model,
        )))
    }
}
