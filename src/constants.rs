// Defaults loaded from the environment. CLI flags override these.

use std::env;

lazy_static::lazy_static! {
    pub static ref OLLAMA_URL: String = env::var("OLLAMA_URL").unwrap_or_else(|_| "http://127.0.0.1:11434".to_string());
    pub static ref OPENAI_BASE_URL: String = env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com".to_string());
    pub static ref OPENAI_API_KEY: String = env::var("OPENAI_API_KEY").unwrap_or_default();
    pub static ref COUNTERPOINT_MODEL: String = env::var("COUNTERPOINT_MODEL").unwrap_or_else(|_| "gemma3:12b".to_string());
    pub static ref STATE_DIR: String = env::var("COUNTERPOINT_STATE_DIR").unwrap_or_else(|_| ".counterpoint".to_string());
}

/// Model used when the OpenAI-compatible provider is picked without `--model`.
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o";

/// Cleaned reference text is cut to this many characters to bound prompt size.
pub const REFERENCE_MAX_CHARS: usize = 8000;

/// Key the persisted session lives under.
pub const SESSION_KEY: &str = "exploration-session";

pub const DEFAULT_PORT: u16 = 9900;
