pub mod chat;
pub mod constants;
pub mod controller;
pub mod error;
pub mod llm_interaction;
pub mod prompts;
pub mod reference;
pub mod session;
pub mod settings;
pub mod store;
pub mod web_server;

pub use controller::{ConversationController, Notice, NoticeLevel, Phase, StartOutcome, StartRequest};
pub use error::{CompletionError, ControllerError, ReferenceFetchError, StoreError};
pub use session::{Message, Role, Session};
pub use store::{JsonFileStore, KeyValueStore, SessionStore};
