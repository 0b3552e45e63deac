use thiserror::Error;

/// Failure of the external model call. Callers treat every variant the same
/// way; the split only exists so the logs say what went wrong.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("failed to reach model endpoint {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("model endpoint returned status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("could not decode model response: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("model returned an empty response")]
    Empty,
    #[error("{0}")]
    Backend(String),
}

/// Soft failure while loading the optional reference page.
#[derive(Debug, Error)]
pub enum ReferenceFetchError {
    #[error("invalid reference url {url:?}")]
    InvalidUrl { url: String },
    #[error("failed to fetch {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("fetching {url} returned status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("reference page {url} had no readable text")]
    Empty { url: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored session for key {key:?} is unreadable: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not serialize session: {0}")]
    Serialize(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Please enter both a topic and your viewpoint")]
    MissingStartFields,
    #[error("Please enter a message")]
    EmptyMessage,
    #[error("no active exploration")]
    NoSession,
    #[error("a response is already being generated")]
    Busy,
    #[error("reset was not requested")]
    ResetNotRequested,
    #[error("completion failed: {0}")]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ControllerError {
    /// Blank-field failures. These never touch the store.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::MissingStartFields | Self::EmptyMessage)
    }
}
