use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Ai,
}

impl Role {
    /// Speaker label used in transcripts and prompts.
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Ai => "AI",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Epoch millis.
    pub timestamp: i64,
}

/// Where the optional reference context came from and what was kept of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub url: String,
    pub content: Option<String>,
}

/// The single exploration the app tracks: a topic, the user's stance and the
/// conversation so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub topic: String,
    pub user_viewpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_content: Option<String>,
    pub messages: Vec<Message>,
    /// Id of the last user message if no reply has been appended after it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unanswered: Option<String>,
}

impl Session {
    /// Creates a session seeded with the model's opening statement.
    pub fn open(
        topic: impl Into<String>,
        user_viewpoint: impl Into<String>,
        reference: Option<Reference>,
        opening: impl Into<String>,
    ) -> Self {
        let (reference_url, reference_content) = match reference {
            Some(r) => (Some(r.url), r.content),
            None => (None, None),
        };
        let mut session = Self {
            topic: topic.into(),
            user_viewpoint: user_viewpoint.into(),
            reference_url,
            reference_content,
            messages: Vec::with_capacity(1),
            unanswered: None,
        };
        session.push_ai(opening);
        session
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> &Message {
        self.push_at(Role::User, content.into(), Utc::now().timestamp_millis());
        let id = self.messages[self.messages.len() - 1].id.clone();
        self.unanswered = Some(id);
        &self.messages[self.messages.len() - 1]
    }

    pub fn push_ai(&mut self, content: impl Into<String>) -> &Message {
        self.push_at(Role::Ai, content.into(), Utc::now().timestamp_millis());
        self.unanswered = None;
        &self.messages[self.messages.len() - 1]
    }

    /// Appends with an explicit clock reading. Ids and timestamps are kept
    /// ordered even if `now` runs backwards or repeats.
    pub(crate) fn push_at(&mut self, role: Role, content: String, now: i64) {
        let (timestamp, id) = match self.messages.last() {
            Some(last) => {
                let timestamp = now.max(last.timestamp);
                let prev_id = last.id.parse::<i64>().unwrap_or(last.timestamp);
                (timestamp, timestamp.max(prev_id + 1))
            }
            None => (now, now),
        };
        self.messages.push(Message {
            id: id.to_string(),
            role,
            content,
            timestamp,
        });
    }

    /// `User: ...` / `AI: ...` lines separated by blank lines.
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.role.label(), m.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn is_unanswered(&self, message: &Message) -> bool {
        self.unanswered.as_deref() == Some(message.id.as_str())
    }

    pub fn reference_host(&self) -> Option<String> {
        let url = self.reference_url.as_deref()?;
        reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}
