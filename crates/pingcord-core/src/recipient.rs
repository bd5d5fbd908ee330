//! Recipient — a user or channel that notifications are delivered to.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// What kind of target a recipient id refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientKind {
    /// A user; messages go to a DM channel that has to be resolved first.
    User,
    /// A guild or thread channel; its id is posted to directly.
    Channel,
}

impl RecipientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientKind::User => "user",
            RecipientKind::Channel => "channel",
        }
    }
}

impl fmt::Display for RecipientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable delivery target, identified by the pair `(kind, id)`.
///
/// Fields are private so a recipient can never change kind or id once built.
/// Equality and hashing use both fields, which makes `Recipient` usable
/// directly as a map key for caches and buffers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    kind: RecipientKind,
    #[serde(deserialize_with = "deserialize_snowflake")]
    id: String,
}

impl Recipient {
    pub fn new(kind: RecipientKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// A user recipient (delivered through a DM channel).
    pub fn user(id: impl Into<String>) -> Self {
        Self::new(RecipientKind::User, id)
    }

    /// A channel recipient (posted to directly).
    pub fn channel(id: impl Into<String>) -> Self {
        Self::new(RecipientKind::Channel, id)
    }

    pub fn kind(&self) -> RecipientKind {
        self.kind
    }

    /// Platform-assigned identifier (a Discord snowflake).
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_user(&self) -> bool {
        self.kind == RecipientKind::User
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Snowflakes show up in configs both as strings and as bare integers.
fn deserialize_snowflake<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Snowflake {
        Text(String),
        Number(u64),
    }

    Ok(match Snowflake::deserialize(deserializer)? {
        Snowflake::Text(s) => s,
        Snowflake::Number(n) => n.to_string(),
    })
}
