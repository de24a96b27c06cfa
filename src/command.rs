use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The derived state of a [`KeyValueStore`](crate::KeyValueStore).
///
/// A persistent hash map: cloning is O(1), so every snapshot handed to a
/// reader is a cheap, independent value.
pub type KvMap<V> = im::HashMap<String, V>;

/// One state transition of a key-value store.
///
/// Commands are immutable once appended. `Add` and `Update` both upsert;
/// they differ only in the action recorded for them in durable storage.
///
/// # Examples
///
/// ```
/// use foldkv::{Action, Command};
///
/// let cmd = Command::add("k1", 42);
/// assert_eq!(cmd.key(), "k1");
/// assert_eq!(cmd.value(), Some(&42));
/// assert_eq!(cmd.action(), Action::Insert);
///
/// let cmd: Command<i32> = Command::remove("k1");
/// assert_eq!(cmd.value(), None);
/// assert_eq!(cmd.action().as_str(), "delete");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<V> {
    /// Insert a key, or overwrite it if present.
    Add { key: String, value: V },
    /// Overwrite a key, or insert it if absent.
    Update { key: String, value: V },
    /// Delete a key. Deleting an absent key is a no-op.
    Remove { key: String },
}

impl<V> Command<V> {
    /// Create an `Add` command.
    pub fn add(key: impl Into<String>, value: V) -> Self {
        Command::Add {
            key: key.into(),
            value,
        }
    }

    /// Create an `Update` command.
    pub fn update(key: impl Into<String>, value: V) -> Self {
        Command::Update {
            key: key.into(),
            value,
        }
    }

    /// Create a `Remove` command.
    pub fn remove(key: impl Into<String>) -> Self {
        Command::Remove { key: key.into() }
    }

    /// The key this command touches.
    pub fn key(&self) -> &str {
        match self {
            Command::Add { key, .. } | Command::Update { key, .. } | Command::Remove { key } => {
                key
            }
        }
    }

    /// The value carried by `Add` and `Update`.
    pub fn value(&self) -> Option<&V> {
        match self {
            Command::Add { value, .. } | Command::Update { value, .. } => Some(value),
            Command::Remove { .. } => None,
        }
    }

    /// The action recorded for this command in durable storage.
    pub fn action(&self) -> Action {
        match self {
            Command::Add { .. } => Action::Insert,
            Command::Update { .. } => Action::Update,
            Command::Remove { .. } => Action::Delete,
        }
    }
}

/// The key-value reducer: `Add`/`Update` upsert, `Remove` deletes if present.
pub fn apply_command<V: Clone>(mut state: KvMap<V>, command: &Command<V>) -> KvMap<V> {
    match command {
        Command::Add { key, value } | Command::Update { key, value } => {
            state.insert(key.clone(), value.clone());
        }
        Command::Remove { key } => {
            state.remove(key.as_str());
        }
    }
    state
}

/// The `action` column of a persisted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Insert,
    Update,
    Delete,
}

impl Action {
    /// The stored spelling: `"insert"`, `"update"` or `"delete"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Insert => "insert",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored action is none of the three known spellings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action {0:?}")]
pub struct ParseActionError(pub String);

impl FromStr for Action {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert" => Ok(Action::Insert),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            other => Err(ParseActionError(other.to_string())),
        }
    }
}
