use thiserror::Error;

/// Boxed error returned by datastore adapters and value codecs.
///
/// Both sit outside this crate's control, so they report failures through a
/// type-erased error rather than a closed enum.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by [`KeyValueStore`](crate::KeyValueStore).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A persisted row carries an action other than `insert`, `update` or
    /// `delete`. Recovery stops at the first such row.
    #[error("table '{table}': row {row} has unknown action {action:?}")]
    UnknownAction {
        table: String,
        row: usize,
        action: String,
    },

    /// An `insert` or `update` row was persisted without a value.
    #[error("table '{table}': row {row} ({action}) has no value")]
    MissingValue {
        table: String,
        row: usize,
        action: &'static str,
    },

    /// The caller's codec rejected a value.
    #[error("codec failed for key {key:?}")]
    Codec {
        key: String,
        #[source]
        source: BoxError,
    },

    /// The table name is not a plain SQL identifier.
    #[error("invalid table name {0:?}: expected [A-Za-z_][A-Za-z0-9_]*")]
    InvalidTable(String),

    /// The datastore adapter failed (scan, schema or transaction).
    #[error("datastore error")]
    Datastore(#[source] BoxError),

    /// A thread panicked while holding the flush cursor.
    #[error("flush cursor lock poisoned")]
    Poisoned,
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
