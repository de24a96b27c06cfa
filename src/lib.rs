mod codec;
mod command;
pub mod datastore;
mod error;
mod log;
pub mod snapshot;
mod store;

pub use crate::log::{CommandLog, CommandLogBuilder, History, ReduceFn, fold};
pub use codec::Codec;
pub use command::{Action, Command, KvMap, ParseActionError, apply_command};
pub use datastore::{Datastore, Executor, PersistedRecord, SqliteDatastore};
pub use error::{BoxError, Error, Result};
pub use snapshot::Snapshot;
pub use store::{KeyValueStore, StoreBuilder};
