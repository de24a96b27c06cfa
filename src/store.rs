use crate::codec::Codec;
use crate::command::{Action, Command, KvMap, apply_command};
use crate::datastore::{Datastore, Executor, PersistedRecord};
use crate::error::{BoxError, Error, Result};
use crate::log::{CommandLog, History};
use log::{debug, info, warn};
use std::fmt;
use std::sync::Mutex;

/// A durable key-value store whose state is a fold over its command log.
///
/// Writes go through [`CommandLog::update`], so concurrent writers never
/// block each other in memory. After each write the not-yet-flushed suffix
/// of history is mirrored into the datastore in one transaction. Opening a
/// store replays every persisted row to rebuild the in-memory log.
///
/// Two cursors track progress through history. The materialization cursor
/// lives inside the log and moves on every write. The persistence cursor
/// lives here and moves only after a flush transaction commits; a failed
/// flush leaves it in place so the same suffix is retried next time.
///
/// # Examples
///
/// ```
/// use foldkv::{Codec, Command, KeyValueStore, SqliteDatastore};
///
/// # fn main() -> Result<(), foldkv::BoxError> {
/// let db = SqliteDatastore::open_in_memory()?;
///
/// let store = KeyValueStore::open(db.clone(), "settings", Codec::identity())?;
/// store.update(|_| vec![Command::add("theme", "dark".to_string())])?;
/// assert_eq!(store.get("theme").as_deref(), Some("dark"));
///
/// // Reopening over the same datastore replays the persisted rows.
/// let reopened = KeyValueStore::open(db, "settings", Codec::identity())?;
/// assert_eq!(reopened.snapshot(), store.snapshot());
/// # Ok(())
/// # }
/// ```
pub struct KeyValueStore<V, D> {
    log: CommandLog<KvMap<V>, Command<V>>,
    /// Persistence cursor: index of the first command not yet written to
    /// the datastore. Held for the whole flush transaction.
    flushed: Mutex<usize>,
    datastore: D,
    codec: Codec<V>,
    table: String,
    insert_sql: String,
}

impl<V: Clone, D> fmt::Debug for KeyValueStore<V, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyValueStore")
            .field("table", &self.table)
            .field("log", &self.log)
            .field("flushed", &self.flushed)
            .finish_non_exhaustive()
    }
}

impl<V, D> KeyValueStore<V, D>
where
    V: Clone,
    D: Datastore,
{
    /// Open a store over `table`, creating the table if needed and
    /// recovering state from its rows.
    ///
    /// # Errors
    ///
    /// Fails if the table name is not a plain identifier, if the datastore
    /// cannot be read, or if any row cannot be turned back into a command.
    /// Recovery never skips a bad row.
    pub fn open(datastore: D, table: &str, codec: Codec<V>) -> Result<Self> {
        KeyValueStore::builder(datastore, table, codec).open()
    }

    /// Create a builder for a store over `table`.
    pub fn builder(datastore: D, table: &str, codec: Codec<V>) -> StoreBuilder<V, D> {
        StoreBuilder {
            datastore,
            table: table.to_string(),
            codec,
            create_table: true,
        }
    }

    /// Apply `f` to the current mapping and persist the commands it returns.
    ///
    /// `f` may run more than once under contention and must be pure.
    ///
    /// # Errors
    ///
    /// The in-memory update is committed before anything touches the
    /// datastore. If the flush then fails, the error is returned, the
    /// commands stay in memory, and the next flush retries them.
    pub fn update(&self, mut f: impl FnMut(&KvMap<V>) -> Vec<Command<V>>) -> Result<()> {
        self.update_with(|map| (f(map), ()))
    }

    /// Like [`update`](Self::update), with an extra result computed from the
    /// same state `f` saw.
    pub fn update_with<T>(&self, f: impl FnMut(&KvMap<V>) -> (Vec<Command<V>>, T)) -> Result<T> {
        let result = self.log.update(f);
        self.flush()?;
        Ok(result)
    }

    /// Apply and persist the single command produced by `f`.
    pub fn update_one(&self, mut f: impl FnMut(&KvMap<V>) -> Command<V>) -> Result<()> {
        self.update_with(|map| (vec![f(map)], ()))
    }

    /// Evaluate `g` against a consistent snapshot of the mapping.
    pub fn read<T>(&self, g: impl FnMut(&KvMap<V>) -> T) -> T {
        self.log.read(g)
    }

    /// The current mapping. Cheap: the map is persistent and shares
    /// structure with the store's copy.
    pub fn snapshot(&self) -> KvMap<V> {
        self.log.snapshot().state
    }

    /// The current value of `key`.
    pub fn get(&self, key: &str) -> Option<V> {
        self.log.read(|map| map.get(key).cloned())
    }

    /// Write every command past the persistence cursor to the datastore in
    /// one transaction, then advance the cursor to the end of history.
    ///
    /// Returns the number of commands written. Flushes are serialized; a
    /// caller arriving while another flush runs waits for it and then
    /// writes whatever is left.
    ///
    /// # Errors
    ///
    /// If encoding or the transaction fails, nothing is committed and the
    /// cursor is unchanged.
    pub fn flush(&self) -> Result<usize> {
        let mut flushed = self.flushed.lock().map_err(|_| Error::Poisoned)?;
        let history = self.log.history();
        if *flushed >= history.len() {
            return Ok(0);
        }

        let records = history
            .iter()
            .skip(*flushed)
            .map(|command| self.encode(command))
            .collect::<Result<Vec<_>>>()?;

        let outcome = self
            .datastore
            .run_in_transaction(&mut |tx: &dyn Executor| -> Result<(), BoxError> {
                for record in &records {
                    tx.execute(
                        &self.insert_sql,
                        &[
                            Some(record.action.as_str()),
                            Some(record.key.as_str()),
                            record.value.as_deref(),
                        ],
                    )?;
                }
                Ok(())
            });

        if let Err(source) = outcome {
            warn!(
                "foldkv: table '{}': flush of {} commands failed, cursor stays at {}",
                self.table,
                records.len(),
                *flushed
            );
            return Err(Error::Datastore(source));
        }

        *flushed = history.len();
        debug!(
            "foldkv: table '{}': flushed {} commands, cursor at {}",
            self.table,
            records.len(),
            *flushed
        );
        Ok(records.len())
    }

    /// Drop the durably flushed prefix from the in-memory history.
    ///
    /// Only commands behind the persistence cursor are removed, so nothing
    /// unflushed is ever lost; the cursor is rebased to 0 under the same
    /// lock. Derived state is untouched and the datastore keeps every row.
    /// Returns the number of commands dropped.
    pub fn trim_flushed(&self) -> Result<usize> {
        let mut flushed = self.flushed.lock().map_err(|_| Error::Poisoned)?;
        let count = *flushed;
        if count == 0 {
            return Ok(0);
        }

        self.log.rewrite_log(|history| {
            let mut kept = history.clone();
            (kept.split_off(count), ())
        });
        *flushed = 0;
        debug!("foldkv: table '{}': trimmed {count} flushed commands", self.table);
        Ok(count)
    }

    /// The persistence cursor.
    pub fn persisted(&self) -> Result<usize> {
        self.flushed.lock().map(|flushed| *flushed).map_err(|_| Error::Poisoned)
    }

    /// Number of commands in memory not yet written to the datastore.
    pub fn unflushed(&self) -> Result<usize> {
        let flushed = self.flushed.lock().map_err(|_| Error::Poisoned)?;
        Ok(self.log.len().saturating_sub(*flushed))
    }

    /// Number of commands in the in-memory history.
    pub fn history_len(&self) -> usize {
        self.log.len()
    }

    /// A structurally shared copy of the in-memory history.
    pub fn history(&self) -> History<Command<V>> {
        self.log.history()
    }

    /// The table this store writes to.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The datastore this store writes to.
    pub fn datastore(&self) -> &D {
        &self.datastore
    }

    fn encode(&self, command: &Command<V>) -> Result<PersistedRecord> {
        let value = command
            .value()
            .map(|value| self.codec.encode(value))
            .transpose()
            .map_err(|source| Error::Codec {
                key: command.key().to_string(),
                source,
            })?;
        Ok(PersistedRecord {
            action: command.action().as_str().to_string(),
            key: command.key().to_string(),
            value,
        })
    }
}

/// Builder for [`KeyValueStore`].
///
/// # Examples
///
/// ```
/// use foldkv::{Codec, Datastore, KeyValueStore, SqliteDatastore};
///
/// # fn main() -> Result<(), foldkv::BoxError> {
/// let db = SqliteDatastore::open_in_memory()?;
/// db.create_table_if_not_exists("counters")?;
///
/// let store = KeyValueStore::builder(db, "counters", Codec::<u64>::json())
///     .create_table(false)
///     .open()?;
/// assert!(store.snapshot().is_empty());
/// # Ok(())
/// # }
/// ```
pub struct StoreBuilder<V, D> {
    datastore: D,
    table: String,
    codec: Codec<V>,
    create_table: bool,
}

impl<V, D> StoreBuilder<V, D>
where
    V: Clone,
    D: Datastore,
{
    /// Whether to create the table if it does not exist. Defaults to `true`.
    pub fn create_table(mut self, create: bool) -> Self {
        self.create_table = create;
        self
    }

    /// Open the store, recovering its state from the datastore.
    ///
    /// Every row is decoded into a command, in insertion order, and the
    /// resulting history is materialized from an empty map in one pass.
    /// Recovered commands are already durable, so the persistence cursor
    /// starts at the end of history.
    pub fn open(self) -> Result<KeyValueStore<V, D>> {
        let StoreBuilder {
            datastore,
            table,
            codec,
            create_table,
        } = self;

        validate_table(&table)?;
        if create_table {
            datastore
                .create_table_if_not_exists(&table)
                .map_err(Error::Datastore)?;
        }

        let records = datastore.scan_all(&table).map_err(Error::Datastore)?;
        let history = records
            .iter()
            .enumerate()
            .map(|(row, record)| recover_command(&table, row, record, &codec))
            .collect::<Result<Vec<_>>>()?;
        let recovered = history.len();

        let log = CommandLog::builder(KvMap::<V>::default())
            .reducer(apply_command::<V>)
            .history(history)
            .build();
        let snapshot = log.materialize();
        info!(
            "foldkv: table '{table}': recovered {recovered} commands into {} keys",
            snapshot.state.len()
        );

        let insert_sql = format!("INSERT INTO {table} (action, key, value) VALUES (?1, ?2, ?3)");
        Ok(KeyValueStore {
            log,
            flushed: Mutex::new(recovered),
            datastore,
            codec,
            table,
            insert_sql,
        })
    }
}

/// Turn one persisted row back into the command that produced it.
fn recover_command<V>(
    table: &str,
    row: usize,
    record: &PersistedRecord,
    codec: &Codec<V>,
) -> Result<Command<V>> {
    let action: Action = record.action.parse().map_err(|_| Error::UnknownAction {
        table: table.to_string(),
        row,
        action: record.action.clone(),
    })?;

    let key = record.key.clone();
    let value = match action {
        Action::Delete => return Ok(Command::Remove { key }),
        Action::Insert | Action::Update => {
            let text = record.value.as_deref().ok_or_else(|| Error::MissingValue {
                table: table.to_string(),
                row,
                action: action.as_str(),
            })?;
            codec.decode(text).map_err(|source| Error::Codec {
                key: key.clone(),
                source,
            })?
        }
    };

    if action == Action::Insert {
        Ok(Command::Add { key, value })
    } else {
        Ok(Command::Update { key, value })
    }
}

/// Table names are spliced into SQL, so only plain identifiers pass.
fn validate_table(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidTable(table.to_string()))
    }
}
