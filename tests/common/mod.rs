#![allow(dead_code)]

use foldkv::{
    BoxError, Codec, Datastore, Executor, KeyValueStore, PersistedRecord, SqliteDatastore,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub const TABLE: &str = "history";

pub fn string_store(db: &SqliteDatastore) -> KeyValueStore<String, SqliteDatastore> {
    KeyValueStore::open(db.clone(), TABLE, Codec::identity()).unwrap()
}

pub fn rows(db: &SqliteDatastore) -> Vec<PersistedRecord> {
    db.scan_all(TABLE).unwrap()
}

pub fn insert_row(db: &SqliteDatastore, action: &str, key: &str, value: Option<&str>) {
    db.create_table_if_not_exists(TABLE).unwrap();
    db.run_in_transaction(&mut |tx: &dyn Executor| -> Result<(), BoxError> {
        tx.execute(
            &format!("INSERT INTO {TABLE} (action, key, value) VALUES (?1, ?2, ?3)"),
            &[Some(action), Some(key), value],
        )?;
        Ok(())
    })
    .unwrap();
}

// --- Key-value payload with a hand-written codec ---

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub favorite: bool,
    pub source: String,
    pub target: String,
    pub id: i64,
}

impl Item {
    pub fn new(id: i64) -> Self {
        Item {
            favorite: false,
            source: format!("{id}s"),
            target: format!("{id}t"),
            id,
        }
    }
}

pub fn pipe_codec() -> Codec<Item> {
    Codec::new(
        |item: &Item| {
            Ok(format!(
                "{}|{}|{}|{}",
                item.favorite, item.source, item.target, item.id
            ))
        },
        |text: &str| {
            let parts: Vec<&str> = text.split('|').collect();
            let [favorite, source, target, id] = parts.as_slice() else {
                return Err(format!("expected 4 fields, got {}", parts.len()).into());
            };
            Ok(Item {
                favorite: favorite.parse()?,
                source: source.to_string(),
                target: target.to_string(),
                id: id.parse()?,
            })
        },
    )
}

// --- Generic command log state, two reducers ---

#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub user_id: String,
    pub url: String,
}

#[derive(Default, Clone, Debug, PartialEq)]
pub struct AppState {
    pub records: Vec<Record>,
    pub users: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AppCommand {
    NewUser(String),
    NewSlackRecord { user_id: String, channel: String },
    NewUrlRecord { user_id: String, url: String },
    RemoveRecord { user_id: String, url: String },
}

pub fn slack(user_id: &str, channel: &str) -> AppCommand {
    AppCommand::NewSlackRecord {
        user_id: user_id.to_string(),
        channel: channel.to_string(),
    }
}

pub fn records_reducer(mut state: AppState, command: &AppCommand) -> AppState {
    match command {
        AppCommand::NewSlackRecord { user_id, channel } => state.records.push(Record {
            user_id: user_id.clone(),
            url: format!("https://team.slack.com/{channel}"),
        }),
        AppCommand::NewUrlRecord { user_id, url } => state.records.push(Record {
            user_id: user_id.clone(),
            url: url.clone(),
        }),
        AppCommand::RemoveRecord { user_id, url } => state
            .records
            .retain(|r| !(r.user_id == *user_id && r.url == *url)),
        AppCommand::NewUser(_) => {}
    }
    state
}

pub fn users_reducer(mut state: AppState, command: &AppCommand) -> AppState {
    if let AppCommand::NewUser(user_id) = command {
        state.users.push(user_id.clone());
    }
    state
}

pub fn counter_reducer(state: u64, _command: &u32) -> u64 {
    state + 1
}

pub fn sum_reducer(state: u64, command: &u32) -> u64 {
    state + u64::from(*command)
}

/// Records the order reducers see commands in.
pub fn trace_a(mut state: Vec<String>, command: &u32) -> Vec<String> {
    state.push(format!("a{command}"));
    state
}

pub fn trace_b(mut state: Vec<String>, command: &u32) -> Vec<String> {
    state.push(format!("b{command}"));
    state
}

// --- Datastore that fails on demand ---

/// Wraps a SQLite datastore and can be told to fail transactions.
///
/// A failing transaction still runs its body, so the writes are issued and
/// then rolled back, like a commit that fails at the last moment.
pub struct FlakyDatastore {
    inner: SqliteDatastore,
    fail: AtomicBool,
    transactions: AtomicUsize,
}

impl FlakyDatastore {
    pub fn new(inner: SqliteDatastore) -> Self {
        FlakyDatastore {
            inner,
            fail: AtomicBool::new(false),
            transactions: AtomicUsize::new(0),
        }
    }

    pub fn fail_transactions(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn transactions(&self) -> usize {
        self.transactions.load(Ordering::SeqCst)
    }
}

impl Datastore for FlakyDatastore {
    fn create_table_if_not_exists(&self, table: &str) -> Result<(), BoxError> {
        self.inner.create_table_if_not_exists(table)
    }

    fn scan_all(&self, table: &str) -> Result<Vec<PersistedRecord>, BoxError> {
        self.inner.scan_all(table)
    }

    fn run_in_transaction(
        &self,
        body: &mut dyn FnMut(&dyn Executor) -> Result<(), BoxError>,
    ) -> Result<(), BoxError> {
        self.transactions.fetch_add(1, Ordering::SeqCst);
        let fail = self.fail.load(Ordering::SeqCst);
        self.inner
            .run_in_transaction(&mut |tx: &dyn Executor| -> Result<(), BoxError> {
                body(tx)?;
                if fail {
                    return Err("injected commit failure".into());
                }
                Ok(())
            })
    }
}
