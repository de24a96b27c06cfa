//! Bookmark store over a SQLite file.
//!
//! ```text
//! cargo run --example kv_cli -- bookmarks.db add docs https://docs.rs
//! cargo run --example kv_cli -- bookmarks.db star docs
//! cargo run --example kv_cli -- bookmarks.db list
//! cargo run --example kv_cli -- bookmarks.db remove docs
//! ```
//!
//! Every run reopens the database and replays its history, so state
//! carries over between invocations.

use foldkv::{BoxError, Codec, Command, KeyValueStore, SqliteDatastore};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Bookmark {
    url: String,
    starred: bool,
}

const USAGE: &str = "usage: kv_cli <db> (add <name> <url> | star <name> | remove <name> | list | trim)";

fn main() -> Result<(), BoxError> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some((path, command)) = args.split_first() else {
        return Err(USAGE.into());
    };

    let db = SqliteDatastore::open(path)?;
    let store = KeyValueStore::open(db, "bookmarks", Codec::<Bookmark>::json())?;

    match command {
        [op, name, url] if op == "add" => {
            store.update_one(|_| {
                Command::add(
                    name.as_str(),
                    Bookmark {
                        url: url.clone(),
                        starred: false,
                    },
                )
            })?;
            println!("Added: {name}");
        }
        [op, name] if op == "star" => {
            let found = store.update_with(|map| match map.get(name.as_str()) {
                Some(bookmark) => {
                    let starred = Bookmark {
                        starred: true,
                        ..bookmark.clone()
                    };
                    (vec![Command::update(name.as_str(), starred)], true)
                }
                None => (Vec::new(), false),
            })?;
            if found {
                println!("Starred: {name}");
            } else {
                println!("No bookmark named {name}");
            }
        }
        [op, name] if op == "remove" => {
            store.update_one(|_| Command::remove(name.as_str()))?;
            println!("Removed: {name}");
        }
        [op] if op == "list" => {
            let mut entries: Vec<(String, Bookmark)> = store.snapshot().into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            for (name, bookmark) in entries {
                let star = if bookmark.starred { "*" } else { " " };
                println!("[{star}] {name}: {}", bookmark.url);
            }
            println!("({} commands in history)", store.history_len());
        }
        [op] if op == "trim" => {
            let dropped = store.trim_flushed()?;
            println!("Dropped {dropped} flushed commands from memory");
        }
        _ => return Err(USAGE.into()),
    }

    Ok(())
}
