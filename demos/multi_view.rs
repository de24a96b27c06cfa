//! One command log, two reducers: a todo list and running statistics.
//!
//! Both reducers fold every command, in registration order, into their own
//! half of a shared state.

use foldkv::CommandLog;

#[derive(Debug, Clone)]
enum TodoCommand {
    Add { text: String },
    Complete { id: u64 },
    Delete { id: u64 },
}

#[derive(Debug, Default, Clone)]
struct TodoItem {
    id: u64,
    text: String,
    done: bool,
}

#[derive(Debug, Default, Clone)]
struct Stats {
    created: u64,
    completed: u64,
    deleted: u64,
}

#[derive(Debug, Default, Clone)]
struct AppState {
    items: Vec<TodoItem>,
    next_id: u64,
    stats: Stats,
}

fn todo_reducer(mut state: AppState, command: &TodoCommand) -> AppState {
    match command {
        TodoCommand::Add { text } => {
            state.items.push(TodoItem {
                id: state.next_id,
                text: text.clone(),
                done: false,
            });
            state.next_id += 1;
        }
        TodoCommand::Complete { id } => {
            if let Some(item) = state.items.iter_mut().find(|i| i.id == *id) {
                item.done = true;
            }
        }
        TodoCommand::Delete { id } => state.items.retain(|i| i.id != *id),
    }
    state
}

fn stats_reducer(mut state: AppState, command: &TodoCommand) -> AppState {
    match command {
        TodoCommand::Add { .. } => state.stats.created += 1,
        TodoCommand::Complete { .. } => state.stats.completed += 1,
        TodoCommand::Delete { .. } => state.stats.deleted += 1,
    }
    state
}

fn add(text: &str) -> TodoCommand {
    TodoCommand::Add {
        text: text.to_string(),
    }
}

fn main() {
    let log = CommandLog::builder(AppState::default())
        .reducer(todo_reducer)
        .reducer(stats_reducer)
        .build();

    log.update(|_| (vec![add("buy milk"), add("write docs"), add("fix bug")], ()));

    // The closure sees the folded state, so it can look up ids.
    log.update(|state| {
        let commands = state
            .items
            .iter()
            .filter(|i| i.text == "buy milk")
            .map(|i| TodoCommand::Complete { id: i.id })
            .collect();
        (commands, ())
    });
    log.update_one(|_| TodoCommand::Delete { id: 2 });

    let (open, done) = log.read(|state| {
        let done = state.items.iter().filter(|i| i.done).count();
        (state.items.len() - done, done)
    });
    println!("Todos: {open} open, {done} completed");

    let stats = log.snapshot().state.stats;
    let rate = if stats.created > 0 {
        (stats.completed * 100) / stats.created
    } else {
        0
    };
    println!(
        "Stats: {} created, {} completed, {} deleted ({}% completion rate)",
        stats.created, stats.completed, stats.deleted, rate
    );
    println!("History: {} commands", log.len());
}
