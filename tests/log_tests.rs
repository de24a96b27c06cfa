mod common;

use common::{
    AppCommand, AppState, counter_reducer, records_reducer, slack, sum_reducer, trace_a, trace_b,
    users_reducer,
};
use foldkv::{CommandLog, History, fold};

fn app_log() -> CommandLog<AppState, AppCommand> {
    CommandLog::builder(AppState::default())
        .reducer(records_reducer)
        .reducer(users_reducer)
        .build()
}

#[test]
fn test_update_and_read() {
    let log = app_log();

    log.update_one(|_| slack("user1", "compose"));
    assert_eq!(log.read(|s| s.records.len()), 1);

    log.update(|_| {
        (
            vec![
                AppCommand::NewUrlRecord {
                    user_id: "user1".into(),
                    url: "https://team.slack.com/feed".into(),
                },
                AppCommand::NewUrlRecord {
                    user_id: "user1".into(),
                    url: "https://team.slack.com/russian".into(),
                },
            ],
            (),
        )
    });
    assert_eq!(log.read(|s| s.records.len()), 3);
    assert_eq!(log.read(|s| s.users.len()), 0);

    log.update_one(|_| AppCommand::NewUser("user1".into()));
    assert_eq!(log.read(|s| s.records.len()), 3);
    assert_eq!(log.read(|s| s.users.len()), 1);

    // The transform sees current state and derives its command from it.
    log.update_one(|s| {
        let url = s
            .records
            .iter()
            .find(|r| r.url.ends_with("/compose"))
            .map(|r| r.url.clone())
            .unwrap_or_default();
        AppCommand::RemoveRecord {
            user_id: "user1".into(),
            url,
        }
    });
    assert_eq!(log.read(|s| s.records.len()), 2);
    assert_eq!(log.read(|s| s.users.len()), 1);
    assert_eq!(log.len(), 5);
}

#[test]
fn test_update_returns_result_from_pre_update_state() {
    let log = CommandLog::builder(0u64).reducer(sum_reducer).build();

    let before = log.update(|s| (vec![10, 20], *s));
    assert_eq!(before, 0);

    let before = log.update(|s| (vec![1], *s));
    assert_eq!(before, 30);
    assert_eq!(log.read(|s| *s), 31);
}

#[test]
fn test_read_does_not_grow_history() {
    let log = CommandLog::builder(0u64).reducer(counter_reducer).build();
    log.update(|_| (vec![1, 2], ()));

    for _ in 0..5 {
        assert_eq!(log.read(|s| *s), 2);
    }
    assert_eq!(log.len(), 2);
    assert_eq!(log.materialized(), 2);
}

#[test]
fn test_empty_update_is_noop() {
    let log = CommandLog::builder(0u64).reducer(counter_reducer).build();
    let result = log.update(|_| (Vec::new(), "nothing"));
    assert_eq!(result, "nothing");
    assert!(log.is_empty());
    assert_eq!(log.snapshot().state, 0);
}

#[test]
fn test_rewrite_log_trims_history() {
    let log = app_log();

    log.update(|_| ((0..3).map(|i| slack("user1", &format!("compose #{i}"))).collect(), ()));
    assert_eq!(log.rewrite_log(|h| (h.clone(), h.len())), 3);

    log.update(|_| ((0..3).map(|i| slack("user1", &format!("compose #{i}"))).collect(), ()));
    assert_eq!(log.rewrite_log(|h| (h.clone(), h.len())), 6);

    log.rewrite_log(|_| (History::new(), ()));
    assert_eq!(log.rewrite_log(|h| (h.clone(), h.len())), 0);

    // Derived state survives the trim.
    assert_eq!(log.read(|s| s.records.len()), 6);
    assert_eq!(log.materialized(), 0);
}

#[test]
fn test_rewrite_log_drops_saved_prefix() {
    let log = app_log();
    log.update(|_| ((0..3).map(|i| slack("user1", &format!("c{i}"))).collect(), ()));

    let saved = log.rewrite_log(|h| (h.clone(), h.clone()));
    assert_eq!(saved.len(), 3);

    log.update_one(|_| AppCommand::NewUser("user2".into()));
    log.rewrite_log(|h| {
        let mut kept = h.clone();
        (kept.split_off(saved.len()), ())
    });

    let history = log.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0], AppCommand::NewUser("user2".into()));
    assert_eq!(log.read(|s| (s.records.len(), s.users.len())), (3, 1));
}

#[test]
fn test_rewrite_log_folds_pending_first() {
    let log = CommandLog::builder(0u64).reducer(sum_reducer).build();
    log.append([5, 6]);
    assert_eq!(log.pending(), 2);

    log.rewrite_log(|_| (History::new(), ()));

    assert_eq!(log.pending(), 0);
    assert_eq!(log.snapshot().state, 11);
    assert_eq!(log.snapshot().offset, 0);
}

#[test]
fn test_append_leaves_delta_pending() {
    let log = CommandLog::builder(0u64).reducer(sum_reducer).build();

    assert_eq!(log.append([1, 2, 3]), 3);
    assert_eq!(log.materialized(), 0);
    assert_eq!(log.pending(), 3);
    assert_eq!(log.snapshot().state, 0);

    let snap = log.materialize();
    assert_eq!(snap.state, 6);
    assert_eq!(snap.offset, 3);
    assert_eq!(log.pending(), 0);

    assert_eq!(log.append([4]), 4);
    assert_eq!(log.snapshot().state, 6);
    assert_eq!(log.materialize().state, 10);
}

#[test]
fn test_append_nothing() {
    let log = CommandLog::builder(0u64).reducer(sum_reducer).build();
    assert_eq!(log.append(Vec::new()), 0);
    assert!(log.is_empty());
}

#[test]
fn test_materialize_idempotent() {
    let log = CommandLog::builder(0u64).reducer(sum_reducer).build();
    log.append([7]);
    let first = log.materialize();
    let second = log.materialize();
    assert_eq!(first, second);
    assert_eq!(second.state, 7);
}

#[test]
fn test_update_sees_pending_commands() {
    let log = CommandLog::builder(0u64).reducer(sum_reducer).build();
    log.append([2, 3]);

    let seen = log.update(|s| (vec![1], *s));
    assert_eq!(seen, 5);
    assert_eq!(log.snapshot().state, 6);
    assert_eq!(log.materialized(), 3);
}

#[test]
fn test_read_publishes_materialization() {
    let log = CommandLog::builder(0u64).reducer(sum_reducer).build();
    log.append([4, 4]);
    assert_eq!(log.read(|s| *s), 8);
    assert_eq!(log.pending(), 0);
    assert_eq!(log.snapshot().state, 8);
}

#[test]
fn test_seeded_history_is_replayed_once() {
    let log = CommandLog::builder(0u64)
        .reducer(sum_reducer)
        .history([1, 2, 3])
        .build();
    assert_eq!(log.len(), 3);
    assert_eq!(log.materialized(), 0);

    assert_eq!(log.materialize().state, 6);
    assert_eq!(log.materialize().state, 6);
}

#[test]
fn test_reducers_run_in_order_per_command() {
    let log = CommandLog::builder(Vec::new())
        .reducer(trace_a)
        .reducer(trace_b)
        .build();

    log.update(|_| (vec![1, 2], ()));
    log.update(|_| (vec![3], ()));

    assert_eq!(
        log.snapshot().state,
        vec!["a1", "b1", "a2", "b2", "a3", "b3"]
    );
}

#[test]
fn test_fold_matches_incremental_updates() {
    let reducers: [foldkv::ReduceFn<Vec<String>, u32>; 2] = [trace_a, trace_b];
    let commands = [1, 2, 3, 4];

    let log = CommandLog::new(Vec::new(), reducers.to_vec());
    log.update(|_| (commands[..1].to_vec(), ()));
    log.update(|_| (commands[1..].to_vec(), ()));

    assert_eq!(log.snapshot().state, fold(&reducers, Vec::new(), &commands));
}

#[test]
fn test_old_snapshots_unaffected_by_later_writes() {
    let log = CommandLog::builder(0u64).reducer(counter_reducer).build();
    log.update(|_| (vec![1, 2], ()));

    let history = log.history();
    let snap = log.snapshot();

    log.update(|_| (vec![3], ()));
    log.rewrite_log(|_| (History::new(), ()));

    assert_eq!(history.len(), 2);
    assert_eq!(snap.state, 2);
    assert_eq!(log.snapshot().state, 3);
}

#[test]
fn test_debug_output() {
    let log = CommandLog::builder(0u64).reducer(counter_reducer).build();
    log.append([1]);
    let debug = format!("{log:?}");
    assert!(debug.contains("len: 1"), "{debug}");
    assert!(debug.contains("materialized: 0"), "{debug}");
}
