use crate::snapshot::Snapshot;
use arc_swap::ArcSwap;
use im::Vector;
use log::trace;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// A pure function that folds one command into state.
///
/// Reducers receive owned state and return owned state. They must depend on
/// nothing but the command and the running state, so that folding a history
/// in one pass or in several resumed passes gives the same result.
///
/// # Examples
///
/// ```
/// use foldkv::ReduceFn;
///
/// fn counter(state: u64, _cmd: &String) -> u64 {
///     state + 1
/// }
///
/// let reducer: ReduceFn<u64, String> = counter;
/// ```
pub type ReduceFn<S, C> = fn(S, &C) -> S;

/// The append-only command history.
///
/// A persistent vector: cloning is O(1) and shares structure, so a reader
/// holding an old history is unaffected by later appends.
pub type History<C> = Vector<C>;

/// Fold `commands` into `state`, command by command.
///
/// Every reducer runs, in registration order, on a command before the next
/// command is processed. For commands `c1, c2` and reducers `r1, r2` the
/// result is `r2(r1(r2(r1(state, c1), c1), c2), c2)`.
pub fn fold<'a, S, C: 'a>(
    reducers: &[ReduceFn<S, C>],
    state: S,
    commands: impl IntoIterator<Item = &'a C>,
) -> S {
    commands.into_iter().fold(state, |state, command| {
        reducers
            .iter()
            .fold(state, |state, reduce| reduce(state, command))
    })
}

/// One immutable generation of the log. Every mutation publishes a new one.
struct Generation<S, C> {
    state: S,
    history: History<C>,
    /// Index of the first command not yet folded into `state`.
    materialized: usize,
}

impl<S: Clone, C: Clone> Generation<S, C> {
    /// State with the pending delta `history[materialized..]` folded in.
    /// Borrows when nothing is pending.
    fn caught_up(&self, reducers: &[ReduceFn<S, C>]) -> Cow<'_, S> {
        if self.materialized == self.history.len() {
            Cow::Borrowed(&self.state)
        } else {
            Cow::Owned(fold(
                reducers,
                self.state.clone(),
                self.history.iter().skip(self.materialized),
            ))
        }
    }
}

/// An atomically updated pair of derived state and command history.
///
/// All mutation goes through a compare-and-swap on a single immutable
/// generation. Writers never block each other: a writer that loses the race
/// recomputes against the new generation and tries again. Readers load one
/// generation and see a state that is the fold of some prefix of history.
///
/// # Examples
///
/// ```
/// use foldkv::CommandLog;
///
/// fn total(state: i64, delta: &i64) -> i64 {
///     state + delta
/// }
///
/// let log = CommandLog::builder(0i64).reducer(total).build();
///
/// let before = log.update(|state| (vec![5, -2], *state));
/// assert_eq!(before, 0);
/// assert_eq!(log.read(|state| *state), 3);
/// assert_eq!(log.len(), 2);
/// ```
pub struct CommandLog<S, C> {
    current: ArcSwap<Generation<S, C>>,
    reducers: Vec<ReduceFn<S, C>>,
}

impl<S, C: Clone> fmt::Debug for CommandLog<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = self.current.load();
        f.debug_struct("CommandLog")
            .field("len", &current.history.len())
            .field("materialized", &current.materialized)
            .field("reducers", &self.reducers.len())
            .finish()
    }
}

impl<S: Clone, C: Clone> CommandLog<S, C> {
    /// Create a log with an empty history and the given reducers.
    pub fn new(initial: S, reducers: Vec<ReduceFn<S, C>>) -> Self {
        CommandLog::from_parts(initial, reducers, Vector::new())
    }

    /// Create a builder for registering reducers and seeding history.
    pub fn builder(initial: S) -> CommandLogBuilder<S, C> {
        CommandLogBuilder {
            initial,
            reducers: Vec::new(),
            history: Vector::new(),
        }
    }

    fn from_parts(initial: S, reducers: Vec<ReduceFn<S, C>>, history: History<C>) -> Self {
        CommandLog {
            current: ArcSwap::from_pointee(Generation {
                state: initial,
                history,
                materialized: 0,
            }),
            reducers,
        }
    }

    /// Apply `f` to the current state and append the commands it returns.
    ///
    /// `f` sees the fully materialized state. The commands it returns are
    /// folded through every reducer and appended as one contiguous block;
    /// its second return value is handed back to the caller.
    ///
    /// `f` may run more than once if another writer commits first, so it
    /// must be free of side effects.
    pub fn update<T>(&self, mut f: impl FnMut(&S) -> (Vec<C>, T)) -> T {
        self.swap_with(|current| {
            let state = current.caught_up(&self.reducers);
            let (commands, result) = f(&*state);

            if commands.is_empty() && matches!(state, Cow::Borrowed(_)) {
                return (None, result);
            }

            let state = fold(&self.reducers, state.into_owned(), &commands);
            let mut history = current.history.clone();
            history.extend(commands);
            let materialized = history.len();
            (
                Some(Generation {
                    state,
                    history,
                    materialized,
                }),
                result,
            )
        })
    }

    /// Append the single command produced by `f`.
    pub fn update_one(&self, mut f: impl FnMut(&S) -> C) {
        self.update(|state| (vec![f(state)], ()))
    }

    /// Evaluate `g` against a consistent, fully materialized state.
    ///
    /// This is [`update`](Self::update) with no commands: history is never
    /// changed, though a pending delta left by [`append`](Self::append) is
    /// folded and published on the way.
    pub fn read<T>(&self, mut g: impl FnMut(&S) -> T) -> T {
        self.update(|state| (Vec::new(), g(state)))
    }

    /// Append commands without folding them.
    ///
    /// The materialization cursor stays where it is; the new commands are
    /// folded by the next [`materialize`](Self::materialize), `update` or
    /// `read`. Returns the history length after the append.
    pub fn append<I>(&self, commands: I) -> usize
    where
        I: IntoIterator<Item = C>,
    {
        let commands: History<C> = commands.into_iter().collect();
        self.swap_with(|current| {
            if commands.is_empty() {
                return (None, current.history.len());
            }
            let mut history = current.history.clone();
            history.append(commands.clone());
            let len = history.len();
            (
                Some(Generation {
                    state: current.state.clone(),
                    history,
                    materialized: current.materialized,
                }),
                len,
            )
        })
    }

    /// Fold the pending delta `history[cursor..]` and advance the cursor to
    /// the end of history. Returns the resulting snapshot.
    ///
    /// Only the delta is folded; history before the cursor is never replayed.
    pub fn materialize(&self) -> Snapshot<S> {
        self.swap_with(|current| match current.caught_up(&self.reducers) {
            Cow::Borrowed(state) => (None, Snapshot::new(state.clone(), current.materialized)),
            Cow::Owned(state) => {
                let materialized = current.history.len();
                let snapshot = Snapshot::new(state.clone(), materialized);
                (
                    Some(Generation {
                        state,
                        history: current.history.clone(),
                        materialized,
                    }),
                    snapshot,
                )
            }
        })
    }

    /// Atomically replace the history.
    ///
    /// Any pending delta is folded first, so the derived state keeps
    /// reflecting every command the old history held. The cursor is then
    /// set to the length of the new history in the same swap, which keeps
    /// state and cursor consistent with the new indexing.
    ///
    /// `f` may run more than once under contention.
    pub fn rewrite_log<T>(&self, mut f: impl FnMut(&History<C>) -> (History<C>, T)) -> T {
        self.swap_with(|current| {
            let state = current.caught_up(&self.reducers).into_owned();
            let (history, result) = f(&current.history);
            let materialized = history.len();
            (
                Some(Generation {
                    state,
                    history,
                    materialized,
                }),
                result,
            )
        })
    }

    /// The most recently materialized state and its cursor.
    ///
    /// No folding happens here; commands added with `append` and not yet
    /// materialized are not reflected.
    pub fn snapshot(&self) -> Snapshot<S> {
        let current = self.current.load();
        Snapshot::new(current.state.clone(), current.materialized)
    }

    /// A structurally shared copy of the current history.
    pub fn history(&self) -> History<C> {
        self.current.load().history.clone()
    }

    /// Number of commands in the history.
    pub fn len(&self) -> usize {
        self.current.load().history.len()
    }

    /// Returns `true` if the history holds no commands.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The materialization cursor.
    pub fn materialized(&self) -> usize {
        self.current.load().materialized
    }

    /// Number of commands appended but not yet folded.
    pub fn pending(&self) -> usize {
        let current = self.current.load();
        current.history.len() - current.materialized
    }

    /// The lock-free retry loop behind every mutation.
    ///
    /// `f` returns the next generation, or `None` to leave the log untouched.
    /// A failed compare-and-swap discards `f`'s output and reruns it against
    /// the generation that won.
    fn swap_with<T>(
        &self,
        mut f: impl FnMut(&Generation<S, C>) -> (Option<Generation<S, C>>, T),
    ) -> T {
        let mut attempts = 0u32;
        loop {
            let current = self.current.load_full();
            let (next, result) = f(&*current);
            let Some(next) = next else {
                return result;
            };

            let previous = self.current.compare_and_swap(&current, Arc::new(next));
            if Arc::ptr_eq(&current, &*previous) {
                return result;
            }

            attempts += 1;
            trace!("command log: lost compare-and-swap race, retry {attempts}");
        }
    }
}

/// Builder for [`CommandLog`].
///
/// # Examples
///
/// ```
/// use foldkv::CommandLog;
///
/// fn count(state: (u64, u64), _cmd: &u8) -> (u64, u64) {
///     (state.0 + 1, state.1)
/// }
///
/// fn sum(state: (u64, u64), cmd: &u8) -> (u64, u64) {
///     (state.0, state.1 + u64::from(*cmd))
/// }
///
/// let log = CommandLog::builder((0, 0))
///     .reducer(count)
///     .reducer(sum)
///     .history([1, 2, 3])
///     .build();
///
/// // Seeded history is pending until materialized.
/// assert_eq!(log.pending(), 3);
/// assert_eq!(log.materialize().state, (3, 6));
/// ```
pub struct CommandLogBuilder<S, C> {
    initial: S,
    reducers: Vec<ReduceFn<S, C>>,
    history: History<C>,
}

impl<S: Clone, C: Clone> CommandLogBuilder<S, C> {
    /// Register a reducer. Reducers run in registration order.
    pub fn reducer(mut self, reducer: ReduceFn<S, C>) -> Self {
        self.reducers.push(reducer);
        self
    }

    /// Seed the history. Seeded commands are not folded: the cursor starts
    /// at 0 and the first materialization replays them.
    pub fn history<I>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = C>,
    {
        self.history.extend(commands);
        self
    }

    /// Build the log.
    pub fn build(self) -> CommandLog<S, C> {
        CommandLog::from_parts(self.initial, self.reducers, self.history)
    }
}
