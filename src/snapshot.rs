//! Point-in-time views of derived state.

/// A fully materialized view of a [`CommandLog`](crate::CommandLog)'s state.
///
/// `state` is the result of folding exactly `history[..offset]` through every
/// registered reducer. Readers never observe a partially folded command: a
/// snapshot is taken from one immutable generation of the log, so later
/// appends and rewrites cannot change it.
///
/// ```
/// use foldkv::CommandLog;
///
/// fn sum(state: u64, cmd: &u32) -> u64 {
///     state + u64::from(*cmd)
/// }
///
/// let log = CommandLog::builder(0u64).reducer(sum).build();
/// log.append([3, 4]);
///
/// // Appended but not yet folded.
/// let snap = log.snapshot();
/// assert_eq!((snap.state, snap.offset), (0, 0));
///
/// log.materialize();
/// let snap = log.snapshot();
/// assert_eq!((snap.state, snap.offset), (7, 2));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct Snapshot<S> {
    /// The derived state at the time of the snapshot.
    pub state: S,

    /// Materialization cursor: index of the first command not folded into
    /// `state`. Always `<= history.len()` of the generation it came from.
    pub offset: usize,
}

impl<S> Snapshot<S> {
    /// Create a new snapshot.
    pub fn new(state: S, offset: usize) -> Self {
        Snapshot { state, offset }
    }
}
