//! Ordered fallback chains.
//!
//! Several steps have more than one way of getting done (fast decode then
//! slow decode, native GIF then quantizing GIF, save dialog then download).
//! Each way is tried in order and reports an [`Attempt`]; `Cancelled` stops
//! the chain immediately.

/// Outcome of trying one strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    /// The strategy produced a result.
    Done(T),
    /// The strategy cannot be used here; the reason is kept for reporting.
    Unavailable(String),
    /// The user declined; no further strategy may run.
    Cancelled,
}

impl<T> Attempt<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, Attempt::Done(_))
    }
}

/// Try strategies in order until one is done or the user cancels.
///
/// When every strategy is unavailable the reasons are joined with `"; "`.
pub fn first_done<S, T>(
    strategies: impl IntoIterator<Item = S>,
    mut attempt: impl FnMut(S) -> Attempt<T>,
) -> Attempt<T> {
    let mut reasons = Vec::new();
    for strategy in strategies {
        match attempt(strategy) {
            Attempt::Unavailable(reason) => reasons.push(reason),
            other => return other,
        }
    }
    Attempt::Unavailable(reasons.join("; "))
}
