//! Token estimation seam.

use std::fmt::Debug;

/// Estimates the token length of a text fragment.
///
/// Implementations must be deterministic, cheap (no I/O), return 0 for the
/// empty string, and never report fewer tokens for a longer text. The same
/// counter must be used everywhere a given total is checked.
pub trait TokenCounter: Debug + Send + Sync {
    /// Estimated token count for `text`.
    fn estimate(&self, text: &str) -> usize;

    /// Sum of estimates over a sequence of fragments.
    fn estimate_all<'a, I>(&self, fragments: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
        Self: Sized,
    {
        fragments.into_iter().map(|f| self.estimate(f)).sum()
    }
}
