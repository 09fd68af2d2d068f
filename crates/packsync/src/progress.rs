//! Progress reporting for long-running transfer operations.
//!
//! Every IO-heavy operation in the engine reports through the same callback
//! contract: cumulative units done plus a total that may be unknown when the
//! remote does not announce a size.

use std::sync::Arc;

/// Progress callback type shared by all transfer operations.
pub type ProgressCallback = Arc<dyn Fn(SyncProgress) + Send + Sync>;

/// A single progress observation.
///
/// `done` is monotonically non-decreasing within one operation. `total` is
/// `None` when the remote reports no size and no hint is available; callers
/// must tolerate a ratio that looks non-monotonic when the total is an
/// estimate. On success the final observation satisfies `done == total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncProgress {
    /// Units (bytes) completed so far.
    pub done: u64,
    /// Expected total units, if known.
    pub total: Option<u64>,
}

impl SyncProgress {
    /// Create a new progress observation.
    pub fn new(done: u64, total: Option<u64>) -> Self {
        Self { done, total }
    }

    /// Progress as a percentage (0.0 to 100.0); 0.0 when the total is unknown.
    pub fn percentage(&self) -> f64 {
        match self.total {
            Some(total) if total > 0 => (self.done as f64 / total as f64) * 100.0,
            _ => 0.0,
        }
    }

    /// Whether the operation has reached its known total.
    pub fn is_complete(&self) -> bool {
        matches!(self.total, Some(total) if total > 0 && self.done >= total)
    }

    /// Remaining units, when the total is known.
    pub fn remaining(&self) -> Option<u64> {
        self.total.map(|total| total.saturating_sub(self.done))
    }
}

impl std::fmt::Display for SyncProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.total {
            Some(total) => write!(
                f,
                "{}/{} bytes ({:.1}%)",
                self.done,
                total,
                self.percentage()
            ),
            None => write!(f, "{} bytes", self.done),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        assert_eq!(SyncProgress::new(50, Some(200)).percentage(), 25.0);
        assert_eq!(SyncProgress::new(50, None).percentage(), 0.0);
        assert_eq!(SyncProgress::new(50, Some(0)).percentage(), 0.0);
    }

    #[test]
    fn test_is_complete() {
        assert!(SyncProgress::new(200, Some(200)).is_complete());
        assert!(!SyncProgress::new(199, Some(200)).is_complete());
        assert!(!SyncProgress::new(200, None).is_complete());
    }

    #[test]
    fn test_remaining() {
        assert_eq!(SyncProgress::new(50, Some(200)).remaining(), Some(150));
        assert_eq!(SyncProgress::new(250, Some(200)).remaining(), Some(0));
        assert_eq!(SyncProgress::new(50, None).remaining(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            SyncProgress::new(50, Some(200)).to_string(),
            "50/200 bytes (25.0%)"
        );
        assert_eq!(SyncProgress::new(50, None).to_string(), "50 bytes");
    }
}
