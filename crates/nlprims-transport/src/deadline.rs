use std::time::{Duration, Instant};

/// Per-operation deadline tracking.
///
/// Two budgets are combined: `block` bounds a single wait, `total` bounds the
/// whole operation measured from the last [`Deadline::mark_start`]. `None`
/// means no limit for that budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Deadline {
    block: Option<Duration>,
    total: Option<Duration>,
    start: Option<Instant>,
}

impl Deadline {
    /// Create a deadline with explicit block and total budgets.
    pub fn new(block: Option<Duration>, total: Option<Duration>) -> Self {
        Self {
            block,
            total,
            start: None,
        }
    }

    /// A deadline that never expires.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Record the start of an operation.
    pub fn mark_start(&mut self) {
        self.start = Some(Instant::now());
    }

    /// Per-wait budget.
    pub fn block(&self) -> Option<Duration> {
        self.block
    }

    /// Whole-operation budget.
    pub fn total(&self) -> Option<Duration> {
        self.total
    }

    pub fn set_block(&mut self, block: Option<Duration>) {
        self.block = block;
    }

    pub fn set_total(&mut self, total: Option<Duration>) {
        self.total = total;
    }

    /// Time elapsed since the last `mark_start`, zero if never started.
    pub fn elapsed(&self) -> Duration {
        self.start.map(|s| s.elapsed()).unwrap_or_default()
    }

    /// How long the next wait may last.
    ///
    /// Returns `None` when both budgets are unlimited. Otherwise the result is
    /// the smaller of the block budget and whatever remains of the total
    /// budget, saturating at zero.
    pub fn remaining(&self) -> Option<Duration> {
        let left = self.total.map(|t| t.saturating_sub(self.elapsed()));
        match (self.block, left) {
            (None, None) => None,
            (Some(b), None) => Some(b),
            (None, Some(l)) => Some(l),
            (Some(b), Some(l)) => Some(b.min(l)),
        }
    }

    /// True when no wait budget is left.
    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|d| d.is_zero())
    }

    /// The budget to report in a timeout error.
    pub fn budget(&self) -> Duration {
        match (self.block, self.total) {
            (Some(b), Some(t)) => b.min(t),
            (Some(b), None) => b,
            (None, Some(t)) => t,
            (None, None) => Duration::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_has_no_remaining_limit() {
        let mut deadline = Deadline::unbounded();
        deadline.mark_start();
        assert_eq!(deadline.remaining(), None);
        assert!(!deadline.is_expired());
    }

    #[test]
    fn block_only_is_constant() {
        let mut deadline = Deadline::new(Some(Duration::from_millis(250)), None);
        deadline.mark_start();
        assert_eq!(deadline.remaining(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn total_budget_shrinks_with_elapsed_time() {
        let mut deadline = Deadline::new(None, Some(Duration::from_millis(50)));
        deadline.mark_start();
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
        assert!(deadline.is_expired());
    }

    #[test]
    fn combined_takes_the_smaller_budget() {
        let mut deadline = Deadline::new(
            Some(Duration::from_millis(10)),
            Some(Duration::from_secs(10)),
        );
        deadline.mark_start();
        assert_eq!(deadline.remaining(), Some(Duration::from_millis(10)));
        assert_eq!(deadline.budget(), Duration::from_millis(10));
    }

    #[test]
    fn setters_replace_budgets() {
        let mut deadline = Deadline::unbounded();
        deadline.set_block(Some(Duration::from_secs(1)));
        deadline.set_total(Some(Duration::from_secs(3)));
        assert_eq!(deadline.block(), Some(Duration::from_secs(1)));
        assert_eq!(deadline.total(), Some(Duration::from_secs(3)));
    }
}
