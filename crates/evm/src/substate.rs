//! The accrued transaction sub state.

use basalt_primitives::LogEntry;

/// Side effects accumulated by a frame and merged into its parent when the
/// frame succeeds; discarded on revert or exceptional halt. The touched and
/// destruction sets ride in the account repository, whose savepoints revert
/// them along with state writes.
#[derive(Debug, Clone, Default)]
pub struct Substate {
    /// Logs in emission order, across nested frames.
    pub logs: Vec<LogEntry>,
    /// Accumulated gas refund, capped at half the consumed gas when the
    /// transaction settles.
    pub refund: u64,
}

impl Substate {
    /// Folds a successful child frame's effects into this one.
    pub fn merge(&mut self, child: Substate) {
        self.logs.extend(child.logs);
        self.refund += child.refund;
    }
}
