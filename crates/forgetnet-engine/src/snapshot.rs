//! Append-only parameter snapshot stack.

use forgetnet_common::{ForgetError, Result};

use crate::model::ParameterSnapshot;

/// Stack of full by-value parameter captures bracketing destructive steps.
///
/// Index semantics follow the recovery contract: `recover(-1)` returns the
/// most recently pushed snapshot (the state before the current trial's
/// pruning), `recover(0)` the very first snapshot of the episode (full
/// un-pruning), and other indices count the same way a Python list would.
/// Recovery only *returns* the snapshot — resetting live session state and
/// reloading values is the host model's job.
#[derive(Debug, Clone, Default)]
pub struct ParameterSnapshotStack {
    stack: Vec<ParameterSnapshot>,
}

impl ParameterSnapshotStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a capture. The snapshot must already be a by-value copy.
    pub fn push(&mut self, snapshot: ParameterSnapshot) {
        self.stack.push(snapshot);
    }

    /// Fetch a snapshot without removing it.
    pub fn recover(&self, index: isize) -> Result<&ParameterSnapshot> {
        let depth = self.stack.len();
        let resolved = if index < 0 {
            depth as isize + index
        } else {
            index
        };
        if resolved < 0 || resolved as usize >= depth {
            return Err(ForgetError::SnapshotOutOfRange { index, depth });
        }
        Ok(&self.stack[resolved as usize])
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Drop all snapshots at episode start.
    pub fn clear(&mut self) {
        self.stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParamTensor;

    fn snap(tag: f32) -> ParameterSnapshot {
        let mut s = ParameterSnapshot::new();
        s.insert("fc1/weight".into(), ParamTensor::new(vec![1], vec![tag]));
        s
    }

    #[test]
    fn recover_minus_one_is_the_latest_push() {
        let mut stack = ParameterSnapshotStack::new();
        stack.push(snap(1.0));
        stack.push(snap(2.0));
        let latest = stack.recover(-1).unwrap();
        assert_eq!(latest["fc1/weight"].data, vec![2.0]);
        // Reading does not pop.
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn recover_zero_is_the_episode_origin() {
        let mut stack = ParameterSnapshotStack::new();
        for tag in 1..=5 {
            stack.push(snap(tag as f32));
        }
        assert_eq!(stack.recover(0).unwrap()["fc1/weight"].data, vec![1.0]);
    }

    #[test]
    fn out_of_range_indices_error() {
        let mut stack = ParameterSnapshotStack::new();
        assert!(matches!(
            stack.recover(-1),
            Err(ForgetError::SnapshotOutOfRange { depth: 0, .. })
        ));
        stack.push(snap(1.0));
        assert!(stack.recover(1).is_err());
        assert!(stack.recover(-2).is_err());
    }
}
