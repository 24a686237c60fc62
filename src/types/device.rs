#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Download progress: `completed` frame exchanges out of `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed as f64 / self.total as f64
    }
}

/// Outcome of a memory erase request.
///
/// A non-zero status is reported to the caller, not raised as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ClearStatus {
    Cleared,
    Rejected(u32),
}

impl ClearStatus {
    pub fn from_status(status: u32) -> Self {
        if status == 0 {
            ClearStatus::Cleared
        } else {
            ClearStatus::Rejected(status)
        }
    }

    pub fn is_cleared(&self) -> bool {
        matches!(self, ClearStatus::Cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_fraction() {
        let progress = Progress {
            completed: 3,
            total: 4,
        };
        assert_eq!(progress.fraction(), 0.75);
        let empty = Progress {
            completed: 0,
            total: 0,
        };
        assert_eq!(empty.fraction(), 1.0);
    }
}
