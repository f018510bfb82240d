//! Time-step selection passed through the entry point.

use std::collections::BTreeSet;

/// Which time steps a caller wants loaded, built, or run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepSelection {
    /// Every stored time step (a full 366-day year at 15 min resolution)
    All,
    /// No profile data at all
    None,
    /// An explicit list of steps
    Steps(Vec<i64>),
}

impl StepSelection {
    pub fn is_none(&self) -> bool {
        matches!(self, StepSelection::None)
            || matches!(self, StepSelection::Steps(steps) if steps.is_empty())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, StepSelection::All)
    }

    /// Explicit steps, ascending and deduplicated; `None` for `All`/`None`.
    pub fn explicit_sorted(&self) -> Option<Vec<i64>> {
        match self {
            StepSelection::Steps(steps) => {
                let set: BTreeSet<i64> = steps.iter().copied().collect();
                Some(set.into_iter().collect())
            }
            _ => None,
        }
    }

    /// First requested step, if the selection is explicit and non-empty.
    pub fn first(&self) -> Option<i64> {
        match self {
            StepSelection::Steps(steps) => steps.first().copied(),
            _ => None,
        }
    }

    /// Whether any requested step falls into `range` (half-open).
    pub fn intersects(&self, range: std::ops::Range<i64>) -> bool {
        match self {
            StepSelection::All => true,
            StepSelection::None => false,
            StepSelection::Steps(steps) => steps.iter().any(|s| range.contains(s)),
        }
    }
}

impl From<Vec<i64>> for StepSelection {
    fn from(steps: Vec<i64>) -> Self {
        StepSelection::Steps(steps)
    }
}

impl From<bool> for StepSelection {
    fn from(all: bool) -> Self {
        if all {
            StepSelection::All
        } else {
            StepSelection::None
        }
    }
}
