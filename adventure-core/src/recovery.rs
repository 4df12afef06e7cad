//! Last-known-good snapshots and rollback.
//!
//! A [`RecoveryManager`] belongs to one session. Every candidate state goes
//! through [`RecoveryManager::ensure_consistency`]: a consistent candidate
//! becomes the new snapshot, an inconsistent one is discarded in favour of
//! the snapshot. A state that was never validated is never handed back.
//!
//! Once a snapshot exists, a candidate must also keep everything it records:
//! its clues, inventory and met characters contain the snapshot's, and the
//! snapshot's messages are a prefix of its own. Losing any of that is
//! reported under [`MONOTONIC_CHECK`] and rolled back like any other
//! violation.

use crate::state::NarrativeState;
use crate::story::StoryGraph;
use crate::validate::{ValidationReport, Validator};
use thiserror::Error;
use tracing::{debug, warn};

/// Name under which lost progress is reported.
pub const MONOTONIC_CHECK: &str = "monotonic-check";

/// Errors from recovery.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("inconsistent state with no snapshot to roll back to: {report}")]
    NoPriorSnapshot { report: ValidationReport },
}

/// What happened to a candidate state.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Committed,
    RolledBack(ValidationReport),
}

/// The state a session continues from, and how it got there.
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub state: NarrativeState,
    pub outcome: Outcome,
}

impl Reconciled {
    pub fn is_committed(&self) -> bool {
        matches!(self.outcome, Outcome::Committed)
    }

    /// Violations that caused a rollback, `None` when committed.
    pub fn violations(&self) -> Option<&ValidationReport> {
        match &self.outcome {
            Outcome::Committed => None,
            Outcome::RolledBack(report) => Some(report),
        }
    }
}

/// Per-session holder of the last consistent state.
#[derive(Debug, Default)]
pub struct RecoveryManager {
    last_good: Option<NarrativeState>,
    validator: Validator,
}

impl RecoveryManager {
    /// A manager with the standard checks and no snapshot yet.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_validator(validator: Validator) -> Self {
        Self {
            last_good: None,
            validator,
        }
    }

    /// Rebuild a manager from a snapshot supplied by the caller, such as one
    /// carried in a request payload. The snapshot must itself be consistent.
    pub fn resume(snapshot: NarrativeState, story: &StoryGraph) -> Result<Self, RecoveryError> {
        let mut manager = Self::new();
        manager.ensure_consistency(snapshot, story)?;
        Ok(manager)
    }

    /// The last committed state, if any.
    pub fn snapshot(&self) -> Option<&NarrativeState> {
        self.last_good.as_ref()
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Validate without touching the snapshot.
    pub fn check(&self, state: &NarrativeState, story: &StoryGraph) -> ValidationReport {
        self.validator.validate(state, story)
    }

    /// Commit `candidate` if it is consistent, otherwise fall back to the snapshot.
    pub fn ensure_consistency(
        &mut self,
        candidate: NarrativeState,
        story: &StoryGraph,
    ) -> Result<Reconciled, RecoveryError> {
        let mut report = self.check(&candidate, story);
        if let Some(snapshot) = &self.last_good {
            for description in regressions(snapshot, &candidate) {
                report.push(MONOTONIC_CHECK, description);
            }
        }

        if report.is_consistent() {
            debug!(scene = %candidate.current_scene, "Committing state");
            self.last_good = Some(candidate.clone());
            return Ok(Reconciled {
                state: candidate,
                outcome: Outcome::Committed,
            });
        }

        for violation in report.violations() {
            warn!(check = %violation.check, "{}", violation.description);
        }

        match &self.last_good {
            Some(snapshot) => {
                warn!(
                    violations = report.len(),
                    scene = %snapshot.current_scene,
                    "Rolling back to last consistent state"
                );
                Ok(Reconciled {
                    state: snapshot.clone(),
                    outcome: Outcome::RolledBack(report),
                })
            }
            None => Err(RecoveryError::NoPriorSnapshot { report }),
        }
    }
}

/// Every way `candidate` drops progress recorded in `snapshot`.
fn regressions(snapshot: &NarrativeState, candidate: &NarrativeState) -> Vec<String> {
    fn missing<'a>(
        kept: &'a [String],
        next: &'a [String],
    ) -> impl Iterator<Item = &'a String> + 'a {
        kept.iter().filter(move |entry| !next.contains(entry))
    }

    let mut found = Vec::new();
    for clue in missing(&snapshot.discovered_clues, &candidate.discovered_clues) {
        found.push(format!("Discovered clue '{clue}' was lost"));
    }
    for item in missing(&snapshot.inventory, &candidate.inventory) {
        found.push(format!("Inventory item '{item}' was lost"));
    }
    for character in missing(
        &snapshot.progress.met_characters,
        &candidate.progress.met_characters,
    ) {
        found.push(format!("Met character '{character}' was forgotten"));
    }
    if !candidate.messages.starts_with(&snapshot.messages) {
        found.push(format!(
            "Message log was rewritten ({} committed, {} in candidate)",
            snapshot.messages.len(),
            candidate.messages.len()
        ));
    }
    found
}
