//! Wizard stage machine with thread-safe transitions.
//!
//! Valid moves:
//! - AwaitingQuery -> AwaitingSource (query accepted)
//! - AwaitingSource -> ShowingResult (submitted)
//! - AwaitingSource -> AwaitingQuery (back)
//!
//! Anything else is refused. `reset` returns to AwaitingQuery from anywhere.

use std::sync::{Arc, Mutex, PoisonError};

use kiki_core::error::KikiError;
use kiki_core::types::{StageMarker, WizardStage};

#[derive(Debug, Clone)]
pub struct StageMachine {
    stage: Arc<Mutex<WizardStage>>,
}

impl Default for StageMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StageMachine {
    pub fn new() -> Self {
        Self {
            stage: Arc::new(Mutex::new(WizardStage::AwaitingQuery)),
        }
    }

    pub fn current(&self) -> WizardStage {
        *self.stage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn progress(&self) -> [StageMarker; 3] {
        self.current().progress()
    }

    /// Move to `target`, returning the stage left behind.
    pub fn transition(&self, target: WizardStage) -> Result<WizardStage, KikiError> {
        let mut stage = self.stage.lock().unwrap_or_else(PoisonError::into_inner);
        if stage.can_transition_to(&target) {
            let from = *stage;
            tracing::debug!("Wizard stage: {} -> {}", from, target);
            *stage = target;
            Ok(from)
        } else {
            Err(KikiError::InvalidTransition {
                from: stage.to_string(),
                to: target.to_string(),
            })
        }
    }

    /// Force the machine back to AwaitingQuery, returning the stage left behind.
    pub fn reset(&self) -> WizardStage {
        let mut stage = self.stage.lock().unwrap_or_else(PoisonError::into_inner);
        let from = *stage;
        *stage = WizardStage::AwaitingQuery;
        from
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_awaiting_query() {
        let machine = StageMachine::new();
        assert_eq!(machine.current(), WizardStage::AwaitingQuery);
        assert_eq!(
            machine.progress(),
            [StageMarker::Active, StageMarker::Inactive, StageMarker::Inactive]
        );
    }

    #[test]
    fn test_full_forward_path() {
        let machine = StageMachine::new();
        assert_eq!(
            machine.transition(WizardStage::AwaitingSource).unwrap(),
            WizardStage::AwaitingQuery
        );
        assert_eq!(
            machine.transition(WizardStage::ShowingResult).unwrap(),
            WizardStage::AwaitingSource
        );
        assert_eq!(machine.current(), WizardStage::ShowingResult);
    }

    #[test]
    fn test_back_clears_completed_marker() {
        let machine = StageMachine::new();
        machine.transition(WizardStage::AwaitingSource).unwrap();
        assert_eq!(machine.progress()[0], StageMarker::Completed);

        machine.transition(WizardStage::AwaitingQuery).unwrap();
        assert_eq!(machine.progress()[0], StageMarker::Active);
        assert_eq!(machine.progress()[1], StageMarker::Inactive);
    }

    #[test]
    fn test_skip_is_refused() {
        let machine = StageMachine::new();
        let err = machine.transition(WizardStage::ShowingResult).unwrap_err();
        assert!(matches!(err, KikiError::InvalidTransition { .. }));
        assert_eq!(machine.current(), WizardStage::AwaitingQuery);
    }

    #[test]
    fn test_reset_from_result() {
        let machine = StageMachine::new();
        machine.transition(WizardStage::AwaitingSource).unwrap();
        machine.transition(WizardStage::ShowingResult).unwrap();
        assert_eq!(machine.reset(), WizardStage::ShowingResult);
        assert_eq!(machine.current(), WizardStage::AwaitingQuery);
    }

    #[test]
    fn test_clones_share_state() {
        let machine = StageMachine::new();
        let other = machine.clone();
        machine.transition(WizardStage::AwaitingSource).unwrap();
        assert_eq!(other.current(), WizardStage::AwaitingSource);
    }
}
