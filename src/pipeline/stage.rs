use tracing::debug;

use crate::error::{IngestError, Result};

/// Where an ingestion run currently is.
///
/// Raw CSV goes `Reading → Validating → Aggregating → Merging → Done`;
/// pre-aggregated payloads jump from `Reading` straight to `Merging`.
/// `Aborted` is terminal and reached from `Reading` (unreadable CSV) or
/// `Validating` (error budget exceeded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Reading,
    Validating,
    Aborted,
    Aggregating,
    Merging,
    Done,
}

impl Stage {
    pub fn can_advance_to(self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (Reading, Validating)
                | (Reading, Merging)
                | (Reading, Aborted)
                | (Validating, Aborted)
                | (Validating, Aggregating)
                | (Aggregating, Merging)
                | (Merging, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Aborted | Stage::Done)
    }

    /// Moves to `next`, or fails without changing state if the move is not allowed.
    pub fn advance(&mut self, next: Stage) -> Result<()> {
        if !self.can_advance_to(next) {
            return Err(IngestError::IllegalTransition {
                from: *self,
                to: next,
            });
        }
        debug!(from = ?*self, to = ?next, "Pipeline stage change");
        *self = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_path() {
        let mut stage = Stage::Reading;
        for next in [
            Stage::Validating,
            Stage::Aggregating,
            Stage::Merging,
            Stage::Done,
        ] {
            stage.advance(next).unwrap();
        }
        assert!(stage.is_terminal());
    }

    #[test]
    fn test_pre_aggregated_path_converges_on_merging() {
        let mut stage = Stage::Reading;
        stage.advance(Stage::Merging).unwrap();
        stage.advance(Stage::Done).unwrap();
        assert_eq!(stage, Stage::Done);
    }

    #[test]
    fn test_abort_paths() {
        let mut stage = Stage::Reading;
        stage.advance(Stage::Validating).unwrap();
        stage.advance(Stage::Aborted).unwrap();
        assert!(stage.is_terminal());

        let mut stage = Stage::Reading;
        stage.advance(Stage::Aborted).unwrap();
        assert!(stage.is_terminal());
    }

    #[test]
    fn test_illegal_transition_keeps_state() {
        let mut stage = Stage::Validating;
        let err = stage.advance(Stage::Merging).unwrap_err();
        assert!(matches!(
            err,
            IngestError::IllegalTransition {
                from: Stage::Validating,
                to: Stage::Merging
            }
        ));
        assert_eq!(stage, Stage::Validating);

        let mut stage = Stage::Aborted;
        assert!(stage.advance(Stage::Aggregating).is_err());
        assert!(stage.advance(Stage::Done).is_err());
    }
}
