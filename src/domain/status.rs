//! Processing state machine statuses

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Status of a file moving through the pipeline
///
/// Happy path:
/// `Pending → Quarantined → Processing → Parsed → DbInserted → FileMoved → Success`.
/// `Success`, `Duplicate` and `FailedPermanent` are terminal. The `Failed*`
/// transient statuses are recorded per attempt and trigger a retry while the
/// attempt budget lasts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    Pending,
    Quarantined,
    Processing,
    Parsed,
    DbInserted,
    FileMoved,
    Success,
    Duplicate,
    FailedParsing,
    FailedDb,
    FailedMove,
    FailedPermanent,
}

impl ProcessingStatus {
    /// Statuses a file can legitimately sit in between pipeline steps.
    /// Rows stuck in one of these are candidates for reconciliation.
    pub const INTERMEDIATE: [ProcessingStatus; 5] = [
        ProcessingStatus::Pending,
        ProcessingStatus::Quarantined,
        ProcessingStatus::Processing,
        ProcessingStatus::Parsed,
        ProcessingStatus::DbInserted,
    ];

    /// Whether this status ends a file's journey
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessingStatus::Success
                | ProcessingStatus::Duplicate
                | ProcessingStatus::FailedPermanent
        )
    }

    pub fn is_intermediate(&self) -> bool {
        Self::INTERMEDIATE.contains(self)
    }
}
