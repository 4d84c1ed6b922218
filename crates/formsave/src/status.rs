//! Save status state machine.

/// Lifecycle state of an auto-save session.
///
/// Drives the human-readable save indicator next to a form. Transitions are
/// owned entirely by [`AutoSaveSession`](crate::AutoSaveSession):
///
/// ```text
/// pristine --mark_dirty--> pending
/// pending  --debounce elapses or save_now--> saving
/// saving   --success--> saved --indicator timeout, still clean--> pristine
/// saving   --success, edited mid-flight--> pending
/// saving   --failure, retries left--> saving (after backoff)
/// saving   --failure, retries exhausted--> error
/// error    --mark_dirty--> pending
/// error    --save_now--> saving
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveStatus {
    /// No unsaved changes and no recent save to report.
    #[default]
    Pristine,
    /// Unsaved changes exist; a save is scheduled or awaited.
    Pending,
    /// A save attempt (possibly retrying) is in flight.
    Saving,
    /// The last save succeeded; shown until the indicator decays.
    Saved,
    /// The last save failed after exhausting its retry budget.
    Error,
}

impl SaveStatus {
    /// Canonical lowercase name, as rendered by save indicators.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Pristine => "pristine",
            Self::Pending => "pending",
            Self::Saving => "saving",
            Self::Saved => "saved",
            Self::Error => "error",
        }
    }

    /// Check if a save attempt is in flight.
    #[must_use]
    pub fn is_saving(self) -> bool {
        matches!(self, Self::Saving)
    }

    /// Check if the last save failed permanently.
    #[must_use]
    pub fn is_error(self) -> bool {
        matches!(self, Self::Error)
    }

    /// Check if edits exist that have not been confirmed by a save yet.
    #[must_use]
    pub fn is_unsaved(self) -> bool {
        matches!(self, Self::Pending | Self::Saving | Self::Error)
    }
}
