use crate::api::ApiError;

/// Typed result of a store action.
///
/// Actions never propagate transport failures to the caller; they restore
/// their flags, log, and report what happened here so a UI layer can react
/// to more than a loading flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The action ran to completion and the cache reflects it.
    Completed,
    /// The action was disabled by configuration or had nothing to do.
    Skipped,
    /// A transient failure; the cache keeps whatever state it had and
    /// retrying later may succeed.
    Recoverable(String),
    /// The backend rejected the session; the store has been logged out.
    Unauthorized,
}

impl ActionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ActionOutcome::Completed)
    }

    pub(crate) fn from_error(err: &ApiError) -> Self {
        match err {
            ApiError::Unauthorized => ActionOutcome::Unauthorized,
            other => ActionOutcome::Recoverable(other.to_string()),
        }
    }
}
