//! Answer review state machine.
//!
//! Transition table:
//!
//! | From      | Action        | To        | Guard                    |
//! |-----------|---------------|-----------|--------------------------|
//! | GENERATED | confirm       | CONFIRMED | —                        |
//! | GENERATED | reject        | REJECTED  | —                        |
//! | GENERATED | submit manual | MANUAL    | manual text non-empty    |
//!
//! Everything else is a conflict and leaves the state unchanged.
//! Regeneration (returning any state to GENERATED) is handled by the
//! synthesis path, not here.

use diligence_core::{AppError, AppResult};

use crate::types::AnswerStatus;

/// Human review action applied to a generated answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewAction {
    Confirm,
    Reject,
    SubmitManual,
}

impl ReviewAction {
    /// Parse a CLI/API action name.
    pub fn parse(s: &str) -> AppResult<Self> {
        match s.to_lowercase().as_str() {
            "confirm" => Ok(Self::Confirm),
            "reject" => Ok(Self::Reject),
            "manual" => Ok(Self::SubmitManual),
            other => Err(AppError::Validation(format!(
                "Unknown review action: {} (expected confirm, reject, or manual)",
                other
            ))),
        }
    }
}

/// Compute the target state for a review action.
///
/// Fails with a conflict when the current state does not admit the action,
/// and with a validation error when a manual submission carries no text.
/// The caller persists the returned state; on error nothing changes.
pub fn apply_review(
    current: AnswerStatus,
    action: &ReviewAction,
    manual_text: Option<&str>,
) -> AppResult<AnswerStatus> {
    if current != AnswerStatus::Generated {
        return Err(AppError::Conflict(format!(
            "Cannot apply review action in state {}; only GENERATED answers can be reviewed",
            current.as_str()
        )));
    }

    match action {
        ReviewAction::Confirm => Ok(AnswerStatus::Confirmed),
        ReviewAction::Reject => Ok(AnswerStatus::Rejected),
        ReviewAction::SubmitManual => {
            let text = manual_text.map(str::trim).unwrap_or("");
            if text.is_empty() {
                return Err(AppError::Validation(
                    "Manual answer text must not be empty".to_string(),
                ));
            }
            Ok(AnswerStatus::Manual)
        }
    }
}
