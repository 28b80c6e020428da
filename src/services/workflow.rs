//! Record review state machine.
//!
//! A record is created `Pending` and leaves that state exactly once, to
//! `Accepted` or `Rejected`. Both outcomes are terminal.

use uuid::Uuid;

use crate::errors::AppError;
use crate::middleware::auth::CurrentUser;
use crate::models::approval::ApprovalAction;
use crate::models::record::RecordStatus;

/// User performing a record operation.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Uuid,
    pub username: String,
    pub is_admin: bool,
}

impl From<&CurrentUser> for Actor {
    fn from(user: &CurrentUser) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            is_admin: user.is_admin(),
        }
    }
}

impl Actor {
    /// Admins may act on any record; employees only on their own.
    pub fn ensure_can_access(&self, owner_id: Uuid) -> Result<(), AppError> {
        if self.is_admin || self.id == owner_id {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "You can only access your own records".to_string(),
            ))
        }
    }
}

/// Status a record moves to for a given review action.
pub fn target_status(action: ApprovalAction) -> RecordStatus {
    match action {
        ApprovalAction::Accepted => RecordStatus::Accepted,
        ApprovalAction::Rejected => RecordStatus::Rejected,
    }
}

/// Check whether a status transition is valid per the state machine graph.
pub fn is_valid_transition(from: RecordStatus, to: RecordStatus) -> bool {
    matches!(
        (from, to),
        (RecordStatus::Pending, RecordStatus::Accepted)
            | (RecordStatus::Pending, RecordStatus::Rejected)
    )
}

/// Only pending records may be edited, have photos changed, or be deleted.
pub fn ensure_mutable(status: RecordStatus) -> Result<(), AppError> {
    if status == RecordStatus::Pending {
        Ok(())
    } else {
        Err(AppError::InvalidTransition(format!(
            "Record is {} and can no longer be modified",
            status.as_str()
        )))
    }
}

/// Validate a review decision against the record's current status.
///
/// Returns the trimmed notes to store with the approval entry.
pub fn validate_review(
    current: RecordStatus,
    action: ApprovalAction,
    notes: Option<&str>,
) -> Result<Option<String>, AppError> {
    let to = target_status(action);
    if !is_valid_transition(current, to) {
        return Err(AppError::InvalidTransition(format!(
            "Cannot transition record from {} to {}",
            current.as_str(),
            to.as_str()
        )));
    }

    let notes = notes.map(str::trim).filter(|n| !n.is_empty());
    if action == ApprovalAction::Rejected && notes.is_none() {
        return Err(AppError::Validation(
            "Rejection requires notes explaining the reason".to_string(),
        ));
    }

    Ok(notes.map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_to_accepted() {
        assert!(is_valid_transition(
            RecordStatus::Pending,
            RecordStatus::Accepted
        ));
    }

    #[test]
    fn pending_to_rejected() {
        assert!(is_valid_transition(
            RecordStatus::Pending,
            RecordStatus::Rejected
        ));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in [RecordStatus::Accepted, RecordStatus::Rejected] {
            for to in [
                RecordStatus::Pending,
                RecordStatus::Accepted,
                RecordStatus::Rejected,
            ] {
                assert!(
                    !is_valid_transition(from, to),
                    "Expected {from:?} → {to:?} to be invalid"
                );
            }
        }
    }

    #[test]
    fn pending_to_pending_invalid() {
        assert!(!is_valid_transition(
            RecordStatus::Pending,
            RecordStatus::Pending
        ));
    }

    #[test]
    fn second_review_fails() {
        let err = validate_review(RecordStatus::Accepted, ApprovalAction::Rejected, Some("x"))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));

        let err = validate_review(RecordStatus::Rejected, ApprovalAction::Accepted, None)
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[test]
    fn rejection_requires_notes() {
        let err =
            validate_review(RecordStatus::Pending, ApprovalAction::Rejected, Some("   "))
                .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn acceptance_notes_optional_and_trimmed() {
        assert_eq!(
            validate_review(RecordStatus::Pending, ApprovalAction::Accepted, None).unwrap(),
            None
        );
        assert_eq!(
            validate_review(
                RecordStatus::Pending,
                ApprovalAction::Rejected,
                Some("  Missing photos  ")
            )
            .unwrap(),
            Some("Missing photos".to_string())
        );
    }

    #[test]
    fn employees_only_reach_their_own_records() {
        let employee = Actor {
            id: Uuid::new_v4(),
            username: "tech".to_string(),
            is_admin: false,
        };
        assert!(employee.ensure_can_access(employee.id).is_ok());
        assert!(employee.ensure_can_access(Uuid::new_v4()).is_err());

        let admin = Actor {
            is_admin: true,
            ..employee
        };
        assert!(admin.ensure_can_access(Uuid::new_v4()).is_ok());
    }

    #[test]
    fn only_pending_is_mutable() {
        assert!(ensure_mutable(RecordStatus::Pending).is_ok());
        assert!(ensure_mutable(RecordStatus::Accepted).is_err());
        assert!(ensure_mutable(RecordStatus::Rejected).is_err());
    }
}
