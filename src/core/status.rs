//! core::status
//!
//! Document status state machine.
//!
//! # Transitions
//!
//! ```text
//! draft      --submit-->          in_review
//! in_review  --approve-->         approved
//! in_review  --request-changes--> draft
//! approved   --unpublish-->       draft
//! published  --unpublish-->       draft
//! *          --archive-->         archived   (any state except archived)
//! archived   --restore-->         draft
//! ```
//!
//! `published` is never a transition target. It is reached only when a
//! remote commit is confirmed (see [`crate::engine::webhook`]).
//!
//! The table is explicit data ([`TRANSITIONS`]), so every illegal
//! transition fails through the same lookup.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    InReview,
    Approved,
    Published,
    Scheduled,
    Archived,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 6] = [
        DocumentStatus::Draft,
        DocumentStatus::InReview,
        DocumentStatus::Approved,
        DocumentStatus::Published,
        DocumentStatus::Scheduled,
        DocumentStatus::Archived,
    ];

    /// Statuses whose unsynced edits are picked up by a publish.
    pub fn is_publishable_draft(self) -> bool {
        matches!(self, DocumentStatus::Draft | DocumentStatus::Approved)
    }

    /// Statuses promoted to `published` when their branch merges.
    pub fn is_promotable_on_merge(self) -> bool {
        matches!(
            self,
            DocumentStatus::Draft
                | DocumentStatus::InReview
                | DocumentStatus::Approved
                | DocumentStatus::Scheduled
        )
    }

    /// Actions that may be applied from this status.
    pub fn allowed_actions(self) -> Vec<StatusAction> {
        TRANSITIONS
            .iter()
            .filter(|(from, _, _)| *from == self)
            .map(|(_, action, _)| *action)
            .collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::InReview => "in_review",
            DocumentStatus::Approved => "approved",
            DocumentStatus::Published => "published",
            DocumentStatus::Scheduled => "scheduled",
            DocumentStatus::Archived => "archived",
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| TransitionError::UnknownStatus(s.to_string()))
    }
}

/// A user-initiated status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusAction {
    Submit,
    Approve,
    RequestChanges,
    Unpublish,
    Archive,
    Restore,
}

impl StatusAction {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusAction::Submit => "submit",
            StatusAction::Approve => "approve",
            StatusAction::RequestChanges => "request-changes",
            StatusAction::Unpublish => "unpublish",
            StatusAction::Archive => "archive",
            StatusAction::Restore => "restore",
        }
    }
}

impl std::fmt::Display for StatusAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StatusAction {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            StatusAction::Submit,
            StatusAction::Approve,
            StatusAction::RequestChanges,
            StatusAction::Unpublish,
            StatusAction::Archive,
            StatusAction::Restore,
        ]
        .into_iter()
        .find(|action| action.as_str() == s)
        .ok_or_else(|| TransitionError::UnknownAction(s.to_string()))
    }
}

/// Errors from the status state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot {action} a document in status '{from}'")]
    NotAllowed {
        from: DocumentStatus,
        action: StatusAction,
    },

    #[error("unknown status: {0}")]
    UnknownStatus(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),
}

use DocumentStatus as S;
use StatusAction as A;

/// `(from, action, to)` rows of the state machine.
pub const TRANSITIONS: &[(DocumentStatus, StatusAction, DocumentStatus)] = &[
    (S::Draft, A::Submit, S::InReview),
    (S::InReview, A::Approve, S::Approved),
    (S::InReview, A::RequestChanges, S::Draft),
    (S::Approved, A::Unpublish, S::Draft),
    (S::Published, A::Unpublish, S::Draft),
    (S::Draft, A::Archive, S::Archived),
    (S::InReview, A::Archive, S::Archived),
    (S::Approved, A::Archive, S::Archived),
    (S::Published, A::Archive, S::Archived),
    (S::Scheduled, A::Archive, S::Archived),
    (S::Archived, A::Restore, S::Draft),
];

/// Look up the status reached by applying `action` in status `from`.
///
/// # Example
///
/// ```
/// use inkpress::core::status::{next_status, DocumentStatus, StatusAction};
///
/// assert_eq!(
///     next_status(DocumentStatus::Draft, StatusAction::Submit),
///     Ok(DocumentStatus::InReview)
/// );
/// assert!(next_status(DocumentStatus::Archived, StatusAction::Archive).is_err());
/// ```
pub fn next_status(
    from: DocumentStatus,
    action: StatusAction,
) -> Result<DocumentStatus, TransitionError> {
    TRANSITIONS
        .iter()
        .find(|(f, a, _)| *f == from && *a == action)
        .map(|(_, _, to)| *to)
        .ok_or(TransitionError::NotAllowed { from, action })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn published_is_never_a_target() {
        assert!(TRANSITIONS.iter().all(|(_, _, to)| *to != S::Published));
    }

    #[test]
    fn every_non_archived_state_can_archive() {
        for status in DocumentStatus::ALL {
            let result = next_status(status, A::Archive);
            if status == S::Archived {
                assert!(result.is_err());
            } else {
                assert_eq!(result, Ok(S::Archived));
            }
        }
    }

    #[test]
    fn review_cycle() {
        assert_eq!(next_status(S::Draft, A::Submit), Ok(S::InReview));
        assert_eq!(next_status(S::InReview, A::RequestChanges), Ok(S::Draft));
        assert_eq!(next_status(S::InReview, A::Approve), Ok(S::Approved));
        assert_eq!(next_status(S::Approved, A::Unpublish), Ok(S::Draft));
    }

    #[test]
    fn illegal_transitions_report_both_sides() {
        let err = next_status(S::Draft, A::Approve).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot approve a document in status 'draft'"
        );
    }

    #[test]
    fn scheduled_only_archives() {
        assert_eq!(S::Scheduled.allowed_actions(), vec![A::Archive]);
    }

    #[test]
    fn parse_roundtrips_display() {
        for status in DocumentStatus::ALL {
            assert_eq!(status.as_str().parse::<DocumentStatus>(), Ok(status));
        }
        assert_eq!("request-changes".parse(), Ok(A::RequestChanges));
        assert!("publish".parse::<StatusAction>().is_err());
    }
}
