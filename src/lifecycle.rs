// 🔁 Transaction Lifecycle - statuses, legal actions and the timeline
//
//   DRAFT ──submit──▶ PENDING_APPROVAL ──approve──▶ SUBMITTED ──confirm──▶ CONFIRMED
//     │                  (board only)                  │    ▲
//     │                                                ▼    │ retry
//     └──────────── cancel (any non-terminal) ───────▶ FAILED
//                                                      CANCELLED
//
// The model performs no I/O. It only answers "what can happen next" and
// "what does the timeline look like right now".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// TRANSACTION TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// New shares issued to a shareholder
    Issuance,

    /// Shares move from one shareholder to another
    Transfer,

    /// Shares of one class become shares of another class
    Conversion,

    /// Shares are removed from a shareholder
    Cancellation,

    /// Every holding of a class is multiplied
    Split,
}

impl TransactionType {
    pub const ALL: [TransactionType; 5] = [
        TransactionType::Issuance,
        TransactionType::Transfer,
        TransactionType::Conversion,
        TransactionType::Cancellation,
        TransactionType::Split,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Issuance => "ISSUANCE",
            TransactionType::Transfer => "TRANSFER",
            TransactionType::Conversion => "CONVERSION",
            TransactionType::Cancellation => "CANCELLATION",
            TransactionType::Split => "SPLIT",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LifecycleError::UnknownType(s.to_string()))
    }
}

// ============================================================================
// STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Draft,
    PendingApproval,
    Submitted,
    Confirmed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 6] = [
        TransactionStatus::Draft,
        TransactionStatus::PendingApproval,
        TransactionStatus::Submitted,
        TransactionStatus::Confirmed,
        TransactionStatus::Failed,
        TransactionStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Draft => "DRAFT",
            TransactionStatus::PendingApproval => "PENDING_APPROVAL",
            TransactionStatus::Submitted => "SUBMITTED",
            TransactionStatus::Confirmed => "CONFIRMED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Cancelled => "CANCELLED",
        }
    }

    /// CONFIRMED and CANCELLED never change again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Confirmed | TransactionStatus::Cancelled
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionStatus::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LifecycleError::UnknownStatus(s.to_string()))
    }
}

// ============================================================================
// ACTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Submit,
    Approve,
    Confirm,
    /// Same external call as confirm, offered from FAILED
    Retry,
    Cancel,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Submit => "submit",
            LifecycleAction::Approve => "approve",
            LifecycleAction::Confirm => "confirm",
            LifecycleAction::Retry => "retry",
            LifecycleAction::Cancel => "cancel",
        }
    }

    /// Button label
    pub fn label(&self) -> &'static str {
        match self {
            LifecycleAction::Submit => "Submit",
            LifecycleAction::Approve => "Approve",
            LifecycleAction::Confirm => "Confirm",
            LifecycleAction::Retry => "Retry",
            LifecycleAction::Cancel => "Cancel transaction",
        }
    }

    pub fn confirmation_title(&self) -> &'static str {
        match self {
            LifecycleAction::Submit => "Submit transaction?",
            LifecycleAction::Approve => "Approve transaction?",
            LifecycleAction::Confirm => "Confirm transaction?",
            LifecycleAction::Retry => "Retry transaction?",
            LifecycleAction::Cancel => "Cancel transaction?",
        }
    }

    pub fn confirmation_message(&self) -> &'static str {
        match self {
            LifecycleAction::Submit => {
                "The transaction will be submitted for processing. Transactions that require board approval wait for approval first."
            }
            LifecycleAction::Approve => {
                "Board approval will be recorded and the transaction will move on to processing."
            }
            LifecycleAction::Confirm => {
                "The transaction will be applied to the cap table. This cannot be undone."
            }
            LifecycleAction::Retry => {
                "The failed transaction will be applied to the cap table again."
            }
            LifecycleAction::Cancel => {
                "The transaction will be cancelled and can no longer be processed."
            }
        }
    }

    pub fn success_message(&self) -> &'static str {
        match self {
            LifecycleAction::Submit => "Transaction submitted",
            LifecycleAction::Approve => "Transaction approved",
            LifecycleAction::Confirm | LifecycleAction::Retry => "Transaction processed",
            LifecycleAction::Cancel => "Transaction cancelled",
        }
    }

    /// Confirm and retry settle against the cap table, everything else is bookkeeping
    pub fn settles(&self) -> bool {
        matches!(self, LifecycleAction::Confirm | LifecycleAction::Retry)
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleAction {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "submit" => Ok(LifecycleAction::Submit),
            "approve" => Ok(LifecycleAction::Approve),
            "confirm" => Ok(LifecycleAction::Confirm),
            "retry" => Ok(LifecycleAction::Retry),
            "cancel" => Ok(LifecycleAction::Cancel),
            other => Err(LifecycleError::UnknownAction(other.to_string())),
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("cannot {action} a transaction in status {status}")]
    IllegalAction {
        status: TransactionStatus,
        action: LifecycleAction,
    },

    #[error("unknown transaction status: {0}")]
    UnknownStatus(String),

    #[error("unknown transaction type: {0}")]
    UnknownType(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),
}

// ============================================================================
// TRANSITION TABLE
// ============================================================================

/// The single forward action legal in a status, if any
pub fn forward_action(status: TransactionStatus) -> Option<LifecycleAction> {
    match status {
        TransactionStatus::Draft => Some(LifecycleAction::Submit),
        TransactionStatus::PendingApproval => Some(LifecycleAction::Approve),
        TransactionStatus::Submitted => Some(LifecycleAction::Confirm),
        TransactionStatus::Failed => Some(LifecycleAction::Retry),
        TransactionStatus::Confirmed | TransactionStatus::Cancelled => None,
    }
}

pub fn can_cancel(status: TransactionStatus) -> bool {
    !status.is_terminal()
}

/// Forward action first, then cancel
pub fn available_actions(status: TransactionStatus) -> Vec<LifecycleAction> {
    let mut actions: Vec<LifecycleAction> = forward_action(status).into_iter().collect();
    if can_cancel(status) {
        actions.push(LifecycleAction::Cancel);
    }
    actions
}

pub fn is_legal(status: TransactionStatus, action: LifecycleAction) -> bool {
    available_actions(status).contains(&action)
}

/// Outcome reported by whoever applies a confirm to the cap table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    Applied,
    Rejected(String),
}

/// Where an action leads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Known up front
    Status(TransactionStatus),

    /// CONFIRMED or FAILED depending on the settlement outcome
    Settlement,
}

impl Destination {
    pub fn settle(self, outcome: &SettlementOutcome) -> TransactionStatus {
        match (self, outcome) {
            (Destination::Status(status), _) => status,
            (Destination::Settlement, SettlementOutcome::Applied) => TransactionStatus::Confirmed,
            (Destination::Settlement, SettlementOutcome::Rejected(_)) => TransactionStatus::Failed,
        }
    }
}

/// Resolve an action against the current status.
///
/// Rejects anything the transition table does not allow. A confirm coming
/// from FAILED is accepted as a retry.
pub fn destination(
    status: TransactionStatus,
    action: LifecycleAction,
    requires_board_approval: bool,
) -> Result<Destination, LifecycleError> {
    let action = match (status, action) {
        (TransactionStatus::Failed, LifecycleAction::Confirm) => LifecycleAction::Retry,
        _ => action,
    };

    if !is_legal(status, action) {
        return Err(LifecycleError::IllegalAction { status, action });
    }

    Ok(match action {
        LifecycleAction::Submit if requires_board_approval => {
            Destination::Status(TransactionStatus::PendingApproval)
        }
        LifecycleAction::Submit | LifecycleAction::Approve => {
            Destination::Status(TransactionStatus::Submitted)
        }
        LifecycleAction::Confirm | LifecycleAction::Retry => Destination::Settlement,
        LifecycleAction::Cancel => Destination::Status(TransactionStatus::Cancelled),
    })
}

// ============================================================================
// TIMELINE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneKind {
    Created,
    PendingApproval,
    Approved,
    Submitted,
    Confirmed,
    Failed,
    Cancelled,
}

impl MilestoneKind {
    pub fn label(&self) -> &'static str {
        match self {
            MilestoneKind::Created => "Created",
            MilestoneKind::PendingApproval => "Pending approval",
            MilestoneKind::Approved => "Approved",
            MilestoneKind::Submitted => "Submitted",
            MilestoneKind::Confirmed => "Confirmed",
            MilestoneKind::Failed => "Failed",
            MilestoneKind::Cancelled => "Cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Completed,
    Active,
    Pending,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub kind: MilestoneKind,
    pub status: MilestoneStatus,
    pub at: Option<DateTime<Utc>>,
}

impl Milestone {
    fn new(kind: MilestoneKind, status: MilestoneStatus, at: Option<DateTime<Utc>>) -> Self {
        Milestone { kind, status, at }
    }
}

/// Everything the timeline needs to know about a transaction
#[derive(Debug, Clone, Copy)]
pub struct TimelineView {
    pub status: TransactionStatus,
    pub requires_board_approval: bool,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Ordered milestones for a transaction.
///
/// A cancelled transaction keeps the milestones it reached before the
/// cancellation, judged by which timestamps were stamped.
pub fn milestones(view: &TimelineView) -> Vec<Milestone> {
    use MilestoneStatus::*;
    use TransactionStatus as S;

    let status = view.status;
    let board = view.requires_board_approval;
    let mut out = vec![Milestone::new(
        MilestoneKind::Created,
        Completed,
        Some(view.created_at),
    )];

    let left_draft = match status {
        S::Draft => false,
        S::Cancelled => view.submitted_at.is_some(),
        _ => true,
    };

    if board {
        let state = match status {
            S::Draft => Pending,
            S::PendingApproval => Active,
            S::Submitted | S::Confirmed | S::Failed => Completed,
            S::Cancelled if left_draft => Completed,
            S::Cancelled => Pending,
        };
        out.push(Milestone::new(
            MilestoneKind::PendingApproval,
            state,
            view.submitted_at,
        ));
    }

    if left_draft {
        let (kind, at, reached) = if board {
            (
                MilestoneKind::Approved,
                view.approved_at,
                view.approved_at.is_some(),
            )
        } else {
            (MilestoneKind::Submitted, view.submitted_at, true)
        };

        let state = match status {
            S::PendingApproval => Pending,
            S::Submitted => Active,
            S::Confirmed | S::Failed => Completed,
            S::Cancelled if reached => Completed,
            S::Cancelled | S::Draft => Pending,
        };
        out.push(Milestone::new(kind, state, at));
    }

    match status {
        S::Confirmed => out.push(Milestone::new(
            MilestoneKind::Confirmed,
            Completed,
            view.confirmed_at,
        )),
        S::Failed => out.push(Milestone::new(
            MilestoneKind::Failed,
            Error,
            view.failed_at,
        )),
        S::Cancelled => out.push(Milestone::new(
            MilestoneKind::Cancelled,
            Error,
            view.cancelled_at,
        )),
        _ => {}
    }

    out
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use TransactionStatus as S;

    fn view(status: TransactionStatus, board: bool) -> TimelineView {
        let now = Utc::now();
        let left = status != S::Draft;
        TimelineView {
            status,
            requires_board_approval: board,
            created_at: now,
            submitted_at: left.then_some(now),
            approved_at: (board && !matches!(status, S::Draft | S::PendingApproval))
                .then_some(now),
            confirmed_at: (status == S::Confirmed).then_some(now),
            failed_at: (status == S::Failed).then_some(now),
            cancelled_at: (status == S::Cancelled).then_some(now),
        }
    }

    fn kinds(milestones: &[Milestone]) -> Vec<(MilestoneKind, MilestoneStatus)> {
        milestones.iter().map(|m| (m.kind, m.status)).collect()
    }

    fn apply(status: S, action: LifecycleAction, board: bool, outcome: &SettlementOutcome) -> S {
        destination(status, action, board).unwrap().settle(outcome)
    }

    #[test]
    fn test_board_approval_sequence() {
        let ok = SettlementOutcome::Applied;
        let mut status = S::Draft;

        assert!(can_cancel(status));
        status = apply(status, LifecycleAction::Submit, true, &ok);
        assert_eq!(status, S::PendingApproval);

        assert!(can_cancel(status));
        assert_eq!(forward_action(status), Some(LifecycleAction::Approve));
        status = apply(status, LifecycleAction::Approve, true, &ok);
        assert_eq!(status, S::Submitted);

        assert!(can_cancel(status));
        status = apply(status, LifecycleAction::Confirm, true, &ok);
        assert_eq!(status, S::Confirmed);

        assert!(!can_cancel(status));
        assert!(available_actions(status).is_empty());
    }

    #[test]
    fn test_submit_without_board_skips_approval() {
        let dest = destination(S::Draft, LifecycleAction::Submit, false).unwrap();
        assert_eq!(dest, Destination::Status(S::Submitted));
    }

    #[test]
    fn test_failed_only_offers_retry_and_cancel() {
        assert_eq!(forward_action(S::Failed), Some(LifecycleAction::Retry));
        assert_eq!(
            available_actions(S::Failed),
            vec![LifecycleAction::Retry, LifecycleAction::Cancel]
        );

        let rejected = SettlementOutcome::Rejected("insufficient shares".to_string());
        assert_eq!(apply(S::Failed, LifecycleAction::Retry, false, &rejected), S::Failed);
        assert_eq!(
            apply(S::Failed, LifecycleAction::Retry, false, &SettlementOutcome::Applied),
            S::Confirmed
        );
        // confirm is the same call as retry
        assert_eq!(
            apply(S::Failed, LifecycleAction::Confirm, false, &SettlementOutcome::Applied),
            S::Confirmed
        );
    }

    #[test]
    fn test_confirm_failure_goes_to_failed() {
        let rejected = SettlementOutcome::Rejected("no".to_string());
        assert_eq!(apply(S::Submitted, LifecycleAction::Confirm, false, &rejected), S::Failed);
    }

    #[test]
    fn test_terminal_states_offer_nothing() {
        for status in [S::Confirmed, S::Cancelled] {
            assert!(status.is_terminal());
            assert_eq!(forward_action(status), None);
            assert!(!can_cancel(status));
            for action in [
                LifecycleAction::Submit,
                LifecycleAction::Approve,
                LifecycleAction::Confirm,
                LifecycleAction::Retry,
                LifecycleAction::Cancel,
            ] {
                assert!(destination(status, action, false).is_err());
            }
        }
    }

    #[test]
    fn test_cancel_from_every_non_terminal_state() {
        for status in [S::Draft, S::PendingApproval, S::Submitted, S::Failed] {
            let dest = destination(status, LifecycleAction::Cancel, true).unwrap();
            assert_eq!(dest, Destination::Status(S::Cancelled));
        }
    }

    #[test]
    fn test_illegal_actions_rejected() {
        let err = destination(S::Draft, LifecycleAction::Approve, true).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::IllegalAction {
                status: S::Draft,
                action: LifecycleAction::Approve
            }
        );
        assert!(destination(S::PendingApproval, LifecycleAction::Confirm, true).is_err());
        assert!(destination(S::Submitted, LifecycleAction::Submit, false).is_err());
        assert!(destination(S::Submitted, LifecycleAction::Retry, false).is_err());
    }

    #[test]
    fn test_status_round_trips_through_strings() {
        for status in TransactionStatus::ALL {
            assert_eq!(status.as_str().parse::<TransactionStatus>().unwrap(), status);
        }
        assert!("ARCHIVED".parse::<TransactionStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&S::PendingApproval).unwrap(),
            "\"PENDING_APPROVAL\""
        );
    }

    #[test]
    fn test_action_copy() {
        assert_eq!(LifecycleAction::Retry.label(), "Retry");
        assert!(LifecycleAction::Retry.settles());
        assert!(!LifecycleAction::Cancel.settles());
        assert_eq!("RETRY".parse::<LifecycleAction>().unwrap(), LifecycleAction::Retry);
    }

    #[test]
    fn test_milestones_draft() {
        assert_eq!(
            kinds(&milestones(&view(S::Draft, false))),
            vec![(MilestoneKind::Created, MilestoneStatus::Completed)]
        );
        assert_eq!(
            kinds(&milestones(&view(S::Draft, true))),
            vec![
                (MilestoneKind::Created, MilestoneStatus::Completed),
                (MilestoneKind::PendingApproval, MilestoneStatus::Pending),
            ]
        );
    }

    #[test]
    fn test_milestones_board_flow() {
        assert_eq!(
            kinds(&milestones(&view(S::PendingApproval, true))),
            vec![
                (MilestoneKind::Created, MilestoneStatus::Completed),
                (MilestoneKind::PendingApproval, MilestoneStatus::Active),
                (MilestoneKind::Approved, MilestoneStatus::Pending),
            ]
        );
        assert_eq!(
            kinds(&milestones(&view(S::Submitted, true))),
            vec![
                (MilestoneKind::Created, MilestoneStatus::Completed),
                (MilestoneKind::PendingApproval, MilestoneStatus::Completed),
                (MilestoneKind::Approved, MilestoneStatus::Active),
            ]
        );
        assert_eq!(
            kinds(&milestones(&view(S::Confirmed, true))),
            vec![
                (MilestoneKind::Created, MilestoneStatus::Completed),
                (MilestoneKind::PendingApproval, MilestoneStatus::Completed),
                (MilestoneKind::Approved, MilestoneStatus::Completed),
                (MilestoneKind::Confirmed, MilestoneStatus::Completed),
            ]
        );
    }

    #[test]
    fn test_milestones_failed_has_error_terminal() {
        let ms = milestones(&view(S::Failed, false));
        assert_eq!(
            kinds(&ms),
            vec![
                (MilestoneKind::Created, MilestoneStatus::Completed),
                (MilestoneKind::Submitted, MilestoneStatus::Completed),
                (MilestoneKind::Failed, MilestoneStatus::Error),
            ]
        );
    }

    #[test]
    fn test_milestones_cancelled_from_draft() {
        let mut v = view(S::Cancelled, false);
        v.submitted_at = None;
        assert_eq!(
            kinds(&milestones(&v)),
            vec![
                (MilestoneKind::Created, MilestoneStatus::Completed),
                (MilestoneKind::Cancelled, MilestoneStatus::Error),
            ]
        );
    }

    #[test]
    fn test_milestones_cancelled_while_pending_approval() {
        let mut v = view(S::Cancelled, true);
        v.approved_at = None;
        assert_eq!(
            kinds(&milestones(&v)),
            vec![
                (MilestoneKind::Created, MilestoneStatus::Completed),
                (MilestoneKind::PendingApproval, MilestoneStatus::Completed),
                (MilestoneKind::Approved, MilestoneStatus::Pending),
                (MilestoneKind::Cancelled, MilestoneStatus::Error),
            ]
        );
    }

    #[test]
    fn test_exactly_one_terminal_milestone() {
        for status in TransactionStatus::ALL {
            for board in [false, true] {
                let terminal = milestones(&view(status, board))
                    .iter()
                    .filter(|m| {
                        matches!(
                            m.kind,
                            MilestoneKind::Confirmed | MilestoneKind::Failed | MilestoneKind::Cancelled
                        )
                    })
                    .count();
                let expected = matches!(status, S::Confirmed | S::Failed | S::Cancelled) as usize;
                assert_eq!(terminal, expected, "{} board={}", status, board);
            }
        }
    }
}
