// 📝 Cap Transaction Entity - one requested change to the cap table
//
// Created as DRAFT from a validated form. Only lifecycle actions move it
// forward; every move stamps the matching timestamp.

use crate::forms::TransactionDraft;
use crate::lifecycle::{
    self, LifecycleAction, Milestone, TimelineView, TransactionStatus, TransactionType,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapTransaction {
    // ========================================================================
    // IDENTITY
    // ========================================================================
    pub id: String,

    // ========================================================================
    // REQUEST
    // ========================================================================
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,

    /// Shareholder giving up shares (TRANSFER, CONVERSION, CANCELLATION)
    pub from_shareholder_id: Option<String>,

    /// Shareholder receiving shares (ISSUANCE, TRANSFER)
    pub to_shareholder_id: Option<String>,

    pub share_class: String,

    /// Target class of a CONVERSION
    pub to_share_class: Option<String>,

    /// Zero for SPLIT, which uses `split_ratio`
    pub quantity: u64,

    pub price_per_share: Option<f64>,
    pub split_ratio: Option<f64>,
    pub notes: Option<String>,
    pub requires_board_approval: bool,

    // ========================================================================
    // TIMELINE
    // ========================================================================
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,

    /// Why the last settlement attempt failed
    pub failure_reason: Option<String>,
}

impl CapTransaction {
    /// New DRAFT from validated form input
    pub fn create(draft: TransactionDraft) -> Self {
        CapTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            transaction_type: draft.transaction_type,
            status: TransactionStatus::Draft,
            from_shareholder_id: draft.from_shareholder_id,
            to_shareholder_id: draft.to_shareholder_id,
            share_class: draft.share_class,
            to_share_class: draft.to_share_class,
            quantity: draft.quantity,
            price_per_share: draft.price_per_share,
            split_ratio: draft.split_ratio,
            notes: draft.notes,
            requires_board_approval: draft.requires_board_approval,
            created_at: Utc::now(),
            submitted_at: None,
            approved_at: None,
            confirmed_at: None,
            failed_at: None,
            cancelled_at: None,
            failure_reason: None,
        }
    }

    pub fn timeline_view(&self) -> TimelineView {
        TimelineView {
            status: self.status,
            requires_board_approval: self.requires_board_approval,
            created_at: self.created_at,
            submitted_at: self.submitted_at,
            approved_at: self.approved_at,
            confirmed_at: self.confirmed_at,
            failed_at: self.failed_at,
            cancelled_at: self.cancelled_at,
        }
    }

    pub fn milestones(&self) -> Vec<Milestone> {
        lifecycle::milestones(&self.timeline_view())
    }

    pub fn available_actions(&self) -> Vec<LifecycleAction> {
        lifecycle::available_actions(self.status)
    }

    /// Record a new status and stamp the timestamp that goes with it.
    ///
    /// Legality is checked by the caller through `lifecycle::destination`.
    pub fn record_status(
        &mut self,
        action: LifecycleAction,
        status: TransactionStatus,
        at: DateTime<Utc>,
        failure_reason: Option<String>,
    ) {
        match (action, status) {
            (LifecycleAction::Submit, _) => self.submitted_at = Some(at),
            (LifecycleAction::Approve, _) => self.approved_at = Some(at),
            (LifecycleAction::Cancel, _) => self.cancelled_at = Some(at),
            (_, TransactionStatus::Confirmed) => {
                self.confirmed_at = Some(at);
                self.failure_reason = None;
            }
            (_, TransactionStatus::Failed) => self.failed_at = Some(at),
            _ => {}
        }

        if failure_reason.is_some() {
            self.failure_reason = failure_reason;
        }
        self.status = status;
    }

    /// quantity × price, when a price was given
    pub fn total_value(&self) -> Option<f64> {
        self.price_per_share.map(|p| p * self.quantity as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(board: bool) -> TransactionDraft {
        TransactionDraft {
            transaction_type: TransactionType::Issuance,
            from_shareholder_id: None,
            to_shareholder_id: Some("sh-1".to_string()),
            share_class: "COMMON".to_string(),
            to_share_class: None,
            quantity: 1_000,
            price_per_share: Some(0.25),
            split_ratio: None,
            notes: None,
            requires_board_approval: board,
        }
    }

    #[test]
    fn test_create_starts_in_draft() {
        let tx = CapTransaction::create(draft(false));
        assert_eq!(tx.status, TransactionStatus::Draft);
        assert_eq!(
            tx.available_actions(),
            vec![LifecycleAction::Submit, LifecycleAction::Cancel]
        );
        assert_eq!(tx.total_value(), Some(250.0));
        assert_eq!(tx.milestones().len(), 1);
    }

    #[test]
    fn test_record_status_stamps_timestamps() {
        let mut tx = CapTransaction::create(draft(true));
        let now = Utc::now();

        tx.record_status(LifecycleAction::Submit, TransactionStatus::PendingApproval, now, None);
        assert_eq!(tx.submitted_at, Some(now));

        tx.record_status(LifecycleAction::Approve, TransactionStatus::Submitted, now, None);
        assert_eq!(tx.approved_at, Some(now));

        tx.record_status(
            LifecycleAction::Confirm,
            TransactionStatus::Failed,
            now,
            Some("insufficient shares".to_string()),
        );
        assert_eq!(tx.failed_at, Some(now));
        assert_eq!(tx.failure_reason.as_deref(), Some("insufficient shares"));

        tx.record_status(LifecycleAction::Retry, TransactionStatus::Confirmed, now, None);
        assert_eq!(tx.confirmed_at, Some(now));
        assert_eq!(tx.failure_reason, None);
        assert_eq!(tx.status, TransactionStatus::Confirmed);
        assert!(tx.available_actions().is_empty());
    }
}
