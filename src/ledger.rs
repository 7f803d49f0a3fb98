// 📒 Ledger - lifecycle actions against the SQLite store
//
// `TransactionActions` is the mutation seam: one call per action, keyed by
// transaction id. `Ledger` is the SQLite implementation. It checks legality
// with `lifecycle`, settles confirms against the cap table rebuilt from
// confirmed history, and records one audit event per change.
//
// A transaction can only have one action in flight. The second caller gets
// `ActionError::InFlight` instead of waiting.

use crate::cap_table::CapTable;
use crate::db::{self, ChainReport, Event};
use crate::entities::{CapTransaction, FundingRound, Shareholder};
use crate::forms::{FieldError, FieldErrorKind, NewFundingRound, NewShareholder, TransactionDraft};
use crate::lifecycle::{self, Destination, LifecycleAction, LifecycleError, SettlementOutcome, TransactionStatus};
use anyhow::{anyhow, Context};
use chrono::Utc;
use rusqlite::Connection;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("transaction {0} not found")]
    NotFound(String),

    #[error(transparent)]
    IllegalAction(#[from] LifecycleError),

    #[error("transaction {0} already has an action in progress")]
    InFlight(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Why a create was refused
#[derive(Debug, Error)]
pub enum CreateError {
    #[error("{} invalid field(s)", .0.len())]
    Invalid(Vec<FieldError>),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

// ============================================================================
// MUTATION SEAM
// ============================================================================

/// The external mutation collaborator: one call per lifecycle action.
/// Each returns the transaction as stored after the action.
pub trait TransactionActions {
    fn submit(&self, id: &str) -> Result<CapTransaction, ActionError>;

    fn approve(&self, id: &str) -> Result<CapTransaction, ActionError>;

    /// Settles against the cap table. Ends in CONFIRMED or FAILED.
    fn confirm(&self, id: &str) -> Result<CapTransaction, ActionError>;

    fn cancel(&self, id: &str) -> Result<CapTransaction, ActionError>;

    /// Dispatch by action. Retry is the confirm call.
    fn perform(&self, id: &str, action: LifecycleAction) -> Result<CapTransaction, ActionError> {
        match action {
            LifecycleAction::Submit => self.submit(id),
            LifecycleAction::Approve => self.approve(id),
            LifecycleAction::Confirm | LifecycleAction::Retry => self.confirm(id),
            LifecycleAction::Cancel => self.cancel(id),
        }
    }
}

// ============================================================================
// IN-FLIGHT TRACKING
// ============================================================================

/// Ids with an action currently running
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    fn ids(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked
        self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `id` until the guard drops
    pub fn begin(&self, id: &str) -> Result<InFlightGuard, ActionError> {
        if !self.ids().insert(id.to_string()) {
            return Err(ActionError::InFlight(id.to_string()));
        }
        Ok(InFlightGuard {
            owner: self.clone(),
            id: id.to_string(),
        })
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        self.ids().contains(id)
    }
}

#[derive(Debug)]
pub struct InFlightGuard {
    owner: InFlight,
    id: String,
}

impl InFlightGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.owner.ids().remove(&self.id);
    }
}

// ============================================================================
// LEDGER
// ============================================================================

pub struct Ledger {
    conn: Mutex<Connection>,
    actor: String,
    in_flight: InFlight,
}

impl Ledger {
    /// Wrap an open connection, creating the schema if needed
    pub fn new(conn: Connection, actor: &str) -> anyhow::Result<Self> {
        db::setup_database(&conn).context("Failed to set up database schema")?;
        Ok(Ledger {
            conn: Mutex::new(conn),
            actor: actor.to_string(),
            in_flight: InFlight::new(),
        })
    }

    pub fn open(path: &Path, actor: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        Ledger::new(conn, actor)
    }

    pub fn in_memory(actor: &str) -> anyhow::Result<Self> {
        Ledger::new(Connection::open_in_memory()?, actor)
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))
    }

    fn event(&self, event_type: &str, entity_type: &str, entity_id: &str, data: serde_json::Value) -> Event {
        Event::new(event_type, entity_type, entity_id, data, &self.actor)
    }

    // ========================================================================
    // CREATE
    // ========================================================================

    pub fn create_shareholder(&self, input: NewShareholder) -> Result<Shareholder, CreateError> {
        let shareholder = Shareholder::create(input);
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;

        db::insert_shareholder(&tx, &shareholder)?;
        db::insert_event(
            &tx,
            &self.event(
                "shareholder_created",
                "shareholder",
                &shareholder.id,
                serde_json::json!({
                    "name": shareholder.name,
                    "shareholder_type": shareholder.shareholder_type,
                }),
            ),
        )?;
        tx.commit().context("Failed to commit shareholder")?;

        info!(shareholder_id = %shareholder.id, "shareholder created");
        Ok(shareholder)
    }

    /// New DRAFT. Referenced shareholders must exist.
    pub fn create_transaction(&self, draft: TransactionDraft) -> Result<CapTransaction, CreateError> {
        let mut conn = self.lock()?;

        let mut errors = Vec::new();
        for (field, id) in [
            ("from_shareholder_id", draft.from_shareholder_id.as_deref()),
            ("to_shareholder_id", draft.to_shareholder_id.as_deref()),
        ] {
            if let Some(id) = id {
                if db::get_shareholder(&conn, id)?.is_none() {
                    errors.push(FieldError::new(
                        field,
                        FieldErrorKind::InvalidFormat,
                        format!("Unknown shareholder {}", id),
                    ));
                }
            }
        }
        if !errors.is_empty() {
            return Err(CreateError::Invalid(errors));
        }

        let transaction = CapTransaction::create(draft);
        let tx = conn.transaction().context("Failed to begin transaction")?;
        db::insert_transaction(&tx, &transaction)?;
        db::insert_event(
            &tx,
            &self.event(
                "transaction_created",
                "transaction",
                &transaction.id,
                serde_json::json!({
                    "transaction_type": transaction.transaction_type,
                    "share_class": transaction.share_class,
                    "quantity": transaction.quantity,
                    "requires_board_approval": transaction.requires_board_approval,
                }),
            ),
        )?;
        tx.commit().context("Failed to commit transaction")?;

        info!(
            transaction_id = %transaction.id,
            transaction_type = %transaction.transaction_type,
            "transaction drafted"
        );
        Ok(transaction)
    }

    pub fn create_funding_round(&self, input: NewFundingRound) -> Result<FundingRound, CreateError> {
        let round = FundingRound::create(input);
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;

        db::insert_funding_round(&tx, &round)?;
        db::insert_event(
            &tx,
            &self.event(
                "funding_round_created",
                "funding_round",
                &round.id,
                serde_json::json!({
                    "name": round.name,
                    "round_type": round.round_type,
                    "target_amount": round.target_amount,
                }),
            ),
        )?;
        tx.commit().context("Failed to commit funding round")?;

        info!(round_id = %round.id, "funding round created");
        Ok(round)
    }

    // ========================================================================
    // READ
    // ========================================================================

    pub fn shareholders(&self) -> anyhow::Result<Vec<Shareholder>> {
        db::list_shareholders(&*self.lock()?)
    }

    pub fn shareholder(&self, id: &str) -> anyhow::Result<Option<Shareholder>> {
        db::get_shareholder(&*self.lock()?, id)
    }

    pub fn transactions(&self) -> anyhow::Result<Vec<CapTransaction>> {
        db::list_transactions(&*self.lock()?)
    }

    pub fn transaction(&self, id: &str) -> anyhow::Result<Option<CapTransaction>> {
        db::get_transaction(&*self.lock()?, id)
    }

    pub fn funding_rounds(&self) -> anyhow::Result<Vec<FundingRound>> {
        db::list_funding_rounds(&*self.lock()?)
    }

    pub fn transaction_events(&self, id: &str) -> anyhow::Result<Vec<Event>> {
        db::get_events_for_entity(&*self.lock()?, "transaction", id)
    }

    /// Positions after every confirmed transaction
    pub fn cap_table(&self) -> anyhow::Result<CapTable> {
        let transactions = self.transactions()?;
        CapTable::from_confirmed(&transactions).context("Confirmed history does not replay")
    }

    pub fn verify_audit_chain(&self) -> anyhow::Result<ChainReport> {
        db::verify_event_chain(&*self.lock()?)
    }

    // ========================================================================
    // ACTIONS
    // ========================================================================

    fn apply_action(&self, id: &str, action: LifecycleAction) -> Result<CapTransaction, ActionError> {
        let span = info_span!("transaction_action", transaction_id = %id, action = %action);
        let _enter = span.enter();

        let _guard = self.in_flight.begin(id)?;
        let mut conn = self.lock()?;
        let db_tx = conn.transaction().context("Failed to begin transaction")?;

        let mut transaction = db::get_transaction(&db_tx, id)?
            .ok_or_else(|| ActionError::NotFound(id.to_string()))?;
        let from = transaction.status;

        let destination = match lifecycle::destination(from, action, transaction.requires_board_approval) {
            Ok(destination) => destination,
            Err(e) => {
                warn!(status = %from, "action rejected: {}", e);
                return Err(e.into());
            }
        };

        let outcome = match destination {
            Destination::Settlement => settle(&db_tx, &transaction)?,
            Destination::Status(_) => SettlementOutcome::Applied,
        };
        let status = destination.settle(&outcome);
        let failure_reason = match &outcome {
            SettlementOutcome::Rejected(reason) => Some(reason.clone()),
            SettlementOutcome::Applied => None,
        };

        transaction.record_status(action, status, Utc::now(), failure_reason.clone());
        db::update_transaction_state(&db_tx, &transaction)?;
        db::insert_event(
            &db_tx,
            &self.event(
                &format!("transaction_{}", status.as_str().to_lowercase()),
                "transaction",
                id,
                serde_json::json!({
                    "action": action,
                    "from": from,
                    "to": status,
                    "failure_reason": failure_reason,
                }),
            ),
        )?;
        db_tx.commit().context("Failed to commit status change")?;

        match &transaction.failure_reason {
            Some(reason) if status == TransactionStatus::Failed => {
                warn!(from = %from, to = %status, reason = %reason, "settlement failed")
            }
            _ => info!(from = %from, to = %status, "transaction moved"),
        }
        Ok(transaction)
    }
}

/// Replay confirmed history and try the transaction on top of it
fn settle(conn: &Connection, transaction: &CapTransaction) -> anyhow::Result<SettlementOutcome> {
    let history = db::list_transactions(conn)?;
    let outcome = match CapTable::from_confirmed(&history) {
        Ok(mut table) => match table.apply(transaction) {
            Ok(()) => SettlementOutcome::Applied,
            Err(e) => SettlementOutcome::Rejected(e.to_string()),
        },
        Err(e) => SettlementOutcome::Rejected(format!("confirmed history does not replay: {}", e)),
    };
    debug!(?outcome, "settlement checked");
    Ok(outcome)
}

impl TransactionActions for Ledger {
    fn submit(&self, id: &str) -> Result<CapTransaction, ActionError> {
        self.apply_action(id, LifecycleAction::Submit)
    }

    fn approve(&self, id: &str) -> Result<CapTransaction, ActionError> {
        self.apply_action(id, LifecycleAction::Approve)
    }

    fn confirm(&self, id: &str) -> Result<CapTransaction, ActionError> {
        self.apply_action(id, LifecycleAction::Confirm)
    }

    fn cancel(&self, id: &str) -> Result<CapTransaction, ActionError> {
        self.apply_action(id, LifecycleAction::Cancel)
    }

    /// Checks the requested action itself, so retry is only accepted from FAILED
    fn perform(&self, id: &str, action: LifecycleAction) -> Result<CapTransaction, ActionError> {
        self.apply_action(id, action)
    }
}
