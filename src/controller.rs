// 🛎️ Action Controller - confirmation dialog around one lifecycle action
//
// Opening a dialog never touches the transaction. Confirming calls the
// mutation gateway; success closes the dialog, rejection keeps it open with
// the error so the user can try again or dismiss.

use crate::entities::CapTransaction;
use crate::ledger::{ActionError, TransactionActions};
use crate::lifecycle::{self, LifecycleAction, LifecycleError};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmDialog {
    pub transaction_id: String,
    pub action: LifecycleAction,
    /// A call is running; the confirm button is disabled
    pub pending: bool,
    /// Message from the last rejected attempt
    pub error: Option<String>,
}

impl ConfirmDialog {
    pub fn title(&self) -> &'static str {
        self.action.confirmation_title()
    }

    pub fn message(&self) -> &'static str {
        self.action.confirmation_message()
    }
}

#[derive(Debug, Default)]
pub struct ActionController {
    dialog: Option<ConfirmDialog>,
}

impl ActionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dialog(&self) -> Option<&ConfirmDialog> {
        self.dialog.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.dialog.is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.dialog.as_ref().map_or(false, |d| d.pending)
    }

    /// Ask for confirmation of `action` on `tx`.
    ///
    /// Refused when the action is not legal in the transaction's status, or
    /// while another call is pending. Opening replaces an idle dialog.
    pub fn open(&mut self, tx: &CapTransaction, action: LifecycleAction) -> Result<(), LifecycleError> {
        if self.is_pending() || !lifecycle::is_legal(tx.status, action) {
            return Err(LifecycleError::IllegalAction {
                status: tx.status,
                action,
            });
        }
        self.dialog = Some(ConfirmDialog {
            transaction_id: tx.id.clone(),
            action,
            pending: false,
            error: None,
        });
        Ok(())
    }

    /// Mark the dialog pending and hand back what to call.
    /// None if nothing is open or a call is already running.
    pub fn begin(&mut self) -> Option<(String, LifecycleAction)> {
        let dialog = self.dialog.as_mut()?;
        if dialog.pending {
            return None;
        }
        dialog.pending = true;
        dialog.error = None;
        Some((dialog.transaction_id.clone(), dialog.action))
    }

    /// Finish the call started by `begin`
    pub fn resolve(
        &mut self,
        result: Result<CapTransaction, ActionError>,
    ) -> Result<CapTransaction, ActionError> {
        match result {
            Ok(tx) => {
                self.dialog = None;
                Ok(tx)
            }
            Err(err) => {
                if let Some(dialog) = self.dialog.as_mut() {
                    dialog.pending = false;
                    dialog.error = Some(err.to_string());
                }
                Err(err)
            }
        }
    }

    /// `begin`, call the gateway, `resolve`. None if there was nothing to confirm.
    pub fn confirm<G>(&mut self, gateway: &G) -> Option<Result<CapTransaction, ActionError>>
    where
        G: TransactionActions + ?Sized,
    {
        let (id, action) = self.begin()?;
        Some(self.resolve(gateway.perform(&id, action)))
    }

    /// Close without acting. Ignored while a call is pending.
    pub fn dismiss(&mut self) {
        if !self.is_pending() {
            self.dialog = None;
        }
    }
}
