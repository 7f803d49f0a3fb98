// 📊 Cap Table - share positions built from confirmed transactions
//
// Positions are keyed by (shareholder, share class). A transaction either
// applies completely or leaves the table untouched; the error it returns is
// what a failed confirm records as its failure reason.
//
// The outstanding total always fits in a u64: anything that would push it
// past that is refused with `SettlementError::Overflow`.

use crate::entities::{CapTransaction, ShareholderRegistry};
use crate::lifecycle::{TransactionStatus, TransactionType};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettlementError {
    #[error("{shareholder_id} holds {held} {share_class} shares, {requested} requested")]
    InsufficientShares {
        shareholder_id: String,
        share_class: String,
        held: u64,
        requested: u64,
    },

    #[error("{transaction_type} transaction is missing its {role} shareholder")]
    MissingParty {
        transaction_type: TransactionType,
        role: &'static str,
    },

    #[error("CONVERSION transaction is missing its target share class")]
    MissingTargetClass,

    #[error("split ratio must be positive, got {0}")]
    InvalidSplitRatio(f64),

    #[error("share count overflow")]
    Overflow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub shareholder_id: String,
    pub share_class: String,
    pub shares: u64,
}

/// Fully-diluted stake of one shareholder across all classes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ownership {
    pub shareholder_id: String,
    pub shares: u64,
    pub percent: f64,
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    shareholder_id: &'a str,
    shareholder_name: String,
    share_class: &'a str,
    shares: u64,
    ownership_percent: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapTable {
    holdings: BTreeMap<(String, String), u64>,
}

impl CapTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay every CONFIRMED transaction in confirmation order
    pub fn from_confirmed(transactions: &[CapTransaction]) -> Result<Self, SettlementError> {
        let mut confirmed: Vec<&CapTransaction> = transactions
            .iter()
            .filter(|tx| tx.status == TransactionStatus::Confirmed)
            .collect();
        confirmed.sort_by_key(|tx| (tx.confirmed_at.unwrap_or(tx.created_at), tx.created_at));

        let mut table = CapTable::new();
        for tx in confirmed {
            table.apply(tx)?;
        }
        Ok(table)
    }

    pub fn shares_of(&self, shareholder_id: &str, share_class: &str) -> u64 {
        self.holdings
            .get(&(shareholder_id.to_string(), share_class.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_shares(&self) -> u64 {
        self.holdings.values().sum()
    }

    pub fn class_total(&self, share_class: &str) -> u64 {
        self.holdings
            .iter()
            .filter(|((_, class), _)| class == share_class)
            .map(|(_, shares)| shares)
            .sum()
    }

    /// Apply one transaction. On error nothing changes.
    pub fn apply(&mut self, tx: &CapTransaction) -> Result<(), SettlementError> {
        match tx.transaction_type {
            TransactionType::Issuance => {
                let to = party(tx, tx.to_shareholder_id.as_deref(), "target")?;
                self.total_shares()
                    .checked_add(tx.quantity)
                    .ok_or(SettlementError::Overflow)?;
                self.credit(to, &tx.share_class, tx.quantity)
            }
            TransactionType::Transfer => {
                let from = party(tx, tx.from_shareholder_id.as_deref(), "source")?;
                let to = party(tx, tx.to_shareholder_id.as_deref(), "target")?;
                self.ensure_holds(from, &tx.share_class, tx.quantity)?;
                self.ensure_credit(to, &tx.share_class, tx.quantity)?;
                self.debit(from, &tx.share_class, tx.quantity);
                self.credit(to, &tx.share_class, tx.quantity)
            }
            TransactionType::Conversion => {
                let from = party(tx, tx.from_shareholder_id.as_deref(), "source")?;
                let to_class = tx
                    .to_share_class
                    .as_deref()
                    .ok_or(SettlementError::MissingTargetClass)?;
                self.ensure_holds(from, &tx.share_class, tx.quantity)?;
                self.ensure_credit(from, to_class, tx.quantity)?;
                self.debit(from, &tx.share_class, tx.quantity);
                self.credit(from, to_class, tx.quantity)
            }
            TransactionType::Cancellation => {
                let from = party(tx, tx.from_shareholder_id.as_deref(), "source")?;
                self.ensure_holds(from, &tx.share_class, tx.quantity)?;
                self.debit(from, &tx.share_class, tx.quantity);
                Ok(())
            }
            TransactionType::Split => {
                let ratio = tx.split_ratio.unwrap_or(0.0);
                self.split(&tx.share_class, ratio)
            }
        }
    }

    fn split(&mut self, share_class: &str, ratio: f64) -> Result<(), SettlementError> {
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(SettlementError::InvalidSplitRatio(ratio));
        }

        let mut updated = Vec::new();
        let mut new_total = self.total_shares() - self.class_total(share_class);
        for ((holder, class), shares) in &self.holdings {
            if class != share_class {
                continue;
            }
            let scaled = (*shares as f64 * ratio).floor();
            if scaled >= u64::MAX as f64 {
                return Err(SettlementError::Overflow);
            }
            let scaled = scaled as u64;
            new_total = new_total
                .checked_add(scaled)
                .ok_or(SettlementError::Overflow)?;
            updated.push(((holder.clone(), class.clone()), scaled));
        }

        for (key, shares) in updated {
            if shares == 0 {
                self.holdings.remove(&key);
            } else {
                self.holdings.insert(key, shares);
            }
        }
        Ok(())
    }

    fn ensure_holds(&self, holder: &str, class: &str, requested: u64) -> Result<(), SettlementError> {
        let held = self.shares_of(holder, class);
        if held < requested {
            return Err(SettlementError::InsufficientShares {
                shareholder_id: holder.to_string(),
                share_class: class.to_string(),
                held,
                requested,
            });
        }
        Ok(())
    }

    fn ensure_credit(&self, holder: &str, class: &str, amount: u64) -> Result<(), SettlementError> {
        self.shares_of(holder, class)
            .checked_add(amount)
            .map(|_| ())
            .ok_or(SettlementError::Overflow)
    }

    fn credit(&mut self, holder: &str, class: &str, amount: u64) -> Result<(), SettlementError> {
        let shares = self
            .shares_of(holder, class)
            .checked_add(amount)
            .ok_or(SettlementError::Overflow)?;
        if shares > 0 {
            self.holdings
                .insert((holder.to_string(), class.to_string()), shares);
        }
        Ok(())
    }

    /// Caller has checked the balance
    fn debit(&mut self, holder: &str, class: &str, amount: u64) {
        let key = (holder.to_string(), class.to_string());
        if let Some(shares) = self.holdings.get_mut(&key) {
            *shares = shares.saturating_sub(amount);
            if *shares == 0 {
                self.holdings.remove(&key);
            }
        }
    }

    // ========================================================================
    // VIEWS
    // ========================================================================

    /// Non-zero positions ordered by shareholder then class
    pub fn positions(&self) -> Vec<Position> {
        self.holdings
            .iter()
            .filter(|(_, shares)| **shares > 0)
            .map(|((holder, class), shares)| Position {
                shareholder_id: holder.clone(),
                share_class: class.clone(),
                shares: *shares,
            })
            .collect()
    }

    /// Percent of all outstanding shares per shareholder, largest first
    pub fn ownership(&self) -> Vec<Ownership> {
        let total = self.total_shares();
        let mut per_holder: BTreeMap<&str, u64> = BTreeMap::new();
        for ((holder, _), shares) in &self.holdings {
            *per_holder.entry(holder.as_str()).or_insert(0) += shares;
        }

        let mut stakes: Vec<Ownership> = per_holder
            .into_iter()
            .filter(|(_, shares)| *shares > 0)
            .map(|(holder, shares)| Ownership {
                shareholder_id: holder.to_string(),
                shares,
                percent: if total == 0 {
                    0.0
                } else {
                    shares as f64 * 100.0 / total as f64
                },
            })
            .collect();
        stakes.sort_by(|a, b| {
            b.shares
                .cmp(&a.shares)
                .then_with(|| a.shareholder_id.cmp(&b.shareholder_id))
        });
        stakes
    }

    /// One CSV row per position, percent of the fully-diluted total
    pub fn write_csv<W: Write>(&self, writer: W, registry: &ShareholderRegistry) -> Result<usize> {
        let total = self.total_shares();
        let mut wtr = csv::Writer::from_writer(writer);
        let positions = self.positions();

        for position in &positions {
            let percent = if total == 0 {
                0.0
            } else {
                position.shares as f64 * 100.0 / total as f64
            };
            wtr.serialize(CsvRow {
                shareholder_id: &position.shareholder_id,
                shareholder_name: registry.display_name(&position.shareholder_id),
                share_class: &position.share_class,
                shares: position.shares,
                ownership_percent: format!("{:.4}", percent),
            })
            .context("Failed to write cap table row")?;
        }

        wtr.flush().context("Failed to flush cap table CSV")?;
        Ok(positions.len())
    }
}

fn party<'a>(
    tx: &CapTransaction,
    id: Option<&'a str>,
    role: &'static str,
) -> Result<&'a str, SettlementError> {
    id.ok_or(SettlementError::MissingParty {
        transaction_type: tx.transaction_type,
        role,
    })
}
