// Cap Table Ledger - Core Library
// Exposes all modules for use in the CLI, the API server, and tests

pub mod tax_id;        // CPF / CNPJ formatting and check digits
pub mod lifecycle;     // Transaction state machine and milestones
pub mod field_rules;   // Per-type field requirements
pub mod forms;         // Form input and validation
pub mod wizard;        // Multi-step wizards over the forms
pub mod entities;      // Shareholders, transactions, funding rounds
pub mod cap_table;     // Holdings derived from confirmed transactions
pub mod db;            // SQLite persistence and the audit chain
pub mod ledger;        // Mutation gateway
pub mod controller;    // Confirmation dialog state
pub mod config;
pub mod logging;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use tax_id::{HolderKind, TaxId, TaxIdError};
pub use lifecycle::{
    LifecycleAction, LifecycleError, Milestone, MilestoneKind, MilestoneStatus,
    TransactionStatus, TransactionType,
};
pub use field_rules::{field_rules, FieldRules, Requirement};
pub use forms::{
    FieldError, FieldErrorKind, FundingRoundForm, NewFundingRound, NewShareholder,
    ShareholderForm, TransactionDraft, TransactionForm, ValidationResult,
};
pub use wizard::{FundingRoundWizard, RoundStep, StepForm, TransactionStep, TransactionWizard, Wizard};
pub use entities::{
    CapTransaction, FundingRound, RoundStatus, RoundType,
    Shareholder, ShareholderRegistry, ShareholderType,
};
pub use cap_table::{CapTable, Ownership, Position, SettlementError};
pub use db::{ChainReport, Event};
pub use ledger::{ActionError, CreateError, InFlight, InFlightGuard, Ledger, TransactionActions};
pub use controller::{ActionController, ConfirmDialog};
pub use config::{AppConfig, ConfigError};
pub use logging::LogTarget;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
