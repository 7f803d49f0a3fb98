// 📐 Forms - field-level validation for shareholder, transaction and round input
//
// Forms hold raw text exactly as typed. `validate()` either produces a typed
// payload ready for storage or the list of field errors to show inline.
// Nothing invalid ever leaves this module.

use crate::entities::{RoundType, ShareholderType};
use crate::field_rules::{field_rules, Requirement};
use crate::lifecycle::TransactionType;
use crate::tax_id::{self, TaxIdError};
use serde::{Deserialize, Serialize};

// ============================================================================
// FIELD ERRORS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    Required,
    InvalidFormat,
    WrongLength,
    InvalidChecksum,
    OutOfRange,
    CrossField,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub kind: FieldErrorKind,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, kind: FieldErrorKind, message: impl Into<String>) -> Self {
        FieldError {
            field: field.to_string(),
            kind,
            message: message.into(),
        }
    }

    fn required(field: &str) -> Self {
        FieldError::new(field, FieldErrorKind::Required, "Required field is empty")
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for FieldError {}

pub type ValidationResult<T> = Result<T, Vec<FieldError>>;

fn finish<T>(errors: Vec<FieldError>, build: impl FnOnce() -> T) -> ValidationResult<T> {
    if errors.is_empty() {
        Ok(build())
    } else {
        Err(errors)
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_positive_integer(field: &str, raw: &str, errors: &mut Vec<FieldError>) -> Option<u64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',' && *c != '_').collect();
    match cleaned.parse::<u64>() {
        Ok(0) => {
            errors.push(FieldError::new(field, FieldErrorKind::OutOfRange, "Must be greater than zero"));
            None
        }
        Ok(n) => Some(n),
        Err(_) => {
            errors.push(FieldError::new(field, FieldErrorKind::InvalidFormat, "Must be a whole number"));
            None
        }
    }
}

fn parse_amount(field: &str, raw: &str, allow_zero: bool, errors: &mut Vec<FieldError>) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',' && *c != '_').collect();
    match cleaned.parse::<f64>() {
        Ok(n) if !n.is_finite() => {
            errors.push(FieldError::new(field, FieldErrorKind::InvalidFormat, "Must be a number"));
            None
        }
        Ok(n) if n < 0.0 || (!allow_zero && n == 0.0) => {
            let message = if allow_zero {
                "Cannot be negative"
            } else {
                "Must be greater than zero"
            };
            errors.push(FieldError::new(field, FieldErrorKind::OutOfRange, message));
            None
        }
        Ok(n) => Some(n),
        Err(_) => {
            errors.push(FieldError::new(field, FieldErrorKind::InvalidFormat, "Must be a number"));
            None
        }
    }
}

/// Required amount: missing → Required, otherwise parsed
fn required_amount(field: &str, raw: &str, errors: &mut Vec<FieldError>) -> Option<f64> {
    if raw.trim().is_empty() {
        errors.push(FieldError::required(field));
        return None;
    }
    parse_amount(field, raw, false, errors)
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    }
}

// ============================================================================
// SHAREHOLDER FORM
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareholderForm {
    pub name: String,
    pub shareholder_type: ShareholderType,
    pub email: String,
    pub tax_id: String,
}

/// Validated shareholder input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewShareholder {
    pub name: String,
    pub shareholder_type: ShareholderType,
    pub email: Option<String>,
    /// Bare digits
    pub tax_id: Option<String>,
}

impl ShareholderForm {
    /// Keystroke handler: keep the tax id masked as it is typed
    pub fn set_tax_id_input(&mut self, raw: &str) {
        self.tax_id = tax_id::format(raw, self.shareholder_type.holder_kind());
    }

    pub fn validate(&self) -> ValidationResult<NewShareholder> {
        let mut errors = Vec::new();

        let name = non_empty(&self.name);
        if name.is_none() {
            errors.push(FieldError::required("name"));
        }

        let email = non_empty(&self.email);
        if let Some(ref email) = email {
            if !looks_like_email(email) {
                errors.push(FieldError::new(
                    "email",
                    FieldErrorKind::InvalidFormat,
                    "Invalid email address",
                ));
            }
        }

        // An empty tax id is accepted as-is; anything typed must be a
        // complete, valid document for the holder type.
        let digits = tax_id::digits_only(&self.tax_id);
        let kind = self.shareholder_type.holder_kind();
        if !self.tax_id.trim().is_empty() {
            match tax_id::check(&digits, kind) {
                Ok(()) => {}
                Err(TaxIdError::WrongLength { expected, .. }) => errors.push(FieldError::new(
                    "tax_id",
                    FieldErrorKind::WrongLength,
                    format!("{} must have {} digits", kind.document_name(), expected),
                )),
                Err(TaxIdError::RepeatedDigits(_)) | Err(TaxIdError::InvalidChecksum(_)) => {
                    errors.push(FieldError::new(
                        "tax_id",
                        FieldErrorKind::InvalidChecksum,
                        format!("Invalid {}", kind.document_name()),
                    ))
                }
            }
        }

        finish(errors, || NewShareholder {
            name: name.unwrap_or_default(),
            shareholder_type: self.shareholder_type,
            email,
            tax_id: if digits.is_empty() { None } else { Some(digits) },
        })
    }
}

// ============================================================================
// TRANSACTION FORM
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionField {
    Type,
    FromShareholder,
    ToShareholder,
    ShareClass,
    ToShareClass,
    Quantity,
    PricePerShare,
    SplitRatio,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionForm {
    pub transaction_type: Option<TransactionType>,
    pub from_shareholder_id: String,
    pub to_shareholder_id: String,
    pub share_class: String,
    pub to_share_class: String,
    pub quantity: String,
    pub price_per_share: String,
    pub split_ratio: String,
    pub notes: String,
    pub requires_board_approval: bool,
}

/// Validated transaction input, ready to be stored as a DRAFT
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDraft {
    pub transaction_type: TransactionType,
    pub from_shareholder_id: Option<String>,
    pub to_shareholder_id: Option<String>,
    pub share_class: String,
    pub to_share_class: Option<String>,
    pub quantity: u64,
    pub price_per_share: Option<f64>,
    pub split_ratio: Option<f64>,
    pub notes: Option<String>,
    pub requires_board_approval: bool,
}

impl TransactionForm {
    pub fn new(transaction_type: TransactionType) -> Self {
        TransactionForm {
            transaction_type: Some(transaction_type),
            ..Default::default()
        }
    }

    /// Switch type and clear whatever the new type hides
    pub fn set_type(&mut self, transaction_type: TransactionType) {
        self.transaction_type = Some(transaction_type);
        let rules = field_rules(transaction_type);

        let clear = |req: Requirement, value: &mut String| {
            if !req.is_visible() {
                value.clear();
            }
        };
        clear(rules.from_shareholder, &mut self.from_shareholder_id);
        clear(rules.to_shareholder, &mut self.to_shareholder_id);
        clear(rules.share_class, &mut self.share_class);
        clear(rules.to_share_class, &mut self.to_share_class);
        clear(rules.quantity, &mut self.quantity);
        clear(rules.price_per_share, &mut self.price_per_share);
        clear(rules.split_ratio, &mut self.split_ratio);
    }

    /// Errors for a subset of fields, cross-field checks included when both
    /// sides are in the subset
    pub fn check_fields(&self, fields: &[TransactionField]) -> Vec<FieldError> {
        let mut errors = Vec::new();
        let wants = |f: TransactionField| fields.contains(&f);

        let Some(transaction_type) = self.transaction_type else {
            if wants(TransactionField::Type) {
                errors.push(FieldError::required("transaction_type"));
            }
            return errors;
        };
        let rules = field_rules(transaction_type);

        let mut text = |field: TransactionField, name: &str, req: Requirement, value: &str| {
            if wants(field) && req.is_required() && value.trim().is_empty() {
                errors.push(FieldError::required(name));
            }
        };
        text(
            TransactionField::FromShareholder,
            "from_shareholder_id",
            rules.from_shareholder,
            &self.from_shareholder_id,
        );
        text(
            TransactionField::ToShareholder,
            "to_shareholder_id",
            rules.to_shareholder,
            &self.to_shareholder_id,
        );
        text(TransactionField::ShareClass, "share_class", rules.share_class, &self.share_class);
        text(
            TransactionField::ToShareClass,
            "to_share_class",
            rules.to_share_class,
            &self.to_share_class,
        );

        if wants(TransactionField::FromShareholder)
            && wants(TransactionField::ToShareholder)
            && rules.from_shareholder.is_visible()
            && rules.to_shareholder.is_visible()
            && !self.from_shareholder_id.trim().is_empty()
            && self.from_shareholder_id.trim() == self.to_shareholder_id.trim()
        {
            errors.push(FieldError::new(
                "to_shareholder_id",
                FieldErrorKind::CrossField,
                "Source and target shareholder must differ",
            ));
        }

        if wants(TransactionField::ShareClass)
            && wants(TransactionField::ToShareClass)
            && rules.to_share_class.is_visible()
            && !self.share_class.trim().is_empty()
            && self.share_class.trim().eq_ignore_ascii_case(self.to_share_class.trim())
        {
            errors.push(FieldError::new(
                "to_share_class",
                FieldErrorKind::CrossField,
                "Target share class must differ from the source class",
            ));
        }

        if wants(TransactionField::Quantity) && rules.quantity.is_visible() {
            if self.quantity.trim().is_empty() {
                if rules.quantity.is_required() {
                    errors.push(FieldError::required("quantity"));
                }
            } else {
                parse_positive_integer("quantity", &self.quantity, &mut errors);
            }
        }

        if wants(TransactionField::PricePerShare)
            && rules.price_per_share.is_visible()
            && !self.price_per_share.trim().is_empty()
        {
            parse_amount("price_per_share", &self.price_per_share, true, &mut errors);
        }

        if wants(TransactionField::SplitRatio) && rules.split_ratio.is_visible() {
            if self.split_ratio.trim().is_empty() {
                if rules.split_ratio.is_required() {
                    errors.push(FieldError::required("split_ratio"));
                }
            } else {
                parse_amount("split_ratio", &self.split_ratio, false, &mut errors);
            }
        }

        errors
    }

    pub fn validate(&self) -> ValidationResult<TransactionDraft> {
        use TransactionField::*;

        let errors = self.check_fields(&[
            Type,
            FromShareholder,
            ToShareholder,
            ShareClass,
            ToShareClass,
            Quantity,
            PricePerShare,
            SplitRatio,
        ]);
        if !errors.is_empty() {
            return Err(errors);
        }

        // check_fields already proved every visible value parses
        let mut scratch = Vec::new();
        let transaction_type = match self.transaction_type {
            Some(t) => t,
            None => return Err(vec![FieldError::required("transaction_type")]),
        };
        let rules = field_rules(transaction_type);
        let visible = |req: Requirement, value: &str| {
            if req.is_visible() {
                non_empty(value)
            } else {
                None
            }
        };

        let quantity = visible(rules.quantity, &self.quantity)
            .and_then(|q| parse_positive_integer("quantity", &q, &mut scratch))
            .unwrap_or(0);
        let price_per_share = visible(rules.price_per_share, &self.price_per_share)
            .and_then(|p| parse_amount("price_per_share", &p, true, &mut scratch));
        let split_ratio = visible(rules.split_ratio, &self.split_ratio)
            .and_then(|r| parse_amount("split_ratio", &r, false, &mut scratch));

        Ok(TransactionDraft {
            transaction_type,
            from_shareholder_id: visible(rules.from_shareholder, &self.from_shareholder_id),
            to_shareholder_id: visible(rules.to_shareholder, &self.to_shareholder_id),
            share_class: self.share_class.trim().to_string(),
            to_share_class: visible(rules.to_share_class, &self.to_share_class),
            quantity,
            price_per_share,
            split_ratio,
            notes: non_empty(&self.notes),
            requires_board_approval: self.requires_board_approval,
        })
    }
}

// ============================================================================
// FUNDING ROUND FORM
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundField {
    Name,
    RoundType,
    ShareClass,
    TargetAmount,
    MinimumCloseAmount,
    PreMoneyValuation,
    PricePerShare,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FundingRoundForm {
    pub name: String,
    pub round_type: Option<RoundType>,
    pub share_class: String,
    pub target_amount: String,
    pub minimum_close_amount: String,
    pub pre_money_valuation: String,
    pub price_per_share: String,
}

/// Validated funding round input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFundingRound {
    pub name: String,
    pub round_type: RoundType,
    pub share_class: String,
    pub target_amount: f64,
    pub minimum_close_amount: Option<f64>,
    pub pre_money_valuation: Option<f64>,
    pub price_per_share: f64,
}

impl FundingRoundForm {
    pub fn check_fields(&self, fields: &[RoundField]) -> Vec<FieldError> {
        let mut errors = Vec::new();
        let wants = |f: RoundField| fields.contains(&f);

        if wants(RoundField::Name) && self.name.trim().is_empty() {
            errors.push(FieldError::required("name"));
        }
        if wants(RoundField::RoundType) && self.round_type.is_none() {
            errors.push(FieldError::required("round_type"));
        }
        if wants(RoundField::ShareClass) && self.share_class.trim().is_empty() {
            errors.push(FieldError::required("share_class"));
        }

        let target = if wants(RoundField::TargetAmount) {
            required_amount("target_amount", &self.target_amount, &mut errors)
        } else {
            None
        };

        if wants(RoundField::MinimumCloseAmount) && !self.minimum_close_amount.trim().is_empty() {
            let minimum = parse_amount(
                "minimum_close_amount",
                &self.minimum_close_amount,
                false,
                &mut errors,
            );
            if let (Some(minimum), Some(target)) = (minimum, target) {
                if minimum > target {
                    errors.push(FieldError::new(
                        "minimum_close_amount",
                        FieldErrorKind::CrossField,
                        "Minimum close amount cannot exceed the target amount",
                    ));
                }
            }
        }

        if wants(RoundField::PreMoneyValuation) && !self.pre_money_valuation.trim().is_empty() {
            parse_amount("pre_money_valuation", &self.pre_money_valuation, false, &mut errors);
        }

        if wants(RoundField::PricePerShare) {
            required_amount("price_per_share", &self.price_per_share, &mut errors);
        }

        errors
    }

    pub fn validate(&self) -> ValidationResult<NewFundingRound> {
        let errors = self.check_fields(&[
            RoundField::Name,
            RoundField::RoundType,
            RoundField::ShareClass,
            RoundField::TargetAmount,
            RoundField::MinimumCloseAmount,
            RoundField::PreMoneyValuation,
            RoundField::PricePerShare,
        ]);

        let mut scratch = Vec::new();
        let amount = |raw: &str, scratch: &mut Vec<FieldError>| {
            non_empty(raw).and_then(|v| parse_amount("", &v, false, scratch))
        };
        let target_amount = amount(&self.target_amount, &mut scratch);
        let minimum_close_amount = amount(&self.minimum_close_amount, &mut scratch);
        let pre_money_valuation = amount(&self.pre_money_valuation, &mut scratch);
        let price_per_share = amount(&self.price_per_share, &mut scratch);

        finish(errors, || NewFundingRound {
            name: self.name.trim().to_string(),
            round_type: self.round_type.unwrap_or_default(),
            share_class: self.share_class.trim().to_string(),
            target_amount: target_amount.unwrap_or_default(),
            minimum_close_amount,
            pre_money_valuation,
            price_per_share: price_per_share.unwrap_or_default(),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
