// 🪄 Wizard - multi-step forms with per-step validation
//
// A wizard walks a form through fixed steps. Moving forward validates only
// the fields of the current step; the last step validates everything and
// yields the payload.

use crate::forms::{
    FieldError, FundingRoundForm, NewFundingRound, RoundField, TransactionDraft, TransactionField,
    TransactionForm, ValidationResult,
};
use crate::lifecycle::TransactionType;

/// A form that can be filled in over several steps
pub trait StepForm {
    type Step: Copy + PartialEq + std::fmt::Debug + 'static;
    type Output;

    fn steps() -> &'static [Self::Step];

    fn step_title(step: Self::Step) -> &'static str;

    /// Errors for the fields shown on `step`
    fn check_step(&self, step: Self::Step) -> Vec<FieldError>;

    fn validate_all(&self) -> ValidationResult<Self::Output>;
}

#[derive(Debug, Clone)]
pub struct Wizard<F: StepForm> {
    pub form: F,
    index: usize,
    errors: Vec<FieldError>,
}

impl<F: StepForm> Wizard<F> {
    pub fn new(form: F) -> Self {
        Wizard {
            form,
            index: 0,
            errors: Vec::new(),
        }
    }

    pub fn current_step(&self) -> F::Step {
        F::steps()[self.index]
    }

    /// 1-based position and step count, for "Step 2 of 4"
    pub fn progress(&self) -> (usize, usize) {
        (self.index + 1, F::steps().len())
    }

    pub fn is_last_step(&self) -> bool {
        self.index + 1 == F::steps().len()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn error_for(&self, field: &str) -> Option<&FieldError> {
        self.errors.iter().find(|e| e.field == field)
    }

    /// Validate the current step and advance. Returns false and keeps the
    /// errors when the step is incomplete.
    pub fn next(&mut self) -> bool {
        self.errors = self.form.check_step(self.current_step());
        if !self.errors.is_empty() {
            return false;
        }
        if !self.is_last_step() {
            self.index += 1;
        }
        true
    }

    pub fn back(&mut self) {
        self.errors.clear();
        self.index = self.index.saturating_sub(1);
    }

    /// Validate the whole form
    pub fn finish(&mut self) -> ValidationResult<F::Output> {
        match self.form.validate_all() {
            Ok(output) => {
                self.errors.clear();
                Ok(output)
            }
            Err(errors) => {
                self.errors = errors.clone();
                Err(errors)
            }
        }
    }
}

// ============================================================================
// TRANSACTION WIZARD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStep {
    Type,
    Parties,
    Details,
    Review,
}

impl StepForm for TransactionForm {
    type Step = TransactionStep;
    type Output = TransactionDraft;

    fn steps() -> &'static [TransactionStep] {
        &[
            TransactionStep::Type,
            TransactionStep::Parties,
            TransactionStep::Details,
            TransactionStep::Review,
        ]
    }

    fn step_title(step: TransactionStep) -> &'static str {
        match step {
            TransactionStep::Type => "Transaction type",
            TransactionStep::Parties => "Shareholders and share class",
            TransactionStep::Details => "Quantity and price",
            TransactionStep::Review => "Review",
        }
    }

    fn check_step(&self, step: TransactionStep) -> Vec<FieldError> {
        use TransactionField::*;

        match step {
            TransactionStep::Type => self.check_fields(&[Type]),
            TransactionStep::Parties => {
                self.check_fields(&[FromShareholder, ToShareholder, ShareClass, ToShareClass])
            }
            TransactionStep::Details => self.check_fields(&[Quantity, PricePerShare, SplitRatio]),
            TransactionStep::Review => self.validate().err().unwrap_or_default(),
        }
    }

    fn validate_all(&self) -> ValidationResult<TransactionDraft> {
        self.validate()
    }
}

pub type TransactionWizard = Wizard<TransactionForm>;

impl Wizard<TransactionForm> {
    /// Pick the type on the first step; hidden fields are cleared
    pub fn choose_type(&mut self, transaction_type: TransactionType) {
        self.form.set_type(transaction_type);
        self.errors.retain(|e| e.field != "transaction_type");
    }
}

// ============================================================================
// FUNDING ROUND WIZARD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundStep {
    Basics,
    Terms,
    Review,
}

impl StepForm for FundingRoundForm {
    type Step = RoundStep;
    type Output = NewFundingRound;

    fn steps() -> &'static [RoundStep] {
        &[RoundStep::Basics, RoundStep::Terms, RoundStep::Review]
    }

    fn step_title(step: RoundStep) -> &'static str {
        match step {
            RoundStep::Basics => "Round details",
            RoundStep::Terms => "Amounts and pricing",
            RoundStep::Review => "Review",
        }
    }

    fn check_step(&self, step: RoundStep) -> Vec<FieldError> {
        match step {
            RoundStep::Basics => self.check_fields(&[
                RoundField::Name,
                RoundField::RoundType,
                RoundField::ShareClass,
            ]),
            RoundStep::Terms => self.check_fields(&[
                RoundField::TargetAmount,
                RoundField::MinimumCloseAmount,
                RoundField::PreMoneyValuation,
                RoundField::PricePerShare,
            ]),
            RoundStep::Review => self.validate().err().unwrap_or_default(),
        }
    }

    fn validate_all(&self) -> ValidationResult<NewFundingRound> {
        self.validate()
    }
}

pub type FundingRoundWizard = Wizard<FundingRoundForm>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::RoundType;
    use crate::forms::FieldErrorKind;

    #[test]
    fn test_transaction_wizard_happy_path() {
        let mut wizard = TransactionWizard::new(TransactionForm::default());
        assert_eq!(wizard.current_step(), TransactionStep::Type);
        assert_eq!(wizard.progress(), (1, 4));

        assert!(!wizard.next());
        assert!(wizard.error_for("transaction_type").is_some());

        wizard.choose_type(TransactionType::Transfer);
        assert!(wizard.errors().is_empty());
        assert!(wizard.next());
        assert_eq!(wizard.current_step(), TransactionStep::Parties);

        wizard.form.from_shareholder_id = "sh-1".to_string();
        wizard.form.to_shareholder_id = "sh-2".to_string();
        wizard.form.share_class = "COMMON".to_string();
        assert!(wizard.next());
        assert_eq!(wizard.current_step(), TransactionStep::Details);

        wizard.form.quantity = "250".to_string();
        assert!(wizard.next());
        assert_eq!(wizard.current_step(), TransactionStep::Review);
        assert!(wizard.is_last_step());

        let draft = wizard.finish().unwrap();
        assert_eq!(draft.quantity, 250);
        assert_eq!(draft.from_shareholder_id.as_deref(), Some("sh-1"));
    }

    #[test]
    fn test_step_only_checks_its_own_fields() {
        let mut wizard = TransactionWizard::new(TransactionForm::new(TransactionType::Issuance));
        assert!(wizard.next());

        // quantity is empty but belongs to the next step
        wizard.form.to_shareholder_id = "sh-1".to_string();
        wizard.form.share_class = "COMMON".to_string();
        assert!(wizard.next());

        assert!(!wizard.next());
        assert_eq!(wizard.errors().len(), 1);
        assert_eq!(wizard.errors()[0].field, "quantity");
        assert_eq!(wizard.current_step(), TransactionStep::Details);
    }

    #[test]
    fn test_back_keeps_values_and_clears_errors() {
        let mut wizard = TransactionWizard::new(TransactionForm::new(TransactionType::Issuance));
        assert!(wizard.next());
        assert!(!wizard.next());
        assert!(!wizard.errors().is_empty());

        wizard.form.share_class = "COMMON".to_string();
        wizard.back();
        assert_eq!(wizard.current_step(), TransactionStep::Type);
        assert!(wizard.errors().is_empty());
        assert_eq!(wizard.form.share_class, "COMMON");

        wizard.back();
        assert_eq!(wizard.current_step(), TransactionStep::Type);
    }

    #[test]
    fn test_round_wizard_cross_field_error_on_terms() {
        let mut wizard = FundingRoundWizard::new(FundingRoundForm {
            name: "Series A".to_string(),
            round_type: Some(RoundType::SeriesA),
            share_class: "PREFERRED_A".to_string(),
            ..Default::default()
        });
        assert!(wizard.next());
        assert_eq!(wizard.current_step(), RoundStep::Terms);

        wizard.form.target_amount = "1000000".to_string();
        wizard.form.minimum_close_amount = "1500000".to_string();
        wizard.form.price_per_share = "2".to_string();
        assert!(!wizard.next());
        let error = wizard.error_for("minimum_close_amount").unwrap();
        assert_eq!(error.kind, FieldErrorKind::CrossField);

        wizard.form.minimum_close_amount = "750000".to_string();
        assert!(wizard.next());
        assert!(wizard.is_last_step());
        let round = wizard.finish().unwrap();
        assert_eq!(round.minimum_close_amount, Some(750_000.0));
    }

    #[test]
    fn test_finish_reports_every_error() {
        let mut wizard = FundingRoundWizard::new(FundingRoundForm::default());
        let errors = wizard.finish().unwrap_err();
        assert_eq!(errors.len(), wizard.errors().len());
        assert!(errors.len() >= 4);
    }
}
