// 🪪 Tax ID - CPF / CNPJ formatting and checksum validation
//
// CPF  (individuals):   11 digits, displayed as 529.982.247-25
// CNPJ (organizations): 14 digits, displayed as 11.222.333/0001-81
//
// Formatting runs on every keystroke and never fails.
// Validation only runs when a form is submitted.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// HOLDER KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HolderKind {
    /// Natural person (CPF)
    Individual,

    /// Legal entity (CNPJ)
    Organization,
}

impl HolderKind {
    /// Number of digits a complete document has
    pub fn digit_count(&self) -> usize {
        match self {
            HolderKind::Individual => 11,
            HolderKind::Organization => 14,
        }
    }

    /// Name of the document for this kind of holder
    pub fn document_name(&self) -> &'static str {
        match self {
            HolderKind::Individual => "CPF",
            HolderKind::Organization => "CNPJ",
        }
    }

    /// Guess the holder kind from a complete digit string
    pub fn from_digit_count(count: usize) -> Option<Self> {
        match count {
            11 => Some(HolderKind::Individual),
            14 => Some(HolderKind::Organization),
            _ => None,
        }
    }

    /// Parse "cpf" / "cnpj" / "individual" / "organization" (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cpf" | "individual" => Some(HolderKind::Individual),
            "cnpj" | "organization" | "corporate" => Some(HolderKind::Organization),
            _ => None,
        }
    }

    /// Separator inserted before the digit at each index
    fn separators(&self) -> &'static [(usize, char)] {
        match self {
            HolderKind::Individual => &[(3, '.'), (6, '.'), (9, '-')],
            HolderKind::Organization => &[(2, '.'), (5, '.'), (8, '/'), (12, '-')],
        }
    }
}

impl fmt::Display for HolderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.document_name())
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaxIdError {
    #[error("{kind} must have {expected} digits, got {actual}")]
    WrongLength {
        kind: HolderKind,
        expected: usize,
        actual: usize,
    },

    #[error("{0} cannot have all digits identical")]
    RepeatedDigits(HolderKind),

    #[error("{0} check digits do not match")]
    InvalidChecksum(HolderKind),
}

// ============================================================================
// FORMATTING
// ============================================================================

/// Keep only ASCII digits
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Progressive mask for CPF / CNPJ input.
///
/// Non-digits are dropped, input is truncated to the document length and
/// each separator appears only once a digit follows it:
///
/// ```
/// use captable_ledger::tax_id::{format, HolderKind};
///
/// assert_eq!(format("529", HolderKind::Individual), "529");
/// assert_eq!(format("5299", HolderKind::Individual), "529.9");
/// assert_eq!(format("52998224725", HolderKind::Individual), "529.982.247-25");
/// assert_eq!(format("11222333000181", HolderKind::Organization), "11.222.333/0001-81");
/// ```
pub fn format(raw_input: &str, kind: HolderKind) -> String {
    let digits: Vec<char> = digits_only(raw_input)
        .chars()
        .take(kind.digit_count())
        .collect();

    let separators = kind.separators();
    let mut out = String::with_capacity(digits.len() + separators.len());

    for (i, digit) in digits.iter().enumerate() {
        if let Some((_, sep)) = separators.iter().find(|(pos, _)| *pos == i) {
            out.push(*sep);
        }
        out.push(*digit);
    }

    out
}

// ============================================================================
// CHECKSUM
// ============================================================================

const CNPJ_FIRST_WEIGHTS: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
const CNPJ_SECOND_WEIGHTS: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

/// Verify both check digits of a CPF or CNPJ.
///
/// Non-digit characters are ignored, so masked input can be passed directly.
/// Returns false for the wrong length and for repeated-digit strings.
pub fn validate_checksum(digits: &str, kind: HolderKind) -> bool {
    let values: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();

    if values.len() != kind.digit_count() || all_identical(&values) {
        return false;
    }

    match kind {
        HolderKind::Individual => {
            cpf_check_digit(&values[..9]) == values[9]
                && cpf_check_digit(&values[..10]) == values[10]
        }
        HolderKind::Organization => {
            cnpj_check_digit(&values[..12], &CNPJ_FIRST_WEIGHTS) == values[12]
                && cnpj_check_digit(&values[..13], &CNPJ_SECOND_WEIGHTS) == values[13]
        }
    }
}

/// Length check followed by the checksum check, with a reason on failure
pub fn check(raw: &str, kind: HolderKind) -> Result<(), TaxIdError> {
    let digits = digits_only(raw);
    let expected = kind.digit_count();

    if digits.len() != expected {
        return Err(TaxIdError::WrongLength {
            kind,
            expected,
            actual: digits.len(),
        });
    }

    let values: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();
    if all_identical(&values) {
        return Err(TaxIdError::RepeatedDigits(kind));
    }

    if !validate_checksum(&digits, kind) {
        return Err(TaxIdError::InvalidChecksum(kind));
    }

    Ok(())
}

fn all_identical(values: &[u32]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

// weights run 10..2 for the first digit and 11..2 for the second
fn cpf_check_digit(prefix: &[u32]) -> u32 {
    let top = prefix.len() as u32 + 1;
    let sum: u32 = prefix
        .iter()
        .enumerate()
        .map(|(i, d)| d * (top - i as u32))
        .sum();

    let rest = (sum * 10) % 11;
    if rest == 10 {
        0
    } else {
        rest
    }
}

fn cnpj_check_digit(prefix: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = prefix.iter().zip(weights).map(|(d, w)| d * w).sum();

    let rest = sum % 11;
    if rest < 2 {
        0
    } else {
        11 - rest
    }
}

// ============================================================================
// TAX ID VALUE
// ============================================================================

/// A validated CPF or CNPJ, stored as bare digits
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaxId {
    digits: String,
    kind: HolderKind,
}

impl TaxId {
    pub fn parse(raw: &str, kind: HolderKind) -> Result<Self, TaxIdError> {
        check(raw, kind)?;
        Ok(TaxId {
            digits: digits_only(raw),
            kind,
        })
    }

    pub fn digits(&self) -> &str {
        &self.digits
    }

    pub fn kind(&self) -> HolderKind {
        self.kind
    }

    pub fn formatted(&self) -> String {
        format(&self.digits, self.kind)
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const VALID_CPF: &str = "52998224725";
    const VALID_CNPJ: &str = "11222333000181";

    #[test]
    fn test_format_cpf_examples() {
        assert_eq!(format(VALID_CPF, HolderKind::Individual), "529.982.247-25");
        assert_eq!(format("52998224700", HolderKind::Individual), "529.982.247-00");
    }

    #[test]
    fn test_format_cnpj_examples() {
        assert_eq!(
            format(VALID_CNPJ, HolderKind::Organization),
            "11.222.333/0001-81"
        );
        assert_eq!(
            format("11222333000199", HolderKind::Organization),
            "11.222.333/0001-99"
        );
    }

    #[test]
    fn test_format_progressive_cpf() {
        let kind = HolderKind::Individual;
        assert_eq!(format("", kind), "");
        assert_eq!(format("5", kind), "5");
        assert_eq!(format("529", kind), "529");
        assert_eq!(format("5299", kind), "529.9");
        assert_eq!(format("529982", kind), "529.982");
        assert_eq!(format("5299822", kind), "529.982.2");
        assert_eq!(format("529982247", kind), "529.982.247");
        assert_eq!(format("5299822472", kind), "529.982.247-2");
    }

    #[test]
    fn test_format_progressive_cnpj() {
        let kind = HolderKind::Organization;
        assert_eq!(format("11", kind), "11");
        assert_eq!(format("112", kind), "11.2");
        assert_eq!(format("11222", kind), "11.222");
        assert_eq!(format("11222333", kind), "11.222.333");
        assert_eq!(format("112223330", kind), "11.222.333/0");
        assert_eq!(format("112223330001", kind), "11.222.333/0001");
        assert_eq!(format("1122233300018", kind), "11.222.333/0001-8");
    }

    #[test]
    fn test_format_truncates_extra_digits() {
        assert_eq!(
            format("529982247251234", HolderKind::Individual),
            "529.982.247-25"
        );
        assert_eq!(
            format("112223330001819999", HolderKind::Organization),
            "11.222.333/0001-81"
        );
    }

    #[test]
    fn test_format_strips_non_digits() {
        let kind = HolderKind::Individual;
        assert_eq!(format("abc123def456", kind), format("123456", kind));
        assert_eq!(format("529.982.247-25", kind), "529.982.247-25");
    }

    #[test]
    fn test_validate_checksum_cpf() {
        assert!(validate_checksum(VALID_CPF, HolderKind::Individual));
        assert!(validate_checksum("529.982.247-25", HolderKind::Individual));
        assert!(!validate_checksum("52998224700", HolderKind::Individual));
    }

    #[test]
    fn test_validate_checksum_cnpj() {
        assert!(validate_checksum(VALID_CNPJ, HolderKind::Organization));
        assert!(validate_checksum("11.222.333/0001-81", HolderKind::Organization));
        assert!(!validate_checksum("11222333000199", HolderKind::Organization));
    }

    #[test]
    fn test_validate_checksum_rejects_wrong_length() {
        assert!(!validate_checksum("5299822472", HolderKind::Individual));
        assert!(!validate_checksum(VALID_CNPJ, HolderKind::Individual));
        assert!(!validate_checksum(VALID_CPF, HolderKind::Organization));
        assert!(!validate_checksum("", HolderKind::Organization));
    }

    #[test]
    fn test_validate_checksum_rejects_repeated_digits() {
        // 000.000.000-00 and 111.111.111-11 satisfy the formula but are invalid
        for d in 0..=9 {
            let cpf = d.to_string().repeat(11);
            let cnpj = d.to_string().repeat(14);
            assert!(!validate_checksum(&cpf, HolderKind::Individual), "{}", cpf);
            assert!(!validate_checksum(&cnpj, HolderKind::Organization), "{}", cnpj);
        }
    }

    #[test]
    fn test_cpf_single_digit_mutations_fail() {
        let original: Vec<char> = VALID_CPF.chars().collect();
        for pos in [0, 3, 5, 8, 9, 10] {
            let mut mutated = original.clone();
            let d = mutated[pos].to_digit(10).unwrap();
            mutated[pos] = char::from_digit((d + 1) % 10, 10).unwrap();
            let mutated: String = mutated.into_iter().collect();
            assert!(
                !validate_checksum(&mutated, HolderKind::Individual),
                "mutation at {} should fail: {}",
                pos,
                mutated
            );
        }
    }

    #[test]
    fn test_check_distinguishes_reasons() {
        assert_eq!(check(VALID_CPF, HolderKind::Individual), Ok(()));
        assert_eq!(
            check("123", HolderKind::Individual),
            Err(TaxIdError::WrongLength {
                kind: HolderKind::Individual,
                expected: 11,
                actual: 3
            })
        );
        assert_eq!(
            check("11111111111", HolderKind::Individual),
            Err(TaxIdError::RepeatedDigits(HolderKind::Individual))
        );
        assert_eq!(
            check("11222333000199", HolderKind::Organization),
            Err(TaxIdError::InvalidChecksum(HolderKind::Organization))
        );
    }

    #[test]
    fn test_tax_id_parse() {
        let cpf = TaxId::parse("529.982.247-25", HolderKind::Individual).unwrap();
        assert_eq!(cpf.digits(), VALID_CPF);
        assert_eq!(cpf.to_string(), "529.982.247-25");

        assert!(TaxId::parse("52998224700", HolderKind::Individual).is_err());
    }

    #[test]
    fn test_holder_kind_helpers() {
        assert_eq!(HolderKind::from_digit_count(11), Some(HolderKind::Individual));
        assert_eq!(HolderKind::from_digit_count(14), Some(HolderKind::Organization));
        assert_eq!(HolderKind::from_digit_count(12), None);
        assert_eq!(HolderKind::parse("CNPJ"), Some(HolderKind::Organization));
        assert_eq!(HolderKind::parse("cpf"), Some(HolderKind::Individual));
        assert_eq!(HolderKind::parse("rg"), None);
    }

    fn kind_strategy() -> impl Strategy<Value = HolderKind> {
        prop_oneof![Just(HolderKind::Individual), Just(HolderKind::Organization)]
    }

    /// Builds a valid CPF from 9 random base digits
    fn complete_cpf(base: &[u32]) -> String {
        let mut values = base.to_vec();
        values.push(cpf_check_digit(&values));
        values.push(cpf_check_digit(&values));
        values.iter().map(|d| char::from_digit(*d, 10).unwrap()).collect()
    }

    proptest! {
        #[test]
        fn prop_format_is_idempotent(raw in ".{0,30}", kind in kind_strategy()) {
            let once = format(&raw, kind);
            prop_assert_eq!(format(&once, kind), once);
        }

        #[test]
        fn prop_format_ignores_non_digits(raw in "[a-z0-9 ./-]{0,30}", kind in kind_strategy()) {
            prop_assert_eq!(format(&raw, kind), format(&digits_only(&raw), kind));
        }

        #[test]
        fn prop_generated_cpf_is_valid(base in proptest::collection::vec(0u32..10, 9)) {
            let cpf = complete_cpf(&base);
            let repeated = cpf.chars().all(|c| c == cpf.chars().next().unwrap());
            prop_assert_eq!(validate_checksum(&cpf, HolderKind::Individual), !repeated);
        }

        #[test]
        fn prop_cpf_check_digit_mutation_fails(
            base in proptest::collection::vec(0u32..10, 9),
            pos in 9usize..11,
            bump in 1u32..10,
        ) {
            let cpf = complete_cpf(&base);
            let mut chars: Vec<char> = cpf.chars().collect();
            let d = chars[pos].to_digit(10).unwrap();
            chars[pos] = char::from_digit((d + bump) % 10, 10).unwrap();
            let mutated: String = chars.into_iter().collect();
            prop_assert!(!validate_checksum(&mutated, HolderKind::Individual));
        }
    }
}
