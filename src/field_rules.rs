// 🧩 Field Rules - which transaction fields each type asks for
//
// One table keyed by transaction type. Forms, the wizard and the UI all read
// from here instead of carrying their own "needs X" checks.

use crate::lifecycle::TransactionType;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    Required,
    Optional,
    Hidden,
}

impl Requirement {
    pub fn is_required(&self) -> bool {
        *self == Requirement::Required
    }

    pub fn is_visible(&self) -> bool {
        *self != Requirement::Hidden
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldRules {
    pub from_shareholder: Requirement,
    pub to_shareholder: Requirement,
    pub share_class: Requirement,
    pub to_share_class: Requirement,
    pub quantity: Requirement,
    pub price_per_share: Requirement,
    pub split_ratio: Requirement,
}

use Requirement::{Hidden, Optional, Required};

const ISSUANCE: FieldRules = FieldRules {
    from_shareholder: Hidden,
    to_shareholder: Required,
    share_class: Required,
    to_share_class: Hidden,
    quantity: Required,
    price_per_share: Optional,
    split_ratio: Hidden,
};

const TRANSFER: FieldRules = FieldRules {
    from_shareholder: Required,
    to_shareholder: Required,
    share_class: Required,
    to_share_class: Hidden,
    quantity: Required,
    price_per_share: Optional,
    split_ratio: Hidden,
};

const CONVERSION: FieldRules = FieldRules {
    from_shareholder: Required,
    to_shareholder: Hidden,
    share_class: Required,
    to_share_class: Required,
    quantity: Required,
    price_per_share: Hidden,
    split_ratio: Hidden,
};

const CANCELLATION: FieldRules = FieldRules {
    from_shareholder: Required,
    to_shareholder: Hidden,
    share_class: Required,
    to_share_class: Hidden,
    quantity: Required,
    price_per_share: Hidden,
    split_ratio: Hidden,
};

const SPLIT: FieldRules = FieldRules {
    from_shareholder: Hidden,
    to_shareholder: Hidden,
    share_class: Required,
    to_share_class: Hidden,
    quantity: Hidden,
    price_per_share: Hidden,
    split_ratio: Required,
};

pub fn field_rules(transaction_type: TransactionType) -> &'static FieldRules {
    match transaction_type {
        TransactionType::Issuance => &ISSUANCE,
        TransactionType::Transfer => &TRANSFER,
        TransactionType::Conversion => &CONVERSION,
        TransactionType::Cancellation => &CANCELLATION,
        TransactionType::Split => &SPLIT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_party_fields_follow_type() {
        let parties = |t| {
            let r = field_rules(t);
            (r.from_shareholder.is_visible(), r.to_shareholder.is_visible())
        };

        assert_eq!(parties(TransactionType::Issuance), (false, true));
        assert_eq!(parties(TransactionType::Transfer), (true, true));
        assert_eq!(parties(TransactionType::Conversion), (true, false));
        assert_eq!(parties(TransactionType::Cancellation), (true, false));
        assert_eq!(parties(TransactionType::Split), (false, false));
    }

    #[test]
    fn test_every_type_needs_a_share_class() {
        for t in TransactionType::ALL {
            assert!(field_rules(t).share_class.is_required(), "{}", t);
        }
    }

    #[test]
    fn test_split_uses_ratio_instead_of_quantity() {
        let split = field_rules(TransactionType::Split);
        assert!(split.split_ratio.is_required());
        assert!(!split.quantity.is_visible());

        for t in TransactionType::ALL.into_iter().filter(|t| *t != TransactionType::Split) {
            assert!(field_rules(t).quantity.is_required());
            assert!(!field_rules(t).split_ratio.is_visible());
        }
    }
}
