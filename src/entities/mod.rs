// Entity Models
//
// Each entity has a stable UUID identity and is created only from validated
// form input (see `forms`).

pub mod funding_round;
pub mod shareholder;
pub mod transaction;

pub use funding_round::{FundingRound, RoundStatus, RoundType};
pub use shareholder::{Shareholder, ShareholderRegistry, ShareholderType};
pub use transaction::CapTransaction;
