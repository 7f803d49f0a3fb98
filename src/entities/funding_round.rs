// 💰 Funding Round Entity

use crate::forms::NewFundingRound;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundType {
    PreSeed,
    #[default]
    Seed,
    SeriesA,
    SeriesB,
    SeriesC,
    Bridge,
}

impl RoundType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundType::PreSeed => "PRE_SEED",
            RoundType::Seed => "SEED",
            RoundType::SeriesA => "SERIES_A",
            RoundType::SeriesB => "SERIES_B",
            RoundType::SeriesC => "SERIES_C",
            RoundType::Bridge => "BRIDGE",
        }
    }
}

impl FromStr for RoundType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PRE_SEED" => Ok(RoundType::PreSeed),
            "SEED" => Ok(RoundType::Seed),
            "SERIES_A" => Ok(RoundType::SeriesA),
            "SERIES_B" => Ok(RoundType::SeriesB),
            "SERIES_C" => Ok(RoundType::SeriesC),
            "BRIDGE" => Ok(RoundType::Bridge),
            other => Err(format!("Unknown round type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundStatus {
    Open,
    Closed,
}

impl RoundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundStatus::Open => "OPEN",
            RoundStatus::Closed => "CLOSED",
        }
    }
}

impl FromStr for RoundStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "OPEN" => Ok(RoundStatus::Open),
            "CLOSED" => Ok(RoundStatus::Closed),
            other => Err(format!("Unknown round status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingRound {
    pub id: String,
    pub name: String,
    pub round_type: RoundType,
    pub share_class: String,
    pub target_amount: f64,
    pub minimum_close_amount: Option<f64>,
    pub pre_money_valuation: Option<f64>,
    pub price_per_share: f64,
    pub status: RoundStatus,
    pub created_at: DateTime<Utc>,
}

impl FundingRound {
    pub fn create(input: NewFundingRound) -> Self {
        FundingRound {
            id: uuid::Uuid::new_v4().to_string(),
            name: input.name,
            round_type: input.round_type,
            share_class: input.share_class,
            target_amount: input.target_amount,
            minimum_close_amount: input.minimum_close_amount,
            pre_money_valuation: input.pre_money_valuation,
            price_per_share: input.price_per_share,
            status: RoundStatus::Open,
            created_at: Utc::now(),
        }
    }

    /// Pre-money plus the full target, if a valuation was given
    pub fn post_money_valuation(&self) -> Option<f64> {
        self.pre_money_valuation.map(|pre| pre + self.target_amount)
    }

    /// Shares the round issues if fully subscribed (rounded down)
    pub fn shares_at_target(&self) -> u64 {
        if self.price_per_share <= 0.0 {
            return 0;
        }
        (self.target_amount / self.price_per_share).floor() as u64
    }

    /// Whether `raised` is enough to close
    pub fn can_close_with(&self, raised: f64) -> bool {
        raised >= self.minimum_close_amount.unwrap_or(self.target_amount)
    }
}
