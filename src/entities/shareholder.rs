// 👤 Shareholder Entity - people and companies on the cap table
//
// Identity is the UUID. Individuals are identified by a CPF, corporate
// holders by a CNPJ; the tax id itself is optional.

use crate::forms::NewShareholder;
use crate::tax_id::{self, HolderKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// SHAREHOLDER TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShareholderType {
    /// Natural person (founder, employee, angel)
    #[default]
    Individual,

    /// Company, fund or other legal entity
    Corporate,
}

impl ShareholderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareholderType::Individual => "INDIVIDUAL",
            ShareholderType::Corporate => "CORPORATE",
        }
    }

    /// Which tax document this kind of holder carries
    pub fn holder_kind(&self) -> HolderKind {
        match self {
            ShareholderType::Individual => HolderKind::Individual,
            ShareholderType::Corporate => HolderKind::Organization,
        }
    }
}

impl fmt::Display for ShareholderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShareholderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "INDIVIDUAL" => Ok(ShareholderType::Individual),
            "CORPORATE" => Ok(ShareholderType::Corporate),
            other => Err(format!("Unknown shareholder type: {}", other)),
        }
    }
}

// ============================================================================
// SHAREHOLDER ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shareholder {
    /// Stable identity (UUID)
    pub id: String,

    pub name: String,
    pub shareholder_type: ShareholderType,
    pub email: Option<String>,

    /// Bare digits, formatted on display
    pub tax_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Shareholder {
    pub fn new(name: String, shareholder_type: ShareholderType) -> Self {
        Shareholder {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            shareholder_type,
            email: None,
            tax_id: None,
            created_at: Utc::now(),
        }
    }

    /// Build from validated form input
    pub fn create(input: NewShareholder) -> Self {
        let mut shareholder = Shareholder::new(input.name, input.shareholder_type);
        shareholder.email = input.email;
        shareholder.tax_id = input.tax_id;
        shareholder
    }

    /// CPF / CNPJ with separators, if present
    pub fn formatted_tax_id(&self) -> Option<String> {
        self.tax_id
            .as_deref()
            .map(|digits| tax_id::format(digits, self.shareholder_type.holder_kind()))
    }
}

// ============================================================================
// SHAREHOLDER REGISTRY
// ============================================================================

/// In-memory lookup of shareholders, loaded from storage for display
#[derive(Debug, Default)]
pub struct ShareholderRegistry {
    by_id: HashMap<String, Shareholder>,
}

impl ShareholderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_shareholders(shareholders: Vec<Shareholder>) -> Self {
        let mut registry = ShareholderRegistry::new();
        for shareholder in shareholders {
            registry.register(shareholder);
        }
        registry
    }

    pub fn register(&mut self, shareholder: Shareholder) {
        self.by_id.insert(shareholder.id.clone(), shareholder);
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Shareholder> {
        self.by_id.get(id)
    }

    /// Match on digits, so masked and bare input both work
    pub fn find_by_tax_id(&self, raw: &str) -> Option<&Shareholder> {
        let digits = tax_id::digits_only(raw);
        if digits.is_empty() {
            return None;
        }
        self.by_id
            .values()
            .find(|s| s.tax_id.as_deref() == Some(digits.as_str()))
    }

    /// Display name for an id, falling back to the id itself
    pub fn display_name(&self, id: &str) -> String {
        self.find_by_id(id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// All shareholders sorted by name
    pub fn all(&self) -> Vec<&Shareholder> {
        let mut all: Vec<&Shareholder> = self.by_id.values().collect();
        all.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        all
    }

    pub fn count(&self) -> usize {
        self.by_id.len()
    }
}
