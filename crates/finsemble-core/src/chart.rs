//! Chart-of-accounts lookup.
//!
//! The canonical `(account_code -> account_name, category)` mapping is
//! supplied by an external collaborator. Extraction tolerates codes absent
//! from the chart: they are stored with no category and flagged for later
//! chart expansion rather than rejected.

use crate::normalize::normalize_account_code;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// High-level classification of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountCategory {
    /// Income accounts.
    Revenue,
    /// Operating and other expense accounts.
    Expense,
    /// Asset accounts.
    Asset,
    /// Liability accounts.
    Liability,
    /// Equity accounts.
    Equity,
}

impl std::fmt::Display for AccountCategory {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Revenue => write!(f, "revenue"),
            Self::Expense => write!(f, "expense"),
            Self::Asset => write!(f, "asset"),
            Self::Liability => write!(f, "liability"),
            Self::Equity => write!(f, "equity"),
        }
    }
}

/// Canonical account metadata from the chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Canonical account name.
    pub name: String,
    /// Account classification.
    pub category: AccountCategory,
}

/// In-memory chart of accounts keyed by normalized account code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartOfAccounts {
    accounts: HashMap<String, AccountInfo>,
}

impl ChartOfAccounts {
    /// Create an empty chart.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account. The code is normalized before insertion.
    pub fn insert(&mut self, code: &str, name: &str, category: AccountCategory) {
        self.accounts.insert(
            normalize_account_code(code),
            AccountInfo {
                name: name.to_string(),
                category,
            },
        );
    }

    /// Look up an account by (possibly raw) code.
    ///
    /// Returns `None` for codes outside the chart; callers store such fields
    /// uncategorized and flag them for chart expansion.
    #[must_use]
    pub fn lookup(&self, code: &str) -> Option<&AccountInfo> {
        self.accounts.get(&normalize_account_code(code))
    }

    /// Whether the chart knows this code.
    #[inline]
    #[must_use]
    pub fn is_known(&self, code: &str) -> bool {
        self.lookup(code).is_some()
    }

    /// Number of registered accounts.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether the chart is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
