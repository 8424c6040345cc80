//! Error types for Data Farming reward computation

use thiserror::Error;

use crate::types::{Address, ChainId};

/// Result type alias for reward operations
pub type Result<T> = std::result::Result<T, DfError>;

/// Errors that can occur while preparing inputs or computing rewards
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DfError {
    // === Structural input violations ===
    /// Malformed address string
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// An LP allocated more than 100% of its balance
    #[error("Allocation sum for {lp} is {total}, exceeds 1.0")]
    AllocationOverflow { lp: Address, total: f64 },

    /// Negative or NaN amount where a non-negative number is required
    #[error("Negative or NaN {what}: {value}")]
    NegativeValue { what: &'static str, value: f64 },

    /// Unknown chain in a lookup table
    #[error("Unknown chain id: {0}")]
    UnknownChain(ChainId),

    /// Required rate missing
    #[error("Missing rate for {0}")]
    MissingRate(String),

    // === Calculator postconditions ===
    /// NaN found in the reward matrix
    #[error("NaN in reward matrix")]
    NanReward,

    /// Rewards exceed the available budget beyond tolerance
    #[error("Rewards {total} exceed budget {budget}")]
    BudgetExceeded { total: f64, budget: f64 },

    /// Rank allocation received a non-positive volume
    #[error("Rank allocation requires positive volumes, got {0}")]
    NonPositiveVolume(f64),

    // === I/O ===
    /// CSV read/write failure
    #[error("CSV error: {0}")]
    Csv(String),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(String),

    // === General Errors ===
    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl DfError {
    /// Numeric code for reports and exit status
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidAddress(_) => 1001,
            Self::AllocationOverflow { .. } => 1002,
            Self::NegativeValue { .. } => 1003,
            Self::UnknownChain(_) => 1004,
            Self::MissingRate(_) => 1005,
            Self::NanReward | Self::BudgetExceeded { .. } => 2001,
            Self::NonPositiveVolume(_) => 2002,
            Self::Csv(_) | Self::Io(_) => 3001,
            Self::InvalidInput(_) => 9999,
        }
    }

    /// Structural violations abort the whole run
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress(_)
                | Self::AllocationOverflow { .. }
                | Self::NegativeValue { .. }
                | Self::InvalidInput(_)
        )
    }
}

impl From<csv::Error> for DfError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err.to_string())
    }
}

impl From<std::io::Error> for DfError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(DfError::InvalidAddress("0x".into()).code(), 1001);
        assert_eq!(DfError::NanReward.code(), 2001);
    }

    #[test]
    fn test_error_display() {
        let err = DfError::NegativeValue {
            what: "stake",
            value: -1.0,
        };
        assert!(err.to_string().contains("stake"));
    }

    #[test]
    fn test_structural_errors() {
        assert!(DfError::InvalidAddress("x".into()).is_structural());
        assert!(!DfError::MissingRate("OCEAN".into()).is_structural());
    }
}
