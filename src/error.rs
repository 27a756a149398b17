//! Error types for the matching core.
//!
//! Every failure surfaces by unwinding to the host evaluator, which owns
//! transaction rejection and undo. The engine never retries. The only
//! error the caller is expected to inspect is [`MarketError::BlackSwan`]:
//! a margin position that cannot cover its debt at the match price. The
//! caller decides whether to suppress it (abort the triggering operation)
//! or accept it (proceed to global settlement).

use thiserror::Error;

use crate::types::AssetId;

/// Matching core error type
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MarketError {
    /// A precondition of the operation does not hold. Fatal for the
    /// current evaluation.
    #[error("precondition violated: {0}")]
    Precondition(&'static str),

    /// The least collateralized position cannot cover its debt at the
    /// match price. Distinguished so the caller can choose between
    /// aborting the trigger and settling the asset globally.
    #[error("black swan detected for asset {0}")]
    BlackSwan(AssetId),

    /// No object with the given id exists in the store.
    #[error("object {0} not found")]
    NotFound(u64),

    /// The asset has already been globally settled.
    #[error("asset {0} is already globally settled")]
    AlreadySettled(AssetId),

    /// Two quantities that must share an asset do not.
    #[error("asset mismatch: expected asset {expected}, got asset {actual}")]
    AssetMismatch { expected: AssetId, actual: AssetId },

    /// An amount computation left the representable range.
    #[error("amount arithmetic overflow")]
    Overflow,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, MarketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = MarketError::Precondition("for_sale must be positive");
        assert_eq!(e.to_string(), "precondition violated: for_sale must be positive");

        let e = MarketError::BlackSwan(7);
        assert_eq!(e.to_string(), "black swan detected for asset 7");

        let e = MarketError::AssetMismatch { expected: 1, actual: 2 };
        assert_eq!(e.to_string(), "asset mismatch: expected asset 1, got asset 2");
    }
}
