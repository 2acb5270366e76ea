// Error taxonomy for the DriveLink core.
//
// Every fallible operation in the library returns `Result<_, ServiceError>`.
// The variants map 1:1 onto the outcomes callers are expected to branch on;
// only `Storage` represents a transient infrastructure failure.

use thiserror::Error;

/// Why a raw plate string was rejected by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlateRejection {
    /// Nothing left after stripping separators.
    #[error("plate is empty")]
    Empty,

    /// Canonical form must be 8 to 12 characters.
    #[error("plate must be 8-12 characters after normalization, got {0}")]
    BadLength(usize),

    /// Matches none of the recognized format families.
    #[error("plate does not match any recognized format")]
    UnrecognizedFormat,
}

/// Unified error type for all registry, ledger, referral and search
/// operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid plate: {0}")]
    InvalidPlate(#[from] PlateRejection),

    #[error("referral code must be exactly 8 uppercase letters or digits")]
    InvalidReferralCode,

    /// Amounts on ledger entries are positive magnitudes.
    #[error("amount must be positive, got {0}")]
    InvalidAmount(i64),

    /// The plate is already registered. `same_owner` distinguishes the
    /// caller re-registering their own vehicle from a true conflict.
    #[error("plate already registered by {}", if *same_owner { "you" } else { "another owner" })]
    PlateConflict { same_owner: bool },

    #[error("a referral code was already applied for this account")]
    AlreadyApplied,

    #[error("cannot apply your own referral code")]
    SelfReferral,

    #[error("insufficient balance: have {balance}, need {required}")]
    InsufficientBalance { balance: i64, required: i64 },

    #[error("not found")]
    NotFound,

    #[error("only the vehicle owner may perform this action")]
    NotOwner,

    #[error("owner has no enabled contact channel")]
    NotContactable,

    #[error("account already exists for user {0}")]
    AccountExists(String),

    #[error("unknown user {0}")]
    UnknownUser(String),

    /// Storage-layer failure. The only retry-eligible class.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl ServiceError {
    /// True for failures worth retrying with backoff. Everything else is
    /// terminal for the request.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Storage(_))
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(err: rusqlite::Error) -> Self {
        ServiceError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_storage_is_transient() {
        assert!(ServiceError::Storage("disk full".into()).is_transient());
        assert!(!ServiceError::NotFound.is_transient());
        assert!(!ServiceError::InsufficientBalance { balance: 0, required: 1 }.is_transient());
        assert!(!ServiceError::InvalidPlate(PlateRejection::Empty).is_transient());
    }

    #[test]
    fn test_conflict_message_distinguishes_owner() {
        let own = ServiceError::PlateConflict { same_owner: true };
        let other = ServiceError::PlateConflict { same_owner: false };
        assert!(own.to_string().contains("you"));
        assert!(other.to_string().contains("another owner"));
    }
}
