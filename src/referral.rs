// 🤝 Referral Engine
//
// Validates referral codes and applies them exactly once per referee,
// crediting both sides. The write-once flag, the application record and the
// two reward entries commit as one unit or not at all.

use crate::entities::{EntryReason, LedgerAccount, LedgerEntry, ReferralApplication};
use crate::error::ServiceError;
use crate::ledger::{REFERRAL_CODE_LEN, REFERRAL_REWARD};
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of a successful application: who referred, and what each side
/// earned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralOutcome {
    pub referrer_id: String,
    pub reward: i64,
}

#[derive(Clone)]
pub struct ReferralEngine {
    store: Arc<dyn Store>,
}

impl ReferralEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        ReferralEngine { store }
    }

    fn code_format_ok(code: &str) -> bool {
        code.len() == REFERRAL_CODE_LEN
            && code
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    }

    /// Resolve a code to the account that owns it. `InvalidReferralCode` for
    /// a malformed code, `NotFound` for a well-formed code nobody holds.
    pub fn validate_code(&self, code: &str) -> Result<LedgerAccount, ServiceError> {
        if !Self::code_format_ok(code) {
            return Err(ServiceError::InvalidReferralCode);
        }
        self.store
            .account_by_referral_code(code)?
            .ok_or(ServiceError::NotFound)
    }

    /// Apply `code` on behalf of `referee_id`, rewarding both parties.
    ///
    /// A referee can ever apply one code; re-applying any code afterwards is
    /// `AlreadyApplied`. Applying your own code is `SelfReferral`.
    pub fn apply(&self, referee_id: &str, code: &str) -> Result<ReferralOutcome, ServiceError> {
        let referee = self
            .store
            .account(referee_id)?
            .ok_or_else(|| ServiceError::UnknownUser(referee_id.to_string()))?;
        if referee.referred_by.is_some() {
            return Err(ServiceError::AlreadyApplied);
        }

        let referrer = self.validate_code(code).map_err(|err| match err {
            // A dangling-but-well-formed code is the caller's bad input, not
            // a missing resource.
            ServiceError::NotFound => ServiceError::InvalidReferralCode,
            other => other,
        })?;
        if referrer.user_id == referee_id {
            return Err(ServiceError::SelfReferral);
        }

        let application = ReferralApplication::new(referee_id, &referrer.user_id);
        let referee_entry = LedgerEntry::earned(referee_id, REFERRAL_REWARD, EntryReason::ReferralReward)
            .with_related_user(&referrer.user_id);
        let referrer_entry =
            LedgerEntry::earned(&referrer.user_id, REFERRAL_REWARD, EntryReason::ReferralReward)
                .with_related_user(referee_id);

        self.store
            .apply_referral(&application, &referee_entry, &referrer_entry)?;

        Ok(ReferralOutcome {
            referrer_id: referrer.user_id,
            reward: REFERRAL_REWARD,
        })
    }

    pub fn referral_for(
        &self,
        referee_id: &str,
    ) -> Result<Option<ReferralApplication>, ServiceError> {
        self.store.referral_for(referee_id)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ContactProfile;
    use crate::ledger::{CreditLedger, SIGNUP_BONUS};
    use crate::memory::MemoryStore;

    struct Fixture {
        ledger: CreditLedger,
        engine: ReferralEngine,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        Fixture {
            ledger: CreditLedger::new(Arc::clone(&store)),
            engine: ReferralEngine::new(store),
        }
    }

    fn signup(f: &Fixture, user_id: &str) -> String {
        f.ledger
            .create_account(user_id, "Test User", ContactProfile::phone_only("+9198"))
            .unwrap()
            .referral_code
    }

    #[test]
    fn test_validate_code_format() {
        let f = fixture();
        assert!(matches!(
            f.engine.validate_code("abcd1234"),
            Err(ServiceError::InvalidReferralCode)
        ));
        assert!(matches!(
            f.engine.validate_code("SHORT"),
            Err(ServiceError::InvalidReferralCode)
        ));
        assert!(matches!(
            f.engine.validate_code("ABCD12345"),
            Err(ServiceError::InvalidReferralCode)
        ));
        // Well-formed but unknown.
        assert!(matches!(
            f.engine.validate_code("ABCD1234"),
            Err(ServiceError::NotFound)
        ));
    }

    #[test]
    fn test_apply_rewards_both_sides_once() {
        let f = fixture();
        let code = signup(&f, "referrer");
        signup(&f, "referee");

        let outcome = f.engine.apply("referee", &code).unwrap();
        assert_eq!(outcome.referrer_id, "referrer");
        assert_eq!(outcome.reward, REFERRAL_REWARD);

        assert_eq!(
            f.ledger.balance("referee").unwrap(),
            SIGNUP_BONUS + REFERRAL_REWARD
        );
        assert_eq!(
            f.ledger.balance("referrer").unwrap(),
            SIGNUP_BONUS + REFERRAL_REWARD
        );

        let application = f.engine.referral_for("referee").unwrap().unwrap();
        assert_eq!(application.referrer_id, "referrer");
    }

    #[test]
    fn test_second_apply_is_rejected_and_unrewarded() {
        let f = fixture();
        let code_a = signup(&f, "referrer-a");
        let code_b = signup(&f, "referrer-b");
        signup(&f, "referee");

        f.engine.apply("referee", &code_a).unwrap();

        // Re-applying anything - the same code or a different one - fails.
        assert!(matches!(
            f.engine.apply("referee", &code_a),
            Err(ServiceError::AlreadyApplied)
        ));
        assert!(matches!(
            f.engine.apply("referee", &code_b),
            Err(ServiceError::AlreadyApplied)
        ));

        assert_eq!(
            f.ledger.balance("referee").unwrap(),
            SIGNUP_BONUS + REFERRAL_REWARD
        );
        assert_eq!(f.ledger.balance("referrer-b").unwrap(), SIGNUP_BONUS);
    }

    #[test]
    fn test_self_referral_rejected() {
        let f = fixture();
        let code = signup(&f, "u1");
        assert!(matches!(
            f.engine.apply("u1", &code),
            Err(ServiceError::SelfReferral)
        ));
        assert_eq!(f.ledger.balance("u1").unwrap(), SIGNUP_BONUS);
    }

    #[test]
    fn test_unknown_code_is_invalid_on_apply() {
        let f = fixture();
        signup(&f, "referee");
        assert!(matches!(
            f.engine.apply("referee", "ZZZZ9999"),
            Err(ServiceError::InvalidReferralCode)
        ));
    }
}
