// 💰 Credit Ledger
//
// Account lifecycle and the credit/debit operations on top of the store.
// Amount validation lives here; atomicity and per-user serialization live
// in the store implementations.

use crate::entities::{ContactProfile, EntryReason, LedgerAccount, LedgerEntry};
use crate::error::ServiceError;
use crate::store::{DebitOutcome, Store};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Credits granted to a fresh account.
pub const SIGNUP_BONUS: i64 = 3;

/// Credits granted to each side of a referral.
pub const REFERRAL_REWARD: i64 = 5;

/// Cost of revealing one owner contact.
pub const REVEAL_COST: i64 = 1;

/// Referral codes are exactly this many uppercase alphanumerics.
pub const REFERRAL_CODE_LEN: usize = 8;

const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Clone)]
pub struct CreditLedger {
    store: Arc<dyn Store>,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        CreditLedger { store }
    }

    // ========================================================================
    // ACCOUNTS
    // ========================================================================

    /// Create a ledger account for a new user. Generates the referral code
    /// and writes the signup-bonus entry in the same transaction, so the
    /// balance equals the signed entry sum from the very first read.
    pub fn create_account(
        &self,
        user_id: &str,
        display_name: &str,
        contact: ContactProfile,
    ) -> Result<LedgerAccount, ServiceError> {
        if self.store.account(user_id)?.is_some() {
            return Err(ServiceError::AccountExists(user_id.to_string()));
        }

        let code = self.generate_referral_code(user_id)?;
        let account = LedgerAccount::new(user_id, display_name, contact, code, SIGNUP_BONUS);
        let signup = LedgerEntry::earned(user_id, SIGNUP_BONUS, EntryReason::SignupBonus);
        self.store.insert_account(&account, &signup)?;
        Ok(account)
    }

    pub fn account(&self, user_id: &str) -> Result<LedgerAccount, ServiceError> {
        self.store
            .account(user_id)?
            .ok_or_else(|| ServiceError::UnknownUser(user_id.to_string()))
    }

    pub fn update_contact(
        &self,
        user_id: &str,
        display_name: &str,
        contact: ContactProfile,
    ) -> Result<(), ServiceError> {
        self.store.update_contact(user_id, display_name, &contact)
    }

    /// Derive an 8-char uppercase alphanumeric code from the user identity
    /// plus a fresh nonce. Retries on the (unlikely) collision.
    fn generate_referral_code(&self, user_id: &str) -> Result<String, ServiceError> {
        for _ in 0..5 {
            let nonce = uuid::Uuid::new_v4();
            let mut hasher = Sha256::new();
            hasher.update(user_id.as_bytes());
            hasher.update(nonce.as_bytes());
            let digest = hasher.finalize();

            let code: String = digest
                .iter()
                .take(REFERRAL_CODE_LEN)
                .map(|b| CODE_CHARSET[*b as usize % CODE_CHARSET.len()] as char)
                .collect();

            if self.store.account_by_referral_code(&code)?.is_none() {
                return Ok(code);
            }
        }
        Err(ServiceError::Storage(
            "could not generate a unique referral code".to_string(),
        ))
    }

    // ========================================================================
    // CREDIT / DEBIT
    // ========================================================================

    pub fn credit(
        &self,
        user_id: &str,
        amount: i64,
        reason: EntryReason,
    ) -> Result<LedgerEntry, ServiceError> {
        if amount <= 0 {
            return Err(ServiceError::InvalidAmount(amount));
        }
        let entry = LedgerEntry::earned(user_id, amount, reason);
        self.store.credit(&entry)?;
        Ok(entry)
    }

    /// Debit with an optional idempotency key. With a key, a retried call
    /// returns the originally committed entry (`replayed = true`) instead of
    /// charging twice.
    pub fn debit(
        &self,
        user_id: &str,
        amount: i64,
        reason: EntryReason,
        related_vehicle_id: Option<&str>,
        idempotency_key: Option<&str>,
    ) -> Result<DebitOutcome, ServiceError> {
        if amount <= 0 {
            return Err(ServiceError::InvalidAmount(amount));
        }
        let mut entry = LedgerEntry::spent(user_id, amount, reason);
        if let Some(vehicle_id) = related_vehicle_id {
            entry = entry.with_related_vehicle(vehicle_id);
        }
        if let Some(key) = idempotency_key {
            entry = entry.with_idempotency_key(key);
        }
        self.store.debit(&entry)
    }

    pub fn balance(&self, user_id: &str) -> Result<i64, ServiceError> {
        Ok(self.account(user_id)?.balance)
    }

    /// Ledger entries, most recent first.
    pub fn history(&self, user_id: &str, limit: usize) -> Result<Vec<LedgerEntry>, ServiceError> {
        // Existence check keeps "unknown user" distinct from "empty history".
        self.account(user_id)?;
        self.store.history(user_id, limit)
    }
}

// ============================================================================
// TESTS
// ============================================================================
