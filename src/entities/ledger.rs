// 💳 Ledger Entities
//
// One account per user; an append-only entry log underneath it. Entries are
// immutable once written and the stored balance must equal the signed sum of
// entries at all times (strong consistency, not eventual).

use crate::entities::owner::ContactProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// LEDGER ACCOUNT
// ============================================================================

/// Per-user credit account plus the owner contact profile.
///
/// Identity: `user_id` (supplied by the caller, authenticated upstream).
/// `referred_by` is write-once: set at most one time, never changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerAccount {
    pub user_id: String,
    pub display_name: String,
    pub contact: ContactProfile,

    /// Credit units. Invariant: always >= 0 and equal to the signed sum of
    /// this user's ledger entries.
    pub balance: i64,

    /// Unique 8-character uppercase alphanumeric code handed to others.
    pub referral_code: String,

    /// The user whose code this account applied, if any. Write-once.
    pub referred_by: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl LedgerAccount {
    pub fn new(
        user_id: &str,
        display_name: &str,
        contact: ContactProfile,
        referral_code: String,
        opening_balance: i64,
    ) -> Self {
        LedgerAccount {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            contact,
            balance: opening_balance,
            referral_code,
            referred_by: None,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// LEDGER ENTRIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Earned,
    Spent,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Earned => "earned",
            EntryKind::Spent => "spent",
        }
    }

    pub fn parse(s: &str) -> Option<EntryKind> {
        match s {
            "earned" => Some(EntryKind::Earned),
            "spent" => Some(EntryKind::Spent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryReason {
    SignupBonus,
    ReferralReward,
    ContactReveal,
}

impl EntryReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryReason::SignupBonus => "signup_bonus",
            EntryReason::ReferralReward => "referral_reward",
            EntryReason::ContactReveal => "contact_reveal",
        }
    }

    pub fn parse(s: &str) -> Option<EntryReason> {
        match s {
            "signup_bonus" => Some(EntryReason::SignupBonus),
            "referral_reward" => Some(EntryReason::ReferralReward),
            "contact_reveal" => Some(EntryReason::ContactReveal),
            _ => None,
        }
    }
}

/// Append-only ledger record. `amount` is a positive magnitude; the sign is
/// carried by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: String,
    pub user_id: String,
    pub kind: EntryKind,
    pub amount: i64,
    pub reason: EntryReason,
    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_vehicle_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_user_id: Option<String>,

    /// Caller-supplied token making a retried debit apply at most once.
    /// Unique across the ledger when present; retained for the lifetime of
    /// the entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl LedgerEntry {
    pub fn earned(user_id: &str, amount: i64, reason: EntryReason) -> Self {
        Self::new(user_id, EntryKind::Earned, amount, reason)
    }

    pub fn spent(user_id: &str, amount: i64, reason: EntryReason) -> Self {
        Self::new(user_id, EntryKind::Spent, amount, reason)
    }

    fn new(user_id: &str, kind: EntryKind, amount: i64, reason: EntryReason) -> Self {
        LedgerEntry {
            entry_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind,
            amount,
            reason,
            created_at: Utc::now(),
            related_vehicle_id: None,
            related_user_id: None,
            idempotency_key: None,
        }
    }

    pub fn with_related_vehicle(mut self, vehicle_id: &str) -> Self {
        self.related_vehicle_id = Some(vehicle_id.to_string());
        self
    }

    pub fn with_related_user(mut self, user_id: &str) -> Self {
        self.related_user_id = Some(user_id.to_string());
        self
    }

    pub fn with_idempotency_key(mut self, key: &str) -> Self {
        self.idempotency_key = Some(key.to_string());
        self
    }

    /// Contribution of this entry to the account balance.
    pub fn signed_amount(&self) -> i64 {
        match self.kind {
            EntryKind::Earned => self.amount,
            EntryKind::Spent => -self.amount,
        }
    }
}

// ============================================================================
// REFERRAL APPLICATION
// ============================================================================

/// Records that `referrer_id` rewarded `referee_id`. At most one application
/// may ever exist per referee - referral is single-use per referee, not per
/// referrer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralApplication {
    pub referee_id: String,
    pub referrer_id: String,
    pub applied_at: DateTime<Utc>,
}

impl ReferralApplication {
    pub fn new(referee_id: &str, referrer_id: &str) -> Self {
        ReferralApplication {
            referee_id: referee_id.to_string(),
            referrer_id: referrer_id.to_string(),
            applied_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_amount() {
        let earned = LedgerEntry::earned("u1", 5, EntryReason::ReferralReward);
        let spent = LedgerEntry::spent("u1", 1, EntryReason::ContactReveal);
        assert_eq!(earned.signed_amount(), 5);
        assert_eq!(spent.signed_amount(), -1);
    }

    #[test]
    fn test_kind_and_reason_round_trip() {
        for kind in [EntryKind::Earned, EntryKind::Spent] {
            assert_eq!(EntryKind::parse(kind.as_str()), Some(kind));
        }
        for reason in [
            EntryReason::SignupBonus,
            EntryReason::ReferralReward,
            EntryReason::ContactReveal,
        ] {
            assert_eq!(EntryReason::parse(reason.as_str()), Some(reason));
        }
    }

    #[test]
    fn test_entry_builders() {
        let entry = LedgerEntry::spent("u1", 1, EntryReason::ContactReveal)
            .with_related_vehicle("v-9")
            .with_idempotency_key("u1:v-9:attempt-1");
        assert_eq!(entry.related_vehicle_id.as_deref(), Some("v-9"));
        assert_eq!(entry.idempotency_key.as_deref(), Some("u1:v-9:attempt-1"));
        assert!(entry.related_user_id.is_none());
    }
}
