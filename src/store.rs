// Storage Interface
//
// One capability set covering registry, ledger, referral and activity
// storage, with two interchangeable implementations: `MemoryStore` for
// tests/dev and `SqliteStore` for production. The backend is picked once at
// composition time, never per call.
//
// Each trait method is an atomic unit: multi-step writes (debit, referral
// application, registration) either commit entirely or leave no trace.
// Read methods may run unsynchronized against the latest committed state.

use crate::activity::{ActivityEvent, ActivitySummary};
use crate::entities::{
    ContactProfile, LedgerAccount, LedgerEntry, ReferralApplication, Vehicle, VehicleStats,
};
use crate::error::ServiceError;
use crate::plate::Plate;

/// Result of an idempotency-aware debit.
#[derive(Debug, Clone)]
pub struct DebitOutcome {
    pub entry: LedgerEntry,
    /// True when the idempotency key had already been committed and the
    /// prior entry was returned instead of writing a new one.
    pub replayed: bool,
}

pub trait Store: Send + Sync {
    // ========================================================================
    // ACCOUNTS
    // ========================================================================

    /// Insert a fresh account together with its signup-bonus entry, in one
    /// transaction. Fails with `AccountExists` on a duplicate user id.
    fn insert_account(
        &self,
        account: &LedgerAccount,
        signup_entry: &LedgerEntry,
    ) -> Result<(), ServiceError>;

    fn account(&self, user_id: &str) -> Result<Option<LedgerAccount>, ServiceError>;

    fn account_by_referral_code(&self, code: &str)
        -> Result<Option<LedgerAccount>, ServiceError>;

    fn update_contact(
        &self,
        user_id: &str,
        display_name: &str,
        contact: &ContactProfile,
    ) -> Result<(), ServiceError>;

    // ========================================================================
    // LEDGER
    // ========================================================================

    /// Append an `earned` entry and increment the balance atomically.
    fn credit(&self, entry: &LedgerEntry) -> Result<(), ServiceError>;

    /// Check-and-decrement, serialized per user. If the entry carries an
    /// idempotency key that was already committed, the prior entry is
    /// returned with `replayed = true` and nothing is written. If the
    /// balance check fails, nothing is written either.
    fn debit(&self, entry: &LedgerEntry) -> Result<DebitOutcome, ServiceError>;

    /// Entries for a user, most recent first.
    fn history(&self, user_id: &str, limit: usize) -> Result<Vec<LedgerEntry>, ServiceError>;

    // ========================================================================
    // REFERRALS
    // ========================================================================

    /// Atomically: set write-once `referred_by` on the referee, record the
    /// application, and credit both reward entries. Rolls back as a unit.
    fn apply_referral(
        &self,
        application: &ReferralApplication,
        referee_entry: &LedgerEntry,
        referrer_entry: &LedgerEntry,
    ) -> Result<(), ServiceError>;

    fn referral_for(&self, referee_id: &str)
        -> Result<Option<ReferralApplication>, ServiceError>;

    // ========================================================================
    // VEHICLES
    // ========================================================================

    /// Insert with an atomic global-uniqueness check on the plate. Two
    /// concurrent registrations of the same plate: exactly one wins.
    fn insert_vehicle(&self, vehicle: &Vehicle) -> Result<(), ServiceError>;

    fn vehicle_by_plate(&self, plate: &Plate) -> Result<Option<Vehicle>, ServiceError>;

    fn vehicle_by_id(&self, vehicle_id: &str) -> Result<Option<Vehicle>, ServiceError>;

    fn vehicles_by_owner(&self, owner_id: &str) -> Result<Vec<Vehicle>, ServiceError>;

    /// Owner-only removal. Deletes the vehicle and its stats; activity
    /// events and ledger entries referencing it are history and survive.
    fn remove_vehicle(&self, owner_id: &str, vehicle_id: &str) -> Result<(), ServiceError>;

    fn set_verified(
        &self,
        owner_id: &str,
        vehicle_id: &str,
        verified: bool,
    ) -> Result<(), ServiceError>;

    // ========================================================================
    // STATS & ACTIVITY
    // ========================================================================

    /// Append an activity event and bump the matching per-vehicle counter in
    /// the same serialization boundary. Returns the post-update stats.
    fn record_event(&self, event: &ActivityEvent) -> Result<VehicleStats, ServiceError>;

    fn vehicle_stats(&self, vehicle_id: &str) -> Result<Option<VehicleStats>, ServiceError>;

    /// Events touching the given owner's vehicles, most recent first.
    fn owner_feed(&self, owner_id: &str, limit: usize)
        -> Result<Vec<ActivityEvent>, ServiceError>;

    fn activity_summary(&self, user_id: &str) -> Result<ActivitySummary, ServiceError>;
}
