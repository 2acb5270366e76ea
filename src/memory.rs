// In-Memory Store
//
// Backend for tests and local development. Per-entity serialization is a
// map of `Arc<Mutex<row>>` behind an outer `RwLock`: readers share the map,
// a mutation locks only its own row, and operations on different keys never
// block each other. The plate index sits behind a single mutex so the
// check-then-insert on registration is atomic.
//
// Lock order, where multiple locks are held: plates -> vehicles,
// referrals -> accounts (sorted by user id), vehicle row -> events.

use crate::activity::{ActivityEvent, ActivityKind, ActivitySummary};
use crate::entities::{
    ContactProfile, LedgerAccount, LedgerEntry, ReferralApplication, Vehicle, VehicleStats,
};
use crate::error::ServiceError;
use crate::plate::Plate;
use crate::store::{DebitOutcome, Store};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

struct AccountRow {
    account: LedgerAccount,
    /// Append-only, chronological. Balance always equals the signed sum.
    entries: Vec<LedgerEntry>,
}

struct VehicleRow {
    vehicle: Vehicle,
    stats: VehicleStats,
}

#[derive(Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<String, Arc<Mutex<AccountRow>>>>,
    /// plate -> (vehicle_id, owner_id). Guards global plate uniqueness.
    plates: Mutex<HashMap<String, (String, String)>>,
    vehicles: RwLock<HashMap<String, Arc<Mutex<VehicleRow>>>>,
    /// referee_id -> application. One per referee, ever.
    referrals: Mutex<HashMap<String, ReferralApplication>>,
    events: Mutex<Vec<ActivityEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn account_row(&self, user_id: &str) -> Result<Arc<Mutex<AccountRow>>, ServiceError> {
        self.accounts
            .read()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| ServiceError::UnknownUser(user_id.to_string()))
    }

    fn vehicle_row(&self, vehicle_id: &str) -> Option<Arc<Mutex<VehicleRow>>> {
        self.vehicles.read().unwrap().get(vehicle_id).cloned()
    }
}

impl Store for MemoryStore {
    // ========================================================================
    // ACCOUNTS
    // ========================================================================

    fn insert_account(
        &self,
        account: &LedgerAccount,
        signup_entry: &LedgerEntry,
    ) -> Result<(), ServiceError> {
        let mut accounts = self.accounts.write().unwrap();

        if accounts.contains_key(&account.user_id) {
            return Err(ServiceError::AccountExists(account.user_id.clone()));
        }
        let code_taken = accounts.values().any(|row| {
            row.lock().unwrap().account.referral_code == account.referral_code
        });
        if code_taken {
            return Err(ServiceError::Storage(format!(
                "referral code collision: {}",
                account.referral_code
            )));
        }

        accounts.insert(
            account.user_id.clone(),
            Arc::new(Mutex::new(AccountRow {
                account: account.clone(),
                entries: vec![signup_entry.clone()],
            })),
        );
        Ok(())
    }

    fn account(&self, user_id: &str) -> Result<Option<LedgerAccount>, ServiceError> {
        let row = self.accounts.read().unwrap().get(user_id).cloned();
        Ok(row.map(|row| row.lock().unwrap().account.clone()))
    }

    fn account_by_referral_code(
        &self,
        code: &str,
    ) -> Result<Option<LedgerAccount>, ServiceError> {
        let rows: Vec<Arc<Mutex<AccountRow>>> =
            self.accounts.read().unwrap().values().cloned().collect();
        for row in rows {
            let row = row.lock().unwrap();
            if row.account.referral_code == code {
                return Ok(Some(row.account.clone()));
            }
        }
        Ok(None)
    }

    fn update_contact(
        &self,
        user_id: &str,
        display_name: &str,
        contact: &ContactProfile,
    ) -> Result<(), ServiceError> {
        let row = self.account_row(user_id)?;
        let mut row = row.lock().unwrap();
        row.account.display_name = display_name.to_string();
        row.account.contact = contact.clone();
        Ok(())
    }

    // ========================================================================
    // LEDGER
    // ========================================================================

    fn credit(&self, entry: &LedgerEntry) -> Result<(), ServiceError> {
        let row = self.account_row(&entry.user_id)?;
        let mut row = row.lock().unwrap();
        row.account.balance += entry.amount;
        row.entries.push(entry.clone());
        Ok(())
    }

    fn debit(&self, entry: &LedgerEntry) -> Result<DebitOutcome, ServiceError> {
        let row = self.account_row(&entry.user_id)?;
        let mut row = row.lock().unwrap();

        if let Some(key) = &entry.idempotency_key {
            if let Some(prior) = row
                .entries
                .iter()
                .find(|e| e.idempotency_key.as_ref() == Some(key))
            {
                return Ok(DebitOutcome {
                    entry: prior.clone(),
                    replayed: true,
                });
            }
        }

        if row.account.balance < entry.amount {
            return Err(ServiceError::InsufficientBalance {
                balance: row.account.balance,
                required: entry.amount,
            });
        }

        row.account.balance -= entry.amount;
        row.entries.push(entry.clone());
        Ok(DebitOutcome {
            entry: entry.clone(),
            replayed: false,
        })
    }

    fn history(&self, user_id: &str, limit: usize) -> Result<Vec<LedgerEntry>, ServiceError> {
        let row = self.account_row(user_id)?;
        let row = row.lock().unwrap();
        Ok(row.entries.iter().rev().take(limit).cloned().collect())
    }

    // ========================================================================
    // REFERRALS
    // ========================================================================

    fn apply_referral(
        &self,
        application: &ReferralApplication,
        referee_entry: &LedgerEntry,
        referrer_entry: &LedgerEntry,
    ) -> Result<(), ServiceError> {
        if application.referee_id == application.referrer_id {
            return Err(ServiceError::SelfReferral);
        }

        let mut referrals = self.referrals.lock().unwrap();
        if referrals.contains_key(&application.referee_id) {
            return Err(ServiceError::AlreadyApplied);
        }

        let referee_row = self.account_row(&application.referee_id)?;
        let referrer_row = self.account_row(&application.referrer_id)?;

        // Deadlock-free: always lock the lexicographically smaller user first.
        let referee_first = application.referee_id < application.referrer_id;
        let (first, second) = if referee_first {
            (&referee_row, &referrer_row)
        } else {
            (&referrer_row, &referee_row)
        };
        let mut first = first.lock().unwrap();
        let mut second = second.lock().unwrap();
        let (referee, referrer) = if referee_first {
            (&mut *first, &mut *second)
        } else {
            (&mut *second, &mut *first)
        };

        // All checks before any mutation, so the unit is all-or-nothing.
        if referee.account.referred_by.is_some() {
            return Err(ServiceError::AlreadyApplied);
        }

        referee.account.referred_by = Some(application.referrer_id.clone());
        referee.account.balance += referee_entry.amount;
        referee.entries.push(referee_entry.clone());
        referrer.account.balance += referrer_entry.amount;
        referrer.entries.push(referrer_entry.clone());
        referrals.insert(application.referee_id.clone(), application.clone());
        Ok(())
    }

    fn referral_for(
        &self,
        referee_id: &str,
    ) -> Result<Option<ReferralApplication>, ServiceError> {
        Ok(self.referrals.lock().unwrap().get(referee_id).cloned())
    }

    // ========================================================================
    // VEHICLES
    // ========================================================================

    fn insert_vehicle(&self, vehicle: &Vehicle) -> Result<(), ServiceError> {
        let mut plates = self.plates.lock().unwrap();

        if let Some((_, owner_id)) = plates.get(vehicle.plate.as_str()) {
            return Err(ServiceError::PlateConflict {
                same_owner: *owner_id == vehicle.owner_id,
            });
        }

        plates.insert(
            vehicle.plate.as_str().to_string(),
            (vehicle.vehicle_id.clone(), vehicle.owner_id.clone()),
        );
        self.vehicles.write().unwrap().insert(
            vehicle.vehicle_id.clone(),
            Arc::new(Mutex::new(VehicleRow {
                vehicle: vehicle.clone(),
                stats: VehicleStats::zero(&vehicle.vehicle_id),
            })),
        );
        Ok(())
    }

    fn vehicle_by_plate(&self, plate: &Plate) -> Result<Option<Vehicle>, ServiceError> {
        let vehicle_id = {
            let plates = self.plates.lock().unwrap();
            match plates.get(plate.as_str()) {
                Some((vehicle_id, _)) => vehicle_id.clone(),
                None => return Ok(None),
            }
        };
        self.vehicle_by_id(&vehicle_id)
    }

    fn vehicle_by_id(&self, vehicle_id: &str) -> Result<Option<Vehicle>, ServiceError> {
        Ok(self
            .vehicle_row(vehicle_id)
            .map(|row| row.lock().unwrap().vehicle.clone()))
    }

    fn vehicles_by_owner(&self, owner_id: &str) -> Result<Vec<Vehicle>, ServiceError> {
        let rows: Vec<Arc<Mutex<VehicleRow>>> =
            self.vehicles.read().unwrap().values().cloned().collect();
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let row = row.lock().unwrap();
                (row.vehicle.owner_id == owner_id).then(|| row.vehicle.clone())
            })
            .collect())
    }

    fn remove_vehicle(&self, owner_id: &str, vehicle_id: &str) -> Result<(), ServiceError> {
        let mut plates = self.plates.lock().unwrap();
        let mut vehicles = self.vehicles.write().unwrap();

        let plate = {
            let row = vehicles.get(vehicle_id).ok_or(ServiceError::NotFound)?;
            let row = row.lock().unwrap();
            if row.vehicle.owner_id != owner_id {
                return Err(ServiceError::NotOwner);
            }
            row.vehicle.plate.as_str().to_string()
        };

        vehicles.remove(vehicle_id);
        plates.remove(&plate);
        Ok(())
    }

    fn set_verified(
        &self,
        owner_id: &str,
        vehicle_id: &str,
        verified: bool,
    ) -> Result<(), ServiceError> {
        let row = self.vehicle_row(vehicle_id).ok_or(ServiceError::NotFound)?;
        let mut row = row.lock().unwrap();
        if row.vehicle.owner_id != owner_id {
            return Err(ServiceError::NotOwner);
        }
        row.vehicle.verified = verified;
        Ok(())
    }

    // ========================================================================
    // STATS & ACTIVITY
    // ========================================================================

    fn record_event(&self, event: &ActivityEvent) -> Result<VehicleStats, ServiceError> {
        let row = self
            .vehicle_row(&event.vehicle_id)
            .ok_or(ServiceError::NotFound)?;
        let mut row = row.lock().unwrap();

        match event.kind {
            ActivityKind::Search => {
                row.stats.total_searches += 1;
                row.stats.last_searched_at = Some(event.created_at);
            }
            ActivityKind::ContactReveal => {
                row.stats.contact_requests += 1;
            }
        }
        // Event append stays inside the vehicle-row critical section so the
        // counter and the history can never disagree.
        self.events.lock().unwrap().push(event.clone());
        Ok(row.stats.clone())
    }

    fn vehicle_stats(&self, vehicle_id: &str) -> Result<Option<VehicleStats>, ServiceError> {
        Ok(self
            .vehicle_row(vehicle_id)
            .map(|row| row.lock().unwrap().stats.clone()))
    }

    fn owner_feed(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<ActivityEvent>, ServiceError> {
        let events = self.events.lock().unwrap();
        Ok(events
            .iter()
            .rev()
            .filter(|e| e.owner_id == owner_id)
            .take(limit)
            .cloned()
            .collect())
    }

    fn activity_summary(&self, user_id: &str) -> Result<ActivitySummary, ServiceError> {
        let events = self.events.lock().unwrap();
        let mut summary = ActivitySummary::default();
        for event in events.iter() {
            if event.actor_id.as_deref() == Some(user_id) {
                match event.kind {
                    ActivityKind::Search => summary.searches_made += 1,
                    ActivityKind::ContactReveal => summary.reveals_made += 1,
                }
            }
            if event.owner_id == user_id {
                match event.kind {
                    ActivityKind::Search => summary.times_searched += 1,
                    ActivityKind::ContactReveal => summary.times_revealed += 1,
                }
            }
        }
        Ok(summary)
    }
}

// ============================================================================
// TESTS
// ============================================================================
