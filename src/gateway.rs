// 🔎 Search Gateway
//
// Orchestrates a plate lookup: normalize → registry lookup → mask →
// (on explicit reveal) debit ledger → update stats. A missed lookup is a
// normal outcome, not an error; `InsufficientBalance` is surfaced verbatim
// and never retried here.

use crate::activity::ActivityAggregator;
use crate::entities::{mask_display_name, RevealedContact, WheelCategory};
use crate::error::ServiceError;
use crate::ledger::{CreditLedger, REVEAL_COST};
use crate::plate::{Plate, PlateFormat};
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// SEARCH RESULTS
// ============================================================================

/// What an unpaid search discloses: the vehicle summary and a masked owner
/// name, never a contact channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskedVehicle {
    pub vehicle_id: String,
    pub plate: String,
    pub plate_format: PlateFormat,
    pub wheel_category: WheelCategory,
    pub verified: bool,
    /// e.g. "Riyaansh M." - see [`mask_display_name`].
    pub owner_name: String,
    pub total_searches: u64,
    pub last_searched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SearchOutcome {
    NotFound,
    Found(MaskedVehicle),
}

// ============================================================================
// GATEWAY
// ============================================================================

#[derive(Clone)]
pub struct SearchGateway {
    store: Arc<dyn Store>,
    ledger: CreditLedger,
    activity: ActivityAggregator,
}

impl SearchGateway {
    pub fn new(store: Arc<dyn Store>) -> Self {
        SearchGateway {
            ledger: CreditLedger::new(Arc::clone(&store)),
            activity: ActivityAggregator::new(Arc::clone(&store)),
            store,
        }
    }

    /// Look up a raw plate. `actor_id` is the searching user when the
    /// request is authenticated; anonymous searches still count.
    ///
    /// A hit bumps `total_searches` and `last_searched_at` whether or not
    /// the caller later reveals the contact.
    pub fn search(
        &self,
        actor_id: Option<&str>,
        raw_plate: &str,
    ) -> Result<SearchOutcome, ServiceError> {
        let plate = Plate::normalize(raw_plate)?;

        let vehicle = match self.store.vehicle_by_plate(&plate)? {
            Some(vehicle) => vehicle,
            None => return Ok(SearchOutcome::NotFound),
        };
        let owner = self
            .store
            .account(&vehicle.owner_id)?
            .ok_or_else(|| ServiceError::Storage("vehicle owner missing".to_string()))?;

        let stats = self.activity.record_search(&vehicle, actor_id)?;

        Ok(SearchOutcome::Found(MaskedVehicle {
            vehicle_id: vehicle.vehicle_id.clone(),
            plate: vehicle.plate.as_str().to_string(),
            plate_format: vehicle.plate.format(),
            wheel_category: vehicle.wheel_category,
            verified: vehicle.verified,
            owner_name: mask_display_name(&owner.display_name),
            total_searches: stats.total_searches,
            last_searched_at: stats.last_searched_at,
        }))
    }

    /// Spend one credit to disclose the owner's enabled contact channels.
    ///
    /// The idempotency key makes retries safe: a key that already committed
    /// re-returns the contact without a second charge or a second
    /// `contact_requests` bump.
    pub fn reveal(
        &self,
        user_id: &str,
        vehicle_id: &str,
        idempotency_key: &str,
    ) -> Result<RevealedContact, ServiceError> {
        let vehicle = self
            .store
            .vehicle_by_id(vehicle_id)?
            .ok_or(ServiceError::NotFound)?;
        let owner = self
            .store
            .account(&vehicle.owner_id)?
            .ok_or_else(|| ServiceError::Storage("vehicle owner missing".to_string()))?;

        // Contactability gate comes before the debit: nobody pays for an
        // unreachable owner.
        let contact = RevealedContact::build(vehicle_id, &owner.display_name, &owner.contact)
            .ok_or(ServiceError::NotContactable)?;

        let outcome = self.ledger.debit(
            user_id,
            REVEAL_COST,
            crate::entities::EntryReason::ContactReveal,
            Some(vehicle_id),
            Some(idempotency_key),
        )?;

        if !outcome.replayed {
            self.activity.record_contact(&vehicle, user_id)?;
        }

        Ok(contact)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ContactChannel, ContactProfile};
    use crate::ledger::SIGNUP_BONUS;
    use crate::memory::MemoryStore;
    use crate::registry::VehicleRegistry;

    struct Fixture {
        ledger: CreditLedger,
        registry: VehicleRegistry,
        gateway: SearchGateway,
        activity: ActivityAggregator,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        Fixture {
            ledger: CreditLedger::new(Arc::clone(&store)),
            registry: VehicleRegistry::new(Arc::clone(&store)),
            gateway: SearchGateway::new(Arc::clone(&store)),
            activity: ActivityAggregator::new(store),
        }
    }

    fn signup(f: &Fixture, user_id: &str, name: &str) {
        f.ledger
            .create_account(user_id, name, ContactProfile::phone_only("+919812345678"))
            .unwrap();
    }

    fn register(f: &Fixture, owner_id: &str, plate: &str) -> String {
        f.registry
            .register_vehicle(owner_id, plate, WheelCategory::FourWheeler)
            .unwrap()
            .vehicle_id
    }

    #[test]
    fn test_search_not_found_is_benign() {
        let f = fixture();
        let outcome = f.gateway.search(None, "MH12AB1234").unwrap();
        assert!(matches!(outcome, SearchOutcome::NotFound));
    }

    #[test]
    fn test_search_masks_owner_and_bumps_stats() {
        let f = fixture();
        signup(&f, "owner", "Riyaansh Mittal");
        signup(&f, "searcher", "Asha Rao");
        let vehicle_id = register(&f, "owner", "MH12AB1234");

        let outcome = f.gateway.search(Some("searcher"), "mh 12 ab 1234").unwrap();
        let found = match outcome {
            SearchOutcome::Found(found) => found,
            SearchOutcome::NotFound => panic!("expected a hit"),
        };
        assert_eq!(found.owner_name, "Riyaansh M.");
        assert_eq!(found.plate, "MH12AB1234");
        assert_eq!(found.total_searches, 1);
        assert!(found.last_searched_at.is_some());

        // Second search keeps counting, reveal or not.
        f.gateway.search(None, "MH12AB1234").unwrap();
        let stats = f.activity.stats(&vehicle_id).unwrap();
        assert_eq!(stats.total_searches, 2);
        assert_eq!(stats.contact_requests, 0);
    }

    #[test]
    fn test_reveal_returns_enabled_channels_and_charges_once() {
        let f = fixture();
        signup(&f, "owner", "Riyaansh Mittal");
        signup(&f, "searcher", "Asha Rao");
        let vehicle_id = register(&f, "owner", "MH12AB1234");

        let contact = f
            .gateway
            .reveal("searcher", &vehicle_id, "searcher:v:1")
            .unwrap();
        assert_eq!(contact.owner_name, "Riyaansh Mittal");
        assert_eq!(contact.channels.len(), 1);
        assert_eq!(contact.channels[0].channel, ContactChannel::Phone);
        assert_eq!(contact.channels[0].value, "+919812345678");

        assert_eq!(f.ledger.balance("searcher").unwrap(), SIGNUP_BONUS - 1);
        assert_eq!(
            f.activity.stats(&vehicle_id).unwrap().contact_requests,
            1
        );
    }

    #[test]
    fn test_reveal_replay_charges_and_counts_once() {
        let f = fixture();
        signup(&f, "owner", "Riyaansh Mittal");
        signup(&f, "searcher", "Asha Rao");
        let vehicle_id = register(&f, "owner", "MH12AB1234");

        let first = f
            .gateway
            .reveal("searcher", &vehicle_id, "searcher:v:retry")
            .unwrap();
        let second = f
            .gateway
            .reveal("searcher", &vehicle_id, "searcher:v:retry")
            .unwrap();

        // Same contact both times, one charge, one counter bump.
        assert_eq!(first.channels[0].value, second.channels[0].value);
        assert_eq!(f.ledger.balance("searcher").unwrap(), SIGNUP_BONUS - 1);
        assert_eq!(
            f.activity.stats(&vehicle_id).unwrap().contact_requests,
            1
        );
        assert_eq!(
            f.activity.user_summary("searcher").unwrap().reveals_made,
            1
        );
    }

    #[test]
    fn test_reveal_insufficient_balance_leaves_no_trace() {
        let f = fixture();
        signup(&f, "owner", "Riyaansh Mittal");
        signup(&f, "searcher", "Asha Rao");
        let vehicle_id = register(&f, "owner", "MH12AB1234");

        // Drain the searcher to zero.
        f.ledger
            .debit(
                "searcher",
                SIGNUP_BONUS,
                crate::entities::EntryReason::ContactReveal,
                None,
                None,
            )
            .unwrap();

        let err = f
            .gateway
            .reveal("searcher", &vehicle_id, "searcher:v:broke")
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InsufficientBalance {
                balance: 0,
                required: REVEAL_COST
            }
        ));
        assert_eq!(f.ledger.balance("searcher").unwrap(), 0);
        assert_eq!(
            f.activity.stats(&vehicle_id).unwrap().contact_requests,
            0
        );
    }

    #[test]
    fn test_reveal_unknown_vehicle() {
        let f = fixture();
        signup(&f, "searcher", "Asha Rao");
        let err = f
            .gateway
            .reveal("searcher", "no-such-vehicle", "k")
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound));
    }

    #[test]
    fn test_reveal_not_contactable_costs_nothing() {
        let f = fixture();
        signup(&f, "owner", "Riyaansh Mittal");
        signup(&f, "searcher", "Asha Rao");
        let vehicle_id = register(&f, "owner", "MH12AB1234");

        // Owner disables every channel.
        let mut contact = ContactProfile::phone_only("+919812345678");
        contact.allow_phone = false;
        f.ledger
            .update_contact("owner", "Riyaansh Mittal", contact)
            .unwrap();

        let err = f
            .gateway
            .reveal("searcher", &vehicle_id, "searcher:v:1")
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotContactable));
        assert_eq!(f.ledger.balance("searcher").unwrap(), SIGNUP_BONUS);
    }

    #[test]
    fn test_single_word_owner_name_unmasked() {
        let f = fixture();
        signup(&f, "owner", "Riyaansh");
        register(&f, "owner", "MH12AB1234");

        match f.gateway.search(None, "MH12AB1234").unwrap() {
            SearchOutcome::Found(found) => assert_eq!(found.owner_name, "Riyaansh"),
            SearchOutcome::NotFound => panic!("expected a hit"),
        }
    }
}
