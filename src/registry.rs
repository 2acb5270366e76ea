// 🗂️ Vehicle Registry
//
// Registration, lookup and removal of vehicles. Plate normalization happens
// at the boundary here, so everything past this point operates on canonical
// plates; global plate uniqueness is enforced atomically by the store.

use crate::entities::{Vehicle, WheelCategory};
use crate::error::ServiceError;
use crate::plate::Plate;
use crate::store::Store;
use std::sync::Arc;

#[derive(Clone)]
pub struct VehicleRegistry {
    store: Arc<dyn Store>,
}

impl VehicleRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        VehicleRegistry { store }
    }

    /// Register a vehicle under `owner_id`. The raw plate is normalized
    /// first; a plate held anywhere in the registry is a conflict, with
    /// `same_owner` telling the two cases apart.
    pub fn register_vehicle(
        &self,
        owner_id: &str,
        raw_plate: &str,
        wheel_category: WheelCategory,
    ) -> Result<Vehicle, ServiceError> {
        let plate = Plate::normalize(raw_plate)?;

        // The owner must hold an account; vehicles never dangle.
        if self.store.account(owner_id)?.is_none() {
            return Err(ServiceError::UnknownUser(owner_id.to_string()));
        }

        let vehicle = Vehicle::new(owner_id, plate, wheel_category);
        self.store.insert_vehicle(&vehicle)?;
        Ok(vehicle)
    }

    /// Exact lookup on the normalized plate. Case-insensitivity falls out of
    /// normalization.
    pub fn find_by_plate(&self, raw_plate: &str) -> Result<Option<Vehicle>, ServiceError> {
        let plate = Plate::normalize(raw_plate)?;
        self.store.vehicle_by_plate(&plate)
    }

    pub fn find_by_id(&self, vehicle_id: &str) -> Result<Option<Vehicle>, ServiceError> {
        self.store.vehicle_by_id(vehicle_id)
    }

    /// Unordered set of the owner's vehicles.
    pub fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Vehicle>, ServiceError> {
        self.store.vehicles_by_owner(owner_id)
    }

    /// Remove a vehicle. Only the current owner may do this; the vehicle and
    /// its stats are deleted, historical ledger entries and activity events
    /// are not.
    pub fn remove_vehicle(&self, owner_id: &str, vehicle_id: &str) -> Result<(), ServiceError> {
        self.store.remove_vehicle(owner_id, vehicle_id)
    }

    /// Owner marks the registration certificate as checked.
    pub fn set_verified(
        &self,
        owner_id: &str,
        vehicle_id: &str,
        verified: bool,
    ) -> Result<(), ServiceError> {
        self.store.set_verified(owner_id, vehicle_id, verified)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ContactProfile;
    use crate::ledger::CreditLedger;
    use crate::memory::MemoryStore;

    struct Fixture {
        ledger: CreditLedger,
        registry: VehicleRegistry,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let f = Fixture {
            ledger: CreditLedger::new(Arc::clone(&store)),
            registry: VehicleRegistry::new(store),
        };
        for user in ["owner-a", "owner-b"] {
            f.ledger
                .create_account(user, "Test User", ContactProfile::phone_only("+9198"))
                .unwrap();
        }
        f
    }

    #[test]
    fn test_register_and_find() {
        let f = fixture();
        let vehicle = f
            .registry
            .register_vehicle("owner-a", "mh 12 ab 1234", WheelCategory::FourWheeler)
            .unwrap();

        // Lookup is case/separator-insensitive by construction.
        let found = f.registry.find_by_plate("MH12AB1234").unwrap().unwrap();
        assert_eq!(found.vehicle_id, vehicle.vehicle_id);
        let found = f.registry.find_by_plate("mh-12-ab-1234").unwrap().unwrap();
        assert_eq!(found.vehicle_id, vehicle.vehicle_id);

        assert!(f.registry.find_by_plate("KA05M9876").unwrap().is_none());
    }

    #[test]
    fn test_register_requires_account() {
        let f = fixture();
        let err = f
            .registry
            .register_vehicle("ghost", "MH12AB1234", WheelCategory::FourWheeler)
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnknownUser(_)));
    }

    #[test]
    fn test_register_rejects_invalid_plate() {
        let f = fixture();
        let err = f
            .registry
            .register_vehicle("owner-a", "NOPE", WheelCategory::TwoWheeler)
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidPlate(_)));
    }

    #[test]
    fn test_conflict_then_remove_then_reregister() {
        let f = fixture();
        let vehicle = f
            .registry
            .register_vehicle("owner-a", "MH12AB1234", WheelCategory::FourWheeler)
            .unwrap();

        // Owner B hits a conflict while A holds the plate.
        let err = f
            .registry
            .register_vehicle("owner-b", "MH12AB1234", WheelCategory::FourWheeler)
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::PlateConflict { same_owner: false }
        ));

        // A removes; B can now register the freed plate.
        f.registry
            .remove_vehicle("owner-a", &vehicle.vehicle_id)
            .unwrap();
        let reregistered = f
            .registry
            .register_vehicle("owner-b", "MH12AB1234", WheelCategory::FourWheeler)
            .unwrap();
        assert_eq!(reregistered.owner_id, "owner-b");
        assert_ne!(reregistered.vehicle_id, vehicle.vehicle_id);
    }

    #[test]
    fn test_list_by_owner() {
        let f = fixture();
        f.registry
            .register_vehicle("owner-a", "MH12AB1234", WheelCategory::FourWheeler)
            .unwrap();
        f.registry
            .register_vehicle("owner-a", "26BH1234AA", WheelCategory::TwoWheeler)
            .unwrap();
        f.registry
            .register_vehicle("owner-b", "KA05M9876", WheelCategory::Heavy)
            .unwrap();

        let mut plates: Vec<String> = f
            .registry
            .list_by_owner("owner-a")
            .unwrap()
            .into_iter()
            .map(|v| v.plate.as_str().to_string())
            .collect();
        plates.sort();
        assert_eq!(plates, vec!["26BH1234AA", "MH12AB1234"]);
    }

    #[test]
    fn test_set_verified_owner_only() {
        let f = fixture();
        let vehicle = f
            .registry
            .register_vehicle("owner-a", "MH12AB1234", WheelCategory::FourWheeler)
            .unwrap();
        assert!(!vehicle.verified);

        assert!(matches!(
            f.registry.set_verified("owner-b", &vehicle.vehicle_id, true),
            Err(ServiceError::NotOwner)
        ));

        f.registry
            .set_verified("owner-a", &vehicle.vehicle_id, true)
            .unwrap();
        assert!(f
            .registry
            .find_by_id(&vehicle.vehicle_id)
            .unwrap()
            .unwrap()
            .verified);
    }
}
