// 🛵 Vehicle Entity
//
// A vehicle is owned by exactly one user at a time and carries a globally
// unique plate. Removal deletes the vehicle and its stats; the activity
// history and ledger entries that reference it are immutable and survive.

use crate::plate::{Plate, PlateFormat};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// WHEEL CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WheelCategory {
    TwoWheeler,
    ThreeWheeler,
    FourWheeler,
    Heavy,
    Other,
}

impl WheelCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            WheelCategory::TwoWheeler => "two_wheeler",
            WheelCategory::ThreeWheeler => "three_wheeler",
            WheelCategory::FourWheeler => "four_wheeler",
            WheelCategory::Heavy => "heavy",
            WheelCategory::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<WheelCategory> {
        match s {
            "two_wheeler" => Some(WheelCategory::TwoWheeler),
            "three_wheeler" => Some(WheelCategory::ThreeWheeler),
            "four_wheeler" => Some(WheelCategory::FourWheeler),
            "heavy" => Some(WheelCategory::Heavy),
            "other" => Some(WheelCategory::Other),
            _ => None,
        }
    }
}

// ============================================================================
// VEHICLE
// ============================================================================

/// Vehicle entity.
///
/// Identity: `vehicle_id` (UUID, never changes).
/// Values: plate, wheel category, verified flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    /// Stable identity (UUID), assigned at creation.
    pub vehicle_id: String,

    /// Current owner. Ownership is never reassigned; a removed plate may be
    /// re-registered by a different owner as a new vehicle.
    pub owner_id: String,

    /// Normalized plate, unique across the whole registry.
    pub plate: Plate,

    pub wheel_category: WheelCategory,

    /// Set once the owner has confirmed the registration certificate.
    pub verified: bool,

    pub created_at: DateTime<Utc>,
}

impl Vehicle {
    pub fn new(owner_id: &str, plate: Plate, wheel_category: WheelCategory) -> Self {
        Vehicle {
            vehicle_id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            plate,
            wheel_category,
            verified: false,
            created_at: Utc::now(),
        }
    }

    pub fn plate_format(&self) -> PlateFormat {
        self.plate.format()
    }
}

// ============================================================================
// STATS
// ============================================================================

/// Per-vehicle counters, mutated only through the activity aggregator.
/// Counters are monotonically non-decreasing for the life of the vehicle
/// and are deleted with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleStats {
    pub vehicle_id: String,
    pub total_searches: u64,
    pub contact_requests: u64,
    pub last_searched_at: Option<DateTime<Utc>>,
}

impl VehicleStats {
    pub fn zero(vehicle_id: &str) -> Self {
        VehicleStats {
            vehicle_id: vehicle_id.to_string(),
            total_searches: 0,
            contact_requests: 0,
            last_searched_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_vehicle_is_unverified() {
        let plate = Plate::normalize("MH12AB1234").unwrap();
        let vehicle = Vehicle::new("user-1", plate, WheelCategory::FourWheeler);
        assert!(!vehicle.verified);
        assert_eq!(vehicle.owner_id, "user-1");
        assert_eq!(vehicle.plate.as_str(), "MH12AB1234");
    }

    #[test]
    fn test_wheel_category_round_trip() {
        for cat in [
            WheelCategory::TwoWheeler,
            WheelCategory::ThreeWheeler,
            WheelCategory::FourWheeler,
            WheelCategory::Heavy,
            WheelCategory::Other,
        ] {
            assert_eq!(WheelCategory::parse(cat.as_str()), Some(cat));
        }
        assert_eq!(WheelCategory::parse("hovercraft"), None);
    }
}
