// DriveLink - Core Library
// Plate-indexed vehicle registry with a credit-gated contact-disclosure
// ledger. Exposes all modules for use in the CLI, API server, and tests.

pub mod activity;
pub mod db;
pub mod entities;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod memory;
pub mod plate;
pub mod referral;
pub mod registry;
pub mod store;

// Re-export commonly used types
pub use activity::{ActivityAggregator, ActivityEvent, ActivityKind, ActivitySummary};
pub use db::{setup_database, SqliteStore};
pub use entities::{
    mask_display_name, ContactChannel, ContactProfile, EntryKind, EntryReason, LedgerAccount,
    LedgerEntry, ReferralApplication, RevealedContact, Vehicle, VehicleStats, WheelCategory,
};
pub use error::{PlateRejection, ServiceError};
pub use gateway::{MaskedVehicle, SearchGateway, SearchOutcome};
pub use ledger::{CreditLedger, REFERRAL_REWARD, REVEAL_COST, SIGNUP_BONUS};
pub use memory::MemoryStore;
pub use plate::{Plate, PlateFormat};
pub use referral::{ReferralEngine, ReferralOutcome};
pub use registry::VehicleRegistry;
pub use store::{DebitOutcome, Store};

use std::sync::Arc;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The composed service set, sharing one storage backend. Pick the backend
/// once at composition time - `in_memory()` for tests and local runs,
/// `open(path)` for the durable SQLite store.
#[derive(Clone)]
pub struct DriveLink {
    pub ledger: CreditLedger,
    pub registry: VehicleRegistry,
    pub referrals: ReferralEngine,
    pub gateway: SearchGateway,
    pub activity: ActivityAggregator,
}

impl DriveLink {
    pub fn new(store: Arc<dyn Store>) -> Self {
        DriveLink {
            ledger: CreditLedger::new(Arc::clone(&store)),
            registry: VehicleRegistry::new(Arc::clone(&store)),
            referrals: ReferralEngine::new(Arc::clone(&store)),
            gateway: SearchGateway::new(Arc::clone(&store)),
            activity: ActivityAggregator::new(store),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ServiceError> {
        Ok(Self::new(Arc::new(SqliteStore::open(path)?)))
    }
}
