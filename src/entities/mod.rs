// Entity Models
// "Identity persists, values change"
//
// Identity lives in opaque UUID strings; values (names, balances, flags)
// change over time. Plates are a separate value type owned by `crate::plate`.

pub mod ledger;
pub mod owner;
pub mod vehicle;

pub use ledger::{EntryKind, EntryReason, LedgerAccount, LedgerEntry, ReferralApplication};
pub use owner::{mask_display_name, ContactChannel, ContactProfile, RevealedContact};
pub use vehicle::{Vehicle, VehicleStats, WheelCategory};
