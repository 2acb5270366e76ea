// SQLite Store
//
// Production backend. One bundled-SQLite connection behind a mutex: every
// write runs inside an explicit transaction, so multi-step operations
// (debit, referral application, removal) commit or roll back as a unit.
// UNIQUE constraints backstop the uniqueness invariants (plate, referral
// code, idempotency key, one referral per referee) even if a check races.

use crate::activity::{ActivityEvent, ActivityKind, ActivitySummary};
use crate::entities::{
    ContactProfile, EntryKind, EntryReason, LedgerAccount, LedgerEntry, ReferralApplication,
    Vehicle, VehicleStats, WheelCategory,
};
use crate::error::ServiceError;
use crate::plate::Plate;
use crate::store::{DebitOutcome, Store};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and run schema setup.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ServiceError> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    /// Fresh private database, used by tests.
    pub fn open_in_memory() -> Result<Self, ServiceError> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }
}

pub fn setup_database(conn: &Connection) -> Result<(), ServiceError> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ledger_accounts (
            user_id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            phone TEXT NOT NULL,
            email TEXT,
            allow_phone INTEGER NOT NULL DEFAULT 0,
            allow_sms INTEGER NOT NULL DEFAULT 0,
            allow_whatsapp INTEGER NOT NULL DEFAULT 0,
            allow_email INTEGER NOT NULL DEFAULT 0,
            balance INTEGER NOT NULL DEFAULT 0,
            referral_code TEXT UNIQUE NOT NULL,
            referred_by TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ledger_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entry_id TEXT UNIQUE NOT NULL,
            user_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            amount INTEGER NOT NULL,
            reason TEXT NOT NULL,
            related_vehicle_id TEXT,
            related_user_id TEXT,
            idempotency_key TEXT UNIQUE,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS vehicles (
            vehicle_id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            plate TEXT UNIQUE NOT NULL,
            plate_format TEXT NOT NULL,
            wheel_category TEXT NOT NULL,
            verified INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            total_searches INTEGER NOT NULL DEFAULT 0,
            contact_requests INTEGER NOT NULL DEFAULT 0,
            last_searched_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS referral_applications (
            referee_id TEXT PRIMARY KEY,
            referrer_id TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS activity_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            kind TEXT NOT NULL,
            vehicle_id TEXT NOT NULL,
            plate TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            actor_id TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_entries_user ON ledger_entries(user_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_vehicles_owner ON vehicles(owner_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_owner ON activity_events(owner_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_actor ON activity_events(actor_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn parse_ts(raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| rusqlite::Error::InvalidQuery)
}

fn parse_opt_ts(raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(parse_ts).transpose()
}

const ACCOUNT_COLUMNS: &str = "user_id, display_name, phone, email, allow_phone, allow_sms, \
     allow_whatsapp, allow_email, balance, referral_code, referred_by, created_at";

fn account_from_row(row: &Row) -> rusqlite::Result<LedgerAccount> {
    Ok(LedgerAccount {
        user_id: row.get(0)?,
        display_name: row.get(1)?,
        contact: ContactProfile {
            phone: row.get(2)?,
            email: row.get(3)?,
            allow_phone: row.get(4)?,
            allow_sms: row.get(5)?,
            allow_whatsapp: row.get(6)?,
            allow_email: row.get(7)?,
        },
        balance: row.get(8)?,
        referral_code: row.get(9)?,
        referred_by: row.get(10)?,
        created_at: parse_ts(row.get(11)?)?,
    })
}

const ENTRY_COLUMNS: &str = "entry_id, user_id, kind, amount, reason, related_vehicle_id, \
     related_user_id, idempotency_key, created_at";

fn entry_from_row(row: &Row) -> rusqlite::Result<LedgerEntry> {
    let kind: String = row.get(2)?;
    let reason: String = row.get(4)?;
    Ok(LedgerEntry {
        entry_id: row.get(0)?,
        user_id: row.get(1)?,
        kind: EntryKind::parse(&kind).ok_or(rusqlite::Error::InvalidQuery)?,
        amount: row.get(3)?,
        reason: EntryReason::parse(&reason).ok_or(rusqlite::Error::InvalidQuery)?,
        related_vehicle_id: row.get(5)?,
        related_user_id: row.get(6)?,
        idempotency_key: row.get(7)?,
        created_at: parse_ts(row.get(8)?)?,
    })
}

const VEHICLE_COLUMNS: &str = "vehicle_id, owner_id, plate, wheel_category, verified, created_at";

fn vehicle_from_row(row: &Row) -> rusqlite::Result<Vehicle> {
    let plate: String = row.get(2)?;
    let category: String = row.get(3)?;
    Ok(Vehicle {
        vehicle_id: row.get(0)?,
        owner_id: row.get(1)?,
        plate: Plate::from_canonical(&plate).map_err(|_| rusqlite::Error::InvalidQuery)?,
        wheel_category: WheelCategory::parse(&category).ok_or(rusqlite::Error::InvalidQuery)?,
        verified: row.get(4)?,
        created_at: parse_ts(row.get(5)?)?,
    })
}

const EVENT_COLUMNS: &str = "event_id, kind, vehicle_id, plate, owner_id, actor_id, created_at";

fn event_from_row(row: &Row) -> rusqlite::Result<ActivityEvent> {
    let kind: String = row.get(1)?;
    Ok(ActivityEvent {
        event_id: row.get(0)?,
        kind: ActivityKind::parse(&kind).ok_or(rusqlite::Error::InvalidQuery)?,
        vehicle_id: row.get(2)?,
        plate: row.get(3)?,
        owner_id: row.get(4)?,
        actor_id: row.get(5)?,
        created_at: parse_ts(row.get(6)?)?,
    })
}

fn insert_entry(conn: &Connection, entry: &LedgerEntry) -> Result<(), ServiceError> {
    conn.execute(
        "INSERT INTO ledger_entries (
            entry_id, user_id, kind, amount, reason,
            related_vehicle_id, related_user_id, idempotency_key, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entry.entry_id,
            entry.user_id,
            entry.kind.as_str(),
            entry.amount,
            entry.reason.as_str(),
            entry.related_vehicle_id,
            entry.related_user_id,
            entry.idempotency_key,
            entry.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

// ============================================================================
// STORE IMPLEMENTATION
// ============================================================================

impl Store for SqliteStore {
    fn insert_account(
        &self,
        account: &LedgerAccount,
        signup_entry: &LedgerEntry,
    ) -> Result<(), ServiceError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let exists: Option<String> = tx
            .query_row(
                "SELECT user_id FROM ledger_accounts WHERE user_id = ?1",
                params![account.user_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(ServiceError::AccountExists(account.user_id.clone()));
        }

        tx.execute(
            "INSERT INTO ledger_accounts (
                user_id, display_name, phone, email,
                allow_phone, allow_sms, allow_whatsapp, allow_email,
                balance, referral_code, referred_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                account.user_id,
                account.display_name,
                account.contact.phone,
                account.contact.email,
                account.contact.allow_phone,
                account.contact.allow_sms,
                account.contact.allow_whatsapp,
                account.contact.allow_email,
                account.balance,
                account.referral_code,
                account.referred_by,
                account.created_at.to_rfc3339(),
            ],
        )?;
        insert_entry(&tx, signup_entry)?;

        tx.commit()?;
        Ok(())
    }

    fn account(&self, user_id: &str) -> Result<Option<LedgerAccount>, ServiceError> {
        let conn = self.conn.lock().unwrap();
        let account = conn
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM ledger_accounts WHERE user_id = ?1"),
                params![user_id],
                account_from_row,
            )
            .optional()?;
        Ok(account)
    }

    fn account_by_referral_code(
        &self,
        code: &str,
    ) -> Result<Option<LedgerAccount>, ServiceError> {
        let conn = self.conn.lock().unwrap();
        let account = conn
            .query_row(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM ledger_accounts WHERE referral_code = ?1"
                ),
                params![code],
                account_from_row,
            )
            .optional()?;
        Ok(account)
    }

    fn update_contact(
        &self,
        user_id: &str,
        display_name: &str,
        contact: &ContactProfile,
    ) -> Result<(), ServiceError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE ledger_accounts
             SET display_name = ?1, phone = ?2, email = ?3,
                 allow_phone = ?4, allow_sms = ?5, allow_whatsapp = ?6, allow_email = ?7
             WHERE user_id = ?8",
            params![
                display_name,
                contact.phone,
                contact.email,
                contact.allow_phone,
                contact.allow_sms,
                contact.allow_whatsapp,
                contact.allow_email,
                user_id,
            ],
        )?;
        if updated == 0 {
            return Err(ServiceError::UnknownUser(user_id.to_string()));
        }
        Ok(())
    }

    fn credit(&self, entry: &LedgerEntry) -> Result<(), ServiceError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE ledger_accounts SET balance = balance + ?1 WHERE user_id = ?2",
            params![entry.amount, entry.user_id],
        )?;
        if updated == 0 {
            return Err(ServiceError::UnknownUser(entry.user_id.clone()));
        }
        insert_entry(&tx, entry)?;

        tx.commit()?;
        Ok(())
    }

    fn debit(&self, entry: &LedgerEntry) -> Result<DebitOutcome, ServiceError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        // Replay detection first: a committed key returns the prior entry.
        if let Some(key) = &entry.idempotency_key {
            let prior = tx
                .query_row(
                    &format!(
                        "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE idempotency_key = ?1"
                    ),
                    params![key],
                    entry_from_row,
                )
                .optional()?;
            if let Some(prior) = prior {
                if prior.user_id != entry.user_id {
                    return Err(ServiceError::Storage(format!(
                        "idempotency key {key} reused across users"
                    )));
                }
                return Ok(DebitOutcome {
                    entry: prior,
                    replayed: true,
                });
            }
        }

        let balance: Option<i64> = tx
            .query_row(
                "SELECT balance FROM ledger_accounts WHERE user_id = ?1",
                params![entry.user_id],
                |row| row.get(0),
            )
            .optional()?;
        let balance = balance.ok_or_else(|| ServiceError::UnknownUser(entry.user_id.clone()))?;

        if balance < entry.amount {
            // Nothing staged; dropping the transaction leaves no trace.
            return Err(ServiceError::InsufficientBalance {
                balance,
                required: entry.amount,
            });
        }

        tx.execute(
            "UPDATE ledger_accounts SET balance = balance - ?1 WHERE user_id = ?2",
            params![entry.amount, entry.user_id],
        )?;
        insert_entry(&tx, entry)?;

        tx.commit()?;
        Ok(DebitOutcome {
            entry: entry.clone(),
            replayed: false,
        })
    }

    fn history(&self, user_id: &str, limit: usize) -> Result<Vec<LedgerEntry>, ServiceError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries
             WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2"
        ))?;
        let entries = stmt
            .query_map(params![user_id, limit as i64], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn apply_referral(
        &self,
        application: &ReferralApplication,
        referee_entry: &LedgerEntry,
        referrer_entry: &LedgerEntry,
    ) -> Result<(), ServiceError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let referred_by: Option<Option<String>> = tx
            .query_row(
                "SELECT referred_by FROM ledger_accounts WHERE user_id = ?1",
                params![application.referee_id],
                |row| row.get(0),
            )
            .optional()?;
        match referred_by {
            None => return Err(ServiceError::UnknownUser(application.referee_id.clone())),
            Some(Some(_)) => return Err(ServiceError::AlreadyApplied),
            Some(None) => {}
        }

        // PRIMARY KEY on referee_id backstops a racing second application.
        tx.execute(
            "INSERT INTO referral_applications (referee_id, referrer_id, applied_at)
             VALUES (?1, ?2, ?3)",
            params![
                application.referee_id,
                application.referrer_id,
                application.applied_at.to_rfc3339(),
            ],
        )
        .map_err(|err| match err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                ServiceError::AlreadyApplied
            }
            other => ServiceError::from(other),
        })?;

        tx.execute(
            "UPDATE ledger_accounts
             SET referred_by = ?1, balance = balance + ?2
             WHERE user_id = ?3",
            params![
                application.referrer_id,
                referee_entry.amount,
                application.referee_id,
            ],
        )?;
        insert_entry(&tx, referee_entry)?;

        let updated = tx.execute(
            "UPDATE ledger_accounts SET balance = balance + ?1 WHERE user_id = ?2",
            params![referrer_entry.amount, application.referrer_id],
        )?;
        if updated == 0 {
            // Roll the whole application back rather than reward one side.
            return Err(ServiceError::UnknownUser(application.referrer_id.clone()));
        }
        insert_entry(&tx, referrer_entry)?;

        tx.commit()?;
        Ok(())
    }

    fn referral_for(
        &self,
        referee_id: &str,
    ) -> Result<Option<ReferralApplication>, ServiceError> {
        let conn = self.conn.lock().unwrap();
        let application = conn
            .query_row(
                "SELECT referee_id, referrer_id, applied_at
                 FROM referral_applications WHERE referee_id = ?1",
                params![referee_id],
                |row| {
                    Ok(ReferralApplication {
                        referee_id: row.get(0)?,
                        referrer_id: row.get(1)?,
                        applied_at: parse_ts(row.get(2)?)?,
                    })
                },
            )
            .optional()?;
        Ok(application)
    }

    fn insert_vehicle(&self, vehicle: &Vehicle) -> Result<(), ServiceError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let holder: Option<String> = tx
            .query_row(
                "SELECT owner_id FROM vehicles WHERE plate = ?1",
                params![vehicle.plate.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(owner_id) = holder {
            return Err(ServiceError::PlateConflict {
                same_owner: owner_id == vehicle.owner_id,
            });
        }

        tx.execute(
            "INSERT INTO vehicles (
                vehicle_id, owner_id, plate, plate_format, wheel_category,
                verified, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                vehicle.vehicle_id,
                vehicle.owner_id,
                vehicle.plate.as_str(),
                vehicle.plate.format().code(),
                vehicle.wheel_category.as_str(),
                vehicle.verified,
                vehicle.created_at.to_rfc3339(),
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn vehicle_by_plate(&self, plate: &Plate) -> Result<Option<Vehicle>, ServiceError> {
        let conn = self.conn.lock().unwrap();
        let vehicle = conn
            .query_row(
                &format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE plate = ?1"),
                params![plate.as_str()],
                vehicle_from_row,
            )
            .optional()?;
        Ok(vehicle)
    }

    fn vehicle_by_id(&self, vehicle_id: &str) -> Result<Option<Vehicle>, ServiceError> {
        let conn = self.conn.lock().unwrap();
        let vehicle = conn
            .query_row(
                &format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE vehicle_id = ?1"),
                params![vehicle_id],
                vehicle_from_row,
            )
            .optional()?;
        Ok(vehicle)
    }

    fn vehicles_by_owner(&self, owner_id: &str) -> Result<Vec<Vehicle>, ServiceError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE owner_id = ?1"
        ))?;
        let vehicles = stmt
            .query_map(params![owner_id], vehicle_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(vehicles)
    }

    fn remove_vehicle(&self, owner_id: &str, vehicle_id: &str) -> Result<(), ServiceError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let holder: Option<String> = tx
            .query_row(
                "SELECT owner_id FROM vehicles WHERE vehicle_id = ?1",
                params![vehicle_id],
                |row| row.get(0),
            )
            .optional()?;
        match holder {
            None => return Err(ServiceError::NotFound),
            Some(holder) if holder != owner_id => return Err(ServiceError::NotOwner),
            Some(_) => {}
        }

        // Stats live on the vehicle row and die with it; ledger entries and
        // activity events are history and stay untouched.
        tx.execute(
            "DELETE FROM vehicles WHERE vehicle_id = ?1",
            params![vehicle_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn set_verified(
        &self,
        owner_id: &str,
        vehicle_id: &str,
        verified: bool,
    ) -> Result<(), ServiceError> {
        let conn = self.conn.lock().unwrap();

        let holder: Option<String> = conn
            .query_row(
                "SELECT owner_id FROM vehicles WHERE vehicle_id = ?1",
                params![vehicle_id],
                |row| row.get(0),
            )
            .optional()?;
        match holder {
            None => return Err(ServiceError::NotFound),
            Some(holder) if holder != owner_id => return Err(ServiceError::NotOwner),
            Some(_) => {}
        }

        conn.execute(
            "UPDATE vehicles SET verified = ?1 WHERE vehicle_id = ?2",
            params![verified, vehicle_id],
        )?;
        Ok(())
    }

    fn record_event(&self, event: &ActivityEvent) -> Result<VehicleStats, ServiceError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let updated = match event.kind {
            ActivityKind::Search => tx.execute(
                "UPDATE vehicles
                 SET total_searches = total_searches + 1, last_searched_at = ?1
                 WHERE vehicle_id = ?2",
                params![event.created_at.to_rfc3339(), event.vehicle_id],
            )?,
            ActivityKind::ContactReveal => tx.execute(
                "UPDATE vehicles SET contact_requests = contact_requests + 1
                 WHERE vehicle_id = ?1",
                params![event.vehicle_id],
            )?,
        };
        if updated == 0 {
            return Err(ServiceError::NotFound);
        }

        tx.execute(
            "INSERT INTO activity_events (
                event_id, kind, vehicle_id, plate, owner_id, actor_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.event_id,
                event.kind.as_str(),
                event.vehicle_id,
                event.plate,
                event.owner_id,
                event.actor_id,
                event.created_at.to_rfc3339(),
            ],
        )?;

        let stats = tx.query_row(
            "SELECT total_searches, contact_requests, last_searched_at
             FROM vehicles WHERE vehicle_id = ?1",
            params![event.vehicle_id],
            |row| {
                Ok(VehicleStats {
                    vehicle_id: event.vehicle_id.clone(),
                    total_searches: row.get::<_, i64>(0)? as u64,
                    contact_requests: row.get::<_, i64>(1)? as u64,
                    last_searched_at: parse_opt_ts(row.get(2)?)?,
                })
            },
        )?;

        tx.commit()?;
        Ok(stats)
    }

    fn vehicle_stats(&self, vehicle_id: &str) -> Result<Option<VehicleStats>, ServiceError> {
        let conn = self.conn.lock().unwrap();
        let stats = conn
            .query_row(
                "SELECT total_searches, contact_requests, last_searched_at
                 FROM vehicles WHERE vehicle_id = ?1",
                params![vehicle_id],
                |row| {
                    Ok(VehicleStats {
                        vehicle_id: vehicle_id.to_string(),
                        total_searches: row.get::<_, i64>(0)? as u64,
                        contact_requests: row.get::<_, i64>(1)? as u64,
                        last_searched_at: parse_opt_ts(row.get(2)?)?,
                    })
                },
            )
            .optional()?;
        Ok(stats)
    }

    fn owner_feed(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<ActivityEvent>, ServiceError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM activity_events
             WHERE owner_id = ?1 ORDER BY id DESC LIMIT ?2"
        ))?;
        let events = stmt
            .query_map(params![owner_id, limit as i64], event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    fn activity_summary(&self, user_id: &str) -> Result<ActivitySummary, ServiceError> {
        let conn = self.conn.lock().unwrap();

        let count = |sql: &str, kind: ActivityKind| -> Result<u64, ServiceError> {
            let n: i64 = conn.query_row(sql, params![user_id, kind.as_str()], |row| row.get(0))?;
            Ok(n as u64)
        };

        Ok(ActivitySummary {
            searches_made: count(
                "SELECT COUNT(*) FROM activity_events WHERE actor_id = ?1 AND kind = ?2",
                ActivityKind::Search,
            )?,
            reveals_made: count(
                "SELECT COUNT(*) FROM activity_events WHERE actor_id = ?1 AND kind = ?2",
                ActivityKind::ContactReveal,
            )?,
            times_searched: count(
                "SELECT COUNT(*) FROM activity_events WHERE owner_id = ?1 AND kind = ?2",
                ActivityKind::Search,
            )?,
            times_revealed: count(
                "SELECT COUNT(*) FROM activity_events WHERE owner_id = ?1 AND kind = ?2",
                ActivityKind::ContactReveal,
            )?,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn seed_account(store: &SqliteStore, user_id: &str, code: &str) {
        let account = LedgerAccount::new(
            user_id,
            "Test User",
            ContactProfile::phone_only("+919800000000"),
            code.to_string(),
            3,
        );
        let signup = LedgerEntry::earned(user_id, 3, EntryReason::SignupBonus);
        store.insert_account(&account, &signup).unwrap();
    }

    fn seed_vehicle(store: &SqliteStore, owner_id: &str, plate: &str) -> Vehicle {
        let vehicle = Vehicle::new(
            owner_id,
            Plate::normalize(plate).unwrap(),
            WheelCategory::FourWheeler,
        );
        store.insert_vehicle(&vehicle).unwrap();
        vehicle
    }

    #[test]
    fn test_account_round_trip() {
        let store = store();
        seed_account(&store, "u1", "AAAA1111");

        let account = store.account("u1").unwrap().unwrap();
        assert_eq!(account.user_id, "u1");
        assert_eq!(account.balance, 3);
        assert_eq!(account.referral_code, "AAAA1111");
        assert!(account.referred_by.is_none());
        assert!(account.contact.allow_phone);

        let by_code = store.account_by_referral_code("AAAA1111").unwrap().unwrap();
        assert_eq!(by_code.user_id, "u1");
        assert!(store.account_by_referral_code("ZZZZ9999").unwrap().is_none());
    }

    #[test]
    fn test_signup_entry_written_with_account() {
        let store = store();
        seed_account(&store, "u1", "AAAA1111");

        let history = store.history("u1", 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason, EntryReason::SignupBonus);
        assert_eq!(history[0].signed_amount(), 3);
    }

    #[test]
    fn test_debit_balance_and_replay() {
        let store = store();
        seed_account(&store, "u1", "AAAA1111");

        let entry = LedgerEntry::spent("u1", 1, EntryReason::ContactReveal)
            .with_idempotency_key("u1:v1:a1");
        let first = store.debit(&entry).unwrap();
        assert!(!first.replayed);
        assert_eq!(store.account("u1").unwrap().unwrap().balance, 2);

        let retry = LedgerEntry::spent("u1", 1, EntryReason::ContactReveal)
            .with_idempotency_key("u1:v1:a1");
        let second = store.debit(&retry).unwrap();
        assert!(second.replayed);
        assert_eq!(second.entry.entry_id, first.entry.entry_id);
        assert_eq!(store.account("u1").unwrap().unwrap().balance, 2);
        assert_eq!(store.history("u1", 10).unwrap().len(), 2);
    }

    #[test]
    fn test_debit_insufficient_balance_writes_nothing() {
        let store = store();
        seed_account(&store, "u1", "AAAA1111");

        let entry = LedgerEntry::spent("u1", 99, EntryReason::ContactReveal);
        let err = store.debit(&entry).unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientBalance { .. }));
        assert_eq!(store.account("u1").unwrap().unwrap().balance, 3);
        assert_eq!(store.history("u1", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_plate_conflict_distinguishes_owner() {
        let store = store();
        seed_vehicle(&store, "owner-a", "MH12AB1234");

        let same = Vehicle::new(
            "owner-a",
            Plate::normalize("MH12AB1234").unwrap(),
            WheelCategory::TwoWheeler,
        );
        assert!(matches!(
            store.insert_vehicle(&same).unwrap_err(),
            ServiceError::PlateConflict { same_owner: true }
        ));

        let other = Vehicle::new(
            "owner-b",
            Plate::normalize("MH12AB1234").unwrap(),
            WheelCategory::TwoWheeler,
        );
        assert!(matches!(
            store.insert_vehicle(&other).unwrap_err(),
            ServiceError::PlateConflict { same_owner: false }
        ));
    }

    #[test]
    fn test_remove_and_reregister_plate() {
        let store = store();
        let v = seed_vehicle(&store, "owner-a", "MH12AB1234");

        assert!(matches!(
            store.remove_vehicle("owner-b", &v.vehicle_id).unwrap_err(),
            ServiceError::NotOwner
        ));
        store.remove_vehicle("owner-a", &v.vehicle_id).unwrap();
        assert!(matches!(
            store.remove_vehicle("owner-a", &v.vehicle_id).unwrap_err(),
            ServiceError::NotFound
        ));

        // Freed plate is registrable by a different owner.
        seed_vehicle(&store, "owner-b", "MH12AB1234");
        let found = store
            .vehicle_by_plate(&Plate::normalize("MH12AB1234").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(found.owner_id, "owner-b");
    }

    #[test]
    fn test_record_event_bumps_counters() {
        let store = store();
        let v = seed_vehicle(&store, "owner-a", "MH12AB1234");

        let search = ActivityEvent::new(ActivityKind::Search, &v, Some("searcher"));
        let stats = store.record_event(&search).unwrap();
        assert_eq!(stats.total_searches, 1);
        assert_eq!(stats.contact_requests, 0);
        assert!(stats.last_searched_at.is_some());

        let reveal = ActivityEvent::new(ActivityKind::ContactReveal, &v, Some("searcher"));
        let stats = store.record_event(&reveal).unwrap();
        assert_eq!(stats.total_searches, 1);
        assert_eq!(stats.contact_requests, 1);

        let summary = store.activity_summary("searcher").unwrap();
        assert_eq!(summary.searches_made, 1);
        assert_eq!(summary.reveals_made, 1);
        let owner_summary = store.activity_summary("owner-a").unwrap();
        assert_eq!(owner_summary.times_searched, 1);
        assert_eq!(owner_summary.times_revealed, 1);
    }

    #[test]
    fn test_owner_feed_survives_removal() {
        let store = store();
        let v = seed_vehicle(&store, "owner-a", "MH12AB1234");
        let event = ActivityEvent::new(ActivityKind::Search, &v, None);
        store.record_event(&event).unwrap();

        store.remove_vehicle("owner-a", &v.vehicle_id).unwrap();
        assert!(store.vehicle_stats(&v.vehicle_id).unwrap().is_none());

        let feed = store.owner_feed("owner-a", 10).unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].plate, "MH12AB1234");
        assert_eq!(feed[0].kind, ActivityKind::Search);
    }

    #[test]
    fn test_apply_referral_atomic() {
        let store = store();
        seed_account(&store, "referee", "AAAA1111");
        seed_account(&store, "referrer", "BBBB2222");

        let application = ReferralApplication::new("referee", "referrer");
        let referee_entry = LedgerEntry::earned("referee", 5, EntryReason::ReferralReward)
            .with_related_user("referrer");
        let referrer_entry = LedgerEntry::earned("referrer", 5, EntryReason::ReferralReward)
            .with_related_user("referee");

        store
            .apply_referral(&application, &referee_entry, &referrer_entry)
            .unwrap();

        let referee = store.account("referee").unwrap().unwrap();
        assert_eq!(referee.balance, 8);
        assert_eq!(referee.referred_by.as_deref(), Some("referrer"));
        assert_eq!(store.account("referrer").unwrap().unwrap().balance, 8);

        assert!(matches!(
            store
                .apply_referral(&application, &referee_entry, &referrer_entry)
                .unwrap_err(),
            ServiceError::AlreadyApplied
        ));
    }

    #[test]
    fn test_apply_referral_unknown_referrer_rolls_back() {
        let store = store();
        seed_account(&store, "referee", "AAAA1111");

        let application = ReferralApplication::new("referee", "ghost");
        let referee_entry = LedgerEntry::earned("referee", 5, EntryReason::ReferralReward);
        let referrer_entry = LedgerEntry::earned("ghost", 5, EntryReason::ReferralReward);

        let err = store
            .apply_referral(&application, &referee_entry, &referrer_entry)
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnknownUser(_)));

        // Nothing committed: no flag, no reward, no application row.
        let referee = store.account("referee").unwrap().unwrap();
        assert_eq!(referee.balance, 3);
        assert!(referee.referred_by.is_none());
        assert!(store.referral_for("referee").unwrap().is_none());
    }

    #[test]
    fn test_balance_equals_signed_sum() {
        let store = store();
        seed_account(&store, "u1", "AAAA1111");
        store
            .credit(&LedgerEntry::earned("u1", 5, EntryReason::ReferralReward))
            .unwrap();
        store
            .debit(&LedgerEntry::spent("u1", 1, EntryReason::ContactReveal))
            .unwrap();

        let account = store.account("u1").unwrap().unwrap();
        let sum: i64 = store
            .history("u1", 1000)
            .unwrap()
            .iter()
            .map(LedgerEntry::signed_amount)
            .sum();
        assert_eq!(account.balance, sum);
        assert_eq!(account.balance, 7);
    }
}
