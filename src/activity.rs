// 📊 Activity Aggregator
//
// Append-only search/contact event history plus the per-vehicle counters
// and per-user summaries derived from it. Events are immutable and survive
// vehicle removal; counters live with the vehicle and die with it.

use crate::entities::{Vehicle, VehicleStats};
use crate::error::ServiceError;
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// EVENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Search,
    ContactReveal,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Search => "search",
            ActivityKind::ContactReveal => "contact_reveal",
        }
    }

    pub fn parse(s: &str) -> Option<ActivityKind> {
        match s {
            "search" => Some(ActivityKind::Search),
            "contact_reveal" => Some(ActivityKind::ContactReveal),
            _ => None,
        }
    }
}

/// Immutable activity record. Carries a denormalized plate string so the
/// feed stays readable after the vehicle itself is removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub event_id: String,
    pub kind: ActivityKind,
    pub vehicle_id: String,
    pub plate: String,
    pub owner_id: String,
    /// The searching user, when the request was authenticated.
    pub actor_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn new(kind: ActivityKind, vehicle: &Vehicle, actor_id: Option<&str>) -> Self {
        ActivityEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            kind,
            vehicle_id: vehicle.vehicle_id.clone(),
            plate: vehicle.plate.as_str().to_string(),
            owner_id: vehicle.owner_id.clone(),
            actor_id: actor_id.map(str::to_string),
            created_at: Utc::now(),
        }
    }
}

/// Per-user rollup across both sides of the event log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySummary {
    /// Searches this user performed.
    pub searches_made: u64,
    /// Contact reveals this user paid for.
    pub reveals_made: u64,
    /// Times this user's own vehicles were searched by anyone.
    pub times_searched: u64,
    /// Times this user's own vehicles had contacts revealed.
    pub times_revealed: u64,
}

// ============================================================================
// AGGREGATOR
// ============================================================================

/// Records search/contact events and derives statistics. Mutations go
/// through [`Store::record_event`], which bumps the per-vehicle counter
/// inside the same serialization boundary as the event append.
#[derive(Clone)]
pub struct ActivityAggregator {
    store: Arc<dyn Store>,
}

impl ActivityAggregator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        ActivityAggregator { store }
    }

    /// Record that `actor_id` (if known) searched this vehicle. Bumps
    /// `total_searches` and `last_searched_at`.
    pub fn record_search(
        &self,
        vehicle: &Vehicle,
        actor_id: Option<&str>,
    ) -> Result<VehicleStats, ServiceError> {
        let event = ActivityEvent::new(ActivityKind::Search, vehicle, actor_id);
        self.store.record_event(&event)
    }

    /// Record a paid contact reveal. Bumps `contact_requests`.
    pub fn record_contact(
        &self,
        vehicle: &Vehicle,
        actor_id: &str,
    ) -> Result<VehicleStats, ServiceError> {
        let event = ActivityEvent::new(ActivityKind::ContactReveal, vehicle, Some(actor_id));
        self.store.record_event(&event)
    }

    pub fn stats(&self, vehicle_id: &str) -> Result<VehicleStats, ServiceError> {
        self.store
            .vehicle_stats(vehicle_id)?
            .ok_or(ServiceError::NotFound)
    }

    /// Notification feed for an owner: events touching their vehicles,
    /// newest first. Includes events for vehicles removed since.
    pub fn owner_feed(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<ActivityEvent>, ServiceError> {
        self.store.owner_feed(owner_id, limit)
    }

    pub fn user_summary(&self, user_id: &str) -> Result<ActivitySummary, ServiceError> {
        self.store.activity_summary(user_id)
    }
}
