// DriveLink - API Server
// REST boundary over the core services. Transport only: every rule lives in
// the library, this file just maps requests in and domain errors out.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use drivelink::{
    ActivityEvent, ActivitySummary, ContactProfile, DriveLink, LedgerEntry, MaskedVehicle,
    ReferralOutcome, RevealedContact, SearchOutcome, ServiceError, Vehicle, WheelCategory,
    VERSION,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    app: DriveLink,
}

// ============================================================================
// API Envelope
// ============================================================================

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn fail(message: String) -> ApiResponse<T> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::InvalidPlate(_)
        | ServiceError::InvalidReferralCode
        | ServiceError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
        ServiceError::PlateConflict { .. }
        | ServiceError::AlreadyApplied
        | ServiceError::SelfReferral
        | ServiceError::AccountExists(_)
        | ServiceError::NotContactable => StatusCode::CONFLICT,
        ServiceError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
        ServiceError::NotFound | ServiceError::UnknownUser(_) => StatusCode::NOT_FOUND,
        ServiceError::NotOwner => StatusCode::FORBIDDEN,
        ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T: Serialize>(result: Result<T, ServiceError>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::ok(data))).into_response(),
        Err(err) => {
            let status = status_for(&err);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                tracing::error!(error = %err, "request failed");
            } else {
                tracing::debug!(error = %err, "request rejected");
            }
            (status, Json(ApiResponse::<T>::fail(err.to_string()))).into_response()
        }
    }
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Deserialize)]
struct CreateAccountRequest {
    user_id: String,
    display_name: String,
    phone: String,
    email: Option<String>,
}

#[derive(Deserialize)]
struct UpdateContactRequest {
    display_name: String,
    phone: String,
    email: Option<String>,
    #[serde(default)]
    allow_phone: bool,
    #[serde(default)]
    allow_sms: bool,
    #[serde(default)]
    allow_whatsapp: bool,
    #[serde(default)]
    allow_email: bool,
}

#[derive(Deserialize)]
struct ApplyReferralRequest {
    user_id: String,
    code: String,
}

#[derive(Deserialize)]
struct RegisterVehicleRequest {
    owner_id: String,
    raw_plate: String,
    wheel_category: WheelCategory,
}

#[derive(Deserialize)]
struct SetVerifiedRequest {
    owner_id: String,
    verified: bool,
}

#[derive(Deserialize)]
struct RevealRequest {
    user_id: String,
    vehicle_id: String,
    idempotency_key: String,
}

#[derive(Deserialize)]
struct OwnerQuery {
    owner_id: String,
}

#[derive(Deserialize)]
struct SearchQuery {
    plate: String,
    user_id: Option<String>,
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

const DEFAULT_LIMIT: usize = 50;

#[derive(Serialize)]
struct BalanceResponse {
    user_id: String,
    balance: i64,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok(format!("DriveLink v{VERSION}")))
}

/// POST /api/accounts - Create account (grants the signup bonus)
async fn create_account(
    State(state): State<AppState>,
    Json(req): Json<CreateAccountRequest>,
) -> Response {
    let mut contact = ContactProfile::phone_only(&req.phone);
    contact.email = req.email;
    respond(
        state
            .app
            .ledger
            .create_account(&req.user_id, &req.display_name, contact),
    )
}

/// PUT /api/accounts/:user_id/contact - Update contact profile/flags
async fn update_contact(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<UpdateContactRequest>,
) -> Response {
    let contact = ContactProfile {
        phone: req.phone,
        email: req.email,
        allow_phone: req.allow_phone,
        allow_sms: req.allow_sms,
        allow_whatsapp: req.allow_whatsapp,
        allow_email: req.allow_email,
    };
    respond::<()>(
        state
            .app
            .ledger
            .update_contact(&user_id, &req.display_name, contact),
    )
}

/// GET /api/balance/:user_id
async fn get_balance(State(state): State<AppState>, Path(user_id): Path<String>) -> Response {
    respond(state.app.ledger.balance(&user_id).map(|balance| {
        BalanceResponse { user_id, balance }
    }))
}

/// GET /api/ledger/:user_id?limit= - Entry history, most recent first
async fn get_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Response {
    respond::<Vec<LedgerEntry>>(
        state
            .app
            .ledger
            .history(&user_id, query.limit.unwrap_or(DEFAULT_LIMIT)),
    )
}

/// POST /api/referrals/apply
async fn apply_referral(
    State(state): State<AppState>,
    Json(req): Json<ApplyReferralRequest>,
) -> Response {
    respond::<ReferralOutcome>(state.app.referrals.apply(&req.user_id, &req.code))
}

/// POST /api/vehicles - Register a vehicle
async fn register_vehicle(
    State(state): State<AppState>,
    Json(req): Json<RegisterVehicleRequest>,
) -> Response {
    respond::<Vehicle>(state.app.registry.register_vehicle(
        &req.owner_id,
        &req.raw_plate,
        req.wheel_category,
    ))
}

/// GET /api/vehicles?owner_id= - The owner's vehicles
async fn list_vehicles(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
) -> Response {
    respond::<Vec<Vehicle>>(state.app.registry.list_by_owner(&query.owner_id))
}

/// DELETE /api/vehicles/:vehicle_id?owner_id=
async fn remove_vehicle(
    State(state): State<AppState>,
    Path(vehicle_id): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> Response {
    respond::<()>(state.app.registry.remove_vehicle(&query.owner_id, &vehicle_id))
}

/// PUT /api/vehicles/:vehicle_id/verified
async fn set_verified(
    State(state): State<AppState>,
    Path(vehicle_id): Path<String>,
    Json(req): Json<SetVerifiedRequest>,
) -> Response {
    respond::<()>(
        state
            .app
            .registry
            .set_verified(&req.owner_id, &vehicle_id, req.verified),
    )
}

/// GET /api/search?plate=&user_id= - Masked lookup; a miss is 404
async fn search(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> Response {
    let result = state
        .app
        .gateway
        .search(query.user_id.as_deref(), &query.plate);
    match result {
        Ok(SearchOutcome::Found(found)) => {
            (StatusCode::OK, Json(ApiResponse::ok(found))).into_response()
        }
        Ok(SearchOutcome::NotFound) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<MaskedVehicle>::fail(
                "no vehicle registered under this plate".to_string(),
            )),
        )
            .into_response(),
        Err(err) => respond::<MaskedVehicle>(Err(err)),
    }
}

/// POST /api/reveal - Spend a credit to disclose contact channels
async fn reveal_contact(
    State(state): State<AppState>,
    Json(req): Json<RevealRequest>,
) -> Response {
    respond::<RevealedContact>(state.app.gateway.reveal(
        &req.user_id,
        &req.vehicle_id,
        &req.idempotency_key,
    ))
}

/// GET /api/activity/:owner_id?limit= - Owner notification feed
async fn owner_feed(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Response {
    respond::<Vec<ActivityEvent>>(
        state
            .app
            .activity
            .owner_feed(&owner_id, query.limit.unwrap_or(DEFAULT_LIMIT)),
    )
}

/// GET /api/activity/:user_id/summary
async fn activity_summary(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Response {
    respond::<ActivitySummary>(state.app.activity.user_summary(&user_id))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("drivelink=info")),
        )
        .init();

    let db_path = std::env::var("DRIVELINK_DB").unwrap_or_else(|_| "drivelink.db".to_string());
    let app = match DriveLink::open(&db_path) {
        Ok(app) => app,
        Err(err) => {
            tracing::error!(error = %err, path = %db_path, "failed to open database");
            std::process::exit(1);
        }
    };
    tracing::info!(path = %db_path, "database opened");

    let state = AppState { app };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/accounts", post(create_account))
        .route("/accounts/:user_id/contact", put(update_contact))
        .route("/balance/:user_id", get(get_balance))
        .route("/ledger/:user_id", get(get_history))
        .route("/referrals/apply", post(apply_referral))
        .route("/vehicles", post(register_vehicle).get(list_vehicles))
        .route("/vehicles/:vehicle_id", delete(remove_vehicle))
        .route("/vehicles/:vehicle_id/verified", put(set_verified))
        .route("/search", get(search))
        .route("/reveal", post(reveal_contact))
        .route("/activity/:owner_id", get(owner_feed))
        .route("/activity/:user_id/summary", get(activity_summary))
        .with_state(state);

    let router = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let addr = std::env::var("DRIVELINK_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!(%addr, "DriveLink server listening");

    axum::serve(listener, router)
        .await
        .expect("Failed to start server");
}
