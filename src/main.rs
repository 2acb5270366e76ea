use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

use drivelink::{
    ContactProfile, DriveLink, SearchOutcome, SqliteStore, WheelCategory, VERSION,
};

fn db_path() -> PathBuf {
    env::var("DRIVELINK_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("drivelink.db"))
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("init") => run_init(),
        Some("demo") => run_demo(),
        _ => {
            println!("DriveLink v{VERSION}");
            println!();
            println!("Usage:");
            println!("  drivelink init   Create or upgrade the SQLite schema");
            println!("                   (DRIVELINK_DB, default ./drivelink.db)");
            println!("  drivelink demo   Seed a demo dataset and walk a search/reveal");
            println!();
            println!("API server: cargo run --bin drivelink-server --features server");
            Ok(())
        }
    }
}

fn run_init() -> Result<()> {
    let path = db_path();
    println!("🔧 Setting up database at {:?}...", path);

    SqliteStore::open(&path).with_context(|| format!("failed to open database {path:?}"))?;

    println!("✓ Schema ready (WAL mode enabled)");
    Ok(())
}

/// Seed an in-memory stack and walk the whole flow once. Handy smoke check
/// without touching a database file.
fn run_demo() -> Result<()> {
    println!("🚗 DriveLink demo");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let app = DriveLink::in_memory();

    // 1. Accounts
    let owner = app.ledger.create_account(
        "demo-owner",
        "Riyaansh Mittal",
        ContactProfile::phone_only("+919812345678"),
    )?;
    app.ledger.create_account(
        "demo-searcher",
        "Asha Rao",
        ContactProfile::phone_only("+919800000001"),
    )?;
    println!("✓ Accounts created (signup bonus: {} credits each)", owner.balance);
    println!("  Referral code for Riyaansh: {}", owner.referral_code);

    // 2. Referral
    let outcome = app.referrals.apply("demo-searcher", &owner.referral_code)?;
    println!(
        "✓ Referral applied: both sides earned {} credits",
        outcome.reward
    );

    // 3. Registration
    let vehicle =
        app.registry
            .register_vehicle("demo-owner", "MH 12 AB 1234", WheelCategory::FourWheeler)?;
    println!(
        "✓ Registered {} ({})",
        vehicle.plate,
        vehicle.plate.format().name()
    );

    // 4. Search (masked)
    match app.gateway.search(Some("demo-searcher"), "mh12ab1234")? {
        SearchOutcome::Found(found) => {
            println!("✓ Search hit: owner shown as \"{}\"", found.owner_name)
        }
        SearchOutcome::NotFound => println!("✗ Search missed (unexpected)"),
    }

    // 5. Reveal (paid)
    let contact = app
        .gateway
        .reveal("demo-searcher", &vehicle.vehicle_id, "demo:reveal:1")?;
    println!("✓ Contact revealed: {} channel(s)", contact.channels.len());
    for channel in &contact.channels {
        println!("    {} -> {}", channel.channel.as_str(), channel.value);
    }

    let balance = app.ledger.balance("demo-searcher")?;
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Searcher balance after reveal: {} credits", balance);

    Ok(())
}
