//! # Ledger Demo
//!
//! Walks one admin session through the coordinator against the in-memory
//! backend: edit pricing and images, adjust stock, open a new batch, and
//! watch an activation conflict roll back.
//!
//! ## Usage
//! ```bash
//! cargo run -p stockroom-session --bin ledger-demo
//!
//! # Use a specific config file
//! cargo run -p stockroom-session --bin ledger-demo -- --config ./ledger.toml
//!
//! # Attribute log entries to someone else
//! cargo run -p stockroom-session --bin ledger-demo -- --actor warehouse
//! ```

use chrono::Utc;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use stockroom_core::batch::BatchRequest;
use stockroom_core::images::IncomingFile;
use stockroom_core::ledger::AdjustmentRequest;
use stockroom_core::{Money, OptionValue, StockReason, Variant, VariantField};
use stockroom_session::{
    init_tracing, EventEmitter, InMemoryBackend, LedgerConfig, LedgerError, LedgerEvent,
    StaticIdentity, VariantMutationCoordinator,
};

/// Prints every event as one JSON line.
struct ConsoleEmitter;

impl EventEmitter for ConsoleEmitter {
    fn emit(&self, event: &LedgerEvent) {
        match serde_json::to_string(event) {
            Ok(json) => println!("  ⚡ {}", json),
            Err(e) => eprintln!("  failed to encode event: {}", e),
        }
    }
}

fn report(err: &LedgerError) {
    match serde_json::to_string(&err.report()) {
        Ok(json) => println!("  ✗ {}", json),
        Err(_) => println!("  ✗ {}", err),
    }
}

/// Generates one variant of the demo tee.
fn tee(id: &str, size: &str, stock: i64, active: bool) -> Variant {
    Variant {
        id: id.to_string(),
        product_id: "prod-tee".to_string(),
        sku: format!("TEE-{}", size),
        price_cents: 2500,
        compare_at_price_cents: Some(3000),
        cost_per_item_cents: 1100,
        stock,
        scarcity_stock: stock.min(2),
        batch_number: 1,
        is_active: active,
        option_values: vec![
            OptionValue::new("Color", "Black"),
            OptionValue::new("Size", size),
        ],
        images: Vec::new(),
        supplier_id: Some("sup-cotton".to_string()),
        shipment_id: None,
        created_at: Utc::now(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut actor: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--actor" | "-a" => {
                if i + 1 < args.len() {
                    actor = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Stockroom Ledger Demo");
                println!();
                println!("Usage: ledger-demo [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  ledger.toml to load (default: platform config dir)");
                println!("  -a, --actor <NAME>   Name written to stock log entries");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let config = LedgerConfig::load_or_default(config_path);
    init_tracing(&config.logging.level);
    let actor = actor.unwrap_or_else(|| config.identity.default_actor.clone());

    println!("📦 Stockroom Ledger Demo");
    println!("========================");
    println!("Actor:      {}", actor);
    println!("Max images: {}", config.images.max_images);
    println!();

    let backend = InMemoryBackend::with_variants(vec![
        tee("tee-m", "M", 12, true),
        tee("tee-l", "L", 0, false),
    ]);
    let coordinator = VariantMutationCoordinator::with_emitter(
        backend,
        StaticIdentity::new(actor),
        config,
        Arc::new(ConsoleEmitter),
    );

    let loaded = coordinator.refresh().await?;
    println!("✓ Loaded {} variants", loaded);

    // Edit pricing and images in one save
    println!();
    println!("Editing TEE-M...");
    coordinator.open_session("tee-m")?;
    let added = coordinator.edit("tee-m", |s| {
        s.set_field(VariantField::Price, "27.50");
        s.set_field(VariantField::ShipmentId, "SHP-0042");
        let files = s.images_mut().add_files(vec![
            IncomingFile::new("front.png", "image/png", 48_000),
            IncomingFile::new("back.png", "image/png", 51_000),
            IncomingFile::new("sizes.pdf", "application/pdf", 9_000),
        ]);
        s.images_mut().promote_to_main(1).map(|_| files)
    })??;
    println!(
        "  Files accepted: {}, rejected: {}",
        added.accepted.len(),
        added.rejected_count()
    );
    if let Some(m) = coordinator.margin("tee-m")? {
        println!("  Live margin: {} ({:.1}%)", m.profit, m.margin_pct);
    }
    let updated = coordinator.update_variant("tee-m").await?;
    println!(
        "✓ Saved: price {}, {} images, main = {}",
        updated.price(),
        updated.images.len(),
        updated
            .images
            .iter()
            .find(|img| img.is_main)
            .map(|img| img.url.as_str())
            .unwrap_or("-")
    );

    // Saving again without edits is a no-op
    if let Err(e) = coordinator.update_variant("tee-m").await {
        report(&e);
    }
    coordinator.close_session("tee-m");

    // Stock adjustments
    println!();
    println!("Adjusting stock...");
    let water_damage = AdjustmentRequest::from_input("damaged", "3", "water damage", "")?;
    let outcome = coordinator.adjust_stock("tee-m", &water_damage).await?;
    println!("✓ TEE-M stock now {}", outcome.new_stock);

    let at_zero = AdjustmentRequest::new(StockReason::TheftLost, 4, "found in back room");
    let outcome = coordinator.adjust_stock("tee-l", &at_zero).await?;
    println!(
        "✓ TEE-L stock now {} (recorded as {})",
        outcome.new_stock,
        outcome.entry.reason()
    );

    let too_many = AdjustmentRequest::new(StockReason::Damaged, 50, "whole shelf");
    if let Err(e) = coordinator.adjust_stock("tee-m", &too_many).await {
        report(&e);
    }

    // New batch of the same combination
    println!();
    println!("Opening a new batch of TEE-M...");
    let batch = coordinator
        .create_batch(
            "tee-m",
            &BatchRequest {
                amount: 40,
                price: Money::from_cents(2750),
                cost_per_item: Money::from_cents(1000),
                scarcity_stock: 5,
            },
        )
        .await?;
    println!(
        "✓ Batch #{} created with {} units ({})",
        batch.batch_number,
        batch.stock,
        if batch.is_active { "active" } else { "inactive" }
    );

    // Only one active batch per combination: this flip is rolled back
    println!();
    println!("Activating batch #{}...", batch.batch_number);
    if let Err(e) = coordinator.toggle_active(&batch.id).await {
        report(&e);
    }
    let after = coordinator.store().require(&batch.id)?;
    println!("  Batch #{} active: {}", after.batch_number, after.is_active);

    println!("Deactivating batch #1, then activating batch #{}...", batch.batch_number);
    coordinator.toggle_active("tee-m").await?;
    let outcome = coordinator.toggle_active(&batch.id).await?;
    println!("✓ Batch #{} active: {}", outcome.variant.batch_number, outcome.variant.is_active);

    // Stock history
    println!();
    for id in ["tee-m", batch.id.as_str()] {
        let logs = coordinator.stock_logs(id).await?;
        println!("Stock log for {} ({} entries):", id, logs.len());
        for entry in logs {
            println!(
                "  {:>+4}  {:<14} {:>3} → {:<3} by {:<10} {}",
                entry.delta(),
                entry.reason().as_str(),
                entry.stock_before(),
                entry.stock_after(),
                entry.performed_by(),
                entry.description()
            );
        }
    }

    println!();
    println!("✓ Demo complete!");

    Ok(())
}
