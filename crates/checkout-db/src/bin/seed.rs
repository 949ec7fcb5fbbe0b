//! # Seed Data Generator
//!
//! Populates the database with a demo Canadian store.
//!
//! ## Usage
//! ```bash
//! cargo run -p checkout-db --bin seed
//! cargo run -p checkout-db --bin seed -- --db ./data/checkout.db --store DEFAULT
//! ```
//!
//! ## Seeded Configuration
//! ```text
//! Tax rates (store DEFAULT)
//!   GST   CA *    5%      priority 1
//!   HST   CA ON   13%     priority 1   (beats GST in Ontario: zone is more specific)
//!   QST   CA QC   9.975%  priority 2   (parent GST)
//!   PST   CA BC   7%      priority 2   (parent GST)
//!
//! Shipping modules
//!   CANADAPOST  CA          priority 1
//!   USPS        US          priority 1
//!   PUROLATOR   CA/QC CA/ON priority 2
//! ```

use std::env;

use checkout_core::{
    Delivery, RatePercent, ShippingModule, ShippingRegion, Store, TaxRate, DEFAULT_STORE_CODE,
};
use checkout_db::{Database, DbConfig};
use rust_decimal::Decimal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./checkout_dev.db");
    let mut store_code = String::from(DEFAULT_STORE_CODE);

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--store" | "-s" => {
                if i + 1 < args.len() {
                    store_code = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Checkout Engine Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>      Database file path (default: ./checkout_dev.db)");
                println!("  -s, --store <CODE>   Store code to create (default: DEFAULT)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Checkout Engine Seed Data Generator");
    println!("======================================");
    println!("Database: {}", db_path);
    println!("Store:    {}", store_code);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    if db.stores().exists(&store_code).await? {
        println!("⚠ Store {} already exists", store_code);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let mut address = Delivery::new("CA").with_zone("QC").with_postal_code("H2X 1Y4");
    address.city = Some("Montreal".to_string());

    db.stores()
        .insert(&Store {
            code: store_code.clone(),
            name: "Demo Store".to_string(),
            currency: "CAD".to_string(),
            default_language: "en".to_string(),
            address,
        })
        .await?;
    println!("✓ Created store {}", store_code);

    let rates = vec![
        TaxRate::new(&store_code, "GST", "CA", RatePercent::from_bps(500), 1),
        TaxRate::new(&store_code, "HST", "CA", RatePercent::from_bps(1300), 1).in_zone("ON"),
        TaxRate::new(&store_code, "QST", "CA", RatePercent::new(Decimal::new(9975, 3))?, 2)
            .in_zone("QC")
            .with_parent("GST"),
        TaxRate::new(&store_code, "PST", "CA", RatePercent::from_bps(700), 2)
            .in_zone("BC")
            .with_parent("GST"),
    ];

    for rate in &rates {
        db.tax_rates().insert(rate).await?;
        println!(
            "  tax  {:<10} {} {:<4} {:>7}  priority {}",
            rate.code,
            rate.country,
            rate.zone.as_deref().unwrap_or("*"),
            rate.rate.to_string(),
            rate.priority
        );
    }

    let modules = vec![
        ShippingModule::new("CANADAPOST", 1, vec![ShippingRegion::country("CA")]),
        ShippingModule::new("USPS", 1, vec![ShippingRegion::country("US")]),
        ShippingModule::new(
            "PUROLATOR",
            2,
            vec![ShippingRegion::zone("CA", "QC"), ShippingRegion::zone("CA", "ON")],
        ),
    ];

    for module in &modules {
        db.shipping_modules().insert(&store_code, module).await?;
        println!(
            "  ship {:<10} {} region(s)  priority {}",
            module.code,
            module.regions.len(),
            module.priority
        );
    }

    println!();
    println!(
        "✓ Seed complete: {} tax rates, {} shipping modules",
        rates.len(),
        modules.len()
    );

    Ok(())
}
