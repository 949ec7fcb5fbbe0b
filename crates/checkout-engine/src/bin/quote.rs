//! # Order Total Quote
//!
//! Prices a cart against the configured database and prints the summary.
//!
//! ## Usage
//! ```bash
//! cargo run -p checkout-engine --bin quote -- --cart ./cart.json
//! cargo run -p checkout-engine --bin quote -- --cart ./cart.json --store DEFAULT --save
//! ```
//!
//! ## Request File
//! ```json
//! {
//!   "cart": { "items": [{ "sku": "BOOK-1", "name": "Book", "unit_price": 10000, "quantity": 1 }] },
//!   "delivery": { "country": "CA", "zone": "QC" },
//!   "customer": { "id": "c1", "language": "fr" }
//! }
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use checkout_core::{Cart, Customer, Delivery};
use checkout_db::{Database, DbConfig};
use checkout_engine::{EngineConfig, EngineError, OrderTotalPipeline};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct QuoteRequest {
    cart: Cart,
    delivery: Delivery,
    customer: Customer,
    #[serde(default)]
    store: Option<String>,
    #[serde(default)]
    shipping_module: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,checkout_engine=info,checkout_db=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut cart_path: Option<PathBuf> = None;
    let mut store_arg: Option<String> = None;
    let mut module_arg: Option<String> = None;
    let mut save = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--cart" => {
                if i + 1 < args.len() {
                    cart_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--store" | "-s" => {
                if i + 1 < args.len() {
                    store_arg = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--module" | "-m" => {
                if i + 1 < args.len() {
                    module_arg = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--save" => save = true,
            "--help" | "-h" => {
                println!("Checkout Engine Quote");
                println!();
                println!("Usage: quote --cart <FILE> [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>   Engine config file (default: platform config dir)");
                println!("      --cart <FILE>     JSON request with cart, delivery and customer");
                println!("  -s, --store <CODE>    Store code (default: pricing.default_store)");
                println!("  -m, --module <CODE>   Keep this shipping module when it still applies");
                println!("      --save            Persist the computed order");
                println!("  -h, --help            Show this help message");
                return Ok(());
            }
            other => {
                eprintln!("Ignoring unknown argument: {}", other);
            }
        }
        i += 1;
    }

    let cart_path = cart_path.ok_or("missing --cart <FILE> (see --help)")?;
    let request: QuoteRequest = serde_json::from_str(&std::fs::read_to_string(&cart_path)?)?;

    let config = EngineConfig::load(config_path)?;
    let store_code = store_arg
        .or(request.store)
        .unwrap_or_else(|| config.default_store().to_string());
    let current_module = module_arg.or(request.shipping_module);

    let db = Arc::new(
        Database::new(
            DbConfig::new(&config.database.path).max_connections(config.database.max_connections),
        )
        .await?,
    );

    let store = db
        .stores()
        .get(&store_code)
        .await?
        .ok_or_else(|| EngineError::not_found("Store", store_code.as_str()))?;

    let pipeline = OrderTotalPipeline::from_source(db.clone(), config);

    let summary = pipeline
        .compute_with_module(
            &request.cart,
            &request.delivery,
            &request.customer,
            &store,
            current_module.as_deref(),
        )
        .await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);

    if save {
        let order_id = db.orders().insert(&summary).await?;
        eprintln!("✓ Saved order {}", order_id);
    }

    db.close().await;
    Ok(())
}
