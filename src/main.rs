use std::sync::Arc;

use anyhow::Context;
use broker_market::config::Config;
use broker_market::filters::{PropertySearch, SearchBy};
use broker_market::gateway::{to_row, Gateway, MemoryGateway, RestGateway, Table};
use broker_market::models::{
    BrokerRegistration, BrokerStatus, ListingType, NewProperty, PropertyCategory,
};
use broker_market::{Store, StoreOptions};
use chrono::Utc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let gateway: Arc<dyn Gateway> = match &config.backend {
        Some(backend) => Arc::new(RestGateway::new(backend).context("Failed to create backend client")?),
        None => {
            let gateway = MemoryGateway::new();
            seed_demo_data(&gateway)?;
            Arc::new(gateway)
        }
    };
    info!("🏠 Broker Market ({} backend)", gateway.backend_name());

    let store = Arc::new(Store::new(
        gateway,
        StoreOptions {
            sync_policy: config.sync_policy,
            snapshot_path: Some(config.snapshot_path.clone()),
            bot_reply_delay: config.bot_reply_delay,
        },
    ));
    store.hydrate()?;

    store.fetch_site_config().await.context("Failed to load site configuration")?;
    store.fetch_banner_slides().await.context("Failed to load banners")?;
    store.fetch_brokers().await.context("Failed to load brokers")?;
    store.fetch_properties().await.context("Failed to load properties")?;

    let mut args = std::env::args().skip(1);
    let by = match args.next().as_deref() {
        Some("district") => SearchBy::District,
        Some("village") => SearchBy::Village,
        Some("agent") => SearchBy::Agent,
        _ => SearchBy::City,
    };
    let query = args.collect::<Vec<_>>().join(" ");
    let results = store.search(&PropertySearch::by(by, query.clone()));

    info!("Found {} listings for {:?} '{}'", results.len(), by, query);
    let state = store.state();
    for (i, property) in results.iter().enumerate() {
        println!("{}. {} (₹{})", i + 1, property.title, property.price);
        println!("   {}, {}", property.city, property.district);
        if let Some(broker) = state.broker(&property.broker_id) {
            println!("   Broker: {}", broker.name);
        }
        println!("   Likes: {}  Leads: {}", property.likes_count, property.leads_count);
        println!("   Expires: {}", property.expires_at.format("%Y-%m-%d"));
        println!();
    }

    store.flush_snapshot().context("Failed to write snapshot")?;
    Ok(())
}

/// Sample brokers and listings for running without a backend
fn seed_demo_data(gateway: &MemoryGateway) -> anyhow::Result<()> {
    let now = Utc::now();
    let mut brokers = Vec::new();
    for (id, name, city, code) in [
        ("demo-b1", "Coastal Homes", "Mangaluru", "CST001"),
        ("demo-b2", "Udupi Realty", "Udupi", "UDP002"),
    ] {
        let mut broker = BrokerRegistration {
            name: name.to_string(),
            email: format!("{}@example.com", id),
            phone: "9845000000".to_string(),
            rera_number: format!("PRM/KA/RERA/{}", id),
            service_districts: vec!["Dakshina Kannada".to_string(), "Udupi".to_string()],
            city: city.to_string(),
            ..Default::default()
        }
        .into_profile(id.to_string(), code.to_string(), now);
        broker.status = BrokerStatus::Approved;
        brokers.push(to_row(&broker)?);
    }
    gateway.seed(Table::Brokers, brokers);

    let listings = [
        ("demo-p1", "demo-b1", "3BHK flat near Kadri Park", 8_900_000, "Mangalore", PropertyCategory::Residential, ListingType::Sale),
        ("demo-p2", "demo-b1", "Shop space on MG Road", 45_000, "Mangaluru", PropertyCategory::Commercial, ListingType::Rent),
        ("demo-p3", "demo-b2", "Coconut garden, 1 acre", 3_200_000, "Udupi", PropertyCategory::Agricultural, ListingType::Sale),
        ("demo-p4", "demo-b2", "Residential plot near Malpe", 2_400_000, "Udupi", PropertyCategory::Plot, ListingType::Sale),
    ];
    let mut rows = Vec::new();
    for (id, broker_id, title, price, city, category, listing_type) in listings {
        let listing = NewProperty {
            title: title.to_string(),
            description: format!("{} in {}", title, city),
            price,
            category,
            listing_type,
            city: city.to_string(),
            district: (if city == "Udupi" { "Udupi" } else { "Dakshina Kannada" }).to_string(),
            village: None,
            address: city.to_string(),
            area_sqft: None,
            bedrooms: None,
            amenities: Vec::new(),
        }
        .into_listing(id.to_string(), broker_id.to_string(), Vec::new(), now);
        rows.push(to_row(&listing)?);
    }
    gateway.seed(Table::Properties, rows);
    Ok(())
}
