use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod auth;
mod config;
mod documents;
mod domain;
mod metrics;
mod notify;
mod store;
mod util;

use config::Config;
use documents::{CsvRenderer, DocumentRenderer};
use domain::orders::OrderService;
use domain::payments::PaymentService;
use domain::tickets::TicketService;
use notify::{LogNotifier, Notifier};
use store::{Event, MemoryStore, TicketStore, User, Visibility};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ballpass=debug")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!(?config, "Starting ballpass ticket service");

    // === 1. Store (in-memory reference implementation) ===
    let memory = Arc::new(MemoryStore::new());
    if std::env::var("BALLPASS_SEED_DEMO").is_ok() {
        seed_demo(&memory);
    }
    let store: Arc<dyn TicketStore> = memory;

    // === 2. Metrics + scrape endpoint in a background thread ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    let metrics_registry = Arc::new(metrics.registry().clone());
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(error) => {
                tracing::error!("Metrics runtime error: {}", error);
                return;
            }
        };
        rt.block_on(async {
            if let Err(error) = metrics::start_metrics_server(metrics_registry, metrics_port).await
            {
                tracing::error!("Metrics server error: {}", error);
            }
        });
    });

    // === 3. Collaborators ===
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let renderer: Arc<dyn DocumentRenderer> = Arc::new(CsvRenderer);

    // === 4. Domain services ===
    let orders = Arc::new(OrderService::new(
        store.clone(),
        notifier.clone(),
        metrics.clone(),
        config.tickets_per_user,
        config.max_tickets_global,
    ));
    let payments = Arc::new(PaymentService::new(
        store.clone(),
        notifier.clone(),
        metrics.clone(),
    ));
    let tickets = Arc::new(TicketService::new(
        store.clone(),
        metrics.clone(),
        config.allow_user_ticket_download,
    ));

    let state = web::Data::new(api::AppState {
        orders,
        payments,
        tickets,
        renderer,
    });

    // === 5. API server ===
    tracing::info!(bind = %config.bind_addr, "Starting API server");
    HttpServer::new(move || App::new().app_data(state.clone()).configure(api::configure))
        .bind(config.bind_addr.as_str())?
        .run()
        .await?;

    Ok(())
}

/// Seed a demo event and two users so the API is usable out of the box.
/// Event and user administration belong to the surrounding system, not to
/// this core.
fn seed_demo(store: &MemoryStore) {
    store.insert_event(Event {
        id: "demo".to_string(),
        name: "Abiball 2026".to_string(),
        year: 2026,
        location: Some("Stadthalle".to_string()),
        visibility: Visibility::Public,
        password: None,
        max_tickets: 200,
        ticket_price: 45.0,
        start_datetime: None,
        ticket_sale_start: None,
        ticket_sale_end: None,
        max_tickets_per_user: None,
        ticket_generation_enabled: true,
        active: true,
    });
    store.insert_user(User {
        username: "admin".to_string(),
        email: "admin@example.com".to_string(),
        name: "Admin".to_string(),
        address: None,
        phone: None,
        email_verified: true,
    });
    store.insert_user(User {
        username: "max".to_string(),
        email: "max@example.com".to_string(),
        name: "Max Mustermann".to_string(),
        address: None,
        phone: None,
        email_verified: true,
    });
    tracing::info!("Seeded demo event 'demo' and users admin@example.com / max@example.com");
}
