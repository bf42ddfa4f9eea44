use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vibe_store::config::Config;
use vibe_store::db::{AppState, create_pool, init_db, queries};
use vibe_store::handlers;
use vibe_store::jwt::SessionKey;
use vibe_store::models::{CreateApp, PlanTier, PricingType, SubscriptionPlan};
use vibe_store::payments::PaymentProcessor;

/// Webhook replay records only need to outlive the processor's retry window (~3 days).
const WEBHOOK_EVENT_RETENTION_DAYS: i64 = 30;

#[derive(Parser, Debug)]
#[command(name = "vibe-store")]
#[command(about = "Purchase tracking and entitlement service for the Vibe Store marketplace")]
struct Cli {
    /// Seed the database with dev data (apps, plans, a dev user token)
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Seeds one app per pricing type and sandbox plans, and prints a dev access token.
/// Only runs in dev mode.
fn seed_dev_data(state: &AppState, config: &Config) -> Result<(), String> {
    let conn = state
        .db
        .get()
        .map_err(|e| format!("Failed to get db connection for seeding: {}", e))?;

    tracing::info!("============================================");
    tracing::info!("SEEDING DEV DATA");
    tracing::info!("============================================");

    if config.plans.is_empty() {
        for (tier, cents) in [(PlanTier::Pro, 999), (PlanTier::Enterprise, 4999)] {
            let plan = SubscriptionPlan {
                tier,
                stripe_price_id: format!("price_sandbox_{}", tier.as_ref()),
                price_cents: cents,
                currency: "usd".to_string(),
            };
            queries::upsert_plan(&conn, &plan).map_err(|e| e.to_string())?;
            tracing::info!("Plan: {} ({})", tier.as_ref(), plan.stripe_price_id);
        }
    }

    let developer_id = "dev-developer";
    let apps = [
        ("Prompt Playground", PricingType::Free, 0, None),
        ("Agent Studio", PricingType::OneTime, 1499, Some("price_sandbox_agent_studio")),
        ("Voice Notes AI", PricingType::Freemium, 499, Some("price_sandbox_voice_notes")),
        ("Research Copilot", PricingType::Subscription, 999, Some("price_sandbox_research")),
    ];

    for (name, pricing_type, price_cents, price_id) in apps {
        if let Some(price_id) = price_id
            && queries::get_app_by_price_id(&conn, price_id)
                .map_err(|e| e.to_string())?
                .is_some()
        {
            tracing::info!("App with price {} already exists, skipping", price_id);
            continue;
        }
        let app = queries::create_app(
            &conn,
            developer_id,
            &CreateApp {
                name: name.to_string(),
                pricing_type,
                price_cents,
                currency: "usd".to_string(),
                stripe_price_id: price_id.map(str::to_string),
            },
        )
        .map_err(|e| e.to_string())?;
        tracing::info!(
            "App: {} ({}, {}, price_ref {:?})",
            app.name,
            app.id,
            app.pricing_type.as_ref(),
            app.stripe_price_id
        );
    }

    let user_id = "00000000-0000-4000-8000-000000000001";
    queries::ensure_profile(&conn, user_id, Some("dev@vibe.local")).map_err(|e| e.to_string())?;
    let token = state
        .sessions
        .sign(user_id, Some("dev@vibe.local"), 7 * 86400)
        .map_err(|e| e.to_string())?;

    tracing::info!("============================================");
    tracing::info!("DEV DATA SEEDED SUCCESSFULLY");
    tracing::info!("============================================");

    println!();
    println!("--- COPY FROM HERE ---");
    println!("  user_id: {}", user_id);
    println!("  access_token: {}", token);
    println!("--- END COPY ---");
    println!();
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vibe_store=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    });

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");

        for plan in &config.plans {
            queries::upsert_plan(&conn, plan).expect("Failed to sync subscription plan");
            tracing::info!(
                "Plan {} -> {} ({} cents)",
                plan.tier.as_ref(),
                plan.stripe_price_id,
                plan.price_cents
            );
        }

        match queries::purge_old_webhook_events(&conn, WEBHOOK_EVENT_RETENTION_DAYS) {
            Ok(count) if count > 0 => {
                tracing::info!("Purged {} webhook event records", count);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to purge old webhook events: {}", e),
        }
    }

    let payments = PaymentProcessor::from_config(&config).unwrap_or_else(|e| {
        eprintln!("Failed to configure payments: {}", e);
        std::process::exit(1);
    });
    match &payments {
        Some(p) if p.is_sandbox() => {
            tracing::warn!("PAYMENT SANDBOX enabled: checkouts are simulated locally")
        }
        Some(_) => tracing::info!("Stripe payments enabled"),
        None => {}
    }

    let state = AppState {
        db: db_pool,
        base_url: config.base_url.clone(),
        sessions: SessionKey::new(&config.jwt_secret),
        payments,
    };

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set VIBE_ENV=dev)");
        } else if let Err(e) = seed_dev_data(&state, &config) {
            tracing::error!("Failed to seed dev data: {}", e);
        }
    }

    let app = handlers::router(&state, config.rate_limit_checkout_rpm)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();
    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("Vibe Store listening on {}", addr);

    // Connect info feeds the per-IP checkout rate limiter.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        for path in [db_path.clone(), format!("{}-wal", db_path), format!("{}-shm", db_path)] {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::info!("Removed {}", path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove {}: {}", path, e),
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}
