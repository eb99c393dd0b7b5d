use dotenvy::dotenv;
use scholarlink::config::{self, database};
use scholarlink::context::AppContext;
use scholarlink::core::payment::reconcile_payments;
use scholarlink::errors::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, non-fatal since env vars can be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load the main application configuration
    let app_config = config::load_default_config()
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;
    info!("Successfully processed application configuration.");

    // 4. Connect and make sure the schema exists
    database::ensure_sqlite_parent_dir(&app_config.database.url)?;
    let db = database::create_connection(&app_config.database.url)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to initialize database: {}", e))?;

    // 5. Wire the providers
    let ctx = AppContext::from_config(db, &app_config)?;

    // 6. Resolve payments that succeeded at the provider but never reached their booking
    let report = reconcile_payments(&ctx.database, app_config.payments.stale_attempt_age())
        .await
        .inspect_err(|e| error!("Payment reconciliation failed: {}", e))?;
    info!(
        "Startup reconciliation: {} applied, {} refunded, {} flagged for review",
        report.applied, report.refunded, report.flagged
    );

    Ok(())
}
