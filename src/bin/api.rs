use loan_eligibility_assistant::{
    api::start_server,
    clock::{Clock, SystemClock},
    config::AppConfig,
    dialogue::DialogueEngine,
    session::{spawn_ttl_sweeper, InMemorySessionStore, SessionStore},
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    info!("🚀 Loan Eligibility Assistant - API Server");
    info!("📍 Port: {}", config.port);
    info!(
        max_attempts = config.dialogue.max_attempts,
        lockout_minutes = config.dialogue.lockout.num_minutes(),
        "Dialogue limits"
    );

    // Create components
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    if let Some(ttl) = config.session_ttl {
        info!(ttl_minutes = ttl.num_minutes(), "Session sweep enabled");
        spawn_ttl_sweeper(store.clone(), clock.clone(), ttl, config.sweep_interval);
    }

    let engine = Arc::new(DialogueEngine::new(store, clock, &config.dialogue));

    info!("✅ Dialogue engine initialized");
    info!("📡 Starting API server...");

    start_server(engine, config.port).await?;

    Ok(())
}
