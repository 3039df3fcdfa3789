use loan_eligibility_assistant::{
    clock::SystemClock,
    config::AppConfig,
    dialogue::DialogueEngine,
    models::TurnRequest,
    session::InMemorySessionStore,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Logs go to stderr so they don't interleave with the conversation
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::from_env()?;
    let engine = DialogueEngine::new(
        Arc::new(InMemorySessionStore::new()),
        Arc::new(SystemClock),
        &config.dialogue,
    );

    info!("Loan eligibility chat starting");

    // The first turn only triggers the greeting
    let mut response = engine
        .handle_turn(TurnRequest {
            message: String::new(),
            session_id: None,
        })
        .await?;
    println!("Assistant: {}", response.message);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        response = engine
            .handle_turn(TurnRequest {
                message: line,
                session_id: Some(response.session_id.clone()),
            })
            .await?;

        println!("Assistant: {}", response.message);

        if response.completed {
            break;
        }
    }

    info!(
        session_id = %response.session_id,
        final_step = %response.current_step,
        "Loan eligibility chat finished"
    );

    Ok(())
}
