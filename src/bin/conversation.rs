use chat_history::{conversational::sample_conversation, llm, ChatModel, Config};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::from_env()?;
    config.llm.temperature = Some(0.0);

    let model = llm::from_config(&config.llm, config.request_timeout)?;
    let messages = sample_conversation();

    info!(model = %config.llm.model, messages = messages.len(), "Sending fixed conversation");

    let reply = model.generate(&messages).await.map_err(|e| {
        eprintln!("Generation failed: {}", e);
        e
    })?;

    println!("{}", reply.content);
    Ok(())
}
