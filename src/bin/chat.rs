use chat_history::{llm, ChatLoop, Config, ConversationHistoryStore};
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing (stderr, so the conversation on stdout stays readable)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;

    info!(session_id = %config.session_id, table = %config.table, "Initializing chat history");
    let store = ConversationHistoryStore::from_config(&config).await?;
    let model = llm::from_config(&config.llm, config.request_timeout)?;

    let chat = ChatLoop::new(store, model, config.session_id.clone());

    match chat.run(BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await {
        Ok(turns) => {
            info!(turns, "Chat session ended");
            Ok(())
        }
        Err(e) => {
            error!("Chat session failed: {}", e);
            eprintln!("Chat failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
