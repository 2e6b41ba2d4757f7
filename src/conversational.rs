//! Interactive chat driver
//!
//! Reads one line of user text per turn, records it in the history store,
//! sends the full ordered history to the model and records the reply.
//! The loop stops at `exit` (any case) or end of input; any error stops it
//! and is returned to the caller.

use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::info;

use crate::history::ConversationHistoryStore;
use crate::llm::ChatModel;
use crate::models::Message;
use crate::Result;

const EXIT_COMMAND: &str = "exit";

pub struct ChatLoop {
    store: ConversationHistoryStore,
    model: Arc<dyn ChatModel>,
    session_id: String,
}

impl ChatLoop {
    pub fn new(
        store: ConversationHistoryStore,
        model: Arc<dyn ChatModel>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            model,
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Run until `exit` or EOF. Returns the number of completed turns.
    pub async fn run<R, W>(&self, input: R, mut output: W) -> Result<usize>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let history = self.store.get_messages(&self.session_id).await?;
        output.write_all(b"Current chat history:\n").await?;
        if history.is_empty() {
            output.write_all(b"  (empty)\n").await?;
        }
        for message in &history {
            output.write_all(format!("  {}\n", message).as_bytes()).await?;
        }
        output
            .write_all(b"Start chatting with the AI. Type 'exit' to quit.\n")
            .await?;

        let mut lines = input.lines();
        let mut turns = 0;

        loop {
            output.write_all(b"User: ").await?;
            output.flush().await?;

            let Some(line) = lines.next_line().await? else {
                output.write_all(b"\n").await?;
                break;
            };

            let trimmed = line.trim();
            if is_exit(trimmed) {
                break;
            }
            if trimmed.is_empty() {
                continue;
            }

            let reply = self.turn(&line).await?;
            output
                .write_all(format!("AI: {}\n", reply.content).as_bytes())
                .await?;
            turns += 1;
        }

        output.flush().await?;
        info!(session_id = %self.session_id, turns, "Chat loop finished");
        Ok(turns)
    }

    /// One exchange: append user text, generate from the full history, append the reply.
    pub async fn turn(&self, user_input: &str) -> Result<Message> {
        self.store
            .append_user_message(&self.session_id, user_input)
            .await?;

        let messages = self.store.get_messages(&self.session_id).await?;
        let reply = self.model.generate(&messages).await?;

        self.store
            .append_ai_message(&self.session_id, &reply.content)
            .await?;

        Ok(reply)
    }
}

fn is_exit(line: &str) -> bool {
    line.eq_ignore_ascii_case(EXIT_COMMAND)
}

/// Fixed transcript sent by the one-shot `conversation` binary.
pub fn sample_conversation() -> Vec<Message> {
    vec![
        Message::system(
            "You are a helpful expert in social media content strategy and marketing.",
        ),
        Message::user(
            "I need to create a social media campaign for a new product. \
             What are the best practices for creating a campaign?",
        ),
        Message::assistant(
            "To create an effective social media campaign for a new product: \
             1) Define clear goals and KPIs. 2) Identify your target audience precisely. \
             3) Choose appropriate platforms where your audience is active. \
             4) Create compelling, consistent messaging highlighting unique value. \
             5) Use a mix of content types (videos, images, testimonials). \
             6) Implement a content calendar. 7) Allocate budget for both organic and paid promotion. \
             8) Collaborate with influencers relevant to your niche. 9) Monitor performance metrics. \
             10) Be prepared to adjust strategy based on data. \
             Give me a brief summary in 200 words.",
        ),
    ]
}
