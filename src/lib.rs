//! Chat History
//!
//! A session-scoped conversation log persisted to a remote table, plus the
//! small drivers that use it:
//! - `history`: the store façade and its Supabase / Postgres / in-memory backends
//! - `llm`: the chat model collaborator (OpenAI, Gemini)
//! - `conversational`: the interactive read → store → generate → store loop
//!
//! LOOP:
//! READ LINE → APPEND USER → LOAD HISTORY → GENERATE → APPEND AI → PRINT

pub mod config;
pub mod conversational;
pub mod error;
pub mod history;
pub mod llm;
pub mod models;

pub use error::{ChatError, Result, StorageError};

// Re-export common types
pub use config::Config;
pub use conversational::ChatLoop;
pub use history::{ConversationHistoryStore, HistoryBackend};
pub use llm::ChatModel;
pub use models::{Message, Role};
