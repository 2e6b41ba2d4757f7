//! Runtime configuration
//!
//! Everything is read once from the process environment (after `.env` has
//! been loaded by the binary) into an explicit `Config` that is passed to the
//! constructors of the store and the model client.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::ChatError;
use crate::Result;

pub const DEFAULT_TABLE: &str = "chat_messages";
pub const DEFAULT_SESSION_ID: &str = "user_session_new";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where messages are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Supabase { url: String, api_key: String },
    Postgres { database_url: String },
    InMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Gemini,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub store: StoreConfig,
    pub table: String,
    pub session_id: String,
    pub llm: LlmConfig,
    pub request_timeout: Duration,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars().collect())
    }

    /// Load from an explicit variable map. Empty values count as unset.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let store = match (get("SUPABASE_URL"), get("SUPABASE_KEY")) {
            (Some(url), Some(api_key)) => StoreConfig::Supabase { url, api_key },
            (Some(_), None) => {
                return Err(ChatError::config("SUPABASE_URL is set but SUPABASE_KEY is missing"))
            }
            (None, Some(_)) => {
                return Err(ChatError::config("SUPABASE_KEY is set but SUPABASE_URL is missing"))
            }
            (None, None) => match get("DATABASE_URL").or_else(|| get("POSTGRES_URL")) {
                Some(database_url) => StoreConfig::Postgres { database_url },
                None => StoreConfig::InMemory,
            },
        };

        let table = get("CHAT_TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string());
        validate_table_name(&table)?;

        let session_id = get("SESSION_ID").unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());

        let request_timeout = match get("REQUEST_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    ChatError::config(format!("REQUEST_TIMEOUT_SECS is not a number: {}", raw))
                })?;
                if secs == 0 {
                    return Err(ChatError::config("REQUEST_TIMEOUT_SECS must be greater than 0"));
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let temperature = match get("LLM_TEMPERATURE") {
            Some(raw) => Some(raw.parse::<f32>().map_err(|_| {
                ChatError::config(format!("LLM_TEMPERATURE is not a number: {}", raw))
            })?),
            None => None,
        };

        let provider = match get("LLM_PROVIDER").map(|p| p.to_ascii_lowercase()).as_deref() {
            None | Some("openai") => LlmProvider::OpenAi,
            Some("gemini") => LlmProvider::Gemini,
            Some(other) => {
                return Err(ChatError::config(format!(
                    "unsupported LLM_PROVIDER '{}' (expected openai or gemini)",
                    other
                )))
            }
        };

        let llm = match provider {
            LlmProvider::OpenAi => LlmConfig {
                provider,
                api_key: get("OPENAI_API_KEY")
                    .ok_or_else(|| ChatError::config("OPENAI_API_KEY not configured"))?,
                base_url: get("OPENAI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
                model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                temperature,
            },
            LlmProvider::Gemini => LlmConfig {
                provider,
                api_key: get("GEMINI_API_KEY")
                    .ok_or_else(|| ChatError::config("GEMINI_API_KEY not configured"))?,
                base_url: get("GEMINI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
                model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
                temperature,
            },
        };

        Ok(Self {
            store,
            table,
            session_id,
            llm,
            request_timeout,
        })
    }
}

/// Table names are interpolated into SQL and REST paths, so only plain identifiers pass.
pub fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid_start && valid_rest && table.len() <= 63 {
        Ok(())
    } else {
        Err(ChatError::config(format!("invalid table name '{}'", table)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_with_only_openai_key() {
        let config = Config::from_vars(vars(&[("OPENAI_API_KEY", "sk-test")])).unwrap();
        assert_eq!(config.store, StoreConfig::InMemory);
        assert_eq!(config.table, DEFAULT_TABLE);
        assert_eq!(config.session_id, DEFAULT_SESSION_ID);
        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.llm.model, DEFAULT_OPENAI_MODEL);
        assert_eq!(config.llm.temperature, None);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_supabase_takes_precedence_over_postgres() {
        let config = Config::from_vars(vars(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("SUPABASE_URL", "https://project.supabase.co"),
            ("SUPABASE_KEY", "anon"),
            ("DATABASE_URL", "postgres://localhost/chat"),
        ]))
        .unwrap();
        assert!(matches!(config.store, StoreConfig::Supabase { .. }));
    }

    #[test]
    fn test_postgres_url_fallback() {
        let config = Config::from_vars(vars(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("POSTGRES_URL", "postgres://localhost/chat"),
        ]))
        .unwrap();
        assert_eq!(
            config.store,
            StoreConfig::Postgres {
                database_url: "postgres://localhost/chat".to_string()
            }
        );
    }

    #[test]
    fn test_half_configured_supabase_is_rejected() {
        let err = Config::from_vars(vars(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("SUPABASE_URL", "https://project.supabase.co"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        let err = Config::from_vars(vars(&[])).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let err = Config::from_vars(vars(&[("LLM_PROVIDER", "gemini")])).unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_gemini_provider() {
        let config = Config::from_vars(vars(&[
            ("LLM_PROVIDER", "Gemini"),
            ("GEMINI_API_KEY", "g-key"),
            ("LLM_TEMPERATURE", "0.2"),
        ]))
        .unwrap();
        assert_eq!(config.llm.provider, LlmProvider::Gemini);
        assert_eq!(config.llm.model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.llm.temperature, Some(0.2));
    }

    #[test]
    fn test_bad_values_are_rejected() {
        for (key, value) in [
            ("CHAT_TABLE", "chat; drop table x"),
            ("REQUEST_TIMEOUT_SECS", "0"),
            ("REQUEST_TIMEOUT_SECS", "soon"),
            ("LLM_PROVIDER", "mystery"),
            ("LLM_TEMPERATURE", "hot"),
        ] {
            let result = Config::from_vars(vars(&[("OPENAI_API_KEY", "sk-test"), (key, value)]));
            assert!(result.is_err(), "{}={} should be rejected", key, value);
        }
    }

    #[test]
    fn test_table_name_validation() {
        assert!(validate_table_name("chat_messages").is_ok());
        assert!(validate_table_name("_t1").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("1table").is_err());
        assert!(validate_table_name("public.chat").is_err());
        assert!(validate_table_name(&"a".repeat(64)).is_err());
    }
}
