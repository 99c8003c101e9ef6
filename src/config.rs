//! Process configuration read from the environment

use crate::runtime::Identity;
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_ASSISTANT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_ASSISTANT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Which storage backend the server runs on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Durable SQLite file
    Sqlite { path: PathBuf },
    /// Process-local maps, for serverless deployments without a disk
    Memory,
}

impl StoreBackend {
    fn from_env() -> Self {
        match env_var("HELP_AI_STORE").as_deref() {
            Some("memory") => StoreBackend::Memory,
            Some(other) if other != "sqlite" => {
                tracing::warn!(value = %other, "Unknown HELP_AI_STORE, falling back to sqlite");
                StoreBackend::Sqlite {
                    path: default_db_path(),
                }
            }
            _ => StoreBackend::Sqlite {
                path: env_var("HELP_AI_DB_PATH").map_or_else(default_db_path, PathBuf::from),
            },
        }
    }
}

/// Configuration for the assistant backend
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// No key means the offline echo assistant is used
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_ASSISTANT_BASE_URL.to_string(),
            model: DEFAULT_ASSISTANT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl AssistantConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: env_var("ASSISTANT_API_KEY").filter(|k| !k.is_empty()),
            base_url: env_var("ASSISTANT_BASE_URL").unwrap_or(defaults.base_url),
            model: env_var("ASSISTANT_MODEL").unwrap_or(defaults.model),
            temperature: env_var("ASSISTANT_TEMPERATURE")
                .and_then(|t| t.parse().ok())
                .unwrap_or(defaults.temperature),
            max_tokens: env_var("ASSISTANT_MAX_TOKENS")
                .and_then(|t| t.parse().ok())
                .unwrap_or(defaults.max_tokens),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub store: StoreBackend,
    pub assistant: AssistantConfig,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_var("HELP_AI_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            store: StoreBackend::from_env(),
            assistant: AssistantConfig::from_env(),
        }
    }
}

/// Terminal client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub guest: bool,
    /// Signed-in user name, if any
    pub username: Option<String>,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self {
            server_url: env_var("HELP_AI_URL").unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
            guest: env_var("HELP_AI_GUEST").is_some_and(|v| v == "1" || v == "true"),
            username: env_var("HELP_AI_USER").filter(|u| !u.trim().is_empty()),
        }
    }

    /// Guest mode wins over a configured user; neither means no identity
    pub fn identity(&self) -> Option<Identity> {
        if self.guest {
            return Some(Identity::Guest);
        }
        self.username.as_ref().map(|username| Identity::User {
            id: username.clone(),
            username: username.clone(),
        })
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn default_db_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(format!("{home}/.help-ai/help-ai.db"))
}
