//! Grouped config structs loaded from environment variables.

use super::env_keys::{accessibility as ax_keys, channel as ch_keys, llm, observability as obv_keys};
use super::loader::{env_bool, env_optional, env_or, env_usize};
use std::path::PathBuf;

/// LLM API configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    /// Forced tool-call mode, if the user set one explicitly.
    pub forced_tool_mode: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        Self {
            api_base: env_or(llm::API_BASE, llm::API_BASE_ALIASES, || {
                "https://api.openai.com/v1".to_string()
            }),
            api_key: env_or(llm::API_KEY, llm::API_KEY_ALIASES, String::new),
            model: env_or(llm::MODEL, llm::MODEL_ALIASES, || "gpt-4o".to_string()),
            forced_tool_mode: env_optional(llm::TOOL_MODE, &[]),
        }
    }
}

/// Workspace and data-root paths.
#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub workspace: String,
    pub data_dir: PathBuf,
}

impl PathsConfig {
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        let workspace = env_optional(super::env_keys::paths::WORKSPACE, &[]).unwrap_or_else(|| {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .to_string_lossy()
                .to_string()
        });
        let data_dir = env_optional(super::env_keys::paths::DATA_DIR, &[])
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".deskagent")
            });
        Self { workspace, data_dir }
    }
}

/// Agent loop tuning and feature flags.
#[derive(Debug, Clone)]
pub struct AgentFeatureFlags {
    pub max_steps: usize,
    pub step_delay_ms: u64,
    pub idle_poll_ms: u64,
    pub max_no_tool_retries: usize,
}

impl AgentFeatureFlags {
    pub fn from_env() -> Self {
        Self {
            max_steps: env_usize(super::env_keys::agent::MAX_STEPS, 200),
            step_delay_ms: env_usize(super::env_keys::agent::STEP_DELAY_MS, 500) as u64,
            idle_poll_ms: env_usize(super::env_keys::agent::IDLE_POLL_MS, 1000) as u64,
            max_no_tool_retries: env_usize(super::env_keys::agent::MAX_NO_TOOL_RETRIES, 2),
        }
    }
}

/// Observability: quiet, log level, JSON logging.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub quiet: bool,
    pub log_level: String,
    pub log_json: bool,
}

impl ObservabilityConfig {
    pub fn from_env() -> &'static Self {
        use std::sync::OnceLock;
        static CACHE: OnceLock<ObservabilityConfig> = OnceLock::new();
        CACHE.get_or_init(|| {
            super::loader::load_dotenv();
            let quiet = env_bool(obv_keys::QUIET, obv_keys::QUIET_ALIASES, false);
            let log_level = env_or(obv_keys::LOG_LEVEL, obv_keys::LOG_LEVEL_ALIASES, || {
                "deskagent=info".to_string()
            });
            let log_json = env_bool(obv_keys::LOG_JSON, obv_keys::LOG_JSON_ALIASES, false);
            Self { quiet, log_level, log_json }
        })
    }
}

/// Accessibility back-end subprocess configuration.
#[derive(Debug, Clone)]
pub struct AccessibilityConfig {
    /// Path to the platform accessibility back-end binary. None disables the feature.
    pub backend_bin: Option<String>,
    pub query_timeout_ms: u64,
    pub search_timeout_ms: u64,
    pub snapshot_timeout_ms: u64,
    /// App bundle ids/names to poll for external (non-tool-caused) changes.
    pub watched_apps: Vec<String>,
}

impl AccessibilityConfig {
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        let watched_apps = env_optional(ax_keys::WATCHED_APPS, &[])
            .map(|s| {
                s.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            backend_bin: env_optional(ax_keys::BACKEND_BIN, &[]),
            query_timeout_ms: env_usize(ax_keys::QUERY_TIMEOUT_MS, 2000) as u64,
            search_timeout_ms: env_usize(ax_keys::SEARCH_TIMEOUT_MS, 3000) as u64,
            snapshot_timeout_ms: env_usize(ax_keys::SNAPSHOT_TIMEOUT_MS, 5000) as u64,
            watched_apps,
        }
    }
}

/// Outbound channel configuration (overlay socket, mail delivery).
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub overlay_port: u16,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub mail_from: Option<String>,
    pub mail_username: Option<String>,
    pub mail_password: Option<String>,
    pub imap_host: Option<String>,
    pub imap_port: u16,
    pub outbound_max_attempts: u32,
}

impl ChannelConfig {
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        Self {
            overlay_port: env_usize(ch_keys::OVERLAY_PORT, 19823) as u16,
            smtp_host: env_optional(ch_keys::MAIL_SMTP_HOST, &[]),
            smtp_port: env_usize(ch_keys::MAIL_SMTP_PORT, 587) as u16,
            mail_from: env_optional(ch_keys::MAIL_FROM, &[]),
            mail_username: env_optional(ch_keys::MAIL_USERNAME, &[]),
            mail_password: env_optional(ch_keys::MAIL_PASSWORD, &[]),
            imap_host: env_optional(ch_keys::MAIL_IMAP_HOST, &[]),
            imap_port: env_usize(ch_keys::MAIL_IMAP_PORT, 993) as u16,
            outbound_max_attempts: env_usize(ch_keys::OUTBOUND_MAX_ATTEMPTS, 6) as u32,
        }
    }

    pub fn mail_send_configured(&self) -> bool {
        self.smtp_host.is_some() && self.mail_from.is_some() && self.mail_username.is_some() && self.mail_password.is_some()
    }

    pub fn mail_watch_configured(&self) -> bool {
        self.imap_host.is_some() && self.mail_username.is_some() && self.mail_password.is_some()
    }
}
