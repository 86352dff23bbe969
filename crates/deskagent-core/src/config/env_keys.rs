//! Environment-variable key constants and legacy aliases.
//!
//! Primary variables use the `DESKAGENT_*` prefix; aliases exist for the
//! common provider-native names (`OPENAI_*`, `ANTHROPIC_*`) so the agent can
//! be pointed at a key the user already has set.

/// LLM API configuration.
pub mod llm {
    pub const API_BASE: &str = "DESKAGENT_API_BASE";
    pub const API_BASE_ALIASES: &[&str] = &["OPENAI_API_BASE", "OPENAI_BASE_URL", "BASE_URL"];

    pub const API_KEY: &str = "DESKAGENT_API_KEY";
    pub const API_KEY_ALIASES: &[&str] = &["OPENAI_API_KEY", "ANTHROPIC_API_KEY", "API_KEY"];

    pub const MODEL: &str = "DESKAGENT_MODEL";
    pub const MODEL_ALIASES: &[&str] = &["OPENAI_MODEL", "MODEL"];

    /// Force a tool-call mode ("native" | "text") instead of auto-detecting from the model name.
    pub const TOOL_MODE: &str = "DESKAGENT_TOOL_MODE";
}

/// Workspace, data root, and screenshot paths.
pub mod paths {
    pub const WORKSPACE: &str = "DESKAGENT_WORKSPACE";
    pub const DATA_DIR: &str = "DESKAGENT_DATA_DIR";
}

/// Observability and logging.
pub mod observability {
    pub const QUIET: &str = "DESKAGENT_QUIET";
    pub const QUIET_ALIASES: &[&str] = &[];

    pub const LOG_LEVEL: &str = "DESKAGENT_LOG_LEVEL";
    pub const LOG_LEVEL_ALIASES: &[&str] = &[];

    pub const LOG_JSON: &str = "DESKAGENT_LOG_JSON";
    pub const LOG_JSON_ALIASES: &[&str] = &[];
}

/// Agent feature flags and loop tuning.
pub mod agent {
    pub const MAX_STEPS: &str = "DESKAGENT_MAX_STEPS";
    pub const STEP_DELAY_MS: &str = "DESKAGENT_STEP_DELAY_MS";
    pub const IDLE_POLL_MS: &str = "DESKAGENT_IDLE_POLL_MS";
    pub const MAX_NO_TOOL_RETRIES: &str = "DESKAGENT_MAX_NO_TOOL_RETRIES";
}

/// Accessibility back-end subprocess configuration.
pub mod accessibility {
    pub const BACKEND_BIN: &str = "DESKAGENT_AX_BACKEND";
    pub const QUERY_TIMEOUT_MS: &str = "DESKAGENT_AX_QUERY_TIMEOUT_MS";
    pub const SEARCH_TIMEOUT_MS: &str = "DESKAGENT_AX_SEARCH_TIMEOUT_MS";
    pub const SNAPSHOT_TIMEOUT_MS: &str = "DESKAGENT_AX_SNAPSHOT_TIMEOUT_MS";
    /// Comma-separated bundle ids/app names for which external-change polling runs.
    pub const WATCHED_APPS: &str = "DESKAGENT_AX_WATCHED_APPS";
}

/// Outbound channel configuration (overlay socket, mail).
pub mod channel {
    pub const OVERLAY_PORT: &str = "DESKAGENT_OVERLAY_PORT";
    pub const MAIL_SMTP_HOST: &str = "DESKAGENT_SMTP_HOST";
    pub const MAIL_SMTP_PORT: &str = "DESKAGENT_SMTP_PORT";
    pub const MAIL_FROM: &str = "DESKAGENT_MAIL_FROM";
    pub const MAIL_USERNAME: &str = "DESKAGENT_MAIL_USERNAME";
    pub const MAIL_PASSWORD: &str = "DESKAGENT_MAIL_PASSWORD";
    pub const MAIL_IMAP_HOST: &str = "DESKAGENT_IMAP_HOST";
    pub const MAIL_IMAP_PORT: &str = "DESKAGENT_IMAP_PORT";
    pub const OUTBOUND_MAX_ATTEMPTS: &str = "DESKAGENT_OUTBOUND_MAX_ATTEMPTS";
}
