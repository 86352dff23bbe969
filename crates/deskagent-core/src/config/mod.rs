//! Unified configuration layer.
//!
//! All environment-variable reads are centralised here; business code accesses
//! config through structured values rather than calling `std::env::var` directly.
//!
//! - `loader`: `env_or`, `env_optional`, `env_bool`, dotenv loading helpers.
//! - `schema`: grouped config structs (`LlmConfig`, `PathsConfig`, `ObservabilityConfig`, ...).
//! - `env_keys`: named environment-variable key constants (with legacy aliases).

pub mod env_keys;
pub mod loader;
pub mod schema;

pub use loader::{
    ensure_data_root, env_bool, env_optional, env_or, load_dotenv, remove_env_var, set_env_var,
    ScopedEnvGuard,
};
pub use schema::{
    AccessibilityConfig, AgentFeatureFlags, ChannelConfig, LlmConfig, ObservabilityConfig,
    PathsConfig,
};
