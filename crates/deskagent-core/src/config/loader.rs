//! Centralised environment-variable loading.
//!
//! Keeps the primary/alias fallback chains in one place instead of repeating
//! `or_else` calls throughout the business code.

use std::env;

/// Load `.env` from the current directory into the process environment
/// (does not override variables already set). Runs once per process.
pub fn load_dotenv() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let path = env::current_dir()
            .map(|d| d.join(".env"))
            .unwrap_or_else(|_| std::path::PathBuf::from(".env"));
        if let Ok(content) = std::fs::read_to_string(&path) {
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some(eq_pos) = line.find('=') {
                    let key = line[..eq_pos].trim();
                    let mut value = line[eq_pos + 1..].trim();
                    if let Some(hash_pos) = value.find('#') {
                        let before_hash = value[..hash_pos].trim_end();
                        if !before_hash.contains('"') && !before_hash.contains('\'') {
                            value = before_hash;
                        }
                    }
                    if (value.starts_with('"') && value.ends_with('"'))
                        || (value.starts_with('\'') && value.ends_with('\''))
                    {
                        value = &value[1..value.len() - 1];
                    }
                    if !key.is_empty() && env::var(key).is_err() {
                        set_env_var(key, value);
                    }
                }
            }
        }
    });
}

/// Read the primary variable or an alias chain, falling back to a default.
pub fn env_or<F>(primary: &str, aliases: &[&str], default: F) -> String
where
    F: FnOnce() -> String,
{
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(default)
}

/// Read the primary variable or an alias chain; empty values are treated as unset.
pub fn env_optional(primary: &str, aliases: &[&str]) -> Option<String> {
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
        .and_then(|s| {
            let s = s.trim().to_string();
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        })
}

/// Parse a boolean env var: 1/true/yes is true, 0/false/no/off is false.
pub fn env_bool(primary: &str, aliases: &[&str], default: bool) -> bool {
    let v = env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()));
    match v.as_deref() {
        Some(s) => !matches!(
            s.trim().to_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        ),
        None => default,
    }
}

/// Parse a numeric env var with a default.
pub fn env_usize(primary: &str, default: usize) -> usize {
    env::var(primary).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

// ─── Centralised `env::set_var` / `remove_var` wrappers ────────────────────
//
// All calls to `std::env::set_var`/`remove_var` go through these so `unsafe`
// stays confined to one place. Callers must only invoke these before spawning
// the tokio runtime (single-threaded startup).

#[allow(unsafe_code)]
pub fn set_env_var(key: &str, value: &str) {
    unsafe { env::set_var(key, value) };
}

#[allow(unsafe_code)]
pub fn remove_env_var(key: &str) {
    unsafe { env::remove_var(key) };
}

/// RAII guard that clears an environment variable on drop.
pub struct ScopedEnvGuard(pub &'static str);

impl Drop for ScopedEnvGuard {
    fn drop(&mut self) {
        remove_env_var(self.0);
    }
}

/// Resolve and create the data root (`~/.deskagent` unless overridden), along
/// with its `steps`, `screenshots`, `traces`, and `queue` subdirectories.
pub fn ensure_data_root() -> std::path::PathBuf {
    let root = super::PathsConfig::from_env().data_dir;
    for sub in ["memory/steps", "memory/screenshots", "traces", "queue"] {
        let _ = std::fs::create_dir_all(root.join(sub));
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment variables are process-global; serialise the tests that
    // touch them so they don't race under `cargo test`'s default threading.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn env_bool_recognises_falsey_strings() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_env_var("DESKAGENT_TEST_FLAG", "off");
        assert!(!env_bool("DESKAGENT_TEST_FLAG", &[], true));
        remove_env_var("DESKAGENT_TEST_FLAG");
        assert!(env_bool("DESKAGENT_TEST_FLAG", &[], true));
    }

    #[test]
    fn env_or_falls_back_through_alias_chain() {
        let _guard = ENV_LOCK.lock().unwrap();
        remove_env_var("DESKAGENT_TEST_PRIMARY");
        set_env_var("DESKAGENT_TEST_ALIAS", "from-alias");
        let v = env_or("DESKAGENT_TEST_PRIMARY", &["DESKAGENT_TEST_ALIAS"], || "default".into());
        assert_eq!(v, "from-alias");
        remove_env_var("DESKAGENT_TEST_ALIAS");
    }

    #[test]
    fn scoped_env_guard_clears_on_drop() {
        let _outer = ENV_LOCK.lock().unwrap();
        set_env_var("DESKAGENT_TEST_SCOPED", "1");
        {
            let _guard = ScopedEnvGuard("DESKAGENT_TEST_SCOPED");
            assert_eq!(env::var("DESKAGENT_TEST_SCOPED").as_deref(), Ok("1"));
        }
        assert!(env::var("DESKAGENT_TEST_SCOPED").is_err());
    }
}
