// Application configuration, loaded from environment variables and CLI flags.

use std::time::Duration;

use crate::oracle::DEFAULT_TIMEOUT;

/// Default minimum interval between two battles of one character.
pub const DEFAULT_BATTLE_COOLDOWN: Duration = Duration::from_secs(180);

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Redis connection string. `None` selects the in-memory store.
    pub redis_url: Option<String>,
    /// Text-generation endpoint judging battles. `None` disables the oracle
    /// and every battle is resolved by the local roll.
    pub oracle_url: Option<String>,
    pub oracle_api_key: Option<String>,
    /// Upper bound on a single oracle call before falling back.
    pub oracle_timeout: Duration,
    pub battle_cooldown: Duration,
    /// Whether to run in local mode (no auth, no rate limiting).
    pub local_mode: bool,
    /// Allowed CORS origin. `None` allows any origin.
    pub cors_origin: Option<String>,
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `REDIS_URL` - Redis connection string (default: in-memory store)
    /// - `ORACLE_URL` / `ORACLE_API_KEY` - battle judge endpoint and bearer key
    /// - `ORACLE_TIMEOUT_MS` - judge timeout in milliseconds (default: 8000)
    /// - `BATTLE_COOLDOWN_SECS` - per-character cooldown (default: 180)
    /// - `ARENA_LOCAL_MODE` - Set to `true` to enable local mode
    /// - `CORS_ORIGIN` - single allowed origin
    ///
    /// CLI flags:
    /// - `--local` - Enable local mode (same as `ARENA_LOCAL_MODE=true`)
    /// - `--port <PORT>` - Override the port
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    /// Build a config from CLI args and an env lookup. CLI flags win over env.
    fn from_sources(args: &[String], env: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let port = Self::parse_cli_value(args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| env("PORT").and_then(|v| v.parse().ok()))
            .unwrap_or(3000);

        let oracle_timeout = env("ORACLE_TIMEOUT_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT);

        let battle_cooldown = env("BATTLE_COOLDOWN_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_BATTLE_COOLDOWN);

        let local_mode = args.iter().any(|a| a == "--local")
            || env("ARENA_LOCAL_MODE")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false);

        Config {
            port,
            redis_url: non_empty("REDIS_URL"),
            oracle_url: non_empty("ORACLE_URL"),
            oracle_api_key: non_empty("ORACLE_API_KEY"),
            oracle_timeout,
            battle_cooldown,
            local_mode,
            cors_origin: non_empty("CORS_ORIGIN"),
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2)
            .find(|pair| pair[0] == flag)
            .map(|pair| pair[1].clone())
    }
}

/// Global flag indicating local mode is active.
/// This is set once at startup and read by the auth extractor and rate limiter.
static LOCAL_MODE: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

/// Set the local mode flag (called once at startup).
pub fn set_local_mode(enabled: bool) {
    LOCAL_MODE.store(enabled, std::sync::atomic::Ordering::Relaxed);
}

/// Check if local mode is active.
pub fn is_local_mode() -> bool {
    LOCAL_MODE.load(std::sync::atomic::Ordering::Relaxed)
}

/// Owner id assumed for unauthenticated requests in local mode.
pub const LOCAL_OWNER_ID: &str = "local";

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(args: &[&str], env: &[(&str, &str)]) -> Config {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_sources(&args, |key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&["arena"], &[]);
        assert_eq!(config.port, 3000);
        assert!(config.redis_url.is_none());
        assert!(config.oracle_url.is_none());
        assert_eq!(config.oracle_timeout, Duration::from_secs(8));
        assert_eq!(config.battle_cooldown, Duration::from_secs(180));
        assert!(!config.local_mode);
    }

    #[test]
    fn test_cli_port_overrides_env() {
        let config = load(&["arena", "--port", "8080"], &[("PORT", "9000")]);
        assert_eq!(config.port, 8080);
        let config = load(&["arena"], &[("PORT", "9000")]);
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_env_values() {
        let config = load(
            &["arena", "--local"],
            &[
                ("REDIS_URL", "redis://127.0.0.1/"),
                ("ORACLE_URL", "http://judge.local/generate"),
                ("ORACLE_TIMEOUT_MS", "2500"),
                ("BATTLE_COOLDOWN_SECS", "30"),
                ("CORS_ORIGIN", ""),
            ],
        );
        assert_eq!(config.redis_url.as_deref(), Some("redis://127.0.0.1/"));
        assert_eq!(config.oracle_timeout, Duration::from_millis(2500));
        assert_eq!(config.battle_cooldown, Duration::from_secs(30));
        assert!(config.local_mode);
        assert!(config.cors_origin.is_none());
    }

    #[test]
    fn test_local_mode_flag() {
        set_local_mode(false);
        assert!(!is_local_mode());
        set_local_mode(true);
        assert!(is_local_mode());
        // Reset for other tests
        set_local_mode(false);
    }
}
