use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration, loaded from the environment with sane defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Upstream API base URL (no trailing slash). Tests point this at a stub.
    pub api_base: String,
    /// Stale-while-revalidate threshold for the snapshot cache.
    pub freshness: Duration,
    /// Per-request timeout for upstream calls, so a hung upstream fails the
    /// cycle fast instead of wedging the single in-flight refresh.
    pub fetch_timeout: Duration,
    /// Maximum in-flight per-player history fetches.
    pub history_concurrency: usize,
    /// Recent-form window size (match history and fixture difficulty).
    pub form_window: usize,
    /// Assumed minutes per full match when deriving games played from
    /// cumulative minutes.
    pub per_match_minutes: f64,
    /// Minimum share of players with non-zero minutes before the season
    /// counts as started.
    pub min_started_share: f64,
    /// How long a cold reader blocks on the first populate before getting
    /// the "still computing" response.
    pub cold_wait: Duration,
    /// Warm the cache at boot instead of waiting for the first reader.
    pub preload_on_start: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8001,
            api_base: "https://fantasy.premierleague.com/api".to_string(),
            freshness: Duration::from_secs(1800),
            fetch_timeout: Duration::from_secs(30),
            history_concurrency: 8,
            form_window: 4,
            per_match_minutes: 90.0,
            min_started_share: 0.10,
            cold_wait: Duration::from_secs(10),
            preload_on_start: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parse("PORT", defaults.port),
            api_base: env::var("FPL_API_BASE")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            freshness: Duration::from_secs(env_parse("CACHE_FRESHNESS_SECS", 1800u64)),
            fetch_timeout: Duration::from_secs(env_parse("FETCH_TIMEOUT_SECS", 30u64)),
            history_concurrency: env_parse("HISTORY_CONCURRENCY", defaults.history_concurrency)
                .max(1),
            form_window: env_parse("FORM_WINDOW", defaults.form_window).max(1),
            per_match_minutes: env_parse("PER_MATCH_MINUTES", defaults.per_match_minutes)
                .max(1.0),
            min_started_share: env_parse("MIN_STARTED_SHARE", defaults.min_started_share)
                .clamp(0.0, 1.0),
            cold_wait: Duration::from_secs(env_parse("COLD_WAIT_SECS", 10u64)),
            preload_on_start: env_bool("PRELOAD_ON_START", defaults.preload_on_start),
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_served_cache_policy() {
        let config = Config::default();
        assert_eq!(config.freshness, Duration::from_secs(1800));
        assert_eq!(config.form_window, 4);
        assert_eq!(config.per_match_minutes, 90.0);
    }
}
