//! Environment-driven configuration.
//!
//! DESIGN
//! ======
//! All knobs come from the process environment with sensible defaults, so the
//! same binary runs in dev (no env file needed) and in production (twelve-factor
//! style). Durations are written as `15m` / `720h` / `60s` strings.

use std::time::Duration;

const DEFAULT_ACCESS_EXPIRY: Duration = Duration::from_secs(15 * 60);
const DEFAULT_REFRESH_EXPIRY: Duration = Duration::from_secs(720 * 3600);
const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Application configuration loaded once at boot.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string.
    pub database_url: String,

    /// HMAC secret for signing tokens.
    pub jwt_secret: String,
    /// Access token lifetime (default 15m).
    pub jwt_access_expiry: Duration,
    /// Refresh token lifetime (default 720h).
    pub jwt_refresh_expiry: Duration,

    /// Gemini API key. Empty disables the live provider (fallbacks still work).
    pub gemini_api_key: String,
    /// Gemini model name.
    pub gemini_model: String,

    /// HTTP listen port.
    pub port: u16,

    /// Ingress limiter: max requests per principal per window.
    pub rate_limit_requests: usize,
    /// Ingress limiter: trailing window.
    pub rate_limit_window: Duration,

    /// AI dispatch queue capacity.
    pub queue_size: usize,
    /// AI dispatch worker count.
    pub queue_workers: usize,
}

impl Config {
    /// Load configuration from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            database_url: env_or("DATABASE_URL", "postgres://localhost:5432/zodiac"),
            jwt_secret: env_or("JWT_SECRET", "change-this-secret-in-production"),
            jwt_access_expiry: env_duration("JWT_ACCESS_EXPIRY", DEFAULT_ACCESS_EXPIRY),
            jwt_refresh_expiry: env_duration("JWT_REFRESH_EXPIRY", DEFAULT_REFRESH_EXPIRY),
            gemini_api_key: env_or("GEMINI_API_KEY", ""),
            gemini_model: env_or("GEMINI_MODEL", "gemini-2.0-flash-exp"),
            port: env_parse("PORT", 8080),
            rate_limit_requests: env_parse("RATE_LIMIT_REQUESTS", 100),
            rate_limit_window: env_duration("RATE_LIMIT_WINDOW", DEFAULT_RATE_LIMIT_WINDOW),
            queue_size: env_parse("AI_QUEUE_SIZE", 1000),
            queue_workers: env_parse("AI_QUEUE_WORKERS", 10),
        }
    }
}

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| fallback.to_string())
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_duration(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_duration(&v))
        .unwrap_or(default)
}

/// Parse `90s` / `15m` / `720h` style duration strings. Bare numbers are seconds.
fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (value, unit) = match raw.find(|c: char| c.is_ascii_alphabetic()) {
        Some(idx) => raw.split_at(idx),
        None => (raw, "s"),
    };
    let value: u64 = value.parse().ok()?;
    let secs = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        "d" => value * 86_400,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds() {
        assert_eq!(parse_duration("60s"), Some(Duration::from_secs(60)));
    }

    #[test]
    fn parse_duration_minutes() {
        assert_eq!(parse_duration("15m"), Some(Duration::from_secs(900)));
    }

    #[test]
    fn parse_duration_hours() {
        assert_eq!(parse_duration("720h"), Some(Duration::from_secs(720 * 3600)));
    }

    #[test]
    fn parse_duration_bare_number_is_seconds() {
        assert_eq!(parse_duration("45"), Some(Duration::from_secs(45)));
    }

    #[test]
    fn parse_duration_garbage_is_none() {
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("10y"), None);
    }

    #[test]
    fn env_parse_falls_back_on_missing() {
        assert_eq!(env_parse("NO_SUCH_VAR_FOR_TEST", 42u16), 42);
    }
}
