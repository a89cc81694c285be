//! Configuration: environment-driven, fatal at startup on a missing or
//! malformed required value.

use std::env;

use tracing_subscriber::EnvFilter;

use crate::error::Error;

fn env_var(key: &str) -> Result<String, Error> {
    env::var(key).map_err(|_| Error::Config(format!("missing required environment variable {key}")))
}

/// Reads a required env var and validates it parses as a URL, so a typo'd
/// endpoint fails fast at startup rather than on the first request.
fn env_url(key: &str) -> Result<String, Error> {
    let raw = env_var(key)?;
    url::Url::parse(&raw).map_err(|e| Error::Config(format!("{key} is not a valid URL: {e}")))?;
    Ok(raw)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, Error> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("invalid value for {key}: {raw}"))),
        Err(_) => Ok(default),
    }
}

/// Runtime configuration, assembled once at startup from the process
/// environment (after `dotenvy::dotenv()` has had a chance to populate it).
#[derive(Debug, Clone)]
pub struct Config {
    pub mongodb_uri: String,
    pub mongodb_database: String,
    pub telegram_bot_token: String,

    pub trade_feed_url: String,
    pub market_service_url: String,
    pub taxonomy_sports_url: String,
    pub taxonomy_tags_url: String,
    pub chat_api_base_url: String,

    pub poll_interval_seconds: u64,
    pub max_trades_per_poll: u32,
    pub global_min_notional_usd: f64,
    pub filter_reload_interval_seconds: u64,
    pub seen_hash_ttl_minutes: u64,
    pub market_ttl_hours: u64,
    pub taxonomy_ttl_hours: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        let telegram_bot_token = env_var("TELEGRAM_BOT_TOKEN")?;
        let chat_api_base_url =
            env::var("TELEGRAM_API_BASE_URL").unwrap_or_else(|_| "https://api.telegram.org".to_string());

        Ok(Self {
            mongodb_uri: env_var("MONGODB_URI")?,
            mongodb_database: env::var("MONGODB_DATABASE").unwrap_or_else(|_| "whalewatch".to_string()),
            chat_api_base_url: format!("{chat_api_base_url}/bot{telegram_bot_token}"),
            telegram_bot_token,

            trade_feed_url: env_url("TRADE_FEED_URL")?,
            market_service_url: env_url("MARKET_SERVICE_URL")?,
            taxonomy_sports_url: env_url("TAXONOMY_SPORTS_URL")?,
            taxonomy_tags_url: env_url("TAXONOMY_TAGS_URL")?,

            poll_interval_seconds: parse_env("POLL_INTERVAL_SECONDS", 10)?,
            max_trades_per_poll: parse_env("MAX_TRADES_PER_POLL", 2000)?,
            global_min_notional_usd: parse_env("GLOBAL_MIN_NOTIONAL_USD", 0.0)?,
            filter_reload_interval_seconds: parse_env("FILTER_RELOAD_INTERVAL_SECONDS", 60)?,
            seen_hash_ttl_minutes: parse_env("SEEN_HASH_TTL_MINUTES", 15)?,
            market_ttl_hours: parse_env("MARKET_TTL_HOURS", 24)?,
            taxonomy_ttl_hours: parse_env("TAXONOMY_TTL_HOURS", 24)?,
        })
    }
}

/// Mirrors the teacher's logging setup: `RUST_LOG`-driven filtering, with an
/// optional `LOG_FORMAT=json` switch for production deployments.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // `std::env::set_var` mutates whole-process state, so every test that
    // touches it is serialized behind this lock rather than relying on
    // `cargo test`'s default parallelism to keep them apart.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_clean_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let required = [
            ("TELEGRAM_BOT_TOKEN", "placeholder"),
            ("MONGODB_URI", "placeholder"),
            ("TRADE_FEED_URL", "http://placeholder.test/trades"),
            ("MARKET_SERVICE_URL", "http://placeholder.test/markets"),
            ("TAXONOMY_SPORTS_URL", "http://placeholder.test/sports"),
            ("TAXONOMY_TAGS_URL", "http://placeholder.test/tags"),
        ];
        for (key, value) in required {
            env::set_var(key, value);
        }
        for (key, value) in vars {
            env::set_var(key, value);
        }
        let result = f();
        for (key, _) in required {
            env::remove_var(key);
        }
        for (key, _) in vars {
            env::remove_var(key);
        }
        result
    }

    #[test]
    fn missing_required_var_is_a_config_error() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        env::remove_var("MONGODB_URI");
        env::remove_var("TELEGRAM_BOT_TOKEN");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn defaults_match_spec_when_unset() {
        let config = with_clean_env(&[], Config::from_env).unwrap();
        assert_eq!(config.poll_interval_seconds, 10);
        assert_eq!(config.max_trades_per_poll, 2000);
        assert_eq!(config.global_min_notional_usd, 0.0);
        assert_eq!(config.filter_reload_interval_seconds, 60);
        assert_eq!(config.seen_hash_ttl_minutes, 15);
        assert_eq!(config.market_ttl_hours, 24);
        assert_eq!(config.taxonomy_ttl_hours, 24);
    }

    #[test]
    fn overridden_values_are_honored() {
        let config = with_clean_env(&[("MAX_TRADES_PER_POLL", "500")], Config::from_env).unwrap();
        assert_eq!(config.max_trades_per_poll, 500);
    }

    #[test]
    fn non_numeric_override_is_a_config_error() {
        let err = with_clean_env(&[("POLL_INTERVAL_SECONDS", "soon")], Config::from_env).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn chat_api_base_url_embeds_the_bot_token() {
        let config = with_clean_env(&[("TELEGRAM_BOT_TOKEN", "secret-token")], Config::from_env).unwrap();
        assert_eq!(config.chat_api_base_url, "https://api.telegram.org/botsecret-token");
    }

    #[test]
    fn malformed_endpoint_url_is_a_config_error() {
        let err = with_clean_env(&[("TRADE_FEED_URL", "not-a-url")], Config::from_env).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
