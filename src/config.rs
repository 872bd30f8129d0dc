use chrono::Duration;
use std::str::FromStr;

use crate::generator;

pub const DEFAULT_ADDR: &str = "127.0.0.1:8000";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Server settings, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// `host:port` to listen on
    pub addr: String,
    pub max_upload_bytes: usize,
    /// Idle time after which a session is dropped. `None` keeps sessions for the process lifetime.
    pub session_ttl: Option<Duration>,
    pub max_generate: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            addr: DEFAULT_ADDR.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            session_ttl: None,
            max_generate: generator::MAX_COUNT,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Unparseable values keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();

        let mut addr = lookup("BOOKGRID_ADDR").unwrap_or(defaults.addr);
        if let Some(port) = parsed::<u16>(&lookup, "PORT") {
            let host = addr.rsplit_once(':').map(|(host, _)| host).unwrap_or("127.0.0.1");
            addr = format!("{host}:{port}");
        }

        let session_ttl = parsed::<i64>(&lookup, "BOOKGRID_SESSION_TTL_SECS")
            .filter(|secs| *secs > 0)
            .map(Duration::seconds);

        Config {
            addr,
            max_upload_bytes: parsed(&lookup, "BOOKGRID_MAX_UPLOAD_BYTES")
                .unwrap_or(defaults.max_upload_bytes),
            session_ttl,
            max_generate: parsed(&lookup, "BOOKGRID_MAX_GENERATE")
                .filter(|max| (generator::MIN_COUNT..=generator::MAX_COUNT).contains(max))
                .unwrap_or(defaults.max_generate),
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("ignoring {key}={raw:?}: not a valid value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        assert_eq!(config(&[]), Config::default());
    }

    #[test]
    fn port_overrides_the_address_port() {
        let cfg = config(&[("BOOKGRID_ADDR", "0.0.0.0:3000"), ("PORT", "9000")]);
        assert_eq!(cfg.addr, "0.0.0.0:9000");
    }

    #[test]
    fn ttl_and_limits() {
        let cfg = config(&[
            ("BOOKGRID_SESSION_TTL_SECS", "600"),
            ("BOOKGRID_MAX_UPLOAD_BYTES", "1024"),
            ("BOOKGRID_MAX_GENERATE", "500"),
        ]);
        assert_eq!(cfg.session_ttl, Some(Duration::minutes(10)));
        assert_eq!(cfg.max_upload_bytes, 1024);
        assert_eq!(cfg.max_generate, 500);
    }

    #[test]
    fn bad_values_fall_back() {
        let cfg = config(&[
            ("BOOKGRID_SESSION_TTL_SECS", "soon"),
            ("BOOKGRID_MAX_GENERATE", "5000000"),
            ("PORT", "http"),
        ]);
        assert_eq!(cfg, Config::default());
    }
}
