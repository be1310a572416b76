//! Environment configuration, resolved once at startup.
//!
//! | Variable | Default |
//! |---|---|
//! | `APP_NAME` | `container-concepts-demo` |
//! | `HOSTNAME` | `unknown` |
//! | `SHUTDOWN_DELAY` | `3` (seconds, negative = never shut down) |
//! | `UNREADY_ON_SHUTDOWN` | `true` |
//! | `BIND_ADDR` | `0.0.0.0:3000` |
//!
//! Values that do not parse fall back to the default with a warning.

use std::time::Duration;

use tracing::warn;

pub const DEFAULT_APP_NAME: &str = "container-concepts-demo";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_SHUTDOWN_DELAY_SECS: i64 = 3;

/// How long the sequencer waits between readiness off and drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownDelay {
    After(Duration),
    /// Simulates a pod stuck in termination until the kubelet sends SIGKILL.
    Never,
}

impl ShutdownDelay {
    /// `SHUTDOWN_DELAY` semantics: negative means never.
    pub fn from_secs(secs: i64) -> Self {
        match u64::try_from(secs) {
            Ok(secs) => Self::After(Duration::from_secs(secs)),
            Err(_) => Self::Never,
        }
    }
}

/// Settings for the shutdown sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownConfig {
    pub unready_on_shutdown: bool,
    pub delay: ShutdownDelay,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            unready_on_shutdown: true,
            delay: ShutdownDelay::from_secs(DEFAULT_SHUTDOWN_DELAY_SECS),
        }
    }
}

/// Process-wide settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    pub hostname: String,
    pub bind_addr: String,
    pub shutdown: ShutdownConfig,
}

impl Config {
    /// Reads the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Empty values count as
    /// unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let delay_secs = match get("SHUTDOWN_DELAY") {
            Some(raw) => raw.trim().parse::<i64>().unwrap_or_else(|_| {
                warn!(value = %raw, "SHUTDOWN_DELAY is not an integer, using default");
                DEFAULT_SHUTDOWN_DELAY_SECS
            }),
            None => DEFAULT_SHUTDOWN_DELAY_SECS,
        };

        let unready_on_shutdown = match get("UNREADY_ON_SHUTDOWN") {
            Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "UNREADY_ON_SHUTDOWN is not a boolean, using default");
                true
            }),
            None => true,
        };

        Self {
            app_name: get("APP_NAME").unwrap_or_else(|| DEFAULT_APP_NAME.to_owned()),
            hostname: get("HOSTNAME").unwrap_or_else(|| "unknown".to_owned()),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned()),
            shutdown: ShutdownConfig {
                unready_on_shutdown,
                delay: ShutdownDelay::from_secs(delay_secs),
            },
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = config(&[]);
        assert_eq!(cfg.app_name, DEFAULT_APP_NAME);
        assert_eq!(cfg.hostname, "unknown");
        assert_eq!(cfg.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(cfg.shutdown, ShutdownConfig::default());
        assert_eq!(
            cfg.shutdown.delay,
            ShutdownDelay::After(Duration::from_secs(3))
        );
        assert!(cfg.shutdown.unready_on_shutdown);
    }

    #[test]
    fn negative_delay_means_never() {
        assert_eq!(
            config(&[("SHUTDOWN_DELAY", "-1")]).shutdown.delay,
            ShutdownDelay::Never
        );
    }

    #[test]
    fn zero_delay_is_immediate() {
        assert_eq!(
            config(&[("SHUTDOWN_DELAY", "0")]).shutdown.delay,
            ShutdownDelay::After(Duration::ZERO)
        );
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let cfg = config(&[
            ("SHUTDOWN_DELAY", "soon"),
            ("UNREADY_ON_SHUTDOWN", "maybe"),
            ("APP_NAME", ""),
        ]);
        assert_eq!(cfg.shutdown, ShutdownConfig::default());
        assert_eq!(cfg.app_name, DEFAULT_APP_NAME);
    }

    #[test]
    fn boolean_spellings() {
        for (raw, expected) in [
            ("true", true),
            ("TRUE", true),
            ("yes", true),
            ("1", true),
            ("False", false),
            ("no", false),
            ("0", false),
        ] {
            assert_eq!(
                config(&[("UNREADY_ON_SHUTDOWN", raw)]).shutdown.unready_on_shutdown,
                expected,
                "{raw}"
            );
        }
    }

    #[test]
    fn explicit_values_win() {
        let cfg = config(&[
            ("APP_NAME", "checkout"),
            ("HOSTNAME", "checkout-7d9f-abc"),
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("SHUTDOWN_DELAY", "15"),
        ]);
        assert_eq!(cfg.app_name, "checkout");
        assert_eq!(cfg.hostname, "checkout-7d9f-abc");
        assert_eq!(cfg.bind_addr, "127.0.0.1:8080");
        assert_eq!(
            cfg.shutdown.delay,
            ShutdownDelay::After(Duration::from_secs(15))
        );
    }
}
