//! Configuration of a [`crate::Collector`].

use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

/// Default delay between the first aggregated call of a quiet period and its
/// flush.
pub const DEFAULT_FLUSH_DELAY_MILLIS: u64 = 10_000;

fn default_flush_delay_millis() -> NonZeroU64 {
    NonZeroU64::new(DEFAULT_FLUSH_DELAY_MILLIS).unwrap_or(NonZeroU64::MIN)
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(deny_unknown_fields)]
/// Main configuration struct for this crate
pub struct Config {
    /// Milliseconds between the first aggregated call of a quiet period and
    /// the flush that reports it. Later calls in the same window do not move
    /// the flush.
    #[serde(default = "default_flush_delay_millis")]
    pub flush_delay_millis: NonZeroU64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            flush_delay_millis: default_flush_delay_millis(),
        }
    }
}

impl Config {
    /// Configuration with the given flush delay in milliseconds. A zero delay
    /// falls back to the default.
    #[must_use]
    pub fn with_flush_delay_millis(millis: u64) -> Self {
        Self {
            flush_delay_millis: NonZeroU64::new(millis).unwrap_or_else(default_flush_delay_millis),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Config, DEFAULT_FLUSH_DELAY_MILLIS};

    #[test]
    fn empty_config_uses_default_delay() {
        let config: Config = serde_yaml::from_str("{}").expect("empty mapping parses");
        assert_eq!(config, Config::default());
        assert_eq!(config.flush_delay_millis.get(), DEFAULT_FLUSH_DELAY_MILLIS);
    }

    #[test]
    fn delay_is_read_from_yaml() {
        let contents = r"
flush_delay_millis: 2500
";
        let config: Config = serde_yaml::from_str(contents).expect("config parses");
        assert_eq!(config.flush_delay_millis.get(), 2_500);
    }

    #[test]
    fn zero_delay_is_rejected() {
        let res: Result<Config, _> = serde_json::from_str(r#"{"flush_delay_millis": 0}"#);
        assert!(res.is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let res: Result<Config, _> = serde_yaml::from_str("flush_delay: 10\n");
        assert!(res.is_err());
    }

    #[test]
    fn zero_delay_constructor_falls_back() {
        assert_eq!(Config::with_flush_delay_millis(0), Config::default());
        assert_eq!(Config::with_flush_delay_millis(7).flush_delay_millis.get(), 7);
    }
}
