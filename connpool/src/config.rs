use std::time::Duration;

use serde::{Deserialize, Deserializer};

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub max_count: usize,
    /// Delay before retrying after the resource factory fails, in seconds.
    #[serde(deserialize_with = "deserialize_secs")]
    pub retry_backoff: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_count: 8,
            retry_backoff: Duration::from_millis(10),
        }
    }
}

impl Config {
    pub fn new(max_count: usize) -> Self {
        Self {
            max_count,
            ..Default::default()
        }
    }
}

fn deserialize_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}
