use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// How the recorder writes the CSV file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistMode {
    /// Append only the new row
    #[default]
    Append,
    /// Rewrite the whole table on every record
    Rewrite,
}

impl FromStr for PersistMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(PersistMode::Append),
            "rewrite" => Ok(PersistMode::Rewrite),
            other => Err(format!("unknown CSV mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub sensor_url: String,
    pub http_addr: String,
    pub csv_path: PathBuf,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub persist_mode: PersistMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sensor_url: "http://localhost:8081/".to_string(),
            http_addr: "0.0.0.0:8080".to_string(),
            csv_path: PathBuf::from("live_sensor_readings.csv"),
            poll_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            persist_mode: PersistMode::Append,
        }
    }
}

impl Config {
    /// Reads the configuration from the environment.
    /// Missing or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let sensor_url = lookup("SENSOR_URL").unwrap_or(defaults.sensor_url);
        let http_addr = lookup("HTTP_ADDR").unwrap_or(defaults.http_addr);
        let csv_path = lookup("CSV_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.csv_path);
        let poll_interval = lookup("POLL_INTERVAL_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval);
        let request_timeout = lookup("REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);
        let persist_mode = lookup("CSV_MODE")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.persist_mode);

        Self {
            sensor_url,
            http_addr,
            csv_path,
            poll_interval,
            request_timeout,
            persist_mode,
        }
    }
}
