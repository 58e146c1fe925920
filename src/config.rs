use std::{path::PathBuf, sync::LazyLock};

use sensor_bus::{Layout, serial::SerialConfig};

#[cfg(windows)]
const DEFAULT_SERIAL_PORT: &str = "COM5";
#[cfg(not(windows))]
const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";
const DEFAULT_BAUD_RATE: u32 = 115_200;
const DEFAULT_DEMO_FILE: &str = "demo/recording.json";
const DEFAULT_DB_URL: &str = "imu.db";
const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:3000";

pub struct RelayConfig {
    serial: SerialConfig,
    layout: Layout,
    demo_mode: bool,
    demo_file: PathBuf,
    db_url: String,
    http_addr: String,
    persist: bool,
}

impl RelayConfig {
    /// Builds the config from `lookup`, falling back to defaults for unset
    /// or unparsable values.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let serial = SerialConfig {
            path: lookup("RELAY_SERIAL_PORT").unwrap_or_else(|| DEFAULT_SERIAL_PORT.to_string()),
            baud_rate: parse_or("RELAY_BAUD_RATE", &lookup, DEFAULT_BAUD_RATE),
        };
        let layout = parse_or("RELAY_LAYOUT", &lookup, Layout::default());

        Self {
            serial,
            layout,
            demo_mode: lookup("RELAY_DEMO_MODE").is_some_and(|v| is_truthy(&v)),
            demo_file: lookup("RELAY_DEMO_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DEMO_FILE)),
            db_url: lookup("RELAY_DB_URL").unwrap_or_else(|| DEFAULT_DB_URL.to_string()),
            http_addr: lookup("RELAY_HTTP_ADDR").unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string()),
            persist: lookup("RELAY_PERSIST").is_none_or(|v| is_truthy(&v)),
        }
    }

    pub fn serial(&self) -> &SerialConfig {
        &self.serial
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn demo_mode(&self) -> bool {
        self.demo_mode
    }

    pub fn demo_file(&self) -> &PathBuf {
        &self.demo_file
    }

    pub fn db_url(&self) -> &str {
        &self.db_url
    }

    pub fn http_addr(&self) -> &str {
        &self.http_addr
    }

    pub fn persist(&self) -> bool {
        self.persist
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("config: invalid {}={:?}, using default", key, raw);
            default
        }),
        None => default,
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub fn config() -> &'static RelayConfig {
    static CONFIG: LazyLock<RelayConfig> =
        LazyLock::new(|| RelayConfig::from_lookup(|key| std::env::var(key).ok()));
    &CONFIG
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_map(pairs: &[(&str, &str)]) -> RelayConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RelayConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_map(&[]);
        assert_eq!(config.serial().path, DEFAULT_SERIAL_PORT);
        assert_eq!(config.serial().baud_rate, 115_200);
        assert_eq!(config.layout(), Layout::Current);
        assert!(!config.demo_mode());
        assert!(config.persist());
        assert_eq!(config.db_url(), "imu.db");
        assert_eq!(config.http_addr(), "0.0.0.0:3000");
        assert_eq!(config.demo_file(), &PathBuf::from("demo/recording.json"));
    }

    #[test]
    fn test_overrides() {
        let config = from_map(&[
            ("RELAY_SERIAL_PORT", "/dev/ttyACM1"),
            ("RELAY_BAUD_RATE", "9600"),
            ("RELAY_LAYOUT", "legacy"),
            ("RELAY_DEMO_MODE", "YES"),
            ("RELAY_PERSIST", "0"),
            ("RELAY_HTTP_ADDR", "127.0.0.1:8080"),
        ]);
        assert_eq!(config.serial().path, "/dev/ttyACM1");
        assert_eq!(config.serial().baud_rate, 9600);
        assert_eq!(config.layout(), Layout::Legacy);
        assert!(config.demo_mode());
        assert!(!config.persist());
        assert_eq!(config.http_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_map(&[
            ("RELAY_BAUD_RATE", "fast"),
            ("RELAY_LAYOUT", "v9"),
            ("RELAY_DEMO_MODE", "maybe"),
        ]);
        assert_eq!(config.serial().baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.layout(), Layout::Current);
        assert!(!config.demo_mode());
    }
}
