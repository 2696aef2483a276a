use std::net::IpAddr;
use std::time::Duration;

use toml::Value;

use crate::err;
use crate::identity::ClockIdentity;
use crate::Result;

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum TimestampKind {
    Hardware,
    Software,
}

/// Server-wide configuration (§6). Everything except `utc_offset` is
/// immutable for the process lifetime; `utc_offset` is refreshed by the
/// lifecycle task (§4.6) and stored as a single atomic word (§9).
#[derive(Clone, Debug)]
pub struct Config {
    pub interface: String,
    pub ip: IpAddr,
    pub workers: usize,
    pub queue_size: usize,
    pub timestamp_type: TimestampKind,
    pub min_sub_interval: Duration,
    pub max_sub_duration: Duration,
    pub metric_interval: Duration,
    pub monitoring_port: u16,
    pub shm: bool,
    pub utc_offset_secs: i64,
    pub log_level: String,
    pub shutdown_grace: Duration,
    pub clock_identity: ClockIdentity,
}

/// Pulls one key out of a parsed TOML table, by hand: this crate does not
/// carry a `serde` dependency solely to deserialize its own config file, so
/// the table is walked directly the way a hand-rolled INI/TOML reader
/// would.
fn get_str(table: &Value, key: &str) -> Option<String> {
    table.get(key)?.as_str().map(str::to_string)
}

fn get_int(table: &Value, key: &str) -> Option<i64> {
    table.get(key)?.as_integer()
}

fn get_bool(table: &Value, key: &str) -> Option<bool> {
    table.get(key)?.as_bool()
}

impl Config {
    /// Hard defaults this crate ships with, before any TOML overrides.
    pub fn default_for(interface: &str) -> Config {
        Config {
            interface: interface.to_string(),
            ip: "0.0.0.0".parse().unwrap(),
            workers: num_cpus::get().max(1),
            queue_size: 4096,
            timestamp_type: TimestampKind::Software,
            min_sub_interval: Duration::from_millis(1),
            max_sub_duration: Duration::from_secs(3600),
            metric_interval: Duration::from_secs(10),
            monitoring_port: 8888,
            shm: false,
            utc_offset_secs: 37,
            log_level: "info".to_string(),
            shutdown_grace: Duration::from_secs(2),
            clock_identity: ClockIdentity([0; 8]),
        }
    }

    /// Load from a TOML file, layered over [`Config::default_for`], derive
    /// the clock identity from the bind interface's MAC, then validate.
    /// Any failure here is fatal at startup (§7).
    pub fn from_file(path: &str) -> Result<Config> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => return err!(ConfigError, desc: "reading config file {}: {}", path, e),
        };
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Config> {
        let raw: Value = match text.parse() {
            Ok(raw) => raw,
            Err(e) => return err!(ConfigError, desc: "parsing config: {}", e),
        };

        let interface = get_str(&raw, "interface").unwrap_or_else(|| "eth0".to_string());
        let mut config = Config::default_for(&interface);

        if let Some(ip) = get_str(&raw, "ip") {
            config.ip = match ip.parse() {
                Ok(ip) => ip,
                Err(e) => return err!(ConfigError, desc: "invalid ip {:?}: {}", ip, e),
            };
        }
        if let Some(workers) = get_int(&raw, "workers") {
            config.workers = workers.max(0) as usize;
        }
        if let Some(queue_size) = get_int(&raw, "queue_size") {
            config.queue_size = queue_size.max(0) as usize;
        }
        if let Some(kind) = get_str(&raw, "timestamp_type") {
            config.timestamp_type = match kind.as_str() {
                "hardware" => TimestampKind::Hardware,
                "software" => TimestampKind::Software,
                other => return err!(ConfigError, desc: "unknown timestamp_type {:?}", other),
            };
        }
        if let Some(ms) = get_int(&raw, "min_sub_interval_ms") {
            config.min_sub_interval = Duration::from_millis(ms.max(0) as u64);
        }
        if let Some(secs) = get_int(&raw, "max_sub_duration_secs") {
            config.max_sub_duration = Duration::from_secs(secs.max(0) as u64);
        }
        if let Some(secs) = get_int(&raw, "metric_interval_secs") {
            config.metric_interval = Duration::from_secs(secs.max(0) as u64);
        }
        if let Some(port) = get_int(&raw, "monitoring_port") {
            config.monitoring_port = port.max(0) as u16;
        }
        if let Some(shm) = get_bool(&raw, "shm") {
            config.shm = shm;
        }
        if let Some(offset) = get_int(&raw, "utc_offset_secs") {
            config.utc_offset_secs = offset;
        }
        if let Some(level) = get_str(&raw, "log_level") {
            config.log_level = level;
        }
        if let Some(secs) = get_int(&raw, "shutdown_grace_secs") {
            config.shutdown_grace = Duration::from_secs(secs.max(0) as u64);
        }

        config.clock_identity = ClockIdentity::from_interface(&config.interface)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return err!(ConfigError, desc: "workers must be nonzero");
        }
        if self.queue_size == 0 {
            return err!(ConfigError, desc: "queue_size must be nonzero");
        }
        if self.min_sub_interval.is_zero() {
            return err!(ConfigError, desc: "min_sub_interval must be nonzero");
        }
        if self.min_sub_interval > self.max_sub_duration {
            return err!(
                ConfigError,
                desc: "min_sub_interval ({:?}) exceeds max_sub_duration ({:?})",
                self.min_sub_interval,
                self.max_sub_duration
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let mut config = Config::default_for("lo");
        config.clock_identity = ClockIdentity([1; 8]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_workers_rejected() {
        let mut config = Config::default_for("lo");
        config.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn min_interval_above_max_duration_rejected() {
        let mut config = Config::default_for("lo");
        config.min_sub_interval = Duration::from_secs(100);
        config.max_sub_duration = Duration::from_secs(10);
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_overrides_layer_over_defaults() {
        let raw = Config::default_for("lo");
        assert_eq!(raw.workers, num_cpus::get().max(1));
    }
}
