//! # UpnpScout Configuration Module
//!
//! This module provides configuration management for UpnpScout, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Typed getters for the discovery, scan and audit settings
//!
//! ## Usage
//!
//! ```no_run
//! use scoutconfig::get_config;
//!
//! let config = get_config();
//! let ports = config.get_scan_ports()?;
//! let timeout = config.get_ssdp_timeout_secs();
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! Library crates never call [`get_config`] themselves: they receive option
//! structs built from a [`Config`] by the caller.

use anyhow::{Result, anyhow};
use dirs::home_dir;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use serde_yaml::{Mapping, Value};
use std::{env, fs, path::Path, sync::Arc};
use tracing::{info, warn};

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("upnpscout.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> = Arc::new(match Config::load_config("") {
        Ok(config) => config,
        Err(e) => {
            warn!("Cannot load UpnpScout configuration ({}), using embedded defaults", e);
            Config::embedded()
        }
    });
}

const ENV_CONFIG_DIR: &str = "UPNPSCOUT_CONFIG";
const ENV_PREFIX: &str = "UPNPSCOUT_CONFIG__";

// Default values for configuration
const DEFAULT_SSDP_TIMEOUT_SECS: u64 = 5;
const DEFAULT_SSDP_MX: u64 = 3;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 5;
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 1000;
const DEFAULT_SCAN_MAX_WORKERS: usize = 64;
const DEFAULT_USE_CACHE: bool = true;
const DEFAULT_AUDIT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_AUDIT_MAX_WORKERS: usize = 16;
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";

const DEFAULT_SEARCH_TARGETS: &[&str] = &[
    "ssdp:all",
    "upnp:rootdevice",
    "urn:schemas-upnp-org:device:MediaRenderer:1",
    "urn:schemas-upnp-org:device:MediaServer:1",
];
const DEFAULT_SCAN_PORTS: &[u16] = &[80, 443, 1400, 1900, 8008, 8080, 8443, 49152, 49153, 49154];
const DEFAULT_AUDIT_PORTS: &[u16] = &[80, 443, 554, 8000, 8008, 8080, 8443, 8554, 1400, 49152];
const DEFAULT_HTTPS_PORTS: &[u16] = &[443, 8443, 1400];
const DEFAULT_RTSP_PORTS: &[u16] = &[554, 8554];

/// Macro to generate a getter for u64 values with default
macro_rules! impl_u64_config {
    ($getter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> u64 {
            match self.get_value($path) {
                Ok(Value::Number(n)) if n.is_u64() => n.as_u64().unwrap_or($default),
                Ok(Value::String(s)) => s.trim().parse().unwrap_or_else(|_| {
                    warn!("Invalid value '{}' for {}, using default {}", s, $path.join("."), $default);
                    $default
                }),
                _ => $default,
            }
        }
    };
}

/// Macro to generate a getter for port lists with default
macro_rules! impl_ports_config {
    ($getter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<Vec<u16>> {
            match self.get_value($path) {
                Ok(Value::Sequence(seq)) => seq
                    .iter()
                    .map(|v| value_to_port(v).ok_or_else(|| {
                        anyhow!("Invalid port {:?} in {}", v, $path.join("."))
                    }))
                    .collect(),
                Ok(Value::Null) | Err(_) => Ok($default.to_vec()),
                Ok(other) => Err(anyhow!("{} must be a list of ports, got {:?}", $path.join("."), other)),
            }
        }
    };
}

/// Configuration manager for UpnpScout
///
/// # Examples
///
/// ```no_run
/// use scoutconfig::Config;
///
/// let config = Config::load_config("/tmp/upnpscout")?;
/// println!("SSDP window: {}s", config.get_ssdp_timeout_secs());
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    /// Empty for the embedded fallback, which is never written to disk
    path: String,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(self.data.lock().clone()),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        // 1. Try provided directory
        if !directory.is_empty() {
            return directory.to_string();
        }

        // 2. Try environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var=ENV_CONFIG_DIR, path=%env_path, "Trying to load config from env");
            return env_path;
        }

        // 3. Try current directory
        if Path::new(".upnpscout").exists() {
            return ".upnpscout".to_string();
        }

        // 4. Try home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(".upnpscout");
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        ".upnpscout".to_string()
    }

    /// Validates and prepares a config directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!(
                "Configuration path {} is not a directory",
                path.display()
            ));
        }

        Ok(())
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies environment variable overrides
    /// 5. Saves the merged configuration
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&config_dir))?;
        info!(config_dir=%config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut config_value = lower_keys_value(serde_yaml::from_str(DEFAULT_CONFIG)?);

        match fs::read(&path) {
            Ok(data) => {
                info!(config_file=%path, "Loaded config file");
                let external_value = lower_keys_value(serde_yaml::from_slice(&data)?);
                merge_yaml(&mut config_value, &external_value);
            }
            Err(_) => {
                info!(config_file=%path, "Config file not found, using default embedded config");
            }
        }

        apply_env_overrides(&mut config_value);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    /// Embedded defaults plus environment overrides, without touching the disk
    pub fn embedded() -> Self {
        let mut value = serde_yaml::from_str::<Value>(DEFAULT_CONFIG)
            .map(lower_keys_value)
            .unwrap_or_else(|_| Value::Mapping(Mapping::new()));
        apply_env_overrides(&mut value);

        Config {
            config_dir: String::new(),
            path: String::new(),
            data: Mutex::new(value),
        }
    }

    /// Configuration built from a YAML document merged over the embedded defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut value = lower_keys_value(serde_yaml::from_str(DEFAULT_CONFIG)?);
        let external = lower_keys_value(serde_yaml::from_str(yaml)?);
        merge_yaml(&mut value, &external);

        Ok(Config {
            config_dir: String::new(),
            path: String::new(),
            data: Mutex::new(value),
        })
    }

    pub fn config_dir(&self) -> &str {
        &self.config_dir
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        if self.path.is_empty() {
            return Ok(());
        }
        let yaml = serde_yaml::to_string(&*self.data.lock())?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Gets a configuration value at the specified path
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data.lock();
        get_value_internal(&data, path)
    }

    impl_u64_config!(get_ssdp_timeout_secs, &["ssdp", "timeout_secs"], DEFAULT_SSDP_TIMEOUT_SECS);
    impl_u64_config!(get_ssdp_mx, &["ssdp", "mx"], DEFAULT_SSDP_MX);
    impl_u64_config!(get_http_timeout_secs, &["http", "timeout_secs"], DEFAULT_HTTP_TIMEOUT_SECS);
    impl_u64_config!(get_probe_timeout_ms, &["scan", "probe_timeout_ms"], DEFAULT_PROBE_TIMEOUT_MS);
    impl_u64_config!(get_audit_timeout_secs, &["audit", "timeout_secs"], DEFAULT_AUDIT_TIMEOUT_SECS);

    impl_ports_config!(get_scan_ports, &["scan", "ports"], DEFAULT_SCAN_PORTS);
    impl_ports_config!(get_audit_ports, &["audit", "ports"], DEFAULT_AUDIT_PORTS);
    impl_ports_config!(get_https_ports, &["audit", "https_ports"], DEFAULT_HTTPS_PORTS);
    impl_ports_config!(get_rtsp_ports, &["audit", "rtsp_ports"], DEFAULT_RTSP_PORTS);

    pub fn get_scan_max_workers(&self) -> usize {
        self.get_usize(&["scan", "max_workers"], DEFAULT_SCAN_MAX_WORKERS)
    }

    pub fn get_audit_max_workers(&self) -> usize {
        self.get_usize(&["audit", "max_workers"], DEFAULT_AUDIT_MAX_WORKERS)
    }

    pub fn get_use_cache(&self) -> bool {
        match self.get_value(&["scan", "use_cache"]) {
            Ok(Value::Bool(b)) => b,
            _ => DEFAULT_USE_CACHE,
        }
    }

    /// Search targets sent in the SSDP M-SEARCH burst
    pub fn get_ssdp_search_targets(&self) -> Vec<String> {
        match self.get_value(&["ssdp", "search_targets"]) {
            Ok(Value::Sequence(seq)) => {
                let targets: Vec<String> = seq
                    .iter()
                    .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
                    .filter(|s| !s.is_empty())
                    .collect();
                if targets.is_empty() {
                    warn!("ssdp.search_targets is empty, using defaults");
                    DEFAULT_SEARCH_TARGETS.iter().map(|s| s.to_string()).collect()
                } else {
                    targets
                }
            }
            _ => DEFAULT_SEARCH_TARGETS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn get_log_min_level(&self) -> String {
        match self.get_value(&["log", "min_level"]) {
            Ok(Value::String(s)) if !s.is_empty() => s.to_uppercase(),
            _ => DEFAULT_LOG_MIN_LEVEL.to_string(),
        }
    }

    fn get_usize(&self, path: &[&str], default: usize) -> usize {
        match self.get_value(path) {
            Ok(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(default),
            _ => default,
        }
    }
}

fn value_to_port(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|port| *port != 0)
}

fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
    if path.is_empty() {
        *data = value;
        return Ok(());
    }
    if let Value::Mapping(map) = data {
        let key_value = Value::String(path[0].to_lowercase());
        if path.len() == 1 {
            map.insert(key_value, value);
        } else {
            let entry = map
                .entry(key_value)
                .or_insert(Value::Mapping(Mapping::new()));
            set_value_internal(entry, &path[1..], value)?;
        }
        Ok(())
    } else {
        Err(anyhow!("Current node is not a map"))
    }
}

fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
    let mut current = data;
    for (i, key) in path.iter().enumerate() {
        if let Value::Mapping(map) = current {
            match map.get(Value::String(key.to_lowercase())) {
                Some(next) => current = next,
                None => return Err(anyhow!("Path {} does not exist", path[..=i].join("."))),
            }
        } else {
            return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
        }
    }
    Ok(current.clone())
}

fn apply_env_overrides(config: &mut Value) {
    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
            let key_path = stripped.split("__").collect::<Vec<_>>();
            let yaml_value = convert_env_value(&value);
            if let Err(e) = set_value_internal(config, &key_path, yaml_value) {
                warn!("Ignoring environment override {}: {}", key, e);
            }
        }
    }
}

fn convert_env_value(value: &str) -> Value {
    serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

fn lower_keys_value(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut new_map = Mapping::new();
            for (k, v) in map {
                let key = match k {
                    Value::String(s) => Value::String(s.to_lowercase()),
                    other => other,
                };
                new_map.insert(key, lower_keys_value(v));
            }
            Value::Mapping(new_map)
        }
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys_value).collect()),
        _ => value,
    }
}

/// Merges external YAML configuration into default configuration
///
/// Mappings are merged key by key; scalars and sequences from `external`
/// replace the default value.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

/// Returns the process-wide configuration, loading it on first access.
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults() {
        let config = Config::from_yaml_str("{}").unwrap();
        assert_eq!(config.get_ssdp_timeout_secs(), 5);
        assert_eq!(config.get_ssdp_mx(), 3);
        assert_eq!(config.get_scan_ports().unwrap(), DEFAULT_SCAN_PORTS.to_vec());
        assert_eq!(config.get_rtsp_ports().unwrap(), vec![554, 8554]);
        assert!(config.get_use_cache());
        assert_eq!(config.get_ssdp_search_targets().len(), 4);
        assert_eq!(config.get_log_min_level(), "INFO");
    }

    #[test]
    fn test_external_values_override_defaults() {
        let config = Config::from_yaml_str(
            "SSDP:\n  Timeout_Secs: 2\nscan:\n  ports: [80, \"8080\"]\n  use_cache: false\n",
        )
        .unwrap();
        assert_eq!(config.get_ssdp_timeout_secs(), 2);
        assert_eq!(config.get_scan_ports().unwrap(), vec![80, 8080]);
        assert!(!config.get_use_cache());
        // Les autres sections restent intactes
        assert_eq!(config.get_audit_timeout_secs(), 5);
    }

    #[test]
    fn test_invalid_ports_are_reported() {
        let config = Config::from_yaml_str("scan:\n  ports: [80, banana]\n").unwrap();
        assert!(config.get_scan_ports().is_err());

        let config = Config::from_yaml_str("audit:\n  https_ports: 443\n").unwrap();
        assert!(config.get_https_ports().is_err());

        let config = Config::from_yaml_str("audit:\n  rtsp_ports: [70000]\n").unwrap();
        assert!(config.get_rtsp_ports().is_err());
    }

    #[test]
    fn test_load_config_writes_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_str().unwrap();

        fs::write(dir.path().join("config.yaml"), "scan:\n  max_workers: 7\n").unwrap();

        let config = Config::load_config(dir_str).unwrap();
        assert_eq!(config.get_scan_max_workers(), 7);
        assert_eq!(config.config_dir(), dir_str);

        // Le fichier réécrit porte la configuration fusionnée
        let written = fs::read_to_string(dir.path().join("config.yaml")).unwrap();
        assert!(written.contains("search_targets"));

        let reloaded = Config::load_config(dir_str).unwrap();
        assert_eq!(reloaded.get_ssdp_mx(), 3);
        assert_eq!(reloaded.get_scan_max_workers(), 7);
    }

    #[test]
    fn test_save_without_file_is_noop() {
        let config = Config::from_yaml_str("log:\n  min_level: debug\n").unwrap();
        assert_eq!(config.get_log_min_level(), "DEBUG");
        assert!(config.save().is_ok());
        assert!(config.config_dir().is_empty());
    }

    #[test]
    fn test_get_value_missing_path() {
        let config = Config::from_yaml_str("{}").unwrap();
        assert!(config.get_value(&["nope", "missing"]).is_err());
    }
}
