//! Configuration for proxy connections
//!
//! Property-based configuration with change listeners and JSON
//! persistence. Properties are dotted keys (`connection.host`,
//! `session.ioTimeout`) so profiles stay forward compatible: unknown keys
//! load and save untouched.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::network::TcpConnector;

/// Configuration change event
#[derive(Debug, Clone)]
pub struct ConfigChangeEvent {
    pub property_name: String,
    pub old_value: Option<ConfigValue>,
    pub new_value: ConfigValue,
}

/// Configuration change listener trait
pub trait ConfigChangeListener: Send + Sync {
    fn on_config_changed(&mut self, event: &ConfigChangeEvent);
}

/// Supported configuration value types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ConfigValue {
    String(String),
    Integer(i64),
    Boolean(bool),
}

impl ConfigValue {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ConfigValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            ConfigValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Integer(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Boolean(value)
    }
}

/// Default call channel port
pub const DEFAULT_PROXY_PORT: u16 = 3470;
/// Default event channel port
pub const DEFAULT_EVENT_PORT: u16 = 3471;

/// Proxy connection configuration
pub struct ProxyConfig {
    properties: HashMap<String, ConfigValue>,
    listeners: Vec<Box<dyn ConfigChangeListener>>,
    config_resource: String,
}

impl ProxyConfig {
    pub fn new(config_resource: String) -> Self {
        let mut config = Self {
            properties: HashMap::new(),
            listeners: Vec::new(),
            config_resource,
        };
        config.set_defaults();
        config
    }

    fn set_defaults(&mut self) {
        self.properties.insert("connection.host".to_string(), "".into());
        self.properties
            .insert("connection.port".to_string(), i64::from(DEFAULT_PROXY_PORT).into());
        self.properties
            .insert("connection.eventPort".to_string(), i64::from(DEFAULT_EVENT_PORT).into());
        self.properties.insert("connection.tls".to_string(), false.into());
        self.properties.insert("connection.tls.caBundlePath".to_string(), "".into());
        self.properties.insert("connection.tunnel".to_string(), false.into());
        self.properties.insert("connection.locale".to_string(), "".into());
        self.properties.insert("session.connectTimeout".to_string(), 30i64.into());
        self.properties.insert("session.ioTimeout".to_string(), 30i64.into());
    }

    pub fn get_string_property(&self, key: &str) -> Option<String> {
        self.properties.get(key).and_then(|v| v.as_string().map(|s| s.to_string()))
    }

    pub fn get_string_property_or(&self, key: &str, default: &str) -> String {
        self.get_string_property(key).unwrap_or_else(|| default.to_string())
    }

    pub fn get_int_property(&self, key: &str) -> Option<i64> {
        self.properties.get(key).and_then(|v| v.as_integer())
    }

    pub fn get_int_property_or(&self, key: &str, default: i64) -> i64 {
        self.get_int_property(key).unwrap_or(default)
    }

    pub fn get_boolean_property(&self, key: &str) -> Option<bool> {
        self.properties.get(key).and_then(|v| v.as_boolean())
    }

    pub fn get_boolean_property_or(&self, key: &str, default: bool) -> bool {
        self.get_boolean_property(key).unwrap_or(default)
    }

    /// Set a property and fire a change event
    pub fn set_property<T: Into<ConfigValue>>(&mut self, key: &str, value: T) {
        let new_value = value.into();
        let old_value = self.properties.get(key).cloned();
        self.properties.insert(key.to_string(), new_value.clone());
        let event = ConfigChangeEvent {
            property_name: key.to_string(),
            old_value,
            new_value,
        };
        self.fire_change_event(&event);
    }

    pub fn add_listener(&mut self, listener: Box<dyn ConfigChangeListener>) {
        self.listeners.push(listener);
    }

    fn fire_change_event(&mut self, event: &ConfigChangeEvent) {
        for listener in &mut self.listeners {
            listener.on_config_changed(event);
        }
    }

    pub fn get_config_resource(&self) -> &str {
        &self.config_resource
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Validate the connection-related properties
    pub fn validate(&self) -> ConfigResult<()> {
        let host = self.get_string_property_or("connection.host", "");
        if host.is_empty() {
            return Err(ConfigError::MissingRequired {
                parameter: "connection.host".to_string(),
            });
        }
        for key in ["connection.port", "connection.eventPort"] {
            let port = self.get_int_property_or(key, 0);
            if !(1..=65535).contains(&port) {
                return Err(ConfigError::InvalidParameter {
                    parameter: key.to_string(),
                    value: port.to_string(),
                    reason: "port must be 1-65535".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Build a connector from the connection properties
    pub fn build_connector(&self) -> ConfigResult<TcpConnector> {
        self.validate()?;
        let host = self.get_string_property_or("connection.host", "");
        let port = self.get_int_property_or("connection.port", i64::from(DEFAULT_PROXY_PORT)) as u16;
        let event_port =
            self.get_int_property_or("connection.eventPort", i64::from(DEFAULT_EVENT_PORT)) as u16;
        let mut connector = TcpConnector::new(host, port, event_port);
        connector.set_tls(self.get_boolean_property_or("connection.tls", false));
        let ca_bundle = self.get_string_property_or("connection.tls.caBundlePath", "");
        if !ca_bundle.is_empty() {
            connector.set_ca_bundle_path(Some(PathBuf::from(ca_bundle)));
        }
        connector.set_connect_timeout(Duration::from_secs(
            self.get_int_property_or("session.connectTimeout", 30).max(1) as u64,
        ));
        let io_timeout = self.get_int_property_or("session.ioTimeout", 30);
        connector.set_io_timeout(if io_timeout > 0 {
            Some(Duration::from_secs(io_timeout as u64))
        } else {
            None
        });
        Ok(connector)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.properties)
    }

    /// Load properties from JSON, firing change events for each
    pub fn from_json(&mut self, json: &str) -> Result<(), serde_json::Error> {
        let loaded: HashMap<String, ConfigValue> = serde_json::from_str(json)?;
        for (key, value) in loaded {
            let old_value = self.properties.get(&key).cloned();
            self.properties.insert(key.clone(), value.clone());
            self.fire_change_event(&ConfigChangeEvent {
                property_name: key,
                old_value,
                new_value: value,
            });
        }
        Ok(())
    }

    /// Save to the resolved config resource path, recording the save time
    pub fn save(&mut self) -> ConfigResult<()> {
        let stamp = chrono::Utc::now().to_rfc3339();
        self.properties
            .insert("meta.lastSaved".to_string(), ConfigValue::String(stamp));
        let json = self.to_json().map_err(|e| ConfigError::FileError {
            path: self.config_resource.clone(),
            error: e.to_string(),
        })?;
        let path = PathBuf::from(&self.config_resource);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| ConfigError::FileError {
                    path: self.config_resource.clone(),
                    error: e.to_string(),
                })?;
            }
        }
        fs::write(&path, json).map_err(|e| ConfigError::FileError {
            path: self.config_resource.clone(),
            error: e.to_string(),
        })
    }
}

/// Thread-safe configuration wrapper
pub type SharedProxyConfig = Arc<Mutex<ProxyConfig>>;

/// Default config file path
///
/// `DDM400R_CONFIG` overrides; otherwise the platform config directory,
/// falling back to the current directory.
pub fn default_config_path() -> PathBuf {
    if let Ok(p) = std::env::var("DDM400R_CONFIG") {
        return PathBuf::from(p);
    }
    dirs::config_dir()
        .map(|base| base.join("ddm400r").join("proxy.json"))
        .unwrap_or_else(|| PathBuf::from("proxy.json"))
}

/// Load a shared configuration from disk if present, defaults otherwise
pub fn load_shared_config() -> SharedProxyConfig {
    let path = default_config_path();
    let resource = path.to_string_lossy().to_string();
    let mut config = ProxyConfig::new(resource);

    if path.exists() {
        match fs::read_to_string(&path) {
            Ok(json) => {
                if let Err(e) = config.from_json(&json) {
                    warn!("could not parse config file {}: {e}", path.display());
                }
            }
            Err(e) => warn!("could not read config file {}: {e}", path.display()),
        }
    }

    Arc::new(Mutex::new(config))
}
