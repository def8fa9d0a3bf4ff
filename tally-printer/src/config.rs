//! Session configuration
//!
//! [`SessionConfig`] is the serializable form of everything needed to open a
//! session: profile name, session options and connector settings. It can be
//! read from JSON or from the environment.
//!
//! # Environment variables
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | PRINTER_PROFILE | default | Built-in capability profile |
//! | PRINTER_CONNECTOR | dummy | Connector kind (`dummy`, `file`, `network`) |
//! | PRINTER_HOST | | Network printer host |
//! | PRINTER_PORT | 9100 | Network printer port |
//! | PRINTER_TIMEOUT_MS | 5000 | Network connect timeout |
//! | PRINTER_PATH | | Device or file path for the `file` connector |
//! | PRINTER_AUTO_CUT | false | Cut at the end of each job |
//! | PRINTER_PULSE | off | Drawer kick at the end: `off`, `pin2` or `pin5` |
//!
//! ```ignore
//! PRINTER_CONNECTOR=network PRINTER_HOST=192.168.1.50 PRINTER_AUTO_CUT=true tally-cli job.json
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::connector::{ConnectorRegistry, ConnectorSpec};
use crate::error::{PrintError, PrintResult};
use crate::escpos::{CutMode, DrawerPin, PulseConfig};
use crate::profile::CapabilityProfile;
use crate::session::{PrinterSession, SessionOptions};

/// Connector kind plus its string settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    pub kind: String,
    pub options: BTreeMap<String, String>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            kind: "dummy".to_string(),
            options: BTreeMap::new(),
        }
    }
}

/// Everything needed to open a [`PrinterSession`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub profile: String,
    pub auto_cut: bool,
    pub cut_mode: CutMode,
    pub cut_feed_lines: u8,
    pub pulse: Option<PulseConfig>,
    pub initialize: bool,
    pub placeholder: char,
    pub trailing_feed: u8,
    pub connector: ConnectorConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let options = SessionOptions::default();
        Self {
            profile: "default".to_string(),
            auto_cut: options.auto_cut,
            cut_mode: options.cut_mode,
            cut_feed_lines: options.cut_feed_lines,
            pulse: options.pulse,
            initialize: options.initialize,
            placeholder: char::from(options.placeholder),
            trailing_feed: options.trailing_feed,
            connector: ConnectorConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_json(json: &str) -> PrintResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| PrintError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `PRINTER_*` environment variables
    pub fn from_env() -> PrintResult<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load from any variable source (the process environment, a map in tests)
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> PrintResult<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(profile) = var("PRINTER_PROFILE") {
            config.profile = profile;
        }
        if let Some(kind) = var("PRINTER_CONNECTOR") {
            config.connector.kind = kind.to_ascii_lowercase();
        }
        for (env, key) in [
            ("PRINTER_HOST", "host"),
            ("PRINTER_PORT", "port"),
            ("PRINTER_TIMEOUT_MS", "timeout_ms"),
            ("PRINTER_PATH", "path"),
        ] {
            if let Some(value) = var(env) {
                config.connector.options.insert(key.to_string(), value);
            }
        }
        if let Some(raw) = var("PRINTER_AUTO_CUT") {
            config.auto_cut = parse_bool("PRINTER_AUTO_CUT", &raw)?;
        }
        if let Some(raw) = var("PRINTER_PULSE") {
            config.pulse = parse_pulse(&raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that could never open a session
    pub fn validate(&self) -> PrintResult<()> {
        if !CapabilityProfile::names()
            .iter()
            .any(|name| name.eq_ignore_ascii_case(self.profile.trim()))
        {
            return Err(PrintError::ProfileNotFound(self.profile.clone()));
        }
        if self.connector.kind.trim().is_empty() {
            return Err(PrintError::InvalidConfig("connector kind is empty".into()));
        }
        self.session_options()?.validate()
    }

    pub fn load_profile(&self) -> PrintResult<Arc<CapabilityProfile>> {
        CapabilityProfile::load(&self.profile).map(Arc::new)
    }

    pub fn session_options(&self) -> PrintResult<SessionOptions> {
        let placeholder = u8::try_from(self.placeholder)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                PrintError::InvalidConfig(format!(
                    "placeholder must be an ASCII character, got {:?}",
                    self.placeholder
                ))
            })?;
        Ok(SessionOptions {
            auto_cut: self.auto_cut,
            cut_mode: self.cut_mode,
            cut_feed_lines: self.cut_feed_lines,
            pulse: self.pulse,
            initialize: self.initialize,
            placeholder,
            trailing_feed: self.trailing_feed,
        })
    }

    pub fn connector_spec(&self) -> ConnectorSpec {
        ConnectorSpec::ByName {
            kind: self.connector.kind.clone(),
            config: self
                .connector
                .options
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

impl PrinterSession {
    /// Open a session from configuration with the default connector kinds
    pub fn from_config(config: &SessionConfig) -> PrintResult<Self> {
        Self::from_config_with_registry(config, &ConnectorRegistry::with_defaults())
    }

    pub fn from_config_with_registry(
        config: &SessionConfig,
        registry: &ConnectorRegistry,
    ) -> PrintResult<Self> {
        config.validate()?;
        Self::open_with_registry(
            config.load_profile()?,
            config.session_options()?,
            config.connector_spec(),
            registry,
        )
    }
}

fn parse_bool(key: &str, raw: &str) -> PrintResult<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PrintError::InvalidConfig(format!("{key}: expected a boolean, got '{raw}'"))),
    }
}

fn parse_pulse(raw: &str) -> PrintResult<Option<PulseConfig>> {
    let pin = match raw.to_ascii_lowercase().as_str() {
        "off" | "false" | "no" | "0" => return Ok(None),
        "on" | "true" | "yes" | "pin2" | "2" => DrawerPin::Pin2,
        "pin5" | "5" => DrawerPin::Pin5,
        _ => {
            return Err(PrintError::InvalidConfig(format!(
                "PRINTER_PULSE: expected off, pin2 or pin5, got '{raw}'"
            )));
        }
    };
    Ok(Some(PulseConfig {
        pin,
        ..PulseConfig::default()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::from_vars(vars(&[])).unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.session_options().unwrap(), SessionOptions::default());
        assert_eq!(config.connector.kind, "dummy");
    }

    #[test]
    fn test_from_vars() {
        let config = SessionConfig::from_vars(vars(&[
            ("PRINTER_PROFILE", "tm-u220"),
            ("PRINTER_CONNECTOR", "Network"),
            ("PRINTER_HOST", "192.168.1.50"),
            ("PRINTER_PORT", "9101"),
            ("PRINTER_AUTO_CUT", "yes"),
            ("PRINTER_PULSE", "pin5"),
        ]))
        .unwrap();
        assert_eq!(config.profile, "tm-u220");
        assert_eq!(config.connector.kind, "network");
        assert_eq!(config.connector.options["host"], "192.168.1.50");
        assert_eq!(config.connector.options["port"], "9101");
        assert!(config.auto_cut);
        assert_eq!(config.pulse.map(|p| p.pin), Some(DrawerPin::Pin5));
    }

    #[test]
    fn test_bad_vars() {
        assert!(matches!(
            SessionConfig::from_vars(vars(&[("PRINTER_AUTO_CUT", "maybe")])),
            Err(PrintError::InvalidConfig(_))
        ));
        assert!(matches!(
            SessionConfig::from_vars(vars(&[("PRINTER_PULSE", "pin3")])),
            Err(PrintError::InvalidConfig(_))
        ));
        assert!(matches!(
            SessionConfig::from_vars(vars(&[("PRINTER_PROFILE", "laser")])),
            Err(PrintError::ProfileNotFound(_))
        ));
    }

    #[test]
    fn test_from_json() {
        let config = SessionConfig::from_json(
            r#"{
                "profile": "zj-5870",
                "trailing_feed": 4,
                "pulse": { "pin": "pin2", "on_ms": 100 },
                "connector": { "kind": "file", "options": { "path": "/dev/usb/lp0" } }
            }"#,
        )
        .unwrap();
        assert_eq!(config.profile, "zj-5870");
        assert_eq!(config.trailing_feed, 4);
        assert_eq!(config.pulse.map(|p| (p.on_ms, p.off_ms)), Some((100, 240)));
        assert!(config.initialize);
        assert!(matches!(
            config.connector_spec(),
            ConnectorSpec::ByName { kind, config }
                if kind == "file" && config["path"] == "/dev/usb/lp0"
        ));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            SessionConfig::from_json(r#"{ "placeholder": "é" }"#),
            Err(PrintError::InvalidConfig(_))
        ));
        assert!(matches!(
            SessionConfig::from_json(r#"{ "pulse": { "on_ms": 900 } }"#),
            Err(PrintError::InvalidArgument(_))
        ));
        assert!(SessionConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_from_config_opens_session() {
        let config = SessionConfig {
            auto_cut: true,
            ..SessionConfig::default()
        };
        let mut session = PrinterSession::from_config(&config).unwrap();
        session.println("hi").unwrap();
        let out = session.end().unwrap();
        assert!(out.starts_with(&[0x1B, 0x40]));
        assert!(out.ends_with(&[0x1D, 0x56, 0x41, 3]));

        let config = SessionConfig {
            connector: ConnectorConfig {
                kind: "carrier-pigeon".into(),
                options: BTreeMap::new(),
            },
            ..SessionConfig::default()
        };
        assert!(matches!(
            PrinterSession::from_config(&config),
            Err(PrintError::ConnectorNotFound(_))
        ));
    }
}
