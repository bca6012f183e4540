//! Middleware configuration
//!
//! The alias table and priority list consulted by the middleware manager,
//! plus the optional per-category middleware lists registered at bootstrap.
//!
//! ```yaml
//! alias:
//!   auth: app::Authenticate
//!   web:
//!     - session
//!     - [throttle, [60, 1]]
//! priority:
//!   - session
//!   - app::Authenticate
//! global:
//!   - web
//! ```

use crate::config::{AppConfigTrait, ConfigError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::env;
use std::fmt;
use std::path::Path;

/// Environment variable holding the path of the middleware configuration file
pub const MIDDLEWARE_CONFIG_VAR: &str = "GANTRY_MIDDLEWARE_CONFIG";

/// One configured middleware: a bare name or a `[name, [params...]]` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MiddlewareEntry {
    Name(String),
    WithParams(String, Vec<serde_json::Value>),
}

impl MiddlewareEntry {
    /// Name of the referenced middleware or alias
    pub fn name(&self) -> &str {
        match self {
            MiddlewareEntry::Name(name) | MiddlewareEntry::WithParams(name, _) => name,
        }
    }

    /// Fixed parameters attached to the entry
    pub fn params(&self) -> &[serde_json::Value] {
        match self {
            MiddlewareEntry::Name(_) => &[],
            MiddlewareEntry::WithParams(_, params) => params,
        }
    }
}

impl From<&str> for MiddlewareEntry {
    fn from(name: &str) -> Self {
        MiddlewareEntry::Name(name.to_string())
    }
}

impl fmt::Display for MiddlewareEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MiddlewareEntry::Name(name) => write!(f, "{}", name),
            MiddlewareEntry::WithParams(name, params) => {
                write!(f, "{}{}", name, serde_json::Value::Array(params.clone()))
            }
        }
    }
}

/// What an alias expands to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AliasTarget {
    /// Substitute another middleware name (one level, not re-resolved)
    Single(String),
    /// Expand into a list of registrations
    Group(Vec<MiddlewareEntry>),
}

impl AliasTarget {
    /// Build a group alias from anything convertible into entries
    pub fn group<I, E>(entries: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<MiddlewareEntry>,
    {
        AliasTarget::Group(entries.into_iter().map(Into::into).collect())
    }
}

/// Alias and priority tables plus bootstrap middleware lists
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiddlewareConfig {
    /// Alias name -> expansion
    pub alias: HashMap<String, AliasTarget>,
    /// Ordered middleware names; earlier entries run earlier in the chain
    pub priority: Vec<String>,
    /// Middleware registered into the `global` category
    pub global: Vec<MiddlewareEntry>,
    /// Middleware registered into the `route` category
    pub route: Vec<MiddlewareEntry>,
    /// Middleware registered into the `controller` category
    pub controller: Vec<MiddlewareEntry>,
}

impl MiddlewareConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single-name alias
    pub fn with_alias(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.alias.insert(name.into(), AliasTarget::Single(target.into()));
        self
    }

    /// Add an alias expanding into a list of entries
    pub fn with_alias_group<I, E>(mut self, name: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<MiddlewareEntry>,
    {
        self.alias.insert(name.into(), AliasTarget::group(entries));
        self
    }

    /// Replace the priority list
    pub fn with_priority<I, S>(mut self, priority: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.priority = priority.into_iter().map(Into::into).collect();
        self
    }

    /// Look up an alias
    pub fn lookup(&self, name: &str) -> Option<&AliasTarget> {
        self.alias.get(name)
    }

    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(source)?)
    }

    /// Load from a `.yaml`, `.yml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;

        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&source)?,
            Some("json") => Self::from_json_str(&source)?,
            _ => {
                return Err(ConfigError::UnsupportedFormat {
                    path: path.display().to_string(),
                })
            }
        };

        tracing::debug!(
            path = %path.display(),
            aliases = config.alias.len(),
            priority = config.priority.len(),
            "middleware configuration loaded"
        );

        Ok(config)
    }
}

fn validate_entries(field: &str, entries: &[MiddlewareEntry]) -> Result<(), ConfigError> {
    for entry in entries {
        if entry.name().trim().is_empty() {
            return Err(ConfigError::invalid_value(
                field,
                entry.to_string(),
                "a non-empty middleware name",
            ));
        }
    }
    Ok(())
}

impl AppConfigTrait for MiddlewareConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let config = match env::var(MIDDLEWARE_CONFIG_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path)?,
            Ok(_) | Err(env::VarError::NotPresent) => Self::default(),
            Err(env::VarError::NotUnicode(_)) => {
                return Err(ConfigError::environment_error(format!(
                    "{} is not valid unicode",
                    MIDDLEWARE_CONFIG_VAR
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, target) in &self.alias {
            if name.trim().is_empty() {
                return Err(ConfigError::validation_failed("Alias names must not be empty"));
            }

            match target {
                AliasTarget::Single(target) if target.trim().is_empty() => {
                    return Err(ConfigError::invalid_value(
                        format!("alias.{}", name),
                        target.as_str(),
                        "a non-empty middleware name",
                    ));
                }
                AliasTarget::Group(entries) if entries.is_empty() => {
                    return Err(ConfigError::validation_failed(format!(
                        "Alias group '{}' must contain at least one middleware",
                        name
                    )));
                }
                AliasTarget::Group(entries) => {
                    validate_entries(&format!("alias.{}", name), entries)?
                }
                AliasTarget::Single(_) => {}
            }
        }

        let mut seen = HashSet::new();
        for name in &self.priority {
            if name.trim().is_empty() {
                return Err(ConfigError::validation_failed(
                    "Priority entries must not be empty",
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::validation_failed(format!(
                    "Middleware '{}' appears more than once in the priority list",
                    name
                )));
            }
        }

        validate_entries("global", &self.global)?;
        validate_entries("route", &self.route)?;
        validate_entries("controller", &self.controller)?;

        Ok(())
    }
}
