//! On-disk configuration and resolution.
//!
//! Resolution order for each value: CLI → environment → config file →
//! built-in defaults. The config file is JSON, looked up at an explicit path
//! or at `$XDG_CONFIG_HOME/nmimgr/nmimgr.json`. A missing file is not an
//! error; a present but unreadable one is.

use std::path::{Path, PathBuf};

use nmi_common::schema::is_compatible;
use nmi_common::{SourceType, SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::category::{DEFAULT_CAPACITY, DOMAIN_SIZE};
use crate::params::TriageParams;

/// Config file name inside the config directory.
pub const CONFIG_FILE_NAME: &str = "nmimgr.json";

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("incompatible schema version {0}")]
    IncompatibleSchema(String),

    #[error("capacity must be between 1 and 256, got {0}")]
    InvalidCapacity(usize),

    #[error("source {0} listed more than once")]
    DuplicateSource(SourceType),

    #[error("no NMI sources configured")]
    NoSources,
}

/// Which host registration backend to drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Per-source handler chains with priority ordering.
    #[default]
    Chain,
    /// Legacy single notifier chain covering every NMI.
    Notifier,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Chain => write!(f, "chain"),
            BackendKind::Notifier => write!(f, "notifier"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chain" | "nmi_handler" => Ok(BackendKind::Chain),
            "notifier" | "die_notifier" | "legacy" => Ok(BackendKind::Notifier),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

/// Complete manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NmiConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Reason-code lists per category.
    #[serde(default)]
    pub params: TriageParams,

    /// Per-category capacity.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    #[serde(default)]
    pub backend: BackendKind,

    /// Sources to bind, in registration order.
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceType>,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_sources() -> Vec<SourceType> {
    SourceType::MANAGED.to_vec()
}

impl Default for NmiConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            params: TriageParams::default(),
            capacity: default_capacity(),
            backend: BackendKind::default(),
            sources: default_sources(),
        }
    }
}

impl NmiConfig {
    pub fn from_json(path: &Path, text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(path, &text)
    }

    /// Semantic checks the JSON schema can't express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_compatible(&self.schema_version) {
            return Err(ConfigError::IncompatibleSchema(self.schema_version.clone()));
        }
        if self.capacity == 0 || self.capacity > DOMAIN_SIZE {
            return Err(ConfigError::InvalidCapacity(self.capacity));
        }
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        for (i, source) in self.sources.iter().enumerate() {
            if self.sources[..i].contains(source) {
                return Err(ConfigError::DuplicateSource(*source));
            }
        }
        Ok(())
    }
}

/// Overrides supplied on the command line. `None` defers to lower layers.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub params: TriageParams,
    pub capacity: Option<usize>,
    pub backend: Option<BackendKind>,
    pub sources: Option<Vec<SourceType>>,
}

/// Default config file location under the XDG config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("nmimgr").join(CONFIG_FILE_NAME))
}

/// Resolve the effective configuration.
///
/// `env` is the environment layer (normally [`TriageParams::from_env`]).
pub fn resolve_config(
    overrides: &ConfigOverrides,
    env: &TriageParams,
) -> Result<NmiConfig, ConfigError> {
    let file_path = overrides
        .config_path
        .clone()
        .or_else(default_config_path);

    let mut config = match file_path {
        Some(path) if path.exists() => {
            debug!(path = %path.display(), "loading config file");
            NmiConfig::load(&path)?
        }
        Some(path) if overrides.config_path.is_some() => {
            // An explicitly requested file must exist.
            return Err(ConfigError::Read {
                path,
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        _ => NmiConfig::default(),
    };

    config.params = overrides.params.clone().or(env).or(&config.params);
    if let Some(capacity) = overrides.capacity {
        config.capacity = capacity;
    }
    if let Some(backend) = overrides.backend {
        config.backend = backend;
    }
    if let Some(sources) = &overrides.sources {
        config.sources = sources.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Keep each failure in its own family: unreadable files are I/O errors,
/// schema mismatches are validation errors, everything else is config.
impl From<ConfigError> for nmi_common::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Read { path, source } => nmi_common::Error::Io(std::io::Error::new(
                source.kind(),
                format!("{}: {source}", path.display()),
            )),
            ConfigError::IncompatibleSchema(version) => nmi_common::Error::SchemaValidation(
                format!("config schema {version} is not compatible with {SCHEMA_VERSION}"),
            ),
            other => nmi_common::Error::Config(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;

    #[test]
    fn defaults_bind_managed_sources() {
        let config = NmiConfig::default();
        assert_eq!(config.sources, SourceType::MANAGED.to_vec());
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert_eq!(config.backend, BackendKind::Chain);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn minimal_json_fills_defaults() {
        let config =
            NmiConfig::from_json(Path::new("inline"), r#"{"params": {"panic": "61"}}"#).unwrap();
        assert_eq!(config.params.get(Category::Panic), Some("61"));
        assert_eq!(config.schema_version, SCHEMA_VERSION);
        assert_eq!(config.sources.len(), 3);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = NmiConfig::default();
        config.capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidCapacity(0))));

        let mut config = NmiConfig::default();
        config.sources = vec![SourceType::Unknown, SourceType::Unknown];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateSource(SourceType::Unknown))
        ));

        let mut config = NmiConfig::default();
        config.sources.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoSources)));

        let mut config = NmiConfig::default();
        config.schema_version = "2.0.0".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IncompatibleSchema(_))
        ));
    }

    #[test]
    fn errors_map_to_their_families() {
        let read = ConfigError::Read {
            path: PathBuf::from("/etc/nmimgr.json"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        let err = nmi_common::Error::from(read);
        assert_eq!(err.code(), 60);
        assert!(err.to_string().contains("/etc/nmimgr.json"));

        let schema = nmi_common::Error::from(ConfigError::IncompatibleSchema("2.0.0".into()));
        assert!(matches!(schema, nmi_common::Error::SchemaValidation(_)));

        let capacity = nmi_common::Error::from(ConfigError::InvalidCapacity(0));
        assert!(matches!(capacity, nmi_common::Error::Config(_)));
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!("legacy".parse::<BackendKind>(), Ok(BackendKind::Notifier));
        assert_eq!("CHAIN".parse::<BackendKind>(), Ok(BackendKind::Chain));
        assert!("bogus".parse::<BackendKind>().is_err());
    }
}
