//! Bridge configuration.
//!
//! Read from a JSON file (conventionally `tracebridge.json`):
//!
//! ```json
//! {
//!   "target_class": "org.example.Stack",
//!   "classpath": ["build/classes"],
//!   "instrumented_dir": "target/instrumented",
//!   "timeout_ms": 15000
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;
use tracebridge_core::{NameError, QualifiedName};

pub const DEFAULT_CONFIG_FILE: &str = "tracebridge.json";
pub const DEFAULT_INSTRUMENTED_DIR: &str = "target/instrumented";
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;

pub const ENV_INSTRUMENTED_DIR: &str = "TRACEBRIDGE_INSTRUMENTED_DIR";
pub const ENV_TIMEOUT_MS: &str = "TRACEBRIDGE_TIMEOUT_MS";

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config {}", .path.display())]
    #[diagnostic(code(tracebridge::config::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", .path.display())]
    #[diagnostic(code(tracebridge::config::parse), help("the config file must be a JSON object"))]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("target_class is empty")]
    #[diagnostic(
        code(tracebridge::config::target),
        help("set target_class to the fully qualified name of the class under test")
    )]
    EmptyTarget,

    #[error("target_class is not a qualified name: {0}")]
    #[diagnostic(code(tracebridge::config::target))]
    InvalidTarget(#[source] NameError),

    #[error("timeout_ms must be greater than zero")]
    #[diagnostic(code(tracebridge::config::timeout))]
    ZeroTimeout,

    #[error("{var}={value:?} is not a valid override")]
    #[diagnostic(code(tracebridge::config::env))]
    InvalidOverride { var: &'static str, value: String },
}

fn default_instrumented_dir() -> PathBuf {
    PathBuf::from(DEFAULT_INSTRUMENTED_DIR)
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Everything needed to build a coordinator for one target program.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Fully qualified name of the class under test
    pub target_class: String,
    /// Target project classpath, searched in order
    #[serde(default)]
    pub classpath: Vec<PathBuf>,
    /// Root of the instrumented copy of the target code
    #[serde(default = "default_instrumented_dir")]
    pub instrumented_dir: PathBuf,
    /// Per-test execution deadline in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl BridgeConfig {
    pub fn new(target_class: impl Into<String>) -> Self {
        Self {
            target_class: target_class.into(),
            classpath: Vec::new(),
            instrumented_dir: default_instrumented_dir(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_classpath(mut self, classpath: Vec<PathBuf>) -> Self {
        self.classpath = classpath;
        self
    }

    pub fn with_instrumented_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.instrumented_dir = dir.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Load, apply environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&source).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let config = config.apply_env_overrides()?;
        config.validate()?;
        tracing::debug!(path = %path.display(), target_class = %config.target_class, "config loaded");
        Ok(config)
    }

    pub fn from_json(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }

    /// Apply `TRACEBRIDGE_INSTRUMENTED_DIR` and `TRACEBRIDGE_TIMEOUT_MS` from the process environment.
    pub fn apply_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(dir) = lookup(ENV_INSTRUMENTED_DIR).filter(|d| !d.is_empty()) {
            self.instrumented_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            self.timeout_ms = raw.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                var: ENV_TIMEOUT_MS,
                value: raw.clone(),
            })?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.target()?;
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn target(&self) -> Result<QualifiedName, ConfigError> {
        match QualifiedName::parse(&self.target_class) {
            Ok(name) => Ok(name),
            Err(NameError::Empty) => Err(ConfigError::EmptyTarget),
            Err(e) => Err(ConfigError::InvalidTarget(e)),
        }
    }

    /// Package of the target class; empty for the default package.
    pub fn package(&self) -> &str {
        self.target_class
            .rsplit_once('.')
            .map(|(package, _)| package)
            .unwrap_or("")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
