//! Configuration for schema loading and RPC waits.
//!
//! Settings are layered, later sources overriding earlier ones:
//! 1. Defaults embedded in the crate (`config/default.toml`)
//! 2. An optional user-specified TOML file
//! 3. Environment variables prefixed with `CAPNP_DYNAMIC__`, sections
//!    separated by `__` (e.g. `CAPNP_DYNAMIC__RPC__WAIT_TIMEOUT_MS=5000`)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub schema: SchemaSettings,
    #[serde(default)]
    pub rpc: RpcSettings,
}

/// How schema files are compiled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSettings {
    /// Path or name of the `capnp` compiler binary.
    #[serde(default = "default_compiler")]
    pub compiler: PathBuf,
    /// Directories searched for imports, ahead of per-call import paths.
    #[serde(default)]
    pub import_paths: Vec<PathBuf>,
    /// Whether the compiler's built-in import directories are searched.
    #[serde(default = "default_standard_imports")]
    pub include_standard_imports: bool,
}

impl Default for SchemaSettings {
    fn default() -> Self {
        Self {
            compiler: default_compiler(),
            import_paths: Vec::new(),
            include_standard_imports: default_standard_imports(),
        }
    }
}

/// Promise waiting behavior.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcSettings {
    /// Upper bound for a single `wait`, in milliseconds.
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
}

impl RpcSettings {
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }
}

fn default_compiler() -> PathBuf {
    PathBuf::from("capnp")
}

fn default_standard_imports() -> bool {
    true
}

impl Settings {
    /// Load settings from defaults, an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(config::File::from_str(
            DEFAULT_CONFIG,
            config::FileFormat::Toml,
        ));

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CAPNP_DYNAMIC")
                .separator("__")
                .try_parsing(true)
                .ignore_empty(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        tracing::debug!(
            compiler = %settings.schema.compiler.display(),
            import_paths = settings.schema.import_paths.len(),
            wait_timeout_ms = ?settings.rpc.wait_timeout_ms,
            "Loaded settings"
        );
        Ok(settings)
    }

    /// Parse settings from TOML text layered over the defaults.
    pub fn from_toml(text: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}
