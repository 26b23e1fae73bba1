//! Workspace configuration (`cradle.toml`) and tracing setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

mod diagnostics;
mod logging;

pub use diagnostics::ConfigDiagnostics;
pub use logging::{init_tracing, LoggingConfig};

/// Environment variable overriding config discovery.
pub const CRADLE_CONFIG_ENV_VAR: &str = "CRADLE_CONFIG_PATH";

/// How Cabal is driven and where its inputs and outputs live.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CabalConfig {
    /// Program invoked to regenerate the configuration artifact.
    #[serde(default = "CabalConfig::default_program")]
    pub program: PathBuf,

    /// Arguments passed to `program`.
    #[serde(default = "CabalConfig::default_configure_args")]
    pub configure_args: Vec<String>,

    /// Regeneration timeout in milliseconds. Unset means no timeout.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Build output directory, relative to the project root unless absolute.
    #[serde(default = "CabalConfig::default_dist_dir")]
    pub dist_dir: PathBuf,

    /// Project descriptor (`*.cabal`). When unset the project root is searched.
    #[serde(default)]
    pub descriptor: Option<PathBuf>,

    /// Package index cache whose modification time gates artifact validity.
    ///
    /// Defaults to `~/.cabal/packages/hackage.haskell.org/00-index.cache`.
    #[serde(default)]
    pub package_cache: Option<PathBuf>,

    /// Whether a stale artifact is regenerated automatically.
    #[serde(default = "CabalConfig::default_regenerate")]
    pub regenerate: bool,
}

impl CabalConfig {
    fn default_program() -> PathBuf {
        PathBuf::from("cabal")
    }

    fn default_configure_args() -> Vec<String> {
        vec!["configure".to_owned()]
    }

    fn default_dist_dir() -> PathBuf {
        PathBuf::from("dist")
    }

    fn default_regenerate() -> bool {
        true
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl Default for CabalConfig {
    fn default() -> Self {
        Self {
            program: Self::default_program(),
            configure_args: Self::default_configure_args(),
            timeout_ms: None,
            dist_dir: Self::default_dist_dir(),
            descriptor: None,
            package_cache: None,
            regenerate: Self::default_regenerate(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CradleConfig {
    #[serde(default)]
    pub cabal: CabalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {message}")]
    Toml { path: PathBuf, message: String },
}

impl CradleConfig {
    /// Load a config file, ignoring unknown keys.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_from_path_with_diagnostics(path).map(|(config, _)| config)
    }

    /// Load a config file and report keys that were not recognized.
    pub fn load_from_path_with_diagnostics(
        path: impl AsRef<Path>,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load_from_str_with_diagnostics(&text).map_err(|message| ConfigError::Toml {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn load_from_str_with_diagnostics(
        text: &str,
    ) -> Result<(Self, ConfigDiagnostics), String> {
        let (config, unknown_keys) =
            diagnostics::deserialize_toml_with_unknown_keys::<CradleConfig>(text)
                .map_err(|err| err.message().trim().to_owned())?;
        Ok((config, ConfigDiagnostics { unknown_keys }))
    }

    /// Resolve `cabal.dist_dir`, `cabal.descriptor` and `cabal.package_cache` against the project
    /// root (and `logging.file` against the config file's directory).
    pub fn resolve_paths(&mut self, project_root: &Path, config_dir: Option<&Path>) {
        let join = |base: &Path, path: &Path| {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                base.join(path)
            }
        };
        self.cabal.dist_dir = join(project_root, &self.cabal.dist_dir);
        self.cabal.descriptor = self
            .cabal
            .descriptor
            .as_deref()
            .map(|path| join(project_root, path));
        self.cabal.package_cache = self
            .cabal
            .package_cache
            .as_deref()
            .map(|path| join(project_root, path));
        if let Some(dir) = config_dir {
            self.logging.file = self.logging.file.as_deref().map(|path| join(dir, path));
        }
    }
}

/// Find the config file for `project_root`.
///
/// Search order:
/// 1) `CRADLE_CONFIG_PATH` (absolute or relative to `project_root`)
/// 2) `cradle.toml`
/// 3) `.cradle.toml`
/// 4) `.cradle/config.toml`
pub fn discover_config_path(project_root: &Path) -> Option<PathBuf> {
    if let Some(value) = std::env::var_os(CRADLE_CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(value);
        let path = if candidate.is_absolute() {
            candidate
        } else {
            project_root.join(candidate)
        };
        return Some(path.canonicalize().unwrap_or(path));
    }

    ["cradle.toml", ".cradle.toml", ".cradle/config.toml"]
        .into_iter()
        .map(|name| project_root.join(name))
        .find(|path| path.is_file())
        .map(|path| path.canonicalize().unwrap_or(path))
}

/// Load the configuration for a project root, with every relative path resolved.
///
/// With no config file present this returns the defaults and `None`. Unknown keys are returned in
/// the diagnostics for the caller to report once logging is up.
pub fn load_for_project(
    project_root: &Path,
) -> Result<(CradleConfig, Option<PathBuf>, ConfigDiagnostics), ConfigError> {
    let Some(path) = discover_config_path(project_root) else {
        let mut config = CradleConfig::default();
        config.resolve_paths(project_root, None);
        return Ok((config, None, ConfigDiagnostics::default()));
    };

    let (mut config, diagnostics) = CradleConfig::load_from_path_with_diagnostics(&path)?;
    config.resolve_paths(project_root, path.parent());
    Ok((config, Some(path), diagnostics))
}
