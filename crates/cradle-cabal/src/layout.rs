//! Where the files live, and what the artifact's first line says about the package.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CabalError, ParseError, Result};
use crate::model::PackageIdentity;

pub const SETUP_CONFIG_FILE: &str = "setup-config";
pub const DEFAULT_DIST_DIR: &str = "dist";

const PACKAGE_CACHE_SUFFIX: [&str; 4] = [
    ".cabal",
    "packages",
    "hackage.haskell.org",
    "00-index.cache",
];

pub fn artifact_path(dist_dir: &Path) -> PathBuf {
    dist_dir.join(SETUP_CONFIG_FILE)
}

/// Reads the artifact's text.
pub fn read_blob(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| CabalError::ReadArtifact {
        path: path.to_path_buf(),
        source,
    })
}

/// The lexicographically first `*.cabal` file directly inside `project_root`.
pub fn discover_descriptor(project_root: &Path) -> Result<Option<PathBuf>> {
    let entries = fs::read_dir(project_root).map_err(|source| CabalError::Io {
        path: project_root.to_path_buf(),
        source,
    })?;

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| CabalError::Io {
            path: project_root.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.extension() == Some(OsStr::new("cabal")) && path.is_file() {
            found.push(path);
        }
    }
    found.sort();
    if found.len() > 1 {
        tracing::warn!(
            target: "cradle.cabal",
            candidates = ?found,
            "several package descriptors found; using the first"
        );
    }
    Ok(found.into_iter().next())
}

/// `~/.cabal/packages/hackage.haskell.org/00-index.cache`.
pub fn default_package_cache() -> Result<PathBuf> {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|home| !home.is_empty())
        .ok_or(CabalError::MissingHomeDir)?;
    Ok(PACKAGE_CACHE_SUFFIX
        .iter()
        .fold(PathBuf::from(home), |path, part| path.join(part)))
}

/// The first line of a `setup-config`:
/// `Saved package config for demo-0.1.0.0 written by Cabal-1.22.4.0 using ghc-7.10`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupConfigHeader {
    pub package: PackageIdentity,
    pub cabal: PackageIdentity,
    pub compiler: PackageIdentity,
}

impl SetupConfigHeader {
    pub fn parse(blob: &str) -> Result<Self, ParseError> {
        let line = blob.lines().next().unwrap_or_default().trim();
        let malformed = || ParseError::Header {
            line: line.to_owned(),
        };

        let rest = line
            .strip_prefix("Saved package config for ")
            .ok_or_else(malformed)?;
        let (package, rest) = rest.split_once(" written by ").ok_or_else(malformed)?;
        let (cabal, compiler) = rest.split_once(" using ").ok_or_else(malformed)?;

        Ok(Self {
            package: package.trim().parse().map_err(|_| malformed())?,
            cabal: cabal.trim().parse().map_err(|_| malformed())?,
            compiler: compiler.trim().parse().map_err(|_| malformed())?,
        })
    }
}
