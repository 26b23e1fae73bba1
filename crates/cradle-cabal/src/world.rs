//! Modification-time snapshots of the files that decide whether `setup-config` is current.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::{CabalError, Result};

/// The three files a snapshot observes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CradleInputs {
    /// The `.cabal` package descriptor, if the project has one.
    pub descriptor: Option<PathBuf>,
    /// The package index cache; it must exist.
    pub package_cache: PathBuf,
    /// The generated `setup-config` file.
    pub artifact: PathBuf,
}

/// Paths and modification times of the inputs and the artifact, taken at one instant.
///
/// A snapshot never changes after capture; compare a stored one against a fresh capture with
/// [`has_world_changed`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldSnapshot {
    descriptor_path: Option<PathBuf>,
    descriptor_modified: Option<SystemTime>,
    package_cache_path: PathBuf,
    package_cache_modified: SystemTime,
    artifact_path: PathBuf,
    artifact_modified: Option<SystemTime>,
}

impl WorldSnapshot {
    /// Builds a snapshot from already-known times. A descriptor time without a descriptor path is
    /// dropped.
    pub fn from_times(
        inputs: CradleInputs,
        descriptor_modified: Option<SystemTime>,
        package_cache_modified: SystemTime,
        artifact_modified: Option<SystemTime>,
    ) -> Self {
        let descriptor_modified = inputs.descriptor.as_ref().and(descriptor_modified);
        Self {
            descriptor_path: inputs.descriptor,
            descriptor_modified,
            package_cache_path: inputs.package_cache,
            package_cache_modified,
            artifact_path: inputs.artifact,
            artifact_modified,
        }
    }

    pub fn descriptor_path(&self) -> Option<&Path> {
        self.descriptor_path.as_deref()
    }

    pub fn descriptor_modified(&self) -> Option<SystemTime> {
        self.descriptor_modified
    }

    pub fn package_cache_path(&self) -> &Path {
        &self.package_cache_path
    }

    pub fn package_cache_modified(&self) -> SystemTime {
        self.package_cache_modified
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    pub fn artifact_modified(&self) -> Option<SystemTime> {
        self.artifact_modified
    }

    pub fn inputs(&self) -> CradleInputs {
        CradleInputs {
            descriptor: self.descriptor_path.clone(),
            package_cache: self.package_cache_path.clone(),
            artifact: self.artifact_path.clone(),
        }
    }

    /// See [`is_valid`].
    pub fn is_valid(&self) -> bool {
        is_valid(self)
    }
}

/// Stats every input and the artifact.
///
/// A missing descriptor or artifact is recorded as absent; a missing package cache is an error.
pub fn capture_world(inputs: &CradleInputs) -> Result<WorldSnapshot> {
    let descriptor_modified = match &inputs.descriptor {
        Some(path) => modified_if_exists(path)?,
        None => None,
    };
    let package_cache_modified = fs::metadata(&inputs.package_cache)
        .and_then(|meta| meta.modified())
        .map_err(|source| CabalError::MissingInput {
            path: inputs.package_cache.clone(),
            source,
        })?;
    let artifact_modified = modified_if_exists(&inputs.artifact)?;

    let snapshot = WorldSnapshot::from_times(
        inputs.clone(),
        descriptor_modified,
        package_cache_modified,
        artifact_modified,
    );
    tracing::trace!(target: "cradle.cabal", ?snapshot, "captured world snapshot");
    Ok(snapshot)
}

fn modified_if_exists(path: &Path) -> Result<Option<SystemTime>> {
    let io_err = |source| CabalError::Io {
        path: path.to_path_buf(),
        source,
    };
    match fs::metadata(path) {
        Ok(meta) => meta.modified().map(Some).map_err(io_err),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(err)),
    }
}

/// The artifact is valid when it exists and is at least as new as the package cache and (when
/// present) the descriptor. Equal timestamps count as valid.
pub fn is_valid(world: &WorldSnapshot) -> bool {
    let Some(artifact) = world.artifact_modified else {
        return false;
    };
    if artifact < world.package_cache_modified {
        return false;
    }
    match world.descriptor_modified {
        Some(descriptor) => artifact >= descriptor,
        None => true,
    }
}

/// Whether capturing `previous`'s inputs now would produce a different snapshot.
pub fn has_world_changed(previous: &WorldSnapshot, inputs: &CradleInputs) -> Result<bool> {
    let current = capture_world(inputs)?;
    Ok(current != *previous)
}
