use std::path::{Path, PathBuf};
use std::time::Duration;

use cradle_process::{CommandRunner, Invocation, ProcessRunner};

use crate::deps::resolve_dependencies;
use crate::error::{display_chain, CabalError, ParseError, Result};
use crate::flags::resolve_flags;
use crate::layout::{
    artifact_path, default_package_cache, discover_descriptor, read_blob, SetupConfigHeader,
    DEFAULT_DIST_DIR,
};
use crate::model::{ExtractedDependency, FlagAssignment, PackageIdentity};
use crate::world::{capture_world, has_world_changed, CradleInputs, WorldSnapshot};

/// How a [`CabalProject`] finds its files and regenerates its artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CabalOptions {
    pub program: PathBuf,
    pub configure_args: Vec<String>,
    /// Relative paths are taken from the project root.
    pub dist_dir: PathBuf,
    /// Discovered in the project root when unset.
    pub descriptor: Option<PathBuf>,
    /// Defaults to the per-user Hackage index cache.
    pub package_cache: Option<PathBuf>,
    pub regenerate: bool,
    pub timeout: Option<Duration>,
}

impl Default for CabalOptions {
    fn default() -> Self {
        Self {
            program: PathBuf::from("cabal"),
            configure_args: vec!["configure".to_owned()],
            dist_dir: PathBuf::from(DEFAULT_DIST_DIR),
            descriptor: None,
            package_cache: None,
            regenerate: true,
            timeout: None,
        }
    }
}

/// Whether [`CabalProject::ensure_artifact`] had to run the configure step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Regenerated,
}

/// A Cabal package rooted at a directory, with access to its cached `setup-config`.
#[derive(Debug)]
pub struct CabalProject<R: CommandRunner = ProcessRunner> {
    root: PathBuf,
    options: CabalOptions,
    inputs: CradleInputs,
    runner: R,
}

impl CabalProject<ProcessRunner> {
    pub fn open(root: impl Into<PathBuf>, options: CabalOptions) -> Result<Self> {
        let runner = ProcessRunner::with_timeout(options.timeout);
        Self::with_runner(root, options, runner)
    }
}

impl<R: CommandRunner> CabalProject<R> {
    pub fn with_runner(root: impl Into<PathBuf>, options: CabalOptions, runner: R) -> Result<Self> {
        let root = root.into();
        let descriptor = match &options.descriptor {
            Some(path) => Some(root.join(path)),
            None => discover_descriptor(&root)?,
        };
        let package_cache = match &options.package_cache {
            Some(path) => root.join(path),
            None => default_package_cache()?,
        };
        let inputs = CradleInputs {
            descriptor,
            package_cache,
            artifact: artifact_path(&root.join(&options.dist_dir)),
        };
        tracing::debug!(target: "cradle.cabal", root = %root.display(), ?inputs, "opened project");
        Ok(Self {
            root,
            options,
            inputs,
            runner,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &CabalOptions {
        &self.options
    }

    pub fn inputs(&self) -> &CradleInputs {
        &self.inputs
    }

    pub fn artifact_path(&self) -> &Path {
        &self.inputs.artifact
    }

    pub fn capture_world(&self) -> Result<WorldSnapshot> {
        capture_world(&self.inputs)
    }

    /// Whether the inputs or the artifact changed since `previous` was captured.
    pub fn world_changed(&self, previous: &WorldSnapshot) -> Result<bool> {
        has_world_changed(previous, &self.inputs)
    }

    pub fn is_artifact_valid(&self) -> Result<bool> {
        Ok(self.capture_world()?.is_valid())
    }

    /// Runs the configure step when the artifact is missing or older than its inputs.
    pub fn ensure_artifact(&self) -> Result<Freshness> {
        let world = self.capture_world()?;
        if world.is_valid() {
            tracing::debug!(target: "cradle.cabal", "setup-config is up to date");
            return Ok(Freshness::Fresh);
        }
        if !self.options.regenerate {
            return Err(CabalError::Stale {
                path: self.inputs.artifact.clone(),
            });
        }

        self.regenerate()?;

        let world = self.capture_world()?;
        if world.artifact_modified().is_none() {
            return Err(CabalError::ArtifactNotProduced {
                path: self.inputs.artifact.clone(),
            });
        }
        if !world.is_valid() {
            tracing::warn!(
                target: "cradle.cabal",
                path = %self.inputs.artifact.display(),
                "regenerated setup-config is still older than its inputs"
            );
        }
        Ok(Freshness::Regenerated)
    }

    /// Runs the configure step unconditionally.
    pub fn regenerate(&self) -> Result<()> {
        let invocation = Invocation::new(&self.root, &self.options.program)
            .args(self.options.configure_args.iter().cloned());
        tracing::info!(target: "cradle.cabal", %invocation, "regenerating setup-config");
        let output = self
            .runner
            .run(&invocation)
            .map_err(|source| {
                tracing::warn!(
                    target: "cradle.cabal",
                    error = %display_chain(&source),
                    "regeneration failed"
                );
                CabalError::Regeneration { source }
            })?;
        tracing::debug!(
            target: "cradle.cabal",
            truncated = output.truncated,
            output = %output.combined(),
            "configure finished"
        );
        Ok(())
    }

    /// Ensures the artifact is current and reads it.
    pub fn load(&self) -> Result<SetupConfig> {
        self.ensure_artifact()?;
        SetupConfig::read(&self.inputs.artifact)
    }

    pub fn dependencies(&self, own: &PackageIdentity) -> Result<Vec<ExtractedDependency>> {
        self.load()?.dependencies(own)
    }

    /// The package's own identity, as recorded in the artifact header.
    pub fn own_identity(&self) -> Result<PackageIdentity> {
        Ok(self.load()?.header()?.package)
    }

    pub fn flags(&self) -> Result<FlagAssignment> {
        self.load()?.flags()
    }
}

/// The text of a `setup-config` file, read once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupConfig {
    path: PathBuf,
    text: String,
}

impl SetupConfig {
    pub fn read(path: &Path) -> Result<Self> {
        Ok(Self::from_text(path, read_blob(path)?))
    }

    pub fn from_text(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn header(&self) -> Result<SetupConfigHeader> {
        let header =
            SetupConfigHeader::parse(&self.text).map_err(|source| self.parse_error(source))?;
        tracing::debug!(
            target: "cradle.cabal",
            package = %header.package,
            cabal = %header.cabal,
            compiler = %header.compiler,
            "read setup-config header"
        );
        Ok(header)
    }

    pub fn dependencies(&self, own: &PackageIdentity) -> Result<Vec<ExtractedDependency>> {
        resolve_dependencies(&self.text, own).map_err(|source| self.parse_error(source))
    }

    /// Dependencies excluding the package named in the header.
    pub fn own_dependencies(&self) -> Result<Vec<ExtractedDependency>> {
        let own = self.header()?.package;
        self.dependencies(&own)
    }

    pub fn flags(&self) -> Result<FlagAssignment> {
        resolve_flags(&self.text).map_err(|source| self.parse_error(source))
    }

    fn parse_error(&self, source: ParseError) -> CabalError {
        CabalError::Parse {
            path: self.path.clone(),
            source,
        }
    }
}
