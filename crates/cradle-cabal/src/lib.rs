//! Cached Cabal build configuration.
//!
//! Cabal's configure step writes `dist/setup-config`, a `show` dump of the package's local build
//! info. This crate decides whether that file is still current (by comparing modification times
//! with the package descriptor and the package index cache), regenerates it when it is not, and
//! reads the package's external dependencies and flag assignment out of it across the layouts
//! different Cabal releases have written.
//!
//! Most callers go through [`CabalProject`]; the free functions are available for callers that
//! manage files themselves.

mod deps;
mod error;
mod field;
mod flags;
mod layout;
mod model;
mod project;
mod schema;
mod term;
mod world;

pub use deps::{resolve_dependencies, resolve_with};
pub use error::{
    display_chain, CabalError, FlagSourceError, FlagStage, ParseError, Result, SchemaFailure,
};
pub use field::{extract_field, field_value, FieldError};
pub use flags::resolve_flags;
pub use layout::{
    artifact_path, default_package_cache, discover_descriptor, read_blob, SetupConfigHeader,
    DEFAULT_DIST_DIR, SETUP_CONFIG_FILE,
};
pub use model::{ExtractedDependency, FlagAssignment, InstalledId, PackageIdentity, Version};
pub use project::{CabalOptions, CabalProject, Freshness, SetupConfig};
pub use schema::{MiddleSchema, NewestSchema, OldestSchema, SchemaAdapter, SchemaVersion, ADAPTERS};
pub use term::{parse_term, Term, TermError};
pub use world::{capture_world, has_world_changed, is_valid, CradleInputs, WorldSnapshot};

pub use cradle_process::{
    CapturedOutput, CommandRunner, Invocation, ProcessRunner, RunCommandError,
};
