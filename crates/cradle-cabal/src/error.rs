use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

use cradle_process::RunCommandError;
use thiserror::Error;

use crate::field::FieldError;
use crate::schema::SchemaVersion;
use crate::term::TermError;

/// Failure to interpret the contents of a `setup-config` blob.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("{schema} schema rejected the artifact")]
    Field {
        schema: SchemaVersion,
        #[source]
        source: FieldError,
    },

    #[error("{schema} schema: cannot read `{field}`")]
    Term {
        schema: SchemaVersion,
        field: String,
        #[source]
        source: TermError,
    },

    #[error("{schema} schema: unexpected shape in `{field}`: {message}")]
    Shape {
        schema: SchemaVersion,
        field: String,
        message: String,
    },

    #[error("no known setup-config schema matched{}", render_failures(.failures))]
    NoSchemaMatched { failures: Vec<SchemaFailure> },

    #[error("failed to read configuration flags while {stage}")]
    Flags {
        stage: FlagStage,
        #[source]
        source: FlagSourceError,
    },

    #[error("unrecognized setup-config header: {line:?}")]
    Header { line: String },
}

/// One adapter's reason for rejecting a blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaFailure {
    pub schema: SchemaVersion,
    pub error: ParseError,
}

fn render_failures(failures: &[SchemaFailure]) -> String {
    failures.iter().fold(String::new(), |mut out, failure| {
        out.push_str("; ");
        out.push_str(&display_chain(&failure.error));
        out
    })
}

/// `err` followed by each of its causes, joined with `: `.
pub fn display_chain(err: &dyn StdError) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

/// Which step of flag extraction failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagStage {
    OuterField,
    InnerField,
    Assignment,
}

impl fmt::Display for FlagStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FlagStage::OuterField => "locating `configFlags`",
            FlagStage::InnerField => "locating `configConfigurationsFlags`",
            FlagStage::Assignment => "reading the flag assignment",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlagSourceError {
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error(transparent)]
    Term(#[from] TermError),
    #[error("{0}")]
    Shape(String),
}

#[derive(Debug, Error)]
pub enum CabalError {
    #[error("required input {path} is unavailable")]
    MissingInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to inspect {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "cannot locate the package cache: neither HOME nor USERPROFILE is set (configure `cabal.package_cache`)"
    )]
    MissingHomeDir,

    #[error("configuration artifact {path} is stale and regeneration is disabled")]
    Stale { path: PathBuf },

    #[error("cache was invalid, regeneration was attempted, regeneration failed")]
    Regeneration {
        #[source]
        source: RunCommandError,
    },

    #[error("regeneration finished but {path} was not produced")]
    ArtifactNotProduced { path: PathBuf },

    #[error("failed to read configuration artifact {path}")]
    ReadArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to interpret configuration artifact {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
}

pub type Result<T, E = CabalError> = std::result::Result<T, E>;
