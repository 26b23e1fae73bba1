use indexmap::IndexSet;

use crate::error::{display_chain, ParseError, SchemaFailure};
use crate::model::{ExtractedDependency, PackageIdentity};
use crate::schema::{SchemaAdapter, SchemaVersion, ADAPTERS};

/// External dependencies recorded in `blob`, in first-seen order, without duplicates and without
/// the package's own identity.
///
/// Layouts are tried newest first; the first one that reads the blob wins.
pub fn resolve_dependencies(
    blob: &str,
    own: &PackageIdentity,
) -> Result<Vec<ExtractedDependency>, ParseError> {
    resolve_with(&ADAPTERS, blob, own).map(|(_, deps)| deps)
}

/// Like [`resolve_dependencies`], with an explicit adapter list, also reporting which layout
/// matched.
pub fn resolve_with(
    adapters: &[&dyn SchemaAdapter],
    blob: &str,
    own: &PackageIdentity,
) -> Result<(SchemaVersion, Vec<ExtractedDependency>), ParseError> {
    let mut failures = Vec::new();
    for adapter in adapters {
        let schema = adapter.version();
        match adapter.dependencies(blob) {
            Ok(raw) => {
                let deps = normalize(raw, own);
                tracing::debug!(
                    target: "cradle.cabal",
                    %schema,
                    dependencies = deps.len(),
                    rejected = failures.len(),
                    "read dependencies"
                );
                return Ok((schema, deps));
            }
            Err(error) => {
                tracing::debug!(
                    target: "cradle.cabal",
                    %schema,
                    error = %display_chain(&error),
                    "schema did not match"
                );
                failures.push(SchemaFailure { schema, error });
            }
        }
    }
    Err(ParseError::NoSchemaMatched { failures })
}

fn normalize(raw: Vec<ExtractedDependency>, own: &PackageIdentity) -> Vec<ExtractedDependency> {
    raw.into_iter()
        .filter(|dep| dep.package != *own)
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}
