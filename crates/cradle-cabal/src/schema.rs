//! Readers for the dependency layouts different Cabal releases write into `setup-config`.
//!
//! Each adapter understands exactly one layout and fails loudly on anything else; the caller tries
//! them in order (see [`crate::deps::resolve_dependencies`]).

use std::fmt;

use crate::error::ParseError;
use crate::field::{extract_field, field_value};
use crate::model::{ExtractedDependency, InstalledId, PackageIdentity, Version};
use crate::term::{parse_term, Term};

const COMPONENTS_FIELD: &str = "componentsConfigs";
const DEPS_FIELD: &str = "componentPackageDeps";
const LIBRARY_FIELD: &str = "libraryConfig";
const PER_KIND_FIELDS: [&str; 3] = ["executableConfigs", "testSuiteConfigs", "benchmarkConfigs"];

/// Known `setup-config` dependency layouts, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaVersion {
    /// `componentsConfigs` triples keyed by `UnitId`. Cabal 2 writes a positional
    /// `PackageName`/`Version`; Cabal 1.24 still writes them as records.
    Newest,
    /// `componentsConfigs` triples keyed by `InstalledPackageId`, with record-syntax identities.
    Middle,
    /// Separate `libraryConfig`, `executableConfigs`, `testSuiteConfigs` and `benchmarkConfigs`.
    Oldest,
}

impl SchemaVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaVersion::Newest => "newest",
            SchemaVersion::Middle => "middle",
            SchemaVersion::Oldest => "oldest",
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reads every component's external dependencies out of a blob written in one specific layout.
///
/// The returned list may contain duplicates and the package's own identity; callers normalize.
pub trait SchemaAdapter: Sync {
    fn version(&self) -> SchemaVersion;

    fn dependencies(&self, blob: &str) -> Result<Vec<ExtractedDependency>, ParseError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NewestSchema;

#[derive(Debug, Clone, Copy, Default)]
pub struct MiddleSchema;

#[derive(Debug, Clone, Copy, Default)]
pub struct OldestSchema;

/// All adapters in the order they should be tried.
pub static ADAPTERS: [&dyn SchemaAdapter; 3] = [&NewestSchema, &MiddleSchema, &OldestSchema];

impl SchemaAdapter for NewestSchema {
    fn version(&self) -> SchemaVersion {
        SchemaVersion::Newest
    }

    fn dependencies(&self, blob: &str) -> Result<Vec<ExtractedDependency>, ParseError> {
        components_configs(
            &Reader {
                schema: SchemaVersion::Newest,
                installed: unit_id,
                package: unit_id_package_identifier,
            },
            blob,
        )
    }
}

impl SchemaAdapter for MiddleSchema {
    fn version(&self) -> SchemaVersion {
        SchemaVersion::Middle
    }

    fn dependencies(&self, blob: &str) -> Result<Vec<ExtractedDependency>, ParseError> {
        components_configs(&Reader::legacy(SchemaVersion::Middle), blob)
    }
}

impl SchemaAdapter for OldestSchema {
    fn version(&self) -> SchemaVersion {
        SchemaVersion::Oldest
    }

    fn dependencies(&self, blob: &str) -> Result<Vec<ExtractedDependency>, ParseError> {
        let reader = Reader::legacy(SchemaVersion::Oldest);
        let mut out = Vec::new();

        let raw = field_value(blob, LIBRARY_FIELD).map_err(|source| ParseError::Field {
            schema: reader.schema,
            source,
        })?;
        let library = parse_term(raw).map_err(|source| ParseError::Term {
            schema: reader.schema,
            field: LIBRARY_FIELD.to_owned(),
            source,
        })?;
        match (library.app_of("Nothing"), library.app_of("Just")) {
            (Some([]), _) => {}
            (_, Some([clbi])) => out.extend(reader.component_deps(clbi)?),
            _ => {
                return Err(reader.shape(
                    LIBRARY_FIELD,
                    format!("expected `Nothing` or `Just <component>`, found {}", library.describe()),
                ))
            }
        }

        for field in PER_KIND_FIELDS {
            let term = reader.read_field(blob, field)?;
            let entries = term.as_list().ok_or_else(|| {
                reader.shape(field, format!("expected a list, found {}", term.describe()))
            })?;
            for entry in entries {
                match entry.as_tuple() {
                    Some([name, clbi]) if name.as_str().is_some() => {
                        out.extend(reader.component_deps(clbi)?)
                    }
                    _ => {
                        return Err(reader.shape(
                            field,
                            format!(
                                "expected (name, component) pairs, found {}",
                                entry.describe()
                            ),
                        ))
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Per-layout readers for the two halves of a dependency pair.
struct Reader {
    schema: SchemaVersion,
    installed: fn(&Term) -> Option<InstalledId>,
    package: fn(&Term) -> Option<PackageIdentity>,
}

impl Reader {
    /// The `InstalledPackageId`/record-syntax identity shared by the two older layouts.
    fn legacy(schema: SchemaVersion) -> Self {
        Self {
            schema,
            installed: installed_package_id,
            package: record_package_identifier,
        }
    }

    fn shape(&self, field: &str, message: String) -> ParseError {
        ParseError::Shape {
            schema: self.schema,
            field: field.to_owned(),
            message,
        }
    }

    fn read_field(&self, blob: &str, field: &str) -> Result<Term, ParseError> {
        let span = extract_field(blob, field).map_err(|source| ParseError::Field {
            schema: self.schema,
            source,
        })?;
        parse_term(span).map_err(|source| ParseError::Term {
            schema: self.schema,
            field: field.to_owned(),
            source,
        })
    }

    fn component_deps(&self, clbi: &Term) -> Result<Vec<ExtractedDependency>, ParseError> {
        let deps = clbi.field(DEPS_FIELD).ok_or_else(|| {
            self.shape(
                DEPS_FIELD,
                format!("expected a component record carrying it, found {}", clbi.describe()),
            )
        })?;
        let pairs = deps.as_list().ok_or_else(|| {
            self.shape(DEPS_FIELD, format!("expected a list, found {}", deps.describe()))
        })?;
        pairs.iter().map(|pair| self.dependency(pair)).collect()
    }

    fn dependency(&self, pair: &Term) -> Result<ExtractedDependency, ParseError> {
        let Some([installed, package]) = pair.as_tuple() else {
            return Err(self.shape(
                DEPS_FIELD,
                format!("expected (installed id, package) pairs, found {}", pair.describe()),
            ));
        };
        let installed_id = (self.installed)(installed).ok_or_else(|| {
            self.shape(DEPS_FIELD, format!("unrecognized installed id `{installed}`"))
        })?;
        let package_id = (self.package)(package).ok_or_else(|| {
            self.shape(DEPS_FIELD, format!("unrecognized package identifier `{package}`"))
        })?;
        Ok(ExtractedDependency {
            installed: installed_id,
            package: package_id,
        })
    }
}

fn components_configs(reader: &Reader, blob: &str) -> Result<Vec<ExtractedDependency>, ParseError> {
    let term = reader.read_field(blob, COMPONENTS_FIELD)?;
    let components = term.as_list().ok_or_else(|| {
        reader.shape(
            COMPONENTS_FIELD,
            format!("expected a list, found {}", term.describe()),
        )
    })?;

    let mut out = Vec::new();
    for component in components {
        match component.as_tuple() {
            Some([_name, clbi, _deps]) => out.extend(reader.component_deps(clbi)?),
            _ => {
                return Err(reader.shape(
                    COMPONENTS_FIELD,
                    format!(
                        "expected (name, component, dependencies) triples, found {}",
                        component.describe()
                    ),
                ))
            }
        }
    }
    Ok(out)
}

/// `UnitId "x"` or `SimpleUnitId (ComponentId "x")`.
fn unit_id(term: &Term) -> Option<InstalledId> {
    let id = match (term.app_of("UnitId"), term.app_of("SimpleUnitId")) {
        (Some([Term::Str(id)]), _) => id,
        (_, Some([component])) => match component.app_of("ComponentId") {
            Some([Term::Str(id)]) => id,
            _ => return None,
        },
        _ => return None,
    };
    Some(InstalledId(id.clone()))
}

/// `InstalledPackageId "x"`.
fn installed_package_id(term: &Term) -> Option<InstalledId> {
    match term.app_of("InstalledPackageId") {
        Some([Term::Str(id)]) => Some(InstalledId(id.clone())),
        _ => None,
    }
}

/// Either identity shape; Cabal 1.24 pairs `SimpleUnitId` with the record form.
fn unit_id_package_identifier(term: &Term) -> Option<PackageIdentity> {
    positional_package_identifier(term).or_else(|| record_package_identifier(term))
}

/// `PackageIdentifier {pkgName = PackageName "x", pkgVersion = Version [1,2] []}`.
///
/// `mkVersion [1,2]` is accepted for the version as well.
fn positional_package_identifier(term: &Term) -> Option<PackageIdentity> {
    let (name, version) = package_identifier_fields(term)?;
    let name = match name.app_of("PackageName") {
        Some([Term::Str(name)]) => name.clone(),
        _ => return None,
    };
    let branch = match (version.app_of("Version"), version.app_of("mkVersion")) {
        (Some([branch, _]), _) | (_, Some([branch])) => branch,
        _ => return None,
    };
    Some(PackageIdentity::new(name, version_branch(branch)?))
}

/// `PackageIdentifier {pkgName = PackageName {unPackageName = "x"},
/// pkgVersion = Version {versionBranch = [1,2], versionTags = []}}`.
fn record_package_identifier(term: &Term) -> Option<PackageIdentity> {
    let (name, version) = package_identifier_fields(term)?;
    if name.head() != Some("PackageName") || version.head() != Some("Version") {
        return None;
    }
    let name = name.field("unPackageName")?.as_str()?.to_owned();
    let branch = version_branch(version.field("versionBranch")?)?;
    Some(PackageIdentity::new(name, branch))
}

fn package_identifier_fields(term: &Term) -> Option<(&Term, &Term)> {
    if term.head() != Some("PackageIdentifier") {
        return None;
    }
    Some((term.field("pkgName")?, term.field("pkgVersion")?))
}

fn version_branch(term: &Term) -> Option<Version> {
    term.as_list()?
        .iter()
        .map(Term::as_u64)
        .collect::<Option<Vec<_>>>()
        .map(Version)
}
