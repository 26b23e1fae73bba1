use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A dotted numeric version (`4.9.0.0`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version(pub Vec<u64>);

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, component) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(".")?;
            }
            write!(f, "{component}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("empty version".to_owned());
        }
        s.split('.')
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|_| format!("invalid version component `{part}` in `{s}`"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Version)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Logical package identity: name plus version (`base-4.9.0.0`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageIdentity {
    pub name: String,
    pub version: Version,
}

impl PackageIdentity {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

impl FromStr for PackageIdentity {
    type Err = String;

    /// Parses `name-version`; package names may themselves contain dashes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, version) = s
            .rsplit_once('-')
            .ok_or_else(|| format!("`{s}` is not of the form NAME-VERSION"))?;
        if name.is_empty() {
            return Err(format!("`{s}` has an empty package name"));
        }
        Ok(Self {
            name: name.to_owned(),
            version: version.parse()?,
        })
    }
}

/// Identity of an installed unit in the package database (`base-4.9.0.0-abc123`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstalledId(pub String);

impl fmt::Display for InstalledId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One external dependency of a component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtractedDependency {
    pub installed: InstalledId,
    pub package: PackageIdentity,
}

/// Flag name to value, in the order the flags appear in the artifact.
pub type FlagAssignment = IndexMap<String, bool>;
