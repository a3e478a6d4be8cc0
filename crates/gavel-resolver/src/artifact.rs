use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::properties::evaluate;

/// A Maven version requirement as written in a POM.
///
/// "Soft" versions (plain strings, unresolved `${...}` tokens, and the
/// empty string) yield to the first-seen entry during traversal; "hard"
/// requirements (bracket-pinned forms like `[1.5]`, stored without their
/// brackets) override soft ones. When two hard requirements meet, the
/// first one seen is kept.
#[derive(Debug, Clone, Default, Eq)]
pub struct Version {
    value: String,
    hard: bool,
}

impl Version {
    pub fn new(value: impl Into<String>) -> Self {
        let raw: String = value.into();
        let trimmed = raw.trim();

        // An unresolved property stays soft even when bracketed — it can't
        // pin anything until it has a value.
        if !raw.contains("${") && trimmed.starts_with('[') && trimmed.ends_with(']') {
            return Version {
                value: trimmed.trim_matches(|c| c == '[' || c == ']').to_string(),
                hard: true,
            };
        }

        Version {
            value: raw,
            hard: false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Whether `incoming` must replace this installed version.
    pub fn should_override(&self, incoming: &Version) -> bool {
        !self.hard && incoming.hard
    }

    /// SNAPSHOT versions resolve through `maven-metadata.xml`; the literal
    /// `LATEST` behaves the same way.
    pub fn is_snapshot(&self) -> bool {
        self.value.ends_with("SNAPSHOT") || self.value == "LATEST"
    }
}

// Identity is the version string; hardness only steers overrides.
impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Whether a raw version string is a property reference like `${revision}`.
pub(crate) fn is_property_token(version: &str) -> bool {
    version.starts_with("${") && version.ends_with('}')
}

/// How an emitted package relates to the root descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Relationship {
    Root,
    Direct,
    Indirect,
}

impl Default for Relationship {
    fn default() -> Self {
        Relationship::Indirect
    }
}

/// 1-based line span of a dependency declaration in the root descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub start_line: u32,
    pub end_line: u32,
}

/// A node in the traversal: a coordinate plus the state that travels with
/// it (version requirement, exclusion patterns inherited from the path that
/// declared it, relationship to the root, module flag, source locations).
#[derive(Debug, Clone, Default)]
pub struct Artifact {
    pub group_id: String,
    pub artifact_id: String,
    pub version: Version,
    pub licenses: Vec<String>,
    pub relationship: Relationship,
    /// Modules are traversed in their own uniqueness namespace.
    pub module: bool,
    pub exclusions: BTreeSet<String>,
    pub locations: Vec<Location>,
}

impl Artifact {
    /// Build an artifact, interpolating properties in each coordinate field.
    pub(crate) fn new(
        group_id: &str,
        artifact_id: &str,
        version: Option<&str>,
        licenses: Vec<String>,
        props: &BTreeMap<String, String>,
    ) -> Artifact {
        Artifact {
            group_id: evaluate(group_id, props),
            artifact_id: evaluate(artifact_id, props),
            version: Version::new(evaluate(version.unwrap_or_default(), props)),
            licenses: licenses.into_iter().filter(|l| !l.is_empty()).collect(),
            ..Artifact::default()
        }
    }

    /// `groupId:artifactId` — the uniqueness key during traversal.
    pub fn name(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }

    /// An artifact missing any coordinate field cannot be resolved; it is
    /// kept in the queue's bookkeeping but never recorded or recursed into.
    pub fn is_empty(&self) -> bool {
        self.group_id.is_empty() || self.artifact_id.is_empty() || self.version.is_empty()
    }

    /// Full coordinate+version equality, used to verify parent lookups.
    pub fn gav_equals(&self, other: &Artifact) -> bool {
        self.group_id == other.group_id
            && self.artifact_id == other.artifact_id
            && self.version == other.version
    }

    /// Fill fields a child POM leaves empty from its parent's artifact.
    pub(crate) fn inherit(mut self, parent: &Artifact) -> Artifact {
        if self.group_id.is_empty() {
            self.group_id = parent.group_id.clone();
        }
        if self.version.is_empty() {
            self.version = parent.version.clone();
        }
        if self.licenses.is_empty() {
            self.licenses = parent.licenses.clone();
        }
        self
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.group_id, self.artifact_id, self.version
        )
    }
}

/// Stable package identifier shared by [`Package`] and [`Dependency`].
pub fn package_id(name: &str, version: &str) -> String {
    format!("{name}@{version}")
}

/// A resolved package in the output graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Package {
    pub id: String,
    pub name: String,
    pub version: String,
    pub licenses: Vec<String>,
    pub relationship: Relationship,
    pub locations: Vec<Location>,
}

/// Direct-dependency edges from one package to the packages it depends on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Dependency {
    pub id: String,
    pub depends_on: Vec<String>,
}
