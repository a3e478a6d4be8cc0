use crate::error::PomError;
use crate::parse::child_text;

/// Parsed `maven-metadata.xml` for a SNAPSHOT version directory.
///
/// Only the `versioning/snapshotVersions` entries are read; they map the
/// mutable SNAPSHOT version onto the concrete dated filenames stored in the
/// repository.
#[derive(Debug, Clone, Default)]
pub struct SnapshotMetadata {
    pub snapshot_versions: Vec<SnapshotVersion>,
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotVersion {
    pub classifier: Option<String>,
    pub extension: Option<String>,
    /// The dated version string, e.g. `1.0-20240101.120000-3`.
    pub value: Option<String>,
}

impl SnapshotMetadata {
    /// The dated version to substitute when fetching the POM, if the
    /// metadata names one with extension `pom`.
    pub fn pom_snapshot_value(&self) -> Option<&str> {
        self.snapshot_versions
            .iter()
            .filter(|sv| sv.extension.as_deref() == Some("pom"))
            .filter_map(|sv| sv.value.as_deref())
            .last()
    }
}

pub fn parse_snapshot_metadata(text: &str) -> Result<SnapshotMetadata, PomError> {
    let doc = roxmltree::Document::parse(text).map_err(|source| PomError::Xml { source })?;

    let snapshot_versions = doc
        .descendants()
        .filter(|n| n.is_element() && n.has_tag_name("snapshotVersion"))
        .map(|node| SnapshotVersion {
            classifier: child_text(&node, "classifier"),
            extension: child_text(&node, "extension"),
            value: child_text(&node, "value"),
        })
        .collect();

    Ok(SnapshotMetadata { snapshot_versions })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_the_pom_snapshot_value() {
        let metadata = parse_snapshot_metadata(
            r#"
<metadata>
  <groupId>com.example</groupId>
  <artifactId>app</artifactId>
  <version>1.0-SNAPSHOT</version>
  <versioning>
    <snapshotVersions>
      <snapshotVersion>
        <extension>jar</extension>
        <value>1.0-20240101.120000-3</value>
      </snapshotVersion>
      <snapshotVersion>
        <extension>pom</extension>
        <value>1.0-20240101.120000-3</value>
      </snapshotVersion>
    </snapshotVersions>
  </versioning>
</metadata>
"#,
        )
        .expect("parse metadata");

        assert_eq!(metadata.snapshot_versions.len(), 2);
        assert_eq!(
            metadata.pom_snapshot_value(),
            Some("1.0-20240101.120000-3")
        );
    }

    #[test]
    fn no_pom_entry_yields_no_value() {
        let metadata = parse_snapshot_metadata(
            r#"
<metadata>
  <versioning>
    <snapshotVersions>
      <snapshotVersion>
        <extension>jar</extension>
        <value>1.0-20240101.120000-3</value>
      </snapshotVersion>
    </snapshotVersions>
  </versioning>
</metadata>
"#,
        )
        .expect("parse metadata");

        assert_eq!(metadata.pom_snapshot_value(), None);
    }
}
