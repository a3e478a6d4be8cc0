use std::collections::BTreeMap;

use crate::error::PomError;
use crate::model::{DocDependency, DocParent, DocRepository, LineSpan, ProjectDoc};

/// Parse a `pom.xml` document into a [`ProjectDoc`].
///
/// Only the elements the resolver consumes are read; everything else in the
/// document is ignored. Missing elements are simply absent — malformed XML
/// is the only error.
pub fn parse_project_doc(text: &str) -> Result<ProjectDoc, PomError> {
    let doc = roxmltree::Document::parse(text).map_err(|source| PomError::Xml { source })?;
    let project = doc.root_element();

    let mut out = ProjectDoc {
        group_id: child_text(&project, "groupId"),
        artifact_id: child_text(&project, "artifactId"),
        version: child_text(&project, "version"),
        packaging: child_text(&project, "packaging"),
        ..ProjectDoc::default()
    };

    if let Some(parent) = child_element(&project, "parent") {
        out.parent = Some(DocParent {
            group_id: child_text(&parent, "groupId"),
            artifact_id: child_text(&parent, "artifactId"),
            version: child_text(&parent, "version"),
            relative_path: child_text(&parent, "relativePath"),
        });
    }

    if let Some(props) = child_element(&project, "properties") {
        out.properties = parse_properties(&props);
    }

    if let Some(licenses) = child_element(&project, "licenses") {
        out.licenses = licenses
            .children()
            .filter(|n| n.is_element() && n.has_tag_name("license"))
            .filter_map(|license| child_text(&license, "name"))
            .collect();
    }

    if let Some(deps) = child_element(&project, "dependencies") {
        out.dependencies = parse_dependencies(&deps);
    }

    if let Some(dep_mgmt) = child_element(&project, "dependencyManagement") {
        if let Some(deps) = child_element(&dep_mgmt, "dependencies") {
            out.dependency_management = parse_dependencies(&deps);
        }
    }

    if let Some(modules) = child_element(&project, "modules") {
        out.modules = modules
            .children()
            .filter(|n| n.is_element() && n.has_tag_name("module"))
            .filter_map(|n| n.text())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
    }

    if let Some(repositories) = child_element(&project, "repositories") {
        out.repositories = repositories
            .children()
            .filter(|n| n.is_element() && n.has_tag_name("repository"))
            .filter_map(|repo| {
                let url = child_text(&repo, "url")?;
                Some(DocRepository {
                    id: child_text(&repo, "id"),
                    url,
                    releases_enabled: policy_enabled(&repo, "releases"),
                    snapshots_enabled: policy_enabled(&repo, "snapshots"),
                })
            })
            .collect();
    }

    Ok(out)
}

/// `<releases>`/`<snapshots>` policies default to enabled; only an explicit
/// `<enabled>false</enabled>` disables them.
fn policy_enabled(repo: &roxmltree::Node<'_, '_>, policy: &str) -> bool {
    child_element(repo, policy)
        .and_then(|node| child_text(&node, "enabled"))
        .map_or(true, |enabled| !enabled.eq_ignore_ascii_case("false"))
}

fn parse_properties(node: &roxmltree::Node<'_, '_>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for child in node.children().filter(|n| n.is_element()) {
        let key = child.tag_name().name().to_string();
        if let Some(value) = child.text().map(str::trim).filter(|t| !t.is_empty()) {
            // Duplicate keys: last declaration wins.
            out.insert(key, value.to_string());
        }
    }
    out
}

fn parse_dependencies(deps_node: &roxmltree::Node<'_, '_>) -> Vec<DocDependency> {
    deps_node
        .children()
        .filter(|n| n.is_element() && n.has_tag_name("dependency"))
        .filter_map(|dep_node| {
            let group_id = child_text(&dep_node, "groupId")?;
            let artifact_id = child_text(&dep_node, "artifactId")?;

            let mut exclusions = Vec::new();
            if let Some(exclusions_node) = child_element(&dep_node, "exclusions") {
                for exclusion in exclusions_node
                    .children()
                    .filter(|n| n.is_element() && n.has_tag_name("exclusion"))
                {
                    let Some(group_id) = child_text(&exclusion, "groupId") else {
                        continue;
                    };
                    let Some(artifact_id) = child_text(&exclusion, "artifactId") else {
                        continue;
                    };
                    exclusions.push(format!("{group_id}:{artifact_id}"));
                }
            }

            Some(DocDependency {
                group_id,
                artifact_id,
                version: child_text(&dep_node, "version"),
                scope: child_text(&dep_node, "scope"),
                optional: child_text(&dep_node, "optional")
                    .is_some_and(|v| v.eq_ignore_ascii_case("true")),
                exclusions,
                lines: Some(line_span(&dep_node)),
            })
        })
        .collect()
}

fn line_span(node: &roxmltree::Node<'_, '_>) -> LineSpan {
    let doc = node.document();
    let range = node.range();
    LineSpan {
        start: doc.text_pos_at(range.start).row,
        end: doc.text_pos_at(range.end).row,
    }
}

pub(crate) fn child_element<'a>(
    node: &'a roxmltree::Node<'a, 'a>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'a>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

pub(crate) fn child_text(node: &roxmltree::Node<'_, '_>, name: &str) -> Option<String> {
    child_element(node, name)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
