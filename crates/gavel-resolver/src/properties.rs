use std::collections::BTreeMap;
use std::sync::OnceLock;

use gavel_pom::ProjectDoc;

use regex::Regex;

/// Substitute `${name}` tokens against `props`.
///
/// Maven properties can be nested (`${dep.version}` -> `${revision}` ->
/// `1.2.3`), so substitution is applied until the string stabilizes, with a
/// small iteration cap and cycle guard. Unresolved tokens stay literal.
pub(crate) fn evaluate(text: &str, props: &BTreeMap<String, String>) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid regex"));

    const MAX_ITERS: usize = 32;

    let mut current = text.to_string();
    let mut seen = Vec::new();

    for _ in 0..MAX_ITERS {
        if !current.contains("${") {
            break;
        }

        let next = re
            .replace_all(&current, |caps: &regex::Captures<'_>| {
                let key = &caps[1];
                props
                    .get(key)
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned();

        if next == current {
            break;
        }

        if seen.iter().any(|prev| prev == &next) {
            break;
        }

        seen.push(current);
        current = next;
    }

    current
}

/// The layered property environment of a document whose parent chain has
/// already been merged into `doc.properties`.
///
/// Priority, lowest to highest: built-ins (`project.groupId` and friends),
/// then the merged parent-chain/document properties.
pub(crate) fn merged_properties(doc: &ProjectDoc) -> BTreeMap<String, String> {
    let mut props = project_properties(doc);
    props.extend(doc.properties.clone());
    props
}

fn project_properties(doc: &ProjectDoc) -> BTreeMap<String, String> {
    let mut props = BTreeMap::new();

    let mut put = |keys: [&str; 2], value: &Option<String>| {
        if let Some(value) = value {
            for key in keys {
                props.insert(key.to_string(), value.clone());
            }
        }
    };

    put(["groupId", "project.groupId"], &doc.group_id);
    put(["artifactId", "project.artifactId"], &doc.artifact_id);
    put(["version", "project.version"], &doc.version);

    if let Some(parent) = &doc.parent {
        if let Some(v) = &parent.group_id {
            props.insert("project.parent.groupId".to_string(), v.clone());
        }
        if let Some(v) = &parent.artifact_id {
            props.insert("project.parent.artifactId".to_string(), v.clone());
        }
        if let Some(v) = &parent.version {
            props.insert("project.parent.version".to_string(), v.clone());
        }
    }

    props
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_tokens_stay_literal() {
        let props = BTreeMap::new();
        assert_eq!(evaluate("${missing}", &props), "${missing}");
        assert_eq!(evaluate("1.0", &props), "1.0");
    }

    #[test]
    fn nested_properties_resolve() {
        let mut props = BTreeMap::new();
        props.insert("dep.version".to_string(), "${revision}".to_string());
        props.insert("revision".to_string(), "1.2.3".to_string());

        assert_eq!(evaluate("${dep.version}", &props), "1.2.3");
    }

    #[test]
    fn cyclic_properties_terminate() {
        let mut props = BTreeMap::new();
        props.insert("a".to_string(), "${b}".to_string());
        props.insert("b".to_string(), "${a}".to_string());

        // The exact survivor doesn't matter; evaluation must terminate and
        // leave a literal token.
        assert!(evaluate("${a}", &props).contains("${"));
    }

    #[test]
    fn document_properties_override_builtins() {
        let doc = ProjectDoc {
            group_id: Some("com.example".to_string()),
            artifact_id: Some("app".to_string()),
            version: Some("1.0".to_string()),
            properties: [("project.version".to_string(), "shadowed".to_string())]
                .into_iter()
                .collect(),
            ..ProjectDoc::default()
        };

        let props = merged_properties(&doc);
        assert_eq!(props.get("project.groupId").map(String::as_str), Some("com.example"));
        assert_eq!(props.get("version").map(String::as_str), Some("1.0"));
        assert_eq!(props.get("project.version").map(String::as_str), Some("shadowed"));
    }

    #[test]
    fn parent_builtins_come_from_the_parent_hint() {
        let doc = ProjectDoc {
            parent: Some(gavel_pom::DocParent {
                group_id: Some("com.example".to_string()),
                artifact_id: Some("parent".to_string()),
                version: Some("7.0".to_string()),
                relative_path: None,
            }),
            ..ProjectDoc::default()
        };

        let props = merged_properties(&doc);
        assert_eq!(
            props.get("project.parent.version").map(String::as_str),
            Some("7.0")
        );
    }
}
