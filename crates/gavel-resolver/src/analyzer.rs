use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gavel_pom::{DocDependency, DocParent, ProjectDoc};

use crate::artifact::{is_property_token, Artifact, Location, Version};
use crate::error::{ResolveError, Result};
use crate::properties::{evaluate, merged_properties};
use crate::resolver::Resolver;

/// Identity built-ins are recomputed per document; they must not leak from
/// a parent's property environment into the child's.
const BUILTIN_KEYS: [&str; 9] = [
    "groupId",
    "artifactId",
    "version",
    "project.groupId",
    "project.artifactId",
    "project.version",
    "project.parent.groupId",
    "project.parent.artifactId",
    "project.parent.version",
];

/// A descriptor in the resolver's hands: the parsed tree plus where it came
/// from. Remote descriptors have no path.
#[derive(Debug, Clone)]
pub(crate) struct Pom {
    pub(crate) file_path: Option<PathBuf>,
    pub(crate) doc: ProjectDoc,
}

impl Pom {
    pub(crate) fn artifact(&self) -> Artifact {
        let props = merged_properties(&self.doc);
        Artifact::new(
            self.doc.group_id.as_deref().unwrap_or_default(),
            self.doc.artifact_id.as_deref().unwrap_or_default(),
            self.doc.version.as_deref(),
            self.doc.licenses.clone(),
            &props,
        )
    }

    /// Inherit from the analyzed parent: fill missing identity fields and
    /// packaging, and lay the parent's properties under this document's.
    fn inherit(&mut self, parent: &AnalysisResult) {
        for (key, value) in &parent.properties {
            if BUILTIN_KEYS.contains(&key.as_str()) {
                continue;
            }
            self.doc
                .properties
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }

        let art = self.artifact().inherit(&parent.artifact);
        self.doc.group_id = Some(art.group_id).filter(|v| !v.is_empty());
        self.doc.artifact_id = Some(art.artifact_id).filter(|v| !v.is_empty());
        self.doc.version = Some(art.version.as_str().to_string()).filter(|v| !v.is_empty());
        self.doc.licenses = art.licenses;
        if self.doc.packaging.is_none() {
            self.doc.packaging = parent.packaging.clone();
        }
    }
}

/// The frozen outcome of analyzing one descriptor.
#[derive(Debug, Default)]
pub(crate) struct AnalysisResult {
    pub(crate) file_path: Option<PathBuf>,
    pub(crate) artifact: Artifact,
    pub(crate) packaging: Option<String>,
    /// Effective dependencies, child-before-parent, filtered and
    /// exclusion-merged.
    pub(crate) dependencies: Vec<Artifact>,
    /// Merged managed list in override order; imports are still unresolved
    /// here and are expanded by `resolve_dep_management` on demand.
    pub(crate) dependency_management: Vec<DocDependency>,
    pub(crate) properties: BTreeMap<String, String>,
    pub(crate) modules: Vec<String>,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct AnalysisOptions {
    /// Exclusion patterns inherited from the artifact that declared this
    /// subtree.
    pub(crate) exclusions: BTreeSet<String>,
    /// The root descriptor's resolved managed-dependency overlay.
    pub(crate) dep_management: Vec<DocDependency>,
    /// Record dependency declaration line spans (root descriptor only).
    pub(crate) line_numbers: bool,
}

impl Resolver {
    /// Resolve one artifact to its analysis, through the cache.
    pub(crate) fn resolve_artifact(
        &mut self,
        artifact: &Artifact,
        root_dep_management: &[DocDependency],
        visited: &mut HashSet<PathBuf>,
    ) -> Result<Arc<AnalysisResult>> {
        if let Some(result) = self.cache.get(artifact) {
            return Ok(result);
        }

        // Without a version there is nothing to fetch; keep the dependency
        // as declared and leave its subtree unexplored.
        if artifact.version.is_empty() {
            return Ok(Arc::new(AnalysisResult {
                artifact: artifact.clone(),
                ..AnalysisResult::default()
            }));
        }

        let pom = match self.try_repository(
            &artifact.group_id,
            &artifact.artifact_id,
            artifact.version.as_str(),
        ) {
            Ok(pom) => Some(pom),
            Err(err) => {
                tracing::debug!(
                    target = "gavel.analyzer",
                    artifact = %artifact,
                    error = %err,
                    "descriptor not found, keeping dependency as declared"
                );
                None
            }
        };

        let result = self.analyze(
            pom,
            AnalysisOptions {
                exclusions: artifact.exclusions.clone(),
                dep_management: root_dep_management.to_vec(),
                line_numbers: false,
            },
            visited,
        )?;

        let result = Arc::new(result);
        self.cache.put(artifact, Arc::clone(&result));
        Ok(result)
    }

    pub(crate) fn analyze(
        &mut self,
        pom: Option<Pom>,
        opts: AnalysisOptions,
        visited: &mut HashSet<PathBuf>,
    ) -> Result<AnalysisResult> {
        let Some(mut pom) = pom else {
            return Ok(AnalysisResult::default());
        };

        if let Some(path) = &pom.file_path {
            if !visited.insert(path.clone()) {
                tracing::debug!(
                    target = "gavel.analyzer",
                    path = %path.display(),
                    "descriptor already analyzed, breaking cycle"
                );
                return Ok(AnalysisResult::default());
            }
        }

        // Declared repositories go ahead of the configured ones for every
        // lookup from here on.
        let (doc_release, doc_snapshot) = pom.doc.repositories(&self.servers);
        self.release_repos = uniq_prepend(doc_release, &self.release_repos);
        self.snapshot_repos = uniq_prepend(doc_snapshot, &self.snapshot_repos);

        // The parent's dependencies can be versioned by managed entries from
        // this descriptor or from the root; the root's take precedence.
        let overlay_for_parent = merge_managed(vec![
            opts.dep_management.clone(),
            pom.doc.dependency_management.clone(),
        ]);

        let parent = self.parse_parent(
            pom.file_path.as_deref(),
            pom.doc.parent.clone(),
            overlay_for_parent,
            visited,
        )?;

        pom.inherit(&parent);

        let props = merged_properties(&pom.doc);

        // Managed entries: this descriptor's first, then the parent's.
        let dep_management = merge_managed(vec![
            pom.doc.dependency_management.clone(),
            parent.dependency_management.clone(),
        ]);

        let deps = self.parse_dependencies(&pom.doc.dependencies, &props, &dep_management, &opts, visited);
        let deps = merge_dependencies(parent.dependencies.clone(), deps, &opts.exclusions);

        Ok(AnalysisResult {
            file_path: pom.file_path.clone(),
            artifact: pom.artifact(),
            packaging: pom.doc.packaging.clone(),
            dependencies: deps,
            dependency_management: dep_management,
            properties: props,
            modules: pom.doc.modules.clone(),
        })
    }

    fn parse_dependencies(
        &mut self,
        deps: &[DocDependency],
        props: &BTreeMap<String, String>,
        dep_management: &[DocDependency],
        opts: &AnalysisOptions,
        visited: &mut HashSet<PathBuf>,
    ) -> Vec<Artifact> {
        // Imported BOMs often have no dependencies of their own, so managed
        // entries don't need expanding for them.
        if deps.is_empty() {
            return Vec::new();
        }

        let dep_management = self.resolve_dep_management(props, dep_management.to_vec(), visited);

        deps.iter()
            .filter_map(|dep| {
                let dep = resolve_dependency(dep, props, &dep_management, &opts.dep_management);

                let scope = dep.scope.as_deref().unwrap_or_default();
                if (!scope.is_empty() && scope != "compile" && scope != "runtime") || dep.optional {
                    return None;
                }

                Some(to_artifact(&dep, opts))
            })
            .collect()
    }

    /// Expand a managed list: literal entries are interpolated in place;
    /// `import`-scoped entries are fetched and their managed lists merged in
    /// — after every literal entry, so a literal declaration overrides a
    /// BOM-contributed one regardless of document position.
    pub(crate) fn resolve_dep_management(
        &mut self,
        props: &BTreeMap<String, String>,
        dep_management: Vec<DocDependency>,
        visited: &mut HashSet<PathBuf>,
    ) -> Vec<DocDependency> {
        let mut resolved = Vec::new();
        let mut imports = Vec::new();

        for dep in dep_management {
            if dep.scope.as_deref() == Some("import") {
                imports.push(dep);
            } else {
                resolved.push(resolve_dependency(&dep, props, &[], &[]));
            }
        }

        for import in imports {
            let bom = Artifact::new(
                &import.group_id,
                &import.artifact_id,
                import.version.as_deref(),
                Vec::new(),
                props,
            );
            let result = match self.resolve_artifact(&bom, &[], visited) {
                Ok(result) => result,
                Err(err) => {
                    tracing::debug!(
                        target = "gavel.analyzer",
                        bom = %bom,
                        error = %err,
                        "skipping unresolvable import"
                    );
                    continue;
                }
            };

            // BOM-managed entries are interpolated in the BOM's own
            // property environment, which can nest further imports.
            let mut bom_props = props.clone();
            bom_props.extend(result.properties.clone());
            let bom_managed = self.resolve_dep_management(
                &bom_props,
                result.dependency_management.clone(),
                visited,
            );

            resolved = merge_managed(vec![resolved, bom_managed]);
        }

        resolved
    }

    fn parse_parent(
        &mut self,
        current_path: Option<&Path>,
        parent: Option<DocParent>,
        root_dep_management: Vec<DocDependency>,
        visited: &mut HashSet<PathBuf>,
    ) -> Result<Arc<AnalysisResult>> {
        let Some(parent) = parent else {
            return Ok(Arc::new(AnalysisResult::default()));
        };

        // Variables in <parent> are not evaluated; the parent document is
        // what defines them.
        let no_props = BTreeMap::new();
        let target = Artifact::new(
            parent.group_id.as_deref().unwrap_or_default(),
            parent.artifact_id.as_deref().unwrap_or_default(),
            parent.version.as_deref(),
            Vec::new(),
            &no_props,
        );

        // A property version (e.g. ${revision}) still requires loading the
        // parent document to find its value.
        if target.is_empty() && !is_property_token(parent.version.as_deref().unwrap_or_default()) {
            return Ok(Arc::new(AnalysisResult::default()));
        }

        if let Some(result) = self.cache.get(&target) {
            return Ok(result);
        }

        let result = match self.retrieve_parent(
            current_path,
            &parent,
            &target,
            root_dep_management,
            visited,
        ) {
            Ok(result) => result,
            Err(err) => {
                tracing::debug!(
                    target = "gavel.analyzer",
                    artifact = %target,
                    error = %err,
                    "parent descriptor not found"
                );
                AnalysisResult::default()
            }
        };

        let result = Arc::new(result);
        self.cache.put(&target, Arc::clone(&result));
        Ok(result)
    }

    /// Try each parent-retrieval strategy in order: the declared
    /// relativePath, the conventional `../pom.xml`, then the repositories.
    /// Failures are aggregated and surfaced only when every strategy loses.
    fn retrieve_parent(
        &mut self,
        current_path: Option<&Path>,
        parent: &DocParent,
        target: &Artifact,
        root_dep_management: Vec<DocDependency>,
        visited: &mut HashSet<PathBuf>,
    ) -> Result<AnalysisResult> {
        let mut attempts = Vec::new();

        if let Some(current) = current_path {
            let relative = parent
                .relative_path
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty());

            if let Some(relative) = relative {
                match self.try_relative_path(target, current, relative, &root_dep_management, visited)
                {
                    Ok(result) => return Ok(result),
                    Err(err) => attempts.push(err),
                }
            }

            match self.try_relative_path(target, current, "../pom.xml", &root_dep_management, visited)
            {
                Ok(result) => return Ok(result),
                Err(err) => attempts.push(err),
            }
        }

        match self.try_repository(&target.group_id, &target.artifact_id, target.version.as_str()) {
            Ok(pom) => {
                return self.analyze(
                    Some(pom),
                    AnalysisOptions {
                        dep_management: root_dep_management,
                        ..AnalysisOptions::default()
                    },
                    visited,
                );
            }
            Err(err) => attempts.push(err),
        }

        Err(ResolveError::ParentNotFound { attempts })
    }

    fn try_relative_path(
        &mut self,
        target: &Artifact,
        current_path: &Path,
        relative: &str,
        root_dep_management: &[DocDependency],
        visited: &mut HashSet<PathBuf>,
    ) -> Result<AnalysisResult> {
        let pom = self.open_relative_pom(current_path, relative)?;
        let path = pom.file_path.clone().unwrap_or_default();

        // A mis-pointed relativePath must not win. GroupId and version can
        // be inherited or property-valued, so only the artifactId can be
        // checked before analysis.
        if pom.doc.artifact_id.as_deref() != Some(target.artifact_id.as_str()) {
            return Err(ResolveError::WrongParent { path });
        }

        let result = self.analyze(
            Some(pom),
            AnalysisOptions {
                dep_management: root_dep_management.to_vec(),
                ..AnalysisOptions::default()
            },
            visited,
        )?;

        let matches = result.artifact.group_id == target.group_id
            && result.artifact.artifact_id == target.artifact_id
            && (is_property_token(target.version.as_str())
                || result.artifact.version == target.version);
        if !matches {
            return Err(ResolveError::WrongParent { path });
        }

        Ok(result)
    }
}

/// Interpolate a dependency and apply the managed overlays.
///
/// Managed entries only fill fields the declaration leaves empty — a
/// declared version or scope is never overridden. Each missing field is
/// filled independently, consulting the merged child/parent management
/// list before falling back to the root descriptor's overlay.
fn resolve_dependency(
    dep: &DocDependency,
    props: &BTreeMap<String, String>,
    dep_management: &[DocDependency],
    root_dep_management: &[DocDependency],
) -> DocDependency {
    let mut out = DocDependency {
        group_id: evaluate(&dep.group_id, props),
        artifact_id: evaluate(&dep.artifact_id, props),
        version: dep.version.as_deref().map(|v| evaluate(v, props)),
        scope: dep.scope.as_deref().map(|s| evaluate(s, props)),
        optional: dep.optional,
        exclusions: dep.exclusions.clone(),
        lines: dep.lines,
    };

    let name = out.name();
    let managed = find_managed(&name, dep_management);
    let root_managed = find_managed(&name, root_dep_management);

    if out.version.as_deref().unwrap_or_default().is_empty() {
        let filled = managed
            .and_then(|m| m.version.as_deref())
            .filter(|v| !v.is_empty())
            .or_else(|| {
                root_managed
                    .and_then(|m| m.version.as_deref())
                    .filter(|v| !v.is_empty())
            });
        if let Some(version) = filled {
            out.version = Some(evaluate(version, props));
        }
    }

    if out.scope.as_deref().unwrap_or_default().is_empty() {
        let filled = managed
            .and_then(|m| m.scope.as_deref())
            .filter(|s| !s.is_empty())
            .or_else(|| {
                root_managed
                    .and_then(|m| m.scope.as_deref())
                    .filter(|s| !s.is_empty())
            });
        if let Some(scope) = filled {
            out.scope = Some(evaluate(scope, props));
        }
    }

    if !out.optional {
        out.optional = managed
            .map(|m| m.optional)
            .unwrap_or_else(|| root_managed.is_some_and(|m| m.optional));
    }

    if out.exclusions.is_empty() {
        let filled = managed
            .map(|m| &m.exclusions)
            .filter(|e| !e.is_empty())
            .or_else(|| root_managed.map(|m| &m.exclusions).filter(|e| !e.is_empty()));
        if let Some(exclusions) = filled {
            out.exclusions = exclusions.clone();
        }
    }

    out
}

fn find_managed<'a>(name: &str, dep_management: &'a [DocDependency]) -> Option<&'a DocDependency> {
    dep_management.iter().find(|dep| dep.name() == name)
}

fn to_artifact(dep: &DocDependency, opts: &AnalysisOptions) -> Artifact {
    let mut exclusions = opts.exclusions.clone();
    exclusions.extend(dep.exclusions.iter().cloned());

    let locations = if opts.line_numbers {
        dep.lines
            .map(|lines| Location {
                start_line: lines.start,
                end_line: lines.end,
            })
            .into_iter()
            .collect()
    } else {
        Vec::new()
    };

    Artifact {
        group_id: dep.group_id.clone(),
        artifact_id: dep.artifact_id.clone(),
        version: Version::new(dep.version.clone().unwrap_or_default()),
        exclusions,
        locations,
        ..Artifact::default()
    }
}

/// Child dependencies first, parent dependencies after, deduplicated by
/// name and filtered through the inherited exclusions.
fn merge_dependencies(
    parent: Vec<Artifact>,
    child: Vec<Artifact>,
    exclusions: &BTreeSet<String>,
) -> Vec<Artifact> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for dep in child.into_iter().chain(parent) {
        if excluded(exclusions, &dep) {
            continue;
        }
        if seen.insert(dep.name()) {
            out.push(dep);
        }
    }

    out
}

/// Whether an artifact matches any `group:artifact` exclusion pattern;
/// either side may be `*`.
pub(crate) fn excluded(exclusions: &BTreeSet<String>, artifact: &Artifact) -> bool {
    exclusions.iter().any(|pattern| match pattern.split_once(':') {
        Some((group, name)) => {
            (group == artifact.group_id || group == "*")
                && (name == artifact.artifact_id || name == "*")
        }
        None => false,
    })
}

/// Concatenate managed lists, deduplicating by name with earlier entries
/// winning.
pub(crate) fn merge_managed(lists: Vec<Vec<DocDependency>>) -> Vec<DocDependency> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for dep in lists.into_iter().flatten() {
        if seen.insert(dep.name()) {
            out.push(dep);
        }
    }

    out
}

fn uniq_prepend(new: Vec<String>, existing: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    new.into_iter()
        .chain(existing.iter().cloned())
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn art(group_id: &str, artifact_id: &str) -> Artifact {
        Artifact {
            group_id: group_id.to_string(),
            artifact_id: artifact_id.to_string(),
            ..Artifact::default()
        }
    }

    fn patterns(patterns: &[&str]) -> BTreeSet<String> {
        patterns.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn exclusion_wildcards() {
        let target = art("com.example", "lib");

        assert!(excluded(&patterns(&["com.example:lib"]), &target));
        assert!(excluded(&patterns(&["*:lib"]), &target));
        assert!(excluded(&patterns(&["com.example:*"]), &target));
        assert!(excluded(&patterns(&["*:*"]), &target));

        assert!(!excluded(&patterns(&["com.example:other"]), &target));
        assert!(!excluded(&patterns(&["other:*"]), &target));
        assert!(!excluded(&patterns(&[]), &target));
        // A pattern without a separator can never match.
        assert!(!excluded(&patterns(&["com.example"]), &target));
    }

    #[test]
    fn merge_managed_earlier_entries_win() {
        let child = vec![DocDependency {
            group_id: "g".to_string(),
            artifact_id: "a".to_string(),
            version: Some("1.0".to_string()),
            ..DocDependency::default()
        }];
        let parent = vec![
            DocDependency {
                group_id: "g".to_string(),
                artifact_id: "a".to_string(),
                version: Some("9.9".to_string()),
                ..DocDependency::default()
            },
            DocDependency {
                group_id: "g".to_string(),
                artifact_id: "b".to_string(),
                version: Some("2.0".to_string()),
                ..DocDependency::default()
            },
        ];

        let merged = merge_managed(vec![child, parent]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].version.as_deref(), Some("1.0"));
        assert_eq!(merged[1].name(), "g:b");
    }

    #[test]
    fn merge_dependencies_prefers_child_and_filters_exclusions() {
        let parent = vec![art("g", "a"), art("g", "excluded")];
        let mut child_a = art("g", "a");
        child_a.version = Version::new("child");
        let child = vec![child_a, art("g", "b")];

        let merged = merge_dependencies(parent, child, &patterns(&["g:excluded"]));
        let names: Vec<String> = merged.iter().map(Artifact::name).collect();
        assert_eq!(names, vec!["g:a".to_string(), "g:b".to_string()]);
        assert_eq!(merged[0].version.as_str(), "child");
    }

    #[test]
    fn declared_version_survives_a_root_managed_entry() {
        let dep = DocDependency {
            group_id: "g".to_string(),
            artifact_id: "a".to_string(),
            version: Some("1.0".to_string()),
            ..DocDependency::default()
        };
        let root_overlay = vec![DocDependency {
            group_id: "g".to_string(),
            artifact_id: "a".to_string(),
            version: Some("2.0".to_string()),
            ..DocDependency::default()
        }];

        let props = BTreeMap::new();
        let resolved = resolve_dependency(&dep, &props, &[], &root_overlay);
        assert_eq!(resolved.version.as_deref(), Some("1.0"));
    }

    #[test]
    fn managed_list_wins_over_root_overlay_when_filling() {
        let dep = DocDependency {
            group_id: "g".to_string(),
            artifact_id: "a".to_string(),
            ..DocDependency::default()
        };
        let managed = vec![DocDependency {
            group_id: "g".to_string(),
            artifact_id: "a".to_string(),
            version: Some("3.0".to_string()),
            ..DocDependency::default()
        }];
        let root_overlay = vec![DocDependency {
            group_id: "g".to_string(),
            artifact_id: "a".to_string(),
            version: Some("2.0".to_string()),
            ..DocDependency::default()
        }];

        let props = BTreeMap::new();
        let resolved = resolve_dependency(&dep, &props, &managed, &root_overlay);
        assert_eq!(resolved.version.as_deref(), Some("3.0"));
    }

    #[test]
    fn missing_fields_fill_independently_across_levels() {
        // The root entry manages only the scope; the version still comes
        // from the child-level managed entry.
        let dep = DocDependency {
            group_id: "g".to_string(),
            artifact_id: "a".to_string(),
            ..DocDependency::default()
        };
        let managed = vec![DocDependency {
            group_id: "g".to_string(),
            artifact_id: "a".to_string(),
            version: Some("3.0".to_string()),
            ..DocDependency::default()
        }];
        let root_overlay = vec![DocDependency {
            group_id: "g".to_string(),
            artifact_id: "a".to_string(),
            scope: Some("runtime".to_string()),
            ..DocDependency::default()
        }];

        let props = BTreeMap::new();
        let resolved = resolve_dependency(&dep, &props, &managed, &root_overlay);
        assert_eq!(resolved.version.as_deref(), Some("3.0"));
        assert_eq!(resolved.scope.as_deref(), Some("runtime"));
    }

    #[test]
    fn managed_list_only_fills_missing_fields() {
        let dep = DocDependency {
            group_id: "g".to_string(),
            artifact_id: "a".to_string(),
            version: Some("1.0".to_string()),
            ..DocDependency::default()
        };
        let managed = vec![DocDependency {
            group_id: "g".to_string(),
            artifact_id: "a".to_string(),
            version: Some("2.0".to_string()),
            scope: Some("runtime".to_string()),
            ..DocDependency::default()
        }];

        let props = BTreeMap::new();
        let resolved = resolve_dependency(&dep, &props, &managed, &[]);
        // Declared version sticks; missing scope is filled.
        assert_eq!(resolved.version.as_deref(), Some("1.0"));
        assert_eq!(resolved.scope.as_deref(), Some("runtime"));
    }

    #[test]
    fn dependency_interpolation_uses_properties() {
        let dep = DocDependency {
            group_id: "${lib.group}".to_string(),
            artifact_id: "a".to_string(),
            version: Some("${lib.version}".to_string()),
            ..DocDependency::default()
        };

        let mut props = BTreeMap::new();
        props.insert("lib.group".to_string(), "com.example".to_string());
        props.insert("lib.version".to_string(), "3.0".to_string());

        let resolved = resolve_dependency(&dep, &props, &[], &[]);
        assert_eq!(resolved.name(), "com.example:a");
        assert_eq!(resolved.version.as_deref(), Some("3.0"));
    }

    #[test]
    fn uniq_prepend_puts_new_urls_first() {
        let existing = vec!["https://central".to_string()];
        let merged = uniq_prepend(
            vec!["https://corp".to_string(), "https://central".to_string()],
            &existing,
        );
        assert_eq!(
            merged,
            vec!["https://corp".to_string(), "https://central".to_string()]
        );
    }
}
