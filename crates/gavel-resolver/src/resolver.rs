use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gavel_pom::{home_dir, parse_project_doc, DocDependency, Server, Settings};

use crate::analyzer::{AnalysisOptions, Pom};
use crate::artifact::{package_id, Artifact, Dependency, Package, Relationship};
use crate::cache::PomCache;
use crate::error::{ResolveError, Result};
use crate::http_cache::HttpCache;

/// Maven central, used for release lookups unless the configuration already
/// names it.
pub const DEFAULT_CENTRAL_URL: &str = "https://repo.maven.apache.org/maven2/";

const CENTRAL_URL_ENV: &str = "MAVEN_CENTRAL_URL";

/// Resolver configuration. The defaults resolve online against Maven
/// central with no response cache.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Skip all remote HTTP; artifacts missing locally keep an empty
    /// version and their subtrees stay unexplored.
    pub offline: bool,
    /// Ordered remote repositories for non-SNAPSHOT lookups. The central
    /// URL is appended when absent.
    pub release_repos: Vec<String>,
    /// Ordered remote repositories for SNAPSHOT lookups.
    pub snapshot_repos: Vec<String>,
    /// Local repository root; defaults to the settings value, then
    /// `~/.m2/repository`.
    pub local_repository: Option<PathBuf>,
    /// User settings; loaded from `~/.m2/settings.xml` when unset.
    pub settings: Option<Settings>,
    /// Persist 200/404 responses (and the host blocklist) on disk.
    pub use_http_cache: bool,
    /// Response cache directory; defaults under the user cache dir.
    pub http_cache_dir: Option<PathBuf>,
    /// Response cache staleness bound, in hours.
    pub http_cache_ttl_hours: u64,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        ResolveOptions {
            offline: false,
            release_repos: Vec::new(),
            snapshot_repos: Vec::new(),
            local_repository: None,
            settings: None,
            use_http_cache: false,
            http_cache_dir: None,
            http_cache_ttl_hours: 720,
        }
    }
}

/// Resolves the compile/runtime dependency closure of a Maven project into
/// flat package and dependency-edge lists.
///
/// The resolver runs on one logical flow: repository fetches are sequential
/// and block the traversal, which keeps Maven's order-sensitive rules
/// (nearest-wins, root management overlays, import timing) straightforward.
/// A resolver instance owns its caches and is not meant to be shared.
#[derive(Debug)]
pub struct Resolver {
    root_path: PathBuf,
    pub(crate) cache: PomCache,
    pub(crate) http_cache: Option<HttpCache>,
    pub(crate) agent: ureq::Agent,
    pub(crate) local_repository: PathBuf,
    pub(crate) release_repos: Vec<String>,
    pub(crate) snapshot_repos: Vec<String>,
    pub(crate) offline: bool,
    pub(crate) servers: Vec<Server>,
}

impl Resolver {
    pub fn new(root_path: impl Into<PathBuf>, options: ResolveOptions) -> Resolver {
        let settings = options.settings.unwrap_or_else(Settings::load);

        let local_repository = options
            .local_repository
            .or_else(|| settings.local_repository.clone())
            .or_else(|| home_dir().map(|home| home.join(".m2").join("repository")))
            .unwrap_or_else(|| PathBuf::from(".m2/repository"));

        let mut release_repos = options.release_repos;
        if let Ok(central) = std::env::var(CENTRAL_URL_ENV) {
            if !central.is_empty() && !release_repos.contains(&central) {
                release_repos.push(central);
            }
        }
        let default_central = DEFAULT_CENTRAL_URL.to_string();
        if !release_repos.contains(&default_central) {
            release_repos.push(default_central);
        }

        tracing::debug!(
            target = "gavel.resolver",
            release_repos = %release_repos.join(", "),
            "creating resolver"
        );

        let http_cache = if options.use_http_cache {
            let dir = options
                .http_cache_dir
                .or_else(default_http_cache_dir)
                .unwrap_or_else(|| PathBuf::from(".gavel/http-cache"));
            let ttl = Duration::from_secs(options.http_cache_ttl_hours * 60 * 60);
            match HttpCache::open(&dir, ttl) {
                Ok(cache) => Some(cache),
                Err(err) => {
                    tracing::warn!(
                        target = "gavel.resolver",
                        dir = %dir.display(),
                        error = %err,
                        "response cache unavailable, continuing without it"
                    );
                    None
                }
            }
        } else {
            None
        };

        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(30))
            .build();

        Resolver {
            root_path: root_path.into(),
            cache: PomCache::default(),
            http_cache,
            agent,
            local_repository,
            release_repos,
            snapshot_repos: options.snapshot_repos,
            offline: options.offline,
            servers: settings.servers,
        }
    }

    /// Resolve the project whose root descriptor `reader` produces.
    ///
    /// Returns the flat package list and the direct-dependency edges
    /// between them. Only a parse failure of the root descriptor is fatal;
    /// everything else degrades to a partial graph.
    pub fn resolve(&mut self, mut reader: impl Read) -> Result<(Vec<Package>, Vec<Dependency>)> {
        let mut contents = String::new();
        reader
            .read_to_string(&mut contents)
            .map_err(|source| ResolveError::Io {
                path: self.root_path.clone(),
                source,
            })?;
        let doc = parse_project_doc(&contents).map_err(|source| ResolveError::Parse { source })?;

        let root = Pom {
            file_path: Some(self.root_path.clone()),
            doc,
        };

        let mut visited = HashSet::new();
        let result = self.analyze(
            Some(root),
            AnalysisOptions {
                line_numbers: true,
                ..AnalysisOptions::default()
            },
            &mut visited,
        )?;

        let root_artifact = result.artifact.clone();
        self.cache.put(&root_artifact, Arc::new(result));

        let mut unique_modules = HashSet::new();
        let output = self.parse_root(root_artifact, &mut unique_modules, &mut visited)?;

        if let Some(cache) = &self.http_cache {
            if let Err(err) = cache.flush() {
                tracing::debug!(
                    target = "gavel.resolver",
                    error = %err,
                    "failed to flush response cache"
                );
            }
        }

        Ok(output)
    }

    /// Breadth-first traversal from one root. Modules recurse here with a
    /// fresh edge map but shared module/path bookkeeping, so each module
    /// subtree keeps its own uniqueness namespace.
    fn parse_root(
        &mut self,
        mut root: Artifact,
        unique_modules: &mut HashSet<String>,
        visited: &mut HashSet<PathBuf>,
    ) -> Result<(Vec<Package>, Vec<Dependency>)> {
        root.relationship = Relationship::Root;
        root.module = false;

        let mut queue = VecDeque::new();
        queue.push_back(root);

        let mut packages = Vec::new();
        let mut edges = Vec::new();
        let mut root_dep_management: Vec<DocDependency> = Vec::new();
        let mut unique_artifacts: HashMap<String, Artifact> = HashMap::new();
        let mut unique_deps: HashMap<String, Vec<String>> = HashMap::new();

        while let Some(mut artifact) = queue.pop_front() {
            // Modules get independent resolution so a multi-module build
            // may hold duplicate dependencies across modules, never within.
            if artifact.module {
                if !unique_modules.insert(artifact.to_string()) {
                    continue;
                }

                let (module_packages, module_edges) =
                    self.parse_root(artifact, unique_modules, visited)?;
                packages.extend(module_packages);
                edges.extend(module_edges);
                continue;
            }

            if let Some(existing) = unique_artifacts.get(&artifact.name()) {
                if !existing.version.should_override(&artifact.version) {
                    continue;
                }
                // A hard requirement replaces the version, but the nearer
                // entry's relationship and recorded locations carry over.
                if matches!(
                    existing.relationship,
                    Relationship::Root | Relationship::Direct
                ) {
                    artifact.relationship = existing.relationship;
                }
                if !existing.locations.is_empty() {
                    artifact.locations = existing.locations.clone();
                }
            }

            let result = self.resolve_artifact(&artifact, &root_dep_management, visited)?;

            let mut dependencies = result.dependencies.clone();
            if artifact.relationship == Relationship::Root {
                // Managed entries in the root descriptor steer transitive
                // resolution for the whole subtree.
                root_dep_management = self.resolve_dep_management(
                    &result.properties,
                    result.dependency_management.clone(),
                    visited,
                );

                for dep in &mut dependencies {
                    dep.relationship = Relationship::Direct;
                }
            }

            for relative in &result.modules {
                match self.parse_module(result.file_path.as_deref(), relative, visited) {
                    Ok(module) => queue.push_back(module),
                    Err(err) => {
                        tracing::debug!(
                            target = "gavel.resolver",
                            module = %relative,
                            error = %err,
                            "unable to load module"
                        );
                    }
                }
            }

            queue.extend(dependencies.iter().cloned());

            // Offline mode may leave fields unresolved; those artifacts are
            // kept in the queue's bookkeeping but never emitted.
            if !artifact.is_empty() {
                unique_deps.insert(
                    package_id(&artifact.name(), artifact.version.as_str()),
                    dependencies.iter().map(Artifact::name).collect(),
                );
                unique_artifacts.insert(
                    artifact.name(),
                    Artifact {
                        licenses: result.artifact.licenses.clone(),
                        module: false,
                        exclusions: Default::default(),
                        ..artifact
                    },
                );
            }
        }

        // Materialize records. Edge targets resolve to the winning version
        // of each name; targets that never resolved are dropped.
        for (name, artifact) in &unique_artifacts {
            let id = package_id(name, artifact.version.as_str());

            let mut depends_on: Vec<String> = unique_deps
                .get(&id)
                .into_iter()
                .flatten()
                .filter_map(|dep_name| {
                    let version = &unique_artifacts.get(dep_name)?.version;
                    (!version.is_empty()).then(|| package_id(dep_name, version.as_str()))
                })
                .collect();
            depends_on.sort();

            packages.push(Package {
                id: id.clone(),
                name: name.clone(),
                version: artifact.version.to_string(),
                licenses: artifact.licenses.clone(),
                relationship: artifact.relationship,
                locations: artifact.locations.clone(),
            });

            if !depends_on.is_empty() {
                edges.push(Dependency { id, depends_on });
            }
        }

        packages.sort();
        edges.sort();

        Ok((packages, edges))
    }

    fn parse_module(
        &mut self,
        current_path: Option<&Path>,
        relative: &str,
        visited: &mut HashSet<PathBuf>,
    ) -> Result<Artifact> {
        let Some(current) = current_path else {
            return Err(ResolveError::ModuleOutsideProject {
                module: relative.to_string(),
            });
        };

        let pom = self.open_relative_pom(current, relative)?;
        let result = self.analyze(Some(pom), AnalysisOptions::default(), visited)?;

        let mut module_artifact = result.artifact.clone();
        module_artifact.module = true;

        self.cache.put(&module_artifact, Arc::new(result));
        Ok(module_artifact)
    }
}

fn default_http_cache_dir() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| home_dir().map(|home| home.join(".cache")))?;
    Some(base.join("gavel").join("http"))
}
