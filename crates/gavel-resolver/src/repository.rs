use std::io::Read;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use gavel_pom::{parse_project_doc, parse_snapshot_metadata};
use url::Url;

use crate::analyzer::Pom;
use crate::error::{ResolveError, Result};
use crate::http_cache::MAX_DOMAIN_TIMEOUTS;
use crate::resolver::Resolver;

/// Read at most this much of a remote response body.
const BODY_LIMIT_BYTES: u64 = 16 * 1024 * 1024;

impl Resolver {
    /// Locate a descriptor by coordinate: local repository layout first,
    /// then the ordered remote repositories.
    pub(crate) fn try_repository(
        &mut self,
        group_id: &str,
        artifact_id: &str,
        version: &str,
    ) -> Result<Pom> {
        if version.is_empty() {
            return Err(ResolveError::VersionMissing {
                name: format!("{group_id}:{artifact_id}"),
            });
        }

        // e.g. com.fasterxml.jackson.core, jackson-annotations, 2.10.0
        //   => com/fasterxml/jackson/core/jackson-annotations/2.10.0/jackson-annotations-2.10.0.pom
        let mut paths: Vec<String> = group_id.split('.').map(str::to_string).collect();
        paths.push(artifact_id.to_string());
        paths.push(version.to_string());
        paths.push(format!("{artifact_id}-{version}.pom"));

        match self.load_from_local_repository(&paths) {
            Ok(pom) => return Ok(pom),
            Err(err) => {
                tracing::debug!(
                    target = "gavel.repository",
                    artifact = %format!("{group_id}:{artifact_id}:{version}"),
                    error = %err,
                    "not in local repository"
                );
            }
        }

        let snapshot = crate::artifact::Version::new(version).is_snapshot();
        match self.fetch_from_remote_repositories(&paths, snapshot)? {
            Some(pom) => Ok(pom),
            None => Err(ResolveError::NotFound {
                group_id: group_id.to_string(),
                artifact_id: artifact_id.to_string(),
                version: version.to_string(),
            }),
        }
    }

    fn load_from_local_repository(&self, paths: &[String]) -> Result<Pom> {
        let mut path = self.local_repository.clone();
        for segment in paths {
            path.push(segment);
        }
        self.open_pom(&path)
    }

    pub(crate) fn open_pom(&self, path: &Path) -> Result<Pom> {
        let contents = std::fs::read_to_string(path).map_err(|source| ResolveError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let doc = parse_project_doc(&contents).map_err(|source| ResolveError::ParseFile {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Pom {
            file_path: Some(path.to_path_buf()),
            doc,
        })
    }

    pub(crate) fn open_relative_pom(&self, current_path: &Path, relative: &str) -> Result<Pom> {
        // e.g. child/pom.xml + ../parent => parent/, then parent/pom.xml
        let dir = current_path.parent().unwrap_or(Path::new("."));
        let mut path = dir.join(relative);
        if path.is_dir() {
            path = path.join("pom.xml");
        }
        self.open_pom(&path)
    }

    /// Try each remote repository in order. `Ok(None)` means every
    /// repository missed; errors mean the lookup cannot proceed at all
    /// (offline mode, or a fetched document that fails to parse).
    fn fetch_from_remote_repositories(
        &mut self,
        paths: &[String],
        snapshot: bool,
    ) -> Result<Option<Pom>> {
        if self.offline {
            tracing::debug!(
                target = "gavel.repository",
                "skipping remote repositories in offline mode"
            );
            return Err(ResolveError::Offline);
        }

        // Maven only consults snapshot repositories for snapshot versions.
        let repos = if snapshot {
            self.snapshot_repos.clone()
        } else {
            self.release_repos.clone()
        };

        for repo in &repos {
            let mut repo_paths = paths.to_vec();
            if snapshot {
                // The concrete dated filename comes from maven-metadata.xml.
                if let Some(file_name) = self.fetch_pom_file_name_from_metadata(repo, paths)? {
                    if let Some(last) = repo_paths.last_mut() {
                        *last = file_name;
                    }
                }
            }

            if let Some(pom) = self.fetch_pom_from_remote_repository(repo, &repo_paths)? {
                return Ok(Some(pom));
            }
        }

        Ok(None)
    }

    /// Fetch `maven-metadata.xml` next to the artifact and pick the dated
    /// POM filename it names, if any.
    fn fetch_pom_file_name_from_metadata(
        &mut self,
        repo: &str,
        paths: &[String],
    ) -> Result<Option<String>> {
        let mut metadata_paths = paths.to_vec();
        if let Some(last) = metadata_paths.last_mut() {
            *last = "maven-metadata.xml".to_string();
        }

        let Some(request) = self.remote_repo_request(repo, &metadata_paths) else {
            return Ok(None);
        };

        let (body, status) = match self.cached_http_request(&request, &metadata_paths.join("/")) {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(
                    target = "gavel.repository",
                    url = %request.url,
                    error = %err,
                    "failed to fetch snapshot metadata"
                );
                return Ok(None);
            }
        };
        if status != 200 {
            tracing::debug!(
                target = "gavel.repository",
                url = %request.url,
                status,
                "no snapshot metadata"
            );
            return Ok(None);
        }

        let text = String::from_utf8_lossy(&body);
        let metadata =
            parse_snapshot_metadata(&text).map_err(|source| ResolveError::Parse { source })?;

        // paths[len - 3] is always the artifactId.
        let artifact_id = &paths[paths.len() - 3];
        Ok(metadata
            .pom_snapshot_value()
            .map(|value| format!("{artifact_id}-{value}.pom")))
    }

    fn fetch_pom_from_remote_repository(
        &mut self,
        repo: &str,
        paths: &[String],
    ) -> Result<Option<Pom>> {
        let Some(request) = self.remote_repo_request(repo, paths) else {
            return Ok(None);
        };

        let (body, status) = match self.cached_http_request(&request, &paths.join("/")) {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(
                    target = "gavel.repository",
                    url = %request.url,
                    error = %err,
                    "fetch failed"
                );
                return Ok(None);
            }
        };
        if status != 200 {
            tracing::debug!(
                target = "gavel.repository",
                url = %request.url,
                status,
                "fetch missed"
            );
            return Ok(None);
        }

        let text = String::from_utf8_lossy(&body);
        let doc = parse_project_doc(&text).map_err(|source| ResolveError::Parse { source })?;

        // Remote descriptors have no local path.
        Ok(Some(Pom {
            file_path: None,
            doc,
        }))
    }

    fn remote_repo_request(&self, repo: &str, paths: &[String]) -> Option<RemoteRequest> {
        let mut url = match Url::parse(repo) {
            Ok(url) => url,
            Err(err) => {
                tracing::debug!(
                    target = "gavel.repository",
                    repo,
                    error = %err,
                    "skipping repository with unparseable URL"
                );
                return None;
            }
        };

        let joined = format!("{}/{}", url.path().trim_end_matches('/'), paths.join("/"));
        url.set_path(&joined);

        // Userinfo becomes a basic-auth header rather than travelling in
        // the request line.
        let auth = if url.username().is_empty() {
            None
        } else {
            let auth = (
                url.username().to_string(),
                url.password().unwrap_or_default().to_string(),
            );
            let _ = url.set_username("");
            let _ = url.set_password(None);
            Some(auth)
        };

        Some(RemoteRequest { url, auth })
    }

    /// Perform a GET with the response cache and host blocklist applied.
    fn cached_http_request(
        &mut self,
        request: &RemoteRequest,
        cache_key: &str,
    ) -> Result<(Vec<u8>, u16)> {
        if let Some(cache) = &self.http_cache {
            if let Some((body, status)) = cache.get(cache_key) {
                tracing::debug!(target = "gavel.repository", url = %request.url, "cache hit");
                return Ok((body, status));
            }
        }

        let host = request.url.host_str().unwrap_or_default().to_string();
        if self
            .http_cache
            .as_ref()
            .is_some_and(|cache| cache.is_blocklisted(&host))
        {
            tracing::debug!(
                target = "gavel.repository",
                host = %host,
                "host is blocklisted, assuming 404"
            );
            return Ok((Vec::new(), 404));
        }

        match self.http_get(request) {
            Ok((body, status)) => {
                // Cache 200s and 404s; keep retrying anything else.
                if status == 200 || status == 404 {
                    if let Some(cache) = &mut self.http_cache {
                        if let Err(err) = cache.set(cache_key, &body, status) {
                            tracing::debug!(
                                target = "gavel.repository",
                                url = %request.url,
                                error = %err,
                                "failed to cache response"
                            );
                        }
                    }
                }
                Ok((body, status))
            }
            Err(failure) => {
                if failure.timeout {
                    if let Some(cache) = &mut self.http_cache {
                        let count = cache.record_timeout(&host);
                        if count >= MAX_DOMAIN_TIMEOUTS {
                            tracing::warn!(
                                target = "gavel.repository",
                                host = %host,
                                timeouts = count,
                                "blocklisting host after repeated timeouts"
                            );
                            if let Err(err) = cache.blocklist_host(&host) {
                                tracing::debug!(
                                    target = "gavel.repository",
                                    host = %host,
                                    error = %err,
                                    "failed to persist blocklist"
                                );
                            }
                        }
                    }
                }
                Err(ResolveError::Network {
                    url: request.url.to_string(),
                    message: failure.message,
                })
            }
        }
    }

    fn http_get(&self, request: &RemoteRequest) -> std::result::Result<(Vec<u8>, u16), HttpFailure> {
        let mut req = self.agent.request_url("GET", &request.url);
        if let Some((username, password)) = &request.auth {
            let token = BASE64.encode(format!("{username}:{password}"));
            req = req.set("Authorization", &format!("Basic {token}"));
        }

        match req.call() {
            Ok(response) => read_body(response),
            Err(ureq::Error::Status(status, _)) => Ok((Vec::new(), status)),
            Err(err) => Err(HttpFailure {
                timeout: is_timeout_error(&err),
                message: err.to_string(),
            }),
        }
    }
}

#[derive(Debug)]
struct RemoteRequest {
    url: Url,
    auth: Option<(String, String)>,
}

#[derive(Debug)]
struct HttpFailure {
    message: String,
    timeout: bool,
}

fn read_body(response: ureq::Response) -> std::result::Result<(Vec<u8>, u16), HttpFailure> {
    let status = response.status();
    let mut body = Vec::new();
    response
        .into_reader()
        .take(BODY_LIMIT_BYTES)
        .read_to_end(&mut body)
        .map_err(|err| HttpFailure {
            timeout: err.kind() == std::io::ErrorKind::TimedOut,
            message: err.to_string(),
        })?;
    Ok((body, status))
}

fn is_timeout_error(err: &ureq::Error) -> bool {
    matches!(err, ureq::Error::Transport(_)) && err.to_string().contains("timed out")
}
