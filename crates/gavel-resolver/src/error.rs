use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, ResolveError>;

/// Errors produced while resolving a dependency graph.
///
/// Most conditions the resolver hits are recoverable and degrade to
/// "resolve what you can" — a partially resolved graph is more useful to a
/// scanner than none. The variants below surface where degradation was not
/// possible (the root descriptor) or carry context for the debug log.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse project descriptor: {source}")]
    Parse {
        #[source]
        source: gavel_pom::PomError,
    },

    #[error("failed to parse {path}: {source}")]
    ParseFile {
        path: PathBuf,
        #[source]
        source: gavel_pom::PomError,
    },

    #[error("{group_id}:{artifact_id}:{version} was not found in local or remote repositories")]
    NotFound {
        group_id: String,
        artifact_id: String,
        version: String,
    },

    #[error("version missing for {name}")]
    VersionMissing { name: String },

    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("offline mode, skipping remote repositories")]
    Offline,

    #[error("parent relativePath points at a different project ({path})")]
    WrongParent { path: PathBuf },

    #[error("module path escapes the project ({module})")]
    ModuleOutsideProject { module: String },

    #[error("parent lookup exhausted all strategies ({})", describe_attempts(attempts))]
    ParentNotFound { attempts: Vec<ResolveError> },
}

/// Join the aggregated per-strategy failures so the whole chain is visible
/// in one log line.
fn describe_attempts(attempts: &[ResolveError]) -> String {
    attempts
        .iter()
        .map(ResolveError::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
