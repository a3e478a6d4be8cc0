use std::path::PathBuf;

/// Errors produced while reading POM documents, repository metadata, and
/// Maven user settings.
#[derive(Debug, thiserror::Error)]
pub enum PomError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse XML: {source}")]
    Xml {
        #[source]
        source: roxmltree::Error,
    },
}
