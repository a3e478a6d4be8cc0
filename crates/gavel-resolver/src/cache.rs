use std::collections::HashMap;
use std::sync::Arc;

use crate::analyzer::AnalysisResult;
use crate::artifact::Artifact;

/// Resolution cache: one frozen analysis per (name, version).
///
/// A descriptor is analyzed at most once; later lookups share the first
/// result. This both short-circuits re-analysis and breaks cycles through
/// repository-sourced descriptors.
#[derive(Debug, Default)]
pub(crate) struct PomCache {
    inner: HashMap<(String, String), Arc<AnalysisResult>>,
}

impl PomCache {
    /// Callers look up before analyzing, so a put normally writes each key
    /// once. The exception is a descriptor first seen through a broken
    /// parent cycle: its placeholder result is replaced by the real
    /// analysis, so the last write wins.
    pub(crate) fn put(&mut self, artifact: &Artifact, result: Arc<AnalysisResult>) {
        self.inner.insert(key(artifact), result);
    }

    pub(crate) fn get(&self, artifact: &Artifact) -> Option<Arc<AnalysisResult>> {
        self.inner.get(&key(artifact)).cloned()
    }
}

fn key(artifact: &Artifact) -> (String, String) {
    (artifact.name(), artifact.version.as_str().to_string())
}
