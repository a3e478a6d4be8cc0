use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bincode::Options;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How many I/O timeouts a host gets before it is blocklisted.
pub(crate) const MAX_DOMAIN_TIMEOUTS: u32 = 3;

/// Hard upper bound for any cached payload we will deserialize from disk.
/// Cache corruption must degrade to a miss, not an enormous allocation.
const PAYLOAD_LIMIT_BYTES: usize = 16 * 1024 * 1024;

const STATE_FILE: &str = "state.json";

pub type Result<T> = std::result::Result<T, HttpCacheError>;

#[derive(Debug, thiserror::Error)]
pub enum HttpCacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
}

/// On-disk cache of remote repository responses, plus the per-host timeout
/// tally and blocklist that persist alongside it.
///
/// Only 200 and 404 responses are stored; anything else is re-fetched.
/// The cache is owned by a single resolver instance — there is no locking,
/// and concurrent writers are not supported.
#[derive(Debug)]
pub struct HttpCache {
    root: PathBuf,
    ttl: Duration,
    domain_timeouts: BTreeMap<String, u32>,
    blocklist: BTreeSet<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedResponse {
    status: u16,
    fetched_at_secs: u64,
    body: Vec<u8>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    domain_timeouts: BTreeMap<String, u32>,
    blocklist: BTreeSet<String>,
}

impl HttpCache {
    pub fn open(root: impl AsRef<Path>, ttl: Duration) -> Result<HttpCache> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;

        let state = match std::fs::read(root.join(STATE_FILE)) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                tracing::debug!(
                    target = "gavel.http_cache",
                    path = %root.join(STATE_FILE).display(),
                    error = %err,
                    "discarding unreadable cache state"
                );
                PersistedState::default()
            }),
            Err(_) => PersistedState::default(),
        };

        Ok(HttpCache {
            root,
            ttl,
            domain_timeouts: state.domain_timeouts,
            blocklist: state.blocklist,
        })
    }

    /// A cached (body, status) pair for the request path, if present and
    /// within the TTL.
    pub fn get(&self, key: &str) -> Option<(Vec<u8>, u16)> {
        let path = self.entry_path(key);
        let bytes = read_file_limited(&path)?;

        let entry: CachedResponse = match bincode_options_limited().deserialize(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(
                    target = "gavel.http_cache",
                    path = %path.display(),
                    error = %err,
                    "discarding corrupt cache entry"
                );
                return None;
            }
        };

        let age = now_secs().saturating_sub(entry.fetched_at_secs);
        if age >= self.ttl.as_secs() {
            return None;
        }

        Some((entry.body, entry.status))
    }

    pub fn set(&mut self, key: &str, body: &[u8], status: u16) -> Result<()> {
        if body.len() > PAYLOAD_LIMIT_BYTES {
            return Ok(());
        }

        let entry = CachedResponse {
            status,
            fetched_at_secs: now_secs(),
            body: body.to_vec(),
        };
        let bytes = bincode_options().serialize(&entry)?;
        atomic_write(&self.entry_path(key), &bytes)?;
        Ok(())
    }

    /// Count an I/O timeout against a host; returns the running tally.
    pub fn record_timeout(&mut self, host: &str) -> u32 {
        let count = self.domain_timeouts.entry(host.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn blocklist_host(&mut self, host: &str) -> Result<()> {
        self.blocklist.insert(host.to_string());
        self.flush()
    }

    pub fn is_blocklisted(&self, host: &str) -> bool {
        self.blocklist.contains(host)
    }

    /// Persist the timeout tally and blocklist next to the response files.
    pub fn flush(&self) -> Result<()> {
        let state = PersistedState {
            domain_timeouts: self.domain_timeouts.clone(),
            blocklist: self.blocklist.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&state).map_err(std::io::Error::other)?;
        atomic_write(&self.root.join(STATE_FILE), &bytes)?;
        Ok(())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.root.join(format!("{digest}.bin"))
    }
}

impl Drop for HttpCache {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            tracing::debug!(
                target = "gavel.http_cache",
                error = %err,
                "failed to flush cache state on drop"
            );
        }
    }
}

fn bincode_options() -> impl bincode::Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

fn bincode_options_limited() -> impl bincode::Options {
    bincode_options().with_limit(PAYLOAD_LIMIT_BYTES as u64 + 1024)
}

fn read_file_limited(path: &Path) -> Option<Vec<u8>> {
    let meta = std::fs::metadata(path).ok()?;
    if meta.len() > PAYLOAD_LIMIT_BYTES as u64 + 1024 {
        return None;
    }
    std::fs::read(path).ok()
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent)?;

    let (tmp_path, mut file) = tmp_file(parent)?;
    if let Err(err) = file.write_all(bytes).and_then(|()| file.sync_all()) {
        drop(file);
        let _ = std::fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    drop(file);

    if let Err(err) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}

fn tmp_file(parent: &Path) -> Result<(PathBuf, std::fs::File)> {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    loop {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = parent.join(format!(".tmp-{}-{n}", std::process::id()));
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(dir: &Path, ttl: Duration) -> HttpCache {
        HttpCache::open(dir, ttl).expect("open cache")
    }

    #[test]
    fn stores_and_returns_responses() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cache = open(dir.path(), Duration::from_secs(3600));

        cache.set("com/example/a/1.0/a-1.0.pom", b"<project/>", 200).expect("set");
        cache.set("com/example/b/1.0/b-1.0.pom", b"", 404).expect("set");

        assert_eq!(
            cache.get("com/example/a/1.0/a-1.0.pom"),
            Some((b"<project/>".to_vec(), 200))
        );
        assert_eq!(cache.get("com/example/b/1.0/b-1.0.pom"), Some((Vec::new(), 404)));
        assert_eq!(cache.get("com/example/c/1.0/c-1.0.pom"), None);
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cache = open(dir.path(), Duration::ZERO);

        cache.set("key", b"body", 200).expect("set");
        assert_eq!(cache.get("key"), None);
    }

    #[test]
    fn corrupt_entries_are_misses() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cache = open(dir.path(), Duration::from_secs(3600));

        cache.set("key", b"body", 200).expect("set");
        let entry = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .find(|e| e.path().extension().is_some_and(|ext| ext == "bin"))
            .expect("entry file");
        std::fs::write(entry.path(), b"garbage").expect("corrupt entry");

        assert_eq!(cache.get("key"), None);
    }

    #[test]
    fn timeouts_accumulate_and_blocklist_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let mut cache = open(dir.path(), Duration::from_secs(3600));
            assert_eq!(cache.record_timeout("slow.example"), 1);
            assert_eq!(cache.record_timeout("slow.example"), 2);
            assert_eq!(cache.record_timeout("slow.example"), MAX_DOMAIN_TIMEOUTS);
            cache.blocklist_host("slow.example").expect("blocklist");
            assert!(cache.is_blocklisted("slow.example"));
        }

        let cache = open(dir.path(), Duration::from_secs(3600));
        assert!(cache.is_blocklisted("slow.example"));
        assert!(!cache.is_blocklisted("fast.example"));
    }
}
