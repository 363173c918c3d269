//! On-disk content-addressed artifact store.
//!
//! Layout: `<root>/<op_safe>/<digest[..2]>/<digest[2..]>`, where `op_safe`
//! replaces `:` and path separators with `_`. File contents are the codec
//! byte stream, beginning with its type tag, so a fresh process pointed at
//! the same root reads identical artifacts.
//!
//! Writes are atomic: bytes land in a sibling `.tmp` file that is renamed
//! into place. Concurrent writers of the same key race harmlessly — the
//! slot is content-addressed, so every writer renames the same bytes.

use std::fs::{self, File};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use tracing::debug;

use invariant_core::codec::{self, DomainDecodeFn, DomainRegistry};
use invariant_core::hash::Digest;
use invariant_core::store::{ArtifactStore, CacheStats};
use invariant_core::value::Value;
use invariant_core::{Error, Result};

/// Default cache root, relative to the process working directory.
pub const DEFAULT_ROOT: &str = ".invariant/cache";

/// Filesystem-backed artifact store.
pub struct DiskStore {
    root: PathBuf,
    domains: DomainRegistry,
    stats: CacheStats,
}

impl DiskStore {
    /// A store under `.invariant/cache` in the current working directory.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().map_err(|e| storage_io(Path::new("."), e))?;
        Self::at(cwd.join(DEFAULT_ROOT))
    }

    /// A store under `root`, created if absent.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_domains(root, DomainRegistry::new())
    }

    /// A store under `root` that decodes domain values through `domains`.
    pub fn with_domains(root: impl Into<PathBuf>, domains: DomainRegistry) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| storage_io(&root, e))?;
        Ok(Self {
            root,
            domains,
            stats: CacheStats::default(),
        })
    }

    /// The cache root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register a domain type decoder for reads from this store.
    pub fn register_domain(&mut self, type_name: &str, decode: DomainDecodeFn) -> Result<()> {
        self.domains.register(type_name, decode)
    }

    fn artifact_path(&self, op_name: &str, digest: &Digest) -> PathBuf {
        let hex = digest.to_hex();
        self.root
            .join(sanitize_op_name(op_name))
            .join(&hex[..2])
            .join(&hex[2..])
    }
}

impl ArtifactStore for DiskStore {
    fn exists(&mut self, op_name: &str, digest: &Digest) -> Result<bool> {
        let present = self.artifact_path(op_name, digest).is_file();
        if present {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        Ok(present)
    }

    fn get(&mut self, op_name: &str, digest: &Digest) -> Result<Value> {
        let path = self.artifact_path(op_name, digest);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::ArtifactMissing {
                    op_name: op_name.to_string(),
                    digest: digest.to_hex(),
                })
            }
            Err(e) => return Err(storage_io(&path, e)),
        };
        codec::decode(&bytes, &self.domains)
    }

    fn put(&mut self, op_name: &str, digest: &Digest, artifact: &Value) -> Result<()> {
        let path = self.artifact_path(op_name, digest);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| storage_io(parent, e))?;
        }
        atomic_write(&path, &codec::encode(artifact))?;
        self.stats.puts += 1;
        debug!(op = op_name, %digest, path = %path.display(), "persisted artifact");
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        self.stats
    }

    fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }
}

/// Replace `:` and path separators with `_`.
fn sanitize_op_name(op_name: &str) -> String {
    op_name
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' => '_',
            other => other,
        })
        .collect()
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| storage_io(path, io::Error::new(io::ErrorKind::InvalidInput, "invalid file name")))?;
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    {
        let mut f = File::create(&tmp_path).map_err(|e| storage_io(&tmp_path, e))?;
        f.write_all(bytes).map_err(|e| storage_io(&tmp_path, e))?;
        f.flush().map_err(|e| storage_io(&tmp_path, e))?;
        // Not a hard durability guarantee, but improves crash-safety for
        // small files.
        let _ = f.sync_all();
    }

    fs::rename(&tmp_path, path).map_err(|e| storage_io(path, e))
}

fn storage_io(path: &Path, source: io::Error) -> Error {
    Error::StorageIo {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invariant_core::hash::stable_digest;

    fn store_in(dir: &Path) -> DiskStore {
        DiskStore::at(dir.join("cache")).unwrap()
    }

    #[test]
    fn put_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let value = Value::Seq(vec![Value::Int(1), Value::Str("hello".to_string())]);
        let digest = stable_digest(&value);

        store.put("poly:add", &digest, &value).unwrap();
        assert!(store.exists("poly:add", &digest).unwrap());
        assert_eq!(store.get("poly:add", &digest).unwrap(), value);
    }

    #[test]
    fn op_names_are_sanitized_in_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let digest = stable_digest(&Value::Int(1));
        store.put("poly:add", &digest, &Value::Int(1)).unwrap();

        let hex = digest.to_hex();
        let expected = dir
            .path()
            .join("cache")
            .join("poly_add")
            .join(&hex[..2])
            .join(&hex[2..]);
        assert!(expected.is_file());
    }

    #[test]
    fn no_tmp_files_survive_a_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let digest = stable_digest(&Value::Int(2));
        store.put("op", &digest, &Value::Int(2)).unwrap();

        let mut pending = vec![dir.path().to_path_buf()];
        while let Some(current) = pending.pop() {
            for entry in fs::read_dir(&current).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    pending.push(path);
                } else {
                    assert!(!path.to_string_lossy().ends_with(".tmp"), "{path:?}");
                }
            }
        }
    }

    #[test]
    fn missing_artifact_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let digest = stable_digest(&Value::Int(3));
        assert!(!store.exists("op", &digest).unwrap());
        assert!(matches!(
            store.get("op", &digest).unwrap_err(),
            Error::ArtifactMissing { .. }
        ));
    }

    #[test]
    fn corrupt_bytes_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let digest = stable_digest(&Value::Int(4));
        store.put("op", &digest, &Value::Int(4)).unwrap();

        let path = store.artifact_path("op", &digest);
        fs::write(&path, b"garbage").unwrap();
        assert!(matches!(
            store.get("op", &digest).unwrap_err(),
            Error::CorruptData { .. }
        ));
    }
}
