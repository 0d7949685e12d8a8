use std::{
    fmt,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::{ObjectStore, StoreResult, check_path, io_error};

/// Filesystem-backed store rooted at `<root>/objects`.
///
/// Writes go through a temp file and rename so a crashed put never leaves a
/// half-written object at its final path.
#[derive(Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl fmt::Debug for FsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsStore").field("root", &self.root).finish()
    }
}

impl FsStore {
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().join("objects");
        fs::create_dir_all(&root).map_err(|e| io_error(&root, e))?;
        Ok(Self { root })
    }

    fn object_path(&self, path: &str) -> PathBuf {
        let mut full = self.root.clone();
        for segment in path.split('/') {
            full.push(segment);
        }
        full
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> StoreResult<()> {
        check_path(path)?;
        let full = self.object_path(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        let tmp = full.with_extension("tmp");
        {
            let mut file = File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
            file.write_all(bytes).map_err(|e| io_error(&tmp, e))?;
            file.sync_all().map_err(|e| io_error(&tmp, e))?;
        }
        fs::rename(&tmp, &full).map_err(|e| io_error(&full, e))?;
        Ok(())
    }

    async fn get(&self, path: &str) -> StoreResult<Vec<u8>> {
        check_path(path)?;
        let full = self.object_path(path);
        match fs::read(&full) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(crate::StoreError::NotFound { path: path.into() })
            }
            Err(e) => Err(io_error(full, e)),
        }
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut out = Vec::new();
        for entry in WalkDir::new(&self.root).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) && !key.ends_with(".tmp") {
                out.push(key);
            }
        }
        out.sort();
        Ok(out)
    }
}
