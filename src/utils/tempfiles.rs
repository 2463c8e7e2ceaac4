use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Default index directory: a timestamped subdirectory of the system temp
/// dir, unique per process so concurrent runs never share catalogs.
pub fn default_index_dir() -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    std::env::temp_dir().join(format!(
        "{}-idx-{}-{}",
        env!("CARGO_PKG_NAME"),
        stamp,
        std::process::id()
    ))
}

/// Index directory that removes itself on drop when it was created as a
/// process-private temp dir. An explicit `--index-dir` is never removed.
pub struct IndexDirGuard {
    path: PathBuf,
    owned: bool,
}

impl IndexDirGuard {
    /// Use `explicit` when given, otherwise create a temp dir we own.
    pub fn new(explicit: Option<PathBuf>) -> std::io::Result<Self> {
        let (path, owned) = match explicit {
            Some(p) => (p, false),
            None => (default_index_dir(), true),
        };
        std::fs::create_dir_all(&path)?;
        Ok(Self { path, owned })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for IndexDirGuard {
    fn drop(&mut self) {
        if self.owned {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                log::debug!(
                    "could not remove temp index dir {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}
