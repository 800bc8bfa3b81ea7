use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

/// Reduce a client supplied file name to something safe to store.
///
/// Same rules as werkzeug's `secure_filename` on POSIX: the name is
/// NFKD-decomposed and non-ASCII characters dropped, `/` becomes a space,
/// whitespace runs become a single `_`, anything outside `[A-Za-z0-9_.-]`
/// is removed, and leading or trailing `.`/`_` are stripped. An empty
/// result means the name is unusable.
pub fn secure_filename(name: &str) -> String {
    let ascii: String = name
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_owned()
}

/// Upload directory bounded to a fixed number of files; the oldest uploads
/// are evicted first.
#[derive(Clone, Debug)]
pub struct UploadStore {
    dir: PathBuf,
    max_files: usize,
}

impl UploadStore {
    pub async fn open(dir: &Path, max_files: usize) -> io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;

        Ok(UploadStore {
            dir: dir.to_path_buf(),
            max_files: max_files.max(1),
        })
    }

    /// Store `data` under an already sanitized name, overwriting any
    /// previous upload with the same name.
    pub async fn save(&self, name: &str, data: &[u8]) -> io::Result<PathBuf> {
        let path = self.dir.join(name);
        tokio::fs::write(&path, data).await?;

        debug!("stored upload {} ({} bytes)", path.display(), data.len());

        let evicted = self.evict(&path).await?;
        if evicted > 0 {
            info!("evicted {} old uploads", evicted);
        }

        Ok(path)
    }

    /// Read back a stored upload. The name is sanitized first so it can
    /// never leave the upload directory.
    pub async fn read(&self, name: &str) -> Option<(String, Vec<u8>)> {
        let name = secure_filename(name);
        if name.is_empty() {
            return None;
        }

        match tokio::fs::read(self.dir.join(&name)).await {
            Ok(data) => Some((name, data)),
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("could not read upload '{}': {}", name, e);
                }
                None
            }
        }
    }

    async fn evict(&self, keep: &Path) -> io::Result<usize> {
        let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();

        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }

            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((modified, entry.path()));
        }

        if files.len() <= self.max_files {
            return Ok(0);
        }

        files.sort();

        let excess = files.len() - self.max_files;
        let mut evicted = 0;

        for (_, path) in files.iter().filter(|(_, p)| p != keep).take(excess) {
            match tokio::fs::remove_file(path).await {
                Ok(()) => evicted += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("could not evict {}: {}", path.display(), e),
            }
        }

        Ok(evicted)
    }
}
