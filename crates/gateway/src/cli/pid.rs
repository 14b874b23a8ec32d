//! PID file with an exclusive lock, so two gateway instances cannot share
//! one state directory.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use fs2::FileExt;

pub struct PidFile {
    file: File,
    path: PathBuf,
}

impl PidFile {
    /// Create (or reuse) the PID file and take an exclusive lock on it.
    /// Fails if another live process holds the lock.
    pub fn acquire(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("opening pid file {}", path.display()))?;
        file.try_lock_exclusive().with_context(|| {
            format!(
                "another relaybot instance holds the pid file {}",
                path.display()
            )
        })?;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;
        tracing::info!(path = %path.display(), pid = std::process::id(), "pid file acquired");
        Ok(Self {
            file,
            path: path.to_owned(),
        })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove pid file");
        }
    }
}
