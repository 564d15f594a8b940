use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Per-run scratch directory. Every stage writes uniquely named files here and
/// nothing is reused across runs; dropping the scratch removes the whole tree
/// unless the run asked to keep it.
pub struct Scratch {
    dir: TempDir,
    label: String,
}

impl Scratch {
    pub fn new(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("create scratch root {}", root.display()))?;
        let label = format!("run-{}", Utc::now().format("%Y%m%d-%H%M%S"));
        let dir = tempfile::Builder::new()
            .prefix(&format!("{label}-"))
            .tempdir_in(root)
            .context("create run scratch directory")?;
        Ok(Self { dir, label })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Disarm cleanup and leave the run's files on disk for inspection.
    pub fn keep(self) -> PathBuf {
        self.dir.into_path()
    }
}
