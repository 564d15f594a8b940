use anyhow::Result;
use std::path::Path;
use tokio::fs;
use walkdir::WalkDir;

pub const OUTPUT_DIR: &str = "output";
pub const SCRATCH_ROOT: &str = "scratch";

const REQUIRED_DIRS: &[&str] = &[OUTPUT_DIR, SCRATCH_ROOT];

pub async fn ensure_directories() -> Result<()> {
    for dir in REQUIRED_DIRS {
        if !Path::new(dir).exists() {
            fs::create_dir_all(dir).await?;
            eprintln!("[INFO] Created directory: {}", dir);
        }
    }
    Ok(())
}

pub async fn check_ffmpeg() -> bool {
    match tokio::process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Remove leftovers from crashed or kept runs so scratch space doesn't grow
/// without bound across invocations.
pub async fn sweep_stale_runs(scratch_root: &Path) -> Result<usize> {
    if !fs::metadata(scratch_root).await.map(|m| m.is_dir()).unwrap_or(false) {
        return Ok(0);
    }

    let mut removed = 0usize;
    for entry in WalkDir::new(scratch_root).min_depth(1).contents_first(true) {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            if fs::remove_dir(path).await.is_ok() && entry.depth() == 1 {
                removed += 1;
            }
        } else {
            fs::remove_file(path).await.ok();
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn sweep_clears_old_run_directories() {
        let root = TempDir::new().unwrap();
        let stale = root.path().join("run-20250101-000000-abcd");
        std::fs::create_dir_all(stale.join("clips")).unwrap();
        std::fs::write(stale.join("clips/slot_0.mp4"), b"x").unwrap();
        std::fs::write(stale.join("narration.mp3"), b"x").unwrap();

        let removed = sweep_stale_runs(root.path()).await.unwrap();
        assert_eq!(removed, 1);
        assert!(!stale.exists());
        assert!(root.path().exists());
    }

    #[tokio::test]
    async fn sweep_on_missing_root_is_a_no_op() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("nope");
        assert_eq!(sweep_stale_runs(&missing).await.unwrap(), 0);
    }
}
