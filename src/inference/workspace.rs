use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Scratch directory owned by a single request.
///
/// Laid out as `<root>/job-XXXXXX/{input,output}`. The name is generated, so
/// concurrent requests never share a path regardless of their session id.
/// Dropping the workspace removes it as well, which covers requests whose
/// future is cancelled mid-flight.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl Workspace {
    pub async fn create(root: &Path) -> Result<Self> {
        let root = root.to_path_buf();
        tokio::task::spawn_blocking(move || Workspace::create_blocking(&root))
            .await
            .context("Workspace creation task failed")?
    }

    fn create_blocking(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("Failed to create scratch root {}", root.display()))?;
        let dir = tempfile::Builder::new()
            .prefix("job-")
            .tempdir_in(root)
            .with_context(|| format!("Failed to create workspace in {}", root.display()))?;

        let input_dir = dir.path().join("input");
        let output_dir = dir.path().join("output");
        std::fs::create_dir(&input_dir)?;
        std::fs::create_dir(&output_dir)?;
        debug!("Created workspace {}", dir.path().display());

        Ok(Workspace {
            dir,
            input_dir,
            output_dir,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn input_path(&self, filename: &str) -> PathBuf {
        self.input_dir.join(filename)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Removes the workspace. Failures are reported through logs and the
    /// `workspace_cleanup_failures` counter, never to the caller.
    pub async fn close(self) {
        let path = self.dir.path().to_path_buf();
        let dir = self.dir;
        let err = match tokio::task::spawn_blocking(move || dir.close()).await {
            Ok(Ok(())) => {
                debug!("Cleaned up workspace {}", path.display());
                return;
            }
            Ok(Err(err)) => err.to_string(),
            Err(err) => err.to_string(),
        };
        warn!(
            monotonic_counter.workspace_cleanup_failures = 1_u64,
            path = %path.display(),
            "Cleanup failed: {}",
            err
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_lays_out_input_and_output() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(&root.path().join("nested")).await.unwrap();

        assert!(workspace.path().starts_with(root.path().join("nested")));
        assert!(workspace.output_dir().is_dir());
        assert_eq!(
            workspace.input_path("song.wav"),
            workspace.path().join("input").join("song.wav")
        );
    }

    #[tokio::test]
    async fn workspaces_never_share_a_path() {
        let root = tempfile::tempdir().unwrap();
        let first = Workspace::create(root.path()).await.unwrap();
        let second = Workspace::create(root.path()).await.unwrap();
        assert_ne!(first.path(), second.path());
    }

    #[tokio::test]
    async fn close_removes_everything_inside() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(root.path()).await.unwrap();
        let stems = workspace.output_dir().join("htdemucs").join("song");
        std::fs::create_dir_all(&stems).unwrap();
        std::fs::write(stems.join("vocals.wav"), b"v").unwrap();
        std::fs::write(workspace.input_path("song.wav"), b"raw").unwrap();

        workspace.close().await;

        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn drop_also_removes_workspace() {
        let root = tempfile::tempdir().unwrap();
        {
            let workspace = Workspace::create(root.path()).await.unwrap();
            std::fs::write(workspace.input_path("a.wav"), b"a").unwrap();
        }
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn close_of_vanished_workspace_only_warns() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(root.path()).await.unwrap();
        std::fs::remove_dir_all(workspace.path()).unwrap();

        workspace.close().await;

        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
