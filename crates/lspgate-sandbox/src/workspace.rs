//! Workspace directory lifecycle: prepare, write, scaffold, remove, sweep.

use crate::config::SandboxConfig;
use crate::error::{SandboxError, SandboxResult};
use crate::path::{validate, SafePath};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Manages per-session workspace directories under a configured base.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    config: SandboxConfig,
}

impl WorkspaceManager {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// The workspace root for a session key, whether or not it exists yet.
    pub fn root_for(&self, session_key: &str) -> SandboxResult<PathBuf> {
        if session_key.is_empty()
            || !session_key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':')
        {
            return Err(SandboxError::InvalidSessionKey(session_key.to_string()));
        }
        // Session keys may embed a `language:room` separator; flatten it for
        // the directory name.
        Ok(self.config.base_dir.join(session_key.replace(':', "_")))
    }

    /// Create the workspace directory for a session. Idempotent per key.
    pub async fn prepare(&self, session_key: &str) -> SandboxResult<PathBuf> {
        let root = self.root_for(session_key)?;
        tokio::fs::create_dir_all(&root).await?;
        debug!(session = session_key, root = %root.display(), "workspace prepared");
        Ok(root)
    }

    /// Validate a client URI against a session's workspace root.
    pub fn validate(&self, uri: &str, root: &Path) -> SandboxResult<SafePath> {
        Ok(validate(uri, root, &self.config)?)
    }

    /// Write file content to a validated path, enforcing size and count
    /// ceilings.
    pub async fn write(&self, safe: &SafePath, content: &[u8], root: &Path) -> SandboxResult<()> {
        let size = content.len() as u64;
        if size > self.config.max_file_bytes {
            return Err(SandboxError::FileTooLarge {
                size,
                limit: self.config.max_file_bytes,
            });
        }

        // Count only counts toward the ceiling when creating a new file;
        // overwrites of existing files are always allowed.
        if !safe.as_path().exists()
            && self.file_count(root).await >= self.config.max_files_per_session
        {
            return Err(SandboxError::TooManyFiles {
                limit: self.config.max_files_per_session,
            });
        }

        if let Some(parent) = safe.as_path().parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(safe.as_path(), content)
            .await
            .map_err(|e| SandboxError::write_failed(safe.as_path(), e.to_string()))?;
        debug!(path = %safe.as_path().display(), bytes = size, "file written");
        Ok(())
    }

    /// Generate the minimal build descriptor some language servers need to
    /// resolve a project model.
    pub async fn scaffold(&self, language: &str, root: &Path) -> SandboxResult<()> {
        let manifest: Option<(&str, String)> = match language {
            "java" => Some((
                "build.gradle",
                "plugins { id 'java' }\nrepositories { mavenCentral() }\n".to_string(),
            )),
            "kotlin" => Some((
                "build.gradle.kts",
                "plugins { kotlin(\"jvm\") }\nrepositories { mavenCentral() }\n".to_string(),
            )),
            _ => None,
        };

        if let Some((name, content)) = manifest {
            let path = root.join(name);
            if !path.exists() {
                tokio::fs::write(&path, content).await?;
                debug!(language, path = %path.display(), "project manifest scaffolded");
            }
        }
        Ok(())
    }

    /// Recursively delete a session's workspace.
    pub async fn remove(&self, session_key: &str) -> SandboxResult<()> {
        let root = self.root_for(session_key)?;
        match tokio::fs::remove_dir_all(&root).await {
            Ok(()) => {
                info!(session = session_key, "workspace removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete workspaces whose last modification is older than the retention
    /// window. Returns the number of workspaces removed.
    pub async fn sweep(&self) -> SandboxResult<usize> {
        let retention = self.config.retention();
        let mut removed = 0;

        let mut entries = match tokio::fs::read_dir(&self.config.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let age = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .ok()
                .and_then(|mtime| SystemTime::now().duration_since(mtime).ok());
            match age {
                Some(age) if age >= retention => {
                    if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                        warn!(path = %path.display(), error = %e, "failed to sweep workspace");
                    } else {
                        info!(path = %path.display(), age_secs = age.as_secs(), "swept stale workspace");
                        removed += 1;
                    }
                }
                _ => {}
            }
        }

        Ok(removed)
    }

    /// Count files under a root. The directory walk is synchronous, so it
    /// runs on a blocking thread.
    async fn file_count(&self, root: &Path) -> usize {
        let root = root.to_path_buf();
        tokio::task::spawn_blocking(move || {
            WalkDir::new(&root)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .count()
        })
        .await
        .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn manager(dir: &Path) -> WorkspaceManager {
        WorkspaceManager::new(SandboxConfig::default().with_base_dir(dir))
    }

    #[tokio::test]
    async fn test_prepare_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());

        let first = manager.prepare("python:room-1").await.unwrap();
        let second = manager.prepare("python:room-1").await.unwrap();
        assert_eq!(first, second);
        assert!(first.is_dir());
        assert!(first.ends_with("python_room-1"));
    }

    #[tokio::test]
    async fn test_rejects_hostile_session_key() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());

        for key in ["../escape", "a/b", "", "room 1"] {
            let err = manager.prepare(key).await.unwrap_err();
            assert!(matches!(err, SandboxError::InvalidSessionKey(_)), "key: {key}");
        }
    }

    #[tokio::test]
    async fn test_validate_and_write() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let root = manager.prepare("python:room-1").await.unwrap();

        let safe = manager.validate("file:///main.py", &root).unwrap();
        manager.write(&safe, b"print(1)", &root).await.unwrap();

        let written = tokio::fs::read(root.join("main.py")).await.unwrap();
        assert_eq!(written, b"print(1)");
    }

    #[tokio::test]
    async fn test_write_enforces_size_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SandboxConfig::default().with_base_dir(dir.path());
        config.max_file_bytes = 8;
        let manager = WorkspaceManager::new(config);
        let root = manager.prepare("s1").await.unwrap();

        let safe = manager.validate("file:///main.py", &root).unwrap();
        let err = manager
            .write(&safe, b"0123456789", &root)
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::FileTooLarge { size: 10, limit: 8 }));
        assert!(!root.join("main.py").exists());
    }

    #[tokio::test]
    async fn test_write_enforces_count_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SandboxConfig::default().with_base_dir(dir.path());
        config.max_files_per_session = 2;
        let manager = WorkspaceManager::new(config);
        let root = manager.prepare("s1").await.unwrap();

        for name in ["a.py", "b.py"] {
            let safe = manager.validate(&format!("file:///{name}"), &root).unwrap();
            manager.write(&safe, b"x", &root).await.unwrap();
        }

        let safe = manager.validate("file:///c.py", &root).unwrap();
        let err = manager.write(&safe, b"x", &root).await.unwrap_err();
        assert!(matches!(err, SandboxError::TooManyFiles { limit: 2 }));

        // Overwriting an existing file is still allowed at the ceiling.
        let safe = manager.validate("file:///a.py", &root).unwrap();
        manager.write(&safe, b"y", &root).await.unwrap();
    }

    #[tokio::test]
    async fn test_scaffold_java_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let root = manager.prepare("java:room-9").await.unwrap();

        manager.scaffold("java", &root).await.unwrap();
        assert!(root.join("build.gradle").exists());

        manager.scaffold("python", &root).await.unwrap();
        let names: Vec<_> = std::fs::read_dir(&root)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_missing_workspace_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager.remove("never-created").await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_respects_retention() {
        let dir = tempfile::tempdir().unwrap();

        // Fresh workspaces survive a 24h retention sweep.
        let keep = manager(dir.path());
        keep.prepare("s1").await.unwrap();
        assert_eq!(keep.sweep().await.unwrap(), 0);

        // A zero retention window reaps everything.
        let reap = WorkspaceManager::new(
            SandboxConfig::default()
                .with_base_dir(dir.path())
                .with_retention(Duration::ZERO),
        );
        assert_eq!(reap.sweep().await.unwrap(), 1);
        assert!(!dir.path().join("s1").exists());
    }

    #[tokio::test]
    async fn test_sweep_missing_base_dir() {
        let manager = WorkspaceManager::new(
            SandboxConfig::default().with_base_dir("/nonexistent/lspgate-base"),
        );
        assert_eq!(manager.sweep().await.unwrap(), 0);
    }
}
