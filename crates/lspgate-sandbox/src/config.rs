//! Sandbox configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_base_dir() -> PathBuf {
    std::env::temp_dir().join("lspgate-workspaces")
}

fn default_allowed_extensions() -> Vec<String> {
    ["py", "java", "kt", "kts", "txt", "md", "gradle", "xml"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_denied_names() -> Vec<String> {
    [
        "passwd",
        "shadow",
        ".env",
        ".ssh",
        "id_rsa",
        "id_ed25519",
        "authorized_keys",
        ".bash_history",
        ".netrc",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

fn default_max_files_per_session() -> usize {
    32
}

fn default_retention_secs() -> u64 {
    24 * 60 * 60
}

/// Configuration for workspace isolation and file validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxConfig {
    /// Base directory under which per-session workspaces are created.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// File extensions clients are allowed to create.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Filenames that are always rejected, regardless of extension.
    #[serde(default = "default_denied_names")]
    pub denied_names: Vec<String>,

    /// Per-file size ceiling in bytes.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Per-session file count ceiling.
    #[serde(default = "default_max_files_per_session")]
    pub max_files_per_session: usize,

    /// Abandoned workspaces older than this are swept.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            allowed_extensions: default_allowed_extensions(),
            denied_names: default_denied_names(),
            max_file_bytes: default_max_file_bytes(),
            max_files_per_session: default_max_files_per_session(),
            retention_secs: default_retention_secs(),
        }
    }
}

impl SandboxConfig {
    /// Override the workspace base directory.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Override the retention window.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention_secs = retention.as_secs();
        self
    }

    /// The retention window as a [`Duration`].
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    /// Check whether an extension is on the allow-list.
    pub fn allows_extension(&self, ext: &str) -> bool {
        self.allowed_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Check whether a filename matches the denylist.
    pub fn denies_name(&self, name: &str) -> bool {
        self.denied_names
            .iter()
            .any(|d| name.eq_ignore_ascii_case(d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SandboxConfig::default();
        assert!(config.allows_extension("py"));
        assert!(config.allows_extension("PY"));
        assert!(!config.allows_extension("so"));
        assert!(config.denies_name("passwd"));
        assert!(config.denies_name(".ENV"));
        assert!(!config.denies_name("main.py"));
        assert_eq!(config.retention(), Duration::from_secs(86400));
    }

    #[test]
    fn test_builders() {
        let config = SandboxConfig::default()
            .with_base_dir("/tmp/x")
            .with_retention(Duration::from_secs(60));
        assert_eq!(config.base_dir, PathBuf::from("/tmp/x"));
        assert_eq!(config.retention_secs, 60);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: SandboxConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_files_per_session, 32);
        assert_eq!(config.max_file_bytes, 1024 * 1024);
    }
}
