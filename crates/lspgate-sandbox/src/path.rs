//! URI validation against a workspace root.
//!
//! The ordering of checks matters: traversal tokens are rejected on the
//! raw URI string *before* parsing, because a URL parser will silently
//! normalize `..` segments away and defeat the check entirely.

use crate::config::SandboxConfig;
use crate::error::PathSecurityError;
use std::path::{Component, Path, PathBuf};
use url::Url;

/// A validated filesystem path, guaranteed to be a strict descendant of the
/// workspace root it was validated against, with an allow-listed extension
/// and no traversal or denylisted components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafePath {
    path: PathBuf,
}

impl SafePath {
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.path
    }

    /// The `file://` URI for this path, suitable for forwarding to a
    /// language server.
    pub fn to_uri(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

/// Validate a client-supplied URI against a workspace root.
pub fn validate(
    uri: &str,
    workspace_root: &Path,
    config: &SandboxConfig,
) -> Result<SafePath, PathSecurityError> {
    // Raw-string traversal check, before any parsing or decoding. Covers
    // `../`, `..\` and percent-encoded spellings of both dots.
    let lower = uri.to_ascii_lowercase();
    if lower.contains("..") || lower.contains("%2e%2e") || lower.contains(".%2e")
        || lower.contains("%2e.")
    {
        return Err(PathSecurityError::Traversal);
    }

    let url = Url::parse(uri).map_err(|e| PathSecurityError::InvalidUri(e.to_string()))?;
    if url.scheme() != "file" {
        return Err(PathSecurityError::InvalidScheme(url.scheme().to_string()));
    }

    let decoded = url
        .to_file_path()
        .map_err(|_| PathSecurityError::InvalidUri("not a local file path".to_string()))?;
    let decoded_str = decoded.to_string_lossy();

    if decoded_str.as_bytes().contains(&0) {
        return Err(PathSecurityError::NullByte);
    }
    // Post-decode traversal check; percent-decoding may have produced new
    // dot segments (Unix or Windows style).
    if decoded_str.contains("..") {
        return Err(PathSecurityError::Traversal);
    }
    if decoded_str.contains('\\') {
        return Err(PathSecurityError::InvalidUri(
            "backslash in decoded path".to_string(),
        ));
    }

    // Rebuild the path from plain components only, rooted in the workspace.
    let mut candidate = workspace_root.to_path_buf();
    for component in decoded.components() {
        match component {
            Component::RootDir | Component::Prefix(_) => {}
            Component::Normal(part) => {
                let name = part.to_string_lossy();
                if config.denies_name(&name) {
                    return Err(PathSecurityError::DeniedName(name.into_owned()));
                }
                candidate.push(part);
            }
            Component::CurDir | Component::ParentDir => {
                return Err(PathSecurityError::Traversal);
            }
        }
    }

    if candidate == workspace_root {
        return Err(PathSecurityError::InvalidUri("no filename".to_string()));
    }
    let file_name = candidate
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| PathSecurityError::InvalidUri("no filename".to_string()))?;
    if let Some(stem) = candidate.file_stem().and_then(|s| s.to_str()) {
        if config.denies_name(stem) {
            return Err(PathSecurityError::DeniedName(stem.to_string()));
        }
    }

    let extension = candidate
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| PathSecurityError::ExtensionNotAllowed(file_name.clone()))?;
    if !config.allows_extension(extension) {
        return Err(PathSecurityError::ExtensionNotAllowed(extension.to_string()));
    }

    // Belt-and-braces: the constructed path must live strictly inside the
    // workspace root.
    if !candidate.starts_with(workspace_root) || candidate == workspace_root {
        return Err(PathSecurityError::OutsideWorkspace);
    }

    Ok(SafePath { path: candidate })
}
