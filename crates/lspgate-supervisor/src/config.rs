//! Per-language launch specifications.

use crate::error::{SupervisorError, SupervisorResult};
use lspgate_util::locate_file;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_init_timeout_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_handshake() -> bool {
    true
}

/// How to locate an Eclipse-style launcher JAR inside a server
/// distribution. The distribution root comes from an environment variable;
/// the JAR itself is found by filename prefix at a bounded depth.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LauncherJar {
    /// Environment variable naming the distribution root.
    pub home_env: String,
    /// Filename prefix of the launcher JAR.
    pub jar_prefix: String,
}

/// Configuration for launching one language's server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSpec {
    /// Language identifier (e.g. "python", "java", "kotlin").
    pub language: String,

    /// Command to run the server.
    pub command: String,

    /// Arguments for the command. The placeholders `{launcher}`,
    /// `{config}`, and `{workspace}` are substituted at spawn time.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Command run once to install the server when the binary is absent.
    #[serde(default)]
    pub install: Option<Vec<String>>,

    /// Launcher JAR search, for Eclipse-based servers.
    #[serde(default)]
    pub launcher: Option<LauncherJar>,

    /// Whether sessions in the same room share one process. Servers with
    /// expensive startup share; lightweight ones get one per connection.
    #[serde(default)]
    pub shared_per_room: bool,

    /// Whether to run the `initialize`/`initialized` handshake on spawn.
    #[serde(default = "default_handshake")]
    pub handshake: bool,

    /// Timeout for `initialize` (dependency resolution can be slow).
    #[serde(default = "default_init_timeout_secs")]
    pub init_timeout_secs: u64,

    /// Timeout for every other request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl LaunchSpec {
    /// Create a new launch spec.
    pub fn new(language: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            install: None,
            launcher: None,
            shared_per_room: false,
            handshake: true,
            init_timeout_secs: default_init_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    /// Add command arguments.
    pub fn with_args(mut self, args: Vec<impl Into<String>>) -> Self {
        self.args = args.into_iter().map(|a| a.into()).collect();
        self
    }

    /// Set an install command run when the binary is missing.
    pub fn with_install(mut self, install: Vec<impl Into<String>>) -> Self {
        self.install = Some(install.into_iter().map(|a| a.into()).collect());
        self
    }

    /// Mark this server as shared by all sessions in a room.
    pub fn shared(mut self) -> Self {
        self.shared_per_room = true;
        self
    }

    /// Skip the LSP handshake on spawn. Used by tests and raw transports.
    pub fn without_handshake(mut self) -> Self {
        self.handshake = false;
        self
    }

    /// Timeout for the given method.
    pub fn timeout_for(&self, method: &str) -> Duration {
        if method == "initialize" {
            Duration::from_secs(self.init_timeout_secs)
        } else {
            Duration::from_secs(self.request_timeout_secs)
        }
    }

    /// Create configuration for Python (python-lsp-server).
    pub fn python() -> Self {
        Self::new("python", "pylsp")
            .with_install(vec!["pip", "install", "python-lsp-server"])
    }

    /// Create configuration for Java (Eclipse JDT language server).
    ///
    /// The distribution root comes from `JDTLS_HOME`; the launcher JAR and
    /// platform configuration directory are resolved at spawn time.
    pub fn java() -> Self {
        let mut spec = Self::new("java", "java")
            .with_args(vec![
                "-jar",
                "{launcher}",
                "-configuration",
                "{config}",
                "-data",
                "{workspace}",
            ])
            .shared();
        spec.launcher = Some(LauncherJar {
            home_env: "JDTLS_HOME".to_string(),
            jar_prefix: "org.eclipse.equinox.launcher_".to_string(),
        });
        spec.init_timeout_secs = 120;
        spec
    }

    /// Create configuration for Kotlin (kotlin-language-server).
    pub fn kotlin() -> Self {
        let mut spec = Self::new("kotlin", "kotlin-language-server").shared();
        spec.init_timeout_secs = 120;
        spec
    }

    /// Resolve argument placeholders for a concrete spawn.
    pub fn resolved_args(&self, workspace_root: &Path) -> SupervisorResult<Vec<String>> {
        let needs_launcher = self.args.iter().any(|a| a.contains("{launcher}"));
        let launcher_path = if needs_launcher {
            Some(self.locate_launcher()?)
        } else {
            None
        };

        let config_dir = self.launcher.as_ref().map(|_| platform_config_dir());

        Ok(self
            .args
            .iter()
            .map(|arg| {
                let mut arg = arg.replace("{workspace}", &workspace_root.display().to_string());
                if let Some(jar) = &launcher_path {
                    arg = arg.replace("{launcher}", &jar.display().to_string());
                }
                if let (Some(home), Some(config)) = (self.launcher_home(), &config_dir) {
                    arg = arg.replace("{config}", &home.join(config).display().to_string());
                }
                arg
            })
            .collect())
    }

    fn launcher_home(&self) -> Option<PathBuf> {
        self.launcher
            .as_ref()
            .and_then(|l| std::env::var_os(&l.home_env))
            .map(PathBuf::from)
    }

    fn locate_launcher(&self) -> SupervisorResult<PathBuf> {
        let launcher = self.launcher.as_ref().ok_or_else(|| {
            SupervisorError::launch(&self.language, "no launcher configured")
        })?;
        let home = self.launcher_home().ok_or_else(|| {
            SupervisorError::launch(
                &self.language,
                format!("{} is not set", launcher.home_env),
            )
        })?;
        locate_file(&home, 4, |name| {
            name.starts_with(launcher.jar_prefix.as_str()) && name.ends_with(".jar")
        })
        .ok_or_else(|| {
            SupervisorError::launch(
                &self.language,
                format!("launcher JAR not found under {}", home.display()),
            )
        })
    }
}

/// The platform-specific Eclipse configuration directory name.
fn platform_config_dir() -> &'static str {
    if cfg!(target_os = "macos") {
        "config_mac"
    } else if cfg!(target_os = "windows") {
        "config_win"
    } else {
        "config_linux"
    }
}

/// Default launch specs for the supported languages.
pub fn default_specs() -> Vec<LaunchSpec> {
    vec![LaunchSpec::python(), LaunchSpec::java(), LaunchSpec::kotlin()]
}
