//! Refcounted registry of live language server processes.
//!
//! Sessions acquire a process by key and release it on disconnect. Shared
//! servers (one per room) stay alive while any session holds a reference;
//! per-connection servers always get a key unique to the connection, so
//! sharing falls out of key construction rather than special cases.
//!
//! Exited processes are removed from the table by a reaper task fed by
//! each process's exit watcher, so `acquire` never hands out a handle to a
//! dead process even before the reaper has caught up: liveness is checked
//! again on the way out.

use crate::config::LaunchSpec;
use crate::error::{SupervisorError, SupervisorResult};
use crate::process::{ExitEvent, LanguageServerProcess};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, info, warn};

struct Entry {
    process: Arc<LanguageServerProcess>,
    refcount: usize,
}

/// Owns every live language server process, keyed by session key.
pub struct ProcessRegistry {
    specs: HashMap<String, LaunchSpec>,
    table: Arc<Mutex<HashMap<String, Entry>>>,
    /// Keys with a spawn in progress; later acquirers wait on the Notify
    /// instead of racing a second spawn.
    starting: Mutex<HashMap<String, Arc<Notify>>>,
    exit_tx: mpsc::UnboundedSender<ExitEvent>,
}

impl ProcessRegistry {
    /// Build a registry from per-language launch specs and start its
    /// reaper task.
    pub fn new(specs: Vec<LaunchSpec>) -> Self {
        let specs = specs
            .into_iter()
            .map(|s| (s.language.clone(), s))
            .collect();
        let table: Arc<Mutex<HashMap<String, Entry>>> = Arc::new(Mutex::new(HashMap::new()));
        let (exit_tx, mut exit_rx) = mpsc::unbounded_channel::<ExitEvent>();

        let reaper_table = Arc::clone(&table);
        tokio::spawn(async move {
            while let Some(event) = exit_rx.recv().await {
                let mut table = reaper_table.lock().await;
                // `acquire` may have already evicted the dead process and
                // respawned under the same key; only remove the entry the
                // event is actually about.
                match table.get(&event.key) {
                    Some(entry) if entry.process.pid() == event.pid => {
                        table.remove(&event.key);
                        warn!(key = %event.key, pid = ?event.pid, "removed exited process from registry");
                    }
                    Some(_) => {
                        debug!(key = %event.key, pid = ?event.pid, "ignoring exit event for replaced process");
                    }
                    None => {}
                }
            }
        });

        Self {
            specs,
            table,
            starting: Mutex::new(HashMap::new()),
            exit_tx,
        }
    }

    /// The launch spec for a language, if supported.
    pub fn spec(&self, language: &str) -> Option<&LaunchSpec> {
        self.specs.get(language)
    }

    /// Languages this registry can launch.
    pub fn languages(&self) -> Vec<String> {
        let mut langs: Vec<String> = self.specs.keys().cloned().collect();
        langs.sort();
        langs
    }

    /// Build the session key that decides process sharing: shared servers
    /// key on the room, per-connection servers additionally on the client.
    pub fn session_key(
        &self,
        language: &str,
        room: &str,
        client_id: &str,
    ) -> SupervisorResult<String> {
        let spec = self
            .specs
            .get(language)
            .ok_or_else(|| SupervisorError::UnsupportedLanguage(language.to_string()))?;
        Ok(if spec.shared_per_room {
            format!("{language}:{room}")
        } else {
            format!("{language}:{room}:{client_id}")
        })
    }

    /// Get a live process for the key, spawning one if needed. Concurrent
    /// acquirers of the same key share a single spawn.
    pub async fn acquire(
        &self,
        language: &str,
        key: &str,
        workspace_root: &Path,
    ) -> SupervisorResult<Arc<LanguageServerProcess>> {
        let spec = self
            .specs
            .get(language)
            .ok_or_else(|| SupervisorError::UnsupportedLanguage(language.to_string()))?
            .clone();

        loop {
            {
                let mut table = self.table.lock().await;
                if let Some(entry) = table.get_mut(key) {
                    if entry.process.is_alive().await {
                        entry.refcount += 1;
                        debug!(key = %key, refcount = entry.refcount, "reusing process");
                        return Ok(Arc::clone(&entry.process));
                    }
                    // The reaper has not caught up yet; evict and respawn.
                    warn!(key = %key, "evicting dead process before reaper");
                    table.remove(key);
                }
            }

            let waiter = {
                let mut starting = self.starting.lock().await;
                match starting.get(key) {
                    Some(notify) => Some(Arc::clone(notify)),
                    None => {
                        starting.insert(key.to_string(), Arc::new(Notify::new()));
                        None
                    }
                }
            };
            if let Some(notify) = waiter {
                debug!(key = %key, "waiting for in-progress spawn");
                // Bounded wait: if the wakeup slipped past between lookup
                // and await, the loop re-checks the table anyway.
                let _ = tokio::time::timeout(Duration::from_millis(500), notify.notified()).await;
                continue;
            }

            let result = self.spawn_entry(&spec, key, workspace_root).await;

            if let Some(notify) = self.starting.lock().await.remove(key) {
                notify.notify_waiters();
            }
            return result;
        }
    }

    async fn spawn_entry(
        &self,
        spec: &LaunchSpec,
        key: &str,
        workspace_root: &Path,
    ) -> SupervisorResult<Arc<LanguageServerProcess>> {
        let process = LanguageServerProcess::spawn(
            spec.clone(),
            key,
            workspace_root,
            Some(self.exit_tx.clone()),
        )
        .await?;

        if spec.handshake {
            if let Err(error) = process.initialize_handshake(workspace_root).await {
                warn!(key = %key, %error, "handshake failed; discarding process");
                process.shutdown().await;
                return Err(error);
            }
        }

        self.table.lock().await.insert(
            key.to_string(),
            Entry {
                process: Arc::clone(&process),
                refcount: 1,
            },
        );
        info!(language = %spec.language, key = %key, "process registered");
        Ok(process)
    }

    /// Drop one reference to the keyed process; the last release shuts the
    /// process down.
    pub async fn release(&self, key: &str) {
        let last = {
            let mut table = self.table.lock().await;
            match table.get_mut(key) {
                Some(entry) => {
                    entry.refcount = entry.refcount.saturating_sub(1);
                    if entry.refcount == 0 {
                        table.remove(key).map(|e| e.process)
                    } else {
                        debug!(key = %key, refcount = entry.refcount, "released shared process");
                        None
                    }
                }
                None => None,
            }
        };
        if let Some(process) = last {
            info!(key = %key, "last reference released; stopping process");
            process.shutdown().await;
        }
    }

    /// Current reference count for a key (0 if absent).
    pub async fn refcount(&self, key: &str) -> usize {
        self.table
            .lock()
            .await
            .get(key)
            .map(|e| e.refcount)
            .unwrap_or(0)
    }

    /// Number of live processes.
    pub async fn process_count(&self) -> usize {
        self.table.lock().await.len()
    }

    /// Stop every process. Used on gateway shutdown.
    pub async fn shutdown_all(&self) {
        let drained: Vec<Arc<LanguageServerProcess>> = self
            .table
            .lock()
            .await
            .drain()
            .map(|(_, e)| e.process)
            .collect();
        for process in drained {
            process.shutdown().await;
        }
    }
}
