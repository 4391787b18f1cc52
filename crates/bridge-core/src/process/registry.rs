//! Registry of managed processes.

use super::config::ProcessConfig;
use super::record::{epoch_seconds, ProcessRecord, ProcessStatus};
use super::state::ProcessState;
use crate::error::{Result, SupervisorError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};
use tracing::info;

/// One registered process: its immutable config and its mutable record.
#[derive(Debug)]
pub struct ProcessEntry {
    config: Arc<ProcessConfig>,
    /// Registration order, used to break priority ties.
    seq: usize,
    /// Held for the whole of start/stop/restart/exit handling.
    pub(crate) op_lock: Mutex<()>,
    pub(crate) record: RwLock<ProcessRecord>,
}

impl ProcessEntry {
    fn new(config: ProcessConfig, seq: usize) -> Self {
        Self {
            config: Arc::new(config),
            seq,
            op_lock: Mutex::new(()),
            record: RwLock::new(ProcessRecord::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &Arc<ProcessConfig> {
        &self.config
    }

    pub async fn state(&self) -> ProcessState {
        self.record.read().await.state()
    }

    /// Read-only view of the record.
    pub async fn record(&self) -> RwLockReadGuard<'_, ProcessRecord> {
        self.record.read().await
    }

    /// Derived status fields; never exposes the live handle.
    pub async fn status(&self) -> ProcessStatus {
        let record = self.record.read().await;
        ProcessStatus {
            name: self.config.name.clone(),
            state: record.state(),
            pid: record.pid(),
            start_time: record.start_time().map(epoch_seconds),
            restart_count: record.restart_count(),
            last_restart: record.last_restart_time().map(epoch_seconds),
            command: self.config.command_line(),
            priority: self.config.priority,
        }
    }
}

/// Owns the mapping of process name to entry.
///
/// Entries are created once, in `Stopped`, and are never removed.
#[derive(Debug, Default)]
pub struct Registry {
    entries: RwLock<HashMap<String, Arc<ProcessEntry>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a process. Fails if the name is taken or the config is invalid.
    ///
    /// Dependencies need not exist yet; they are checked at start time.
    pub async fn register(&self, config: ProcessConfig) -> Result<()> {
        config.validate()?;

        let mut entries = self.entries.write().await;
        if entries.contains_key(&config.name) {
            return Err(SupervisorError::DuplicateName { name: config.name });
        }

        let name = config.name.clone();
        let seq = entries.len();
        entries.insert(name.clone(), Arc::new(ProcessEntry::new(config, seq)));
        info!("Added process '{}' to manager", name);
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Option<Arc<ProcessEntry>> {
        self.entries.read().await.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.entries.read().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Entries by ascending priority, registration order breaking ties.
    pub async fn startup_order(&self) -> Vec<Arc<ProcessEntry>> {
        let mut entries: Vec<_> = self.entries.read().await.values().cloned().collect();
        entries.sort_by_key(|entry| (entry.config.priority, entry.seq));
        entries
    }

    /// Entries by descending priority: the last started stops first.
    pub async fn shutdown_order(&self) -> Vec<Arc<ProcessEntry>> {
        let mut entries: Vec<_> = self.entries.read().await.values().cloned().collect();
        entries.sort_by_key(|entry| (std::cmp::Reverse(entry.config.priority), entry.seq));
        entries
    }

    /// Status of every process, in startup order.
    pub async fn snapshot(&self) -> Vec<ProcessStatus> {
        let mut statuses = Vec::new();
        for entry in self.startup_order().await {
            statuses.push(entry.status().await);
        }
        statuses
    }
}
