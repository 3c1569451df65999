// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Lineage Contributors
//
// This file is part of Lineage.
//
// Lineage is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// Lineage is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with Lineage. If not, see <https://www.gnu.org/licenses/>.

//! Process registry
//!
//! ## Purpose
//! Tracks live process instances by identifier, resolves finished/running
//! status, exposes outputs after the instance itself has been discarded,
//! and persists checkpoints for running processes when a checkpoint store
//! is configured.
//!
//! ## Fallback Resolution
//! `is_finished`, `outputs`, and `status` check the live and finished sets
//! first and fall back to loading the node from graph storage; only when
//! no source resolves the pid is [`ProcessError::NotFound`] raised.
//!
//! ## Bounded Finished Cache
//! Recently finished pids map to their last outputs in a bounded LRU
//! cache; the oldest entries are evicted once the bound is reached, after
//! which queries fall through to storage.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};

use lineage_graph::{GraphError, GraphStore, LinkClass};

use crate::checkpoint::CheckpointStore;
use crate::process::{OutputMap, ProcessInstance};
use crate::value::DataValue;
use crate::{ProcessError, ProcessId, ProcessResult};

/// Externally observable status of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// The process has not reached a terminal outcome
    Running,

    /// The process finished without error
    FinishedOk,

    /// The process failed
    Failed,
}

struct RunningEntry {
    label: String,
    done: Arc<Notify>,
}

#[derive(Clone)]
struct FinishedEntry {
    outputs: OutputMap,
    failed: bool,
}

/// Bounded LRU of recently finished processes
///
/// Most recently used at the back of the access order, least recently
/// used at the front; eviction pops the front once capacity is reached.
struct FinishedCache {
    capacity: usize,
    entries: HashMap<ProcessId, FinishedEntry>,
    access_order: VecDeque<ProcessId>,
}

impl FinishedCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::with_capacity(capacity),
            access_order: VecDeque::with_capacity(capacity),
        }
    }

    fn get(&mut self, pid: ProcessId) -> Option<FinishedEntry> {
        let entry = self.entries.get(&pid).cloned();
        if entry.is_some() {
            if let Some(pos) = self.access_order.iter().position(|p| *p == pid) {
                self.access_order.remove(pos);
            }
            self.access_order.push_back(pid);
        }
        entry
    }

    fn insert(&mut self, pid: ProcessId, entry: FinishedEntry) {
        if self.entries.contains_key(&pid) {
            self.entries.insert(pid, entry);
            if let Some(pos) = self.access_order.iter().position(|p| *p == pid) {
                self.access_order.remove(pos);
            }
            self.access_order.push_back(pid);
            return;
        }

        if self.entries.len() >= self.capacity {
            if let Some(evicted) = self.access_order.pop_front() {
                self.entries.remove(&evicted);
                metrics::counter!("lineage_registry_finished_evictions_total").increment(1);
            }
        }

        self.access_order.push_back(pid);
        self.entries.insert(pid, entry);
    }
}

/// In-memory registry of process instances
pub struct ProcessRegistry {
    store: Arc<dyn GraphStore>,
    running: RwLock<HashMap<ProcessId, RunningEntry>>,
    finished: RwLock<FinishedCache>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
}

impl ProcessRegistry {
    /// Create a registry without checkpoint persistence
    pub fn new(store: Arc<dyn GraphStore>, finished_capacity: usize) -> Self {
        Self {
            store,
            running: RwLock::new(HashMap::new()),
            finished: RwLock::new(FinishedCache::new(finished_capacity)),
            checkpoints: None,
        }
    }

    /// Create a registry that persists a checkpoint for every running process
    pub fn with_checkpoints(
        store: Arc<dyn GraphStore>,
        finished_capacity: usize,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            checkpoints: Some(checkpoints),
            ..Self::new(store, finished_capacity)
        }
    }

    /// The configured checkpoint store, if any
    pub fn checkpoint_store(&self) -> Option<Arc<dyn CheckpointStore>> {
        self.checkpoints.clone()
    }

    /// Register a process entering `Running`
    ///
    /// Persists a checkpoint immediately when a checkpoint store is
    /// configured, so a crash right after this point can resume.
    /// Idempotent: a pid registered at submit time keeps its entry (and
    /// its waiters) when the spawned task registers again.
    pub async fn register_running(&self, instance: &ProcessInstance) -> ProcessResult<()> {
        let pid = instance.pid();
        let label = instance.label().to_string();
        self.running
            .write()
            .await
            .entry(pid)
            .or_insert_with(|| RunningEntry {
                label,
                done: Arc::new(Notify::new()),
            });

        if let Some(checkpoints) = &self.checkpoints {
            let bundle = instance.checkpoint();
            if let Err(err) = checkpoints.persist(&bundle).await {
                self.running.write().await.remove(&pid);
                return Err(err);
            }
            metrics::counter!("lineage_checkpoints_persisted_total").increment(1);
        }
        Ok(())
    }

    /// Record a process reaching its terminal outcome
    ///
    /// Moves the pid from the running set into the finished cache with its
    /// last outputs, drops the persisted checkpoint, and wakes waiters.
    pub async fn finish(&self, pid: ProcessId, outputs: OutputMap, failed: bool) {
        let removed = self.running.write().await.remove(&pid);
        self.finished
            .write()
            .await
            .insert(pid, FinishedEntry { outputs, failed });

        if let Some(checkpoints) = &self.checkpoints {
            if let Err(err) = checkpoints.remove(pid).await {
                tracing::debug!(pid = %pid, "could not remove checkpoint: {err}");
            }
        }

        if let Some(entry) = removed {
            entry.done.notify_waiters();
        }
    }

    /// Whether the process has reached a terminal outcome
    ///
    /// ## Errors
    /// [`ProcessError::NotFound`] when neither the registry nor storage can
    /// resolve the pid. The query never mutates process state.
    pub async fn is_finished(&self, pid: ProcessId) -> ProcessResult<bool> {
        if self.finished.write().await.get(pid).is_some() {
            return Ok(true);
        }
        if self.running.read().await.contains_key(&pid) {
            return Ok(false);
        }
        let record = self.store.load_node(pid).await.map_err(|err| match err {
            GraphError::NotExistent(_) => ProcessError::NotFound(pid),
            other => other.into(),
        })?;
        Ok(record.is_terminal())
    }

    /// The output mapping of a process
    ///
    /// Served from the finished cache when possible, otherwise rebuilt
    /// from the stored output links of the node.
    pub async fn outputs(&self, pid: ProcessId) -> ProcessResult<OutputMap> {
        if let Some(entry) = self.finished.write().await.get(pid) {
            return Ok(entry.outputs);
        }
        self.outputs_from_store(pid).await
    }

    /// Externally observable status of a process
    pub async fn status(&self, pid: ProcessId) -> ProcessResult<ProcessStatus> {
        if self.running.read().await.contains_key(&pid) {
            return Ok(ProcessStatus::Running);
        }
        if let Some(entry) = self.finished.write().await.get(pid) {
            return Ok(if entry.failed {
                ProcessStatus::Failed
            } else {
                ProcessStatus::FinishedOk
            });
        }
        let record = self.store.load_node(pid).await.map_err(|err| match err {
            GraphError::NotExistent(_) => ProcessError::NotFound(pid),
            other => other.into(),
        })?;
        Ok(if record.is_failed() {
            ProcessStatus::Failed
        } else if record.is_finished_ok() {
            ProcessStatus::FinishedOk
        } else {
            ProcessStatus::Running
        })
    }

    /// Wait for a process to reach its terminal outcome, returning its
    /// outputs
    pub async fn wait(&self, pid: ProcessId) -> ProcessResult<OutputMap> {
        loop {
            let notify = {
                let running = self.running.read().await;
                running.get(&pid).map(|entry| entry.done.clone())
            };
            match notify {
                None => return self.outputs(pid).await,
                Some(notify) => {
                    let notified = notify.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();
                    // Completion may have raced the subscription
                    if !self.running.read().await.contains_key(&pid) {
                        continue;
                    }
                    notified.await;
                }
            }
        }
    }

    /// Identifiers of currently running processes
    pub async fn running_pids(&self) -> Vec<ProcessId> {
        self.running.read().await.keys().copied().collect()
    }

    /// Label of a currently running process
    pub async fn running_label(&self, pid: ProcessId) -> Option<String> {
        self.running
            .read()
            .await
            .get(&pid)
            .map(|entry| entry.label.clone())
    }

    /// All checkpoints persisted by the configured store
    pub async fn load_all_checkpoints(&self) -> ProcessResult<Vec<ProcessId>> {
        match &self.checkpoints {
            Some(checkpoints) => checkpoints.list().await,
            None => Ok(Vec::new()),
        }
    }

    async fn outputs_from_store(&self, pid: ProcessId) -> ProcessResult<OutputMap> {
        let links = self
            .store
            .outgoing_links(pid)
            .await
            .map_err(|err| match err {
                GraphError::NotExistent(_) => ProcessError::NotFound(pid),
                other => other.into(),
            })?;

        let mut outputs = OutputMap::new();
        for link in links {
            if !matches!(link.link_type.class(), LinkClass::Create | LinkClass::Return) {
                continue;
            }
            if outputs.contains_key(&link.label) {
                continue;
            }
            let value = DataValue::load(self.store.as_ref(), link.target).await?;
            outputs.insert(link.label, value);
        }
        Ok(outputs)
    }
}
