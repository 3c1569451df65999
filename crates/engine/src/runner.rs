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

//! Process runner
//!
//! ## Purpose
//! Entry points exposed to callers: synchronous `run`, asynchronous
//! `submit`, status queries, and checkpoint `resume`/`retry`. Each
//! top-level invocation owns a fresh call stack, so independent process
//! trees never observe each other's frames.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use lineage_graph::GraphStore;

use crate::checkpoint::{CheckpointBundle, CheckpointStore};
use crate::process::{OutputMap, ProcessBehavior, ProcessInstance};
use crate::registry::{ProcessRegistry, ProcessStatus};
use crate::spec::ProcessInputs;
use crate::stack::CallStack;
use crate::{ProcessId, ProcessResult};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Bound of the registry's finished-process cache
    pub finished_cache_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            finished_cache_capacity: 1024,
        }
    }
}

/// Drives process execution against a graph store
pub struct Runner {
    store: Arc<dyn GraphStore>,
    registry: Arc<ProcessRegistry>,
}

impl Runner {
    /// Create a runner with default configuration and no checkpoint store
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self::with_config(store, RunnerConfig::default())
    }

    /// Create a runner with explicit configuration
    pub fn with_config(store: Arc<dyn GraphStore>, config: RunnerConfig) -> Self {
        let registry = Arc::new(ProcessRegistry::new(
            store.clone(),
            config.finished_cache_capacity,
        ));
        Self { store, registry }
    }

    /// Create a runner persisting checkpoints for every running process
    pub fn with_checkpoints(
        store: Arc<dyn GraphStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        config: RunnerConfig,
    ) -> Self {
        let registry = Arc::new(ProcessRegistry::with_checkpoints(
            store.clone(),
            config.finished_cache_capacity,
            checkpoints,
        ));
        Self { store, registry }
    }

    /// The registry tracking processes started through this runner
    pub fn registry(&self) -> Arc<ProcessRegistry> {
        self.registry.clone()
    }

    /// The backing graph store
    pub fn store(&self) -> Arc<dyn GraphStore> {
        self.store.clone()
    }

    /// Run a process to completion, blocking cooperatively
    pub async fn run<B: ProcessBehavior>(
        &self,
        behavior: B,
        inputs: ProcessInputs,
    ) -> ProcessResult<OutputMap> {
        self.run_arc(Arc::new(behavior), inputs).await
    }

    /// Run an already shared behavior to completion
    pub async fn run_arc(
        &self,
        behavior: Arc<dyn ProcessBehavior>,
        inputs: ProcessInputs,
    ) -> ProcessResult<OutputMap> {
        let instance =
            ProcessInstance::create(self.store.clone(), CallStack::new(), behavior, inputs).await?;
        instance.run(self.registry.clone()).await
    }

    /// Submit a process for asynchronous execution
    ///
    /// The instance is created synchronously, so the node and its input
    /// links exist and the pid is known before this returns; the body runs
    /// on a spawned task. Await completion through [`Runner::wait`].
    pub async fn submit<B: ProcessBehavior>(
        &self,
        behavior: B,
        inputs: ProcessInputs,
    ) -> ProcessResult<ProcessId> {
        self.submit_arc(Arc::new(behavior), inputs).await
    }

    /// Submit an already shared behavior for asynchronous execution
    pub async fn submit_arc(
        &self,
        behavior: Arc<dyn ProcessBehavior>,
        inputs: ProcessInputs,
    ) -> ProcessResult<ProcessId> {
        let instance =
            ProcessInstance::create(self.store.clone(), CallStack::new(), behavior, inputs).await?;
        let pid = instance.pid();
        // Register before spawning so waiters never observe a gap between
        // submission and the task entering RUNNING
        self.registry.register_running(&instance).await?;
        let registry = self.registry.clone();
        tokio::spawn(async move {
            if let Err(err) = instance.run(registry).await {
                tracing::warn!(pid = %pid, "submitted process failed: {err}");
            }
        });
        Ok(pid)
    }

    /// Wait for a submitted process to finish, returning its outputs
    pub async fn wait(&self, pid: ProcessId) -> ProcessResult<OutputMap> {
        self.registry.wait(pid).await
    }

    /// Externally observable status of a process
    pub async fn status(&self, pid: ProcessId) -> ProcessResult<ProcessStatus> {
        self.registry.status(pid).await
    }

    /// Resume a checkpointed process and run it to completion
    pub async fn resume(
        &self,
        behavior: Arc<dyn ProcessBehavior>,
        bundle: CheckpointBundle,
    ) -> ProcessResult<OutputMap> {
        let instance =
            ProcessInstance::from_checkpoint(self.store.clone(), CallStack::new(), behavior, bundle)
                .await?;
        instance.run(self.registry.clone()).await
    }

    /// Retry a checkpointed process as a copy
    ///
    /// Produces a brand-new unsealed node, distinct from the original,
    /// with equivalent input links re-established. Returns the new pid
    /// alongside the outputs.
    pub async fn retry(
        &self,
        behavior: Arc<dyn ProcessBehavior>,
        bundle: CheckpointBundle,
    ) -> ProcessResult<(ProcessId, OutputMap)> {
        let instance = ProcessInstance::from_checkpoint(
            self.store.clone(),
            CallStack::new(),
            behavior,
            bundle.as_copy(),
        )
        .await?;
        let pid = instance.pid();
        let outputs = instance.run(self.registry.clone()).await?;
        Ok((pid, outputs))
    }
}
