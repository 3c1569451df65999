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

//! Checkpoint bundles and persistence
//!
//! ## Purpose
//! Serialize the full state of a process instance into an opaque,
//! versioned bundle so execution can suspend and resume across process
//! restarts.
//!
//! ## Restricted Deserialization
//! Bundles may arrive from untrusted export sources, so decoding is strict
//! typed deserialization only: unknown fields are rejected
//! (`deny_unknown_fields`) and the schema version is validated before any
//! content is used. No arbitrary object construction is possible.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use lineage_graph::GraphStore;

use crate::process::OutputMap;
use crate::spec::ValidatedInputs;
use crate::{ProcessError, ProcessId, ProcessResult};

/// Current checkpoint bundle schema version
///
/// Bundles with a newer version than this are rejected on decode
/// (forward incompatibility); older bundles are accepted.
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// Serialized continuation state of a process instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckpointBundle {
    /// Bundle schema version
    pub schema_version: u32,

    /// Identifier of the checkpointed process
    pub process_id: ProcessId,

    /// Uuid of the process node
    pub node: Uuid,

    /// Parent process identifier, if not top-level
    pub parent: Option<ProcessId>,

    /// Whether resuming must clone the node instead of re-loading it
    pub is_copy: bool,

    /// Label of the process class or function
    pub label: String,

    /// Validated input mapping at checkpoint time
    pub inputs: ValidatedInputs,

    /// Output mapping accumulated up to checkpoint time
    pub outputs: OutputMap,

    /// When the bundle was created
    pub created_at: DateTime<Utc>,
}

impl CheckpointBundle {
    /// Encode the bundle into its opaque byte representation
    pub fn encode(&self) -> ProcessResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|err| ProcessError::Checkpoint(err.to_string()))
    }

    /// Decode a bundle through the restricted deserializer
    ///
    /// ## Errors
    /// [`ProcessError::Checkpoint`] on malformed content, unknown fields,
    /// or a schema version newer than [`CHECKPOINT_SCHEMA_VERSION`].
    pub fn decode(bytes: &[u8]) -> ProcessResult<Self> {
        let bundle: Self =
            serde_json::from_slice(bytes).map_err(|err| ProcessError::Checkpoint(err.to_string()))?;
        if bundle.schema_version > CHECKPOINT_SCHEMA_VERSION {
            return Err(ProcessError::Checkpoint(format!(
                "incompatible checkpoint schema version {} (current {})",
                bundle.schema_version, CHECKPOINT_SCHEMA_VERSION
            )));
        }
        Ok(bundle)
    }

    /// Mark the bundle as a copy-resume ("retry")
    ///
    /// A copy-resume always produces a brand-new unsealed node with
    /// equivalent input links.
    pub fn as_copy(mut self) -> Self {
        self.is_copy = true;
        self
    }
}

/// Pluggable persistence for checkpoint bundles
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a bundle, keyed by its process id
    async fn persist(&self, bundle: &CheckpointBundle) -> ProcessResult<()>;

    /// Load the bundle for a process id
    async fn load(&self, pid: ProcessId) -> ProcessResult<CheckpointBundle>;

    /// Remove the bundle for a process id, if present
    async fn remove(&self, pid: ProcessId) -> ProcessResult<()>;

    /// Process ids with a persisted bundle
    ///
    /// Backends that cannot enumerate return an empty list.
    async fn list(&self) -> ProcessResult<Vec<ProcessId>>;
}

/// In-memory checkpoint store for testing and embedded runs
#[derive(Clone, Default)]
pub struct MemoryCheckpointStore {
    bundles: Arc<RwLock<HashMap<ProcessId, Vec<u8>>>>,
}

impl MemoryCheckpointStore {
    /// An empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn persist(&self, bundle: &CheckpointBundle) -> ProcessResult<()> {
        let bytes = bundle.encode()?;
        self.bundles
            .write()
            .await
            .insert(bundle.process_id, bytes);
        Ok(())
    }

    async fn load(&self, pid: ProcessId) -> ProcessResult<CheckpointBundle> {
        let bundles = self.bundles.read().await;
        let bytes = bundles
            .get(&pid)
            .ok_or_else(|| ProcessError::Checkpoint(format!("no checkpoint for process {}", pid)))?;
        CheckpointBundle::decode(bytes)
    }

    async fn remove(&self, pid: ProcessId) -> ProcessResult<()> {
        self.bundles.write().await.remove(&pid);
        Ok(())
    }

    async fn list(&self) -> ProcessResult<Vec<ProcessId>> {
        Ok(self.bundles.read().await.keys().copied().collect())
    }
}

/// Checkpoint store writing bundles onto the process node itself
///
/// The blob lives in the node's checkpoint slot and is stripped on any
/// external export. Enumeration is not supported by the graph boundary,
/// so `list` returns an empty list.
pub struct NodeCheckpointStore {
    store: Arc<dyn GraphStore>,
}

impl NodeCheckpointStore {
    /// Create a store writing through the given graph backend
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CheckpointStore for NodeCheckpointStore {
    async fn persist(&self, bundle: &CheckpointBundle) -> ProcessResult<()> {
        let bytes = bundle.encode()?;
        self.store.set_checkpoint(bundle.node, Some(bytes)).await?;
        Ok(())
    }

    async fn load(&self, pid: ProcessId) -> ProcessResult<CheckpointBundle> {
        let record = self.store.load_node(pid).await?;
        let bytes = record
            .checkpoint
            .ok_or_else(|| ProcessError::Checkpoint(format!("no checkpoint for process {}", pid)))?;
        CheckpointBundle::decode(&bytes)
    }

    async fn remove(&self, pid: ProcessId) -> ProcessResult<()> {
        self.store.set_checkpoint(pid, None).await?;
        Ok(())
    }

    async fn list(&self) -> ProcessResult<Vec<ProcessId>> {
        Ok(Vec::new())
    }
}
