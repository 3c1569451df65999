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

//! In-memory graph store
//!
//! ## Purpose
//! Reference [`GraphStore`] implementation with full constraint checking.
//! Used by tests and embedded runs; production deployments substitute a
//! relational backend behind the same trait.
//!
//! ## Thread Safety
//! All state lives behind a single `Arc<RwLock<_>>`, so each operation is
//! atomic with respect to concurrent operations from other process trees.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::GraphStore;
use crate::types::{
    LinkRecord, LinkType, NodeKind, NodeRecord, ATTR_EXCEPTION, ATTR_FAILED, ATTR_FINISHED_OK,
    ATTR_PROCESS_LABEL, ATTR_VALUE,
};
use crate::{GraphError, GraphResult};

#[derive(Default)]
struct GraphInner {
    nodes: HashMap<Uuid, NodeRecord>,
    links: Vec<LinkRecord>,
    next_pk: u64,
}

/// In-memory provenance graph store
///
/// Cloning is cheap and shares the underlying graph.
#[derive(Clone, Default)]
pub struct MemoryGraphStore {
    inner: Arc<RwLock<GraphInner>>,
}

impl MemoryGraphStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes currently in the store (stored or not)
    pub async fn node_count(&self) -> usize {
        self.inner.read().await.nodes.len()
    }

    /// Number of links currently in the store
    pub async fn link_count(&self) -> usize {
        self.inner.read().await.links.len()
    }
}

impl GraphInner {
    fn node(&self, id: Uuid) -> GraphResult<&NodeRecord> {
        self.nodes.get(&id).ok_or(GraphError::NotExistent(id))
    }

    fn node_mut(&mut self, id: Uuid) -> GraphResult<&mut NodeRecord> {
        self.nodes.get_mut(&id).ok_or(GraphError::NotExistent(id))
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn create_node(&self, kind: NodeKind) -> GraphResult<Uuid> {
        let record = NodeRecord::new(kind);
        let uuid = record.uuid;
        self.inner.write().await.nodes.insert(uuid, record);
        Ok(uuid)
    }

    async fn store_node(&self, node: Uuid) -> GraphResult<u64> {
        let mut inner = self.inner.write().await;
        let record = inner.node(node)?;
        if let Some(pk) = record.pk {
            return Ok(pk);
        }
        let missing = match record.kind {
            NodeKind::Data => !record.attributes.contains_key(ATTR_VALUE),
            NodeKind::Calculation | NodeKind::Workflow => {
                !record.attributes.contains_key(ATTR_PROCESS_LABEL)
            }
        };
        if missing {
            return Err(GraphError::Storage(format!(
                "cannot store {} node {}: required fields missing",
                record.kind, node
            )));
        }
        inner.next_pk += 1;
        let pk = inner.next_pk;
        inner.node_mut(node)?.pk = Some(pk);
        tracing::debug!(node = %node, pk, "node stored");
        Ok(pk)
    }

    async fn add_link(
        &self,
        source: Uuid,
        target: Uuid,
        link_type: LinkType,
        label: &str,
    ) -> GraphResult<()> {
        let mut inner = self.inner.write().await;

        let source_record = inner.node(source)?;
        let source_kind = source_record.kind;
        if !source_record.is_stored() {
            return Err(GraphError::NotStored(source));
        }

        let target_record = inner.node(target)?;
        let target_kind = target_record.kind;
        if target_record.sealed {
            return Err(GraphError::ModificationNotAllowed(format!(
                "cannot add incoming {} link to sealed node {}",
                link_type, target
            )));
        }

        link_type.validate_endpoints(source_kind, target_kind)?;

        let class = link_type.class();
        for existing in inner.links.iter().filter(|l| l.target == target) {
            if existing.link_type.class() != class {
                continue;
            }
            if link_type.unique_incoming() {
                return Err(GraphError::UniqueLink(format!(
                    "node {} already has an incoming {:?} link from {}",
                    target, class, existing.source
                )));
            }
            if existing.source == source && existing.label == label {
                return Err(GraphError::UniqueLink(format!(
                    "duplicate {} link '{}' from {} to {}",
                    link_type, label, source, target
                )));
            }
        }

        inner.links.push(LinkRecord {
            source,
            target,
            link_type,
            label: label.to_string(),
        });
        tracing::debug!(
            source = %source,
            target = %target,
            link_type = %link_type,
            label,
            "link added"
        );
        Ok(())
    }

    async fn set_attribute(&self, node: Uuid, key: &str, value: Value) -> GraphResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner.node_mut(node)?;
        if record.sealed {
            return Err(GraphError::ModificationNotAllowed(format!(
                "cannot set attribute '{}' on sealed node {}",
                key, node
            )));
        }
        record.attributes.insert(key.to_string(), value);
        Ok(())
    }

    async fn seal(&self, node: Uuid) -> GraphResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner.node_mut(node)?;
        if record.sealed {
            return Err(GraphError::AlreadySealed(node));
        }
        if !record.is_stored() {
            return Err(GraphError::NotStored(node));
        }
        record.sealed = true;
        Ok(())
    }

    async fn load_node(&self, node: Uuid) -> GraphResult<NodeRecord> {
        let inner = self.inner.read().await;
        inner.node(node).map(|record| record.clone())
    }

    async fn set_checkpoint(&self, node: Uuid, blob: Option<Vec<u8>>) -> GraphResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner.node_mut(node)?;
        if record.sealed && blob.is_some() {
            return Err(GraphError::ModificationNotAllowed(format!(
                "cannot set checkpoint on sealed node {}",
                node
            )));
        }
        record.checkpoint = blob;
        Ok(())
    }

    async fn clone_node(&self, node: Uuid) -> GraphResult<Uuid> {
        let mut inner = self.inner.write().await;
        let mut copy = inner.node(node)?.clone();
        copy.uuid = Uuid::new_v4();
        copy.pk = None;
        copy.sealed = false;
        copy.checkpoint = None;
        copy.created_at = chrono::Utc::now();
        copy.attributes.remove(ATTR_FINISHED_OK);
        copy.attributes.remove(ATTR_FAILED);
        copy.attributes.remove(ATTR_EXCEPTION);
        let uuid = copy.uuid;
        inner.nodes.insert(uuid, copy);
        Ok(uuid)
    }

    async fn incoming_links(&self, node: Uuid) -> GraphResult<Vec<LinkRecord>> {
        let inner = self.inner.read().await;
        inner.node(node)?;
        Ok(inner
            .links
            .iter()
            .filter(|l| l.target == node)
            .cloned()
            .collect())
    }

    async fn outgoing_links(&self, node: Uuid) -> GraphResult<Vec<LinkRecord>> {
        let inner = self.inner.read().await;
        inner.node(node)?;
        Ok(inner
            .links
            .iter()
            .filter(|l| l.source == node)
            .cloned()
            .collect())
    }
}
