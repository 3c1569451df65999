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

//! Storage interface for the provenance graph
//!
//! ## Purpose
//! Trait boundary between the execution engine and the backing node/link
//! store. Every mutation is atomic with respect to other concurrent
//! mutations; unique-link constraints are enforced here so that racing
//! writers surface integrity errors instead of silently overwriting.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::types::{LinkRecord, LinkType, NodeKind, NodeRecord};
use crate::GraphResult;

/// Pluggable backend for the provenance graph
///
/// ## Contract
/// - `create_node` allocates an unstored record; `store_node` assigns the
///   primary key and is idempotent for already-stored nodes.
/// - `add_link` requires both endpoints to exist and the source to be
///   stored; the target may still be unstored (its incoming provenance is
///   recorded before it is persisted). A sealed target rejects the link.
/// - `seal` is the final write to a node; any later attribute write or
///   incoming link fails with `ModificationNotAllowed`. Clearing a
///   checkpoint remains legal after sealing so terminal processes can drop
///   their continuation state.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Allocate a new unstored node of the given kind, returning its uuid
    async fn create_node(&self, kind: NodeKind) -> GraphResult<Uuid>;

    /// Store a node, assigning its primary key
    ///
    /// ## Errors
    /// `Storage` if required fields are missing (data nodes need a payload,
    /// process nodes need a process label). Storing an already-stored node
    /// returns the existing primary key.
    async fn store_node(&self, node: Uuid) -> GraphResult<u64>;

    /// Add a typed, labeled link between two nodes
    ///
    /// ## Errors
    /// - `InvalidLink` when the endpoint kinds violate the taxonomy
    /// - `UniqueLink` on a duplicate `(source, target, label)` within the
    ///   same class, or a second incoming CREATE/CALL on the target
    /// - `ModificationNotAllowed` when the target is sealed
    /// - `NotStored` when the source has not been stored
    async fn add_link(
        &self,
        source: Uuid,
        target: Uuid,
        link_type: LinkType,
        label: &str,
    ) -> GraphResult<()>;

    /// Set an attribute on a node
    async fn set_attribute(&self, node: Uuid, key: &str, value: Value) -> GraphResult<()>;

    /// Seal a node, making it permanently immutable
    ///
    /// ## Errors
    /// `AlreadySealed` on a double seal, `NotStored` for unstored nodes.
    async fn seal(&self, node: Uuid) -> GraphResult<()>;

    /// Load a node record by uuid
    async fn load_node(&self, node: Uuid) -> GraphResult<NodeRecord>;

    /// Set or clear the checkpoint blob of a node
    ///
    /// Setting a blob on a sealed node is rejected; clearing is always
    /// permitted.
    async fn set_checkpoint(&self, node: Uuid, blob: Option<Vec<u8>>) -> GraphResult<()>;

    /// Clone a node into a fresh unstored record with a new uuid
    ///
    /// Copies kind and attributes but strips the terminal outcome
    /// attributes, the seal, the primary key, the checkpoint, and all
    /// links. Used by copy-resume ("retry").
    async fn clone_node(&self, node: Uuid) -> GraphResult<Uuid>;

    /// All links pointing at the given node
    async fn incoming_links(&self, node: Uuid) -> GraphResult<Vec<LinkRecord>>;

    /// All links originating from the given node
    async fn outgoing_links(&self, node: Uuid) -> GraphResult<Vec<LinkRecord>>;
}
