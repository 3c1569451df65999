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

//! # Lineage Provenance Graph
//!
//! ## Purpose
//! Data model and storage interface for the immutable provenance graph:
//! data and process nodes connected by typed, labeled links recording
//! computational history.
//!
//! ## Architecture Context
//! The engine crate (`lineage-engine`) drives process execution and records
//! provenance through the [`GraphStore`] trait defined here. Production
//! deployments back this trait with a relational database; this crate ships
//! the reference [`MemoryGraphStore`] used for testing and embedded runs.
//!
//! ### Component Diagram
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │ lineage-engine                                      │
//! │   ProcessInstance ── ProvenanceRecorder ──┐         │
//! └────────────────────────────────────────────│────────┘
//!                                              v
//! ┌─────────────────────────────────────────────────────┐
//! │ GraphStore trait (this crate)                       │
//! │   └─ MemoryGraphStore (reference implementation)    │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Components
//! - [`NodeRecord`] / [`LinkRecord`]: persisted graph vertices and edges
//! - [`LinkType`]: the enforced link taxonomy (CREATE, RETURN, INPUT, CALL)
//! - [`GraphStore`]: trait for pluggable graph backends
//! - [`MemoryGraphStore`]: in-memory backend with full constraint checking
//!
//! ## Invariants
//! - A sealed node accepts no attribute writes and no incoming links.
//! - A data node has at most one incoming CREATE link; a process node has
//!   at most one incoming CALL link. Violations surface as
//!   [`GraphError::UniqueLink`], never silent overwrites.
//! - Link endpoints must respect the taxonomy (e.g. only workflows may be
//!   the source of RETURN and CALL links).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod store;
pub mod types;

pub use memory::MemoryGraphStore;
pub use store::GraphStore;
pub use types::{
    LinkClass, LinkRecord, LinkType, NodeKind, NodeRecord, ATTR_DESCRIPTION, ATTR_EXCEPTION,
    ATTR_FAILED, ATTR_FINISHED_OK, ATTR_LABEL, ATTR_PROCESS_LABEL, ATTR_VALUE,
};

use uuid::Uuid;

/// Errors raised at the graph storage boundary.
///
/// ## Design
/// Constraint violations (sealing, uniqueness, taxonomy) are distinct
/// variants so the engine can react to them individually: the recorder
/// swallows a [`GraphError::UniqueLink`] when claiming CREATE ownership of
/// an already-created value, while every other violation propagates.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// No node with the given identifier exists
    #[error("node does not exist: {0}")]
    NotExistent(Uuid),

    /// Operation requires a stored node but the node is unstored
    #[error("node is not stored: {0}")]
    NotStored(Uuid),

    /// Write attempted on a sealed node
    #[error("modification not allowed: {0}")]
    ModificationNotAllowed(String),

    /// Seal attempted on an already sealed node
    #[error("node is already sealed: {0}")]
    AlreadySealed(Uuid),

    /// Unique-link constraint violated (duplicate CREATE/CALL or duplicate triple)
    #[error("unique link violation: {0}")]
    UniqueLink(String),

    /// Link endpoints do not satisfy the taxonomy
    #[error("invalid link: {0}")]
    InvalidLink(String),

    /// Backend storage failure
    #[error("storage error: {0}")]
    Storage(String),
}

/// Convenience result alias for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;
