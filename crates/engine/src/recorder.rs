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

//! Provenance recorder
//!
//! ## Purpose
//! Translates process lifecycle events into graph mutations: node storage,
//! CREATE/INPUT/CALL links at creation time and CREATE/RETURN links on
//! output emission.
//!
//! ## Ordering
//! `record_creation` completes every creation-time write before the process
//! enters `Running`, so no partially-applied links can exist at a
//! checkpoint boundary. Emission writes complete before the terminal
//! transition; sealing (driven by the state machine) is the last write.

use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use lineage_graph::{
    GraphError, GraphStore, LinkType, NodeKind, ATTR_DESCRIPTION, ATTR_LABEL, ATTR_PROCESS_LABEL,
};

use crate::spec::{InputValue, ValidatedInputs};
use crate::stack::StackFrame;
use crate::value::DataValue;
use crate::{ProcessError, ProcessResult};

/// Records provenance for one process run
///
/// When provenance storage is disabled for the run, every graph write is
/// skipped; the node record still exists in memory so the process keeps a
/// resolvable identity.
pub struct ProvenanceRecorder {
    store: Arc<dyn GraphStore>,
    enabled: bool,
}

impl ProvenanceRecorder {
    /// Create a recorder writing through the given store
    pub fn new(store: Arc<dyn GraphStore>, enabled: bool) -> Self {
        Self { store, enabled }
    }

    /// Whether provenance storage is enabled for this run
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record the creation of a process node
    ///
    /// Sets the process label and metadata attributes, links every
    /// database input (group ports flattened to `{group}_{key}` labels),
    /// attributes unstored inputs to the calling process via CREATE links,
    /// adds the CALL link from the parent, and stores the node.
    pub async fn record_creation(
        &self,
        node: Uuid,
        kind: NodeKind,
        label: &str,
        parent: Option<&StackFrame>,
        inputs: &ValidatedInputs,
    ) -> ProcessResult<()> {
        self.store
            .set_attribute(node, ATTR_PROCESS_LABEL, json!(label))
            .await?;
        if let Some(description) = inputs.description() {
            self.store
                .set_attribute(node, ATTR_DESCRIPTION, json!(description))
                .await?;
        }
        if let Some(label_meta) = inputs.label() {
            self.store
                .set_attribute(node, ATTR_LABEL, json!(label_meta))
                .await?;
        }

        if !self.enabled {
            return Ok(());
        }

        for (name, input) in inputs.db_entries() {
            match input {
                InputValue::Data(value) => {
                    self.link_input(node, kind, name, value, parent).await?;
                }
                InputValue::Group(members) => {
                    for (key, member) in members {
                        let flattened = format!("{}_{}", name, key);
                        self.link_input(node, kind, &flattened, member, parent)
                            .await?;
                    }
                }
                InputValue::Raw(_) => {
                    return Err(ProcessError::Execution(format!(
                        "database input '{}' was not materialized before linking",
                        name
                    )));
                }
            }
        }

        if let Some(parent) = parent {
            self.store
                .add_link(parent.node, node, LinkType::call_for(kind), "CALL")
                .await?;
            metrics::counter!("lineage_links_recorded_total", "class" => "call").increment(1);
        }

        self.store.store_node(node).await?;
        Ok(())
    }

    /// Record an output emission
    ///
    /// Claims CREATE ownership of the value when it has no creator yet
    /// (an already-created value is silently treated as provenanced),
    /// stores the value, and adds the RETURN link when the emitting
    /// process is a workflow.
    pub async fn record_output(
        &self,
        node: Uuid,
        kind: NodeKind,
        port: &str,
        value: &DataValue,
    ) -> ProcessResult<()> {
        if !self.enabled {
            return Ok(());
        }

        match self
            .store
            .add_link(node, value.uuid(), LinkType::Create, port)
            .await
        {
            Ok(()) => {
                metrics::counter!("lineage_links_recorded_total", "class" => "create").increment(1);
            }
            // Already created elsewhere
            Err(GraphError::UniqueLink(_)) => {}
            Err(err) => return Err(err.into()),
        }

        self.store.store_node(value.uuid()).await?;

        if kind == NodeKind::Workflow {
            self.store
                .add_link(node, value.uuid(), LinkType::Return, port)
                .await?;
            metrics::counter!("lineage_links_recorded_total", "class" => "return").increment(1);
        }
        Ok(())
    }

    async fn link_input(
        &self,
        node: Uuid,
        kind: NodeKind,
        label: &str,
        value: &DataValue,
        parent: Option<&StackFrame>,
    ) -> ProcessResult<()> {
        let record = self.store.load_node(value.uuid()).await?;
        if !record.is_stored() {
            // An unstored input is assumed to have been created by the caller
            if let Some(parent) = parent {
                self.store
                    .add_link(parent.node, value.uuid(), LinkType::Create, "CREATE")
                    .await?;
                metrics::counter!("lineage_links_recorded_total", "class" => "create").increment(1);
            }
            self.store.store_node(value.uuid()).await?;
        }
        self.store
            .add_link(value.uuid(), node, LinkType::input_for(kind), label)
            .await?;
        metrics::counter!("lineage_links_recorded_total", "class" => "input").increment(1);
        Ok(())
    }
}
