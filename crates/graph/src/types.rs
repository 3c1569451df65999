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

//! Provenance graph type definitions
//!
//! ## Purpose
//! Node and link records, node kinds, and the enforced link-type taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::{GraphError, GraphResult};

/// Attribute key holding the label of the process class or function
pub const ATTR_PROCESS_LABEL: &str = "process_label";

/// Attribute key set to `true` when a process finished without error
pub const ATTR_FINISHED_OK: &str = "finished_ok";

/// Attribute key set to `true` when a process failed
pub const ATTR_FAILED: &str = "failed";

/// Attribute key holding the failure message of a failed process
pub const ATTR_EXCEPTION: &str = "exception";

/// Attribute key holding a caller-supplied description
pub const ATTR_DESCRIPTION: &str = "description";

/// Attribute key holding a caller-supplied human-readable label
pub const ATTR_LABEL: &str = "label";

/// Attribute key holding the payload of a data node
pub const ATTR_VALUE: &str = "value";

/// Kind of a graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Plain data value
    Data,

    /// Calculation process (creates data)
    Calculation,

    /// Workflow process (calls other processes, returns data)
    Workflow,
}

impl NodeKind {
    /// Whether this kind represents a process node (calculation or workflow)
    pub fn is_process(&self) -> bool {
        matches!(self, NodeKind::Calculation | NodeKind::Workflow)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Data => "data",
            Self::Calculation => "calculation",
            Self::Workflow => "workflow",
        };
        write!(f, "{}", s)
    }
}

/// Link class grouping link types for uniqueness checks
///
/// Links are unique per `(source, target, label)` within the same class,
/// and the Create/Call classes additionally permit at most one incoming
/// edge on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkClass {
    /// Creation of a data node by a process
    Create,

    /// Data returned (but not created) by a workflow
    Return,

    /// Data consumed as process input
    Input,

    /// Parent process calling a child process
    Call,
}

/// The enforced link-type taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkType {
    /// Process → data: the process created this data node
    Create,

    /// Workflow → data: data handed back but not created by the workflow
    Return,

    /// Data → calculation input
    InputCalc,

    /// Data → workflow input
    InputWork,

    /// Workflow → calculation call
    CallCalc,

    /// Workflow → workflow call
    CallWork,
}

impl LinkType {
    /// The uniqueness class this link type belongs to
    pub fn class(&self) -> LinkClass {
        match self {
            Self::Create => LinkClass::Create,
            Self::Return => LinkClass::Return,
            Self::InputCalc | Self::InputWork => LinkClass::Input,
            Self::CallCalc | Self::CallWork => LinkClass::Call,
        }
    }

    /// Whether the target of this link may have at most one incoming edge
    /// of the same class
    pub fn unique_incoming(&self) -> bool {
        matches!(self.class(), LinkClass::Create | LinkClass::Call)
    }

    /// The INPUT link type for a process of the given kind
    ///
    /// A data kind is mapped to `InputCalc` and rejected with
    /// [`GraphError::InvalidLink`] at link-add time.
    pub fn input_for(process_kind: NodeKind) -> LinkType {
        match process_kind {
            NodeKind::Workflow => LinkType::InputWork,
            _ => LinkType::InputCalc,
        }
    }

    /// The CALL link type for a callee of the given kind
    pub fn call_for(callee_kind: NodeKind) -> LinkType {
        match callee_kind {
            NodeKind::Workflow => LinkType::CallWork,
            _ => LinkType::CallCalc,
        }
    }

    /// Validate that the endpoint kinds satisfy the taxonomy
    ///
    /// ## Rules
    /// - CREATE: process → data (a data node cannot create anything)
    /// - RETURN: workflow → data (calculations never return)
    /// - INPUT_CALC: data → calculation; INPUT_WORK: data → workflow
    /// - CALL_CALC: workflow → calculation; CALL_WORK: workflow → workflow
    ///   (calculations never call)
    pub fn validate_endpoints(&self, source: NodeKind, target: NodeKind) -> GraphResult<()> {
        let ok = match self {
            Self::Create => source.is_process() && target == NodeKind::Data,
            Self::Return => source == NodeKind::Workflow && target == NodeKind::Data,
            Self::InputCalc => source == NodeKind::Data && target == NodeKind::Calculation,
            Self::InputWork => source == NodeKind::Data && target == NodeKind::Workflow,
            Self::CallCalc => source == NodeKind::Workflow && target == NodeKind::Calculation,
            Self::CallWork => source == NodeKind::Workflow && target == NodeKind::Workflow,
        };
        if ok {
            Ok(())
        } else {
            Err(GraphError::InvalidLink(format!(
                "{} link not permitted from {} to {}",
                self, source, target
            )))
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Return => "return",
            Self::InputCalc => "input_calc",
            Self::InputWork => "input_work",
            Self::CallCalc => "call_calc",
            Self::CallWork => "call_work",
        };
        write!(f, "{}", s)
    }
}

/// Persisted graph vertex
///
/// ## Design
/// A node is allocated unstored (no primary key); storing assigns the
/// numeric `pk`. Sealing is terminal: a sealed node accepts no further
/// attribute writes or incoming links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Unique identifier, allocated at creation time
    pub uuid: Uuid,

    /// Numeric primary key, assigned at store time
    pub pk: Option<u64>,

    /// Node kind (data, calculation, workflow)
    pub kind: NodeKind,

    /// Arbitrary key → value metadata
    pub attributes: HashMap<String, Value>,

    /// Terminal immutability marker
    pub sealed: bool,

    /// Opaque serialized continuation state
    ///
    /// Never serialized with the record: a checkpoint must not leave the
    /// store through an export, only through [`crate::GraphStore::load_node`].
    #[serde(skip)]
    pub checkpoint: Option<Vec<u8>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl NodeRecord {
    /// Allocate a fresh unstored record of the given kind
    pub fn new(kind: NodeKind) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            pk: None,
            kind,
            attributes: HashMap::new(),
            sealed: false,
            checkpoint: None,
            created_at: Utc::now(),
        }
    }

    /// Whether the node has been stored (primary key assigned)
    pub fn is_stored(&self) -> bool {
        self.pk.is_some()
    }

    /// Whether the process this node records finished without error
    pub fn is_finished_ok(&self) -> bool {
        self.attributes
            .get(ATTR_FINISHED_OK)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether the process this node records failed
    pub fn is_failed(&self) -> bool {
        self.attributes
            .get(ATTR_FAILED)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether the process reached a terminal outcome (finished or failed)
    pub fn is_terminal(&self) -> bool {
        self.is_finished_ok() || self.is_failed()
    }

    /// Failure message of a failed process, if any
    pub fn exception(&self) -> Option<&str> {
        self.attributes.get(ATTR_EXCEPTION).and_then(Value::as_str)
    }

    /// Label of the process class or function recorded on this node
    pub fn process_label(&self) -> Option<&str> {
        self.attributes
            .get(ATTR_PROCESS_LABEL)
            .and_then(Value::as_str)
    }

    /// Payload of a data node
    pub fn payload(&self) -> Option<&Value> {
        self.attributes.get(ATTR_VALUE)
    }
}

/// Directed, typed, labeled edge between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Source node identifier
    pub source: Uuid,

    /// Target node identifier
    pub target: Uuid,

    /// Link type from the taxonomy
    pub link_type: LinkType,

    /// Edge label (input port name, output port name, "CREATE", "CALL")
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_classes() {
        assert_eq!(LinkType::Create.class(), LinkClass::Create);
        assert_eq!(LinkType::InputCalc.class(), LinkClass::Input);
        assert_eq!(LinkType::InputWork.class(), LinkClass::Input);
        assert_eq!(LinkType::CallCalc.class(), LinkClass::Call);
        assert!(LinkType::CallWork.unique_incoming());
        assert!(LinkType::Create.unique_incoming());
        assert!(!LinkType::Return.unique_incoming());
        assert!(!LinkType::InputCalc.unique_incoming());
    }

    #[test]
    fn test_taxonomy_endpoints() {
        // Workflows may create data (unstored inputs attributed to the caller)
        assert!(LinkType::Create
            .validate_endpoints(NodeKind::Workflow, NodeKind::Data)
            .is_ok());
        assert!(LinkType::Create
            .validate_endpoints(NodeKind::Calculation, NodeKind::Data)
            .is_ok());
        // Data never creates
        assert!(LinkType::Create
            .validate_endpoints(NodeKind::Data, NodeKind::Data)
            .is_err());
        // Only workflows return
        assert!(LinkType::Return
            .validate_endpoints(NodeKind::Calculation, NodeKind::Data)
            .is_err());
        // Only workflows call
        assert!(LinkType::CallCalc
            .validate_endpoints(NodeKind::Calculation, NodeKind::Calculation)
            .is_err());
        assert!(LinkType::CallWork
            .validate_endpoints(NodeKind::Workflow, NodeKind::Workflow)
            .is_ok());
    }

    #[test]
    fn test_node_terminal_flags() {
        let mut node = NodeRecord::new(NodeKind::Calculation);
        assert!(!node.is_terminal());

        node.attributes
            .insert(ATTR_FINISHED_OK.to_string(), Value::Bool(true));
        assert!(node.is_finished_ok());
        assert!(node.is_terminal());
        assert!(!node.is_failed());
    }

    #[test]
    fn test_checkpoint_stripped_from_serialized_record() {
        let mut node = NodeRecord::new(NodeKind::Workflow);
        node.checkpoint = Some(vec![1, 2, 3]);

        let exported = serde_json::to_value(&node).unwrap();
        assert!(exported.get("checkpoint").is_none());

        let restored: NodeRecord = serde_json::from_value(exported).unwrap();
        assert!(restored.checkpoint.is_none());
    }

    #[test]
    fn test_input_and_call_selection() {
        assert_eq!(
            LinkType::input_for(NodeKind::Calculation),
            LinkType::InputCalc
        );
        assert_eq!(LinkType::input_for(NodeKind::Workflow), LinkType::InputWork);
        assert_eq!(LinkType::call_for(NodeKind::Calculation), LinkType::CallCalc);
        assert_eq!(LinkType::call_for(NodeKind::Workflow), LinkType::CallWork);
    }
}
