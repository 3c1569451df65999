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

//! # Lineage Process Engine
//!
//! ## Purpose
//! Runs computational processes (calculations and workflows), persists
//! their full input/output provenance as an immutable directed graph,
//! supports checkpoint/restart across process restarts, and guarantees
//! at-most-once recording of side effects under crash-and-resume.
//!
//! ## Architecture Context
//! The engine sits on top of the `lineage-graph` storage boundary and is
//! consumed by runner/registry collaborators (CLI, schedulers) that submit
//! processes and query their status.
//!
//! ### Component Diagram
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    Process Engine                        │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  Runner ──► ProcessInstance (state machine)              │
//! │    │            │        │                               │
//! │    │            │        ├─► CallStack (parent lookup)   │
//! │    │            │        ├─► ProvenanceRecorder          │
//! │    │            │        └─► ExecutionScope (user body)  │
//! │    │            ▼                                        │
//! │    └──► ProcessRegistry ──► CheckpointStore              │
//! │                 │                                        │
//! │                 ▼                                        │
//! │          GraphStore (lineage-graph)                      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Components
//! - [`ProcessSpec`] / [`Port`]: declarative input/output contracts
//! - [`CallStack`]: explicit per-call-tree context for parent discovery
//! - [`ProcessInstance`]: the `Created → Running → {Finished, Failed} →
//!   Stopped` state machine
//! - [`ProvenanceRecorder`]: translates lifecycle events into graph writes
//! - [`ProcessRegistry`]: live instances, finished cache, checkpoints
//! - [`Runner`]: `run`/`submit`/`resume`/`retry` entry points
//! - [`FunctionProcessBuilder`]: wrap a plain function as a process
//!
//! ## Example
//! ```ignore
//! use lineage_engine::*;
//! use lineage_graph::MemoryGraphStore;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), ProcessError> {
//! let store = Arc::new(MemoryGraphStore::new());
//! let runner = Runner::new(store);
//!
//! let double = FunctionProcessBuilder::new("double")
//!     .param("x", ValueType::Int)
//!     .build(|args| {
//!         let x = args.arg(0).and_then(|v| v.as_i64()).unwrap_or(0);
//!         Ok(FunctionReturn::Single(json!(x * 2)))
//!     });
//!
//! let outputs = runner
//!     .run(double, ProcessInputs::new().with_value("x", json!(21)))
//!     .await?;
//! assert_eq!(outputs[RETURN_PORT].payload(), &json!(42));
//! # Ok(())
//! # }
//! ```
//!
//! ## Ordering Guarantees
//! Provenance writes (node storage, CREATE/INPUT/CALL links) for a process
//! complete before it enters `Running`; output CREATE/RETURN links complete
//! before `Finished`/`Failed`; sealing is the last write to a node and is
//! never followed by further mutation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod function;
pub mod process;
pub mod recorder;
pub mod registry;
pub mod runner;
pub mod spec;
pub mod stack;
pub mod value;

pub use checkpoint::{
    CheckpointBundle, CheckpointStore, MemoryCheckpointStore, NodeCheckpointStore,
    CHECKPOINT_SCHEMA_VERSION,
};
pub use function::{FunctionArgs, FunctionProcess, FunctionProcessBuilder, FunctionReturn};
pub use process::{
    ExecutionScope, OutputMap, ProcessBehavior, ProcessInstance, ProcessKind, ProcessState,
};
pub use recorder::ProvenanceRecorder;
pub use registry::{ProcessRegistry, ProcessStatus};
pub use runner::{Runner, RunnerConfig};
pub use spec::{
    InputValue, Port, ProcessInputs, ProcessSpec, ValidatedInputs, ValueType, PORT_DESCRIPTION,
    PORT_LABEL, PORT_STORE_PROVENANCE, RETURN_PORT,
};
pub use stack::{CallStack, StackFrame};
pub use value::DataValue;

use uuid::Uuid;

/// Identifier of a process instance
///
/// Equal to the uuid of the process node recording the execution, so a pid
/// resolves against both the registry and the graph store.
pub type ProcessId = Uuid;

/// Errors raised by the process engine
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// Input failed port validation (missing required input or type mismatch)
    #[error("port validation failed for '{port}': {reason}")]
    PortValidation {
        /// Name of the offending port
        port: String,
        /// What went wrong
        reason: String,
    },

    /// Input name not declared and the process accepts no dynamic inputs
    #[error("unexpected input '{0}' and process does not accept dynamic inputs")]
    UnexpectedInput(String),

    /// Emitted output does not match the declared output data type
    #[error("output type mismatch on port '{port}': expected {expected}, got {actual}")]
    OutputType {
        /// Output port name
        port: String,
        /// Declared type constraint
        expected: String,
        /// Actual payload type
        actual: String,
    },

    /// A process was popped that is not the top of the call stack
    ///
    /// Indicates a concurrency/threading bug; this error is fatal and must
    /// not be swallowed.
    #[error("call stack corruption: expected top {expected}, found {found}")]
    StackCorruption {
        /// Pid that was popped
        expected: ProcessId,
        /// Pid actually at the top, if any
        found: String,
    },

    /// The call stack was queried while no process is executing
    #[error("no process is currently executing")]
    EmptyStack,

    /// State machine transition not permitted
    #[error("invalid process state transition from {from} to {to}")]
    InvalidTransition {
        /// Current state
        from: ProcessState,
        /// Requested state
        to: ProcessState,
    },

    /// No process with the given id can be resolved by registry or storage
    #[error("process not found: {0}")]
    NotFound(ProcessId),

    /// Checkpoint serialization, deserialization, or persistence failure
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Failure raised by a user execution body
    #[error("execution error: {0}")]
    Execution(String),

    /// Error surfaced from the graph storage boundary
    #[error(transparent)]
    Graph(#[from] lineage_graph::GraphError),
}

/// Convenience result alias for engine operations.
pub type ProcessResult<T> = Result<T, ProcessError>;
