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

//! Process state machine
//!
//! ## Purpose
//! Lifecycle of a single process instance:
//! `Created → Running → {Finished, Failed} → Stopped`. No state is
//! re-enterable and `Stopped` is absorbing. The execution body returns
//! `Result<(), ProcessError>` and the state machine inspects the tag; a
//! body error is recovered into `Failed` (never crashes the engine) and
//! the node is sealed on the way to `Stopped` regardless of outcome.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use lineage_graph::{
    GraphStore, NodeKind, ATTR_EXCEPTION, ATTR_FAILED, ATTR_FINISHED_OK,
};

use crate::checkpoint::{CheckpointBundle, CHECKPOINT_SCHEMA_VERSION};
use crate::recorder::ProvenanceRecorder;
use crate::registry::ProcessRegistry;
use crate::spec::{InputValue, ProcessInputs, ProcessSpec, ValidatedInputs, PORT_STORE_PROVENANCE, RETURN_PORT};
use crate::stack::{CallStack, StackFrame};
use crate::value::DataValue;
use crate::{ProcessError, ProcessId, ProcessResult};

/// Output mapping accumulated by a process run
pub type OutputMap = HashMap<String, DataValue>;

/// Kind of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessKind {
    /// Creates data (CREATE links on outputs)
    Calculation,

    /// Calls other processes and returns data (CALL and RETURN links)
    Workflow,
}

impl ProcessKind {
    /// The graph node kind recording this process
    pub fn node_kind(&self) -> NodeKind {
        match self {
            Self::Calculation => NodeKind::Calculation,
            Self::Workflow => NodeKind::Workflow,
        }
    }
}

/// Lifecycle state of a process instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Node allocated and stored, inputs validated and linked
    Created,

    /// Execution body running, frame on the call stack
    Running,

    /// Body returned successfully
    Finished,

    /// Body returned an error
    Failed,

    /// Node sealed, frame popped; absorbing
    Stopped,
}

impl ProcessState {
    /// Whether the transition to the given state is permitted
    pub fn can_transition(self, to: ProcessState) -> bool {
        matches!(
            (self, to),
            (Self::Created, Self::Running)
                | (Self::Running, Self::Finished)
                | (Self::Running, Self::Failed)
                | (Self::Finished, Self::Stopped)
                | (Self::Failed, Self::Stopped)
        )
    }

    /// Whether this state is terminal
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "CREATED",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Stopped => "STOPPED",
        };
        write!(f, "{}", s)
    }
}

/// A process definition: schema plus execution body
///
/// Implementations register their ports through `define` (descriptor
/// registration, not inheritance) and perform their work in `execute`,
/// returning `Err` to signal failure.
#[async_trait]
pub trait ProcessBehavior: Send + Sync + 'static {
    /// Label recorded on the process node (class or function name)
    fn label(&self) -> &str;

    /// Whether this process is a calculation or a workflow
    fn kind(&self) -> ProcessKind;

    /// Declare input and output ports on top of [`ProcessSpec::base`]
    fn define(&self, spec: &mut ProcessSpec);

    /// The execution body
    ///
    /// Receives only the database-relevant inputs through the scope;
    /// non-database control inputs are filtered out.
    async fn execute(&self, scope: &mut ExecutionScope) -> ProcessResult<()>;
}

/// Execution context handed to a process body while `Running`
///
/// Exposes the validated database inputs, output emission, child process
/// calls, and report logging.
pub struct ExecutionScope {
    store: Arc<dyn GraphStore>,
    stack: CallStack,
    registry: Arc<ProcessRegistry>,
    recorder: ProvenanceRecorder,
    pid: ProcessId,
    node: Uuid,
    kind: ProcessKind,
    label: String,
    spec: Arc<ProcessSpec>,
    inputs: ValidatedInputs,
    outputs: OutputMap,
    store_provenance: bool,
}

impl ExecutionScope {
    /// Process identifier of the executing process
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Uuid of the node recording this execution
    pub fn node(&self) -> Uuid {
        self.node
    }

    /// Kind of the executing process
    pub fn kind(&self) -> ProcessKind {
        self.kind
    }

    /// A database input by name (non-database inputs are not visible)
    pub fn input(&self, name: &str) -> Option<&InputValue> {
        self.inputs.db_entries().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// The payload of a database input by name
    pub fn input_payload(&self, name: &str) -> Option<&Value> {
        match self.input(name) {
            Some(InputValue::Data(v)) => Some(v.payload()),
            _ => None,
        }
    }

    /// Name/payload pairs of every plain (non-group) database input
    pub fn db_input_payloads(&self) -> Vec<(String, Value)> {
        self.inputs
            .db_entries()
            .filter_map(|(name, value)| match value {
                InputValue::Data(v) => Some((name.clone(), v.payload().clone())),
                _ => None,
            })
            .collect()
    }

    /// Allocate a fresh unstored data node holding the given payload
    pub async fn new_data(&self, payload: Value) -> ProcessResult<DataValue> {
        DataValue::create(self.store.as_ref(), payload).await
    }

    /// Emit a value on the named output port
    ///
    /// The payload must satisfy the declared output type; violations are
    /// rejected before any node mutation. The first emission claims CREATE
    /// ownership of the value if unclaimed; a workflow additionally records
    /// a RETURN link.
    pub async fn emit(&mut self, port: &str, value: DataValue) -> ProcessResult<()> {
        self.spec.validate_output(port, value.payload())?;
        self.recorder
            .record_output(self.node, self.kind.node_kind(), port, &value)
            .await?;
        self.outputs.insert(port.to_string(), value);
        Ok(())
    }

    /// Emit a bare value on the reserved single-return port
    pub async fn emit_value(&mut self, value: DataValue) -> ProcessResult<()> {
        self.emit(RETURN_PORT, value).await
    }

    /// Run a child process to completion, blocking cooperatively
    ///
    /// The child discovers this process as its parent through the shared
    /// call stack; provenance storage is propagated unless the child inputs
    /// override it.
    pub async fn call(
        &self,
        behavior: Arc<dyn ProcessBehavior>,
        inputs: ProcessInputs,
    ) -> ProcessResult<OutputMap> {
        let inputs = self.propagate_provenance(inputs);
        let instance = ProcessInstance::create(
            self.store.clone(),
            self.stack.clone(),
            behavior,
            inputs,
        )
        .await?;
        instance.run(self.registry.clone()).await
    }

    /// Submit a child process for asynchronous execution
    ///
    /// The child's node and links exist once this returns; completion can
    /// be awaited through [`ProcessRegistry::wait`]. The spawned task runs
    /// with a fresh call stack.
    pub async fn submit(
        &self,
        behavior: Arc<dyn ProcessBehavior>,
        inputs: ProcessInputs,
    ) -> ProcessResult<ProcessId> {
        let inputs = self.propagate_provenance(inputs);
        let instance = ProcessInstance::create(
            self.store.clone(),
            self.stack.clone(),
            behavior,
            inputs,
        )
        .await?
        .with_fresh_stack();
        let pid = instance.pid();
        // Register before spawning so waiters never observe a gap between
        // submission and the task entering RUNNING
        self.registry.register_running(&instance).await?;
        let registry = self.registry.clone();
        tokio::spawn(async move {
            if let Err(err) = instance.run(registry).await {
                tracing::warn!(pid = %pid, "submitted child process failed: {err}");
            }
        });
        Ok(pid)
    }

    /// The registry tracking this call tree
    pub fn registry(&self) -> Arc<ProcessRegistry> {
        self.registry.clone()
    }

    /// Log a report message attributed to this process
    pub fn report(&self, msg: &str) {
        tracing::info!(target: "lineage::report", pid = %self.pid, label = %self.label, "{}", msg);
    }

    pub(crate) fn take_outputs(&mut self) -> OutputMap {
        std::mem::take(&mut self.outputs)
    }

    fn propagate_provenance(&self, inputs: ProcessInputs) -> ProcessInputs {
        if !self.store_provenance && !inputs.contains(PORT_STORE_PROVENANCE) {
            inputs.with_value(PORT_STORE_PROVENANCE, json!(false))
        } else {
            inputs
        }
    }
}

/// Transient execution context wrapping exactly one process node
///
/// Created in `Created` state with all creation-time provenance recorded;
/// [`ProcessInstance::run`] drives it to `Stopped`. The instance is
/// consumed on run; its persisted node outlives it.
pub struct ProcessInstance {
    pid: ProcessId,
    node: Uuid,
    parent: Option<ProcessId>,
    state: ProcessState,
    label: String,
    kind: ProcessKind,
    behavior: Arc<dyn ProcessBehavior>,
    spec: Arc<ProcessSpec>,
    inputs: ValidatedInputs,
    outputs: OutputMap,
    store: Arc<dyn GraphStore>,
    stack: CallStack,
    store_provenance: bool,
}

impl ProcessInstance {
    /// Create a process instance in the `Created` state
    ///
    /// Validates inputs against the behavior's spec (fail-fast, before any
    /// node exists), resolves the parent from the call stack, allocates
    /// the node, and records all creation-time provenance.
    pub async fn create(
        store: Arc<dyn GraphStore>,
        stack: CallStack,
        behavior: Arc<dyn ProcessBehavior>,
        inputs: ProcessInputs,
    ) -> ProcessResult<Self> {
        let mut spec = ProcessSpec::base();
        behavior.define(&mut spec);
        let spec = Arc::new(spec);

        let mut validated = spec.validate(inputs)?;
        let store_provenance = validated.store_provenance();
        let parent = stack.top().ok();

        validated.materialize(store.as_ref()).await?;

        let kind = behavior.kind();
        let node = store.create_node(kind.node_kind()).await?;
        let recorder = ProvenanceRecorder::new(store.clone(), store_provenance);
        recorder
            .record_creation(node, kind.node_kind(), behavior.label(), parent.as_ref(), &validated)
            .await?;

        tracing::debug!(
            pid = %node,
            label = behavior.label(),
            parent = ?parent.map(|f| f.pid),
            "process created"
        );

        Ok(Self {
            pid: node,
            node,
            parent: parent.map(|frame| frame.pid),
            state: ProcessState::Created,
            label: behavior.label().to_string(),
            kind,
            behavior,
            spec,
            inputs: validated,
            outputs: OutputMap::new(),
            store,
            stack,
            store_provenance,
        })
    }

    /// Rebuild an instance from a checkpoint bundle
    ///
    /// Re-loads the node and continues from the `Created` state so the
    /// next [`ProcessInstance::run`] enters `Running` directly; creation
    /// provenance is not re-recorded. A copy bundle (`retry`) clones the
    /// node into a brand-new unsealed node and re-establishes equivalent
    /// input links.
    pub async fn from_checkpoint(
        store: Arc<dyn GraphStore>,
        stack: CallStack,
        behavior: Arc<dyn ProcessBehavior>,
        bundle: CheckpointBundle,
    ) -> ProcessResult<Self> {
        let mut spec = ProcessSpec::base();
        behavior.define(&mut spec);
        let spec = Arc::new(spec);

        let inputs = bundle.inputs;
        let store_provenance = inputs.store_provenance();

        let node = if bundle.is_copy {
            let copy = store.clone_node(bundle.node).await?;
            let parent_frame = match bundle.parent {
                Some(parent_pid) => {
                    let parent_record = store.load_node(parent_pid).await?;
                    Some(StackFrame {
                        pid: parent_pid,
                        node: parent_pid,
                        kind: parent_record.kind,
                    })
                }
                None => None,
            };
            let recorder = ProvenanceRecorder::new(store.clone(), store_provenance);
            recorder
                .record_creation(
                    copy,
                    behavior.kind().node_kind(),
                    behavior.label(),
                    parent_frame.as_ref(),
                    &inputs,
                )
                .await?;
            copy
        } else {
            store.load_node(bundle.node).await?;
            bundle.node
        };

        tracing::debug!(
            pid = %node,
            label = behavior.label(),
            is_copy = bundle.is_copy,
            "process restored from checkpoint"
        );

        Ok(Self {
            pid: node,
            node,
            parent: bundle.parent,
            state: ProcessState::Created,
            label: behavior.label().to_string(),
            kind: behavior.kind(),
            behavior,
            spec,
            inputs,
            outputs: bundle.outputs,
            store,
            stack,
            store_provenance,
        })
    }

    /// Process identifier
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Uuid of the node recording this execution
    pub fn node(&self) -> Uuid {
        self.node
    }

    /// Parent process identifier, if not top-level
    pub fn parent(&self) -> Option<ProcessId> {
        self.parent
    }

    /// Current lifecycle state
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Label recorded on the process node
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether provenance storage is enabled for this run
    pub fn store_provenance(&self) -> bool {
        self.store_provenance
    }

    /// Serialize the full instance state into a checkpoint bundle
    pub fn checkpoint(&self) -> CheckpointBundle {
        CheckpointBundle {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            process_id: self.pid,
            node: self.node,
            parent: self.parent,
            is_copy: false,
            label: self.label.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            created_at: chrono::Utc::now(),
        }
    }

    /// Replace the call stack with a fresh one
    ///
    /// Used when the instance is handed to another task: the parent was
    /// resolved at creation time, and the stack observed by the new task
    /// must be empty on entry.
    pub fn with_fresh_stack(mut self) -> Self {
        self.stack = CallStack::new();
        self
    }

    /// Drive the process to a terminal state
    ///
    /// Pushes the frame, registers with the registry (persisting a
    /// checkpoint when configured), runs the body, records the outcome,
    /// seals the node, pops the frame, and notifies the registry. The
    /// node is sealed regardless of whether the body finished or failed.
    pub async fn run(mut self, registry: Arc<ProcessRegistry>) -> ProcessResult<OutputMap> {
        self.transition(ProcessState::Running)?;
        self.stack.push(StackFrame {
            pid: self.pid,
            node: self.node,
            kind: self.kind.node_kind(),
        });

        if let Err(err) = registry.register_running(&self).await {
            self.stack.pop(self.pid)?;
            return Err(err);
        }

        let mut scope = ExecutionScope {
            store: self.store.clone(),
            stack: self.stack.clone(),
            registry: registry.clone(),
            recorder: ProvenanceRecorder::new(self.store.clone(), self.store_provenance),
            pid: self.pid,
            node: self.node,
            kind: self.kind,
            label: self.label.clone(),
            spec: self.spec.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            store_provenance: self.store_provenance,
        };
        let outcome = self.behavior.execute(&mut scope).await;
        self.outputs = scope.take_outputs();

        match &outcome {
            Ok(()) => self.on_finish().await?,
            Err(err) => self.on_fail(err).await?,
        }
        self.on_stop(&registry).await?;

        match outcome {
            Ok(()) => Ok(self.outputs),
            Err(err) => Err(err),
        }
    }

    fn transition(&mut self, to: ProcessState) -> ProcessResult<()> {
        if !self.state.can_transition(to) {
            return Err(ProcessError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        tracing::debug!(pid = %self.pid, from = %self.state, to = %to, "state transition");
        self.state = to;
        Ok(())
    }

    async fn on_finish(&mut self) -> ProcessResult<()> {
        self.transition(ProcessState::Finished)?;
        self.store
            .set_attribute(self.node, ATTR_FINISHED_OK, json!(true))
            .await?;
        metrics::counter!("lineage_processes_finished_total").increment(1);
        Ok(())
    }

    async fn on_fail(&mut self, err: &ProcessError) -> ProcessResult<()> {
        self.transition(ProcessState::Failed)?;
        tracing::error!(
            pid = %self.pid,
            label = %self.label,
            "process failed: {err}"
        );
        self.store
            .set_attribute(self.node, ATTR_FAILED, json!(true))
            .await?;
        self.store
            .set_attribute(self.node, ATTR_EXCEPTION, json!(err.to_string()))
            .await?;
        metrics::counter!("lineage_processes_failed_total").increment(1);
        Ok(())
    }

    async fn on_stop(&mut self, registry: &Arc<ProcessRegistry>) -> ProcessResult<()> {
        let failed = self.state == ProcessState::Failed;
        self.transition(ProcessState::Stopped)?;

        let seal_result = if self.store_provenance {
            self.store.seal(self.node).await
        } else {
            Ok(())
        };

        // The frame is popped and the registry notified even if sealing
        // failed, so the call tree is never left in a corrupt state.
        self.stack.pop(self.pid)?;
        registry
            .finish(self.pid, self.outputs.clone(), failed)
            .await;

        seal_result.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use ProcessState::*;
        assert!(Created.can_transition(Running));
        assert!(Running.can_transition(Finished));
        assert!(Running.can_transition(Failed));
        assert!(Finished.can_transition(Stopped));
        assert!(Failed.can_transition(Stopped));

        // No state is re-enterable, STOPPED is absorbing
        assert!(!Created.can_transition(Created));
        assert!(!Running.can_transition(Created));
        assert!(!Finished.can_transition(Running));
        assert!(!Stopped.can_transition(Running));
        assert!(!Stopped.can_transition(Stopped));
        assert!(!Created.can_transition(Finished));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ProcessState::Created.to_string(), "CREATED");
        assert_eq!(ProcessState::Stopped.to_string(), "STOPPED");
        assert!(ProcessState::Stopped.is_terminal());
        assert!(!ProcessState::Failed.is_terminal());
    }

    #[test]
    fn test_process_kind_node_kind() {
        assert_eq!(
            ProcessKind::Calculation.node_kind(),
            NodeKind::Calculation
        );
        assert_eq!(ProcessKind::Workflow.node_kind(), NodeKind::Workflow);
    }
}
