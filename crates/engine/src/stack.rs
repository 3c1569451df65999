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

//! Process call stack
//!
//! ## Purpose
//! Ordered sequence of currently-executing process instances, innermost
//! last, letting a nested process discover its caller without explicit
//! parameter threading.
//!
//! ## Design
//! An explicit, cloneable context value rather than thread-local storage:
//! the runner creates one stack per logical call tree and threads it
//! through instance creation and the execution scope. A child submitted
//! onto another task receives a fresh stack (its parent was already
//! resolved at creation time), so the stack observed by a resumed process
//! is empty on entry and cross-task leakage cannot occur.

use std::sync::{Arc, Mutex};

use lineage_graph::NodeKind;
use uuid::Uuid;

use crate::{ProcessError, ProcessId, ProcessResult};

/// One executing process on the call stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackFrame {
    /// Process identifier
    pub pid: ProcessId,

    /// Uuid of the node recording the execution
    pub node: Uuid,

    /// Node kind of the executing process
    pub kind: NodeKind,
}

/// Per-call-tree stack of executing processes
///
/// Cloning is cheap and shares the underlying stack; every instance in one
/// call tree holds a clone of the same stack.
#[derive(Debug, Clone, Default)]
pub struct CallStack {
    frames: Arc<Mutex<Vec<StackFrame>>>,
}

impl CallStack {
    /// An empty stack for a fresh call tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an executing process onto the stack
    pub fn push(&self, frame: StackFrame) {
        self.frames
            .lock()
            .expect("call stack mutex poisoned")
            .push(frame);
    }

    /// Pop an executing process off the stack
    ///
    /// ## Errors
    /// [`ProcessError::StackCorruption`] when the popped process is not the
    /// top of the stack. This indicates a concurrency bug and is fatal.
    pub fn pop(&self, pid: ProcessId) -> ProcessResult<()> {
        let mut frames = self.frames.lock().expect("call stack mutex poisoned");
        match frames.last() {
            Some(top) if top.pid == pid => {
                frames.pop();
                Ok(())
            }
            Some(top) => Err(ProcessError::StackCorruption {
                expected: pid,
                found: top.pid.to_string(),
            }),
            None => Err(ProcessError::StackCorruption {
                expected: pid,
                found: "<empty>".to_string(),
            }),
        }
    }

    /// The innermost executing process
    ///
    /// ## Errors
    /// [`ProcessError::EmptyStack`] when no process is executing.
    pub fn top(&self) -> ProcessResult<StackFrame> {
        self.frames
            .lock()
            .expect("call stack mutex poisoned")
            .last()
            .copied()
            .ok_or(ProcessError::EmptyStack)
    }

    /// Number of processes currently executing in this call tree
    pub fn depth(&self) -> usize {
        self.frames.lock().expect("call stack mutex poisoned").len()
    }

    /// Whether no process is executing
    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }
}
