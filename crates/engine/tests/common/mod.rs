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

//! Shared process behaviors for the engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use lineage_engine::{
    ExecutionScope, InputValue, Port, ProcessBehavior, ProcessError, ProcessInputs, ProcessKind,
    ProcessResult, ProcessSpec, ValueType, RETURN_PORT,
};

/// Calculation with no declared ports that emits nothing
pub struct DummyCalculation;

#[async_trait]
impl ProcessBehavior for DummyCalculation {
    fn label(&self) -> &str {
        "DummyCalculation"
    }

    fn kind(&self) -> ProcessKind {
        ProcessKind::Calculation
    }

    fn define(&self, _spec: &mut ProcessSpec) {}

    async fn execute(&self, _scope: &mut ExecutionScope) -> ProcessResult<()> {
        Ok(())
    }
}

/// Calculation squaring its integer input onto the single-return port
pub struct SquareCalculation;

#[async_trait]
impl ProcessBehavior for SquareCalculation {
    fn label(&self) -> &str {
        "SquareCalculation"
    }

    fn kind(&self) -> ProcessKind {
        ProcessKind::Calculation
    }

    fn define(&self, spec: &mut ProcessSpec) {
        spec.input(Port::required("x", ValueType::Int));
        spec.no_dynamic_input();
    }

    async fn execute(&self, scope: &mut ExecutionScope) -> ProcessResult<()> {
        let x = scope
            .input_payload("x")
            .and_then(Value::as_i64)
            .ok_or_else(|| ProcessError::Execution("missing input 'x'".to_string()))?;
        let out = scope.new_data(json!(x * x)).await?;
        scope.emit_value(out).await
    }
}

/// Calculation declaring `sum: Int` that emits a string payload on it
pub struct BadOutputCalculation;

#[async_trait]
impl ProcessBehavior for BadOutputCalculation {
    fn label(&self) -> &str {
        "BadOutputCalculation"
    }

    fn kind(&self) -> ProcessKind {
        ProcessKind::Calculation
    }

    fn define(&self, spec: &mut ProcessSpec) {
        spec.output(Port::required("sum", ValueType::Int));
        spec.no_dynamic_output();
    }

    async fn execute(&self, scope: &mut ExecutionScope) -> ProcessResult<()> {
        let out = scope.new_data(json!("not a number")).await?;
        scope.emit("sum", out).await
    }
}

/// Calculation whose body always fails
pub struct FailingCalculation;

#[async_trait]
impl ProcessBehavior for FailingCalculation {
    fn label(&self) -> &str {
        "FailingCalculation"
    }

    fn kind(&self) -> ProcessKind {
        ProcessKind::Calculation
    }

    fn define(&self, _spec: &mut ProcessSpec) {}

    async fn execute(&self, _scope: &mut ExecutionScope) -> ProcessResult<()> {
        Err(ProcessError::Execution("deliberate failure".to_string()))
    }
}

/// Workflow that creates a data value, hands it to [`SquareCalculation`],
/// and re-emits the child's result on its `result` port
pub struct SquaringWorkflow {
    /// Payload of the value the workflow creates and passes down
    pub seed: i64,
}

#[async_trait]
impl ProcessBehavior for SquaringWorkflow {
    fn label(&self) -> &str {
        "SquaringWorkflow"
    }

    fn kind(&self) -> ProcessKind {
        ProcessKind::Workflow
    }

    fn define(&self, _spec: &mut ProcessSpec) {}

    async fn execute(&self, scope: &mut ExecutionScope) -> ProcessResult<()> {
        let x = scope.new_data(json!(self.seed)).await?;
        let child_outputs = scope
            .call(
                Arc::new(SquareCalculation),
                ProcessInputs::new().with_data("x", x),
            )
            .await?;
        let y = child_outputs
            .get(RETURN_PORT)
            .cloned()
            .ok_or_else(|| ProcessError::Execution("child produced no output".to_string()))?;
        scope.emit("result", y).await
    }
}

/// Calculation that echoes every dynamic input back as an output
pub struct EchoCalculation;

#[async_trait]
impl ProcessBehavior for EchoCalculation {
    fn label(&self) -> &str {
        "EchoCalculation"
    }

    fn kind(&self) -> ProcessKind {
        ProcessKind::Calculation
    }

    fn define(&self, _spec: &mut ProcessSpec) {}

    async fn execute(&self, scope: &mut ExecutionScope) -> ProcessResult<()> {
        for (name, payload) in scope.db_input_payloads() {
            let out = scope.new_data(payload).await?;
            scope.emit(&name, out).await?;
        }
        Ok(())
    }
}

/// Calculation summing the members of its `terms` group port
pub struct GroupSumCalculation;

#[async_trait]
impl ProcessBehavior for GroupSumCalculation {
    fn label(&self) -> &str {
        "GroupSumCalculation"
    }

    fn kind(&self) -> ProcessKind {
        ProcessKind::Calculation
    }

    fn define(&self, spec: &mut ProcessSpec) {
        spec.input(Port::required("terms", ValueType::Int).group());
        spec.no_dynamic_input();
    }

    async fn execute(&self, scope: &mut ExecutionScope) -> ProcessResult<()> {
        let total: i64 = match scope.input("terms") {
            Some(InputValue::Group(members)) => members
                .values()
                .filter_map(|v| v.payload().as_i64())
                .sum(),
            _ => return Err(ProcessError::Execution("missing group 'terms'".to_string())),
        };
        let out = scope.new_data(json!(total)).await?;
        scope.emit_value(out).await
    }
}
