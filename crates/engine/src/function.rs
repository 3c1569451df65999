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

//! Function processes
//!
//! ## Purpose
//! Wrap a plain function as a fully provenanced calculation. The port
//! schema is described once by a builder at registration time, producing a
//! reusable process descriptor: each declared parameter becomes a required
//! (or defaulted) input port, and extra inputs are accepted only when the
//! builder opted in, mirroring how a function either takes keyword
//! arguments or does not.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::process::{ExecutionScope, ProcessBehavior, ProcessKind};
use crate::spec::{Port, ProcessSpec, ValueType};
use crate::{ProcessError, ProcessResult};

/// Arguments handed to a function body
///
/// Positional arguments follow the declaration order of the builder;
/// extra inputs (when enabled) arrive by name.
#[derive(Debug, Clone)]
pub struct FunctionArgs {
    positional: Vec<(String, Value)>,
    extra: HashMap<String, Value>,
}

impl FunctionArgs {
    /// Positional argument payload by declaration index
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.positional.get(index).map(|(_, value)| value)
    }

    /// Argument payload by name, positional or extra
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.positional
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
            .or_else(|| self.extra.get(name))
    }

    /// Extra (non-declared) inputs supplied by the caller
    pub fn extras(&self) -> &HashMap<String, Value> {
        &self.extra
    }

    /// Number of positional arguments
    pub fn len(&self) -> usize {
        self.positional.len()
    }

    /// Whether no positional arguments were declared
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }
}

/// Value returned by a function body
#[derive(Debug, Clone)]
pub enum FunctionReturn {
    /// The function produced no outputs
    Nothing,

    /// A single value, emitted on the reserved return port
    Single(Value),

    /// Named values, each emitted on its own port
    Map(HashMap<String, Value>),
}

type FunctionBody = dyn Fn(FunctionArgs) -> ProcessResult<FunctionReturn> + Send + Sync;

/// A process descriptor wrapping a plain function
///
/// Built once with [`FunctionProcessBuilder`] and reusable across runs.
/// Function processes are calculations: every emitted value gets a CREATE
/// link from the process node.
pub struct FunctionProcess {
    label: String,
    params: Vec<Port>,
    dynamic: bool,
    body: Arc<FunctionBody>,
}

/// Builder describing the ports of a function process
pub struct FunctionProcessBuilder {
    label: String,
    params: Vec<Port>,
    dynamic: bool,
}

impl FunctionProcessBuilder {
    /// Start describing a function with the given label
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            params: Vec::new(),
            dynamic: false,
        }
    }

    /// Declare a required positional parameter
    pub fn param(mut self, name: &str, valid_type: ValueType) -> Self {
        self.params.push(Port::required(name, valid_type));
        self
    }

    /// Declare a positional parameter with a default payload
    pub fn param_with_default(mut self, name: &str, valid_type: ValueType, default: Value) -> Self {
        self.params.push(Port::with_default(name, valid_type, default));
        self
    }

    /// Accept inputs beyond the declared parameters
    ///
    /// Without this, supplying an input the function does not declare
    /// fails validation before any node is created.
    pub fn allow_extra_inputs(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// Finish the descriptor with the function body
    pub fn build<F>(self, body: F) -> FunctionProcess
    where
        F: Fn(FunctionArgs) -> ProcessResult<FunctionReturn> + Send + Sync + 'static,
    {
        FunctionProcess {
            label: self.label,
            params: self.params,
            dynamic: self.dynamic,
            body: Arc::new(body),
        }
    }
}

#[async_trait]
impl ProcessBehavior for FunctionProcess {
    fn label(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> ProcessKind {
        ProcessKind::Calculation
    }

    fn define(&self, spec: &mut ProcessSpec) {
        for port in &self.params {
            spec.input(port.clone());
        }
        if self.dynamic {
            spec.dynamic_input(ValueType::Any);
        } else {
            spec.no_dynamic_input();
        }
    }

    async fn execute(&self, scope: &mut ExecutionScope) -> ProcessResult<()> {
        let mut positional = Vec::with_capacity(self.params.len());
        for port in &self.params {
            let payload = scope.input_payload(&port.name).cloned().ok_or_else(|| {
                ProcessError::Execution(format!("missing argument '{}'", port.name))
            })?;
            positional.push((port.name.clone(), payload));
        }

        let declared: HashSet<&str> = self.params.iter().map(|p| p.name.as_str()).collect();
        let extra: HashMap<String, Value> = scope
            .db_input_payloads()
            .into_iter()
            .filter(|(name, _)| !declared.contains(name.as_str()))
            .collect();

        match (self.body)(FunctionArgs { positional, extra })? {
            FunctionReturn::Nothing => Ok(()),
            FunctionReturn::Single(payload) => {
                let value = scope.new_data(payload).await?;
                scope.emit_value(value).await
            }
            FunctionReturn::Map(map) => {
                for (name, payload) in map {
                    let value = scope.new_data(payload).await?;
                    scope.emit(&name, value).await?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::Runner;
    use crate::spec::{ProcessInputs, RETURN_PORT};
    use crate::ProcessError;
    use lineage_graph::MemoryGraphStore;
    use serde_json::json;

    fn add() -> FunctionProcess {
        FunctionProcessBuilder::new("add")
            .param("a", ValueType::Int)
            .param("b", ValueType::Int)
            .build(|args| {
                let a = args.arg(0).and_then(Value::as_i64).unwrap_or(0);
                let b = args.arg(1).and_then(Value::as_i64).unwrap_or(0);
                Ok(FunctionReturn::Single(json!(a + b)))
            })
    }

    #[tokio::test]
    async fn test_function_single_return() {
        let runner = Runner::new(Arc::new(MemoryGraphStore::new()));
        let outputs = runner
            .run(
                add(),
                ProcessInputs::new()
                    .with_value("a", json!(2))
                    .with_value("b", json!(40)),
            )
            .await
            .unwrap();
        assert_eq!(outputs[RETURN_PORT].payload(), &json!(42));
    }

    #[tokio::test]
    async fn test_function_rejects_undeclared_input() {
        let runner = Runner::new(Arc::new(MemoryGraphStore::new()));
        let err = runner
            .run(
                add(),
                ProcessInputs::new()
                    .with_value("a", json!(1))
                    .with_value("b", json!(2))
                    .with_value("c", json!(3)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::UnexpectedInput(name) if name == "c"));
    }

    #[tokio::test]
    async fn test_function_extra_inputs_when_enabled() {
        let sum_all = FunctionProcessBuilder::new("sum_all")
            .param("a", ValueType::Int)
            .allow_extra_inputs()
            .build(|args| {
                let mut total = args.arg(0).and_then(Value::as_i64).unwrap_or(0);
                for value in args.extras().values() {
                    total += value.as_i64().unwrap_or(0);
                }
                Ok(FunctionReturn::Single(json!(total)))
            });

        let runner = Runner::new(Arc::new(MemoryGraphStore::new()));
        let outputs = runner
            .run(
                sum_all,
                ProcessInputs::new()
                    .with_value("a", json!(1))
                    .with_value("x", json!(2))
                    .with_value("y", json!(3)),
            )
            .await
            .unwrap();
        assert_eq!(outputs[RETURN_PORT].payload(), &json!(6));
    }

    #[tokio::test]
    async fn test_function_default_parameter() {
        let scale = FunctionProcessBuilder::new("scale")
            .param("x", ValueType::Int)
            .param_with_default("factor", ValueType::Int, json!(10))
            .build(|args| {
                let x = args.arg(0).and_then(Value::as_i64).unwrap_or(0);
                let factor = args.arg(1).and_then(Value::as_i64).unwrap_or(1);
                Ok(FunctionReturn::Single(json!(x * factor)))
            });

        let runner = Runner::new(Arc::new(MemoryGraphStore::new()));
        let outputs = runner
            .run(scale, ProcessInputs::new().with_value("x", json!(4)))
            .await
            .unwrap();
        assert_eq!(outputs[RETURN_PORT].payload(), &json!(40));
    }

    #[tokio::test]
    async fn test_function_map_return() {
        let divmod = FunctionProcessBuilder::new("divmod")
            .param("a", ValueType::Int)
            .param("b", ValueType::Int)
            .build(|args| {
                let a = args.arg(0).and_then(Value::as_i64).unwrap_or(0);
                let b = args.arg(1).and_then(Value::as_i64).unwrap_or(1);
                let mut out = HashMap::new();
                out.insert("quotient".to_string(), json!(a / b));
                out.insert("remainder".to_string(), json!(a % b));
                Ok(FunctionReturn::Map(out))
            });

        let runner = Runner::new(Arc::new(MemoryGraphStore::new()));
        let outputs = runner
            .run(
                divmod,
                ProcessInputs::new()
                    .with_value("a", json!(17))
                    .with_value("b", json!(5)),
            )
            .await
            .unwrap();
        assert_eq!(outputs["quotient"].payload(), &json!(3));
        assert_eq!(outputs["remainder"].payload(), &json!(2));
    }
}
