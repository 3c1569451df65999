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

//! Process spec and port schema
//!
//! ## Purpose
//! Declarative input/output contracts for processes: typed ports, defaults,
//! non-database control inputs, group ports, and dynamic ports. Input
//! validation happens at process construction and is fail-fast: no node is
//! created or stored before the input mapping has passed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;

use lineage_graph::GraphStore;

use crate::value::DataValue;
use crate::{ProcessError, ProcessResult};

/// Reserved port name used when a bare value is emitted without a port
pub const RETURN_PORT: &str = "_return";

/// Non-database control input toggling provenance storage for a run
pub const PORT_STORE_PROVENANCE: &str = "store_provenance";

/// Non-database metadata input copied onto the node as its description
pub const PORT_DESCRIPTION: &str = "description";

/// Non-database metadata input copied onto the node as its label
pub const PORT_LABEL: &str = "label";

/// Value type constraint checked against JSON payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    /// Any payload
    Any,

    /// Boolean
    Bool,

    /// Integer number
    Int,

    /// Floating point number (integers are accepted)
    Float,

    /// String
    Str,

    /// JSON array
    List,

    /// JSON object
    Dict,
}

impl ValueType {
    /// Whether the payload satisfies this constraint
    pub fn check(&self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Bool => value.is_boolean(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Str => value.is_string(),
            Self::List => value.is_array(),
            Self::Dict => value.is_object(),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Any => "any",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::List => "list",
            Self::Dict => "dict",
        };
        write!(f, "{}", s)
    }
}

/// Name of the JSON type of a payload, for diagnostics
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Named, typed input or output slot declared by a process spec
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    /// Port name
    pub name: String,

    /// Value type constraint
    pub valid_type: ValueType,

    /// Whether an input on this port must be supplied
    pub required: bool,

    /// Default payload applied when the input is absent
    pub default: Option<Value>,

    /// Excluded from provenance linking and node storage
    pub non_db: bool,

    /// Group port: accepts a map of member values, flattened into
    /// `{group}_{key}` link labels
    pub group: bool,
}

impl Port {
    /// A required port
    pub fn required(name: &str, valid_type: ValueType) -> Self {
        Self {
            name: name.to_string(),
            valid_type,
            required: true,
            default: None,
            non_db: false,
            group: false,
        }
    }

    /// An optional port without a default
    pub fn optional(name: &str, valid_type: ValueType) -> Self {
        Self {
            required: false,
            ..Self::required(name, valid_type)
        }
    }

    /// A port with a default payload, applied when the input is absent
    pub fn with_default(name: &str, valid_type: ValueType, default: Value) -> Self {
        Self {
            required: false,
            default: Some(default),
            ..Self::required(name, valid_type)
        }
    }

    /// Mark the port as non-database (control input, not provenanced)
    pub fn non_db(mut self) -> Self {
        self.non_db = true;
        self
    }

    /// Mark the port as a group port
    pub fn group(mut self) -> Self {
        self.group = true;
        self
    }
}

/// A single supplied input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum InputValue {
    /// A data node handle (database input)
    Data(DataValue),

    /// A raw payload; wrapped into a fresh data node for database ports,
    /// passed through for non-database control ports
    Raw(Value),

    /// A group of named data node handles for a group port
    Group(HashMap<String, DataValue>),
}

impl InputValue {
    /// Check every payload carried by this input against a type constraint
    fn check_type(&self, valid_type: ValueType) -> Result<(), String> {
        let offending = match self {
            Self::Data(v) if !valid_type.check(v.payload()) => Some(v.payload()),
            Self::Raw(v) if !valid_type.check(v) => Some(v),
            Self::Group(members) => members
                .values()
                .map(DataValue::payload)
                .find(|p| !valid_type.check(p)),
            _ => None,
        };
        match offending {
            Some(value) => Err(format!(
                "expected {}, got {}",
                valid_type,
                json_type_name(value)
            )),
            None => Ok(()),
        }
    }
}

/// Builder for the input mapping handed to a process
#[derive(Debug, Clone, Default)]
pub struct ProcessInputs {
    entries: HashMap<String, InputValue>,
}

impl ProcessInputs {
    /// An empty input mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply a data node handle on the named port
    pub fn with_data(mut self, name: &str, value: DataValue) -> Self {
        self.entries.insert(name.to_string(), InputValue::Data(value));
        self
    }

    /// Supply a raw payload on the named port
    pub fn with_value(mut self, name: &str, value: Value) -> Self {
        self.entries.insert(name.to_string(), InputValue::Raw(value));
        self
    }

    /// Supply a group of named data handles on a group port
    pub fn with_group(mut self, name: &str, members: HashMap<String, DataValue>) -> Self {
        self.entries
            .insert(name.to_string(), InputValue::Group(members));
        self
    }

    /// Whether an input with the given name was supplied
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub(crate) fn into_entries(self) -> HashMap<String, InputValue> {
        self.entries
    }
}

/// Validated input mapping owned by a process instance
///
/// Produced by [`ProcessSpec::validate`]; defaults are filled in and every
/// payload has passed its type constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedInputs {
    entries: HashMap<String, InputValue>,
    non_db: HashSet<String>,
}

impl ValidatedInputs {
    /// Look up an input by name
    pub fn get(&self, name: &str) -> Option<&InputValue> {
        self.entries.get(name)
    }

    /// Look up a database input as a data handle
    pub fn data(&self, name: &str) -> Option<&DataValue> {
        match self.entries.get(name) {
            Some(InputValue::Data(v)) => Some(v),
            _ => None,
        }
    }

    /// Look up a raw payload input
    pub fn raw(&self, name: &str) -> Option<&Value> {
        match self.entries.get(name) {
            Some(InputValue::Raw(v)) => Some(v),
            _ => None,
        }
    }

    /// Iterate over database-relevant inputs (non-database ports filtered)
    pub fn db_entries(&self) -> impl Iterator<Item = (&String, &InputValue)> {
        self.entries
            .iter()
            .filter(|(name, _)| !self.non_db.contains(*name))
    }

    /// Whether provenance storage is enabled for this run
    pub fn store_provenance(&self) -> bool {
        self.raw(PORT_STORE_PROVENANCE)
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    /// Caller-supplied description metadata, if any
    pub fn description(&self) -> Option<&str> {
        self.raw(PORT_DESCRIPTION).and_then(Value::as_str)
    }

    /// Caller-supplied label metadata, if any
    pub fn label(&self) -> Option<&str> {
        self.raw(PORT_LABEL).and_then(Value::as_str)
    }

    /// Replace raw payloads on database ports with fresh unstored data nodes
    ///
    /// Called once after validation, before provenance recording; the
    /// recorder then attributes creation of these nodes to the caller.
    pub(crate) async fn materialize(&mut self, store: &dyn GraphStore) -> ProcessResult<()> {
        let names: Vec<String> = self
            .entries
            .iter()
            .filter(|(name, value)| {
                !self.non_db.contains(*name) && matches!(value, InputValue::Raw(_))
            })
            .map(|(name, _)| name.clone())
            .collect();
        for name in names {
            if let Some(InputValue::Raw(payload)) = self.entries.remove(&name) {
                let data = DataValue::create(store, payload).await?;
                self.entries.insert(name, InputValue::Data(data));
            }
        }
        Ok(())
    }
}

/// Schema describing the named inputs and outputs of a process
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessSpec {
    inputs: HashMap<String, Port>,
    outputs: HashMap<String, Port>,
    dynamic_inputs: Option<ValueType>,
    dynamic_outputs: Option<ValueType>,
}

impl ProcessSpec {
    /// An empty spec with no ports and no dynamic support
    pub fn new() -> Self {
        Self::default()
    }

    /// The base spec shared by every process
    ///
    /// Declares the non-database control ports (`store_provenance`,
    /// `description`, `label`) and enables dynamic inputs and outputs of
    /// any type; concrete processes tighten or disable these in `define`.
    pub fn base() -> Self {
        let mut spec = Self::new();
        spec.input(
            Port::with_default(PORT_STORE_PROVENANCE, ValueType::Bool, Value::Bool(true)).non_db(),
        );
        spec.input(Port::optional(PORT_DESCRIPTION, ValueType::Str).non_db());
        spec.input(Port::optional(PORT_LABEL, ValueType::Str).non_db());
        spec.dynamic_input(ValueType::Any);
        spec.dynamic_output(ValueType::Any);
        spec
    }

    /// Declare an input port
    pub fn input(&mut self, port: Port) -> &mut Self {
        self.inputs.insert(port.name.clone(), port);
        self
    }

    /// Declare an output port
    pub fn output(&mut self, port: Port) -> &mut Self {
        self.outputs.insert(port.name.clone(), port);
        self
    }

    /// Accept arbitrarily-named additional inputs matching the constraint
    pub fn dynamic_input(&mut self, valid_type: ValueType) -> &mut Self {
        self.dynamic_inputs = Some(valid_type);
        self
    }

    /// Reject inputs that are not declared ports
    pub fn no_dynamic_input(&mut self) -> &mut Self {
        self.dynamic_inputs = None;
        self
    }

    /// Accept arbitrarily-named additional outputs matching the constraint
    pub fn dynamic_output(&mut self, valid_type: ValueType) -> &mut Self {
        self.dynamic_outputs = Some(valid_type);
        self
    }

    /// Reject outputs that are not declared ports
    pub fn no_dynamic_output(&mut self) -> &mut Self {
        self.dynamic_outputs = None;
        self
    }

    /// Declared input port by name
    pub fn get_input(&self, name: &str) -> Option<&Port> {
        self.inputs.get(name)
    }

    /// Declared output port by name
    pub fn get_output(&self, name: &str) -> Option<&Port> {
        self.outputs.get(name)
    }

    /// Whether dynamic inputs are accepted
    pub fn has_dynamic_input(&self) -> bool {
        self.dynamic_inputs.is_some()
    }

    /// Template of the known inputs with defaults filled in
    ///
    /// Useful for callers building input mappings programmatically.
    pub fn inputs_template(&self) -> HashMap<String, Option<Value>> {
        self.inputs
            .iter()
            .map(|(name, port)| (name.clone(), port.default.clone()))
            .collect()
    }

    /// Validate an input mapping against the declared ports
    ///
    /// ## Errors
    /// - [`ProcessError::UnexpectedInput`] for an unknown name when dynamic
    ///   inputs are disabled
    /// - [`ProcessError::PortValidation`] for a missing required input or a
    ///   payload failing its type constraint
    ///
    /// Validation never touches the graph store.
    pub fn validate(&self, inputs: ProcessInputs) -> ProcessResult<ValidatedInputs> {
        let mut entries = inputs.into_entries();

        for (name, value) in &entries {
            match self.inputs.get(name) {
                Some(port) => {
                    if port.group != matches!(value, InputValue::Group(_)) {
                        return Err(ProcessError::PortValidation {
                            port: name.clone(),
                            reason: if port.group {
                                "group port requires a group of values".to_string()
                            } else {
                                "port does not accept a group of values".to_string()
                            },
                        });
                    }
                    value
                        .check_type(port.valid_type)
                        .map_err(|reason| ProcessError::PortValidation {
                            port: name.clone(),
                            reason,
                        })?;
                }
                None => match self.dynamic_inputs {
                    Some(valid_type) => {
                        value.check_type(valid_type).map_err(|reason| {
                            ProcessError::PortValidation {
                                port: name.clone(),
                                reason,
                            }
                        })?;
                    }
                    None => return Err(ProcessError::UnexpectedInput(name.clone())),
                },
            }
        }

        for (name, port) in &self.inputs {
            if entries.contains_key(name) {
                continue;
            }
            match &port.default {
                Some(default) => {
                    entries.insert(name.clone(), InputValue::Raw(default.clone()));
                }
                None if port.required => {
                    return Err(ProcessError::PortValidation {
                        port: name.clone(),
                        reason: "missing required input".to_string(),
                    });
                }
                None => {}
            }
        }

        let non_db = self
            .inputs
            .values()
            .filter(|port| port.non_db)
            .map(|port| port.name.clone())
            .collect();

        Ok(ValidatedInputs { entries, non_db })
    }

    /// Validate a single output emission against the declared output ports
    ///
    /// Returns the effective type constraint the payload was checked
    /// against. Applied per emission rather than up front, since not all
    /// outputs are known before execution.
    pub fn validate_output(&self, port: &str, payload: &Value) -> ProcessResult<ValueType> {
        let valid_type = match self.outputs.get(port) {
            Some(declared) => declared.valid_type,
            None => match self.dynamic_outputs {
                Some(valid_type) => valid_type,
                None => {
                    return Err(ProcessError::PortValidation {
                        port: port.to_string(),
                        reason: "undeclared output port and dynamic outputs are disabled"
                            .to_string(),
                    })
                }
            },
        };
        if !valid_type.check(payload) {
            return Err(ProcessError::OutputType {
                port: port.to_string(),
                expected: valid_type.to_string(),
                actual: json_type_name(payload).to_string(),
            });
        }
        Ok(valid_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec_with_required_int() -> ProcessSpec {
        let mut spec = ProcessSpec::base();
        spec.input(Port::required("a", ValueType::Int));
        spec
    }

    #[test]
    fn test_missing_required_input() {
        let spec = spec_with_required_int();
        let err = spec.validate(ProcessInputs::new()).unwrap_err();
        assert!(matches!(err, ProcessError::PortValidation { port, .. } if port == "a"));
    }

    #[test]
    fn test_type_mismatch() {
        let spec = spec_with_required_int();
        let err = spec
            .validate(ProcessInputs::new().with_value("a", json!("nope")))
            .unwrap_err();
        assert!(matches!(err, ProcessError::PortValidation { port, .. } if port == "a"));
    }

    #[test]
    fn test_default_applied() {
        let mut spec = ProcessSpec::base();
        spec.input(Port::with_default("n", ValueType::Int, json!(3)));
        let validated = spec.validate(ProcessInputs::new()).unwrap();
        assert_eq!(validated.raw("n"), Some(&json!(3)));
        // The base store_provenance default is applied as well
        assert!(validated.store_provenance());
    }

    #[test]
    fn test_unexpected_input_without_dynamic() {
        let mut spec = spec_with_required_int();
        spec.no_dynamic_input();
        let err = spec
            .validate(
                ProcessInputs::new()
                    .with_value("a", json!(1))
                    .with_value("mystery", json!(2)),
            )
            .unwrap_err();
        assert!(matches!(err, ProcessError::UnexpectedInput(name) if name == "mystery"));
    }

    #[test]
    fn test_dynamic_input_type_checked() {
        let mut spec = ProcessSpec::new();
        spec.dynamic_input(ValueType::Int);
        assert!(spec
            .validate(ProcessInputs::new().with_value("x", json!(1)))
            .is_ok());
        assert!(spec
            .validate(ProcessInputs::new().with_value("x", json!("s")))
            .is_err());
    }

    #[test]
    fn test_group_port_members_checked() {
        let mut spec = ProcessSpec::base();
        spec.input(Port::required("params", ValueType::Int).group());

        // Non-group value on a group port
        let err = spec
            .validate(ProcessInputs::new().with_value("params", json!(1)))
            .unwrap_err();
        assert!(matches!(err, ProcessError::PortValidation { port, .. } if port == "params"));
    }

    #[test]
    fn test_non_db_filtering() {
        let mut spec = spec_with_required_int();
        spec.input(Port::optional("quiet", ValueType::Bool).non_db());
        let validated = spec
            .validate(
                ProcessInputs::new()
                    .with_value("a", json!(1))
                    .with_value("quiet", json!(true)),
            )
            .unwrap();
        let db_names: Vec<&String> = validated.db_entries().map(|(n, _)| n).collect();
        assert!(db_names.contains(&&"a".to_string()));
        assert!(!db_names.contains(&&"quiet".to_string()));
        assert!(!db_names.contains(&&PORT_STORE_PROVENANCE.to_string()));
    }

    #[test]
    fn test_store_provenance_toggle() {
        let spec = ProcessSpec::base();
        let on = spec.validate(ProcessInputs::new()).unwrap();
        assert!(on.store_provenance());
        let off = spec
            .validate(ProcessInputs::new().with_value(PORT_STORE_PROVENANCE, json!(false)))
            .unwrap();
        assert!(!off.store_provenance());
    }

    #[test]
    fn test_output_validation() {
        let mut spec = ProcessSpec::base();
        spec.output(Port::required("count", ValueType::Int));

        assert!(spec.validate_output("count", &json!(2)).is_ok());
        assert!(matches!(
            spec.validate_output("count", &json!("two")),
            Err(ProcessError::OutputType { .. })
        ));
        // Dynamic output accepts unknown names
        assert!(spec.validate_output("anything", &json!([1])).is_ok());

        spec.no_dynamic_output();
        assert!(matches!(
            spec.validate_output("anything", &json!(1)),
            Err(ProcessError::PortValidation { .. })
        ));
    }

    #[test]
    fn test_inputs_template() {
        let mut spec = ProcessSpec::new();
        spec.input(Port::with_default("n", ValueType::Int, json!(1)));
        spec.input(Port::required("a", ValueType::Int));
        let template = spec.inputs_template();
        assert_eq!(template["n"], Some(json!(1)));
        assert_eq!(template["a"], None);
    }
}
