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

//! Integration tests for the recorded provenance graph shape

mod common;

use common::*;
use lineage_engine::*;
use lineage_graph::{GraphStore, LinkType, MemoryGraphStore, NodeKind};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// The canonical nested scenario: workflow W calls calculation C with a
/// value X it created; C creates its result Y; W re-emits Y.
///
/// Expected links:
/// - X: one incoming CREATE from W
/// - C: one incoming CALL_CALC from W, one incoming INPUT_CALC from X
/// - Y: one incoming CREATE from C and one incoming RETURN from W
#[tokio::test]
async fn test_workflow_calls_calculation_scenario() {
    let store = Arc::new(MemoryGraphStore::new());
    let runner = Runner::new(store.clone());

    let outputs = runner
        .run(SquaringWorkflow { seed: 6 }, ProcessInputs::new())
        .await
        .unwrap();

    let y = outputs["result"].clone();
    assert_eq!(y.payload(), &json!(36));

    let y_incoming = store.incoming_links(y.uuid()).await.unwrap();
    let creators: Vec<_> = y_incoming
        .iter()
        .filter(|l| l.link_type == LinkType::Create)
        .collect();
    let returners: Vec<_> = y_incoming
        .iter()
        .filter(|l| l.link_type == LinkType::Return)
        .collect();
    assert_eq!(creators.len(), 1);
    assert_eq!(returners.len(), 1);

    let c_node = creators[0].source;
    let w_node = returners[0].source;
    assert_ne!(c_node, w_node);
    assert_eq!(
        store.load_node(c_node).await.unwrap().kind,
        NodeKind::Calculation
    );
    assert_eq!(
        store.load_node(w_node).await.unwrap().kind,
        NodeKind::Workflow
    );

    // C has exactly one incoming CALL_CALC from W and one INPUT_CALC from X
    let c_incoming = store.incoming_links(c_node).await.unwrap();
    let calls: Vec<_> = c_incoming
        .iter()
        .filter(|l| l.link_type == LinkType::CallCalc)
        .collect();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].source, w_node);

    let inputs: Vec<_> = c_incoming
        .iter()
        .filter(|l| l.link_type == LinkType::InputCalc)
        .collect();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].label, "x");
    let x_node = inputs[0].source;

    // X was unstored when handed to C, so its creation is attributed to W
    let x_incoming = store.incoming_links(x_node).await.unwrap();
    assert_eq!(x_incoming.len(), 1);
    assert_eq!(x_incoming[0].link_type, LinkType::Create);
    assert_eq!(x_incoming[0].source, w_node);
    let x_record = store.load_node(x_node).await.unwrap();
    assert!(x_record.is_stored());
    assert_eq!(x_record.payload(), Some(&json!(6)));

    // Both process nodes sealed
    assert!(store.load_node(c_node).await.unwrap().sealed);
    assert!(store.load_node(w_node).await.unwrap().sealed);
}

#[tokio::test]
async fn test_input_links_per_supplied_input() {
    let store = Arc::new(MemoryGraphStore::new());
    let runner = Runner::new(store.clone());

    let labels = ["one", "two", "three", "four"];
    let mut inputs = ProcessInputs::new();
    for (i, label) in labels.iter().enumerate() {
        inputs = inputs.with_value(label, json!(i as i64 + 1));
    }

    let pid = runner.submit(DummyCalculation, inputs).await.unwrap();
    runner.wait(pid).await.unwrap();

    let incoming = store.incoming_links(pid).await.unwrap();
    let mut seen: Vec<&str> = incoming
        .iter()
        .filter(|l| l.link_type == LinkType::InputCalc)
        .map(|l| l.label.as_str())
        .collect();
    seen.sort_unstable();
    let mut expected = labels.to_vec();
    expected.sort_unstable();
    assert_eq!(seen, expected);

    // Each input value node carries the supplied payload
    for link in incoming.iter().filter(|l| l.link_type == LinkType::InputCalc) {
        let record = store.load_node(link.source).await.unwrap();
        assert!(record.is_stored());
        assert!(record.payload().is_some());
    }
}

#[tokio::test]
async fn test_group_inputs_flatten_to_prefixed_labels() {
    let store = Arc::new(MemoryGraphStore::new());
    let runner = Runner::new(store.clone());

    let mut members = HashMap::new();
    members.insert(
        "alpha".to_string(),
        DataValue::create(store.as_ref(), json!(10)).await.unwrap(),
    );
    members.insert(
        "beta".to_string(),
        DataValue::create(store.as_ref(), json!(32)).await.unwrap(),
    );

    let pid = runner
        .submit(
            GroupSumCalculation,
            ProcessInputs::new().with_group("terms", members),
        )
        .await
        .unwrap();
    let outputs = runner.wait(pid).await.unwrap();
    assert_eq!(outputs[RETURN_PORT].payload(), &json!(42));

    let incoming = store.incoming_links(pid).await.unwrap();
    let mut labels: Vec<&str> = incoming
        .iter()
        .filter(|l| l.link_type == LinkType::InputCalc)
        .map(|l| l.label.as_str())
        .collect();
    labels.sort_unstable();
    assert_eq!(labels, ["terms_alpha", "terms_beta"]);
}

#[tokio::test]
async fn test_stored_input_gets_no_create_link() {
    let store = Arc::new(MemoryGraphStore::new());
    let runner = Runner::new(store.clone());

    // A value stored ahead of time has no creator among the processes
    let x = DataValue::create(store.as_ref(), json!(4)).await.unwrap();
    store.store_node(x.uuid()).await.unwrap();

    let pid = runner
        .submit(SquareCalculation, ProcessInputs::new().with_data("x", x.clone()))
        .await
        .unwrap();
    runner.wait(pid).await.unwrap();

    let x_incoming = store.incoming_links(x.uuid()).await.unwrap();
    assert!(x_incoming
        .iter()
        .all(|l| l.link_type != LinkType::Create));
}

#[tokio::test]
async fn test_top_level_unstored_input_stored_without_creator() {
    let store = Arc::new(MemoryGraphStore::new());
    let runner = Runner::new(store.clone());

    // Top-level process: no parent on the stack, so nothing claims CREATE
    let x = DataValue::create(store.as_ref(), json!(3)).await.unwrap();
    let pid = runner
        .submit(SquareCalculation, ProcessInputs::new().with_data("x", x.clone()))
        .await
        .unwrap();
    runner.wait(pid).await.unwrap();

    let record = store.load_node(x.uuid()).await.unwrap();
    assert!(record.is_stored());
    assert!(store
        .incoming_links(x.uuid())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_registry_outputs_match_stored_links() {
    let store = Arc::new(MemoryGraphStore::new());
    let runner = Runner::new(store.clone());

    let pid = runner
        .submit(
            SquareCalculation,
            ProcessInputs::new().with_value("x", json!(7)),
        )
        .await
        .unwrap();
    let live = runner.wait(pid).await.unwrap();

    // Rebuild outputs purely from stored links
    let outgoing = store.outgoing_links(pid).await.unwrap();
    let create: Vec<_> = outgoing
        .iter()
        .filter(|l| l.link_type == LinkType::Create)
        .collect();
    assert_eq!(create.len(), 1);
    assert_eq!(create[0].label, RETURN_PORT);
    assert_eq!(create[0].target, live[RETURN_PORT].uuid());
}

#[tokio::test]
async fn test_unknown_pid_has_no_provenance() {
    let store = Arc::new(MemoryGraphStore::new());
    let missing = Uuid::new_v4();
    assert!(store.incoming_links(missing).await.is_err());
}
