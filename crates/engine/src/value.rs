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

//! Data value handles
//!
//! ## Purpose
//! Engine-side handle to a data node. A `DataValue` is created unstored;
//! the provenance recorder stores it on first use (input linking or output
//! emission), at which point creation is attributed to the right process.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use lineage_graph::{GraphStore, NodeKind, ATTR_VALUE};

use crate::ProcessResult;

/// Handle to a data node, stored or not
///
/// The payload is mirrored into the node's `value` attribute so the graph
/// remains queryable without the engine in the loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValue {
    uuid: Uuid,
    payload: Value,
}

impl DataValue {
    /// Allocate a fresh unstored data node holding the given payload
    pub async fn create(store: &dyn GraphStore, payload: Value) -> ProcessResult<Self> {
        let uuid = store.create_node(NodeKind::Data).await?;
        store.set_attribute(uuid, ATTR_VALUE, payload.clone()).await?;
        Ok(Self { uuid, payload })
    }

    /// Load the handle for an existing data node
    pub async fn load(store: &dyn GraphStore, uuid: Uuid) -> ProcessResult<Self> {
        let record = store.load_node(uuid).await?;
        let payload = record.payload().cloned().unwrap_or(Value::Null);
        Ok(Self { uuid, payload })
    }

    /// Uuid of the underlying data node
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// The value payload
    pub fn payload(&self) -> &Value {
        &self.payload
    }
}
