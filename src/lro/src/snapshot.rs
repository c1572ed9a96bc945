// Copyright 2025 Calliope Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The untyped wire form of an operation.

use calliope::error::rpc::Status;
use serde::{Deserialize, Serialize};

/// One observation of a long-running operation.
///
/// The initiating call returns the first snapshot; polling the
/// get-operation RPC returns later ones. The `metadata` and response
/// payloads stay untyped here; [Operation][crate::Operation] deserializes
/// them at the edges.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperationSnapshot {
    name: String,
    done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<serde_json::Value>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    result: Option<SnapshotResult>,
}

/// The terminal payload of a finished operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SnapshotResult {
    /// The operation succeeded with this response.
    Response(serde_json::Value),
    /// The operation failed.
    Error(Status),
}

impl OperationSnapshot {
    pub fn set_name<T: Into<String>>(mut self, v: T) -> Self {
        self.name = v.into();
        self
    }

    pub fn set_done(mut self, v: bool) -> Self {
        self.done = v;
        self
    }

    pub fn set_metadata(mut self, v: serde_json::Value) -> Self {
        self.metadata = Some(v);
        self
    }

    pub fn set_response(mut self, v: serde_json::Value) -> Self {
        self.result = Some(SnapshotResult::Response(v));
        self
    }

    pub fn set_error(mut self, v: Status) -> Self {
        self.result = Some(SnapshotResult::Error(v));
        self
    }

    /// The resource name tracking this operation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the operation reached a terminal state.
    pub fn done(&self) -> bool {
        self.done
    }

    pub fn metadata(&self) -> Option<&serde_json::Value> {
        self.metadata.as_ref()
    }

    pub fn result(&self) -> Option<&SnapshotResult> {
        self.result.as_ref()
    }

    pub fn response(&self) -> Option<&serde_json::Value> {
        match &self.result {
            Some(SnapshotResult::Response(v)) => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Status> {
        match &self.result {
            Some(SnapshotResult::Error(status)) => Some(status),
            _ => None,
        }
    }
}
