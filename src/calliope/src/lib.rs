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

//! Client-side RPC call execution.
//!
//! This crate sits between generated service stubs and application code.
//! Given a raw, possibly asynchronously obtained remote call function, it
//! wraps the function with per-call timeouts, configurable retry with
//! jittered exponential backoff, cooperative cancellation, and the
//! response shaping each method needs: plain unary, paginated, streaming,
//! or long-running (see the `calliope-lro` crate for the latter).
//!
//! The entry points are [create_api_call][api_call::create_api_call] and
//! its streaming counterparts in [streaming]; the per-method configuration
//! lives in [options::CallSettings] and per-invocation overrides in
//! [options::CallOptions].

/// An alias of [std::result::Result] where the error is always [crate::error::Error].
///
/// This is the result type used by all functions wrapping RPCs.
pub type Result<T> = std::result::Result<T, crate::error::Error>;

/// The call orchestrator for unary-shaped methods.
pub mod api_call;

/// Backoff parameters for retry loops and operation polling.
pub mod backoff;

/// The per-attempt deadline and metadata handed to the raw call function.
pub mod call_context;

/// Per-method call-shape descriptors.
pub mod descriptor;

/// The core error types used by generated clients.
pub mod error;

/// Per-invocation handles: cancellable futures and callbacks.
pub mod ongoing_call;

pub mod options;

/// Automatic pagination for list methods.
pub mod paginator;

pub mod retry_options;

/// The retry loop shared by unary calls.
pub mod retrying;

/// Streaming call strategies.
pub mod streaming;

/// The process-wide cache of loaded stub definitions.
pub mod stub_cache;
