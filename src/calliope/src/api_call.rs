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

//! The call orchestrator.
//!
//! [create_api_call] turns a raw, possibly asynchronously obtained remote
//! call function into an [ApiCall]: the uniform calling convention for
//! unary-shaped methods. Each invocation merges the method's
//! [CallSettings] with the application's [CallOptions], resolves the raw
//! function (once per method, shared across invocations), wraps it with
//! the retry loop or a plain deadline, and drives it to a single
//! settlement on the invocation's handle.

use crate::call_context::CallContext;
use crate::descriptor::Descriptor;
use crate::error::Error;
use crate::ongoing_call::{CallHandle, CancelHandle, OngoingCall};
use crate::options::{CallOptions, CallSettings};
use crate::retrying::retry_call;
use crate::Result;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// The raw unary call function: one attempt against the transport.
///
/// The [CallContext] carries the attempt's deadline and metadata; the
/// function is expected to stop work when the deadline passes and to be
/// cancel-safe when its future is dropped.
pub type RawCall<Req, Resp> =
    Arc<dyn Fn(Req, CallContext) -> BoxFuture<'static, Result<Resp>> + Send + Sync>;

/// Adapts a plain async closure into a [RawCall].
pub fn raw_call<F, Fut, Req, Resp>(f: F) -> RawCall<Req, Resp>
where
    F: Fn(Req, CallContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp>> + Send + 'static,
{
    Arc::new(move |request, ctx| f(request, ctx).boxed())
}

type SharedStub<Req, Resp> =
    Shared<BoxFuture<'static, std::result::Result<RawCall<Req, Resp>, Arc<Error>>>>;

/// Creates the callable for one unary-shaped method.
///
/// `stub` resolves the raw call function; resolution runs at most once and
/// its outcome is shared by every invocation. Resolution failures surface
/// through the normal settlement path of each call.
pub fn create_api_call<S, Req, Resp>(
    stub: S,
    settings: CallSettings,
    descriptor: Descriptor,
) -> ApiCall<Req, Resp>
where
    S: Future<Output = Result<RawCall<Req, Resp>>> + Send + 'static,
    Req: Clone + Send + 'static,
    Resp: Send + 'static,
{
    ApiCall {
        stub: stub.map(|r| r.map_err(Arc::new)).boxed().shared(),
        settings,
        descriptor,
    }
}

/// The callable for a unary-shaped method.
///
/// Cloning is cheap; clones share the resolved raw function and the
/// method's base settings.
pub struct ApiCall<Req, Resp> {
    stub: SharedStub<Req, Resp>,
    settings: CallSettings,
    descriptor: Descriptor,
}

impl<Req, Resp> Clone for ApiCall<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            stub: self.stub.clone(),
            settings: self.settings.clone(),
            descriptor: self.descriptor.clone(),
        }
    }
}

impl<Req, Resp> ApiCall<Req, Resp>
where
    Req: Clone + Send + 'static,
    Resp: Send + 'static,
{
    /// A callable over an already resolved raw function.
    pub fn from_raw(raw: RawCall<Req, Resp>, settings: CallSettings, descriptor: Descriptor) -> Self {
        create_api_call(std::future::ready(Ok(raw)), settings, descriptor)
    }

    /// Starts one invocation, returning a cancellable future for its result.
    pub fn call(&self, request: Req, options: Option<CallOptions>) -> OngoingCall<Resp> {
        let (handle, call) = CallHandle::future_mode();
        self.start(request, options, handle);
        call
    }

    /// Starts one invocation, delivering the result to `callback`.
    ///
    /// The callback runs exactly once, on the runtime, after the call
    /// settles. The returned handle cancels the invocation.
    pub fn call_with_callback<F>(
        &self,
        request: Req,
        options: Option<CallOptions>,
        callback: F,
    ) -> CancelHandle
    where
        F: FnOnce(Result<Resp>) + Send + 'static,
    {
        let (handle, cancel) = CallHandle::callback_mode(callback);
        self.start(request, options, handle);
        cancel
    }

    pub fn settings(&self) -> &CallSettings {
        &self.settings
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    fn start(&self, request: Req, options: Option<CallOptions>, handle: CallHandle<Resp>) {
        // Merge before spawning so configuration problems are computed from
        // the caller's view of the settings.
        let merged = self.settings.merge(options.as_ref());
        let stub = self.stub.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = handle.cancelled() => handle.settle(Err(Error::cancelled())),
                result = invoke(stub, merged, request) => handle.settle(result),
            }
        });
    }
}

impl<Req, Resp> std::fmt::Debug for ApiCall<Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCall")
            .field("settings", &self.settings)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

/// One invocation: resolve the raw function, then drive it under the retry
/// loop or a plain per-attempt deadline.
async fn invoke<Req, Resp>(
    stub: SharedStub<Req, Resp>,
    settings: CallSettings,
    request: Req,
) -> Result<Resp>
where
    Req: Clone + Send + 'static,
    Resp: Send + 'static,
{
    let raw = stub.await.map_err(Error::resolution)?;
    if settings.retry_enabled() {
        let retry = settings.retry().cloned().unwrap_or_default();
        let default_timeout = settings.timeout();
        let other_args = settings.other_args().clone();
        let inner = move |timeout: Option<Duration>| {
            let timeout = timeout.unwrap_or(default_timeout);
            let ctx = CallContext::for_attempt(timeout, &other_args);
            raw(request.clone(), ctx)
        };
        // Boxed to work around rust-lang/rust#102211: the opaque future
        // fails the `Send` proof when this one is spawned.
        retry_call(inner, &retry, settings.api_name()).boxed().await
    } else {
        let ctx = CallContext::for_attempt(settings.timeout(), settings.other_args());
        raw(request, ctx).await
    }
}
