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

//! Streaming call strategies.
//!
//! Application-level retry is disabled for every streaming shape: replaying
//! a partially consumed stream is not compatible with the unary retry loop,
//! so the merged settings' retry policy is never consulted here. Server
//! streaming instead supports connection-level retries, governed by
//! [RetryRequestOptions][crate::options::RetryRequestOptions]: the stream
//! may be re-established when it fails before the first response arrived,
//! and never after.

use crate::Result;
use crate::call_context::CallContext;
use crate::error::Error;
use crate::ongoing_call::{self, CallHandle, CancelHandle, OngoingCall};
use crate::options::{CallOptions, CallSettings};
use futures::stream::{BoxStream, Stream, StreamExt};
use futures::{FutureExt, future::BoxFuture, future::Shared};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// The application's outbound stream for client- and bidi-streaming calls.
pub type RequestStream<Req> = BoxStream<'static, Req>;

/// The raw server-streaming call function: establishes one stream of
/// responses for a request.
pub type RawServerStreamingCall<Req, Resp> = Arc<
    dyn Fn(Req, CallContext) -> BoxFuture<'static, Result<BoxStream<'static, Result<Resp>>>>
        + Send
        + Sync,
>;

/// The raw client-streaming call function: consumes the request stream and
/// produces a single response.
pub type RawClientStreamingCall<Req, Resp> =
    Arc<dyn Fn(RequestStream<Req>, CallContext) -> BoxFuture<'static, Result<Resp>> + Send + Sync>;

/// The raw bidi-streaming call function.
pub type RawBidiStreamingCall<Req, Resp> = Arc<
    dyn Fn(
            RequestStream<Req>,
            CallContext,
        ) -> BoxFuture<'static, Result<BoxStream<'static, Result<Resp>>>>
        + Send
        + Sync,
>;

type SharedStub<T> = Shared<BoxFuture<'static, std::result::Result<T, Arc<Error>>>>;

fn share_stub<S, T>(stub: S) -> SharedStub<T>
where
    S: Future<Output = Result<T>> + Send + 'static,
    T: Clone,
{
    stub.map(|r| r.map_err(Arc::new)).boxed().shared()
}

/// A cancellable stream of responses.
///
/// Cancellation delivers a CANCELLED-coded error through the stream, the
/// same channel every other failure uses, and then ends it.
pub struct CallStream<T> {
    rx: mpsc::Receiver<Result<T>>,
    cancel: CancelHandle,
}

impl<T> CallStream<T> {
    /// Requests cancellation of the underlying call.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

impl<T> Stream for CallStream<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl<T> std::fmt::Debug for CallStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallStream").finish()
    }
}

fn call_stream<T, F, Fut>(drive: F) -> CallStream<T>
where
    T: Send + 'static,
    F: FnOnce(mpsc::Sender<Result<T>>) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    let (cancel, cancel_rx) = CancelHandle::channel();
    let work = drive(tx.clone());
    tokio::spawn(async move {
        tokio::select! {
            _ = ongoing_call::cancelled(&cancel_rx) => {
                let _ = tx.send(Err(Error::cancelled())).await;
            }
            _ = work => {}
        }
    });
    CallStream { rx, cancel }
}

/// Creates the callable for a server-streaming method.
pub fn create_server_streaming_call<S, Req, Resp>(
    stub: S,
    settings: CallSettings,
) -> ServerStreamingCall<Req, Resp>
where
    S: Future<Output = Result<RawServerStreamingCall<Req, Resp>>> + Send + 'static,
    Req: Clone + Send + 'static,
    Resp: Send + 'static,
{
    ServerStreamingCall {
        stub: share_stub(stub),
        settings,
    }
}

/// The callable for a server-streaming method.
pub struct ServerStreamingCall<Req, Resp> {
    stub: SharedStub<RawServerStreamingCall<Req, Resp>>,
    settings: CallSettings,
}

impl<Req, Resp> Clone for ServerStreamingCall<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            stub: self.stub.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<Req, Resp> ServerStreamingCall<Req, Resp>
where
    Req: Clone + Send + 'static,
    Resp: Send + 'static,
{
    pub fn from_raw(raw: RawServerStreamingCall<Req, Resp>, settings: CallSettings) -> Self {
        create_server_streaming_call(std::future::ready(Ok(raw)), settings)
    }

    pub fn settings(&self) -> &CallSettings {
        &self.settings
    }

    /// Starts the stream for `request`.
    pub fn call(&self, request: Req, options: Option<CallOptions>) -> CallStream<Resp> {
        let merged = self.settings.merge(options.as_ref());
        let stub = self.stub.clone();
        call_stream(move |tx| drive_server(stub, merged, request, tx))
    }
}

async fn drive_server<Req, Resp>(
    stub: SharedStub<RawServerStreamingCall<Req, Resp>>,
    settings: CallSettings,
    request: Req,
    tx: mpsc::Sender<Result<Resp>>,
) where
    Req: Clone + Send + 'static,
    Resp: Send + 'static,
{
    let raw = match stub.await.map_err(Error::resolution) {
        Ok(raw) => raw,
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            return;
        }
    };
    let retry = settings
        .retry_request_options()
        .cloned()
        .unwrap_or_default();
    let mut attempt = retry.current_retry_attempt();
    let mut response_seen = false;
    'connect: loop {
        let ctx = CallContext::for_attempt(settings.timeout(), settings.other_args());
        let mut stream = match raw(request.clone(), ctx).await {
            Ok(stream) => stream,
            Err(e) => {
                if attempt < retry.retries() && retry.should_retry(&e) {
                    attempt += 1;
                    tracing::debug!(attempt, error = %e, "stream connection failed, retrying");
                    continue 'connect;
                }
                let _ = tx.send(Err(e)).await;
                return;
            }
        };
        while let Some(item) = stream.next().await {
            match item {
                Ok(response) => {
                    response_seen = true;
                    if tx.send(Ok(response)).await.is_err() {
                        return;
                    }
                }
                Err(e)
                    if !response_seen
                        && attempt < retry.no_response_retries()
                        && retry.should_retry(&e) =>
                {
                    attempt += 1;
                    tracing::debug!(attempt, error = %e, "stream failed before first response, retrying");
                    continue 'connect;
                }
                Err(e) => {
                    // After the first response errors are final; replaying
                    // the stream would duplicate data.
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }
        return;
    }
}

/// Creates the callable for a client-streaming method.
pub fn create_client_streaming_call<S, Req, Resp>(
    stub: S,
    settings: CallSettings,
) -> ClientStreamingCall<Req, Resp>
where
    S: Future<Output = Result<RawClientStreamingCall<Req, Resp>>> + Send + 'static,
    Req: Send + 'static,
    Resp: Send + 'static,
{
    ClientStreamingCall {
        stub: share_stub(stub),
        settings,
    }
}

/// The callable for a client-streaming method.
pub struct ClientStreamingCall<Req, Resp> {
    stub: SharedStub<RawClientStreamingCall<Req, Resp>>,
    settings: CallSettings,
}

impl<Req, Resp> Clone for ClientStreamingCall<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            stub: self.stub.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<Req, Resp> ClientStreamingCall<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    pub fn from_raw(raw: RawClientStreamingCall<Req, Resp>, settings: CallSettings) -> Self {
        create_client_streaming_call(std::future::ready(Ok(raw)), settings)
    }

    pub fn settings(&self) -> &CallSettings {
        &self.settings
    }

    /// Sends `requests` and resolves with the single response.
    pub fn call(
        &self,
        requests: RequestStream<Req>,
        options: Option<CallOptions>,
    ) -> OngoingCall<Resp> {
        let merged = self.settings.merge(options.as_ref());
        let stub = self.stub.clone();
        let (handle, call) = CallHandle::future_mode();
        tokio::spawn(async move {
            let work = async move {
                let raw = stub.await.map_err(Error::resolution)?;
                let ctx = CallContext::for_attempt(merged.timeout(), merged.other_args());
                raw(requests, ctx).await
            };
            tokio::select! {
                _ = handle.cancelled() => handle.settle(Err(Error::cancelled())),
                result = work => handle.settle(result),
            }
        });
        call
    }
}

/// Creates the callable for a bidi-streaming method.
pub fn create_bidi_streaming_call<S, Req, Resp>(
    stub: S,
    settings: CallSettings,
) -> BidiStreamingCall<Req, Resp>
where
    S: Future<Output = Result<RawBidiStreamingCall<Req, Resp>>> + Send + 'static,
    Req: Send + 'static,
    Resp: Send + 'static,
{
    BidiStreamingCall {
        stub: share_stub(stub),
        settings,
    }
}

/// The callable for a bidi-streaming method.
///
/// The request stream cannot be replayed, so there is no connection-level
/// retry either: the first failure ends the response stream.
pub struct BidiStreamingCall<Req, Resp> {
    stub: SharedStub<RawBidiStreamingCall<Req, Resp>>,
    settings: CallSettings,
}

impl<Req, Resp> Clone for BidiStreamingCall<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            stub: self.stub.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<Req, Resp> BidiStreamingCall<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    pub fn from_raw(raw: RawBidiStreamingCall<Req, Resp>, settings: CallSettings) -> Self {
        create_bidi_streaming_call(std::future::ready(Ok(raw)), settings)
    }

    pub fn settings(&self) -> &CallSettings {
        &self.settings
    }

    /// Starts the exchange, returning the stream of responses.
    pub fn call(
        &self,
        requests: RequestStream<Req>,
        options: Option<CallOptions>,
    ) -> CallStream<Resp> {
        let merged = self.settings.merge(options.as_ref());
        let stub = self.stub.clone();
        call_stream(move |tx| async move {
            let open = async {
                let raw = stub.await.map_err(Error::resolution)?;
                let ctx = CallContext::for_attempt(merged.timeout(), merged.other_args());
                raw(requests, ctx).await
            };
            let mut stream = match open.await {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };
            while let Some(item) = stream.next().await {
                let done = item.is_err();
                if tx.send(item).await.is_err() || done {
                    return;
                }
            }
        })
    }
}
