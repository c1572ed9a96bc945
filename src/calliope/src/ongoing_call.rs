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

//! Per-invocation call handles.
//!
//! Every invocation creates one [CallHandle] (engine side) paired with
//! either an [OngoingCall] future or an application callback. The handle
//! settles exactly once: the first settlement wins, later ones are
//! dropped. Cancellation is a synchronous, idempotent signal that the
//! engine observes at its next suspension point; it is safe to request
//! before the call starts, while it runs, or after it settled.

use crate::Result;
use crate::error::Error;
use pin_project::pin_project;
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, watch};

enum Settle<T> {
    Future(oneshot::Sender<Result<T>>),
    Callback(Box<dyn FnOnce(Result<T>) + Send>),
}

/// Requests cancellation of one invocation.
///
/// Cloneable and synchronous. Cancelling an already settled call is a
/// no-op; cancelling twice is a no-op.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    cancel: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// A fresh handle and the receiver its signal arrives on.
    pub(crate) fn channel() -> (Self, watch::Receiver<bool>) {
        let (cancel, rx) = watch::channel(false);
        (Self { cancel }, rx)
    }
}

/// Resolves when a cancellation request arrives on `rx`. Never resolves if
/// every handle is gone without firing.
pub(crate) async fn cancelled(rx: &watch::Receiver<bool>) {
    let mut rx = rx.clone();
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// The engine-side handle for one invocation.
pub(crate) struct CallHandle<T> {
    settle: Arc<Mutex<Option<Settle<T>>>>,
    cancel_rx: watch::Receiver<bool>,
}

impl<T> CallHandle<T> {
    /// A handle settled through a returned [OngoingCall] future.
    pub(crate) fn future_mode() -> (Self, OngoingCall<T>) {
        let (tx, rx) = oneshot::channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = Self {
            settle: Arc::new(Mutex::new(Some(Settle::Future(tx)))),
            cancel_rx,
        };
        let call = OngoingCall {
            rx,
            cancel: CancelHandle { cancel: cancel_tx },
        };
        (handle, call)
    }

    /// A handle settled through an application callback.
    pub(crate) fn callback_mode<F>(callback: F) -> (Self, CancelHandle)
    where
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = Self {
            settle: Arc::new(Mutex::new(Some(Settle::Callback(Box::new(callback))))),
            cancel_rx,
        };
        (handle, CancelHandle { cancel: cancel_tx })
    }

    /// Delivers the result. Only the first settlement is observed.
    pub(crate) fn settle(&self, result: Result<T>) {
        let settle = self.settle.lock().expect("call handle poisoned").take();
        match settle {
            Some(Settle::Future(tx)) => {
                // The application may have dropped the future; nothing to
                // deliver to in that case.
                let _ = tx.send(result);
            }
            Some(Settle::Callback(callback)) => callback(result),
            None => {}
        }
    }

    /// Resolves when the application requests cancellation. Never resolves
    /// if the cancel handle is gone without firing.
    pub(crate) async fn cancelled(&self) {
        cancelled(&self.cancel_rx).await
    }
}

/// A cancellable, in-flight call.
///
/// Awaiting yields the call's result; [cancel][OngoingCall::cancel] can be
/// invoked at any time, including before the call had a chance to start.
#[pin_project]
pub struct OngoingCall<T> {
    #[pin]
    rx: oneshot::Receiver<Result<T>>,
    cancel: CancelHandle,
}

impl<T> OngoingCall<T> {
    /// Requests cancellation of this call.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A handle to cancel this call from elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

impl<T> std::future::Future for OngoingCall<T> {
    type Output = Result<T>;

    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        self.project().rx.poll(cx).map(|r| match r {
            Ok(result) => result,
            // The engine dropped the handle without settling; surface as a
            // cancellation rather than hanging or panicking.
            Err(_) => Err(Error::cancelled()),
        })
    }
}
