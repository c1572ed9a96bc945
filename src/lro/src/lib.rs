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

//! Long-running operation tracking.
//!
//! Some methods start server-side work that outlives the initiating call;
//! the service hands back an operation name to poll for completion. An
//! [Operation] wraps the initiating call's first
//! [OperationSnapshot] and drives a get-operation RPC with jittered
//! exponential backoff until the operation finishes.
//!
//! Polling is lazy and reference counted: it starts when the first
//! [Subscription] is created and stops when the last one is dropped.
//! Subscribers receive [OperationEvent]s: progress whenever the
//! operation's metadata changes, then exactly one terminal event. Most
//! applications just await [Operation::until_done].

mod snapshot;

pub use snapshot::{OperationSnapshot, SnapshotResult};

use calliope::Result;
use calliope::backoff::BackoffSettings;
use calliope::error::Error;
use calliope::error::rpc::{Code, Status};
use futures::future::BoxFuture;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Fetches the current snapshot of an operation by name.
pub type GetOperation =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<OperationSnapshot>> + Send + Sync>;

/// Requests server-side cancellation of an operation by name.
pub type CancelOperation = Arc<dyn Fn(String) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Progress and completion notifications for one operation.
#[derive(Clone, Debug, PartialEq)]
pub enum OperationEvent {
    /// The operation is still running; carries the latest metadata.
    Progress(Option<serde_json::Value>),
    /// The operation finished with this response payload.
    Complete(serde_json::Value),
    /// The operation failed, was cancelled, or could not be polled.
    Failed(Status),
}

impl OperationEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Failed(_))
    }
}

/// A long-running operation with typed response and metadata payloads.
///
/// `R` is the response type on success, `M` the metadata type reported
/// while the operation runs; both deserialize from the untyped snapshot
/// payloads on access.
pub struct Operation<R, M> {
    tracker: Arc<Tracker>,
    response: PhantomData<fn() -> R>,
    metadata: PhantomData<fn() -> M>,
}

impl<R, M> Clone for Operation<R, M> {
    fn clone(&self) -> Self {
        Self {
            tracker: self.tracker.clone(),
            response: PhantomData,
            metadata: PhantomData,
        }
    }
}

impl<R, M> std::fmt::Debug for Operation<R, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.tracker.name)
            .finish()
    }
}

impl<R, M> Operation<R, M>
where
    R: serde::de::DeserializeOwned,
    M: serde::de::DeserializeOwned,
{
    /// Wraps the initiating call's snapshot.
    ///
    /// `get_operation` drives the polling; `cancel_operation`, when
    /// supplied, is invoked best-effort by [cancel][Operation::cancel].
    pub fn new(
        snapshot: OperationSnapshot,
        get_operation: GetOperation,
        cancel_operation: Option<CancelOperation>,
        polling_backoff: BackoffSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(16);
        let phase = if snapshot.done() {
            Phase::Done(terminal_event(&snapshot))
        } else {
            Phase::Idle
        };
        let metadata_repr = snapshot.metadata().map(canonical_bytes);
        let tracker = Tracker {
            name: snapshot.name().to_string(),
            get_operation,
            cancel_operation,
            polling_backoff,
            events,
            state: Mutex::new(TrackerState {
                phase,
                subscribers: 0,
                latest: snapshot,
                metadata_repr,
            }),
        };
        Self {
            tracker: Arc::new(tracker),
            response: PhantomData,
            metadata: PhantomData,
        }
    }

    /// The operation's resource name.
    pub fn name(&self) -> &str {
        &self.tracker.name
    }

    /// True once a terminal snapshot or cancellation was observed.
    pub fn done(&self) -> bool {
        matches!(self.tracker.lock().phase, Phase::Done(_))
    }

    /// The most recent snapshot.
    pub fn snapshot(&self) -> OperationSnapshot {
        self.tracker.lock().latest.clone()
    }

    /// The most recent metadata, deserialized as `M`.
    pub fn metadata(&self) -> Result<Option<M>> {
        self.tracker
            .lock()
            .latest
            .metadata()
            .map(|v| serde_json::from_value(v.clone()).map_err(Error::deser))
            .transpose()
    }

    /// Subscribes to this operation's events.
    ///
    /// The first live subscription starts the polling task; dropping the
    /// last one stops it. Subscribing to a finished operation delivers the
    /// terminal event immediately.
    pub fn subscribe(&self) -> Subscription {
        let tracker = self.tracker.clone();
        let mut state = tracker.lock();
        if let Phase::Done(event) = &state.phase {
            let rx = tracker.events.subscribe();
            let event = event.clone();
            drop(state);
            return Subscription {
                tracker,
                rx,
                pending: Some(event),
                finished: false,
                counted: false,
            };
        }
        state.subscribers += 1;
        let rx = tracker.events.subscribe();
        if matches!(state.phase, Phase::Idle) {
            let handle = tokio::spawn(poll_loop(tracker.clone()));
            state.phase = Phase::Polling(handle);
        }
        drop(state);
        Subscription {
            tracker,
            rx,
            pending: None,
            finished: false,
            counted: true,
        }
    }

    /// Polls until the operation finishes, returning its typed response.
    pub async fn until_done(&self) -> Result<R> {
        let mut subscription = self.subscribe();
        while let Some(event) = subscription.next().await {
            match event {
                OperationEvent::Progress(_) => continue,
                OperationEvent::Complete(value) => {
                    return serde_json::from_value(value).map_err(Error::deser);
                }
                OperationEvent::Failed(status) => return Err(Error::service(status)),
            }
        }
        Err(Error::other("operation event channel closed before completion"))
    }

    /// Cancels the operation.
    ///
    /// Stops the local polling task immediately and issues a best-effort
    /// cancellation RPC; the returned result is the RPC's. The two are
    /// independent: subscribers observe the cancellation even when the RPC
    /// fails.
    pub async fn cancel(&self) -> Result<()> {
        let event = {
            let mut state = self.tracker.lock();
            if matches!(state.phase, Phase::Done(_)) {
                None
            } else {
                if let Phase::Polling(handle) = &state.phase {
                    handle.abort();
                }
                let event = OperationEvent::Failed(
                    Status::default()
                        .set_code(Code::Cancelled)
                        .set_message("operation cancelled by the application"),
                );
                state.phase = Phase::Done(event.clone());
                Some(event)
            }
        };
        if let Some(event) = event {
            let _ = self.tracker.events.send(event);
            if let Some(cancel) = &self.tracker.cancel_operation {
                return cancel(self.tracker.name.clone()).await;
            }
        }
        Ok(())
    }
}

/// A live interest in one operation's events.
pub struct Subscription {
    tracker: Arc<Tracker>,
    rx: broadcast::Receiver<OperationEvent>,
    pending: Option<OperationEvent>,
    finished: bool,
    counted: bool,
}

impl Subscription {
    /// The next event, `None` after the terminal event was delivered.
    pub async fn next(&mut self) -> Option<OperationEvent> {
        if self.finished {
            return None;
        }
        if let Some(event) = self.pending.take() {
            self.finished = event.is_terminal();
            return Some(event);
        }
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    self.finished = event.is_terminal();
                    return Some(event);
                }
                // Skipped progress events are not worth failing over.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    /// Consumes the subscription, yielding events as a stream.
    pub fn into_stream(self) -> impl futures::Stream<Item = OperationEvent> {
        futures::stream::unfold(self, |mut sub| async move {
            sub.next().await.map(|event| (event, sub))
        })
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.tracker.name)
            .field("finished", &self.finished)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.counted {
            return;
        }
        let mut state = self.tracker.lock();
        state.subscribers -= 1;
        if state.subscribers == 0 {
            if let Phase::Polling(handle) = &state.phase {
                handle.abort();
                state.phase = Phase::Idle;
            }
        }
    }
}

struct Tracker {
    name: String,
    get_operation: GetOperation,
    cancel_operation: Option<CancelOperation>,
    polling_backoff: BackoffSettings,
    events: broadcast::Sender<OperationEvent>,
    state: Mutex<TrackerState>,
}

struct TrackerState {
    phase: Phase,
    subscribers: usize,
    latest: OperationSnapshot,
    // Canonical bytes of the metadata at the previous poll; progress is
    // only emitted when they change.
    metadata_repr: Option<Vec<u8>>,
}

enum Phase {
    Idle,
    Polling(tokio::task::JoinHandle<()>),
    Done(OperationEvent),
}

impl Tracker {
    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().expect("operation state poisoned")
    }

    fn finish(&self, event: OperationEvent) {
        self.lock().phase = Phase::Done(event.clone());
        let _ = self.events.send(event);
    }
}

async fn poll_loop(tracker: Arc<Tracker>) {
    let backoff = tracker.polling_backoff.clone();
    let mut delay = backoff.initial_retry_delay();
    loop {
        let to_sleep = jittered(delay);
        tracing::debug!(
            name = %tracker.name,
            delay_ms = to_sleep.as_millis() as u64,
            "scheduling operation poll"
        );
        tokio::time::sleep(to_sleep).await;
        match (tracker.get_operation)(tracker.name.clone()).await {
            Err(error) => {
                tracker.finish(OperationEvent::Failed(poll_error_status(&error)));
                return;
            }
            Ok(snapshot) => {
                if snapshot.done() {
                    let event = terminal_event(&snapshot);
                    tracker.lock().latest = snapshot;
                    tracker.finish(event);
                    return;
                }
                let progress = {
                    let mut state = tracker.lock();
                    let repr = snapshot.metadata().map(canonical_bytes);
                    let changed = repr != state.metadata_repr;
                    state.metadata_repr = repr;
                    state.latest = snapshot.clone();
                    changed.then(|| OperationEvent::Progress(snapshot.metadata().cloned()))
                };
                if let Some(event) = progress {
                    let _ = tracker.events.send(event);
                }
            }
        }
        delay = grow(delay, backoff.retry_delay_multiplier(), backoff.max_retry_delay());
    }
}

fn terminal_event(snapshot: &OperationSnapshot) -> OperationEvent {
    match snapshot.result() {
        Some(SnapshotResult::Response(value)) => OperationEvent::Complete(value.clone()),
        Some(SnapshotResult::Error(status)) => OperationEvent::Failed(status.clone()),
        // Reported done with neither payload; synthesize an error rather
        // than polling (or hanging) forever.
        None => OperationEvent::Failed(
            Status::default().set_code(Code::Unknown).set_message(format!(
                "operation {} finished but there was no result",
                snapshot.name()
            )),
        ),
    }
}

fn poll_error_status(error: &Error) -> Status {
    Status::default()
        .set_code(error.status_code().unwrap_or(Code::Unknown))
        .set_message(error.to_string())
}

fn canonical_bytes(value: &serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

/// Uniform in `[0, delay)`.
fn jittered(delay: Duration) -> Duration {
    use rand::Rng;
    if delay.is_zero() {
        return delay;
    }
    rand::rng().random_range(Duration::ZERO..delay)
}

fn grow(delay: Duration, multiplier: f64, cap: Duration) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * multiplier)
        .map_or(cap, |grown| grown.min(cap))
}
