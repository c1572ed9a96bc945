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

//! End-to-end behavior of the call orchestrator: settlement, retries,
//! budgets, and cancellation as an application observes them.

use calliope::api_call::{ApiCall, RawCall, create_api_call, raw_call};
use calliope::backoff::{BackoffSettings, BackoffSettingsBuilder};
use calliope::descriptor::Descriptor;
use calliope::error::Error;
use calliope::error::rpc::{Code, Status};
use calliope::options::{CallOptions, CallSettings};
use calliope::retry_options::RetryOptions;
use mockall::Sequence;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_test::assert_ok;

mockall::mock! {
    Transport {
        fn call(&self, request: u32) -> calliope::Result<u32>;
    }
}

fn transient() -> Error {
    Error::service(
        Status::default()
            .set_code(Code::Cancelled)
            .set_message("interrupted"),
    )
}

fn mock_raw(transport: MockTransport) -> RawCall<u32, u32> {
    let transport = Arc::new(transport);
    raw_call(move |request: u32, _ctx| {
        let transport = transport.clone();
        async move { transport.call(request) }
    })
}

#[tokio::test]
async fn callback_delivers_result_and_attempt_sees_deadline() {
    // The raw function runs with a concrete deadline derived from the
    // method timeout; the callback observes the plain response.
    let timeout = Duration::from_secs(5);
    let raw = raw_call(move |_request: (), ctx| async move {
        let remaining = ctx.deadline().saturating_duration_since(Instant::now());
        assert!(remaining > Duration::ZERO && remaining <= timeout);
        Ok(42)
    });
    let settings = CallSettings::default().with_timeout(timeout);
    let call = ApiCall::from_raw(raw, settings, Descriptor::Normal);
    let (tx, rx) = tokio::sync::oneshot::channel();
    let _cancel = call.call_with_callback((), None, move |result| {
        let _ = tx.send(result);
    });
    let result = rx.await.unwrap();
    assert_eq!(assert_ok!(result), 42);
}

#[tokio::test(start_paused = true)]
async fn two_transient_failures_then_success() -> anyhow::Result<()> {
    let mut transport = MockTransport::new();
    let mut seq = Sequence::new();
    transport
        .expect_call()
        .times(2)
        .in_sequence(&mut seq)
        .returning(|_| Err(transient()));
    transport
        .expect_call()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(1729));
    let backoff = BackoffSettingsBuilder::new()
        .with_initial_retry_delay(Duration::from_millis(100))
        .with_retry_delay_multiplier(1.2)
        .with_max_retry_delay(Duration::from_millis(1000))
        .with_rpc_timeout_multiplier(1.5)
        .with_max_rpc_timeout(Duration::from_millis(3000))
        .with_total_timeout(Duration::from_millis(4500))
        .build()?;
    let settings =
        CallSettings::default().with_retry(RetryOptions::new([Code::Cancelled], backoff));
    let call = ApiCall::from_raw(mock_raw(transport), settings, Descriptor::Normal);
    let got = call.call(7, None).await?;
    assert_eq!(got, 1729);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn total_timeout_produces_the_documented_message() -> anyhow::Result<()> {
    let mut transport = MockTransport::new();
    transport.expect_call().returning(|_| Err(transient()));
    let backoff = BackoffSettingsBuilder::new()
        .with_initial_retry_delay(Duration::from_millis(30))
        .with_max_retry_delay(Duration::from_millis(60))
        .with_total_timeout(Duration::from_millis(100))
        .build()?;
    let settings = CallSettings::default()
        .with_api_name("TestApi")
        .with_retry(RetryOptions::new([Code::Cancelled], backoff));
    let call = ApiCall::from_raw(mock_raw(transport), settings, Descriptor::Normal);
    let err = call.call(0, None).await.unwrap_err();
    assert_eq!(err.status_code(), Some(Code::DeadlineExceeded));
    assert_eq!(
        err.to_string(),
        "Total timeout of API TestApi exceeded 100 milliseconds before any response was received."
    );
    Ok(())
}

#[tokio::test]
async fn conflicting_budgets_fail_before_any_attempt() -> anyhow::Result<()> {
    // Both budgets are constructible; the conflict surfaces per call, with
    // the transport never invoked.
    let mut transport = MockTransport::new();
    transport.expect_call().times(0);
    let backoff = BackoffSettingsBuilder::new()
        .with_total_timeout(Duration::from_secs(10))
        .with_max_retries(3)
        .build()?;
    let settings =
        CallSettings::default().with_retry(RetryOptions::new([Code::Cancelled], backoff));
    let call = ApiCall::from_raw(mock_raw(transport), settings, Descriptor::Normal);
    let err = call.call(0, None).await.unwrap_err();
    assert_eq!(err.status_code(), Some(Code::InvalidArgument));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn max_retries_allows_exactly_that_many_attempts() -> anyhow::Result<()> {
    let attempts = Arc::new(AtomicU32::new(0));
    let counted = attempts.clone();
    let raw = raw_call(move |_request: (), _ctx| {
        counted.fetch_add(1, Ordering::SeqCst);
        async { Err::<u32, _>(transient()) }
    });
    let backoff = BackoffSettingsBuilder::new()
        .with_initial_retry_delay(Duration::from_millis(10))
        .with_max_retries(2)
        .build()?;
    let settings =
        CallSettings::default().with_retry(RetryOptions::new([Code::Cancelled], backoff));
    let call = ApiCall::from_raw(raw, settings, Descriptor::Normal);
    let err = call.call((), None).await.unwrap_err();
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(err.status_code(), Some(Code::DeadlineExceeded));
    Ok(())
}

#[tokio::test]
async fn settlement_is_at_most_once_under_cancel_races() {
    // Cancels racing a real response: the callback observes exactly one
    // settlement, whichever side wins.
    for _ in 0..16 {
        let raw = raw_call(|_request: (), _ctx| async {
            tokio::task::yield_now().await;
            Ok(42)
        });
        let call = ApiCall::from_raw(raw, CallSettings::default(), Descriptor::Normal);
        let settled = Arc::new(AtomicU32::new(0));
        let counted = settled.clone();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let cancel = call.call_with_callback((), None, move |_result| {
            counted.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(());
        });
        let racers = (0..4)
            .map(|_| {
                let cancel = cancel.clone();
                tokio::spawn(async move { cancel.cancel() })
            })
            .collect::<Vec<_>>();
        for r in racers {
            r.await.unwrap();
        }
        rx.await.unwrap();
        cancel.cancel();
        tokio::task::yield_now().await;
        assert_eq!(settled.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn cancel_before_stub_resolution_settles_promptly() {
    let stub = futures::future::pending::<calliope::Result<RawCall<(), u32>>>();
    let call = create_api_call(stub, CallSettings::default(), Descriptor::Normal);
    let ongoing = call.call((), None);
    ongoing.cancel();
    let err = ongoing.await.unwrap_err();
    assert!(err.is_cancelled(), "{err:?}");
    assert_eq!(err.status_code(), Some(Code::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn override_timeout_becomes_the_retry_budget() -> anyhow::Result<()> {
    // A per-call timeout with retries enabled doubles as the total budget:
    // the call gives up within the override, not the backoff's original
    // 600s default.
    let start = Instant::now();
    let raw = raw_call(|_request: (), _ctx| async { Err::<u32, _>(transient()) });
    let settings = CallSettings::default().with_retry(RetryOptions::new(
        [Code::Cancelled],
        BackoffSettings::default(),
    ));
    let call = ApiCall::from_raw(raw, settings, Descriptor::Normal);
    let options = CallOptions::new().with_timeout(Duration::from_millis(500));
    let err = call.call((), Some(options)).await.unwrap_err();
    assert_eq!(err.status_code(), Some(Code::DeadlineExceeded));
    let elapsed = Instant::now() - start;
    assert!(elapsed <= Duration::from_secs(2), "{elapsed:?}");
    Ok(())
}

#[tokio::test]
async fn non_transient_errors_are_annotated() {
    use std::error::Error as _;
    let raw = raw_call(|_request: (), _ctx| async {
        Err::<u32, _>(Error::service(
            Status::default()
                .set_code(Code::PermissionDenied)
                .set_message("who are you"),
        ))
    });
    let settings = CallSettings::default().with_retry(RetryOptions::new(
        [Code::Unavailable],
        BackoffSettings::default(),
    ));
    let call = ApiCall::from_raw(raw, settings, Descriptor::Normal);
    let err = call.call((), None).await.unwrap_err();
    assert!(err.is_non_transient(), "{err:?}");
    assert_eq!(err.status_code(), Some(Code::PermissionDenied));
    let source = err.source().unwrap();
    assert!(source.to_string().contains("who are you"), "{source}");
}
