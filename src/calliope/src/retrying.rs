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

//! The retry loop.
//!
//! Drives repeated attempts of a single logical call under a
//! [RetryOptions] policy: every failed attempt with a transient status
//! code schedules the next attempt after a jittered delay, the delay and
//! the per-attempt timeout grow multiplicatively up to their caps, and the
//! whole loop is bounded by either a total time budget or an attempt cap.
//!
//! Attempts are strictly sequential. Cancellation works by dropping the
//! returned future: that drops the pending sleep and the in-flight attempt
//! with it, so no timers outlive the call.

use crate::Result;
use crate::backoff::BackoffSettings;
use crate::error::Error;
use crate::retry_options::RetryOptions;
use std::time::Duration;
use tokio::time::Instant;

/// Message for calls that configure both an attempt cap and a total time
/// budget. Diagnosed before the first attempt; the transport is never
/// invoked.
const EXCLUSIVE_BUDGETS_MSG: &str =
    "cannot set both a total timeout and a maximum number of retries in backoff settings";

/// Message for calls that exhaust their attempt cap.
const MAX_RETRIES_MSG: &str =
    "Exceeded maximum number of retries before any response was received";

/// Runs `inner` until it succeeds, fails permanently, or the retry budget
/// runs out.
///
/// `inner` receives the timeout for one attempt, or `None` when neither
/// the backoff settings nor the remaining budget bound the attempt. Each
/// invocation of `inner` must be a fresh attempt.
pub async fn retry_call<F, Response>(
    inner: F,
    retry: &RetryOptions,
    api_name: Option<&str>,
) -> Result<Response>
where
    F: AsyncFnMut(Option<Duration>) -> Result<Response> + Send,
{
    retry_call_with_sleep(inner, |d| tokio::time::sleep(d), retry, api_name).await
}

/// The retry loop with an injected sleep, for tests that need to observe
/// or skip the delays.
pub(crate) async fn retry_call_with_sleep<F, S, Response>(
    mut inner: F,
    sleep: S,
    retry: &RetryOptions,
    api_name: Option<&str>,
) -> Result<Response>
where
    F: AsyncFnMut(Option<Duration>) -> Result<Response> + Send,
    S: AsyncFn(Duration) + Send,
{
    let backoff = retry.backoff_settings();
    if backoff.max_retries().is_some() && backoff.total_timeout().is_some() {
        return Err(Error::invalid_argument(EXCLUSIVE_BUDGETS_MSG));
    }

    let deadline = backoff.total_timeout().map(|t| Instant::now() + t);
    let mut delay = backoff.initial_retry_delay();
    let mut timeout = backoff.initial_rpc_timeout();
    let mut retries = 0_u32;
    loop {
        let now = Instant::now();
        if let Some(deadline) = deadline {
            if now >= deadline {
                return Err(Error::exhausted(total_timeout_message(
                    api_name,
                    backoff.total_timeout().unwrap_or_default(),
                )));
            }
        }
        if let Some(max_retries) = backoff.max_retries() {
            if retries >= max_retries {
                return Err(Error::exhausted(MAX_RETRIES_MSG));
            }
        }
        retries += 1;
        let remaining = deadline.map(|d| d.saturating_duration_since(now));
        match inner(effective_timeout(timeout, remaining)).await {
            Ok(response) => return Ok(response),
            Err(error) if !is_transient(retry, &error) => {
                return Err(Error::non_transient(error));
            }
            Err(error) => {
                let to_sleep = jittered(delay);
                tracing::debug!(
                    attempt = retries,
                    delay_ms = to_sleep.as_millis() as u64,
                    error = %error,
                    "transient error, scheduling retry"
                );
                sleep(to_sleep).await;
                delay = BackoffSettings::grow(
                    delay,
                    backoff.retry_delay_multiplier(),
                    backoff.max_retry_delay(),
                );
                timeout = timeout.map(|t| {
                    BackoffSettings::grow(
                        t,
                        backoff.rpc_timeout_multiplier(),
                        backoff.max_rpc_timeout().unwrap_or(Duration::MAX),
                    )
                });
            }
        }
    }
}

/// The timeout for one attempt: the current backoff timeout clamped by the
/// remaining total budget.
fn effective_timeout(timeout: Option<Duration>, remaining: Option<Duration>) -> Option<Duration> {
    match (timeout, remaining) {
        (Some(t), Some(r)) => Some(std::cmp::min(t, r)),
        (t, r) => t.or(r),
    }
}

/// Uniform in `[0, delay)`.
fn jittered(delay: Duration) -> Duration {
    use rand::Rng;
    if delay.is_zero() {
        return delay;
    }
    rand::rng().random_range(Duration::ZERO..delay)
}

fn is_transient(retry: &RetryOptions, error: &Error) -> bool {
    error
        .status_code()
        .is_some_and(|code| retry.retry_codes().contains(&code))
}

fn total_timeout_message(api_name: Option<&str>, total: Duration) -> String {
    let millis = total.as_millis();
    match api_name {
        Some(name) => format!(
            "Total timeout of API {name} exceeded {millis} milliseconds before any response was received."
        ),
        None => format!(
            "Total timeout exceeded {millis} milliseconds before any response was received."
        ),
    }
}
