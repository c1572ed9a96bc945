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

use crate::options::OtherArgs;
use std::time::Duration;
use tokio::time::Instant;

/// Per-attempt context handed to the raw call function.
///
/// A fresh context is computed for every attempt: the deadline is always
/// `now + timeout` at the moment the attempt starts, and the metadata is
/// rebuilt from the call's [OtherArgs]. Nothing is carried over from one
/// attempt to the next.
#[derive(Clone, Debug)]
pub struct CallContext {
    deadline: Instant,
    metadata: http::HeaderMap,
}

impl CallContext {
    pub fn new(deadline: Instant, metadata: http::HeaderMap) -> Self {
        Self { deadline, metadata }
    }

    /// Computes the context for one attempt starting now.
    pub(crate) fn for_attempt(timeout: Duration, other_args: &OtherArgs) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            metadata: other_args.build_metadata(),
        }
    }

    /// The absolute deadline for this attempt.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// The time remaining until the deadline, zero if it already passed.
    pub fn remaining_time(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// The metadata (headers) for this attempt.
    pub fn metadata(&self) -> &http::HeaderMap {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[tokio::test(start_paused = true)]
    async fn fresh_deadline_per_attempt() {
        let args = OtherArgs::default();
        let first = CallContext::for_attempt(Duration::from_secs(5), &args);
        tokio::time::advance(Duration::from_secs(2)).await;
        let second = CallContext::for_attempt(Duration::from_secs(5), &args);
        assert_eq!(second.deadline() - first.deadline(), Duration::from_secs(2));
        assert_eq!(second.remaining_time(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_time_saturates() {
        let ctx = CallContext::for_attempt(Duration::from_millis(10), &OtherArgs::default());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(ctx.remaining_time(), Duration::ZERO);
    }

    #[tokio::test]
    async fn metadata_from_other_args() {
        let args = OtherArgs::default()
            .with_header("x-test-id", HeaderValue::from_static("abc123"));
        let ctx = CallContext::for_attempt(Duration::from_secs(1), &args);
        assert_eq!(
            ctx.metadata().get("x-test-id"),
            Some(&HeaderValue::from_static("abc123"))
        );
    }
}
