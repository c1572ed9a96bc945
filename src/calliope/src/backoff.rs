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

//! Backoff parameters for retryable calls.
//!
//! [BackoffSettings] controls two independent exponential progressions: the
//! delay between attempts, and the per-attempt timeout. Both grow by a
//! multiplier after each failed attempt, capped by their respective maxima.
//! The settings also carry the overall retry budget: either a total time
//! budget or a maximum number of attempts.
//!
//! The actual retry loop lives in [crate::retrying]; this module only
//! validates and stores the numbers.

use std::time::Duration;

/// The parameters for jittered exponential backoff.
///
/// # Example
/// ```
/// # use calliope::backoff::BackoffSettingsBuilder;
/// # use std::time::Duration;
/// let settings = BackoffSettingsBuilder::new()
///     .with_initial_retry_delay(Duration::from_millis(100))
///     .with_retry_delay_multiplier(1.5)
///     .with_max_retry_delay(Duration::from_secs(5))
///     .with_total_timeout(Duration::from_secs(30))
///     .build()?;
/// # Ok::<(), calliope::backoff::BackoffSettingsError>(())
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct BackoffSettings {
    pub(crate) initial_retry_delay: Duration,
    pub(crate) retry_delay_multiplier: f64,
    pub(crate) max_retry_delay: Duration,
    pub(crate) initial_rpc_timeout: Option<Duration>,
    pub(crate) rpc_timeout_multiplier: f64,
    pub(crate) max_rpc_timeout: Option<Duration>,
    pub(crate) total_timeout: Option<Duration>,
    pub(crate) max_retries: Option<u32>,
}

impl BackoffSettings {
    /// The delay before the first retry is sampled from `[0, this value)`.
    pub fn initial_retry_delay(&self) -> Duration {
        self.initial_retry_delay
    }

    /// The factor applied to the retry delay after each failed attempt.
    pub fn retry_delay_multiplier(&self) -> f64 {
        self.retry_delay_multiplier
    }

    /// The cap on the retry delay.
    pub fn max_retry_delay(&self) -> Duration {
        self.max_retry_delay
    }

    /// The timeout for the first attempt, if set.
    pub fn initial_rpc_timeout(&self) -> Option<Duration> {
        self.initial_rpc_timeout
    }

    /// The factor applied to the attempt timeout after each failed attempt.
    pub fn rpc_timeout_multiplier(&self) -> f64 {
        self.rpc_timeout_multiplier
    }

    /// The cap on the attempt timeout.
    pub fn max_rpc_timeout(&self) -> Option<Duration> {
        self.max_rpc_timeout
    }

    /// The overall time budget for the call, including all retries.
    pub fn total_timeout(&self) -> Option<Duration> {
        self.total_timeout
    }

    /// The maximum number of attempts, mutually exclusive with
    /// [total_timeout][BackoffSettings::total_timeout].
    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    /// Scales `current` by `multiplier`, saturating at `cap`.
    pub(crate) fn grow(current: Duration, multiplier: f64, cap: Duration) -> Duration {
        let scaled =
            Duration::try_from_secs_f64(current.as_secs_f64() * multiplier).unwrap_or(cap);
        std::cmp::min(scaled, cap)
    }
}

impl std::default::Default for BackoffSettings {
    /// The classic defaults: delays start at 100ms and grow by 1.3x up to
    /// one minute; attempts get 20s each; the total budget is 10 minutes.
    fn default() -> Self {
        Self {
            initial_retry_delay: Duration::from_millis(100),
            retry_delay_multiplier: 1.3,
            max_retry_delay: Duration::from_secs(60),
            initial_rpc_timeout: Some(Duration::from_secs(20)),
            rpc_timeout_multiplier: 1.0,
            max_rpc_timeout: Some(Duration::from_secs(20)),
            total_timeout: Some(Duration::from_secs(600)),
            max_retries: None,
        }
    }
}

/// A builder for [BackoffSettings].
#[derive(Clone, Debug)]
pub struct BackoffSettingsBuilder {
    initial_retry_delay: Duration,
    retry_delay_multiplier: f64,
    max_retry_delay: Duration,
    initial_rpc_timeout: Option<Duration>,
    rpc_timeout_multiplier: f64,
    max_rpc_timeout: Option<Duration>,
    total_timeout: Option<Duration>,
    max_retries: Option<u32>,
}

impl BackoffSettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The delay bound for the first retry.
    pub fn with_initial_retry_delay(mut self, v: Duration) -> Self {
        self.initial_retry_delay = v;
        self
    }

    /// The growth factor for the retry delay. Must be >= 1.0.
    pub fn with_retry_delay_multiplier(mut self, v: f64) -> Self {
        self.retry_delay_multiplier = v;
        self
    }

    /// The cap for the retry delay.
    pub fn with_max_retry_delay(mut self, v: Duration) -> Self {
        self.max_retry_delay = v;
        self
    }

    /// The timeout for the first attempt.
    pub fn with_initial_rpc_timeout(mut self, v: Duration) -> Self {
        self.initial_rpc_timeout = Some(v);
        self
    }

    /// The growth factor for the attempt timeout. Must be >= 1.0.
    pub fn with_rpc_timeout_multiplier(mut self, v: f64) -> Self {
        self.rpc_timeout_multiplier = v;
        self
    }

    /// The cap for the attempt timeout.
    pub fn with_max_rpc_timeout(mut self, v: Duration) -> Self {
        self.max_rpc_timeout = Some(v);
        self
    }

    /// The overall time budget for the call, including all retries.
    pub fn with_total_timeout(mut self, v: Duration) -> Self {
        self.total_timeout = Some(v);
        self
    }

    /// The maximum number of attempts. Setting this **and** a total timeout
    /// is diagnosed when the call runs, not here; see [crate::retrying].
    pub fn with_max_retries(mut self, v: u32) -> Self {
        self.max_retries = Some(v);
        self
    }

    /// Validates the parameters and creates the settings.
    pub fn build(self) -> std::result::Result<BackoffSettings, BackoffSettingsError> {
        if self.initial_retry_delay.is_zero() {
            return Err(BackoffSettingsError::ZeroInitialDelay);
        }
        if self.retry_delay_multiplier < 1.0 {
            return Err(BackoffSettingsError::Multiplier(
                "retry delay",
                self.retry_delay_multiplier,
            ));
        }
        if self.max_retry_delay < self.initial_retry_delay {
            return Err(BackoffSettingsError::Range(
                "retry delay",
                self.initial_retry_delay,
                self.max_retry_delay,
            ));
        }
        if self.rpc_timeout_multiplier < 1.0 {
            return Err(BackoffSettingsError::Multiplier(
                "RPC timeout",
                self.rpc_timeout_multiplier,
            ));
        }
        if let (Some(initial), Some(max)) = (self.initial_rpc_timeout, self.max_rpc_timeout) {
            if max < initial {
                return Err(BackoffSettingsError::Range("RPC timeout", initial, max));
            }
        }
        if let Some(t) = self.initial_rpc_timeout.filter(|t| t.is_zero()) {
            return Err(BackoffSettingsError::ZeroRpcTimeout(t));
        }
        Ok(BackoffSettings {
            initial_retry_delay: self.initial_retry_delay,
            retry_delay_multiplier: self.retry_delay_multiplier,
            max_retry_delay: self.max_retry_delay,
            initial_rpc_timeout: self.initial_rpc_timeout,
            rpc_timeout_multiplier: self.rpc_timeout_multiplier,
            max_rpc_timeout: self.max_rpc_timeout,
            total_timeout: self.total_timeout,
            max_retries: self.max_retries,
        })
    }

    /// Creates the settings, adjusting out-of-range parameters instead of
    /// failing.
    pub fn clamp(self) -> BackoffSettings {
        let initial_retry_delay = if self.initial_retry_delay.is_zero() {
            Duration::from_millis(1)
        } else {
            self.initial_retry_delay
        };
        let max_retry_delay = std::cmp::max(self.max_retry_delay, initial_retry_delay);
        let initial_rpc_timeout = self
            .initial_rpc_timeout
            .map(|t| std::cmp::max(t, Duration::from_millis(1)));
        let max_rpc_timeout = match (initial_rpc_timeout, self.max_rpc_timeout) {
            (Some(initial), Some(max)) => Some(std::cmp::max(initial, max)),
            (_, max) => max,
        };
        BackoffSettings {
            initial_retry_delay,
            retry_delay_multiplier: self.retry_delay_multiplier.max(1.0),
            max_retry_delay,
            initial_rpc_timeout,
            rpc_timeout_multiplier: self.rpc_timeout_multiplier.max(1.0),
            max_rpc_timeout,
            total_timeout: self.total_timeout,
            max_retries: self.max_retries,
        }
    }
}

impl std::default::Default for BackoffSettingsBuilder {
    /// Starts from the classic delay progression with no per-attempt
    /// timeout and no overall budget; callers opt into the bounds they
    /// want.
    fn default() -> Self {
        Self {
            initial_retry_delay: Duration::from_millis(100),
            retry_delay_multiplier: 1.3,
            max_retry_delay: Duration::from_secs(60),
            initial_rpc_timeout: None,
            rpc_timeout_multiplier: 1.0,
            max_rpc_timeout: None,
            total_timeout: None,
            max_retries: None,
        }
    }
}

/// The errors detected when validating [BackoffSettings].
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BackoffSettingsError {
    #[error("the initial retry delay must be greater than zero")]
    ZeroInitialDelay,
    #[error("the {0} multiplier must be >= 1.0, got {1}")]
    Multiplier(&'static str, f64),
    #[error("the maximum {0} ({2:?}) must be >= the initial value ({1:?})")]
    Range(&'static str, Duration, Duration),
    #[error("the initial RPC timeout must be greater than zero, got {0:?}")]
    ZeroRpcTimeout(Duration),
}
