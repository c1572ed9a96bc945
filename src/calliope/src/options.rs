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

//! Per-method configuration and per-call overrides.
//!
//! [CallSettings] is built once per method when a client is constructed.
//! Every invocation derives a fresh value via [CallSettings::merge] with the
//! application's [CallOptions]; the base is never mutated, so concurrent
//! calls on the same method cannot interfere.

use crate::backoff::BackoffSettings;
use crate::error::Error;
use crate::error::rpc::Code;
use crate::retry_options::RetryOptions;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Builds the metadata for one attempt from the statically configured
/// headers. Installed via [OtherArgs::with_metadata_builder].
pub type MetadataBuilder = Arc<dyn Fn(&http::HeaderMap) -> http::HeaderMap + Send + Sync>;

/// Decides whether a failed connection attempt of a server-streaming call
/// is worth retrying. See [RetryRequestOptions].
pub type ShouldRetry = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Extra arguments forwarded to the transport with every attempt.
#[derive(Clone, Default)]
pub struct OtherArgs {
    metadata_builder: Option<MetadataBuilder>,
    headers: http::HeaderMap,
    params: HashMap<String, serde_json::Value>,
}

impl OtherArgs {
    /// Installs a hook that computes the attempt metadata from the static
    /// headers. Without a hook the static headers are used as-is.
    pub fn with_metadata_builder(mut self, v: MetadataBuilder) -> Self {
        self.metadata_builder = Some(v);
        self
    }

    /// Adds a header sent with every attempt.
    pub fn with_header<K>(mut self, key: K, value: http::HeaderValue) -> Self
    where
        K: http::header::IntoHeaderName,
    {
        self.headers.insert(key, value);
        self
    }

    /// Adds a free-form parameter for transport adapters.
    pub fn with_param<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        self.params.insert(key.into(), value.into());
        self
    }

    /// The statically configured headers.
    pub fn headers(&self) -> &http::HeaderMap {
        &self.headers
    }

    /// Looks up a free-form parameter.
    pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
        self.params.get(key)
    }

    pub(crate) fn build_metadata(&self) -> http::HeaderMap {
        match &self.metadata_builder {
            Some(build) => build(&self.headers),
            None => self.headers.clone(),
        }
    }

    /// Shallow merge: override keys win, everything else is kept.
    pub(crate) fn merge(&mut self, overrides: &OtherArgs) {
        if overrides.metadata_builder.is_some() {
            self.metadata_builder = overrides.metadata_builder.clone();
        }
        for (key, value) in overrides.headers.iter() {
            self.headers.insert(key.clone(), value.clone());
        }
        self.params
            .extend(overrides.params.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

impl std::fmt::Debug for OtherArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtherArgs")
            .field(
                "metadata_builder",
                &self.metadata_builder.as_ref().map(|_| "<fn>"),
            )
            .field("headers", &self.headers)
            .field("params", &self.params)
            .finish()
    }
}

impl PartialEq for OtherArgs {
    fn eq(&self, other: &Self) -> bool {
        let builders = match (&self.metadata_builder, &other.metadata_builder) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        builders && self.headers == other.headers && self.params == other.params
    }
}

/// Connection-level retry knobs for server-streaming calls.
///
/// These are unrelated to the application-level retry loop, which is
/// disabled for streaming calls: they only govern re-establishing the
/// stream before the first response arrives.
#[derive(Clone)]
pub struct RetryRequestOptions {
    retries: u32,
    no_response_retries: u32,
    current_retry_attempt: u32,
    should_retry: Option<ShouldRetry>,
}

impl RetryRequestOptions {
    pub fn with_retries(mut self, v: u32) -> Self {
        self.retries = v;
        self
    }

    pub fn with_no_response_retries(mut self, v: u32) -> Self {
        self.no_response_retries = v;
        self
    }

    pub fn with_current_retry_attempt(mut self, v: u32) -> Self {
        self.current_retry_attempt = v;
        self
    }

    pub fn with_should_retry(mut self, v: ShouldRetry) -> Self {
        self.should_retry = Some(v);
        self
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn no_response_retries(&self) -> u32 {
        self.no_response_retries
    }

    pub fn current_retry_attempt(&self) -> u32 {
        self.current_retry_attempt
    }

    pub(crate) fn should_retry(&self, error: &Error) -> bool {
        match &self.should_retry {
            Some(f) => f(error),
            None => true,
        }
    }
}

impl std::default::Default for RetryRequestOptions {
    fn default() -> Self {
        Self {
            retries: 2,
            no_response_retries: 2,
            current_retry_attempt: 0,
            should_retry: None,
        }
    }
}

impl std::fmt::Debug for RetryRequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryRequestOptions")
            .field("retries", &self.retries)
            .field("no_response_retries", &self.no_response_retries)
            .field("current_retry_attempt", &self.current_retry_attempt)
            .field("should_retry", &self.should_retry.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl PartialEq for RetryRequestOptions {
    fn eq(&self, other: &Self) -> bool {
        let should_retry = match (&self.should_retry, &other.should_retry) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        should_retry
            && self.retries == other.retries
            && self.no_response_retries == other.no_response_retries
            && self.current_retry_attempt == other.current_retry_attempt
    }
}

/// A per-call retry override.
///
/// Three intents must stay distinguishable: "keep whatever the method
/// configures" (no override at all, `None` in [CallOptions]), "disable
/// retries for this call" ([RetryOverride::Disable]), and "replace only the
/// supplied parts" ([RetryOverride::Settings]).
#[derive(Clone, Debug, PartialEq)]
pub enum RetryOverride {
    /// Disable retries for this call even when the method enables them.
    Disable,
    /// Replace the parts that are supplied, keep the base for the rest.
    /// Supplying neither part keeps the base retry configuration unchanged.
    Settings {
        retry_codes: Option<BTreeSet<Code>>,
        backoff_settings: Option<BackoffSettings>,
    },
}

/// The full per-method configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct CallSettings {
    timeout: Duration,
    retry: Option<RetryOptions>,
    auto_paginate: bool,
    max_results: Option<u64>,
    other_args: OtherArgs,
    is_bundling: bool,
    long_running: Option<BackoffSettings>,
    api_name: Option<String>,
    retry_request_options: Option<RetryRequestOptions>,
}

impl std::default::Default for CallSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: None,
            auto_paginate: true,
            max_results: None,
            other_args: OtherArgs::default(),
            is_bundling: false,
            long_running: None,
            api_name: None,
            retry_request_options: None,
        }
    }
}

impl CallSettings {
    pub fn with_timeout(mut self, v: Duration) -> Self {
        self.timeout = v;
        self
    }

    pub fn with_retry(mut self, v: RetryOptions) -> Self {
        self.retry = Some(v);
        self
    }

    pub fn with_auto_paginate(mut self, v: bool) -> Self {
        self.auto_paginate = v;
        self
    }

    pub fn with_max_results(mut self, v: u64) -> Self {
        self.max_results = Some(v);
        self
    }

    pub fn with_other_args(mut self, v: OtherArgs) -> Self {
        self.other_args = v;
        self
    }

    pub fn with_bundling(mut self, v: bool) -> Self {
        self.is_bundling = v;
        self
    }

    pub fn with_long_running(mut self, v: BackoffSettings) -> Self {
        self.long_running = Some(v);
        self
    }

    pub fn with_api_name<T: Into<String>>(mut self, v: T) -> Self {
        self.api_name = Some(v.into());
        self
    }

    pub fn with_retry_request_options(mut self, v: RetryRequestOptions) -> Self {
        self.retry_request_options = Some(v);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn retry(&self) -> Option<&RetryOptions> {
        self.retry.as_ref()
    }

    pub fn auto_paginate(&self) -> bool {
        self.auto_paginate
    }

    pub fn max_results(&self) -> Option<u64> {
        self.max_results
    }

    pub fn other_args(&self) -> &OtherArgs {
        &self.other_args
    }

    pub fn is_bundling(&self) -> bool {
        self.is_bundling
    }

    pub fn long_running(&self) -> Option<&BackoffSettings> {
        self.long_running.as_ref()
    }

    pub fn api_name(&self) -> Option<&str> {
        self.api_name.as_deref()
    }

    pub fn retry_request_options(&self) -> Option<&RetryRequestOptions> {
        self.retry_request_options.as_ref()
    }

    /// True when this call should run under the retry loop.
    pub fn retry_enabled(&self) -> bool {
        self.retry.as_ref().is_some_and(|r| r.is_enabled())
    }

    /// Derives the settings for one invocation.
    ///
    /// Returns a fresh value; the base is never modified. With no overrides
    /// this is a structural copy. Otherwise the precedence rules are:
    ///
    /// - The method `timeout` doubles as a simplified backoff spec: when
    ///   retries are enabled it is pushed into the backoff's RPC-timeout and
    ///   total-timeout fields *before* the overrides apply. An override
    ///   `timeout` wins and is propagated the same way.
    /// - `retry` overrides replace only the supplied parts; see
    ///   [RetryOverride].
    /// - `auto_paginate` can only be narrowed from `true` to `false`; an
    ///   override cannot force it back on.
    /// - `other_args` merge shallowly, override keys win.
    /// - `max_retries` installs an attempt cap and clears the total-timeout
    ///   budget, the two being mutually exclusive.
    pub fn merge(&self, overrides: Option<&CallOptions>) -> CallSettings {
        let mut merged = self.clone();
        let Some(overrides) = overrides else {
            return merged;
        };

        propagate_timeout(&mut merged.retry, merged.timeout);

        match &overrides.retry {
            None => {}
            Some(RetryOverride::Disable) => merged.retry = None,
            Some(RetryOverride::Settings {
                retry_codes: None,
                backoff_settings: None,
            }) => {}
            Some(RetryOverride::Settings {
                retry_codes,
                backoff_settings,
            }) => {
                let base = merged.retry.take().unwrap_or_default();
                let codes = retry_codes
                    .clone()
                    .unwrap_or_else(|| base.retry_codes().clone());
                let backoff = backoff_settings
                    .clone()
                    .unwrap_or_else(|| base.backoff_settings().clone());
                merged.retry = Some(RetryOptions::new(codes, backoff));
            }
        }

        if let Some(timeout) = overrides.timeout {
            merged.timeout = timeout;
            propagate_timeout(&mut merged.retry, timeout);
        }
        if overrides.auto_paginate == Some(false) {
            merged.auto_paginate = false;
        }
        if let Some(v) = overrides.max_results {
            merged.max_results = Some(v);
        }
        if let Some(args) = &overrides.other_args {
            merged.other_args.merge(args);
        }
        if let Some(v) = overrides.is_bundling {
            merged.is_bundling = v;
        }
        if let Some(v) = &overrides.long_running {
            merged.long_running = Some(v.clone());
        }
        if let Some(v) = &overrides.api_name {
            merged.api_name = Some(v.clone());
        }
        if let Some(v) = &overrides.retry_request_options {
            merged.retry_request_options = Some(v.clone());
        }
        if let Some(max_retries) = overrides.max_retries {
            if let Some(retry) = merged.retry.as_mut() {
                let backoff = retry.backoff_settings_mut();
                backoff.max_retries = Some(max_retries);
                backoff.total_timeout = None;
            }
        }
        merged
    }
}

/// A plain timeout doubles as a simplified backoff spec when retries are
/// enabled.
fn propagate_timeout(retry: &mut Option<RetryOptions>, timeout: Duration) {
    if let Some(retry) = retry.as_mut().filter(|r| r.is_enabled()) {
        let backoff = retry.backoff_settings_mut();
        backoff.initial_rpc_timeout = Some(timeout);
        backoff.max_rpc_timeout = Some(timeout);
        backoff.total_timeout = Some(timeout);
    }
}

/// Per-call overrides, all optional.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallOptions {
    timeout: Option<Duration>,
    retry: Option<RetryOverride>,
    auto_paginate: Option<bool>,
    max_results: Option<u64>,
    max_retries: Option<u32>,
    other_args: Option<OtherArgs>,
    is_bundling: Option<bool>,
    long_running: Option<BackoffSettings>,
    api_name: Option<String>,
    retry_request_options: Option<RetryRequestOptions>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, v: Duration) -> Self {
        self.timeout = Some(v);
        self
    }

    /// Fully replaces the retry configuration for this call.
    pub fn with_retry(mut self, v: RetryOptions) -> Self {
        self.retry = Some(RetryOverride::Settings {
            retry_codes: Some(v.retry_codes().clone()),
            backoff_settings: Some(v.backoff_settings().clone()),
        });
        self
    }

    /// Replaces only the transient code set, keeping the base backoff.
    pub fn with_retry_codes<C>(mut self, codes: C) -> Self
    where
        C: IntoIterator<Item = Code>,
    {
        let codes = Some(codes.into_iter().collect());
        self.retry = Some(match self.retry.take() {
            Some(RetryOverride::Settings {
                backoff_settings, ..
            }) => RetryOverride::Settings {
                retry_codes: codes,
                backoff_settings,
            },
            _ => RetryOverride::Settings {
                retry_codes: codes,
                backoff_settings: None,
            },
        });
        self
    }

    /// Replaces only the backoff settings, keeping the base code set.
    pub fn with_retry_backoff(mut self, backoff: BackoffSettings) -> Self {
        let backoff = Some(backoff);
        self.retry = Some(match self.retry.take() {
            Some(RetryOverride::Settings { retry_codes, .. }) => RetryOverride::Settings {
                retry_codes,
                backoff_settings: backoff,
            },
            _ => RetryOverride::Settings {
                retry_codes: None,
                backoff_settings: backoff,
            },
        });
        self
    }

    /// Disables retries for this call.
    pub fn with_retry_disabled(mut self) -> Self {
        self.retry = Some(RetryOverride::Disable);
        self
    }

    pub fn with_auto_paginate(mut self, v: bool) -> Self {
        self.auto_paginate = Some(v);
        self
    }

    pub fn with_max_results(mut self, v: u64) -> Self {
        self.max_results = Some(v);
        self
    }

    pub fn with_max_retries(mut self, v: u32) -> Self {
        self.max_retries = Some(v);
        self
    }

    pub fn with_other_args(mut self, v: OtherArgs) -> Self {
        self.other_args = Some(v);
        self
    }

    pub fn with_bundling(mut self, v: bool) -> Self {
        self.is_bundling = Some(v);
        self
    }

    pub fn with_long_running(mut self, v: BackoffSettings) -> Self {
        self.long_running = Some(v);
        self
    }

    pub fn with_api_name<T: Into<String>>(mut self, v: T) -> Self {
        self.api_name = Some(v.into());
        self
    }

    pub fn with_retry_request_options(mut self, v: RetryRequestOptions) -> Self {
        self.retry_request_options = Some(v);
        self
    }

    pub fn retry(&self) -> Option<&RetryOverride> {
        self.retry.as_ref()
    }

    pub fn is_bundling(&self) -> Option<bool> {
        self.is_bundling
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffSettingsBuilder;
    use http::HeaderValue;

    fn test_backoff() -> BackoffSettings {
        BackoffSettingsBuilder::new()
            .with_initial_retry_delay(Duration::from_millis(100))
            .with_retry_delay_multiplier(1.2)
            .with_max_retry_delay(Duration::from_secs(1))
            .with_rpc_timeout_multiplier(1.5)
            .with_max_rpc_timeout(Duration::from_secs(3))
            .with_total_timeout(Duration::from_millis(4500))
            .build()
            .unwrap()
    }

    fn retrying_settings() -> CallSettings {
        CallSettings::default().with_retry(RetryOptions::new([Code::Unavailable], test_backoff()))
    }

    #[test]
    fn merge_none_is_structural_copy() {
        let base = retrying_settings().with_api_name("TestApi");
        let merged = base.merge(None);
        assert_eq!(merged, base);
        // No drift from repeated no-op merges.
        assert_eq!(merged.merge(None), base);
    }

    #[test]
    fn merge_is_idempotent_with_same_overrides() {
        let base = retrying_settings();
        let overrides = CallOptions::new()
            .with_timeout(Duration::from_secs(7))
            .with_retry_codes([Code::Aborted])
            .with_max_results(10);
        let once = base.merge(Some(&overrides));
        let twice = once.merge(Some(&overrides));
        assert_eq!(once, twice);
    }

    #[test]
    fn base_timeout_doubles_as_backoff_spec() {
        // A method with retries enabled but no explicit budget: the method
        // timeout becomes the per-attempt and total budget.
        let backoff = BackoffSettingsBuilder::new()
            .with_initial_retry_delay(Duration::from_millis(10))
            .build()
            .unwrap();
        let base = CallSettings::default()
            .with_timeout(Duration::from_secs(45))
            .with_retry(RetryOptions::new([Code::Unavailable], backoff));
        let merged = base.merge(Some(&CallOptions::new()));
        let b = merged.retry().unwrap().backoff_settings();
        assert_eq!(b.initial_rpc_timeout(), Some(Duration::from_secs(45)));
        assert_eq!(b.max_rpc_timeout(), Some(Duration::from_secs(45)));
        assert_eq!(b.total_timeout(), Some(Duration::from_secs(45)));
    }

    #[test]
    fn override_timeout_wins_and_propagates() {
        let base = retrying_settings();
        let overrides = CallOptions::new().with_timeout(Duration::from_secs(2));
        let merged = base.merge(Some(&overrides));
        assert_eq!(merged.timeout(), Duration::from_secs(2));
        let b = merged.retry().unwrap().backoff_settings();
        assert_eq!(b.initial_rpc_timeout(), Some(Duration::from_secs(2)));
        assert_eq!(b.max_rpc_timeout(), Some(Duration::from_secs(2)));
        assert_eq!(b.total_timeout(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn retry_override_applies_after_timeout_push() {
        // An override retry with its own budget must not be clobbered by
        // the base timeout.
        let base = retrying_settings();
        let overrides = CallOptions::new().with_retry_backoff(test_backoff());
        let merged = base.merge(Some(&overrides));
        let b = merged.retry().unwrap().backoff_settings();
        assert_eq!(b.total_timeout(), Some(Duration::from_millis(4500)));
        assert_eq!(b.max_rpc_timeout(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn retry_override_disable() {
        let base = retrying_settings();
        let merged = base.merge(Some(&CallOptions::new().with_retry_disabled()));
        assert!(merged.retry().is_none());
        assert!(!merged.retry_enabled());
    }

    #[test]
    fn retry_override_codes_only_keeps_base_backoff() {
        let base = retrying_settings();
        let overrides = CallOptions::new().with_retry_codes([Code::Aborted, Code::Internal]);
        let merged = base.merge(Some(&overrides));
        let retry = merged.retry().unwrap();
        assert_eq!(
            retry.retry_codes().iter().copied().collect::<Vec<_>>(),
            vec![Code::Aborted, Code::Internal]
        );
        // The base backoff survives, including the timeout push applied to
        // the base before the override.
        assert_eq!(
            retry.backoff_settings().total_timeout(),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn retry_override_backoff_only_keeps_base_codes() {
        let base = retrying_settings();
        let other = BackoffSettingsBuilder::new()
            .with_total_timeout(Duration::from_secs(9))
            .build()
            .unwrap();
        let merged = base.merge(Some(&CallOptions::new().with_retry_backoff(other.clone())));
        let retry = merged.retry().unwrap();
        assert!(retry.retry_codes().contains(&Code::Unavailable));
        assert_eq!(retry.backoff_settings(), &other);
    }

    #[test]
    fn retry_override_full_replace() {
        let base = retrying_settings();
        let replacement = RetryOptions::new([Code::ResourceExhausted], test_backoff());
        let merged = base.merge(Some(&CallOptions::new().with_retry(replacement.clone())));
        assert_eq!(merged.retry(), Some(&replacement));
    }

    #[test]
    fn retry_override_on_base_without_retry() {
        let base = CallSettings::default();
        let merged = base.merge(Some(&CallOptions::new().with_retry_codes([Code::Unavailable])));
        let retry = merged.retry().unwrap();
        assert!(retry.retry_codes().contains(&Code::Unavailable));
        assert_eq!(retry.backoff_settings(), &BackoffSettings::default());
    }

    #[test]
    fn auto_paginate_only_narrows() {
        let base = CallSettings::default();
        assert!(base.auto_paginate());
        let merged = base.merge(Some(&CallOptions::new().with_auto_paginate(false)));
        assert!(!merged.auto_paginate());
        // Documented quirk: an override cannot force pagination back on.
        let merged = merged.merge(Some(&CallOptions::new().with_auto_paginate(true)));
        assert!(!merged.auto_paginate());
    }

    #[test]
    fn other_args_shallow_merge() {
        let base = CallSettings::default().with_other_args(
            OtherArgs::default()
                .with_header("x-client-info", HeaderValue::from_static("base"))
                .with_param("team", "alpha")
                .with_param("zone", "z1"),
        );
        let overrides = CallOptions::new().with_other_args(
            OtherArgs::default()
                .with_header("x-client-info", HeaderValue::from_static("override"))
                .with_param("team", "beta"),
        );
        let merged = base.merge(Some(&overrides));
        let args = merged.other_args();
        assert_eq!(
            args.headers().get("x-client-info"),
            Some(&HeaderValue::from_static("override"))
        );
        assert_eq!(args.param("team"), Some(&serde_json::json!("beta")));
        assert_eq!(args.param("zone"), Some(&serde_json::json!("z1")));
    }

    #[test]
    fn max_retries_clears_total_timeout() {
        let base = retrying_settings();
        let merged = base.merge(Some(&CallOptions::new().with_max_retries(3)));
        let b = merged.retry().unwrap().backoff_settings();
        assert_eq!(b.max_retries(), Some(3));
        assert_eq!(b.total_timeout(), None);
    }

    #[test]
    fn merge_does_not_mutate_base() {
        let base = retrying_settings();
        let snapshot = base.clone();
        let _ = base.merge(Some(
            &CallOptions::new()
                .with_timeout(Duration::from_secs(1))
                .with_retry_disabled()
                .with_max_retries(5),
        ));
        assert_eq!(base, snapshot);
    }

    #[test]
    fn scalar_overrides() {
        let base = CallSettings::default();
        let overrides = CallOptions::new()
            .with_max_results(7)
            .with_bundling(true)
            .with_api_name("TestApi")
            .with_long_running(BackoffSettings::default())
            .with_retry_request_options(RetryRequestOptions::default().with_retries(5));
        let merged = base.merge(Some(&overrides));
        assert_eq!(merged.max_results(), Some(7));
        assert!(merged.is_bundling());
        assert_eq!(merged.api_name(), Some("TestApi"));
        assert!(merged.long_running().is_some());
        assert_eq!(merged.retry_request_options().unwrap().retries(), 5);
    }

    #[test]
    fn metadata_builder_hook() {
        let builder: MetadataBuilder = Arc::new(|base| {
            let mut headers = base.clone();
            headers.insert("x-dynamic", HeaderValue::from_static("yes"));
            headers
        });
        let args = OtherArgs::default()
            .with_header("x-static", HeaderValue::from_static("always"))
            .with_metadata_builder(builder);
        let metadata = args.build_metadata();
        assert_eq!(
            metadata.get("x-static"),
            Some(&HeaderValue::from_static("always"))
        );
        assert_eq!(
            metadata.get("x-dynamic"),
            Some(&HeaderValue::from_static("yes"))
        );
    }
}
