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

use crate::backoff::BackoffSettings;
use crate::error::rpc::Code;
use std::collections::BTreeSet;

/// Which errors to retry, and how.
///
/// An error is transient, and therefore retryable, when its status code is
/// a member of [retry_codes][RetryOptions::retry_codes]. An empty set
/// disables retries no matter what the backoff settings say.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RetryOptions {
    retry_codes: BTreeSet<Code>,
    backoff_settings: BackoffSettings,
}

impl RetryOptions {
    pub fn new<C>(retry_codes: C, backoff_settings: BackoffSettings) -> Self
    where
        C: IntoIterator<Item = Code>,
    {
        Self {
            retry_codes: retry_codes.into_iter().collect(),
            backoff_settings,
        }
    }

    /// The status codes classified as transient.
    pub fn retry_codes(&self) -> &BTreeSet<Code> {
        &self.retry_codes
    }

    /// The backoff parameters.
    pub fn backoff_settings(&self) -> &BackoffSettings {
        &self.backoff_settings
    }

    /// Retries happen only when at least one code is classified transient.
    pub fn is_enabled(&self) -> bool {
        !self.retry_codes.is_empty()
    }

    pub(crate) fn backoff_settings_mut(&mut self) -> &mut BackoffSettings {
        &mut self.backoff_settings
    }
}
