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

//! Per-method call-shape descriptors.
//!
//! Generated clients attach exactly one [Descriptor] to each method. The
//! descriptor is fixed at client construction time and decides which call
//! strategy wraps the raw function: plain unary, paginated, server- or
//! client- or bidi-streaming, or long-running.

use crate::backoff::BackoffSettings;

/// The call shape of one method.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Descriptor {
    /// A unary request/response method.
    Normal,
    /// A list method returning one page per invocation.
    Page(PageDescriptor),
    /// A method whose response is an operation polled to completion.
    LongRunning(LongRunningDescriptor),
    /// A streaming method.
    Streaming(StreamingDescriptor),
}

impl Descriptor {
    pub fn is_streaming(&self) -> bool {
        matches!(self, Descriptor::Streaming(_))
    }
}

impl std::default::Default for Descriptor {
    fn default() -> Self {
        Descriptor::Normal
    }
}

/// Field names connecting a list request to its paged response.
///
/// The typed page mechanics go through the
/// [PageableResponse][crate::paginator::PageableResponse] trait; the field
/// names recorded here identify the method's paging contract in diagnostics
/// and logs.
#[derive(Clone, Debug, PartialEq)]
pub struct PageDescriptor {
    request_page_token_field: &'static str,
    response_page_token_field: &'static str,
    resource_field: &'static str,
}

impl PageDescriptor {
    pub fn new(
        request_page_token_field: &'static str,
        response_page_token_field: &'static str,
        resource_field: &'static str,
    ) -> Self {
        Self {
            request_page_token_field,
            response_page_token_field,
            resource_field,
        }
    }

    pub fn request_page_token_field(&self) -> &'static str {
        self.request_page_token_field
    }

    pub fn response_page_token_field(&self) -> &'static str {
        self.response_page_token_field
    }

    pub fn resource_field(&self) -> &'static str {
        self.resource_field
    }
}

/// Polling configuration for a long-running method.
#[derive(Clone, Debug, PartialEq)]
pub struct LongRunningDescriptor {
    polling_backoff: BackoffSettings,
}

impl LongRunningDescriptor {
    pub fn new(polling_backoff: BackoffSettings) -> Self {
        Self { polling_backoff }
    }

    pub fn polling_backoff(&self) -> &BackoffSettings {
        &self.polling_backoff
    }
}

impl std::default::Default for LongRunningDescriptor {
    fn default() -> Self {
        Self {
            polling_backoff: BackoffSettings::default(),
        }
    }
}

/// The directionality of a streaming method.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamingDescriptor {
    kind: StreamingType,
}

impl StreamingDescriptor {
    pub fn new(kind: StreamingType) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> StreamingType {
        self.kind
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamingType {
    /// One request, a stream of responses.
    Server,
    /// A stream of requests, one response.
    Client,
    /// Streams in both directions.
    Bidi,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_normal() {
        assert_eq!(Descriptor::default(), Descriptor::Normal);
        assert!(!Descriptor::default().is_streaming());
    }

    #[test]
    fn streaming_predicate() {
        let d = Descriptor::Streaming(StreamingDescriptor::new(StreamingType::Bidi));
        assert!(d.is_streaming());
        assert!(!Descriptor::Page(page()).is_streaming());
    }

    #[test]
    fn page_fields() {
        let d = page();
        assert_eq!(d.request_page_token_field(), "pageToken");
        assert_eq!(d.response_page_token_field(), "nextPageToken");
        assert_eq!(d.resource_field(), "items");
    }

    fn page() -> PageDescriptor {
        PageDescriptor::new("pageToken", "nextPageToken", "items")
    }
}
