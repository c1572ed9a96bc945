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

//! Error types for the call-execution engine.
//!
//! Applications see a single [Error] type regardless of where in the call
//! lifecycle the problem appeared: resolving the remote call function,
//! sending an attempt, exhausting the retry budget, or a cancellation
//! requested by the application itself. The constructors are intended for
//! the engine and for transport adapters; applications typically only use
//! the query functions.

pub mod rpc;

use rpc::{Code, Status};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The message attached to errors that were seen by a retry-capable call but
/// whose status code was not in the configured set of transient codes.
const NON_TRANSIENT_MSG: &str = "the error was not classified as transient and will not be retried";

/// The error type for all calls executed by this crate.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Option<BoxError>,
}

impl Error {
    /// An error reported by the service.
    pub fn service(status: Status) -> Self {
        Self {
            kind: ErrorKind::Service(status),
            source: None,
        }
    }

    /// A problem in the call configuration, detected before any attempt was
    /// made. Maps to [Code::InvalidArgument].
    pub fn invalid_argument<T: Into<String>>(message: T) -> Self {
        Self {
            kind: ErrorKind::InvalidConfiguration(message.into()),
            source: None,
        }
    }

    /// The retry budget (total time or attempt count) is exhausted. Maps to
    /// [Code::DeadlineExceeded]; synthesized locally, never by the service.
    pub fn exhausted<T: Into<String>>(message: T) -> Self {
        Self {
            kind: ErrorKind::Exhausted(message.into()),
            source: None,
        }
    }

    /// The call was cancelled by the application and no in-flight attempt
    /// could deliver a more specific result.
    pub fn cancelled() -> Self {
        Self {
            kind: ErrorKind::Cancelled,
            source: None,
        }
    }

    /// Marks `error` as seen during a retry-capable call but not classified
    /// as transient. The original error remains available via
    /// [source][std::error::Error::source] and keeps its status code.
    pub fn non_transient(error: Error) -> Self {
        Self {
            kind: ErrorKind::NonTransient(error.status_code()),
            source: Some(Box::new(error)),
        }
    }

    /// The (possibly asynchronous) raw call function could not be resolved,
    /// e.g. because credential or stub setup failed.
    pub fn resolution<T: Into<BoxError>>(source: T) -> Self {
        Self {
            kind: ErrorKind::Resolution,
            source: Some(source.into()),
        }
    }

    /// A single attempt exceeded its deadline.
    pub fn timeout<T: Into<BoxError>>(source: T) -> Self {
        Self {
            kind: ErrorKind::Timeout,
            source: Some(source.into()),
        }
    }

    /// The transport reported an error before a service response arrived.
    pub fn io<T: Into<BoxError>>(source: T) -> Self {
        Self {
            kind: ErrorKind::Io,
            source: Some(source.into()),
        }
    }

    /// A response payload could not be deserialized.
    pub fn deser<T: Into<BoxError>>(source: T) -> Self {
        Self {
            kind: ErrorKind::Deser,
            source: Some(source.into()),
        }
    }

    /// An error that does not fit any of the other categories.
    pub fn other<T: Into<BoxError>>(source: T) -> Self {
        Self {
            kind: ErrorKind::Other,
            source: Some(source.into()),
        }
    }

    /// The status code associated with this error, if any.
    ///
    /// Service errors report the service's code; locally synthesized errors
    /// report the code they were synthesized with.
    pub fn status_code(&self) -> Option<Code> {
        match &self.kind {
            ErrorKind::Service(status) => Some(status.code),
            ErrorKind::InvalidConfiguration(_) => Some(Code::InvalidArgument),
            ErrorKind::Exhausted(_) => Some(Code::DeadlineExceeded),
            ErrorKind::Cancelled => Some(Code::Cancelled),
            ErrorKind::NonTransient(code) => *code,
            _ => None,
        }
    }

    /// The full status payload, for errors reported by the service.
    pub fn status(&self) -> Option<&Status> {
        match &self.kind {
            ErrorKind::Service(status) => Some(status),
            _ => None,
        }
    }

    /// True for errors synthesized when the application cancels a call.
    pub fn is_cancelled(&self) -> bool {
        matches!(&self.kind, ErrorKind::Cancelled)
    }

    /// True when the retry budget was exhausted before any response.
    pub fn is_exhausted(&self) -> bool {
        matches!(&self.kind, ErrorKind::Exhausted(_))
    }

    /// True for errors annotated by the retry loop as non-transient.
    pub fn is_non_transient(&self) -> bool {
        matches!(&self.kind, ErrorKind::NonTransient(_))
    }

    /// True when a single attempt ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(&self.kind, ErrorKind::Timeout)
    }

    /// True when the raw call function could not be resolved.
    pub fn is_resolution(&self) -> bool {
        matches!(&self.kind, ErrorKind::Resolution)
    }

    /// True for transport errors.
    pub fn is_io(&self) -> bool {
        matches!(&self.kind, ErrorKind::Io)
    }
}

#[derive(Debug)]
enum ErrorKind {
    Service(Status),
    InvalidConfiguration(String),
    Exhausted(String),
    Cancelled,
    NonTransient(Option<Code>),
    Resolution,
    Timeout,
    Io,
    Deser,
    Other,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ErrorKind::Service(status) => {
                write!(f, "the service reported an error: {status}")
            }
            // Budget and configuration messages are stable strings that
            // applications may match on. Print them verbatim.
            ErrorKind::InvalidConfiguration(msg) => f.write_str(msg),
            ErrorKind::Exhausted(msg) => f.write_str(msg),
            ErrorKind::Cancelled => f.write_str("the operation was cancelled"),
            ErrorKind::NonTransient(_) => f.write_str(NON_TRANSIENT_MSG),
            ErrorKind::Resolution => f.write_str("cannot resolve the remote call function"),
            ErrorKind::Timeout => f.write_str("the attempt exceeded its deadline"),
            ErrorKind::Io => f.write_str("the transport reported an error"),
            ErrorKind::Deser => f.write_str("cannot deserialize the response payload"),
            ErrorKind::Other => f.write_str("unexpected error in call execution"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}
