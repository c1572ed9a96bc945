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

//! The status code and status payload reported by services and synthesized
//! locally by the call-execution engine.

/// The canonical RPC status codes.
///
/// Sometimes multiple error codes may apply. Services should return the most
/// specific error code that applies. For example, prefer `OutOfRange` over
/// `FailedPrecondition` if both codes apply.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum Code {
    /// Not an error; returned on success.
    #[default]
    Ok = 0,

    /// The operation was cancelled, typically by the caller.
    Cancelled = 1,

    /// Unknown error. Errors raised by APIs that do not return enough error
    /// information may be converted to this error.
    Unknown = 2,

    /// The client specified an invalid argument.
    ///
    /// Note that this differs from `FailedPrecondition`. `InvalidArgument`
    /// indicates arguments that are problematic regardless of the state of
    /// the system.
    InvalidArgument = 3,

    /// The deadline expired before the operation could complete.
    DeadlineExceeded = 4,

    /// Some requested entity (e.g., file or directory) was not found.
    NotFound = 5,

    /// The entity that a client attempted to create already exists.
    AlreadyExists = 6,

    /// The caller does not have permission to execute the specified
    /// operation.
    PermissionDenied = 7,

    /// Some resource has been exhausted, perhaps a per-user quota, or
    /// perhaps the entire file system is out of space.
    ResourceExhausted = 8,

    /// The operation was rejected because the system is not in a state
    /// required for the operation's execution.
    FailedPrecondition = 9,

    /// The operation was aborted, typically due to a concurrency issue such
    /// as a sequencer check failure or transaction abort.
    Aborted = 10,

    /// The operation was attempted past the valid range.
    OutOfRange = 11,

    /// The operation is not implemented or is not supported/enabled in this
    /// service.
    Unimplemented = 12,

    /// Internal errors. This means that some invariants expected by the
    /// underlying system have been broken.
    Internal = 13,

    /// The service is currently unavailable. This is most likely a
    /// transient condition, which can be corrected by retrying with a
    /// backoff.
    Unavailable = 14,

    /// Unrecoverable data loss or corruption.
    DataLoss = 15,

    /// The request does not have valid authentication credentials for the
    /// operation.
    Unauthenticated = 16,
}

impl Code {
    /// The `SCREAMING_SNAKE_CASE` name for this code.
    pub fn name(&self) -> &'static str {
        match self {
            Code::Ok => "OK",
            Code::Cancelled => "CANCELLED",
            Code::Unknown => "UNKNOWN",
            Code::InvalidArgument => "INVALID_ARGUMENT",
            Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Code::NotFound => "NOT_FOUND",
            Code::AlreadyExists => "ALREADY_EXISTS",
            Code::PermissionDenied => "PERMISSION_DENIED",
            Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Code::FailedPrecondition => "FAILED_PRECONDITION",
            Code::Aborted => "ABORTED",
            Code::OutOfRange => "OUT_OF_RANGE",
            Code::Unimplemented => "UNIMPLEMENTED",
            Code::Internal => "INTERNAL",
            Code::Unavailable => "UNAVAILABLE",
            Code::DataLoss => "DATA_LOSS",
            Code::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl From<i32> for Code {
    fn from(value: i32) -> Self {
        match value {
            0 => Code::Ok,
            1 => Code::Cancelled,
            2 => Code::Unknown,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => Code::Unknown,
        }
    }
}

/// The error type when converting a string to a [Code].
#[derive(Debug, thiserror::Error)]
#[error("unknown status code name {0}")]
pub struct UnknownCodeName(String);

impl TryFrom<&str> for Code {
    type Error = UnknownCodeName;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value {
            "OK" => Ok(Code::Ok),
            "CANCELLED" => Ok(Code::Cancelled),
            "UNKNOWN" => Ok(Code::Unknown),
            "INVALID_ARGUMENT" => Ok(Code::InvalidArgument),
            "DEADLINE_EXCEEDED" => Ok(Code::DeadlineExceeded),
            "NOT_FOUND" => Ok(Code::NotFound),
            "ALREADY_EXISTS" => Ok(Code::AlreadyExists),
            "PERMISSION_DENIED" => Ok(Code::PermissionDenied),
            "RESOURCE_EXHAUSTED" => Ok(Code::ResourceExhausted),
            "FAILED_PRECONDITION" => Ok(Code::FailedPrecondition),
            "ABORTED" => Ok(Code::Aborted),
            "OUT_OF_RANGE" => Ok(Code::OutOfRange),
            "UNIMPLEMENTED" => Ok(Code::Unimplemented),
            "INTERNAL" => Ok(Code::Internal),
            "UNAVAILABLE" => Ok(Code::Unavailable),
            "DATA_LOSS" => Ok(Code::DataLoss),
            "UNAUTHENTICATED" => Ok(Code::Unauthenticated),
            _ => Err(UnknownCodeName(value.to_string())),
        }
    }
}

impl serde::Serialize for Code {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i32(*self as i32)
    }
}

impl<'de> serde::Deserialize<'de> for Code {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = i32::deserialize(deserializer)?;
        Ok(Code::from(value))
    }
}

/// A status payload: the code, a developer-facing message, and any
/// additional details the service chose to include.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Status {
    /// The status code.
    pub code: Code,

    /// A developer-facing error message, which should be in English.
    pub message: String,

    /// A list of messages that carry the error details.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<serde_json::Value>,
}

impl Status {
    /// Sets the value of [code][Status::code].
    pub fn set_code<T: Into<Code>>(mut self, v: T) -> Self {
        self.code = v.into();
        self
    }

    /// Sets the value of [message][Status::message].
    pub fn set_message<T: Into<String>>(mut self, v: T) -> Self {
        self.message = v.into();
        self
    }

    /// Sets the value of [details][Status::details].
    pub fn set_details<T, V>(mut self, v: T) -> Self
    where
        T: IntoIterator<Item = V>,
        V: Into<serde_json::Value>,
    {
        self.details = v.into_iter().map(|v| v.into()).collect();
        self
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use test_case::test_case;

    #[test_case(Code::Ok, 0, "OK")]
    #[test_case(Code::Cancelled, 1, "CANCELLED")]
    #[test_case(Code::Unknown, 2, "UNKNOWN")]
    #[test_case(Code::InvalidArgument, 3, "INVALID_ARGUMENT")]
    #[test_case(Code::DeadlineExceeded, 4, "DEADLINE_EXCEEDED")]
    #[test_case(Code::NotFound, 5, "NOT_FOUND")]
    #[test_case(Code::AlreadyExists, 6, "ALREADY_EXISTS")]
    #[test_case(Code::PermissionDenied, 7, "PERMISSION_DENIED")]
    #[test_case(Code::ResourceExhausted, 8, "RESOURCE_EXHAUSTED")]
    #[test_case(Code::FailedPrecondition, 9, "FAILED_PRECONDITION")]
    #[test_case(Code::Aborted, 10, "ABORTED")]
    #[test_case(Code::OutOfRange, 11, "OUT_OF_RANGE")]
    #[test_case(Code::Unimplemented, 12, "UNIMPLEMENTED")]
    #[test_case(Code::Internal, 13, "INTERNAL")]
    #[test_case(Code::Unavailable, 14, "UNAVAILABLE")]
    #[test_case(Code::DataLoss, 15, "DATA_LOSS")]
    #[test_case(Code::Unauthenticated, 16, "UNAUTHENTICATED")]
    fn code_roundtrip(code: Code, number: i32, name: &str) -> Result<()> {
        assert_eq!(code as i32, number);
        assert_eq!(Code::from(number), code);
        assert_eq!(code.name(), name);
        assert_eq!(Code::try_from(name)?, code);
        assert_eq!(format!("{code}"), name);
        Ok(())
    }

    #[test]
    fn code_from_unexpected() {
        assert_eq!(Code::from(-7), Code::Unknown);
        assert_eq!(Code::from(1234), Code::Unknown);
        let err = Code::try_from("NOT_A_CODE").unwrap_err();
        assert!(err.to_string().contains("NOT_A_CODE"), "{err}");
    }

    #[test]
    fn code_serde_as_integer() -> Result<()> {
        let json = serde_json::to_value(Code::Unavailable)?;
        assert_eq!(json, serde_json::json!(14));
        let code = serde_json::from_value::<Code>(serde_json::json!(4))?;
        assert_eq!(code, Code::DeadlineExceeded);
        Ok(())
    }

    #[test]
    fn status_builder_and_serde() -> Result<()> {
        let status = Status::default()
            .set_code(Code::NotFound)
            .set_message("resource missing")
            .set_details([serde_json::json!({"reason": "TEST"})]);
        assert_eq!(format!("{status}"), "NOT_FOUND: resource missing");

        let json = serde_json::to_value(&status)?;
        assert_eq!(
            json,
            serde_json::json!({
                "code": 5,
                "message": "resource missing",
                "details": [{"reason": "TEST"}],
            })
        );
        let trip = serde_json::from_value::<Status>(json)?;
        assert_eq!(trip, status);
        Ok(())
    }

    #[test]
    fn status_details_omitted_when_empty() -> Result<()> {
        let status = Status::default().set_code(Code::Aborted).set_message("m");
        let json = serde_json::to_value(&status)?;
        assert_eq!(json, serde_json::json!({"code": 10, "message": "m"}));
        Ok(())
    }
}
