//! Error handling for gRPC services.
//!
//! Every error surfaced to a client carries a stable [`ErrorCode`]. Failed calls carry it in the
//! [`CODE_METADATA_KEY`] metadata entry of the status. Calls that complete with a typed miss
//! (eg. a block that isn't committed yet) carry it in the response's `code` field.

use kestrel_pool_api::validation::InvalidTransactionError;
use kestrel_pool_api::AdmissionReason;
use kestrel_provider::ReadError;
use tonic::metadata::MetadataValue;
use tonic::{Code, Status};

/// Metadata key holding the [`ErrorCode`] of a failed call.
pub const CODE_METADATA_KEY: &str = "x-kestrel-code";

/// Stable error codes reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    Ok = 0,
    EmptyTransaction = 1,
    TransactionTooLarge = 2,
    MalformedTransaction = 3,
    InvalidRange = 4,
    Duplicate = 10,
    PoolFull = 11,
    BlockNotFound = 20,
    BlockPending = 21,
    DeadlineExceeded = 30,
    ReaderHalted = 40,
    Internal = 50,
}

impl ErrorCode {
    pub const fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        let code = match code {
            0 => Self::Ok,
            1 => Self::EmptyTransaction,
            2 => Self::TransactionTooLarge,
            3 => Self::MalformedTransaction,
            4 => Self::InvalidRange,
            10 => Self::Duplicate,
            11 => Self::PoolFull,
            20 => Self::BlockNotFound,
            21 => Self::BlockPending,
            30 => Self::DeadlineExceeded,
            40 => Self::ReaderHalted,
            50 => Self::Internal,
            _ => return None,
        };
        Some(code)
    }

    /// Reads the code attached to a status, if any.
    pub fn from_status(status: &Status) -> Option<Self> {
        let value = status.metadata().get(CODE_METADATA_KEY)?;
        value.to_str().ok()?.parse().ok().and_then(Self::from_code)
    }
}

impl From<AdmissionReason> for ErrorCode {
    fn from(reason: AdmissionReason) -> Self {
        match reason {
            AdmissionReason::Accepted => Self::Ok,
            AdmissionReason::Duplicate => Self::Duplicate,
            AdmissionReason::Full => Self::PoolFull,
        }
    }
}

/// Creates a status carrying `error_code` in its metadata.
pub fn status(code: Code, error_code: ErrorCode, message: impl Into<String>) -> Status {
    let mut status = Status::new(code, message);
    status.metadata_mut().insert(CODE_METADATA_KEY, MetadataValue::from(error_code.code()));
    status
}

pub fn deadline_exceeded(message: impl Into<String>) -> Status {
    status(Code::DeadlineExceeded, ErrorCode::DeadlineExceeded, message)
}

pub fn invalid_range(message: impl Into<String>) -> Status {
    status(Code::InvalidArgument, ErrorCode::InvalidRange, message)
}

pub fn internal(message: impl Into<String>) -> Status {
    status(Code::Internal, ErrorCode::Internal, message)
}

/// Converts an [`InvalidTransactionError`] to a [`tonic::Status`].
pub fn invalid_transaction(err: &InvalidTransactionError) -> Status {
    let code = match err {
        InvalidTransactionError::Empty => ErrorCode::EmptyTransaction,
        InvalidTransactionError::TooLarge { .. } => ErrorCode::TransactionTooLarge,
        InvalidTransactionError::Malformed { .. } => ErrorCode::MalformedTransaction,
    };
    status(Code::InvalidArgument, code, err.to_string())
}

/// Converts a [`ReadError`] to a [`tonic::Status`].
///
/// Block queries report misses as typed results, so this is mostly used for
/// [`ReadError::Halted`].
pub fn read_error(err: ReadError) -> Status {
    match err {
        ReadError::NotFound => status(Code::NotFound, ErrorCode::BlockNotFound, err.to_string()),
        ReadError::Pending { .. } => {
            status(Code::OutOfRange, ErrorCode::BlockPending, err.to_string())
        }
        ReadError::Halted { .. } => {
            status(Code::Unavailable, ErrorCode::ReaderHalted, err.to_string())
        }
    }
}

/// Extension trait to easily convert component results to gRPC results.
pub trait IntoGrpcResult<T> {
    /// Converts the result to a gRPC result.
    fn into_grpc_result(self) -> Result<T, Status>;
}

impl<T> IntoGrpcResult<T> for Result<T, ReadError> {
    fn into_grpc_result(self) -> Result<T, Status> {
        self.map_err(read_error)
    }
}

impl<T> IntoGrpcResult<T> for Result<T, tokio::task::JoinError> {
    fn into_grpc_result(self) -> Result<T, Status> {
        self.map_err(|e| internal(format!("read task failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(InvalidTransactionError::Empty, ErrorCode::EmptyTransaction)]
    #[case(InvalidTransactionError::TooLarge { size: 10, max: 5 }, ErrorCode::TransactionTooLarge)]
    #[case(InvalidTransactionError::malformed("no separator"), ErrorCode::MalformedTransaction)]
    fn invalid_transactions_are_invalid_arguments(
        #[case] err: InvalidTransactionError,
        #[case] expected: ErrorCode,
    ) {
        let status = invalid_transaction(&err);
        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(ErrorCode::from_status(&status), Some(expected));
    }

    #[test]
    fn halted_reader_is_unavailable() {
        let status = read_error(ReadError::Halted { reason: Arc::from("corrupted block 3") });
        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(ErrorCode::from_status(&status), Some(ErrorCode::ReaderHalted));
        assert!(status.message().contains("corrupted block 3"));
    }

    #[test]
    fn codes_are_stable() {
        for code in [0, 1, 2, 3, 4, 10, 11, 20, 21, 30, 40, 50] {
            assert_eq!(ErrorCode::from_code(code).map(ErrorCode::code), Some(code));
        }
        assert_eq!(ErrorCode::from_code(5), None);
    }

    #[test]
    fn status_without_code() {
        assert_eq!(ErrorCode::from_status(&Status::cancelled("gone")), None);
    }
}
