//! Error types returned throughout the driver.
use bson::{DecoderError, EncoderError, oid};

use std::error;
use std::fmt;
use std::io;
use std::sync::PoisonError;

/// A server-reported command failure (`{ok: 0, errmsg, code}`).
#[derive(Debug, Clone, PartialEq)]
pub struct CommandException {
    /// The server error code.
    pub code: i32,
    /// The server error message.
    pub message: String,
    /// The id of the connection the command was executed on, when reported.
    pub connection_id: Option<i32>,
}

impl CommandException {
    pub fn new(code: i32, message: String, connection_id: Option<i32>) -> CommandException {
        CommandException {
            code: code,
            message: message,
            connection_id: connection_id,
        }
    }
}

impl fmt::Display for CommandException {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "command failed with code {}: {}", self.code, self.message)
    }
}

/// A write failure reported by `getLastError` in legacy safe mode.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteException {
    /// The server error code.
    pub code: i32,
    /// The non-empty `err` string from the reply.
    pub message: String,
    /// The number of documents affected before the failure.
    pub n: i32,
    /// The id of the connection the write was executed on, when reported.
    pub connection_id: Option<i32>,
}

impl fmt::Display for WriteException {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "write failed with code {}: {}", self.code, self.message)
    }
}

/// The error type for all driver operations.
#[derive(Debug)]
pub enum Error {
    /// An invalid argument or a violated usage contract.
    ArgumentError(String),
    /// A malformed connection string.
    ParseError(String),
    /// An authentication handshake failure.
    AuthenticationError(String),
    /// A malformed, mismatched, or otherwise unexpected server reply.
    /// Errors of this kind taint the connection they occurred on.
    ResponseError(String),
    /// A getMore was issued for a cursor the server no longer knows.
    CursorNotFoundError,
    /// A failed driver-side operation that never reached the server.
    OperationError(String),
    /// The server rejected a command.
    CommandError(CommandException),
    /// The server rejected a legacy write.
    WriteError(WriteException),
    /// An I/O failure on the underlying stream.
    IoError(io::Error),
    /// A BSON document could not be serialized.
    EncoderError(EncoderError),
    /// A BSON document could not be deserialized.
    DecoderError(DecoderError),
    /// An ObjectId could not be generated.
    OIDError(oid::Error),
    /// An internal lock was poisoned by a panicking thread.
    PoisonLockError,
    /// Any error not part of a more specific kind.
    DefaultError(String),
}

/// The result type for all driver operations.
pub type Result<T> = ::std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::ArgumentError(ref s) => write!(fmt, "invalid argument: {}", s),
            Error::ParseError(ref s) => write!(fmt, "invalid connection string: {}", s),
            Error::AuthenticationError(ref s) => write!(fmt, "authentication failed: {}", s),
            Error::ResponseError(ref s) => write!(fmt, "invalid server response: {}", s),
            Error::CursorNotFoundError => write!(fmt, "the server cursor no longer exists"),
            Error::OperationError(ref s) => write!(fmt, "operation failed: {}", s),
            Error::CommandError(ref e) => e.fmt(fmt),
            Error::WriteError(ref e) => e.fmt(fmt),
            Error::IoError(ref e) => e.fmt(fmt),
            Error::EncoderError(ref e) => e.fmt(fmt),
            Error::DecoderError(ref e) => e.fmt(fmt),
            Error::OIDError(ref e) => e.fmt(fmt),
            Error::PoisonLockError => write!(fmt, "an internal lock was poisoned"),
            Error::DefaultError(ref s) => fmt.write_str(s),
        }
    }
}

impl error::Error for Error {
    fn cause(&self) -> Option<&error::Error> {
        match *self {
            Error::IoError(ref e) => Some(e),
            Error::EncoderError(ref e) => Some(e),
            Error::DecoderError(ref e) => Some(e),
            Error::OIDError(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<EncoderError> for Error {
    fn from(err: EncoderError) -> Error {
        Error::EncoderError(err)
    }
}

impl From<DecoderError> for Error {
    fn from(err: DecoderError) -> Error {
        Error::DecoderError(err)
    }
}

impl From<oid::Error> for Error {
    fn from(err: oid::Error) -> Error {
        Error::OIDError(err)
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_: PoisonError<T>) -> Error {
        Error::PoisonLockError
    }
}
