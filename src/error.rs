use std::fmt::{self, Debug, Display, Formatter};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use derive_more::Display;

/// A set of errors that can occur while decoding a form body.
///
/// Every error is terminal for the parse that produced it. Errors are cheap
/// to clone so the same value can be handed to every
/// [`Completion`](crate::Completion) waiter.
#[derive(Display, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The body violates the multipart framing: a delimiter mismatch, a
    /// broken header block or an unexpected end of stream.
    #[display(fmt = "malformed stream: {}, {} bytes parsed", reason, bytes_parsed)]
    MalformedStream { bytes_parsed: u64, reason: String },

    /// A part's `Content-Disposition` carries no `name` parameter.
    #[display(fmt = "part received without a field name, {} bytes parsed", bytes_parsed)]
    MissingFieldName { bytes_parsed: u64 },

    /// A text field exceeded its size limit.
    #[display(
        fmt = "field '{}' exceeded the maximum size limit: {} bytes, {} bytes parsed",
        field_name,
        limit,
        bytes_parsed
    )]
    FieldTooLarge {
        field_name: String,
        limit: u64,
        bytes_parsed: u64,
    },

    /// An uploaded file exceeded its size limit.
    #[display(
        fmt = "file field '{}' exceeded the maximum size limit: {} bytes, {} bytes parsed",
        field_name,
        limit,
        bytes_parsed
    )]
    FileTooLarge {
        field_name: String,
        limit: u64,
        bytes_parsed: u64,
    },

    /// The whole body exceeded its size limit.
    #[display(fmt = "stream size exceeded the maximum limit: {} bytes, {} bytes parsed", limit, bytes_parsed)]
    StreamSizeExceeded { limit: u64, bytes_parsed: u64 },

    /// Creating or writing an upload in the upload directory failed.
    #[display(fmt = "failed to write upload to {:?}: {}, {} bytes parsed", path, source, bytes_parsed)]
    StorageWriteFailed {
        path: PathBuf,
        source: Arc<io::Error>,
        bytes_parsed: u64,
    },

    /// `parse` was called while a parse is already running.
    #[display(fmt = "parse already started")]
    AlreadyStarted,

    /// The decoder already reached a terminal state.
    #[display(fmt = "parse already finished")]
    AlreadyFinished,

    /// The input stream failed or the parse was cancelled before the body
    /// was complete.
    #[display(fmt = "parse aborted: {}, {} bytes parsed", reason, bytes_parsed)]
    Aborted { reason: String, bytes_parsed: u64 },

    /// The `Content-Type` is neither `multipart/form-data` nor
    /// `application/x-www-form-urlencoded`.
    #[display(fmt = "Content-Type is not a form submission")]
    NoMultipart,

    /// Failed to convert the `Content-Type` to [`mime::Mime`] type.
    #[display(fmt = "Failed to convert Content-Type to `mime::Mime` type: {}", _0)]
    DecodeContentType(Arc<mime::FromStrError>),

    /// No boundary found in the `Content-Type` header, or it is empty.
    #[display(fmt = "multipart boundary not found in Content-Type")]
    NoBoundary,

    /// Failed to decode the text fields as `JSON` in
    /// [`FormData::json`](crate::FormData::json).
    #[cfg(feature = "json")]
    #[display(fmt = "failed to decode form fields as JSON: {}", _0)]
    DecodeJson(Arc<serde_json::Error>),
}

/// The category of an [`Error`], for hosts that map failures to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    MalformedStream,
    MissingFieldName,
    FieldTooLarge,
    FileTooLarge,
    StreamSizeExceeded,
    StorageWriteFailed,
    AlreadyStarted,
    AlreadyFinished,
    Aborted,
    NotForm,
    #[cfg(feature = "json")]
    DecodeJson,
}

impl Error {
    pub(crate) fn malformed<R: Into<String>>(bytes_parsed: u64, reason: R) -> Error {
        Error::MalformedStream {
            bytes_parsed,
            reason: reason.into(),
        }
    }

    pub(crate) fn storage(path: PathBuf, source: io::Error) -> Error {
        Error::StorageWriteFailed {
            path,
            source: Arc::new(source),
            bytes_parsed: 0,
        }
    }

    pub(crate) fn aborted<R: Into<String>>(reason: R) -> Error {
        Error::Aborted {
            reason: reason.into(),
            bytes_parsed: 0,
        }
    }

    /// Records how far the parse got. Errors that carry the exact offset of
    /// an offending byte keep it.
    pub(crate) fn at(mut self, offset: u64) -> Error {
        match self {
            Error::FieldTooLarge { ref mut bytes_parsed, .. }
            | Error::FileTooLarge { ref mut bytes_parsed, .. }
            | Error::StreamSizeExceeded { ref mut bytes_parsed, .. }
            | Error::StorageWriteFailed { ref mut bytes_parsed, .. }
            | Error::Aborted { ref mut bytes_parsed, .. } => *bytes_parsed = offset,
            _ => {}
        }
        self
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedStream { .. } => ErrorKind::MalformedStream,
            Error::MissingFieldName { .. } => ErrorKind::MissingFieldName,
            Error::FieldTooLarge { .. } => ErrorKind::FieldTooLarge,
            Error::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            Error::StreamSizeExceeded { .. } => ErrorKind::StreamSizeExceeded,
            Error::StorageWriteFailed { .. } => ErrorKind::StorageWriteFailed,
            Error::AlreadyStarted => ErrorKind::AlreadyStarted,
            Error::AlreadyFinished => ErrorKind::AlreadyFinished,
            Error::Aborted { .. } => ErrorKind::Aborted,
            Error::NoMultipart | Error::DecodeContentType(_) | Error::NoBoundary => ErrorKind::NotForm,
            #[cfg(feature = "json")]
            Error::DecodeJson(_) => ErrorKind::DecodeJson,
        }
    }

    /// Returns how many body bytes the decoder had accepted when the parse
    /// failed.
    ///
    /// Every error settled by a started parse carries it. For
    /// `MalformedStream` and `MissingFieldName` it is the exact offset where
    /// decoding gave up. Misuse and `Content-Type` errors raised before any
    /// byte is read return `None`.
    pub fn bytes_parsed(&self) -> Option<u64> {
        match self {
            Error::MalformedStream { bytes_parsed, .. }
            | Error::MissingFieldName { bytes_parsed }
            | Error::FieldTooLarge { bytes_parsed, .. }
            | Error::FileTooLarge { bytes_parsed, .. }
            | Error::StreamSizeExceeded { bytes_parsed, .. }
            | Error::StorageWriteFailed { bytes_parsed, .. }
            | Error::Aborted { bytes_parsed, .. } => Some(*bytes_parsed),
            _ => None,
        }
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::StorageWriteFailed { source, .. } => Some(&**source),
            _ => None,
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string().eq(&other.to_string())
    }
}

impl Eq for Error {}
