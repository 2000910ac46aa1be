//! Error types for `EsmForge`

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::formats::common::RecName;

/// Where in an ESM stream a reader error was raised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorLocation {
    /// File name the reader was opened with.
    pub file: PathBuf,
    /// Tag of the record being read.
    pub record: RecName,
    /// Tag of the last subrecord read.
    pub subrecord: RecName,
    /// Absolute stream offset, if the stream could still report it.
    pub offset: Option<u64>,
}

impl fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  File: {}", self.file.display())?;
        writeln!(f, "  Record: {}", self.record)?;
        writeln!(f, "  Subrecord: {}", self.subrecord)?;
        match self.offset {
            Some(offset) => write!(f, "  Offset: 0x{offset:x}"),
            None => write!(f, "  Offset: [not available]"),
        }
    }
}

/// The error type for `EsmForge` operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    // ==================== IO Errors ====================
    /// IO error from stream operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ==================== Reader Errors ====================
    /// The byte layout of the stream is broken (bad sizes, missing tags, overruns).
    #[error("ESM error: {message}\n{location}")]
    Structural {
        /// What went wrong.
        message: String,
        /// Reader position when it went wrong.
        location: Box<ErrorLocation>,
    },

    /// The framing is intact but a payload value is unusable.
    #[error("ESM data error: {message}\n{location}")]
    Data {
        /// What went wrong.
        message: String,
        /// Reader position when it went wrong.
        location: Box<ErrorLocation>,
    },

    /// An operation needed an open stream but the reader has none.
    #[error("reader has no open stream")]
    ReaderNotOpen,

    // ==================== Pool Errors ====================
    /// The pooled reader for this index is already handed out.
    #[error("ESM reader at index {index} is busy")]
    ReaderBusy {
        /// Stable reader index.
        index: usize,
    },

    // ==================== Writer Errors ====================
    /// `end_record` named a different tag than the innermost open frame.
    #[error("record frame mismatch: open frame is {expected}, end requested for {found}")]
    FrameMismatch {
        /// Tag of the innermost open frame.
        expected: RecName,
        /// Tag passed to `end_record`.
        found: RecName,
    },

    /// `end_record` was called with no open frame.
    #[error("no open record frame to end for {0}")]
    NoOpenFrame(RecName),

    /// A frame was opened deeper than record > subrecord.
    #[error("cannot open {tag}: {open} frame(s) already open")]
    FrameDepthExceeded {
        /// Tag of the frame being opened.
        tag: RecName,
        /// Frames open at the time.
        open: usize,
    },

    /// The writer was closed with frames still open.
    #[error("unclosed record frame remaining: {0}")]
    UnclosedFrame(RecName),

    /// A frame grew beyond what its 32-bit size field can hold.
    #[error("frame {tag} is {size} bytes, too large for a 32-bit size field")]
    FrameTooLarge {
        /// Tag of the frame.
        tag: RecName,
        /// Accumulated size.
        size: u64,
    },

    /// A string does not fit its fixed-size field.
    #[error("fixed string data is too long: {len} > {max}")]
    StringTooLong {
        /// Encoded length.
        len: usize,
        /// Capacity of the field.
        max: usize,
    },

    // ==================== Value Errors ====================
    /// A generated `FormId` (negative content file) cannot be a `RefId`.
    #[error("RefId can't be a generated FormId: index {index:#x}, content file {content_file}")]
    GeneratedFormId {
        /// Index within the content file.
        index: u32,
        /// Content file number.
        content_file: i32,
    },

    /// Text that does not parse as a `RefId`.
    #[error("invalid RefId text: {0}")]
    InvalidRefIdText(String),

    /// A string that cannot be a four-character tag.
    #[error("invalid record tag: {0:?}")]
    InvalidTag(String),

    /// Unknown text encoding name.
    #[error("unknown text encoding: {0} (expected utf8, win1250, win1251 or win1252)")]
    UnknownEncoding(String),
}

impl Error {
    /// True for the structural class of reader errors.
    pub fn is_structural(&self) -> bool {
        matches!(self, Error::Structural { .. })
    }

    /// True for the data class of reader errors.
    pub fn is_data(&self) -> bool {
        matches!(self, Error::Data { .. })
    }

    /// Message of a reader error, without the location block.
    pub fn reader_message(&self) -> Option<&str> {
        match self {
            Error::Structural { message, .. } | Error::Data { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Result type alias for `EsmForge` operations.
pub type Result<T> = std::result::Result<T, Error>;
