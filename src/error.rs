use std::fmt;

use crate::StreamId;

/// The distinguished failure kinds a [`crate::PriorityTree`] mutation or scheduling call can
/// surface.
///
/// Every variant is a leaf validation failure: there is never a wrapped source error, so this
/// type implements [`std::error::Error`] by hand rather than pulling in a derive-macro crate for
/// a handful of variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// `insert_stream` was called for a stream ID that is already present as an explicit
    /// (non-placeholder) stream.
    DuplicateStream(StreamId),

    /// An operation referenced a stream ID that is not in the tree.
    MissingStream(StreamId),

    /// Inserting this stream would exceed the tree's configured `maximum_streams`.
    TooManyStreams,

    /// A weight outside the valid `[1, 256]` range was supplied.
    BadWeight(u16),

    /// Stream 0 (the implicit root) cannot be removed, blocked, unblocked, or reprioritized.
    PseudoStream,

    /// A stream cannot be made to depend directly on itself.
    PriorityLoop(StreamId),

    /// `next()` was called while every stream in the tree is blocked.
    Deadlock,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DuplicateStream(id) => write!(f, "stream {id} is already in the tree"),
            Error::MissingStream(id) => write!(f, "stream {id} is not in the tree"),
            Error::TooManyStreams => write!(f, "maximum number of streams exceeded"),
            Error::BadWeight(w) => write!(f, "weight {w} is outside the valid range [1, 256]"),
            Error::PseudoStream => write!(f, "stream 0 cannot be the target of this operation"),
            Error::PriorityLoop(id) => write!(f, "stream {id} cannot depend on itself"),
            Error::Deadlock => write!(f, "no active stream: every stream in the tree is blocked"),
        }
    }
}

impl std::error::Error for Error {}
