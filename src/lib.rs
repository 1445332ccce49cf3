//! An HTTP/2 stream priority tree (RFC 7540 §5.3): a dependency-tree scheduler that, given a set
//! of streams with parent/child relationships and relative weights, produces an infinite,
//! deterministic, weight-proportional sequence of stream identifiers to service next.
//!
//! This crate is the scheduling core only. Feeding it stream events (from `PRIORITY` and
//! `HEADERS` frames) is the job of an HTTP/2 framing layer; this crate does no I/O and knows
//! nothing about the wire.
//!
//! ```
//! use h2_priority::{PriorityTree, StreamId};
//!
//! let mut tree = PriorityTree::new(None);
//! tree.insert_stream(StreamId::from(1), None, None, false).unwrap();
//! tree.insert_stream(StreamId::from(3), None, None, false).unwrap();
//!
//! assert_eq!(tree.next().unwrap(), StreamId::from(1));
//! assert_eq!(tree.next().unwrap(), StreamId::from(3));
//! ```

mod tracing;

mod error;
mod ids;
mod queue;
mod stream;
mod tree;

pub mod sync;

pub use error::Error;
pub use ids::{Weight, DEFAULT_WEIGHT};
pub use tree::{Builder, PriorityTree};

pub use ids::StreamId;
