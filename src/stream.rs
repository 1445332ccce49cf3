use smallvec::SmallVec;

use crate::ids::{Weight, DEFAULT_WEIGHT};
use crate::queue::{ChildQueue, Key};
use crate::StreamId;

/// Most nodes in a real HTTP/2 priority tree have a handful of direct dependents; inline storage
/// for a few avoids a heap allocation per node in the common case.
pub(crate) const INLINE_CHILDREN: usize = 8;

/// Priority information for a single stream (§3).
#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) stream_id: StreamId,
    pub(crate) weight: Weight,
    pub(crate) active: bool,
    pub(crate) parent: Option<Key>,
    pub(crate) children: SmallVec<[Key; INLINE_CHILDREN]>,
    pub(crate) child_queue: ChildQueue,
    pub(crate) last_deficit: u64,

    /// Distinguishes a node that exists only because some other stream forward-referenced it as
    /// a dependency target from one that was explicitly inserted. Not part of the logical data
    /// model (§3 lists no such field) but required to implement the placeholder-promotion rule
    /// of §4.2/§9: promoting a placeholder is not a `DuplicateStreamError`.
    pub(crate) is_placeholder: bool,
}

impl Node {
    pub(crate) fn root() -> Self {
        Node {
            stream_id: StreamId::ROOT,
            weight: DEFAULT_WEIGHT,
            active: false,
            parent: None,
            children: SmallVec::new(),
            child_queue: ChildQueue::new(),
            last_deficit: 0,
            is_placeholder: false,
        }
    }

    pub(crate) fn new(stream_id: StreamId, weight: Weight, active: bool) -> Self {
        Node {
            stream_id,
            weight,
            active,
            parent: None,
            children: SmallVec::new(),
            child_queue: ChildQueue::new(),
            last_deficit: 0,
            is_placeholder: false,
        }
    }

    pub(crate) fn placeholder(stream_id: StreamId) -> Self {
        let mut node = Node::new(stream_id, DEFAULT_WEIGHT, false);
        node.is_placeholder = true;
        node
    }
}
