use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::StreamId;

/// Arena handle for a [`crate::stream::Node`]. A plain `usize` into the tree's `slab::Slab`.
pub(crate) type Key = usize;

/// One entry in a [`ChildQueue`]: a child's current deficit, its stream ID (the queue's tie
/// breaker), and the arena handle used to look the node back up.
///
/// Equality and ordering are both defined over `(deficit, stream_id)` only — `key` is just the
/// lookup handle, not part of an entry's logical identity, and since every child in a queue has
/// a distinct `stream_id` (invariant 7) the two never need to disagree in practice.
#[derive(Debug, Clone, Copy)]
struct Entry {
    deficit: u64,
    stream_id: StreamId,
    key: Key,
}

impl Eq for Entry {}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deficit == other.deficit && self.stream_id == other.stream_id
    }
}

// `BinaryHeap` is a max-heap; reversing the comparison turns it into the min-heap the scheduler
// needs (smallest deficit first, ties broken by the smallest stream ID).
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deficit
            .cmp(&self.deficit)
            .then_with(|| other.stream_id.cmp(&self.stream_id))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The weighted round-robin queue of a single node's direct children (§4.1).
///
/// Keyed by `(deficit, stream_id)` ascending; dequeuing always returns the smallest. Interior
/// removal (needed by `remove_stream`/`reprioritize` to detach a child) rebuilds the heap rather
/// than using decrease-key machinery, per the design notes: simple, correct, and `O(k)` in the
/// number of children, which in practice is small.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChildQueue {
    heap: BinaryHeap<Entry>,
}

impl ChildQueue {
    pub(crate) fn new() -> Self {
        ChildQueue {
            heap: BinaryHeap::new(),
        }
    }

    pub(crate) fn push(&mut self, deficit: u64, stream_id: StreamId, key: Key) {
        self.heap.push(Entry {
            deficit,
            stream_id,
            key,
        });
    }

    /// Removes and returns the smallest `(deficit, stream_id)` entry, if any.
    pub(crate) fn pop(&mut self) -> Option<(u64, Key)> {
        self.heap.pop().map(|entry| (entry.deficit, entry.key))
    }

    /// Removes every entry for `key`, preserving the deficits of everything else.
    ///
    /// A child only ever has one entry in its parent's queue, but rebuilding by filtering keeps
    /// the operation correct even if that ever stopped being true.
    pub(crate) fn remove(&mut self, key: Key) {
        let remaining: Vec<Entry> = self.heap.drain().filter(|e| e.key != key).collect();
        self.heap = remaining.into_iter().collect();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}
