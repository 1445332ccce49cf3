use fnv::FnvHashMap;
use slab::Slab;
use smallvec::SmallVec;

use crate::error::Error;
use crate::ids::Weight;
use crate::queue::{ChildQueue, Key};
use crate::stream::{Node, INLINE_CHILDREN};
use crate::tracing::{debug, trace};
use crate::StreamId;

/// A fluent builder for [`PriorityTree`], mirroring the builder convention the codebase this
/// crate descends from uses for its own frame-collection types.
#[derive(Debug, Default, Clone)]
pub struct Builder {
    maximum_streams: Option<usize>,
}

impl Builder {
    pub fn new() -> Self {
        Builder::default()
    }

    /// Caps the number of non-root streams the tree will hold. Exceeding it yields
    /// [`Error::TooManyStreams`].
    pub fn maximum_streams(mut self, max: usize) -> Self {
        self.maximum_streams = Some(max);
        self
    }

    pub fn build(self) -> PriorityTree {
        PriorityTree::new(self.maximum_streams)
    }
}

/// An HTTP/2 priority tree (§3): the implicit root, a flat identifier index, and every
/// stream's place in the weighted-round-robin dependency hierarchy.
///
/// Not internally synchronized (§5) — a single owner drives it. See [`crate::sync::Shared`] for
/// an optional thread-safe wrapper.
#[derive(Debug)]
pub struct PriorityTree {
    nodes: Slab<Node>,
    index: FnvHashMap<StreamId, Key>,
    root: Key,
    maximum_streams: Option<usize>,
}

impl PriorityTree {
    /// Builds a fresh tree with just the implicit, blocked root (stream 0).
    pub fn new(maximum_streams: Option<usize>) -> Self {
        let mut nodes = Slab::new();
        let root = nodes.insert(Node::root());
        let mut index = FnvHashMap::default();
        index.insert(StreamId::ROOT, root);

        PriorityTree {
            nodes,
            index,
            root,
            maximum_streams,
        }
    }

    pub fn builder() -> Builder {
        Builder::new()
    }

    /// The number of streams in the tree, excluding the implicit root.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, stream_id: StreamId) -> bool {
        self.index.contains_key(&stream_id)
    }

    // ===== mutation API (§4.2) =====

    pub fn insert_stream(
        &mut self,
        stream_id: StreamId,
        depends_on: Option<StreamId>,
        weight: Option<Weight>,
        exclusive: bool,
    ) -> Result<(), Error> {
        let depends_on = depends_on.unwrap_or(StreamId::ROOT);
        let weight = weight.unwrap_or_default();

        if stream_id == depends_on {
            return Err(Error::PriorityLoop(stream_id));
        }

        if let Some(&existing_key) = self.index.get(&stream_id) {
            if !self.nodes[existing_key].is_placeholder {
                return Err(Error::DuplicateStream(stream_id));
            }
            trace!("promoting placeholder stream_id={stream_id}");
            return self.promote_placeholder(existing_key, depends_on, weight, exclusive);
        }

        let parent_key = self.resolve_or_create_parent(depends_on)?;
        self.check_capacity()?;

        let key = self.nodes.insert(Node::new(stream_id, weight, true));
        self.index.insert(stream_id, key);

        trace!(
            "insert_stream id={stream_id} depends_on={depends_on} weight={weight} exclusive={exclusive}"
        );

        if exclusive {
            self.add_child_exclusive(parent_key, key);
        } else {
            self.add_child_ordinary(parent_key, key);
        }

        Ok(())
    }

    pub fn remove_stream(&mut self, stream_id: StreamId) -> Result<(), Error> {
        if stream_id.is_root() {
            return Err(Error::PseudoStream);
        }
        let key = self.key_for(stream_id)?;
        let parent_key = self.nodes[key]
            .parent
            .expect("non-root node always has a parent");

        let children: SmallVec<[Key; INLINE_CHILDREN]> = std::mem::take(&mut self.nodes[key].children);
        self.nodes[key].child_queue = ChildQueue::new();

        for child_key in children {
            self.nodes[child_key].parent = None;
            self.add_child_ordinary(parent_key, child_key);
        }

        self.detach(key);
        self.index.remove(&stream_id);
        self.nodes.remove(key);

        debug!("removed stream_id={stream_id}, children promoted to parent");
        Ok(())
    }

    pub fn reprioritize(
        &mut self,
        stream_id: StreamId,
        depends_on: Option<StreamId>,
        weight: Option<Weight>,
        exclusive: bool,
    ) -> Result<(), Error> {
        if stream_id.is_root() {
            return Err(Error::PseudoStream);
        }
        let key = self.key_for(stream_id)?;
        let current_parent_key = self.nodes[key]
            .parent
            .expect("non-root node always has a parent");

        let depends_on = depends_on.unwrap_or(self.nodes[current_parent_key].stream_id);
        let weight = weight.unwrap_or(self.nodes[key].weight);

        if stream_id == depends_on {
            return Err(Error::PriorityLoop(stream_id));
        }

        let new_parent_key = self.resolve_or_create_parent(depends_on)?;

        // Cycle avoidance (§4.2, RFC 7540 §5.3.3): if the requested new parent is a descendant
        // of the node being reprioritized, move the new parent to this node's current position
        // first, which removes it from this node's subtree before the main move happens.
        if self.is_descendant(new_parent_key, key) {
            self.detach(new_parent_key);
            self.add_child_ordinary(current_parent_key, new_parent_key);
        }

        self.detach(key);
        self.nodes[key].weight = weight;

        if exclusive {
            self.add_child_exclusive(new_parent_key, key);
        } else {
            self.add_child_ordinary(new_parent_key, key);
        }

        trace!("reprioritize id={stream_id} depends_on={depends_on} weight={weight} exclusive={exclusive}");
        Ok(())
    }

    pub fn block(&mut self, stream_id: StreamId) -> Result<(), Error> {
        self.set_active(stream_id, false)
    }

    pub fn unblock(&mut self, stream_id: StreamId) -> Result<(), Error> {
        self.set_active(stream_id, true)
    }

    fn set_active(&mut self, stream_id: StreamId, active: bool) -> Result<(), Error> {
        if stream_id.is_root() {
            return Err(Error::PseudoStream);
        }
        let key = self.key_for(stream_id)?;
        self.nodes[key].active = active;
        Ok(())
    }

    // ===== descent driver (§4.3) =====

    /// Returns the next stream identifier to service, advancing every deficit counter along the
    /// chosen path. Raises [`Error::Deadlock`] if every stream is currently blocked.
    pub fn next(&mut self) -> Result<StreamId, Error> {
        self.schedule_one(self.root).ok_or(Error::Deadlock)
    }

    /// The weighted round-robin descent of §4.1, recursive in the tree's depth.
    ///
    /// `key`'s own node must not be active (the precondition of step 1): active nodes are
    /// returned directly by their parent and never descended into.
    fn schedule_one(&mut self, key: Key) -> Option<StreamId> {
        debug_assert!(!self.nodes[key].active);

        // Children probed and found to yield nothing this round; their deficits are restored
        // unchanged once either a winner is found or the whole level is exhausted, so a failed
        // probe costs no deficit (§4.1).
        let mut set_aside: SmallVec<[(u64, Key); INLINE_CHILDREN]> = SmallVec::new();

        loop {
            let (deficit, child_key) = match self.nodes[key].child_queue.pop() {
                Some(entry) => entry,
                None => {
                    self.restore(key, set_aside);
                    return None;
                }
            };

            let found = if self.nodes[child_key].active {
                Some(self.nodes[child_key].stream_id)
            } else {
                self.schedule_one(child_key)
            };

            match found {
                Some(stream_id) => {
                    let child_stream_id = self.nodes[child_key].stream_id;
                    let step = self.nodes[child_key].weight.step();
                    self.nodes[key]
                        .child_queue
                        .push(deficit + step, child_stream_id, child_key);
                    self.nodes[key].last_deficit = deficit;
                    self.restore(key, set_aside);

                    trace!(
                        "schedule node={} chose child={} at deficit={}",
                        self.nodes[key].stream_id,
                        child_stream_id,
                        deficit
                    );
                    return Some(stream_id);
                }
                None => set_aside.push((deficit, child_key)),
            }
        }
    }

    fn restore(&mut self, key: Key, set_aside: SmallVec<[(u64, Key); INLINE_CHILDREN]>) {
        for (deficit, child_key) in set_aside {
            let stream_id = self.nodes[child_key].stream_id;
            self.nodes[key].child_queue.push(deficit, stream_id, child_key);
        }
    }

    // ===== internal helpers =====

    fn key_for(&self, stream_id: StreamId) -> Result<Key, Error> {
        self.index
            .get(&stream_id)
            .copied()
            .ok_or(Error::MissingStream(stream_id))
    }

    fn check_capacity(&self) -> Result<(), Error> {
        if let Some(max) = self.maximum_streams {
            if self.len() >= max {
                return Err(Error::TooManyStreams);
            }
        }
        Ok(())
    }

    /// Looks up `depends_on`, implicitly materializing it as a blocked placeholder child of the
    /// root if it is not yet in the tree (§4.2's forward-reference handling).
    fn resolve_or_create_parent(&mut self, depends_on: StreamId) -> Result<Key, Error> {
        if let Some(&key) = self.index.get(&depends_on) {
            return Ok(key);
        }

        self.check_capacity()?;
        let key = self.nodes.insert(Node::placeholder(depends_on));
        self.index.insert(depends_on, key);
        self.add_child_ordinary(self.root, key);

        debug!("created placeholder parent stream_id={depends_on}");
        Ok(key)
    }

    fn promote_placeholder(
        &mut self,
        key: Key,
        depends_on: StreamId,
        weight: Weight,
        exclusive: bool,
    ) -> Result<(), Error> {
        let current_parent_key = self.nodes[key]
            .parent
            .expect("a placeholder is always attached to a parent");
        let parent_key = self.resolve_or_create_parent(depends_on)?;

        // Same cycle avoidance as `reprioritize` (§4.2, RFC 7540 §5.3.3): the stream being
        // promoted may already be an ancestor of its own requested `depends_on` (forward
        // references can point anywhere), so move the requested parent to this node's current
        // position before attaching, the same way `reprioritize` does.
        if self.is_descendant(parent_key, key) {
            self.detach(parent_key);
            self.add_child_ordinary(current_parent_key, parent_key);
        }

        self.detach(key);
        self.nodes[key].weight = weight;
        self.nodes[key].active = true;
        self.nodes[key].is_placeholder = false;

        if exclusive {
            self.add_child_exclusive(parent_key, key);
        } else {
            self.add_child_ordinary(parent_key, key);
        }

        Ok(())
    }

    /// Does walking `candidate`'s parent chain reach `ancestor`? i.e. is `candidate` a
    /// descendant of `ancestor`.
    fn is_descendant(&self, candidate: Key, ancestor: Key) -> bool {
        let mut cursor = self.nodes[candidate].parent;
        while let Some(key) = cursor {
            if key == ancestor {
                return true;
            }
            cursor = self.nodes[key].parent;
        }
        false
    }

    /// Removes `key` from its current parent's `children`/`child_queue` and clears its own
    /// parent link. Leaves `key`'s own children and queue untouched.
    fn detach(&mut self, key: Key) {
        if let Some(parent_key) = self.nodes[key].parent.take() {
            self.nodes[parent_key].children.retain(|&k| k != key);
            self.nodes[parent_key].child_queue.remove(key);
        }
    }

    /// Appends `child` to `parent`'s children, entering the scheduling queue at `parent`'s
    /// `last_deficit` (§4.1's "adding a child" rule).
    fn add_child_ordinary(&mut self, parent_key: Key, child_key: Key) {
        let deficit = self.nodes[parent_key].last_deficit;
        let stream_id = self.nodes[child_key].stream_id;

        self.nodes[parent_key].children.push(child_key);
        self.nodes[parent_key]
            .child_queue
            .push(deficit, stream_id, child_key);
        self.nodes[child_key].parent = Some(parent_key);
    }

    /// Makes `child` the sole direct child of `parent`, reparenting `parent`'s former children
    /// onto `child` through the ordinary path (§4.2's exclusive-insert semantics).
    fn add_child_exclusive(&mut self, parent_key: Key, child_key: Key) {
        let former_children: SmallVec<[Key; INLINE_CHILDREN]> =
            std::mem::take(&mut self.nodes[parent_key].children);
        self.nodes[parent_key].child_queue = ChildQueue::new();
        self.nodes[parent_key].last_deficit = 0;

        self.add_child_ordinary(parent_key, child_key);

        for former_key in former_children {
            self.nodes[former_key].parent = None;
            self.add_child_ordinary(child_key, former_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen, TestResult};

    fn id(n: u32) -> StreamId {
        StreamId::from(n)
    }

    #[test]
    fn fresh_tree_has_blocked_root_only() {
        let tree = PriorityTree::new(None);
        assert_eq!(tree.len(), 0);
        assert!(tree.is_empty());
        assert!(!tree.nodes[tree.root].active);
    }

    #[test]
    fn insert_default_attaches_under_root_at_weight_16() {
        let mut tree = PriorityTree::new(None);
        tree.insert_stream(id(1), None, None, false).unwrap();
        let key = tree.key_for(id(1)).unwrap();
        assert_eq!(tree.nodes[key].parent, Some(tree.root));
        assert_eq!(tree.nodes[key].weight.get(), 16);
        assert!(tree.nodes[key].active);
    }

    #[test]
    fn duplicate_explicit_insert_is_rejected() {
        let mut tree = PriorityTree::new(None);
        tree.insert_stream(id(1), None, None, false).unwrap();
        let err = tree.insert_stream(id(1), None, None, false).unwrap_err();
        assert_eq!(err, Error::DuplicateStream(id(1)));
    }

    #[test]
    fn self_dependency_is_rejected() {
        let mut tree = PriorityTree::new(None);
        let err = tree.insert_stream(id(1), Some(id(1)), None, false).unwrap_err();
        assert_eq!(err, Error::PriorityLoop(id(1)));
    }

    #[test]
    fn bad_weight_is_rejected() {
        assert!(Weight::new(0).is_err());
        assert!(Weight::new(257).is_err());
        assert!(Weight::new(1).is_ok());
        assert!(Weight::new(256).is_ok());
    }

    #[test]
    fn forward_reference_creates_blocked_placeholder() {
        let mut tree = PriorityTree::new(None);
        tree.insert_stream(id(3), Some(id(1)), None, false).unwrap();

        let placeholder_key = tree.key_for(id(1)).unwrap();
        assert!(tree.nodes[placeholder_key].is_placeholder);
        assert!(!tree.nodes[placeholder_key].active);
        assert_eq!(tree.nodes[placeholder_key].parent, Some(tree.root));
    }

    #[test]
    fn explicit_insert_promotes_placeholder_without_duplicate_error() {
        let mut tree = PriorityTree::new(None);
        tree.insert_stream(id(3), Some(id(1)), None, false).unwrap();
        tree.insert_stream(id(1), None, Some(Weight::new(32).unwrap()), false)
            .unwrap();

        let key = tree.key_for(id(1)).unwrap();
        assert!(!tree.nodes[key].is_placeholder);
        assert!(tree.nodes[key].active);
        assert_eq!(tree.nodes[key].weight.get(), 32);
    }

    #[test]
    fn promoting_a_placeholder_onto_its_own_child_avoids_a_cycle() {
        let mut tree = PriorityTree::new(None);
        // Forward reference: 3 depends on 1, which doesn't exist yet, so 1 is created as a
        // blocked placeholder with 3 as its only child.
        tree.insert_stream(id(3), Some(id(1)), None, false).unwrap();
        // Now explicitly insert 1 depending on 3 — its own child. Without cycle avoidance this
        // would leave 1 and 3 pointing at each other, unreachable from root.
        tree.insert_stream(id(1), Some(id(3)), None, false).unwrap();

        let one = tree.key_for(id(1)).unwrap();
        let three = tree.key_for(id(3)).unwrap();

        assert_eq!(tree.nodes[three].parent, Some(tree.root));
        assert_eq!(tree.nodes[one].parent, Some(three));
        assert!(tree.nodes[one].children.is_empty());
        assert!(!tree.is_descendant(three, one));
    }

    #[test]
    fn too_many_streams_rejected_past_cap() {
        let mut tree = PriorityTree::new(Some(2));
        tree.insert_stream(id(1), None, None, false).unwrap();
        tree.insert_stream(id(3), None, None, false).unwrap();
        let err = tree.insert_stream(id(5), None, None, false).unwrap_err();
        assert_eq!(err, Error::TooManyStreams);
    }

    #[test]
    fn remove_stream_promotes_children_to_grandparent() {
        let mut tree = PriorityTree::new(None);
        tree.insert_stream(id(1), None, None, false).unwrap();
        tree.insert_stream(id(3), Some(id(1)), None, false).unwrap();
        tree.remove_stream(id(1)).unwrap();

        let child_key = tree.key_for(id(3)).unwrap();
        assert_eq!(tree.nodes[child_key].parent, Some(tree.root));
        assert!(!tree.contains(id(1)));
    }

    #[test]
    fn remove_root_is_rejected() {
        let mut tree = PriorityTree::new(None);
        assert_eq!(tree.remove_stream(StreamId::ROOT).unwrap_err(), Error::PseudoStream);
    }

    #[test]
    fn exclusive_insert_adopts_former_siblings() {
        let mut tree = PriorityTree::new(None);
        tree.insert_stream(id(1), None, None, false).unwrap();
        tree.insert_stream(id(3), None, None, false).unwrap();
        tree.insert_stream(id(5), Some(StreamId::ROOT), None, true)
            .unwrap();

        let root = tree.root;
        assert_eq!(tree.nodes[root].children.as_slice(), &[tree.key_for(id(5)).unwrap()]);

        let five_key = tree.key_for(id(5)).unwrap();
        let mut children: Vec<StreamId> = tree.nodes[five_key]
            .children
            .iter()
            .map(|&k| tree.nodes[k].stream_id)
            .collect();
        children.sort();
        assert_eq!(children, vec![id(1), id(3)]);
        assert_eq!(tree.nodes[five_key].child_queue.len(), 2);
    }

    #[test]
    fn reprioritize_onto_own_descendant_avoids_cycle() {
        let mut tree = PriorityTree::new(None);
        tree.insert_stream(id(1), None, None, false).unwrap();
        tree.insert_stream(id(2), Some(id(1)), None, false).unwrap();
        tree.insert_stream(id(3), Some(id(2)), None, false).unwrap();

        // Make 1 depend on 3, one of its own descendants.
        tree.reprioritize(id(1), Some(id(3)), None, false).unwrap();

        let one = tree.key_for(id(1)).unwrap();
        let two = tree.key_for(id(2)).unwrap();
        let three = tree.key_for(id(3)).unwrap();

        // 3 took 1's old spot (root), 1 now hangs off 3. No cycle: walking up from 1 reaches root.
        assert_eq!(tree.nodes[three].parent, Some(tree.root));
        assert_eq!(tree.nodes[one].parent, Some(three));
        assert!(!tree.is_descendant(three, one));
        assert_eq!(tree.nodes[two].parent, Some(one));
    }

    #[test]
    fn deadlock_when_everything_blocked_then_resolves_on_unblock() {
        let mut tree = PriorityTree::new(None);
        tree.insert_stream(id(1), None, None, false).unwrap();
        tree.insert_stream(id(3), None, None, false).unwrap();
        tree.block(id(1)).unwrap();
        tree.block(id(3)).unwrap();

        assert_eq!(tree.next().unwrap_err(), Error::Deadlock);

        tree.unblock(id(3)).unwrap();
        assert_eq!(tree.next().unwrap(), id(3));
    }

    #[test]
    fn blocked_ancestor_still_services_its_active_subtree() {
        let mut tree = PriorityTree::new(None);
        tree.insert_stream(id(1), None, None, false).unwrap();
        tree.insert_stream(id(3), Some(id(1)), None, false).unwrap();
        tree.block(id(1)).unwrap();

        // 1 is blocked but still occupies root's rotation on behalf of its subtree: every turn
        // that would have gone to 1 goes to 3 instead.
        for _ in 0..5 {
            assert_eq!(tree.next().unwrap(), id(3));
        }
    }

    // ----- property test: invariant preservation under random mutation sequences (§8 P4) -----

    #[derive(Clone, Debug)]
    enum Op {
        Insert { id: u32, dep: u32, weight: u16, exclusive: bool },
        Remove { id: u32 },
        Reprioritize { id: u32, dep: u32, weight: u16, exclusive: bool },
        Block { id: u32 },
        Unblock { id: u32 },
    }

    impl Arbitrary for Op {
        fn arbitrary(g: &mut Gen) -> Self {
            let pool: [u32; 6] = [1, 2, 3, 4, 5, 6];
            let id = *g.choose(&pool).unwrap();
            let dep = *g.choose(&pool).unwrap();
            let weight = *g.choose(&[1u16, 16, 32, 100, 256]).unwrap();
            let exclusive = bool::arbitrary(g);
            match u8::arbitrary(g) % 5 {
                0 => Op::Insert { id, dep, weight, exclusive },
                1 => Op::Remove { id },
                2 => Op::Reprioritize { id, dep, weight, exclusive },
                3 => Op::Block { id },
                _ => Op::Unblock { id },
            }
        }
    }

    fn apply(tree: &mut PriorityTree, op: &Op) {
        match *op {
            Op::Insert { id: i, dep, weight, exclusive } => {
                let _ = tree.insert_stream(
                    self::id(i),
                    Some(self::id(dep)),
                    Weight::new(weight).ok(),
                    exclusive,
                );
            }
            Op::Remove { id: i } => {
                let _ = tree.remove_stream(self::id(i));
            }
            Op::Reprioritize { id: i, dep, weight, exclusive } => {
                let _ = tree.reprioritize(
                    self::id(i),
                    Some(self::id(dep)),
                    Weight::new(weight).ok(),
                    exclusive,
                );
            }
            Op::Block { id: i } => {
                let _ = tree.block(self::id(i));
            }
            Op::Unblock { id: i } => {
                let _ = tree.unblock(self::id(i));
            }
        }
    }

    /// Walks every §3 invariant that is checkable from the internal structure.
    fn check_invariants(tree: &PriorityTree) -> Result<(), String> {
        // 1: exactly one root, blocked, parentless.
        if tree.nodes[tree.root].active {
            return Err("root is active".into());
        }
        if tree.nodes[tree.root].parent.is_some() {
            return Err("root has a parent".into());
        }

        for (key, node) in tree.nodes.iter() {
            // 7: index maps each present stream_id to exactly this node.
            match tree.index.get(&node.stream_id) {
                Some(&indexed_key) if indexed_key == key => {}
                _ => return Err(format!("index mismatch for {:?}", node.stream_id)),
            }

            // 5: weight bounds.
            if !(1..=256).contains(&node.weight.get()) {
                return Err(format!("weight out of range for {:?}", node.stream_id));
            }

            // 3: child_queue has exactly one entry per child.
            if node.child_queue.len() != node.children.len() {
                return Err(format!(
                    "child_queue/children length mismatch for {:?}",
                    node.stream_id
                ));
            }

            // 2: every child points back to this node as parent.
            for &child_key in node.children.iter() {
                if tree.nodes[child_key].parent != Some(key) {
                    return Err(format!("child of {:?} has wrong parent link", node.stream_id));
                }
            }

            // 4: no cycles — following parent from any node reaches the root in finite steps.
            let mut cursor = node.parent;
            let mut steps = 0;
            while let Some(k) = cursor {
                steps += 1;
                if steps > tree.nodes.len() + 1 {
                    return Err(format!("cycle detected from {:?}", node.stream_id));
                }
                cursor = tree.nodes[k].parent;
            }
        }

        // 6: cap respected.
        if let Some(max) = tree.maximum_streams {
            if tree.len() > max {
                return Err("maximum_streams exceeded".into());
            }
        }

        Ok(())
    }

    #[test]
    fn invariants_hold_over_random_mutation_sequences() {
        fn prop(ops: Vec<Op>) -> TestResult {
            let mut tree = PriorityTree::new(Some(8));
            for op in &ops {
                apply(&mut tree, op);
                if let Err(msg) = check_invariants(&tree) {
                    return TestResult::error(msg);
                }
            }
            TestResult::passed()
        }
        quickcheck::QuickCheck::new()
            .tests(500)
            .quickcheck(prop as fn(Vec<Op>) -> TestResult);
    }
}
