use super::node::{decode_child, encode_child, leak_value, value_ref, BstNode};
use crate::mcas::{mcas, McasCell};
use std::cmp::Ordering as CmpOrdering;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Unbalanced threaded binary search tree (§4.7). Every structural
/// mutation, whether splicing in a new leaf or any of the four removal
/// shapes, is applied as a single [`mcas`] transaction, so a concurrent reader
/// following `find` through the tree always sees either the pre- or
/// post-state, never a partially-applied one.
pub struct Bst<K, V> {
    root: McasCell,
    len: AtomicUsize,
    _marker: PhantomData<fn() -> (K, V)>,
}

/// Where `key` was found (or would be spliced in) relative to the tree.
enum Splice<'a, K, V> {
    /// An existing node holds this exact key.
    Existing(&'a BstNode<K, V>),
    /// The tree has no nodes at all.
    Empty,
    /// `parent`'s `left` (if `is_left`) or `right` child slot is currently
    /// a thread with word `thread_word`; the new node splices in there.
    Leaf {
        parent: &'a BstNode<K, V>,
        is_left: bool,
        thread_word: u64,
    },
}

impl<K: Ord + Clone, V: Clone> Bst<K, V> {
    pub fn new() -> Self {
        Self {
            root: McasCell::new(encode_child::<K, V>(std::ptr::null(), false)),
            len: AtomicUsize::new(0),
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `find(k)`: wait-free-style read, helping any in-flight MCAS at each
    /// pointer step via [`McasCell::read`].
    pub fn find(&self, key: &K) -> Option<V> {
        let (mut ptr, _) = decode_child::<K, V>(self.root.read());
        loop {
            if ptr.is_null() {
                return None;
            }
            let node = unsafe { &*ptr };
            match key.cmp(&node.key) {
                CmpOrdering::Equal => {
                    let value_word = node.value.read();
                    if value_word == 0 {
                        return None;
                    }
                    return Some(unsafe { value_ref::<V>(value_word) }.clone());
                }
                CmpOrdering::Less => {
                    let (next, is_thread) = decode_child::<K, V>(node.left.read());
                    if is_thread {
                        return None;
                    }
                    ptr = next;
                }
                CmpOrdering::Greater => {
                    let (next, is_thread) = decode_child::<K, V>(node.right.read());
                    if is_thread {
                        return None;
                    }
                    ptr = next;
                }
            }
        }
    }

    fn locate(&self, key: &K) -> Splice<'_, K, V> {
        let (root_ptr, _) = decode_child::<K, V>(self.root.read());
        if root_ptr.is_null() {
            return Splice::Empty;
        }
        let mut ptr = root_ptr;
        loop {
            let node = unsafe { &*ptr };
            match key.cmp(&node.key) {
                CmpOrdering::Equal => return Splice::Existing(node),
                CmpOrdering::Less => {
                    let word = node.left.read();
                    let (next, is_thread) = decode_child::<K, V>(word);
                    if is_thread {
                        return Splice::Leaf {
                            parent: node,
                            is_left: true,
                            thread_word: word,
                        };
                    }
                    ptr = next;
                }
                CmpOrdering::Greater => {
                    let word = node.right.read();
                    let (next, is_thread) = decode_child::<K, V>(word);
                    if is_thread {
                        return Splice::Leaf {
                            parent: node,
                            is_left: false,
                            thread_word: word,
                        };
                    }
                    ptr = next;
                }
            }
        }
    }

    /// `update(k, v)`: CASes the value field of an existing node, or
    /// splices in a new leaf node threaded onto its in-order neighbours.
    pub fn update(&self, key: K, value: V) -> bool {
        loop {
            match self.locate(&key) {
                Splice::Existing(node) => {
                    let old_value = node.value.read();
                    if old_value == 0 {
                        // A concurrent remove is tearing this node down;
                        // retry as though the search never found it.
                        continue;
                    }
                    let new_value = leak_value(value.clone());
                    if mcas(vec![(&node.value, old_value, new_value)]) {
                        return true;
                    }
                }
                Splice::Empty => {
                    let left = encode_child::<K, V>(std::ptr::null(), true);
                    let right = encode_child::<K, V>(std::ptr::null(), true);
                    let leaf = BstNode::leaf(key.clone(), value.clone(), left, right);
                    let new_root = encode_child(leaf, false);
                    if mcas(vec![(&self.root, 0, new_root)]) {
                        self.len.fetch_add(1, Ordering::Relaxed);
                        return true;
                    }
                }
                Splice::Leaf {
                    parent,
                    is_left,
                    thread_word,
                } => {
                    let (neighbour_ptr, _) = decode_child::<K, V>(thread_word);

                    // The new node's own thread pointers: the side facing
                    // away from `parent` inherits parent's old thread (the
                    // further predecessor/successor is unchanged); the
                    // side facing `parent` threads straight to it, since
                    // `parent` becomes the new node's immediate in-order
                    // neighbour on that side.
                    let (left_word, right_word) = if is_left {
                        (thread_word, encode_child(parent as *const _, true))
                    } else {
                        (encode_child(parent as *const _, true), thread_word)
                    };
                    let leaf = BstNode::leaf(key.clone(), value.clone(), left_word, right_word);
                    let new_child = encode_child(leaf, false);
                    let parent_cell = if is_left { &parent.left } else { &parent.right };

                    let mut ops = vec![(parent_cell, thread_word, new_child)];

                    // The flanking neighbour's thread used to point at
                    // `parent`; it must now point at the new node, which
                    // sits between them in-order.
                    if !neighbour_ptr.is_null() {
                        let neighbour = unsafe { &*neighbour_ptr };
                        if is_left {
                            let word = neighbour.right.read();
                            ops.push((&neighbour.right, word, encode_child(leaf, true)));
                        } else {
                            let word = neighbour.left.read();
                            ops.push((&neighbour.left, word, encode_child(leaf, true)));
                        }
                    }

                    if mcas(ops) {
                        self.len.fetch_add(1, Ordering::Relaxed);
                        return true;
                    }
                }
            }
        }
    }

    /// `remove(k)`: four structural cases by whether each child is a
    /// thread or a real subtree (§4.7).
    pub fn remove(&self, key: &K) -> bool {
        loop {
            let Some((parent_cell, parent_word, is_left_of_parent, node)) =
                self.locate_for_removal(key)
            else {
                return false;
            };

            let value_word = node.value.read();
            let left_word = node.left.read();
            let right_word = node.right.read();
            let (left_ptr, left_is_thread) = decode_child::<K, V>(left_word);
            let (right_ptr, right_is_thread) = decode_child::<K, V>(right_word);

            let mut ops = vec![(&node.value, value_word, 0u64)];

            match (left_is_thread, right_is_thread) {
                (true, true) => {
                    let new_parent_word = match is_left_of_parent {
                        None => 0,
                        Some(true) => left_word,
                        Some(false) => right_word,
                    };
                    ops.push((parent_cell, parent_word, new_parent_word));
                    self.link_neighbours(&mut ops, left_ptr, right_ptr);
                }
                (true, false) => {
                    // Only a right subtree: splice it directly into the
                    // parent, then repair its leftmost node's predecessor
                    // thread (which pointed at `node`) to point at `node`'s
                    // own predecessor instead.
                    ops.push((parent_cell, parent_word, encode_child(right_ptr, false)));
                    let (leftmost_ptr, leftmost_word) = leftmost(right_ptr);
                    let leftmost_node = unsafe { &*leftmost_ptr };
                    ops.push((&leftmost_node.left, leftmost_word, encode_child(left_ptr, true)));
                }
                (false, true) => {
                    // Only a left subtree: mirror of the above.
                    ops.push((parent_cell, parent_word, encode_child(left_ptr, false)));
                    let (rightmost_ptr, rightmost_word) = rightmost(left_ptr);
                    let rightmost_node = unsafe { &*rightmost_ptr };
                    ops.push((&rightmost_node.right, rightmost_word, encode_child(right_ptr, true)));
                }
                (false, false) => {
                    // Two real children: the in-order successor (the
                    // leftmost node of the right subtree) takes `node`'s
                    // place.
                    let (successor, successor_left_word, successor_parent) =
                        leftmost_with_parent(right_ptr);
                    let successor_ref = unsafe { &*successor };

                    ops.push((parent_cell, parent_word, encode_child(successor, false)));
                    ops.push((
                        &successor_ref.left,
                        successor_left_word,
                        encode_child(left_ptr, false),
                    ));

                    if let Some(successor_parent) = successor_parent {
                        // The successor was deeper in the subtree: unlink
                        // it from its old spot, handing its old right side
                        // to its former parent, and give it `node`'s old
                        // right subtree outright.
                        let successor_parent_ref = unsafe { &*successor_parent };
                        let successor_right_word = successor_ref.right.read();
                        ops.push((
                            &successor_parent_ref.left,
                            encode_child(successor, false),
                            successor_right_word,
                        ));
                        ops.push((&successor_ref.right, successor_right_word, encode_child(right_ptr, false)));
                    }
                    // else: the successor already *is* `node`'s immediate
                    // right child, so it keeps its existing right side.

                    self.link_predecessor_only(&mut ops, left_ptr, successor);
                }
            }

            if mcas(ops) {
                self.len.fetch_sub(1, Ordering::Relaxed);
                return true;
            }
        }
    }

    /// Finds `key`, returning its parent's child-slot cell (or `self.root`
    /// for the root), the word currently installed there, whether `node`
    /// hangs off that parent's left side (`None` for the root), and the
    /// node itself.
    #[allow(clippy::type_complexity)]
    fn locate_for_removal(
        &self,
        key: &K,
    ) -> Option<(&McasCell, u64, Option<bool>, &BstNode<K, V>)> {
        let root_word = self.root.read();
        let (root_ptr, _) = decode_child::<K, V>(root_word);
        if root_ptr.is_null() {
            return None;
        }

        let mut parent_cell = &self.root;
        let mut parent_word = root_word;
        let mut is_left_of_parent = None;
        let mut ptr = root_ptr;

        loop {
            let node = unsafe { &*ptr };
            match key.cmp(&node.key) {
                CmpOrdering::Equal => {
                    return Some((parent_cell, parent_word, is_left_of_parent, node))
                }
                CmpOrdering::Less => {
                    let word = node.left.read();
                    let (next, is_thread) = decode_child::<K, V>(word);
                    if is_thread {
                        return None;
                    }
                    parent_cell = &node.left;
                    parent_word = word;
                    is_left_of_parent = Some(true);
                    ptr = next;
                }
                CmpOrdering::Greater => {
                    let word = node.right.read();
                    let (next, is_thread) = decode_child::<K, V>(word);
                    if is_thread {
                        return None;
                    }
                    parent_cell = &node.right;
                    parent_word = word;
                    is_left_of_parent = Some(false);
                    ptr = next;
                }
            }
        }
    }

    /// Leaf-removal case: both neighbours' threads must now point at each
    /// other instead of at the removed node.
    fn link_neighbours<'a>(
        &'a self,
        ops: &mut Vec<(&'a McasCell, u64, u64)>,
        predecessor: *const BstNode<K, V>,
        successor: *const BstNode<K, V>,
    ) {
        if !predecessor.is_null() {
            let predecessor_ref = unsafe { &*predecessor };
            let word = predecessor_ref.right.read();
            ops.push((&predecessor_ref.right, word, encode_child(successor, true)));
        }
        if !successor.is_null() {
            let successor_ref = unsafe { &*successor };
            let word = successor_ref.left.read();
            ops.push((&successor_ref.left, word, encode_child(predecessor, true)));
        }
    }

    /// Two-real-children case: only the predecessor's thread needs
    /// updating (to point at the promoted successor); the successor side
    /// is already handled by the successor's own promotion.
    fn link_predecessor_only<'a>(
        &'a self,
        ops: &mut Vec<(&'a McasCell, u64, u64)>,
        left_subtree: *const BstNode<K, V>,
        promoted: *const BstNode<K, V>,
    ) {
        let (predecessor, predecessor_word) = rightmost(left_subtree);
        let predecessor_ref = unsafe { &*predecessor };
        ops.push((
            &predecessor_ref.right,
            predecessor_word,
            encode_child(promoted, true),
        ));
    }
}

impl<K: Ord + Clone, V: Clone> Default for Bst<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Descends `ptr`'s left spine to the subtree's in-order-first node,
/// returning it along with its (thread) left word.
fn leftmost<K, V>(ptr: *const BstNode<K, V>) -> (*const BstNode<K, V>, u64) {
    let mut cur = ptr;
    loop {
        let node = unsafe { &*cur };
        let word = node.left.read();
        let (next, is_thread) = decode_child::<K, V>(word);
        if is_thread {
            return (cur, word);
        }
        cur = next;
    }
}

/// Same as [`leftmost`] but also reports the node's real parent within the
/// subtree, if any (`None` means `ptr` itself is the leftmost node).
fn leftmost_with_parent<K, V>(
    ptr: *const BstNode<K, V>,
) -> (*const BstNode<K, V>, u64, Option<*const BstNode<K, V>>) {
    let mut cur = ptr;
    let mut parent: Option<*const BstNode<K, V>> = None;
    loop {
        let node = unsafe { &*cur };
        let word = node.left.read();
        let (next, is_thread) = decode_child::<K, V>(word);
        if is_thread {
            return (cur, word, parent);
        }
        parent = Some(cur);
        cur = next;
    }
}

/// Mirror of [`leftmost`] along the right spine.
fn rightmost<K, V>(ptr: *const BstNode<K, V>) -> (*const BstNode<K, V>, u64) {
    let mut cur = ptr;
    loop {
        let node = unsafe { &*cur };
        let word = node.right.read();
        let (next, is_thread) = decode_child::<K, V>(word);
        if is_thread {
            return (cur, word);
        }
        cur = next;
    }
}

// SAFETY: every live reference reachable through `Bst<K, V>` is a leaked,
// immutable-address allocation; concurrent access to it is mediated
// entirely through `McasCell`'s own atomics.
unsafe impl<K: Send, V: Send> Send for Bst<K, V> {}
unsafe impl<K: Sync, V: Sync> Sync for Bst<K, V> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_find_round_trips() {
        let tree: Bst<i32, &str> = Bst::new();
        assert!(tree.update(5, "five"));
        assert!(tree.update(2, "two"));
        assert!(tree.update(8, "eight"));
        assert_eq!(tree.find(&5), Some("five"));
        assert_eq!(tree.find(&2), Some("two"));
        assert_eq!(tree.find(&8), Some("eight"));
        assert_eq!(tree.find(&99), None);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn update_overwrites_existing_value() {
        let tree: Bst<i32, i32> = Bst::new();
        assert!(tree.update(1, 10));
        assert!(tree.update(1, 20));
        assert_eq!(tree.find(&1), Some(20));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn remove_leaf_node() {
        let tree: Bst<i32, i32> = Bst::new();
        for k in [5, 2, 8, 1, 3] {
            tree.update(k, k * 10);
        }
        assert!(tree.remove(&1));
        assert_eq!(tree.find(&1), None);
        for k in [5, 2, 8, 3] {
            assert_eq!(tree.find(&k), Some(k * 10));
        }
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn remove_node_with_single_child() {
        let tree: Bst<i32, i32> = Bst::new();
        for k in [5, 2, 8, 1] {
            tree.update(k, k * 10);
        }
        assert!(tree.remove(&2));
        assert_eq!(tree.find(&2), None);
        assert_eq!(tree.find(&1), Some(10));
        assert_eq!(tree.find(&5), Some(50));
        assert_eq!(tree.find(&8), Some(80));
    }

    #[test]
    fn remove_node_with_two_children() {
        let tree: Bst<i32, i32> = Bst::new();
        for k in [5, 2, 8, 1, 3, 7, 9] {
            tree.update(k, k * 10);
        }
        assert!(tree.remove(&5));
        assert_eq!(tree.find(&5), None);
        for k in [2, 8, 1, 3, 7, 9] {
            assert_eq!(tree.find(&k), Some(k * 10));
        }
        assert_eq!(tree.len(), 6);
    }

    #[test]
    fn remove_root_of_single_node_tree_empties_it() {
        let tree: Bst<i32, i32> = Bst::new();
        tree.update(42, 1);
        assert!(tree.remove(&42));
        assert!(tree.is_empty());
        assert_eq!(tree.find(&42), None);
    }

    #[test]
    fn remove_nonexistent_key_returns_false() {
        let tree: Bst<i32, i32> = Bst::new();
        tree.update(1, 1);
        assert!(!tree.remove(&2));
    }

    #[test]
    fn in_order_neighbours_repair_after_many_removals() {
        let tree: Bst<i32, i32> = Bst::new();
        for k in 0..50 {
            tree.update(k, k);
        }
        for k in (0..50).step_by(2) {
            assert!(tree.remove(&k));
        }
        for k in 0..50 {
            let expected = if k % 2 == 0 { None } else { Some(k) };
            assert_eq!(tree.find(&k), expected);
        }
    }
}
