use crate::mcas::McasCell;
use std::marker::PhantomData;

/// Low bit (after MCAS's own descriptor tag) distinguishing a thread
/// (in-order predecessor/successor link, no real subtree there) from a
/// real child pointer.
const THREAD_BIT: u64 = 0b10;

/// A node in the threaded BST. `left`/`right` are [`McasCell`]s holding an
/// encoded pointer + thread bit; `value` holds an encoded pointer to a
/// leaked [`ValueSlot`], or `0` once the node enters `BEING_DELETED`
/// (§4.7 "State machine per node").
///
/// Nodes and values are leaked on construction and never freed, the same
/// choice made for MCAS descriptors (see [`crate::mcas`]): correctness
/// under concurrent helping is simpler without a reclamation scheme for
/// structures this deeply threaded together, at the cost of bounded
/// memory growth.
pub(crate) struct BstNode<K, V> {
    pub(crate) key: K,
    pub(crate) value: McasCell,
    pub(crate) left: McasCell,
    pub(crate) right: McasCell,
    _marker: PhantomData<V>,
}

/// Force an alignment of at least 8 bytes on the boxed value regardless of
/// `V`'s own alignment, so the low bits [`McasCell`] and the child-pointer
/// encoding reserve are always free.
#[repr(align(8))]
struct ValueSlot<V>(V);

impl<K, V> BstNode<K, V> {
    /// Builds a brand-new, unpublished node. Safe to initialise its
    /// `McasCell`s with plain (non-CAS) construction: nothing else can see
    /// this allocation until the caller links it in via an `mcas` call.
    pub(crate) fn leaf(key: K, value: V, left_word: u64, right_word: u64) -> *const Self {
        let node = Box::new(Self {
            key,
            value: McasCell::new(leak_value(value)),
            left: McasCell::new(left_word),
            right: McasCell::new(right_word),
            _marker: PhantomData,
        });
        Box::into_raw(node)
    }
}

/// Leaks `value` behind a `ValueSlot<V>` allocation and returns the encoded
/// word [`value_ref`] expects. Every live value word must be produced here
/// (never by boxing `V` directly) so the two sides of the encoding agree on
/// layout and alignment.
pub(crate) fn leak_value<V>(value: V) -> u64 {
    let slot = Box::into_raw(Box::new(ValueSlot(value)));
    slot as u64
}

/// Dereferences a non-zero value word produced by [`leak_value`].
/// `word == 0` (no live value) must be checked by the caller first.
pub(crate) unsafe fn value_ref<'a, V>(word: u64) -> &'a V {
    unsafe { &*(word as *const ValueSlot<V>) }.deref_slot()
}

impl<V> ValueSlot<V> {
    fn deref_slot(&self) -> &V {
        &self.0
    }
}

pub(crate) fn encode_child<K, V>(ptr: *const BstNode<K, V>, is_thread: bool) -> u64 {
    (ptr as u64) | if is_thread { THREAD_BIT } else { 0 }
}

pub(crate) fn decode_child<K, V>(word: u64) -> (*const BstNode<K, V>, bool) {
    (
        (word & !THREAD_BIT) as *const BstNode<K, V>,
        word & THREAD_BIT != 0,
    )
}
