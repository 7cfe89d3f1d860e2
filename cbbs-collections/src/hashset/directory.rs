use super::entry::SplitEntry;
use crate::atomic::Markable;
use crate::list::Node;
use crossbeam::epoch::{Guard, Shared};
use once_cell::sync::OnceCell;
use std::sync::atomic::Ordering;

/// The bucket directory: a two-level array of markable references to
/// dummy nodes (§3 "Hash-set bucket directory"). Segments are allocated
/// lazily on first use via [`OnceCell`]; once allocated a segment is never
/// freed, and a dummy, once published, is never moved or replaced.
pub(crate) struct Directory<T> {
    segments: Vec<OnceCell<Box<[Markable<Node<SplitEntry<T>>>]>>>,
    segment_size: usize,
}

impl<T> Directory<T> {
    pub(crate) fn new(segment_count: usize, segment_size: usize) -> Self {
        let mut segments = Vec::with_capacity(segment_count);
        segments.resize_with(segment_count, OnceCell::new);
        Self {
            segments,
            segment_size,
        }
    }

    /// Total number of buckets this directory can ever address. Growth
    /// (`bucket_bits` increasing) stops once the live bucket count would
    /// exceed this, a fixed, documented bound of the two-level scheme.
    pub(crate) fn capacity(&self) -> u32 {
        (self.segments.len() * self.segment_size) as u32
    }

    fn slot(&self, bucket: u32) -> &Markable<Node<SplitEntry<T>>> {
        let bucket = bucket as usize;
        let seg_idx = bucket / self.segment_size;
        let offset = bucket % self.segment_size;
        let segment_size = self.segment_size;
        let segment = self.segments[seg_idx].get_or_init(|| {
            let mut slots = Vec::with_capacity(segment_size);
            slots.resize_with(segment_size, Markable::null);
            slots.into_boxed_slice()
        });
        &segment[offset]
    }

    pub(crate) fn load<'g>(
        &self,
        bucket: u32,
        guard: &'g Guard,
    ) -> Option<Shared<'g, Node<SplitEntry<T>>>> {
        let (ptr, _) = self.slot(bucket).load(Ordering::Acquire, guard);
        if ptr.is_null() {
            None
        } else {
            Some(ptr)
        }
    }

    /// Publishes `dummy` for `bucket` unless another thread already did.
    pub(crate) fn store(&self, bucket: u32, dummy: Shared<'_, Node<SplitEntry<T>>>, guard: &Guard) {
        let slot = self.slot(bucket);
        let _ = slot.compare_and_set(
            Shared::null(),
            false,
            dummy,
            false,
            Ordering::AcqRel,
            Ordering::Acquire,
            guard,
        );
    }
}
