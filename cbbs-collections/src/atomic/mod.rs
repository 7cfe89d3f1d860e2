//! Markable atomic references (§4.1).
//!
//! A [`Markable`] is a single atomic cell holding a pointer together with a
//! one-bit mark. It is the building block every other module in this crate
//! rests on: the ordered list's `next` fields, the hash set's bucket
//! directory slots, and the deque's node links are all markable references.
//!
//! The mark bit is carried in the low bit of the pointer tag that
//! `crossbeam-epoch` already reserves for this purpose, so no extra
//! indirection is needed over a plain `Atomic<T>`.

mod markable;

pub use markable::Markable;
