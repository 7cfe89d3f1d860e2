//! Harris-Michael ordered list (§4.4).
//!
//! A singly-linked list kept sorted by a caller-supplied total order, with
//! lock-free `find`/`insert`/`remove` and wait-free `contains` for readers.
//! [`crate::hashset`] layers bucketing on top of the same engine rather
//! than reimplementing it; [`OrderedSet`] is the direct, standalone
//! facade for callers who just want a sorted concurrent set.

mod engine;
mod set;

pub(crate) use engine::{Node, OrderedList};
pub use set::OrderedSet;
