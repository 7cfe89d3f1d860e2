//! Lock-free double-ended queue over a two-anchor CAS scheme (§4.6).
//!
//! Both ends are backed by an [`crate::elimination::EliminationArray`] so
//! that a push racing a pop at the same end can short-circuit the central
//! chain entirely instead of contending on the anchor CAS.

mod anchor;
mod engine;

pub use engine::{Deque, DequeConfig};
