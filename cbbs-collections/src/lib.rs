//! Lock-free concurrent data structures built on `crossbeam-epoch`.
//!
//! - **Ordered list / set**: Harris-Michael sorted singly-linked list.
//! - **Hash set**: split-ordered set layered over the ordered list.
//! - **Deque**: two-anchor CAS-based double-ended queue.
//! - **BST**: threaded binary search tree, structural changes applied via
//!   multi-word CAS.
//! - **Elimination array**: contention short-circuit shared by the deque's
//!   push/pop paths.
//! - **MCAS**: multi-word compare-and-swap built from conditional CAS,
//!   the BST's only mutation primitive.
//!
//! # Example
//!
//! ```
//! use cbbs_collections::list::OrderedSet;
//!
//! let set = OrderedSet::new();
//! assert!(set.insert(1));
//! assert!(set.contains(&1));
//! ```

pub mod atomic;
pub mod bst;
pub mod deque;
pub mod elimination;
pub mod hashset;
pub mod list;
pub mod mcas;
