//! Conditional-CAS and multi-word CAS (§4.3).
//!
//! [`McasCell`] is a single atomically-CAS-able word. [`ccas`] performs a
//! standalone conditional CAS against a caller-owned condition flag;
//! [`mcas`] composes N of them into an all-or-nothing transaction used by
//! [`crate::bst`] for structural mutation.
//!
//! Descriptors (the intermediate state a cell holds while a CCAS or MCAS
//! is in flight) are never freed once installed: a cell that currently
//! holds a descriptor pointer keeps it valid forever, so any thread that
//! loaded the pointer before it was superseded may still safely dereference
//! it. This trades a small, bounded amount of leaked memory per completed
//! operation for never needing a reclamation scheme for descriptors
//! themselves; the same tradeoff this workspace makes for threaded BST
//! nodes (see `crate::bst`).

mod engine;

pub use engine::{ccas, mcas, CcasDescriptor, Condition, McasCell, McasDescriptor, Status};
