//! Core types shared by the concurrent collections.
//!
//! This crate holds the fundamentals that every lock-free container in
//! `cbbs-collections` depends on but that are not themselves part of any
//! single data structure:
//!
//! - Common error handling with [`Error`] and [`Result`]
//! - [`Identity`], the stable per-object ordering key the MCAS sort step
//!   requires (see the multi-word CAS module)
//! - [`BackoffPolicy`], the shared retry/backoff knob used by every
//!   CAS-retry loop in the workspace
//!
//! # Example
//!
//! ```
//! use cbbs_core::{BackoffPolicy, Identity, IdAllocator};
//!
//! let alloc = IdAllocator::new();
//! let first = alloc.next();
//! let second = alloc.next();
//! assert!(second > first);
//!
//! let backoff = BackoffPolicy::default();
//! assert_eq!(backoff.base_millis, 6);
//! ```

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
