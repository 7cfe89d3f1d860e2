//! Elimination array (§4.2).
//!
//! Short-circuits a central structure (stack top, queue ends, deque ends)
//! by pairing a concurrently-arriving add with a concurrently-arriving
//! remove so neither ever touches the center. Used by [`crate::deque`] to
//! absorb contention on both of its ends.

mod array;
mod config;

pub use array::{Attempt, CancelToken, EliminationArray, EliminationStats};
pub use config::{AdaptiveConfig, EliminationConfig};
