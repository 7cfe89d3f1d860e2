//! Configuration knobs for the elimination array (§6).

/// Tuning for the adaptive-sizing variant of the elimination array.
///
/// Every 200 failed matches, the effective probing window halves if
/// matches are far below failures, or doubles if matches exceed failures,
/// bounded by `floor` and `ceiling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptiveConfig {
    /// Starting/average effective size.
    pub average_size: usize,
    /// Minimum effective size the array will shrink to.
    pub floor: usize,
    /// Maximum effective size the array will grow to.
    pub ceiling: usize,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        let average_size = 32;
        Self {
            average_size,
            floor: 2,
            ceiling: average_size * 2,
        }
    }
}

/// Configuration for an [`crate::elimination::EliminationArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EliminationConfig {
    /// Fixed slot-array size, ignored when `adaptive` is `Some`.
    pub size: usize,
    /// Consecutive slots probed per attempt.
    pub lookahead: usize,
    /// When set, the array resizes its effective probing window based on
    /// observed contention instead of using a fixed `size`.
    pub adaptive: Option<AdaptiveConfig>,
}

impl Default for EliminationConfig {
    fn default() -> Self {
        Self {
            size: 8,
            lookahead: 4,
            adaptive: None,
        }
    }
}

impl EliminationConfig {
    /// `size <= 0` in the spec's deque knob selects adaptive mode; this is
    /// the equivalent constructor for callers configuring a deque.
    pub fn adaptive() -> Self {
        Self {
            size: 0,
            lookahead: 4,
            adaptive: Some(AdaptiveConfig::default()),
        }
    }

    /// The array's backing allocation size: the adaptive ceiling when
    /// adaptive, else the fixed `size`.
    pub(crate) fn backing_size(&self) -> usize {
        match self.adaptive {
            Some(a) => a.ceiling,
            None => self.size,
        }
    }

    /// The initial effective (logically active) window size.
    pub(crate) fn initial_effective_size(&self) -> usize {
        match self.adaptive {
            Some(a) => a.average_size,
            None => self.size,
        }
    }
}
