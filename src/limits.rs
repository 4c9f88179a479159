//! Hard caps for decode and walk stages.
//!
//! Every stage that allocates in proportion to remote-controlled input is
//! bounded by an explicit limit; exceeding a limit surfaces as an error,
//! never silent truncation. Defaults are sized for source repositories of
//! hundreds of megabytes held fully in memory.

/// Hard caps for pack decoding, delta resolution, and tree walking.
#[derive(Clone, Copy, Debug)]
pub struct Limits {
    /// Maximum inflated size of any single object payload.
    pub max_object_bytes: usize,
    /// Maximum inflated size of a delta instruction stream.
    pub max_delta_bytes: usize,
    /// Maximum bytes a single pack entry header may span.
    pub max_header_bytes: usize,
    /// Maximum tree nesting depth during worktree materialization.
    pub max_tree_depth: usize,
    /// Maximum resolver re-drives while recovering thin-pack bases.
    pub max_resolve_passes: usize,
}

impl Limits {
    /// Defaults sized for large source repositories.
    pub const DEFAULT: Self = Self {
        max_object_bytes: 512 * 1024 * 1024,
        max_delta_bytes: 64 * 1024 * 1024,
        max_header_bytes: 32,
        max_tree_depth: 128,
        max_resolve_passes: 4096,
    };

    /// Restrictive caps for tests and constrained environments.
    pub const RESTRICTIVE: Self = Self {
        max_object_bytes: 4 * 1024 * 1024,
        max_delta_bytes: 1024 * 1024,
        max_header_bytes: 32,
        max_tree_depth: 32,
        max_resolve_passes: 64,
    };

    /// Validates internal consistency.
    ///
    /// # Panics
    /// Panics on a zero cap; an all-zero limit set is a programmer error,
    /// not a runtime condition.
    pub fn validate(&self) {
        assert!(self.max_object_bytes > 0, "max_object_bytes must be nonzero");
        assert!(self.max_delta_bytes > 0, "max_delta_bytes must be nonzero");
        assert!(self.max_header_bytes > 0, "max_header_bytes must be nonzero");
        assert!(self.max_tree_depth > 0, "max_tree_depth must be nonzero");
        assert!(
            self.max_resolve_passes > 0,
            "max_resolve_passes must be nonzero"
        );
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::DEFAULT
    }
}
