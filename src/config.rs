//! Public decoder configuration.
//!
//! One settings object controls both levels of parallelism and the picture
//! allocator; everything defaults to a single-threaded, self-allocating
//! configuration so a caller can override only what it needs.

/// Callback pair for a caller-supplied picture allocator.
pub trait PictureAllocator: Send + Sync {
    /// Allocates backing storage for the three plane sizes (in bytes),
    /// returning each plane's buffer, its stride, and an opaque handle
    /// passed back to `release`.
    fn allocate(&self, plane_sizes: [usize; 3]) -> crate::error::Result<([Vec<u8>; 3], [usize; 2], u64)>;

    /// Releases storage previously returned by `allocate`.
    fn release(&self, opaque: u64);
}

/// Decoder-wide configuration, per SPEC_FULL.md §6.
#[derive(Clone)]
pub struct DecoderConfig {
    /// Frame-level pipeline depth; `1` disables frame threading.
    pub n_frame_threads: usize,
    /// Intra-frame tile workers; `1` serializes tiles.
    pub n_tile_threads: usize,
    /// Caps in-flight frames before the output queue backpressures
    /// frame workers. Defaults to `n_frame_threads`.
    pub max_frame_delay: usize,
    /// Whether film-grain synthesis (delegated to `ReconOps`) should run.
    pub apply_grain: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            n_frame_threads: 1,
            n_tile_threads: 1,
            max_frame_delay: 1,
            apply_grain: true,
        }
    }
}

impl DecoderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frame_threads(mut self, n: usize) -> Self {
        self.n_frame_threads = n.max(1);
        if self.max_frame_delay < self.n_frame_threads {
            self.max_frame_delay = self.n_frame_threads;
        }
        self
    }

    pub fn with_tile_threads(mut self, n: usize) -> Self {
        self.n_tile_threads = n.max(1);
        self
    }

    /// Whether the frame pipeline should run the 2-pass schedule (requires
    /// frame threading to be active; see SPEC_FULL.md §4.7 step 3).
    pub fn wants_two_pass(&self, refresh_context: bool) -> bool {
        self.n_frame_threads > 1 && refresh_context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_single_threaded() {
        let cfg = DecoderConfig::default();
        assert_eq!(cfg.n_frame_threads, 1);
        assert_eq!(cfg.n_tile_threads, 1);
        assert!(!cfg.wants_two_pass(true));
    }

    #[test]
    fn test_builder_raises_max_frame_delay() {
        let cfg = DecoderConfig::new().with_frame_threads(4);
        assert_eq!(cfg.max_frame_delay, 4);
        assert!(cfg.wants_two_pass(true));
        assert!(!cfg.wants_two_pass(false));
    }
}
