//! `ReconOps`: the pluggable pixel-domain reconstruction contract the block
//! parser calls into. This core never touches pixels itself (SPEC_FULL.md
//! §1 Out-of-scope, §6 external collaborator contract).

use crate::block::{Av1Block, BlockSize};
use crate::error::Result;
use crate::tile::TileSlot;

/// Per-superblock edge availability, passed to `recon_b_intra` so the
/// external kernel knows which neighbor samples are valid.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeFlags {
    pub has_above: bool,
    pub has_left: bool,
    pub has_above_right: bool,
    pub has_below_left: bool,
}

/// Capability set the core invokes for everything pixel-domain: inverse
/// transform, intra/inter prediction, loop filter, CDEF, loop restoration,
/// motion compensation. Implementations are selected per bit depth (8/10)
/// via a dispatch table bound at frame submission (SPEC_FULL.md §6).
pub trait ReconOps: Send + Sync {
    /// Decodes residual coefficients into the pass-1 buffer; no pixels
    /// touched. Used during pass 1 of the two-pass schedule.
    fn read_coef_blocks(&self, ctx: &mut TileSlot, bs: BlockSize, block: &Av1Block) -> Result<()>;

    /// Writes reconstructed intra samples for `block`.
    fn recon_b_intra(
        &self,
        ctx: &mut TileSlot,
        bs: BlockSize,
        edge_flags: EdgeFlags,
        block: &Av1Block,
    ) -> Result<()>;

    /// Writes reconstructed inter samples for `block`; may suspend on a
    /// referenced picture's row-progress counter.
    fn recon_b_inter(&self, ctx: &mut TileSlot, bs: BlockSize, block: &Av1Block) -> Result<()>;

    /// Applies deblock/CDEF/restoration for superblock row `sby`; advances
    /// the picture's pixel-level progress counter on completion.
    fn filter_sbrow(&self, sby: u32) -> Result<()>;

    /// Snapshots pre-filter edge samples the next sbrow's intra prediction
    /// will need.
    fn backup_ipred_edge(&self, ctx: &mut TileSlot) -> Result<()>;
}

/// A no-op `ReconOps` used by tests that only exercise the symbol-parsing
/// path (pass-1-only callers, unit tests of the block parser).
pub struct NullReconOps;

impl ReconOps for NullReconOps {
    fn read_coef_blocks(&self, _ctx: &mut TileSlot, _bs: BlockSize, _block: &Av1Block) -> Result<()> {
        Ok(())
    }

    fn recon_b_intra(
        &self,
        _ctx: &mut TileSlot,
        _bs: BlockSize,
        _edge_flags: EdgeFlags,
        _block: &Av1Block,
    ) -> Result<()> {
        Ok(())
    }

    fn recon_b_inter(&self, _ctx: &mut TileSlot, _bs: BlockSize, _block: &Av1Block) -> Result<()> {
        Ok(())
    }

    fn filter_sbrow(&self, _sby: u32) -> Result<()> {
        Ok(())
    }

    fn backup_ipred_edge(&self, _ctx: &mut TileSlot) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::PartitionKind;

    #[test]
    fn test_null_recon_ops_accepts_any_block() {
        let ops = NullReconOps;
        let block = Av1Block::new(0, 0, BlockSize::B8x8, PartitionKind::None);
        let mut slot = TileSlot::new_for_test();
        assert!(ops.read_coef_blocks(&mut slot, BlockSize::B8x8, &block).is_ok());
        assert!(ops
            .recon_b_intra(&mut slot, BlockSize::B8x8, EdgeFlags::default(), &block)
            .is_ok());
        assert!(ops.filter_sbrow(0).is_ok());
    }
}
