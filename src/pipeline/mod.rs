//! Frame pipeline: OBU dispatch, tile scheduling, CDF publication, and
//! reference-slot bookkeeping (SPEC_FULL.md §4.7, §5).
//!
//! Grounded on the teacher's ambient dependency set (`serde`, `thiserror`,
//! `tracing`, no threading crate — confirmed from `bitvue-av1`'s
//! `Cargo.toml`) and SPEC_FULL.md §5's explicit "OS threads, mutexes and
//! condition variables" wording: tile scheduling below uses
//! `std::thread::scope` plus `std::sync::Mutex`, never a work-stealing
//! crate. The teacher itself never threads (it's a synchronous GUI
//! parser), so this module's structure follows SPEC_FULL.md §4.7's step
//! list directly rather than any one teacher file.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::block::{Av1Block, BlockSize};
use crate::config::DecoderConfig;
use crate::error::{Av1Error, Result};
use crate::frame_header::{parse_frame_header, FrameHeader, FrameType, RefSlotState, NUM_REF_FRAMES};
use crate::obu::{parse_all_obus, ObuType};
use crate::picture::{OutputQueue, Picture, PictureParams};
use crate::recon::{EdgeFlags, ReconOps};
use crate::sequence::{parse_sequence_header, SequenceHeader};
use crate::symbol::{CdfContext, SymbolDecoder};
use crate::tile::{parse_partition_tree, replay_block, setup_tile, slice_tile_group, DecodePass, FrameParseFlags, SuperblockSize, TileInfo, TileSlot};

/// Forwards every `ReconOps` call to `inner` but also records each block's
/// final decoded fields, the dense pass-1 record that pass 2 replays
/// instead of re-parsing MSAC (SPEC_FULL.md §4.7 step 3, "Context replay").
struct RecordingRecon<'a> {
    inner: &'a dyn ReconOps,
    blocks: Mutex<Vec<Av1Block>>,
}

impl<'a> RecordingRecon<'a> {
    fn new(inner: &'a dyn ReconOps) -> Self {
        Self { inner, blocks: Mutex::new(Vec::new()) }
    }

    fn into_blocks(self) -> Vec<Av1Block> {
        self.blocks.into_inner().unwrap()
    }
}

impl<'a> ReconOps for RecordingRecon<'a> {
    fn read_coef_blocks(&self, ctx: &mut TileSlot, bs: BlockSize, block: &Av1Block) -> Result<()> {
        self.blocks.lock().unwrap().push(block.clone());
        self.inner.read_coef_blocks(ctx, bs, block)
    }

    fn recon_b_intra(&self, ctx: &mut TileSlot, bs: BlockSize, edge_flags: EdgeFlags, block: &Av1Block) -> Result<()> {
        self.inner.recon_b_intra(ctx, bs, edge_flags, block)
    }

    fn recon_b_inter(&self, ctx: &mut TileSlot, bs: BlockSize, block: &Av1Block) -> Result<()> {
        self.inner.recon_b_inter(ctx, bs, block)
    }

    fn filter_sbrow(&self, sby: u32) -> Result<()> {
        self.inner.filter_sbrow(sby)
    }

    fn backup_ipred_edge(&self, ctx: &mut TileSlot) -> Result<()> {
        self.inner.backup_ipred_edge(ctx)
    }
}

/// Everything a decoded reference frame contributes to later frames: the
/// picture itself, its exit CDF, and the per-ref state `frame_size_with_refs`
/// and skip-mode's order-hint search consult.
struct ReferenceSlot {
    picture: Option<Arc<Picture>>,
    cdf: Option<CdfContext>,
    state: RefSlotState,
}

impl ReferenceSlot {
    fn empty() -> Self {
        Self { picture: None, cdf: None, state: RefSlotState::default() }
    }
}

/// Owns cross-frame state (sequence header, 8 reference slots, output
/// queue) and drives one frame at a time through OBU dispatch, tile
/// scheduling, and reference-slot publication.
///
/// A single `FramePipeline` is not internally frame-parallel across calls
/// to [`submit_temporal_unit`](Self::submit_temporal_unit) — SPEC_FULL.md's
/// frame-level pipeline depth is realized by a caller driving multiple
/// temporal units' tile work concurrently via `n_tile_threads`, while
/// `n_frame_threads` selects the 1-pass/2-pass schedule per SPEC_FULL.md
/// §4.7 step 3 rather than spawning frame workers inside this type.
pub struct FramePipeline {
    config: DecoderConfig,
    recon: Arc<dyn ReconOps>,
    sequence: Mutex<Option<SequenceHeader>>,
    refs: Mutex<[ReferenceSlot; NUM_REF_FRAMES]>,
    output: Arc<OutputQueue>,
    next_poc: AtomicU64,
}

impl FramePipeline {
    pub fn new(config: DecoderConfig, recon: Arc<dyn ReconOps>) -> Self {
        let max_frame_delay = config.max_frame_delay;
        Self {
            config,
            recon,
            sequence: Mutex::new(None),
            refs: Mutex::new(std::array::from_fn(|_| ReferenceSlot::empty())),
            output: Arc::new(OutputQueue::new(max_frame_delay)),
            next_poc: AtomicU64::new(0),
        }
    }

    pub fn output_queue(&self) -> Arc<OutputQueue> {
        Arc::clone(&self.output)
    }

    /// Invalidates the output queue per SPEC_FULL.md §5 "Cancellation":
    /// in-flight pictures already pushed are dropped, future pushes from
    /// frames still decoding are the caller's responsibility to stop.
    pub fn flush(&self) {
        self.output.flush();
    }

    /// Feeds one temporal unit's raw OBU concatenation (no container
    /// framing) through the pipeline, dispatching each OBU by type
    /// (SPEC_FULL.md §4.8).
    pub fn submit_temporal_unit(&self, data: &[u8]) -> Result<()> {
        let obus = parse_all_obus(data)?;
        let mut pending_frame_header: Option<FrameHeader> = None;

        for obu in &obus {
            match obu.header.obu_type {
                ObuType::SequenceHeader => {
                    let seq = parse_sequence_header(&obu.payload)?;
                    *self.sequence.lock().unwrap() = Some(seq);
                }
                ObuType::FrameHeader | ObuType::RedundantFrameHeader => {
                    let seq = self.require_sequence()?;
                    let refs = self.snapshot_ref_states();
                    let header = parse_frame_header(&obu.payload, &seq, &refs)?;
                    if header.show_existing_frame {
                        self.show_existing_frame(&header)?;
                    } else {
                        pending_frame_header = Some(header);
                    }
                }
                ObuType::TileGroup => {
                    let header = pending_frame_header
                        .take()
                        .ok_or_else(|| Av1Error::invalid_bitstream(obu.offset, "tile group with no preceding frame header"))?;
                    let seq = self.require_sequence()?;
                    self.decode_frame(&seq, header, &obu.payload)?;
                }
                ObuType::Frame => {
                    // Fused header+tiles: header_size_bytes marks the split
                    // (SPEC_FULL.md §4.9, `header_size_bytes`).
                    let seq = self.require_sequence()?;
                    let refs = self.snapshot_ref_states();
                    let header = parse_frame_header(&obu.payload, &seq, &refs)?;
                    if header.show_existing_frame {
                        self.show_existing_frame(&header)?;
                        continue;
                    }
                    let tile_payload = &obu.payload[header.header_size_bytes.min(obu.payload.len())..];
                    self.decode_frame(&seq, header, tile_payload)?;
                }
                _ => {
                    // Metadata, padding, temporal delimiter, tile list,
                    // reserved: no frame data, nothing to dispatch.
                }
            }
        }

        Ok(())
    }

    fn require_sequence(&self) -> Result<SequenceHeader> {
        self.sequence
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Av1Error::invalid_bitstream(0, "frame header arrived before any sequence header"))
    }

    fn snapshot_ref_states(&self) -> [RefSlotState; NUM_REF_FRAMES] {
        let refs = self.refs.lock().unwrap();
        std::array::from_fn(|i| refs[i].state)
    }

    /// `show_existing_frame`: re-publish a stored reference picture without
    /// decoding new tile data.
    fn show_existing_frame(&self, header: &FrameHeader) -> Result<()> {
        let idx = header.frame_to_show_map_idx.ok_or_else(|| {
            Av1Error::invalid_bitstream(0, "show_existing_frame set without frame_to_show_map_idx")
        })? as usize;
        let refs = self.refs.lock().unwrap();
        let slot = refs.get(idx).ok_or(Av1Error::ReferenceMissing(idx as u8))?;
        let picture = slot.picture.clone().ok_or(Av1Error::ReferenceMissing(idx as u8))?;
        drop(refs);
        self.output.push(picture);
        Ok(())
    }

    /// Runs steps 1-6 of SPEC_FULL.md §4.7 for one non-`show_existing_frame`
    /// frame: scratch allocation, tile setup, pass-schedule selection, tile
    /// scheduling, CDF promotion, reference-slot update.
    fn decode_frame(&self, seq: &SequenceHeader, header: FrameHeader, tile_payload: &[u8]) -> Result<()> {
        let sb_size = if seq.use_128x128_superblock { SuperblockSize::Sb128 } else { SuperblockSize::Sb64 };
        let sb_px = sb_size.pixels();
        let frame_cols4 = header.upscaled_width.div_ceil(4);
        let frame_rows4 = header.frame_height.div_ceil(4);

        let tile_count = (header.tile_info.cols * header.tile_info.rows) as usize;
        let tile_slices = slice_tile_group(tile_payload, tile_count)?;

        let input_cdf = self.input_cdf_for(header.primary_ref_frame);

        let picture = Arc::new(Picture::new(
            [Vec::new(), Vec::new(), Vec::new()],
            [0, 0],
            picture_params(seq, &header),
            self.next_poc.fetch_add(1, Ordering::Relaxed),
        ));

        let refresh_context = !header.disable_frame_end_update_cdf;
        let two_pass = self.config.wants_two_pass(refresh_context);
        let exit_cdfs: Vec<CdfContext> = if two_pass {
            // Pass 1: every block parser runs for real (MSAC decode,
            // coefficients only), recording each block's final fields into
            // a dense per-tile array as it's parsed.
            let (exit_cdfs, recorded) = self.run_tile_pass(
                &header, seq, sb_size, sb_px, frame_cols4, frame_rows4, &tile_slices, input_cdf, DecodePass::One, &picture, true,
            )?;
            // Pass 2: replays the recorded array in row order, invoking the
            // reconstruction kernels directly — no MSAC, no partition
            // descent (SPEC_FULL.md §4.7 step 3, "Context replay").
            self.replay_tile_pass(&header, sb_size, sb_px, frame_cols4, frame_rows4, &recorded, &picture)?;
            exit_cdfs
        } else {
            self.run_tile_pass(
                &header, seq, sb_size, sb_px, frame_cols4, frame_rows4, &tile_slices, input_cdf, DecodePass::Two, &picture, false,
            )?
            .0
        };

        // Under the two-pass schedule, pass 1 is the only pass that decodes
        // MSAC symbols and adapts CDFs — pass 2's replay touches no symbols
        // at all, so the published context must come from pass 1's exit
        // state, not pass 2's (which, before this fix, re-parsed MSAC a
        // second time and published that instead).
        let published_cdf = if refresh_context {
            let idx = (header.tile_info.context_update_tile_id as usize).min(exit_cdfs.len().saturating_sub(1));
            exit_cdfs.get(idx).cloned()
        } else {
            None
        };

        self.update_reference_slots(&header, seq, &picture, published_cdf);

        if header.show_frame {
            self.output.push(Arc::clone(&picture));
        }

        Ok(())
    }

    fn input_cdf_for(&self, primary_ref_frame: u8) -> CdfContext {
        if primary_ref_frame as usize >= NUM_REF_FRAMES {
            return CdfContext::new();
        }
        let refs = self.refs.lock().unwrap();
        refs[primary_ref_frame as usize].cdf.clone().unwrap_or_else(CdfContext::new)
    }

    fn frame_parse_flags(&self, header: &FrameHeader, seq: &SequenceHeader, pass: DecodePass) -> FrameParseFlags {
        FrameParseFlags {
            pass,
            skip_mode_allowed: header.skip_mode_params.present,
            segmentation_enabled: header.segmentation_params.enabled,
            segmentation_preskip: header.segmentation_params.seg_id_pre_skip,
            delta_q_present: header.delta_q_params.present,
            delta_lf_present: header.delta_lf_params.present,
            cdef_enabled: header.cdef_params.bits > 0 || header.cdef_params.y_pri.iter().any(|&p| p != 0),
            allow_intrabc: header.allow_intrabc,
            reduced_tx_set: header.reduced_tx_set,
            cfl_allowed: true,
            allow_high_precision_mv: header.allow_high_precision_mv,
            is_key_frame: matches!(header.frame_type, FrameType::Key | FrameType::IntraOnly),
            subsampling_x: seq.color_config.subsampling_x,
            subsampling_y: seq.color_config.subsampling_y,
        }
    }

    /// Runs every tile of the frame once, in the given pass, scheduling
    /// tile workers over `n_tile_threads` OS threads (SPEC_FULL.md §4.7
    /// step 4, "with multiple workers: publish tasks into a work queue").
    /// Returns each tile's exit `CdfContext` in tile-group order plus,
    /// when `record` is set, each tile's pass-1 block record in parse
    /// order (SPEC_FULL.md §4.7 step 3).
    #[allow(clippy::too_many_arguments)]
    fn run_tile_pass(
        &self,
        header: &FrameHeader,
        seq: &SequenceHeader,
        sb_size: SuperblockSize,
        sb_px: u32,
        frame_cols4: u32,
        frame_rows4: u32,
        tile_slices: &[&[u8]],
        input_cdf: CdfContext,
        pass: DecodePass,
        picture: &Arc<Picture>,
        record: bool,
    ) -> Result<(Vec<CdfContext>, Vec<Vec<Av1Block>>)> {
        let flags = self.frame_parse_flags(header, seq, pass);
        let n_workers = self.config.n_tile_threads.max(1).min(tile_slices.len().max(1));
        let next_tile = AtomicU64::new(0);
        let results: Mutex<Vec<Option<Result<(CdfContext, Vec<Av1Block>)>>>> =
            Mutex::new((0..tile_slices.len()).map(|_| None).collect());

        let run_one = |tile_idx: usize| -> Result<(CdfContext, Vec<Av1Block>)> {
            let cols = header.tile_info.cols.max(1);
            let tile_col = tile_idx as u32 % cols;
            let tile_row = tile_idx as u32 / cols;
            let mi_col_start = tile_col * sb_px / 4;
            let mi_col_end = ((tile_col + 1) * sb_px / 4).min(frame_cols4).max(mi_col_start);
            let mi_row_start = tile_row * sb_px / 4;
            let mi_row_end = ((tile_row + 1) * sb_px / 4).min(frame_rows4).max(mi_row_start);

            let info = TileInfo { tile_col, tile_row, mi_col_start, mi_col_end, mi_row_start, mi_row_end };
            let mut slot = TileSlot::new(info, sb_size, frame_cols4, frame_rows4, header.quantization_params.base_q_idx as i16);
            slot.picture = Some(Arc::clone(picture));

            let mut decoder: SymbolDecoder = setup_tile(tile_slices[tile_idx], input_cdf.clone())?;

            let recorder = RecordingRecon::new(self.recon.as_ref());
            let recon: &dyn ReconOps = if record { &recorder } else { self.recon.as_ref() };

            let sb4 = sb_px / 4;
            let mut sby = mi_row_start;
            while sby < mi_row_end {
                let mut sbx = mi_col_start;
                while sbx < mi_col_end {
                    let sb_bsize = if sb_px == 128 { BlockSize::B128x128 } else { BlockSize::B64x64 };
                    parse_partition_tree(&mut decoder, &mut slot, recon, sbx, sby, sb_bsize, mi_col_end, mi_row_end, flags)?;
                    sbx += sb4;
                }
                slot.check_sticky_error().map_err(|e| {
                    slot.sticky_error = true;
                    e
                })?;
                let row_done_px = (sby + sb4) * 4;
                slot.picture.as_ref().unwrap().progress.advance_block_row(row_done_px as u64);
                if pass == DecodePass::Two {
                    self.recon.filter_sbrow(sby / sb4)?;
                    self.recon.backup_ipred_edge(&mut slot)?;
                    slot.picture.as_ref().unwrap().progress.advance_pixel_row(row_done_px as u64);
                }
                sby += sb4;
            }

            Ok((decoder.cdf, recorder.into_blocks()))
        };

        std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(n_workers);
            for _ in 0..n_workers {
                let next_tile = &next_tile;
                let results = &results;
                let run_one = &run_one;
                handles.push(scope.spawn(move || loop {
                    let idx = next_tile.fetch_add(1, Ordering::Relaxed) as usize;
                    if idx >= tile_slices.len() {
                        break;
                    }
                    let outcome = run_one(idx);
                    results.lock().unwrap()[idx] = Some(outcome);
                }));
            }
            for handle in handles {
                let _ = handle.join();
            }
        });

        let collected = results.into_inner().unwrap();
        let per_tile: Result<Vec<(CdfContext, Vec<Av1Block>)>> = collected
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(Av1Error::invalid_bitstream(0, "tile worker did not complete"))))
            .collect();
        let per_tile = per_tile?;
        Ok(per_tile.into_iter().unzip())
    }

    /// Pass 2 of the two-pass schedule: walks each tile's pass-1 record in
    /// the order it was parsed and invokes the reconstruction kernels
    /// directly, without re-entering MSAC or the partition descender
    /// (SPEC_FULL.md §4.7 step 3, "Context replay (pass 2)").
    #[allow(clippy::too_many_arguments)]
    fn replay_tile_pass(
        &self,
        header: &FrameHeader,
        sb_size: SuperblockSize,
        sb_px: u32,
        frame_cols4: u32,
        frame_rows4: u32,
        recorded: &[Vec<Av1Block>],
        picture: &Arc<Picture>,
    ) -> Result<()> {
        let n_workers = self.config.n_tile_threads.max(1).min(recorded.len().max(1));
        let next_tile = AtomicU64::new(0);
        let results: Mutex<Vec<Option<Result<()>>>> = Mutex::new((0..recorded.len()).map(|_| None).collect());

        let run_one = |tile_idx: usize| -> Result<()> {
            let cols = header.tile_info.cols.max(1);
            let tile_col = tile_idx as u32 % cols;
            let tile_row = tile_idx as u32 / cols;
            let mi_col_start = tile_col * sb_px / 4;
            let mi_col_end = ((tile_col + 1) * sb_px / 4).min(frame_cols4).max(mi_col_start);
            let mi_row_start = tile_row * sb_px / 4;
            let mi_row_end = ((tile_row + 1) * sb_px / 4).min(frame_rows4).max(mi_row_start);

            let info = TileInfo { tile_col, tile_row, mi_col_start, mi_col_end, mi_row_start, mi_row_end };
            let mut slot = TileSlot::new(info, sb_size, frame_cols4, frame_rows4, header.quantization_params.base_q_idx as i16);
            slot.picture = Some(Arc::clone(picture));

            let sb4 = sb_px / 4;
            let mut blocks = recorded[tile_idx].iter().peekable();
            let mut sby = mi_row_start;
            while sby < mi_row_end {
                while let Some(block) = blocks.peek() {
                    if block.y4 >= sby + sb4 {
                        break;
                    }
                    replay_block(&mut slot, self.recon.as_ref(), blocks.next().unwrap())?;
                }
                slot.check_sticky_error().map_err(|e| {
                    slot.sticky_error = true;
                    e
                })?;
                self.recon.filter_sbrow(sby / sb4)?;
                self.recon.backup_ipred_edge(&mut slot)?;
                let row_done_px = (sby + sb4) * 4;
                slot.picture.as_ref().unwrap().progress.advance_pixel_row(row_done_px as u64);
                slot.picture.as_ref().unwrap().progress.advance_block_row(row_done_px as u64);
                sby += sb4;
            }

            Ok(())
        };

        std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(n_workers);
            for _ in 0..n_workers {
                let next_tile = &next_tile;
                let results = &results;
                let run_one = &run_one;
                handles.push(scope.spawn(move || loop {
                    let idx = next_tile.fetch_add(1, Ordering::Relaxed) as usize;
                    if idx >= recorded.len() {
                        break;
                    }
                    let outcome = run_one(idx);
                    results.lock().unwrap()[idx] = Some(outcome);
                }));
            }
            for handle in handles {
                let _ = handle.join();
            }
        });

        let collected = results.into_inner().unwrap();
        for outcome in collected {
            outcome.unwrap_or_else(|| Err(Av1Error::invalid_bitstream(0, "tile replay worker did not complete")))?;
        }
        Ok(())
    }

    /// Updates every slot selected by `refresh_frame_flags` with the new
    /// picture, its published CDF (if `refresh_context`), and its
    /// `RefSlotState` bookkeeping (SPEC_FULL.md §4.7 step 6).
    fn update_reference_slots(&self, header: &FrameHeader, _seq: &SequenceHeader, picture: &Arc<Picture>, published_cdf: Option<CdfContext>) {
        if header.refresh_frame_flags == 0 {
            return;
        }
        let mut refs = self.refs.lock().unwrap();
        let state = RefSlotState {
            valid: true,
            frame_id: header.current_frame_id,
            upscaled_width: header.upscaled_width,
            frame_height: header.frame_height,
            render_width: header.render_width,
            render_height: header.render_height,
            order_hint: header.order_hint,
            frame_type: Some(header.frame_type),
        };
        for i in 0..NUM_REF_FRAMES {
            if header.refresh_frame_flags & (1 << i) != 0 {
                refs[i].picture = Some(Arc::clone(picture));
                refs[i].state = state;
                if let Some(cdf) = &published_cdf {
                    refs[i].cdf = Some(cdf.clone());
                }
            }
        }
    }
}

fn picture_params(seq: &SequenceHeader, header: &FrameHeader) -> PictureParams {
    let cc = &seq.color_config;
    PictureParams {
        width: header.upscaled_width,
        height: header.frame_height,
        bit_depth: cc.bit_depth,
        subsampling_x: cc.subsampling_x,
        subsampling_y: cc.subsampling_y,
        mono_chrome: cc.mono_chrome,
        color_primaries: cc.color_primaries,
        transfer_characteristics: cc.transfer_characteristics,
        matrix_coefficients: cc.matrix_coefficients,
        chroma_sample_position: cc.chroma_sample_position,
        full_range: cc.color_range,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recon::NullReconOps;

    fn minimal_sequence_bytes() -> Vec<u8> {
        // profile=0, still_picture=0, reduced_still_picture_header=1,
        // seq_level_idx=0, width/height bits = 3 (4-bit values), both 0,
        // all enable_* toggles 0, chroma_sample_position=0,
        // separate_uv_delta_q=0, film_grain_params_present=0.
        vec![0x18, 0x0C, 0xC0, 0x00, 0x00, 0, 0, 0]
    }

    fn obu(obu_type: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![(obu_type << 3) | 0b0000_0010]; // has_size=1
        out.push(payload.len() as u8);
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_submit_sequence_header_only_does_not_error() {
        let pipeline = FramePipeline::new(DecoderConfig::default(), Arc::new(NullReconOps));
        let data = obu(1, &minimal_sequence_bytes());
        assert!(pipeline.submit_temporal_unit(&data).is_ok());
        assert!(pipeline.sequence.lock().unwrap().is_some());
    }

    #[test]
    fn test_frame_header_without_sequence_errors() {
        let pipeline = FramePipeline::new(DecoderConfig::default(), Arc::new(NullReconOps));
        let data = obu(3, &[0x00, 0x00, 0x00, 0x00]);
        assert!(pipeline.submit_temporal_unit(&data).is_err());
    }

    #[test]
    fn test_output_queue_starts_empty() {
        let pipeline = FramePipeline::new(DecoderConfig::default(), Arc::new(NullReconOps));
        assert!(pipeline.output_queue().is_empty());
    }

    #[test]
    fn test_flush_is_idempotent_on_empty_queue() {
        let pipeline = FramePipeline::new(DecoderConfig::default(), Arc::new(NullReconOps));
        pipeline.flush();
        pipeline.flush();
        assert!(pipeline.output_queue().is_empty());
    }
}
