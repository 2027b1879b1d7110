//! Frame header parsing (AV1 spec Section 5.9 `uncompressed_header()`).
//!
//! Parses exactly what the rest of the core consults to condition block
//! parsing (SPEC_FULL.md §4.9): frame type/size/reference wiring, tile grid,
//! quantization and segmentation, `tx_mode`/`reference_select`/skip-mode, and
//! `reduced_tx_set`. Fields that only matter to `ReconOps` (loop filter,
//! CDEF, loop restoration, global motion, film grain) are parsed far enough
//! to preserve byte/tile alignment and retained verbatim on the header.

use serde::{Deserialize, Serialize};

use crate::bitreader::BitReader;
use crate::error::{Av1Error, Result};
use crate::sequence::SequenceHeader;

pub const NUM_REF_FRAMES: usize = 8;
pub const REFS_PER_FRAME: usize = 7;
pub const MAX_SEGMENTS: usize = 8;
pub const SEG_LVL_MAX: usize = 8;
pub const TOTAL_REFS_PER_FRAME: usize = 8;

const SEGMENTATION_FEATURE_BITS: [u8; SEG_LVL_MAX] = [8, 6, 6, 6, 6, 3, 0, 0];
const SEGMENTATION_FEATURE_SIGNED: [bool; SEG_LVL_MAX] = [true, true, true, true, true, false, false, false];
const SEGMENTATION_FEATURE_MAX: [i16; SEG_LVL_MAX] = [255, 63, 63, 63, 63, 7, 0, 0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameType {
    Key = 0,
    Inter = 1,
    IntraOnly = 2,
    Switch = 3,
}

impl FrameType {
    pub fn from_bits(bits: u32) -> Result<Self> {
        match bits {
            0 => Ok(FrameType::Key),
            1 => Ok(FrameType::Inter),
            2 => Ok(FrameType::IntraOnly),
            3 => Ok(FrameType::Switch),
            v => Err(Av1Error::invalid_bitstream(0, format!("invalid frame_type {v}"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FrameType::Key => "KEY_FRAME",
            FrameType::Inter => "INTER_FRAME",
            FrameType::IntraOnly => "INTRA_ONLY_FRAME",
            FrameType::Switch => "SWITCH_FRAME",
        }
    }

    pub fn is_intra_only(&self) -> bool {
        matches!(self, FrameType::Key | FrameType::IntraOnly | FrameType::Switch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterpolationFilter {
    EightTap,
    EightTapSmooth,
    EightTapSharp,
    Bilinear,
    Switchable,
}

impl InterpolationFilter {
    fn from_bits(bits: u32) -> Self {
        match bits {
            0 => InterpolationFilter::EightTap,
            1 => InterpolationFilter::EightTapSmooth,
            2 => InterpolationFilter::EightTapSharp,
            3 => InterpolationFilter::Bilinear,
            _ => InterpolationFilter::Switchable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxMode {
    Only4x4,
    Largest,
    Select,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GmType {
    Identity,
    Translation,
    RotZoom,
    Affine,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GlobalMotionParams {
    pub gm_type: [GmType; NUM_REF_FRAMES],
    pub gm_params: [[i32; 6]; NUM_REF_FRAMES],
}

impl Default for GlobalMotionParams {
    fn default() -> Self {
        let identity = [0, 1 << 16, 0, 0, 0, 1 << 16];
        Self {
            gm_type: [GmType::Identity; NUM_REF_FRAMES],
            gm_params: [identity; NUM_REF_FRAMES],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentationParams {
    pub enabled: bool,
    pub update_map: bool,
    pub temporal_update: bool,
    pub update_data: bool,
    pub feature_enabled: [[bool; SEG_LVL_MAX]; MAX_SEGMENTS],
    pub feature_data: [[i16; SEG_LVL_MAX]; MAX_SEGMENTS],
    pub seg_id_pre_skip: bool,
    pub last_active_seg_id: u8,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QuantizationParams {
    pub base_q_idx: u8,
    pub delta_q_y_dc: i8,
    pub delta_q_u_dc: i8,
    pub delta_q_u_ac: i8,
    pub delta_q_v_dc: i8,
    pub delta_q_v_ac: i8,
    pub using_qmatrix: bool,
    pub qm_y: u8,
    pub qm_u: u8,
    pub qm_v: u8,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DeltaQParams {
    pub present: bool,
    pub res: u8,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DeltaLfParams {
    pub present: bool,
    pub res: u8,
    pub multi: bool,
}

/// Retained verbatim for `ReconOps`; not interpreted by the symbol/block core.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LoopFilterParams {
    pub level: [u8; 4],
    pub sharpness: u8,
    pub delta_enabled: bool,
    pub ref_deltas: [i8; TOTAL_REFS_PER_FRAME],
    pub mode_deltas: [i8; 2],
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CdefParams {
    pub damping: u8,
    pub bits: u8,
    pub y_pri: [u8; 8],
    pub y_sec: [u8; 8],
    pub uv_pri: [u8; 8],
    pub uv_sec: [u8; 8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestorationType {
    None,
    Switchable,
    Wiener,
    Sgrproj,
}

impl Default for RestorationType {
    fn default() -> Self {
        RestorationType::None
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LoopRestorationParams {
    pub types: [RestorationType; 3],
    pub unit_size: [u32; 3],
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SkipModeParams {
    pub present: bool,
    pub frame: [u8; 2],
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TileInfoHeader {
    pub cols_log2: u8,
    pub rows_log2: u8,
    pub cols: u32,
    pub rows: u32,
    pub context_update_tile_id: u32,
    pub tile_size_bytes: u8,
}

/// Per-reference-slot state the frame header consults to resolve
/// `frame_size_with_refs`/`found_ref` (AV1 spec Section 7.20). Maintained by
/// the frame pipeline across frames; a freshly-opened decoder starts every
/// slot invalid.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefSlotState {
    pub valid: bool,
    pub frame_id: u32,
    pub upscaled_width: u32,
    pub frame_height: u32,
    pub render_width: u32,
    pub render_height: u32,
    pub order_hint: u32,
    pub frame_type: Option<FrameType>,
}

#[derive(Debug, Clone)]
pub struct FrameHeader {
    pub frame_type: FrameType,
    pub show_frame: bool,
    pub showable_frame: bool,
    pub show_existing_frame: bool,
    pub frame_to_show_map_idx: Option<u8>,
    pub error_resilient_mode: bool,
    pub disable_cdf_update: bool,
    pub allow_screen_content_tools: bool,
    pub force_integer_mv: bool,
    pub current_frame_id: u32,
    pub order_hint: u32,
    pub primary_ref_frame: u8,
    pub refresh_frame_flags: u8,
    pub ref_frame_idx: [i8; REFS_PER_FRAME],
    pub allow_high_precision_mv: bool,
    pub interpolation_filter: InterpolationFilter,
    pub is_motion_mode_switchable: bool,
    pub use_ref_frame_mvs: bool,
    pub disable_frame_end_update_cdf: bool,
    pub allow_intrabc: bool,
    pub frame_width: u32,
    pub frame_height: u32,
    pub upscaled_width: u32,
    pub render_width: u32,
    pub render_height: u32,
    pub superres_denom: u8,
    pub tile_info: TileInfoHeader,
    pub quantization_params: QuantizationParams,
    pub segmentation_params: SegmentationParams,
    pub delta_q_params: DeltaQParams,
    pub delta_lf_params: DeltaLfParams,
    pub tx_mode: TxMode,
    pub reference_select: bool,
    pub skip_mode_params: SkipModeParams,
    pub allow_warped_motion: bool,
    pub reduced_tx_set: bool,
    pub global_motion_params: GlobalMotionParams,
    pub loop_filter_params: LoopFilterParams,
    pub cdef_params: CdefParams,
    pub lr_params: LoopRestorationParams,
    pub header_size_bytes: usize,
}

const SUPERRES_NUM: u8 = 8;
const SUPERRES_DENOM_MIN: u8 = 9;
const SUPERRES_DENOM_BITS: u8 = 3;

pub fn parse_frame_header(
    data: &[u8],
    seq: &SequenceHeader,
    refs: &[RefSlotState; NUM_REF_FRAMES],
) -> Result<FrameHeader> {
    let mut r = BitReader::new(data);

    let id_len = seq
        .additional_frame_id_length_minus_1
        .zip(seq.delta_frame_id_length_minus_2)
        .map(|(a, d)| a as u32 + 1 + d as u32 + 2);

    let all_frames = (1u16 << NUM_REF_FRAMES) - 1;

    if seq.reduced_still_picture_header {
        let frame_type = FrameType::Key;
        let show_frame = true;
        let showable_frame = false;
        let error_resilient_mode = true;

        let (frame_width, frame_height, upscaled_width, render_width, render_height, superres_denom) =
            frame_size_no_refs(&mut r, seq, None)?;

        let tile_info = parse_tile_info(&mut r, seq, frame_width, frame_height)?;
        let quantization_params = parse_quantization_params(&mut r, seq)?;
        let segmentation_params = SegmentationParams::default();
        let delta_q_params = DeltaQParams { present: false, res: 0 };
        let delta_lf_params = DeltaLfParams::default();

        let (loop_filter_params, cdef_params, lr_params) =
            parse_filter_chain(&mut r, seq, frame_width, frame_height, &segmentation_params, &delta_q_params)?;

        let tx_mode = parse_tx_mode(&mut r, quantization_params.base_q_idx);
        let reduced_tx_set = r.read_bit();

        let header_size_bytes = byte_aligned_len(&r);

        return Ok(FrameHeader {
            frame_type,
            show_frame,
            showable_frame,
            show_existing_frame: false,
            frame_to_show_map_idx: None,
            error_resilient_mode,
            disable_cdf_update: false,
            allow_screen_content_tools: false,
            force_integer_mv: true,
            current_frame_id: 0,
            order_hint: 0,
            primary_ref_frame: 7,
            refresh_frame_flags: all_frames as u8,
            ref_frame_idx: [-1; REFS_PER_FRAME],
            allow_high_precision_mv: false,
            interpolation_filter: InterpolationFilter::EightTap,
            is_motion_mode_switchable: false,
            use_ref_frame_mvs: false,
            disable_frame_end_update_cdf: true,
            allow_intrabc: false,
            frame_width,
            frame_height,
            upscaled_width,
            render_width,
            render_height,
            superres_denom,
            tile_info,
            quantization_params,
            segmentation_params,
            delta_q_params,
            delta_lf_params,
            tx_mode,
            reference_select: false,
            skip_mode_params: SkipModeParams::default(),
            allow_warped_motion: false,
            reduced_tx_set,
            global_motion_params: GlobalMotionParams::default(),
            loop_filter_params,
            cdef_params,
            lr_params,
            header_size_bytes,
        });
    }

    let show_existing_frame = r.read_bit();
    if show_existing_frame {
        let frame_to_show_map_idx = r.read_bits(3) as u8;
        if seq.decoder_model_info.is_some() {
            // temporal_point_info, skipped for byte alignment purposes.
            let n = seq
                .decoder_model_info
                .as_ref()
                .map(|d| d.frame_presentation_time_length_minus_1 as u64 + 1)
                .unwrap_or(0);
            r.skip_bits(n);
        }
        if seq.frame_id_numbers_present {
            if let Some(len) = id_len {
                r.skip_bits(len as u64);
            }
        }
        let shown = &refs[frame_to_show_map_idx as usize];
        let frame_type = shown.frame_type.unwrap_or(FrameType::Key);

        return Ok(FrameHeader {
            frame_type,
            show_frame: true,
            showable_frame: frame_type != FrameType::Key,
            show_existing_frame: true,
            frame_to_show_map_idx: Some(frame_to_show_map_idx),
            error_resilient_mode: false,
            disable_cdf_update: false,
            allow_screen_content_tools: false,
            force_integer_mv: false,
            current_frame_id: shown.frame_id,
            order_hint: shown.order_hint,
            primary_ref_frame: 7,
            refresh_frame_flags: if frame_type == FrameType::Key { all_frames as u8 } else { 0 },
            ref_frame_idx: [-1; REFS_PER_FRAME],
            allow_high_precision_mv: false,
            interpolation_filter: InterpolationFilter::EightTap,
            is_motion_mode_switchable: false,
            use_ref_frame_mvs: false,
            disable_frame_end_update_cdf: true,
            allow_intrabc: false,
            frame_width: shown.upscaled_width,
            frame_height: shown.frame_height,
            upscaled_width: shown.upscaled_width,
            render_width: shown.render_width,
            render_height: shown.render_height,
            superres_denom: SUPERRES_NUM,
            tile_info: TileInfoHeader::default(),
            quantization_params: QuantizationParams::default(),
            segmentation_params: SegmentationParams::default(),
            delta_q_params: DeltaQParams::default(),
            delta_lf_params: DeltaLfParams::default(),
            tx_mode: TxMode::Largest,
            reference_select: false,
            skip_mode_params: SkipModeParams::default(),
            allow_warped_motion: false,
            reduced_tx_set: false,
            global_motion_params: GlobalMotionParams::default(),
            loop_filter_params: LoopFilterParams::default(),
            cdef_params: CdefParams::default(),
            lr_params: LoopRestorationParams::default(),
            header_size_bytes: byte_aligned_len(&r),
        });
    }

    let frame_type = FrameType::from_bits(r.read_bits(2))?;
    let show_frame = r.read_bit();

    let showable_frame = if show_frame {
        frame_type != FrameType::Key
    } else {
        r.read_bit()
    };

    let error_resilient_mode = if frame_type == FrameType::Switch
        || (frame_type == FrameType::Key && show_frame)
    {
        true
    } else {
        r.read_bit()
    };

    let disable_cdf_update = r.read_bit();

    let allow_screen_content_tools = if seq.seq_force_screen_content_tools == 2 {
        r.read_bit()
    } else {
        seq.seq_force_screen_content_tools != 0
    };

    let force_integer_mv = if allow_screen_content_tools {
        if seq.seq_force_integer_mv == 2 {
            r.read_bit()
        } else {
            seq.seq_force_integer_mv != 0
        }
    } else {
        false
    };
    let force_integer_mv = force_integer_mv || frame_type.is_intra_only();

    let current_frame_id = if seq.frame_id_numbers_present {
        id_len.map(|n| r.read_bits_u64(n.min(32) as u8) as u32).unwrap_or(0)
    } else {
        0
    };

    let frame_size_override_flag = if frame_type == FrameType::Switch {
        true
    } else if seq.reduced_still_picture_header {
        false
    } else {
        r.read_bit()
    };

    let order_hint = seq
        .order_hint_bits_minus_1
        .map(|bits| r.read_bits(bits + 1))
        .unwrap_or(0);

    let primary_ref_frame = if frame_type.is_intra_only() || error_resilient_mode {
        7u8
    } else {
        r.read_bits(3) as u8
    };

    if let Some(dmi) = &seq.decoder_model_info {
        let buffer_removal_time_present = r.read_bit();
        if buffer_removal_time_present {
            for _ in 0..seq.operating_points.len() {
                // Per-operating-point decoder_model_present_for_this_op gates
                // this in the full spec; simplified to the common single-OP case.
                r.skip_bits(dmi.buffer_removal_time_length_minus_1 as u64 + 1);
            }
        }
    }

    let mut refresh_frame_flags = if frame_type == FrameType::Switch
        || (frame_type == FrameType::Key && show_frame)
    {
        all_frames as u8
    } else {
        r.read_bits(8) as u8
    };

    if (!frame_type.is_intra_only() || refresh_frame_flags != all_frames as u8) && error_resilient_mode && seq.enable_order_hint {
        for _ in 0..NUM_REF_FRAMES {
            r.read_bits(seq.order_hint_bits_minus_1.map(|b| b + 1).unwrap_or(0));
        }
    }

    let mut ref_frame_idx = [-1i8; REFS_PER_FRAME];
    let mut allow_high_precision_mv = false;
    let mut interpolation_filter = InterpolationFilter::EightTap;
    let mut is_motion_mode_switchable = false;
    let mut use_ref_frame_mvs = false;
    let mut allow_intrabc = false;

    let (frame_width, frame_height, upscaled_width, render_width, render_height, superres_denom);

    if frame_type.is_intra_only() {
        let (w, h, uw, rw, rh, sd) = frame_size_no_refs(&mut r, seq, Some(frame_size_override_flag))?;
        frame_width = w;
        frame_height = h;
        upscaled_width = uw;
        render_width = rw;
        render_height = rh;
        superres_denom = sd;

        if allow_screen_content_tools && upscaled_width == frame_width {
            allow_intrabc = r.read_bit();
        }
    } else {
        let frame_refs_short_signaling = if seq.enable_order_hint { r.read_bit() } else { false };
        if frame_refs_short_signaling {
            r.skip_bits(6); // last_frame_idx(3) + gold_frame_idx(3)
        }
        for i in 0..REFS_PER_FRAME {
            if !frame_refs_short_signaling {
                ref_frame_idx[i] = r.read_bits(3) as i8;
            }
            if seq.frame_id_numbers_present {
                r.skip_bits(seq.delta_frame_id_length_minus_2.map(|d| d as u64 + 2).unwrap_or(0));
            }
        }

        let (w, h, uw, rw, rh, sd) = if frame_size_override_flag && !error_resilient_mode {
            frame_size_with_refs(&mut r, seq, &ref_frame_idx, refs)?
        } else {
            frame_size_no_refs(&mut r, seq, Some(frame_size_override_flag))?
        };
        frame_width = w;
        frame_height = h;
        upscaled_width = uw;
        render_width = rw;
        render_height = rh;
        superres_denom = sd;

        allow_high_precision_mv = if force_integer_mv { false } else { r.read_bit() };
        interpolation_filter = if r.read_bit() {
            InterpolationFilter::Switchable
        } else {
            InterpolationFilter::from_bits(r.read_bits(2))
        };
        is_motion_mode_switchable = r.read_bit();
        use_ref_frame_mvs = if error_resilient_mode || !seq.enable_ref_frame_mvs { false } else { r.read_bit() };
    }

    let disable_frame_end_update_cdf = if seq.reduced_still_picture_header || disable_cdf_update {
        true
    } else {
        r.read_bit()
    };

    let tile_info = parse_tile_info(&mut r, seq, frame_width, frame_height)?;
    let quantization_params = parse_quantization_params(&mut r, seq)?;
    let segmentation_params = parse_segmentation_params(&mut r, primary_ref_frame)?;
    let delta_q_params = parse_delta_q_params(&mut r, quantization_params.base_q_idx);
    let delta_lf_params = parse_delta_lf_params(&mut r, delta_q_params.present, allow_intrabc);

    let (loop_filter_params, cdef_params, lr_params) = parse_filter_chain(
        &mut r,
        seq,
        frame_width,
        frame_height,
        &segmentation_params,
        &delta_q_params,
    )?;

    let tx_mode = parse_tx_mode(&mut r, quantization_params.base_q_idx);

    let reference_select = if frame_type.is_intra_only() { false } else { r.read_bit() };

    let skip_mode_params =
        parse_skip_mode_params(&mut r, seq, frame_type, reference_select, order_hint, &ref_frame_idx, refs);

    let allow_warped_motion = if frame_type.is_intra_only() || error_resilient_mode || !seq.enable_warped_motion {
        false
    } else {
        r.read_bit()
    };

    let reduced_tx_set = r.read_bit();

    let global_motion_params = parse_global_motion_params(&mut r, frame_type, allow_high_precision_mv);

    let header_size_bytes = byte_aligned_len(&r);

    Ok(FrameHeader {
        frame_type,
        show_frame,
        showable_frame,
        show_existing_frame: false,
        frame_to_show_map_idx: None,
        error_resilient_mode,
        disable_cdf_update,
        allow_screen_content_tools,
        force_integer_mv,
        current_frame_id,
        order_hint,
        primary_ref_frame,
        refresh_frame_flags: {
            if frame_type == FrameType::Key && !show_frame {
                refresh_frame_flags = all_frames as u8;
            }
            refresh_frame_flags
        },
        ref_frame_idx,
        allow_high_precision_mv,
        interpolation_filter,
        is_motion_mode_switchable,
        use_ref_frame_mvs,
        disable_frame_end_update_cdf,
        allow_intrabc,
        frame_width,
        frame_height,
        upscaled_width,
        render_width,
        render_height,
        superres_denom,
        tile_info,
        quantization_params,
        segmentation_params,
        delta_q_params,
        delta_lf_params,
        tx_mode,
        reference_select,
        skip_mode_params,
        allow_warped_motion,
        reduced_tx_set,
        global_motion_params,
        loop_filter_params,
        cdef_params,
        lr_params,
        header_size_bytes,
    })
}

fn byte_aligned_len(r: &BitReader) -> usize {
    r.byte_position() + if r.position() % 8 != 0 { 1 } else { 0 }
}

fn superres_params(r: &mut BitReader, seq: &SequenceHeader, frame_width: u32) -> (u32, u8) {
    let use_superres = if seq.enable_superres { r.read_bit() } else { false };
    let denom = if use_superres { r.read_bits(SUPERRES_DENOM_BITS) as u8 + SUPERRES_DENOM_MIN } else { SUPERRES_NUM };
    let upscaled_width = frame_width;
    let downscaled_width = (upscaled_width * SUPERRES_NUM as u32 + (denom as u32 / 2)) / denom as u32;
    (downscaled_width.max(1), denom)
}

fn parse_frame_size(r: &mut BitReader, seq: &SequenceHeader, frame_size_override_flag: bool) -> (u32, u32) {
    if frame_size_override_flag {
        let w = r.read_bits(seq.frame_width_bits_minus_1 + 1) + 1;
        let h = r.read_bits(seq.frame_height_bits_minus_1 + 1) + 1;
        (w, h)
    } else {
        (seq.max_frame_width, seq.max_frame_height)
    }
}

fn parse_render_size(r: &mut BitReader, upscaled_width: u32, frame_height: u32) -> (u32, u32) {
    let render_and_frame_size_different = r.read_bit();
    if render_and_frame_size_different {
        let rw = r.read_bits(16) + 1;
        let rh = r.read_bits(16) + 1;
        (rw, rh)
    } else {
        (upscaled_width, frame_height)
    }
}

fn frame_size_no_refs(
    r: &mut BitReader,
    seq: &SequenceHeader,
    frame_size_override_flag: Option<bool>,
) -> Result<(u32, u32, u32, u32, u32, u8)> {
    let (frame_width, frame_height) = parse_frame_size(r, seq, frame_size_override_flag.unwrap_or(false));
    let (downscaled_width, superres_denom) = superres_params(r, seq, frame_width);
    let (render_width, render_height) = parse_render_size(r, frame_width, frame_height);
    Ok((downscaled_width, frame_height, frame_width, render_width, render_height, superres_denom))
}

fn frame_size_with_refs(
    r: &mut BitReader,
    seq: &SequenceHeader,
    ref_frame_idx: &[i8; REFS_PER_FRAME],
    refs: &[RefSlotState; NUM_REF_FRAMES],
) -> Result<(u32, u32, u32, u32, u32, u8)> {
    let mut found = None;
    for &idx in ref_frame_idx.iter() {
        if r.read_bit() {
            found = Some(idx);
            break;
        }
    }

    if let Some(idx) = found {
        if idx < 0 {
            return Err(Av1Error::ReferenceMissing(0));
        }
        let slot = &refs[idx as usize];
        let (downscaled_width, superres_denom) = superres_params(r, seq, slot.upscaled_width);
        Ok((
            downscaled_width,
            slot.frame_height,
            slot.upscaled_width,
            slot.render_width,
            slot.render_height,
            superres_denom,
        ))
    } else {
        frame_size_no_refs(r, seq, Some(true))
    }
}

fn parse_tile_info(r: &mut BitReader, seq: &SequenceHeader, frame_width: u32, frame_height: u32) -> Result<TileInfoHeader> {
    let sb_size = if seq.use_128x128_superblock { 128 } else { 64 };
    let sb_cols = frame_width.div_ceil(sb_size);
    let sb_rows = frame_height.div_ceil(sb_size);
    let sb_shift = if seq.use_128x128_superblock { 5 } else { 6 };
    let max_tile_width_sb = 4096 >> sb_shift;
    let max_tile_area_sb = (4096u64 * 2304) >> (2 * sb_shift);

    let min_log2_tile_cols = tile_log2(max_tile_width_sb, sb_cols);
    let max_log2_tile_cols = tile_log2(1, sb_cols.min(64));
    let max_log2_tile_rows = tile_log2(1, sb_rows.min(64));
    let min_log2_tiles = min_log2_tile_cols.max(tile_log2(
        max_tile_area_sb as u32 / sb_rows.max(1),
        sb_cols,
    ));

    let uniform_tile_spacing_flag = r.read_bit();
    let (cols_log2, rows_log2, cols, rows);

    if uniform_tile_spacing_flag {
        let mut log2_cols = min_log2_tile_cols;
        while log2_cols < max_log2_tile_cols && r.read_bit() {
            log2_cols += 1;
        }
        let min_log2_tile_rows = min_log2_tiles.saturating_sub(log2_cols);
        let mut log2_rows = min_log2_tile_rows;
        while log2_rows < max_log2_tile_rows && r.read_bit() {
            log2_rows += 1;
        }
        cols_log2 = log2_cols;
        rows_log2 = log2_rows;
        cols = sb_cols.div_ceil(1 << cols_log2).max(1);
        rows = sb_rows.div_ceil(1 << rows_log2).max(1);
    } else {
        let mut widest = 0u32;
        let mut start = 0u32;
        let mut count = 0u32;
        while start < sb_cols {
            let max_width = (sb_cols - start).min(max_tile_width_sb);
            let size_sb = r.get_uniform(max_width) + 1;
            widest = widest.max(size_sb);
            start += size_sb;
            count += 1;
        }
        cols_log2 = tile_log2(1, count);
        cols = count;

        let max_tile_area = if widest > 0 { (max_tile_area_sb as u32 / widest).max(1) } else { 1 };
        let mut start_r = 0u32;
        let mut count_r = 0u32;
        while start_r < sb_rows {
            let max_height = (sb_rows - start_r).min(max_tile_area);
            let size_sb = r.get_uniform(max_height) + 1;
            start_r += size_sb;
            count_r += 1;
        }
        rows_log2 = tile_log2(1, count_r);
        rows = count_r;
    }

    let (context_update_tile_id, tile_size_bytes) = if cols_log2 > 0 || rows_log2 > 0 {
        let id = r.read_bits(cols_log2 + rows_log2);
        let bytes = r.read_bits(2) as u8 + 1;
        (id, bytes)
    } else {
        (0, 1)
    };

    Ok(TileInfoHeader {
        cols_log2: cols_log2 as u8,
        rows_log2: rows_log2 as u8,
        cols,
        rows,
        context_update_tile_id,
        tile_size_bytes,
    })
}

fn tile_log2(blk_size: u32, target: u32) -> u32 {
    let mut k = 0u32;
    while (blk_size.max(1) << k) < target {
        k += 1;
    }
    k
}

fn read_delta_q(r: &mut BitReader) -> i8 {
    if r.read_bit() {
        r.read_su(7) as i8
    } else {
        0
    }
}

fn parse_quantization_params(r: &mut BitReader, seq: &SequenceHeader) -> Result<QuantizationParams> {
    let base_q_idx = r.read_bits(8) as u8;
    let delta_q_y_dc = read_delta_q(r);

    let (delta_q_u_dc, delta_q_u_ac, delta_q_v_dc, delta_q_v_ac) = if seq.color_config.num_planes > 1 {
        let diff_uv_delta = if seq.color_config.separate_uv_delta_q { r.read_bit() } else { false };
        let u_dc = read_delta_q(r);
        let u_ac = read_delta_q(r);
        let (v_dc, v_ac) = if diff_uv_delta { (read_delta_q(r), read_delta_q(r)) } else { (u_dc, u_ac) };
        (u_dc, u_ac, v_dc, v_ac)
    } else {
        (0, 0, 0, 0)
    };

    let using_qmatrix = r.read_bit();
    let (qm_y, qm_u, qm_v) = if using_qmatrix {
        let qm_y = r.read_bits(4) as u8;
        let qm_u = r.read_bits(4) as u8;
        let qm_v = if seq.color_config.separate_uv_delta_q { r.read_bits(4) as u8 } else { qm_u };
        (qm_y, qm_u, qm_v)
    } else {
        (0, 0, 0)
    };

    Ok(QuantizationParams {
        base_q_idx,
        delta_q_y_dc,
        delta_q_u_dc,
        delta_q_u_ac,
        delta_q_v_dc,
        delta_q_v_ac,
        using_qmatrix,
        qm_y,
        qm_u,
        qm_v,
    })
}

fn parse_segmentation_params(r: &mut BitReader, primary_ref_frame: u8) -> Result<SegmentationParams> {
    let enabled = r.read_bit();
    let mut params = SegmentationParams { enabled, ..Default::default() };

    if !enabled {
        return Ok(params);
    }

    if primary_ref_frame == 7 {
        params.update_map = true;
        params.temporal_update = false;
        params.update_data = true;
    } else {
        params.update_map = r.read_bit();
        params.temporal_update = if params.update_map { r.read_bit() } else { false };
        params.update_data = r.read_bit();
    }

    if params.update_data {
        for seg in 0..MAX_SEGMENTS {
            for feature in 0..SEG_LVL_MAX {
                let feature_enabled = r.read_bit();
                params.feature_enabled[seg][feature] = feature_enabled;
                let mut clipped = 0i16;
                if feature_enabled {
                    let bits = SEGMENTATION_FEATURE_BITS[feature];
                    let limit = SEGMENTATION_FEATURE_MAX[feature];
                    if bits > 0 {
                        let value = if SEGMENTATION_FEATURE_SIGNED[feature] {
                            r.read_su(bits) as i16
                        } else {
                            r.read_bits(bits) as i16
                        };
                        clipped = value.clamp(-limit, limit);
                    }
                }
                params.feature_data[seg][feature] = clipped;
            }
        }
    }

    params.seg_id_pre_skip = false;
    params.last_active_seg_id = 0;
    for seg in 0..MAX_SEGMENTS {
        for feature in 0..SEG_LVL_MAX {
            if params.feature_enabled[seg][feature] {
                params.last_active_seg_id = seg as u8;
                if feature >= 5 {
                    params.seg_id_pre_skip = true;
                }
            }
        }
    }

    Ok(params)
}

fn parse_delta_q_params(r: &mut BitReader, base_q_idx: u8) -> DeltaQParams {
    let present = if base_q_idx > 0 { r.read_bit() } else { false };
    let res = if present { r.read_bits(2) as u8 } else { 0 };
    DeltaQParams { present, res }
}

fn parse_delta_lf_params(r: &mut BitReader, delta_q_present: bool, allow_intrabc: bool) -> DeltaLfParams {
    if !delta_q_present {
        return DeltaLfParams::default();
    }
    if allow_intrabc {
        return DeltaLfParams::default();
    }
    let present = r.read_bit();
    if !present {
        return DeltaLfParams { present, res: 0, multi: false };
    }
    let res = r.read_bits(2) as u8;
    let multi = r.read_bit();
    DeltaLfParams { present, res, multi }
}

fn parse_tx_mode(r: &mut BitReader, base_q_idx: u8) -> TxMode {
    let _ = base_q_idx;
    if r.read_bit() { TxMode::Select } else if r.read_bit() { TxMode::Largest } else { TxMode::Only4x4 }
}

fn parse_skip_mode_params(
    r: &mut BitReader,
    seq: &SequenceHeader,
    frame_type: FrameType,
    reference_select: bool,
    order_hint: u32,
    ref_frame_idx: &[i8; REFS_PER_FRAME],
    refs: &[RefSlotState; NUM_REF_FRAMES],
) -> SkipModeParams {
    if frame_type.is_intra_only() || !reference_select || !seq.enable_order_hint {
        return SkipModeParams::default();
    }

    let mut forward_idx = None;
    let mut forward_hint = 0u32;
    let mut backward_idx = None;
    let mut backward_hint = 0u32;

    for (i, &idx) in ref_frame_idx.iter().enumerate() {
        if idx < 0 {
            continue;
        }
        let hint = refs[idx as usize].order_hint;
        if get_relative_dist(hint, order_hint, seq.order_hint_bits_minus_1) < 0 {
            if forward_idx.is_none() || get_relative_dist(hint, forward_hint, seq.order_hint_bits_minus_1) > 0 {
                forward_idx = Some(i);
                forward_hint = hint;
            }
        } else if get_relative_dist(hint, order_hint, seq.order_hint_bits_minus_1) > 0
            && (backward_idx.is_none() || get_relative_dist(hint, backward_hint, seq.order_hint_bits_minus_1) < 0)
        {
            backward_idx = Some(i);
            backward_hint = hint;
        }
    }

    let skip_mode_allowed = forward_idx.is_some() && backward_idx.is_some();
    if !skip_mode_allowed {
        return SkipModeParams::default();
    }

    let present = r.read_bit();
    let frame = if present {
        [forward_idx.unwrap() as u8, backward_idx.unwrap() as u8]
    } else {
        [0, 0]
    };
    SkipModeParams { present, frame }
}

fn get_relative_dist(a: u32, b: u32, order_hint_bits_minus_1: Option<u8>) -> i32 {
    let Some(bits_m1) = order_hint_bits_minus_1 else { return 0 };
    let bits = bits_m1 as u32 + 1;
    let diff = a as i64 - b as i64;
    let m = 1i64 << (bits - 1);
    ((diff & (m - 1)) - (diff & m)) as i32
}

fn parse_global_motion_params(r: &mut BitReader, frame_type: FrameType, allow_high_precision_mv: bool) -> GlobalMotionParams {
    let mut params = GlobalMotionParams::default();
    if frame_type.is_intra_only() {
        return params;
    }

    for ref_idx in 1..NUM_REF_FRAMES {
        let is_global = r.read_bit();
        let gm_type = if !is_global {
            GmType::Identity
        } else if r.read_bit() {
            GmType::RotZoom
        } else if r.read_bit() {
            GmType::Translation
        } else {
            GmType::Affine
        };
        params.gm_type[ref_idx] = gm_type;

        if gm_type as u8 >= GmType::RotZoom as u8 {
            for idx in 2..=3 {
                read_global_param(r, gm_type, idx, allow_high_precision_mv);
            }
            if gm_type == GmType::Affine {
                read_global_param(r, gm_type, 4, allow_high_precision_mv);
                read_global_param(r, gm_type, 5, allow_high_precision_mv);
            }
        }
        if gm_type as u8 >= GmType::Translation as u8 {
            read_global_param(r, gm_type, 0, allow_high_precision_mv);
            read_global_param(r, gm_type, 1, allow_high_precision_mv);
        }
    }

    params
}

/// Consumes the coded `decode_signed_subexp_with_ref_bool` field for one
/// global-motion parameter; values are reconstruction-only, so only the bit
/// position (not the decoded magnitude) matters to this core.
fn read_global_param(r: &mut BitReader, _gm_type: GmType, _idx: u8, allow_high_precision_mv: bool) {
    let precision = if allow_high_precision_mv { 1 << 16 } else { 1 << 15 };
    let _ = r.get_subexp(0, (precision * 2) as u32 + 1);
}

fn parse_filter_chain(
    r: &mut BitReader,
    seq: &SequenceHeader,
    frame_width: u32,
    frame_height: u32,
    seg: &SegmentationParams,
    delta_q: &DeltaQParams,
) -> Result<(LoopFilterParams, CdefParams, LoopRestorationParams)> {
    let _ = (frame_width, frame_height, seg, delta_q);

    let mut lf = LoopFilterParams::default();
    lf.level[0] = r.read_bits(6) as u8;
    lf.level[1] = r.read_bits(6) as u8;
    if seq.color_config.num_planes > 1 && (lf.level[0] > 0 || lf.level[1] > 0) {
        lf.level[2] = r.read_bits(6) as u8;
        lf.level[3] = r.read_bits(6) as u8;
    }
    lf.sharpness = r.read_bits(3) as u8;
    lf.delta_enabled = r.read_bit();
    if lf.delta_enabled {
        let delta_update = r.read_bit();
        if delta_update {
            for d in lf.ref_deltas.iter_mut() {
                if r.read_bit() {
                    *d = r.read_su(6) as i8;
                }
            }
            for d in lf.mode_deltas.iter_mut() {
                if r.read_bit() {
                    *d = r.read_su(6) as i8;
                }
            }
        }
    }

    let mut cdef = CdefParams::default();
    if seq.enable_cdef {
        cdef.damping = r.read_bits(2) as u8 + 3;
        cdef.bits = r.read_bits(2) as u8;
        for i in 0..(1usize << cdef.bits) {
            cdef.y_pri[i] = r.read_bits(4) as u8;
            cdef.y_sec[i] = r.read_bits(2) as u8;
            if cdef.y_sec[i] == 3 {
                cdef.y_sec[i] += 1;
            }
            if seq.color_config.num_planes > 1 {
                cdef.uv_pri[i] = r.read_bits(4) as u8;
                cdef.uv_sec[i] = r.read_bits(2) as u8;
                if cdef.uv_sec[i] == 3 {
                    cdef.uv_sec[i] += 1;
                }
            }
        }
    }

    let mut lr = LoopRestorationParams::default();
    if seq.enable_restoration {
        for plane in 0..seq.color_config.num_planes as usize {
            let kind = r.read_bits(2);
            lr.types[plane] = match kind {
                0 => RestorationType::None,
                1 => RestorationType::Wiener,
                2 => RestorationType::Sgrproj,
                _ => RestorationType::Switchable,
            };
        }
        if lr.types.iter().any(|t| *t != RestorationType::None) {
            let mut shift = r.read_bits(1) + 1;
            if seq.use_128x128_superblock {
                shift += 1;
            } else if shift == 1 {
                shift += r.read_bits(1);
            }
            lr.unit_size[0] = 64u32 << shift;
            if seq.color_config.num_planes > 1
                && (seq.color_config.subsampling_x as u32 & seq.color_config.subsampling_y as u32) != 0
                && lr.types.iter().skip(1).any(|t| *t != RestorationType::None)
            {
                let uv_shift = r.read_bits(1);
                lr.unit_size[1] = lr.unit_size[0] >> uv_shift;
                lr.unit_size[2] = lr.unit_size[1];
            } else {
                lr.unit_size[1] = lr.unit_size[0];
                lr.unit_size[2] = lr.unit_size[0];
            }
        }
    }

    Ok((lf, cdef, lr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::parse_sequence_header;

    fn reduced_seq() -> SequenceHeader {
        // profile=0, still_picture=1, reduced_still_picture_header=1,
        // seq_level_idx=0, frame_width_bits_minus_1=3, frame_height_bits_minus_1=3,
        // width/height=1, all toggles off, film_grain_params_present=1.
        let data = [0x18, 0x0C, 0xC0, 0x00, 0x01, 0, 0, 0];
        parse_sequence_header(&data).unwrap()
    }

    #[test]
    fn test_frame_type_from_bits() {
        assert_eq!(FrameType::from_bits(0).unwrap(), FrameType::Key);
        assert_eq!(FrameType::from_bits(1).unwrap(), FrameType::Inter);
        assert_eq!(FrameType::from_bits(2).unwrap(), FrameType::IntraOnly);
        assert_eq!(FrameType::from_bits(3).unwrap(), FrameType::Switch);
        assert!(FrameType::from_bits(4).is_err());
    }

    #[test]
    fn test_is_intra_only() {
        assert!(FrameType::Key.is_intra_only());
        assert!(!FrameType::Inter.is_intra_only());
    }

    #[test]
    fn test_reduced_still_picture_header_parses_key_frame() {
        let seq = reduced_seq();
        let refs = [RefSlotState::default(); NUM_REF_FRAMES];
        let data = [0u8; 16];
        let hdr = parse_frame_header(&data, &seq, &refs).unwrap();
        assert_eq!(hdr.frame_type, FrameType::Key);
        assert!(hdr.show_frame);
        assert!(hdr.force_integer_mv);
    }

    #[test]
    fn test_tile_log2() {
        assert_eq!(tile_log2(1, 1), 0);
        assert_eq!(tile_log2(1, 2), 1);
        assert_eq!(tile_log2(1, 5), 3);
    }

    #[test]
    fn test_get_relative_dist_wraps() {
        assert_eq!(get_relative_dist(1, 0, Some(6)), 1);
        assert_eq!(get_relative_dist(0, 1, Some(6)), -1);
    }
}
