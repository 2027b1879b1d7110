//! av1-core: frame-level AV1 bitstream parser and block-decoding pipeline.
//!
//! Parses OBUs, sequence/frame headers, and tile groups; drives the
//! partition/block-parsing descent over MSAC-coded symbols; schedules tile
//! and pass work across OS threads; and hands pixel-domain reconstruction
//! to an externally supplied [`recon::ReconOps`]. This crate does not
//! decode pixels itself, sniff container formats, or implement a CLI/muxer
//! — see `SPEC_FULL.md` §1 for the exact boundary.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use av1_core::{config::DecoderConfig, pipeline::FramePipeline, recon::NullReconOps};
//!
//! let pipeline = FramePipeline::new(DecoderConfig::default(), Arc::new(NullReconOps));
//! let obu_stream: &[u8] = &[]; // raw OBU concatenation, no container framing
//! pipeline.submit_temporal_unit(obu_stream).ok();
//! ```

pub mod bitreader;
pub mod block;
pub mod config;
pub mod context;
pub mod error;
pub mod frame_header;
pub mod leb128;
pub mod obu;
pub mod picture;
pub mod pipeline;
pub mod recon;
pub mod sequence;
pub mod symbol;
pub mod tile;
pub mod types;

pub use bitreader::BitReader;
pub use config::{DecoderConfig, PictureAllocator};
pub use error::{Av1Error, Result};
pub use frame_header::{parse_frame_header, FrameHeader, FrameType, RefSlotState};
pub use leb128::{decode_uleb128, encode_uleb128};
pub use obu::{parse_all_obus, parse_obu_header, Obu, ObuHeader, ObuType};
pub use picture::{OutputQueue, Picture, PictureParams};
pub use pipeline::FramePipeline;
pub use recon::{EdgeFlags, NullReconOps, ReconOps};
pub use sequence::{parse_sequence_header, Av1Profile, ColorConfig, SequenceHeader};
pub use symbol::{ArithmeticDecoder, CdfContext, SymbolDecoder};
pub use tile::{setup_tile, slice_tile_group, DecodePass, FrameParseFlags, SuperblockSize, TileInfo, TileSlot};
