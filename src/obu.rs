//! AV1 OBU (Open Bitstream Unit) framing.
//!
//! Per AV1 Specification Section 5.3. This layer recognizes just enough of
//! the OBU header to hand the rest of the core a typed byte range per unit;
//! it does not sniff or strip any surrounding container — callers are
//! expected to hand this a concatenation of raw OBUs (see SPEC_FULL.md §1).

use serde::{Deserialize, Serialize};

use crate::bitreader::BitReader;
use crate::error::{Av1Error, Result};
use crate::leb128::decode_uleb128;

/// OBU type codes as defined in the AV1 specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ObuType {
    Reserved0 = 0,
    SequenceHeader = 1,
    TemporalDelimiter = 2,
    FrameHeader = 3,
    TileGroup = 4,
    Metadata = 5,
    Frame = 6,
    RedundantFrameHeader = 7,
    TileList = 8,
    Reserved9 = 9,
    Reserved10 = 10,
    Reserved11 = 11,
    Reserved12 = 12,
    Reserved13 = 13,
    Reserved14 = 14,
    Padding = 15,
}

impl ObuType {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ObuType::Reserved0),
            1 => Ok(ObuType::SequenceHeader),
            2 => Ok(ObuType::TemporalDelimiter),
            3 => Ok(ObuType::FrameHeader),
            4 => Ok(ObuType::TileGroup),
            5 => Ok(ObuType::Metadata),
            6 => Ok(ObuType::Frame),
            7 => Ok(ObuType::RedundantFrameHeader),
            8 => Ok(ObuType::TileList),
            9 => Ok(ObuType::Reserved9),
            10 => Ok(ObuType::Reserved10),
            11 => Ok(ObuType::Reserved11),
            12 => Ok(ObuType::Reserved12),
            13 => Ok(ObuType::Reserved13),
            14 => Ok(ObuType::Reserved14),
            15 => Ok(ObuType::Padding),
            _ => Err(Av1Error::InvalidObuType(value)),
        }
    }

    /// True for OBU types that carry frame data the core needs to decode:
    /// a fused `Frame` (header + tiles), a standalone `FrameHeader`, or a
    /// `TileGroup` belonging to a preceding header.
    pub fn has_frame_data(&self) -> bool {
        matches!(
            self,
            ObuType::Frame | ObuType::FrameHeader | ObuType::TileGroup
        )
    }
}

impl std::fmt::Display for ObuType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ObuType::Reserved0 | ObuType::Reserved9 | ObuType::Reserved10
            | ObuType::Reserved11 | ObuType::Reserved12 | ObuType::Reserved13
            | ObuType::Reserved14 => "RESERVED",
            ObuType::SequenceHeader => "SEQUENCE_HEADER",
            ObuType::TemporalDelimiter => "TEMPORAL_DELIMITER",
            ObuType::FrameHeader => "FRAME_HEADER",
            ObuType::TileGroup => "TILE_GROUP",
            ObuType::Metadata => "METADATA",
            ObuType::Frame => "FRAME",
            ObuType::RedundantFrameHeader => "REDUNDANT_FRAME_HEADER",
            ObuType::TileList => "TILE_LIST",
            ObuType::Padding => "PADDING",
        };
        write!(f, "{name}")
    }
}

/// OBU header fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObuHeader {
    pub obu_type: ObuType,
    pub has_extension: bool,
    pub has_size: bool,
    pub temporal_id: u8,
    pub spatial_id: u8,
    /// Header size in bytes (1, or 2 with an extension byte).
    pub header_size: usize,
}

/// A single framed OBU: header plus the byte range of its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Obu {
    pub header: ObuHeader,
    /// Payload size in bytes (excludes header and size field).
    pub payload_size: u64,
    /// Total OBU size in bytes (header + size field + payload).
    pub total_size: u64,
    /// Byte offset of this OBU's header within the stream that was parsed.
    pub offset: u64,
    #[serde(skip)]
    pub payload: Vec<u8>,
}

/// Parses a single `obu_header()` at the start of `data`.
pub fn parse_obu_header(data: &[u8]) -> Result<ObuHeader> {
    if data.is_empty() {
        return Err(Av1Error::UnexpectedEof(0));
    }

    let mut reader = BitReader::new(data);
    let forbidden_bit = reader.get(1);
    if forbidden_bit != 0 {
        return Err(Av1Error::invalid_bitstream(0, "obu_forbidden_bit must be 0"));
    }
    let obu_type = ObuType::from_u8(reader.get(4) as u8)?;
    let has_extension = reader.get(1) != 0;
    let has_size = reader.get(1) != 0;
    let _reserved = reader.get(1);

    let (temporal_id, spatial_id, header_size) = if has_extension {
        let temporal_id = reader.get(3) as u8;
        let spatial_id = reader.get(2) as u8;
        let _reserved3 = reader.get(3);
        (temporal_id, spatial_id, 2)
    } else {
        (0, 0, 1)
    };

    Ok(ObuHeader {
        obu_type,
        has_extension,
        has_size,
        temporal_id,
        spatial_id,
        header_size,
    })
}

/// Parses every OBU in `data` in order, returning their framed byte ranges
/// with payload bytes attached. Stops (returning what was parsed so far is
/// an error; AV1 requires a well-formed OBU sequence) on the first
/// malformed unit.
pub fn parse_all_obus(data: &[u8]) -> Result<Vec<Obu>> {
    let mut obus = Vec::new();
    let mut offset: u64 = 0;

    while (offset as usize) < data.len() {
        let remaining = &data[offset as usize..];
        let header = parse_obu_header(remaining)?;
        let mut cursor = header.header_size;

        let (payload_size, size_field_len) = if header.has_size {
            let (size, len) = decode_uleb128(&remaining[cursor..])?;
            (size, len)
        } else {
            (remaining.len() as u64 - cursor as u64, 0)
        };
        cursor += size_field_len;

        let payload_end = cursor + payload_size as usize;
        if payload_end > remaining.len() {
            return Err(Av1Error::invalid_bitstream(
                offset,
                format!(
                    "OBU payload_size {payload_size} exceeds remaining {} bytes",
                    remaining.len() - cursor
                ),
            ));
        }

        let payload = remaining[cursor..payload_end].to_vec();
        let total_size = payload_end as u64;

        tracing::trace!(
            obu_type = %header.obu_type,
            offset,
            total_size,
            "parsed OBU"
        );

        obus.push(Obu {
            header,
            payload_size,
            total_size,
            offset,
            payload,
        });

        offset += total_size;
    }

    Ok(obus)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_obu_type_values() {
        assert_eq!(ObuType::from_u8(1).unwrap(), ObuType::SequenceHeader);
        assert_eq!(ObuType::from_u8(2).unwrap(), ObuType::TemporalDelimiter);
        assert_eq!(ObuType::from_u8(3).unwrap(), ObuType::FrameHeader);
        assert_eq!(ObuType::from_u8(4).unwrap(), ObuType::TileGroup);
        assert_eq!(ObuType::from_u8(6).unwrap(), ObuType::Frame);
        assert_eq!(ObuType::from_u8(15).unwrap(), ObuType::Padding);
    }

    #[test]
    fn test_parse_obu_header_no_extension() {
        // type=2 (TD), no extension, has_size=1
        let byte = 0b0_0010_0_1_0u8;
        let data = [byte];
        let header = parse_obu_header(&data).unwrap();
        assert_eq!(header.obu_type, ObuType::TemporalDelimiter);
        assert!(!header.has_extension);
        assert!(header.has_size);
        assert_eq!(header.header_size, 1);
    }

    #[test]
    fn test_parse_obu_header_with_extension() {
        // type=1 (seq header), has_extension=1, has_size=1
        let byte0 = 0b0_0001_1_1_0u8;
        let byte1 = 0b010_01_000u8; // temporal_id=2, spatial_id=1
        let data = [byte0, byte1];
        let header = parse_obu_header(&data).unwrap();
        assert_eq!(header.obu_type, ObuType::SequenceHeader);
        assert!(header.has_extension);
        assert_eq!(header.temporal_id, 2);
        assert_eq!(header.spatial_id, 1);
        assert_eq!(header.header_size, 2);
    }

    #[test]
    fn test_parse_all_obus_two_units() {
        // TD: type=2, no ext, has_size=1, size=0
        let td = [0b0_0010_0_1_0u8, 0x00];
        // Padding: type=15, no ext, has_size=1, size=2, payload [0xAB, 0xCD]
        let pad = [0b0_1111_0_1_0u8, 0x02, 0xAB, 0xCD];
        let mut data = Vec::new();
        data.extend_from_slice(&td);
        data.extend_from_slice(&pad);

        let obus = parse_all_obus(&data).unwrap();
        assert_eq!(obus.len(), 2);
        assert_eq!(obus[0].header.obu_type, ObuType::TemporalDelimiter);
        assert_eq!(obus[0].payload_size, 0);
        assert_eq!(obus[1].header.obu_type, ObuType::Padding);
        assert_eq!(obus[1].payload, vec![0xAB, 0xCD]);
    }

    #[test]
    fn test_parse_all_obus_truncated_payload_errors() {
        // Claims payload_size=10 but only 1 byte follows.
        let data = [0b0_1111_0_1_0u8, 0x0A, 0x00];
        assert!(parse_all_obus(&data).is_err());
    }
}
