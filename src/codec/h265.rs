//! HEVC elementary-stream decoding: NAL classification and an SPS
//! dimensions skeleton.

use bytes::Bytes;

use super::{AnnexBSplitter, EsDecoder};
use crate::error::Result;
use crate::node::{Anomaly, Node};
use crate::pes::PesUnit;
use crate::utils::BitReader;

// nal_unit_type values (6 bits of the first header byte).
const NAL_VPS: u8 = 32;
const NAL_SPS: u8 = 33;
const NAL_PPS: u8 = 34;
const NAL_AUD: u8 = 35;
const NAL_PREFIX_SEI: u8 = 39;
const NAL_SUFFIX_SEI: u8 = 40;

fn nal_type_name(nal_type: u8) -> &'static str {
    match nal_type {
        0..=9 => "trailing picture slice",
        16..=21 => "IRAP slice",
        NAL_VPS => "video parameter set",
        NAL_SPS => "sequence parameter set",
        NAL_PPS => "picture parameter set",
        NAL_AUD => "access unit delimiter",
        NAL_PREFIX_SEI => "prefix SEI",
        NAL_SUFFIX_SEI => "suffix SEI",
        _ => "other",
    }
}

#[derive(Debug, Clone)]
pub struct HevcSpsInfo {
    pub sps_id: u64,
    pub chroma_format_idc: u64,
    pub width: u32,
    pub height: u32,
}

pub struct H265Decoder {
    splitter: AnnexBSplitter,
    sps: Option<HevcSpsInfo>,
}

impl H265Decoder {
    pub fn new() -> Self {
        Self {
            splitter: AnnexBSplitter::new(),
            sps: None,
        }
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.sps.as_ref().map(|sps| (sps.width, sps.height))
    }

    fn nal_to_node(&mut self, nal: Bytes) -> Node {
        if nal.len() < 2 {
            return Node::new("NAL_unit").anomaly(Anomaly::Truncated);
        }
        // Two-byte header: forbidden bit, 6-bit type, layer id, TID.
        let nal_type = (nal[0] >> 1) & 0x3F;
        let temporal_id_plus1 = nal[1] & 0x07;
        let mut node = Node::new("NAL_unit")
            .value(nal_type)
            .note(nal_type_name(nal_type))
            .child(Node::leaf("nuh_temporal_id_plus1", temporal_id_plus1));

        if nal_type == NAL_SPS {
            match parse_sps(&strip_emulation_prevention(&nal[2..])) {
                Ok(sps) => {
                    node.push(
                        Node::new("seq_parameter_set")
                            .child(Node::leaf("sps_id", sps.sps_id))
                            .child(Node::leaf("chroma_format_idc", sps.chroma_format_idc))
                            .child(Node::leaf("width", sps.width))
                            .child(Node::leaf("height", sps.height)),
                    );
                    self.sps = Some(sps);
                }
                Err(e) => {
                    log::debug!("undecodable HEVC SPS: {}", e);
                    node.anomalies.push(Anomaly::Truncated);
                }
            }
        }
        node
    }
}

impl Default for H265Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EsDecoder for H265Decoder {
    fn feed(&mut self, pes: &PesUnit) -> Vec<Node> {
        self.splitter
            .push(&pes.payload)
            .into_iter()
            .map(|nal| self.nal_to_node(nal))
            .collect()
    }

    fn finish(&mut self) -> Vec<Node> {
        self.splitter
            .flush()
            .map(|nal| self.nal_to_node(nal))
            .into_iter()
            .collect()
    }
}

fn strip_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if i + 2 < data.len() && data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x03 {
            out.push(0x00);
            out.push(0x00);
            i += 3;
            continue;
        }
        out.push(data[i]);
        i += 1;
    }
    out
}

/// Dimensions skeleton: profile_tier_level is skipped wholesale, only
/// the fields up to the luma sizes are decoded.
fn parse_sps(data: &[u8]) -> Result<HevcSpsInfo> {
    let mut reader = BitReader::new(data);

    reader.skip_bits(4)?; // sps_video_parameter_set_id
    let max_sub_layers_minus1 = reader.read_bits(3)?;
    reader.read_bit()?; // sps_temporal_id_nesting_flag

    // profile_tier_level: 12 fixed bytes for the general level, then
    // per-sub-layer presence flags padded to a byte, then 11 bytes per
    // present sub-layer.
    reader.skip_bits(12 * 8)?;
    if max_sub_layers_minus1 > 0 {
        let mut profile_present = [false; 8];
        let mut level_present = [false; 8];
        for i in 0..max_sub_layers_minus1 as usize {
            profile_present[i] = reader.read_bit()?;
            level_present[i] = reader.read_bit()?;
        }
        reader.skip_bits((8 - max_sub_layers_minus1 as u32) * 2)?;
        for i in 0..max_sub_layers_minus1 as usize {
            if profile_present[i] {
                reader.skip_bits(88)?;
            }
            if level_present[i] {
                reader.skip_bits(8)?;
            }
        }
    }

    let sps_id = reader.read_golomb()?;
    let chroma_format_idc = reader.read_golomb()?;
    if chroma_format_idc == 3 {
        reader.read_bit()?; // separate_colour_plane_flag
    }
    let width = reader.read_golomb()? as u32;
    let height = reader.read_golomb()? as u32;

    Ok(HevcSpsInfo {
        sps_id,
        chroma_format_idc,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bits_to_bytes(bits: &str) -> Vec<u8> {
        let mut s = bits.to_string();
        while s.len() % 8 != 0 {
            s.push('0');
        }
        s.as_bytes()
            .chunks(8)
            .map(|c| {
                c.iter()
                    .fold(0u8, |acc, &b| (acc << 1) | (b == b'1') as u8)
            })
            .collect()
    }

    #[test]
    fn test_parse_sps_dimensions() {
        let mut bits = String::new();
        bits.push_str("0000"); // vps id
        bits.push_str("000"); // max_sub_layers_minus1
        bits.push('1'); // temporal id nesting
        bits.push_str(&"0".repeat(96)); // profile_tier_level
        bits.push('1'); // sps_id = 0
        bits.push_str("010"); // chroma_format_idc = 1
        bits.push_str("000000000011110000001"); // ue(1920)
        bits.push_str("000000000010000111001"); // ue(1080)

        let sps = parse_sps(&bits_to_bytes(&bits)).unwrap();
        assert_eq!(sps.sps_id, 0);
        assert_eq!(sps.chroma_format_idc, 1);
        assert_eq!((sps.width, sps.height), (1920, 1080));
    }

    #[test]
    fn test_nal_classification() {
        let mut dec = H265Decoder::new();
        // VPS header bytes: type 32 → (32 << 1) = 0x40, layer 0, tid 1
        let node = dec.nal_to_node(Bytes::from_static(&[0x40, 0x01, 0xAA]));
        assert_eq!(node.note.as_deref(), Some("video parameter set"));
    }
}
