use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use std::sync::Arc;

use super::types::{NalUnit, NalUnitType, PpsInfo, SeiMessage, SliceInfo, SpsInfo};
use crate::error::Result;
use crate::utils::BitReader;

#[derive(Debug, Default)]
struct ParserState {
    sps: Option<SpsInfo>,
    pps: Option<PpsInfo>,
}

/// Stateful H.264 NAL parser. SPS/PPS survive across NAL units so
/// later slices can be interpreted against them.
#[derive(Debug)]
pub struct H264Parser {
    state: Arc<Mutex<ParserState>>,
    buffer: BytesMut,
}

/// What a NAL unit decoded to, beyond its classification.
#[derive(Debug)]
pub enum NalPayload {
    Sps(SpsInfo),
    Pps(PpsInfo),
    Sei(Vec<SeiMessage>),
    Slice(SliceInfo),
    Opaque,
}

impl H264Parser {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ParserState::default())),
            buffer: BytesMut::new(),
        }
    }

    /// Parses one escaped NAL unit body (header byte included).
    pub fn parse_nal(&mut self, data: &[u8]) -> Result<(NalUnit, NalPayload)> {
        let rbsp = self.remove_emulation_prevention(data);
        let rbsp = Bytes::from(rbsp);
        let nal = NalUnit::new(rbsp.clone());

        let payload = match NalUnitType::from(nal.nal_type) {
            NalUnitType::Sps => {
                let sps = parse_sps(&rbsp[1..])?;
                self.state.lock().sps = Some(sps.clone());
                NalPayload::Sps(sps)
            }
            NalUnitType::Pps => {
                let pps = parse_pps(&rbsp[1..])?;
                self.state.lock().pps = Some(pps.clone());
                NalPayload::Pps(pps)
            }
            NalUnitType::Sei => NalPayload::Sei(parse_sei(&rbsp[1..])?),
            NalUnitType::CodedSliceNonIdr | NalUnitType::CodedSliceIdr => {
                NalPayload::Slice(parse_slice_header(&rbsp[1..])?)
            }
            _ => NalPayload::Opaque,
        };

        Ok((nal, payload))
    }

    fn remove_emulation_prevention(&mut self, data: &[u8]) -> Vec<u8> {
        self.buffer.clear();
        let mut i = 0;
        while i < data.len() {
            if i + 2 < data.len() && data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x03
            {
                self.buffer.put_u8(0x00);
                self.buffer.put_u8(0x00);
                i += 3;
                continue;
            }
            self.buffer.put_u8(data[i]);
            i += 1;
        }
        self.buffer.to_vec()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let state = self.state.lock();
        state.sps.as_ref().map(|sps| (sps.width, sps.height))
    }
}

impl Default for H264Parser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_sps(data: &[u8]) -> Result<SpsInfo> {
    let mut reader = BitReader::new(data);

    let profile_idc = reader.read_bits(8)? as u8;
    reader.skip_bits(16)?; // constraint flags and reserved bits
    let level_idc = reader.read_bits(8)? as u8;
    reader.read_golomb()?; // seq_parameter_set_id

    // 4:2:0 is implied unless a high profile spells the format out.
    let mut chroma_format_idc = 1;
    if matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138
    ) {
        chroma_format_idc = reader.read_golomb()? as u32;
        if chroma_format_idc == 3 {
            reader.read_bit()?; // separate_colour_plane_flag
        }
        reader.read_golomb()?; // bit_depth_luma_minus8
        reader.read_golomb()?; // bit_depth_chroma_minus8
        reader.read_bit()?; // qpprime_y_zero_transform_bypass_flag

        if reader.read_bit()? {
            let count = if chroma_format_idc != 3 { 8 } else { 12 };
            for list in 0..count {
                if reader.read_bit()? {
                    skip_scaling_list(&mut reader, if list < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    reader.read_golomb()?; // log2_max_frame_num_minus4
    let pic_order_cnt_type = reader.read_golomb()?;
    if pic_order_cnt_type == 0 {
        reader.read_golomb()?; // log2_max_pic_order_cnt_lsb_minus4
    } else if pic_order_cnt_type == 1 {
        reader.read_bit()?; // delta_pic_order_always_zero_flag
        reader.read_signed_golomb()?; // offset_for_non_ref_pic
        reader.read_signed_golomb()?; // offset_for_top_to_bottom_field
        let cycle_len = reader.read_golomb()?;
        for _ in 0..cycle_len {
            reader.read_signed_golomb()?;
        }
    }

    reader.read_golomb()?; // max_num_ref_frames
    reader.read_bit()?; // gaps_in_frame_num_value_allowed_flag

    let pic_width_in_mbs = reader.read_golomb()? + 1;
    let pic_height_in_map_units = reader.read_golomb()? + 1;
    let frame_mbs_only = reader.read_bit()?;

    let width = pic_width_in_mbs as u32 * 16;
    let height = if frame_mbs_only { 1 } else { 2 } * pic_height_in_map_units as u32 * 16;

    Ok(SpsInfo {
        profile_idc,
        level_idc,
        chroma_format_idc,
        width,
        height,
    })
}

fn parse_pps(data: &[u8]) -> Result<PpsInfo> {
    let mut reader = BitReader::new(data);
    Ok(PpsInfo {
        pic_parameter_set_id: reader.read_golomb()? as u32,
        seq_parameter_set_id: reader.read_golomb()? as u32,
        entropy_coding_mode: reader.read_bit()?,
    })
}

/// SEI message loop: both type and size accumulate 0xFF continuation
/// bytes. Payload bytes themselves are skipped.
fn parse_sei(data: &[u8]) -> Result<Vec<SeiMessage>> {
    let mut messages = Vec::new();
    let mut pos = 0;
    // A lone trailing 0x80 is the RBSP stop bit.
    while pos < data.len() && data[pos] != 0x80 {
        let mut payload_type = 0u32;
        while pos < data.len() && data[pos] == 0xFF {
            payload_type += 255;
            pos += 1;
        }
        if pos >= data.len() {
            break;
        }
        payload_type += data[pos] as u32;
        pos += 1;

        let mut payload_size = 0u32;
        while pos < data.len() && data[pos] == 0xFF {
            payload_size += 255;
            pos += 1;
        }
        if pos >= data.len() {
            break;
        }
        payload_size += data[pos] as u32;
        pos += 1;

        messages.push(SeiMessage {
            payload_type,
            payload_size,
        });
        pos += payload_size as usize;
    }
    Ok(messages)
}

fn parse_slice_header(data: &[u8]) -> Result<SliceInfo> {
    let mut reader = BitReader::new(data);
    Ok(SliceInfo {
        first_mb_in_slice: reader.read_golomb()? as u32,
        slice_type: reader.read_golomb()? as u32,
        pic_parameter_set_id: reader.read_golomb()? as u32,
    })
}

fn skip_scaling_list(reader: &mut BitReader, size: usize) -> Result<()> {
    let mut last_scale = 8i64;
    let mut next_scale = 8i64;
    for _ in 0..size {
        if next_scale != 0 {
            let delta_scale = reader.read_signed_golomb()?;
            next_scale = (last_scale + delta_scale + 256) % 256;
        }
        last_scale = if next_scale == 0 { last_scale } else { next_scale };
    }
    Ok(())
}
