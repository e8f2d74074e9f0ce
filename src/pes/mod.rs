//! Packetized Elementary Stream reassembly and header decoding.

use bytes::{Bytes, BytesMut};

use crate::error::{Result, TsError};
use crate::node::{Anomaly, Node};

/// Decoded PES header.
///
/// Only the fields the elementary-stream decoders act on are kept
/// individually; the remaining flag bits ride along in `flags`.
#[derive(Debug, Clone)]
pub struct PesHeader {
    pub stream_id: u8,
    /// Declared packet length; 0 means unbounded (video).
    pub packet_length: u16,
    pub scrambling_control: u8,
    pub data_alignment: bool,
    pub header_data_length: u8,
    /// Presentation Time Stamp (33 bits, 90 kHz).
    pub pts: Option<u64>,
    /// Decoding Time Stamp (33 bits, 90 kHz).
    pub dts: Option<u64>,
}

// Stream ids whose PES packets carry no optional header.
const STREAM_ID_PADDING: u8 = 0xBE;
const STREAM_ID_PRIVATE_2: u8 = 0xBF;

impl PesHeader {
    /// Parses a PES header from the start of `data`. Returns the header
    /// and the offset of the first payload byte.
    pub fn parse(data: &[u8]) -> Result<(PesHeader, usize)> {
        if data.len() < 6 {
            return Err(TsError::Truncated {
                needed: 6 * 8,
                remaining: data.len() * 8,
            });
        }
        if data[0] != 0x00 || data[1] != 0x00 || data[2] != 0x01 {
            return Err(TsError::InvalidData("missing PES start code".into()));
        }
        let stream_id = data[3];
        let packet_length = u16::from_be_bytes([data[4], data[5]]);

        let mut header = PesHeader {
            stream_id,
            packet_length,
            scrambling_control: 0,
            data_alignment: false,
            header_data_length: 0,
            pts: None,
            dts: None,
        };

        if stream_id == STREAM_ID_PADDING || stream_id == STREAM_ID_PRIVATE_2 {
            return Ok((header, 6));
        }

        if data.len() < 9 {
            return Err(TsError::Truncated {
                needed: 9 * 8,
                remaining: data.len() * 8,
            });
        }
        header.scrambling_control = (data[6] >> 4) & 0x03;
        header.data_alignment = (data[6] & 0x04) != 0;
        let pts_dts_flags = data[7] >> 6;
        header.header_data_length = data[8];

        let header_end = 9 + header.header_data_length as usize;
        if data.len() < header_end {
            return Err(TsError::Truncated {
                needed: header_end * 8,
                remaining: data.len() * 8,
            });
        }

        if pts_dts_flags & 0x02 != 0 {
            header.pts = Some(read_timestamp(&data[9..])?);
        }
        if pts_dts_flags == 0x03 {
            header.dts = Some(read_timestamp(&data[14..])?);
        }

        Ok((header, header_end))
    }

    pub fn to_node(&self) -> Node {
        let mut node = Node::new("PES_header")
            .child(Node::leaf("stream_id", self.stream_id))
            .child(Node::leaf("PES_packet_length", self.packet_length));
        if self.scrambling_control != 0 {
            node.push(Node::leaf("scrambling_control", self.scrambling_control));
        }
        if let Some(pts) = self.pts {
            node.push(Node::leaf("PTS", pts).note("90 kHz ticks"));
        }
        if let Some(dts) = self.dts {
            node.push(Node::leaf("DTS", dts).note("90 kHz ticks"));
        }
        node
    }
}

/// Reads a 33-bit PTS/DTS in the 5-byte marker-bit layout.
fn read_timestamp(data: &[u8]) -> Result<u64> {
    if data.len() < 5 {
        return Err(TsError::Truncated {
            needed: 5 * 8,
            remaining: data.len() * 8,
        });
    }
    let ts = (((data[0] >> 1) & 0x07) as u64) << 30
        | (data[1] as u64) << 22
        | (((data[2] >> 1) & 0x7F) as u64) << 15
        | (data[3] as u64) << 7
        | ((data[4] >> 1) & 0x7F) as u64;
    Ok(ts)
}

/// One reassembled PES unit, header decoded and payload split off.
#[derive(Debug, Clone)]
pub struct PesUnit {
    /// `None` when the unit bytes were too mangled to frame.
    pub header: Option<PesHeader>,
    /// Elementary-stream payload after the PES header.
    pub payload: Bytes,
    pub anomalies: Vec<Anomaly>,
}

impl PesUnit {
    fn from_bytes(bytes: Bytes, truncated: bool) -> PesUnit {
        let mut anomalies = Vec::new();
        if truncated {
            anomalies.push(Anomaly::Truncated);
        }
        match PesHeader::parse(&bytes) {
            Ok((header, payload_start)) => PesUnit {
                header: Some(header),
                payload: bytes.slice(payload_start..),
                anomalies,
            },
            Err(e) => {
                log::debug!("undecodable PES header: {}", e);
                anomalies.push(Anomaly::Truncated);
                PesUnit {
                    header: None,
                    payload: bytes,
                    anomalies,
                }
            }
        }
    }

    pub fn to_node(&self) -> Node {
        let mut node = Node::new("PES_unit");
        if let Some(header) = &self.header {
            node.push(header.to_node());
        }
        node.push(Node::leaf("payload_length", self.payload.len() as u64));
        node.anomalies.extend(self.anomalies.iter().cloned());
        node
    }
}

/// Reassembles PES units from the packet payloads of one PID.
///
/// A payload-start packet opens a unit. A declared `PES_packet_length`
/// completes the unit as soon as 6 + length bytes are in; length 0
/// (unbounded, video) completes on the next payload start or at end of
/// input via [`PesReassembler::take_pending`].
#[derive(Default)]
pub struct PesReassembler {
    buf: BytesMut,
    collecting: bool,
}

impl PesReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one packet payload; returns every unit completed by it.
    pub fn push(&mut self, payload_unit_start: bool, payload: &[u8]) -> Vec<PesUnit> {
        let mut out = Vec::new();

        if payload_unit_start {
            if self.collecting && !self.buf.is_empty() {
                // Unbounded unit terminated by the next unit's start. A
                // bounded unit still here lost packets before its
                // declared end.
                let bytes = self.buf.split().freeze();
                let truncated = declared_length(&bytes)
                    .map_or(bytes.len() < 6, |d| d != 0 && bytes.len() < 6 + d);
                out.push(PesUnit::from_bytes(bytes, truncated));
            }
            self.buf.clear();
            self.collecting = true;
        }

        if self.collecting {
            self.buf.extend_from_slice(payload);
            if let Some(unit) = self.try_complete() {
                out.push(unit);
            }
        }

        out
    }

    /// Completes a bounded unit once the declared length is in.
    fn try_complete(&mut self) -> Option<PesUnit> {
        if self.buf.len() < 6 {
            return None;
        }
        let declared = u16::from_be_bytes([self.buf[4], self.buf[5]]) as usize;
        if declared == 0 {
            return None;
        }
        let total = 6 + declared;
        if self.buf.len() < total {
            return None;
        }
        let bytes = self.buf.split_to(total).freeze();
        // Anything past the declared length is stuffing.
        self.buf.clear();
        self.collecting = false;
        Some(PesUnit::from_bytes(bytes, false))
    }

    /// Surfaces a still-collecting unit at end of input as truncated.
    pub fn take_pending(&mut self) -> Option<PesUnit> {
        if !self.collecting || self.buf.is_empty() {
            return None;
        }
        let bytes = self.buf.split().freeze();
        self.collecting = false;
        // An unbounded unit that simply ran to end of input is complete;
        // the capture boundary is its terminator. A bounded unit cut
        // short is truncated.
        let truncated = declared_length(&bytes)
            .map_or(bytes.len() < 6, |d| d != 0 && bytes.len() < 6 + d);
        Some(PesUnit::from_bytes(bytes, truncated))
    }
}

fn declared_length(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < 6 {
        return None;
    }
    Some(u16::from_be_bytes([bytes[4], bytes[5]]) as usize)
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Builds a PES unit with a PTS-bearing header and the given
    /// payload. `bounded` controls whether the length field is filled.
    pub fn build_pes(stream_id: u8, pts: u64, payload: &[u8], bounded: bool) -> Vec<u8> {
        let mut pes = vec![0x00, 0x00, 0x01, stream_id];
        let length = if bounded { 3 + 5 + payload.len() } else { 0 };
        pes.extend_from_slice(&(length as u16).to_be_bytes());
        pes.push(0x80); // marker bits
        pes.push(0x80); // PTS only
        pes.push(5); // header data length
        pes.push(0x21 | (((pts >> 30) & 0x07) as u8) << 1);
        pes.push((pts >> 22) as u8);
        pes.push(0x01 | (((pts >> 15) & 0x7F) as u8) << 1);
        pes.push((pts >> 7) as u8);
        pes.push(0x01 | ((pts & 0x7F) as u8) << 1);
        pes.extend_from_slice(payload);
        pes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_support::build_pes;

    #[test]
    fn test_header_pts_dts() {
        let encode = |marker: u8, ts: u64| {
            [
                marker | (((ts >> 30) & 0x07) as u8) << 1 | 0x01,
                (ts >> 22) as u8,
                0x01 | (((ts >> 15) & 0x7F) as u8) << 1,
                (ts >> 7) as u8,
                0x01 | ((ts & 0x7F) as u8) << 1,
            ]
        };
        let pts = 0x1_2345_6789u64;
        let dts = pts - 3600;

        let mut data = vec![
            0x00, 0x00, 0x01, 0xE0, 0x00, 0x00, //
            0x80, 0xC0, 10,
        ];
        data.extend_from_slice(&encode(0x30, pts));
        data.extend_from_slice(&encode(0x10, dts));
        data.extend_from_slice(b"payload");

        let (header, payload_start) = PesHeader::parse(&data).unwrap();
        assert_eq!(header.stream_id, 0xE0);
        assert_eq!(payload_start, 19);
        assert_eq!(header.pts, Some(pts));
        assert_eq!(header.dts, Some(dts));
        assert_eq!(&data[payload_start..], b"payload");
    }

    #[test]
    fn test_timestamp_round_trip() {
        for pts in [0u64, 1, 90_000, 0x1_FFFF_FFFF] {
            let pes = build_pes(0xC0, pts, b"x", true);
            let (header, _) = PesHeader::parse(&pes).unwrap();
            assert_eq!(header.pts, Some(pts), "pts {:#x}", pts);
        }
    }

    #[test]
    fn test_bounded_unit_across_packets() {
        let pes = build_pes(0xC0, 1234, &[0xAB; 40], true);
        let mut asm = PesReassembler::new();
        assert!(asm.push(true, &pes[..20]).is_empty());
        assert!(asm.push(false, &pes[20..40]).is_empty());
        let units = asm.push(false, &pes[40..]);
        assert_eq!(units.len(), 1);
        let unit = &units[0];
        assert!(unit.anomalies.is_empty());
        assert_eq!(unit.header.as_ref().unwrap().pts, Some(1234));
        assert_eq!(&unit.payload[..], &[0xAB; 40]);
    }

    #[test]
    fn test_unbounded_unit_terminated_by_next_start() {
        let first = build_pes(0xE0, 100, &[0x01; 30], false);
        let second = build_pes(0xE0, 200, &[0x02; 10], false);

        let mut asm = PesReassembler::new();
        assert!(asm.push(true, &first).is_empty());
        let units = asm.push(true, &second);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].header.as_ref().unwrap().pts, Some(100));
        assert_eq!(&units[0].payload[..], &[0x01; 30]);

        // End of input: the second unit is complete, not truncated.
        let last = asm.take_pending().unwrap();
        assert_eq!(last.header.as_ref().unwrap().pts, Some(200));
        assert!(last.anomalies.is_empty());
    }

    #[test]
    fn test_bounded_unit_cut_short_is_truncated() {
        let pes = build_pes(0xC0, 0, &[0x55; 50], true);
        let mut asm = PesReassembler::new();
        assert!(asm.push(true, &pes[..30]).is_empty());
        let unit = asm.take_pending().unwrap();
        assert!(unit.anomalies.contains(&Anomaly::Truncated));
    }

    #[test]
    fn test_payload_without_start_is_ignored() {
        let mut asm = PesReassembler::new();
        assert!(asm.push(false, &[1, 2, 3]).is_empty());
        assert!(asm.take_pending().is_none());
    }
}
