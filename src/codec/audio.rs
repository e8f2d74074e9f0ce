//! Audio elementary-stream decoders: MPEG-1/2 audio frames, ADTS AAC
//! and LOAS/LATM AAC framing.
//!
//! All three share the same shape: a carry buffer across PES units, a
//! sync-word scan with the skipped byte count surfaced as
//! [`Anomaly::SyncLoss`], and one node per complete frame.

use bytes::BytesMut;

use super::EsDecoder;
use crate::node::{Anomaly, Node};
use crate::pes::PesUnit;

const BITRATES_V1_L1: [u32; 15] = [
    0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448,
];
const BITRATES_V1_L2: [u32; 15] = [
    0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384,
];
const BITRATES_V1_L3: [u32; 15] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];
const BITRATES_V2_L1: [u32; 15] = [
    0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256,
];
const BITRATES_V2_L23: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

const SAMPLE_RATES_MPEG1: [u32; 3] = [44100, 48000, 32000];

/// Decoded 4-byte MPEG audio frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpegAudioHeader {
    /// 1 or 2 (2 also covers MPEG-2.5).
    pub version: u8,
    pub layer: u8,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    pub padding: bool,
    pub channel_mode: u8,
    pub frame_length: usize,
}

impl MpegAudioHeader {
    /// Decodes a header at the start of `data`. `None` when the sync
    /// pattern is absent or a reserved index is used.
    pub fn parse(data: &[u8]) -> Option<MpegAudioHeader> {
        if data.len() < 4 || data[0] != 0xFF || (data[1] & 0xE0) != 0xE0 {
            return None;
        }
        let version_bits = (data[1] >> 3) & 0x03;
        let layer_bits = (data[1] >> 1) & 0x03;
        if version_bits == 1 || layer_bits == 0 {
            return None;
        }
        let mpeg1 = version_bits == 3;
        let layer = 4 - layer_bits; // 3 -> layer I

        let bitrate_index = (data[2] >> 4) as usize;
        let rate_index = ((data[2] >> 2) & 0x03) as usize;
        if bitrate_index == 0 || bitrate_index == 15 || rate_index == 3 {
            return None;
        }

        let bitrate_kbps = match (mpeg1, layer) {
            (true, 1) => BITRATES_V1_L1[bitrate_index],
            (true, 2) => BITRATES_V1_L2[bitrate_index],
            (true, 3) => BITRATES_V1_L3[bitrate_index],
            (false, 1) => BITRATES_V2_L1[bitrate_index],
            (false, _) => BITRATES_V2_L23[bitrate_index],
            _ => return None,
        };
        let sample_rate = SAMPLE_RATES_MPEG1[rate_index]
            / match version_bits {
                3 => 1,
                2 => 2,
                _ => 4,
            };

        let padding = (data[2] & 0x02) != 0;
        let channel_mode = data[3] >> 6;

        let bitrate = bitrate_kbps * 1000;
        let frame_length = match layer {
            1 => (12 * bitrate / sample_rate + padding as u32) as usize * 4,
            3 if !mpeg1 => (72 * bitrate / sample_rate + padding as u32) as usize,
            _ => (144 * bitrate / sample_rate + padding as u32) as usize,
        };

        Some(MpegAudioHeader {
            version: if mpeg1 { 1 } else { 2 },
            layer,
            bitrate_kbps,
            sample_rate,
            padding,
            channel_mode,
            frame_length,
        })
    }

    fn to_node(&self) -> Node {
        Node::new("mpeg_audio_frame")
            .note(match self.layer {
                1 => "layer I",
                2 => "layer II",
                _ => "layer III",
            })
            .child(Node::leaf("version", self.version))
            .child(Node::leaf("layer", self.layer))
            .child(Node::leaf("bitrate", self.bitrate_kbps).note("kbit/s"))
            .child(Node::leaf("sample_rate", self.sample_rate).note("Hz"))
            .child(Node::leaf("channel_mode", self.channel_mode))
            .child(Node::leaf("frame_length", self.frame_length as u64))
    }
}

/// MPEG-1/2 audio (layers I-III).
#[derive(Default)]
pub struct MpegAudioDecoder {
    buf: BytesMut,
}

impl MpegAudioDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EsDecoder for MpegAudioDecoder {
    fn feed(&mut self, pes: &PesUnit) -> Vec<Node> {
        self.buf.extend_from_slice(&pes.payload);
        let mut out = Vec::new();
        let mut skipped = 0usize;

        loop {
            if self.buf.len() < 4 {
                break;
            }
            let Some(header) = MpegAudioHeader::parse(&self.buf) else {
                let _ = self.buf.split_to(1);
                skipped += 1;
                continue;
            };
            if skipped > 0 {
                out.push(Node::new("resync").anomaly(Anomaly::SyncLoss { skipped }));
                skipped = 0;
            }
            if self.buf.len() < header.frame_length {
                break;
            }
            let frame = self.buf.split_to(header.frame_length);
            let mut node = header.to_node();
            // UECP-over-ancillary-data marks the frame tail with 0xFD.
            if frame.last() == Some(&0xFD) {
                node.push(Node::new("ancillary_data").note("RDS (UECP)"));
            }
            out.push(node);
        }

        if skipped > 0 {
            out.push(Node::new("resync").anomaly(Anomaly::SyncLoss { skipped }));
        }
        out
    }
}

/// ADTS AAC framing.
#[derive(Default)]
pub struct AdtsDecoder {
    buf: BytesMut,
}

impl AdtsDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

const ADTS_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

impl EsDecoder for AdtsDecoder {
    fn feed(&mut self, pes: &PesUnit) -> Vec<Node> {
        self.buf.extend_from_slice(&pes.payload);
        let mut out = Vec::new();
        let mut skipped = 0usize;

        loop {
            if self.buf.len() < 7 {
                break;
            }
            let b = &self.buf;
            if b[0] != 0xFF || (b[1] & 0xF0) != 0xF0 {
                let _ = self.buf.split_to(1);
                skipped += 1;
                continue;
            }
            if skipped > 0 {
                out.push(Node::new("resync").anomaly(Anomaly::SyncLoss { skipped }));
                skipped = 0;
            }

            let protection_absent = (b[1] & 0x01) != 0;
            let profile = b[2] >> 6;
            let rate_index = ((b[2] >> 2) & 0x0F) as usize;
            let channel_config = ((b[2] & 0x01) << 2) | (b[3] >> 6);
            let frame_length =
                (((b[3] & 0x03) as usize) << 11) | ((b[4] as usize) << 3) | (b[5] >> 5) as usize;
            if frame_length < 7 {
                let _ = self.buf.split_to(1);
                skipped += 1;
                continue;
            }
            if self.buf.len() < frame_length {
                break;
            }
            let _ = self.buf.split_to(frame_length);

            let mut node = Node::new("adts_frame")
                .child(Node::leaf("profile", profile).note(match profile {
                    0 => "AAC Main",
                    1 => "AAC LC",
                    2 => "AAC SSR",
                    _ => "AAC LTP",
                }))
                .child(Node::leaf("channel_configuration", channel_config))
                .child(Node::leaf("frame_length", frame_length as u64))
                .child(Node::leaf("crc_present", !protection_absent));
            if let Some(rate) = ADTS_SAMPLE_RATES.get(rate_index) {
                node.push(Node::leaf("sample_rate", *rate).note("Hz"));
            }
            out.push(node);
        }

        if skipped > 0 {
            out.push(Node::new("resync").anomaly(Anomaly::SyncLoss { skipped }));
        }
        out
    }
}

/// LOAS/LATM AAC framing (AudioSyncStream, 0x2B7 sync).
#[derive(Default)]
pub struct LatmDecoder {
    buf: BytesMut,
}

impl LatmDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EsDecoder for LatmDecoder {
    fn feed(&mut self, pes: &PesUnit) -> Vec<Node> {
        self.buf.extend_from_slice(&pes.payload);
        let mut out = Vec::new();
        let mut skipped = 0usize;

        loop {
            if self.buf.len() < 3 {
                break;
            }
            let b = &self.buf;
            // 11-bit sync 0x2B7.
            if b[0] != 0x56 || (b[1] & 0xE0) != 0xE0 {
                let _ = self.buf.split_to(1);
                skipped += 1;
                continue;
            }
            if skipped > 0 {
                out.push(Node::new("resync").anomaly(Anomaly::SyncLoss { skipped }));
                skipped = 0;
            }
            let mux_length = (((b[1] & 0x1F) as usize) << 8) | b[2] as usize;
            let total = 3 + mux_length;
            if self.buf.len() < total {
                break;
            }
            let _ = self.buf.split_to(total);
            out.push(
                Node::new("loas_frame")
                    .child(Node::leaf("audio_mux_length", mux_length as u64)),
            );
        }

        if skipped > 0 {
            out.push(Node::new("resync").anomaly(Anomaly::SyncLoss { skipped }));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn unit(payload: &[u8]) -> PesUnit {
        PesUnit {
            header: None,
            payload: Bytes::copy_from_slice(payload),
            anomalies: Vec::new(),
        }
    }

    // MPEG-1 layer II, 128 kbit/s, 48 kHz, stereo: frame 384 bytes.
    fn layer2_frame() -> Vec<u8> {
        let mut frame = vec![0xFF, 0xFD, 0x84, 0x00];
        frame.resize(384, 0x00);
        frame
    }

    #[test]
    fn test_mpeg_audio_header() {
        let header = MpegAudioHeader::parse(&layer2_frame()).unwrap();
        assert_eq!(header.version, 1);
        assert_eq!(header.layer, 2);
        assert_eq!(header.bitrate_kbps, 128);
        assert_eq!(header.sample_rate, 48000);
        assert_eq!(header.frame_length, 384);
    }

    #[test]
    fn test_mpeg_audio_resync() {
        let mut payload = vec![0xDE, 0xAD, 0xBE];
        payload.extend_from_slice(&layer2_frame());
        let mut dec = MpegAudioDecoder::new();
        let nodes = dec.feed(&unit(&payload));
        assert_eq!(nodes.len(), 2);
        assert_eq!(
            nodes[0].anomalies,
            vec![Anomaly::SyncLoss { skipped: 3 }]
        );
        assert_eq!(nodes[1].label, "mpeg_audio_frame");
    }

    #[test]
    fn test_mpeg_audio_frame_across_units() {
        let frame = layer2_frame();
        let mut dec = MpegAudioDecoder::new();
        assert!(dec.feed(&unit(&frame[..100])).is_empty());
        let nodes = dec.feed(&unit(&frame[100..]));
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn test_rds_ancillary_marker() {
        let mut frame = layer2_frame();
        *frame.last_mut().unwrap() = 0xFD;
        let mut dec = MpegAudioDecoder::new();
        let nodes = dec.feed(&unit(&frame));
        assert!(nodes[0]
            .children
            .iter()
            .any(|c| c.label == "ancillary_data"));
    }

    #[test]
    fn test_adts_frame() {
        // AAC LC, 48 kHz, stereo, frame length 16.
        let mut frame = vec![0xFF, 0xF1, 0x4C, 0x80, 0x02, 0x00, 0xFC];
        frame.resize(16, 0xAA);
        // Patch frame_length = 16: bits live in b3/b4/b5.
        frame[3] = 0x80;
        frame[4] = 16 >> 3;
        frame[5] = (16 & 0x07) << 5;

        let mut dec = AdtsDecoder::new();
        let nodes = dec.feed(&unit(&frame));
        assert_eq!(nodes.len(), 1);
        let n = &nodes[0];
        assert_eq!(n.label, "adts_frame");
        assert!(n.children.iter().any(|c| c.label == "sample_rate"));
    }

    #[test]
    fn test_latm_frame() {
        let mut payload = vec![0x56, 0xE0, 0x04];
        payload.extend_from_slice(&[1, 2, 3, 4]);
        let mut dec = LatmDecoder::new();
        let nodes = dec.feed(&unit(&payload));
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].label, "loas_frame");
    }
}
