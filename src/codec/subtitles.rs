//! DVB subtitle PES decoding (segment framing, EN 300 743).

use super::EsDecoder;
use crate::node::{Anomaly, Node};
use crate::pes::PesUnit;

const DATA_IDENTIFIER_DVB_SUBTITLES: u8 = 0x20;
const SYNC_BYTE: u8 = 0x0F;
const END_OF_PES_MARKER: u8 = 0xFF;

fn segment_type_name(segment_type: u8) -> &'static str {
    match segment_type {
        0x10 => "page composition segment",
        0x11 => "region composition segment",
        0x12 => "CLUT definition segment",
        0x13 => "object data segment",
        0x14 => "display definition segment",
        0x80 => "end of display set segment",
        0x81..=0xEF => "private data segment",
        _ => "reserved segment",
    }
}

/// DVB subtitles ride complete in each PES unit; no state carries
/// across units.
#[derive(Default)]
pub struct DvbSubtitleDecoder;

impl DvbSubtitleDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl EsDecoder for DvbSubtitleDecoder {
    fn feed(&mut self, pes: &PesUnit) -> Vec<Node> {
        let data = &pes.payload;
        if data.len() < 2 {
            return Vec::new();
        }
        if data[0] != DATA_IDENTIFIER_DVB_SUBTITLES {
            log::debug!("unexpected subtitle data identifier {:#04x}", data[0]);
            return vec![Node::new("subtitle_data")
                .value(data[0])
                .note("unexpected data identifier")];
        }

        let mut node = Node::new("subtitle_data")
            .child(Node::leaf("data_identifier", data[0]))
            .child(Node::leaf("subtitle_stream_id", data[1]));

        let mut pos = 2;
        while pos < data.len() && data[pos] == SYNC_BYTE {
            if pos + 6 > data.len() {
                node.anomalies.push(Anomaly::Truncated);
                break;
            }
            let segment_type = data[pos + 1];
            let page_id = u16::from_be_bytes([data[pos + 2], data[pos + 3]]);
            let length = u16::from_be_bytes([data[pos + 4], data[pos + 5]]) as usize;
            pos += 6;

            let mut segment = Node::new("segment")
                .value(segment_type)
                .note(segment_type_name(segment_type))
                .child(Node::leaf("page_id", page_id))
                .child(Node::leaf("segment_length", length as u64));
            if pos + length > data.len() {
                segment.anomalies.push(Anomaly::Truncated);
                node.push(segment);
                break;
            }
            pos += length;
            node.push(segment);
        }

        if pos < data.len() && data[pos] != END_OF_PES_MARKER {
            log::debug!("subtitle segment loop ended on {:#04x}", data[pos]);
        }
        vec![node]
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

    #[test]
    fn test_segment_loop() {
        let payload = [
            0x20, 0x00, // data identifier, stream id
            0x0F, 0x10, 0x00, 0x01, 0x00, 0x02, 0xAA, 0xBB, // page composition
            0x0F, 0x80, 0x00, 0x01, 0x00, 0x00, // end of display set
            0xFF, // end of PES data
        ];
        let mut dec = DvbSubtitleDecoder::new();
        let nodes = dec.feed(&unit(&payload));
        assert_eq!(nodes.len(), 1);
        let segments: Vec<_> = nodes[0]
            .children
            .iter()
            .filter(|c| c.label == "segment")
            .collect();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].note.as_deref(), Some("page composition segment"));
        assert_eq!(segments[1].note.as_deref(), Some("end of display set segment"));
    }

    #[test]
    fn test_truncated_segment_flagged() {
        let payload = [0x20, 0x00, 0x0F, 0x13, 0x00, 0x01, 0x00, 0x10, 0x01];
        let mut dec = DvbSubtitleDecoder::new();
        let nodes = dec.feed(&unit(&payload));
        let segment = nodes[0]
            .children
            .iter()
            .find(|c| c.label == "segment")
            .unwrap();
        assert_eq!(segment.anomalies, vec![Anomaly::Truncated]);
    }
}
