//! RDS data carried as UECP frames in a private PES stream.

use bytes::BytesMut;

use super::EsDecoder;
use crate::node::{Anomaly, Node};
use crate::pes::PesUnit;

const FRAME_START: u8 = 0xFE;
const FRAME_END: u8 = 0xFF;
// Start, 2 address bytes, sequence, length, CRC, end.
const MIN_FRAME_SIZE: usize = 8;

/// UECP frame scanner. Frames routinely straddle PES units, so the
/// tail after the last complete frame is carried.
#[derive(Default)]
pub struct UecpDecoder {
    buf: BytesMut,
}

impl UecpDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn frame_to_node(frame: &[u8]) -> Node {
        // Undo byte stuffing between the delimiters.
        let mut body = Vec::with_capacity(frame.len() - 2);
        let mut i = 1;
        while i < frame.len() - 1 {
            if frame[i] == 0xFD && i + 1 < frame.len() - 1 {
                body.push(match frame[i + 1] {
                    0x01 => 0xFE,
                    0x02 => 0xFF,
                    _ => 0xFD,
                });
                i += 2;
            } else {
                body.push(frame[i]);
                i += 1;
            }
        }

        let mut node = Node::new("uecp_frame");
        if body.len() < MIN_FRAME_SIZE - 2 {
            node.anomalies.push(Anomaly::Truncated);
            return node;
        }

        let site = ((body[0] as u16) << 2) | (body[1] >> 6) as u16;
        let encoder = body[1] & 0x3F;
        let sequence = body[2];
        let message_length = body[3] as usize;
        node.push(Node::leaf("site_address", site));
        node.push(Node::leaf("encoder_address", encoder));
        node.push(Node::leaf("sequence_counter", sequence));
        node.push(Node::leaf("message_length", message_length as u64));

        let message_end = 4 + message_length;
        if body.len() < message_end + 2 {
            node.anomalies.push(Anomaly::LengthMismatch {
                declared: message_length,
                consumed: body.len().saturating_sub(4 + 2),
            });
            return node;
        }
        if message_length > 0 {
            node.push(Node::leaf("message_element_code", body[4]));
        }
        let crc = u16::from_be_bytes([body[message_end], body[message_end + 1]]);
        node.push(Node::leaf("crc", crc));
        node
    }
}

impl EsDecoder for UecpDecoder {
    fn feed(&mut self, pes: &PesUnit) -> Vec<Node> {
        self.buf.extend_from_slice(&pes.payload);
        let mut out = Vec::new();
        let mut skipped = 0usize;

        loop {
            let Some(start) = self.buf.iter().position(|&b| b == FRAME_START) else {
                skipped += self.buf.len();
                self.buf.clear();
                break;
            };
            skipped += start;
            let _ = self.buf.split_to(start);

            let Some(end) = self.buf[1..].iter().position(|&b| b == FRAME_END) else {
                // Frame still open; wait for more payload.
                break;
            };
            let frame_len = end + 2;
            if frame_len < MIN_FRAME_SIZE {
                let _ = self.buf.split_to(1);
                skipped += 1;
                continue;
            }

            if skipped > 0 {
                out.push(Node::new("resync").anomaly(Anomaly::SyncLoss { skipped }));
                skipped = 0;
            }
            let frame = self.buf.split_to(frame_len);
            out.push(Self::frame_to_node(&frame));
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

    fn build_frame(sequence: u8, message: &[u8]) -> Vec<u8> {
        let mut f = vec![FRAME_START, 0x00, 0x00, sequence, message.len() as u8];
        f.extend_from_slice(message);
        f.extend_from_slice(&[0x12, 0x34]); // crc
        f.push(FRAME_END);
        f
    }

    #[test]
    fn test_frame_scan() {
        let mut payload = vec![0xAB, 0xCD]; // garbage before the frame
        payload.extend_from_slice(&build_frame(7, &[0x01, 0x00, 0x00, 0x02, b'h', b'i']));

        let mut dec = UecpDecoder::new();
        let nodes = dec.feed(&unit(&payload));
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].anomalies, vec![Anomaly::SyncLoss { skipped: 2 }]);
        let frame = &nodes[1];
        assert_eq!(frame.label, "uecp_frame");
        assert!(frame
            .children
            .iter()
            .any(|c| c.label == "sequence_counter"));
    }

    #[test]
    fn test_frame_across_units() {
        let frame = build_frame(1, &[0x01, 0x00, 0x00, 0x01, b'x']);
        let mut dec = UecpDecoder::new();
        assert!(dec.feed(&unit(&frame[..4])).is_empty());
        let nodes = dec.feed(&unit(&frame[4..]));
        assert_eq!(nodes.len(), 1);
        assert!(nodes[0].anomalies.is_empty());
    }

    #[test]
    fn test_short_frame_rejected() {
        // 0xFE directly followed by 0xFF is below the minimum size.
        let mut payload = vec![FRAME_START, FRAME_END];
        payload.extend_from_slice(&build_frame(2, &[]));
        let mut dec = UecpDecoder::new();
        let nodes = dec.feed(&unit(&payload));
        let frames: Vec<_> = nodes.iter().filter(|n| n.label == "uecp_frame").collect();
        assert_eq!(frames.len(), 1);
    }
}
