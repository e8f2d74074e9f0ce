//! EBU teletext PES decoding (EN 300 472 data units, EN 300 706
//! packet addressing).

use super::EsDecoder;
use crate::node::{Anomaly, Node};
use crate::pes::PesUnit;

const DATA_UNIT_TELETEXT: u8 = 0x02;
const DATA_UNIT_SUBTITLE: u8 = 0x03;
const DATA_UNIT_STUFFING: u8 = 0xFF;
const FRAMING_CODE: u8 = 0xE4;

// Hamming 8/4 code words indexed by data value.
const HAMMING_8_4: [u8; 16] = [
    0x15, 0x02, 0x49, 0x5E, 0x64, 0x73, 0x38, 0x2F, 0xD0, 0xC7, 0x8C, 0x9B, 0xA1, 0xB6, 0xFD,
    0xEA,
];

/// Decodes one Hamming 8/4 byte, correcting single-bit errors.
/// `None` when two or more bits are wrong.
pub fn hamming_8_4(byte: u8) -> Option<u8> {
    for (value, &code) in HAMMING_8_4.iter().enumerate() {
        let distance = (byte ^ code).count_ones();
        if distance <= 1 {
            return Some(value as u8);
        }
    }
    None
}

/// Teletext PES units are self-contained; the decoder keeps no state.
#[derive(Default)]
pub struct TeletextDecoder;

impl TeletextDecoder {
    pub fn new() -> Self {
        Self
    }

    fn data_unit_to_node(&self, body: &[u8]) -> Node {
        let mut node = Node::new("teletext_data_unit");
        if body.len() < 4 {
            node.anomalies.push(Anomaly::Truncated);
            return node;
        }

        let field_parity = (body[0] & 0x20) != 0;
        let line_offset = body[0] & 0x1F;
        node.push(Node::leaf("field_parity", field_parity));
        node.push(Node::leaf("line_offset", line_offset));
        if body[1] != FRAMING_CODE {
            node = node.note("bad framing code");
            return node;
        }

        // Transmission is LSB first; the Hamming code words apply to
        // the bit-reversed bytes.
        let addr1 = hamming_8_4(body[2].reverse_bits());
        let addr2 = hamming_8_4(body[3].reverse_bits());
        let (Some(n1), Some(n2)) = (addr1, addr2) else {
            return node.note("uncorrectable packet address");
        };
        let magazine = match n1 & 0x07 {
            0 => 8,
            m => m,
        };
        let packet = (n2 << 1) | (n1 >> 3);
        node.push(Node::leaf("magazine", magazine));
        node.push(Node::leaf("packet", packet));

        // Packet 0 is the page header; its first two bytes carry the
        // page number digits.
        if packet == 0 && body.len() >= 6 {
            let units = hamming_8_4(body[4].reverse_bits());
            let tens = hamming_8_4(body[5].reverse_bits());
            if let (Some(units), Some(tens)) = (units, tens) {
                let page = ((magazine as u16) << 8) | ((tens as u16) << 4) | units as u16;
                node.push(
                    Node::new("page_header").child(
                        Node::leaf("page", page as u64).note(format!("{:03X}", page)),
                    ),
                );
            } else {
                node = node.note("uncorrectable page number");
            }
        }
        node
    }
}

impl EsDecoder for TeletextDecoder {
    fn feed(&mut self, pes: &PesUnit) -> Vec<Node> {
        let data = &pes.payload;
        if data.is_empty() {
            return Vec::new();
        }
        if !(0x10..=0x1F).contains(&data[0]) {
            log::debug!("unexpected teletext data identifier {:#04x}", data[0]);
            return vec![Node::new("teletext_data")
                .value(data[0])
                .note("unexpected data identifier")];
        }

        let mut node = Node::new("teletext_data").child(Node::leaf("data_identifier", data[0]));
        let mut pos = 1;
        while pos + 2 <= data.len() {
            let unit_id = data[pos];
            let unit_length = data[pos + 1] as usize;
            pos += 2;
            let end = (pos + unit_length).min(data.len());
            match unit_id {
                DATA_UNIT_TELETEXT | DATA_UNIT_SUBTITLE => {
                    node.push(self.data_unit_to_node(&data[pos..end]));
                }
                DATA_UNIT_STUFFING => {}
                other => {
                    log::debug!("unhandled teletext data unit {:#04x}", other);
                }
            }
            pos = end;
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

    fn encode(value: u8) -> u8 {
        HAMMING_8_4[value as usize].reverse_bits()
    }

    #[test]
    fn test_hamming_single_bit_correction() {
        for value in 0u8..16 {
            let code = HAMMING_8_4[value as usize];
            assert_eq!(hamming_8_4(code), Some(value));
            for bit in 0..8 {
                assert_eq!(hamming_8_4(code ^ (1 << bit)), Some(value), "value {}", value);
            }
        }
        // 0x07 is at distance >= 2 from every code word.
        assert_eq!(hamming_8_4(0x07), None);
    }

    #[test]
    fn test_page_header_decode() {
        // Magazine 1 packet 0: addr nibbles n1 = 0b0001, n2 = 0.
        let mut body = vec![0x20 | 0x07, FRAMING_CODE, encode(0x01), encode(0x00)];
        // Page 0x47: units 7, tens 4.
        body.push(encode(0x07));
        body.push(encode(0x04));
        body.resize(44, 0x00);

        let mut payload = vec![0x10, DATA_UNIT_SUBTITLE, 44];
        payload.extend_from_slice(&body);

        let mut dec = TeletextDecoder::new();
        let nodes = dec.feed(&unit(&payload));
        let du = nodes[0]
            .children
            .iter()
            .find(|c| c.label == "teletext_data_unit")
            .unwrap();
        let header = du
            .children
            .iter()
            .find(|c| c.label == "page_header")
            .unwrap();
        assert_eq!(header.children[0].note.as_deref(), Some("147"));
    }
}
