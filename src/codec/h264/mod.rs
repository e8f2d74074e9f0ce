//! H.264 elementary-stream decoding: Annex-B NAL splitting, parameter
//! set parsing, SEI and slice-header skeletons.

pub mod parser;
pub mod types;

pub use parser::{H264Parser, NalPayload};
pub use types::{NalUnit, NalUnitType, PpsInfo, SliceInfo, SpsInfo};

use bytes::Bytes;

use super::{AnnexBSplitter, EsDecoder};
use crate::node::{Anomaly, Node};
use crate::pes::PesUnit;

pub struct H264Decoder {
    splitter: AnnexBSplitter,
    parser: H264Parser,
}

impl H264Decoder {
    pub fn new() -> Self {
        Self {
            splitter: AnnexBSplitter::new(),
            parser: H264Parser::new(),
        }
    }

    fn nal_to_node(&mut self, nal_bytes: Bytes) -> Node {
        match self.parser.parse_nal(&nal_bytes) {
            Ok((nal, payload)) => {
                let nal_type = NalUnitType::from(nal.nal_type);
                let mut node = Node::new("NAL_unit")
                    .value(nal.nal_type)
                    .note(nal_type.describe())
                    .child(Node::leaf("nal_ref_idc", nal.nal_ref_idc));
                match payload {
                    NalPayload::Sps(sps) => {
                        node.push(
                            Node::new("seq_parameter_set")
                                .child(Node::leaf("profile_idc", sps.profile_idc))
                                .child(Node::leaf("level_idc", sps.level_idc))
                                .child(Node::leaf("chroma_format_idc", sps.chroma_format_idc))
                                .child(Node::leaf("width", sps.width))
                                .child(Node::leaf("height", sps.height)),
                        );
                    }
                    NalPayload::Pps(pps) => {
                        node.push(
                            Node::new("pic_parameter_set")
                                .child(Node::leaf(
                                    "pic_parameter_set_id",
                                    pps.pic_parameter_set_id,
                                ))
                                .child(Node::leaf(
                                    "seq_parameter_set_id",
                                    pps.seq_parameter_set_id,
                                ))
                                .child(Node::leaf(
                                    "entropy_coding_mode",
                                    pps.entropy_coding_mode,
                                )),
                        );
                    }
                    NalPayload::Sei(messages) => {
                        for m in messages {
                            node.push(
                                Node::new("sei_message")
                                    .value(m.payload_type)
                                    .child(Node::leaf("payload_type", m.payload_type))
                                    .child(Node::leaf("payload_size", m.payload_size)),
                            );
                        }
                    }
                    NalPayload::Slice(slice) => {
                        node.push(
                            Node::new("slice_header")
                                .note(slice.slice_type_name())
                                .child(Node::leaf("first_mb_in_slice", slice.first_mb_in_slice))
                                .child(Node::leaf("slice_type", slice.slice_type))
                                .child(Node::leaf(
                                    "pic_parameter_set_id",
                                    slice.pic_parameter_set_id,
                                )),
                        );
                    }
                    NalPayload::Opaque => {}
                }
                node
            }
            Err(e) => {
                log::debug!("undecodable NAL unit: {}", e);
                Node::new("NAL_unit").anomaly(Anomaly::Truncated)
            }
        }
    }
}

impl Default for H264Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EsDecoder for H264Decoder {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pes::test_support::build_pes;
    use pretty_assertions::assert_eq;

    fn unit(payload: &[u8]) -> PesUnit {
        let bytes = build_pes(0xE0, 0, payload, true);
        let (header, start) = crate::pes::PesHeader::parse(&bytes).unwrap();
        PesUnit {
            header: Some(header),
            payload: Bytes::copy_from_slice(&bytes[start..]),
            anomalies: Vec::new(),
        }
    }

    #[test]
    fn test_nal_spanning_pes_units() {
        let mut dec = H264Decoder::new();
        // Access unit delimiter split across two PES units.
        let nodes = dec.feed(&unit(&[0x00, 0x00, 0x01, 0x09]));
        assert!(nodes.is_empty());
        let nodes = dec.feed(&unit(&[0xF0, 0x00, 0x00, 0x01, 0x0C]));
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].note.as_deref(), Some("access unit delimiter"));

        let tail = dec.finish();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].note.as_deref(), Some("filler data"));
    }
}
