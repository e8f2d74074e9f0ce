use super::desc::{Descriptor, DescriptorContext, DescriptorEngine};
use super::Section;
use crate::node::Node;

/// One transport-stream loop entry of a NIT.
#[derive(Debug, Clone)]
pub struct NitTransportStream {
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub descriptors: Vec<Descriptor>,
}

/// Network Information Table.
#[derive(Debug, Clone)]
pub struct Nit {
    pub network_id: u16,
    pub version_number: u8,
    pub network_descriptors: Vec<Descriptor>,
    pub transport_streams: Vec<NitTransportStream>,
}

impl Nit {
    pub fn parse(
        section: &Section,
        engine: &DescriptorEngine,
        pds_override: Option<u32>,
    ) -> Option<Nit> {
        let data = section.body();
        if data.len() < 4 {
            log::debug!("NIT section too short");
            return None;
        }

        let network_loop_length = (((data[0] & 0x0F) as usize) << 8) | data[1] as usize;
        let mut pos = 2;
        let net_end = (pos + network_loop_length).min(data.len());
        let (network_descriptors, pds) = engine.decode_loop(
            &data[pos..net_end],
            DescriptorContext::NetworkInformation,
            None,
            pds_override,
        );
        pos = net_end;

        if pos + 2 > data.len() {
            log::debug!("NIT missing transport stream loop length");
            return None;
        }
        pos += 2; // ts_loop_length; the section end bounds the loop

        let mut transport_streams = Vec::new();
        while pos + 6 <= data.len() {
            let transport_stream_id = u16::from_be_bytes([data[pos], data[pos + 1]]);
            let original_network_id = u16::from_be_bytes([data[pos + 2], data[pos + 3]]);
            let loop_length = (((data[pos + 4] & 0x0F) as usize) << 8) | data[pos + 5] as usize;
            pos += 6;

            let end = (pos + loop_length).min(data.len());
            let (descriptors, _) = engine.decode_loop(
                &data[pos..end],
                DescriptorContext::NetworkInformation,
                pds,
                pds_override,
            );
            pos = end;

            transport_streams.push(NitTransportStream {
                transport_stream_id,
                original_network_id,
                descriptors,
            });
        }

        Some(Nit {
            network_id: section.header.table_id_extension,
            version_number: section.header.version_number,
            network_descriptors,
            transport_streams,
        })
    }

    pub fn to_node(&self) -> Node {
        let mut node = Node::new("NIT")
            .value(self.network_id)
            .child(Node::leaf("network_id", self.network_id))
            .child(Node::leaf("version_number", self.version_number));
        if !self.network_descriptors.is_empty() {
            node.push(
                Node::new("network_descriptors")
                    .children(self.network_descriptors.iter().map(Descriptor::to_node)),
            );
        }
        for ts in &self.transport_streams {
            let mut t = Node::new("transport_stream")
                .value(ts.transport_stream_id)
                .child(Node::leaf("transport_stream_id", ts.transport_stream_id))
                .child(Node::leaf("original_network_id", ts.original_network_id));
            t.children.extend(ts.descriptors.iter().map(Descriptor::to_node));
            node.push(t);
        }
        node
    }
}
