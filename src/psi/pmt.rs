use super::desc::{Descriptor, DescriptorBody, DescriptorContext, DescriptorEngine};
use super::Section;
use crate::node::Node;
use crate::ts::StreamType;

/// One elementary stream entry of a PMT.
#[derive(Debug, Clone)]
pub struct PmtStream {
    pub stream_type: u8,
    pub elementary_pid: u16,
    pub descriptors: Vec<Descriptor>,
}

impl PmtStream {
    /// Payload kind for this PID, with the private stream type 0x06
    /// refined by its descriptors and RDS recognized through a
    /// registration descriptor.
    pub fn stream_kind(&self) -> StreamType {
        let base = StreamType::from_pmt(self.stream_type);
        if base != StreamType::PrivateData {
            return base;
        }
        for d in &self.descriptors {
            match &d.body {
                DescriptorBody::Teletext { .. } => return StreamType::Teletext,
                DescriptorBody::Subtitling { .. } => return StreamType::DvbSubtitles,
                DescriptorBody::Registration {
                    format_identifier, ..
                } if *format_identifier == u32::from_be_bytes(*b"RDS ") => {
                    return StreamType::Rds;
                }
                _ => {}
            }
        }
        StreamType::PrivateData
    }
}

/// Program Map Table.
#[derive(Debug, Clone)]
pub struct Pmt {
    pub program_number: u16,
    pub version_number: u8,
    pub pcr_pid: u16,
    pub program_descriptors: Vec<Descriptor>,
    pub streams: Vec<PmtStream>,
}

impl Pmt {
    /// Parses one PMT section. `pds_override` forces the private
    /// descriptor namespace; otherwise any private-data-specifier
    /// descriptor seen in a loop applies to the rest of that loop.
    pub fn parse(
        section: &Section,
        engine: &DescriptorEngine,
        pds_override: Option<u32>,
    ) -> Option<Pmt> {
        let data = section.body();
        if data.len() < 4 {
            log::debug!("PMT section too short");
            return None;
        }

        let pcr_pid = (((data[0] & 0x1F) as u16) << 8) | data[1] as u16;
        let program_info_length = (((data[2] & 0x0F) as usize) << 8) | data[3] as usize;
        let mut pos = 4;

        let info_end = (pos + program_info_length).min(data.len());
        let (program_descriptors, pds) = engine.decode_loop(
            &data[pos..info_end],
            DescriptorContext::ProgramMap,
            None,
            pds_override,
        );
        pos = info_end;

        let mut streams = Vec::new();
        while pos + 5 <= data.len() {
            let stream_type = data[pos];
            let elementary_pid = (((data[pos + 1] & 0x1F) as u16) << 8) | data[pos + 2] as u16;
            let es_info_length = (((data[pos + 3] & 0x0F) as usize) << 8) | data[pos + 4] as usize;
            pos += 5;

            let es_end = (pos + es_info_length).min(data.len());
            let (descriptors, _) = engine.decode_loop(
                &data[pos..es_end],
                DescriptorContext::ProgramMap,
                pds,
                pds_override,
            );
            pos = es_end;

            streams.push(PmtStream {
                stream_type,
                elementary_pid,
                descriptors,
            });
        }

        Some(Pmt {
            program_number: section.header.table_id_extension,
            version_number: section.header.version_number,
            pcr_pid,
            program_descriptors,
            streams,
        })
    }

    pub fn to_node(&self) -> Node {
        let mut node = Node::new("PMT")
            .value(self.program_number)
            .child(Node::leaf("program_number", self.program_number))
            .child(Node::leaf("version_number", self.version_number))
            .child(Node::leaf("PCR_PID", self.pcr_pid));
        if !self.program_descriptors.is_empty() {
            node.push(
                Node::new("program_info")
                    .children(self.program_descriptors.iter().map(Descriptor::to_node)),
            );
        }
        for stream in &self.streams {
            let mut s = Node::new("stream")
                .value(stream.elementary_pid)
                .note(stream.stream_kind().describe())
                .child(Node::leaf("stream_type", stream.stream_type))
                .child(Node::leaf("elementary_PID", stream.elementary_pid));
            s.children
                .extend(stream.descriptors.iter().map(Descriptor::to_node));
            node.push(s);
        }
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::test_support::build_section;
    use crate::psi::SectionAssembler;
    use pretty_assertions::assert_eq;

    fn parse_pmt_body(body: &[u8]) -> Pmt {
        let raw = build_section(0x02, 0x0001, 0, body);
        let mut payload = vec![0u8];
        payload.extend_from_slice(&raw);
        payload.resize(1 + raw.len(), 0);
        let sections = SectionAssembler::new().push(true, &payload);
        Pmt::parse(&sections[0], &DescriptorEngine::new(), None).unwrap()
    }

    #[test]
    fn test_parse_pmt_streams() {
        let body = [
            0xE1, 0x00, // PCR PID 0x100
            0xF0, 0x00, // no program descriptors
            0x1B, 0xE1, 0x00, 0xF0, 0x00, // H.264 on PID 0x100
            0x0F, 0xE1, 0x01, 0xF0, 0x00, // ADTS AAC on PID 0x101
        ];
        let pmt = parse_pmt_body(&body);
        assert_eq!(pmt.pcr_pid, 0x100);
        assert_eq!(pmt.streams.len(), 2);
        assert_eq!(pmt.streams[0].stream_kind(), StreamType::H264);
        assert_eq!(pmt.streams[1].stream_kind(), StreamType::AdtsAac);
    }

    #[test]
    fn test_private_stream_refined_by_descriptors() {
        let body = [
            0xE1, 0x00, 0xF0, 0x00, //
            // stream_type 0x06 with a teletext descriptor
            0x06, 0xE1, 0x02, 0xF0, 0x07, 0x56, 0x05, b'd', b'e', b'u', 0x08, 0x64,
            // stream_type 0x06 with a subtitling descriptor
            0x06, 0xE1, 0x03, 0xF0, 0x0A, 0x59, 0x08, b'd', b'e', b'u', 0x10, 0x00, 0x01,
            0x00, 0x02,
        ];
        let pmt = parse_pmt_body(&body);
        assert_eq!(pmt.streams.len(), 2);
        assert_eq!(pmt.streams[0].stream_kind(), StreamType::Teletext);
        assert_eq!(pmt.streams[1].stream_kind(), StreamType::DvbSubtitles);
    }
}
