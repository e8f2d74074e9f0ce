use super::Section;
use crate::node::Node;

/// One program association entry. Program number 0 points at the
/// network information PID instead of a PMT.
#[derive(Debug, Clone, PartialEq)]
pub struct PatEntry {
    pub program_number: u16,
    pub network_pid: u16,
    pub program_map_pid: u16,
}

/// Program Association Table.
#[derive(Debug, Clone, Default)]
pub struct Pat {
    pub transport_stream_id: u16,
    pub version_number: u8,
    pub entries: Vec<PatEntry>,
}

impl Pat {
    pub fn parse(section: &Section) -> Pat {
        let data = section.body();
        let mut entries = Vec::new();
        let mut pos = 0;

        while pos + 4 <= data.len() {
            let program_number = u16::from_be_bytes([data[pos], data[pos + 1]]);
            let pid = (((data[pos + 2] & 0x1F) as u16) << 8) | data[pos + 3] as u16;
            entries.push(PatEntry {
                program_number,
                network_pid: if program_number == 0 { pid } else { 0 },
                program_map_pid: if program_number != 0 { pid } else { 0 },
            });
            pos += 4;
        }

        Pat {
            transport_stream_id: section.header.table_id_extension,
            version_number: section.header.version_number,
            entries,
        }
    }

    pub fn to_node(&self) -> Node {
        let mut node = Node::new("PAT")
            .child(Node::leaf("transport_stream_id", self.transport_stream_id))
            .child(Node::leaf("version_number", self.version_number));
        for entry in &self.entries {
            let child = if entry.program_number == 0 {
                Node::new("network")
                    .child(Node::leaf("network_PID", entry.network_pid))
            } else {
                Node::new("program")
                    .value(entry.program_number)
                    .child(Node::leaf("program_number", entry.program_number))
                    .child(Node::leaf("program_map_PID", entry.program_map_pid))
            };
            node.push(child);
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

    #[test]
    fn test_parse_pat() {
        // Program 1 -> PMT PID 0x1000, network PID on program 0.
        let body = [
            0x00, 0x00, 0xE0, 0x10, // program 0 -> NIT PID 0x10
            0x00, 0x01, 0xF0, 0x00, // program 1 -> PMT PID 0x1000
        ];
        let raw = build_section(0x00, 0x0001, 2, &body);
        let mut payload = vec![0u8];
        payload.extend_from_slice(&raw);
        payload.resize(184, 0xFF);

        let sections = SectionAssembler::new().push(true, &payload);
        let pat = Pat::parse(&sections[0]);

        assert_eq!(pat.transport_stream_id, 1);
        assert_eq!(pat.version_number, 2);
        assert_eq!(pat.entries.len(), 2);
        assert_eq!(pat.entries[0].network_pid, 0x0010);
        assert_eq!(pat.entries[1].program_number, 1);
        assert_eq!(pat.entries[1].program_map_pid, 0x1000);
    }
}
