use chrono::NaiveDateTime;

use super::desc::{Descriptor, DescriptorContext, DescriptorEngine};
use super::time::decode_utc;
use super::{Section, TABLE_ID_TOT};
use crate::node::Node;

/// Time and Date Table, and its descriptor-carrying sibling the Time
/// Offset Table.
#[derive(Debug, Clone)]
pub struct Tdt {
    pub utc_time: Option<NaiveDateTime>,
    /// Local-time-offset descriptors; present only for a TOT.
    pub descriptors: Vec<Descriptor>,
}

impl Tdt {
    pub fn parse(
        section: &Section,
        engine: &DescriptorEngine,
        pds_override: Option<u32>,
    ) -> Option<Tdt> {
        let data = section.body();
        if data.len() < 5 {
            log::debug!("TDT section too short");
            return None;
        }

        let utc_time = decode_utc(&data[..5]);

        let descriptors = if section.header.table_id == TABLE_ID_TOT && data.len() >= 7 {
            let loop_length = (((data[5] & 0x0F) as usize) << 8) | data[6] as usize;
            let end = (7 + loop_length).min(data.len());
            engine
                .decode_loop(
                    &data[7..end],
                    DescriptorContext::NetworkInformation,
                    None,
                    pds_override,
                )
                .0
        } else {
            Vec::new()
        };

        Some(Tdt {
            utc_time,
            descriptors,
        })
    }

    pub fn to_node(&self, table_id: u8) -> Node {
        let label = if table_id == TABLE_ID_TOT { "TOT" } else { "TDT" };
        let mut node = Node::new(label);
        match self.utc_time {
            Some(t) => node.push(Node::leaf("UTC_time", t.to_string())),
            None => node.push(Node::new("UTC_time").note("undefined")),
        }
        node.children
            .extend(self.descriptors.iter().map(Descriptor::to_node));
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::SectionAssembler;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_tdt() {
        // TDT: short section, no CRC, 5-byte UTC time.
        let payload = [
            0x00, // pointer
            0x70, 0x70, 0x05, // table id, syntax 0, length 5
            0xC0, 0x79, 0x12, 0x45, 0x00,
        ];
        let sections = SectionAssembler::new().push(true, &payload);
        assert_eq!(sections.len(), 1);
        assert!(sections[0].crc.is_none());

        let tdt = Tdt::parse(&sections[0], &DescriptorEngine::new(), None).unwrap();
        assert_eq!(tdt.utc_time.unwrap().to_string(), "1993-10-13 12:45:00");
    }
}
