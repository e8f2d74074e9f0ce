use chrono::NaiveDateTime;

use super::desc::{Descriptor, DescriptorContext, DescriptorEngine};
use super::sdt::RUNNING_STATUS;
use super::time::{decode_bcd_duration, decode_utc};
use super::Section;
use crate::node::Node;

/// One event of an EIT section.
#[derive(Debug, Clone)]
pub struct EitEvent {
    pub event_id: u16,
    pub start_time: Option<NaiveDateTime>,
    /// Duration in seconds; `None` when the BCD field is malformed.
    pub duration: Option<u32>,
    pub running_status: u8,
    pub free_ca_mode: bool,
    pub descriptors: Vec<Descriptor>,
}

/// Event Information Table (present/following and schedule flavours).
#[derive(Debug, Clone)]
pub struct Eit {
    pub service_id: u16,
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub version_number: u8,
    pub segment_last_section_number: u8,
    pub last_table_id: u8,
    pub events: Vec<EitEvent>,
}

impl Eit {
    pub fn parse(
        section: &Section,
        engine: &DescriptorEngine,
        pds_override: Option<u32>,
    ) -> Option<Eit> {
        let data = section.body();
        if data.len() < 6 {
            log::debug!("EIT section too short");
            return None;
        }

        let transport_stream_id = u16::from_be_bytes([data[0], data[1]]);
        let original_network_id = u16::from_be_bytes([data[2], data[3]]);
        let segment_last_section_number = data[4];
        let last_table_id = data[5];

        let mut events = Vec::new();
        let mut pos = 6;
        while pos + 12 <= data.len() {
            let event_id = u16::from_be_bytes([data[pos], data[pos + 1]]);
            let start_time = decode_utc(&data[pos + 2..pos + 7]);
            let duration = decode_bcd_duration(&data[pos + 7..pos + 10]);
            let running_status = data[pos + 10] >> 5;
            let free_ca_mode = (data[pos + 10] & 0x10) != 0;
            let loop_length =
                (((data[pos + 10] & 0x0F) as usize) << 8) | data[pos + 11] as usize;
            pos += 12;

            let end = (pos + loop_length).min(data.len());
            let (descriptors, _) = engine.decode_loop(
                &data[pos..end],
                DescriptorContext::EventInformation,
                None,
                pds_override,
            );
            pos = end;

            events.push(EitEvent {
                event_id,
                start_time,
                duration,
                running_status,
                free_ca_mode,
                descriptors,
            });
        }

        Some(Eit {
            service_id: section.header.table_id_extension,
            transport_stream_id,
            original_network_id,
            version_number: section.header.version_number,
            segment_last_section_number,
            last_table_id,
            events,
        })
    }

    pub fn to_node(&self) -> Node {
        let mut node = Node::new("EIT")
            .value(self.service_id)
            .child(Node::leaf("service_id", self.service_id))
            .child(Node::leaf("transport_stream_id", self.transport_stream_id))
            .child(Node::leaf("original_network_id", self.original_network_id))
            .child(Node::leaf("version_number", self.version_number));
        for event in &self.events {
            let mut e = Node::new("event")
                .value(event.event_id)
                .child(Node::leaf("event_id", event.event_id))
                .child(
                    Node::leaf("running_status", event.running_status)
                        .note(RUNNING_STATUS[event.running_status as usize & 0x07]),
                )
                .child(Node::leaf("free_CA_mode", event.free_ca_mode));
            if let Some(start) = event.start_time {
                e.push(Node::leaf("start_time", start.to_string()));
            }
            if let Some(duration) = event.duration {
                e.push(Node::leaf("duration", duration as u64).note("seconds"));
            }
            e.children
                .extend(event.descriptors.iter().map(Descriptor::to_node));
            node.push(e);
        }
        node
    }
}
