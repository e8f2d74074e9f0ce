use super::desc::{Descriptor, DescriptorBody, DescriptorContext, DescriptorEngine};
use super::Section;
use crate::node::Node;

pub const RUNNING_STATUS: [&str; 8] = [
    "undefined",
    "not running",
    "starts in a few seconds",
    "pausing",
    "running",
    "service off-air",
    "reserved",
    "reserved",
];

/// One service loop entry of an SDT.
#[derive(Debug, Clone)]
pub struct SdtService {
    pub service_id: u16,
    pub eit_schedule: bool,
    pub eit_present_following: bool,
    pub running_status: u8,
    pub free_ca_mode: bool,
    pub descriptors: Vec<Descriptor>,
}

impl SdtService {
    /// Service name from the service descriptor, when present.
    pub fn name(&self) -> Option<&str> {
        self.descriptors.iter().find_map(|d| match &d.body {
            DescriptorBody::Service { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }
}

/// Service Description Table.
#[derive(Debug, Clone)]
pub struct Sdt {
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub version_number: u8,
    pub services: Vec<SdtService>,
}

impl Sdt {
    pub fn parse(
        section: &Section,
        engine: &DescriptorEngine,
        pds_override: Option<u32>,
    ) -> Option<Sdt> {
        let data = section.body();
        if data.len() < 3 {
            log::debug!("SDT section too short");
            return None;
        }

        let original_network_id = u16::from_be_bytes([data[0], data[1]]);
        let mut pos = 3; // one reserved byte after the network id
        let mut services = Vec::new();

        while pos + 5 <= data.len() {
            let service_id = u16::from_be_bytes([data[pos], data[pos + 1]]);
            let eit_schedule = (data[pos + 2] & 0x02) != 0;
            let eit_present_following = (data[pos + 2] & 0x01) != 0;
            let running_status = data[pos + 3] >> 5;
            let free_ca_mode = (data[pos + 3] & 0x10) != 0;
            let loop_length = (((data[pos + 3] & 0x0F) as usize) << 8) | data[pos + 4] as usize;
            pos += 5;

            let end = (pos + loop_length).min(data.len());
            let (descriptors, _) = engine.decode_loop(
                &data[pos..end],
                DescriptorContext::ServiceDescription,
                None,
                pds_override,
            );
            pos = end;

            services.push(SdtService {
                service_id,
                eit_schedule,
                eit_present_following,
                running_status,
                free_ca_mode,
                descriptors,
            });
        }

        Some(Sdt {
            transport_stream_id: section.header.table_id_extension,
            original_network_id,
            version_number: section.header.version_number,
            services,
        })
    }

    pub fn to_node(&self) -> Node {
        let mut node = Node::new("SDT")
            .child(Node::leaf("transport_stream_id", self.transport_stream_id))
            .child(Node::leaf("original_network_id", self.original_network_id))
            .child(Node::leaf("version_number", self.version_number));
        for service in &self.services {
            let mut s = Node::new("service")
                .value(service.service_id)
                .child(Node::leaf("service_id", service.service_id))
                .child(
                    Node::leaf("running_status", service.running_status)
                        .note(RUNNING_STATUS[service.running_status as usize & 0x07]),
                )
                .child(Node::leaf("free_CA_mode", service.free_ca_mode))
                .child(Node::leaf("EIT_schedule_flag", service.eit_schedule))
                .child(Node::leaf(
                    "EIT_present_following_flag",
                    service.eit_present_following,
                ));
            if let Some(name) = service.name() {
                s = s.note(name.to_string());
            }
            s.children
                .extend(service.descriptors.iter().map(Descriptor::to_node));
            node.push(s);
        }
        node
    }
}
