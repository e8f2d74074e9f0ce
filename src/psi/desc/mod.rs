//! Descriptor decoding engine.
//!
//! Descriptors are tagged, length-prefixed records nested inside
//! sections. The same tag byte means different things in different
//! table contexts, in the extension namespaces behind tags 0x3F/0x7F,
//! and in private namespaces selected by a 32-bit private data
//! specifier. Dispatch therefore runs over an explicit
//! `(context, tag)` lookup table built once at engine construction.
//!
//! Declared length is authoritative for loop iteration: the next
//! descriptor always starts at `offset + 2 + length`, no matter how
//! many bytes the selected decoder actually consumed. A disagreement
//! is recorded as a [`Anomaly::LengthMismatch`] on that descriptor
//! only, bounding the blast radius of a malformed record to itself.

mod dvb;
mod mpeg;
mod private;

use std::collections::HashMap;

use crate::error::Result;
use crate::node::{Anomaly, Node};

/// Table family enclosing a descriptor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorContext {
    /// PMT program and ES loops, CAT.
    ProgramMap,
    /// SDT service loops.
    ServiceDescription,
    /// EIT event loops.
    EventInformation,
    /// NIT network and transport-stream loops, TOT.
    NetworkInformation,
    /// DSM-CC carousel module info.
    Dsmcc,
    /// Update notification table.
    Unt,
    /// Application information table.
    Ait,
}

/// Decoded descriptor payload. Unknown tags keep their raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum DescriptorBody {
    // MPEG (ISO/IEC 13818-1)
    VideoStream {
        multiple_frame_rate: bool,
        frame_rate_code: u8,
        mpeg1_only: bool,
        constrained_parameter: bool,
        still_picture: bool,
    },
    AudioStream {
        free_format: bool,
        id: u8,
        layer: u8,
        variable_rate: bool,
    },
    Registration {
        format_identifier: u32,
        additional: Vec<u8>,
    },
    DataStreamAlignment {
        alignment_type: u8,
    },
    ConditionalAccess {
        ca_system_id: u16,
        ca_pid: u16,
        private_data: Vec<u8>,
    },
    Iso639Language {
        entries: Vec<LanguageEntry>,
    },
    MaximumBitrate {
        /// Units of 50 bytes/second.
        bitrate: u32,
    },
    SystemClock {
        external_clock_reference: bool,
        accuracy_integer: u8,
        accuracy_exponent: u8,
    },
    /// MPEG extension namespace (tag 0x3F), kept generic.
    MpegExtension {
        extension_tag: u8,
        data: Vec<u8>,
    },

    // DVB (ETSI EN 300 468)
    NetworkName {
        name: String,
    },
    ServiceList {
        services: Vec<ServiceListEntry>,
    },
    SatelliteDelivery {
        frequency_ghz: f64,
        orbital_position: f64,
        west_east: bool,
        polarization: u8,
        modulation: u8,
        symbol_rate: f64,
        fec_inner: u8,
    },
    CableDelivery {
        frequency_mhz: f64,
        fec_outer: u8,
        modulation: u8,
        symbol_rate: f64,
        fec_inner: u8,
    },
    TerrestrialDelivery {
        centre_frequency_hz: u64,
        bandwidth: u8,
        constellation: u8,
        hierarchy: u8,
        code_rate_hp: u8,
        code_rate_lp: u8,
        guard_interval: u8,
        transmission_mode: u8,
        other_frequency: bool,
    },
    Service {
        service_type: u8,
        provider: String,
        name: String,
    },
    Linkage {
        transport_stream_id: u16,
        original_network_id: u16,
        service_id: u16,
        linkage_type: u8,
        private_data: Vec<u8>,
    },
    ShortEvent {
        language: String,
        event_name: String,
        text: String,
    },
    ExtendedEvent {
        descriptor_number: u8,
        last_descriptor_number: u8,
        language: String,
        items: Vec<ExtendedEventItem>,
        text: String,
    },
    Component {
        stream_content: u8,
        component_type: u8,
        component_tag: u8,
        language: String,
        text: String,
    },
    StreamIdentifier {
        component_tag: u8,
    },
    Content {
        entries: Vec<ContentEntry>,
    },
    ParentalRating {
        entries: Vec<ParentalRatingEntry>,
    },
    Teletext {
        entries: Vec<TeletextEntry>,
    },
    Subtitling {
        entries: Vec<SubtitlingEntry>,
    },
    LocalTimeOffset {
        entries: Vec<LocalTimeOffsetEntry>,
    },
    PrivateDataSpecifier {
        specifier: u32,
    },
    DataBroadcastId {
        data_broadcast_id: u16,
        selector: Vec<u8>,
    },
    Ac3 {
        component_type: Option<u8>,
        bsid: Option<u8>,
        mainid: Option<u8>,
        asvc: Option<u8>,
    },
    EnhancedAc3 {
        component_type: Option<u8>,
        bsid: Option<u8>,
        mixinfoexists: bool,
    },
    ApplicationSignalling {
        entries: Vec<ApplicationSignallingEntry>,
    },
    /// DVB extension namespace (tag 0x7F).
    SupplementaryAudio {
        mix_type: u8,
        editorial_classification: u8,
        language: Option<String>,
    },
    T2DeliverySystem {
        plp_id: u8,
        t2_system_id: u16,
    },
    DvbExtension {
        extension_tag: u8,
        data: Vec<u8>,
    },

    // DSM-CC / UNT / AIT namespaces
    CompressedModule {
        compression_method: u8,
        original_size: u32,
    },
    SsuSubgroupAssociation {
        subgroup_tag: u64,
    },
    ApplicationName {
        entries: Vec<(String, String)>,
    },
    TransportProtocol {
        protocol_id: u16,
        transport_protocol_label: u8,
        selector: Vec<u8>,
    },

    // Private namespaces keyed by private data specifier
    LogicalChannel {
        entries: Vec<LogicalChannelEntry>,
    },

    /// No decoder variant matched; raw bytes preserved.
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LanguageEntry {
    pub language: String,
    pub audio_type: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceListEntry {
    pub service_id: u16,
    pub service_type: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedEventItem {
    pub description: String,
    pub item: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentEntry {
    pub content_nibble_level_1: u8,
    pub content_nibble_level_2: u8,
    pub user_byte: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParentalRatingEntry {
    pub country_code: String,
    pub rating: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeletextEntry {
    pub language: String,
    pub teletext_type: u8,
    pub magazine_number: u8,
    pub page_number: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubtitlingEntry {
    pub language: String,
    pub subtitling_type: u8,
    pub composition_page_id: u16,
    pub ancillary_page_id: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalTimeOffsetEntry {
    pub country_code: String,
    pub country_region_id: u8,
    pub polarity: bool,
    /// Offset in minutes.
    pub local_time_offset: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationSignallingEntry {
    pub application_type: u16,
    pub ait_version_number: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalChannelEntry {
    pub service_id: u16,
    pub visible: bool,
    pub logical_channel_number: u16,
}

/// One decoded descriptor: tag, raw body and typed payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub tag: u8,
    pub data: Vec<u8>,
    pub body: DescriptorBody,
    pub anomalies: Vec<Anomaly>,
}

impl Descriptor {
    pub fn to_node(&self) -> Node {
        let mut node = Node::new(descriptor_name(self.tag, &self.body))
            .value(self.tag)
            .children(body_fields(&self.body));
        if matches!(self.body, DescriptorBody::Unknown) {
            node.push(Node::leaf("data", self.data.clone()));
        }
        node.anomalies = self.anomalies.clone();
        node
    }
}

type DecodeFn = fn(&[u8]) -> Result<(DescriptorBody, usize)>;

/// The `(context, tag)` dispatch engine. Built once, read-only during
/// a pass.
pub struct DescriptorEngine {
    table: HashMap<(DescriptorContext, u8), DecodeFn>,
    dvb_extension: HashMap<u8, DecodeFn>,
    private: HashMap<(u32, u8), DecodeFn>,
}

/// Private-data-specifier values with registered decoder families.
pub const PDS_EACEM: u32 = 0x0000_0028;
pub const PDS_NORDIG: u32 = 0x0000_0029;

const DVB_CONTEXTS: [DescriptorContext; 4] = [
    DescriptorContext::ServiceDescription,
    DescriptorContext::EventInformation,
    DescriptorContext::NetworkInformation,
    DescriptorContext::ProgramMap,
];

impl Default for DescriptorEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorEngine {
    pub fn new() -> Self {
        let mut engine = DescriptorEngine {
            table: HashMap::new(),
            dvb_extension: HashMap::new(),
            private: HashMap::new(),
        };
        engine.register_mpeg();
        engine.register_dvb();
        engine.register_namespaces();
        engine
    }

    fn reg(&mut self, contexts: &[DescriptorContext], tag: u8, f: DecodeFn) {
        for &ctx in contexts {
            self.table.insert((ctx, tag), f);
        }
    }

    fn register_mpeg(&mut self) {
        use DescriptorContext::*;
        self.reg(&[ProgramMap], 0x02, mpeg::video_stream);
        self.reg(&[ProgramMap], 0x03, mpeg::audio_stream);
        self.reg(&[ProgramMap], 0x05, mpeg::registration);
        self.reg(&[ProgramMap], 0x06, mpeg::data_stream_alignment);
        self.reg(&[ProgramMap], 0x09, mpeg::conditional_access);
        self.reg(&[ProgramMap, EventInformation], 0x0A, mpeg::iso639_language);
        self.reg(&[ProgramMap], 0x0B, mpeg::system_clock);
        self.reg(&[ProgramMap], 0x0E, mpeg::maximum_bitrate);
    }

    fn register_dvb(&mut self) {
        use DescriptorContext::*;
        self.reg(&[NetworkInformation], 0x40, dvb::network_name);
        self.reg(&[NetworkInformation], 0x41, dvb::service_list);
        self.reg(&[NetworkInformation], 0x43, dvb::satellite_delivery);
        self.reg(&[NetworkInformation], 0x44, dvb::cable_delivery);
        self.reg(&[NetworkInformation], 0x5A, dvb::terrestrial_delivery);
        self.reg(&[ServiceDescription], 0x48, dvb::service);
        self.reg(&DVB_CONTEXTS, 0x4A, dvb::linkage);
        self.reg(&[EventInformation], 0x4D, dvb::short_event);
        self.reg(&[EventInformation], 0x4E, dvb::extended_event);
        self.reg(&[EventInformation, ServiceDescription], 0x50, dvb::component);
        self.reg(&[ProgramMap], 0x52, dvb::stream_identifier);
        self.reg(&[EventInformation], 0x54, dvb::content);
        self.reg(&[EventInformation], 0x55, dvb::parental_rating);
        self.reg(&[ProgramMap], 0x56, dvb::teletext);
        self.reg(&[ProgramMap], 0x59, dvb::subtitling);
        self.reg(&[NetworkInformation], 0x58, dvb::local_time_offset);
        self.reg(&DVB_CONTEXTS, 0x5F, dvb::private_data_specifier);
        self.reg(&[ProgramMap], 0x66, dvb::data_broadcast_id);
        self.reg(&[ProgramMap], 0x6A, dvb::ac3);
        self.reg(&[ProgramMap], 0x6F, dvb::application_signalling);
        self.reg(&[ProgramMap], 0x7A, dvb::enhanced_ac3);

        self.dvb_extension.insert(0x04, dvb::t2_delivery_system);
        self.dvb_extension.insert(0x06, dvb::supplementary_audio);
    }

    fn register_namespaces(&mut self) {
        use DescriptorContext::*;
        // DSM-CC module info: tag 0x09 is the compressed module
        // descriptor, a different layout from CA under PMT and from
        // the SSU subgroup association under UNT.
        self.reg(&[Dsmcc], 0x09, private::compressed_module);
        self.reg(&[Unt], 0x09, private::ssu_subgroup_association);
        self.reg(&[Ait], 0x01, private::application_name);
        self.reg(&[Ait], 0x02, private::transport_protocol);

        for pds in [PDS_EACEM, PDS_NORDIG] {
            self.private.insert((pds, 0x83), private::logical_channel);
        }
    }

    /// Decodes one descriptor body that has already been sliced to its
    /// declared length.
    pub fn decode(
        &self,
        tag: u8,
        data: &[u8],
        ctx: DescriptorContext,
        pds: Option<u32>,
    ) -> Descriptor {
        let decoder: Option<DecodeFn> = if tag == 0x3F {
            Some(mpeg::extension)
        } else if tag == 0x7F {
            Some(dvb_extension_entry)
        } else if tag >= 0x80 {
            pds.and_then(|pds| self.private.get(&(pds, tag)).copied())
        } else {
            self.table.get(&(ctx, tag)).copied()
        };

        let Some(decoder) = decoder else {
            return Descriptor {
                tag,
                data: data.to_vec(),
                body: DescriptorBody::Unknown,
                anomalies: vec![Anomaly::UnknownTag(tag)],
            };
        };

        // 0x7F needs the engine's extension table; everything else is a
        // free function.
        let result = if tag == 0x7F {
            self.decode_dvb_extension(data)
        } else {
            decoder(data)
        };

        match result {
            Ok((body, consumed)) => {
                let mut anomalies = Vec::new();
                if consumed != data.len() {
                    anomalies.push(Anomaly::LengthMismatch {
                        declared: data.len(),
                        consumed,
                    });
                }
                Descriptor {
                    tag,
                    data: data.to_vec(),
                    body,
                    anomalies,
                }
            }
            Err(_) => Descriptor {
                tag,
                data: data.to_vec(),
                body: DescriptorBody::Unknown,
                anomalies: vec![Anomaly::Truncated],
            },
        }
    }

    fn decode_dvb_extension(&self, data: &[u8]) -> Result<(DescriptorBody, usize)> {
        let Some((&ext_tag, rest)) = data.split_first() else {
            return Err(crate::error::TsError::Truncated {
                needed: 8,
                remaining: 0,
            });
        };
        match self.dvb_extension.get(&ext_tag) {
            Some(f) => {
                let (body, consumed) = f(rest)?;
                Ok((body, consumed + 1))
            }
            None => Ok((
                DescriptorBody::DvbExtension {
                    extension_tag: ext_tag,
                    data: rest.to_vec(),
                },
                data.len(),
            )),
        }
    }

    /// Decodes a full descriptor loop.
    ///
    /// `pds` carries the private-data-specifier active when the loop
    /// starts; a private-data-specifier descriptor inside the loop
    /// updates it for the remaining descriptors, and the returned value
    /// lets the caller thread it into subsequent loops of the same
    /// table. An externally supplied override always wins.
    pub fn decode_loop(
        &self,
        data: &[u8],
        ctx: DescriptorContext,
        pds: Option<u32>,
        pds_override: Option<u32>,
    ) -> (Vec<Descriptor>, Option<u32>) {
        let mut out = Vec::new();
        let mut pds = pds;
        let mut pos = 0;

        while pos + 2 <= data.len() {
            let tag = data[pos];
            let length = data[pos + 1] as usize;
            let body_start = pos + 2;
            // Declared length is authoritative for iteration.
            pos = body_start + length;

            let (body, truncated) = if pos <= data.len() {
                (&data[body_start..pos], false)
            } else {
                (&data[body_start..], true)
            };

            let mut descriptor = self.decode(tag, body, ctx, pds_override.or(pds));
            if truncated {
                descriptor.anomalies.push(Anomaly::LengthMismatch {
                    declared: length,
                    consumed: body.len(),
                });
            }

            if let DescriptorBody::PrivateDataSpecifier { specifier } = descriptor.body {
                pds = Some(specifier);
            }
            out.push(descriptor);
        }

        (out, pds)
    }
}

// Placeholder sentinel for the 0x7F dispatch above; never called.
fn dvb_extension_entry(_data: &[u8]) -> Result<(DescriptorBody, usize)> {
    unreachable!("0x7F is dispatched through DescriptorEngine::decode_dvb_extension")
}

/// Reads a DVB text field. A leading byte below 0x20 selects the
/// character table; everything printable is mapped as Latin-1.
pub(crate) fn dvb_string(data: &[u8]) -> String {
    let data = match data.first() {
        Some(&b) if b < 0x20 => &data[1..],
        _ => data,
    };
    data.iter()
        .filter(|&&b| b >= 0x20 || b == b'\n')
        .map(|&b| b as char)
        .collect()
}

/// Three-character ISO 639 language code.
pub(crate) fn lang_code(data: &[u8]) -> String {
    data.iter().take(3).map(|&b| (b as char)).collect()
}

/// Reads `digits` BCD digits as a decimal number.
pub(crate) fn bcd(data: &[u8], digits: usize) -> u64 {
    let mut v = 0u64;
    for i in 0..digits {
        let byte = data[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
        v = v * 10 + nibble as u64;
    }
    v
}

fn descriptor_name(tag: u8, body: &DescriptorBody) -> String {
    let name = match body {
        DescriptorBody::VideoStream { .. } => "video_stream_descriptor",
        DescriptorBody::AudioStream { .. } => "audio_stream_descriptor",
        DescriptorBody::Registration { .. } => "registration_descriptor",
        DescriptorBody::DataStreamAlignment { .. } => "data_stream_alignment_descriptor",
        DescriptorBody::ConditionalAccess { .. } => "CA_descriptor",
        DescriptorBody::Iso639Language { .. } => "ISO_639_language_descriptor",
        DescriptorBody::MaximumBitrate { .. } => "maximum_bitrate_descriptor",
        DescriptorBody::SystemClock { .. } => "system_clock_descriptor",
        DescriptorBody::MpegExtension { .. } => "MPEG_extension_descriptor",
        DescriptorBody::NetworkName { .. } => "network_name_descriptor",
        DescriptorBody::ServiceList { .. } => "service_list_descriptor",
        DescriptorBody::SatelliteDelivery { .. } => "satellite_delivery_system_descriptor",
        DescriptorBody::CableDelivery { .. } => "cable_delivery_system_descriptor",
        DescriptorBody::TerrestrialDelivery { .. } => "terrestrial_delivery_system_descriptor",
        DescriptorBody::Service { .. } => "service_descriptor",
        DescriptorBody::Linkage { .. } => "linkage_descriptor",
        DescriptorBody::ShortEvent { .. } => "short_event_descriptor",
        DescriptorBody::ExtendedEvent { .. } => "extended_event_descriptor",
        DescriptorBody::Component { .. } => "component_descriptor",
        DescriptorBody::StreamIdentifier { .. } => "stream_identifier_descriptor",
        DescriptorBody::Content { .. } => "content_descriptor",
        DescriptorBody::ParentalRating { .. } => "parental_rating_descriptor",
        DescriptorBody::Teletext { .. } => "teletext_descriptor",
        DescriptorBody::Subtitling { .. } => "subtitling_descriptor",
        DescriptorBody::LocalTimeOffset { .. } => "local_time_offset_descriptor",
        DescriptorBody::PrivateDataSpecifier { .. } => "private_data_specifier_descriptor",
        DescriptorBody::DataBroadcastId { .. } => "data_broadcast_id_descriptor",
        DescriptorBody::Ac3 { .. } => "AC-3_descriptor",
        DescriptorBody::EnhancedAc3 { .. } => "enhanced_AC-3_descriptor",
        DescriptorBody::ApplicationSignalling { .. } => "application_signalling_descriptor",
        DescriptorBody::SupplementaryAudio { .. } => "supplementary_audio_descriptor",
        DescriptorBody::T2DeliverySystem { .. } => "T2_delivery_system_descriptor",
        DescriptorBody::DvbExtension { .. } => "extension_descriptor",
        DescriptorBody::CompressedModule { .. } => "compressed_module_descriptor",
        DescriptorBody::SsuSubgroupAssociation { .. } => "SSU_subgroup_association_descriptor",
        DescriptorBody::ApplicationName { .. } => "application_name_descriptor",
        DescriptorBody::TransportProtocol { .. } => "transport_protocol_descriptor",
        DescriptorBody::LogicalChannel { .. } => "logical_channel_descriptor",
        DescriptorBody::Unknown => return format!("descriptor_0x{:02X}", tag),
    };
    name.to_string()
}

fn body_fields(body: &DescriptorBody) -> Vec<Node> {
    use DescriptorBody::*;
    match body {
        VideoStream {
            multiple_frame_rate,
            frame_rate_code,
            mpeg1_only,
            constrained_parameter,
            still_picture,
        } => vec![
            Node::leaf("multiple_frame_rate_flag", *multiple_frame_rate),
            Node::leaf("frame_rate_code", *frame_rate_code),
            Node::leaf("MPEG_1_only_flag", *mpeg1_only),
            Node::leaf("constrained_parameter_flag", *constrained_parameter),
            Node::leaf("still_picture_flag", *still_picture),
        ],
        AudioStream {
            free_format,
            id,
            layer,
            variable_rate,
        } => vec![
            Node::leaf("free_format_flag", *free_format),
            Node::leaf("ID", *id),
            Node::leaf("layer", *layer),
            Node::leaf("variable_rate_audio_indicator", *variable_rate),
        ],
        Registration {
            format_identifier,
            additional,
        } => {
            let fourcc: String = format_identifier
                .to_be_bytes()
                .iter()
                .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
                .collect();
            let mut fields =
                vec![Node::leaf("format_identifier", *format_identifier).note(fourcc)];
            if !additional.is_empty() {
                fields.push(Node::leaf("additional_identification_info", additional.clone()));
            }
            fields
        }
        DataStreamAlignment { alignment_type } => {
            vec![Node::leaf("alignment_type", *alignment_type)]
        }
        ConditionalAccess {
            ca_system_id,
            ca_pid,
            private_data,
        } => {
            let mut fields = vec![
                Node::leaf("CA_system_ID", *ca_system_id),
                Node::leaf("CA_PID", *ca_pid),
            ];
            if !private_data.is_empty() {
                fields.push(Node::leaf("private_data", private_data.clone()));
            }
            fields
        }
        Iso639Language { entries } => entries
            .iter()
            .map(|e| {
                Node::new("language")
                    .value(e.language.clone())
                    .child(Node::leaf("audio_type", e.audio_type))
            })
            .collect(),
        MaximumBitrate { bitrate } => {
            vec![Node::leaf("maximum_bitrate", *bitrate)
                .note(format!("{} bit/s", *bitrate as u64 * 400))]
        }
        SystemClock {
            external_clock_reference,
            accuracy_integer,
            accuracy_exponent,
        } => vec![
            Node::leaf("external_clock_reference_indicator", *external_clock_reference),
            Node::leaf("clock_accuracy_integer", *accuracy_integer),
            Node::leaf("clock_accuracy_exponent", *accuracy_exponent),
        ],
        MpegExtension {
            extension_tag,
            data,
        } => vec![
            Node::leaf("extension_descriptor_tag", *extension_tag),
            Node::leaf("data", data.clone()),
        ],
        NetworkName { name } => vec![Node::leaf("network_name", name.clone())],
        ServiceList { services } => services
            .iter()
            .map(|s| {
                Node::new("service")
                    .value(s.service_id)
                    .child(Node::leaf("service_type", s.service_type))
            })
            .collect(),
        SatelliteDelivery {
            frequency_ghz,
            orbital_position,
            west_east,
            polarization,
            modulation,
            symbol_rate,
            fec_inner,
        } => vec![
            Node::leaf("frequency", *frequency_ghz).note("GHz"),
            Node::leaf("orbital_position", *orbital_position),
            Node::leaf("west_east_flag", *west_east),
            Node::leaf("polarization", *polarization),
            Node::leaf("modulation", *modulation),
            Node::leaf("symbol_rate", *symbol_rate).note("Msymbol/s"),
            Node::leaf("FEC_inner", *fec_inner),
        ],
        CableDelivery {
            frequency_mhz,
            fec_outer,
            modulation,
            symbol_rate,
            fec_inner,
        } => vec![
            Node::leaf("frequency", *frequency_mhz).note("MHz"),
            Node::leaf("FEC_outer", *fec_outer),
            Node::leaf("modulation", *modulation),
            Node::leaf("symbol_rate", *symbol_rate).note("Msymbol/s"),
            Node::leaf("FEC_inner", *fec_inner),
        ],
        TerrestrialDelivery {
            centre_frequency_hz,
            bandwidth,
            constellation,
            hierarchy,
            code_rate_hp,
            code_rate_lp,
            guard_interval,
            transmission_mode,
            other_frequency,
        } => vec![
            Node::leaf("centre_frequency", *centre_frequency_hz).note("Hz"),
            Node::leaf("bandwidth", *bandwidth),
            Node::leaf("constellation", *constellation),
            Node::leaf("hierarchy_information", *hierarchy),
            Node::leaf("code_rate_HP_stream", *code_rate_hp),
            Node::leaf("code_rate_LP_stream", *code_rate_lp),
            Node::leaf("guard_interval", *guard_interval),
            Node::leaf("transmission_mode", *transmission_mode),
            Node::leaf("other_frequency_flag", *other_frequency),
        ],
        Service {
            service_type,
            provider,
            name,
        } => vec![
            Node::leaf("service_type", *service_type),
            Node::leaf("service_provider_name", provider.clone()),
            Node::leaf("service_name", name.clone()),
        ],
        Linkage {
            transport_stream_id,
            original_network_id,
            service_id,
            linkage_type,
            private_data,
        } => {
            let mut fields = vec![
                Node::leaf("transport_stream_id", *transport_stream_id),
                Node::leaf("original_network_id", *original_network_id),
                Node::leaf("service_id", *service_id),
                Node::leaf("linkage_type", *linkage_type),
            ];
            if !private_data.is_empty() {
                fields.push(Node::leaf("private_data", private_data.clone()));
            }
            fields
        }
        ShortEvent {
            language,
            event_name,
            text,
        } => vec![
            Node::leaf("ISO_639_language_code", language.clone()),
            Node::leaf("event_name", event_name.clone()),
            Node::leaf("text", text.clone()),
        ],
        ExtendedEvent {
            descriptor_number,
            last_descriptor_number,
            language,
            items,
            text,
        } => {
            let mut fields = vec![
                Node::leaf("descriptor_number", *descriptor_number),
                Node::leaf("last_descriptor_number", *last_descriptor_number),
                Node::leaf("ISO_639_language_code", language.clone()),
            ];
            fields.extend(items.iter().map(|i| {
                Node::new("item")
                    .child(Node::leaf("item_description", i.description.clone()))
                    .child(Node::leaf("item_text", i.item.clone()))
            }));
            fields.push(Node::leaf("text", text.clone()));
            fields
        }
        Component {
            stream_content,
            component_type,
            component_tag,
            language,
            text,
        } => vec![
            Node::leaf("stream_content", *stream_content),
            Node::leaf("component_type", *component_type),
            Node::leaf("component_tag", *component_tag),
            Node::leaf("ISO_639_language_code", language.clone()),
            Node::leaf("text", text.clone()),
        ],
        StreamIdentifier { component_tag } => {
            vec![Node::leaf("component_tag", *component_tag)]
        }
        Content { entries } => entries
            .iter()
            .map(|e| {
                Node::new("content")
                    .child(Node::leaf("content_nibble_level_1", e.content_nibble_level_1))
                    .child(Node::leaf("content_nibble_level_2", e.content_nibble_level_2))
                    .child(Node::leaf("user_byte", e.user_byte))
            })
            .collect(),
        ParentalRating { entries } => entries
            .iter()
            .map(|e| {
                Node::new("rating")
                    .value(e.rating)
                    .child(Node::leaf("country_code", e.country_code.clone()))
                    .note(if e.rating > 0 && e.rating < 0x10 {
                        format!("minimum age {}", e.rating + 3)
                    } else {
                        "defined by broadcaster".to_string()
                    })
            })
            .collect(),
        Teletext { entries } => entries
            .iter()
            .map(|e| {
                Node::new("teletext")
                    .child(Node::leaf("ISO_639_language_code", e.language.clone()))
                    .child(Node::leaf("teletext_type", e.teletext_type))
                    .child(Node::leaf("teletext_magazine_number", e.magazine_number))
                    .child(Node::leaf("teletext_page_number", e.page_number))
            })
            .collect(),
        Subtitling { entries } => entries
            .iter()
            .map(|e| {
                Node::new("subtitling")
                    .child(Node::leaf("ISO_639_language_code", e.language.clone()))
                    .child(Node::leaf("subtitling_type", e.subtitling_type))
                    .child(Node::leaf("composition_page_id", e.composition_page_id))
                    .child(Node::leaf("ancillary_page_id", e.ancillary_page_id))
            })
            .collect(),
        LocalTimeOffset { entries } => entries
            .iter()
            .map(|e| {
                Node::new("local_time_offset")
                    .child(Node::leaf("country_code", e.country_code.clone()))
                    .child(Node::leaf("country_region_id", e.country_region_id))
                    .child(Node::leaf("local_time_offset_polarity", e.polarity))
                    .child(
                        Node::leaf("local_time_offset", e.local_time_offset as u64)
                            .note("minutes"),
                    )
            })
            .collect(),
        PrivateDataSpecifier { specifier } => {
            vec![Node::leaf("private_data_specifier", *specifier)]
        }
        DataBroadcastId {
            data_broadcast_id,
            selector,
        } => {
            let mut fields = vec![Node::leaf("data_broadcast_id", *data_broadcast_id)];
            if !selector.is_empty() {
                fields.push(Node::leaf("id_selector", selector.clone()));
            }
            fields
        }
        Ac3 {
            component_type,
            bsid,
            mainid,
            asvc,
        } => {
            let mut fields = Vec::new();
            if let Some(v) = component_type {
                fields.push(Node::leaf("component_type", *v));
            }
            if let Some(v) = bsid {
                fields.push(Node::leaf("bsid", *v));
            }
            if let Some(v) = mainid {
                fields.push(Node::leaf("mainid", *v));
            }
            if let Some(v) = asvc {
                fields.push(Node::leaf("asvc", *v));
            }
            fields
        }
        EnhancedAc3 {
            component_type,
            bsid,
            mixinfoexists,
        } => {
            let mut fields = vec![Node::leaf("mixinfoexists", *mixinfoexists)];
            if let Some(v) = component_type {
                fields.push(Node::leaf("component_type", *v));
            }
            if let Some(v) = bsid {
                fields.push(Node::leaf("bsid", *v));
            }
            fields
        }
        ApplicationSignalling { entries } => entries
            .iter()
            .map(|e| {
                Node::new("application")
                    .child(Node::leaf("application_type", e.application_type))
                    .child(Node::leaf("AIT_version_number", e.ait_version_number))
            })
            .collect(),
        SupplementaryAudio {
            mix_type,
            editorial_classification,
            language,
        } => {
            let mut fields = vec![
                Node::leaf("mix_type", *mix_type),
                Node::leaf("editorial_classification", *editorial_classification),
            ];
            if let Some(lang) = language {
                fields.push(Node::leaf("ISO_639_language_code", lang.clone()));
            }
            fields
        }
        T2DeliverySystem {
            plp_id,
            t2_system_id,
        } => vec![
            Node::leaf("plp_id", *plp_id),
            Node::leaf("T2_system_id", *t2_system_id),
        ],
        DvbExtension {
            extension_tag,
            data,
        } => vec![
            Node::leaf("descriptor_tag_extension", *extension_tag),
            Node::leaf("data", data.clone()),
        ],
        CompressedModule {
            compression_method,
            original_size,
        } => vec![
            Node::leaf("compression_method", *compression_method),
            Node::leaf("original_size", *original_size),
        ],
        SsuSubgroupAssociation { subgroup_tag } => {
            vec![Node::leaf("subgroup_tag", *subgroup_tag)]
        }
        ApplicationName { entries } => entries
            .iter()
            .map(|(lang, name)| {
                Node::new("application_name")
                    .value(name.clone())
                    .child(Node::leaf("ISO_639_language_code", lang.clone()))
            })
            .collect(),
        TransportProtocol {
            protocol_id,
            transport_protocol_label,
            selector,
        } => {
            let mut fields = vec![
                Node::leaf("protocol_id", *protocol_id),
                Node::leaf("transport_protocol_label", *transport_protocol_label),
            ];
            if !selector.is_empty() {
                fields.push(Node::leaf("selector", selector.clone()));
            }
            fields
        }
        LogicalChannel { entries } => entries
            .iter()
            .map(|e| {
                Node::new("logical_channel")
                    .value(e.logical_channel_number)
                    .child(Node::leaf("service_id", e.service_id))
                    .child(Node::leaf("visible_service_flag", e.visible))
            })
            .collect(),
        Unknown => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_context_sensitive_tag_09() {
        let engine = DescriptorEngine::new();

        // CA descriptor layout: system id, PID, private bytes.
        let body = [0x06, 0x00, 0xE1, 0x23, 0xAB];
        let pmt = engine.decode(0x09, &body, DescriptorContext::ProgramMap, None);
        assert_eq!(
            pmt.body,
            DescriptorBody::ConditionalAccess {
                ca_system_id: 0x0600,
                ca_pid: 0x0123,
                private_data: vec![0xAB],
            }
        );

        // Same tag under DSM-CC: compression method + original size.
        let body = [0x01, 0x00, 0x00, 0x10, 0x00];
        let dsmcc = engine.decode(0x09, &body, DescriptorContext::Dsmcc, None);
        assert_eq!(
            dsmcc.body,
            DescriptorBody::CompressedModule {
                compression_method: 0x01,
                original_size: 0x1000,
            }
        );

        // And under UNT: a 40-bit subgroup tag.
        let body = [0x01, 0x02, 0x03, 0x04, 0x05];
        let unt = engine.decode(0x09, &body, DescriptorContext::Unt, None);
        assert_eq!(
            unt.body,
            DescriptorBody::SsuSubgroupAssociation {
                subgroup_tag: 0x0102030405,
            }
        );
    }

    #[test]
    fn test_unknown_tag_is_not_an_error() {
        let engine = DescriptorEngine::new();
        let d = engine.decode(0x7E, &[1, 2, 3], DescriptorContext::ProgramMap, None);
        assert_eq!(d.body, DescriptorBody::Unknown);
        assert_eq!(d.data, vec![1, 2, 3]);
        assert_eq!(d.anomalies, vec![Anomaly::UnknownTag(0x7E)]);
    }

    #[test]
    fn test_loop_resynchronizes_on_length_mismatch() {
        let engine = DescriptorEngine::new();
        // stream_identifier declares 3 bytes but its layout is 1 byte;
        // the following descriptor must still be found at +2+3.
        let data = [
            0x52, 0x03, 0xAA, 0x00, 0x00, // over-long stream identifier
            0x52, 0x01, 0xBB, // well-formed stream identifier
        ];
        let (descs, _) =
            engine.decode_loop(&data, DescriptorContext::ProgramMap, None, None);
        assert_eq!(descs.len(), 2);
        assert_eq!(
            descs[0].body,
            DescriptorBody::StreamIdentifier { component_tag: 0xAA }
        );
        assert_eq!(
            descs[0].anomalies,
            vec![Anomaly::LengthMismatch {
                declared: 3,
                consumed: 1
            }]
        );
        assert_eq!(
            descs[1].body,
            DescriptorBody::StreamIdentifier { component_tag: 0xBB }
        );
        assert!(descs[1].anomalies.is_empty());
    }

    #[test]
    fn test_private_namespace_dispatch() {
        let engine = DescriptorEngine::new();
        // service 1, visible, LCN 4; no specifier in scope -> raw.
        let lcn_body = [0x00, 0x01, 0xFC, 0x04];

        let raw = engine.decode(0x83, &lcn_body, DescriptorContext::NetworkInformation, None);
        assert_eq!(raw.body, DescriptorBody::Unknown);

        let decoded = engine.decode(
            0x83,
            &lcn_body,
            DescriptorContext::NetworkInformation,
            Some(PDS_EACEM),
        );
        assert_eq!(
            decoded.body,
            DescriptorBody::LogicalChannel {
                entries: vec![LogicalChannelEntry {
                    service_id: 1,
                    visible: true,
                    logical_channel_number: 4,
                }]
            }
        );
    }

    #[test]
    fn test_pds_descriptor_switches_namespace_mid_loop() {
        let engine = DescriptorEngine::new();
        let mut data = vec![
            0x83, 0x04, 0x00, 0x01, 0xFC, 0x04, // before any PDS: raw
            0x5F, 0x04, 0x00, 0x00, 0x00, 0x28, // EACEM specifier
        ];
        data.extend_from_slice(&[0x83, 0x04, 0x00, 0x01, 0xFC, 0x04]); // now decoded

        let (descs, pds) =
            engine.decode_loop(&data, DescriptorContext::NetworkInformation, None, None);
        assert_eq!(descs.len(), 3);
        assert_eq!(descs[0].body, DescriptorBody::Unknown);
        assert!(matches!(descs[2].body, DescriptorBody::LogicalChannel { .. }));
        assert_eq!(pds, Some(PDS_EACEM));
    }

    #[test]
    fn test_extension_descriptor_two_level_dispatch() {
        let engine = DescriptorEngine::new();
        // 0x7F / 0x06 supplementary audio, mix_type 1, classification 0,
        // language present.
        let body = [0x06, 0b1000_0001, b'e', b'n', b'g'];
        let d = engine.decode(0x7F, &body, DescriptorContext::ProgramMap, None);
        assert_eq!(
            d.body,
            DescriptorBody::SupplementaryAudio {
                mix_type: 1,
                editorial_classification: 0,
                language: Some("eng".to_string()),
            }
        );
        assert!(d.anomalies.is_empty());
    }
}
