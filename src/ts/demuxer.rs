use std::collections::HashMap;

use super::packet::TsPacket;
use super::{
    StreamType, PID_EIT, PID_NIT, PID_NULL, PID_PAT, PID_SDT, PID_TDT, SYNC_BYTE,
    TS_PACKET_SIZE, TS_PACKET_SIZE_FEC, TS_PACKET_SIZE_TIMESTAMPED,
};
use crate::codec::{self, EsDecoder};
use crate::config::DemuxConfig;
use crate::error::{Result, TsError};
use crate::node::{Anomaly, Node};
use crate::pes::PesReassembler;
use crate::psi::desc::DescriptorEngine;
use crate::psi::{
    Eit, Nit, Pat, Pmt, Sdt, Section, SectionAssembler, SpliceInfo, Tdt, TABLE_ID_EIT_PF_ACTUAL,
    TABLE_ID_NIT_ACTUAL, TABLE_ID_NIT_OTHER, TABLE_ID_PAT, TABLE_ID_PMT, TABLE_ID_SCTE35,
    TABLE_ID_SDT_ACTUAL, TABLE_ID_SDT_OTHER, TABLE_ID_TDT, TABLE_ID_TOT,
};

/// How a PID's payload is interpreted. Assigned when the PID is first
/// classified and never changed for the rest of the pass; `Unknown`
/// may still be resolved once table data arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelClass {
    Psi,
    Pes(StreamType),
    Null,
    Unknown,
}

/// Per-PID state and decoded output.
pub struct Channel {
    pub pid: u16,
    pub class: ChannelClass,
    pub packet_count: u64,
    pub continuity_errors: usize,
    /// Decoded entities of this PID in arrival order.
    pub nodes: Vec<Node>,
    last_continuity: Option<u8>,
    sections: SectionAssembler,
    pes: PesReassembler,
    decoder: Option<Box<dyn EsDecoder + Send>>,
}

impl Channel {
    fn new(pid: u16) -> Self {
        Self {
            pid,
            class: ChannelClass::Unknown,
            packet_count: 0,
            continuity_errors: 0,
            nodes: Vec::new(),
            last_continuity: None,
            sections: SectionAssembler::new(),
            pes: PesReassembler::new(),
            decoder: None,
        }
    }

    fn classify(&mut self, class: ChannelClass) {
        if self.class != ChannelClass::Unknown || class == ChannelClass::Unknown {
            return;
        }
        self.class = class;
        if let ChannelClass::Pes(kind) = class {
            self.decoder = codec::decoder_for(kind);
        }
    }
}

/// Everything one pass over a capture produced.
pub struct DemuxReport {
    pub packet_size: usize,
    pub packet_count: u64,
    /// Bytes skipped while regaining sync, capture-wide.
    pub skipped_bytes: usize,
    pub pat: Option<Pat>,
    pub pmts: Vec<Pmt>,
    pub sdt: Option<Sdt>,
    pub nit: Option<Nit>,
    pub eits: Vec<Eit>,
    pub channels: Vec<Channel>,
}

impl DemuxReport {
    /// Renders the whole report as one node tree.
    pub fn to_node(&self) -> Node {
        let mut root = Node::new("transport_stream")
            .child(Node::leaf("packet_size", self.packet_size as u64))
            .child(Node::leaf("packet_count", self.packet_count));
        if self.skipped_bytes > 0 {
            root.anomalies.push(Anomaly::SyncLoss {
                skipped: self.skipped_bytes,
            });
        }
        for channel in &self.channels {
            let mut c = Node::new("PID").value(channel.pid).note(match channel.class {
                ChannelClass::Psi => "PSI/SI sections",
                ChannelClass::Pes(kind) => kind.describe(),
                ChannelClass::Null => "null packets",
                ChannelClass::Unknown => "unclassified",
            });
            c.push(Node::leaf("packet_count", channel.packet_count));
            c.children.extend(channel.nodes.iter().cloned());
            root.push(c);
        }
        root
    }
}

/// Single-pass transport stream demuxer.
///
/// Feed it a complete capture; it autodetects the packet framing,
/// classifies PIDs from PAT/PMT (or configured subscriptions), checks
/// continuity, and routes payloads into section and PES reassembly.
pub struct TsDemuxer {
    config: DemuxConfig,
    engine: DescriptorEngine,
    channels: HashMap<u16, Channel>,
    /// PMT PID → program number, learned from the PAT.
    pmt_pids: HashMap<u16, u16>,
    /// Elementary PID → stream kind, learned from PMTs.
    es_types: HashMap<u16, StreamType>,
    /// Splice PID → service id, for SCTE-35 service name annotation.
    splice_services: HashMap<u16, u16>,
    service_names: HashMap<u16, String>,
    pat: Option<Pat>,
    pmts: HashMap<u16, Pmt>,
    sdt: Option<Sdt>,
    nit: Option<Nit>,
    eits: Vec<Eit>,
}

impl TsDemuxer {
    pub fn new(config: DemuxConfig) -> Self {
        Self {
            config,
            engine: DescriptorEngine::new(),
            channels: HashMap::new(),
            pmt_pids: HashMap::new(),
            es_types: HashMap::new(),
            splice_services: HashMap::new(),
            service_names: HashMap::new(),
            pat: None,
            pmts: HashMap::new(),
            sdt: None,
            nit: None,
            eits: Vec::new(),
        }
    }

    /// Parses a complete capture.
    pub fn parse(self, data: &[u8]) -> Result<DemuxReport> {
        self.parse_with_progress(data, &mut |_, _| {})
    }

    /// Parses a complete capture, reporting coarse progress as
    /// `(packets_processed, packets_total)`.
    pub fn parse_with_progress(
        mut self,
        data: &[u8],
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<DemuxReport> {
        let (packet_size, mut pos) = detect_packet_size(data)?;
        // 192-byte framing carries a 4-byte timestamp before the sync.
        let prefix = if packet_size == TS_PACKET_SIZE_TIMESTAMPED {
            4
        } else {
            0
        };
        let total_packets = ((data.len() - pos) / packet_size) as u64;

        let mut packet_count = 0u64;
        let mut skipped_bytes = 0usize;

        while pos + packet_size <= data.len() {
            let start = pos + prefix;
            if data[start] != SYNC_BYTE {
                // Sync lost: scan forward for a byte that looks like a
                // packet boundary again.
                let resync = resync_offset(data, pos + 1, packet_size, prefix);
                let skip = resync.unwrap_or(data.len()) - pos;
                log::warn!("sync loss at offset {}, skipping {} bytes", pos, skip);
                skipped_bytes += skip;
                pos += skip;
                continue;
            }

            match TsPacket::parse(&data[start..start + TS_PACKET_SIZE], start) {
                Ok(packet) => self.process_packet(&packet),
                Err(e) => log::debug!("packet at offset {} dropped: {}", start, e),
            }

            packet_count += 1;
            pos += packet_size;
            if packet_count % 1000 == 0 || pos + packet_size > data.len() {
                progress(packet_count, total_packets);
            }
        }

        self.finish(packet_size, packet_count, skipped_bytes)
    }

    fn process_packet(&mut self, packet: &TsPacket) {
        let header = &packet.header;
        if header.transport_error {
            log::debug!("transport_error_indicator set on PID {}", header.pid);
        }

        let class = self.classify(header.pid);
        let channel = self
            .channels
            .entry(header.pid)
            .or_insert_with(|| Channel::new(header.pid));
        channel.classify(class);
        channel.packet_count += 1;

        if self.config.keep_raw_packets {
            channel.nodes.push(packet.to_node());
        }

        // Continuity advances by one on every payload-bearing packet,
        // unless the adaptation field declares a discontinuity.
        if header.contains_payload && header.pid != PID_NULL {
            let discontinuity = packet
                .adaptation
                .as_ref()
                .map_or(false, |af| af.discontinuity);
            if let Some(last) = channel.last_continuity {
                let expected = (last + 1) & 0x0F;
                if header.continuity_counter != expected && !discontinuity {
                    channel.continuity_errors += 1;
                    channel.nodes.push(
                        Node::new("continuity")
                            .raw(packet.offset..packet.offset + TS_PACKET_SIZE)
                            .anomaly(Anomaly::Continuity {
                                expected,
                                got: header.continuity_counter,
                            }),
                    );
                }
            }
            channel.last_continuity = Some(header.continuity_counter);
        }

        if !header.contains_payload || header.scrambling_control != 0 {
            return;
        }

        match channel.class {
            ChannelClass::Psi => {
                let sections = channel
                    .sections
                    .push(header.payload_unit_start, packet.payload);
                for section in sections {
                    let node = self.handle_section(header.pid, &section);
                    // Re-borrow: handle_section updates the PID tables.
                    if let Some(channel) = self.channels.get_mut(&header.pid) {
                        channel.nodes.push(node);
                    }
                }
            }
            ChannelClass::Pes(_) => {
                let units = channel.pes.push(header.payload_unit_start, packet.payload);
                for unit in units {
                    let mut node = unit.to_node();
                    if let Some(decoder) = channel.decoder.as_mut() {
                        node.children.extend(decoder.feed(&unit));
                    }
                    channel.nodes.push(node);
                }
            }
            ChannelClass::Null | ChannelClass::Unknown => {}
        }
    }

    fn classify(&self, pid: u16) -> ChannelClass {
        match pid {
            PID_PAT | PID_NIT | PID_SDT | PID_EIT | PID_TDT => return ChannelClass::Psi,
            PID_NULL => return ChannelClass::Null,
            _ => {}
        }
        if let Some(&kind) = self.config.subscriptions.get(&pid) {
            return pes_or_psi(kind);
        }
        if self.pmt_pids.contains_key(&pid) {
            return ChannelClass::Psi;
        }
        if let Some(&kind) = self.es_types.get(&pid) {
            return pes_or_psi(kind);
        }
        ChannelClass::Unknown
    }

    /// Decodes one completed section and updates the PID tables it
    /// implies. Sections failing their CRC are rendered but never
    /// trusted for classification.
    fn handle_section(&mut self, pid: u16, section: &Section) -> Node {
        let mut node = section.to_node();
        let trusted = section.crc_ok();

        match section.header.table_id {
            TABLE_ID_PAT if pid == PID_PAT => {
                let pat = Pat::parse(section);
                node = pat.to_node().child(node);
                if trusted {
                    for entry in &pat.entries {
                        if entry.program_number != 0 {
                            self.pmt_pids
                                .insert(entry.program_map_pid, entry.program_number);
                        }
                    }
                    self.pat = Some(pat);
                }
            }
            TABLE_ID_PMT if self.pmt_pids.contains_key(&pid) => {
                if let Some(pmt) =
                    Pmt::parse(section, &self.engine, self.config.pds_override)
                {
                    node = pmt.to_node().child(node);
                    if trusted {
                        for stream in &pmt.streams {
                            let kind = stream.stream_kind();
                            self.es_types.insert(stream.elementary_pid, kind);
                            if kind == StreamType::Scte35 {
                                self.splice_services
                                    .insert(stream.elementary_pid, pmt.program_number);
                            }
                        }
                        self.pmts.insert(pmt.program_number, pmt);
                    }
                }
            }
            TABLE_ID_SDT_ACTUAL | TABLE_ID_SDT_OTHER if pid == PID_SDT => {
                if let Some(sdt) = Sdt::parse(section, &self.engine, self.config.pds_override) {
                    node = sdt.to_node().child(node);
                    if trusted && section.header.table_id == TABLE_ID_SDT_ACTUAL {
                        for service in &sdt.services {
                            if let Some(name) = service.name() {
                                self.service_names.insert(service.service_id, name.into());
                            }
                        }
                        self.sdt = Some(sdt);
                    }
                }
            }
            TABLE_ID_NIT_ACTUAL | TABLE_ID_NIT_OTHER if pid == PID_NIT => {
                if let Some(nit) = Nit::parse(section, &self.engine, self.config.pds_override) {
                    node = nit.to_node().child(node);
                    if trusted && section.header.table_id == TABLE_ID_NIT_ACTUAL {
                        self.nit = Some(nit);
                    }
                }
            }
            table_id if pid == PID_EIT && (0x4E..=0x6F).contains(&table_id) => {
                if let Some(eit) = Eit::parse(section, &self.engine, self.config.pds_override) {
                    node = eit.to_node().child(node);
                    if trusted && table_id == TABLE_ID_EIT_PF_ACTUAL {
                        self.eits.push(eit);
                    }
                }
            }
            TABLE_ID_TDT | TABLE_ID_TOT if pid == PID_TDT => {
                if let Some(tdt) =
                    Tdt::parse(section, &self.engine, self.config.pds_override)
                {
                    node = tdt.to_node(section.header.table_id).child(node);
                }
            }
            TABLE_ID_SCTE35 => {
                if let Some(info) = SpliceInfo::parse(section) {
                    let name = self
                        .splice_services
                        .get(&pid)
                        .and_then(|sid| self.service_names.get(sid))
                        .map(String::as_str);
                    node = info.to_node(name).child(node);
                }
            }
            other => {
                log::debug!("unhandled table id {:#04x} on PID {}", other, pid);
            }
        }
        node
    }

    fn finish(
        mut self,
        packet_size: usize,
        packet_count: u64,
        skipped_bytes: usize,
    ) -> Result<DemuxReport> {
        let mut channels: Vec<Channel> = self.channels.drain().map(|(_, c)| c).collect();
        channels.sort_by_key(|c| c.pid);

        // Surface anything still mid-reassembly at end of input.
        for channel in &mut channels {
            if let Some(unit) = channel.pes.take_pending() {
                let mut node = unit.to_node();
                if let Some(decoder) = channel.decoder.as_mut() {
                    node.children.extend(decoder.feed(&unit));
                }
                channel.nodes.push(node);
            }
            if let Some(decoder) = channel.decoder.as_mut() {
                let tail = decoder.finish();
                channel.nodes.extend(tail);
            }
        }

        Ok(DemuxReport {
            packet_size,
            packet_count,
            skipped_bytes,
            pat: self.pat,
            pmts: {
                let mut pmts: Vec<Pmt> = self.pmts.into_values().collect();
                pmts.sort_by_key(|p| p.program_number);
                pmts
            },
            sdt: self.sdt,
            nit: self.nit,
            eits: self.eits,
            channels,
        })
    }
}

fn pes_or_psi(kind: StreamType) -> ChannelClass {
    // SCTE-35 rides in sections even though the PMT lists it as an
    // elementary stream.
    if kind == StreamType::Scte35 {
        ChannelClass::Psi
    } else {
        ChannelClass::Pes(kind)
    }
}

/// Probes the candidate framings over the first packets. Returns the
/// detected packet size and the offset of the first packet.
fn detect_packet_size(data: &[u8]) -> Result<(usize, usize)> {
    if data.len() < TS_PACKET_SIZE {
        return Err(TsError::NotAStream(format!(
            "capture of {} bytes is smaller than one packet",
            data.len()
        )));
    }

    for &(size, prefix) in &[
        (TS_PACKET_SIZE, 0usize),
        (TS_PACKET_SIZE_TIMESTAMPED, 4),
        (TS_PACKET_SIZE_FEC, 0),
    ] {
        // The capture may start mid-packet; try every phase.
        for offset in 0..size.min(data.len()) {
            if sync_run_length(data, offset + prefix, size) >= probe_target(data, offset, size) {
                return Ok((size, offset));
            }
        }
    }

    Err(TsError::NotAStream("no packet framing detected".into()))
}

/// Number of consecutive sync bytes found at `start`, `start + stride`…
fn sync_run_length(data: &[u8], start: usize, stride: usize) -> usize {
    let mut count = 0;
    let mut pos = start;
    while pos < data.len() && data[pos] == SYNC_BYTE {
        count += 1;
        pos += stride;
    }
    count
}

/// How many sync bytes a candidate must produce: every packet that
/// fits, capped at 5 for long captures.
fn probe_target(data: &[u8], offset: usize, size: usize) -> usize {
    ((data.len() - offset) / size).clamp(1, 5)
}

/// Finds the next plausible packet boundary at or after `from`.
fn resync_offset(data: &[u8], from: usize, size: usize, prefix: usize) -> Option<usize> {
    (from..data.len()).find(|&pos| {
        let start = pos + prefix;
        start < data.len()
            && data[start] == SYNC_BYTE
            && (start + size >= data.len() || data[start + size] == SYNC_BYTE)
    })
}
