//! PSI/SI section reassembly and table decoding.
//!
//! [`SectionAssembler`] turns per-PID packet payloads into complete,
//! CRC-checked [`Section`]s. It is blind to table semantics; the
//! per-table decoders in this module consume the section bodies.

pub mod desc;
mod eit;
mod nit;
mod pat;
mod pmt;
mod scte35;
mod sdt;
mod tdt;
pub(crate) mod time;

pub use eit::{Eit, EitEvent};
pub use nit::{Nit, NitTransportStream};
pub use pat::{Pat, PatEntry};
pub use pmt::{Pmt, PmtStream};
pub use scte35::{SpliceCommand, SpliceInfo};
pub use sdt::{Sdt, SdtService};
pub use tdt::Tdt;

use bytes::{Bytes, BytesMut};

use crate::node::{Anomaly, Node};
use crate::utils::Crc32Mpeg2;

// Table ids handled by the built-in decoders.
pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_CAT: u8 = 0x01;
pub const TABLE_ID_PMT: u8 = 0x02;
pub const TABLE_ID_NIT_ACTUAL: u8 = 0x40;
pub const TABLE_ID_NIT_OTHER: u8 = 0x41;
pub const TABLE_ID_SDT_ACTUAL: u8 = 0x42;
pub const TABLE_ID_SDT_OTHER: u8 = 0x46;
pub const TABLE_ID_EIT_PF_ACTUAL: u8 = 0x4E;
pub const TABLE_ID_TDT: u8 = 0x70;
pub const TABLE_ID_TOT: u8 = 0x73;
pub const TABLE_ID_SCTE35: u8 = 0xFC;
pub const TABLE_ID_STUFFING: u8 = 0xFF;

/// Decoded section header, common to every table.
#[derive(Debug, Clone)]
pub struct SectionHeader {
    pub table_id: u8,
    pub syntax_indicator: bool,
    /// Declared length of everything after the first 3 bytes.
    pub section_length: usize,
    /// table_id_extension: program number, service id, … per table.
    pub table_id_extension: u16,
    pub version_number: u8,
    pub current_next: bool,
    pub section_number: u8,
    pub last_section_number: u8,
}

/// Result of the CRC check over a completed section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrcStatus {
    pub stored: u32,
    pub computed: u32,
}

impl CrcStatus {
    pub fn ok(&self) -> bool {
        self.stored == self.computed
    }
}

/// One complete PSI/SI section.
///
/// Delivered even when the CRC check failed, with the mismatch flagged,
/// so corrupt captures remain diagnosable.
#[derive(Debug, Clone)]
pub struct Section {
    pub header: SectionHeader,
    /// Full section bytes, header and trailing CRC included.
    pub bytes: Bytes,
    /// `None` for tables that carry no CRC (TDT).
    pub crc: Option<CrcStatus>,
}

impl Section {
    /// Payload between the (extended) header and the trailing CRC.
    pub fn body(&self) -> &[u8] {
        let start = if self.header.syntax_indicator { 8 } else { 3 };
        let end = if self.crc.is_some() {
            self.bytes.len().saturating_sub(4)
        } else {
            self.bytes.len()
        };
        &self.bytes[start.min(end)..end]
    }

    pub fn crc_ok(&self) -> bool {
        self.crc.map_or(true, |c| c.ok())
    }

    pub fn to_node(&self) -> Node {
        let h = &self.header;
        let mut node = Node::new("section")
            .value(h.table_id)
            .child(Node::leaf("table_id", h.table_id))
            .child(Node::leaf("section_length", h.section_length as u64));
        if h.syntax_indicator {
            node.push(Node::leaf("table_id_extension", h.table_id_extension));
            node.push(Node::leaf("version_number", h.version_number));
            node.push(Node::leaf("current_next", h.current_next));
            node.push(Node::leaf("section_number", h.section_number));
            node.push(Node::leaf("last_section_number", h.last_section_number));
        }
        if let Some(crc) = self.crc {
            let mut crc_node = Node::leaf("crc_32", crc.stored as u64);
            if !crc.ok() {
                crc_node = crc_node.anomaly(Anomaly::CrcMismatch {
                    stored: crc.stored,
                    computed: crc.computed,
                });
            }
            node.push(crc_node);
        }
        node
    }
}

/// Reassembles sections from the packet payloads of one PID.
///
/// State machine: idle → collecting → complete/CRC-error → idle. The
/// pointer field on a payload-start packet first completes any
/// in-flight section with the leftover bytes preceding the new start.
pub struct SectionAssembler {
    buf: BytesMut,
    collecting: bool,
    crc: Crc32Mpeg2,
}

impl Default for SectionAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionAssembler {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            collecting: false,
            crc: Crc32Mpeg2::new(),
        }
    }

    /// Feeds one packet payload; returns every section completed by it.
    pub fn push(&mut self, payload_unit_start: bool, payload: &[u8]) -> Vec<Section> {
        let mut out = Vec::new();
        if payload.is_empty() {
            return out;
        }

        if payload_unit_start {
            let pointer = payload[0] as usize;
            let rest = &payload[1..];
            if pointer > rest.len() {
                log::debug!("pointer field {} exceeds payload, section dropped", pointer);
                self.reset();
                return out;
            }

            // Leftover bytes finish the in-flight section, if any.
            if self.collecting {
                self.buf.extend_from_slice(&rest[..pointer]);
                self.drain_complete(&mut out);
                if self.collecting {
                    // Still incomplete at its declared start: discard.
                    log::debug!("in-flight section superseded before completion");
                }
            }
            self.reset();
            self.collecting = true;
            self.buf.extend_from_slice(&rest[pointer..]);
            self.drain_complete(&mut out);
        } else if self.collecting {
            self.buf.extend_from_slice(payload);
            self.drain_complete(&mut out);
        }

        out
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.collecting = false;
    }

    /// Extracts every complete section currently at the head of the
    /// buffer. Several short sections may share one packet.
    fn drain_complete(&mut self, out: &mut Vec<Section>) {
        loop {
            if self.buf.is_empty() {
                self.collecting = false;
                return;
            }
            // Stuffing terminates the packet's section run.
            if self.buf[0] == TABLE_ID_STUFFING {
                self.reset();
                return;
            }
            if self.buf.len() < 3 {
                return;
            }

            let section_length = (((self.buf[1] & 0x0F) as usize) << 8) | self.buf[2] as usize;
            let total = 3 + section_length;
            if self.buf.len() < total {
                return;
            }

            let bytes = self.buf.split_to(total).freeze();
            if let Some(section) = self.finish(bytes) {
                out.push(section);
            }
        }
    }

    fn finish(&mut self, bytes: Bytes) -> Option<Section> {
        let table_id = bytes[0];
        let syntax_indicator = (bytes[1] & 0x80) != 0;
        let section_length = (((bytes[1] & 0x0F) as usize) << 8) | bytes[2] as usize;

        let mut header = SectionHeader {
            table_id,
            syntax_indicator,
            section_length,
            table_id_extension: 0,
            version_number: 0,
            current_next: true,
            section_number: 0,
            last_section_number: 0,
        };

        if syntax_indicator {
            if bytes.len() < 8 {
                log::debug!("section with syntax indicator shorter than extended header");
                return None;
            }
            header.table_id_extension = ((bytes[3] as u16) << 8) | bytes[4] as u16;
            header.version_number = (bytes[5] & 0x3E) >> 1;
            header.current_next = (bytes[5] & 0x01) != 0;
            header.section_number = bytes[6];
            header.last_section_number = bytes[7];
        }

        // TDT is the one handled table without a trailing CRC. TOT and
        // SCTE-35 splice sections carry one despite syntax_indicator
        // being clear.
        let has_crc =
            syntax_indicator || table_id == TABLE_ID_TOT || table_id == TABLE_ID_SCTE35;
        let crc = if has_crc && bytes.len() >= 4 {
            let stored = u32::from_be_bytes([
                bytes[bytes.len() - 4],
                bytes[bytes.len() - 3],
                bytes[bytes.len() - 2],
                bytes[bytes.len() - 1],
            ]);
            let computed = self.crc.calculate(&bytes[..bytes.len() - 4]);
            Some(CrcStatus { stored, computed })
        } else {
            None
        };

        Some(Section {
            header,
            bytes,
            crc,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::utils::Crc32Mpeg2;

    /// Builds a complete section with a valid trailing CRC from a
    /// table id, a table_id_extension and a body.
    pub fn build_section(table_id: u8, ext: u16, version: u8, body: &[u8]) -> Vec<u8> {
        let section_length = 5 + body.len() + 4;
        let mut s = vec![
            table_id,
            0xB0 | ((section_length >> 8) as u8 & 0x0F),
            (section_length & 0xFF) as u8,
            (ext >> 8) as u8,
            (ext & 0xFF) as u8,
            0xC1 | (version << 1),
            0x00,
            0x00,
        ];
        s.extend_from_slice(body);
        let crc = Crc32Mpeg2::new().calculate(&s);
        s.extend_from_slice(&crc.to_be_bytes());
        s
    }
}
