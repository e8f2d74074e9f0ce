use super::{SYNC_BYTE, TS_HEADER_SIZE};
use crate::error::{Result, TsError};
use crate::node::Node;

/// Program Clock Reference: 33-bit base at 90 kHz plus 6-bit extension
/// ticks at 27 MHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pcr {
    pub base: u64,
    pub extension: u16,
}

impl Pcr {
    /// Value in 27 MHz ticks.
    pub fn ticks(&self) -> u64 {
        self.base * 300 + self.extension as u64
    }

    /// Seconds since stream clock origin.
    pub fn seconds(&self) -> f64 {
        self.ticks() as f64 / 27_000_000.0
    }
}

/// Fixed 4-byte transport packet header.
#[derive(Debug, Clone)]
pub struct TsHeader {
    pub transport_error: bool,
    pub payload_unit_start: bool,
    pub transport_priority: bool,
    pub pid: u16,
    pub scrambling_control: u8,
    pub adaptation_field_exists: bool,
    pub contains_payload: bool,
    pub continuity_counter: u8,
}

impl TsHeader {
    pub fn parse(data: &[u8]) -> Result<TsHeader> {
        if data.len() < TS_HEADER_SIZE {
            return Err(TsError::InvalidData("TS packet too short".into()));
        }
        if data[0] != SYNC_BYTE {
            return Err(TsError::Framing { offset: 0 });
        }

        Ok(TsHeader {
            transport_error: (data[1] & 0x80) != 0,
            payload_unit_start: (data[1] & 0x40) != 0,
            transport_priority: (data[1] & 0x20) != 0,
            pid: (((data[1] & 0x1F) as u16) << 8) | data[2] as u16,
            scrambling_control: (data[3] >> 6) & 0x03,
            adaptation_field_exists: (data[3] & 0x20) != 0,
            contains_payload: (data[3] & 0x10) != 0,
            continuity_counter: data[3] & 0x0F,
        })
    }
}

/// Optional adaptation field following the packet header.
#[derive(Debug, Clone, Default)]
pub struct AdaptationField {
    pub length: usize,
    pub discontinuity: bool,
    pub random_access: bool,
    pub es_priority: bool,
    pub pcr: Option<Pcr>,
    pub opcr: Option<Pcr>,
    pub splice_countdown: Option<i8>,
    pub private_data: Option<Vec<u8>>,
}

impl AdaptationField {
    /// Parses the adaptation field at `offset`. A zero-length field is
    /// a single stuffing byte and yields `None`.
    pub fn parse(data: &[u8], offset: usize) -> Result<Option<AdaptationField>> {
        let length = data[offset] as usize;
        if length == 0 {
            return Ok(None);
        }
        if data.len() < offset + length + 1 {
            return Err(TsError::InvalidData("adaptation field too short".into()));
        }

        let flags = data[offset + 1];
        let mut field = AdaptationField {
            length,
            discontinuity: (flags & 0x80) != 0,
            random_access: (flags & 0x40) != 0,
            es_priority: (flags & 0x20) != 0,
            ..Default::default()
        };

        let mut pos = offset + 2;

        if (flags & 0x10) != 0 {
            field.pcr = Some(read_pcr(data, &mut pos)?);
        }
        if (flags & 0x08) != 0 {
            field.opcr = Some(read_pcr(data, &mut pos)?);
        }
        if (flags & 0x04) != 0 {
            if data.len() < pos + 1 {
                return Err(TsError::InvalidData("splice countdown too short".into()));
            }
            field.splice_countdown = Some(data[pos] as i8);
            pos += 1;
        }
        if (flags & 0x02) != 0 {
            if data.len() < pos + 1 {
                return Err(TsError::InvalidData(
                    "private data length byte missing".into(),
                ));
            }
            let private_data_length = data[pos] as usize;
            pos += 1;
            if data.len() < pos + private_data_length {
                return Err(TsError::InvalidData("private data too short".into()));
            }
            field.private_data = Some(data[pos..pos + private_data_length].to_vec());
        }
        // Anything up to offset + length + 1 is stuffing.

        Ok(Some(field))
    }
}

fn read_pcr(data: &[u8], pos: &mut usize) -> Result<Pcr> {
    if data.len() < *pos + 6 {
        return Err(TsError::InvalidData("PCR data too short".into()));
    }
    let base = ((data[*pos] as u64) << 25)
        | ((data[*pos + 1] as u64) << 17)
        | ((data[*pos + 2] as u64) << 9)
        | ((data[*pos + 3] as u64) << 1)
        | ((data[*pos + 4] & 0x80) as u64 >> 7);
    let extension = (((data[*pos + 4] & 0x01) as u16) << 8) | data[*pos + 5] as u16;
    *pos += 6;
    Ok(Pcr { base, extension })
}

/// One parsed transport packet, borrowing from the capture buffer.
#[derive(Debug)]
pub struct TsPacket<'a> {
    pub header: TsHeader,
    pub adaptation: Option<AdaptationField>,
    /// Payload bytes after header and adaptation field.
    pub payload: &'a [u8],
    /// Byte offset of the sync byte within the capture.
    pub offset: usize,
}

impl<'a> TsPacket<'a> {
    /// Parses one packet starting at `data[0]`. `offset` is the
    /// absolute position in the capture, used for raw-byte references.
    pub fn parse(data: &'a [u8], offset: usize) -> Result<TsPacket<'a>> {
        let header = TsHeader::parse(data)?;

        let mut payload_offset = TS_HEADER_SIZE;
        let mut adaptation = None;
        if header.adaptation_field_exists {
            adaptation = AdaptationField::parse(data, payload_offset)?;
            payload_offset += data[payload_offset] as usize + 1;
        }

        let payload = if header.contains_payload && payload_offset <= data.len() {
            &data[payload_offset..]
        } else {
            &[]
        };

        Ok(TsPacket {
            header,
            adaptation,
            payload,
            offset,
        })
    }

    pub fn to_node(&self) -> Node {
        let h = &self.header;
        let mut node = Node::new("packet")
            .raw(self.offset..self.offset + super::TS_PACKET_SIZE)
            .child(Node::leaf("pid", h.pid))
            .child(Node::leaf("payload_unit_start", h.payload_unit_start))
            .child(Node::leaf("continuity_counter", h.continuity_counter))
            .child(Node::leaf("scrambling_control", h.scrambling_control));

        if h.transport_error {
            node.push(Node::leaf("transport_error", true));
        }
        if let Some(af) = &self.adaptation {
            let mut af_node = Node::new("adaptation_field")
                .child(Node::leaf("length", af.length as u64))
                .child(Node::leaf("discontinuity", af.discontinuity))
                .child(Node::leaf("random_access", af.random_access));
            if let Some(pcr) = af.pcr {
                af_node.push(
                    Node::leaf("pcr", pcr.ticks()).note(format!("{:.6} s", pcr.seconds())),
                );
            }
            if let Some(opcr) = af.opcr {
                af_node.push(Node::leaf("opcr", opcr.ticks()));
            }
            if let Some(sc) = af.splice_countdown {
                af_node.push(Node::leaf("splice_countdown", sc as i64));
            }
            if let Some(private) = &af.private_data {
                af_node.push(Node::leaf("private_data", private.clone()));
            }
            node.push(af_node);
        }
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_header() {
        let data = [0x47, 0x40, 0x00, 0x10];
        let header = TsHeader::parse(&data).unwrap();
        assert!(header.payload_unit_start);
        assert!(!header.transport_error);
        assert_eq!(header.pid, 0);
        assert!(header.contains_payload);
        assert_eq!(header.continuity_counter, 0);
    }

    #[test]
    fn test_bad_sync_is_framing_error() {
        let data = [0x46, 0x40, 0x00, 0x10];
        assert!(matches!(
            TsHeader::parse(&data),
            Err(TsError::Framing { offset: 0 })
        ));
    }

    #[test]
    fn test_adaptation_field_pcr() {
        let mut data = vec![0u8; 188];
        data[0] = 0x47;
        data[1] = 0x00;
        data[2] = 0x64; // PID 0x64
        data[3] = 0x30; // adaptation + payload
        data[4] = 7; // adaptation length
        data[5] = 0x10; // PCR flag
        // PCR base = 2, ext = 5
        data[6] = 0x00;
        data[7] = 0x00;
        data[8] = 0x00;
        data[9] = 0x01; // base bits 8..1
        data[10] = 0x00 | 0x7E; // top bit -> base bit 0 = 0, reserved, ext bit 8 = 0
        data[11] = 0x05;

        let packet = TsPacket::parse(&data, 0).unwrap();
        let pcr = packet.adaptation.as_ref().unwrap().pcr.unwrap();
        assert_eq!(pcr.base, 2);
        assert_eq!(pcr.extension, 5);
        assert_eq!(pcr.ticks(), 605);
        // Payload starts after the 1 + 7 adaptation bytes.
        assert_eq!(packet.payload.len(), 188 - 4 - 8);
    }

    #[test]
    fn test_zero_length_adaptation() {
        let mut data = vec![0u8; 188];
        data[0] = 0x47;
        data[3] = 0x30;
        data[4] = 0; // stuffing-only adaptation field
        let packet = TsPacket::parse(&data, 0).unwrap();
        assert!(packet.adaptation.is_none());
        assert_eq!(packet.payload.len(), 188 - 5);
    }
}
