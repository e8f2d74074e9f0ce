use super::Section;
use crate::node::Node;
use crate::utils::BitReader;

/// One decoded splice command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpliceCommand {
    Null,
    SpliceInsert {
        splice_event_id: u32,
        cancel: bool,
        out_of_network: bool,
        /// 33-bit splice time; `None` for immediate or component splices.
        pts: Option<u64>,
        /// Break duration in 90 kHz ticks.
        duration: Option<u64>,
        unique_program_id: u16,
        avail_num: u8,
        avails_expected: u8,
    },
    TimeSignal {
        pts: Option<u64>,
    },
    Other(u8),
}

/// SCTE-35 splice information section (table id 0xFC).
#[derive(Debug, Clone)]
pub struct SpliceInfo {
    pub protocol_version: u8,
    pub encrypted: bool,
    /// 33-bit offset added to every splice time in the section.
    pub pts_adjustment: u64,
    pub tier: u16,
    pub command: SpliceCommand,
}

impl SpliceInfo {
    pub fn parse(section: &Section) -> Option<SpliceInfo> {
        let data = section.body();
        let mut r = BitReader::new(data);

        let parsed = (|| -> crate::error::Result<SpliceInfo> {
            let protocol_version = r.read_bits(8)? as u8;
            let encrypted = r.read_bit()?;
            r.skip_bits(6)?; // encryption_algorithm
            let pts_adjustment = r.read_bits(33)?;
            r.skip_bits(8)?; // cw_index
            let tier = r.read_bits(12)? as u16;
            let command_length = r.read_bits(12)? as usize;
            let command_type = r.read_bits(8)? as u8;

            let command = if encrypted {
                // Command body is ciphertext; keep only the type.
                SpliceCommand::Other(command_type)
            } else {
                match command_type {
                    0x00 => SpliceCommand::Null,
                    0x05 => splice_insert(&mut r)?,
                    0x06 => SpliceCommand::TimeSignal {
                        pts: splice_time(&mut r)?,
                    },
                    other => {
                        if command_length != 0xFFF {
                            r.skip_bits(command_length as u32 * 8)?;
                        }
                        SpliceCommand::Other(other)
                    }
                }
            };

            Ok(SpliceInfo {
                protocol_version,
                encrypted,
                pts_adjustment,
                tier,
                command,
            })
        })();

        match parsed {
            Ok(info) => Some(info),
            Err(e) => {
                log::debug!("malformed splice information section: {}", e);
                None
            }
        }
    }

    pub fn to_node(&self, service_name: Option<&str>) -> Node {
        let mut node = Node::new("splice_information")
            .child(Node::leaf("protocol_version", self.protocol_version))
            .child(Node::leaf("pts_adjustment", self.pts_adjustment))
            .child(Node::leaf("tier", self.tier));
        if let Some(name) = service_name {
            node = node.note(name.to_string());
        }
        if self.encrypted {
            node.push(Node::leaf("encrypted_packet", true));
        }
        node.push(match &self.command {
            SpliceCommand::Null => Node::new("splice_null"),
            SpliceCommand::SpliceInsert {
                splice_event_id,
                cancel,
                out_of_network,
                pts,
                duration,
                unique_program_id,
                avail_num,
                avails_expected,
            } => {
                let mut c = Node::new("splice_insert")
                    .value(*splice_event_id)
                    .child(Node::leaf("splice_event_id", *splice_event_id))
                    .child(Node::leaf("cancel", *cancel));
                if !cancel {
                    c.push(Node::leaf("out_of_network", *out_of_network));
                    if let Some(pts) = pts {
                        c.push(Node::leaf("pts_time", *pts).note("90 kHz ticks"));
                    }
                    if let Some(duration) = duration {
                        c.push(Node::leaf("break_duration", *duration).note("90 kHz ticks"));
                    }
                    c.push(Node::leaf("unique_program_id", *unique_program_id));
                    c.push(Node::leaf("avail_num", *avail_num));
                    c.push(Node::leaf("avails_expected", *avails_expected));
                }
                c
            }
            SpliceCommand::TimeSignal { pts } => {
                let mut c = Node::new("time_signal");
                if let Some(pts) = pts {
                    c.push(Node::leaf("pts_time", *pts).note("90 kHz ticks"));
                }
                c
            }
            SpliceCommand::Other(t) => Node::new("splice_command").value(*t).note("unhandled"),
        });
        node
    }
}

/// splice_time(): optional 33-bit PTS behind a time_specified flag.
fn splice_time(r: &mut BitReader) -> crate::error::Result<Option<u64>> {
    if r.read_bit()? {
        r.skip_bits(6)?;
        Ok(Some(r.read_bits(33)?))
    } else {
        r.skip_bits(7)?;
        Ok(None)
    }
}

fn splice_insert(r: &mut BitReader) -> crate::error::Result<SpliceCommand> {
    let splice_event_id = r.read_bits(32)? as u32;
    let cancel = r.read_bit()?;
    r.skip_bits(7)?;

    let mut out_of_network = false;
    let mut pts = None;
    let mut duration = None;
    let mut unique_program_id = 0;
    let mut avail_num = 0;
    let mut avails_expected = 0;

    if !cancel {
        out_of_network = r.read_bit()?;
        let program_splice = r.read_bit()?;
        let duration_flag = r.read_bit()?;
        let splice_immediate = r.read_bit()?;
        r.skip_bits(4)?;

        if program_splice {
            if !splice_immediate {
                pts = splice_time(r)?;
            }
        } else {
            let component_count = r.read_bits(8)? as usize;
            for _ in 0..component_count {
                r.skip_bits(8)?; // component_tag
                if !splice_immediate {
                    splice_time(r)?;
                }
            }
        }
        if duration_flag {
            r.skip_bits(7)?; // auto_return + reserved
            duration = Some(r.read_bits(33)?);
        }
        unique_program_id = r.read_bits(16)? as u16;
        avail_num = r.read_bits(8)? as u8;
        avails_expected = r.read_bits(8)? as u8;
    }

    Ok(SpliceCommand::SpliceInsert {
        splice_event_id,
        cancel,
        out_of_network,
        pts,
        duration,
        unique_program_id,
        avail_num,
        avails_expected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::SectionAssembler;
    use crate::utils::Crc32Mpeg2;
    use pretty_assertions::assert_eq;

    fn build_splice_section(body: &[u8]) -> Vec<u8> {
        let section_length = body.len() + 4;
        let mut s = vec![
            0xFC,
            0x30 | ((section_length >> 8) as u8 & 0x0F),
            (section_length & 0xFF) as u8,
        ];
        s.extend_from_slice(body);
        let crc = Crc32Mpeg2::new().calculate(&s);
        s.extend_from_slice(&crc.to_be_bytes());
        s
    }

    #[test]
    fn test_parse_splice_insert() {
        let body = [
            0x00, // protocol version
            0x00, 0x00, 0x00, 0x00, 0x00, // flags + pts_adjustment 0
            0x00, // cw_index
            0xFF, 0xF0, // tier 0xFFF, command length 0x00_
            0x14, // command length low byte (20)
            0x05, // splice_insert
            0x00, 0x00, 0x00, 0x2A, // event id 42
            0x7F, // not cancelled
            0xEF, // out_of_network, program splice, duration, not immediate
            // splice_time: specified, pts 0x0_12345678 (33 bits)
            0xFE, 0x12, 0x34, 0x56, 0x78,
            // break_duration: 33-bit 0x1_00000000
            0xFF, 0x00, 0x00, 0x00, 0x00,
            0x01, 0x02, // unique program id
            0x03, // avail num
            0x04, // avails expected
        ];
        let raw = build_splice_section(&body);
        let mut payload = vec![0u8];
        payload.extend_from_slice(&raw);
        payload.resize(184, 0xFF);
        let sections = SectionAssembler::new().push(true, &payload);
        assert_eq!(sections.len(), 1);
        assert!(sections[0].crc_ok());

        let info = SpliceInfo::parse(&sections[0]).unwrap();
        assert_eq!(info.tier, 0xFFF);
        match info.command {
            SpliceCommand::SpliceInsert {
                splice_event_id,
                cancel,
                out_of_network,
                pts,
                duration,
                unique_program_id,
                avail_num,
                avails_expected,
            } => {
                assert_eq!(splice_event_id, 42);
                assert!(!cancel);
                assert!(out_of_network);
                assert_eq!(pts, Some(0x12345678));
                assert_eq!(duration, Some(0x1_0000_0000));
                assert_eq!(unique_program_id, 0x0102);
                assert_eq!(avail_num, 3);
                assert_eq!(avails_expected, 4);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_time_signal() {
        let body = [
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
            0xFF, 0xF0, 0x05, // tier, length 5
            0x06, // time_signal
            0xFE, 0x00, 0x00, 0x00, 0x64, // pts 100
        ];
        let raw = build_splice_section(&body);
        let mut payload = vec![0u8];
        payload.extend_from_slice(&raw);
        payload.resize(184, 0xFF);
        let sections = SectionAssembler::new().push(true, &payload);

        let info = SpliceInfo::parse(&sections[0]).unwrap();
        assert_eq!(info.command, SpliceCommand::TimeSignal { pts: Some(100) });
    }
}
